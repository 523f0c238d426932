use std::iter::Peekable;
use std::str::CharIndices;

use super::ExprError;

#[derive(Debug, Copy, Clone, PartialEq)]
pub(crate) enum Operator {
    LParen,
    RParen,
    LBracket,
    RBracket,
    LCurly,
    RCurly,
    Comma,
    Colon,
    Dot,
    Not,
    Plus,
    Minus,
    Mul,
    Div,
    Mod,
    And,
    Or,
    EqualEqual,
    NotEqual,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Kind {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Null,
    Op(Operator),
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token(pub(crate) Kind, pub(crate) usize);

impl Kind {
    fn to_token(self, index: usize) -> Token {
        Token(self, index)
    }
}

/// A cursor over the lexed tokens.
pub(crate) struct Tokens {
    inner: Vec<Token>,
    index: usize,
}

impl Tokens {
    pub(crate) fn new(inner: Vec<Token>) -> Self {
        Self { inner, index: 0 }
    }

    pub(crate) fn next(&mut self) -> Kind {
        let token = self.peek();
        self.index += 1;
        token
    }

    pub(crate) fn peek(&self) -> Kind {
        match self.inner.get(self.index) {
            Some(Token(kind, _)) => kind.clone(),
            None => Kind::Eof,
        }
    }

    pub(crate) fn consume(&mut self) {
        self.index += 1;
    }
}

impl Iterator for Lexer<'_> {
    type Item = Result<Token, ExprError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_token() {
            Ok(Token(Kind::Eof, _)) => None,
            val => Some(val),
        }
    }
}

pub(crate) struct Lexer<'src> {
    src: &'src str,
    chars: Peekable<CharIndices<'src>>,
}

impl<'src> Lexer<'src> {
    pub(crate) fn new(src: &'src str) -> Self {
        Self {
            chars: src.char_indices().peekable(),
            src,
        }
    }

    fn next_token(&mut self) -> Result<Token, ExprError> {
        let (index, c) = match self.chars.next() {
            None => return Ok(Token(Kind::Eof, self.src.len())),
            Some(c) => c,
        };

        let next = self.chars.peek().map(|(_, c)| *c);

        match (c, next) {
            // -----------------------------------------------------------------------------
            //     - Double tokens -
            // -----------------------------------------------------------------------------
            ('&', Some('&')) => {
                let _ = self.chars.next();
                Ok(Kind::Op(Operator::And).to_token(index))
            }
            ('|', Some('|')) => {
                let _ = self.chars.next();
                Ok(Kind::Op(Operator::Or).to_token(index))
            }
            ('=', Some('=')) => {
                let _ = self.chars.next();
                Ok(Kind::Op(Operator::EqualEqual).to_token(index))
            }
            ('!', Some('=')) => {
                let _ = self.chars.next();
                Ok(Kind::Op(Operator::NotEqual).to_token(index))
            }
            ('>', Some('=')) => {
                let _ = self.chars.next();
                Ok(Kind::Op(Operator::GreaterThanOrEqual).to_token(index))
            }
            ('<', Some('=')) => {
                let _ = self.chars.next();
                Ok(Kind::Op(Operator::LessThanOrEqual).to_token(index))
            }

            // -----------------------------------------------------------------------------
            //     - Single tokens -
            // -----------------------------------------------------------------------------
            ('(', _) => Ok(Kind::Op(Operator::LParen).to_token(index)),
            (')', _) => Ok(Kind::Op(Operator::RParen).to_token(index)),
            ('[', _) => Ok(Kind::Op(Operator::LBracket).to_token(index)),
            (']', _) => Ok(Kind::Op(Operator::RBracket).to_token(index)),
            ('{', _) => Ok(Kind::Op(Operator::LCurly).to_token(index)),
            ('}', _) => Ok(Kind::Op(Operator::RCurly).to_token(index)),
            (',', _) => Ok(Kind::Op(Operator::Comma).to_token(index)),
            (':', _) => Ok(Kind::Op(Operator::Colon).to_token(index)),
            ('.', _) => Ok(Kind::Op(Operator::Dot).to_token(index)),
            ('!', _) => Ok(Kind::Op(Operator::Not).to_token(index)),
            ('+', _) => Ok(Kind::Op(Operator::Plus).to_token(index)),
            ('-', _) => Ok(Kind::Op(Operator::Minus).to_token(index)),
            ('*', _) => Ok(Kind::Op(Operator::Mul).to_token(index)),
            ('/', _) => Ok(Kind::Op(Operator::Div).to_token(index)),
            ('%', _) => Ok(Kind::Op(Operator::Mod).to_token(index)),
            ('>', _) => Ok(Kind::Op(Operator::GreaterThan).to_token(index)),
            ('<', _) => Ok(Kind::Op(Operator::LessThan).to_token(index)),

            // -----------------------------------------------------------------------------
            //     - Ident / word operators -
            // -----------------------------------------------------------------------------
            ('a'..='z' | 'A'..='Z' | '_' | '$', _) => Ok(self.take_ident_or_keyword(index).to_token(index)),

            // -----------------------------------------------------------------------------
            //     - Number -
            // -----------------------------------------------------------------------------
            ('0'..='9', _) => self.take_number(index),

            // -----------------------------------------------------------------------------
            //     - String -
            // -----------------------------------------------------------------------------
            ('"' | '\'', _) => self.take_string(c, index),

            // -----------------------------------------------------------------------------
            //     - Whitespace -
            // -----------------------------------------------------------------------------
            _ if c.is_whitespace() => self.next_token(),

            _ => Err(ExprError::UnexpectedToken(c.to_string())),
        }
    }

    fn take_string(&mut self, start_char: char, start_index: usize) -> Result<Token, ExprError> {
        loop {
            let n = self.chars.next();
            match n {
                Some((end, nc)) if nc == start_char => {
                    let string = self.src[start_index + 1..end].to_string();
                    break Ok(Kind::Str(string).to_token(start_index));
                }
                Some((_, '\\')) => {
                    // escaping the string terminator
                    if let Some((_, next)) = self.chars.peek() {
                        if *next == start_char {
                            self.chars.next();
                        }
                    }
                }
                None => break Err(ExprError::UnterminatedString),
                _ => {} // consume chars
            }
        }
    }

    fn take_number(&mut self, index: usize) -> Result<Token, ExprError> {
        let mut end = index;
        let mut parse_float = false;

        while let Some((e, c @ ('0'..='9' | '.'))) = self.chars.peek() {
            if *c == '.' {
                // a dot not followed by a digit is member access
                let lookahead = self.src[*e + 1..].chars().next();
                if !matches!(lookahead, Some('0'..='9')) {
                    break;
                }
                parse_float = true;
            }
            end = *e;
            self.chars.next();
        }

        let input = &self.src[index..=end];

        let kind = match parse_float {
            true => input
                .parse::<f64>()
                .map(Kind::Float)
                .map_err(|_| ExprError::InvalidNumber),
            false => input.parse::<i64>().map(Kind::Int).map_err(|_| ExprError::InvalidNumber),
        }?;

        Ok(Token(kind, index))
    }

    fn take_ident_or_keyword(&mut self, index: usize) -> Kind {
        let mut end = index;
        while let Some((e, 'a'..='z' | 'A'..='Z' | '_' | '$' | '0'..='9')) = self.chars.peek() {
            end = *e;
            self.chars.next();
        }

        let s = &self.src[index..=end];
        match s {
            "true" => Kind::Bool(true),
            "false" => Kind::Bool(false),
            "null" | "undefined" => Kind::Null,
            // word operators, matched on word boundaries
            "and" => Kind::Op(Operator::And),
            "or" => Kind::Op(Operator::Or),
            "gt" => Kind::Op(Operator::GreaterThan),
            "lt" => Kind::Op(Operator::LessThan),
            s => Kind::Ident(s.to_string()),
        }
    }
}
