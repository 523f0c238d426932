use crate::error::{ParseError, ParseErrorKind, Result};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum MarkupNode {
    Element(MarkupElement),
    Text(String),
    Comment(String),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct MarkupElement {
    pub(crate) tag: String,
    pub(crate) attrs: Vec<(String, String)>,
    pub(crate) children: Vec<MarkupNode>,
}

impl MarkupElement {
    pub(crate) fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.iter().find(|(n, _)| n == name).map(|(_, v)| v.as_str())
    }
}

/// Parse a template document: exactly one root element, with leading and
/// trailing whitespace, comments and a prolog allowed around it.
pub(crate) fn parse_document(src: &str) -> Result<MarkupElement, ParseError> {
    let mut scanner = Scanner::new(src);
    let mut nodes = vec![];
    scanner.parse_nodes(&mut nodes)?;

    if scanner.pos < src.len() {
        // parse_nodes stops at a stray closing tag
        return Err(scanner.error(ParseErrorKind::TrailingContent));
    }

    let mut root = None;
    for node in nodes {
        match node {
            MarkupNode::Element(el) => {
                if root.is_some() {
                    return Err(scanner.error(ParseErrorKind::TrailingContent));
                }
                root = Some(el);
            }
            MarkupNode::Text(text) if text.trim().is_empty() => (),
            MarkupNode::Comment(_) => (),
            MarkupNode::Text(_) => return Err(scanner.error(ParseErrorKind::TrailingContent)),
        }
    }

    root.ok_or_else(|| scanner.error(ParseErrorKind::MissingRoot))
}

/// Parse a markup fragment: any number of top level nodes.
pub(crate) fn parse_fragment(src: &str) -> Result<Vec<MarkupNode>, ParseError> {
    let mut scanner = Scanner::new(src);
    let mut nodes = vec![];
    scanner.parse_nodes(&mut nodes)?;
    if scanner.pos < src.len() {
        return Err(scanner.error(ParseErrorKind::TrailingContent));
    }
    Ok(nodes)
}

struct Scanner<'src> {
    src: &'src str,
    pos: usize,
}

impl<'src> Scanner<'src> {
    fn new(src: &'src str) -> Self {
        Self { src, pos: 0 }
    }

    fn error(&self, kind: ParseErrorKind) -> ParseError {
        ParseError::new(self.pos, self.src, kind)
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn rest(&self) -> &'src str {
        &self.src[self.pos..]
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    fn eat_str(&mut self, s: &str) -> bool {
        if self.rest().starts_with(s) {
            self.pos += s.len();
            true
        } else {
            false
        }
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.bump();
        }
    }

    // Parse sibling nodes until a closing tag or the end of input
    fn parse_nodes(&mut self, out: &mut Vec<MarkupNode>) -> Result<(), ParseError> {
        loop {
            match self.peek() {
                None => return Ok(()),
                Some('<') => {
                    if self.rest().starts_with("</") {
                        return Ok(());
                    }
                    if self.eat_str("<!--") {
                        out.push(MarkupNode::Comment(self.take_comment()?));
                    } else if self.eat_str("<?") {
                        self.skip_prolog()?;
                    } else {
                        out.push(MarkupNode::Element(self.parse_element()?));
                    }
                }
                Some(_) => out.push(MarkupNode::Text(self.take_text())),
            }
        }
    }

    fn take_text(&mut self) -> String {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c != '<') {
            self.bump();
        }
        decode_entities(&self.src[start..self.pos])
    }

    fn take_comment(&mut self) -> Result<String, ParseError> {
        let start = self.pos;
        loop {
            if self.rest().starts_with("-->") {
                let text = self.src[start..self.pos].to_string();
                self.pos += 3;
                break Ok(text);
            }
            if self.bump().is_none() {
                break Err(self.error(ParseErrorKind::UnterminatedComment));
            }
        }
    }

    fn skip_prolog(&mut self) -> Result<(), ParseError> {
        loop {
            if self.eat_str("?>") {
                break Ok(());
            }
            if self.bump().is_none() {
                break Err(self.error(ParseErrorKind::UnexpectedEof));
            }
        }
    }

    fn parse_element(&mut self) -> Result<MarkupElement, ParseError> {
        if !self.eat('<') {
            return Err(self.error(ParseErrorKind::InvalidToken { expected: "<" }));
        }

        let tag = self.take_name();
        if tag.is_empty() {
            return Err(self.error(ParseErrorKind::InvalidToken { expected: "tag name" }));
        }

        let mut attrs = vec![];
        loop {
            self.skip_whitespace();
            match self.peek() {
                None => return Err(self.error(ParseErrorKind::UnexpectedEof)),
                Some('>') => {
                    self.bump();
                    break;
                }
                Some('/') => {
                    self.bump();
                    if !self.eat('>') {
                        return Err(self.error(ParseErrorKind::InvalidToken { expected: ">" }));
                    }
                    // self closing, no children
                    return Ok(MarkupElement {
                        tag,
                        attrs,
                        children: vec![],
                    });
                }
                Some(_) => attrs.push(self.parse_attribute()?),
            }
        }

        let mut children = vec![];
        self.parse_nodes(&mut children)?;

        if !self.eat_str("</") {
            return Err(self.error(ParseErrorKind::UnexpectedEof));
        }
        let closing = self.take_name();
        self.skip_whitespace();
        if !self.eat('>') {
            return Err(self.error(ParseErrorKind::InvalidToken { expected: ">" }));
        }
        if closing != tag {
            return Err(self.error(ParseErrorKind::MismatchedClosingTag {
                expected: tag,
                found: closing,
            }));
        }

        Ok(MarkupElement { tag, attrs, children })
    }

    fn parse_attribute(&mut self) -> Result<(String, String), ParseError> {
        let name = self.take_name();
        if name.is_empty() {
            return Err(self.error(ParseErrorKind::InvalidToken {
                expected: "attribute name",
            }));
        }

        self.skip_whitespace();
        if !self.eat('=') {
            // a bare attribute carries an empty value
            return Ok((name, String::new()));
        }
        self.skip_whitespace();

        let Some(quote @ ('"' | '\'')) = self.peek() else {
            return Err(self.error(ParseErrorKind::InvalidToken { expected: "quote" }));
        };
        self.bump();

        let start = self.pos;
        loop {
            match self.peek() {
                None => return Err(self.error(ParseErrorKind::UnterminatedString)),
                Some(c) if c == quote => {
                    let value = decode_entities(&self.src[start..self.pos]);
                    self.bump();
                    return Ok((name, value));
                }
                Some(_) => {
                    self.bump();
                }
            }
        }
    }

    fn take_name(&mut self) -> String {
        let start = self.pos;
        while matches!(
            self.peek(),
            Some(c) if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':' | '.')
        ) {
            self.bump();
        }
        self.src[start..self.pos].to_string()
    }
}

// Decode the five predefined entities; anything unrecognised is kept as-is.
fn decode_entities(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.char_indices();

    while let Some((index, c)) = chars.next() {
        if c != '&' {
            out.push(c);
            continue;
        }

        let rest = &input[index..];
        let entity = [
            ("&amp;", '&'),
            ("&lt;", '<'),
            ("&gt;", '>'),
            ("&quot;", '"'),
            ("&apos;", '\''),
        ]
        .into_iter()
        .find(|(name, _)| rest.starts_with(name));

        match entity {
            Some((name, decoded)) => {
                out.push(decoded);
                // skip the rest of the entity
                for _ in 0..name.len() - 1 {
                    chars.next();
                }
            }
            None => out.push('&'),
        }
    }

    out
}
