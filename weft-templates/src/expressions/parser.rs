use super::lexer::{Kind, Lexer, Operator, Tokens};
use super::{Equality, ExprError, Expression, LogicalOp, Op};

pub(crate) mod prec {
    pub const INITIAL: u8 = 0;
    pub const CONDITIONAL: u8 = 2;
    pub const EQUALITY: u8 = 3;
    pub const COMPARE: u8 = 4;
    pub const SUM: u8 = 5;
    pub const PRODUCT: u8 = 6;
    pub const PREFIX: u8 = 8;
    pub const CALL: u8 = 10;
    pub const SUBSCRIPT: u8 = 11;
}

fn get_precedence(op: Operator) -> u8 {
    match op {
        Operator::Dot | Operator::LBracket => prec::SUBSCRIPT,
        Operator::LParen => prec::CALL,
        Operator::Mul | Operator::Div | Operator::Mod => prec::PRODUCT,
        Operator::Plus | Operator::Minus => prec::SUM,
        Operator::GreaterThan | Operator::GreaterThanOrEqual | Operator::LessThan | Operator::LessThanOrEqual => {
            prec::COMPARE
        }
        Operator::EqualEqual | Operator::NotEqual => prec::EQUALITY,
        Operator::Or | Operator::And => prec::CONDITIONAL,
        _ => prec::INITIAL,
    }
}

/// Parse a whole expression source string.
pub(crate) fn parse(src: &str) -> Result<Expression, ExprError> {
    let tokens = Lexer::new(src).collect::<Result<Vec<_>, _>>()?;
    let mut tokens = Tokens::new(tokens);
    let expr = expr_bp(&mut tokens, prec::INITIAL)?;
    match tokens.next() {
        Kind::Eof => Ok(expr),
        kind => Err(ExprError::UnexpectedToken(format!("{kind:?}"))),
    }
}

fn expr_bp(tokens: &mut Tokens, precedence: u8) -> Result<Expression, ExprError> {
    let mut left = match tokens.next() {
        Kind::Op(Operator::LBracket) => parse_list(tokens)?,
        Kind::Op(Operator::LCurly) => parse_map(tokens)?,
        Kind::Op(Operator::LParen) => {
            let left = expr_bp(tokens, prec::INITIAL)?;
            match tokens.next() {
                Kind::Op(Operator::RParen) => left,
                _ => return Err(ExprError::UnexpectedToken("expected ')'".into())),
            }
        }
        Kind::Op(Operator::Not) => Expression::Not(Box::new(expr_bp(tokens, prec::PREFIX)?)),
        Kind::Op(Operator::Minus) => Expression::Neg(Box::new(expr_bp(tokens, prec::PREFIX)?)),
        Kind::Ident(name) => Expression::Ident(name),
        Kind::Str(value) => Expression::Str(value),
        Kind::Int(value) => Expression::Int(value),
        Kind::Float(value) => Expression::Float(value),
        Kind::Bool(value) => Expression::Bool(value),
        Kind::Null => Expression::Null,
        Kind::Eof => return Err(ExprError::UnexpectedEof),
        kind => return Err(ExprError::UnexpectedToken(format!("{kind:?}"))),
    };

    loop {
        let Kind::Op(op) = tokens.peek() else {
            return Ok(left);
        };

        let token_prec = get_precedence(op);

        // Bind right when the next operator has a higher precedence,
        // otherwise the expression so far belongs to the caller
        if precedence >= token_prec {
            break;
        }

        tokens.consume();

        // Postfix parsing
        match op {
            Operator::LParen => {
                left = parse_call(tokens, left)?;
                continue;
            }
            Operator::LBracket => {
                let index = expr_bp(tokens, prec::INITIAL)?;
                match tokens.next() {
                    Kind::Op(Operator::RBracket) => (),
                    _ => return Err(ExprError::UnexpectedToken("expected ']'".into())),
                }
                left = Expression::Index(Box::new(left), Box::new(index));
                continue;
            }
            Operator::Dot => {
                let Kind::Ident(member) = tokens.next() else {
                    return Err(ExprError::UnexpectedToken("expected a member name".into()));
                };
                left = Expression::Index(Box::new(left), Box::new(Expression::Str(member)));
                continue;
            }
            _ => {}
        }

        let right = expr_bp(tokens, token_prec)?;
        left = match op {
            Operator::Plus => Expression::Op(Box::new(left), Box::new(right), Op::Add),
            Operator::Minus => Expression::Op(Box::new(left), Box::new(right), Op::Sub),
            Operator::Mul => Expression::Op(Box::new(left), Box::new(right), Op::Mul),
            Operator::Div => Expression::Op(Box::new(left), Box::new(right), Op::Div),
            Operator::Mod => Expression::Op(Box::new(left), Box::new(right), Op::Mod),
            Operator::EqualEqual => Expression::Equality(Box::new(left), Box::new(right), Equality::Eq),
            Operator::NotEqual => Expression::Equality(Box::new(left), Box::new(right), Equality::NotEq),
            Operator::GreaterThan => Expression::Equality(Box::new(left), Box::new(right), Equality::Gt),
            Operator::GreaterThanOrEqual => Expression::Equality(Box::new(left), Box::new(right), Equality::Gte),
            Operator::LessThan => Expression::Equality(Box::new(left), Box::new(right), Equality::Lt),
            Operator::LessThanOrEqual => Expression::Equality(Box::new(left), Box::new(right), Equality::Lte),
            Operator::And => Expression::Logical(Box::new(left), Box::new(right), LogicalOp::And),
            Operator::Or => Expression::Logical(Box::new(left), Box::new(right), LogicalOp::Or),
            op => return Err(ExprError::UnexpectedToken(format!("{op:?}"))),
        };
    }

    Ok(left)
}

fn parse_call(tokens: &mut Tokens, left: Expression) -> Result<Expression, ExprError> {
    let Expression::Ident(fun) = left else {
        return Err(ExprError::InvalidCallTarget);
    };

    let mut args = vec![];
    loop {
        match tokens.peek() {
            Kind::Op(Operator::Comma) => {
                tokens.consume();
                continue;
            }
            Kind::Op(Operator::RParen) => {
                tokens.consume();
                break;
            }
            Kind::Eof => return Err(ExprError::UnexpectedEof),
            _ => (),
        }
        args.push(expr_bp(tokens, prec::INITIAL)?);
    }

    Ok(Expression::Call { fun, args })
}

fn parse_list(tokens: &mut Tokens) -> Result<Expression, ExprError> {
    let mut elements = vec![];

    loop {
        match tokens.peek() {
            Kind::Op(Operator::Comma) => {
                tokens.consume();
                continue;
            }
            Kind::Op(Operator::RBracket) => {
                tokens.consume();
                break;
            }
            Kind::Eof => return Err(ExprError::UnexpectedEof),
            _ => (),
        }
        elements.push(expr_bp(tokens, prec::INITIAL)?);
    }

    Ok(Expression::List(elements))
}

fn parse_map(tokens: &mut Tokens) -> Result<Expression, ExprError> {
    let mut entries = vec![];

    loop {
        match tokens.peek() {
            Kind::Op(Operator::Comma) => {
                tokens.consume();
                continue;
            }
            Kind::Op(Operator::RCurly) => {
                tokens.consume();
                break;
            }
            Kind::Eof => return Err(ExprError::UnexpectedEof),
            _ => (),
        }

        let key = match tokens.next() {
            Kind::Ident(key) | Kind::Str(key) => key,
            kind => return Err(ExprError::UnexpectedToken(format!("{kind:?}"))),
        };

        match tokens.next() {
            Kind::Op(Operator::Colon) => (),
            _ => return Err(ExprError::UnexpectedToken("expected ':'".into())),
        }

        entries.push((key, expr_bp(tokens, prec::INITIAL)?));
    }

    Ok(Expression::Map(entries))
}

#[cfg(test)]
mod test {
    use super::super::ctor::*;
    use super::*;

    fn parsed(input: &str) -> Expression {
        parse(input).unwrap()
    }

    #[test]
    fn add_sub() {
        assert_eq!(parsed("1 + 2"), *add(num(1), num(2)));
    }

    #[test]
    fn precedence() {
        assert_eq!(parsed("5 + 1 * 2"), *add(num(5), mul(num(1), num(2))));
    }

    #[test]
    fn brackets() {
        assert_eq!(parsed("(5 + 1) * 2"), *mul(add(num(5), num(1)), num(2)));
    }

    #[test]
    fn dot_lookup() {
        assert_eq!(parsed("a.b.c"), *index(index(ident("a"), strlit("b")), strlit("c")));
    }

    #[test]
    fn array_index() {
        assert_eq!(parsed("xs[0]"), *index(ident("xs"), num(0)));
    }

    #[test]
    fn word_operators_parse_like_symbols() {
        assert_eq!(parsed("a and b"), parsed("a && b"));
        assert_eq!(parsed("a or b"), parsed("a || b"));
        assert_eq!(parsed("a gt b"), parsed("a > b"));
        assert_eq!(parsed("a lt b"), parsed("a < b"));
    }

    #[test]
    fn logical_binds_looser_than_equality() {
        assert_eq!(
            parsed("a == 1 and b gt 2"),
            *and(eq(ident("a"), num(1)), gt(ident("b"), num(2)))
        );
    }

    #[test]
    fn call_with_args() {
        assert_eq!(
            parsed("inc(1, step)"),
            Expression::Call {
                fun: "inc".into(),
                args: vec![Expression::Int(1), Expression::Ident("step".into())],
            }
        );
    }

    #[test]
    fn call_on_non_ident_is_rejected() {
        assert_eq!(parse("a.b()"), Err(ExprError::InvalidCallTarget));
    }

    #[test]
    fn list_literal() {
        assert_eq!(
            parsed("[3, 2, 1]"),
            Expression::List(vec![Expression::Int(3), Expression::Int(2), Expression::Int(1)])
        );
    }

    #[test]
    fn map_literal() {
        assert_eq!(
            parsed("{a: 1, 'b': c}"),
            Expression::Map(vec![
                ("a".into(), Expression::Int(1)),
                ("b".into(), Expression::Ident("c".into())),
            ])
        );
    }

    #[test]
    fn unary() {
        assert_eq!(parsed("!a"), Expression::Not(ident("a")));
        assert_eq!(parsed("-1"), Expression::Neg(num(1)));
    }

    #[test]
    fn trailing_tokens_error() {
        assert!(parse("1 2").is_err());
        assert!(parse("").is_err());
    }

    #[test]
    fn resolve_marks_locals_and_context() {
        let expr = parsed("item + state.counter");
        let resolved = expr.resolve(&|name| name == "item");
        assert_eq!(
            resolved,
            *add(
                Box::new(Expression::Local("item".into())),
                index(Box::new(Expression::Ctx("state".into())), strlit("counter")),
            )
        );
    }
}
