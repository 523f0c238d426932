use std::error::Error as StdError;
use std::fmt::{self, Display, Formatter};

pub(crate) mod eval;
pub(crate) mod lexer;
pub(crate) mod parser;

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Op {
    Add,
    Sub,
    Div,
    Mul,
    Mod,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Equality {
    Eq,
    NotEq,
    Gt,
    Gte,
    Lt,
    Lte,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum LogicalOp {
    And,
    Or,
}

/// A compiled template expression.
///
/// Identifiers come out of the parser as [`Expression::Ident`] and are
/// rewritten during compilation: names bound in the compilation scope
/// (`t-set`, `t-foreach`/`t-as` and the call body variable) become
/// [`Expression::Local`], everything else becomes [`Expression::Ctx`]
/// and resolves against the render context.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Expression>),
    Map(Vec<(String, Expression)>),

    Ident(String),
    Local(String),
    Ctx(String),
    Index(Box<Expression>, Box<Expression>),

    Not(Box<Expression>),
    Neg(Box<Expression>),

    Op(Box<Expression>, Box<Expression>, Op),
    Equality(Box<Expression>, Box<Expression>, Equality),
    Logical(Box<Expression>, Box<Expression>, LogicalOp),

    Call { fun: String, args: Vec<Expression> },

    /// Concatenated interpolation segments (`t-attf-*`)
    Segments(Vec<Expression>),
}

impl Expression {
    /// Rewrite identifiers into scope or context lookups.
    pub(crate) fn resolve(self, is_local: &dyn Fn(&str) -> bool) -> Expression {
        let resolve = |expr: Box<Expression>| Box::new(expr.resolve(is_local));
        match self {
            Expression::Ident(name) => match is_local(&name) {
                true => Expression::Local(name),
                false => Expression::Ctx(name),
            },
            Expression::List(items) => {
                Expression::List(items.into_iter().map(|item| item.resolve(is_local)).collect())
            }
            Expression::Map(entries) => Expression::Map(
                entries
                    .into_iter()
                    .map(|(key, value)| (key, value.resolve(is_local)))
                    .collect(),
            ),
            Expression::Index(lhs, rhs) => Expression::Index(resolve(lhs), resolve(rhs)),
            Expression::Not(expr) => Expression::Not(resolve(expr)),
            Expression::Neg(expr) => Expression::Neg(resolve(expr)),
            Expression::Op(lhs, rhs, op) => Expression::Op(resolve(lhs), resolve(rhs), op),
            Expression::Equality(lhs, rhs, eq) => Expression::Equality(resolve(lhs), resolve(rhs), eq),
            Expression::Logical(lhs, rhs, op) => Expression::Logical(resolve(lhs), resolve(rhs), op),
            Expression::Call { fun, args } => Expression::Call {
                fun,
                args: args.into_iter().map(|arg| arg.resolve(is_local)).collect(),
            },
            Expression::Segments(segments) => Expression::Segments(
                segments
                    .into_iter()
                    .map(|segment| segment.resolve(is_local))
                    .collect(),
            ),
            other => other,
        }
    }

    /// Whether any function call appears in the expression. Calls are
    /// only valid in event handler position.
    pub(crate) fn has_call(&self) -> bool {
        match self {
            Expression::Call { .. } => true,
            Expression::List(items) | Expression::Segments(items) => items.iter().any(Expression::has_call),
            Expression::Map(entries) => entries.iter().any(|(_, value)| value.has_call()),
            Expression::Index(lhs, rhs) => lhs.has_call() || rhs.has_call(),
            Expression::Not(expr) | Expression::Neg(expr) => expr.has_call(),
            Expression::Op(lhs, rhs, _)
            | Expression::Equality(lhs, rhs, _)
            | Expression::Logical(lhs, rhs, _) => lhs.has_call() || rhs.has_call(),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ExprError {
    UnterminatedString,
    InvalidNumber,
    UnexpectedEof,
    UnexpectedToken(String),
    InvalidCallTarget,
}

impl StdError for ExprError {}

impl Display for ExprError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ExprError::UnterminatedString => write!(f, "unterminated string"),
            ExprError::InvalidNumber => write!(f, "invalid number"),
            ExprError::UnexpectedEof => write!(f, "unexpected end of expression"),
            ExprError::UnexpectedToken(token) => write!(f, "unexpected token '{token}'"),
            ExprError::InvalidCallTarget => write!(f, "only named functions can be called"),
        }
    }
}
