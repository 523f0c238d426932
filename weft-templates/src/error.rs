use std::error::Error as StdError;
use std::fmt::{self, Display, Formatter};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    Parse(ParseError),
    Compile(CompileError),
    /// Registering a template name twice
    Conflict(String),
    Render(RenderError),
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Error::Parse(err) => write!(f, "{err}"),
            Error::Compile(err) => write!(f, "{err}"),
            Error::Conflict(name) => write!(f, "Template '{name}' already defined"),
            Error::Render(err) => write!(f, "{err}"),
        }
    }
}

impl StdError for Error {}

impl From<ParseError> for Error {
    fn from(value: ParseError) -> Self {
        Self::Parse(value)
    }
}

impl From<CompileError> for Error {
    fn from(value: CompileError) -> Self {
        Self::Compile(value)
    }
}

impl From<RenderError> for Error {
    fn from(value: RenderError) -> Self {
        Self::Render(value)
    }
}

// Line number and column start at one, not zero,
// because actual humans might read this
pub(crate) fn src_line_no(end: usize, src: &str) -> (usize, usize) {
    let mut line_no = 1;
    let mut pos = 0;

    while let Some(p) = &src[pos..end].find('\n') {
        pos += p + 1;
        line_no += 1;
    }

    let col = 1 + end - pos;

    (line_no, col)
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub line: usize,
    pub col: usize,
}

impl ParseError {
    pub(crate) fn new(offset: usize, src: &str, kind: ParseErrorKind) -> Self {
        let (line, col) = src_line_no(offset.min(src.len()), src);
        Self { kind, line, col }
    }
}

impl StdError for ParseError {}

impl Display for ParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Invalid XML in template (line {}, col {}: {})",
            self.line, self.col, self.kind
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParseErrorKind {
    UnexpectedEof,
    UnterminatedString,
    UnterminatedComment,
    InvalidToken { expected: &'static str },
    MismatchedClosingTag { expected: String, found: String },
    /// Content after the document's root element
    TrailingContent,
    MissingRoot,
}

impl Display for ParseErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ParseErrorKind::UnexpectedEof => write!(f, "unexpected end of input"),
            ParseErrorKind::UnterminatedString => write!(f, "unterminated attribute value"),
            ParseErrorKind::UnterminatedComment => write!(f, "unterminated comment"),
            ParseErrorKind::InvalidToken { expected } => write!(f, "invalid token (expected {expected})"),
            ParseErrorKind::MismatchedClosingTag { expected, found } => {
                write!(f, "mismatched closing tag (expected </{expected}>, found </{found}>)")
            }
            ParseErrorKind::TrailingContent => write!(f, "content after the root element"),
            ParseErrorKind::MissingRoot => write!(f, "missing root element"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CompileError {
    UnknownDirective(String),
    /// `t-call` is only valid on a `<t>` element
    InvalidTag(String),
    MissingEventName,
    UnknownModifier(String),
    MissingAttributeName,
    MissingLoopBinding,
    MisplacedElse,
    InvalidExpression { template: String, detail: String },
}

impl StdError for CompileError {}

impl Display for CompileError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::UnknownDirective(name) => write!(f, "Unknown QWeb directive: '{name}'"),
            CompileError::InvalidTag(tag) => write!(f, "Invalid tag '{tag}' for t-call directive"),
            CompileError::MissingEventName => write!(f, "Missing event name with t-on directive"),
            CompileError::UnknownModifier(name) => {
                write!(f, "Unknown event modifier '{name}' with t-on directive")
            }
            CompileError::MissingAttributeName => write!(f, "Missing attribute name with t-attf directive"),
            CompileError::MissingLoopBinding => write!(f, "Missing t-as binding with t-foreach directive"),
            CompileError::MisplacedElse => write!(f, "t-elif and t-else must directly follow a t-if"),
            CompileError::InvalidExpression { template, detail } => {
                write!(f, "Invalid expression while compiling template '{template}': {detail}")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RenderError {
    UnknownTemplate(String),
    MissingHandler { handler: String, template: String },
    InvalidLoop,
    MultipleRoots,
    EmptyRender(String),
}

impl StdError for RenderError {}

impl Display for RenderError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::UnknownTemplate(name) => write!(f, "Template '{name}' does not exist"),
            RenderError::MissingHandler { handler, template } => {
                write!(f, "Missing handler '{handler}' when evaluating template '{template}'")
            }
            RenderError::InvalidLoop => write!(f, "Invalid loop expression"),
            RenderError::MultipleRoots => write!(f, "A template should not have more than one root node"),
            RenderError::EmptyRender(name) => write!(f, "Template '{name}' did not produce a root node"),
        }
    }
}
