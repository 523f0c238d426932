use std::error::Error as StdError;
use std::fmt::{self, Display, Formatter};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// A template compile or render failure
    Template(weft_templates::error::Error),
    /// `t-widget` referenced a name with no registered factory
    UnknownWidget(String),
    /// Mounting a destroyed widget
    Destroyed,
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Error::Template(err) => write!(f, "{err}"),
            Error::UnknownWidget(name) => write!(f, "No widget factory registered for '{name}'"),
            Error::Destroyed => write!(f, "widget was destroyed"),
        }
    }
}

impl StdError for Error {}

impl From<weft_templates::error::Error> for Error {
    fn from(value: weft_templates::error::Error) -> Self {
        Self::Template(value)
    }
}
