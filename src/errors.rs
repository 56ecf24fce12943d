use thiserror::Error;

/// Structured code carried by every [`ParseError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    BadValue,
    TypeMismatch,
    NoWhereParseContext,
}

/// Error returned by the query parser.
///
/// Messages start with a lowercase character and carry no trailing
/// newline; `Display` renders the message alone so callers can prefix
/// their own context.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    /// Grammatical violation: wrong argument type or arity, illegal
    /// operator combination, unknown operator, depth overflow.
    #[error("{0}")]
    BadValue(String),

    /// `$type` received an argument that is neither numeric nor a string.
    #[error("{0}")]
    TypeMismatch(String),

    /// `$where` was used but no where-parser is configured.
    #[error("{0}")]
    NoWhereParseContext(String),
}

impl ParseError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::BadValue(_) => ErrorCode::BadValue,
            Self::TypeMismatch(_) => ErrorCode::TypeMismatch,
            Self::NoWhereParseContext(_) => ErrorCode::NoWhereParseContext,
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::BadValue(m) | Self::TypeMismatch(m) | Self::NoWhereParseContext(m) => m,
        }
    }
}
