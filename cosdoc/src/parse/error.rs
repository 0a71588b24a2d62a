use std::fmt::Display;

use nom::error::{ErrorKind, ParseError};

use crate::pdf::{trailer::TrailerError, FilterError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyntaxErrorKind {
    InvalidTrailer(TrailerError),
    StartxrefInvalid,
    BackwardSearchNotFound,
    XrefInvalid,
    /// The object header announced another number than expected.
    UnexpectedObject,
    MalformedStream,
    /// Arrays and dictionaries nested too deeply.
    TooDeep,
    StreamError(FilterError),
    Nom(ErrorKind),
}

impl Display for SyntaxErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyntaxErrorKind::InvalidTrailer(e) => write!(f, "invalid trailer ({:?})", e),
            SyntaxErrorKind::StartxrefInvalid => f.write_str("invalid startxref"),
            SyntaxErrorKind::BackwardSearchNotFound => f.write_str("keyword not found"),
            SyntaxErrorKind::XrefInvalid => f.write_str("invalid xref section"),
            SyntaxErrorKind::UnexpectedObject => f.write_str("unexpected object"),
            SyntaxErrorKind::MalformedStream => f.write_str("malformed stream"),
            SyntaxErrorKind::TooDeep => f.write_str("objects nested too deeply"),
            SyntaxErrorKind::StreamError(e) => write!(f, "stream error: {}", e),
            SyntaxErrorKind::Nom(kind) => write!(f, "{}", kind.description()),
        }
    }
}

impl From<TrailerError> for SyntaxErrorKind {
    fn from(err: TrailerError) -> Self {
        SyntaxErrorKind::InvalidTrailer(err)
    }
}

impl From<FilterError> for SyntaxErrorKind {
    fn from(err: FilterError) -> Self {
        SyntaxErrorKind::StreamError(err)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError<I> {
    pub input: I,
    pub kind: SyntaxErrorKind,
    pub from: Option<Box<Self>>,
}

impl<I> SyntaxError<I> {
    pub fn new(input: I, kind: SyntaxErrorKind) -> Self {
        Self {
            input,
            kind,
            from: None,
        }
    }

    /// Shorthand for an unrecoverable error at `input`.
    pub(crate) fn failure(input: I, kind: impl Into<SyntaxErrorKind>) -> nom::Err<Self> {
        nom::Err::Failure(Self::new(input, kind.into()))
    }

    /// Shorthand for a recoverable error at `input`.
    pub(crate) fn error(input: I, kind: impl Into<SyntaxErrorKind>) -> nom::Err<Self> {
        nom::Err::Error(Self::new(input, kind.into()))
    }
}

impl<I> ParseError<I> for SyntaxError<I> {
    fn from_error_kind(input: I, kind: ErrorKind) -> Self {
        Self {
            input,
            kind: SyntaxErrorKind::Nom(kind),
            from: None,
        }
    }

    fn append(input: I, kind: ErrorKind, other: Self) -> Self {
        Self {
            input,
            kind: SyntaxErrorKind::Nom(kind),
            from: Some(other.into()),
        }
    }
}
