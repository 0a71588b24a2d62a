use nom_locate::LocatedSpan;

use crate::{
    parse::error::{SyntaxError, SyntaxErrorKind},
    pdf::{FilterError, ObjectKind, Reference},
};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("malformed syntax at byte {offset}")]
    MalformedSyntax { offset: usize },
    #[error("malformed stream at byte {offset}")]
    MalformedStream { offset: usize },
    #[error("corrupt cross-reference data: {0}")]
    CorruptXRef(String),
    #[error("stale reference {0}")]
    StaleReference(Reference),
    #[error("object {0} not found")]
    ObjectNotFound(u32),
    #[error("expected {expected}, found {found}")]
    TypeMismatch { expected: ObjectKind, found: ObjectKind },
    #[error("stream filter failed: {0}")]
    Filter(#[from] FilterError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl<T, X> From<SyntaxError<LocatedSpan<T, X>>> for Error {
    fn from(err: SyntaxError<LocatedSpan<T, X>>) -> Self {
        let offset = err.input.location_offset();
        match err.kind {
            SyntaxErrorKind::MalformedStream => Error::MalformedStream { offset },
            SyntaxErrorKind::StreamError(e) => Error::Filter(e),
            SyntaxErrorKind::StartxrefInvalid
            | SyntaxErrorKind::XrefInvalid
            | SyntaxErrorKind::BackwardSearchNotFound => {
                Error::CorruptXRef(format!("{} at byte {}", err.kind, offset))
            }
            _ => Error::MalformedSyntax { offset },
        }
    }
}

impl<T, X> From<nom::Err<SyntaxError<LocatedSpan<T, X>>>> for Error {
    fn from(err: nom::Err<SyntaxError<LocatedSpan<T, X>>>) -> Self {
        match err {
            nom::Err::Error(e) | nom::Err::Failure(e) => e.into(),
            nom::Err::Incomplete(_) => Error::MalformedSyntax { offset: 0 },
        }
    }
}

/// A problem found while loading that did not stop the document from opening.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Warning {
    #[error("corrupt cross-reference data: {0}")]
    CorruptXRef(String),
    #[error("object {number} at byte {offset} could not be parsed and reads as null")]
    MalformedObject { number: u32, offset: usize },
    #[error("object {number} is missing `endobj`")]
    MissingEndobj { number: u32 },
    #[error("expected object {expected} at byte {offset}, found object {found}")]
    NumberMismatch { expected: u32, found: u32, offset: usize },
    #[error("object table was rebuilt by scanning the file ({objects} objects)")]
    Reconstructed { objects: usize },
}
