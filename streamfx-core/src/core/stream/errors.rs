use std::{io, result};
use thiserror::Error;

/// The result type of the stream module.
pub type Result<T> = result::Result<T, Error>;

/// Errors that can occur during streaming operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("the stream for \"{0}\" was not found")]
    NotFound(String),
    #[error("the stream is not ready")]
    NotReady,
    #[error("invalid stream range")]
    InvalidRange,
    #[error("stream parsing error occurred, {0}")]
    Parse(String),
    #[error("timed out while waiting for piece {0}")]
    PieceTimeout(usize),
    #[error("the stream is in an invalid state")]
    InvalidState,
    #[error("an io error occurred, {0}")]
    Io(io::Error),
}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::NotFound(_), Self::NotFound(_)) => true,
            (Self::NotReady, Self::NotReady) => true,
            (Self::InvalidRange, Self::InvalidRange) => true,
            (Self::Parse(_), Self::Parse(_)) => true,
            (Self::PieceTimeout(_), Self::PieceTimeout(_)) => true,
            (Self::InvalidState, Self::InvalidState) => true,
            (Self::Io(_), Self::Io(_)) => true,
            _ => false,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}
