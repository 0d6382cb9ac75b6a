//! Error types.
//!
//! Flow control never surfaces as an error: a full or drained pipe is reported
//! through boolean and `Option` results. These errors cover setup and delivery.

use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    MailboxClosed,
    IdentityTooLong,
    InvalidConfig,
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Error { kind }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error::new(kind)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ErrorKind::MailboxClosed => write!(f, "Owner mailbox closed"),
            ErrorKind::IdentityTooLong => write!(f, "Identity exceeds maximum size"),
            ErrorKind::InvalidConfig => write!(f, "Invalid pipe configuration"),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_roundtrip() {
        let err: Error = ErrorKind::MailboxClosed.into();
        assert_eq!(err.kind(), ErrorKind::MailboxClosed);
        assert_eq!(err.to_string(), "Owner mailbox closed");
    }
}
