//!
//! ferry error model
//! -----------------
//! One error enum shared by the protocol layer, the storage backends and the
//! per-connection session loop, along with the mapping to wire-level
//! `ERR <reason>` replies and the recoverable/fatal classification that
//! decides whether a session survives the failure.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Malformed command text. The reason is the exact wire reason
    /// ("Unknown command", "Invalid PUT format", ...).
    #[error("{0}")]
    Protocol(String),

    /// The requested blob does not exist. Carries the sanitized name for
    /// logging; the wire reply is always the fixed "File not found" text.
    #[error("file not found: {0}")]
    NotFound(String),

    /// The storage backend could not be reached or refused the operation.
    #[error("{0}")]
    BackendUnavailable(String),

    /// The peer or the backend stopped mid-stream after a size was
    /// announced. The session must terminate; nothing partial may remain
    /// visible.
    #[error("transfer incomplete: {0}")]
    TransferIncomplete(String),

    /// Socket-level I/O failure. Always terminates the session.
    #[error("connection fault: {0}")]
    ConnectionFault(#[source] std::io::Error),
}

impl Error {
    pub fn protocol<S: Into<String>>(reason: S) -> Self {
        Error::Protocol(reason.into())
    }

    pub fn not_found<S: Into<String>>(name: S) -> Self {
        Error::NotFound(name.into())
    }

    pub fn backend<S: Into<String>>(msg: S) -> Self {
        Error::BackendUnavailable(msg.into())
    }

    pub fn incomplete<S: Into<String>>(msg: S) -> Self {
        Error::TransferIncomplete(msg.into())
    }

    /// True when the session must close instead of reading the next command.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::TransferIncomplete(_) | Error::ConnectionFault(_)
        )
    }

    /// The single-line reply sent to the peer for recoverable failures.
    /// Fatal errors have no wire representation; the connection is closed.
    pub fn wire_reply(&self) -> Option<String> {
        match self {
            Error::Protocol(reason) => Some(format!("ERR {}", reason)),
            Error::NotFound(_) => Some("ERR File not found".to_string()),
            Error::BackendUnavailable(msg) => Some(format!("ERR {}", msg)),
            Error::TransferIncomplete(_) | Error::ConnectionFault(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_reply_mapping() {
        assert_eq!(
            Error::protocol("Unknown command").wire_reply().as_deref(),
            Some("ERR Unknown command")
        );
        assert_eq!(
            Error::not_found("missing.bin").wire_reply().as_deref(),
            Some("ERR File not found")
        );
        assert_eq!(
            Error::backend("S3 list error: timed out")
                .wire_reply()
                .as_deref(),
            Some("ERR S3 list error: timed out")
        );
        assert!(Error::incomplete("peer closed").wire_reply().is_none());
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe");
        assert!(Error::ConnectionFault(io).wire_reply().is_none());
    }

    #[test]
    fn fatality_classification() {
        assert!(!Error::protocol("Invalid filesize").is_fatal());
        assert!(!Error::not_found("x").is_fatal());
        assert!(!Error::backend("unreachable").is_fatal());
        assert!(Error::incomplete("200 of 1000 bytes").is_fatal());
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        assert!(Error::ConnectionFault(io).is_fatal());
    }
}
