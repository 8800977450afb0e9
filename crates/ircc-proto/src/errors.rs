//! Protocol error types.
//!
//! Every failure the codec can report. Framing errors ([`ProtocolError::Incomplete`])
//! mean "wait for more bytes"; everything else means the line or message is
//! malformed and must be surfaced to whoever produced it.

use thiserror::Error;

/// Result alias for codec operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors produced while parsing or serializing a [`crate::Message`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Buffer does not yet hold a CRLF-terminated line. Nothing was consumed.
    #[error("incomplete message: no terminator in {buffered} buffered bytes")]
    Incomplete {
        /// Bytes currently buffered
        buffered: usize,
    },

    /// Line has no command token. The line has been consumed.
    #[error("malformed message: missing command in {line:?}")]
    MissingCommand {
        /// Offending line, without terminator
        line: String,
    },

    /// Serialized line (terminator included) exceeds the protocol limit.
    #[error("message too long: {size} bytes (max {max})")]
    MessageTooLong {
        /// Serialized length including CRLF
        size: usize,
        /// Maximum allowed length
        max: usize,
    },

    /// Prefix is empty or contains a space.
    #[error("invalid prefix: {prefix:?}")]
    InvalidPrefix {
        /// Offending prefix
        prefix: String,
    },

    /// Command is empty, contains a space, or starts with `:`.
    #[error("invalid command: {command:?}")]
    InvalidCommand {
        /// Offending command
        command: String,
    },

    /// A non-final parameter is empty, contains a space, or starts with `:`.
    #[error("invalid parameter {index}: {param:?}")]
    InvalidParameter {
        /// Position in the parameter list
        index: usize,
        /// Offending parameter
        param: String,
    },

    /// CR, LF or NUL inside a field would break framing.
    #[error("invalid character {byte:#04x} in message")]
    InvalidCharacter {
        /// Offending byte
        byte: u8,
    },
}

impl ProtocolError {
    /// Returns true if more input may turn this into a successful parse.
    ///
    /// Only [`ProtocolError::Incomplete`] qualifies. Every other variant
    /// describes a line or message that will never become valid.
    pub fn is_incomplete(&self) -> bool {
        matches!(self, Self::Incomplete { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_incomplete_is_retryable() {
        assert!(ProtocolError::Incomplete { buffered: 3 }.is_incomplete());

        assert!(!ProtocolError::MissingCommand { line: String::new() }.is_incomplete());
        assert!(!ProtocolError::MessageTooLong { size: 513, max: 512 }.is_incomplete());
        assert!(!ProtocolError::InvalidCharacter { byte: b'\n' }.is_incomplete());
    }

    #[test]
    fn display_names_the_limit() {
        let err = ProtocolError::MessageTooLong { size: 600, max: 512 };
        assert_eq!(err.to_string(), "message too long: 600 bytes (max 512)");
    }
}
