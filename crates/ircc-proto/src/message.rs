//! Protocol message: parse from and serialize to CRLF-terminated lines.
//!
//! A [`Message`] is the unit both directions of the session deal in. Inbound
//! bytes are framed by [`Message::parse`], which consumes exactly one line
//! from the front of a buffer. Outbound messages are written by
//! [`Message::encode`] / [`Message::to_wire`], which refuse anything that
//! would not survive the trip back through the parser.

use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{
    Command,
    errors::{ProtocolError, Result},
};

/// Maximum serialized line length, terminator included.
pub const MAX_LINE_LEN: usize = 512;

/// Line terminator.
pub const TERMINATOR: &[u8; 2] = b"\r\n";

/// Structured protocol message.
///
/// Layout on the wire:
/// `[':' prefix ' '] command [' ' middle]* [' :' last] CRLF`
///
/// # Invariants
///
/// - Final parameter: the last element of `params` is the trailing parameter.
///   It may contain spaces, may be empty and may start with `:`. Serialization
///   always writes it behind ` :`, even when it contains no space.
///
/// - Middle parameters: every other element is a single non-empty token that
///   does not start with `:`. Enforced by [`Message::validate`], not by the
///   constructors.
///
/// - Size Limit: the serialized form including CRLF MUST NOT exceed
///   [`MAX_LINE_LEN`]. [`Message::encode`] rejects, never truncates.
///
/// # Security
///
/// Parsing accepts any byte sequence and never panics. Invalid UTF-8 is
/// replaced rather than rejected, so a hostile peer cannot stall the session
/// with a single bad byte. CR, LF and NUL inside any field are rejected at
/// serialization, which keeps user input from smuggling extra lines onto the
/// wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    prefix: Option<String>,
    command: String,
    params: Vec<String>,
}

impl Message {
    /// Create a message without a prefix.
    pub fn new<I>(command: impl Into<String>, params: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        Self {
            prefix: None,
            command: command.into(),
            params: params.into_iter().map(Into::into).collect(),
        }
    }

    /// Attach a sender prefix (without the leading `:`).
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Sender prefix, sigil stripped.
    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    /// Command token exactly as received or constructed.
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Command token, classified as verb or numeric reply.
    pub fn kind(&self) -> Command<'_> {
        Command::classify(&self.command)
    }

    /// All parameters, trailing parameter last.
    pub fn params(&self) -> &[String] {
        &self.params
    }

    /// Parameter at `index`, if present.
    pub fn param(&self, index: usize) -> Option<&str> {
        self.params.get(index).map(String::as_str)
    }

    /// The final parameter, if any.
    pub fn trailing(&self) -> Option<&str> {
        self.params.last().map(String::as_str)
    }

    /// Nickname portion of a `nick!user@host` prefix.
    ///
    /// Server prefixes carry no `!`; the whole prefix is returned for them.
    pub fn nick(&self) -> Option<&str> {
        let prefix = self.prefix.as_deref()?;
        prefix.split(['!', '@']).next()
    }

    /// Parse one message from the front of `buf`.
    ///
    /// On success the line and its terminator are consumed and `buf` holds
    /// only the remainder.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::Incomplete` if `buf` contains no CRLF. `buf` is left
    ///   untouched.
    /// - `ProtocolError::MissingCommand` / `ProtocolError::InvalidPrefix` if
    ///   the line is malformed. The line is still consumed, so the caller can
    ///   keep parsing what follows.
    pub fn parse(buf: &mut BytesMut) -> Result<Self> {
        let Some(end) = find_terminator(buf) else {
            return Err(ProtocolError::Incomplete { buffered: buf.len() });
        };

        let line = buf.split_to(end);
        buf.advance(TERMINATOR.len());

        Self::parse_line(&String::from_utf8_lossy(&line))
    }

    /// Parse a single line that has already been stripped of its terminator.
    ///
    /// Tokens are separated by spaces; runs of spaces count as one separator.
    /// A token starting with `:` opens the trailing parameter, which runs
    /// verbatim to the end of the line.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::MissingCommand` if no command token is present.
    /// - `ProtocolError::InvalidPrefix` if the line starts with `: `.
    pub fn parse_line(line: &str) -> Result<Self> {
        let missing = || ProtocolError::MissingCommand { line: line.to_owned() };

        let (prefix, rest) = match line.strip_prefix(':') {
            Some(after_sigil) => {
                let (prefix, rest) = after_sigil.split_once(' ').ok_or_else(missing)?;
                if prefix.is_empty() {
                    return Err(ProtocolError::InvalidPrefix { prefix: String::new() });
                }
                (Some(prefix.to_owned()), rest)
            },
            None => (None, line),
        };

        let rest = rest.trim_start_matches(' ');
        let (command, mut rest) = rest.split_once(' ').unwrap_or((rest, ""));
        if command.is_empty() {
            return Err(missing());
        }

        let mut params = Vec::new();
        loop {
            rest = rest.trim_start_matches(' ');
            if rest.is_empty() {
                break;
            }
            if let Some(trailing) = rest.strip_prefix(':') {
                params.push(trailing.to_owned());
                break;
            }
            let (param, tail) = rest.split_once(' ').unwrap_or((rest, ""));
            params.push(param.to_owned());
            rest = tail;
        }

        Ok(Self { prefix, command: command.to_owned(), params })
    }

    /// Length of the serialized line, terminator included.
    pub fn encoded_len(&self) -> usize {
        let prefix = self.prefix.as_ref().map_or(0, |p| p.len() + 2);
        let params = match self.params.split_last() {
            Some((last, middle)) => middle.iter().map(|p| p.len() + 1).sum::<usize>() + last.len() + 2,
            None => 0,
        };
        prefix + self.command.len() + params + TERMINATOR.len()
    }

    /// Check that this message serializes to a line the parser reads back
    /// unchanged.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::MessageTooLong` if the line would exceed
    ///   [`MAX_LINE_LEN`]
    /// - `ProtocolError::InvalidPrefix`, `InvalidCommand`, `InvalidParameter`
    ///   for fields that would be split or merged by the parser
    /// - `ProtocolError::InvalidCharacter` for CR, LF or NUL in any field
    pub fn validate(&self) -> Result<()> {
        let size = self.encoded_len();
        if size > MAX_LINE_LEN {
            return Err(ProtocolError::MessageTooLong { size, max: MAX_LINE_LEN });
        }

        if let Some(prefix) = &self.prefix {
            check_characters(prefix)?;
            if prefix.is_empty() || prefix.contains(' ') {
                return Err(ProtocolError::InvalidPrefix { prefix: prefix.clone() });
            }
        }

        check_characters(&self.command)?;
        if self.command.is_empty() || self.command.contains(' ') || self.command.starts_with(':') {
            return Err(ProtocolError::InvalidCommand { command: self.command.clone() });
        }

        let last = self.params.len().saturating_sub(1);
        for (index, param) in self.params.iter().enumerate() {
            check_characters(param)?;
            if index < last && (param.is_empty() || param.contains(' ') || param.starts_with(':')) {
                return Err(ProtocolError::InvalidParameter { index, param: param.clone() });
            }
        }

        Ok(())
    }

    /// Serialize into `dst`, terminator included.
    ///
    /// # Errors
    ///
    /// Any error from [`Message::validate`]. Nothing is written on error.
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<()> {
        self.validate()?;

        if let Some(prefix) = &self.prefix {
            dst.put_u8(b':');
            dst.put_slice(prefix.as_bytes());
            dst.put_u8(b' ');
        }
        dst.put_slice(self.command.as_bytes());

        if let Some((last, middle)) = self.params.split_last() {
            for param in middle {
                dst.put_u8(b' ');
                dst.put_slice(param.as_bytes());
            }
            dst.put_slice(b" :");
            dst.put_slice(last.as_bytes());
        }

        dst.put_slice(TERMINATOR);
        Ok(())
    }

    /// Serialize into a fresh buffer.
    pub fn to_wire(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode(&mut buf)?;

        debug_assert_eq!(buf.len(), self.encoded_len());
        Ok(buf.freeze())
    }
}

/// Renders the wire form without the terminator. Performs no validation.
impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(prefix) = &self.prefix {
            write!(f, ":{prefix} ")?;
        }
        f.write_str(&self.command)?;
        if let Some((last, middle)) = self.params.split_last() {
            for param in middle {
                write!(f, " {param}")?;
            }
            write!(f, " :{last}")?;
        }
        Ok(())
    }
}

fn find_terminator(buf: &[u8]) -> Option<usize> {
    buf.windows(TERMINATOR.len()).position(|window| window == TERMINATOR)
}

fn check_characters(field: &str) -> Result<()> {
    match field.bytes().find(|b| matches!(b, b'\r' | b'\n' | b'\0')) {
        Some(byte) => Err(ProtocolError::InvalidCharacter { byte }),
        None => Ok(()),
    }
}
