//! Command token classification.

/// A command token, classified.
///
/// Servers answer most requests with three-digit numeric replies; everything
/// else is a verb. The codec never case-folds, so a verb is exactly what was
/// on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    /// Three ASCII digits, e.g. `001` or `433`.
    Numeric(u16),
    /// Anything else, case preserved.
    Verb(&'a str),
}

impl<'a> Command<'a> {
    /// Classify a command token.
    pub fn classify(token: &'a str) -> Self {
        let bytes = token.as_bytes();
        if bytes.len() == 3 && bytes.iter().all(u8::is_ascii_digit) {
            let code = bytes.iter().fold(0u16, |acc, b| acc * 10 + u16::from(b - b'0'));
            Self::Numeric(code)
        } else {
            Self::Verb(token)
        }
    }

    /// Numeric code, if this is a numeric reply.
    pub fn numeric(&self) -> Option<u16> {
        match self {
            Self::Numeric(code) => Some(*code),
            Self::Verb(_) => None,
        }
    }
}
