//! Command-response table.
//!
//! Maps a received command to what the client does about it: print a line
//! for the user, answer the server, or nothing. The table is data, not code
//! paths, so neither the codec nor the reactor knows which commands exist.
//!
//! Numeric replies are handled by a single rule: print the code and every
//! parameter after the first (the first is always our own nick).

use std::collections::HashMap;

use ircc_proto::{Command, Message};

/// Name reported in `RPL_VERSION`.
pub const CLIENT_NAME: &str = "ircc";

/// Numeric code of `RPL_VERSION`.
pub const RPL_VERSION: u16 = 351;

/// What to do about a received message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interaction {
    /// Send this message to the server
    Respond(Message),
    /// Show this line to the user
    Print(String),
}

/// Per-message customization point, consulted before the table.
///
/// The first hook returning `Some` decides the interaction.
pub trait MessageHook {
    /// Decide what to do about `msg`, or `None` to defer.
    fn handle(&mut self, msg: &Message) -> Option<Interaction>;
}

impl<F> MessageHook for F
where
    F: FnMut(&Message) -> Option<Interaction>,
{
    fn handle(&mut self, msg: &Message) -> Option<Interaction> {
        self(msg)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Handler {
    Pong,
    Privmsg,
    Notice,
    Join,
    Part,
    Nick,
    Quit,
    Error,
    Cap,
    Version,
    /// Bookkeeping the user never needs to see
    Silent,
}

/// Verb-to-handler lookup.
#[derive(Debug, Clone)]
pub struct ResponseTable {
    handlers: HashMap<&'static str, Handler>,
}

impl Default for ResponseTable {
    fn default() -> Self {
        let handlers = [
            ("PING", Handler::Pong),
            ("PRIVMSG", Handler::Privmsg),
            ("NOTICE", Handler::Notice),
            ("JOIN", Handler::Join),
            ("PART", Handler::Part),
            ("QUIT", Handler::Quit),
            ("ERROR", Handler::Error),
            ("CAP", Handler::Cap),
            ("VERSION", Handler::Version),
            ("NICK", Handler::Nick),
            ("PONG", Handler::Silent),
        ];
        Self { handlers: handlers.into_iter().collect() }
    }
}

impl ResponseTable {
    /// Look up the interaction for `msg`.
    ///
    /// Verbs are matched case-insensitively. Unknown verbs print the raw line.
    pub fn respond(&self, msg: &Message) -> Option<Interaction> {
        if let Command::Numeric(code) = msg.kind() {
            let rest = msg.params().get(1..).unwrap_or_default().join(" ");
            return Some(Interaction::Print(format!("[{code:03}] {rest}")));
        }

        let verb = msg.command().to_ascii_uppercase();
        match self.handlers.get(verb.as_str()) {
            Some(handler) => handler.apply(msg),
            None => Some(Interaction::Print(msg.to_string())),
        }
    }
}

impl Handler {
    fn apply(self, msg: &Message) -> Option<Interaction> {
        let nick = msg.nick().unwrap_or("*");
        let text = msg.trailing().unwrap_or_default();

        let print = |line: String| Some(Interaction::Print(line));
        match self {
            Self::Pong => {
                let reply = Message::new("PONG", msg.params().iter().take(1).cloned());
                Some(Interaction::Respond(reply))
            },
            Self::Privmsg => match msg.param(0) {
                Some(target) if msg.params().len() > 1 && is_channel(target) => {
                    print(format!("[{target}] <{nick}> {text}"))
                },
                _ => print(format!("<{nick}> {text}")),
            },
            Self::Notice if text.is_empty() => None,
            Self::Notice => print(format!("-notice- {text}")),
            Self::Join => print(format!("* {nick} joined {}", msg.param(0).unwrap_or_default())),
            Self::Part => print(format!("* {nick} left {}", msg.param(0).unwrap_or_default())),
            Self::Nick => print(format!("* {nick} is now known as {text}")),
            Self::Quit => print(format!("* {nick} quit ({text})")),
            Self::Error => print(format!("error: {text}")),
            Self::Cap => match msg.param(1) {
                Some("LS") => print(format!("capabilities: {text}")),
                _ => None,
            },
            Self::Version => {
                let version = env!("CARGO_PKG_VERSION");
                let reply = Message::new(RPL_VERSION.to_string(), [version, CLIENT_NAME]);
                Some(Interaction::Respond(reply))
            },
            Self::Silent => None,
        }
    }
}

fn is_channel(target: &str) -> bool {
    target.starts_with(['#', '&', '+', '!'])
}
