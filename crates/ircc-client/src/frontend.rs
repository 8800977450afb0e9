//! Line-oriented terminal frontend.
//!
//! Turns raw local input into outbound [`Message`]s and received messages
//! into printed lines. It never touches the socket: outbound messages leave
//! through [`Frontend::signal_input_available`], and whoever owns the session
//! connects to it.
//!
//! # Input
//!
//! - `/<line>` sends `<line>` as a raw protocol line (`/JOIN #rust`). A join
//!   also makes the channel the active target; parting it clears the target.
//! - Anything else is sent as `PRIVMSG <active target> :<text>`.
//! - Blank lines are ignored.
//! - A line that grows past [`MAX_LINE_LEN`] without a newline is dropped
//!   with an error; input resumes after its newline.

use std::io::{self, Write};

use ircc_core::Signal;
use ircc_proto::{MAX_LINE_LEN, Message};
use tracing::{debug, warn};

use crate::responses::{Interaction, MessageHook, ResponseTable};

/// Terminal frontend writing to `W`.
pub struct Frontend<W> {
    out: W,
    /// Unterminated tail of the last input chunk
    pending: Vec<u8>,
    /// Dropping the rest of an overlong line
    skipping: bool,
    target: Option<String>,
    hooks: Vec<Box<dyn MessageHook>>,
    responses: ResponseTable,
    /// Fired with every message that should go to the server, typed by the
    /// user or produced as an automatic reply.
    pub signal_input_available: Signal<Message>,
}

impl<W: Write> Frontend<W> {
    /// Create a frontend printing to `out` with the default response table.
    pub fn new(out: W) -> Self {
        Self {
            out,
            pending: Vec::new(),
            skipping: false,
            target: None,
            hooks: Vec::new(),
            responses: ResponseTable::default(),
            signal_input_available: Signal::new(),
        }
    }

    /// Register a hook consulted before the response table, after any hooks
    /// already registered.
    pub fn add_hook(&mut self, hook: impl MessageHook + 'static) {
        self.hooks.push(Box::new(hook));
    }

    /// Channel or nick plain text is sent to.
    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    /// Output sink.
    pub fn get_ref(&self) -> &W {
        &self.out
    }

    /// Feed raw input bytes. Complete lines are handled immediately; a
    /// trailing partial line waits for more input.
    pub fn input(&mut self, mut bytes: &[u8]) -> io::Result<()> {
        if self.skipping {
            let Some(end) = bytes.iter().position(|b| *b == b'\n') else {
                return Ok(());
            };
            bytes = &bytes[end + 1..];
            self.skipping = false;
        }
        self.pending.extend_from_slice(bytes);

        while let Some(end) = self.pending.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=end).collect();
            let line = String::from_utf8_lossy(&raw);
            self.handle_line(line.trim_end_matches(['\r', '\n']))?;
        }

        if self.pending.len() > MAX_LINE_LEN {
            warn!(len = self.pending.len(), "discarding overlong input line");
            writeln!(self.out, "error: input line longer than {MAX_LINE_LEN} bytes discarded")?;
            self.pending.clear();
            self.skipping = true;
        }

        self.out.flush()
    }

    /// Handle whatever partial line is left when input ends.
    pub fn finish_input(&mut self) -> io::Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let raw = std::mem::take(&mut self.pending);
        let line = String::from_utf8_lossy(&raw);
        self.handle_line(line.trim_end_matches('\r'))?;
        self.out.flush()
    }

    /// React to a message received from the server.
    ///
    /// Hooks run first; the first one with an answer wins. Otherwise the
    /// response table decides.
    pub fn process_message(&mut self, msg: &Message) -> io::Result<()> {
        let interaction = self
            .hooks
            .iter_mut()
            .find_map(|hook| hook.handle(msg))
            .or_else(|| self.responses.respond(msg));

        match interaction {
            Some(Interaction::Print(line)) => writeln!(self.out, "{line}")?,
            Some(Interaction::Respond(reply)) => self.output(reply)?,
            None => {},
        }

        self.out.flush()
    }

    fn handle_line(&mut self, line: &str) -> io::Result<()> {
        if line.trim().is_empty() {
            return Ok(());
        }

        if let Some(raw) = line.strip_prefix('/') {
            return match Message::parse_line(raw) {
                Ok(msg) => {
                    self.track_target(&msg);
                    self.output(msg)
                },
                Err(e) => writeln!(self.out, "error: {e}"),
            };
        }

        match &self.target {
            Some(target) => {
                let msg = Message::new("PRIVMSG", [target.as_str(), line]);
                self.output(msg)
            },
            None => writeln!(self.out, "no active target; use /join <channel>"),
        }
    }

    fn track_target(&mut self, msg: &Message) {
        let Some(channel) = msg.param(0).and_then(|p| p.split(',').next()) else {
            return;
        };

        if msg.command().eq_ignore_ascii_case("JOIN") {
            debug!(channel, "active target changed");
            self.target = Some(channel.to_owned());
        } else if msg.command().eq_ignore_ascii_case("PART") && self.target.as_deref() == Some(channel)
        {
            self.target = None;
        }
    }

    /// Emit `msg` unless it cannot be sent.
    fn output(&mut self, msg: Message) -> io::Result<()> {
        if let Err(e) = msg.validate() {
            warn!(error = %e, "refusing to send");
            return writeln!(self.out, "error: {e}");
        }
        self.signal_input_available.emit(msg);
        Ok(())
    }
}
