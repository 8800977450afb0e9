//! Session wiring.
//!
//! Connects the pieces of one client session on a single [`Reactor`]:
//!
//! ```text
//!  server socket ── polled ──> BufferedChannel ──> SessionQueue ── received ──> Frontend
//!        ^                                              ^                          │
//!        └──────────── flush after every dispatch ──────┴──── input_available ─────┘
//!  local input ─── polled ──> Frontend::input
//! ```
//!
//! # Lifecycle
//!
//! - Start: both descriptors are watched and the login burst (`PASS`, `NICK`,
//!   `USER`) is queued.
//! - Local input ends: `QUIT :` is queued and local input stops being
//!   watched. The server answers by closing the connection.
//! - Server connection closes: the socket is shut down and local input is
//!   dropped with it, which empties the watched set and ends [`Client::run`].

use std::{
    cell::RefCell,
    fs::File,
    io::{self, Read, Stdout, Write},
    net::TcpStream,
    os::fd::{AsFd, AsRawFd, RawFd},
    rc::Rc,
};

use ircc_core::{BufferedChannel, Interest, Reactor, SessionQueue, Stream};
use ircc_proto::Message;
use tracing::{debug, info, warn};

use crate::{ClientError, Config, Frontend};

const INPUT_CHUNK: usize = 4096;

/// One connected client session.
pub struct Client<S, W> {
    reactor: Reactor,
    channel: Rc<RefCell<BufferedChannel<S>>>,
    session: Rc<SessionQueue>,
    frontend: Rc<RefCell<Frontend<W>>>,
}

impl Client<TcpStream, Stdout> {
    /// Connect to the configured server, reading input from stdin and
    /// printing to stdout.
    pub fn connect(config: &Config) -> Result<Self, ClientError> {
        let stream = TcpStream::connect((config.host.as_str(), config.port))
            .map_err(|source| ClientError::Connect { addr: config.address(), source })?;
        info!(addr = %config.address(), "connected");

        let stdin = File::from(io::stdin().as_fd().try_clone_to_owned()?);
        Self::new(stream, stdin, io::stdout(), config)
    }
}

impl<S, W> Client<S, W>
where
    S: Stream + 'static,
    W: Write + 'static,
{
    /// Wire a session over an already connected `stream`.
    ///
    /// `input` is read whenever it becomes readable; end of input quits the
    /// session.
    pub fn new<I>(stream: S, input: I, out: W, config: &Config) -> Result<Self, ClientError>
    where
        I: Read + AsRawFd + 'static,
    {
        let client = Self {
            reactor: Reactor::new(),
            channel: Rc::new(RefCell::new(BufferedChannel::new(stream)?)),
            session: Rc::new(SessionQueue::new()),
            frontend: Rc::new(RefCell::new(Frontend::new(out))),
        };

        client.wire_session();
        client.watch_socket(input.as_raw_fd())?;
        client.watch_input(input)?;
        client.login(config)?;

        Ok(client)
    }

    /// Drive the session until both the server connection and local input
    /// are gone.
    pub fn run(&self) -> Result<(), ClientError> {
        self.reactor.run()?;
        info!("session ended");
        Ok(())
    }

    /// Reactor driving this session.
    pub fn reactor(&self) -> &Reactor {
        &self.reactor
    }

    /// Message queues of this session.
    pub fn session(&self) -> &SessionQueue {
        &self.session
    }

    /// Frontend of this session.
    pub fn frontend(&self) -> &RefCell<Frontend<W>> {
        &self.frontend
    }

    /// Received messages go to the frontend; its output goes to the queue.
    fn wire_session(&self) {
        let (session, frontend) = (Rc::clone(&self.session), Rc::clone(&self.frontend));
        self.session.connect_message_received(move |()| {
            while let Some(msg) = session.pop_inbound() {
                if let Err(e) = frontend.borrow_mut().process_message(&msg) {
                    warn!(error = %e, "failed to write output");
                }
            }
        });

        let session = Rc::clone(&self.session);
        self.frontend.borrow_mut().signal_input_available.connect(move |msg| {
            if let Err(e) = session.push_outbound(msg) {
                warn!(error = %e, "dropping outbound message");
            }
        });
    }

    fn watch_socket(&self, input_fd: RawFd) -> Result<(), ClientError> {
        let fd = self.channel.borrow().fd();
        self.reactor.add(fd);

        let channel = Rc::clone(&self.channel);
        self.reactor.set_interest(fd, move || channel.borrow().interest())?;

        let (channel, session) = (Rc::clone(&self.channel), Rc::clone(&self.session));
        self.reactor.connect_polled(fd, move |_| {
            let (chunks, closed) = {
                let mut channel = channel.borrow_mut();
                channel.drain_pending()?;
                let chunks: Vec<_> = std::iter::from_fn(|| channel.pop_received()).collect();
                (chunks, channel.is_closed())
            };

            for chunk in chunks {
                session.ingest(&chunk);
            }
            flush(&session, &channel)?;
            Ok(closed)
        })?;

        let (channel, reactor) = (Rc::clone(&self.channel), self.reactor.clone());
        self.reactor.connect_closed(fd, move |()| {
            info!("server connection closed");
            if let Err(e) = channel.borrow_mut().shutdown() {
                debug!(error = %e, "socket shutdown failed");
            }
            reactor.remove(input_fd);
        })?;

        Ok(())
    }

    fn watch_input<I>(&self, mut input: I) -> Result<(), ClientError>
    where
        I: Read + AsRawFd + 'static,
    {
        let fd = input.as_raw_fd();
        self.reactor.add(fd);
        self.reactor.set_interest(fd, || Interest::READABLE)?;

        let (channel, session, frontend) =
            (Rc::clone(&self.channel), Rc::clone(&self.session), Rc::clone(&self.frontend));
        self.reactor.connect_polled(fd, move |_| {
            let mut buf = [0u8; INPUT_CHUNK];
            let n = match input.read(&mut buf) {
                Ok(n) => n,
                Err(e) if matches!(e.kind(), io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock) => {
                    return Ok(false);
                },
                Err(e) => return Err(e),
            };

            if n == 0 {
                info!("input closed, quitting");
                frontend.borrow_mut().finish_input()?;
                session.push_outbound(Message::new("QUIT", [""])).map_err(io::Error::other)?;
                flush(&session, &channel)?;
                return Ok(true);
            }

            frontend.borrow_mut().input(&buf[..n])?;
            flush(&session, &channel)?;
            Ok(false)
        })?;

        Ok(())
    }

    fn login(&self, config: &Config) -> Result<(), ClientError> {
        if !config.password.is_empty() {
            self.session.push_outbound(Message::new("PASS", [config.password.as_str()]))?;
        }
        self.session.push_outbound(Message::new("NICK", [config.username.as_str()]))?;
        self.session.push_outbound(Message::new(
            "USER",
            [config.username.as_str(), "0", "*", config.realname.as_str()],
        ))?;

        flush(&self.session, &self.channel)?;
        Ok(())
    }
}

/// Move everything queued for the server into the channel.
fn flush<S: Stream>(
    session: &SessionQueue,
    channel: &RefCell<BufferedChannel<S>>,
) -> io::Result<()> {
    let bytes = session.drain_outbound().map_err(io::Error::other)?;
    let mut channel = channel.borrow_mut();

    if channel.is_closed() {
        if !bytes.is_empty() {
            warn!(len = bytes.len(), "connection closed, dropping output");
        }
        return Ok(());
    }
    channel.enqueue_write(bytes)?;
    Ok(())
}
