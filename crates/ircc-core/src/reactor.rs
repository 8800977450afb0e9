//! Single-threaded readiness reactor.
//!
//! Multiplexes a small set of descriptors with one blocking `poll(2)` per
//! [`Reactor::step`]. Each watched descriptor carries:
//!
//! - an interest callback, re-evaluated every step (never cached), so a
//!   descriptor can start asking for writability the moment it has output
//! - a "polled" [`Signal`] fired with the observed [`Readiness`]; its result
//!   says whether the descriptor should be closed
//! - a "closed" [`Signal`] fired once, after every polled handler of the step
//!   has run
//!
//! # Invariants
//!
//! - A descriptor appears at most once in the watched set. [`Reactor::add`] on
//!   a watched descriptor replaces its entry.
//!
//! - Within one step all polled handlers fire before any closed handler.
//!   Closed handlers fire in the order their descriptors were found ready.
//!
//! - Handlers may add, remove or reconfigure any descriptor (their own
//!   included) while the reactor is dispatching. A descriptor removed earlier
//!   in the step is skipped in both passes without error.
//!
//! - The reactor never closes descriptors. Releasing the underlying resource
//!   is the job of the closed handler.

use std::{cell::RefCell, collections::BTreeMap, fmt, io, mem, os::fd::RawFd, rc::Rc};

use bitflags::bitflags;
use tracing::{debug, trace};

use crate::{Signal, error::ReactorError, sys};

bitflags! {
    /// Directions a descriptor wants monitored.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Interest: u8 {
        /// Wake when data can be read
        const READABLE = 1 << 0;
        /// Wake when data can be written
        const WRITABLE = 1 << 1;
    }
}

bitflags! {
    /// Conditions observed on a descriptor.
    ///
    /// `ERROR` folds hang-up, invalid-descriptor and error conditions
    /// together. It is reported whether or not it was asked for.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Readiness: u8 {
        /// Hang-up, invalid descriptor or socket error
        const ERROR = 1 << 0;
        /// Data is available to read
        const READABLE = 1 << 1;
        /// Buffer space is available to write
        const WRITABLE = 1 << 2;
    }
}

impl Interest {
    pub(crate) fn poll_events(self) -> libc::c_short {
        let mut events = 0;
        if self.contains(Self::READABLE) {
            events |= libc::POLLIN;
        }
        if self.contains(Self::WRITABLE) {
            events |= libc::POLLOUT;
        }
        events
    }
}

impl Readiness {
    pub(crate) fn from_revents(revents: libc::c_short) -> Self {
        let mut readiness = Self::empty();
        if revents & (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) != 0 {
            readiness |= Self::ERROR;
        }
        if revents & libc::POLLIN != 0 {
            readiness |= Self::READABLE;
        }
        if revents & libc::POLLOUT != 0 {
            readiness |= Self::WRITABLE;
        }
        readiness
    }
}

type InterestFn = Rc<dyn Fn() -> Interest>;
type PolledSignal = Signal<Readiness, io::Result<bool>>;
type ClosedSignal = Signal<()>;

struct Watched {
    /// Distinguishes an entry from a later one re-added under the same fd.
    generation: u64,
    interest: InterestFn,
    polled: PolledSignal,
    closed: ClosedSignal,
}

fn polled_of(watched: &mut Watched) -> &mut PolledSignal {
    &mut watched.polled
}

fn closed_of(watched: &mut Watched) -> &mut ClosedSignal {
    &mut watched.closed
}

#[derive(Default)]
struct Table {
    entries: BTreeMap<RawFd, Watched>,
    next_generation: u64,
}

impl Table {
    fn live(&mut self, fd: RawFd, generation: u64) -> Option<&mut Watched> {
        self.entries.get_mut(&fd).filter(|w| w.generation == generation)
    }

    fn get_mut(&mut self, fd: RawFd) -> Result<&mut Watched, ReactorError> {
        self.entries.get_mut(&fd).ok_or(ReactorError::NotWatched(fd))
    }
}

/// Handle to the watched-descriptor table.
///
/// Clones share the same table, so a handler can hold its own handle and
/// mutate the watched set while the reactor is dispatching.
#[derive(Clone, Default)]
pub struct Reactor {
    table: Rc<RefCell<Table>>,
}

impl Reactor {
    /// Create a reactor watching nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start watching `fd` with no interest and no handlers.
    ///
    /// Replaces any existing entry for `fd`.
    pub fn add(&self, fd: RawFd) {
        let mut table = self.table.borrow_mut();
        let generation = table.next_generation;
        table.next_generation += 1;

        let previous = table.entries.insert(
            fd,
            Watched {
                generation,
                interest: Rc::new(Interest::empty),
                polled: Signal::new(),
                closed: Signal::new(),
            },
        );
        debug!(fd, replaced = previous.is_some(), "watching descriptor");
    }

    /// Stop watching `fd`. No-op if it is not watched. Handlers are dropped
    /// without firing.
    pub fn remove(&self, fd: RawFd) {
        if self.table.borrow_mut().entries.remove(&fd).is_some() {
            debug!(fd, "descriptor removed");
        }
    }

    /// Replace the interest callback of `fd`.
    ///
    /// # Errors
    ///
    /// - `ReactorError::NotWatched` if `fd` is not in the watched set
    pub fn set_interest(
        &self,
        fd: RawFd,
        interest: impl Fn() -> Interest + 'static,
    ) -> Result<(), ReactorError> {
        self.table.borrow_mut().get_mut(fd)?.interest = Rc::new(interest);
        Ok(())
    }

    /// Connect a handler to the "polled" event of `fd`.
    ///
    /// The handler receives the observed readiness and returns `Ok(true)` to
    /// request that `fd` be closed at the end of the step. Returning `Err`
    /// aborts the step.
    ///
    /// Only the last connected handler's result is used.
    pub fn connect_polled(
        &self,
        fd: RawFd,
        handler: impl FnMut(Readiness) -> io::Result<bool> + 'static,
    ) -> Result<(), ReactorError> {
        self.table.borrow_mut().get_mut(fd)?.polled.connect(handler);
        Ok(())
    }

    /// Connect a handler to the "closed" event of `fd`.
    pub fn connect_closed(
        &self,
        fd: RawFd,
        handler: impl FnMut(()) + 'static,
    ) -> Result<(), ReactorError> {
        self.table.borrow_mut().get_mut(fd)?.closed.connect(handler);
        Ok(())
    }

    /// True if `fd` is in the watched set.
    pub fn contains(&self, fd: RawFd) -> bool {
        self.table.borrow().entries.contains_key(&fd)
    }

    /// Number of watched descriptors.
    pub fn len(&self) -> usize {
        self.table.borrow().entries.len()
    }

    /// True if nothing is watched.
    pub fn is_empty(&self) -> bool {
        self.table.borrow().entries.is_empty()
    }

    /// Run one poll-and-dispatch iteration.
    ///
    /// Blocks until at least one watched descriptor is ready. Returns
    /// immediately if nothing is watched.
    ///
    /// # Errors
    ///
    /// - `ReactorError::Poll` if `poll(2)` fails (other than `EINTR`, which is
    ///   retried)
    /// - `ReactorError::Handler` if a polled handler returns `Err`. Closes
    ///   queued earlier in the step are not fired.
    pub fn step(&self) -> Result<(), ReactorError> {
        let requests: Vec<(RawFd, u64, InterestFn)> = self
            .table
            .borrow()
            .entries
            .iter()
            .map(|(fd, w)| (*fd, w.generation, Rc::clone(&w.interest)))
            .collect();
        if requests.is_empty() {
            return Ok(());
        }

        // Interest callbacks run with the table unborrowed
        let mut fds: Vec<libc::pollfd> = requests
            .iter()
            .map(|(fd, _, interest)| sys::pollfd(*fd, interest().poll_events()))
            .collect();

        let ready = sys::poll(&mut fds, sys::INFINITE).map_err(ReactorError::Poll)?;
        trace!(watched = fds.len(), ready, "poll returned");

        let mut closing = Vec::new();
        for (pfd, (fd, generation, _)) in fds.iter().zip(&requests) {
            if pfd.revents == 0 {
                continue;
            }
            let readiness = Readiness::from_revents(pfd.revents);

            let Some(mut polled) = self.detach(*fd, *generation, polled_of) else {
                trace!(fd, "skipping descriptor removed during dispatch");
                continue;
            };
            trace!(fd, ?readiness, "dispatching");
            let result = polled.emit(readiness);
            self.reattach(*fd, *generation, polled, polled_of);

            match result {
                Some(Ok(true)) => closing.push((*fd, *generation)),
                Some(Ok(false)) | None => {},
                Some(Err(source)) => return Err(ReactorError::Handler { fd: *fd, source }),
            }
        }

        for (fd, generation) in closing {
            let Some(mut closed) = self.detach(fd, generation, closed_of) else {
                trace!(fd, "descriptor already removed before close");
                continue;
            };
            debug!(fd, "closing descriptor");
            closed.emit(());

            let mut table = self.table.borrow_mut();
            if table.live(fd, generation).is_some() {
                table.entries.remove(&fd);
            }
        }

        Ok(())
    }

    /// Step until the watched set is empty.
    pub fn run(&self) -> Result<(), ReactorError> {
        debug!(watched = self.len(), "reactor running");
        while !self.is_empty() {
            self.step()?;
        }
        debug!("watched set empty, reactor stopped");
        Ok(())
    }

    /// Take a signal out of the table so its handlers can reach the reactor.
    fn detach<A, R>(
        &self,
        fd: RawFd,
        generation: u64,
        field: fn(&mut Watched) -> &mut Signal<A, R>,
    ) -> Option<Signal<A, R>> {
        let mut table = self.table.borrow_mut();
        let watched = table.live(fd, generation)?;
        Some(mem::take(field(watched)))
    }

    /// Put a detached signal back, keeping handlers connected meanwhile.
    fn reattach<A, R>(
        &self,
        fd: RawFd,
        generation: u64,
        signal: Signal<A, R>,
        field: fn(&mut Watched) -> &mut Signal<A, R>,
    ) {
        let mut table = self.table.borrow_mut();
        if let Some(watched) = table.live(fd, generation) {
            let slot = field(watched);
            let connected_meanwhile = mem::replace(slot, signal);
            slot.append(connected_meanwhile);
        }
    }
}

impl fmt::Debug for Reactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = self.table.borrow();
        f.debug_struct("Reactor").field("watched", &table.entries.keys().collect::<Vec<_>>()).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        cell::Cell,
        io::{Read, Write},
        os::{fd::AsRawFd, unix::net::UnixStream},
    };

    use super::*;

    #[test]
    fn translate_revents() {
        assert_eq!(Readiness::from_revents(libc::POLLIN), Readiness::READABLE);
        assert_eq!(Readiness::from_revents(libc::POLLOUT), Readiness::WRITABLE);
        assert_eq!(Readiness::from_revents(libc::POLLHUP), Readiness::ERROR);
        assert_eq!(Readiness::from_revents(libc::POLLNVAL), Readiness::ERROR);
        assert_eq!(
            Readiness::from_revents(libc::POLLIN | libc::POLLERR),
            Readiness::READABLE | Readiness::ERROR
        );
        assert_eq!(Readiness::from_revents(0), Readiness::empty());
    }

    #[test]
    fn interest_to_events() {
        assert_eq!(Interest::empty().poll_events(), 0);
        assert_eq!(Interest::READABLE.poll_events(), libc::POLLIN);
        assert_eq!((Interest::READABLE | Interest::WRITABLE).poll_events(), libc::POLLIN | libc::POLLOUT);
    }

    #[test]
    fn add_remove_contains() {
        let reactor = Reactor::new();
        assert!(reactor.is_empty());

        reactor.add(7);
        reactor.add(7);
        assert_eq!(reactor.len(), 1);
        assert!(reactor.contains(7));

        reactor.remove(7);
        reactor.remove(7);
        assert!(!reactor.contains(7));
    }

    #[test]
    fn unwatched_descriptor_is_an_error() {
        let reactor = Reactor::new();

        assert!(matches!(
            reactor.set_interest(3, || Interest::READABLE),
            Err(ReactorError::NotWatched(3))
        ));
        assert!(matches!(reactor.connect_polled(3, |_| Ok(false)), Err(ReactorError::NotWatched(3))));
        assert!(matches!(reactor.connect_closed(3, |()| {}), Err(ReactorError::NotWatched(3))));
    }

    #[test]
    fn step_on_empty_set_returns() {
        Reactor::new().step().unwrap();
        Reactor::new().run().unwrap();
    }

    #[test]
    fn readable_fires_polled_then_close_request_fires_closed() {
        let (mut peer, local) = UnixStream::pair().unwrap();
        let fd = local.as_raw_fd();
        let reactor = Reactor::new();

        let seen = Rc::new(RefCell::new(Vec::new()));
        let closed = Rc::new(Cell::new(0));

        reactor.add(fd);
        reactor.set_interest(fd, || Interest::READABLE).unwrap();
        let s = Rc::clone(&seen);
        let mut local = local;
        reactor
            .connect_polled(fd, move |readiness| {
                s.borrow_mut().push(readiness);
                let mut buf = [0u8; 16];
                let n = local.read(&mut buf)?;
                Ok(n == 0)
            })
            .unwrap();
        let c = Rc::clone(&closed);
        reactor.connect_closed(fd, move |()| c.set(c.get() + 1)).unwrap();

        peer.write_all(b"hi").unwrap();
        reactor.step().unwrap();
        assert_eq!(*seen.borrow(), [Readiness::READABLE]);
        assert_eq!(closed.get(), 0);
        assert!(reactor.contains(fd));

        drop(peer);
        reactor.run().unwrap();
        assert_eq!(closed.get(), 1);
        assert!(reactor.is_empty());
    }

    #[test]
    fn interest_is_requeried_every_step() {
        let (_peer, local) = UnixStream::pair().unwrap();
        let fd = local.as_raw_fd();
        let reactor = Reactor::new();

        let want_write = Rc::new(Cell::new(true));
        let queries = Rc::new(Cell::new(0));

        reactor.add(fd);
        let (w, q) = (Rc::clone(&want_write), Rc::clone(&queries));
        reactor
            .set_interest(fd, move || {
                q.set(q.get() + 1);
                if w.get() { Interest::READABLE | Interest::WRITABLE } else { Interest::READABLE }
            })
            .unwrap();

        let w = Rc::clone(&want_write);
        reactor
            .connect_polled(fd, move |readiness| {
                assert!(readiness.contains(Readiness::WRITABLE));
                w.set(false);
                Ok(true)
            })
            .unwrap();

        reactor.step().unwrap();
        assert_eq!(queries.get(), 1);
        assert!(!want_write.get());
        assert!(reactor.is_empty());
    }

    #[test]
    fn hangup_reported_without_interest() {
        let (peer, local) = UnixStream::pair().unwrap();
        let fd = local.as_raw_fd();
        let reactor = Reactor::new();

        let seen = Rc::new(Cell::new(Readiness::empty()));
        reactor.add(fd);
        let s = Rc::clone(&seen);
        reactor
            .connect_polled(fd, move |readiness| {
                s.set(readiness);
                Ok(true)
            })
            .unwrap();

        drop(peer);
        reactor.step().unwrap();
        assert!(seen.get().contains(Readiness::ERROR));
    }

    #[test]
    fn handler_error_aborts_step() {
        let (_peer, local) = UnixStream::pair().unwrap();
        let fd = local.as_raw_fd();
        let reactor = Reactor::new();

        reactor.add(fd);
        reactor.set_interest(fd, || Interest::WRITABLE).unwrap();
        reactor.connect_polled(fd, |_| Err(io::Error::other("boom"))).unwrap();

        let err = reactor.step().unwrap_err();
        assert!(matches!(err, ReactorError::Handler { fd: failed, .. } if failed == fd));
        assert!(reactor.contains(fd));
    }

    #[test]
    fn handler_may_connect_during_dispatch() {
        let (_peer, local) = UnixStream::pair().unwrap();
        let fd = local.as_raw_fd();
        let reactor = Reactor::new();
        let hits = Rc::new(Cell::new(0));

        reactor.add(fd);
        reactor.set_interest(fd, || Interest::WRITABLE).unwrap();

        let handle = reactor.clone();
        let h = Rc::clone(&hits);
        let mut connected = false;
        reactor
            .connect_polled(fd, move |_| {
                if !connected {
                    connected = true;
                    let h = Rc::clone(&h);
                    handle
                        .connect_polled(fd, move |_| {
                            h.set(h.get() + 1);
                            Ok(false)
                        })
                        .map_err(io::Error::other)?;
                }
                Ok(false)
            })
            .unwrap();

        reactor.step().unwrap();
        assert_eq!(hits.get(), 0);

        reactor.step().unwrap();
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn handler_may_remove_itself() {
        let (_peer, local) = UnixStream::pair().unwrap();
        let fd = local.as_raw_fd();
        let reactor = Reactor::new();
        let closed = Rc::new(Cell::new(false));

        reactor.add(fd);
        reactor.set_interest(fd, || Interest::WRITABLE).unwrap();
        let handle = reactor.clone();
        reactor
            .connect_polled(fd, move |_| {
                handle.remove(fd);
                Ok(true)
            })
            .unwrap();
        let c = Rc::clone(&closed);
        reactor.connect_closed(fd, move |()| c.set(true)).unwrap();

        reactor.step().unwrap();
        assert!(reactor.is_empty());
        assert!(!closed.get());
    }
}
