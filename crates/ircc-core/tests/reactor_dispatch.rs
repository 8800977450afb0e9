//! Reactor dispatch against real sockets
//!
//! Handlers that tear down other descriptors mid-step are the case the
//! reactor exists to get right. These tests drive it with socket pairs so
//! every readiness bit comes from the kernel.

use std::{
    cell::RefCell,
    io::Write,
    os::{
        fd::{AsRawFd, RawFd},
        unix::net::UnixStream,
    },
    rc::Rc,
};

use ircc_core::{Interest, Reactor, Readiness};

type Log = Rc<RefCell<Vec<String>>>;

/// Watch `fd` for reads, log every event, and request close when polled.
fn watch_closing(reactor: &Reactor, fd: RawFd, name: &'static str, log: &Log) {
    reactor.add(fd);
    reactor.set_interest(fd, || Interest::READABLE).expect("watched");

    let l = Rc::clone(log);
    reactor
        .connect_polled(fd, move |_| {
            l.borrow_mut().push(format!("polled {name}"));
            Ok(true)
        })
        .expect("watched");

    let l = Rc::clone(log);
    reactor
        .connect_closed(fd, move |()| l.borrow_mut().push(format!("closed {name}")))
        .expect("watched");
}

/// Socket pairs `(peer, local)` sorted by local descriptor, which is the
/// order the reactor dispatches them in.
fn ordered_pairs(n: usize) -> Vec<(UnixStream, UnixStream)> {
    let mut pairs: Vec<_> = (0..n).map(|_| UnixStream::pair().expect("pair")).collect();
    pairs.sort_by_key(|(_, local)| local.as_raw_fd());
    pairs
}

#[test]
fn handler_removing_another_ready_descriptor_is_tolerated() {
    let mut pairs = ordered_pairs(3);
    let [a_fd, b_fd, c_fd] = [0, 1, 2].map(|i| pairs[i].1.as_raw_fd());

    let reactor = Reactor::new();
    let log: Log = Rc::default();

    watch_closing(&reactor, a_fd, "a", &log);
    watch_closing(&reactor, c_fd, "c", &log);

    // B tears down C as part of handling its own readiness
    reactor.add(b_fd);
    reactor.set_interest(b_fd, || Interest::READABLE).expect("watched");
    let (handle, l) = (reactor.clone(), Rc::clone(&log));
    reactor
        .connect_polled(b_fd, move |_| {
            l.borrow_mut().push("polled b".to_owned());
            handle.remove(c_fd);
            Ok(false)
        })
        .expect("watched");

    for (peer, _) in &mut pairs {
        peer.write_all(b"x").expect("write");
    }

    reactor.step().expect("step should tolerate the removed descriptor");

    let log = log.borrow();
    assert_eq!(*log, ["polled a", "polled b", "closed a"]);
    assert!(!reactor.contains(c_fd));
    assert!(reactor.contains(b_fd));
}

#[test]
fn re_added_descriptor_skips_the_rest_of_the_step() {
    let mut pairs = ordered_pairs(2);
    let [b_fd, c_fd] = [0, 1].map(|i| pairs[i].1.as_raw_fd());

    let reactor = Reactor::new();
    let log: Log = Rc::default();

    watch_closing(&reactor, c_fd, "old c", &log);

    // B replaces C's entry with fresh handlers while C is already ready
    reactor.add(b_fd);
    reactor.set_interest(b_fd, || Interest::READABLE).expect("watched");
    let (handle, l) = (reactor.clone(), Rc::clone(&log));
    reactor
        .connect_polled(b_fd, move |_| {
            l.borrow_mut().push("polled b".to_owned());
            handle.remove(c_fd);
            watch_closing(&handle, c_fd, "new c", &l);
            Ok(true)
        })
        .expect("watched");

    for (peer, _) in &mut pairs {
        peer.write_all(b"x").expect("write");
    }

    reactor.step().expect("step");
    assert_eq!(*log.borrow(), ["polled b"]);
    assert!(reactor.contains(c_fd));
    assert!(!reactor.contains(b_fd));

    // The replacement is live from the next step on
    reactor.step().expect("step");
    assert_eq!(*log.borrow(), ["polled b", "polled new c", "closed new c"]);
    assert!(reactor.is_empty());
}

#[test]
fn closed_handler_removing_dependent_descriptor() {
    let (mut sock_peer, sock) = UnixStream::pair().expect("pair");
    let (mut input_peer, input) = UnixStream::pair().expect("pair");
    let (sock_fd, input_fd) = (sock.as_raw_fd(), input.as_raw_fd());

    let reactor = Reactor::new();
    let log: Log = Rc::default();

    watch_closing(&reactor, sock_fd, "sock", &log);
    watch_closing(&reactor, input_fd, "input", &log);

    // Closing the socket also drops local input, whichever is found first
    let (handle, l) = (reactor.clone(), Rc::clone(&log));
    reactor
        .connect_closed(sock_fd, move |()| {
            l.borrow_mut().push("teardown".to_owned());
            handle.remove(input_fd);
        })
        .expect("watched");

    sock_peer.write_all(b"x").expect("write");
    input_peer.write_all(b"x").expect("write");

    reactor.run().expect("run");

    let log = log.borrow();
    let polled_both = log.iter().take(2).all(|e| e.starts_with("polled"));
    assert!(polled_both, "all polled handlers fire before closed: {log:?}");
    assert!(log.contains(&"teardown".to_owned()));
    assert!(reactor.is_empty());
}

#[test]
fn closed_fires_in_readiness_order() {
    let pairs: Vec<(UnixStream, UnixStream)> =
        (0..3).map(|_| UnixStream::pair().expect("pair")).collect();

    let reactor = Reactor::new();
    let log: Log = Rc::default();
    let names = ["first", "second", "third"];

    for ((_, local), name) in pairs.iter().zip(names) {
        watch_closing(&reactor, local.as_raw_fd(), name, &log);
    }
    for (peer, _) in &pairs {
        (&*peer).write_all(b"x").expect("write");
    }

    reactor.step().expect("step");

    let log = log.borrow();
    let polled: Vec<&str> =
        log.iter().filter_map(|e| e.strip_prefix("polled ")).collect();
    let closed: Vec<&str> =
        log.iter().filter_map(|e| e.strip_prefix("closed ")).collect();
    assert_eq!(polled, closed);
    assert_eq!(closed.len(), 3);
    assert!(reactor.is_empty());
}

#[test]
fn error_readiness_reaches_handler() {
    let (peer, local) = UnixStream::pair().expect("pair");
    let fd = local.as_raw_fd();
    let reactor = Reactor::new();
    let seen = Rc::new(RefCell::new(Readiness::empty()));

    reactor.add(fd);
    reactor.set_interest(fd, || Interest::READABLE).expect("watched");
    let s = Rc::clone(&seen);
    reactor
        .connect_polled(fd, move |readiness| {
            *s.borrow_mut() = readiness;
            Ok(true)
        })
        .expect("watched");

    drop(peer);
    reactor.run().expect("run");

    assert!(seen.borrow().contains(Readiness::ERROR));
}
