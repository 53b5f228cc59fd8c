//! epoll wrapper: interest-mask registration and readiness delivery.
//!
//! Grounded on `original_source/poll/EpollPoller.cpp`: the `kNew`/`kAdded`/
//! `kDeleted` dispatcher-state machine, the growing events buffer (initial
//! capacity 16, doubled whenever a `poll()` call fully saturates it), and
//! `EINTR` treated as "no events" while every other error is logged and
//! does not tear the loop down.

use std::collections::HashMap;
use std::os::fd::{BorrowedFd, RawFd};
use std::rc::Rc;
use std::cell::RefCell;
use std::time::Duration;

use rustix::event::epoll::{self, EventData, EventFlags};
use rustix::io::Errno;

use crate::dispatcher::{Dispatcher, PollerState};

const INIT_EVENT_LIST_SIZE: usize = 16;

/// Owns the epoll descriptor and the fd -> dispatcher registry.
pub struct EpollPoller {
    epoll: epoll::Epoll,
    events: epoll::EventVec,
    dispatchers: HashMap<RawFd, Rc<RefCell<Dispatcher>>>,
}

impl EpollPoller {
    /// Creates a fresh epoll instance (`epoll_create1(EPOLL_CLOEXEC)`).
    ///
    /// # Errors
    /// Returns the underlying I/O error if `epoll_create1` fails.
    pub fn new() -> std::io::Result<Self> {
        let epoll = epoll::Epoll::new(epoll::CreateFlags::CLOEXEC)
            .map_err(std::io::Error::from)?;
        Ok(EpollPoller {
            epoll,
            events: epoll::EventVec::with_capacity(INIT_EVENT_LIST_SIZE),
            dispatchers: HashMap::new(),
        })
    }

    /// Waits up to `timeout_ms` for readiness, appending every ready
    /// dispatcher (with its raw readiness mask already written into it) to
    /// `active`.
    pub fn poll(&mut self, timeout_ms: i32, active: &mut Vec<Rc<RefCell<Dispatcher>>>) {
        let timeout = if timeout_ms < 0 {
            None
        } else {
            Some(Duration::from_millis(timeout_ms as u64))
        };
        match self.epoll.wait(&mut self.events, timeout) {
            Ok(()) => {
                let num_events = self.events.len();
                self.fill_active_dispatchers(active);
                if num_events == self.events.capacity() {
                    let new_cap = self.events.capacity() * 2;
                    self.events = epoll::EventVec::with_capacity(new_cap);
                }
            }
            Err(Errno::INTR) => {}
            Err(err) => {
                tracing::error!(error = %std::io::Error::from(err), "EpollPoller::poll() error");
            }
        }
    }

    fn fill_active_dispatchers(&self, active: &mut Vec<Rc<RefCell<Dispatcher>>>) {
        for event in &self.events {
            let fd = event.data.u64() as RawFd;
            if let Some(dispatcher) = self.dispatchers.get(&fd) {
                dispatcher.borrow_mut().set_real_events(event.flags);
                active.push(Rc::clone(dispatcher));
            }
        }
    }

    /// Registers the dispatcher's current interest mask with the kernel,
    /// issuing `ADD`, `MOD`, or `DEL` according to its poller state (spec
    /// §4.5).
    pub fn register(&mut self, handle: &Rc<RefCell<Dispatcher>>) {
        let (fd, state, interest, is_none) = {
            let d = handle.borrow();
            (d.fd(), d.state(), d.interest(), d.is_none_event())
        };
        let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
        match state {
            PollerState::New | PollerState::Deleted => {
                handle.borrow_mut().set_state(PollerState::Added);
                self.epoll_ctl_add(borrowed, fd, interest);
                self.dispatchers.insert(fd, Rc::clone(handle));
            }
            PollerState::Added => {
                if is_none {
                    self.epoll_ctl_del(borrowed, fd);
                    handle.borrow_mut().set_state(PollerState::Deleted);
                    self.dispatchers.remove(&fd);
                } else {
                    self.epoll_ctl_mod(borrowed, fd, interest);
                }
            }
        }
    }

    /// Removes the dispatcher from the kernel set. Requires an empty
    /// interest mask (spec §4.4 `remove`).
    pub fn remove(&mut self, handle: &Rc<RefCell<Dispatcher>>) {
        let (fd, state) = {
            let d = handle.borrow();
            debug_assert!(d.is_none_event());
            (d.fd(), d.state())
        };
        if state == PollerState::Added {
            let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
            self.epoll_ctl_del(borrowed, fd);
        }
        handle.borrow_mut().set_state(PollerState::New);
        self.dispatchers.remove(&fd);
    }

    fn epoll_ctl_add(&mut self, fd: BorrowedFd<'_>, raw_fd: RawFd, interest: EventFlags) {
        if let Err(err) = self.epoll.add(fd, EventData::new_u64(raw_fd as u64), interest) {
            tracing::error!(error = %std::io::Error::from(err), fd = raw_fd, "epoll_ctl(ADD) failed");
        }
    }

    fn epoll_ctl_mod(&mut self, fd: BorrowedFd<'_>, raw_fd: RawFd, interest: EventFlags) {
        if let Err(err) = self.epoll.modify(fd, EventData::new_u64(raw_fd as u64), interest) {
            tracing::error!(error = %std::io::Error::from(err), fd = raw_fd, "epoll_ctl(MOD) failed");
        }
    }

    fn epoll_ctl_del(&mut self, fd: BorrowedFd<'_>, raw_fd: RawFd) {
        if let Err(err) = self.epoll.delete(fd) {
            tracing::error!(error = %std::io::Error::from(err), fd = raw_fd, "epoll_ctl(DEL) failed");
        }
    }
}

impl std::fmt::Debug for EpollPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EpollPoller")
            .field("registered", &self.dispatchers.len())
            .finish()
    }
}
