//! Event dispatcher: per-fd interest/readiness registration and callback
//! fan-out (`original_source/event/EventDispatcher.{h,cpp}`).

use std::os::fd::RawFd;

use rustix::event::epoll::EventFlags;

/// Poller-internal registration state, matching `kNew`/`kAdded`/`kDeleted`
/// in `EpollPoller.cpp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    New,
    Added,
    Deleted,
}

type EventCallback = Box<dyn FnMut()>;

/// Per-fd interest/readiness registration and callback fan-out.
///
/// Dispatcher mutation (`enable_reading`/`disable_writing`/`remove`/...)
/// lives on [`crate::event_loop::EventLoop`] rather than on `Dispatcher`
/// itself: the original's `EventDispatcher::update()` reaches back into its
/// owning `EventLoop` through a raw pointer to reprogram the poller, and in
/// Rust that back-reference is represented by always calling through the
/// loop that owns the poller, instead of a dispatcher-held pointer cycle.
pub struct Dispatcher {
    fd: RawFd,
    interest: EventFlags,
    real_events: EventFlags,
    state: PollerState,
    read_cb: Option<EventCallback>,
    write_cb: Option<EventCallback>,
    error_cb: Option<EventCallback>,
    close_cb: Option<EventCallback>,
    /// Catch-all callback; when set, supersedes the typed dispatch
    /// entirely (used by the MySQL connection, which multiplexes read and
    /// write waits over a single state-machine handler).
    event_cb: Option<EventCallback>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(fd: RawFd) -> Self {
        Dispatcher {
            fd,
            interest: EventFlags::empty(),
            real_events: EventFlags::empty(),
            state: PollerState::New,
            read_cb: None,
            write_cb: None,
            error_cb: None,
            close_cb: None,
            event_cb: None,
        }
    }

    #[must_use]
    pub fn fd(&self) -> RawFd {
        self.fd
    }

    #[must_use]
    pub fn interest(&self) -> EventFlags {
        self.interest
    }

    pub(crate) fn set_interest(&mut self, interest: EventFlags) {
        self.interest = interest;
    }

    #[must_use]
    pub fn real_events(&self) -> EventFlags {
        self.real_events
    }

    pub(crate) fn set_real_events(&mut self, events: EventFlags) {
        self.real_events = events;
    }

    #[must_use]
    pub fn state(&self) -> PollerState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: PollerState) {
        self.state = state;
    }

    #[must_use]
    pub fn is_reading(&self) -> bool {
        self.interest.contains(EventFlags::IN)
    }

    #[must_use]
    pub fn is_writing(&self) -> bool {
        self.interest.contains(EventFlags::OUT)
    }

    #[must_use]
    pub fn is_none_event(&self) -> bool {
        self.interest.is_empty()
    }

    pub fn set_read_callback(&mut self, cb: impl FnMut() + 'static) {
        self.read_cb = Some(Box::new(cb));
    }

    pub fn set_write_callback(&mut self, cb: impl FnMut() + 'static) {
        self.write_cb = Some(Box::new(cb));
    }

    pub fn set_error_callback(&mut self, cb: impl FnMut() + 'static) {
        self.error_cb = Some(Box::new(cb));
    }

    pub fn set_close_callback(&mut self, cb: impl FnMut() + 'static) {
        self.close_cb = Some(Box::new(cb));
    }

    pub fn set_event_callback(&mut self, cb: impl FnMut() + 'static) {
        self.event_cb = Some(Box::new(cb));
    }

    /// Runs the appropriate callback(s) for `real_events()`.
    ///
    /// If a catch-all callback is set it runs alone; otherwise dispatch is:
    /// HUP-without-IN -> close; NVAL|ERR -> error; IN|PRI|RDHUP -> read;
    /// and, independently, OUT -> write (spec.md §4.4).
    pub fn handle_event(&mut self) {
        if let Some(cb) = &mut self.event_cb {
            cb();
            return;
        }
        let revents = self.real_events;
        if revents.contains(EventFlags::HUP) && !revents.contains(EventFlags::IN) {
            if let Some(cb) = &mut self.close_cb {
                cb();
            }
            return;
        }
        if revents.intersects(EventFlags::ERR) {
            if let Some(cb) = &mut self.error_cb {
                cb();
            }
            return;
        }
        if revents.intersects(EventFlags::IN | EventFlags::PRI | EventFlags::RDHUP) {
            if let Some(cb) = &mut self.read_cb {
                cb();
            }
        }
        if revents.contains(EventFlags::OUT) {
            if let Some(cb) = &mut self.write_cb {
                cb();
            }
        }
    }
}
