//! Single-threaded reactor core (`original_source/event/EventLoop.{h,cpp}`).

use std::cell::{Cell, RefCell};
use std::os::fd::{AsFd, OwnedFd};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::thread::ThreadId;
use std::time::{Duration, Instant};

use rustix::event::epoll::EventFlags;
use rustix::event::{eventfd, EventfdFlags};

use crate::dispatcher::Dispatcher;
use crate::error::ReactorError;
use crate::mpsc_queue::MpscQueue;
use crate::poll::EpollPoller;
use crate::scope_guard::on_scope_exit;
use crate::timer::{Timer, TimerId};
use crate::timer_queue::{read_timerfd, reset_timerfd, TimerQueue};

/// Upper bound on a single `epoll_wait` call, matching
/// `original_source/event/EventLoop.cpp`'s `kPollTimeMs`.
const POLL_TIME_MS: i32 = 10_000;

pub type Task = Box<dyn FnOnce() + Send>;

/// Threads currently hosting an `EventLoop`, at most one loop per thread
/// (spec.md §3, §4.6). A process-wide registry rather than a
/// `thread_local` flag, because [`EventLoop::move_to_current_thread`] must
/// be able to clear the *previous* owning thread's membership from
/// whichever thread calls it.
static LOOP_THREADS: Mutex<Vec<ThreadId>> = Mutex::new(Vec::new());

fn thread_has_loop(id: ThreadId) -> bool {
    LOOP_THREADS.lock().expect("LOOP_THREADS poisoned").contains(&id)
}

fn register_loop_thread(id: ThreadId) {
    LOOP_THREADS.lock().expect("LOOP_THREADS poisoned").push(id);
}

fn unregister_loop_thread(id: ThreadId) {
    LOOP_THREADS
        .lock()
        .expect("LOOP_THREADS poisoned")
        .retain(|t| *t != id);
}

struct Inner {
    looping: AtomicBool,
    quit: AtomicBool,
    thread_id: Cell<Option<ThreadId>>,
    poller: RefCell<EpollPoller>,
    active_dispatchers: RefCell<Vec<Rc<RefCell<Dispatcher>>>>,
    tasks: MpscQueue<Task>,
    tasks_on_quit: MpscQueue<Task>,
    calling_tasks: Cell<bool>,
    wakeup_fd: OwnedFd,
    wakeup_dispatcher: RefCell<Option<Rc<RefCell<Dispatcher>>>>,
    timer_queue: RefCell<TimerQueue>,
    timer_dispatcher: RefCell<Option<Rc<RefCell<Dispatcher>>>>,
    self_weak: RefCell<Weak<Inner>>,
}

// SAFETY: every field above is only ever read or mutated from the thread
// that owns the loop, enforced at runtime by `LOOP_IN_THIS_THREAD` /
// `assert_in_loop_thread()` — the same invariant the source upholds with a
// raw `EventLoop*` plus `assertInLoopThread()` rather than the type system.
// `Inner` is shared across threads only as the handle inside `Arc<Inner>`
// (so a non-loop thread can call `queue_in_loop`/`run_at`/... to hand work
// to the owning thread); it is never dereferenced for its `RefCell`-guarded
// fields anywhere but on the loop thread itself.
unsafe impl Send for Inner {}
unsafe impl Sync for Inner {}

/// Owns the poller, timer service, wakeup channel, and task queue for one
/// OS thread; runs the reactor and enforces thread affinity (spec.md §3,
/// §4.6).
#[derive(Clone)]
pub struct EventLoop(Arc<Inner>);

impl EventLoop {
    /// Constructs a new loop. Aborts the process (after logging) if one
    /// already exists on this thread, matching
    /// `original_source/event/EventLoop.cpp`'s constructor (`exit(-1)`) —
    /// spec.md §7 "configuration fatal" names this one of the three cases
    /// that abort rather than return a recoverable error.
    ///
    /// # Errors
    /// Returns `ReactorError::Io` if an epoll/eventfd/timerfd syscall fails.
    pub fn new() -> Result<Self, ReactorError> {
        let current = std::thread::current().id();
        if thread_has_loop(current) {
            tracing::error!(error = %ReactorError::DuplicateLoopInThread, "EventLoop::new");
            std::process::abort();
        }
        let wakeup_fd = eventfd(0, EventfdFlags::NONBLOCK | EventfdFlags::CLOEXEC)
            .map_err(std::io::Error::from)?;
        let poller = EpollPoller::new()?;
        let timer_queue = TimerQueue::new()?;

        let inner = Arc::new_cyclic(|weak: &Weak<Inner>| Inner {
            looping: AtomicBool::new(false),
            quit: AtomicBool::new(false),
            thread_id: Cell::new(Some(std::thread::current().id())),
            poller: RefCell::new(poller),
            active_dispatchers: RefCell::new(Vec::new()),
            tasks: MpscQueue::new(),
            tasks_on_quit: MpscQueue::new(),
            calling_tasks: Cell::new(false),
            wakeup_fd,
            wakeup_dispatcher: RefCell::new(None),
            timer_queue: RefCell::new(timer_queue),
            timer_dispatcher: RefCell::new(None),
            self_weak: RefCell::new(weak.clone()),
        });
        register_loop_thread(current);

        let loop_ = EventLoop(inner);
        loop_.install_wakeup_dispatcher();
        loop_.install_timer_dispatcher();
        Ok(loop_)
    }

    fn install_wakeup_dispatcher(&self) {
        let fd = self.0.wakeup_fd.as_fd();
        let raw_fd = rustix::fd::AsRawFd::as_raw_fd(&fd);
        let dispatcher = Rc::new(RefCell::new(Dispatcher::new(raw_fd)));
        let weak = self.0.self_weak.borrow().clone();
        dispatcher.borrow_mut().set_read_callback(move || {
            if let Some(inner) = weak.upgrade() {
                EventLoop(inner).wakeup_read();
            }
        });
        dispatcher.borrow_mut().set_interest(EventFlags::IN);
        self.0.poller.borrow_mut().register(&dispatcher);
        *self.0.wakeup_dispatcher.borrow_mut() = Some(dispatcher);
    }

    fn install_timer_dispatcher(&self) {
        let raw_fd = {
            let tq = self.0.timer_queue.borrow();
            rustix::fd::AsRawFd::as_raw_fd(&tq.timerfd().as_fd())
        };
        let dispatcher = Rc::new(RefCell::new(Dispatcher::new(raw_fd)));
        let weak = self.0.self_weak.borrow().clone();
        dispatcher.borrow_mut().set_read_callback(move || {
            if let Some(inner) = weak.upgrade() {
                EventLoop(inner).handle_timer_read();
            }
        });
        dispatcher.borrow_mut().set_interest(EventFlags::IN);
        self.0.poller.borrow_mut().register(&dispatcher);
        *self.0.timer_dispatcher.borrow_mut() = Some(dispatcher);
    }

    fn wakeup(&self) {
        let tmp: u64 = 1;
        let buf = tmp.to_ne_bytes();
        let _ = rustix::io::write(&self.0.wakeup_fd, &buf);
    }

    fn wakeup_read(&self) {
        let mut buf = [0u8; 8];
        match rustix::io::read(&self.0.wakeup_fd, &mut buf) {
            Ok(n) if n == buf.len() => {
                tracing::debug!("EventLoop::wakeup_read read {n} bytes");
            }
            Ok(n) => tracing::error!(n, "EventLoop::wakeup_read short read"),
            Err(err) => {
                tracing::error!(error = %std::io::Error::from(err), "EventLoop::wakeup_read error");
            }
        }
    }

    #[must_use]
    pub fn is_in_loop_thread(&self) -> bool {
        self.0.thread_id.get() == Some(std::thread::current().id())
    }

    /// Aborts the process (after logging) if the caller is on a different
    /// thread than the one that owns this loop, matching
    /// `original_source/event/EventLoop.cpp::assertInLoopThread()`'s
    /// `abortNotInLoopThread()` (`exit(1)`) — spec.md §7 "configuration
    /// fatal" names this one of the three cases that abort rather than
    /// return a recoverable error.
    pub fn assert_in_loop_thread(&self) {
        if !self.is_in_loop_thread() {
            tracing::error!(error = %ReactorError::WrongThreadRun, "EventLoop::assertInLoopThread");
            std::process::abort();
        }
    }

    /// Moves a non-running loop to the calling thread (spec.md §4.6
    /// "Thread move"): clears the previous owning thread's registration,
    /// registers the current thread, and records the new thread identity.
    ///
    /// # Panics
    /// Aborts the process (after logging) if this loop is currently
    /// running, or if the calling thread already hosts a different
    /// `EventLoop`.
    pub fn move_to_current_thread(&self) {
        assert!(
            !self.is_running(),
            "EventLoop::move_to_current_thread: loop is running"
        );
        let current = std::thread::current().id();
        let previous = self.0.thread_id.get();
        if previous != Some(current) && thread_has_loop(current) {
            tracing::error!(error = %ReactorError::DuplicateLoopInThread, "EventLoop::move_to_current_thread");
            std::process::abort();
        }
        if let Some(previous) = previous {
            unregister_loop_thread(previous);
        }
        register_loop_thread(current);
        self.0.thread_id.set(Some(current));
    }

    #[must_use]
    pub fn poller(&self) -> &RefCell<EpollPoller> {
        &self.0.poller
    }

    /// Registers (or re-registers) `dispatcher`'s current interest with
    /// the poller.
    pub fn update_dispatcher(&self, dispatcher: &Rc<RefCell<Dispatcher>>) {
        self.0.poller.borrow_mut().register(dispatcher);
    }

    pub fn enable_reading(&self, dispatcher: &Rc<RefCell<Dispatcher>>) {
        let interest = dispatcher.borrow().interest() | EventFlags::IN;
        dispatcher.borrow_mut().set_interest(interest);
        self.update_dispatcher(dispatcher);
    }

    pub fn disable_reading(&self, dispatcher: &Rc<RefCell<Dispatcher>>) {
        let interest = dispatcher.borrow().interest() & !EventFlags::IN;
        dispatcher.borrow_mut().set_interest(interest);
        self.update_dispatcher(dispatcher);
    }

    pub fn enable_writing(&self, dispatcher: &Rc<RefCell<Dispatcher>>) {
        let interest = dispatcher.borrow().interest() | EventFlags::OUT;
        dispatcher.borrow_mut().set_interest(interest);
        self.update_dispatcher(dispatcher);
    }

    pub fn disable_writing(&self, dispatcher: &Rc<RefCell<Dispatcher>>) {
        let interest = dispatcher.borrow().interest() & !EventFlags::OUT;
        dispatcher.borrow_mut().set_interest(interest);
        self.update_dispatcher(dispatcher);
    }

    pub fn disable_all(&self, dispatcher: &Rc<RefCell<Dispatcher>>) {
        dispatcher.borrow_mut().set_interest(EventFlags::empty());
        self.update_dispatcher(dispatcher);
    }

    pub fn remove_dispatcher(&self, dispatcher: &Rc<RefCell<Dispatcher>>) {
        self.0.poller.borrow_mut().remove(dispatcher);
    }

    /// Runs `f` synchronously if already on the loop thread; otherwise
    /// enqueues it.
    pub fn run_in_loop(&self, f: impl FnOnce() + Send + 'static) {
        if self.is_in_loop_thread() {
            f();
        } else {
            self.queue_in_loop(f);
        }
    }

    /// Enqueues `f`, waking the loop if the caller is off-thread or the
    /// loop is not currently looping (spec.md §4.6 "Cross-thread
    /// submission").
    pub fn queue_in_loop(&self, f: impl FnOnce() + Send + 'static) {
        self.0.tasks.enqueue(Box::new(f));
        if !self.is_in_loop_thread() || !self.0.looping.load(Ordering::Acquire) {
            self.wakeup();
        }
    }

    /// Registers a task to run once, after the loop has exited, in FIFO
    /// order with other on-quit tasks.
    pub fn run_on_quit(&self, f: impl FnOnce() + Send + 'static) {
        self.0.tasks_on_quit.enqueue(Box::new(f));
    }

    /// Drains the task queue, catching any panic rather than resuming it —
    /// the caller defers rethrowing until after the loop has torn down
    /// (spec.md §4.6 "the exception is rethrown after the loop tears down",
    /// same deferral `run()` already gives dispatcher-callback panics).
    fn do_run_in_loop_tasks(&self) -> Option<Box<dyn std::any::Any + Send>> {
        self.0.calling_tasks.set(true);
        let calling = &self.0.calling_tasks;
        let _guard = on_scope_exit(|| calling.set(false));

        let mut first_panic: Option<Box<dyn std::any::Any + Send>> = None;
        while !self.0.tasks.is_empty() {
            while let Some(task) = self.0.tasks.dequeue() {
                let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(task));
                if let Err(payload) = result {
                    if first_panic.is_none() {
                        first_panic = Some(payload);
                    }
                }
            }
        }
        first_panic
    }

    /// Runs the reactor. Must be called exactly once, from the thread
    /// that owns this loop (spec.md §4.6).
    ///
    /// # Panics
    /// Aborts the process (after logging) if called from a thread other
    /// than the one that owns this loop — spec.md §7 "configuration fatal"
    /// (see [`EventLoop::assert_in_loop_thread`]). Otherwise, re-raises the
    /// first panic captured from a user callback — a dispatcher handler or
    /// a queued task — after every other queued task in that drain has
    /// still run and the loop has torn down.
    pub fn run(&self) {
        assert!(!self.0.looping.load(Ordering::Acquire), "loop() called twice");
        self.assert_in_loop_thread();
        self.0.looping.store(true, Ordering::Release);
        self.0.quit.store(false, Ordering::Release);

        let looping = &self.0.looping;
        let _guard = on_scope_exit(|| looping.store(false, Ordering::Release));

        let mut first_panic: Option<Box<dyn std::any::Any + Send>> = None;
        while !self.0.quit.load(Ordering::Acquire) {
            self.0.active_dispatchers.borrow_mut().clear();
            {
                let mut active = self.0.active_dispatchers.borrow_mut();
                let mut poller = self.0.poller.borrow_mut();
                poller.poll(POLL_TIME_MS, &mut active);
            }
            let active: Vec<_> = self.0.active_dispatchers.borrow().clone();
            for dispatcher in &active {
                let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    dispatcher.borrow_mut().handle_event();
                }));
                if let Err(payload) = result {
                    if first_panic.is_none() {
                        first_panic = Some(payload);
                    }
                }
            }
            if let Some(payload) = self.do_run_in_loop_tasks() {
                if first_panic.is_none() {
                    first_panic = Some(payload);
                }
            }
            if first_panic.is_some() {
                break;
            }
        }

        drop(_guard);
        while let Some(task) = self.0.tasks_on_quit.dequeue() {
            task();
        }
        unregister_loop_thread(std::thread::current().id());
        if let Some(payload) = first_panic {
            std::panic::resume_unwind(payload);
        }
    }

    /// Raises the quit flag; wakes the loop if called off-thread.
    pub fn quit(&self) {
        self.0.quit.store(true, Ordering::Release);
        if !self.is_in_loop_thread() {
            self.wakeup();
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.0.looping.load(Ordering::Acquire)
    }

    fn handle_timer_read(&self) {
        let now = Instant::now();
        {
            let tq = self.0.timer_queue.borrow();
            read_timerfd(tq.timerfd());
        }
        let expired = self.0.timer_queue.borrow_mut().pop_expired(now);
        let to_run: Vec<_> = expired
            .iter()
            .filter(|t| self.0.timer_queue.borrow().is_live(t.id()))
            .cloned()
            .collect();
        for timer in &to_run {
            timer.run();
        }
        self.0.timer_queue.borrow_mut().reset_after_batch(expired, now);
    }

    fn add_timer_in_loop(&self, timer: Rc<Timer>) {
        let earliest_changed = self.0.timer_queue.borrow_mut().insert(Rc::clone(&timer));
        if earliest_changed {
            let tq = self.0.timer_queue.borrow();
            reset_timerfd(tq.timerfd(), timer.when());
        }
    }

    /// Schedules `cb` to fire once at `when`. Callable from any thread.
    pub fn run_at(&self, when: Instant, cb: impl FnMut() + Send + 'static) -> TimerId {
        self.add_timer(cb, when, Duration::ZERO)
    }

    /// Schedules `cb` to fire once after `delay`.
    pub fn run_after(&self, delay: Duration, cb: impl FnMut() + Send + 'static) -> TimerId {
        self.add_timer(cb, Instant::now() + delay, Duration::ZERO)
    }

    /// Schedules `cb` to fire every `interval`, starting at `now + interval`.
    pub fn run_every(&self, interval: Duration, cb: impl FnMut() + Send + 'static) -> TimerId {
        self.add_timer(cb, Instant::now() + interval, interval)
    }

    /// Allocates the timer's ID synchronously (so it can be returned to the
    /// caller immediately, even off-thread) and defers building the actual
    /// `Timer` — which lives in a non-`Send` `Rc` — to the loop thread,
    /// either inline or via the task queue.
    fn add_timer(
        &self,
        cb: impl FnMut() + Send + 'static,
        when: Instant,
        interval: Duration,
    ) -> TimerId {
        let id = crate::timer::allocate_id();
        let this = self.clone();
        let cb: crate::timer::TimerCallback = Box::new(cb);
        let construct_and_insert = move || {
            let seq = this.0.timer_queue.borrow_mut().next_seq();
            let timer = Rc::new(Timer::with_id(id, cb, when, interval, seq));
            this.add_timer_in_loop(timer);
        };
        if self.is_in_loop_thread() {
            construct_and_insert();
        } else {
            self.0.tasks.enqueue(Box::new(construct_and_insert) as Task);
            self.wakeup();
        }
        id
    }

    /// Cancels a pending timer. Safe from any thread; takes effect at the
    /// next loop iteration.
    pub fn cancel_timer(&self, id: TimerId) {
        let this = self.clone();
        self.run_in_loop(move || this.0.timer_queue.borrow_mut().cancel(id));
    }
}

impl std::fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLoop")
            .field("looping", &self.0.looping.load(Ordering::Relaxed))
            .field("quit", &self.0.quit.load(Ordering::Relaxed))
            .finish()
    }
}
