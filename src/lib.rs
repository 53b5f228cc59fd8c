//! Single-threaded reactor (epoll poller, timer heap, MPSC task queue)
//! driving a non-blocking MySQL/MariaDB client connection state machine.
//!
//! See `SPEC_FULL.md` for the module-by-module specification this crate
//! implements, and `DESIGN.md` for how each part is grounded.

pub mod conn_string;
pub mod dispatcher;
pub mod error;
pub mod event_loop;
pub mod logging;
pub mod loop_thread;
pub mod mpsc_queue;
pub mod mysql;
pub mod poll;
pub mod scope_guard;
pub mod timer;
pub mod timer_queue;

pub use dispatcher::Dispatcher;
pub use event_loop::EventLoop;
pub use loop_thread::{EventLoopThread, EventLoopThreadPool};
pub use mysql::{ConnectStatus, Connection, Param, ParamType, ResultView};
