//! Error types for the reactor and MySQL connector, at each component boundary.

use miette::Diagnostic;
use thiserror::Error;

/// Errors raised by the event loop / poller / timer service.
///
/// `DuplicateLoopInThread` and `WrongThreadRun` are never returned to a
/// caller: they correspond to the two configuration-fatal cases in
/// spec.md §7, and `EventLoop::new()`/`assert_in_loop_thread()` log one of
/// these (via its `Display` impl) and call `std::process::abort()`
/// directly rather than propagate a `Result`. The variants still exist so
/// that log line has a typed, diagnosable message (see
/// [`ReactorError::is_fatal`]).
#[derive(Debug, Error, Diagnostic)]
pub enum ReactorError {
    #[error("an EventLoop is already registered on this thread")]
    #[diagnostic(
        code(reactor_mysql::duplicate_loop_in_thread),
        help("each OS thread may host at most one EventLoop; construct the second loop on a different thread")
    )]
    DuplicateLoopInThread,

    #[error("EventLoop::run() called from a thread that does not own it")]
    #[diagnostic(
        code(reactor_mysql::wrong_thread_run),
        help("run the loop only from the thread it was constructed on, or move it first with move_to_current_thread()")
    )]
    WrongThreadRun,

    #[error("epoll/eventfd/timerfd syscall failed")]
    #[diagnostic(code(reactor_mysql::io))]
    Io(#[from] std::io::Error),
}

impl ReactorError {
    /// Whether this variant is one of the two configuration-fatal cases
    /// spec'd to abort the process rather than be handled as a recoverable
    /// `Result`.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ReactorError::DuplicateLoopInThread | ReactorError::WrongThreadRun
        )
    }
}

/// Errors raised while parsing a connection string (§6 grammar).
#[derive(Debug, Error, Diagnostic)]
#[error("malformed connection string at byte offset {offset}: {reason}")]
#[diagnostic(
    code(reactor_mysql::conn_string),
    help("expected `key=value` pairs separated by whitespace; quote values containing spaces")
)]
pub struct ConnStringError {
    pub offset: usize,
    pub reason: String,
}

/// Errors from the MySQL connection state machine.
#[derive(Debug, Error, Diagnostic)]
pub enum MySqlError {
    /// A query failed on the server; carries the server message and the
    /// rendered SQL that produced it (spec §4.8, §8 scenario 7).
    #[error("query failed: {message}")]
    #[diagnostic(code(reactor_mysql::query))]
    Query { message: String, sql: String },

    /// The library's batch-execution path was invoked; this connector never
    /// supports it (spec §4.8 "Batch mode").
    #[error("batch mode is not supported by this connector")]
    #[diagnostic(code(reactor_mysql::batch_mode_unsupported))]
    BatchModeUnsupported,

    /// `exec_sql` called while another query is still in flight, or while
    /// the connection is `Bad`.
    #[error("connection is not idle: {0}")]
    #[diagnostic(code(reactor_mysql::not_idle))]
    NotIdle(&'static str),

    /// `mysql_real_connect` (or the character-set handshake) failed.
    #[error("failed to connect: {0}")]
    #[diagnostic(code(reactor_mysql::connect))]
    Connect(String),
}

impl MySqlError {
    /// Server error codes `CR_SERVER_GONE_ERROR` / `CR_SERVER_LOST` signal
    /// the connection transitions to `Bad`; everything else leaves it `Ok`.
    #[must_use]
    pub fn server_gone(errno: u32) -> bool {
        const CR_SERVER_GONE_ERROR: u32 = 2006;
        const CR_SERVER_LOST: u32 = 2013;
        errno == CR_SERVER_GONE_ERROR || errno == CR_SERVER_LOST
    }
}

/// Out-of-range column/row access in a [`crate::mysql::result::ResultView`]
/// (spec §4.9, §7 "Row access out of range").
#[derive(Debug, Error, Diagnostic)]
#[error("no column named {0:?}")]
#[diagnostic(code(reactor_mysql::range))]
pub struct RangeError(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_gone_classifies_known_codes_only() {
        assert!(MySqlError::server_gone(2006));
        assert!(MySqlError::server_gone(2013));
        assert!(!MySqlError::server_gone(1064));
        assert!(!MySqlError::server_gone(0));
    }
}

/// Errors from setting up the tracing subscriber.
#[derive(Debug, Error, Diagnostic)]
pub enum LoggingError {
    #[error("failed to open log directory {path}")]
    #[diagnostic(code(reactor_mysql::log_dir))]
    LogDir {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("global tracing subscriber already set")]
    #[diagnostic(code(reactor_mysql::already_initialised))]
    AlreadyInitialised,
}
