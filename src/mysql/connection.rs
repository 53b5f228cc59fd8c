//! Non-blocking MySQL/MariaDB connection state machine
//! (`original_source/MySQLImpl/MySQLConnector.cpp`, spec.md §4.8).
//!
//! Each transition calls the matching `*_start`/`*_cont` function of the
//! nonblocking client library, receives a new wait mask back, and
//! reprograms the connection's dispatcher from it (`set_event_dispatcher`,
//! spec.md §4.8 "Dispatcher programming rule").

use std::cell::{Cell, RefCell};
use std::os::raw::c_int;
use std::rc::Rc;
use std::sync::mpsc::sync_channel;
use std::sync::{Arc, Weak};
use std::time::Duration;

use rustix::event::epoll::EventFlags;

use crate::conn_string::{self, ConnParams};
use crate::dispatcher::Dispatcher;
use crate::error::{ConnStringError, MySqlError};
use crate::event_loop::EventLoop;
use crate::mysql::params::Param;
use crate::mysql::result::ResultView;
use crate::mysql::sys;

const CONNECT_TIMEOUT_SECS: u32 = 10;

/// Mirrors `cxk::ConnectStatus` (`original_source/db/DbConnection.h`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectStatus {
    None,
    Connecting,
    SettingCharacterSet,
    Ok,
    Bad,
}

/// The query sub-state machine (spec.md §4.8 "Query sub-state machine"):
/// `Idle -> RealQuery -> StoreResult -> (NextResult -> StoreResult)* -> Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExecStatus {
    Idle,
    RealQuery,
    StoreResult,
    NextResult,
}

type OkCallback = Box<dyn FnMut(Connection)>;
type CloseCallback = Box<dyn FnMut(Connection)>;
type IdleCallback = Box<dyn FnMut(Connection)>;
// `Send` because `exec_sql` stashes these inside a `queue_in_loop` task when
// called off-thread; they only ever run on the loop thread regardless.
type ResultCallback = Box<dyn FnMut(ResultView) + Send>;
type ExceptCallback = Box<dyn FnMut(MySqlError) + Send>;

/// Carries a `MYSQL_RES*` into a `queue_in_loop` task. Sound because the
/// pointer is only ever dereferenced on the loop thread, by `get_result`,
/// the same invariant every other `mysql::sys` call in this module relies
/// on — `queue_in_loop` just defers *when* on that one thread, not *which*
/// thread.
struct SendPtr<T>(*mut T);
unsafe impl<T> Send for SendPtr<T> {}

struct Inner {
    loop_: EventLoop,
    mysql: Cell<*mut sys::MYSQL>,
    dispatcher: RefCell<Option<Rc<RefCell<Dispatcher>>>>,
    status: Cell<ConnectStatus>,
    exec_status: Cell<ExecStatus>,
    wait_status: Cell<c_int>,
    params: ConnParams,
    working: Cell<bool>,
    sql: RefCell<String>,
    ok_cb: RefCell<Option<OkCallback>>,
    close_cb: RefCell<Option<CloseCallback>>,
    idle_cb: RefCell<Option<IdleCallback>>,
    result_cb: RefCell<Option<ResultCallback>>,
    except_cb: RefCell<Option<ExceptCallback>>,
    self_weak: RefCell<Weak<Inner>>,
}

// SAFETY: every field is only read or mutated on `loop_`'s owning thread —
// `exec_sql`/`init`/`disconnect` all route through `EventLoop::run_in_loop`
// / `queue_in_loop`, which enforce that at runtime. `Connection` is `Arc`-
// wrapped only so it can be captured by the `Send` task closures those
// cross-thread entry points require, mirroring `event_loop::Inner`'s same
// justification.
unsafe impl Send for Inner {}
unsafe impl Sync for Inner {}

/// A single non-blocking connection to a MySQL/MariaDB server.
#[derive(Clone)]
pub struct Connection(Arc<Inner>);

impl Connection {
    /// Parses `conn_info` (spec.md §6 grammar) and constructs an unconnected
    /// handle. Call [`Connection::init`] to begin connecting.
    ///
    /// # Errors
    /// Returns `ConnStringError` if `conn_info` cannot be parsed.
    pub fn new(loop_: EventLoop, conn_info: &str) -> Result<Self, ConnStringError> {
        let params = conn_string::parse(conn_info)?;
        let inner = Arc::new_cyclic(|weak: &Weak<Inner>| Inner {
            loop_,
            mysql: Cell::new(std::ptr::null_mut()),
            dispatcher: RefCell::new(None),
            status: Cell::new(ConnectStatus::None),
            exec_status: Cell::new(ExecStatus::Idle),
            wait_status: Cell::new(0),
            params,
            working: Cell::new(false),
            sql: RefCell::new(String::new()),
            ok_cb: RefCell::new(None),
            close_cb: RefCell::new(None),
            idle_cb: RefCell::new(None),
            result_cb: RefCell::new(None),
            except_cb: RefCell::new(None),
            self_weak: RefCell::new(weak.clone()),
        });
        Ok(Connection(inner))
    }

    #[must_use]
    pub fn status(&self) -> ConnectStatus {
        self.0.status.get()
    }

    pub fn set_ok_callback(&self, cb: impl FnMut(Connection) + 'static) {
        *self.0.ok_cb.borrow_mut() = Some(Box::new(cb));
    }

    pub fn set_close_callback(&self, cb: impl FnMut(Connection) + 'static) {
        *self.0.close_cb.borrow_mut() = Some(Box::new(cb));
    }

    pub fn set_idle_callback(&self, cb: impl FnMut(Connection) + 'static) {
        *self.0.idle_cb.borrow_mut() = Some(Box::new(cb));
    }

    fn weak(&self) -> Weak<Inner> {
        self.0.self_weak.borrow().clone()
    }

    /// Kicks off the connection. Posted as a task to the loop (spec.md §4.8
    /// "Opening").
    pub fn init(&self) {
        let this = self.clone();
        self.0.loop_.queue_in_loop(move || this.init_in_loop());
    }

    fn init_in_loop(&self) {
        self.0.status.set(ConnectStatus::Connecting);
        tracing::info!(
            host = %self.0.params.host.as_deref().unwrap_or(""),
            user = %self.0.params.user.as_deref().unwrap_or(""),
            dbname = %self.0.params.dbname.as_deref().unwrap_or(""),
            port = self.0.params.port,
            "connecting to MySQL server"
        );

        let mysql = unsafe { sys::mysql_init(std::ptr::null_mut()) };
        self.0.mysql.set(mysql);
        unsafe {
            sys::mysql_options(mysql, sys::MYSQL_OPT_NONBLOCK, std::ptr::null());
            let reconnect: c_int = 1;
            sys::mysql_options(
                mysql,
                sys::MYSQL_OPT_RECONNECT,
                (&raw const reconnect).cast(),
            );
            let timeout = CONNECT_TIMEOUT_SECS;
            sys::mysql_options(
                mysql,
                sys::MYSQL_OPT_CONNECT_TIMEOUT,
                (&raw const timeout).cast(),
            );
            sys::mysql_options(
                mysql,
                sys::MYSQL_OPT_READ_TIMEOUT,
                (&raw const timeout).cast(),
            );
            sys::mysql_options(
                mysql,
                sys::MYSQL_OPT_WRITE_TIMEOUT,
                (&raw const timeout).cast(),
            );
        }

        let host = c_string_or_null(self.0.params.host.as_deref());
        let user = c_string_or_null(self.0.params.user.as_deref());
        let passwd = c_string_or_null(self.0.params.password.as_deref());
        let dbname = c_string_or_null(self.0.params.dbname.as_deref());

        let mut ret: *mut sys::MYSQL = std::ptr::null_mut();
        let wait_status = unsafe {
            sys::mysql_real_connect_start(
                &raw mut ret,
                mysql,
                opt_cstr_ptr(&host),
                opt_cstr_ptr(&user),
                opt_cstr_ptr(&passwd),
                opt_cstr_ptr(&dbname),
                u32::from(self.0.params.port),
                std::ptr::null(),
                0,
            )
        };
        self.0.wait_status.set(wait_status);

        if wait_status == 0 {
            let errno = unsafe { sys::mysql_errno(mysql) };
            if errno != 0 {
                tracing::error!(errno, "mysql_real_connect() failed immediately");
                self.0.status.set(ConnectStatus::Bad);
                self.fire_close();
                return;
            }
        }

        let fd = unsafe { sys::mysql_get_socket(mysql) };
        if fd < 0 {
            tracing::error!("connection with MySQL could not be established: no socket");
            self.0.status.set(ConnectStatus::Bad);
            self.fire_close();
            return;
        }
        tracing::info!(fd, "MySQL connection in progress");

        let dispatcher = Rc::new(RefCell::new(Dispatcher::new(fd)));
        let weak = self.weak();
        dispatcher.borrow_mut().set_event_callback(move || {
            if let Some(inner) = weak.upgrade() {
                Connection(inner).handle_event();
            }
        });
        *self.0.dispatcher.borrow_mut() = Some(dispatcher);
        self.set_event_dispatcher();
    }

    /// Reprograms the dispatcher from `wait_status_` (spec.md §4.8
    /// "Dispatcher programming rule").
    fn set_event_dispatcher(&self) {
        let Some(dispatcher) = self.0.dispatcher.borrow().clone() else {
            return;
        };
        let wait_status = self.0.wait_status.get();
        let loop_ = &self.0.loop_;

        if wait_status & (sys::MYSQL_WAIT_READ | sys::MYSQL_WAIT_EXCEPT) != 0 {
            if !dispatcher.borrow().is_reading() {
                loop_.enable_reading(&dispatcher);
            }
        }
        if wait_status & sys::MYSQL_WAIT_WRITE != 0 {
            if !dispatcher.borrow().is_writing() {
                loop_.enable_writing(&dispatcher);
            }
        } else if dispatcher.borrow().is_writing() {
            loop_.disable_writing(&dispatcher);
        }
        if wait_status & sys::MYSQL_WAIT_TIMEOUT != 0 {
            let timeout_secs = unsafe { sys::mysql_get_timeout_value(self.0.mysql.get()) };
            let this = self.clone();
            self.0
                .loop_
                .run_after(Duration::from_secs(u64::from(timeout_secs)), move || {
                    this.handle_timeout();
                });
        }
    }

    fn handle_timeout(&self) {
        let status = sys::MYSQL_WAIT_TIMEOUT;
        match self.0.status.get() {
            ConnectStatus::Connecting => self.continue_connect(status),
            ConnectStatus::SettingCharacterSet => self.continue_set_character_set(status),
            // Matches the source: a query-in-flight timeout is a documented
            // gap in `MySQLConnector::handleTimeout` — the next readiness
            // event still drives the query state machine forward.
            ConnectStatus::Ok | ConnectStatus::None | ConnectStatus::Bad => {}
        }
    }

    /// Dispatcher catch-all callback: translates raw readiness into the
    /// client's wait-mask encoding, ANDs it with the previously requested
    /// mask, and advances the state machine (spec.md §4.8 "On event").
    fn handle_event(&self) {
        let revents = self
            .0
            .dispatcher
            .borrow()
            .as_ref()
            .map(|d| d.borrow().real_events())
            .unwrap_or_else(EventFlags::empty);

        let mut status: c_int = 0;
        if revents.intersects(EventFlags::IN) {
            status |= sys::MYSQL_WAIT_READ;
        }
        if revents.intersects(EventFlags::OUT) {
            status |= sys::MYSQL_WAIT_WRITE;
        }
        if revents.intersects(EventFlags::PRI) {
            status |= sys::MYSQL_WAIT_EXCEPT;
        }
        status &= self.0.wait_status.get();

        match self.0.status.get() {
            ConnectStatus::Connecting => self.continue_connect(status),
            ConnectStatus::Ok => self.handle_cmd(status),
            ConnectStatus::SettingCharacterSet => self.continue_set_character_set(status),
            ConnectStatus::None | ConnectStatus::Bad => {}
        }
    }

    fn continue_connect(&self, status: c_int) {
        let mysql = self.0.mysql.get();
        let mut ret: *mut sys::MYSQL = std::ptr::null_mut();
        let wait_status = unsafe { sys::mysql_real_connect_cont(&raw mut ret, mysql, status) };
        self.0.wait_status.set(wait_status);
        if wait_status == 0 {
            let errno = unsafe { sys::mysql_errno(mysql) };
            if ret.is_null() && errno != 0 {
                tracing::error!(errno, "mysql_real_connect_cont() failed");
                self.handle_closed();
                return;
            }
            match self.0.params.client_encoding.clone() {
                Some(charset) if !charset.is_empty() => {
                    self.start_set_character_set(&charset);
                    return;
                }
                _ => {
                    self.0.status.set(ConnectStatus::Ok);
                    self.fire_ok();
                }
            }
        }
        self.set_event_dispatcher();
    }

    fn start_set_character_set(&self, charset: &str) {
        let mysql = self.0.mysql.get();
        let charset_c = std::ffi::CString::new(charset).unwrap_or_default();
        let mut err: c_int = 0;
        let wait_status =
            unsafe { sys::mysql_set_character_set_start(&raw mut err, mysql, charset_c.as_ptr()) };
        self.0.wait_status.set(wait_status);
        if wait_status == 0 {
            if err != 0 {
                tracing::error!(err, "mysql_set_character_set_start() failed");
                self.handle_closed();
                return;
            }
            self.0.status.set(ConnectStatus::Ok);
            self.fire_ok();
        } else {
            self.0.status.set(ConnectStatus::SettingCharacterSet);
        }
        self.set_event_dispatcher();
    }

    fn continue_set_character_set(&self, status: c_int) {
        let mysql = self.0.mysql.get();
        let mut err: c_int = 0;
        let wait_status =
            unsafe { sys::mysql_set_character_set_cont(&raw mut err, mysql, status) };
        self.0.wait_status.set(wait_status);
        if wait_status == 0 {
            if err != 0 {
                tracing::error!(err, "mysql_set_character_set_cont() failed");
                self.handle_closed();
                return;
            }
            self.0.status.set(ConnectStatus::Ok);
            self.fire_ok();
        }
        self.set_event_dispatcher();
    }

    fn handle_cmd(&self, status: c_int) {
        match self.0.exec_status.get() {
            ExecStatus::RealQuery => {
                let mysql = self.0.mysql.get();
                let mut err: c_int = 0;
                let wait_status =
                    unsafe { sys::mysql_real_query_cont(&raw mut err, mysql, status) };
                self.0.wait_status.set(wait_status);
                if wait_status == 0 {
                    if err != 0 {
                        self.0.exec_status.set(ExecStatus::Idle);
                        tracing::error!(err, status, "mysql_real_query_cont() failed");
                        self.output_error();
                        return;
                    }
                    self.start_store_result(false);
                }
                self.set_event_dispatcher();
            }
            ExecStatus::StoreResult => {
                let mysql = self.0.mysql.get();
                let mut ret: *mut sys::MYSQL_RES = std::ptr::null_mut();
                let wait_status =
                    unsafe { sys::mysql_store_result_cont(&raw mut ret, mysql, status) };
                self.0.wait_status.set(wait_status);
                if wait_status == 0 {
                    let errno = unsafe { sys::mysql_errno(mysql) };
                    if ret.is_null() && errno != 0 {
                        self.0.exec_status.set(ExecStatus::Idle);
                        tracing::error!(errno, "mysql_store_result_cont() failed");
                        self.output_error();
                        return;
                    }
                    self.get_result(ret);
                }
                self.set_event_dispatcher();
            }
            ExecStatus::NextResult => {
                let mysql = self.0.mysql.get();
                let mut err: c_int = 0;
                let wait_status =
                    unsafe { sys::mysql_next_result_cont(&raw mut err, mysql, status) };
                self.0.wait_status.set(wait_status);
                if wait_status == 0 {
                    if err != 0 {
                        self.0.exec_status.set(ExecStatus::Idle);
                        tracing::error!(err, status, "mysql_next_result_cont() failed");
                        self.output_error();
                        return;
                    }
                    self.start_store_result(false);
                }
                self.set_event_dispatcher();
            }
            ExecStatus::Idle => {
                // Connection closed: nothing in flight, yet the socket
                // fired and the wait mask has already drained to zero.
                if self.0.wait_status.get() == 0 {
                    self.handle_closed();
                }
            }
        }
    }

    fn handle_closed(&self) {
        self.0.loop_.assert_in_loop_thread();
        if self.0.status.get() == ConnectStatus::Bad {
            return;
        }
        self.0.status.set(ConnectStatus::Bad);
        if let Some(dispatcher) = self.0.dispatcher.borrow().clone() {
            self.0.loop_.disable_all(&dispatcher);
            self.0.loop_.remove_dispatcher(&dispatcher);
        }
        self.fire_close();
    }

    /// Posted as a task; disables all interest, removes the dispatcher,
    /// releases the client handle, transitions to `Bad` (spec.md §4.8
    /// "Disconnect"). Blocks the caller until complete, like the source's
    /// `promise`/`future` pair.
    pub fn disconnect(&self) {
        let this = self.clone();
        let (tx, rx) = sync_channel::<()>(0);
        self.0.loop_.run_in_loop(move || {
            this.0.status.set(ConnectStatus::Bad);
            if let Some(dispatcher) = this.0.dispatcher.borrow_mut().take() {
                this.0.loop_.disable_all(&dispatcher);
                this.0.loop_.remove_dispatcher(&dispatcher);
            }
            let mysql = this.0.mysql.replace(std::ptr::null_mut());
            if !mysql.is_null() {
                unsafe { sys::mysql_close(mysql) };
            }
            let _ = tx.send(());
        });
        let _ = rx.recv();
    }

    /// Submits a query. Runs inline if already on the loop thread, else
    /// posted as a task (spec.md §4.8).
    pub fn exec_sql(
        &self,
        sql: impl Into<String>,
        params: Vec<Param>,
        on_result: impl FnMut(ResultView) + Send + 'static,
        on_error: impl FnMut(MySqlError) + Send + 'static,
    ) {
        let sql = sql.into();
        let this = self.clone();
        let on_result: ResultCallback = Box::new(on_result);
        let on_error: ExceptCallback = Box::new(on_error);
        if self.0.loop_.is_in_loop_thread() {
            this.exec_sql_in_loop(sql, params, on_result, on_error);
        } else {
            self.0.loop_.queue_in_loop(move || {
                this.exec_sql_in_loop(sql, params, on_result, on_error);
            });
        }
    }

    fn exec_sql_in_loop(
        &self,
        sql: String,
        params: Vec<Param>,
        on_result: ResultCallback,
        on_error: ExceptCallback,
    ) {
        assert!(!self.0.working.get(), "exec_sql called while not idle");
        assert!(!sql.is_empty());

        *self.0.result_cb.borrow_mut() = Some(on_result);
        *self.0.except_cb.borrow_mut() = Some(on_error);
        self.0.working.set(true);

        let rendered = unsafe { crate::mysql::params::render_sql(&sql, &params, self.0.mysql.get()) };
        tracing::info!(sql = %rendered, "prepared SQL");
        *self.0.sql.borrow_mut() = rendered;

        self.start_query();
        self.set_event_dispatcher();
    }

    /// Batch execution of multiple queued commands. The nonblocking client
    /// library has no batch-execution path, so this is a contract violation
    /// (spec.md §4.8 "Batch mode", §7 "configuration fatal"), matching
    /// `original_source/MySQLImpl/MySQLConnector.cpp::batchSql`'s
    /// `ABSL_LOG(FATAL) ...; exit(1);` — logged then aborted rather than
    /// ever actually running a batch.
    pub fn batch_sql(&self, _cmds: Vec<(String, Vec<Param>)>) -> ! {
        tracing::error!(error = %MySqlError::BatchModeUnsupported, "Connection::batch_sql");
        std::process::abort();
    }

    fn start_query(&self) {
        let mysql = self.0.mysql.get();
        let sql = self.0.sql.borrow().clone();
        let sql_c = std::ffi::CString::new(sql.clone()).unwrap_or_default();
        let mut err: c_int = 0;
        let wait_status = unsafe {
            sys::mysql_real_query_start(&raw mut err, mysql, sql_c.as_ptr(), sql.len() as _)
        };
        self.0.wait_status.set(wait_status);
        self.0.exec_status.set(ExecStatus::RealQuery);
        if wait_status == 0 {
            if err != 0 {
                let this = self.clone();
                self.0.loop_.queue_in_loop(move || this.output_error());
                return;
            }
            self.start_store_result(true);
        }
    }

    fn start_store_result(&self, queue: bool) {
        let mysql = self.0.mysql.get();
        let mut ret: *mut sys::MYSQL_RES = std::ptr::null_mut();
        self.0.exec_status.set(ExecStatus::StoreResult);
        let wait_status = unsafe { sys::mysql_store_result_start(&raw mut ret, mysql) };
        self.0.wait_status.set(wait_status);
        if wait_status == 0 {
            self.0.exec_status.set(ExecStatus::Idle);
            let errno = unsafe { sys::mysql_errno(mysql) };
            if ret.is_null() && errno != 0 {
                if queue {
                    let this = self.clone();
                    self.0.loop_.queue_in_loop(move || this.output_error());
                } else {
                    self.output_error();
                }
                return;
            }
            if queue {
                let this = self.clone();
                let ret = SendPtr(ret);
                self.0.loop_.queue_in_loop(move || this.get_result(ret.0));
            } else {
                self.get_result(ret);
            }
        }
    }

    fn get_result(&self, res: *mut sys::MYSQL_RES) {
        let mysql = self.0.mysql.get();
        let affected_rows = unsafe { sys::mysql_affected_rows(mysql) };
        let insert_id = unsafe { sys::mysql_insert_id(mysql) };
        let view = unsafe { ResultView::from_raw(res, affected_rows, insert_id) };

        if !self.0.working.get() {
            return;
        }
        if let Some(cb) = self.0.result_cb.borrow_mut().as_mut() {
            cb(view);
        }

        if unsafe { sys::mysql_more_results(mysql) } == 0 {
            *self.0.result_cb.borrow_mut() = None;
            *self.0.except_cb.borrow_mut() = None;
            self.0.working.set(false);
            self.fire_idle();
        } else {
            self.0.exec_status.set(ExecStatus::NextResult);
            let mut err: c_int = 0;
            let wait_status = unsafe { sys::mysql_next_result_start(&raw mut err, mysql) };
            self.0.wait_status.set(wait_status);
            if wait_status == 0 {
                if err != 0 {
                    self.0.exec_status.set(ExecStatus::Idle);
                    tracing::error!(err, "mysql_next_result_start() failed");
                    self.output_error();
                    return;
                }
                self.start_store_result(false);
            }
        }
    }

    /// Logs, builds the error, invokes the exception callback, clears
    /// per-query callbacks, and — if the server is gone/lost — transitions
    /// to `Bad`; otherwise fires the idle callback (spec.md §4.8 "Errors
    /// during a query").
    fn output_error(&self) {
        if let Some(dispatcher) = self.0.dispatcher.borrow().clone() {
            self.0.loop_.disable_all(&dispatcher);
        }
        let mysql = self.0.mysql.get();
        let errno = unsafe { sys::mysql_errno(mysql) };
        let message = c_str_to_string(unsafe { sys::mysql_error(mysql) });
        let sql = self.0.sql.borrow().clone();
        tracing::error!(errno, %message, %sql, "query failed");

        if self.0.working.get() {
            if let Some(cb) = self.0.except_cb.borrow_mut().as_mut() {
                cb(MySqlError::Query {
                    message,
                    sql: sql.clone(),
                });
            }
            *self.0.except_cb.borrow_mut() = None;
            *self.0.result_cb.borrow_mut() = None;
            self.0.working.set(false);
            if !MySqlError::server_gone(errno) {
                self.fire_idle();
            }
        }
        if MySqlError::server_gone(errno) {
            self.handle_closed();
        }
    }

    fn fire_ok(&self) {
        if let Some(cb) = self.0.ok_cb.borrow_mut().as_mut() {
            cb(self.clone());
        }
    }

    fn fire_close(&self) {
        if let Some(cb) = self.0.close_cb.borrow_mut().as_mut() {
            cb(self.clone());
        }
    }

    fn fire_idle(&self) {
        if let Some(cb) = self.0.idle_cb.borrow_mut().as_mut() {
            cb(self.clone());
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("status", &self.0.status.get())
            .finish()
    }
}

fn c_string_or_null(s: Option<&str>) -> Option<std::ffi::CString> {
    s.filter(|s| !s.is_empty())
        .map(|s| std::ffi::CString::new(s).unwrap_or_default())
}

fn opt_cstr_ptr(s: &Option<std::ffi::CString>) -> *const std::os::raw::c_char {
    s.as_ref().map_or(std::ptr::null(), |s| s.as_ptr())
}

fn c_str_to_string(ptr: *const std::os::raw::c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    unsafe { std::ffi::CStr::from_ptr(ptr) }
        .to_string_lossy()
        .into_owned()
}
