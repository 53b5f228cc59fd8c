//! Raw FFI surface: the nonblocking `mysql_real_connect_start`/`_cont`
//! family, re-exported from [`mysqlclient_sys`] plus the small set of
//! `#define`d wait-mask/option constants bindgen does not always capture as
//! typed items.
//!
//! Every function here is `unsafe` and every call site owns the one
//! invariant the original C++ leans on throughout `MySQLConnector.cpp`: a
//! given `MYSQL*` is only ever touched from the event-loop thread that owns
//! its connection, one `_start`/`_cont` call in flight at a time.

#![allow(non_upper_case_globals, non_camel_case_types)]

pub use mysqlclient_sys::{
    mysql_affected_rows, mysql_close, mysql_errno, mysql_error, mysql_fetch_fields,
    mysql_fetch_lengths, mysql_fetch_row, mysql_free_result, mysql_get_socket,
    mysql_get_timeout_value, mysql_init, mysql_insert_id, mysql_more_results, mysql_num_fields,
    mysql_num_rows, mysql_options, mysql_real_escape_string, mysql_sqlstate, MYSQL, MYSQL_FIELD,
    MYSQL_RES, MYSQL_ROW,
};

use std::os::raw::{c_char, c_int, c_uint, c_ulong};

/// `enum mysql_option` values used by this connector (`mysql.h`).
pub const MYSQL_OPT_NONBLOCK: c_int = 6_000;
pub const MYSQL_OPT_CONNECT_TIMEOUT: c_int = 0;
pub const MYSQL_OPT_READ_TIMEOUT: c_int = 11;
pub const MYSQL_OPT_WRITE_TIMEOUT: c_int = 12;
pub const MYSQL_OPT_RECONNECT: c_int = 20;

/// Wait-status bitmask values shared by every `*_start`/`*_cont` pair
/// (`mysql/mysql_com.h`): what the client is waiting on, and which
/// readiness condition(s) to feed back into the matching `_cont` call.
pub const MYSQL_WAIT_READ: c_int = 1;
pub const MYSQL_WAIT_WRITE: c_int = 2;
pub const MYSQL_WAIT_EXCEPT: c_int = 4;
pub const MYSQL_WAIT_TIMEOUT: c_int = 8;

unsafe extern "C" {
    pub fn mysql_real_connect_start(
        ret: *mut *mut MYSQL,
        mysql: *mut MYSQL,
        host: *const c_char,
        user: *const c_char,
        passwd: *const c_char,
        db: *const c_char,
        port: c_uint,
        unix_socket: *const c_char,
        client_flag: c_ulong,
    ) -> c_int;

    pub fn mysql_real_connect_cont(ret: *mut *mut MYSQL, mysql: *mut MYSQL, status: c_int) -> c_int;

    pub fn mysql_set_character_set_start(
        err: *mut c_int,
        mysql: *mut MYSQL,
        csname: *const c_char,
    ) -> c_int;

    pub fn mysql_set_character_set_cont(err: *mut c_int, mysql: *mut MYSQL, status: c_int)
        -> c_int;

    pub fn mysql_real_query_start(
        err: *mut c_int,
        mysql: *mut MYSQL,
        stmt_str: *const c_char,
        length: c_ulong,
    ) -> c_int;

    pub fn mysql_real_query_cont(err: *mut c_int, mysql: *mut MYSQL, status: c_int) -> c_int;

    pub fn mysql_store_result_start(ret: *mut *mut MYSQL_RES, mysql: *mut MYSQL) -> c_int;

    pub fn mysql_store_result_cont(
        ret: *mut *mut MYSQL_RES,
        mysql: *mut MYSQL,
        status: c_int,
    ) -> c_int;

    pub fn mysql_next_result_start(err: *mut c_int, mysql: *mut MYSQL) -> c_int;

    pub fn mysql_next_result_cont(err: *mut c_int, mysql: *mut MYSQL, status: c_int) -> c_int;
}
