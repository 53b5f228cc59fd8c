//! Non-blocking MySQL/MariaDB client: connection state machine, parameter
//! rendering, and result materialisation (spec.md §4.8-4.9).

pub mod connection;
pub mod params;
pub mod result;
pub mod sys;

pub use connection::{ConnectStatus, Connection};
pub use params::{Param, ParamType};
pub use result::ResultView;
