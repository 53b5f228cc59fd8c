//! Readiness poller (`original_source/poll/EpollPoller.{h,cpp}`).

pub mod epoll;

pub use epoll::EpollPoller;
