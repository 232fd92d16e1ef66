//! Series management for courses: the endpoint layer the sidecar serves and
//! the table controller that drives it.

pub mod access;
pub mod bridge;
pub mod client;
pub mod db;
pub mod endpoint;
pub mod form;
pub mod i18n;
pub mod ipc;
pub mod selection;
