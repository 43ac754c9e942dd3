pub mod app;
pub mod auth;
pub mod cli;
pub mod config;
pub mod dates;
pub mod entity;
pub mod error;
pub mod recurrence;
pub mod remote;
pub mod storage;
pub mod sync;
pub mod views;

pub use app::App;
pub use config::{BackendMode, Config};
pub use error::{RebanhoError, Result};
