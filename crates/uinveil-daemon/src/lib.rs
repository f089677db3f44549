//! # uinveil-daemon
//!
//! HTTP front end for uinveil: license holders mint signed avatar URLs over
//! authenticated `POST` routes, and anyone holding such a URL can fetch the
//! avatar through `GET /avatar` without learning the identifier inside it.

pub mod auth;
pub mod config;
pub mod error;
pub mod paths;
pub mod registry;
pub mod server;
pub mod upstream;

pub use config::DaemonConfig;
pub use error::{DaemonError, Result};
