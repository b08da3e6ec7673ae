#![forbid(unsafe_code)]

//! Restart cascade controller for PM2-managed processes.
//!
//! Watches the supervisor's event bus for a parent process coming back
//! online and restarts every process that names it under the dependency
//! tag key, one at a time.

pub mod cascade;
pub mod config;
pub mod errors;
pub mod models;
pub mod supervisor;

pub use config::CascadeConfig;
pub use errors::{AppError, Result};
