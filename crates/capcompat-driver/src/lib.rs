//! capcompat driver
//!
//! Runs one implementation under test through its process contract:
//! - `key gen [--type <alg>]` prints `{id, key}`
//! - `server start` prints `{id, url}` once ready and keeps running
//! - `invoke --url .. --issuer .. ..` prints the raw `{headers, body}` response
//!
//! A [`Driver`] is bound to the implementation's directory and its
//! `runner.config.json`, and owns every service it starts.

pub mod config;
pub mod driver;
pub mod error;
pub mod invoke;
pub mod keygen;
pub mod lifecycle;
pub mod process;

pub use config::{DriverConfig, StopStrategy, CONFIG_FILE};
pub use driver::Driver;
pub use error::{DriverError, ErrorClass, Result};
pub use invoke::{InvocationOutcome, InvocationParams};
pub use lifecycle::{ServiceInfo, Stoppable};

/// capcompat driver version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
