//! capcompat suite
//!
//! Pairs a client implementation with a server implementation and runs
//! the shared compatibility cases against them, one fresh server service
//! per case.

pub mod case;
pub mod cases;
pub mod report;
pub mod runner;

pub use case::{CaseFuture, TestCase, TestContext};
pub use report::{write_json, CaseReport, SuiteReport};
pub use runner::CompatSuite;

/// capcompat suite version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
