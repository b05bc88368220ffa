//! Test case definitions.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use capcompat_driver::{Driver, ServiceInfo};

/// Boxed future returned by a test body.
pub type CaseFuture<'a> = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>>;

/// What a test body gets to work with.
#[derive(Debug, Clone, Copy)]
pub struct TestContext<'a> {
    pub client: &'a Driver,
    pub server: &'a Driver,
    /// Started on `server` before the body runs, stopped after it.
    pub service: &'a ServiceInfo,
}

/// A named test body shared by every client/server pairing.
#[derive(Clone, Copy)]
pub struct TestCase {
    pub name: &'static str,
    pub run: fn(TestContext<'_>) -> CaseFuture<'_>,
}

impl TestCase {
    pub const fn new(name: &'static str, run: fn(TestContext<'_>) -> CaseFuture<'_>) -> Self {
        Self { name, run }
    }
}

impl fmt::Debug for TestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestCase").field("name", &self.name).finish()
    }
}
