//! Runs test cases for one client/server pairing.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Instant;

use anyhow::{anyhow, Context};
use capcompat_driver::Driver;
use chrono::Utc;
use futures::FutureExt;
use tracing::{info, warn};

use crate::case::{TestCase, TestContext};
use crate::cases;
use crate::report::{CaseReport, SuiteReport};

/// The shared cases bound to a client and a server implementation.
///
/// Every case runs against a fresh service started on the server and
/// stopped afterwards, whatever the body did.
#[derive(Debug)]
pub struct CompatSuite<'a> {
    client: &'a Driver,
    server: &'a Driver,
    cases: Vec<TestCase>,
}

impl<'a> CompatSuite<'a> {
    pub fn new(client: &'a Driver, server: &'a Driver) -> Self {
        Self::with_cases(client, server, cases::all())
    }

    pub fn with_cases(client: &'a Driver, server: &'a Driver, cases: Vec<TestCase>) -> Self {
        Self {
            client,
            server,
            cases,
        }
    }

    /// Keep only the cases whose name is in `names`. An empty list keeps all.
    pub fn only(mut self, names: &[String]) -> Self {
        if !names.is_empty() {
            self.cases.retain(|case| names.iter().any(|n| n == case.name));
        }
        self
    }

    pub fn cases(&self) -> &[TestCase] {
        &self.cases
    }

    pub fn name(&self) -> String {
        format!(
            "Compatibility {} → {}",
            self.client.name(),
            self.server.name()
        )
    }

    pub async fn run(&self) -> SuiteReport {
        let name = self.name();
        let started_at = Utc::now();
        let start = Instant::now();
        info!(suite = %name, cases = self.cases.len(), "Starting suite");

        let mut reports = Vec::with_capacity(self.cases.len());
        for case in &self.cases {
            reports.push(self.run_case(case).await);
        }

        let report = SuiteReport {
            name,
            client: self.client.name().to_string(),
            server: self.server.name().to_string(),
            started_at,
            duration_ms: start.elapsed().as_millis() as u64,
            cases: reports,
        };
        info!(
            suite = %report.name,
            passed = report.passed_count(),
            failed = report.failed_count(),
            "Suite finished"
        );
        report
    }

    async fn run_case(&self, case: &TestCase) -> CaseReport {
        let start = Instant::now();
        let result = self.with_service(case).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(()) => {
                info!(case = case.name, duration_ms, "✓ passed");
                CaseReport {
                    name: case.name.to_string(),
                    passed: true,
                    duration_ms,
                    error: None,
                }
            }
            Err(err) => {
                let error = format!("{err:#}");
                warn!(case = case.name, duration_ms, error = %error, "✗ failed");
                CaseReport {
                    name: case.name.to_string(),
                    passed: false,
                    duration_ms,
                    error: Some(error),
                }
            }
        }
    }

    async fn with_service(&self, case: &TestCase) -> anyhow::Result<()> {
        let service = self
            .server
            .start_service()
            .await
            .with_context(|| format!("failed to start {} service", self.server.name()))?;

        let ctx = TestContext {
            client: self.client,
            server: self.server,
            service: &service,
        };
        let body = AssertUnwindSafe((case.run)(ctx)).catch_unwind().await;
        let stopped = self.server.stop_service(&service.id).await;

        let body = body.unwrap_or_else(|panic| Err(anyhow!("panicked: {}", panic_message(&*panic))));
        match (body, stopped) {
            (Ok(()), Ok(())) => Ok(()),
            (Ok(()), Err(err)) => Err(anyhow::Error::new(err)
                .context(format!("failed to stop {} service", self.server.name()))),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(stop_err)) => {
                warn!(service = %service.id, error = %stop_err, "failed to stop service");
                Err(err)
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
