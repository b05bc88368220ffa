//! Suite results.

use std::fmt::Write as _;
use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of one test case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseReport {
    pub name: String,
    pub passed: bool,
    pub duration_ms: u64,
    /// Full cause chain of the failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of one (client → server) pairing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuiteReport {
    pub name: String,
    pub client: String,
    pub server: String,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub cases: Vec<CaseReport>,
}

impl SuiteReport {
    pub fn passed_count(&self) -> usize {
        self.cases.iter().filter(|c| c.passed).count()
    }

    pub fn failed_count(&self) -> usize {
        self.cases.iter().filter(|c| !c.passed).count()
    }

    pub fn success(&self) -> bool {
        self.failed_count() == 0
    }

    pub fn failures(&self) -> impl Iterator<Item = &CaseReport> {
        self.cases.iter().filter(|c| !c.passed)
    }

    /// Human-readable summary, one line per case.
    pub fn render(&self) -> String {
        let mut out = format!("{}\n", self.name);
        for case in &self.cases {
            let mark = if case.passed { "✓" } else { "✗" };
            let _ = writeln!(out, "  {mark} {} ({}ms)", case.name, case.duration_ms);
            if let Some(error) = &case.error {
                for line in error.lines() {
                    let _ = writeln!(out, "      {line}");
                }
            }
        }
        let _ = write!(
            out,
            "  {} passed, {} failed ({}ms)",
            self.passed_count(),
            self.failed_count(),
            self.duration_ms
        );
        out
    }
}

/// Write `reports` as pretty JSON.
pub fn write_json(path: &Path, reports: &[SuiteReport]) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(reports)?;
    std::fs::write(path, json)
        .with_context(|| format!("failed to write report to {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> SuiteReport {
        SuiteReport {
            name: "Compatibility go → js".to_string(),
            client: "go".to_string(),
            server: "js".to_string(),
            started_at: Utc::now(),
            duration_ms: 42,
            cases: vec![
                CaseReport {
                    name: "generates a key".to_string(),
                    passed: true,
                    duration_ms: 10,
                    error: None,
                },
                CaseReport {
                    name: "echoes caveats".to_string(),
                    passed: false,
                    duration_ms: 30,
                    error: Some("unexpectedly found 2 receipts in response message".to_string()),
                },
            ],
        }
    }

    #[test]
    fn test_counts() {
        let report = report();
        assert_eq!(report.passed_count(), 1);
        assert_eq!(report.failed_count(), 1);
        assert!(!report.success());
        assert_eq!(report.failures().next().unwrap().name, "echoes caveats");
    }

    #[test]
    fn test_render_marks_cases() {
        let rendered = report().render();
        assert!(rendered.starts_with("Compatibility go → js\n"));
        assert!(rendered.contains("✓ generates a key"));
        assert!(rendered.contains("✗ echoes caveats"));
        assert!(rendered.contains("      unexpectedly found 2 receipts"));
        assert!(rendered.ends_with("1 passed, 1 failed (42ms)"));
    }

    #[test]
    fn test_write_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        write_json(&path, &[report()]).unwrap();

        let parsed: Vec<SuiteReport> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed, vec![report_with_time(parsed[0].started_at)]);
        assert!(parsed[0].cases[0].error.is_none());
    }

    fn report_with_time(started_at: DateTime<Utc>) -> SuiteReport {
        SuiteReport {
            started_at,
            ..report()
        }
    }
}
