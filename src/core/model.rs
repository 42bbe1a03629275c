//! Records shared by the pipeline stages and the event store.

use crate::core::error::WardenError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Passed,
    Failed,
    Skipped,
}

impl TestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestStatus::Passed => "passed",
            TestStatus::Failed => "failed",
            TestStatus::Skipped => "skipped",
        }
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TestStatus {
    type Err = WardenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "passed" => Ok(TestStatus::Passed),
            "failed" => Ok(TestStatus::Failed),
            "skipped" => Ok(TestStatus::Skipped),
            other => Err(WardenError::ValidationError(format!(
                "unknown test status '{other}'"
            ))),
        }
    }
}

/// One executed test observation. Built by ingestion, appended once,
/// never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestEvent {
    pub run_id: String,
    pub pr_id: Option<i64>,
    pub commit_sha: String,
    /// `<classname>#<name>`
    pub test_id: String,
    pub suite: String,
    pub status: TestStatus,
    pub duration_ms: u64,
    /// Empty when no attribution rule matched.
    pub component: String,
    pub file_hint: String,
    /// Caller-supplied ordering key; compared as an opaque string.
    pub timestamp: String,
}

/// A [`TestEvent`] as read back from the store, with its row id.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredTestEvent {
    pub id: i64,
    pub event: TestEvent,
}

/// Lifecycle of a guidance entry.
///
/// `Pending` only exists in memory while the correlation engine evaluates a
/// candidate; the store holds `Active` and `Retired` rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GuidanceStatus {
    Pending,
    Active,
    Retired,
}

impl GuidanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GuidanceStatus::Pending => "pending",
            GuidanceStatus::Active => "active",
            GuidanceStatus::Retired => "retired",
        }
    }
}

impl FromStr for GuidanceStatus {
    type Err = WardenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(GuidanceStatus::Pending),
            "active" => Ok(GuidanceStatus::Active),
            "retired" => Ok(GuidanceStatus::Retired),
            other => Err(WardenError::ValidationError(format!(
                "unknown guidance status '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuidanceRule {
    pub component: String,
    pub description: String,
    /// Distinct pull requests with failing evidence for `component`.
    pub support_prs: u32,
    /// Component failure rate over baseline failure rate.
    pub lift: f64,
    pub status: GuidanceStatus,
    pub first_seen: String,
    pub last_seen: String,
}

/// Ledger row written once per ingested report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestRun {
    pub run_id: String,
    pub source: String,
    pub report_digest: String,
    pub event_count: usize,
    pub warning_count: usize,
    pub ingested_at: String,
}
