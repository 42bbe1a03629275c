//! Command compliance: did a CI run execute what the release gate requires?
//!
//! Pure functions only. "Not compliant" is an ordinary result, never an
//! error.

use crate::core::error::WardenError;
use crate::plugins::ingest::{normalize_command, normalize_commands};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ComplianceMode {
    /// Every required command must be satisfied.
    #[default]
    All,
    /// At least one required command must be satisfied.
    Any,
}

impl fmt::Display for ComplianceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComplianceMode::All => f.write_str("all"),
            ComplianceMode::Any => f.write_str("any"),
        }
    }
}

impl FromStr for ComplianceMode {
    type Err = WardenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(ComplianceMode::All),
            "any" => Ok(ComplianceMode::Any),
            other => Err(WardenError::ConfigurationError(format!(
                "unknown compliance mode '{other}' (expected all or any)"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComplianceResult {
    pub compliant: bool,
    /// Unsatisfied required commands, in the order they were required.
    pub missing: Vec<String>,
}

/// A required command is satisfied by an executed command that starts with
/// it, compared in canonical form (`"dotnet build"` is satisfied by
/// `"dotnet build -c Release"`).
pub fn is_satisfied(required: &str, executed: &[String]) -> bool {
    let Some(required) = normalize_command(required) else {
        return false;
    };
    executed.iter().any(|cmd| cmd.starts_with(&required))
}

pub fn check<R, E>(required: &[R], executed: &[E], mode: ComplianceMode) -> ComplianceResult
where
    R: AsRef<str>,
    E: AsRef<str>,
{
    let executed = normalize_commands(executed.iter().map(AsRef::as_ref));

    let missing: Vec<String> = required
        .iter()
        .map(AsRef::as_ref)
        .filter(|req| !is_satisfied(req, &executed))
        .map(str::to_string)
        .collect();

    match mode {
        ComplianceMode::All => ComplianceResult {
            compliant: missing.is_empty(),
            missing,
        },
        ComplianceMode::Any => {
            let any_satisfied = missing.len() < required.len();
            ComplianceResult {
                compliant: any_satisfied,
                // Nothing satisfied: report the whole set, not a partial list.
                missing: if any_satisfied { Vec::new() } else { missing },
            }
        }
    }
}
