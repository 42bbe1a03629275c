//! `warden.toml` loading, discovery and validation.
//!
//! Configuration is read once at startup and passed explicitly to each
//! pipeline stage; nothing below the CLI looks up paths or thresholds on its
//! own. A malformed file is a [`WardenError::ConfigurationError`] before any
//! report is touched.

use crate::core::error::WardenError;
use crate::core::lock::LockPolicy;
use crate::core::schemas;
use crate::plugins::compliance::ComplianceMode;
use crate::plugins::ingest;
use regex::Regex;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_DIR: &str = ".ciwarden";
pub const CONFIG_FILE: &str = "warden.toml";

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Store file, relative to the project root unless absolute.
    pub path: PathBuf,
    pub busy_timeout_ms: u64,
    pub lock_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: Path::new(CONFIG_DIR).join(schemas::GUIDANCE_DB_NAME),
            busy_timeout_ms: 5_000,
            lock_retries: 5,
            backoff_base_ms: 100,
            backoff_max_ms: 5_000,
        }
    }
}

impl StoreConfig {
    pub fn lock_policy(&self) -> LockPolicy {
        LockPolicy {
            busy_timeout: Duration::from_millis(self.busy_timeout_ms),
            max_retries: self.lock_retries,
            base_delay: Duration::from_millis(self.backoff_base_ms),
            max_delay: Duration::from_millis(self.backoff_max_ms),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct GuidanceConfig {
    /// Identity tag prefixed to every rendered warning.
    pub engine_tag: String,
    pub min_support: u32,
    pub min_lift: f64,
    /// Runs recorded after the last reinforcing run before a rule retires.
    pub retire_after_runs: u32,
    pub section_title: String,
}

impl Default for GuidanceConfig {
    fn default() -> Self {
        Self {
            engine_tag: "ciwarden".to_string(),
            min_support: 2,
            min_lift: 1.5,
            retire_after_runs: 20,
            section_title: "CI guidance".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ComplianceConfig {
    #[serde(default)]
    pub mode: ComplianceMode,
    pub required: Vec<String>,
}

/// Maps test files to a component and names the command to run for it.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ComponentRule {
    pub name: String,
    /// Regex matched against a test case's `file` attribute, then its classname.
    pub pattern: String,
    #[serde(default)]
    pub command: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct NotifyConfig {
    pub stdout: bool,
    /// Markdown file appended with each dispatched message.
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct WardenConfig {
    pub store: StoreConfig,
    pub guidance: GuidanceConfig,
    pub compliance: Option<ComplianceConfig>,
    pub components: Vec<ComponentRule>,
    pub notify: NotifyConfig,
    /// Directory relative paths resolve against.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl WardenConfig {
    /// Defaults rooted at `base_dir`, used when no `warden.toml` exists.
    pub fn with_defaults(base_dir: &Path) -> Self {
        Self {
            base_dir: base_dir.to_path_buf(),
            ..Self::default()
        }
    }

    pub fn from_toml_str(content: &str, base_dir: &Path) -> Result<Self, WardenError> {
        let mut config: WardenConfig = toml::from_str(content)
            .map_err(|e| WardenError::ConfigurationError(e.to_string()))?;
        config.base_dir = base_dir.to_path_buf();
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, WardenError> {
        let content = fs::read_to_string(path).map_err(|e| {
            WardenError::ConfigurationError(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content, &project_root_for(path))
    }

    /// Walk up from `start_dir` looking for `.ciwarden/warden.toml`; fall
    /// back to defaults rooted at `start_dir`.
    pub fn discover(start_dir: &Path) -> Result<Self, WardenError> {
        let mut current = PathBuf::from(start_dir);
        loop {
            let candidate = current.join(CONFIG_DIR).join(CONFIG_FILE);
            if candidate.is_file() {
                tracing::debug!(path = %candidate.display(), "using discovered config");
                return Self::load(&candidate);
            }
            if !current.pop() {
                return Ok(Self::with_defaults(start_dir));
            }
        }
    }

    pub fn validate(&self) -> Result<(), WardenError> {
        let bad = |msg: String| Err(WardenError::ConfigurationError(msg));

        if self.store.lock_retries > 20 {
            return bad(format!(
                "store.lock_retries must be at most 20 (got {})",
                self.store.lock_retries
            ));
        }
        if self.store.backoff_base_ms > self.store.backoff_max_ms {
            return bad("store.backoff_base_ms exceeds store.backoff_max_ms".to_string());
        }
        if self.guidance.min_support < 1 {
            return bad("guidance.min_support must be at least 1".to_string());
        }
        if !self.guidance.min_lift.is_finite() || self.guidance.min_lift < 1.0 {
            return bad(format!(
                "guidance.min_lift must be a finite ratio >= 1.0 (got {})",
                self.guidance.min_lift
            ));
        }
        if self.guidance.retire_after_runs < 1 {
            return bad("guidance.retire_after_runs must be at least 1".to_string());
        }
        if self.guidance.engine_tag.trim().is_empty() {
            return bad("guidance.engine_tag must not be empty".to_string());
        }

        let mut names = FxHashSet::default();
        for rule in &self.components {
            if rule.name.trim().is_empty() {
                return bad("components[].name must not be empty".to_string());
            }
            if !names.insert(rule.name.as_str()) {
                return bad(format!("component '{}' is declared twice", rule.name));
            }
            if let Err(e) = Regex::new(&rule.pattern) {
                return bad(format!("component '{}' has an invalid pattern: {e}", rule.name));
            }
        }

        if let Some(compliance) = &self.compliance {
            if compliance.required.is_empty() {
                return bad("compliance.required must list at least one command".to_string());
            }
            if let Some(blank) = compliance
                .required
                .iter()
                .find(|cmd| ingest::normalize_command(cmd).is_none())
            {
                return bad(format!(
                    "compliance.required contains a blank or comment entry: {blank:?}"
                ));
            }
        }
        Ok(())
    }

    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    pub fn store_path(&self) -> PathBuf {
        self.resolve(&self.store.path)
    }

    pub fn component_command(&self, component: &str) -> Option<&str> {
        self.components
            .iter()
            .find(|rule| rule.name == component)
            .and_then(|rule| rule.command.as_deref())
    }
}

/// `<root>/.ciwarden/warden.toml` resolves against `<root>`; any other file
/// resolves against its own directory.
fn project_root_for(config_path: &Path) -> PathBuf {
    let parent = config_path.parent().unwrap_or_else(|| Path::new("."));
    if parent.file_name().is_some_and(|name| name == CONFIG_DIR) {
        parent.parent().unwrap_or(parent).to_path_buf()
    } else {
        parent.to_path_buf()
    }
}

/// Starter file written by `ciwarden init`.
pub fn default_config_toml() -> String {
    r#"# ciwarden configuration

[store]
path = ".ciwarden/guidance.db"
busy_timeout_ms = 5000
lock_retries = 5
backoff_base_ms = 100
backoff_max_ms = 5000

[guidance]
engine_tag = "ciwarden"
min_support = 2
min_lift = 1.5
retire_after_runs = 20
section_title = "CI guidance"

# [compliance]
# mode = "all"
# required = ["cargo build", "cargo test"]

# [[components]]
# name = "cli"
# pattern = "^(src/cli|tests/cli)"
# command = "cargo test --test cli"

[notify]
stdout = true
# file = ".ciwarden/guidance-comment.md"
"#
    .to_string()
}
