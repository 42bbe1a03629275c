//! Ingestion: structured test reports and command manifests.
//!
//! Test reports are JUnit-style XML (`testsuites` / `testsuite` /
//! `testcase`). A document that does not parse, or whose root is not a test
//! suite, fails as a whole with [`WardenError::ParseError`]. Problems with a
//! single field are recovered in place and reported as
//! [`FieldCoercionWarning`]s so the rest of the report still lands.
//!
//! Manifests come in three shapes, detected by content:
//!
//! 1. a JSON object with a `ran` array,
//! 2. newline-delimited JSON objects with a `cmd` field,
//! 3. plain text, one command per line, `#` comments.
//!
//! Each shape is a [`ManifestFormat`] that either claims the input or
//! declines. All of them normalize through [`normalize_command`].

use crate::core::config::ComponentRule;
use crate::core::error::WardenError;
use crate::core::model::{TestEvent, TestStatus};
use regex::Regex;
use serde::Serialize;
use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;

/// Identity of the CI invocation a report belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportContext {
    pub run_id: String,
    pub pr_id: Option<i64>,
    pub commit_sha: String,
    pub timestamp: String,
}

/// A field that failed to coerce and was replaced with a safe default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldCoercionWarning {
    pub test_id: String,
    pub field: &'static str,
    pub raw: Option<String>,
    pub fallback: String,
}

#[derive(Debug, Clone, Default)]
pub struct ParsedReport {
    pub events: Vec<TestEvent>,
    pub warnings: Vec<FieldCoercionWarning>,
}

// --- Component attribution ---

/// Ordered `(component, pattern)` rules; first match wins.
#[derive(Debug, Clone, Default)]
pub struct ComponentAttribution {
    rules: Vec<(String, Regex)>,
    forced: Option<String>,
}

impl ComponentAttribution {
    pub fn from_rules(rules: &[ComponentRule]) -> Result<Self, WardenError> {
        let mut compiled = Vec::with_capacity(rules.len());
        for rule in rules {
            let re = Regex::new(&rule.pattern).map_err(|e| {
                WardenError::ConfigurationError(format!(
                    "component '{}' has an invalid pattern: {e}",
                    rule.name
                ))
            })?;
            compiled.push((rule.name.clone(), re));
        }
        Ok(Self {
            rules: compiled,
            forced: None,
        })
    }

    /// Attribute every case to `component`, ignoring the rules.
    pub fn forced(mut self, component: Option<String>) -> Self {
        self.forced = component.filter(|c| !c.trim().is_empty());
        self
    }

    pub fn component_for_path(&self, path: &str) -> Option<&str> {
        self.rules
            .iter()
            .find(|(_, re)| re.is_match(path))
            .map(|(name, _)| name.as_str())
    }

    /// `file_hint` first, then `classname`; empty when nothing matches.
    pub fn attribute(&self, file_hint: &str, classname: &str) -> String {
        if let Some(forced) = &self.forced {
            return forced.clone();
        }
        [file_hint, classname]
            .iter()
            .filter(|s| !s.is_empty())
            .find_map(|s| self.component_for_path(s))
            .unwrap_or_default()
            .to_string()
    }
}

// --- Structured test reports ---

pub fn parse_test_report(
    xml: &str,
    source_name: &str,
    ctx: &ReportContext,
    attribution: &ComponentAttribution,
) -> Result<ParsedReport, WardenError> {
    let doc = roxmltree::Document::parse(xml)
        .map_err(|e| WardenError::parse(source_name, e.to_string()))?;
    let root = doc.root_element();
    if !matches!(root.tag_name().name(), "testsuites" | "testsuite") {
        return Err(WardenError::parse(
            source_name,
            format!(
                "expected <testsuites> or <testsuite> root, found <{}>",
                root.tag_name().name()
            ),
        ));
    }

    let mut report = ParsedReport::default();
    for case in root.descendants().filter(|n| n.has_tag_name("testcase")) {
        let classname = case.attribute("classname").unwrap_or_default();
        let name = case.attribute("name").unwrap_or_default();
        let test_id = format!("{classname}#{name}");

        let suite = if classname.is_empty() {
            case.ancestors()
                .find(|n| n.has_tag_name("testsuite"))
                .and_then(|n| n.attribute("name"))
                .unwrap_or_default()
                .to_string()
        } else {
            classname.to_string()
        };

        let failed = case
            .children()
            .any(|c| c.is_element() && matches!(c.tag_name().name(), "failure" | "error"));
        let status = if failed {
            TestStatus::Failed
        } else {
            TestStatus::Passed
        };

        let raw_time = case.attribute("time");
        let duration_ms = match parse_duration_ms(raw_time) {
            Some(ms) => ms,
            None => {
                tracing::warn!(
                    source = source_name,
                    test_id = %test_id,
                    raw = raw_time.unwrap_or("<missing>"),
                    "unusable duration; recording 0ms"
                );
                report.warnings.push(FieldCoercionWarning {
                    test_id: test_id.clone(),
                    field: "time",
                    raw: raw_time.map(str::to_string),
                    fallback: "0".to_string(),
                });
                0
            }
        };

        let file_hint = case.attribute("file").unwrap_or_default().to_string();
        let component = attribution.attribute(&file_hint, classname);

        report.events.push(TestEvent {
            run_id: ctx.run_id.clone(),
            pr_id: ctx.pr_id,
            commit_sha: ctx.commit_sha.clone(),
            test_id,
            suite,
            status,
            duration_ms,
            component,
            file_hint,
            timestamp: ctx.timestamp.clone(),
        });
    }

    tracing::info!(
        source = source_name,
        events = report.events.len(),
        warnings = report.warnings.len(),
        "parsed test report"
    );
    Ok(report)
}

/// Seconds (possibly fractional) to whole milliseconds. `None` for
/// missing, non-numeric, negative or non-finite input.
pub fn parse_duration_ms(raw: Option<&str>) -> Option<u64> {
    let secs: f64 = raw?.trim().parse().ok()?;
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    let ms = (secs * 1000.0).round();
    if ms > u64::MAX as f64 {
        return None;
    }
    Some(ms as u64)
}

/// Hex SHA-256 of a report's raw bytes, used to spot re-submitted reports.
pub fn report_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

// --- Manifests ---

/// Canonical form of one command: trimmed and lowercased. Blank lines and
/// `#` comments have no canonical form.
pub fn normalize_command(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }
    Some(trimmed.to_lowercase())
}

/// Normalize in order, keeping duplicates.
pub fn normalize_commands<I, S>(raw: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    raw.into_iter()
        .filter_map(|s| normalize_command(s.as_ref()))
        .collect()
}

/// One manifest serialization.
pub trait ManifestFormat {
    fn name(&self) -> &'static str;

    /// `None` declines the input; `Some` claims it, successfully or not.
    fn recognize(&self, text: &str) -> Option<Result<Vec<String>, WardenError>>;
}

/// `{"ran": ["cargo build", ...]}`
pub struct JsonRanManifest;

impl ManifestFormat for JsonRanManifest {
    fn name(&self) -> &'static str {
        "json-ran"
    }

    fn recognize(&self, text: &str) -> Option<Result<Vec<String>, WardenError>> {
        if !text.trim_start().starts_with('{') {
            return None;
        }
        let value: JsonValue = serde_json::from_str(text).ok()?;
        let ran = value.as_object()?.get("ran")?;
        let Some(items) = ran.as_array() else {
            return Some(Err(WardenError::parse("manifest", "`ran` must be an array")));
        };
        let mut raw = Vec::with_capacity(items.len());
        for (idx, item) in items.iter().enumerate() {
            match item.as_str() {
                Some(s) => raw.push(s),
                None => {
                    return Some(Err(WardenError::parse(
                        "manifest",
                        format!("`ran[{idx}]` is not a string"),
                    )));
                }
            }
        }
        Some(Ok(normalize_commands(raw)))
    }
}

/// One `{"cmd": "..."}` object per line.
pub struct NdjsonCmdManifest;

impl ManifestFormat for NdjsonCmdManifest {
    fn name(&self) -> &'static str {
        "ndjson-cmd"
    }

    fn recognize(&self, text: &str) -> Option<Result<Vec<String>, WardenError>> {
        let lines = text
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty());

        let (_, first) = lines.clone().next()?;
        let first: JsonValue = serde_json::from_str(first.trim()).ok()?;
        first.as_object()?.get("cmd")?;

        let mut raw = Vec::new();
        for (idx, line) in lines {
            let cmd = serde_json::from_str::<JsonValue>(line.trim())
                .ok()
                .and_then(|v| v.get("cmd").and_then(|c| c.as_str()).map(str::to_string));
            match cmd {
                Some(cmd) => raw.push(cmd),
                None => {
                    return Some(Err(WardenError::parse(
                        "manifest",
                        format!("line {} is not an object with a string `cmd`", idx + 1),
                    )));
                }
            }
        }
        Some(Ok(normalize_commands(raw)))
    }
}

/// Plain text. Declines only JSON documents and NDJSON-looking input; shell
/// lines such as `[ -f x ] && make` or `{ a; b; }` are claimed.
pub struct PlainTextManifest;

impl ManifestFormat for PlainTextManifest {
    fn name(&self) -> &'static str {
        "plain-text"
    }

    fn recognize(&self, text: &str) -> Option<Result<Vec<String>, WardenError>> {
        let first = text
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty() && !line.starts_with('#'));
        let json_line = |line: &str| {
            matches!(
                serde_json::from_str::<JsonValue>(line),
                Ok(JsonValue::Object(_) | JsonValue::Array(_))
            )
        };
        if first.is_some_and(json_line) || json_line(text.trim()) {
            return None;
        }
        Some(Ok(normalize_commands(text.lines())))
    }
}

/// Recognizers in the order they are tried.
pub fn manifest_formats() -> Vec<Box<dyn ManifestFormat>> {
    vec![
        Box::new(JsonRanManifest),
        Box::new(NdjsonCmdManifest),
        Box::new(PlainTextManifest),
    ]
}

pub fn load_manifest(text: &str) -> Result<Vec<String>, WardenError> {
    for format in manifest_formats() {
        if let Some(result) = format.recognize(text) {
            tracing::debug!(format = format.name(), "manifest format recognized");
            return result;
        }
    }
    Err(WardenError::parse(
        "manifest",
        "unrecognized manifest format (expected {\"ran\": [...]}, NDJSON with `cmd`, or plain text)",
    ))
}

pub fn load_manifest_file(path: &Path) -> Result<Vec<String>, WardenError> {
    let text = fs::read_to_string(path)?;
    load_manifest(&text).map_err(|e| match e {
        WardenError::ParseError { reason, .. } => {
            WardenError::parse(path.display().to_string(), reason)
        }
        other => other,
    })
}
