//! One CI invocation end to end: ingest reports, append them, recompute
//! guidance, render it, and hand the text to the dispatcher.

use crate::core::config::WardenConfig;
use crate::core::error::WardenError;
use crate::core::model::{GuidanceRule, IngestRun};
use crate::core::store::EventStore;
use crate::core::time;
use crate::plugins::correlate::{CorrelationEngine, RecomputeSummary};
use crate::plugins::ingest::{self, ComponentAttribution, FieldCoercionWarning, ReportContext};
use crate::plugins::notify::{DispatchReport, Dispatcher, Notification};
use crate::plugins::render::{self, GuidanceRenderer};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub source: String,
    pub run_id: String,
    pub report_digest: String,
    pub events: usize,
    pub warnings: Vec<FieldCoercionWarning>,
    /// Same bytes were ingested before and duplicates were not allowed.
    pub skipped_duplicate: bool,
    /// Why this report was not ingested; other reports in the batch still are.
    pub error: Option<String>,
}

impl IngestOutcome {
    fn failed(source: String, run_id: &str, error: &WardenError) -> Self {
        Self {
            source,
            run_id: run_id.to_string(),
            report_digest: String::new(),
            events: 0,
            warnings: Vec::new(),
            skipped_duplicate: false,
            error: Some(error.to_string()),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}

/// Parse one report file and append it with its ledger row. A parse
/// failure leaves the store untouched.
pub fn ingest_report_file(
    store: &mut EventStore,
    path: &Path,
    ctx: &ReportContext,
    attribution: &ComponentAttribution,
    allow_duplicate: bool,
) -> Result<IngestOutcome, WardenError> {
    let bytes = fs::read(path)?;
    let source = path.display().to_string();
    let digest = ingest::report_digest(&bytes);

    let xml = String::from_utf8(bytes)
        .map_err(|e| WardenError::parse(source.clone(), format!("not valid UTF-8: {e}")))?;
    let parsed = ingest::parse_test_report(&xml, &source, ctx, attribution)?;

    let run = IngestRun {
        run_id: ctx.run_id.clone(),
        source: source.clone(),
        report_digest: digest.clone(),
        event_count: parsed.events.len(),
        warning_count: parsed.warnings.len(),
        ingested_at: time::now_epoch_z(),
    };
    let Some(events) = store.record_ingest(&run, &parsed.events, allow_duplicate)? else {
        tracing::warn!(source = %source, digest = %digest, "report already ingested; skipping");
        return Ok(IngestOutcome {
            source,
            run_id: ctx.run_id.clone(),
            report_digest: digest,
            events: 0,
            warnings: Vec::new(),
            skipped_duplicate: true,
            error: None,
        });
    };

    Ok(IngestOutcome {
        source,
        run_id: ctx.run_id.clone(),
        report_digest: digest,
        events,
        warnings: parsed.warnings,
        skipped_duplicate: false,
        error: None,
    })
}

/// Ingest every file in order. An unreadable or unparseable file is
/// recorded as a failed outcome and the batch continues; store errors
/// still abort.
pub fn ingest_report_files(
    store: &mut EventStore,
    paths: &[PathBuf],
    ctx: &ReportContext,
    attribution: &ComponentAttribution,
    allow_duplicate: bool,
) -> Result<Vec<IngestOutcome>, WardenError> {
    let mut outcomes = Vec::with_capacity(paths.len());
    for path in paths {
        match ingest_report_file(store, path, ctx, attribution, allow_duplicate) {
            Ok(outcome) => {
                if !outcome.skipped_duplicate {
                    tracing::info!(
                        source = %outcome.source,
                        run_id = %outcome.run_id,
                        events = outcome.events,
                        warnings = outcome.warnings.len(),
                        "report ingested"
                    );
                }
                outcomes.push(outcome);
            }
            Err(err @ (WardenError::ParseError { .. } | WardenError::IoError(_))) => {
                let source = path.display().to_string();
                tracing::warn!(source = %source, error = %err, "report not ingested");
                outcomes.push(IngestOutcome::failed(source, &ctx.run_id, &err));
            }
            Err(err) => return Err(err),
        }
    }
    Ok(outcomes)
}

#[derive(Debug, Clone, Default)]
pub struct PipelineRequest {
    pub reports: Vec<PathBuf>,
    pub context: Option<ReportContext>,
    pub forced_component: Option<String>,
    pub changed_components: Vec<String>,
    pub changed_files: Vec<String>,
    pub allow_duplicate: bool,
    pub notify: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutcome {
    pub run_id: String,
    pub ingested: Vec<IngestOutcome>,
    pub recompute: RecomputeSummary,
    pub active_guidance: Vec<GuidanceRule>,
    pub warnings: Vec<String>,
    pub section: String,
    pub dispatch: Option<DispatchReport>,
}

impl PipelineOutcome {
    pub fn has_failed_reports(&self) -> bool {
        self.ingested.iter().any(IngestOutcome::is_failed)
    }
}

/// Components named explicitly plus those implied by changed paths,
/// without duplicates.
pub fn resolve_changed_components(
    explicit: &[String],
    changed_files: &[String],
    attribution: &ComponentAttribution,
) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let implied = render::changed_components_from_paths(changed_files, attribution);
    for component in explicit.iter().chain(implied.iter()) {
        let component = component.trim();
        if !component.is_empty() && !out.iter().any(|c| c == component) {
            out.push(component.to_string());
        }
    }
    out
}

pub fn run_pipeline(
    config: &WardenConfig,
    store: &mut EventStore,
    dispatcher: &Dispatcher,
    request: &PipelineRequest,
) -> Result<PipelineOutcome, WardenError> {
    let ctx = request.context.clone().unwrap_or_else(|| ReportContext {
        run_id: time::new_run_id(),
        pr_id: None,
        commit_sha: String::new(),
        timestamp: time::now_epoch_z(),
    });
    let attribution = ComponentAttribution::from_rules(&config.components)?;
    let report_attribution = attribution.clone().forced(request.forced_component.clone());

    let ingested = ingest_report_files(
        store,
        &request.reports,
        &ctx,
        &report_attribution,
        request.allow_duplicate,
    )?;

    let engine = CorrelationEngine::from_config(config);
    let recompute = engine.recompute(store)?;

    let active_guidance = store.get_active_guidance()?;
    let renderer = GuidanceRenderer::new(&config.guidance.engine_tag);
    let changed =
        resolve_changed_components(&request.changed_components, &request.changed_files, &attribution);
    let warnings = renderer.build_warnings(&changed, &active_guidance);
    let section = renderer.render_section(&config.guidance.section_title, &active_guidance);

    let dispatch = if request.notify && !warnings.is_empty() {
        let body = format!("{}\n\n{}", warnings.join("\n"), section);
        Some(dispatcher.dispatch(&Notification {
            title: config.guidance.section_title.clone(),
            body,
        }))
    } else {
        None
    };

    tracing::info!(
        run_id = %ctx.run_id,
        reports = ingested.len(),
        failed = ingested.iter().filter(|o| o.is_failed()).count(),
        active = active_guidance.len(),
        warnings = warnings.len(),
        "pipeline complete"
    );

    Ok(PipelineOutcome {
        run_id: ctx.run_id,
        ingested,
        recompute,
        active_guidance,
        warnings,
        section,
        dispatch,
    })
}
