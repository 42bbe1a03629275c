//! Correlation engine: turns accumulated test events into guidance.
//!
//! Runs are the unit of evidence. A run *touches* a component when any of
//! its events is attributed to it, and *fails* when any of its events
//! failed. For each component:
//!
//! ```text
//! component_rate = failing runs touching C / runs touching C
//! baseline_rate  = failing runs not touching C / runs not touching C
//! lift           = component_rate / baseline_rate
//! ```
//!
//! Lift is undefined when no run lies outside C or the baseline rate is
//! zero; such a component can never activate. Support is the number of
//! distinct pull requests with a failed event attributed to C.
//!
//! Guidance entries move `Pending -> Active -> Retired` (and back to
//! `Active` when evidence returns). Only this module drives transitions.

use crate::core::config::WardenConfig;
use crate::core::error::WardenError;
use crate::core::model::{GuidanceRule, GuidanceStatus, StoredTestEvent, TestStatus};
use crate::core::store::{self, EventStore};
use rusqlite::Connection;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GuidanceThresholds {
    pub min_support: u32,
    pub min_lift: f64,
    /// Runs recorded after the last reinforcing run before an active rule
    /// retires.
    pub retire_after_runs: u32,
}

impl Default for GuidanceThresholds {
    fn default() -> Self {
        Self {
            min_support: 2,
            min_lift: 1.5,
            retire_after_runs: 20,
        }
    }
}

/// Per-component evidence over the whole event log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComponentStats {
    pub component: String,
    pub runs_touching: u32,
    pub failing_runs_touching: u32,
    pub runs_elsewhere: u32,
    pub failing_runs_elsewhere: u32,
    pub support_prs: u32,
    /// `None` when the baseline is empty or has a zero failure rate.
    pub lift: Option<f64>,
    /// Earliest / latest timestamp of a failed event attributed here.
    pub first_seen: Option<String>,
    pub last_seen: Option<String>,
    /// Runs recorded after the last run with failing evidence for this
    /// component; all runs when there is no such evidence.
    pub runs_since_evidence: u32,
}

impl ComponentStats {
    pub fn component_failure_rate(&self) -> f64 {
        ratio(self.failing_runs_touching, self.runs_touching)
    }

    pub fn baseline_failure_rate(&self) -> f64 {
        ratio(self.failing_runs_elsewhere, self.runs_elsewhere)
    }
}

fn ratio(num: u32, den: u32) -> f64 {
    if den == 0 {
        0.0
    } else {
        f64::from(num) / f64::from(den)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationSnapshot {
    pub total_runs: u32,
    pub failing_runs: u32,
    pub components: Vec<ComponentStats>,
}

impl CorrelationSnapshot {
    pub fn component(&self, name: &str) -> Option<&ComponentStats> {
        self.components.iter().find(|s| s.component == name)
    }
}

#[derive(Default)]
struct RunAgg<'a> {
    first_id: i64,
    failed: bool,
    components: FxHashSet<&'a str>,
}

#[derive(Default)]
struct EvidenceAgg<'a> {
    prs: FxHashSet<i64>,
    first_seen: Option<&'a str>,
    last_seen: Option<&'a str>,
    last_run: Option<usize>,
}

/// Pure statistics over `events` (any order; runs are ordered by their
/// lowest row id). Components come back sorted by name; unattributed
/// events count toward runs but never form a component.
pub fn component_stats(events: &[StoredTestEvent]) -> CorrelationSnapshot {
    let mut runs: FxHashMap<&str, RunAgg<'_>> = FxHashMap::default();
    for stored in events {
        let ev = &stored.event;
        let run = runs.entry(ev.run_id.as_str()).or_insert_with(|| RunAgg {
            first_id: stored.id,
            ..RunAgg::default()
        });
        run.first_id = run.first_id.min(stored.id);
        run.failed |= ev.status == TestStatus::Failed;
        if !ev.component.is_empty() {
            run.components.insert(ev.component.as_str());
        }
    }

    let mut ordered: Vec<(&str, &RunAgg<'_>)> = runs.iter().map(|(k, v)| (*k, v)).collect();
    ordered.sort_by_key(|(run_id, agg)| (agg.first_id, *run_id));
    let ordinal: FxHashMap<&str, usize> = ordered
        .iter()
        .enumerate()
        .map(|(idx, (run_id, _))| (*run_id, idx))
        .collect();

    let total_runs = ordered.len() as u32;
    let failing_runs = ordered.iter().filter(|(_, r)| r.failed).count() as u32;

    let mut evidence: FxHashMap<&str, EvidenceAgg<'_>> = FxHashMap::default();
    for stored in events {
        let ev = &stored.event;
        if ev.component.is_empty() || ev.status != TestStatus::Failed {
            continue;
        }
        let agg = evidence.entry(ev.component.as_str()).or_default();
        if let Some(pr) = ev.pr_id {
            agg.prs.insert(pr);
        }
        let ts = ev.timestamp.as_str();
        agg.first_seen = Some(agg.first_seen.map_or(ts, |cur| cur.min(ts)));
        agg.last_seen = Some(agg.last_seen.map_or(ts, |cur| cur.max(ts)));
        let run_idx = ordinal.get(ev.run_id.as_str()).copied();
        agg.last_run = agg.last_run.max(run_idx);
    }

    let mut names: Vec<&str> = ordered
        .iter()
        .flat_map(|(_, r)| r.components.iter().copied())
        .collect::<FxHashSet<_>>()
        .into_iter()
        .collect();
    names.sort_unstable();

    let components = names
        .into_iter()
        .map(|name| {
            let runs_touching = ordered
                .iter()
                .filter(|(_, r)| r.components.contains(name))
                .count() as u32;
            let failing_runs_touching = ordered
                .iter()
                .filter(|(_, r)| r.failed && r.components.contains(name))
                .count() as u32;
            let runs_elsewhere = total_runs - runs_touching;
            let failing_runs_elsewhere = failing_runs - failing_runs_touching;

            let baseline = ratio(failing_runs_elsewhere, runs_elsewhere);
            let lift = if runs_elsewhere == 0 || baseline == 0.0 {
                None
            } else {
                Some(ratio(failing_runs_touching, runs_touching) / baseline)
            };

            let ev = evidence.get(name);
            let runs_since_evidence = match ev.and_then(|e| e.last_run) {
                Some(idx) => total_runs - 1 - idx as u32,
                None => total_runs,
            };

            ComponentStats {
                component: name.to_string(),
                runs_touching,
                failing_runs_touching,
                runs_elsewhere,
                failing_runs_elsewhere,
                support_prs: ev.map_or(0, |e| e.prs.len() as u32),
                lift,
                first_seen: ev.and_then(|e| e.first_seen).map(str::to_string),
                last_seen: ev.and_then(|e| e.last_seen).map(str::to_string),
                runs_since_evidence,
            }
        })
        .collect();

    CorrelationSnapshot {
        total_runs,
        failing_runs,
        components,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RecomputeSummary {
    pub total_runs: u32,
    pub components: usize,
    pub activated: Vec<String>,
    pub reinforced: Vec<String>,
    pub retired: Vec<String>,
}

impl RecomputeSummary {
    pub fn changed(&self) -> bool {
        !(self.activated.is_empty() && self.reinforced.is_empty() && self.retired.is_empty())
    }
}

pub struct CorrelationEngine {
    thresholds: GuidanceThresholds,
    commands: FxHashMap<String, String>,
}

impl CorrelationEngine {
    pub fn new(thresholds: GuidanceThresholds) -> Self {
        Self {
            thresholds,
            commands: FxHashMap::default(),
        }
    }

    pub fn from_config(config: &WardenConfig) -> Self {
        let thresholds = GuidanceThresholds {
            min_support: config.guidance.min_support,
            min_lift: config.guidance.min_lift,
            retire_after_runs: config.guidance.retire_after_runs,
        };
        let mut engine = Self::new(thresholds);
        for rule in &config.components {
            if let Some(cmd) = &rule.command {
                engine = engine.with_command(&rule.name, cmd);
            }
        }
        engine
    }

    /// Command named in guidance for `component`.
    pub fn with_command(mut self, component: &str, command: &str) -> Self {
        self.commands
            .insert(component.to_string(), command.trim().to_string());
        self
    }

    pub fn thresholds(&self) -> &GuidanceThresholds {
        &self.thresholds
    }

    pub fn describe(&self, component: &str) -> String {
        match self.commands.get(component) {
            Some(cmd) => format!("Run `{cmd}` before merging changes to {component}"),
            None => format!("Run the {component} test suites before merging changes to {component}"),
        }
    }

    fn qualifies(&self, stats: &ComponentStats) -> bool {
        stats.support_prs >= self.thresholds.min_support
            && stats
                .lift
                .is_some_and(|lift| lift.is_finite() && lift >= self.thresholds.min_lift)
    }

    fn is_stale(&self, runs_since_evidence: u32) -> bool {
        runs_since_evidence > self.thresholds.retire_after_runs
    }

    /// Recompute guidance over everything in `store`. Reads and writes
    /// happen in one immediate transaction, so concurrent recomputes
    /// serialize and each sees a consistent event log.
    pub fn recompute(&self, store: &mut EventStore) -> Result<RecomputeSummary, WardenError> {
        let summary = store.write("correlate.recompute", |tx| {
            let events = store::load_test_events(tx)?;
            let snapshot = component_stats(&events);
            let existing = store::query_guidance(tx, None)?;
            self.apply(tx, &snapshot, &existing)
        })?;
        tracing::info!(
            runs = summary.total_runs,
            components = summary.components,
            activated = summary.activated.len(),
            reinforced = summary.reinforced.len(),
            retired = summary.retired.len(),
            "guidance recomputed"
        );
        Ok(summary)
    }

    fn apply(
        &self,
        conn: &Connection,
        snapshot: &CorrelationSnapshot,
        existing: &[GuidanceRule],
    ) -> Result<RecomputeSummary, WardenError> {
        let mut summary = RecomputeSummary {
            total_runs: snapshot.total_runs,
            components: snapshot.components.len(),
            ..RecomputeSummary::default()
        };
        let mut current_active: FxHashSet<&str> = FxHashSet::default();

        for stats in &snapshot.components {
            let description = self.describe(&stats.component);
            let prior = existing
                .iter()
                .find(|r| r.component == stats.component && r.description == description);
            let state = prior.map_or(GuidanceStatus::Pending, |r| r.status);
            let stale = self.is_stale(stats.runs_since_evidence);

            if self.qualifies(stats) && !stale {
                let rule = GuidanceRule {
                    component: stats.component.clone(),
                    description,
                    support_prs: stats.support_prs,
                    lift: stats.lift.unwrap_or_default(),
                    status: GuidanceStatus::Active,
                    first_seen: stats.first_seen.clone().unwrap_or_default(),
                    last_seen: stats.last_seen.clone().unwrap_or_default(),
                };
                match prior {
                    Some(p) if p.status == GuidanceStatus::Active => {
                        if p.support_prs != rule.support_prs
                            || p.lift != rule.lift
                            || p.last_seen != rule.last_seen
                        {
                            store::upsert_guidance(conn, &rule)?;
                            summary.reinforced.push(rule.component.clone());
                        }
                    }
                    _ => {
                        store::upsert_guidance(conn, &rule)?;
                        tracing::info!(
                            component = %rule.component,
                            from = state.as_str(),
                            support_prs = rule.support_prs,
                            lift = rule.lift,
                            "guidance activated"
                        );
                        summary.activated.push(rule.component.clone());
                    }
                }
                current_active.insert(stats.component.as_str());
            } else if state == GuidanceStatus::Active {
                if stale {
                    if store::retire_guidance(conn, &stats.component, &description)? {
                        tracing::info!(
                            component = %stats.component,
                            runs_since_evidence = stats.runs_since_evidence,
                            "guidance retired"
                        );
                        summary.retired.push(stats.component.clone());
                    }
                } else {
                    // Below threshold but still recent: keep last stats.
                    current_active.insert(stats.component.as_str());
                }
            }
        }

        // Active rows the loop above did not own: their description was
        // superseded, or their component no longer appears in any run.
        for rule in existing.iter().filter(|r| r.status == GuidanceStatus::Active) {
            if rule.description == self.describe(&rule.component)
                && snapshot.component(&rule.component).is_some()
            {
                continue;
            }
            let runs_since = snapshot
                .component(&rule.component)
                .map_or(snapshot.total_runs, |s| s.runs_since_evidence);
            let superseded = current_active.contains(rule.component.as_str());
            if (superseded || self.is_stale(runs_since))
                && store::retire_guidance(conn, &rule.component, &rule.description)?
            {
                tracing::info!(
                    component = %rule.component,
                    superseded,
                    "guidance retired"
                );
                summary.retired.push(rule.component.clone());
            }
        }

        Ok(summary)
    }
}
