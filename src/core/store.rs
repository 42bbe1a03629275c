//! Durable event store for test observations and derived guidance.
//!
//! An [`EventStore`] only exists once its connection is open and its schema
//! is current: [`EventStore::open`] either returns a fully migrated store or
//! fails. The store owns every persisted row; callers hand it
//! [`TestEvent`]s and read back owned copies.
//!
//! Writes go through [`EventStore::write`], which runs the closure in an
//! immediate transaction and retries lock contention under the configured
//! [`LockPolicy`].

use crate::core::db;
use crate::core::error::WardenError;
use crate::core::lock::{LockPolicy, retry_on_busy};
use crate::core::migration;
use crate::core::model::{
    GuidanceRule, GuidanceStatus, IngestRun, StoredTestEvent, TestEvent, TestStatus,
};
use rusqlite::{Connection, OptionalExtension, Row, Transaction, TransactionBehavior, params};
use std::path::{Path, PathBuf};

pub struct EventStore {
    conn: Connection,
    path: PathBuf,
    policy: LockPolicy,
    schema_version: u32,
}

impl EventStore {
    /// Open (creating if needed) and migrate the store at `path`.
    pub fn open(path: &Path, policy: LockPolicy) -> Result<Self, WardenError> {
        let mut conn = retry_on_busy(&policy, "store.open", || db::db_connect(path, &policy))?;
        let schema_version = migration::migrate(&mut conn, &policy)?;
        tracing::debug!(path = %path.display(), schema_version, "event store ready");
        Ok(Self {
            conn,
            path: path.to_path_buf(),
            policy,
            schema_version,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn schema_version(&self) -> u32 {
        self.schema_version
    }

    pub fn lock_policy(&self) -> &LockPolicy {
        &self.policy
    }

    /// Run `f` inside an immediate transaction, retrying busy/locked errors.
    /// `f` may run more than once, so it must not have effects outside the
    /// transaction.
    pub fn write<F, R>(&mut self, op: &str, mut f: F) -> Result<R, WardenError>
    where
        F: FnMut(&Transaction<'_>) -> Result<R, WardenError>,
    {
        let policy = self.policy;
        let conn = &mut self.conn;
        retry_on_busy(&policy, op, || {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let out = f(&tx)?;
            tx.commit()?;
            Ok(out)
        })
    }

    /// Read-only access; retried like writes so a reader racing a
    /// migration in another process waits instead of failing.
    pub fn read<F, R>(&self, op: &str, mut f: F) -> Result<R, WardenError>
    where
        F: FnMut(&Connection) -> Result<R, WardenError>,
    {
        retry_on_busy(&self.policy, op, || f(&self.conn))
    }

    /// Append one event. No dedup is performed; submitting the same report
    /// twice stores its events twice.
    pub fn record_test_event(&mut self, event: &TestEvent) -> Result<i64, WardenError> {
        self.write("store.record_test_event", |tx| insert_test_event(tx, event))
    }

    /// Append a batch in a single transaction. Returns the number of rows.
    pub fn record_test_events(&mut self, events: &[TestEvent]) -> Result<usize, WardenError> {
        self.write("store.record_test_events", |tx| {
            for event in events {
                insert_test_event(tx, event)?;
            }
            Ok(events.len())
        })
    }

    pub fn load_test_events(&self) -> Result<Vec<StoredTestEvent>, WardenError> {
        self.read("store.load_test_events", |conn| load_test_events(conn))
    }

    pub fn event_count(&self) -> Result<u64, WardenError> {
        self.read("store.event_count", |conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM test_events", [], |row| row.get(0))?;
            Ok(count.max(0) as u64)
        })
    }

    /// Every `active` rule, ordered by component then description.
    pub fn get_active_guidance(&self) -> Result<Vec<GuidanceRule>, WardenError> {
        self.read("store.get_active_guidance", |conn| {
            query_guidance(conn, Some("active"))
        })
    }

    /// Active and retired rules; retired rows are kept for audit.
    pub fn get_all_guidance(&self) -> Result<Vec<GuidanceRule>, WardenError> {
        self.read("store.get_all_guidance", |conn| query_guidance(conn, None))
    }

    /// Append a report's events and its ledger row atomically. Unless
    /// `allow_duplicate`, a digest already in the ledger appends nothing and
    /// yields `None`; the lookup shares the write transaction.
    pub fn record_ingest(
        &mut self,
        run: &IngestRun,
        events: &[TestEvent],
        allow_duplicate: bool,
    ) -> Result<Option<usize>, WardenError> {
        self.write("store.record_ingest", |tx| {
            if !allow_duplicate {
                let seen = tx
                    .query_row(
                        "SELECT 1 FROM ingest_runs WHERE report_digest = ?1 LIMIT 1",
                        params![run.report_digest],
                        |_| Ok(()),
                    )
                    .optional()?;
                if seen.is_some() {
                    return Ok(None);
                }
            }
            for event in events {
                insert_test_event(tx, event)?;
            }
            tx.execute(
                "INSERT INTO ingest_runs(run_id, source, report_digest, event_count, warning_count, ingested_at)
                 VALUES(?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    run.run_id,
                    run.source,
                    run.report_digest,
                    run.event_count as i64,
                    run.warning_count as i64,
                    run.ingested_at
                ],
            )?;
            Ok(Some(events.len()))
        })
    }
}

fn insert_test_event(conn: &Connection, event: &TestEvent) -> Result<i64, WardenError> {
    conn.execute(
        "INSERT INTO test_events(run_id, pr_id, commit_sha, test_id, suite, status, duration_ms, component, file_hint, ts)
         VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            event.run_id,
            event.pr_id,
            event.commit_sha,
            event.test_id,
            event.suite,
            event.status.as_str(),
            i64::try_from(event.duration_ms).unwrap_or(i64::MAX),
            event.component,
            event.file_hint,
            event.timestamp
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub(crate) fn load_test_events(conn: &Connection) -> Result<Vec<StoredTestEvent>, WardenError> {
    let mut stmt = conn.prepare(
        "SELECT id, run_id, pr_id, commit_sha, test_id, suite, status, duration_ms, component, file_hint, ts
         FROM test_events ORDER BY id ASC",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(6)?,
            TestEvent {
                run_id: row.get(1)?,
                pr_id: row.get(2)?,
                commit_sha: row.get(3)?,
                test_id: row.get(4)?,
                suite: row.get(5)?,
                status: TestStatus::Passed,
                duration_ms: row.get::<_, i64>(7)?.max(0) as u64,
                component: row.get(8)?,
                file_hint: row.get(9)?,
                timestamp: row.get(10)?,
            },
        ))
    })?;

    let mut out = Vec::new();
    for r in rows {
        let (id, status, mut event) = r?;
        event.status = status.parse()?;
        out.push(StoredTestEvent { id, event });
    }
    Ok(out)
}

pub(crate) fn query_guidance(
    conn: &Connection,
    status: Option<&str>,
) -> Result<Vec<GuidanceRule>, WardenError> {
    let mut stmt = conn.prepare(
        "SELECT component, description, support_prs, lift, status, first_seen, last_seen
         FROM guidance_rules
         WHERE ?1 IS NULL OR status = ?1
         ORDER BY component ASC, description ASC",
    )?;
    let rows = stmt.query_map(params![status], guidance_from_row)?;
    let mut out = Vec::new();
    for r in rows {
        let (rule, status) = r?;
        out.push(GuidanceRule {
            status: status.parse()?,
            ..rule
        });
    }
    Ok(out)
}

fn guidance_from_row(row: &Row<'_>) -> rusqlite::Result<(GuidanceRule, String)> {
    Ok((
        GuidanceRule {
            component: row.get(0)?,
            description: row.get(1)?,
            support_prs: row.get(2)?,
            lift: row.get(3)?,
            status: GuidanceStatus::Active,
            first_seen: row.get(5)?,
            last_seen: row.get(6)?,
        },
        row.get(4)?,
    ))
}

/// Insert or update a rule keyed by `(component, description)`.
/// `first_seen` is only written on insert.
pub(crate) fn upsert_guidance(conn: &Connection, rule: &GuidanceRule) -> Result<(), WardenError> {
    if rule.support_prs < 1 {
        return Err(WardenError::ValidationError(format!(
            "guidance for '{}' needs at least one supporting PR",
            rule.component
        )));
    }
    if !rule.lift.is_finite() {
        return Err(WardenError::ValidationError(format!(
            "guidance for '{}' has undefined lift",
            rule.component
        )));
    }
    conn.execute(
        "INSERT INTO guidance_rules(component, description, support_prs, lift, status, first_seen, last_seen)
         VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(component, description) DO UPDATE SET
            support_prs = excluded.support_prs,
            lift = excluded.lift,
            status = excluded.status,
            last_seen = excluded.last_seen",
        params![
            rule.component,
            rule.description,
            rule.support_prs,
            rule.lift,
            rule.status.as_str(),
            rule.first_seen,
            rule.last_seen
        ],
    )?;
    Ok(())
}

pub(crate) fn retire_guidance(
    conn: &Connection,
    component: &str,
    description: &str,
) -> Result<bool, WardenError> {
    let changed = conn.execute(
        "UPDATE guidance_rules SET status = 'retired'
         WHERE component = ?1 AND description = ?2 AND status = 'active'",
        params![component, description],
    )?;
    Ok(changed > 0)
}
