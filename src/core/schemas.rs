//! Centralized database schema definitions for the guidance store.
//!
//! ciwarden keeps a single SQLite file ("guidance.db") with three tables:
//! 1. test_events: append-only log of normalized test observations.
//! 2. guidance_rules: derived guidance keyed by (component, description).
//! 3. ingest_runs: one ledger row per ingested report.

pub const GUIDANCE_DB_NAME: &str = "guidance.db";

/// Highest migration version this build knows how to apply.
pub const CURRENT_SCHEMA_VERSION: u32 = 3;

pub const SCHEMA_MIGRATIONS: &str = "
    CREATE TABLE IF NOT EXISTS schema_migrations (
        version INTEGER PRIMARY KEY,
        description TEXT NOT NULL,
        applied_at TEXT NOT NULL
    )
";

pub const TEST_EVENTS_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS test_events (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        run_id TEXT NOT NULL,
        pr_id INTEGER,
        commit_sha TEXT NOT NULL DEFAULT '',
        test_id TEXT NOT NULL,
        suite TEXT NOT NULL,
        status TEXT NOT NULL, -- passed | failed | skipped
        duration_ms INTEGER NOT NULL DEFAULT 0 CHECK(duration_ms >= 0),
        component TEXT NOT NULL DEFAULT '',
        file_hint TEXT NOT NULL DEFAULT '',
        ts TEXT NOT NULL
    )
";

pub const GUIDANCE_RULES_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS guidance_rules (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        component TEXT NOT NULL,
        description TEXT NOT NULL,
        support_prs INTEGER NOT NULL CHECK(support_prs >= 1),
        lift REAL NOT NULL,
        status TEXT NOT NULL DEFAULT 'active', -- active | retired
        first_seen TEXT NOT NULL,
        last_seen TEXT NOT NULL,
        UNIQUE(component, description)
    )
";

pub const INGEST_RUNS_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS ingest_runs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        run_id TEXT NOT NULL,
        source TEXT NOT NULL,
        report_digest TEXT NOT NULL,
        event_count INTEGER NOT NULL,
        warning_count INTEGER NOT NULL,
        ingested_at TEXT NOT NULL
    )
";

pub const INDEXES: &str = "
    CREATE INDEX IF NOT EXISTS idx_test_events_run ON test_events(run_id);
    CREATE INDEX IF NOT EXISTS idx_test_events_component ON test_events(component, status);
    CREATE INDEX IF NOT EXISTS idx_guidance_status ON guidance_rules(status);
    CREATE INDEX IF NOT EXISTS idx_ingest_runs_digest ON ingest_runs(report_digest);
";
