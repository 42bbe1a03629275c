//! Versioned schema migrations for the guidance store.
//!
//! Every `EventStore::open` calls [`migrate`]. The whole pending chain runs
//! inside one `BEGIN IMMEDIATE` transaction:
//!
//! - **Single winner**: the first opener takes the write lock; concurrent
//!   openers wait on it (busy timeout + [`retry_on_busy`]) and then re-read
//!   the version inside their own transaction, finding nothing to do.
//! - **All or nothing**: a failing step rolls the transaction back, so the
//!   file stays at its previous, still-valid version.
//! - **Idempotent**: each step checks the shape it is about to change.

use crate::core::db;
use crate::core::error::WardenError;
use crate::core::lock::{LockPolicy, is_busy_error, retry_on_busy};
use crate::core::schemas;
use crate::core::time;
use rusqlite::{Connection, Transaction, TransactionBehavior, params};

/// Column name older tooling used for the commit identifier. `commit` is an
/// SQL keyword, so every statement touching it had to quote it.
pub const LEGACY_COMMIT_COLUMN: &str = "commit";

/// Migration definition
pub struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub up: fn(&Transaction<'_>) -> Result<(), WardenError>,
}

/// All migrations in chronological order
pub fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Create test_events and guidance_rules tables",
            up: migrate_base_tables,
        },
        Migration {
            version: 2,
            description: "Move legacy \"commit\" column to commit_sha",
            up: migrate_legacy_commit_column,
        },
        Migration {
            version: 3,
            description: "Create ingest_runs ledger and lookup indexes",
            up: migrate_ingest_ledger,
        },
    ]
}

/// Bring the schema to [`schemas::CURRENT_SCHEMA_VERSION`]. Returns the
/// version the store ends at.
pub fn migrate(conn: &mut Connection, policy: &LockPolicy) -> Result<u32, WardenError> {
    retry_on_busy(policy, "store.migrate", || apply_pending(&mut *conn))
}

pub fn current_version(conn: &Connection) -> Result<u32, WardenError> {
    if !db::table_exists(conn, "schema_migrations")? {
        return Ok(0);
    }
    let version: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;
    Ok(version)
}

fn apply_pending(conn: &mut Connection) -> Result<u32, WardenError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    tx.execute(schemas::SCHEMA_MIGRATIONS, [])?;

    let current = current_version(&tx)?;
    if current > schemas::CURRENT_SCHEMA_VERSION {
        return Err(WardenError::SchemaMigrationError(format!(
            "store is at schema version {current}, this build supports up to {}",
            schemas::CURRENT_SCHEMA_VERSION
        )));
    }
    if current == schemas::CURRENT_SCHEMA_VERSION {
        return Ok(current);
    }

    for migration in all_migrations().into_iter().filter(|m| m.version > current) {
        tracing::info!(
            version = migration.version,
            description = migration.description,
            "applying schema migration"
        );
        (migration.up)(&tx).map_err(|e| step_failure(&migration, e))?;
        tx.execute(
            "INSERT INTO schema_migrations(version, description, applied_at) VALUES(?1, ?2, ?3)",
            params![migration.version, migration.description, time::now_epoch_z()],
        )
        .map_err(|e| step_failure(&migration, e.into()))?;
    }

    tx.commit()?;
    Ok(schemas::CURRENT_SCHEMA_VERSION)
}

// Busy errors stay raw so `retry_on_busy` can see them.
fn step_failure(migration: &Migration, err: WardenError) -> WardenError {
    if is_busy_error(&err) {
        return err;
    }
    WardenError::SchemaMigrationError(format!(
        "v{} ({}): {}",
        migration.version, migration.description, err
    ))
}

fn migrate_base_tables(tx: &Transaction<'_>) -> Result<(), WardenError> {
    tx.execute(schemas::TEST_EVENTS_SCHEMA, [])?;
    tx.execute(schemas::GUIDANCE_RULES_SCHEMA, [])?;
    Ok(())
}

fn migrate_legacy_commit_column(tx: &Transaction<'_>) -> Result<(), WardenError> {
    if !db::column_exists(tx, "test_events", LEGACY_COMMIT_COLUMN)? {
        return Ok(());
    }
    if !db::column_exists(tx, "test_events", "commit_sha")? {
        tx.execute(
            "ALTER TABLE test_events ADD COLUMN commit_sha TEXT NOT NULL DEFAULT ''",
            [],
        )?;
    }
    let copied = tx.execute(
        "UPDATE test_events SET commit_sha = COALESCE(\"commit\", '') WHERE commit_sha = ''",
        [],
    )?;
    tx.execute("ALTER TABLE test_events DROP COLUMN \"commit\"", [])?;
    tracing::info!(rows = copied, "moved legacy commit column to commit_sha");
    Ok(())
}

fn migrate_ingest_ledger(tx: &Transaction<'_>) -> Result<(), WardenError> {
    tx.execute(schemas::INGEST_RUNS_SCHEMA, [])?;
    tx.execute_batch(schemas::INDEXES)?;
    Ok(())
}
