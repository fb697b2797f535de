//! Database migrations embedded at compile time.
//!
//! Migrations are sourced from `/migrations/` at the repo root and
//! embedded into the binary using `include_str!`, so the binary has no
//! runtime file dependencies.

use rusqlite::{Connection, Result};
use tracing::{info, warn};

/// A single migration with version identifier and SQL content.
struct Migration {
    version: &'static str,
    sql: &'static str,
}

/// All migrations in order.
///
/// Version names match the SQL filenames (without .sql extension).
/// The `schema_migrations` table tracks which have been applied.
const MIGRATIONS: &[Migration] = &[Migration {
    version: "001_usage_agent_index",
    sql: include_str!("../../migrations/001_usage_agent_index.sql"),
}];

/// Run all pending migrations on the database.
///
/// Already-applied migrations are skipped, so this runs on every open.
///
/// # Errors
///
/// Returns an error if a migration fails to apply. ALTER TABLE errors for
/// duplicate columns are logged and treated as applied, since the base
/// schema already has those columns.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version TEXT PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let applied: std::collections::HashSet<String> = conn
        .prepare("SELECT version FROM schema_migrations")?
        .query_map([], |row| row.get(0))?
        .collect::<Result<_, _>>()?;

    for migration in MIGRATIONS {
        if applied.contains(migration.version) {
            continue;
        }

        info!(version = migration.version, "Applying migration");

        if let Err(e) = conn.execute_batch(migration.sql) {
            if e.to_string().contains("duplicate column name") {
                warn!(
                    version = migration.version,
                    "Migration partially applied (columns exist), marking complete"
                );
            } else {
                return Err(e);
            }
        }

        conn.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
            rusqlite::params![migration.version, chrono::Utc::now().timestamp_millis()],
        )?;

        info!(version = migration.version, "Migration complete");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::schema::SCHEMA_SQL;

    fn migration_count(conn: &Connection) -> i64 {
        conn.query_row(
            "SELECT COUNT(*) FROM schema_migrations WHERE version NOT LIKE 'v%'",
            [],
            |row| row.get(0),
        )
        .unwrap()
    }

    #[test]
    fn test_run_migrations_fresh_db() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA_SQL).unwrap();
        run_migrations(&conn).expect("Migrations should apply to fresh database");
        assert_eq!(migration_count(&conn), MIGRATIONS.len() as i64);
    }

    #[test]
    fn test_run_migrations_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA_SQL).unwrap();

        run_migrations(&conn).expect("First run should succeed");
        run_migrations(&conn).expect("Second run should succeed");
        assert_eq!(migration_count(&conn), MIGRATIONS.len() as i64);
    }

    #[test]
    fn test_migrations_apply_cleanly_on_fresh_schema() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA_SQL).unwrap();

        // No migration may rely on the duplicate-column fallback
        for migration in MIGRATIONS {
            conn.execute_batch(migration.sql)
                .unwrap_or_else(|e| panic!("{} failed: {e}", migration.version));
        }
    }

    #[test]
    fn test_adds_usage_indexes_to_old_database() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE embedding_usage (
                id INTEGER PRIMARY KEY AUTOINCREMENT, embedding_id TEXT NOT NULL, agent_id TEXT,
                query TEXT NOT NULL, similarity REAL NOT NULL, owner_id TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );",
        )
        .unwrap();

        run_migrations(&conn).unwrap();

        let indexes: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master
                 WHERE type = 'index' AND name IN ('idx_usage_agent', 'idx_usage_owner')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(indexes, 2);
    }
}
