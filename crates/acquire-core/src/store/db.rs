//! Connection setup and schema. Row-level operations live in the sibling modules.

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Handle to the job database. Cheap to clone; clones share the pool.
///
/// Default location: `~/.local/state/acquire/jobs.db`.
#[derive(Clone, Debug)]
pub struct JobStore {
    pub(crate) pool: Pool<Sqlite>,
}

impl JobStore {
    /// Open (or create) the default database and run migrations.
    pub async fn open_default() -> Result<Self> {
        let xdg_dirs = xdg::BaseDirectories::with_prefix("acquire")?;
        let db_path = xdg_dirs.get_state_home().join("jobs.db");
        Self::open_at(db_path).await
    }

    /// Open (or create) the database at `path`, creating parent directories.
    pub async fn open_at(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("create {}", parent.display()))?;
        }
        let opts = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(opts)
            .await
            .with_context(|| format!("open job database {}", path.display()))?;
        let db = JobStore { pool };
        db.migrate().await?;
        Ok(db)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source TEXT NOT NULL,
                destination TEXT NOT NULL,
                filename TEXT NOT NULL,
                total_size INTEGER NOT NULL,
                chunk_size INTEGER NOT NULL,
                expected_digest TEXT,
                state TEXT NOT NULL,
                failure_cause TEXT,
                failure_detail TEXT,
                checksum_state TEXT NOT NULL DEFAULT 'pending',
                checksum_value TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        // (job_id, idx) orders the plan; start/end are kept so a load can
        // check the partition instead of trusting the index.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chunks (
                job_id INTEGER NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
                idx INTEGER NOT NULL,
                start_offset INTEGER NOT NULL,
                end_offset INTEGER NOT NULL,
                state TEXT NOT NULL,
                failures INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (job_id, idx)
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS staged_entries (
                job_id INTEGER NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
                seq INTEGER NOT NULL,
                name TEXT NOT NULL,
                size INTEGER NOT NULL,
                outcome TEXT NOT NULL,
                error TEXT,
                PRIMARY KEY (job_id, seq)
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// Current time as Unix seconds.
pub(crate) fn unix_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// Open an in-memory database for tests. One connection, since every
/// `:memory:` connection is its own database.
#[cfg(test)]
pub(crate) async fn open_memory() -> Result<JobStore> {
    use std::str::FromStr;

    let opts = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(opts)
        .await?;
    let db = JobStore { pool };
    db.migrate().await?;
    Ok(db)
}
