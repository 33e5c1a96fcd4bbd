//! Job queries: single record, listing, and bare state lookups.

use anyhow::{anyhow, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::path::PathBuf;

use crate::job::{ChecksumState, FailureCause, JobId, JobRecord, JobState, JobSummary};
use crate::store::db::JobStore;

pub(super) fn parse_state(raw: &str) -> Result<JobState> {
    JobState::parse(raw).ok_or_else(|| anyhow!("unknown job state {raw:?} in database"))
}

fn record_from_row(row: &SqliteRow) -> Result<JobRecord> {
    let state: String = row.try_get("state")?;
    let cause: Option<String> = row.try_get("failure_cause")?;
    let detail: Option<String> = row.try_get("failure_detail")?;
    let checksum_state: String = row.try_get("checksum_state")?;
    let destination: String = row.try_get("destination")?;

    let failure = match cause {
        Some(c) => {
            let cause = FailureCause::parse(&c)
                .ok_or_else(|| anyhow!("unknown failure cause {c:?} in database"))?;
            Some((cause, detail.unwrap_or_default()))
        }
        None => None,
    };

    Ok(JobRecord {
        id: row.try_get("id")?,
        source: row.try_get("source")?,
        destination: PathBuf::from(destination),
        filename: row.try_get("filename")?,
        total_size: row.try_get::<i64, _>("total_size")? as u64,
        chunk_size: row.try_get::<i64, _>("chunk_size")? as u64,
        expected_digest: row.try_get("expected_digest")?,
        state: parse_state(&state)?,
        failure,
        checksum_state: ChecksumState::parse(&checksum_state)
            .ok_or_else(|| anyhow!("unknown checksum state {checksum_state:?} in database"))?,
        checksum_value: row.try_get("checksum_value")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

impl JobStore {
    pub async fn get_job(&self, id: JobId) -> Result<Option<JobRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, source, destination, filename, total_size, chunk_size,
                   expected_digest, state, failure_cause, failure_detail,
                   checksum_state, checksum_value, created_at, updated_at
            FROM jobs
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(record_from_row).transpose()
    }

    pub async fn job_state(&self, id: JobId) -> Result<Option<JobState>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT state FROM jobs WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|(s,)| parse_state(&s)).transpose()
    }

    /// All jobs, newest first, with downloaded bytes summed from Done ranges.
    pub async fn list_jobs(&self) -> Result<Vec<JobSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT j.id, j.source, j.filename, j.state, j.total_size, j.failure_cause,
                   COALESCE(SUM(CASE WHEN c.state = 'done'
                                     THEN c.end_offset - c.start_offset END), 0) AS done_bytes
            FROM jobs j
            LEFT JOIN chunks c ON c.job_id = j.id
            GROUP BY j.id
            ORDER BY j.created_at DESC, j.id DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let state: String = row.try_get("state")?;
            let cause: Option<String> = row.try_get("failure_cause")?;
            out.push(JobSummary {
                id: row.try_get("id")?,
                source: row.try_get("source")?,
                filename: row.try_get("filename")?,
                state: parse_state(&state)?,
                total_size: row.try_get::<i64, _>("total_size")? as u64,
                downloaded_bytes: row.try_get::<i64, _>("done_bytes")? as u64,
                failure: cause.as_deref().and_then(FailureCause::parse),
            });
        }
        Ok(out)
    }
}
