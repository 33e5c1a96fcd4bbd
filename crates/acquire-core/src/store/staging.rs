//! Staging Result rows: the per-entry outcome of the last extraction run.

use anyhow::{anyhow, Result};
use sqlx::Row;

use crate::job::JobId;
use crate::stager::{EntryOutcome, StagedEntry, StagingResult};
use crate::store::db::JobStore;

fn outcome_columns(outcome: &EntryOutcome) -> (&'static str, Option<&str>) {
    match outcome {
        EntryOutcome::Extracted => ("extracted", None),
        EntryOutcome::Skipped => ("skipped", None),
        EntryOutcome::Failed(err) => ("failed", Some(err.as_str())),
    }
}

impl JobStore {
    /// Replace the stored Staging Result of `job_id`.
    pub async fn record_staging(&self, job_id: JobId, result: &StagingResult) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM staged_entries WHERE job_id = ?1")
            .bind(job_id)
            .execute(&mut *tx)
            .await?;
        for (seq, entry) in result.entries.iter().enumerate() {
            let (outcome, error) = outcome_columns(&entry.outcome);
            sqlx::query(
                r#"
                INSERT INTO staged_entries (job_id, seq, name, size, outcome, error)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
            )
            .bind(job_id)
            .bind(seq as i64)
            .bind(&entry.name)
            .bind(entry.size as i64)
            .bind(outcome)
            .bind(error)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn staging_result(&self, job_id: JobId) -> Result<StagingResult> {
        let rows = sqlx::query(
            r#"
            SELECT name, size, outcome, error
            FROM staged_entries
            WHERE job_id = ?1
            ORDER BY seq ASC
            "#,
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let outcome: String = row.try_get("outcome")?;
            let error: Option<String> = row.try_get("error")?;
            let outcome = match outcome.as_str() {
                "extracted" => EntryOutcome::Extracted,
                "skipped" => EntryOutcome::Skipped,
                "failed" => EntryOutcome::Failed(error.unwrap_or_default()),
                other => return Err(anyhow!("unknown staging outcome {other:?} in database")),
            };
            entries.push(StagedEntry {
                name: row.try_get("name")?,
                size: row.try_get::<i64, _>("size")? as u64,
                outcome,
            });
        }
        Ok(StagingResult { entries })
    }
}
