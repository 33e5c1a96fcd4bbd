//! Chunk plan persistence: one row per range.

use anyhow::Result;
use sqlx::{Row, Sqlite, Transaction};

use crate::job::JobId;
use crate::planner::{Chunk, ChunkPlan, ChunkState, PlanError};
use crate::store::db::{unix_timestamp, JobStore};

pub(crate) async fn insert_chunks(
    tx: &mut Transaction<'_, Sqlite>,
    job_id: JobId,
    plan: &ChunkPlan,
) -> Result<()> {
    for (idx, chunk) in plan.chunks().iter().enumerate() {
        let state = plan.state(idx).unwrap_or(ChunkState::Pending);
        sqlx::query(
            r#"
            INSERT INTO chunks (job_id, idx, start_offset, end_offset, state, failures)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(job_id)
        .bind(idx as i64)
        .bind(chunk.start as i64)
        .bind(chunk.end as i64)
        .bind(state.as_str())
        .bind(plan.failures(idx) as i64)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

impl JobStore {
    /// Rebuild the plan of `job_id`. The outer error is a database failure;
    /// the inner one means the rows exist but do not describe a valid plan.
    pub async fn load_plan(
        &self,
        job_id: JobId,
        total_size: u64,
        chunk_size: u64,
    ) -> Result<Result<ChunkPlan, PlanError>> {
        let rows = sqlx::query(
            r#"
            SELECT idx, start_offset, end_offset, state, failures
            FROM chunks
            WHERE job_id = ?1
            ORDER BY idx ASC
            "#,
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;

        let mut parsed = Vec::with_capacity(rows.len());
        for (expected_idx, row) in rows.iter().enumerate() {
            let idx: i64 = row.try_get("idx")?;
            let start: i64 = row.try_get("start_offset")?;
            let end: i64 = row.try_get("end_offset")?;
            let state: String = row.try_get("state")?;
            let failures: i64 = row.try_get("failures")?;

            if idx != expected_idx as i64 {
                return Ok(Err(PlanError::Corruption(format!(
                    "missing chunk row {expected_idx}"
                ))));
            }
            if start < 0 || end < 0 || failures < 0 {
                return Ok(Err(PlanError::Corruption(format!(
                    "chunk {idx} has negative fields"
                ))));
            }
            let Some(state) = ChunkState::parse(&state) else {
                return Ok(Err(PlanError::Corruption(format!(
                    "chunk {idx} has unknown state {state:?}"
                ))));
            };
            let chunk = Chunk {
                start: start as u64,
                end: end as u64,
            };
            parsed.push((chunk, state, failures as u32));
        }

        Ok(ChunkPlan::from_rows(total_size, chunk_size, parsed))
    }

    /// Persist one range transition. Called before the coordinator moves on.
    pub async fn set_chunk_state(
        &self,
        job_id: JobId,
        idx: usize,
        state: ChunkState,
        failures: u32,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            UPDATE chunks SET state = ?1, failures = ?2
            WHERE job_id = ?3 AND idx = ?4
            "#,
        )
        .bind(state.as_str())
        .bind(failures as i64)
        .bind(job_id)
        .bind(idx as i64)
        .execute(&mut *tx)
        .await?;
        sqlx::query("UPDATE jobs SET updated_at = ?1 WHERE id = ?2")
            .bind(unix_timestamp())
            .bind(job_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Bytes covered by Done ranges.
    pub async fn done_bytes(&self, job_id: JobId) -> Result<u64> {
        let (bytes,): (i64,) = sqlx::query_as(
            r#"
            SELECT COALESCE(SUM(end_offset - start_offset), 0)
            FROM chunks
            WHERE job_id = ?1 AND state = 'done'
            "#,
        )
        .bind(job_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(bytes.max(0) as u64)
    }
}
