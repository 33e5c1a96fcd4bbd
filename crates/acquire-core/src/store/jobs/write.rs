//! Job mutations. Every state change is a compare-and-set on `state`.

use anyhow::Result;

use super::{state_guard, NewJob};
use crate::job::{ChecksumState, FailureCause, JobId, JobState, Transition};
use crate::planner::ChunkPlan;
use crate::store::chunks::insert_chunks;
use crate::store::db::{unix_timestamp, JobStore};

impl JobStore {
    /// Insert a job in `Created` together with its full chunk plan, atomically.
    pub async fn insert_job(&self, job: &NewJob, plan: &ChunkPlan) -> Result<JobId> {
        let now = unix_timestamp();
        let mut tx = self.pool.begin().await?;
        let id = sqlx::query(
            r#"
            INSERT INTO jobs (
                source, destination, filename, total_size, chunk_size,
                expected_digest, state, checksum_state, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
            "#,
        )
        .bind(&job.source)
        .bind(job.destination.to_string_lossy().into_owned())
        .bind(&job.filename)
        .bind(job.total_size as i64)
        .bind(job.chunk_size as i64)
        .bind(&job.expected_digest)
        .bind(JobState::Created.as_str())
        .bind(ChecksumState::Pending.as_str())
        .bind(now)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        insert_chunks(&mut tx, id, plan).await?;
        tx.commit().await?;
        Ok(id)
    }

    /// Apply `t` if the job is in one of `t.from`. Returns false when the
    /// guard did not match (wrong state or no such job); nothing changes then.
    pub async fn apply_transition(&self, id: JobId, t: Transition) -> Result<bool> {
        let sql = format!(
            "UPDATE jobs SET state = ?1, updated_at = ?2 WHERE id = ?3 AND {}",
            state_guard(4, t.from.len())
        );
        let mut q = sqlx::query(&sql)
            .bind(t.to.as_str())
            .bind(unix_timestamp())
            .bind(id);
        for st in t.from {
            q = q.bind(st.as_str());
        }
        let done = q.execute(&self.pool).await?;
        Ok(done.rows_affected() == 1)
    }

    /// Move a non-terminal job to `Failed`, recording why.
    pub async fn fail_job(&self, id: JobId, cause: FailureCause, detail: &str) -> Result<bool> {
        let t = Transition::FAIL;
        let sql = format!(
            "UPDATE jobs SET state = ?1, failure_cause = ?2, failure_detail = ?3, updated_at = ?4 \
             WHERE id = ?5 AND {}",
            state_guard(6, t.from.len())
        );
        let mut q = sqlx::query(&sql)
            .bind(t.to.as_str())
            .bind(cause.as_str())
            .bind(detail)
            .bind(unix_timestamp())
            .bind(id);
        for st in t.from {
            q = q.bind(st.as_str());
        }
        let done = q.execute(&self.pool).await?;
        Ok(done.rows_affected() == 1)
    }

    pub async fn set_checksum(
        &self,
        id: JobId,
        state: ChecksumState,
        value: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET checksum_state = ?1, checksum_value = ?2, updated_at = ?3
            WHERE id = ?4
            "#,
        )
        .bind(state.as_str())
        .bind(value)
        .bind(unix_timestamp())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Delete a job with its plan and staging rows. Only terminal jobs are
    /// deleted; returns false otherwise.
    pub async fn remove_job(&self, id: JobId) -> Result<bool> {
        let terminal = [JobState::Completed, JobState::Failed, JobState::Cancelled];
        let mut tx = self.pool.begin().await?;
        let sql = format!("DELETE FROM jobs WHERE id = ?1 AND {}", state_guard(2, terminal.len()));
        let mut q = sqlx::query(&sql).bind(id);
        for st in terminal {
            q = q.bind(st.as_str());
        }
        let removed = q.execute(&mut *tx).await?.rows_affected() == 1;
        if removed {
            sqlx::query("DELETE FROM chunks WHERE job_id = ?1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM staged_entries WHERE job_id = ?1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(removed)
    }

    /// Jobs whose pipeline was running when the process died go to `Paused`,
    /// so `resume` continues from the persisted plan. Returns how many moved.
    pub async fn recover_interrupted_jobs(&self) -> Result<u64> {
        let t = Transition::INTERRUPTED;
        let sql = format!(
            "UPDATE jobs SET state = ?1, updated_at = ?2 WHERE {}",
            state_guard(3, t.from.len())
        );
        let mut q = sqlx::query(&sql).bind(t.to.as_str()).bind(unix_timestamp());
        for st in t.from {
            q = q.bind(st.as_str());
        }
        let done = q.execute(&self.pool).await?;
        // An interrupted digest pass starts over on resume.
        sqlx::query(
            "UPDATE jobs SET checksum_state = 'pending' WHERE state = 'paused' AND checksum_state = 'calculating'",
        )
        .execute(&self.pool)
        .await?;
        Ok(done.rows_affected())
    }
}
