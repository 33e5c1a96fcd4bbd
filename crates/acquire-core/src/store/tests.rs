//! Store tests against the in-memory database.

use std::path::PathBuf;

use crate::job::{ChecksumState, FailureCause, JobState, Transition};
use crate::planner::{ChunkPlan, ChunkState, PlanError};
use crate::stager::{EntryOutcome, StagedEntry, StagingResult};
use crate::store::{open_memory, NewJob};

const MIB: u64 = 1024 * 1024;

fn new_job(total: u64, chunk: u64) -> NewJob {
    NewJob {
        source: "https://example.com/game.zip".to_string(),
        destination: PathBuf::from("/tmp/acquire-test"),
        filename: "game.zip".to_string(),
        total_size: total,
        chunk_size: chunk,
        expected_digest: None,
    }
}

#[tokio::test]
async fn insert_and_get_job_with_plan() {
    let db = open_memory().await.unwrap();
    let plan = ChunkPlan::new(100 * MIB, 10 * MIB);
    let id = db.insert_job(&new_job(100 * MIB, 10 * MIB), &plan).await.unwrap();

    let rec = db.get_job(id).await.unwrap().unwrap();
    assert_eq!(rec.state, JobState::Created);
    assert_eq!(rec.filename, "game.zip");
    assert_eq!(rec.total_size, 100 * MIB);
    assert_eq!(rec.checksum_state, ChecksumState::Pending);
    assert!(rec.failure.is_none());
    assert_eq!(rec.part_path(), PathBuf::from("/tmp/acquire-test/game.zip.part"));
    assert_eq!(rec.staging_dir(), PathBuf::from("/tmp/acquire-test/game"));

    let loaded = db.load_plan(id, 100 * MIB, 10 * MIB).await.unwrap().unwrap();
    assert_eq!(loaded.len(), 10);
    assert_eq!(loaded.count(ChunkState::Pending), 10);
    assert!(db.get_job(id + 1).await.unwrap().is_none());
}

#[tokio::test]
async fn chunk_transitions_survive_reload() {
    let db = open_memory().await.unwrap();
    let plan = ChunkPlan::new(100 * MIB, 10 * MIB);
    let id = db.insert_job(&new_job(100 * MIB, 10 * MIB), &plan).await.unwrap();

    for idx in 0..4 {
        db.set_chunk_state(id, idx, ChunkState::Done, 0).await.unwrap();
    }
    db.set_chunk_state(id, 4, ChunkState::InFlight, 0).await.unwrap();
    db.set_chunk_state(id, 5, ChunkState::Failed, 2).await.unwrap();

    let plan = db.load_plan(id, 100 * MIB, 10 * MIB).await.unwrap().unwrap();
    assert_eq!(plan.count(ChunkState::Done), 4);
    // An in-flight range from a dead process is fetched again.
    assert_eq!(plan.state(4), Some(ChunkState::Pending));
    assert_eq!(plan.failures(5), 2);
    assert_eq!(plan.progress_percent(), 40.0);
    assert_eq!(db.done_bytes(id).await.unwrap(), 40 * MIB);

    let jobs = db.list_jobs().await.unwrap();
    assert_eq!(jobs[0].downloaded_bytes, 40 * MIB);
    assert_eq!(jobs[0].progress_percent(), 40.0);
}

#[tokio::test]
async fn corrupted_plan_is_reported() {
    let db = open_memory().await.unwrap();
    let plan = ChunkPlan::new(30, 10);
    let id = db.insert_job(&new_job(30, 10), &plan).await.unwrap();

    sqlx::query("UPDATE chunks SET start_offset = 12 WHERE job_id = ?1 AND idx = 1")
        .bind(id)
        .execute(&db.pool)
        .await
        .unwrap();
    let res = db.load_plan(id, 30, 10).await.unwrap();
    assert!(matches!(res, Err(PlanError::Corruption(_))));

    sqlx::query("DELETE FROM chunks WHERE job_id = ?1 AND idx = 2")
        .bind(id)
        .execute(&db.pool)
        .await
        .unwrap();
    sqlx::query("UPDATE chunks SET start_offset = 10 WHERE job_id = ?1 AND idx = 1")
        .bind(id)
        .execute(&db.pool)
        .await
        .unwrap();
    let res = db.load_plan(id, 30, 10).await.unwrap();
    assert!(matches!(res, Err(PlanError::Corruption(_))));

    sqlx::query("UPDATE chunks SET state = 'bogus' WHERE job_id = ?1 AND idx = 0")
        .bind(id)
        .execute(&db.pool)
        .await
        .unwrap();
    let res = db.load_plan(id, 20, 10).await.unwrap();
    assert!(matches!(res, Err(PlanError::Corruption(_))));
}

#[tokio::test]
async fn transitions_are_compare_and_set() {
    let db = open_memory().await.unwrap();
    let id = db
        .insert_job(&new_job(10, 10), &ChunkPlan::new(10, 10))
        .await
        .unwrap();

    assert!(db.apply_transition(id, Transition::START).await.unwrap());
    // Second start loses: the job is no longer Created or Paused.
    assert!(!db.apply_transition(id, Transition::START).await.unwrap());
    assert_eq!(db.job_state(id).await.unwrap(), Some(JobState::Downloading));

    assert!(db.apply_transition(id, Transition::PAUSE).await.unwrap());
    assert!(!db.apply_transition(id, Transition::VERIFY).await.unwrap());
    assert!(db.apply_transition(id, Transition::RESUME).await.unwrap());
    assert!(db.apply_transition(id, Transition::VERIFY).await.unwrap());
    assert_eq!(db.job_state(id).await.unwrap(), Some(JobState::Verifying));

    assert!(!db.apply_transition(id + 99, Transition::CANCEL).await.unwrap());
    assert_eq!(db.job_state(id + 99).await.unwrap(), None);
}

#[tokio::test]
async fn failure_cause_is_retained() {
    let db = open_memory().await.unwrap();
    let id = db
        .insert_job(&new_job(10, 10), &ChunkPlan::new(10, 10))
        .await
        .unwrap();
    db.apply_transition(id, Transition::START).await.unwrap();
    db.apply_transition(id, Transition::VERIFY).await.unwrap();
    db.set_checksum(id, ChecksumState::Mismatch, Some("abc"))
        .await
        .unwrap();
    assert!(db
        .fail_job(id, FailureCause::IntegrityFailure, "expected x, got abc")
        .await
        .unwrap());
    // Terminal: a second failure does not overwrite the first.
    assert!(!db.fail_job(id, FailureCause::Storage, "late").await.unwrap());

    let rec = db.get_job(id).await.unwrap().unwrap();
    assert_eq!(rec.state, JobState::Failed);
    assert_eq!(
        rec.failure,
        Some((FailureCause::IntegrityFailure, "expected x, got abc".to_string()))
    );
    assert_eq!(rec.checksum_state, ChecksumState::Mismatch);
    assert_eq!(rec.checksum_value.as_deref(), Some("abc"));
    assert_eq!(
        db.list_jobs().await.unwrap()[0].failure,
        Some(FailureCause::IntegrityFailure)
    );
}

#[tokio::test]
async fn remove_only_terminal_jobs() {
    let db = open_memory().await.unwrap();
    let id = db
        .insert_job(&new_job(30, 10), &ChunkPlan::new(30, 10))
        .await
        .unwrap();
    assert!(!db.remove_job(id).await.unwrap());

    db.apply_transition(id, Transition::CANCEL).await.unwrap();
    assert!(db.remove_job(id).await.unwrap());
    assert!(db.get_job(id).await.unwrap().is_none());
    let (left,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM chunks WHERE job_id = ?1")
        .bind(id)
        .fetch_one(&db.pool)
        .await
        .unwrap();
    assert_eq!(left, 0);
}

#[tokio::test]
async fn recover_interrupted_jobs_pauses_them() {
    let db = open_memory().await.unwrap();
    let mut ids = Vec::new();
    for _ in 0..3 {
        ids.push(
            db.insert_job(&new_job(10, 10), &ChunkPlan::new(10, 10))
                .await
                .unwrap(),
        );
    }
    db.apply_transition(ids[0], Transition::START).await.unwrap();
    db.apply_transition(ids[1], Transition::START).await.unwrap();
    db.apply_transition(ids[1], Transition::VERIFY).await.unwrap();
    db.set_checksum(ids[1], ChecksumState::Calculating, None)
        .await
        .unwrap();

    assert_eq!(db.recover_interrupted_jobs().await.unwrap(), 2);
    assert_eq!(db.job_state(ids[0]).await.unwrap(), Some(JobState::Paused));
    assert_eq!(db.job_state(ids[1]).await.unwrap(), Some(JobState::Paused));
    assert_eq!(db.job_state(ids[2]).await.unwrap(), Some(JobState::Created));
    let rec = db.get_job(ids[1]).await.unwrap().unwrap();
    assert_eq!(rec.checksum_state, ChecksumState::Pending);
}

#[tokio::test]
async fn list_jobs_newest_first() {
    let db = open_memory().await.unwrap();
    let a = db
        .insert_job(&new_job(10, 10), &ChunkPlan::new(10, 10))
        .await
        .unwrap();
    let b = db
        .insert_job(&new_job(10, 10), &ChunkPlan::new(10, 10))
        .await
        .unwrap();
    let ids: Vec<_> = db.list_jobs().await.unwrap().iter().map(|j| j.id).collect();
    assert_eq!(ids, vec![b, a]);
}

#[tokio::test]
async fn staging_result_roundtrip_replaces_previous() {
    let db = open_memory().await.unwrap();
    let id = db
        .insert_job(&new_job(10, 10), &ChunkPlan::new(10, 10))
        .await
        .unwrap();
    let first = StagingResult {
        entries: vec![StagedEntry {
            name: "a.txt".into(),
            size: 3,
            outcome: EntryOutcome::Failed("crc mismatch".into()),
        }],
    };
    db.record_staging(id, &first).await.unwrap();
    let second = StagingResult {
        entries: vec![
            StagedEntry {
                name: "a.txt".into(),
                size: 3,
                outcome: EntryOutcome::Extracted,
            },
            StagedEntry {
                name: "b.txt".into(),
                size: 5,
                outcome: EntryOutcome::Skipped,
            },
        ],
    };
    db.record_staging(id, &second).await.unwrap();
    assert_eq!(db.staging_result(id).await.unwrap(), second);
}
