//! Persisted outbox for side effects that must leave the request path.
//!
//! Jobs are delivered at most once: a reserved job is never handed out again,
//! and jobs orphaned in `processing` by a crashed worker are failed rather
//! than requeued.

use chrono::{NaiveDateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Job, NewJob};
use crate::schema::jobs;

pub const STATUS_QUEUED: &str = "queued";
pub const STATUS_PROCESSING: &str = "processing";
pub const STATUS_SUCCEEDED: &str = "succeeded";
pub const STATUS_FAILED: &str = "failed";

pub const JOB_SEND_EMAIL_NOTIFICATION: &str = "send-email-notification";

const ORPHANED_JOB_ERROR: &str = "worker stopped while job was processing";

#[derive(Debug, Error)]
pub enum JobQueueError {
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
    #[error("invalid job payload: {0}")]
    Payload(#[from] serde_json::Error),
}

pub type JobQueueResult<T> = Result<T, JobQueueError>;

pub fn enqueue_job<P: Serialize>(
    conn: &mut PgConnection,
    job_type: &str,
    payload: &P,
    run_after: Option<NaiveDateTime>,
) -> JobQueueResult<Job> {
    let new_job = NewJob {
        id: Uuid::new_v4(),
        job_type: job_type.to_string(),
        payload: serde_json::to_value(payload)?,
        status: STATUS_QUEUED.to_string(),
        run_after: run_after.unwrap_or_else(|| Utc::now().naive_utc()),
    };

    let job = diesel::insert_into(jobs::table)
        .values(&new_job)
        .get_result(conn)?;
    Ok(job)
}

pub fn reserve_job(conn: &mut PgConnection, job_types: &[&str]) -> JobQueueResult<Option<Job>> {
    let now = Utc::now().naive_utc();

    conn.transaction(|conn| {
        let job_opt = jobs::table
            .filter(jobs::status.eq(STATUS_QUEUED))
            .filter(jobs::run_after.le(now))
            .filter(jobs::job_type.eq_any(job_types))
            .order(jobs::run_after.asc())
            .for_update()
            .skip_locked()
            .first::<Job>(conn)
            .optional()?;

        match job_opt {
            Some(job) => {
                let reserved = diesel::update(jobs::table.find(job.id))
                    .set((
                        jobs::status.eq(STATUS_PROCESSING),
                        jobs::attempts.eq(job.attempts + 1),
                        jobs::updated_at.eq(now),
                    ))
                    .get_result::<Job>(conn)?;
                Ok::<Option<Job>, diesel::result::Error>(Some(reserved))
            }
            None => Ok(None),
        }
    })
    .map_err(JobQueueError::from)
}

pub fn mark_job_succeeded(conn: &mut PgConnection, job_id: Uuid) -> JobQueueResult<()> {
    diesel::update(jobs::table.find(job_id))
        .set((
            jobs::status.eq(STATUS_SUCCEEDED),
            jobs::last_error.eq::<Option<String>>(None),
            jobs::updated_at.eq(Utc::now().naive_utc()),
        ))
        .execute(conn)?;
    Ok(())
}

pub fn mark_job_failed(
    conn: &mut PgConnection,
    job_id: Uuid,
    error_message: &str,
) -> JobQueueResult<()> {
    diesel::update(jobs::table.find(job_id))
        .set((
            jobs::status.eq(STATUS_FAILED),
            jobs::last_error.eq(Some(error_message.to_string())),
            jobs::updated_at.eq(Utc::now().naive_utc()),
        ))
        .execute(conn)?;
    Ok(())
}

/// Fails every job still marked `processing`. Returns how many were touched.
pub fn fail_orphaned_jobs(conn: &mut PgConnection, job_types: &[&str]) -> JobQueueResult<usize> {
    let updated = diesel::update(
        jobs::table
            .filter(jobs::status.eq(STATUS_PROCESSING))
            .filter(jobs::job_type.eq_any(job_types)),
    )
    .set((
        jobs::status.eq(STATUS_FAILED),
        jobs::last_error.eq(Some(ORPHANED_JOB_ERROR.to_string())),
        jobs::updated_at.eq(Utc::now().naive_utc()),
    ))
    .execute(conn)?;
    Ok(updated)
}
