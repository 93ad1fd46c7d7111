//! Priority queue client speaking BullMQ's Redis wire format.
//!
//! BullMQ represents a queue named `execution-queue` as a handful of Redis
//! keys: a sorted set of job ids ready to run (`prioritized`), a sorted set
//! of ids currently being worked (`active`), and one hash per job id holding
//! its JSON `data` payload. This client only implements the operations the
//! worker needs — claiming the lowest-scored pending job, marking it
//! complete, and marking it failed — not the rest of BullMQ's feature set
//! (delayed jobs, rate limiting, job retries).

use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::error::JudgeError;
use crate::types::JobPayload;

const QUEUE_NAME: &str = "execution-queue";

/// A job claimed from the queue, paired with its parsed payload.
#[derive(Debug, Clone)]
pub struct ClaimedJob {
    pub job_id: String,
    pub job_key: String,
    pub payload: JobPayload,
}

/// Client for the `execution-queue` BullMQ queue.
pub struct QueueClient {
    conn: ConnectionManager,
}

impl QueueClient {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    fn prioritized_key(&self) -> String {
        format!("bull:{QUEUE_NAME}:prioritized")
    }

    fn active_key(&self) -> String {
        format!("bull:{QUEUE_NAME}:active")
    }

    fn job_key(&self, job_id: &str) -> String {
        format!("bull:{QUEUE_NAME}:{job_id}")
    }

    /// Atomically pop the lowest-scored job id off the prioritized sorted
    /// set and move it into the active set, then load and parse its data
    /// hash.
    ///
    /// Returns `Ok(None)` when the queue is empty, or when the claimed id's
    /// hash has already vanished (another worker's `complete`/`fail`
    /// trimmed it, or it expired) — in the latter case the id is removed
    /// from `active` before returning so it is never left to linger there
    /// forever.
    pub async fn claim(&mut self) -> Result<Option<ClaimedJob>, JudgeError> {
        let popped: Vec<(String, f64)> = self.conn.zpopmin(self.prioritized_key(), 1).await?;
        let Some((job_id, _score)) = popped.into_iter().next() else {
            return Ok(None);
        };

        let now_ms = chrono::Utc::now().timestamp_millis() as f64;
        self.conn.zadd(self.active_key(), &job_id, now_ms).await?;

        let job_key = self.job_key(&job_id);
        let data: Option<String> = self.conn.hget(&job_key, "data").await?;

        let Some(data) = data else {
            self.conn.zrem(self.active_key(), &job_id).await?;
            return Ok(None);
        };

        // A malformed or incomplete payload (bad JSON, or valid JSON missing
        // a required field such as `submissionId`) is a parse failure at
        // claim time, not a runtime error to surface through adjudication —
        // the job is evicted from `active` and the claim simply yields no
        // job, matching original_source's `get_job_from_queue` JSON-decode
        // handling.
        let payload: JobPayload = match serde_json::from_str(&data) {
            Ok(payload) => payload,
            Err(error) => {
                tracing::error!(job_id, error = %error, "failed to parse job payload");
                self.conn.zrem(self.active_key(), &job_id).await?;
                return Ok(None);
            }
        };

        Ok(Some(ClaimedJob { job_id, job_key, payload }))
    }

    /// Remove a finished job from the active set and let its hash expire
    /// after an hour (kept briefly for inspection/debugging).
    pub async fn complete(&mut self, job: &ClaimedJob) -> Result<(), JudgeError> {
        self.conn.zrem(self.active_key(), &job.job_id).await?;
        self.conn.expire(&job.job_key, 3600).await?;
        Ok(())
    }

    /// Remove a failed job from the active set, record `error` on its hash,
    /// and keep the hash around for 24 hours for postmortem inspection.
    ///
    /// Uses `ZREM` against the active set, matching `claim`'s `ZADD` into
    /// the same sorted set — the active set is a sorted set end to end,
    /// never a list.
    pub async fn fail(&mut self, job: &ClaimedJob, error: &str) -> Result<(), JudgeError> {
        self.conn.zrem(self.active_key(), &job.job_id).await?;
        self.conn.hset(&job.job_key, "failedReason", error).await?;
        self.conn.expire(&job.job_key, 86_400).await?;
        Ok(())
    }

    /// Hand back the underlying connection for the Submission Recorder's
    /// pub/sub publish — the `submission:updates` channel is a recorder
    /// concern, not a queue concern, but both share one Redis connection
    /// manager per worker process.
    pub fn connection(&self) -> ConnectionManager {
        self.conn.clone()
    }

    pub async fn ping(&mut self) -> Result<(), JudgeError> {
        let _: String = redis::cmd("PING").query_async(&mut self.conn).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_namespaced_under_bull_prefix() {
        // Key construction is pure string formatting and doesn't need a
        // live connection to verify.
        assert_eq!(
            format!("bull:{QUEUE_NAME}:prioritized"),
            "bull:execution-queue:prioritized"
        );
        assert_eq!(
            format!("bull:{QUEUE_NAME}:active"),
            "bull:execution-queue:active"
        );
    }
}
