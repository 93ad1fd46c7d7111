//! Submission Recorder — persists verdicts to the relational store and
//! publishes realtime status updates.
//!
//! Two sinks, always written in the same order (relational store first,
//! then pub/sub): a Postgres `submissions` row and a Redis pub/sub message
//! on `submission:updates` for WebSocket delivery to the frontend. Grounds
//! on original_source's `update_submission_db` (the single parameterized
//! `UPDATE ... SET ... CASE WHEN` statement) and `publish_status_update`.

use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::Serialize;
use sqlx::PgPool;

use crate::error::JudgeError;
use crate::types::{SubmissionResult, TestCaseResult, Verdict};

/// Persists `submissions` rows and publishes realtime status updates.
pub struct SubmissionRecorder {
    pool: PgPool,
    redis: ConnectionManager,
}

impl SubmissionRecorder {
    pub fn new(pool: PgPool, redis: ConnectionManager) -> Self {
        Self { pool, redis }
    }

    /// Mark a submission as picked up: `status = 'processing'`, sets
    /// `started_at`, and publishes a `"Running"` status update.
    pub async fn mark_running(&mut self, submission_id: &str) -> Result<(), JudgeError> {
        self.update_row(submission_id, "processing", None, None, None).await?;
        self.publish(submission_id, "Running", &RunningExtra {}).await
    }

    /// Persist a submission's final verdict and publish the completion
    /// event carrying per-test-case results for the frontend.
    pub async fn record_result(&mut self, result: &SubmissionResult) -> Result<(), JudgeError> {
        let db_status = result.verdict.db_status();
        let error_message = if result.verdict == Verdict::Accepted {
            None
        } else {
            Some(result.stderr.as_str())
        };

        self.update_row(
            &result.submission_id,
            db_status,
            Some(result.total_execution_time_ms as i64),
            memory_usage_bytes(result.max_memory_used_kb),
            error_message,
        )
        .await?;

        let extra = CompletionExtra {
            execution_time_ms: result.total_execution_time_ms,
            memory_used_kb: result.max_memory_used_kb,
            test_results: result.test_results.iter().map(WireTestResult::from).collect(),
            passed_count: result.passed_count,
            total_count: result.total_count,
        };
        self.publish(&result.submission_id, result.verdict.human(), &extra).await
    }

    async fn update_row(
        &self,
        submission_id: &str,
        status: &str,
        execution_time_ms: Option<i64>,
        memory_usage_bytes: Option<i64>,
        error_message: Option<&str>,
    ) -> Result<(), JudgeError> {
        const TERMINAL: &[&str] = &[
            "accepted",
            "wrong_answer",
            "time_limit_exceeded",
            "runtime_error",
            "compilation_error",
            "system_error",
        ];
        let completed = TERMINAL.contains(&status);
        let started = status == "processing";

        sqlx::query(
            r#"
            UPDATE submissions
            SET status = $1,
                execution_time = $2,
                memory_usage = $3,
                error_message = $4,
                completed_at = CASE WHEN $5 THEN NOW() ELSE completed_at END,
                started_at = CASE WHEN $6 THEN NOW() ELSE started_at END
            WHERE id = $7
            "#,
        )
        .bind(status)
        .bind(execution_time_ms)
        .bind(memory_usage_bytes)
        .bind(error_message)
        .bind(completed)
        .bind(started)
        .bind(submission_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn publish<T: Serialize>(&mut self, submission_id: &str, status: &str, extra: &T) -> Result<(), JudgeError> {
        #[derive(Serialize)]
        struct Envelope<'a, T> {
            #[serde(rename = "submissionId")]
            submission_id: &'a str,
            status: &'a str,
            timestamp: String,
            #[serde(flatten)]
            extra: &'a T,
        }

        let envelope = Envelope {
            submission_id,
            status,
            timestamp: format!("{}Z", Utc::now().format("%Y-%m-%dT%H:%M:%S%.f")),
            extra,
        };
        let body = serde_json::to_string(&envelope).map_err(JudgeError::MalformedPayload)?;
        self.redis.publish("submission:updates", body).await?;
        Ok(())
    }
}

/// Convert a memory sample into the bytes value stored in the
/// `memory_usage` column. `0` is `sample_memory_kb`'s own failure sentinel,
/// not a measured zero-byte reading, so it maps to `NULL` rather than a
/// false `0` row — matching original_source's
/// `max_memory_used_kb * 1024 if max_memory_used_kb else None`.
fn memory_usage_bytes(max_memory_used_kb: u64) -> Option<i64> {
    if max_memory_used_kb == 0 {
        None
    } else {
        Some(max_memory_used_kb as i64 * 1024)
    }
}

#[derive(Serialize)]
struct RunningExtra {}

#[derive(Serialize)]
struct CompletionExtra {
    #[serde(rename = "executionTimeMs")]
    execution_time_ms: u64,
    #[serde(rename = "memoryUsedKb")]
    memory_used_kb: u64,
    #[serde(rename = "testResults")]
    test_results: Vec<WireTestResult>,
    #[serde(rename = "passedCount")]
    passed_count: usize,
    #[serde(rename = "totalCount")]
    total_count: usize,
}

#[derive(Serialize)]
struct WireTestResult {
    #[serde(rename = "testCaseId")]
    test_case_id: i64,
    passed: bool,
    output: String,
    #[serde(rename = "executionTimeMs")]
    execution_time_ms: u64,
    error: Option<String>,
}

impl From<&TestCaseResult> for WireTestResult {
    fn from(r: &TestCaseResult) -> Self {
        Self {
            test_case_id: r.test_case_id,
            passed: r.passed,
            output: r.output.clone(),
            execution_time_ms: r.execution_time_ms,
            error: r.error.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn db_status_covers_every_terminal_verdict() {
        for verdict in [
            Verdict::Accepted,
            Verdict::WrongAnswer,
            Verdict::TimeLimitExceeded,
            Verdict::RuntimeError,
            Verdict::CompilationError,
        ] {
            assert_ne!(verdict.db_status(), "system_error");
        }
    }

    #[test]
    fn memory_usage_bytes_maps_zero_sample_to_null() {
        assert_eq!(memory_usage_bytes(0), None);
    }

    #[test]
    fn memory_usage_bytes_converts_kilobytes_to_bytes() {
        assert_eq!(memory_usage_bytes(2), Some(2048));
    }

    #[test]
    fn wire_test_result_preserves_fields() {
        let result = TestCaseResult {
            test_case_id: 3,
            passed: false,
            output: "x".to_string(),
            expected_output: "y".to_string(),
            execution_time_ms: 12,
            error: Some("Wrong Answer".to_string()),
        };
        let wire = WireTestResult::from(&result);
        assert_eq!(wire.test_case_id, 3);
        assert_eq!(wire.error.as_deref(), Some("Wrong Answer"));
    }
}
