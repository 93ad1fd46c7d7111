//! Run a full submission against its test cases and compute a final verdict.
//!
//! This is the per-submission loop: for each test case, invoke the
//! [`crate::engine`] once and fold its [`ExecutionResult`] into the running
//! [`SubmissionResult`]. The short-circuit rules are load-bearing:
//!
//! - An unparsable `language` tag never reaches the engine — the submission
//!   is immediately [`Verdict::RuntimeError`] with zero test results.
//! - A [`ExecutionError::CompilationError`] on any test case stops the whole
//!   submission immediately with [`Verdict::CompilationError`], carrying only
//!   the one test case result that triggered it.
//! - A [`ExecutionError::TimeLimitExceeded`] stops the whole submission
//!   immediately with [`Verdict::TimeLimitExceeded`], keeping every test
//!   result gathered so far.
//! - A [`ExecutionError::RuntimeError`] does **not** stop the submission —
//!   adjudication continues through the remaining test cases so the
//!   submitter sees the full picture, and the final verdict becomes
//!   [`Verdict::RuntimeError`] only if no later test case also hits a
//!   compile/timeout short-circuit.

use tracing::{debug, info};

use crate::engine;
use crate::sandbox::ContainerRuntime;
use crate::types::{
    ExecutionConfig, ExecutionError, Language, SubmissionResult, TestCase, TestCaseResult, Verdict,
};

/// Adjudicate `code` in `language` against every entry in `test_cases`.
///
/// `submission_id` is used only for sandbox name uniqueness and log
/// correlation — it does not affect judging outcomes.
pub async fn adjudicate<R: ContainerRuntime>(
    runtime: &R,
    submission_id: &str,
    language_tag: &str,
    code: &str,
    test_cases: &[TestCase],
    config: &ExecutionConfig,
) -> SubmissionResult {
    let Some(language) = Language::parse(language_tag) else {
        return SubmissionResult {
            submission_id: submission_id.to_string(),
            verdict: Verdict::RuntimeError,
            test_results: Vec::new(),
            total_execution_time_ms: 0,
            max_memory_used_kb: 0,
            stdout: String::new(),
            stderr: format!("Unsupported language: {language_tag}"),
            passed_count: 0,
            total_count: test_cases.len(),
        };
    };

    info!(submission_id, language = language_tag, test_count = test_cases.len(), "adjudication starting");

    let mut test_results = Vec::with_capacity(test_cases.len());
    let mut total_execution_time_ms: u64 = 0;
    let mut max_memory_used_kb: u64 = 0;
    let mut all_stdout = Vec::new();
    let mut all_stderr = Vec::new();

    for test_case in test_cases {
        debug!(submission_id, test_case_id = test_case.id, "running test case");

        let result = engine::run(runtime, language, code, &test_case.input, config).await;

        total_execution_time_ms += result.execution_time_ms;
        max_memory_used_kb = max_memory_used_kb.max(result.memory_used_kb);
        if !result.stdout.is_empty() {
            all_stdout.push(result.stdout.clone());
        }
        if !result.stderr.is_empty() {
            all_stderr.push(result.stderr.clone());
        }

        if let Some(ExecutionError::CompilationError { message }) = &result.error {
            test_results.push(TestCaseResult {
                test_case_id: test_case.id,
                passed: false,
                output: result.stdout.clone(),
                expected_output: test_case.expected_output.clone(),
                execution_time_ms: result.execution_time_ms,
                error: Some(result.stderr.clone()),
            });
            return SubmissionResult {
                submission_id: submission_id.to_string(),
                verdict: Verdict::CompilationError,
                test_results,
                total_execution_time_ms,
                max_memory_used_kb,
                stdout: result.stdout,
                stderr: if result.stderr.is_empty() { message.clone() } else { result.stderr },
                passed_count: 0,
                total_count: test_cases.len(),
            };
        }

        if result.timed_out {
            test_results.push(TestCaseResult {
                test_case_id: test_case.id,
                passed: false,
                output: result.stdout,
                expected_output: test_case.expected_output.clone(),
                execution_time_ms: result.execution_time_ms,
                error: Some("Time Limit Exceeded".to_string()),
            });
            let passed_count = test_results.iter().filter(|r| r.passed).count();
            return SubmissionResult {
                submission_id: submission_id.to_string(),
                verdict: Verdict::TimeLimitExceeded,
                test_results,
                total_execution_time_ms,
                max_memory_used_kb,
                stdout: all_stdout.join("\n"),
                stderr: all_stderr.join("\n"),
                passed_count,
                total_count: test_cases.len(),
            };
        }

        if matches!(result.error, Some(ExecutionError::RuntimeError { .. }) | Some(ExecutionError::InternalError { .. })) {
            let message = match &result.error {
                Some(ExecutionError::RuntimeError { message }) => message.clone(),
                Some(ExecutionError::InternalError { message }) => message.clone(),
                _ => unreachable!(),
            };
            // The "Runtime" substring is load-bearing: the final verdict
            // computation below scans test_results for it.
            let error = if message.is_empty() {
                "Runtime Error".to_string()
            } else {
                format!("Runtime Error: {message}")
            };
            test_results.push(TestCaseResult {
                test_case_id: test_case.id,
                passed: false,
                output: result.stdout,
                expected_output: test_case.expected_output.clone(),
                execution_time_ms: result.execution_time_ms,
                error: Some(error),
            });
            continue;
        }

        let passed = crate::normalize::outputs_match(&result.stdout, &test_case.expected_output, false);
        test_results.push(TestCaseResult {
            test_case_id: test_case.id,
            passed,
            output: result.stdout,
            expected_output: test_case.expected_output.clone(),
            execution_time_ms: result.execution_time_ms,
            error: if passed { None } else { Some("Wrong Answer".to_string()) },
        });
    }

    let passed_count = test_results.iter().filter(|r| r.passed).count();
    let has_runtime_error = test_results.iter().any(|r| matches!(&r.error, Some(e) if e.contains("Runtime")));

    let verdict = if passed_count == test_cases.len() {
        Verdict::Accepted
    } else if has_runtime_error {
        Verdict::RuntimeError
    } else {
        Verdict::WrongAnswer
    };

    info!(
        submission_id,
        verdict = verdict.human(),
        passed = passed_count,
        total = test_cases.len(),
        total_execution_time_ms,
        "adjudication completed"
    );

    SubmissionResult {
        submission_id: submission_id.to_string(),
        verdict,
        test_results,
        total_execution_time_ms,
        max_memory_used_kb,
        stdout: all_stdout.join("\n"),
        stderr: all_stderr.join("\n"),
        passed_count,
        total_count: test_cases.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::fake::FakeRuntime;

    fn test_case(id: i64, input: &str, expected: &str) -> TestCase {
        TestCase { id, input: input.to_string(), expected_output: expected.to_string() }
    }

    #[tokio::test]
    async fn all_passing_is_accepted() {
        let runtime = FakeRuntime::new().with_exit_code(0).with_stdout("6");
        let cases = vec![test_case(1, "", "6"), test_case(2, "", "6")];
        let result = adjudicate(&runtime, "sub-1", "python", "print(6)", &cases, &ExecutionConfig::default()).await;
        assert_eq!(result.verdict, Verdict::Accepted);
        assert_eq!(result.passed_count, 2);
    }

    #[tokio::test]
    async fn mismatched_output_is_wrong_answer() {
        let runtime = FakeRuntime::new().with_exit_code(0).with_stdout("5");
        let cases = vec![test_case(1, "", "6")];
        let result = adjudicate(&runtime, "sub-2", "python", "print(5)", &cases, &ExecutionConfig::default()).await;
        assert_eq!(result.verdict, Verdict::WrongAnswer);
        assert_eq!(result.passed_count, 0);
    }

    #[tokio::test]
    async fn unknown_language_short_circuits_without_executing() {
        let runtime = FakeRuntime::new();
        let cases = vec![test_case(1, "", "6")];
        let result = adjudicate(&runtime, "sub-3", "cobol", "IDENTIFICATION DIVISION.", &cases, &ExecutionConfig::default()).await;
        assert_eq!(result.verdict, Verdict::RuntimeError);
        assert!(result.test_results.is_empty());
        assert_eq!(runtime.run_exec_count(), 0);
    }

    #[tokio::test]
    async fn compile_error_short_circuits_remaining_cases() {
        let runtime = FakeRuntime::new().with_compile_exit_code(1).with_stderr("error: expected ';'");
        let cases = vec![test_case(1, "", "6"), test_case(2, "", "7"), test_case(3, "", "8")];
        let result = adjudicate(&runtime, "sub-4", "cpp", "int main() {", &cases, &ExecutionConfig::default()).await;
        assert_eq!(result.verdict, Verdict::CompilationError);
        assert_eq!(result.test_results.len(), 1, "only the first test case's compile attempt should appear");
    }

    #[tokio::test]
    async fn timeout_short_circuits_remaining_cases() {
        let runtime = FakeRuntime::new().with_exit_code(0).with_elapsed(std::time::Duration::from_secs(999));
        let mut config = ExecutionConfig::default();
        config.timeout = std::time::Duration::from_millis(1);
        let cases = vec![test_case(1, "", "6"), test_case(2, "", "7")];
        let result = adjudicate(&runtime, "sub-5", "python", "while True: pass", &cases, &config).await;
        assert_eq!(result.verdict, Verdict::TimeLimitExceeded);
        assert_eq!(result.test_results.len(), 1, "the second test case must not run after a timeout");
    }

    #[tokio::test]
    async fn runtime_error_continues_to_remaining_cases() {
        let runtime = FakeRuntime::new().with_exit_code(1).with_stderr("Traceback (most recent call last)");
        let cases = vec![test_case(1, "", "6"), test_case(2, "", "7")];
        let result = adjudicate(&runtime, "sub-6", "python", "raise Exception()", &cases, &ExecutionConfig::default()).await;
        assert_eq!(result.verdict, Verdict::RuntimeError);
        assert_eq!(result.test_results.len(), 2, "runtime errors must not short-circuit");
        assert_eq!(runtime.run_exec_count(), 2);
    }
}
