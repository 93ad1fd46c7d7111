//! Foundational public types for the judge-core library.
//!
//! This module defines the data that flows between components:
//! - [`Language`] and [`LanguageSpec`] — the static per-language configuration table
//! - [`ExecutionConfig`] — process-wide sandbox resource limits
//! - [`TestCase`] / [`JobPayload`] — the inputs of a submission
//! - [`ExecutionResult`] / [`TestCaseResult`] / [`SubmissionResult`] — the outputs
//! - [`Verdict`] — the final human-facing outcome of a submission

use serde::{Deserialize, Serialize};

// ── Language ──────────────────────────────────────────────────────────────────

/// Supported submission languages.
///
/// The variance across languages is purely data (image, file name, compile
/// argv, run argv) — see [`LanguageSpec`] and [`Language::spec`]. There is no
/// per-language behavior beyond this table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    Javascript,
    Java,
    Cpp,
}

impl Language {
    /// Parse a language tag as received in a job payload (`"python"`,
    /// `"javascript"`, `"java"`, `"cpp"`, case-insensitive). Returns `None`
    /// for any other tag — the caller (the Adjudicator) maps that to an
    /// immediate `RuntimeError` verdict without attempting execution.
    pub fn parse(tag: &str) -> Option<Self> {
        match tag.to_ascii_lowercase().as_str() {
            "python" => Some(Language::Python),
            "javascript" => Some(Language::Javascript),
            "java" => Some(Language::Java),
            "cpp" | "c++" => Some(Language::Cpp),
            _ => None,
        }
    }

    /// The static image/filename/command configuration for this language.
    pub fn spec(self) -> &'static LanguageSpec {
        match self {
            Language::Python => &LanguageSpec {
                preferred_image: "judge/python-runner:latest",
                fallback_image: "python:3.11-alpine",
                source_file: "solution.py",
                compile_cmd: None,
                run_cmd: &["python", "/scratch/solution.py"],
            },
            Language::Javascript => &LanguageSpec {
                preferred_image: "judge/javascript-runner:latest",
                fallback_image: "node:20-alpine",
                source_file: "solution.js",
                compile_cmd: None,
                run_cmd: &["node", "/scratch/solution.js"],
            },
            Language::Java => &LanguageSpec {
                preferred_image: "judge/java-runner:latest",
                fallback_image: "openjdk:17-alpine",
                source_file: "Solution.java",
                compile_cmd: Some(&["javac", "/scratch/Solution.java"]),
                run_cmd: &["java", "-cp", "/scratch", "Solution"],
            },
            Language::Cpp => &LanguageSpec {
                preferred_image: "judge/cpp-runner:latest",
                fallback_image: "gcc:11",
                source_file: "solution.cpp",
                compile_cmd: Some(&["g++", "-o", "/scratch/solution", "/scratch/solution.cpp", "-O2"]),
                run_cmd: &["/scratch/solution"],
            },
        }
    }
}

/// Static per-language image and command configuration.
///
/// This is configuration, not runtime input: it never varies based on a
/// job's contents.
#[derive(Debug, Clone, Copy)]
pub struct LanguageSpec {
    /// Pinned custom image, tried first.
    pub preferred_image: &'static str,
    /// Public image used when the preferred image is absent locally.
    pub fallback_image: &'static str,
    /// File name the source is written under in the sandbox scratch dir.
    pub source_file: &'static str,
    /// Compile argv, or `None` for interpreted languages.
    pub compile_cmd: Option<&'static [&'static str]>,
    /// Run argv.
    pub run_cmd: &'static [&'static str],
}

// ── Job / TestCase ────────────────────────────────────────────────────────────

/// A single test case: fed to the program as stdin, compared against
/// `expected_output`. Immutable once constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    pub id: i64,
    pub input: String,
    #[serde(rename = "expectedOutput")]
    pub expected_output: String,
}

/// The JSON payload carried in a job's `data` hash field.
///
/// Field names match the wire format in spec.md §6 exactly
/// (`submissionId`, `language`, `code`, `testCases`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobPayload {
    #[serde(rename = "submissionId")]
    pub submission_id: String,
    pub language: String,
    pub code: String,
    #[serde(rename = "testCases")]
    pub test_cases: Vec<TestCase>,
}

// ── ExecutionConfig ───────────────────────────────────────────────────────────

/// Sandbox resource limits. Process-wide, read-only after worker startup.
#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    /// Memory cap, e.g. `"256m"`.
    pub memory_limit: String,
    /// Memory+swap cap. Set equal to `memory_limit` so no swap is granted.
    pub memory_swap: String,
    /// CPU quota period in microseconds.
    pub cpu_period: i64,
    /// CPU quota in microseconds per period (`cpu_quota / cpu_period` is the
    /// fraction of one core the sandbox may use).
    pub cpu_quota: i64,
    /// Maximum number of processes/threads inside the sandbox.
    pub pids_limit: i64,
    /// Docker network mode. `"none"` disables networking.
    pub network_mode: String,
    /// Mount the sandbox root filesystem read-only.
    pub read_only: bool,
    /// Wall-clock timeout for compile and run steps.
    pub timeout: std::time::Duration,
    /// Size of the writable scratch tmpfs, e.g. `"100m"`.
    pub tmpfs_size: String,
    /// Sandbox name prefix; every sandbox this process creates is named
    /// `<container_prefix>-<8 hex chars>`. Must match the prefix the
    /// orphan reaper in [`crate::worker`] searches for.
    pub container_prefix: String,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            memory_limit: "256m".to_string(),
            memory_swap: "256m".to_string(),
            cpu_period: 100_000,
            cpu_quota: 50_000,
            pids_limit: 50,
            network_mode: "none".to_string(),
            read_only: true,
            timeout: std::time::Duration::from_secs(10),
            tmpfs_size: "100m".to_string(),
            container_prefix: "codearena-exec".to_string(),
        }
    }
}

// ── ExecutionResult ───────────────────────────────────────────────────────────

/// The outcome of a single code run against one stdin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i64,
    pub execution_time_ms: u64,
    pub memory_used_kb: u64,
    pub timed_out: bool,
    pub error: Option<ExecutionError>,
}

/// The outcome of a single run, tagged with a discriminator so JSON
/// consumers can switch on `error.type` without a wrapper object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ExecutionError {
    /// Non-zero exit from the compile step. Short-circuits the submission.
    CompilationError { message: String },
    /// Wall-clock budget exceeded. Short-circuits the submission.
    TimeLimitExceeded { limit_ms: u64 },
    /// Non-zero exit during run, or a container-raised error. Does not
    /// short-circuit — adjudication continues with the next test case.
    RuntimeError { message: String },
    /// Any other adapter/daemon failure or malformed payload.
    InternalError { message: String },
}

// ── Per-submission results ────────────────────────────────────────────────────

/// Result of running a single test case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCaseResult {
    #[serde(rename = "testCaseId")]
    pub test_case_id: i64,
    pub passed: bool,
    pub output: String,
    #[serde(rename = "expectedOutput")]
    pub expected_output: String,
    #[serde(rename = "executionTimeMs")]
    pub execution_time_ms: u64,
    pub error: Option<String>,
}

/// The final human-facing outcome of a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Queued,
    Running,
    Accepted,
    WrongAnswer,
    TimeLimitExceeded,
    RuntimeError,
    CompilationError,
}

impl Verdict {
    /// Human-readable form used on the realtime pub/sub channel, e.g.
    /// `"Wrong Answer"`.
    pub fn human(self) -> &'static str {
        match self {
            Verdict::Queued => "Queued",
            Verdict::Running => "Running",
            Verdict::Accepted => "Accepted",
            Verdict::WrongAnswer => "Wrong Answer",
            Verdict::TimeLimitExceeded => "Time Limit Exceeded",
            Verdict::RuntimeError => "Runtime Error",
            Verdict::CompilationError => "Compilation Error",
        }
    }

    /// Canonical lowercase form used in the `submissions.status` column.
    /// Verdicts with no terminal row status (`Queued`, `Running`) have no
    /// caller that writes them through this mapping — the recorder writes
    /// `"processing"` directly for the running transition instead.
    pub fn db_status(self) -> &'static str {
        match self {
            Verdict::Accepted => "accepted",
            Verdict::WrongAnswer => "wrong_answer",
            Verdict::TimeLimitExceeded => "time_limit_exceeded",
            Verdict::RuntimeError => "runtime_error",
            Verdict::CompilationError => "compilation_error",
            Verdict::Queued | Verdict::Running => "system_error",
        }
    }
}

/// Complete result of a submission across all its test cases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionResult {
    pub submission_id: String,
    pub verdict: Verdict,
    pub test_results: Vec<TestCaseResult>,
    pub total_execution_time_ms: u64,
    pub max_memory_used_kb: u64,
    pub stdout: String,
    pub stderr: String,
    pub passed_count: usize,
    pub total_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_known_tags_case_insensitively() {
        assert_eq!(Language::parse("Python"), Some(Language::Python));
        assert_eq!(Language::parse("JAVASCRIPT"), Some(Language::Javascript));
        assert_eq!(Language::parse("java"), Some(Language::Java));
        assert_eq!(Language::parse("cpp"), Some(Language::Cpp));
        assert_eq!(Language::parse("c++"), Some(Language::Cpp));
    }

    #[test]
    fn parse_rejects_unknown_tag() {
        assert_eq!(Language::parse("brainfuck"), None);
    }

    #[test]
    fn java_uses_capitalized_source_file_name() {
        assert_eq!(Language::Java.spec().source_file, "Solution.java");
    }

    #[test]
    fn python_has_no_compile_command() {
        assert!(Language::Python.spec().compile_cmd.is_none());
    }

    #[test]
    fn cpp_has_a_compile_command() {
        assert!(Language::Cpp.spec().compile_cmd.is_some());
    }

    #[test]
    fn default_execution_config_matches_spec_defaults() {
        let config = ExecutionConfig::default();
        assert_eq!(config.memory_limit, config.memory_swap);
        assert_eq!(config.network_mode, "none");
        assert!(config.read_only);
    }

    #[test]
    fn verdict_db_status_maps_unknown_to_system_error() {
        assert_eq!(Verdict::Queued.db_status(), "system_error");
        assert_eq!(Verdict::Running.db_status(), "system_error");
    }

    #[test]
    fn verdict_human_form_matches_spec_strings() {
        assert_eq!(Verdict::WrongAnswer.human(), "Wrong Answer");
        assert_eq!(Verdict::CompilationError.human(), "Compilation Error");
    }

    #[test]
    fn execution_error_round_trips_through_json() {
        let error = ExecutionError::TimeLimitExceeded { limit_ms: 10_000 };
        let json = serde_json::to_string(&error).expect("serialize");
        assert!(json.contains(r#""type":"TimeLimitExceeded""#));
        let back: ExecutionError = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, error);
    }
}
