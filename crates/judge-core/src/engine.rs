//! Execute a single submission's code against a single stdin string inside a
//! sandbox.
//!
//! This module is the orchestrator for one [`ContainerRuntime`]-backed run:
//! 1. Resolve the language's image via [`ContainerRuntime::resolve_image`].
//! 2. Create a sandbox with the process-wide [`ExecutionConfig`] applied.
//! 3. Write the submission's source into the sandbox.
//! 4. If the language has a compile step, run it; a non-zero exit short-circuits
//!    with [`ExecutionError::CompilationError`] and skips the run step entirely.
//! 5. Run the program, piping `stdin` in.
//! 6. Check whether the whole call exceeded `config.timeout`; if so, the result
//!    carries [`ExecutionError::TimeLimitExceeded`] regardless of what the run
//!    step itself returned.
//! 7. Take one best-effort memory sample.
//! 8. Destroy the sandbox unconditionally, on every exit path.
//!
//! ## Stdin delivery
//!
//! Stdin is piped into the run command as a literal shell string:
//! `sh -c "echo '<stdin>' | <run_cmd>"`. This is carried over unchanged from
//! the system this was ported from. It means a `stdin` value containing a
//! single quote truncates at that quote and the remainder is interpreted as
//! shell syntax rather than program input — test cases whose input contains
//! `'` will not reach the submitted program intact. Fixing this (e.g. writing
//! stdin to a file and redirecting) is tracked as a known follow-up, not
//! something this module silently works around.

use std::time::{Duration, Instant};

use tracing::{debug, error};

use crate::sandbox::{ContainerRuntime, SandboxHandle};
use crate::types::{ExecutionConfig, ExecutionError, ExecutionResult, Language};

/// Run `code` against `stdin` inside a fresh sandbox for `language`, applying
/// `config`'s resource limits. The sandbox is named
/// `<config.container_prefix>-<8 hex chars>`, a fresh random suffix per call,
/// so concurrent runs never collide and the worker loop's orphan reaper
/// (which matches on `config.container_prefix`) can always find it if this
/// run crashes before `destroy` runs.
pub async fn run<R: ContainerRuntime>(
    runtime: &R,
    language: Language,
    code: &str,
    stdin: &str,
    config: &ExecutionConfig,
) -> ExecutionResult {
    let start = Instant::now();
    let spec = language.spec();
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    let sandbox_name = format!("{}-{}", config.container_prefix, &suffix[..8]);

    let image = runtime.resolve_image(spec.preferred_image, spec.fallback_image).await;

    let handle = match runtime.create_sandbox(&image, &sandbox_name, config).await {
        Ok(handle) => handle,
        Err(message) => {
            error!(sandbox_name, error = %message, "failed to create sandbox");
            return internal_error(message, start.elapsed());
        }
    };

    let result = run_in_sandbox(runtime, &handle, spec, code, stdin, config).await;

    runtime.destroy(&handle).await;
    debug!(sandbox_name, "sandbox destroyed");

    result
}

async fn run_in_sandbox<R: ContainerRuntime>(
    runtime: &R,
    handle: &SandboxHandle,
    spec: &crate::types::LanguageSpec,
    code: &str,
    stdin: &str,
    config: &ExecutionConfig,
) -> ExecutionResult {
    let start = Instant::now();
    let file_path = format!("/scratch/{}", spec.source_file);

    if let Err(message) = runtime.write_file(handle, &file_path, code).await {
        return internal_error(message, start.elapsed());
    }

    if let Some(compile_cmd) = spec.compile_cmd {
        let argv: Vec<&str> = compile_cmd.to_vec();
        let outcome = runtime.exec(handle, &argv, None, config.timeout).await;
        if outcome.exit_code != 0 {
            return ExecutionResult {
                success: false,
                stdout: outcome.stdout,
                stderr: outcome.stderr,
                exit_code: outcome.exit_code,
                execution_time_ms: outcome.elapsed.as_millis() as u64,
                memory_used_kb: 0,
                timed_out: false,
                error: Some(ExecutionError::CompilationError {
                    message: "compilation failed".to_string(),
                }),
            };
        }
    }

    let run_argv = shell_wrapped_run_argv(spec.run_cmd, stdin);
    let argv_refs: Vec<&str> = run_argv.iter().map(String::as_str).collect();

    let run_start = Instant::now();
    let outcome = match tokio::time::timeout(
        config.timeout,
        runtime.exec(handle, &argv_refs, Some(stdin), config.timeout),
    )
    .await
    {
        Ok(outcome) => outcome,
        Err(_) => crate::sandbox::ExecOutcome {
            exit_code: 1,
            stdout: String::new(),
            stderr: String::new(),
            elapsed: run_start.elapsed(),
        },
    };

    let timed_out = outcome.elapsed >= config.timeout;
    let memory_used_kb = runtime.sample_memory_kb(handle).await;

    let error = if timed_out {
        Some(ExecutionError::TimeLimitExceeded {
            limit_ms: config.timeout.as_millis() as u64,
        })
    } else if outcome.exit_code != 0 {
        Some(ExecutionError::RuntimeError {
            message: if outcome.stderr.is_empty() {
                "runtime error".to_string()
            } else {
                outcome.stderr.clone()
            },
        })
    } else {
        None
    };

    ExecutionResult {
        success: outcome.exit_code == 0 && !timed_out,
        stdout: outcome.stdout.trim().to_string(),
        stderr: outcome.stderr.trim().to_string(),
        exit_code: outcome.exit_code,
        execution_time_ms: outcome.elapsed.as_millis() as u64,
        memory_used_kb,
        timed_out,
        error,
    }
}

/// Build the run argv, wrapping in a shell pipe when `stdin` is non-empty —
/// the run command is fed its input via `echo '<stdin>' | <run_cmd>` rather
/// than through the exec's own attached stdin stream. See the module-level
/// doc comment for the shell-quoting caveat this carries.
fn shell_wrapped_run_argv(run_cmd: &[&str], stdin: &str) -> Vec<String> {
    if stdin.is_empty() {
        return run_cmd.iter().map(|s| s.to_string()).collect();
    }
    let piped = format!("echo '{}' | {}", stdin, run_cmd.join(" "));
    vec!["sh".to_string(), "-c".to_string(), piped]
}

fn internal_error(message: String, elapsed: Duration) -> ExecutionResult {
    ExecutionResult {
        success: false,
        stdout: String::new(),
        stderr: message.clone(),
        exit_code: 1,
        execution_time_ms: elapsed.as_millis() as u64,
        memory_used_kb: 0,
        timed_out: false,
        error: Some(ExecutionError::InternalError { message }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::fake::FakeRuntime;

    #[tokio::test]
    async fn successful_run_has_no_error() {
        let runtime = FakeRuntime::new().with_exit_code(0).with_stdout("6\n");
        let config = ExecutionConfig::default();
        let result = run(&runtime, Language::Python, "print(6)", "", &config).await;
        assert!(result.success);
        assert!(result.error.is_none());
        assert_eq!(result.stdout, "6");
    }

    #[tokio::test]
    async fn nonzero_exit_is_runtime_error() {
        let runtime = FakeRuntime::new().with_exit_code(1).with_stderr("boom");
        let config = ExecutionConfig::default();
        let result = run(&runtime, Language::Python, "raise Exception()", "", &config).await;
        assert!(!result.success);
        assert!(matches!(result.error, Some(ExecutionError::RuntimeError { .. })));
    }

    #[tokio::test]
    async fn compile_failure_short_circuits_before_run() {
        let runtime = FakeRuntime::new().with_compile_exit_code(1).with_stderr("syntax error");
        let config = ExecutionConfig::default();
        let result = run(&runtime, Language::Cpp, "int main() {", "", &config).await;
        assert!(matches!(result.error, Some(ExecutionError::CompilationError { .. })));
        assert_eq!(runtime.run_exec_count(), 1, "only the compile step should have executed");
    }

    #[tokio::test]
    async fn timeout_is_reported_even_on_zero_exit() {
        let runtime = FakeRuntime::new().with_exit_code(0).with_elapsed(Duration::from_secs(99));
        let mut config = ExecutionConfig::default();
        config.timeout = Duration::from_millis(10);
        let result = run(&runtime, Language::Python, "while True: pass", "", &config).await;
        assert!(result.timed_out);
        assert!(matches!(result.error, Some(ExecutionError::TimeLimitExceeded { .. })));
    }

    #[tokio::test]
    async fn sandbox_is_always_destroyed() {
        let runtime = FakeRuntime::new().with_exit_code(1);
        let config = ExecutionConfig::default();
        let _ = run(&runtime, Language::Python, "bad", "", &config).await;
        assert_eq!(runtime.destroy_count(), 1);
    }

    #[test]
    fn shell_wrap_quotes_stdin_literally() {
        let argv = shell_wrapped_run_argv(&["python", "solution.py"], "5 3");
        assert_eq!(argv, vec!["sh", "-c", "echo '5 3' | python solution.py"]);
    }

    #[test]
    fn shell_wrap_with_empty_stdin_skips_pipe() {
        let argv = shell_wrapped_run_argv(&["python", "solution.py"], "");
        assert_eq!(argv, vec!["python", "solution.py"]);
    }
}
