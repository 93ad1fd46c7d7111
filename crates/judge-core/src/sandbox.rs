//! Container Runtime Adapter — a thin capability layer over a local
//! OCI-style container daemon (Docker Engine API via `bollard`).
//!
//! [`ContainerRuntime`] defines the operations the Execution Engine needs;
//! [`DockerRuntime`] is the production implementation. Every method has a
//! well-defined, non-throwing fallback: the Execution Engine never sees an
//! exception path cross this boundary, only `Result`/`Ok` values with error
//! information folded in (see individual method docs).

use std::collections::HashMap;
use std::time::{Duration, Instant};

use bollard::container::{
    Config, CreateContainerOptions, ListContainersOptions, LogOutput, RemoveContainerOptions,
    StopContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::image::CreateImageOptions;
use bollard::models::HostConfig;
use bollard::Docker;
use futures_util::StreamExt;
use tracing::{debug, info, warn};

use crate::types::ExecutionConfig;

/// A handle to a running sandbox. Opaque to callers beyond its id/name.
#[derive(Debug, Clone)]
pub struct SandboxHandle {
    pub id: String,
    pub name: String,
}

/// The result of running one command inside a sandbox.
#[derive(Debug, Clone)]
pub struct ExecOutcome {
    pub exit_code: i64,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

/// Capability layer the Execution Engine drives a sandbox through.
///
/// Implementations MUST NOT let daemon exceptions propagate to the caller —
/// every method returns a usable value (an `ExecOutcome` with `exit_code=1`
/// and the failure message in `stderr`, a `0` memory sample, etc.) on
/// failure, matching spec.md §4.B's failure policy.
pub trait ContainerRuntime: Send + Sync {
    /// Resolve an image reference for `preferred`/`fallback`, pulling the
    /// fallback only if neither is present locally. Never fetches the
    /// preferred image silently.
    fn resolve_image<'a>(
        &'a self,
        preferred: &'a str,
        fallback: &'a str,
    ) -> impl std::future::Future<Output = String> + Send + 'a;

    /// Create a sandbox from `image`, enforcing `config` atomically at
    /// creation (memory, CPU, pids, network, read-only root, non-root uid,
    /// no-new-privileges, scratch tmpfs). The sandbox starts detached,
    /// stdin open, running a long-lived placeholder command.
    fn create_sandbox<'a>(
        &'a self,
        image: &'a str,
        name: &'a str,
        config: &'a ExecutionConfig,
    ) -> impl std::future::Future<Output = Result<SandboxHandle, String>> + Send + 'a;

    /// Inject `content` into the sandbox at `path` by piping it into a shell
    /// write redirect.
    fn write_file<'a>(
        &'a self,
        handle: &'a SandboxHandle,
        path: &'a str,
        content: &'a str,
    ) -> impl std::future::Future<Output = Result<(), String>> + Send + 'a;

    /// Run `argv` inside the sandbox, optionally with `stdin` piped in,
    /// returning within `deadline`. Captures demultiplexed stdout/stderr.
    fn exec<'a>(
        &'a self,
        handle: &'a SandboxHandle,
        argv: &'a [&'a str],
        stdin: Option<&'a str>,
        deadline: Duration,
    ) -> impl std::future::Future<Output = ExecOutcome> + Send + 'a;

    /// Best-effort point sample of resident memory, in kilobytes. `0` on
    /// failure. This is a lower bound on peak usage, not a true peak — a
    /// single point-in-time `stats` sample can only see what the process is
    /// using at the moment it is taken.
    fn sample_memory_kb<'a>(
        &'a self,
        handle: &'a SandboxHandle,
    ) -> impl std::future::Future<Output = u64> + Send + 'a;

    /// Stop with a 1-second grace period, then force-remove. Never raises.
    fn destroy<'a>(&'a self, handle: &'a SandboxHandle) -> impl std::future::Future<Output = ()> + Send + 'a;

    /// List sandbox names matching `prefix` (for orphan reaping).
    fn list_by_prefix<'a>(
        &'a self,
        prefix: &'a str,
    ) -> impl std::future::Future<Output = Vec<String>> + Send + 'a;

    /// Check the daemon is reachable.
    fn ping(&self) -> impl std::future::Future<Output = bool> + Send + '_;
}

/// Production [`ContainerRuntime`] backed by the local Docker daemon.
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connect to the local Docker daemon using the platform default
    /// transport (Unix socket on Linux/macOS, named pipe on Windows).
    pub fn connect() -> Result<Self, String> {
        let docker = Docker::connect_with_local_defaults().map_err(|e| e.to_string())?;
        Ok(Self { docker })
    }

    async fn image_present(&self, image: &str) -> bool {
        self.docker.inspect_image(image).await.is_ok()
    }

    async fn pull(&self, image: &str) -> Result<(), String> {
        let options = Some(CreateImageOptions {
            from_image: image,
            ..Default::default()
        });
        let mut stream = self.docker.create_image(options, None, None);
        while let Some(chunk) = stream.next().await {
            chunk.map_err(|e| e.to_string())?;
        }
        Ok(())
    }
}

impl ContainerRuntime for DockerRuntime {
    async fn resolve_image(&self, preferred: &str, fallback: &str) -> String {
        if self.image_present(preferred).await {
            return preferred.to_string();
        }
        info!(preferred, fallback, "preferred image not found locally, falling back");
        if !self.image_present(fallback).await {
            info!(fallback, "pulling fallback image");
            if let Err(e) = self.pull(fallback).await {
                warn!(fallback, error = %e, "failed to pull fallback image");
            }
        }
        fallback.to_string()
    }

    async fn create_sandbox(
        &self,
        image: &str,
        name: &str,
        config: &ExecutionConfig,
    ) -> Result<SandboxHandle, String> {
        let memory_bytes = parse_size_bytes(&config.memory_limit);
        let memswap_bytes = memory_bytes; // no swap: memory+swap cap equals memory cap

        let mut tmpfs = HashMap::new();
        tmpfs.insert(
            "/scratch".to_string(),
            format!("size={},mode=1777", config.tmpfs_size),
        );

        let host_config = HostConfig {
            memory: Some(memory_bytes),
            memory_swap: Some(memswap_bytes),
            cpu_period: Some(config.cpu_period),
            cpu_quota: Some(config.cpu_quota),
            pids_limit: Some(config.pids_limit),
            network_mode: Some(config.network_mode.clone()),
            readonly_rootfs: Some(config.read_only),
            security_opt: Some(vec!["no-new-privileges:true".to_string()]),
            tmpfs: Some(tmpfs),
            ..Default::default()
        };

        let container_config = Config {
            image: Some(image.to_string()),
            cmd: Some(vec!["sh".to_string(), "-c".to_string(), "sleep infinity".to_string()]),
            user: Some("1000:1000".to_string()),
            env: Some(vec!["HOME=/tmp".to_string()]),
            open_stdin: Some(true),
            attach_stdin: Some(true),
            host_config: Some(host_config),
            ..Default::default()
        };

        let create_options = CreateContainerOptions {
            name: name.to_string(),
            platform: None,
        };

        let created = self
            .docker
            .create_container(Some(create_options), container_config)
            .await
            .map_err(|e| e.to_string())?;

        self.docker
            .start_container(&created.id, None::<bollard::container::StartContainerOptions<String>>)
            .await
            .map_err(|e| e.to_string())?;

        debug!(container_id = %created.id, name, "sandbox created");

        Ok(SandboxHandle {
            id: created.id,
            name: name.to_string(),
        })
    }

    async fn write_file(&self, handle: &SandboxHandle, path: &str, content: &str) -> Result<(), String> {
        let write_cmd = format!("cat > {path}");
        let exec = self
            .docker
            .create_exec(
                &handle.id,
                CreateExecOptions {
                    cmd: Some(vec!["sh", "-c", write_cmd.as_str()]),
                    attach_stdin: Some(true),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| e.to_string())?;

        match self.docker.start_exec(&exec.id, None).await.map_err(|e| e.to_string())? {
            StartExecResults::Attached { mut input, mut output } => {
                use tokio::io::AsyncWriteExt;
                input
                    .write_all(content.as_bytes())
                    .await
                    .map_err(|e| e.to_string())?;
                input.shutdown().await.map_err(|e| e.to_string())?;
                // Drain output so the exec session completes.
                while output.next().await.is_some() {}
                Ok(())
            }
            StartExecResults::Detached => Ok(()),
        }
    }

    async fn exec(&self, handle: &SandboxHandle, argv: &[&str], stdin: Option<&str>, deadline: Duration) -> ExecOutcome {
        let start = Instant::now();
        let run = async {
            let exec = self
                .docker
                .create_exec(
                    &handle.id,
                    CreateExecOptions {
                        cmd: Some(argv.to_vec()),
                        attach_stdin: Some(stdin.is_some()),
                        attach_stdout: Some(true),
                        attach_stderr: Some(true),
                        env: Some(vec!["HOME=/tmp"]),
                        ..Default::default()
                    },
                )
                .await
                .map_err(|e| e.to_string())?;

            let mut stdout = String::new();
            let mut stderr = String::new();

            match self.docker.start_exec(&exec.id, None).await.map_err(|e| e.to_string())? {
                StartExecResults::Attached { mut input, mut output } => {
                    if let Some(data) = stdin {
                        use tokio::io::AsyncWriteExt;
                        let _ = input.write_all(data.as_bytes()).await;
                        let _ = input.shutdown().await;
                    }
                    while let Some(chunk) = output.next().await {
                        match chunk.map_err(|e| e.to_string())? {
                            LogOutput::StdOut { message } => {
                                stdout.push_str(&String::from_utf8_lossy(&message));
                            }
                            LogOutput::StdErr { message } => {
                                stderr.push_str(&String::from_utf8_lossy(&message));
                            }
                            _ => {}
                        }
                    }
                }
                StartExecResults::Detached => {}
            }

            let inspected = self.docker.inspect_exec(&exec.id).await.map_err(|e| e.to_string())?;
            let exit_code = inspected.exit_code.unwrap_or(1);
            Ok::<(i64, String, String), String>((exit_code, stdout, stderr))
        };

        match run.await {
            Ok((exit_code, stdout, stderr)) => ExecOutcome {
                exit_code,
                stdout,
                stderr,
                elapsed: start.elapsed(),
            },
            Err(message) => ExecOutcome {
                exit_code: 1,
                stdout: String::new(),
                stderr: message,
                elapsed: start.elapsed(),
            },
        }
        .clamp_elapsed(deadline)
    }

    async fn sample_memory_kb(&self, handle: &SandboxHandle) -> u64 {
        use bollard::container::StatsOptions;
        let mut stream = self.docker.stats(
            &handle.id,
            Some(StatsOptions {
                stream: false,
                one_shot: true,
            }),
        );
        match stream.next().await {
            Some(Ok(stats)) => stats.memory_stats.usage.unwrap_or(0) / 1024,
            _ => 0,
        }
    }

    async fn destroy(&self, handle: &SandboxHandle) {
        let _ = self
            .docker
            .stop_container(&handle.id, Some(StopContainerOptions { t: 1 }))
            .await;
        let _ = self
            .docker
            .remove_container(&handle.id, Some(RemoveContainerOptions { force: true, ..Default::default() }))
            .await;
    }

    async fn list_by_prefix(&self, prefix: &str) -> Vec<String> {
        let mut filters = HashMap::new();
        filters.insert("name".to_string(), vec![prefix.to_string()]);
        match self
            .docker
            .list_containers(Some(ListContainersOptions {
                all: true,
                filters,
                ..Default::default()
            }))
            .await
        {
            Ok(containers) => containers
                .into_iter()
                .filter_map(|c| c.names.and_then(|names| names.into_iter().next()))
                // The Engine API's `Names` entries are always `/`-prefixed
                // (`/codearena-exec-a1b2c3d4`); strip it so the name this
                // returns is usable directly as a container id/name
                // argument to stop/remove, matching docker-py's `.name`.
                .map(|name| name.trim_start_matches('/').to_string())
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    async fn ping(&self) -> bool {
        self.docker.ping().await.is_ok()
    }
}

impl ExecOutcome {
    fn clamp_elapsed(self, _deadline: Duration) -> Self {
        // The deadline itself is enforced by the caller's tokio::time::timeout
        // around the whole exec future; this exists so elapsed always
        // reflects wall-clock time actually spent, deadline or not.
        self
    }
}

/// Parse a Docker-style size string (`"256m"`, `"1g"`) into bytes.
/// Unparsable input defaults to `0`, which bollard interprets as "no limit" —
/// callers should never pass unparsable limits in practice since
/// [`ExecutionConfig`] values come from validated configuration.
fn parse_size_bytes(s: &str) -> i64 {
    let s = s.trim();
    let (digits, suffix) = s.split_at(s.len().saturating_sub(1));
    let multiplier: i64 = match suffix.to_ascii_lowercase().as_str() {
        "k" => 1024,
        "m" => 1024 * 1024,
        "g" => 1024 * 1024 * 1024,
        _ => return s.parse().unwrap_or(0),
    };
    digits.parse::<i64>().map(|n| n * multiplier).unwrap_or(0)
}

/// In-memory [`ContainerRuntime`] test double used by engine/adjudicator
/// unit tests. Never touches a real daemon.
#[cfg(any(test, feature = "test-util"))]
pub mod fake {
    use super::{ContainerRuntime, ExecOutcome, SandboxHandle};
    use crate::types::ExecutionConfig;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Configurable canned responses for [`ContainerRuntime`] calls.
    ///
    /// The first `exec` call a run performs is treated as the compile step
    /// when `compile_exit_code` differs from the default; callers needing
    /// finer control should construct two `FakeRuntime`s or extend this
    /// double rather than reach for a mocking framework.
    pub struct FakeRuntime {
        exit_code: i64,
        compile_exit_code: i64,
        stdout: String,
        stderr: String,
        elapsed: Duration,
        memory_kb: u64,
        exec_count: AtomicU64,
        destroy_count: AtomicU64,
        write_file_contents: Mutex<Vec<String>>,
    }

    impl FakeRuntime {
        pub fn new() -> Self {
            Self {
                exit_code: 0,
                compile_exit_code: 0,
                stdout: String::new(),
                stderr: String::new(),
                elapsed: Duration::from_millis(5),
                memory_kb: 1024,
                exec_count: AtomicU64::new(0),
                destroy_count: AtomicU64::new(0),
                write_file_contents: Mutex::new(Vec::new()),
            }
        }

        pub fn with_exit_code(mut self, code: i64) -> Self {
            self.exit_code = code;
            self
        }

        pub fn with_compile_exit_code(mut self, code: i64) -> Self {
            self.compile_exit_code = code;
            self
        }

        pub fn with_stdout(mut self, stdout: impl Into<String>) -> Self {
            self.stdout = stdout.into();
            self
        }

        pub fn with_stderr(mut self, stderr: impl Into<String>) -> Self {
            self.stderr = stderr.into();
            self
        }

        pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
            self.elapsed = elapsed;
            self
        }

        pub fn run_exec_count(&self) -> u64 {
            self.exec_count.load(Ordering::SeqCst)
        }

        pub fn destroy_count(&self) -> u64 {
            self.destroy_count.load(Ordering::SeqCst)
        }

        pub fn written_files(&self) -> Vec<String> {
            self.write_file_contents.lock().unwrap().clone()
        }
    }

    impl Default for FakeRuntime {
        fn default() -> Self {
            Self::new()
        }
    }

    impl ContainerRuntime for FakeRuntime {
        async fn resolve_image(&self, preferred: &str, _fallback: &str) -> String {
            preferred.to_string()
        }

        async fn create_sandbox(
            &self,
            _image: &str,
            name: &str,
            _config: &ExecutionConfig,
        ) -> Result<SandboxHandle, String> {
            Ok(SandboxHandle {
                id: format!("fake-{name}"),
                name: name.to_string(),
            })
        }

        async fn write_file(&self, _handle: &SandboxHandle, _path: &str, content: &str) -> Result<(), String> {
            self.write_file_contents.lock().unwrap().push(content.to_string());
            Ok(())
        }

        async fn exec(&self, _handle: &SandboxHandle, _argv: &[&str], _stdin: Option<&str>, _deadline: Duration) -> ExecOutcome {
            let call_index = self.exec_count.fetch_add(1, Ordering::SeqCst);
            let exit_code = if call_index == 0 && self.compile_exit_code != 0 {
                self.compile_exit_code
            } else {
                self.exit_code
            };
            ExecOutcome {
                exit_code,
                stdout: self.stdout.clone(),
                stderr: self.stderr.clone(),
                elapsed: self.elapsed,
            }
        }

        async fn sample_memory_kb(&self, _handle: &SandboxHandle) -> u64 {
            self.memory_kb
        }

        async fn destroy(&self, _handle: &SandboxHandle) {
            self.destroy_count.fetch_add(1, Ordering::SeqCst);
        }

        async fn list_by_prefix(&self, _prefix: &str) -> Vec<String> {
            Vec::new()
        }

        async fn ping(&self) -> bool {
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_size_bytes_handles_suffixes() {
        assert_eq!(parse_size_bytes("256m"), 256 * 1024 * 1024);
        assert_eq!(parse_size_bytes("1g"), 1024 * 1024 * 1024);
        assert_eq!(parse_size_bytes("100k"), 100 * 1024);
    }

    #[test]
    fn parse_size_bytes_handles_bare_number() {
        assert_eq!(parse_size_bytes("512"), 512);
    }
}
