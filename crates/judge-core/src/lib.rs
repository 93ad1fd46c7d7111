//! judge-core: sandboxed execution and adjudication engine for a
//! code-submission judge.
//!
//! Components, matching the pipeline a submission travels through:
//! [`queue`] claims a job, [`adjudicate`] runs it against every test case
//! (driving [`engine`] and [`sandbox`] once per case), and [`recorder`]
//! persists the verdict. [`worker`] wires the three together into the
//! long-running process; [`normalize`] and [`types`] are shared utilities
//! the others depend on.

pub mod adjudicate;
pub mod engine;
pub mod error;
pub mod normalize;
pub mod queue;
pub mod recorder;
pub mod sandbox;
pub mod types;
pub mod worker;

pub use adjudicate::adjudicate;
pub use error::JudgeError;
pub use sandbox::{ContainerRuntime, DockerRuntime};
pub use types::{
    ExecutionConfig, ExecutionError, ExecutionResult, JobPayload, Language, SubmissionResult,
    TestCase, TestCaseResult, Verdict,
};
pub use worker::WorkerConfig;
