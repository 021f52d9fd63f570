pub mod task;
pub mod config;
pub mod retry;
pub mod cycle_check;
pub mod context;
pub mod events;
pub mod executor;

pub use task::{FnTask, PreflightTask, Task, TaskId, task_fn};
pub use config::PreflightConfig;
pub use retry::{RetryError, RetryExecutor, RetryPolicy};
pub use cycle_check::find_cycle;
pub use context::ExecutionContext;
pub use events::{PreflightEvent, PreflightObserver, Progress};
pub use executor::{PreflightManager, RunReport};

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub type TaskRef = Arc<PreflightTask>;
pub type BoxTask = Box<dyn Task>;

/// Failure of a single execution attempt.
#[derive(Error, Debug)]
pub enum TaskError {
    #[error("{0}")]
    Failed(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TaskError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// Errors that abort a run or reject a configuration.
#[derive(Error, Debug)]
pub enum PreflightError {
    #[error("Circular dependency detected at task '{task}': {}", .chain.join(" -> "))]
    CircularDependency { task: String, chain: Vec<String> },
    #[error("Task '{task}' failed after {attempts} attempt(s): {source}")]
    TaskFailed {
        task: String,
        attempts: u32,
        #[source]
        source: Arc<TaskError>,
    },
    #[error("Run cancelled")]
    Cancelled,
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Configuration parse error: {0}")]
    Config(#[from] serde_json::Error),
}
