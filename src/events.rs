//! Notifications published by the engine during a run.
//!
//! Observers are purely passive: they are called synchronously from the
//! traversal and never influence control flow.

use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use crate::{TaskError, TaskRef};

/// Fraction of registered tasks that have completed, always within `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Progress(f64);

impl Progress {
    /// Returns `None` when there are no tasks to measure against.
    pub fn new(completed: usize, total: usize) -> Option<Self> {
        if total == 0 {
            return None;
        }
        let fraction = completed.min(total) as f64 / total as f64;
        Some(Self(fraction))
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    pub fn is_done(&self) -> bool {
        self.0 >= 1.0
    }
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}%", self.0 * 100.0)
    }
}

#[derive(Debug, Clone)]
pub enum PreflightEvent {
    /// The first attempt of a task is about to run.
    TaskStarted { task: TaskRef },

    /// An attempt failed and the task will be attempted again.
    ///
    /// `attempt` is the 1-indexed attempt that just failed; `max_attempts`
    /// includes the initial attempt.
    TaskRetrying {
        task: TaskRef,
        attempt: u32,
        max_attempts: u32,
        error: String,
    },

    /// A task reached a terminal state from a fresh execution.
    TaskCompleted {
        task: TaskRef,
        success: bool,
        error: Option<Arc<TaskError>>,
    },

    /// A task exhausted all of its attempts.
    TaskFailed { task: TaskRef, error: Arc<TaskError> },

    /// Emitted after every task resolution, including skips.
    OverallProgress { progress: Progress },

    /// Resolution stopped on a dependency cycle.
    CircularDependency { chain: Vec<String> },
}

impl PreflightEvent {
    /// Name of the task the event is about, if any.
    pub fn task_name(&self) -> Option<&str> {
        match self {
            Self::TaskStarted { task }
            | Self::TaskRetrying { task, .. }
            | Self::TaskCompleted { task, .. }
            | Self::TaskFailed { task, .. } => Some(task.name()),
            Self::OverallProgress { .. } | Self::CircularDependency { .. } => None,
        }
    }
}

pub trait PreflightObserver: Send + Sync {
    fn on_event(&self, event: &PreflightEvent);
}

/// Forwards events into a channel; a closed receiver is ignored.
impl PreflightObserver for mpsc::UnboundedSender<PreflightEvent> {
    fn on_event(&self, event: &PreflightEvent) {
        let _ = self.send(event.clone());
    }
}
