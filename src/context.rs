use std::collections::HashSet;
use tokio_util::sync::CancellationToken;
use crate::{PreflightConfig, PreflightError, PreflightTask, TaskId};

/// Transient state of one run, created at start and dropped when it ends.
#[derive(Debug)]
pub struct ExecutionContext {
    config: PreflightConfig,
    cancellation: CancellationToken,
    executing: HashSet<TaskId>,
    chain: Vec<(TaskId, String)>,
    resolved: HashSet<TaskId>,
    execution_order: Vec<String>,
}

impl ExecutionContext {
    pub fn new(config: PreflightConfig, cancellation: CancellationToken) -> Self {
        Self {
            config,
            cancellation,
            executing: HashSet::new(),
            chain: Vec::new(),
            resolved: HashSet::new(),
            execution_order: Vec::new(),
        }
    }

    pub fn config(&self) -> &PreflightConfig {
        &self.config
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Pushes `task` onto the resolution chain.
    ///
    /// Fails with [`PreflightError::CircularDependency`] when the task is
    /// already being resolved further up the chain.
    pub fn enter(&mut self, task: &PreflightTask) -> Result<(), PreflightError> {
        if !self.executing.insert(task.id()) {
            let start = self
                .chain
                .iter()
                .position(|(id, _)| *id == task.id())
                .unwrap_or(0);
            let mut chain: Vec<String> =
                self.chain[start..].iter().map(|(_, name)| name.clone()).collect();
            chain.push(task.name().to_string());
            return Err(PreflightError::CircularDependency {
                task: task.name().to_string(),
                chain,
            });
        }
        self.chain.push((task.id(), task.name().to_string()));
        Ok(())
    }

    pub fn leave(&mut self, task: &PreflightTask) {
        if self.executing.remove(&task.id()) {
            self.chain.pop();
        }
    }

    pub fn is_executing(&self, task: &PreflightTask) -> bool {
        self.executing.contains(&task.id())
    }

    /// Records that `task` has been resolved in this run, so later branches
    /// reaching it neither walk its dependencies nor execute it again.
    ///
    /// Returns `false` if it was already resolved.
    pub fn mark_resolved(&mut self, task: &PreflightTask) -> bool {
        self.resolved.insert(task.id())
    }

    pub fn is_resolved(&self, task: &PreflightTask) -> bool {
        self.resolved.contains(&task.id())
    }

    pub fn record_execution(&mut self, task: &PreflightTask) {
        self.execution_order.push(task.name().to_string());
    }

    pub fn into_execution_order(self) -> Vec<String> {
        self.execution_order
    }
}
