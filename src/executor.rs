use std::sync::Arc;
use futures::future::{BoxFuture, FutureExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use crate::{
    ExecutionContext, PreflightConfig, PreflightError, PreflightEvent, PreflightObserver,
    Progress, RetryError, RetryExecutor, RetryPolicy, TaskRef, find_cycle,
};

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub total: usize,
    pub completed: usize,
    /// Registered tasks that exhausted their attempts.
    pub failed: Vec<String>,
    /// Tasks whose routine ran during this run, in the order they started.
    pub execution_order: Vec<String>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.completed == self.total
    }
}

/// Runs registered preflight tasks in dependency order.
pub struct PreflightManager {
    config: PreflightConfig,
    tasks: Vec<TaskRef>,
    observers: Vec<Arc<dyn PreflightObserver>>,
}

impl PreflightManager {
    pub fn new(config: PreflightConfig) -> Self {
        Self {
            config,
            tasks: Vec::new(),
            observers: Vec::new(),
        }
    }

    pub fn add_task(&mut self, task: TaskRef) {
        self.tasks.push(task);
    }

    pub fn tasks(&self) -> &[TaskRef] {
        &self.tasks
    }

    pub fn config(&self) -> &PreflightConfig {
        &self.config
    }

    pub fn add_observer(&mut self, observer: Arc<dyn PreflightObserver>) {
        self.observers.push(observer);
    }

    /// Registers a channel observer and returns its receiving end.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<PreflightEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.observers.push(Arc::new(tx));
        rx
    }

    /// Checks the registered graph for cycles without executing anything.
    pub fn validate(&self) -> Result<(), PreflightError> {
        match find_cycle(&self.tasks) {
            Some(chain) => Err(PreflightError::CircularDependency {
                task: chain.last().cloned().unwrap_or_default(),
                chain,
            }),
            None => Ok(()),
        }
    }

    pub async fn start(&self) -> Result<RunReport, PreflightError> {
        self.start_with_cancellation(CancellationToken::new()).await
    }

    /// Runs every registered task once, lowest priority value first.
    ///
    /// Returns early with an error on a circular dependency, on a task
    /// exhausting its retries while `stop_on_failure` is set, or when `ctx`
    /// is cancelled.
    pub async fn start_with_cancellation(
        &self,
        ctx: CancellationToken,
    ) -> Result<RunReport, PreflightError> {
        self.config.validate()?;

        let mut ordered = self.tasks.clone();
        ordered.sort_by_key(|task| task.priority());

        let mut run = ExecutionContext::new(self.config.clone(), ctx);
        if run.config().enable_debug_logging {
            info!(tasks = ordered.len(), "starting preflight run");
        }

        for task in &ordered {
            self.resolve(task, &mut run).await?;
        }

        let report = RunReport {
            total: self.tasks.len(),
            completed: self.completed_count(),
            failed: self
                .tasks
                .iter()
                .filter(|task| task.has_failed())
                .map(|task| task.name().to_string())
                .collect(),
            execution_order: run.into_execution_order(),
        };

        if self.config.enable_debug_logging {
            info!(
                completed = report.completed,
                failed = report.failed.len(),
                total = report.total,
                "preflight run finished"
            );
        }

        Ok(report)
    }

    fn resolve<'a>(
        &'a self,
        task: &'a TaskRef,
        run: &'a mut ExecutionContext,
    ) -> BoxFuture<'a, Result<(), PreflightError>> {
        async move {
            if let Err(err) = run.enter(task) {
                if let PreflightError::CircularDependency { chain, .. } = &err {
                    if run.config().enable_error_logging {
                        error!(task = %task.name(), chain = %chain.join(" -> "), "circular dependency detected");
                    }
                    self.emit(PreflightEvent::CircularDependency {
                        chain: chain.clone(),
                    });
                }
                return Err(err);
            }

            if !run.is_resolved(task) {
                for dep in task.dependencies() {
                    self.resolve(&dep, run).await?;
                }

                run.mark_resolved(task);
                if !task.is_completed() {
                    self.execute_task(task, run).await?;
                }
            }

            self.emit_progress(run);
            run.leave(task);
            Ok(())
        }
        .boxed()
    }

    async fn execute_task(
        &self,
        task: &TaskRef,
        run: &mut ExecutionContext,
    ) -> Result<(), PreflightError> {
        let config = run.config().clone();
        let executor = RetryExecutor::new(RetryPolicy::from_config(&config));
        let max_attempts = executor.policy().max_attempts();

        if run.cancellation().is_cancelled() {
            if config.enable_error_logging {
                warn!(task = %task.name(), "run cancelled before task started");
            }
            return Err(PreflightError::Cancelled);
        }

        task.mark_pending();
        run.record_execution(task);

        if config.enable_debug_logging {
            info!(
                task = %task.name(),
                description = task.description(),
                priority = task.priority(),
                "starting task"
            );
        }
        self.emit(PreflightEvent::TaskStarted { task: task.clone() });

        let outcome = executor
            .execute_with_retry(
                run.cancellation(),
                move |token| task.routine().execute(token),
                |attempt, err| {
                    if config.enable_debug_logging {
                        info!(task = %task.name(), attempt, max_attempts, error = %err, "task attempt failed, retrying");
                    }
                    self.emit(PreflightEvent::TaskRetrying {
                        task: task.clone(),
                        attempt,
                        max_attempts,
                        error: err.to_string(),
                    });
                },
            )
            .await;

        match outcome {
            Ok(((), attempts)) => {
                task.mark_completed();
                if config.enable_debug_logging {
                    info!(task = %task.name(), attempts, "completed task");
                }
                self.emit(PreflightEvent::TaskCompleted {
                    task: task.clone(),
                    success: true,
                    error: None,
                });
                Ok(())
            }
            Err(RetryError::Exhausted {
                attempts,
                last_error,
            }) => {
                let error = Arc::new(last_error);
                task.mark_failed(error.clone());
                if config.enable_error_logging {
                    error!(task = %task.name(), attempts, error = %error, "task failed");
                }
                self.emit(PreflightEvent::TaskCompleted {
                    task: task.clone(),
                    success: false,
                    error: Some(error.clone()),
                });
                self.emit(PreflightEvent::TaskFailed {
                    task: task.clone(),
                    error: error.clone(),
                });

                if config.stop_on_failure {
                    return Err(PreflightError::TaskFailed {
                        task: task.name().to_string(),
                        attempts,
                        source: error,
                    });
                }
                Ok(())
            }
            Err(RetryError::Cancelled) => {
                if config.enable_error_logging {
                    warn!(task = %task.name(), "run cancelled while task was executing");
                }
                Err(PreflightError::Cancelled)
            }
        }
    }

    fn completed_count(&self) -> usize {
        self.tasks.iter().filter(|task| task.is_completed()).count()
    }

    fn emit_progress(&self, run: &ExecutionContext) {
        let Some(progress) = Progress::new(self.completed_count(), self.tasks.len()) else {
            return;
        };
        if run.config().enable_debug_logging {
            debug!(progress = %progress, "overall progress");
        }
        self.emit(PreflightEvent::OverallProgress { progress });
    }

    fn emit(&self, event: PreflightEvent) {
        for observer in &self.observers {
            observer.on_event(&event);
        }
    }
}
