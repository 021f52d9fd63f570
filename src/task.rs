use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use crate::{BoxTask, TaskError, TaskRef};

/// The execution routine of a preflight task.
///
/// Implementations must watch `ctx` and return promptly once it is cancelled;
/// the engine cancels it when the attempt's timeout elapses.
#[async_trait]
pub trait Task: Send + Sync {
    async fn execute(&self, ctx: CancellationToken) -> Result<(), TaskError>;
}

/// Adapter turning an async closure into a [`Task`].
pub struct FnTask<F>(F);

pub fn task_fn<F, Fut>(f: F) -> FnTask<F>
where
    F: Fn(CancellationToken) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), TaskError>> + Send,
{
    FnTask(f)
}

#[async_trait]
impl<F, Fut> Task for FnTask<F>
where
    F: Fn(CancellationToken) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), TaskError>> + Send,
{
    async fn execute(&self, ctx: CancellationToken) -> Result<(), TaskError> {
        (self.0)(ctx).await
    }
}

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a task, independent of its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    fn next() -> Self {
        Self(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A unit of work registered with the [`PreflightManager`](crate::PreflightManager).
///
/// Completion and failure state is written only by the engine.
pub struct PreflightTask {
    id: TaskId,
    name: String,
    description: String,
    priority: i32,
    routine: BoxTask,
    dependencies: RwLock<Vec<TaskRef>>,
    completed: AtomicBool,
    failed: AtomicBool,
    failure: Mutex<Option<Arc<TaskError>>>,
}

impl PreflightTask {
    pub fn new(name: impl Into<String>, routine: impl Task + 'static) -> Self {
        Self {
            id: TaskId::next(),
            name: name.into(),
            description: String::new(),
            priority: 0,
            routine: Box::new(routine),
            dependencies: RwLock::new(Vec::new()),
            completed: AtomicBool::new(false),
            failed: AtomicBool::new(false),
            failure: Mutex::new(None),
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn shared(self) -> TaskRef {
        Arc::new(self)
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Snapshot of the declared dependencies, in declaration order.
    pub fn dependencies(&self) -> Vec<TaskRef> {
        self.dependencies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Appends `task` to the dependency list. Cycles are not checked here.
    ///
    /// Dependencies are held as strong references, so tasks wired into a
    /// cycle are never freed. Call [`PreflightManager::validate`] before
    /// `start` to reject such graphs early.
    ///
    /// [`PreflightManager::validate`]: crate::PreflightManager::validate
    pub fn add_dependency(&self, task: &TaskRef) {
        self.dependencies
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::clone(task));
    }

    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }

    pub fn has_failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }

    pub fn failure_cause(&self) -> Option<Arc<TaskError>> {
        self.failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn routine(&self) -> &dyn Task {
        self.routine.as_ref()
    }

    /// Clears a failure left over from an earlier run before a new attempt.
    pub(crate) fn mark_pending(&self) {
        let mut failure = self.failure.lock().unwrap_or_else(PoisonError::into_inner);
        *failure = None;
        self.failed.store(false, Ordering::Release);
    }

    pub(crate) fn mark_completed(&self) {
        self.completed.store(true, Ordering::Release);
    }

    pub(crate) fn mark_failed(&self, error: Arc<TaskError>) {
        let mut failure = self.failure.lock().unwrap_or_else(PoisonError::into_inner);
        *failure = Some(error);
        self.failed.store(true, Ordering::Release);
    }
}

impl fmt::Debug for PreflightTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dependencies: Vec<String> = self
            .dependencies()
            .iter()
            .map(|dep| dep.name().to_string())
            .collect();

        f.debug_struct("PreflightTask")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("dependencies", &dependencies)
            .field("completed", &self.is_completed())
            .field("failed", &self.has_failed())
            .finish()
    }
}
