#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

use preflight::{PreflightEvent, PreflightTask, TaskError, TaskRef, task_fn};

/// Shared record of routine invocations, in call order.
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, name: &str) {
        self.0.lock().unwrap().push(name.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, name: &str) -> usize {
        self.0.lock().unwrap().iter().filter(|n| *n == name).count()
    }
}

pub fn succeeding(name: &str, log: &CallLog) -> TaskRef {
    let log = log.clone();
    let label = name.to_string();
    PreflightTask::new(
        name,
        task_fn(move |_ctx| {
            let log = log.clone();
            let label = label.clone();
            async move {
                log.push(&label);
                Ok(())
            }
        }),
    )
    .shared()
}

pub fn failing(name: &str, log: &CallLog) -> TaskRef {
    let log = log.clone();
    let label = name.to_string();
    PreflightTask::new(
        name,
        task_fn(move |_ctx| {
            let log = log.clone();
            let label = label.clone();
            async move {
                log.push(&label);
                Err(TaskError::failed(format!("{label} is broken")))
            }
        }),
    )
    .shared()
}

/// A task that ignores its budget and sleeps until cancelled.
pub fn hanging(name: &str, attempts: &Arc<AtomicU32>) -> TaskRef {
    let attempts = attempts.clone();
    PreflightTask::new(
        name,
        task_fn(move |ctx| {
            let attempts = attempts.clone();
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                tokio::select! {
                    _ = ctx.cancelled() => Err(TaskError::failed("cancelled")),
                    _ = tokio::time::sleep(Duration::from_secs(30)) => Ok(()),
                }
            }
        }),
    )
    .shared()
}

pub fn drain(rx: &mut UnboundedReceiver<PreflightEvent>) -> Vec<PreflightEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn progress_values(events: &[PreflightEvent]) -> Vec<f64> {
    events
        .iter()
        .filter_map(|event| match event {
            PreflightEvent::OverallProgress { progress } => Some(progress.value()),
            _ => None,
        })
        .collect()
}

/// `(task, success)` for every completion notification.
pub fn completions(events: &[PreflightEvent]) -> Vec<(String, bool)> {
    events
        .iter()
        .filter_map(|event| match event {
            PreflightEvent::TaskCompleted { task, success, .. } => {
                Some((task.name().to_string(), *success))
            }
            _ => None,
        })
        .collect()
}

pub fn failures(events: &[PreflightEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            PreflightEvent::TaskFailed { task, .. } => Some(task.name().to_string()),
            _ => None,
        })
        .collect()
}

pub fn retries(events: &[PreflightEvent]) -> Vec<u32> {
    events
        .iter()
        .filter_map(|event| match event {
            PreflightEvent::TaskRetrying { attempt, .. } => Some(*attempt),
            _ => None,
        })
        .collect()
}
