use preflight::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

// Probe that needs a couple of attempts before the service answers.
struct NetworkProbe {
    host: String,
    failures_left: AtomicU32,
}

#[async_trait::async_trait]
impl Task for NetworkProbe {
    async fn execute(&self, ctx: CancellationToken) -> Result<(), TaskError> {
        tokio::select! {
            _ = ctx.cancelled() => return Err(TaskError::failed("probe cancelled")),
            _ = tokio::time::sleep(Duration::from_millis(50)) => {}
        }

        if self.failures_left.load(Ordering::SeqCst) > 0 {
            self.failures_left.fetch_sub(1, Ordering::SeqCst);
            return Err(TaskError::failed(format!("{} did not answer", self.host)));
        }
        Ok(())
    }
}

fn step(name: &str, priority: i32, delay: Duration) -> TaskRef {
    let label = name.to_string();
    PreflightTask::new(
        name,
        task_fn(move |ctx| {
            let label = label.clone();
            async move {
                tokio::select! {
                    _ = ctx.cancelled() => Err(TaskError::failed(format!("{label} cancelled"))),
                    _ = tokio::time::sleep(delay) => {
                        println!("  ran {label}");
                        Ok(())
                    }
                }
            }
        }),
    )
    .with_priority(priority)
    .shared()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("preflight=info".parse()?))
        .init();

    let config = PreflightConfig::from_json(
        r#"{
            "task_timeout": 2000,
            "retry_count": 3,
            "retry_delay": 100,
            "enable_debug_logging": true
        }"#,
    )?;

    let load_config = step("load_config", 0, Duration::from_millis(20));
    let check_dirs = step("check_directories", 1, Duration::from_millis(10));
    let probe = PreflightTask::new(
        "network_probe",
        NetworkProbe {
            host: "db.internal".to_string(),
            failures_left: AtomicU32::new(2),
        },
    )
    .with_description("Waits for the database host to answer")
    .with_priority(2)
    .shared();
    let warm_cache = step("warm_cache", 3, Duration::from_millis(30));
    let open_ui = step("open_ui", -1, Duration::from_millis(5));

    check_dirs.add_dependency(&load_config);
    probe.add_dependency(&load_config);
    warm_cache.add_dependency(&probe);
    warm_cache.add_dependency(&check_dirs);
    open_ui.add_dependency(&warm_cache);

    let mut manager = PreflightManager::new(config);
    let mut events = manager.subscribe();
    for task in [&load_config, &check_dirs, &probe, &warm_cache, &open_ui] {
        manager.add_task(Arc::clone(task));
    }

    manager.validate()?;

    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                PreflightEvent::TaskRetrying { task, attempt, max_attempts, error } => {
                    println!("  retry {}/{} for {}: {}", attempt, max_attempts, task.name(), error);
                }
                PreflightEvent::TaskCompleted { task, success, .. } => {
                    println!("  {} -> {}", task.name(), if success { "ok" } else { "failed" });
                }
                PreflightEvent::OverallProgress { progress } => {
                    println!("  progress {}", progress);
                }
                _ => {}
            }
        }
    });

    println!("=== running preflight checklist ===");
    let start = std::time::Instant::now();
    let report = manager.start().await?;
    drop(manager);
    printer.await?;

    println!("=== finished in {:?} ===", start.elapsed());
    println!("order: {}", report.execution_order.join(" -> "));
    println!("completed {}/{}, failed: {:?}", report.completed, report.total, report.failed);

    Ok(())
}
