use crate::classifier::{classify, ExecutionContext};
use crate::config::TaskSpec;
use crate::logging::JsonlLogger;
use crate::runtime::ProcessRunner;
use crate::types::ExecutionResult;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;

/// Classifies every task concurrently and returns results aligned to `tasks`.
///
/// `parallelism` bounds the number of worker threads; `None` runs one worker
/// per task. Blocks until the whole batch has finished.
pub fn run_task_batch(
    tasks: &[TaskSpec],
    ctx: &ExecutionContext,
    runner: &dyn ProcessRunner,
    parallelism: Option<usize>,
) -> Vec<ExecutionResult> {
    if tasks.is_empty() {
        return Vec::new();
    }
    let workers = parallelism
        .unwrap_or(tasks.len())
        .clamp(1, tasks.len());
    let cursor = AtomicUsize::new(0);
    let (tx, mut rx) = mpsc::unbounded_channel::<(usize, ExecutionResult)>();
    let mut slots: Vec<Option<ExecutionResult>> = vec![None; tasks.len()];

    std::thread::scope(|scope| {
        for _ in 0..workers {
            let tx = tx.clone();
            let cursor = &cursor;
            scope.spawn(move || loop {
                let idx = cursor.fetch_add(1, Ordering::SeqCst);
                let Some(task) = tasks.get(idx) else {
                    break;
                };
                let result = classify(task, ctx, runner);
                if tx.send((idx, result)).is_err() {
                    break;
                }
            });
        }
        drop(tx);

        while let Some((idx, result)) = rx.blocking_recv() {
            slots[idx] = Some(result);
        }
    });

    slots
        .into_iter()
        .map(|slot| {
            slot.unwrap_or_else(|| {
                ExecutionResult::critical("worker exited without a result", String::new())
            })
        })
        .collect()
}

pub fn log_batch(logger: &JsonlLogger, tasks: &[TaskSpec], results: &[ExecutionResult]) {
    for (task, result) in tasks.iter().zip(results) {
        logger.record(
            "debug",
            "task.result",
            json!({
                "task": task.name,
                "command": task.command,
                "level": result.level.as_str(),
                "message": result.message,
                "details": result.details,
            }),
        );
    }
}
