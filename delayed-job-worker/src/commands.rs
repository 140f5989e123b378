use std::future::Future;
use std::io::Write;

use anyhow::{bail, Context, Result};
use serde_json::Value;
use tracing::info;

use delayed_job::{
    timestamp_now, Counts, MetricsSnapshot, QueueAdapter, QueueBackend, Transition, WorkerState,
};

use crate::cli::Command;

/// Run a worker on the adapter's configured queue until `shutdown` resolves
pub async fn work<B, S>(adapter: &QueueAdapter<B>, shutdown: S) -> Result<()>
where
    B: QueueBackend + 'static,
    S: Future<Output = ()>,
{
    let handle = adapter.start_worker()?;
    let mut state = handle.state_changes();
    let worker_stopped = async {
        let _ = state.wait_for(|s| *s == WorkerState::Stopped).await;
    };

    tokio::select! {
        _ = shutdown => info!("Shutdown requested"),
        _ = worker_stopped => info!("Worker stopped on its own"),
    }

    handle.shutdown().await?;

    for line in metrics_summary(&adapter.observability().metrics().snapshot()) {
        info!("{}", line);
    }
    Ok(())
}

/// Human readable counters of this process: one line for all jobs, then one per class
pub fn metrics_summary(snapshot: &MetricsSnapshot) -> Vec<String> {
    let line = |label: &str, counts: &Counts| {
        format!(
            "{}: started {}, completed {}, retried {}, dead-lettered {} (success {:.1}%, retry {:.1}%)",
            label,
            counts.get(Transition::Started),
            counts.get(Transition::Completed),
            counts.get(Transition::Retried),
            counts.get(Transition::DeadLettered),
            counts.success_rate(),
            counts.retry_rate(),
        )
    };

    let mut classes: Vec<_> = snapshot.by_class.iter().collect();
    classes.sort_by(|a, b| a.0.cmp(b.0));

    let mut lines = vec![line("all jobs", &snapshot.totals)];
    lines.extend(classes.into_iter().map(|(class, counts)| line(class.as_str(), counts)));
    lines
}

/// Everything but `work`. Output goes to `out` so callers can capture it.
pub async fn execute<B, W>(adapter: &QueueAdapter<B>, command: Command, out: &mut W) -> Result<()>
where
    B: QueueBackend + 'static,
    W: Write,
{
    match command {
        Command::Work { .. } => bail!("`work` runs through commands::work"),
        Command::Enqueue { class, data, queue, delay } => {
            let data: Value = serde_json::from_str(&data).with_context(|| format!("invalid JSON payload: {}", data))?;
            let run_at = delay.map(|secs| timestamp_now() + secs as i64);
            let record = adapter.enqueue_class(&queue, &class, data, run_at).await?;
            writeln!(out, "{}", record.id)?;
        }
        Command::List { kind, queue, offset, limit } => {
            for record in adapter.list(&queue, kind, offset, limit).await? {
                writeln!(out, "{}", record.to_json()?)?;
            }
        }
        Command::Stats { queue } => {
            let stats = adapter.stats(&queue).await?;
            writeln!(out, "{}", serde_json::to_string_pretty(&stats)?)?;
        }
        Command::Clear { kind, queue } => {
            let removed = adapter.count(&queue, kind).await?;
            adapter.clear(&queue, kind).await?;
            writeln!(out, "Removed {} {} records from {}", removed, kind, queue)?;
        }
    }
    Ok(())
}
