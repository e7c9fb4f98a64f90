//! `queue`, `requeue` and `compact` command implementations.
//!
//! These open the queue journal directly. The journal lock refuses them
//! while a node has the same queue open.

use std::path::Path;

use anyhow::{Context, Result};
use contracts::{Measurement, QueueStats};
use local_queue::{QueueError, RejectedEntry, SharedQueue};
use serde::Serialize;
use tracing::info;

use super::load_settings;
use crate::cli::{ConfigArgs, QueueArgs, RequeueArgs};
use crate::error::CliError;

#[derive(Serialize)]
struct QueueReport {
    path: String,
    stats: QueueStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    oldest_pending: Option<Measurement>,
    rejected: Vec<RejectedEntry>,
}

async fn open_queue(config: &ConfigArgs) -> Result<SharedQueue> {
    let settings = load_settings(&config.config)?;
    open_queue_at(&settings.storage.queue_path).await
}

async fn open_queue_at(path: &Path) -> Result<SharedQueue> {
    match SharedQueue::open(path).await {
        Ok(queue) => Ok(queue),
        Err(QueueError::Locked { path }) => Err(CliError::QueueBusy { path }.into()),
        Err(e) => {
            Err(e).with_context(|| format!("Failed to open queue at {}", path.display()))
        }
    }
}

/// Execute the `queue` command
pub async fn run_queue(args: &QueueArgs) -> Result<()> {
    let queue = open_queue(&args.config).await?;

    let report = QueueReport {
        path: queue.path().display().to_string(),
        stats: queue.stats().await?,
        oldest_pending: queue.deliverable(1).await?.into_iter().next(),
        rejected: queue.rejected().await?,
    };

    if args.json {
        let json =
            serde_json::to_string_pretty(&report).context("Failed to serialize queue report")?;
        println!("{}", json);
    } else {
        print_queue_report(&report);
    }
    Ok(())
}

/// Execute the `requeue` command
pub async fn run_requeue(args: &RequeueArgs) -> Result<()> {
    let queue = open_queue(&args.config).await?;

    let released = match args.id {
        Some(id) => {
            if !queue.release(id).await? {
                return Err(CliError::NotRejected { id: id.to_string() }.into());
            }
            1
        }
        None => queue.release_all().await?,
    };

    info!(released, "Released rejected measurements");
    println!("✓ Released {} measurement(s) for redelivery", released);
    Ok(())
}

/// Execute the `compact` command
pub async fn run_compact(args: &ConfigArgs) -> Result<()> {
    let queue = open_queue(args).await?;
    let stats = queue.compact().await.context("Failed to compact queue")?;

    info!(
        frames_before = stats.frames_before,
        frames_after = stats.frames_after,
        "Queue compacted"
    );
    println!(
        "✓ Compacted {}: {} -> {} frames, {} -> {} bytes",
        queue.path().display(),
        stats.frames_before,
        stats.frames_after,
        stats.bytes_before,
        stats.bytes_after
    );
    Ok(())
}

fn print_queue_report(report: &QueueReport) {
    println!("💾 Local Queue: {}", report.path);
    println!("   ├─ Total: {}", report.stats.total);
    println!("   ├─ Pending: {}", report.stats.pending);
    println!("   ├─ Synced: {}", report.stats.synced);
    println!("   └─ Rejected: {}", report.stats.rejected);

    if let Some(ref oldest) = report.oldest_pending {
        println!(
            "\n⏳ Oldest deliverable: {} ({})",
            oldest.id,
            oldest.captured_at.to_rfc3339()
        );
    }

    if !report.rejected.is_empty() {
        println!("\n⚠ Rejected by central ({}):", report.rejected.len());
        for entry in &report.rejected {
            println!("   - {} at {}: {}", entry.id, entry.at.to_rfc3339(), entry.reason);
        }
        println!("\n  Release with: radar-node requeue --all-rejected");
    }
}
