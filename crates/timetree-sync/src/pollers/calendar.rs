//! Calendar sync background task.
//!
//! Every cycle enumerates the configured mappings, exports them one after
//! another and then sleeps for the configured interval. The sleep starts
//! after the work is done, so cycle start times drift by however long the
//! exports took.

use crate::config::MappingSource;
use crate::exporter::Exporter;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// Per-cycle counters, logged at the end of each cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleStats {
    pub units: usize,
    pub synced: usize,
    pub failed: usize,
}

/// Start the calendar sync loop. Never returns; abort the task to stop it.
pub async fn start_calendar_sync_task(exporter: Exporter, source: Arc<dyn MappingSource>) {
    let interval = exporter.settings().sync_interval();

    tracing::info!(
        "Starting calendar sync task (interval: {} minutes)",
        exporter.settings().sync_interval_minutes
    );

    loop {
        let stats = run_sync_cycle(&exporter, source.as_ref()).await;

        if stats.units > 0 {
            tracing::info!(
                "Sync cycle finished: {} units, {} synced, {} failed",
                stats.units,
                stats.synced,
                stats.failed
            );
        }

        tracing::info!(
            "Sleeping {} minutes...",
            exporter.settings().sync_interval_minutes
        );
        tokio::time::sleep(interval).await;
    }
}

/// Run one pass over the current mappings.
///
/// Units are exported strictly one at a time. A unit that fails, or whose
/// sync panics, is logged and skipped; the rest of the cycle carries on.
pub async fn run_sync_cycle(exporter: &Exporter, source: &dyn MappingSource) -> CycleStats {
    let mappings = source.mappings();

    if mappings.is_empty() {
        tracing::info!("No units found in environment");
        return CycleStats::default();
    }

    let names: Vec<&str> = mappings.iter().map(|m| m.name.as_str()).collect();
    tracing::info!("Units found: {:?}", names);

    let mut stats = CycleStats {
        units: mappings.len(),
        ..Default::default()
    };

    for mapping in &mappings {
        match AssertUnwindSafe(exporter.sync_one(mapping))
            .catch_unwind()
            .await
        {
            Ok(Ok(_report)) => stats.synced += 1,
            Ok(Err(e)) => {
                tracing::error!("Error syncing {}: {}", mapping.name, e);
                stats.failed += 1;
            }
            Err(panic) => {
                tracing::error!(
                    "Error syncing {}: sync panicked: {}",
                    mapping.name,
                    panic_message(panic.as_ref())
                );
                stats.failed += 1;
            }
        }
    }

    stats
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic payload"
    }
}
