//! Fixed-interval source poller
//!
//! Drives an `EventSource` on a timer and feeds each batch through the
//! pipeline. A failed cycle is logged and retried on the next tick; the
//! poller itself never exits on error. Shutdown is signalled through a
//! watch channel and honored between cycles, so a cycle that has started
//! finishes and no write is cut off mid-transaction.

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::error::IngestError;
use crate::event::ParsedEvent;
use crate::pipeline::IngestPipeline;

/// A pageable upstream source of parsed events.
///
/// `next_page` returns the next unconsumed page for the current cycle; an
/// empty page means the cycle is drained. The source manages its own cursor
/// (e.g. a mail-folder position) across cycles.
#[async_trait]
pub trait EventSource: Send {
    async fn next_page(&mut self) -> Result<Vec<ParsedEvent>, IngestError>;
}

/// Polls an `EventSource` at a fixed interval, bounded per cycle.
pub struct IngestPoller<S> {
    pipeline: IngestPipeline,
    source: S,
    interval: std::time::Duration,
    max_pages_per_cycle: u32,
}

impl<S: EventSource> IngestPoller<S> {
    pub fn new(
        pipeline: IngestPipeline,
        source: S,
        interval: std::time::Duration,
        max_pages_per_cycle: u32,
    ) -> Self {
        Self {
            pipeline,
            source,
            interval,
            max_pages_per_cycle,
        }
    }

    /// Run one fetch-and-apply cycle. Per-event failures are logged and do
    /// not stop the rest of the batch.
    pub async fn run_cycle(&mut self) -> Result<usize, IngestError> {
        let mut processed = 0;
        for _ in 0..self.max_pages_per_cycle {
            let page = self.source.next_page().await?;
            if page.is_empty() {
                break;
            }
            for event in &page {
                match self.pipeline.ingest(event).await {
                    Ok(outcome) => {
                        debug!(event_id = %event.event_id, ?outcome, "ingested");
                        processed += 1;
                    }
                    Err(error) => {
                        warn!(%error, event_id = %event.event_id, "event failed; continuing");
                    }
                }
            }
        }
        Ok(processed)
    }

    /// Poll until the shutdown channel flips to `true`.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_secs = self.interval.as_secs(), "ingest poller started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.run_cycle().await {
                        Ok(processed) if processed > 0 => {
                            info!(processed, "ingest cycle complete");
                        }
                        Ok(_) => {}
                        Err(error) => warn!(%error, "ingest cycle failed; will retry"),
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("ingest poller stopping");
                        break;
                    }
                }
            }
        }
    }
}
