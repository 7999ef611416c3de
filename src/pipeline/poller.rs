//! Fixed-interval cycle trigger.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;

use crate::error::AppError;
use crate::pipeline::Crawler;

/// Starts a sync cycle on every tick until shut down.
pub struct Poller {
    crawler: Arc<Crawler>,
    interval: Duration,
}

impl Poller {
    pub fn new(crawler: Arc<Crawler>, interval: Duration) -> Self {
        Self { crawler, interval }
    }

    /// Tick until `shutdown` resolves, then wait for running cycles.
    ///
    /// Returns the number of cycles triggered. A tick that lands while a
    /// cycle is still running is rejected by the crawler and only logged.
    pub async fn run_until(&self, shutdown: impl Future<Output = ()>) -> usize {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut running = JoinSet::new();
        let mut triggered = 0;

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    triggered += 1;
                    let crawler = Arc::clone(&self.crawler);
                    running.spawn(async move { run_logged(&crawler).await });
                }
                // Reap finished cycles so the set does not grow
                Some(_) = running.join_next(), if !running.is_empty() => {}
            }
        }

        log::info!("Poller stopping; waiting for {} running cycles", running.len());
        while running.join_next().await.is_some() {}
        triggered
    }
}

async fn run_logged(crawler: &Crawler) {
    match crawler.run_cycle().await {
        Ok(_) => {}
        Err(AppError::CycleInProgress) => {
            log::warn!("Previous sync cycle still running; skipping this tick");
        }
        Err(e) => log::error!("Sync cycle failed: {}", e),
    }
}
