use crate::matcher::ring::Ring;
use crate::matcher::{Matcher, MatcherError, PriceTick};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const CLAIM_BATCH: usize = 32;

/// Fixed set of workers matching price ticks pulled from a shared ring.
pub struct MatcherPool {
    ring: Arc<Ring<PriceTick>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl MatcherPool {
    pub fn start(matcher: Arc<Matcher>, worker_count: usize, ring_size: usize) -> Self {
        let ring = Arc::new(Ring::new(ring_size));
        let workers = (0..worker_count.max(1))
            .map(|id| {
                let ring = ring.clone();
                let matcher = matcher.clone();
                tokio::spawn(async move { run_worker(id, ring, matcher).await })
            })
            .collect();

        info!("Matcher pool started with {} workers, ring size {}", worker_count.max(1), ring.capacity());
        Self { ring, workers: Mutex::new(workers) }
    }

    pub async fn submit(&self, tick: PriceTick) -> Result<(), MatcherError> {
        self.ring.publish(tick).await.map(|_| ()).map_err(|_| MatcherError::Closed)
    }

    /// Close the ring and wait for workers to drain it. Returns false when
    /// `timeout` ran out first.
    pub async fn release(&self, timeout: Duration) -> bool {
        self.ring.close();
        let workers = std::mem::take(&mut *self.workers.lock().await);

        match tokio::time::timeout(timeout, join_all(workers)).await {
            Ok(results) => {
                for result in results {
                    if let Err(e) = result {
                        error!("Matcher worker ended abnormally: {}", e);
                    }
                }
                info!("Matcher pool released");
                true
            }
            Err(_) => {
                warn!("Matcher pool did not drain within {:?}", timeout);
                false
            }
        }
    }
}

async fn run_worker(id: usize, ring: Arc<Ring<PriceTick>>, matcher: Arc<Matcher>) {
    debug!("Matcher worker {} started", id);

    while let Some((lower, ticks)) = ring.claim(CLAIM_BATCH).await {
        let upper = lower + ticks.len() as u64;
        for tick in ticks {
            match matcher.on_price(&tick).await {
                Ok(outcome) if !outcome.fired.is_empty() => {
                    info!(token = %tick.token_address, side = %tick.side, "Fired {} order(s)", outcome.fired.len())
                }
                Ok(_) => {}
                Err(MatcherError::LockTimeout(key)) => {
                    warn!("Lock {} busy, tick for {} dropped until the next update", key, tick.token_address)
                }
                Err(e) => error!(token = %tick.token_address, "Matching failed: {}", e),
            }
        }
        debug!("Matcher worker {} finished sequences {}..{}", id, lower, upper);
    }

    debug!("Matcher worker {} stopped", id);
}
