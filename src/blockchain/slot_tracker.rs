//! Slot producers feeding the block workers through one bounded queue:
//! - historical: `[start, head]`, paced
//! - realtime: slots pushed by the node's `slotSubscribe`, after historical
//! - recovery: persisted `processing`/`failed` slots well behind the head

use crate::blockchain::client::ClientError;
use crate::constants::SLOT_SAFETY_MARGIN;
use crate::db::block::{earliest_failed_slot, find_retry_slots, latest_processed_slot};
use crate::db::DbError;
use futures::StreamExt;
use solana_client::nonblocking::pubsub_client::PubsubClient;
use sqlx::{Pool, Sqlite};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub const HISTORICAL_PACE: Duration = Duration::from_millis(5);
pub const RECOVERY_CHECK_INTERVAL: Duration = Duration::from_secs(5);
pub const RECOVERY_SEND_INTERVAL: Duration = Duration::from_secs(1);
pub const REDIAL_INTERVAL: Duration = Duration::from_secs(1);
const RECOVERY_BATCH: i64 = 50;

/// First slot to backfill from. Zero means no backfill. A configured slot
/// behind the persisted head moves up to the head minus a safety overlap.
pub async fn resolve_start_slot(db: &Pool<Sqlite>, configured: u64) -> Result<u64, DbError> {
    let start = if configured == 0 {
        earliest_failed_slot(db).await?.unwrap_or(0)
    } else {
        configured
    };
    if start == 0 {
        return Ok(0);
    }

    match latest_processed_slot(db).await? {
        Some(head) if head > start => Ok(head.saturating_sub(SLOT_SAFETY_MARGIN).max(start)),
        _ => Ok(start),
    }
}

/// Send `[start, end]` at `pace`. Returns how many slots went out.
pub async fn emit_historical(
    queue: &mpsc::Sender<u64>,
    start: u64,
    end: u64,
    pace: Duration,
    cancel: &CancellationToken,
) -> u64 {
    if start == 0 || start > end {
        return 0;
    }
    info!("Backfilling slots {}..={}", start, end);

    let mut sent = 0;
    for slot in start..=end {
        tokio::select! {
            _ = cancel.cancelled() => break,
            result = queue.send(slot) => {
                if result.is_err() {
                    break;
                }
                sent += 1;
            }
        }
        if !pace.is_zero() {
            tokio::time::sleep(pace).await;
        }
    }

    info!("Historical backfill finished after {} slot(s)", sent);
    sent
}

/// Periodically requeue unfinished slots older than `head - margin`.
pub async fn run_recovery(
    db: Pool<Sqlite>,
    queue: mpsc::Sender<u64>,
    head: Arc<AtomicU64>,
    check_every: Duration,
    send_every: Duration,
    cancel: CancellationToken,
) {
    let mut check = tokio::time::interval(check_every);
    let mut send = tokio::time::interval(send_every);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = check.tick() => {}
        }

        let current = head.load(Ordering::Acquire);
        if current <= SLOT_SAFETY_MARGIN {
            continue;
        }

        let slots = match find_retry_slots(&db, current - SLOT_SAFETY_MARGIN, RECOVERY_BATCH).await {
            Ok(slots) => slots,
            Err(e) => {
                error!("Recovery scan failed: {}", e);
                continue;
            }
        };
        if !slots.is_empty() {
            info!("Requeueing {} unfinished slot(s)", slots.len());
        }

        for slot in slots {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = send.tick() => {}
            }
            if queue.send(slot).await.is_err() {
                return;
            }
            debug!(slot, "Requeued slot");
        }
    }

    info!("Recovery producer stopped");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WsState {
    Disconnected,
    Connecting,
    Subscribed,
    Streaming,
}

/// One subscription session. Returns when the stream ends, the queue
/// closes or the token is cancelled.
async fn stream_session(
    url: &str,
    queue: &mpsc::Sender<u64>,
    head: &AtomicU64,
    cancel: &CancellationToken,
) -> Result<(), ClientError> {
    let mut state = WsState::Connecting;
    debug!("Slot stream {:?}: {}", state, url);

    let client = PubsubClient::new(url)
        .await
        .map_err(|e| ClientError::Transient(format!("websocket connect: {}", e)))?;
    let (mut stream, unsubscribe) = client
        .slot_subscribe()
        .await
        .map_err(|e| ClientError::Transient(format!("slotSubscribe: {}", e)))?;
    state = WsState::Subscribed;
    info!("Slot stream {:?}", state);

    loop {
        let message = tokio::select! {
            _ = cancel.cancelled() => break,
            message = stream.next() => message,
        };
        let Some(info) = message else {
            warn!("Slot stream closed by the node");
            break;
        };
        if state != WsState::Streaming {
            state = WsState::Streaming;
            debug!("Slot stream {:?}", state);
        }

        // Only forward slots past the head seen so far
        if info.slot <= head.fetch_max(info.slot, Ordering::AcqRel) {
            continue;
        }
        tokio::select! {
            _ = cancel.cancelled() => break,
            result = queue.send(info.slot) => {
                if result.is_err() {
                    break;
                }
            }
        }
    }

    unsubscribe().await;
    Ok(())
}

/// Follow the chain head, re-dialling at a fixed interval after errors.
pub async fn run_realtime(
    url: String,
    queue: mpsc::Sender<u64>,
    head: Arc<AtomicU64>,
    redial: Duration,
    cancel: CancellationToken,
) {
    while !cancel.is_cancelled() && !queue.is_closed() {
        if let Err(e) = stream_session(&url, &queue, &head, &cancel).await {
            warn!("Slot stream {:?}: {}", WsState::Disconnected, e);
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(redial) => {}
        }
    }

    info!("Realtime producer stopped");
}

pub struct SlotTracker {
    pub db: Pool<Sqlite>,
    pub ws_url: String,
    pub start_slot: u64,
    pub queue_capacity: usize,
}

impl SlotTracker {
    /// Spawn the producers. The returned queue closes once every producer
    /// has stopped, which happens after `cancel` fires.
    pub async fn start(
        self,
        initial_head: u64,
        cancel: CancellationToken,
    ) -> Result<(mpsc::Receiver<u64>, Vec<JoinHandle<()>>), DbError> {
        let (queue, receiver) = mpsc::channel(self.queue_capacity.max(1));
        let head = Arc::new(AtomicU64::new(initial_head));
        let start = resolve_start_slot(&self.db, self.start_slot).await?;
        info!("Slot tracker starting: backfill from {}, head {}", start, initial_head);

        let recovery = tokio::spawn(run_recovery(
            self.db.clone(),
            queue.clone(),
            head.clone(),
            RECOVERY_CHECK_INTERVAL,
            RECOVERY_SEND_INTERVAL,
            cancel.clone(),
        ));

        let ws_url = self.ws_url;
        let forward = tokio::spawn(async move {
            emit_historical(&queue, start, initial_head, HISTORICAL_PACE, &cancel).await;
            if !cancel.is_cancelled() {
                run_realtime(ws_url, queue, head, REDIAL_INTERVAL, cancel).await;
            }
        });

        Ok((receiver, vec![recovery, forward]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::block::upsert_block;
    use crate::db::connection::establish_memory_connection;
    use crate::models::block::{BlockRecord, BlockStatus};

    async fn record(db: &Pool<Sqlite>, slot: u64, status: BlockStatus) {
        upsert_block(db, &BlockRecord::new(slot, status)).await.unwrap();
    }

    #[tokio::test]
    async fn test_start_slot_resolution() {
        let db = establish_memory_connection().await.unwrap();
        assert_eq!(resolve_start_slot(&db, 0).await.unwrap(), 0);
        assert_eq!(resolve_start_slot(&db, 1_000).await.unwrap(), 1_000);

        record(&db, 700, BlockStatus::Failed).await;
        assert_eq!(resolve_start_slot(&db, 0).await.unwrap(), 700);

        record(&db, 5_000, BlockStatus::Processed).await;
        assert_eq!(resolve_start_slot(&db, 1_000).await.unwrap(), 4_900);
        assert_eq!(resolve_start_slot(&db, 4_950).await.unwrap(), 4_950);
    }

    #[tokio::test]
    async fn test_historical_emits_inclusive_range() {
        let (queue, mut receiver) = mpsc::channel(16);
        let cancel = CancellationToken::new();

        assert_eq!(emit_historical(&queue, 10, 14, Duration::ZERO, &cancel).await, 5);
        assert_eq!(emit_historical(&queue, 0, 14, Duration::ZERO, &cancel).await, 0);
        drop(queue);

        let mut slots = Vec::new();
        while let Some(slot) = receiver.recv().await {
            slots.push(slot);
        }
        assert_eq!(slots, vec![10, 11, 12, 13, 14]);
    }

    #[tokio::test]
    async fn test_recovery_requeues_old_unfinished_slots() {
        let db = establish_memory_connection().await.unwrap();
        record(&db, 100, BlockStatus::Failed).await;
        record(&db, 150, BlockStatus::Processing).await;
        record(&db, 160, BlockStatus::Processed).await;
        record(&db, 950, BlockStatus::Failed).await;

        let (queue, mut receiver) = mpsc::channel(16);
        let head = Arc::new(AtomicU64::new(1_000));
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_recovery(
            db,
            queue,
            head,
            Duration::from_millis(10),
            Duration::from_millis(1),
            cancel.clone(),
        ));

        assert_eq!(receiver.recv().await, Some(100));
        assert_eq!(receiver.recv().await, Some(150));
        cancel.cancel();
        task.await.unwrap();
    }
}
