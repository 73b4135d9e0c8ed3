use crate::blockchain::processor::{BlockProcessor, SlotOutcome};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

type SlotReceiver = Arc<Mutex<mpsc::Receiver<u64>>>;

/// Block workers sharing one slot queue. They stop once the queue is
/// closed and drained.
pub struct WorkerPool {
    workers: Vec<WorkerHandle>,
}

struct WorkerHandle {
    id: usize,
    handle: tokio::task::JoinHandle<()>,
}

impl WorkerPool {
    pub fn start(processor: Arc<BlockProcessor>, receiver: mpsc::Receiver<u64>, worker_count: usize) -> Self {
        let receiver = Arc::new(Mutex::new(receiver));
        let worker_count = worker_count.max(1);
        let mut workers = Vec::with_capacity(worker_count);

        for id in 0..worker_count {
            let worker = Worker { id, processor: processor.clone(), receiver: receiver.clone() };
            let handle = tokio::spawn(async move { worker.run().await });
            workers.push(WorkerHandle { id, handle });
        }

        info!("Started {} block worker(s)", worker_count);
        Self { workers }
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Wait for every worker to drain. Returns false if the timeout hit
    /// first; the remaining workers are aborted.
    pub async fn join(self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        let mut clean = true;

        for WorkerHandle { id, mut handle } in self.workers {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Block worker {} panicked: {}", id, e),
                Err(_) => {
                    warn!("Block worker {} still busy at shutdown, aborting", id);
                    handle.abort();
                    clean = false;
                }
            }
        }
        clean
    }
}

struct Worker {
    id: usize,
    processor: Arc<BlockProcessor>,
    receiver: SlotReceiver,
}

impl Worker {
    async fn run(&self) {
        debug!("Block worker {} started", self.id);

        loop {
            let slot = {
                let mut receiver = self.receiver.lock().await;
                match receiver.recv().await {
                    Some(slot) => slot,
                    None => break,
                }
            };

            match self.processor.process_slot(slot).await {
                Ok(SlotOutcome::Processed { trades }) => debug!(slot, trades, "Worker {} indexed slot", self.id),
                Ok(outcome) => debug!(slot, "Worker {} finished slot: {:?}", self.id, outcome),
                Err(e) => error!(slot, "Worker {} failed slot: {}", self.id, e),
            }
        }

        info!("Block worker {} shutting down", self.id);
    }
}
