pub mod client;
pub mod models;
pub mod persist;
pub mod processor;
pub mod slot_tracker;
pub mod worker_pool;

pub use client::{ChainClient, ChainSource, ClientError};
pub use processor::{BlockProcessor, SlotOutcome};
pub use slot_tracker::SlotTracker;
pub use worker_pool::WorkerPool;
