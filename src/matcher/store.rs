//! Shared order lists and the named locks guarding them.
//!
//! Keys:
//! - `limit:{token}:{side}` holds price-triggered orders in insertion order
//! - `trailing:{token}:{chain}` holds trailing-stop orders
//! - `limit:{token}:{side}:lock` is the per-(token, side) lock

use crate::matcher::MatcherError;
use crate::models::order::{PriceLimitItem, Side, TrailingItem};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

pub const LOCK_TIMEOUT: Duration = Duration::from_secs(10);
pub const LOCK_LEASE: Duration = Duration::from_secs(10);
const LOCK_POLL: Duration = Duration::from_millis(50);

pub fn limit_key(token: &str, side: Side) -> String {
    format!("limit:{}:{}", token, side)
}

pub fn lock_key(token: &str, side: Side) -> String {
    format!("limit:{}:{}:lock", token, side)
}

pub fn trailing_key(token: &str, chain_id: i64) -> String {
    format!("trailing:{}:{}", token, chain_id)
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Try once to take `key` for `lease`. Returns the owner token on success.
    async fn try_lock(&self, key: &str, lease: Duration) -> Result<Option<String>, MatcherError>;

    /// Release `key` if `owner` still holds it.
    async fn unlock(&self, key: &str, owner: &str) -> Result<(), MatcherError>;

    async fn read_list(&self, key: &str) -> Result<Vec<String>, MatcherError>;

    /// Replace the whole list in one step.
    async fn replace_list(&self, key: &str, items: &[String]) -> Result<(), MatcherError>;

    async fn push(&self, key: &str, item: String) -> Result<(), MatcherError>;
}

static LOCK_OWNER: AtomicU64 = AtomicU64::new(1);

fn next_owner() -> String {
    format!("{}-{}", std::process::id(), LOCK_OWNER.fetch_add(1, Ordering::Relaxed))
}

/// Run `f` while holding the named lock. The lock is released whether `f`
/// succeeds or fails; acquisition gives up after `timeout`.
pub async fn with_lock<S, F, Fut, T>(store: &S, key: &str, timeout: Duration, f: F) -> Result<T, MatcherError>
where
    S: OrderStore + ?Sized,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, MatcherError>>,
{
    let deadline = Instant::now() + timeout;
    let owner = loop {
        if let Some(owner) = store.try_lock(key, LOCK_LEASE).await? {
            break owner;
        }
        if Instant::now() >= deadline {
            return Err(MatcherError::LockTimeout(key.to_string()));
        }
        tokio::time::sleep(LOCK_POLL).await;
    };

    let result = f().await;

    if let Err(e) = store.unlock(key, &owner).await {
        warn!("Failed to release lock {}: {}", key, e);
    }
    result
}

fn decode_items<T: DeserializeOwned>(key: &str, raw: Vec<String>) -> Vec<T> {
    raw.into_iter()
        .filter_map(|item| match serde_json::from_str(&item) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                warn!("Dropping unreadable entry in {}: {}", key, e);
                None
            }
        })
        .collect()
}

fn encode_items<T: Serialize>(items: &[T]) -> Result<Vec<String>, MatcherError> {
    items
        .iter()
        .map(|item| serde_json::to_string(item).map_err(|e| MatcherError::Store(e.to_string())))
        .collect()
}

pub async fn load_limits(store: &dyn OrderStore, token: &str, side: Side) -> Result<Vec<PriceLimitItem>, MatcherError> {
    let key = limit_key(token, side);
    let raw = store.read_list(&key).await?;
    Ok(decode_items(&key, raw))
}

pub async fn save_limits(
    store: &dyn OrderStore,
    token: &str,
    side: Side,
    items: &[PriceLimitItem],
) -> Result<(), MatcherError> {
    store.replace_list(&limit_key(token, side), &encode_items(items)?).await
}

pub async fn load_trailing(store: &dyn OrderStore, token: &str, chain_id: i64) -> Result<Vec<TrailingItem>, MatcherError> {
    let key = trailing_key(token, chain_id);
    let raw = store.read_list(&key).await?;
    Ok(decode_items(&key, raw))
}

pub async fn save_trailing(
    store: &dyn OrderStore,
    token: &str,
    chain_id: i64,
    items: &[TrailingItem],
) -> Result<(), MatcherError> {
    store.replace_list(&trailing_key(token, chain_id), &encode_items(items)?).await
}

/// Register a waiting price order on its list.
pub async fn register_limit(store: &dyn OrderStore, token: &str, side: Side, item: &PriceLimitItem) -> Result<(), MatcherError> {
    let encoded = serde_json::to_string(item).map_err(|e| MatcherError::Store(e.to_string()))?;
    store.push(&limit_key(token, side), encoded).await
}

pub async fn register_trailing(store: &dyn OrderStore, token: &str, chain_id: i64, item: &TrailingItem) -> Result<(), MatcherError> {
    let encoded = serde_json::to_string(item).map_err(|e| MatcherError::Store(e.to_string()))?;
    store.push(&trailing_key(token, chain_id), encoded).await
}

/// Process-local store, used when no Redis is configured and in tests.
#[derive(Default)]
pub struct MemoryOrderStore {
    lists: Mutex<HashMap<String, Vec<String>>>,
    locks: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn try_lock(&self, key: &str, lease: Duration) -> Result<Option<String>, MatcherError> {
        let mut locks = self.locks.lock().await;
        let now = Instant::now();

        if let Some((_, expires)) = locks.get(key) {
            if *expires > now {
                return Ok(None);
            }
        }

        let owner = next_owner();
        locks.insert(key.to_string(), (owner.clone(), now + lease));
        Ok(Some(owner))
    }

    async fn unlock(&self, key: &str, owner: &str) -> Result<(), MatcherError> {
        let mut locks = self.locks.lock().await;
        if locks.get(key).is_some_and(|(held, _)| held == owner) {
            locks.remove(key);
        }
        Ok(())
    }

    async fn read_list(&self, key: &str) -> Result<Vec<String>, MatcherError> {
        Ok(self.lists.lock().await.get(key).cloned().unwrap_or_default())
    }

    async fn replace_list(&self, key: &str, items: &[String]) -> Result<(), MatcherError> {
        let mut lists = self.lists.lock().await;
        if items.is_empty() {
            lists.remove(key);
        } else {
            lists.insert(key.to_string(), items.to_vec());
        }
        Ok(())
    }

    async fn push(&self, key: &str, item: String) -> Result<(), MatcherError> {
        self.lists.lock().await.entry(key.to_string()).or_default().push(item);
        Ok(())
    }
}

const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// Redis-backed store shared by every matcher process.
#[derive(Clone)]
pub struct RedisOrderStore {
    con: ConnectionManager,
}

impl RedisOrderStore {
    pub async fn connect(url: &str) -> Result<Self, MatcherError> {
        let client = redis::Client::open(url)?;
        let con = ConnectionManager::new(client).await?;
        debug!("Connected order store to {}", url);
        Ok(Self { con })
    }
}

#[async_trait]
impl OrderStore for RedisOrderStore {
    async fn try_lock(&self, key: &str, lease: Duration) -> Result<Option<String>, MatcherError> {
        let mut con = self.con.clone();
        let owner = next_owner();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(&owner)
            .arg("NX")
            .arg("PX")
            .arg(lease.as_millis() as u64)
            .query_async(&mut con)
            .await?;

        Ok(reply.map(|_| owner))
    }

    async fn unlock(&self, key: &str, owner: &str) -> Result<(), MatcherError> {
        let mut con = self.con.clone();
        let _: i64 = redis::cmd("EVAL")
            .arg(RELEASE_SCRIPT)
            .arg(1)
            .arg(key)
            .arg(owner)
            .query_async(&mut con)
            .await?;
        Ok(())
    }

    async fn read_list(&self, key: &str) -> Result<Vec<String>, MatcherError> {
        let mut con = self.con.clone();
        let items: Vec<String> = redis::cmd("LRANGE").arg(key).arg(0).arg(-1).query_async(&mut con).await?;
        Ok(items)
    }

    async fn replace_list(&self, key: &str, items: &[String]) -> Result<(), MatcherError> {
        let mut con = self.con.clone();
        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.cmd("DEL").arg(key).ignore();
        if !items.is_empty() {
            pipe.cmd("RPUSH").arg(key).arg(items).ignore();
        }
        pipe.query_async::<()>(&mut con).await?;
        Ok(())
    }

    async fn push(&self, key: &str, item: String) -> Result<(), MatcherError> {
        let mut con = self.con.clone();
        let _: i64 = redis::cmd("RPUSH").arg(key).arg(item).query_async(&mut con).await?;
        Ok(())
    }
}
