//! Per-key async locking, grounded on the same `OwnedMutexGuard` pattern the
//! teacher uses for its distributed rule-scheduler locks, scaled down to an
//! in-process `(site, hour_bucket)` / `(site, fingerprint)` lock since this
//! crate runs a single pipeline driver rather than a fleet of schedulers
//! (§5 "per-(site, bucket) lock in the driver").

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OwnedMutexGuard};

type LockMap = HashMap<String, (Arc<Mutex<()>>, Instant)>;

const STALE_AFTER: Duration = Duration::from_secs(60);

fn registry() -> &'static Mutex<LockMap> {
    static REGISTRY: OnceLock<Mutex<LockMap>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Holds the lock for one key until dropped.
pub struct KeyGuard {
    _guard: OwnedMutexGuard<()>,
}

/// Acquire the lock for `key`, creating its entry if this is the first
/// caller to touch it. Entries untouched for [`STALE_AFTER`] are
/// opportunistically cleaned up on the next call, the same cadence as the
/// teacher's scheduler locks.
pub async fn lock_key(key: &str) -> KeyGuard {
    let mutex = {
        let mut map = registry().lock().await;
        map.retain(|_, (lock, last_used)| Arc::strong_count(lock) > 1 || last_used.elapsed() < STALE_AFTER);
        map.entry(key.to_string()).or_insert_with(|| (Arc::new(Mutex::new(())), Instant::now())).0.clone()
    };
    let guard = mutex.lock_owned().await;
    KeyGuard { _guard: guard }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_key_serializes_across_tasks() {
        let g1 = lock_key("site1:2026-01-23T10:00:00Z").await;
        let handle = tokio::spawn(async {
            let started = Instant::now();
            let _g2 = lock_key("site1:2026-01-23T10:00:00Z").await;
            started.elapsed()
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(g1);
        let waited = handle.await.unwrap();
        assert!(waited >= Duration::from_millis(15));
    }

    #[tokio::test]
    async fn different_keys_do_not_block_each_other() {
        let _g1 = lock_key("a").await;
        let g2 = tokio::time::timeout(Duration::from_millis(50), lock_key("b")).await;
        assert!(g2.is_ok());
    }
}
