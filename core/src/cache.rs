// catalog_core/src/cache.rs

//! TTL cache with single-flight computation, plus the cache-aside front that
//! decides per request whether to consult it at all.

use crate::error::CatalogResult;
use crate::injector::RollSource;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, instrument, trace};

type SharedComputation<V> = Shared<BoxFuture<'static, CatalogResult<V>>>;

enum Slot<V> {
  Ready {
    value: V,
    expires_at: Instant,
  },
  Pending {
    generation: u64,
    ttl: Duration,
    computation: SharedComputation<V>,
  },
}

/// Counters for observing cache behaviour.
#[derive(Debug, Default)]
pub struct CacheStats {
  hits: AtomicU64,
  computations: AtomicU64,
  joins: AtomicU64,
  bypasses: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStatsSnapshot {
  pub hits: u64,
  pub computations: u64,
  pub joins: u64,
  pub bypasses: u64,
}

impl CacheStats {
  pub fn snapshot(&self) -> CacheStatsSnapshot {
    CacheStatsSnapshot {
      hits: self.hits.load(Ordering::Relaxed),
      computations: self.computations.load(Ordering::Relaxed),
      joins: self.joins.load(Ordering::Relaxed),
      bypasses: self.bypasses.load(Ordering::Relaxed),
    }
  }
}

/// Key → value-or-pending-computation map.
///
/// The map lock only guards bookkeeping and is never held while a value is
/// computed, so a slow key never blocks another one. A pending computation is
/// a shared future: whoever awaits it drives it, so a dropped caller does not
/// strand the others, and a computation abandoned by every caller resumes with
/// the next one. Failures reach every waiter and leave no entry behind.
pub struct SingleFlightCache<V> {
  slots: Mutex<HashMap<String, Slot<V>>>,
  next_generation: AtomicU64,
  stats: CacheStats,
}

impl<V> Default for SingleFlightCache<V> {
  fn default() -> Self {
    Self {
      slots: Mutex::new(HashMap::new()),
      next_generation: AtomicU64::new(0),
      stats: CacheStats::default(),
    }
  }
}

impl<V> SingleFlightCache<V>
where
  V: Clone + Send + Sync + 'static,
{
  pub fn new() -> Self {
    Self::default()
  }

  pub fn stats(&self) -> CacheStatsSnapshot {
    self.stats.snapshot()
  }

  /// Returns the fresh value for `key`, joins an in-flight computation, or
  /// starts `compute` and stores its success for `ttl`.
  ///
  /// `compute` is invoked while the map is locked and must only build the
  /// future, not do the work.
  pub async fn get_or_compute<F, Fut>(&self, key: &str, ttl: Duration, compute: F) -> CatalogResult<V>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = CatalogResult<V>> + Send + 'static,
  {
    let (generation, computation) = {
      let mut slots = self.slots.lock();
      match slots.get(key) {
        Some(Slot::Ready { value, expires_at }) if *expires_at > Instant::now() => {
          self.stats.hits.fetch_add(1, Ordering::Relaxed);
          trace!(key, "Cache hit.");
          return Ok(value.clone());
        }
        Some(Slot::Pending {
          generation,
          computation,
          ..
        }) => {
          self.stats.joins.fetch_add(1, Ordering::Relaxed);
          trace!(key, generation, "Joining in-flight computation.");
          (*generation, computation.clone())
        }
        _ => {
          let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
          let computation = compute().boxed().shared();
          slots.insert(
            key.to_string(),
            Slot::Pending {
              generation,
              ttl,
              computation: computation.clone(),
            },
          );
          self.stats.computations.fetch_add(1, Ordering::Relaxed);
          debug!(key, generation, "Cache miss, computing.");
          (generation, computation)
        }
      }
    };

    let result = computation.await;
    self.settle(key, generation, &result);
    result
  }

  /// Replaces the pending slot of `generation` with its outcome. Later waiters
  /// of the same generation find it already settled and leave it alone.
  fn settle(&self, key: &str, generation: u64, result: &CatalogResult<V>) {
    let mut slots = self.slots.lock();
    let ttl = match slots.get(key) {
      Some(Slot::Pending {
        generation: pending, ttl, ..
      }) if *pending == generation => *ttl,
      _ => return,
    };

    match result {
      Ok(value) => {
        slots.insert(
          key.to_string(),
          Slot::Ready {
            value: value.clone(),
            expires_at: Instant::now() + ttl,
          },
        );
      }
      Err(e) => {
        debug!(key, error = %e, "Computation failed, nothing cached.");
        slots.remove(key);
      }
    }
  }

  /// Forgets `key`. A computation already in flight still answers the callers
  /// waiting on it, but its result is no longer stored.
  pub fn invalidate(&self, key: &str) -> bool {
    self.slots.lock().remove(key).is_some()
  }

  /// Number of keys holding a ready or pending slot.
  pub fn len(&self) -> usize {
    self.slots.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

/// Cache-aside front: with probability `use_cache_percent` a request goes
/// through the single-flight cache, otherwise it computes directly and
/// stores nothing.
pub struct CacheAside<V> {
  cache: SingleFlightCache<V>,
  rolls: Arc<dyn RollSource>,
  use_cache_percent: u64,
}

impl<V> CacheAside<V>
where
  V: Clone + Send + Sync + 'static,
{
  pub const DEFAULT_USE_CACHE_PERCENT: u64 = 60;

  pub fn new(rolls: Arc<dyn RollSource>, use_cache_percent: u64) -> Self {
    Self {
      cache: SingleFlightCache::new(),
      rolls,
      use_cache_percent,
    }
  }

  pub fn cache(&self) -> &SingleFlightCache<V> {
    &self.cache
  }

  #[instrument(name = "cache_aside::fetch", skip(self, compute))]
  pub async fn fetch<F, Fut>(&self, key: &str, ttl: Duration, compute: F) -> CatalogResult<V>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = CatalogResult<V>> + Send + 'static,
  {
    if self.rolls.roll(1, 100) <= self.use_cache_percent {
      return self.cache.get_or_compute(key, ttl, compute).await;
    }
    self.cache.stats.bypasses.fetch_add(1, Ordering::Relaxed);
    trace!(key, "Bypassing cache.");
    compute().await
  }
}
