// tests/common/mod.rs
#![allow(dead_code)] // Not every test binary uses every helper.

use async_trait::async_trait;
use catalog_core::{
  CatalogError, CatalogResult, CatalogService, EventChannel, EventHandler, FaultInjector, InMemoryProductStore,
  NewProduct, Product, ProductCreatedEvent, ProductDraft, ProductStore, RollSource,
};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::Level;

// --- Tracing setup, once per test binary ---
static TRACING_INIT: Lazy<()> = Lazy::new(|| {
  tracing_subscriber::fmt()
    .with_max_level(Level::DEBUG)
    .with_test_writer()
    .try_init()
    .ok();
});

pub fn setup_tracing() {
  Lazy::force(&TRACING_INIT);
}

// --- Roll sources ---

/// Always answers the same roll, clamped to the requested range.
pub struct FixedRoll(pub u64);

impl RollSource for FixedRoll {
  fn roll(&self, low: u64, high: u64) -> u64 {
    self.0.clamp(low, high.max(low))
  }
}

/// Roll that sends every list request through the cache.
pub fn always_cache() -> Arc<dyn RollSource> {
  Arc::new(FixedRoll(1))
}

/// Roll that makes every list request bypass the cache.
pub fn never_cache() -> Arc<dyn RollSource> {
  Arc::new(FixedRoll(100))
}

// --- Store wrapper with call counters, an optional query delay and failure switches ---

#[derive(Default)]
pub struct CountingStore {
  pub inner: InMemoryProductStore,
  pub inserts: AtomicUsize,
  pub find_recent_calls: AtomicUsize,
  pub find_delay: Mutex<Option<Duration>>,
  pub fail_inserts: AtomicBool,
  pub fail_queries: AtomicBool,
}

impl CountingStore {
  pub fn new() -> Arc<Self> {
    Arc::new(Self::default())
  }

  pub fn with_find_delay(delay: Duration) -> Arc<Self> {
    let store = Self::default();
    *store.find_delay.lock() = Some(delay);
    Arc::new(store)
  }

  pub fn inserts(&self) -> usize {
    self.inserts.load(Ordering::SeqCst)
  }

  pub fn find_recent_calls(&self) -> usize {
    self.find_recent_calls.load(Ordering::SeqCst)
  }

  pub fn total_calls(&self) -> usize {
    self.inserts() + self.find_recent_calls()
  }
}

#[async_trait]
impl ProductStore for CountingStore {
  async fn insert(&self, new_product: NewProduct) -> CatalogResult<Product> {
    self.inserts.fetch_add(1, Ordering::SeqCst);
    if self.fail_inserts.load(Ordering::SeqCst) {
      return Err(CatalogError::persistence("connection refused"));
    }
    self.inner.insert(new_product).await
  }

  async fn find_recent(&self, limit: usize) -> CatalogResult<Vec<Product>> {
    self.find_recent_calls.fetch_add(1, Ordering::SeqCst);
    let delay = *self.find_delay.lock();
    if let Some(delay) = delay {
      tokio::time::sleep(delay).await;
    }
    if self.fail_queries.load(Ordering::SeqCst) {
      return Err(CatalogError::persistence("query timed out"));
    }
    self.inner.find_recent(limit).await
  }
}

// --- Channel that records what was published ---

/// Records each published event together with how many rows the store held
/// at that moment, so tests can check publish-after-persist ordering.
pub struct RecordingChannel {
  pub store: Option<Arc<CountingStore>>,
  pub published: Mutex<Vec<(ProductCreatedEvent, usize)>>,
  pub fail: AtomicBool,
}

impl RecordingChannel {
  pub fn new() -> Arc<Self> {
    Arc::new(Self {
      store: None,
      published: Mutex::new(Vec::new()),
      fail: AtomicBool::new(false),
    })
  }

  pub fn observing(store: Arc<CountingStore>) -> Arc<Self> {
    Arc::new(Self {
      store: Some(store),
      published: Mutex::new(Vec::new()),
      fail: AtomicBool::new(false),
    })
  }

  pub fn failing() -> Arc<Self> {
    let channel = Self::new();
    channel.fail.store(true, Ordering::SeqCst);
    channel
  }

  pub fn events(&self) -> Vec<ProductCreatedEvent> {
    self.published.lock().iter().map(|(event, _)| event.clone()).collect()
  }
}

#[async_trait]
impl EventChannel for RecordingChannel {
  async fn publish(&self, event: ProductCreatedEvent) -> CatalogResult<()> {
    if self.fail.load(Ordering::SeqCst) {
      return Err(CatalogError::publish("broker unavailable"));
    }
    let stored_rows = self.store.as_ref().map_or(0, |s| s.inner.len());
    self.published.lock().push((event, stored_rows));
    Ok(())
  }
}

// --- Event handlers ---

/// Fails the first `failures` deliveries, then succeeds. Counts every call.
pub struct FlakyHandler {
  pub failures: usize,
  pub calls: AtomicUsize,
  pub seen: Mutex<Vec<(i64, usize)>>,
}

impl FlakyHandler {
  pub fn new(failures: usize) -> Arc<Self> {
    Arc::new(Self {
      failures,
      calls: AtomicUsize::new(0),
      seen: Mutex::new(Vec::new()),
    })
  }

  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl EventHandler for FlakyHandler {
  async fn handle(&self, event: &ProductCreatedEvent) -> CatalogResult<()> {
    let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
    self.seen.lock().push((event.id, call));
    if call <= self.failures {
      return Err(CatalogError::InjectedFailure {
        site: catalog_core::InjectionSite::AsyncHandler,
        reason: format!("flaky failure #{}", call),
      });
    }
    Ok(())
  }
}

// --- Service helpers ---

/// Service with injection disabled and the given cache decision.
pub fn quiet_service(
  store: Arc<CountingStore>,
  channel: Arc<dyn EventChannel>,
  cache_rolls: Arc<dyn RollSource>,
) -> CatalogService {
  CatalogService::builder(store, channel)
    .injector(FaultInjector::disabled())
    .cache_rolls(cache_rolls)
    .build()
}

pub fn draft(name: &str, price: &str) -> ProductDraft {
  ProductDraft::new(name, price)
}

pub fn event(id: i64) -> ProductCreatedEvent {
  ProductCreatedEvent {
    id,
    name: format!("Product {}", id),
    price: "1.00".parse().unwrap(),
  }
}

/// Yields until `done` holds, letting paused tokio time auto-advance.
pub async fn wait_until(mut done: impl FnMut() -> bool) {
  for _ in 0..10_000 {
    if done() {
      return;
    }
    tokio::time::sleep(Duration::from_millis(10)).await;
  }
  panic!("condition not reached in time");
}
