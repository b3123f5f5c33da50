// catalog_core/src/store.rs

//! The `ProductStore` repository interface and an in-memory implementation.

use crate::error::CatalogResult;
use crate::model::{NewProduct, Product};
use async_trait::async_trait;
use chrono::{DurationRound, TimeDelta, Utc};
use parking_lot::Mutex;
use tracing::{instrument, trace};

/// Durable product persistence.
///
/// - `insert` assigns the id and `created_at` and returns the stored entity.
///   One insert is one transaction; failures surface as `CatalogError::Persistence`.
/// - `find_recent` returns at most `limit` products, highest id first.
///
/// Implementations must accept concurrent inserts without losing any or
/// handing out the same id twice.
#[async_trait]
pub trait ProductStore: Send + Sync {
  async fn insert(&self, new_product: NewProduct) -> CatalogResult<Product>;

  async fn find_recent(&self, limit: usize) -> CatalogResult<Vec<Product>>;
}

#[derive(Debug, Default)]
struct InMemoryRows {
  last_id: i64,
  rows: Vec<Product>,
}

/// Keeps products in insertion order behind a single mutex. Ids start at 1 and
/// increase by one per insert.
#[derive(Debug, Default)]
pub struct InMemoryProductStore {
  inner: Mutex<InMemoryRows>,
}

impl InMemoryProductStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn len(&self) -> usize {
    self.inner.lock().rows.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

#[async_trait]
impl ProductStore for InMemoryProductStore {
  #[instrument(name = "store::memory::insert", skip(self, new_product), fields(name = %new_product.name))]
  async fn insert(&self, new_product: NewProduct) -> CatalogResult<Product> {
    // TIMESTAMP(0) columns keep whole seconds only.
    let now = Utc::now();
    let created_at = now.duration_trunc(TimeDelta::seconds(1)).unwrap_or(now);

    let mut guard = self.inner.lock();
    guard.last_id += 1;
    let product = Product {
      id: guard.last_id,
      name: new_product.name,
      price: new_product.price,
      created_at,
      updated_at: None,
    };
    guard.rows.push(product.clone());
    trace!(id = product.id, "Product inserted.");
    Ok(product)
  }

  #[instrument(name = "store::memory::find_recent", skip(self))]
  async fn find_recent(&self, limit: usize) -> CatalogResult<Vec<Product>> {
    let guard = self.inner.lock();
    Ok(guard.rows.iter().rev().take(limit).cloned().collect())
  }
}
