// catalog_core/src/catalog/contexts.rs

//! Data structs the catalog pipelines run over. Handlers receive them wrapped
//! in `ContextData`.

use crate::cache::CacheAside;
use crate::channel::EventChannel;
use crate::injector::FaultInjector;
use crate::model::{NewProduct, Product, ProductDraft, ProductView};
use crate::store::ProductStore;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Tunables of the catalog operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogSettings {
  pub cache_key: String,
  pub cache_ttl: Duration,
  /// Maximum number of products a list returns.
  pub page_size: usize,
  /// Share of list requests (in percent) that go through the cache.
  pub use_cache_percent: u64,
}

impl Default for CatalogSettings {
  fn default() -> Self {
    Self {
      cache_key: "products_latest_50".to_string(),
      cache_ttl: Duration::from_secs(5),
      page_size: 50,
      use_cache_percent: 60,
    }
  }
}

/// Collaborators shared by every pipeline run.
#[derive(Clone)]
pub struct CatalogDeps {
  pub store: Arc<dyn ProductStore>,
  pub channel: Arc<dyn EventChannel>,
  pub injector: FaultInjector,
  pub cache: Arc<CacheAside<Vec<ProductView>>>,
  pub settings: Arc<CatalogSettings>,
}

#[derive(Clone)]
pub struct ListProductsCtxData {
  pub deps: CatalogDeps,
  pub injected_delay: Duration,
  pub products: Option<Vec<ProductView>>,
}

impl ListProductsCtxData {
  pub fn new(deps: CatalogDeps) -> Self {
    Self {
      deps,
      injected_delay: Duration::ZERO,
      products: None,
    }
  }
}

#[derive(Clone)]
pub struct CreateProductCtxData {
  pub deps: CatalogDeps,
  pub draft: ProductDraft,
  pub validated: Option<NewProduct>,
  pub injected_delay: Duration,
  pub product: Option<Product>,
  pub publish_warning: Option<PublishWarning>,
}

impl CreateProductCtxData {
  pub fn new(deps: CatalogDeps, draft: ProductDraft) -> Self {
    Self {
      deps,
      draft,
      validated: None,
      injected_delay: Duration::ZERO,
      product: None,
      publish_warning: None,
    }
  }
}

/// The product was committed but its `ProductCreatedEvent` could not be
/// enqueued, so its asynchronous follow-up will not happen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishWarning {
  pub product_id: i64,
  pub message: String,
}

impl fmt::Display for PublishWarning {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "product {} was created but its event was not published: {}",
      self.product_id, self.message
    )
  }
}

/// Result of a successful create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedProduct {
  pub product: ProductView,
  pub warning: Option<PublishWarning>,
}
