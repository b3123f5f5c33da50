// catalog_core/src/catalog/mod.rs

//! The catalog service: `list_recent_products` (cache-aside over the store)
//! and `create_product` (persist, then publish). Each operation is a pipeline
//! built once and run per request.

pub mod contexts;
pub mod create_pipeline;
pub mod list_pipeline;

use crate::cache::{CacheAside, CacheStatsSnapshot};
use crate::channel::EventChannel;
use crate::error::{CatalogError, CatalogResult};
use crate::injector::{FaultInjector, RollSource, ThreadRngRolls};
use crate::model::{ProductDraft, ProductView};
use crate::pipeline::{ContextData, Pipeline, PipelineResult};
use crate::store::ProductStore;
use std::sync::Arc;
use tracing::{info, instrument, warn};

pub use contexts::{CatalogDeps, CatalogSettings, CreateProductCtxData, CreatedProduct, ListProductsCtxData, PublishWarning};

pub struct CatalogService {
  deps: CatalogDeps,
  list_pipeline: Pipeline<ListProductsCtxData, CatalogError>,
  create_pipeline: Pipeline<CreateProductCtxData, CatalogError>,
}

pub struct CatalogServiceBuilder {
  store: Arc<dyn ProductStore>,
  channel: Arc<dyn EventChannel>,
  injector: FaultInjector,
  cache_rolls: Arc<dyn RollSource>,
  settings: CatalogSettings,
}

impl CatalogServiceBuilder {
  pub fn injector(mut self, injector: FaultInjector) -> Self {
    self.injector = injector;
    self
  }

  /// Random source for the consult-the-cache decision.
  pub fn cache_rolls(mut self, rolls: Arc<dyn RollSource>) -> Self {
    self.cache_rolls = rolls;
    self
  }

  pub fn settings(mut self, settings: CatalogSettings) -> Self {
    self.settings = settings;
    self
  }

  pub fn build(self) -> CatalogService {
    let cache = Arc::new(CacheAside::new(self.cache_rolls, self.settings.use_cache_percent));
    let deps = CatalogDeps {
      store: self.store,
      channel: self.channel,
      injector: self.injector,
      cache,
      settings: Arc::new(self.settings),
    };

    CatalogService {
      deps,
      list_pipeline: list_pipeline::build_list_products_pipeline(),
      create_pipeline: create_pipeline::build_create_product_pipeline(),
    }
  }
}

impl CatalogService {
  pub fn builder(store: Arc<dyn ProductStore>, channel: Arc<dyn EventChannel>) -> CatalogServiceBuilder {
    CatalogServiceBuilder {
      store,
      channel,
      injector: FaultInjector::default(),
      cache_rolls: Arc::new(ThreadRngRolls),
      settings: CatalogSettings::default(),
    }
  }

  pub fn settings(&self) -> &CatalogSettings {
    &self.deps.settings
  }

  pub fn cache_stats(&self) -> CacheStatsSnapshot {
    self.deps.cache.cache().stats()
  }

  /// Newest products first, at most `page_size` of them.
  #[instrument(name = "catalog::list_recent_products", skip(self), err(Display))]
  pub async fn list_recent_products(&self) -> CatalogResult<Vec<ProductView>> {
    let ctx_data = ContextData::new(ListProductsCtxData::new(self.deps.clone()));

    match self.list_pipeline.run(ctx_data.clone()).await? {
      PipelineResult::Completed => {
        let products = ctx_data.write().products.take();
        products.ok_or_else(|| CatalogError::Internal("list pipeline completed without products".to_string()))
      }
      PipelineResult::Stopped => {
        warn!("List pipeline was stopped by a handler.");
        Err(CatalogError::Internal("list pipeline was halted".to_string()))
      }
    }
  }

  /// Validates, persists and publishes. A publish failure does not fail the
  /// call; it comes back as `CreatedProduct::warning`.
  #[instrument(name = "catalog::create_product", skip(self, draft), fields(name = %draft.name), err(Display))]
  pub async fn create_product(&self, draft: ProductDraft) -> CatalogResult<CreatedProduct> {
    let ctx_data = ContextData::new(CreateProductCtxData::new(self.deps.clone(), draft));

    match self.create_pipeline.run(ctx_data.clone()).await? {
      PipelineResult::Completed => {
        let (product, warning) = {
          let mut guard = ctx_data.write();
          (guard.product.take(), guard.publish_warning.take())
        };
        let product =
          product.ok_or_else(|| CatalogError::Internal("create pipeline completed without a product".to_string()))?;
        info!(product_id = product.id, published = warning.is_none(), "Product created.");
        Ok(CreatedProduct {
          product: product.view(),
          warning,
        })
      }
      PipelineResult::Stopped => {
        warn!("Create pipeline was stopped by a handler.");
        Err(CatalogError::Internal("create pipeline was halted".to_string()))
      }
    }
  }
}
