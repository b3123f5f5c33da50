// catalog_core/src/catalog/list_pipeline.rs

use crate::catalog::contexts::ListProductsCtxData;
use crate::error::CatalogError;
use crate::injector::InjectionSite;
use crate::model::Product;
use crate::pipeline::{ContextData, Pipeline, PipelineControl};
use tracing::{debug, info};

pub const INJECT_READ_FAULTS: &str = "inject_read_faults";
pub const LOAD_RECENT_PRODUCTS: &str = "load_recent_products";

pub fn build_list_products_pipeline() -> Pipeline<ListProductsCtxData, CatalogError> {
  let mut p = Pipeline::<ListProductsCtxData, CatalogError>::new(
    "list_recent_products",
    &[(INJECT_READ_FAULTS, false), (LOAD_RECENT_PRODUCTS, false)],
  );

  // A failure here returns before the cache or the store is touched.
  p.on_root(INJECT_READ_FAULTS, |ctx_data: ContextData<ListProductsCtxData>| {
    Box::pin(async move {
      let injector = { ctx_data.read().deps.injector.clone() };
      let delay = injector.apply(InjectionSite::Read).await?;
      ctx_data.write().injected_delay = delay;
      Ok::<_, CatalogError>(PipelineControl::Continue)
    })
  });

  p.on_root(LOAD_RECENT_PRODUCTS, |ctx_data: ContextData<ListProductsCtxData>| {
    Box::pin(async move {
      let deps = { ctx_data.read().deps.clone() };
      let store = deps.store.clone();
      let limit = deps.settings.page_size;

      let products = deps
        .cache
        .fetch(&deps.settings.cache_key, deps.settings.cache_ttl, move || async move {
          let rows = store.find_recent(limit).await?;
          debug!(count = rows.len(), "Loaded recent products from store.");
          Ok::<_, CatalogError>(rows.iter().map(Product::view).collect::<Vec<_>>())
        })
        .await?;

      info!(count = products.len(), "Recent products listed.");
      ctx_data.write().products = Some(products);
      Ok::<_, CatalogError>(PipelineControl::Continue)
    })
  });

  p
}
