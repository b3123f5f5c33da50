// catalog_core/src/catalog/create_pipeline.rs

use crate::catalog::contexts::{CreateProductCtxData, PublishWarning};
use crate::error::CatalogError;
use crate::injector::InjectionSite;
use crate::model::ProductCreatedEvent;
use crate::pipeline::{ContextData, Pipeline, PipelineControl};
use tracing::{info, warn};

pub const VALIDATE_PAYLOAD: &str = "validate_payload";
pub const INJECT_WRITE_FAULTS: &str = "inject_write_faults";
pub const PERSIST_PRODUCT: &str = "persist_product";
pub const PUBLISH_CREATED_EVENT: &str = "publish_created_event";

pub fn build_create_product_pipeline() -> Pipeline<CreateProductCtxData, CatalogError> {
  let mut p = Pipeline::<CreateProductCtxData, CatalogError>::new(
    "create_product",
    &[
      (VALIDATE_PAYLOAD, false),
      (INJECT_WRITE_FAULTS, false),
      (PERSIST_PRODUCT, false),
      (PUBLISH_CREATED_EVENT, false),
    ],
  );

  // Step 1: unconditional input check, before any injector or store interaction.
  p.on_root(VALIDATE_PAYLOAD, |ctx_data: ContextData<CreateProductCtxData>| {
    Box::pin(async move {
      let validated = {
        let guard = ctx_data.read();
        guard.draft.validate()
      };
      match validated {
        Ok(new_product) => {
          ctx_data.write().validated = Some(new_product);
          Ok(PipelineControl::Continue)
        }
        Err(e) => {
          warn!(error = %e, "Create product payload rejected.");
          Err(e)
        }
      }
    })
  });

  // Step 2: synthetic latency/failure. A failure aborts with nothing persisted.
  p.on_root(INJECT_WRITE_FAULTS, |ctx_data: ContextData<CreateProductCtxData>| {
    Box::pin(async move {
      let injector = { ctx_data.read().deps.injector.clone() };
      let delay = injector.apply(InjectionSite::Write).await?;
      ctx_data.write().injected_delay = delay;
      Ok::<_, CatalogError>(PipelineControl::Continue)
    })
  });

  // Step 3: the single insert is the durability boundary.
  p.on_root(PERSIST_PRODUCT, |ctx_data: ContextData<CreateProductCtxData>| {
    Box::pin(async move {
      let (new_product, deps) = {
        let guard = ctx_data.read();
        (guard.validated.clone(), guard.deps.clone())
      };
      let new_product =
        new_product.ok_or_else(|| CatalogError::Internal("persist step ran without a validated payload".to_string()))?;

      let product = deps.store.insert(new_product).await?;
      info!(product_id = product.id, "Product persisted.");

      // Lists after this point must see the new product.
      deps.cache.cache().invalidate(&deps.settings.cache_key);
      ctx_data.write().product = Some(product);
      Ok::<_, CatalogError>(PipelineControl::Continue)
    })
  });

  // Step 4: enqueue only; an enqueue failure downgrades to a warning because
  // the product is already committed.
  p.on_root(PUBLISH_CREATED_EVENT, |ctx_data: ContextData<CreateProductCtxData>| {
    Box::pin(async move {
      let (event, channel) = {
        let guard = ctx_data.read();
        (guard.product.as_ref().map(ProductCreatedEvent::from), guard.deps.channel.clone())
      };
      let event =
        event.ok_or_else(|| CatalogError::Internal("publish step ran without a persisted product".to_string()))?;
      let product_id = event.id;

      if let Err(e) = channel.publish(event).await {
        let warning = PublishWarning {
          product_id,
          message: e.to_string(),
        };
        warn!(product_id, error = %e, "ProductCreatedEvent was not published.");
        ctx_data.write().publish_warning = Some(warning);
      }
      Ok::<_, CatalogError>(PipelineControl::Continue)
    })
  });

  p
}
