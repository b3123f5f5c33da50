// catalog_core/src/consumer.rs

//! The background side of the write path: handlers invoked once per delivered
//! `ProductCreatedEvent`.

use crate::error::CatalogResult;
use crate::injector::{FaultInjector, InjectionSite};
use crate::model::ProductCreatedEvent;
use async_trait::async_trait;
use tracing::{info, instrument};

/// Processes one delivery. An `Err` marks the delivery as failed so the channel
/// can redeliver it; the same event may therefore arrive more than once and
/// implementations must tolerate that.
#[async_trait]
pub trait EventHandler: Send + Sync {
  async fn handle(&self, event: &ProductCreatedEvent) -> CatalogResult<()>;
}

/// Stand-in for follow-up work such as search indexing. Its only observable
/// behaviour is the async-handler injection policy.
#[derive(Debug, Clone, Default)]
pub struct ProductCreatedHandler {
  injector: FaultInjector,
}

impl ProductCreatedHandler {
  pub fn new(injector: FaultInjector) -> Self {
    Self { injector }
  }
}

#[async_trait]
impl EventHandler for ProductCreatedHandler {
  #[instrument(name = "consumer::product_created", skip(self, event), fields(product_id = event.id), err(Display))]
  async fn handle(&self, event: &ProductCreatedEvent) -> CatalogResult<()> {
    self.injector.apply(InjectionSite::AsyncHandler).await?;
    info!(name = %event.name, price = %event.price, "Product created event processed.");
    Ok(())
  }
}
