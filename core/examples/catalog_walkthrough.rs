// catalog_core/examples/catalog_walkthrough.rs

use catalog_core::{
  CatalogError, CatalogService, EventWorker, FaultInjector, InMemoryEventChannel, InMemoryProductStore,
  ProductCreatedHandler, ProductDraft, RetryPolicy,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), CatalogError> {
  tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();

  info!("--- Catalog Walkthrough ---");

  // The background handler keeps the default injection policy, so some
  // deliveries fail and get redelivered.
  let (channel, queue) = InMemoryEventChannel::bounded(InMemoryEventChannel::DEFAULT_CAPACITY);
  let worker = EventWorker::new(
    queue,
    Arc::new(ProductCreatedHandler::default()),
    RetryPolicy::default(),
  )
  .spawn();
  let stats = worker.stats();

  // Request-path injection is off so every call below succeeds.
  let catalog = CatalogService::builder(Arc::new(InMemoryProductStore::new()), Arc::new(channel))
    .injector(FaultInjector::disabled())
    .build();

  for (name, price) in [("Desk lamp", "24.5"), ("Notebook", "3"), ("Fountain pen", "1.2e2")] {
    let created = catalog.create_product(ProductDraft::new(name, price)).await?;
    info!(id = created.product.id, price = %created.product.price, "Created {}", created.product.name);
  }

  match catalog.create_product(ProductDraft::new("", "9.99")).await {
    Err(CatalogError::Validation(reason)) => warn!(%reason, "Rejected as expected"),
    other => warn!(?other, "Unexpected outcome for an empty name"),
  }

  for product in catalog.list_recent_products().await? {
    info!(id = product.id, name = %product.name, price = %product.price, created_at = %product.created_at);
  }

  // Retries back off for up to seven seconds in total.
  while stats.delivered() + stats.dead_lettered() < 3 {
    tokio::time::sleep(Duration::from_millis(100)).await;
  }

  // Dropping the service closes the channel; the worker drains and stops.
  drop(catalog);
  worker.join().await?;
  info!(
    delivered = stats.delivered(),
    failed_attempts = stats.failed_attempts(),
    dead_lettered = stats.dead_lettered(),
    "Event worker finished."
  );
  Ok(())
}
