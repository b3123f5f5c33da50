// catalog_app/src/main.rs

mod config;
mod db;
mod errors;
mod state;
mod web;

use crate::config::{AppConfig, LogFormat};
use crate::errors::AppError;
use crate::state::AppState;

use actix_web::{web as actix_data, App, HttpServer};
use catalog_core::{
  CatalogService, EventWorker, FaultInjector, InMemoryEventChannel, InMemoryProductStore, ProductCreatedHandler,
  ProductStore,
};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

/// How long to wait for queued events to drain after the server stops.
const WORKER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

fn init_tracing(format: LogFormat) {
  let subscriber = tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_span_events(FmtSpan::CLOSE);

  match format {
    LogFormat::Json => subscriber.json().init(),
    LogFormat::Text => subscriber.init(),
  }
}

fn startup_error(err: AppError) -> io::Error {
  tracing::error!(error = %err, "Startup failed.");
  io::Error::other(err.to_string())
}

async fn build_store(app_config: &AppConfig) -> Result<Arc<dyn ProductStore>, AppError> {
  match &app_config.database_url {
    Some(url) => {
      let pool = db::connect(url, app_config.run_migrations).await?;
      Ok(Arc::new(db::PgProductStore::new(pool)))
    }
    None => {
      tracing::warn!("DATABASE_URL is not set; products are kept in memory.");
      Ok(Arc::new(InMemoryProductStore::new()))
    }
  }
}

#[actix_web::main]
async fn main() -> io::Result<()> {
  let app_config = match AppConfig::from_env() {
    Ok(cfg) => Arc::new(cfg),
    Err(e) => {
      eprintln!("Failed to load application configuration: {}", e);
      return Err(io::Error::other(e.to_string()));
    }
  };
  init_tracing(app_config.log_format);
  tracing::info!(
    address = %app_config.server_address(),
    persistent = app_config.database_url.is_some(),
    "Starting catalog server..."
  );

  let store = build_store(&app_config).await.map_err(startup_error)?;

  // One policy for the request path and the background handler; APP_ENV=test
  // only switches off the former.
  let injector = FaultInjector::default().with_test_mode_probe(config::app_env_test_probe());

  let (channel, queue) = InMemoryEventChannel::bounded(app_config.event_queue_capacity);
  let worker = EventWorker::new(
    queue,
    Arc::new(ProductCreatedHandler::new(injector.clone())),
    app_config.retry_policy(),
  )
  .spawn();
  let worker_stats = worker.stats();

  let catalog = CatalogService::builder(store, Arc::new(channel))
    .injector(injector)
    .build();
  let app_state = AppState {
    catalog: Arc::new(catalog),
  };

  let server_address = app_config.server_address();
  tracing::info!("Attempting to bind server to {}...", server_address);

  HttpServer::new(move || {
    App::new()
      .app_data(actix_data::Data::new(app_state.clone()))
      .wrap(tracing_actix_web::TracingLogger::default())
      .configure(web::configure_app_routes)
  })
  .bind(&server_address)?
  .run()
  .await?;

  // The server owned the last producer handles; the worker drains the queue and
  // dead-letters retries that are still waiting.
  match tokio::time::timeout(WORKER_DRAIN_TIMEOUT, worker.join()).await {
    Ok(Ok(dead_letters)) => {
      for letter in &dead_letters {
        tracing::warn!(
          product_id = letter.envelope.event.id,
          attempt = letter.envelope.attempt,
          error = %letter.error,
          "ProductCreatedEvent was not handled."
        );
      }
    }
    Ok(Err(e)) => tracing::error!(error = %e, "Event worker ended abnormally."),
    Err(_) => tracing::warn!("Event worker did not drain in time."),
  }
  tracing::info!(
    delivered = worker_stats.delivered(),
    dead_lettered = worker_stats.dead_lettered(),
    "Catalog server stopped."
  );
  Ok(())
}
