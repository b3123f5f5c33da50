// catalog_app/src/db/mod.rs

pub mod product_store;

pub use product_store::PgProductStore;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

/// Opens the pool and, when asked, applies the embedded migrations.
pub async fn connect(database_url: &str, run_migrations: bool) -> anyhow::Result<PgPool> {
  let pool = PgPoolOptions::new()
    .max_connections(10)
    .connect(database_url)
    .await
    .context("connecting to the database")?;
  info!("Successfully connected to the database.");

  if run_migrations {
    sqlx::migrate!("./migrations")
      .run(&pool)
      .await
      .context("running database migrations")?;
    info!("Database migrations applied.");
  }
  Ok(pool)
}
