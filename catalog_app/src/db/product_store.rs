// catalog_app/src/db/product_store.rs

use async_trait::async_trait;
use catalog_core::{CatalogError, CatalogResult, NewProduct, Price, Product, ProductStore};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};
use tracing::{error, instrument};

#[derive(Debug, FromRow)]
struct ProductRow {
  id: i64,
  name: String,
  price: Decimal,
  created_at: DateTime<Utc>,
  updated_at: Option<DateTime<Utc>>,
}

impl TryFrom<ProductRow> for Product {
  type Error = CatalogError;

  fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
    let price = Price::from_decimal(row.price)
      .map_err(|e| CatalogError::persistence(format!("product {} has an unreadable price: {}", row.id, e)))?;
    Ok(Product {
      id: row.id,
      name: row.name,
      price,
      created_at: row.created_at,
      updated_at: row.updated_at,
    })
  }
}

fn persistence_error(context: &str, err: sqlx::Error) -> CatalogError {
  error!(error = %err, "{}", context);
  CatalogError::persistence(format!("{}: {}", context, err))
}

/// `ProductStore` over the `product` table. Ids come from the BIGSERIAL
/// sequence, so concurrent inserts never share one.
#[derive(Debug, Clone)]
pub struct PgProductStore {
  pool: PgPool,
}

impl PgProductStore {
  pub fn new(pool: PgPool) -> Self {
    Self { pool }
  }
}

#[async_trait]
impl ProductStore for PgProductStore {
  #[instrument(name = "store::pg::insert", skip(self, new_product), fields(name = %new_product.name))]
  async fn insert(&self, new_product: NewProduct) -> CatalogResult<Product> {
    let row: ProductRow = sqlx::query_as(
      "INSERT INTO product (name, price, created_at) VALUES ($1, $2, date_trunc('second', now())) \
       RETURNING id, name, price, created_at, updated_at",
    )
    .bind(&new_product.name)
    .bind(new_product.price.as_decimal())
    .fetch_one(&self.pool)
    .await
    .map_err(|e| persistence_error("Failed to insert product", e))?;

    Product::try_from(row)
  }

  #[instrument(name = "store::pg::find_recent", skip(self))]
  async fn find_recent(&self, limit: usize) -> CatalogResult<Vec<Product>> {
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    let rows: Vec<ProductRow> = sqlx::query_as(
      "SELECT id, name, price, created_at, updated_at FROM product ORDER BY id DESC LIMIT $1",
    )
    .bind(limit)
    .fetch_all(&self.pool)
    .await
    .map_err(|e| persistence_error("Failed to fetch recent products", e))?;

    rows.into_iter().map(Product::try_from).collect()
  }
}
