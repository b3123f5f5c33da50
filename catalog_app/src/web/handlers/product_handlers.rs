// catalog_app/src/web/handlers/product_handlers.rs

use actix_web::http::header;
use actix_web::{web, HttpResponse};
use catalog_core::ProductDraft;
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::errors::AppError;
use crate::state::AppState;

#[instrument(name = "handler::list_products", skip(app_state))]
pub async fn list_products_handler(app_state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
  let products = app_state.catalog.list_recent_products().await?;
  info!(count = products.len(), "Products listed.");
  Ok(HttpResponse::Ok().json(products))
}

/// Accepts `{"name": string, "price": string | number}`. The body is read raw
/// so that every malformed shape ends in the same 400.
#[instrument(name = "handler::create_product", skip(app_state, body), fields(body_len = body.len()))]
pub async fn create_product_handler(
  app_state: web::Data<AppState>,
  body: web::Bytes,
) -> Result<HttpResponse, AppError> {
  let draft = parse_draft(&body)?;
  let created = app_state.catalog.create_product(draft).await?;

  let mut response = HttpResponse::Created();
  if let Some(warning) = &created.warning {
    warn!(product_id = warning.product_id, "Created product without publishing its event.");
    response.insert_header((header::WARNING, format!("199 catalog \"{}\"", warning)));
  }
  Ok(response.json(created.product))
}

fn parse_draft(body: &[u8]) -> Result<ProductDraft, AppError> {
  let payload: Value =
    serde_json::from_slice(body).map_err(|e| AppError::invalid_payload(format!("malformed JSON: {}", e)))?;
  let fields = payload
    .as_object()
    .ok_or_else(|| AppError::invalid_payload("body must be a JSON object"))?;

  let name = match fields.get("name") {
    Some(Value::String(name)) => name.clone(),
    _ => return Err(AppError::invalid_payload("name must be a string")),
  };
  let price = match fields.get("price") {
    Some(Value::String(price)) => price.clone(),
    Some(Value::Number(price)) => price.to_string(),
    _ => return Err(AppError::invalid_payload("price must be a string or a number")),
  };

  Ok(ProductDraft::new(name, price))
}
