// catalog_app/src/web/routes.rs

use actix_web::{web, HttpResponse};
use serde::Serialize;

use crate::web::handlers::product_handlers;

#[derive(Serialize)]
struct HealthStatus {
  status: &'static str,
}

async fn health_check_handler() -> HttpResponse {
  HttpResponse::Ok().json(HealthStatus { status: "ok" })
}

pub fn configure_app_routes(cfg: &mut web::ServiceConfig) {
  cfg.route("/health", web::get().to(health_check_handler)).service(
    web::scope("/products")
      .route("", web::get().to(product_handlers::list_products_handler))
      .route("", web::post().to(product_handlers::create_product_handler)),
  );
}
