// catalog_app/src/errors.rs

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use catalog_core::CatalogError;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
  #[error("Catalog Error: {0}")]
  Catalog(#[from] CatalogError),

  #[error("Configuration Error: {0}")]
  Config(String),

  #[error("Database Error: {0}")]
  Sqlx(#[from] sqlx::Error),

  #[error("Migration Error: {0}")]
  Migrate(#[from] sqlx::migrate::MigrateError),

  #[error("Internal Server Error: {0}")]
  Internal(String),
}

impl AppError {
  /// Rejected request body. Reported to the client only as "Invalid payload".
  pub fn invalid_payload(detail: impl Into<String>) -> Self {
    AppError::Catalog(CatalogError::validation(detail))
  }
}

impl From<anyhow::Error> for AppError {
  fn from(err: anyhow::Error) -> Self {
    let err = match err.downcast::<AppError>() {
      Ok(app_err) => return app_err,
      Err(err) => err,
    };
    let err = match err.downcast::<sqlx::Error>() {
      Ok(sqlx_err) => return AppError::Sqlx(sqlx_err),
      Err(err) => err,
    };
    let err = match err.downcast::<sqlx::migrate::MigrateError>() {
      Ok(migrate_err) => return AppError::Migrate(migrate_err),
      Err(err) => err,
    };
    match err.downcast::<CatalogError>() {
      Ok(catalog_err) => AppError::Catalog(catalog_err),
      Err(err) => AppError::Internal(format!("{:#}", err)),
    }
  }
}

impl ResponseError for AppError {
  fn status_code(&self) -> StatusCode {
    match self {
      AppError::Catalog(CatalogError::Validation(_)) => StatusCode::BAD_REQUEST,
      _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }

  fn error_response(&self) -> HttpResponse {
    match self {
      AppError::Catalog(CatalogError::Validation(detail)) => {
        tracing::warn!(%detail, "Responding with invalid payload");
        HttpResponse::BadRequest().json(json!({"error": "Invalid payload"}))
      }
      AppError::Catalog(catalog_err) => {
        tracing::error!(application_error = %self, retryable = catalog_err.is_retryable(), "Responding with error");
        HttpResponse::InternalServerError().json(json!({"error": catalog_err.to_string()}))
      }
      AppError::Sqlx(_) | AppError::Migrate(_) => {
        tracing::error!(application_error = %self, "Responding with error");
        HttpResponse::InternalServerError().json(json!({"error": "Database operation failed"}))
      }
      AppError::Config(_) | AppError::Internal(_) => {
        // The message stays in the log; clients only get the generic body.
        tracing::error!(application_error = %self, "Responding with error");
        HttpResponse::InternalServerError().json(json!({"error": "An internal error occurred"}))
      }
    }
  }
}

pub type Result<T, E = AppError> = std::result::Result<T, E>;
