// catalog_core/src/error.rs
use crate::injector::InjectionSite;
use anyhow::Error as AnyhowError;
use thiserror::Error;

/// Every failure the catalog core can surface.
///
/// `Clone` so that one failed single-flight computation can be handed to every
/// caller waiting on it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CatalogError {
  /// Bad client input. Never retryable; raised before any side effect.
  #[error("Validation error: {0}")]
  Validation(String),

  /// Synthetic transient failure from the fault/latency injector.
  #[error("Injected failure at {site} site: {reason}")]
  InjectedFailure { site: InjectionSite, reason: String },

  /// The product store could not complete an insert or a query.
  #[error("Persistence error: {message}")]
  Persistence { message: String },

  /// The event channel refused an enqueue.
  #[error("Publish error: {message}")]
  Publish { message: String },

  #[error("Handler missing for non-optional step: {step_name}")]
  HandlerMissing { step_name: String },

  #[error("Internal catalog error: {0}")]
  Internal(String),
}

impl CatalogError {
  pub fn validation(msg: impl Into<String>) -> Self {
    Self::Validation(msg.into())
  }

  pub fn persistence(msg: impl Into<String>) -> Self {
    Self::Persistence { message: msg.into() }
  }

  pub fn publish(msg: impl Into<String>) -> Self {
    Self::Publish { message: msg.into() }
  }

  /// Whether a caller (or the event channel) may reasonably try again.
  pub fn is_retryable(&self) -> bool {
    matches!(
      self,
      CatalogError::InjectedFailure { .. } | CatalogError::Persistence { .. } | CatalogError::Publish { .. }
    )
  }
}

// Store and transport implementers mostly work with anyhow internally.
impl From<AnyhowError> for CatalogError {
  fn from(err: AnyhowError) -> Self {
    if let Some(catalog_err) = err.downcast_ref::<CatalogError>() {
      return catalog_err.clone();
    }
    CatalogError::Internal(format!("{:#}", err))
  }
}

pub type CatalogResult<T, E = CatalogError> = std::result::Result<T, E>;
