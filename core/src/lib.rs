// catalog_core/src/lib.rs

//! Catalog core: a small product catalog with two operations.
//!
//!  - `list_recent_products`: cache-aside read over the product store, with a
//!    randomized cache bypass, a short TTL and single-flight computation.
//!  - `create_product`: validate, persist, then publish a
//!    `ProductCreatedEvent` for asynchronous follow-up.
//!
//! Both operations and the background event handler share one
//! fault/latency injection policy. Operations are expressed as step pipelines
//! over a shared `ContextData`.

pub mod cache;
pub mod catalog;
pub mod channel;
pub mod consumer;
pub mod error;
pub mod injector;
pub mod model;
pub mod pipeline;
pub mod store;

// --- Re-exports for the Public API ---

pub use crate::cache::{CacheAside, CacheStatsSnapshot, SingleFlightCache};
pub use crate::catalog::{CatalogService, CatalogServiceBuilder, CatalogSettings, CreatedProduct, PublishWarning};
pub use crate::channel::{
  DeadLetter, Envelope, EventChannel, EventQueue, EventWorker, InMemoryEventChannel, RetryPolicy, WorkerHandle,
  WorkerStats,
};
pub use crate::consumer::{EventHandler, ProductCreatedHandler};
pub use crate::error::{CatalogError, CatalogResult};
pub use crate::injector::{
  FaultInjector, FaultPolicy, FaultProfile, InjectionSite, Outcome, RollSource, ScriptedRolls, TestModeProbe,
  ThreadRngRolls,
};
pub use crate::model::{NewProduct, Price, Product, ProductCreatedEvent, ProductDraft, ProductView};
pub use crate::pipeline::{ContextData, Handler, Pipeline, PipelineControl, PipelineResult};
pub use crate::store::{InMemoryProductStore, ProductStore};
