// tests/catalog_service_tests.rs
mod common;

use catalog_core::{
  CatalogError, CatalogService, CatalogSettings, EventWorker, FaultInjector, FaultPolicy, InMemoryEventChannel,
  InMemoryProductStore, InjectionSite, ProductCreatedHandler, RetryPolicy, ScriptedRolls,
};
use common::*;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_create_then_list_shows_the_new_product() {
  setup_tracing();
  let store = CountingStore::new();
  let channel = RecordingChannel::new();
  let service = quiet_service(store.clone(), channel.clone(), always_cache());

  // Warm the cache with an empty list first.
  assert!(service.list_recent_products().await.unwrap().is_empty());

  let created = service.create_product(draft("Test product", "9.99")).await.unwrap();
  assert_eq!(created.product.id, 1);
  assert_eq!(created.product.name, "Test product");
  assert_eq!(created.product.price, "9.99");
  assert_eq!(created.product.updated_at, None);
  assert!(created.warning.is_none());

  let listed = service.list_recent_products().await.unwrap();
  assert_eq!(listed, vec![created.product.clone()]);
}

#[tokio::test]
async fn test_list_returns_at_most_page_size_newest_first() {
  setup_tracing();
  let store = CountingStore::new();
  let service = quiet_service(store.clone(), RecordingChannel::new(), never_cache());

  for i in 1..=60 {
    service.create_product(draft(&format!("Product {}", i), "1")).await.unwrap();
  }

  let listed = service.list_recent_products().await.unwrap();
  assert_eq!(listed.len(), 50);
  assert_eq!(listed[0].id, 60);
  assert_eq!(listed[49].id, 11);
  assert!(listed.windows(2).all(|pair| pair[0].id > pair[1].id));
}

#[tokio::test]
async fn test_page_size_follows_settings() {
  setup_tracing();
  let store = CountingStore::new();
  let service = CatalogService::builder(store.clone(), RecordingChannel::new())
    .injector(FaultInjector::disabled())
    .cache_rolls(never_cache())
    .settings(CatalogSettings {
      page_size: 3,
      ..CatalogSettings::default()
    })
    .build();

  for i in 1..=5 {
    service.create_product(draft(&format!("Product {}", i), "2.5")).await.unwrap();
  }

  let ids: Vec<i64> = service.list_recent_products().await.unwrap().iter().map(|p| p.id).collect();
  assert_eq!(ids, vec![5, 4, 3]);
  assert_eq!(service.settings().page_size, 3);
}

#[tokio::test]
async fn test_concurrent_creates_get_distinct_ids() {
  setup_tracing();
  let store = CountingStore::new();
  let service = Arc::new(quiet_service(store.clone(), RecordingChannel::new(), never_cache()));

  let mut tasks = Vec::new();
  for i in 0..20 {
    let service = Arc::clone(&service);
    tasks.push(tokio::spawn(async move {
      service.create_product(draft(&format!("Item {}", i), "3.10")).await
    }));
  }

  let mut ids = Vec::new();
  for task in tasks {
    let created = task.await.unwrap().unwrap();
    assert_eq!(created.product.price, "3.10");
    ids.push(created.product.id);
  }
  ids.sort_unstable();
  ids.dedup();
  assert_eq!(ids.len(), 20);
  assert_eq!(store.inner.len(), 20);
}

#[tokio::test]
async fn test_invalid_payloads_touch_nothing() {
  setup_tracing();
  let store = CountingStore::new();
  let channel = RecordingChannel::new();
  // An injector that would fail every write, to prove validation runs first.
  let injector = FaultInjector::new(FaultPolicy::default(), Arc::new(FixedRoll(1)));
  let service = CatalogService::builder(store.clone(), channel.clone())
    .injector(injector)
    .cache_rolls(never_cache())
    .build();

  for (name, price) in [("", "9.99"), ("Widget", "abc"), ("Widget", "")] {
    let err = service.create_product(draft(name, price)).await.unwrap_err();
    assert!(matches!(err, CatalogError::Validation(_)), "{:?}", err);
    assert!(!err.is_retryable());
  }

  assert_eq!(store.total_calls(), 0);
  assert!(channel.events().is_empty());
}

#[tokio::test]
async fn test_whitespace_only_name_is_stored_as_given() {
  setup_tracing();
  let store = CountingStore::new();
  let channel = RecordingChannel::new();
  let service = quiet_service(store.clone(), channel.clone(), never_cache());

  let created = service.create_product(draft("   ", "9.99")).await.unwrap();
  assert_eq!(created.product.name, "   ");
  assert_eq!(store.inserts(), 1);
  assert_eq!(channel.events().len(), 1);

  let listed = service.list_recent_products().await.unwrap();
  assert_eq!(listed[0].name, "   ");
}

#[tokio::test(start_paused = true)]
async fn test_injected_write_failure_persists_and_publishes_nothing() {
  setup_tracing();
  let store = CountingStore::new();
  let channel = RecordingChannel::new();
  let injector = FaultInjector::new(FaultPolicy::default(), Arc::new(ScriptedRolls::new([1, 400])));
  let service = CatalogService::builder(store.clone(), channel.clone())
    .injector(injector)
    .cache_rolls(never_cache())
    .build();

  let err = service.create_product(draft("Widget", "9.99")).await.unwrap_err();
  assert!(matches!(
    err,
    CatalogError::InjectedFailure {
      site: InjectionSite::Write,
      ..
    }
  ));
  assert_eq!(store.inserts(), 0);
  assert!(store.inner.is_empty());
  assert!(channel.events().is_empty());

  // The script is exhausted, so the next attempt proceeds.
  let created = service.create_product(draft("Widget", "9.99")).await.unwrap();
  assert_eq!(created.product.id, 1);
}

#[tokio::test(start_paused = true)]
async fn test_injected_read_failure_never_reaches_the_store() {
  setup_tracing();
  let store = CountingStore::new();
  let injector = FaultInjector::new(FaultPolicy::default(), Arc::new(ScriptedRolls::new([2, 500])));
  let service = CatalogService::builder(store.clone(), RecordingChannel::new())
    .injector(injector)
    .cache_rolls(always_cache())
    .build();

  let err = service.list_recent_products().await.unwrap_err();
  assert!(matches!(
    err,
    CatalogError::InjectedFailure {
      site: InjectionSite::Read,
      ..
    }
  ));
  assert_eq!(store.total_calls(), 0);
  assert_eq!(service.cache_stats().computations, 0);
}

#[tokio::test(start_paused = true)]
async fn test_test_mode_turns_off_request_path_injection() {
  setup_tracing();
  let store = CountingStore::new();
  let injector =
    FaultInjector::new(FaultPolicy::default(), Arc::new(FixedRoll(1))).with_test_mode_probe(Arc::new(|| true));
  let service = CatalogService::builder(store.clone(), RecordingChannel::new())
    .injector(injector)
    .cache_rolls(never_cache())
    .build();

  service.create_product(draft("Widget", "1")).await.unwrap();
  assert_eq!(service.list_recent_products().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_persistence_failure_is_not_published() {
  setup_tracing();
  let store = CountingStore::new();
  store.fail_inserts.store(true, std::sync::atomic::Ordering::SeqCst);
  let channel = RecordingChannel::new();
  let service = quiet_service(store.clone(), channel.clone(), never_cache());

  let err = service.create_product(draft("Widget", "9.99")).await.unwrap_err();
  assert_eq!(err, CatalogError::persistence("connection refused"));
  assert_eq!(store.inserts(), 1);
  assert!(channel.events().is_empty());
}

#[tokio::test]
async fn test_publish_failure_keeps_the_product_and_warns() {
  setup_tracing();
  let store = CountingStore::new();
  let service = quiet_service(store.clone(), RecordingChannel::failing(), never_cache());

  let created = service.create_product(draft("Widget", "9.99")).await.unwrap();
  let warning = created.warning.expect("publish failure should produce a warning");
  assert_eq!(warning.product_id, created.product.id);
  assert!(warning.message.contains("broker unavailable"));
  assert_eq!(store.inner.len(), 1);

  let listed = service.list_recent_products().await.unwrap();
  assert_eq!(listed[0].id, created.product.id);
}

#[tokio::test]
async fn test_event_is_published_after_the_row_is_stored() {
  setup_tracing();
  let store = CountingStore::new();
  let channel = RecordingChannel::observing(store.clone());
  let service = quiet_service(store.clone(), channel.clone(), never_cache());

  service.create_product(draft("First", "1.5")).await.unwrap();
  service.create_product(draft("Second", "2")).await.unwrap();

  let published = channel.published.lock().clone();
  assert_eq!(published.len(), 2);
  for (event, stored_rows) in &published {
    assert!(*stored_rows as i64 >= event.id);
  }
  assert_eq!(published[0].0.name, "First");
  assert_eq!(published[0].0.price.to_string(), "1.50");
  assert_eq!(published[1].0.id, 2);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_cached_lists_query_the_store_once() {
  setup_tracing();
  let store = CountingStore::with_find_delay(Duration::from_millis(300));
  let service = Arc::new(quiet_service(store.clone(), RecordingChannel::new(), always_cache()));

  let mut tasks = Vec::new();
  for _ in 0..10 {
    let service = Arc::clone(&service);
    tasks.push(tokio::spawn(async move { service.list_recent_products().await }));
  }
  for task in tasks {
    assert!(task.await.unwrap().unwrap().is_empty());
  }

  assert_eq!(store.find_recent_calls(), 1);
  assert_eq!(service.cache_stats().computations, 1);
}

#[tokio::test(start_paused = true)]
async fn test_cached_list_expires_after_ttl() {
  setup_tracing();
  let store = CountingStore::new();
  let service = quiet_service(store.clone(), RecordingChannel::new(), always_cache());

  service.list_recent_products().await.unwrap();
  tokio::time::advance(Duration::from_secs(4)).await;
  service.list_recent_products().await.unwrap();
  assert_eq!(store.find_recent_calls(), 1);

  tokio::time::advance(Duration::from_secs(2)).await;
  service.list_recent_products().await.unwrap();
  assert_eq!(store.find_recent_calls(), 2);
}

#[tokio::test]
async fn test_failed_query_is_not_cached() {
  setup_tracing();
  let store = CountingStore::new();
  store.fail_queries.store(true, std::sync::atomic::Ordering::SeqCst);
  let service = quiet_service(store.clone(), RecordingChannel::new(), always_cache());

  let err = service.list_recent_products().await.unwrap_err();
  assert!(matches!(err, CatalogError::Persistence { .. }));

  store.fail_queries.store(false, std::sync::atomic::Ordering::SeqCst);
  assert!(service.list_recent_products().await.unwrap().is_empty());
  assert_eq!(store.find_recent_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_created_events_reach_the_background_handler() {
  setup_tracing();
  let store = Arc::new(InMemoryProductStore::new());
  let (channel, queue) = InMemoryEventChannel::bounded(InMemoryEventChannel::DEFAULT_CAPACITY);
  let worker = EventWorker::new(
    queue,
    Arc::new(ProductCreatedHandler::new(FaultInjector::disabled())),
    RetryPolicy::default(),
  )
  .spawn();
  let stats = worker.stats();

  let service = CatalogService::builder(store, Arc::new(channel))
    .injector(FaultInjector::disabled())
    .build();

  for i in 1..=3 {
    service.create_product(draft(&format!("Product {}", i), "4.20")).await.unwrap();
  }
  wait_until(|| stats.delivered() == 3).await;

  // Dropping the service drops the last producer, which stops the worker.
  drop(service);
  worker.join().await.unwrap();
  assert_eq!(stats.dead_lettered(), 0);
}
