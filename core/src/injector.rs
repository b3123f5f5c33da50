// catalog_core/src/injector.rs

//! Synthetic latency and failure injection shared by the read path, the write
//! path and the asynchronous event handler.
//!
//! A [`FaultInjector`] is a plain policy object: a per-site probability table
//! ([`FaultPolicy`]), a random source ([`RollSource`]) and a test-mode probe.
//! [`FaultInjector::decide`] is pure apart from drawing rolls, so it is safe
//! to call concurrently; [`FaultInjector::apply`] additionally waits out the
//! chosen delay and turns a `Fail` outcome into [`CatalogError::InjectedFailure`].

use crate::error::{CatalogError, CatalogResult};
use parking_lot::Mutex;
use rand::Rng;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// The calling site an injection decision is made for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InjectionSite {
  Read,
  Write,
  AsyncHandler,
}

impl InjectionSite {
  /// Request-path sites are switched off while the test-mode probe says so.
  /// The asynchronous handler keeps its policy regardless.
  pub fn gated_by_test_mode(self) -> bool {
    matches!(self, InjectionSite::Read | InjectionSite::Write)
  }
}

impl fmt::Display for InjectionSite {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      InjectionSite::Read => f.write_str("read"),
      InjectionSite::Write => f.write_str("write"),
      InjectionSite::AsyncHandler => f.write_str("async-handler"),
    }
  }
}

/// One row of the probability table. Rolls are drawn uniformly from [1, 100].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaultProfile {
  /// `roll <= fail_threshold` delays by `fail_delay_ms`, then fails.
  pub fail_threshold: u64,
  pub fail_delay_ms: (u64, u64),
  /// `fail_threshold < roll <= slow_threshold` delays by `slow_delay_ms`, then proceeds.
  pub slow_threshold: u64,
  pub slow_delay_ms: (u64, u64),
  pub failure_reason: String,
}

impl FaultProfile {
  pub fn request_path() -> Self {
    Self {
      fail_threshold: 5,
      fail_delay_ms: (400, 1200),
      slow_threshold: 35,
      slow_delay_ms: (50, 400),
      failure_reason: "Random failure for observability demo".to_string(),
    }
  }

  pub fn async_handler() -> Self {
    Self {
      fail_threshold: 10,
      fail_delay_ms: (300, 1000),
      slow_threshold: 40,
      slow_delay_ms: (50, 300),
      failure_reason: "Random failure in product created handler".to_string(),
    }
  }

  /// A profile that always proceeds immediately.
  pub fn quiet() -> Self {
    Self {
      fail_threshold: 0,
      fail_delay_ms: (0, 0),
      slow_threshold: 0,
      slow_delay_ms: (0, 0),
      failure_reason: String::new(),
    }
  }
}

/// The per-site probability table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaultPolicy {
  pub read: FaultProfile,
  pub write: FaultProfile,
  pub async_handler: FaultProfile,
}

impl FaultPolicy {
  pub fn profile(&self, site: InjectionSite) -> &FaultProfile {
    match site {
      InjectionSite::Read => &self.read,
      InjectionSite::Write => &self.write,
      InjectionSite::AsyncHandler => &self.async_handler,
    }
  }
}

impl Default for FaultPolicy {
  fn default() -> Self {
    Self {
      read: FaultProfile::request_path(),
      write: FaultProfile::request_path(),
      async_handler: FaultProfile::async_handler(),
    }
  }
}

/// What the caller should do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
  Proceed,
  ProceedAfterDelay(Duration),
  /// Wait `after`, then fail with `reason`.
  Fail { after: Duration, reason: String },
}

/// Source of independent uniform rolls. Must be usable from many tasks at once.
pub trait RollSource: Send + Sync {
  /// A value in `[low, high]`, both inclusive.
  fn roll(&self, low: u64, high: u64) -> u64;
}

/// Draws from the thread-local RNG; no state is shared between callers.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRngRolls;

impl RollSource for ThreadRngRolls {
  fn roll(&self, low: u64, high: u64) -> u64 {
    if low >= high {
      return low;
    }
    rand::rng().random_range(low..=high)
  }
}

/// Replays a fixed script of rolls, clamped to the requested range.
/// An exhausted script answers with the upper bound, which for a percentage
/// roll means "proceed".
#[derive(Debug, Default)]
pub struct ScriptedRolls {
  script: Mutex<VecDeque<u64>>,
}

impl ScriptedRolls {
  pub fn new(rolls: impl IntoIterator<Item = u64>) -> Self {
    Self {
      script: Mutex::new(rolls.into_iter().collect()),
    }
  }

  pub fn push(&self, roll: u64) {
    self.script.lock().push_back(roll);
  }

  pub fn remaining(&self) -> usize {
    self.script.lock().len()
  }
}

impl RollSource for ScriptedRolls {
  fn roll(&self, low: u64, high: u64) -> u64 {
    match self.script.lock().pop_front() {
      Some(next) => next.clamp(low, high.max(low)),
      None => high.max(low),
    }
  }
}

/// Probe answering "are we in test mode right now?". Evaluated on every
/// request-path decision, never cached.
pub type TestModeProbe = Arc<dyn Fn() -> bool + Send + Sync>;

#[derive(Clone)]
pub struct FaultInjector {
  policy: Arc<FaultPolicy>,
  rolls: Arc<dyn RollSource>,
  test_mode: TestModeProbe,
  enabled: bool,
}

impl fmt::Debug for FaultInjector {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("FaultInjector")
      .field("policy", &self.policy)
      .field("enabled", &self.enabled)
      .finish_non_exhaustive()
  }
}

impl Default for FaultInjector {
  fn default() -> Self {
    Self::new(FaultPolicy::default(), Arc::new(ThreadRngRolls))
  }
}

impl FaultInjector {
  pub fn new(policy: FaultPolicy, rolls: Arc<dyn RollSource>) -> Self {
    Self {
      policy: Arc::new(policy),
      rolls,
      test_mode: Arc::new(|| false),
      enabled: true,
    }
  }

  /// An injector that always proceeds, whatever the site.
  pub fn disabled() -> Self {
    Self {
      enabled: false,
      ..Self::default()
    }
  }

  pub fn with_test_mode_probe(mut self, probe: TestModeProbe) -> Self {
    self.test_mode = probe;
    self
  }

  pub fn policy(&self) -> &FaultPolicy {
    &self.policy
  }

  pub fn decide(&self, site: InjectionSite) -> Outcome {
    if !self.enabled {
      return Outcome::Proceed;
    }
    if site.gated_by_test_mode() && (self.test_mode)() {
      return Outcome::Proceed;
    }

    let profile = self.policy.profile(site);
    let roll = self.rolls.roll(1, 100);

    if roll <= profile.fail_threshold {
      let (low, high) = profile.fail_delay_ms;
      return Outcome::Fail {
        after: Duration::from_millis(self.rolls.roll(low, high)),
        reason: profile.failure_reason.clone(),
      };
    }

    if roll <= profile.slow_threshold {
      let (low, high) = profile.slow_delay_ms;
      return Outcome::ProceedAfterDelay(Duration::from_millis(self.rolls.roll(low, high)));
    }

    Outcome::Proceed
  }

  /// Decides, waits out any delay, and fails if the outcome says so.
  /// Returns the delay that was waited. Nothing is held across the wait, so a
  /// caller dropped mid-delay leaves no trace.
  #[instrument(name = "injector::apply", skip(self))]
  pub async fn apply(&self, site: InjectionSite) -> CatalogResult<Duration> {
    match self.decide(site) {
      Outcome::Proceed => Ok(Duration::ZERO),
      Outcome::ProceedAfterDelay(delay) => {
        debug!(delay_ms = delay.as_millis() as u64, "Injecting latency.");
        tokio::time::sleep(delay).await;
        Ok(delay)
      }
      Outcome::Fail { after, reason } => {
        tokio::time::sleep(after).await;
        warn!(delay_ms = after.as_millis() as u64, %reason, "Injecting failure.");
        Err(CatalogError::InjectedFailure { site, reason })
      }
    }
  }
}
