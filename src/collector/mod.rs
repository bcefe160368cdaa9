// src/collector/mod.rs
//! Collector lifecycle shared by every GPFS diagnostic source: run the tool,
//! parse its output, fall back to the cache on failure, and report collection
//! health through the meta gauges.

pub mod mmpmon;
pub mod verbs;

use async_trait::async_trait;
use prometheus::core::{Collector as _, Desc};
use prometheus::proto::MetricFamily;
use prometheus::{GaugeVec, IntGaugeVec, Opts};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

use crate::cache::ResultCache;
use crate::config::{CollectorKind, ExporterConfig};
use crate::error::{ParseError, RunnerError};
use crate::runner::{CommandRunner, Invocation};

pub use mmpmon::{MmpmonSource, Operation, PerformanceRecord, parse_mmpmon};
pub use verbs::{LinkStatus, VerbsSource, parse_verbs};

pub const COLLECT_ERROR: &str = "gpfs_exporter_collect_error";
pub const COLLECT_TIMEOUT: &str = "gpfs_exporter_collect_timeout";
pub const COLLECT_DURATION: &str = "gpfs_exporter_collector_duration_seconds";

/// What one diagnostic tool contributes to a collector: how to invoke it,
/// how to read its output, and which metric families the result becomes.
pub trait Source: Send + Sync + 'static {
    type Payload: Clone + Send + Sync + 'static;

    /// Collector identity, used as the `collector` label.
    fn name(&self) -> &'static str;

    fn invocation(&self) -> Invocation;

    fn parse(&self, output: &str) -> Result<Self::Payload, ParseError>;

    /// Domain metric descriptors, without samples.
    fn describe(&self) -> prometheus::Result<Vec<Desc>>;

    fn families(&self, payload: &Self::Payload) -> prometheus::Result<Vec<MetricFamily>>;
}

/// Result of a single collection cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionOutcome<T> {
    Success(T),
    ExecutionError(String),
    Timeout,
}

/// Cache state reported by the admin endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheState {
    pub enabled: bool,
    pub populated: bool,
}

/// Describe/collect contract consumed by the exposition layer.
#[async_trait]
pub trait Scrape: Send + Sync {
    fn name(&self) -> &'static str;

    fn describe(&self) -> prometheus::Result<Vec<Desc>>;

    async fn collect(&self) -> Vec<MetricFamily>;

    fn clear_cache(&self);

    fn cache_state(&self) -> CacheState;
}

/// Generic collector binding a source to a runner, a deadline and a cache.
pub struct Collector<S: Source> {
    source: S,
    runner: Arc<dyn CommandRunner>,
    timeout: Duration,
    cache: ResultCache<S::Payload>,
}

impl<S: Source> Collector<S> {
    pub fn new(
        source: S,
        runner: Arc<dyn CommandRunner>,
        timeout: Duration,
        use_cache: bool,
    ) -> Self {
        Self {
            source,
            runner,
            timeout,
            cache: ResultCache::new(use_cache),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn cache(&self) -> &ResultCache<S::Payload> {
        &self.cache
    }

    /// Run the tool and parse its output. Parse failures are collection
    /// failures and come back as `ExecutionError`.
    pub async fn observe(&self) -> CollectionOutcome<S::Payload> {
        let invocation = self.source.invocation();
        match self.runner.run(&invocation, self.timeout).await {
            Ok(output) => match self.source.parse(&output) {
                Ok(payload) => CollectionOutcome::Success(payload),
                Err(e) => CollectionOutcome::ExecutionError(format!("parse: {}", e)),
            },
            Err(RunnerError::Timeout(_)) => CollectionOutcome::Timeout,
            Err(RunnerError::Execution(message)) => CollectionOutcome::ExecutionError(message),
        }
    }

    fn domain_families(&self, payload: &S::Payload) -> Vec<MetricFamily> {
        match self.source.families(payload) {
            Ok(mut families) => {
                families.retain(|mf| !mf.get_metric().is_empty());
                families
            }
            Err(e) => {
                error!(collector = self.source.name(), error = %e, "failed to build metrics");
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl<S: Source> Scrape for Collector<S> {
    fn name(&self) -> &'static str {
        self.source.name()
    }

    fn describe(&self) -> prometheus::Result<Vec<Desc>> {
        let mut descs = self.source.describe()?;
        descs.extend(MetaMetrics::new()?.descs());
        Ok(descs)
    }

    async fn collect(&self) -> Vec<MetricFamily> {
        let name = self.source.name();
        debug!(collector = name, "collecting metrics");
        let started = Instant::now();

        let (payload, failed, timed_out) = match self.observe().await {
            CollectionOutcome::Success(payload) => {
                self.cache.set(payload.clone());
                (Some(payload), false, false)
            }
            CollectionOutcome::ExecutionError(message) => {
                error!(collector = name, error = %message, "collection failed");
                (self.cache.get(), true, false)
            }
            CollectionOutcome::Timeout => {
                warn!(collector = name, timeout = ?self.timeout, "collection timed out");
                (self.cache.get(), false, true)
            }
        };

        if (failed || timed_out) && payload.is_some() {
            debug!(collector = name, "serving cached metrics");
        }

        let mut families = payload
            .map(|p| self.domain_families(&p))
            .unwrap_or_default();

        match MetaMetrics::new().map(|m| m.record(name, failed, timed_out, started.elapsed())) {
            Ok(meta) => families.extend(meta),
            Err(e) => error!(collector = name, error = %e, "failed to build meta metrics"),
        }
        families
    }

    fn clear_cache(&self) {
        self.cache.clear();
    }

    fn cache_state(&self) -> CacheState {
        CacheState {
            enabled: self.cache.is_enabled(),
            populated: self.cache.is_populated(),
        }
    }
}

/// Per-cycle collection health gauges.
struct MetaMetrics {
    error: IntGaugeVec,
    timeout: IntGaugeVec,
    duration: GaugeVec,
}

impl MetaMetrics {
    fn new() -> prometheus::Result<Self> {
        Ok(Self {
            error: IntGaugeVec::new(
                Opts::new(COLLECT_ERROR, "Indicates if error has occurred during collection"),
                &["collector"],
            )?,
            timeout: IntGaugeVec::new(
                Opts::new(COLLECT_TIMEOUT, "Indicates the collector timed out"),
                &["collector"],
            )?,
            duration: GaugeVec::new(
                Opts::new(COLLECT_DURATION, "Collector time duration."),
                &["collector"],
            )?,
        })
    }

    fn descs(&self) -> Vec<Desc> {
        self.error
            .desc()
            .into_iter()
            .chain(self.timeout.desc())
            .chain(self.duration.desc())
            .cloned()
            .collect()
    }

    fn record(
        self,
        collector: &str,
        failed: bool,
        timed_out: bool,
        elapsed: Duration,
    ) -> Vec<MetricFamily> {
        self.error.with_label_values(&[collector]).set(i64::from(failed));
        self.timeout.with_label_values(&[collector]).set(i64::from(timed_out));
        self.duration
            .with_label_values(&[collector])
            .set(elapsed.as_secs_f64());

        let mut families = self.error.collect();
        families.extend(self.timeout.collect());
        families.extend(self.duration.collect());
        families
    }
}

/// Function to build the collectors enabled in the configuration.
pub fn build_collectors(
    config: &ExporterConfig,
    runner: Arc<dyn CommandRunner>,
) -> Vec<Arc<dyn Scrape>> {
    let mut collectors: Vec<Arc<dyn Scrape>> = Vec::new();

    for kind in config.enabled_collectors() {
        let timeout = config.timeout_for(kind);
        let collector: Arc<dyn Scrape> = match kind {
            CollectorKind::Mmpmon => Arc::new(Collector::new(
                MmpmonSource,
                Arc::clone(&runner),
                timeout,
                config.use_cache,
            )),
            CollectorKind::Verbs => Arc::new(Collector::new(
                VerbsSource,
                Arc::clone(&runner),
                timeout,
                config.use_cache,
            )),
        };
        collectors.push(collector);
    }

    collectors
}
