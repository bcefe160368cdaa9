// src/exposition.rs
//! Aggregates collectors into one Prometheus text response and serves it.

use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use prometheus::proto::MetricFamily;
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use serde_json::{Value, json};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, error};

use crate::collector::Scrape;
use crate::error::ExporterError;

const META_PREFIX: &str = "gpfs_exporter_";

const LANDING_PAGE: &str = r#"<html>
<head><title>GPFS Exporter</title></head>
<body>
<h1>GPFS Exporter</h1>
<p><a href="/metrics">Metrics</a></p>
</body>
</html>
"#;

/// Set of collectors queried together on every scrape.
#[derive(Default)]
pub struct Gatherer {
    collectors: Vec<Arc<dyn Scrape>>,
    families: HashSet<String>,
}

impl Gatherer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a collector. Names must be unique and so must domain
    /// families; the shared `gpfs_exporter_*` meta families are exempt.
    pub fn register(&mut self, collector: Arc<dyn Scrape>) -> Result<(), ExporterError> {
        let name = collector.name();
        if self.collectors.iter().any(|c| c.name() == name) {
            return Err(ExporterError::DuplicateCollector(name.to_string()));
        }

        let domain: Vec<String> = collector
            .describe()?
            .into_iter()
            .map(|desc| desc.fq_name)
            .filter(|family| !family.starts_with(META_PREFIX))
            .collect();
        if let Some(family) = domain.iter().find(|f| self.families.contains(*f)) {
            return Err(ExporterError::DuplicateFamily {
                family: family.clone(),
                collector: name.to_string(),
            });
        }

        debug!(collector = name, families = ?domain, "registered collector");
        self.families.extend(domain);
        self.collectors.push(collector);
        Ok(())
    }

    pub fn collectors(&self) -> &[Arc<dyn Scrape>] {
        &self.collectors
    }

    /// Run every collector concurrently and merge the results: families
    /// sharing a name are joined, families sorted by name, samples by label
    /// values, empty families dropped.
    pub async fn gather(&self) -> Vec<MetricFamily> {
        let mut tasks = JoinSet::new();
        for collector in &self.collectors {
            let collector = Arc::clone(collector);
            tasks.spawn(async move { collector.collect().await });
        }

        let mut merged: BTreeMap<String, MetricFamily> = BTreeMap::new();
        while let Some(joined) = tasks.join_next().await {
            let families = match joined {
                Ok(families) => families,
                Err(e) => {
                    error!(error = %e, "collector task failed");
                    continue;
                }
            };
            for mut family in families {
                match merged.get_mut(family.get_name()) {
                    Some(existing) => {
                        for metric in family.take_metric().into_iter() {
                            existing.mut_metric().push(metric);
                        }
                    }
                    None => {
                        merged.insert(family.get_name().to_string(), family);
                    }
                }
            }
        }

        merged
            .into_values()
            .filter(|family| !family.get_metric().is_empty())
            .map(|mut family| {
                family.mut_metric().sort_by(|a, b| {
                    let left = a.get_label().iter().map(|l| l.get_value());
                    let right = b.get_label().iter().map(|l| l.get_value());
                    left.cmp(right)
                });
                family
            })
            .collect()
    }

    /// Gather and encode in the Prometheus text format.
    pub async fn render(&self) -> Result<String, ExporterError> {
        let families = self.gather().await;
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    /// Clear every collector's fallback cache, returning the names cleared.
    pub fn clear_caches(&self) -> Vec<&'static str> {
        self.collectors
            .iter()
            .filter(|c| c.cache_state().enabled)
            .map(|c| {
                c.clear_cache();
                c.name()
            })
            .collect()
    }
}

/// HTTP routes: `/`, `/metrics` and the cache admin endpoints.
pub fn router(gatherer: Arc<Gatherer>) -> Router {
    Router::new()
        .route("/", get(landing))
        .route("/metrics", get(metrics))
        .route("/-/cache", get(cache_state))
        .route("/-/cache/clear", post(clear_cache))
        .with_state(gatherer)
}

async fn landing() -> Html<&'static str> {
    Html(LANDING_PAGE)
}

async fn metrics(State(gatherer): State<Arc<Gatherer>>) -> Response {
    match gatherer.render().await {
        Ok(body) => ([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body).into_response(),
        Err(e) => {
            error!(error = %e, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

#[derive(Debug, Serialize)]
struct CacheReport {
    collector: &'static str,
    enabled: bool,
    populated: bool,
}

async fn cache_state(State(gatherer): State<Arc<Gatherer>>) -> Json<Vec<CacheReport>> {
    let reports = gatherer
        .collectors()
        .iter()
        .map(|c| {
            let state = c.cache_state();
            CacheReport {
                collector: c.name(),
                enabled: state.enabled,
                populated: state.populated,
            }
        })
        .collect();
    Json(reports)
}

async fn clear_cache(State(gatherer): State<Arc<Gatherer>>) -> Json<Value> {
    let cleared = gatherer.clear_caches();
    debug!(collectors = ?cleared, "cleared caches");
    Json(json!({ "cleared": cleared }))
}
