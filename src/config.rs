// src/config.rs
//! Command-line and environment configuration.

use clap::{Parser, ValueEnum};
use std::time::Duration;

/// Diagnostic sources the exporter knows how to collect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum CollectorKind {
    Mmpmon,
    Verbs,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "gpfs_exporter", about = "Prometheus exporter for GPFS", version)]
pub struct ExporterConfig {
    /// Address to serve metrics on.
    #[arg(long, default_value = "0.0.0.0:9303", env = "GPFS_EXPORTER_LISTEN")]
    pub listen: String,

    /// Collectors to enable.
    #[arg(
        long,
        value_enum,
        value_delimiter = ',',
        default_value = "mmpmon",
        env = "GPFS_EXPORTER_COLLECTORS"
    )]
    pub collectors: Vec<CollectorKind>,

    /// Serve the last successful result when a collection fails.
    #[arg(long, env = "GPFS_EXPORTER_USE_CACHE")]
    pub use_cache: bool,

    /// Command prefixed to every GPFS tool invocation. Empty disables it.
    #[arg(long, default_value = "sudo", env = "GPFS_EXPORTER_SUDO_COMMAND")]
    pub sudo_command: String,

    /// Timeout for mmpmon in seconds.
    #[arg(long, default_value_t = 5, value_parser = clap::value_parser!(u64).range(1..))]
    pub mmpmon_timeout: u64,

    /// Timeout for verbs in seconds.
    #[arg(long, default_value_t = 5, value_parser = clap::value_parser!(u64).range(1..))]
    pub verbs_timeout: u64,

    /// Log filter directive, e.g. `info` or `gpfs_exporter=debug`.
    #[arg(long, default_value = "info", env = "GPFS_EXPORTER_LOG")]
    pub log_level: String,
}

impl ExporterConfig {
    pub fn sudo(&self) -> Option<String> {
        let sudo = self.sudo_command.trim();
        (!sudo.is_empty()).then(|| sudo.to_string())
    }

    pub fn timeout_for(&self, kind: CollectorKind) -> Duration {
        Duration::from_secs(match kind {
            CollectorKind::Mmpmon => self.mmpmon_timeout,
            CollectorKind::Verbs => self.verbs_timeout,
        })
    }

    /// Enabled collectors, first occurrence wins.
    pub fn enabled_collectors(&self) -> Vec<CollectorKind> {
        let mut kinds = Vec::new();
        for kind in &self.collectors {
            if !kinds.contains(kind) {
                kinds.push(*kind);
            }
        }
        kinds
    }
}
