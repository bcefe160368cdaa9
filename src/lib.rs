// src/lib.rs
//! Prometheus exporter for GPFS: runs the filesystem's diagnostic tools under
//! a deadline, parses their output and reports collection health alongside
//! the metrics.

pub mod cache;
pub mod collector;
pub mod config;
pub mod error;
pub mod exposition;
pub mod runner;
