//! # Weka Quota Exporter
//!
//! A Prometheus metrics exporter for Weka directory quotas.
//!
//! ## Overview
//!
//! This crate polls a Weka storage cluster's management API for directory
//! quota information and republishes it on an HTTP endpoint:
//!
//! - Per-directory quota usage, soft/hard limits, and remaining bytes
//! - Gather cost metrics (wall time, API call count)
//! - A `weka_up` gauge reporting whether the last gather succeeded
//!
//! ## Quick Start
//!
//! ```no_run
//! use weka_quota_exporter::{
//!     client::WekaClient, config::RawSettings, metrics::QuotaCollector, server::start_server,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Load and validate configuration
//!     let settings = RawSettings::load("./quota-export.yml")?.validate()?;
//!
//!     // Connect to the cluster
//!     let client = WekaClient::connect(&settings).await?;
//!
//!     // Bind the collector and serve
//!     let collector = QuotaCollector::new(&settings, std::sync::Arc::new(client))?;
//!     start_server(settings.exporter.listen_port, collector).await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! The exporter is configured via a YAML file with `cluster:` and
//! `exporter:` stanzas, overlaid with `QUOTA_EXPORTER_`-prefixed
//! environment variables. See [`config::RawSettings`] for details.
//!
//! ## Modules
//!
//! - [`client`] - Weka management API client
//! - [`config`] - Configuration loading and preflight validation
//! - [`error`] - Error types and handling
//! - [`logging`] - Console and syslog logging setup
//! - [`metrics`] - Prometheus metrics definitions and collection
//! - [`server`] - HTTP server for exposing metrics

pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod server;

pub use error::{Result, WekaError};
