//! Prometheus metrics definitions and collection logic.
//!
//! This module defines the quota metrics exposed by the exporter and the
//! gather path that fills them from the cluster's management API.

use crate::client::{DirectoryQuota, WekaClient};
use crate::config::Settings;
use crate::error::{Result, WekaError};
use prometheus::{Encoder, Gauge, GaugeVec, IntGauge, Opts, Registry, TextEncoder};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

const QUOTA_LABELS: &[&str] = &["cluster", "filesystem", "directory", "owner"];

/// Prometheus scrapes the endpoint twice per cycle; a gather that finished
/// less than this long ago is served from the registry as-is.
const GATHER_REUSE_SECS: u64 = 5;

/// Metrics collector for directory quotas.
///
/// Owns the registry; every metric is registered at construction, so binding
/// the collector to a server is all that remains. The gather path is
/// serialized behind a mutex and safe to invoke from concurrent scrapes.
pub struct QuotaCollector {
    client: Arc<WekaClient>,
    registry: Registry,
    filesystems: Option<Vec<String>>,
    exceeded_only: bool,

    quota: GaugeVec,
    soft: GaugeVec,
    hard: GaugeVec,
    used: GaugeVec,
    remaining: GaugeVec,

    up: Gauge,
    collect_seconds: Gauge,
    collect_apicalls: IntGauge,

    gather_state: tokio::sync::Mutex<GatherState>,
}

#[derive(Default)]
struct GatherState {
    last_gather: Option<Instant>,
}

impl QuotaCollector {
    /// Create a collector bound to one configuration and one cluster client.
    pub fn new(settings: &Settings, client: Arc<WekaClient>) -> Result<Self> {
        let registry = Registry::new();

        let quota = GaugeVec::new(
            Opts::new("weka_quota", "Weka Directory Quota Summary"),
            &[
                "cluster",
                "filesystem",
                "directory",
                "owner",
                "soft_quotaGB",
                "hard_quotaGB",
            ],
        )
        .map_err(|e| WekaError::Metrics(e.to_string()))?;
        registry
            .register(Box::new(quota.clone()))
            .map_err(|e| WekaError::Metrics(e.to_string()))?;

        let soft = GaugeVec::new(
            Opts::new("weka_quota_soft", "Weka Directory Soft Quota"),
            QUOTA_LABELS,
        )
        .map_err(|e| WekaError::Metrics(e.to_string()))?;
        registry
            .register(Box::new(soft.clone()))
            .map_err(|e| WekaError::Metrics(e.to_string()))?;

        let hard = GaugeVec::new(
            Opts::new("weka_quota_hard", "Weka Directory Hard Quota"),
            QUOTA_LABELS,
        )
        .map_err(|e| WekaError::Metrics(e.to_string()))?;
        registry
            .register(Box::new(hard.clone()))
            .map_err(|e| WekaError::Metrics(e.to_string()))?;

        let used = GaugeVec::new(
            Opts::new("weka_quota_used", "Weka Directory Quota Used Bytes"),
            QUOTA_LABELS,
        )
        .map_err(|e| WekaError::Metrics(e.to_string()))?;
        registry
            .register(Box::new(used.clone()))
            .map_err(|e| WekaError::Metrics(e.to_string()))?;

        let remaining = GaugeVec::new(
            Opts::new(
                "weka_quota_remaining",
                "Weka Directory Quota Remaining Bytes (hard quota)",
            ),
            QUOTA_LABELS,
        )
        .map_err(|e| WekaError::Metrics(e.to_string()))?;
        registry
            .register(Box::new(remaining.clone()))
            .map_err(|e| WekaError::Metrics(e.to_string()))?;

        let up = Gauge::with_opts(Opts::new(
            "weka_up",
            "Whether the last quota gather from the cluster succeeded (1 = success, 0 = failure)",
        ))
        .map_err(|e| WekaError::Metrics(e.to_string()))?;
        registry
            .register(Box::new(up.clone()))
            .map_err(|e| WekaError::Metrics(e.to_string()))?;

        let collect_seconds = Gauge::with_opts(Opts::new(
            "weka_collect_seconds",
            "Total Time spent in Prometheus collect",
        ))
        .map_err(|e| WekaError::Metrics(e.to_string()))?;
        registry
            .register(Box::new(collect_seconds.clone()))
            .map_err(|e| WekaError::Metrics(e.to_string()))?;

        let collect_apicalls = IntGauge::with_opts(Opts::new(
            "weka_collect_apicalls",
            "Total number of api calls",
        ))
        .map_err(|e| WekaError::Metrics(e.to_string()))?;
        registry
            .register(Box::new(collect_apicalls.clone()))
            .map_err(|e| WekaError::Metrics(e.to_string()))?;

        Ok(Self {
            client,
            registry,
            filesystems: settings.cluster.filesystems.clone(),
            exceeded_only: settings.exporter.exceeded_only,
            quota,
            soft,
            hard,
            used,
            remaining,
            up,
            collect_seconds,
            collect_apicalls,
            gather_state: tokio::sync::Mutex::new(GatherState::default()),
        })
    }

    /// Gather quotas from the cluster, unless a gather finished recently.
    pub async fn collect(&self) -> Result<()> {
        let mut state = self.gather_state.lock().await;

        if let Some(last) = state.last_gather {
            if last.elapsed() < Duration::from_secs(GATHER_REUSE_SECS) {
                debug!("serving cached metrics, last gather {:.1}s ago", last.elapsed().as_secs_f64());
                return Ok(());
            }
        }

        info!("gathering");
        let calls_before = self.client.api_calls();
        let start = Instant::now();

        let outcome = self.gather().await;
        let elapsed = start.elapsed().as_secs_f64();

        match outcome {
            Ok(exported) => {
                // only a successful gather arms the reuse window
                state.last_gather = Some(Instant::now());
                self.up.set(1.0);
                self.collect_seconds.set(elapsed);
                self.collect_apicalls
                    .set((self.client.api_calls() - calls_before) as i64);
                info!(
                    "stats returned. total time = {:.2}s, {} api calls made, {} quotas exported",
                    elapsed,
                    self.client.api_calls() - calls_before,
                    exported
                );
                Ok(())
            }
            Err(e) => {
                error!("Error gathering data: {e}");
                self.up.set(0.0);
                Err(e)
            }
        }
    }

    async fn gather(&self) -> Result<usize> {
        self.client.refresh().await?;

        // rebuild from scratch so vanished quotas don't linger as stale series
        self.quota.reset();
        self.soft.reset();
        self.hard.reset();
        self.used.reset();
        self.remaining.reset();

        let filesystems = match &self.filesystems {
            Some(names) => names.clone(),
            None => {
                let capacities = self.client.filesystem_capacities().await?;
                let mut names: Vec<String> =
                    capacities.into_values().map(|fs| fs.name).collect();
                names.sort();
                names
            }
        };

        let cluster = self.client.cluster_name().to_string();
        let mut exported = 0;

        for fs_name in &filesystems {
            let quotas = self.fetch_quotas(fs_name).await?;
            debug!("filesystem '{}': {} quotas", fs_name, quotas.len());

            for quota in quotas.values() {
                if self.exceeded_only && !exceeds_limits(quota) {
                    continue;
                }

                let directory = match self
                    .client
                    .resolve_inode(quota.inode_id, quota.snap_view_id)
                    .await
                {
                    Ok(resolved) => resolved.path,
                    Err(e) => {
                        error!("Error resolving directory name: {e}");
                        String::new()
                    }
                };

                self.export_quota(&cluster, fs_name, &directory, quota);
                exported += 1;
            }
        }

        Ok(exported)
    }

    /// Page through `directory_quota_list` until an empty page comes back.
    async fn fetch_quotas(&self, fs_name: &str) -> Result<HashMap<String, DirectoryQuota>> {
        let mut all_quotas = HashMap::new();
        let mut cookie = 0;

        loop {
            let page = self.client.quota_page(fs_name, cookie).await?;
            debug!("filesystem '{}': page of {} quotas", fs_name, page.quotas.len());
            if page.quotas.is_empty() {
                break;
            }
            cookie = page.next_cookie;
            all_quotas.extend(page.quotas);
        }

        Ok(all_quotas)
    }

    fn export_quota(&self, cluster: &str, filesystem: &str, directory: &str, quota: &DirectoryQuota) {
        let owner = quota.owner.as_deref().unwrap_or("");
        let soft_gb = format_gb(quota.soft_limit_bytes);
        let hard_gb = format_gb(quota.hard_limit_bytes);

        self.quota
            .with_label_values(&[cluster, filesystem, directory, owner, &soft_gb, &hard_gb])
            .set(gb(quota.total_bytes));

        let labels = [cluster, filesystem, directory, owner];
        if quota.soft_limit_bytes <= quota.hard_limit_bytes {
            self.soft
                .with_label_values(&labels)
                .set(quota.soft_limit_bytes as f64);
        }
        self.hard
            .with_label_values(&labels)
            .set(quota.hard_limit_bytes as f64);
        self.used
            .with_label_values(&labels)
            .set(quota.total_bytes as f64);
        self.remaining
            .with_label_values(&labels)
            .set(quota.hard_limit_bytes as f64 - quota.total_bytes as f64);
    }

    /// Encode metrics in Prometheus text format.
    pub fn encode(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();

        // Reuse buffer to avoid allocation on every scrape
        thread_local! {
            static BUFFER: std::cell::RefCell<Vec<u8>> = std::cell::RefCell::new(Vec::with_capacity(8192));
        }

        BUFFER.with(|buf| {
            let mut buffer = buf.borrow_mut();
            buffer.clear();

            encoder
                .encode(&metric_families, &mut *buffer)
                .map_err(|e| WekaError::Metrics(e.to_string()))?;

            String::from_utf8(buffer.clone()).map_err(|e| WekaError::Metrics(e.to_string()))
        })
    }
}

/// True when usage is over the soft or the hard limit.
fn exceeds_limits(quota: &DirectoryQuota) -> bool {
    quota.total_bytes > quota.soft_limit_bytes || quota.total_bytes > quota.hard_limit_bytes
}

/// Decimal gigabytes, one decimal place.
fn gb(bytes: u64) -> f64 {
    (bytes as f64 / 1_000_000_000.0 * 10.0).round() / 10.0
}

fn format_gb(bytes: u64) -> String {
    format!("{:.1}", gb(bytes))
}
