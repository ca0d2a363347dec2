//! Configuration management for the quota exporter.
//!
//! Supports loading configuration from:
//! - A YAML configuration file (`quota-export.yml` by default)
//! - Environment variables (with `QUOTA_EXPORTER_` prefix)
//!
//! Loading and validation are deliberately separate steps: [`RawSettings`]
//! holds exactly what the operator declared, and [`RawSettings::validate`]
//! checks stanzas, resolves hostnames, and applies defaults exactly once,
//! producing the fully-typed [`Settings`] the rest of the exporter runs on.

use crate::error::{Result, WekaError};
use serde::{Deserialize, Serialize};
use std::net::ToSocketAddrs;
use std::path::Path;
use tracing::info;

/// Cluster connection settings as declared in the `cluster:` stanza.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawClusterConfig {
    /// Management hostnames or addresses of the cluster, tried in order
    pub hosts: Vec<String>,

    /// Path to the JSON auth token file produced by `weka user login`
    pub auth_token_file: String,

    /// Require HTTPS towards the cluster (clusters older than v3.10 cannot)
    pub force_https: Option<bool>,

    /// Verify TLS certificates (set to false for self-signed certs)
    pub verify_cert: Option<bool>,

    /// Management API port
    pub mgmt_port: Option<u16>,

    /// Restrict quota collection to these filesystems; null discovers via API
    pub filesystems: Option<Vec<String>>,
}

/// Exporter settings as declared in the `exporter:` stanza.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawExporterConfig {
    /// Port to serve metrics on (required, no default)
    pub listen_port: u16,

    /// Cluster API request timeout in seconds
    pub timeout: Option<u64>,

    /// Talk to backend nodes only, excluding client-only nodes
    pub backends_only: Option<bool>,

    /// Only export quotas whose usage exceeds the soft or hard limit
    pub exceeded_only: Option<bool>,
}

/// Configuration exactly as declared, before defaulting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSettings {
    pub cluster: Option<RawClusterConfig>,
    pub exporter: Option<RawExporterConfig>,
}

/// Validated cluster connection settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub hosts: Vec<String>,
    pub auth_token_file: String,
    pub force_https: bool,
    pub verify_cert: bool,
    pub mgmt_port: u16,
    pub filesystems: Option<Vec<String>>,
}

impl std::fmt::Debug for ClusterConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterConfig")
            .field("hosts", &self.hosts)
            .field("auth_token_file", &"***REDACTED***")
            .field("force_https", &self.force_https)
            .field("verify_cert", &self.verify_cert)
            .field("mgmt_port", &self.mgmt_port)
            .field("filesystems", &self.filesystems)
            .finish()
    }
}

/// Validated exporter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExporterConfig {
    pub listen_port: u16,
    pub timeout: u64,
    pub backends_only: bool,
    pub exceeded_only: bool,
}

/// Fully validated and defaulted configuration.
///
/// Read-only after validation; no downstream component re-applies defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub cluster: ClusterConfig,
    pub exporter: ExporterConfig,
}

fn default_force_https() -> bool {
    false
}

fn default_verify_cert() -> bool {
    true
}

fn default_mgmt_port() -> u16 {
    14000
}

fn default_timeout() -> u64 {
    10
}

fn default_backends_only() -> bool {
    true
}

fn default_exceeded_only() -> bool {
    true
}

impl RawSettings {
    /// Load declared configuration from a YAML file and environment variables.
    ///
    /// The caller is responsible for checking that `path` exists; a file that
    /// is not valid YAML, or whose root is not a mapping, fails with
    /// [`WekaError::Config`]. No defaults are applied here.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use weka_quota_exporter::config::RawSettings;
    ///
    /// let raw = RawSettings::load("./quota-export.yml").unwrap();
    /// let settings = raw.validate().unwrap();
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let builder = config::Config::builder()
            .add_source(config::File::new(
                path.to_str().ok_or_else(|| {
                    WekaError::ConfigMissing(path.display().to_string())
                })?,
                config::FileFormat::Yaml,
            ))
            .add_source(
                config::Environment::with_prefix("QUOTA_EXPORTER")
                    .separator("__")
                    .try_parsing(true),
            );

        let raw: RawSettings = builder.build()?.try_deserialize()?;
        Ok(raw)
    }

    /// Validate the declared configuration and apply defaults.
    ///
    /// Checks run in order, each a hard stop:
    /// 1. `cluster:` stanza present
    /// 2. `exporter:` stanza present
    /// 3. every `cluster.hosts` entry resolves; failures are collected
    ///    exhaustively so the operator sees the complete list in one run
    /// 4. defaults for every optional key not explicitly set
    pub fn validate(self) -> Result<Settings> {
        let cluster = self.cluster.ok_or(WekaError::MissingStanza("cluster"))?;
        let exporter = self.exporter.ok_or(WekaError::MissingStanza("exporter"))?;

        let unresolvable = unresolvable_hosts(&cluster.hosts);
        if !unresolvable.is_empty() {
            return Err(WekaError::Unresolvable(unresolvable));
        }

        let settings = Settings {
            cluster: ClusterConfig {
                hosts: cluster.hosts,
                auth_token_file: cluster.auth_token_file,
                force_https: cluster.force_https.unwrap_or_else(default_force_https),
                verify_cert: cluster.verify_cert.unwrap_or_else(default_verify_cert),
                mgmt_port: cluster.mgmt_port.unwrap_or_else(default_mgmt_port),
                filesystems: cluster.filesystems,
            },
            exporter: ExporterConfig {
                listen_port: exporter.listen_port,
                timeout: exporter.timeout.unwrap_or_else(default_timeout),
                backends_only: exporter
                    .backends_only
                    .unwrap_or_else(default_backends_only),
                exceeded_only: exporter
                    .exceeded_only
                    .unwrap_or_else(default_exceeded_only),
            },
        };

        info!("Timeout set to {} secs", settings.exporter.timeout);

        Ok(settings)
    }
}

/// Resolve every host through the OS resolver, returning all that failed.
fn unresolvable_hosts(hosts: &[String]) -> Vec<String> {
    hosts
        .iter()
        .filter(|host| (host.as_str(), 0u16).to_socket_addrs().is_err())
        .cloned()
        .collect()
}
