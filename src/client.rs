//! Management API client for communicating with a Weka cluster.
//!
//! This module provides a JSON-RPC 2.0 client for the cluster's management
//! port, used to enumerate filesystems and page through directory quotas.

use crate::config::Settings;
use crate::error::{Result, WekaError};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info, warn};

const API_PATH: &str = "api/v1";

/// Weka management API client.
///
/// Holds one HTTP client for the process lifetime and a rotation pool of
/// management hosts; requests try the pool in order, moving on when a host
/// is unreachable. [`WekaClient::refresh`] rebuilds the pool from live
/// cluster membership before each gather.
#[derive(Debug)]
pub struct WekaClient {
    http: Client,
    auth_header: String,
    scheme: &'static str,
    mgmt_port: u16,
    backends_only: bool,
    configured_hosts: Vec<String>,
    active_hosts: Mutex<Vec<String>>,
    cluster_name: String,
    request_id: AtomicU64,
    api_calls: AtomicU64,
}

impl WekaClient {
    /// Connect to the cluster described by the validated configuration.
    ///
    /// Reads the auth token file, builds the HTTP client, and probes the
    /// configured hosts in order with a `status` call. Construction fails
    /// without retry on a permission error ([`WekaError::Auth`]), a TLS
    /// negotiation failure while `force_https` is set ([`WekaError::Tls`]),
    /// or any other transport/decode error.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use weka_quota_exporter::client::WekaClient;
    /// use weka_quota_exporter::config::RawSettings;
    ///
    /// # async fn connect() {
    /// let settings = RawSettings::load("./quota-export.yml")
    ///     .and_then(|raw| raw.validate())
    ///     .unwrap();
    /// let client = WekaClient::connect(&settings).await.unwrap();
    /// # }
    /// ```
    pub async fn connect(settings: &Settings) -> Result<Self> {
        let cluster = &settings.cluster;
        let token = read_auth_token(&cluster.auth_token_file)?;

        let http = Client::builder()
            .timeout(Duration::from_secs(settings.exporter.timeout))
            .danger_accept_invalid_certs(!cluster.verify_cert)
            .build()?;

        let mut client = Self {
            http,
            auth_header: format!("Bearer {}", token.access_token),
            scheme: if cluster.force_https { "https" } else { "http" },
            mgmt_port: cluster.mgmt_port,
            backends_only: settings.exporter.backends_only,
            configured_hosts: cluster.hosts.clone(),
            active_hosts: Mutex::new(cluster.hosts.clone()),
            cluster_name: String::new(),
            request_id: AtomicU64::new(0),
            api_calls: AtomicU64::new(0),
        };

        let status: ClusterStatus = match client.call("status", json!({})).await {
            Ok(status) => status,
            Err(WekaError::Api(e)) if cluster.force_https && is_tls_failure(&e) => {
                return Err(WekaError::Tls(e.to_string()));
            }
            Err(e) => return Err(e),
        };

        info!(
            "connected to cluster '{}'{}",
            status.name,
            status
                .release
                .as_deref()
                .map(|r| format!(" (release {r})"))
                .unwrap_or_default()
        );
        client.cluster_name = status.name;

        Ok(client)
    }

    /// Name of the connected cluster, used as a metric label.
    pub fn cluster_name(&self) -> &str {
        &self.cluster_name
    }

    /// Number of API calls issued over the life of this client.
    pub fn api_calls(&self) -> u64 {
        self.api_calls.load(Ordering::Relaxed)
    }

    /// Rebuild the request pool from live cluster membership.
    ///
    /// Keeps hosts reported `UP`, restricted to backend nodes when
    /// `backends_only` is set. An empty survivor set falls back to the
    /// configured host list rather than leaving the client with nowhere
    /// to send requests.
    pub async fn refresh(&self) -> Result<()> {
        let members: HashMap<String, ClusterHost> = self.call("hosts_list", json!({})).await?;

        let mut pool: Vec<String> = members
            .values()
            .filter(|member| member.status == "UP")
            .filter(|member| !self.backends_only || member.mode == "backend")
            .map(|member| member.hostname.clone())
            .collect();
        pool.sort();

        if pool.is_empty() {
            warn!("cluster reported no usable hosts, keeping the configured list");
            pool = self.configured_hosts.clone();
        }

        debug!("request pool refreshed: {} hosts", pool.len());
        *self
            .active_hosts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = pool;

        Ok(())
    }

    /// Capacity records for every filesystem on the cluster, keyed by id.
    pub async fn filesystem_capacities(&self) -> Result<HashMap<String, FilesystemCapacity>> {
        self.call("filesystems_get_capacity", json!({})).await
    }

    /// One page of directory quotas for a filesystem.
    ///
    /// Pass `start_cookie` 0 for the first page and the returned
    /// `next_cookie` thereafter; an empty `quotas` map ends the listing.
    pub async fn quota_page(&self, fs_name: &str, start_cookie: u64) -> Result<QuotaListPage> {
        self.call(
            "directory_quota_list",
            json!({ "fs_name": fs_name, "start_cookie": start_cookie }),
        )
        .await
    }

    /// Resolve a quota's inode to its directory path.
    pub async fn resolve_inode(&self, inode_id: u64, snap_view_id: u64) -> Result<ResolvedPath> {
        self.call(
            "filesystem_resolve_inode",
            json!({ "inodeContext": inode_id, "snapViewId": snap_view_id }),
        )
        .await
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: serde_json::Value) -> Result<T> {
        self.api_calls.fetch_add(1, Ordering::Relaxed);

        let id = self.request_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": id,
        });

        let hosts = self
            .active_hosts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();

        let mut last_err = None;
        for host in &hosts {
            let url = format!("{}://{}:{}/{}", self.scheme, host, self.mgmt_port, API_PATH);
            debug!("calling {} on {}", method, url);

            let response = match self
                .http
                .post(&url)
                .header("Authorization", &self.auth_header)
                .json(&body)
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    warn!("request to {} failed: {}", host, e);
                    last_err = Some(e.into());
                    continue;
                }
            };

            let status = response.status();
            if status == StatusCode::FORBIDDEN || status == StatusCode::UNAUTHORIZED {
                return Err(WekaError::Auth(format!("cluster returned {status}")));
            }
            if !status.is_success() {
                warn!("{} returned {} for {}", host, status, method);
                return Err(WekaError::Api(response.error_for_status().unwrap_err()));
            }

            let envelope: RpcResponse<T> = response
                .json()
                .await
                .map_err(|e| WekaError::Parse(format!("invalid response to {method}: {e}")))?;

            return match (envelope.result, envelope.error) {
                (Some(result), _) => Ok(result),
                (None, Some(e)) => Err(WekaError::Rpc {
                    code: e.code,
                    message: e.message,
                }),
                (None, None) => Err(WekaError::Parse(format!(
                    "response to {method} carried neither result nor error"
                ))),
            };
        }

        Err(last_err
            .unwrap_or_else(|| WekaError::Parse("no management hosts available".to_string())))
    }
}

/// Auth token file written by `weka user login`.
#[derive(Deserialize)]
struct AuthToken {
    access_token: String,
}

fn read_auth_token(path: &str) -> Result<AuthToken> {
    let contents = std::fs::read_to_string(path)?;
    serde_json::from_str(&contents)
        .map_err(|e| WekaError::Auth(format!("unable to parse auth token file '{path}': {e}")))
}

/// Walk an error's source chain looking for a TLS negotiation failure.
fn is_tls_failure(err: &reqwest::Error) -> bool {
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        let text = cause.to_string().to_ascii_lowercase();
        if text.contains("tls") || text.contains("certificate") || text.contains("handshake") {
            return true;
        }
        source = cause.source();
    }
    false
}

/// JSON-RPC 2.0 response envelope.
#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

/// Cluster identity returned by the `status` call.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClusterStatus {
    /// Cluster name
    pub name: String,
    /// Software release, when reported
    #[serde(default)]
    pub release: Option<String>,
}

/// One cluster member as reported by `hosts_list`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClusterHost {
    /// Management hostname
    pub hostname: String,
    /// Node mode ("backend" or "client")
    pub mode: String,
    /// Liveness ("UP" when reachable)
    pub status: String,
}

/// Per-filesystem capacity record from `filesystems_get_capacity`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FilesystemCapacity {
    /// Filesystem name
    pub name: String,
}

/// One page of the `directory_quota_list` listing.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QuotaListPage {
    /// Cookie for the next page; meaningful only while pages are non-empty
    #[serde(rename = "nextCookie")]
    pub next_cookie: u64,
    /// Quotas keyed by quota id
    pub quotas: HashMap<String, DirectoryQuota>,
}

/// A single directory quota.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DirectoryQuota {
    /// Inode of the governed directory
    #[serde(rename = "inodeId")]
    pub inode_id: u64,
    /// Snapshot view the inode belongs to
    #[serde(rename = "snapViewId")]
    pub snap_view_id: u64,
    /// Owner recorded on the quota, absent for unowned directories
    #[serde(default)]
    pub owner: Option<String>,
    /// Bytes currently used under the directory
    #[serde(rename = "totalBytes")]
    pub total_bytes: u64,
    /// Soft limit in bytes
    #[serde(rename = "softLimitBytes")]
    pub soft_limit_bytes: u64,
    /// Hard limit in bytes
    #[serde(rename = "hardLimitBytes")]
    pub hard_limit_bytes: u64,
}

/// Directory path resolved from an inode.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResolvedPath {
    /// Absolute path within the filesystem
    pub path: String,
}
