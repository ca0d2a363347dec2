//! HTTP server endpoint tests

use mockito::{Matcher, Server, ServerGuard};
use serde_json::json;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;
use weka_quota_exporter::{
    client::WekaClient,
    config::{ClusterConfig, ExporterConfig, Settings},
    error::WekaError,
    metrics::QuotaCollector,
    server::start_server,
};

/// Helper to write a throwaway auth token file
fn auth_token_file() -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, r#"{{"access_token": "test-token", "token_type": "Bearer"}}"#).unwrap();
    file
}

/// Helper to create validated settings pointing at the mock server
fn test_settings(server: &ServerGuard, token_file: &NamedTempFile) -> Settings {
    let port = server
        .host_with_port()
        .rsplit_once(':')
        .unwrap()
        .1
        .parse()
        .unwrap();

    Settings {
        cluster: ClusterConfig {
            hosts: vec!["127.0.0.1".to_string()],
            auth_token_file: token_file.path().display().to_string(),
            force_https: false,
            verify_cert: true,
            mgmt_port: port,
            filesystems: None,
        },
        exporter: ExporterConfig {
            listen_port: 0,
            timeout: 5,
            backends_only: true,
            exceeded_only: true,
        },
    }
}

async fn mock_status(server: &mut ServerGuard) -> mockito::Mock {
    server
        .mock("POST", "/api/v1")
        .match_body(Matcher::PartialJson(json!({"method": "status"})))
        .with_status(200)
        .with_body(
            r#"{"jsonrpc": "2.0", "id": 0, "result": {"name": "wdc-prod", "release": "4.2.7"}}"#,
        )
        .create_async()
        .await
}

async fn mock_hosts_list(server: &mut ServerGuard) -> mockito::Mock {
    server
        .mock("POST", "/api/v1")
        .match_body(Matcher::PartialJson(json!({"method": "hosts_list"})))
        .with_status(200)
        .with_body(
            r#"{"jsonrpc": "2.0", "id": 1, "result": {
                "HostId<0>": {"hostname": "127.0.0.1", "mode": "backend", "status": "UP"}
            }}"#,
        )
        .create_async()
        .await
}

async fn mock_filesystems(server: &mut ServerGuard) -> mockito::Mock {
    server
        .mock("POST", "/api/v1")
        .match_body(Matcher::PartialJson(json!({"method": "filesystems_get_capacity"})))
        .with_status(200)
        .with_body(r#"{"jsonrpc": "2.0", "id": 2, "result": {"4": {"name": "fs01"}}}"#)
        .create_async()
        .await
}

async fn mock_empty_quota_page(server: &mut ServerGuard, fs_name: &str) -> mockito::Mock {
    server
        .mock("POST", "/api/v1")
        .match_body(Matcher::PartialJson(json!({
            "method": "directory_quota_list",
            "params": {"fs_name": fs_name, "start_cookie": 0}
        })))
        .with_status(200)
        .with_body(r#"{"jsonrpc": "2.0", "id": 3, "result": {"nextCookie": 0, "quotas": {}}}"#)
        .create_async()
        .await
}

#[tokio::test]
async fn test_bind_conflict_fails_before_serving() {
    let mut server = Server::new_async().await;
    let _status = mock_status(&mut server).await;
    let token_file = auth_token_file();

    let settings = test_settings(&server, &token_file);
    let client = WekaClient::connect(&settings).await.unwrap();
    let collector = QuotaCollector::new(&settings, Arc::new(client)).unwrap();

    // occupy a port first
    let occupied = std::net::TcpListener::bind("0.0.0.0:0").unwrap();
    let taken_port = occupied.local_addr().unwrap().port();

    let result = start_server(taken_port, collector).await;

    match result {
        Err(WekaError::Bind { port, .. }) => assert_eq!(port, taken_port),
        other => panic!("expected Bind error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_server_starts_on_free_port() {
    let mut server = Server::new_async().await;
    let _status = mock_status(&mut server).await;
    let token_file = auth_token_file();

    let settings = test_settings(&server, &token_file);
    let client = WekaClient::connect(&settings).await.unwrap();
    let collector = QuotaCollector::new(&settings, Arc::new(client)).unwrap();

    // Start server in background on an OS-assigned port
    let server_handle = tokio::spawn(async move { start_server(0, collector).await });

    // Give server time to start; it should still be serving (not returned)
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!server_handle.is_finished());

    // Cleanup
    server_handle.abort();
}

#[tokio::test]
async fn test_metrics_encode_in_prometheus_format() {
    let mut server = Server::new_async().await;
    let _status = mock_status(&mut server).await;
    let _hosts = mock_hosts_list(&mut server).await;
    let _filesystems = mock_filesystems(&mut server).await;
    let _quotas = mock_empty_quota_page(&mut server, "fs01").await;
    let token_file = auth_token_file();

    let settings = test_settings(&server, &token_file);
    let client = WekaClient::connect(&settings).await.unwrap();
    let collector = QuotaCollector::new(&settings, Arc::new(client)).unwrap();

    collector.collect().await.unwrap();
    let metrics = collector.encode().unwrap();

    // Verify Prometheus exposition format
    assert!(metrics.contains("# HELP"));
    assert!(metrics.contains("# TYPE"));
    assert!(metrics.contains("weka_up 1"));
    assert!(metrics.contains("weka_collect_seconds"));
    assert!(metrics.contains("weka_collect_apicalls"));
}

#[tokio::test]
async fn test_edge_case_no_filesystems() {
    let mut server = Server::new_async().await;
    let _status = mock_status(&mut server).await;
    let _hosts = mock_hosts_list(&mut server).await;
    // Empty filesystem list
    let _filesystems = server
        .mock("POST", "/api/v1")
        .match_body(Matcher::PartialJson(json!({"method": "filesystems_get_capacity"})))
        .with_status(200)
        .with_body(r#"{"jsonrpc": "2.0", "id": 2, "result": {}}"#)
        .create_async()
        .await;
    let token_file = auth_token_file();

    let settings = test_settings(&server, &token_file);
    let client = WekaClient::connect(&settings).await.unwrap();
    let collector = QuotaCollector::new(&settings, Arc::new(client)).unwrap();

    // Should not fail with nothing to export
    collector.collect().await.unwrap();

    let metrics = collector.encode().unwrap();
    assert!(metrics.contains("weka_up 1"));
    assert!(!metrics.contains("weka_quota_used{"));
}

#[tokio::test]
async fn test_filesystems_override_skips_discovery() {
    let mut server = Server::new_async().await;
    let _status = mock_status(&mut server).await;
    let _hosts = mock_hosts_list(&mut server).await;
    let discovery = server
        .mock("POST", "/api/v1")
        .match_body(Matcher::PartialJson(json!({"method": "filesystems_get_capacity"})))
        .with_status(200)
        .with_body(r#"{"jsonrpc": "2.0", "id": 2, "result": {"4": {"name": "fs01"}}}"#)
        .expect(0)
        .create_async()
        .await;
    let _quotas = mock_empty_quota_page(&mut server, "scratch").await;
    let token_file = auth_token_file();

    let mut settings = test_settings(&server, &token_file);
    settings.cluster.filesystems = Some(vec!["scratch".to_string()]);
    let client = WekaClient::connect(&settings).await.unwrap();
    let collector = QuotaCollector::new(&settings, Arc::new(client)).unwrap();

    collector.collect().await.unwrap();

    // the configured list preempts API discovery
    discovery.assert_async().await;
}
