//! Error types for the quota exporter.
//!
//! This module defines custom error types using `thiserror` for structured
//! error handling throughout the application.

use thiserror::Error;

/// Main error type for quota exporter operations.
#[derive(Debug, Error)]
pub enum WekaError {
    /// Configuration file could not be parsed
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Configuration file does not exist
    #[error("Required configfile '{0}' does not exist")]
    ConfigMissing(String),

    /// A required top-level section is absent from the configuration
    #[error("'{0}:' stanza missing from .yml file - version mismatch between .yml and exporter version?")]
    MissingStanza(&'static str),

    /// One or more cluster hostnames failed DNS/hosts-file resolution
    #[error("hostnames not resolvable: {} - please ensure they are in /etc/hosts or DNS", .0.join(", "))]
    Unresolvable(Vec<String>),

    /// Cluster rejected the credential
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// TLS negotiation with the cluster failed
    #[error("TLS error: {0}")]
    Tls(String),

    /// Error communicating with the cluster management API
    #[error("Cluster API error: {0}")]
    Api(#[from] reqwest::Error),

    /// The management API returned a JSON-RPC error object
    #[error("Cluster API error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// Error decoding a management API response
    #[error("Failed to parse cluster API response: {0}")]
    Parse(String),

    /// Metrics error
    #[error("Metrics error: {0}")]
    Metrics(String),

    /// HTTP server could not bind its listen port
    #[error("Unable to start http server on port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    /// HTTP server error
    #[error("HTTP server error: {0}")]
    Server(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for quota exporter operations.
pub type Result<T> = std::result::Result<T, WekaError>;
