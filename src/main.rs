use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, error, info};
use weka_quota_exporter::{
    client::WekaClient, config::RawSettings, config::Settings, error::WekaError, logging,
    metrics::QuotaCollector, server::start_server,
};

/// Prometheus directory-quota exporter for Weka storage clusters
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Override ./quota-export.yml as config file
    #[arg(short = 'c', long, value_name = "FILE", default_value = "./quota-export.yml")]
    configfile: PathBuf,

    /// Disable syslog logging
    #[arg(long = "no_syslog")]
    no_syslog: bool,

    /// Increase output verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbosity: u8,
}

#[tokio::main]
async fn main() -> ExitCode {
    // --version is handled here: clap prints it and exits 0 before any
    // logging or config work happens
    let args = Args::parse();

    logging::init(args.verbosity, args.no_syslog);

    if !args.configfile.exists() {
        error!(
            "Required configfile '{}' does not exist",
            args.configfile.display()
        );
        return ExitCode::FAILURE;
    }

    debug!("loading config file");
    let raw = match RawSettings::load(&args.configfile) {
        Ok(raw) => raw,
        Err(e) => {
            error!(
                "Error loading config file '{}': {e}",
                args.configfile.display()
            );
            return ExitCode::FAILURE;
        }
    };
    debug!("config file loaded");

    let settings = match raw.validate() {
        Ok(settings) => settings,
        Err(WekaError::Unresolvable(hosts)) => {
            for host in &hosts {
                error!("Hostname {host} not resolvable - is it in /etc/hosts or DNS?");
            }
            error!("Errors resolving hostnames given. Please ensure they are in /etc/hosts or DNS and are resolvable");
            return ExitCode::FAILURE;
        }
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    // every failure inside run() has already been logged with an
    // operator-actionable message; all that is left is the exit code
    match run(settings).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(_) => ExitCode::FAILURE,
    }
}

/// Connect to the cluster, bind the collector, and serve until shutdown.
async fn run(settings: Settings) -> Result<(), WekaError> {
    let client = match WekaClient::connect(&settings).await {
        Ok(client) => client,
        Err(e) => {
            match &e {
                WekaError::Auth(_) => {
                    error!("Cluster returned permission error - is the userid level ReadOnly or above?");
                }
                WekaError::Tls(cause) => {
                    error!("TLS Error: Only Weka v3.10 and above support https, and force_https is set in config file.");
                    error!("TLS Error: Is this cluster < v3.10? Please verify configuration");
                    error!("Error is {cause}");
                }
                other => {
                    error!("Unable to create cluster client: {}", error_chain(other));
                }
            }
            return Err(e);
        }
    };

    let collector = match QuotaCollector::new(&settings, Arc::new(client)) {
        Ok(collector) => collector,
        Err(e) => {
            error!("Unable to create collector: {e}");
            return Err(e);
        }
    };
    info!("quota collector initialized");

    if let Err(e) = start_server(settings.exporter.listen_port, collector).await {
        error!("{e}");
        return Err(e);
    }

    Ok(())
}

/// Render an error with its full source chain for operator diagnostics.
fn error_chain(err: &WekaError) -> String {
    let mut rendered = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        rendered.push_str(": ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}
