//! Process-wide logging initialization.
//!
//! Maps the repeatable `-v` CLI flag onto a `tracing` subscriber: the
//! verbosity count controls both the console format (level, file/line
//! visibility) and the filter directives for library targets. A syslog
//! sink is attached alongside the console unless disabled; losing it is
//! never fatal to startup. `RUST_LOG` overrides the computed filter.

use std::fmt;
use std::sync::Mutex;

use syslog::{Facility, Formatter3164, LoggerBackend};
use tracing::field::{Field, Visit};
use tracing::{warn, Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Subsystems pinned to `error` regardless of the requested verbosity:
/// the HTTP transport stack and the runtime internals.
const PINNED_SUBSYSTEMS: &[&str] = &["hyper=error", "h2=error", "tokio=error", "mio=error"];

/// Library targets whose level follows the `-v` count.
const LIBRARY_SUBSYSTEMS: &[&str] = &["reqwest", "tower_http"];

/// Configure logging for the remainder of the process lifetime.
///
/// - `0`: info, message-only console output, libraries at error
/// - `1`: info, level prefix added, libraries at info
/// - `2`: debug, target/file/line added, libraries unchanged
/// - `3+`: debug, libraries at debug
pub fn init(verbosity: u8, disable_syslog: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(verbosity)));

    let console = tracing_subscriber::fmt::layer()
        .without_time()
        .with_level(verbosity >= 1)
        .with_target(verbosity >= 2)
        .with_file(verbosity >= 2)
        .with_line_number(verbosity >= 2);

    let (syslog_layer, syslog_err) = if disable_syslog {
        (None, None)
    } else {
        match SyslogLayer::new() {
            Ok(layer) => (Some(layer), None),
            Err(e) => (None, Some(e)),
        }
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(syslog_layer)
        .init();

    if let Some(e) = syslog_err {
        warn!("syslog sink unavailable, continuing with console only: {e}");
    }
}

/// Build the filter directive string for a verbosity count.
fn filter_directives(verbosity: u8) -> String {
    let (base, libraries) = match verbosity {
        0 => ("info", "error"),
        1 => ("info", "info"),
        2 => ("debug", "info"),
        _ => ("debug", "debug"),
    };

    let mut directives = vec![base.to_string()];
    directives.extend(
        LIBRARY_SUBSYSTEMS
            .iter()
            .map(|target| format!("{target}={libraries}")),
    );
    directives.extend(PINNED_SUBSYSTEMS.iter().map(|s| s.to_string()));
    directives.join(",")
}

/// Forwards every event to the local syslog daemon, RFC 3164 framed.
///
/// The `syslog` crate probes the platform socket paths itself
/// (`/dev/log`, `/var/run/syslog`).
struct SyslogLayer {
    logger: Mutex<syslog::Logger<LoggerBackend, Formatter3164>>,
}

impl SyslogLayer {
    fn new() -> std::result::Result<Self, syslog::Error> {
        let formatter = Formatter3164 {
            facility: Facility::LOG_DAEMON,
            hostname: None,
            process: "weka-quota-exporter".into(),
            pid: std::process::id(),
        };

        let logger = syslog::unix::<Formatter3164>(formatter)?;
        Ok(Self {
            logger: Mutex::new(logger),
        })
    }
}

impl<S: Subscriber> Layer<S> for SyslogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut message = String::new();
        event.record(&mut MessageVisitor(&mut message));

        let Ok(mut logger) = self.logger.lock() else {
            return;
        };

        // a dead syslog socket must not take the exporter down with it
        let _ = match *event.metadata().level() {
            Level::ERROR => logger.err(message),
            Level::WARN => logger.warning(message),
            Level::INFO => logger.info(message),
            _ => logger.debug(message),
        };
    }
}

struct MessageVisitor<'a>(&'a mut String);

impl Visit for MessageVisitor<'_> {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        use std::fmt::Write;

        if field.name() == "message" {
            let _ = write!(self.0, "{value:?}");
        } else {
            let _ = write!(self.0, " {}={:?}", field.name(), value);
        }
    }
}
