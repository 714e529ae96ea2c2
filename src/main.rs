//! framecache - an in-memory cache server for tabular datasets

use anyhow::Result;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use framecache::api::{recover, server};
use framecache::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    init_logging(&config.log_destination);
    recover::install_panic_capture();

    info!(
        "starting framecache: port={} size={} age={}s buffer={}",
        config.port, config.size, config.age, config.statistics_buffer_size
    );

    if config.http_pprof {
        // No in-process profiler endpoints in this build
        warn!("http-pprof is enabled but profiling endpoints are not available");
    }

    server::run(config).await
}

fn init_logging(destination: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "framecache=info,tower_http=info".into());

    match destination {
        "stdout" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stdout))
                .init();
        }
        other => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
            if other == "syslog" {
                warn!("syslog logging is not wired up, falling back to stderr");
            } else if other != "stderr" {
                warn!("unknown log destination '{other}', falling back to stderr");
            }
        }
    }
}
