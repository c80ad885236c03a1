use signpost_core::api;
use signpost_core::util::config::Config;
use signpost_core::util::runtime;
use std::future::Future;
use tracing_subscriber::EnvFilter;

const APP_VERSION: &str = match option_env!("SIGNPOST_APP_VERSION") {
    Some(value) => value,
    None => env!("CARGO_PKG_VERSION"),
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if runtime::handle_cli_flags(APP_VERSION) {
        return Ok(());
    }

    let config = Config::load()?;
    init_tracing(&config.log_level);

    let state = api::AppState::new(config)?;
    tracing::info!(
        listen = %state.config.listen,
        metrics_listen = %state.config.metrics_listen,
        endpoint = %state.config.s3_endpoint,
        "starting signpost"
    );
    let servers = api::build_servers(state)?;
    wait_for_exit(servers.run_all()).await;
    Ok(())
}

fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn wait_for_exit<F>(run_all: F)
where
    F: Future<Output = ()>,
{
    tokio::select! {
        _ = run_all => {},
        _ = runtime::shutdown_signal() => {
            tracing::info!("shutdown signal received");
        }
    }
}
