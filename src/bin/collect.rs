//! One-shot collection: `collect [channel_id] [days]`, falling back to
//! `DEFAULT_CHANNEL_ID` and `COLLECTION_DAYS` from the environment.

use vaultcord::config::Config;
use vaultcord::{Collector, Window};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "configuration error");
            std::process::exit(1);
        }
    };

    let mut args = std::env::args().skip(1);
    let channel_id = match args.next().or_else(|| config.default_channel_id.clone()) {
        Some(id) => id,
        None => {
            tracing::error!("no channel id: pass one as the first argument or set DEFAULT_CHANNEL_ID");
            std::process::exit(1);
        }
    };
    let days = args
        .next()
        .and_then(|d| d.parse().ok())
        .unwrap_or(config.collection_days);

    let window = match Window::days(days) {
        Ok(window) => window,
        Err(e) => {
            tracing::error!(error = %e, "invalid window");
            std::process::exit(1);
        }
    };

    let collector = Collector::new(&config);
    match collector.collect(&channel_id, window).await {
        Ok(summary) => {
            tracing::info!(
                channel = %summary.channel_id,
                fetched = summary.messages_fetched,
                saved = summary.messages_saved,
                execution_time = %summary.execution_time,
                "collection completed"
            );
        }
        Err(e) => {
            tracing::error!(error = %e, "collection failed");
            std::process::exit(1);
        }
    }
}
