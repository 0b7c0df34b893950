use anyhow::Context;
use clap::Parser;
use fxstream::client::{parse_depth_levels, parse_token_pairs};
use fxstream::{StreamClientBuilder, StreamConfig};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const ENV_PREFIX: &str = "FX";

/// Stream order book depth for one or more instrument pairs.
///
/// Credentials are read from FX_API_KEY, FX_SECRET_KEY and FX_PASSPHRASE
/// (a `.env` file in the working directory is honoured).
#[derive(Parser, Debug)]
#[command(name = "fxstream")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Comma separated instrument pairs, e.g. BTC/USD,ETH/USD
    #[arg(default_value = "BTC/USD")]
    pairs: String,

    /// Comma separated integer depth levels, e.g. 1,5,30
    #[arg(default_value = "30")]
    levels: String,
}

fn load_config() -> anyhow::Result<StreamConfig> {
    #[cfg(feature = "env-file")]
    let config = StreamConfig::from_env_file(ENV_PREFIX);
    #[cfg(not(feature = "env-file"))]
    let config = StreamConfig::from_env(ENV_PREFIX);

    let config = config.context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let pairs = parse_token_pairs(&cli.pairs).context("Invalid instrument pairs")?;
    let levels = parse_depth_levels(&cli.levels).context("Invalid depth levels")?;
    let config = load_config()?;

    info!(
        pairs = %pairs.join(","),
        levels = ?levels,
        url = %config.url,
        "fxstream starting"
    );

    let cancel = CancellationToken::new();
    let mut client = StreamClientBuilder::new(config)
        .with_pairs(&pairs)
        .with_levels(&levels)
        .with_cancellation(cancel.clone())
        .build()
        .context("Failed to build stream client")?;

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            shutdown.cancel();
        }
    });

    if let Err(e) = client.run().await {
        error!(error = %e, "Fatal error");
        return Err(e.into());
    }

    info!("fxstream stopped");
    Ok(())
}
