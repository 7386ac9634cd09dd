use anyhow::Context;
use clap::Parser;
use rsibot::api::BinanceClient;
use rsibot::config::BotConfig;
use rsibot::execution::TradingBot;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "rsibot", about = "RSI momentum trader with trailing stops")]
struct Cli {
    /// TOML configuration file, skipped if it does not exist
    #[arg(short, long, default_value = "rsibot.toml")]
    config: PathBuf,

    /// Run a single cycle and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = BotConfig::load(Some(cli.config.as_path()))
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    setup_logging(config.log_filter());

    tracing::info!("🚀 RsiBot starting");
    tracing::info!("📊 Configuration:");
    tracing::info!("  Symbol: {} ({}/{})", config.symbol, config.base_asset, config.quote_asset);
    tracing::info!("  Klines: {} x {}", config.kline_lookback, config.kline_interval);
    tracing::info!(
        "  RSI({}) enter < {} exit > {}",
        config.signal.period,
        config.signal.oversold,
        config.signal.overbought
    );
    tracing::info!(
        "  Stop loss: {}%  Take profit: {}%",
        config.orders.stop_loss_pct * 100.0,
        config.orders.take_profit_pct * 100.0
    );
    tracing::info!(
        "  Trailing: {}% after +{}%",
        config.trailing.trailing_stop_pct * 100.0,
        config.trailing.activation_pct * 100.0
    );
    tracing::info!("  Endpoint: {}", config.exchange.resolved_base_url());

    let client =
        BinanceClient::new(config.exchange.clone()).context("Failed to build Binance client")?;
    let mut bot = TradingBot::new(config, Arc::new(client));

    if cli.once {
        let report = bot.run_cycle().await.context("Cycle failed")?;
        tracing::info!(
            price = report.price,
            rsi = report.oscillator,
            signal = ?report.signal,
            open_positions = report.open_positions,
            "Single cycle complete"
        );
        return Ok(());
    }

    let shutdown = CancellationToken::new();
    tokio::spawn(await_shutdown(shutdown.clone()));

    tracing::info!("Press Ctrl+C to stop...");
    bot.run(shutdown).await;

    Ok(())
}

fn setup_logging(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Wait for SIGINT or SIGTERM and cancel the token
async fn await_shutdown(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("⚠️  Received Ctrl+C, shutting down...");
        }
        () = terminate => {
            tracing::info!("⚠️  Received SIGTERM, shutting down...");
        }
    }

    shutdown.cancel();
}
