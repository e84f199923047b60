//! Aviator Round Predictor
//!
//! Connects to the game feed, forecasts the next round and serves the
//! results over HTTP.

use aviator_predictor::{
    api::{self, ApiState, CheckReport},
    config::Config,
    feed::{self, decode, FeedConnection, Inbound},
    session::SessionCoordinator,
};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "aviator-predictor")]
#[command(about = "Aviator round feed ingester and next-round forecaster")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to the feed and serve the query API
    Run {
        /// Override the API port
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Run captured feed frames (one per line) through the forecaster
    Replay {
        /// File of raw inbound frames
        path: PathBuf,
        /// Number of resolved forecasts to print
        #[arg(short, long, default_value = "10")]
        show: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // wss:// feeds need a process-wide rustls provider
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        tracing::debug!("rustls crypto provider already installed");
    }

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { port } => {
            let config = Config::load(&cli.config)?;
            run(config, port).await
        }
        Commands::Replay { path, show } => replay(&path, show),
    }
}

async fn run(config: Config, port: Option<u16>) -> anyhow::Result<()> {
    tracing::info!("Starting Aviator predictor");

    if config.feed.access_token.is_empty() {
        tracing::warn!("feed.access_token is empty, the feed will likely reject the login");
    }

    let (coordinator, snapshots) = SessionCoordinator::new();
    let (connection, feed) = FeedConnection::new(config.feed.clone(), coordinator);
    let feed_task = tokio::spawn(connection.run());

    let state = ApiState::new(snapshots, config.server.history_default_limit)
        .with_feed_status(feed.watch_status());
    let addr: SocketAddr = format!(
        "{}:{}",
        config.server.host,
        port.unwrap_or(config.server.port)
    )
    .parse()?;

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
        }
        tracing::info!("Shutting down...");
    };

    let served = api::serve(state, addr, shutdown).await;

    if let Err(e) = feed.shutdown().await {
        tracing::warn!("Feed already stopped: {}", e);
    }
    feed::join_feed_task(feed_task).await;

    served?;
    Ok(())
}

fn replay(path: &Path, show: usize) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(path)?;
    let (mut coordinator, _snapshots) = SessionCoordinator::new();

    let mut frames = 0usize;
    let mut results = 0usize;
    for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
        frames += 1;
        if let Ok(Inbound::RoundResult(outcome)) = decode(line) {
            results += 1;
            coordinator.observe(outcome);
        }
    }

    let snapshot = coordinator.snapshot();
    let report = CheckReport::from(snapshot.as_ref());

    println!("\n📊 Replayed {} frames, {} round results\n", frames, results);
    println!("{:<12} {:>10} {:>10} {:>8}", "Session", "Predicted", "Actual", "Verdict");
    println!("{}", "-".repeat(44));
    for record in snapshot.records.iter().take(show) {
        println!(
            "{:<12} {:>9.2}x {:>9.2}x {:>8}",
            record.session_id,
            record.predicted_multiplier,
            record.actual_multiplier,
            api::responses::verdict_label(record.verdict)
        );
    }

    println!(
        "\nWin/Lose: {}/{} ({}) {}",
        report.tally.win, report.tally.lose, report.tally.accuracy, report.tally.status
    );
    if let Some(forecast) = &snapshot.forecast {
        println!(
            "Next: {}x ({}% confidence) - {}",
            forecast.predicted_multiplier, forecast.confidence, forecast.rationale
        );
    }

    Ok(())
}
