use anyhow::{Context, Result};
use augur::models::{AugurConfig, Holding, TaskEvent, TaskStatus};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use futures::StreamExt;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "augur", about = "A-share multi-agent analysis engine")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "config/augur.toml")]
    config: String,

    /// Pretty-print the output JSON
    #[arg(long, global = true)]
    pretty: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API
    Serve {
        /// Override `server.bind` from the config
        #[arg(long)]
        bind: Option<String>,
    },
    /// Analyse one symbol, streaming progress to stderr
    Analyze {
        symbol: String,
        /// Analyse as of this date (YYYY-MM-DD)
        #[arg(long)]
        as_of: Option<NaiveDate>,
    },
    /// Recommend sell, hold or add for an existing position
    Position {
        symbol: String,
        #[arg(long)]
        quantity: Decimal,
        #[arg(long)]
        avg_price: Decimal,
        #[arg(long)]
        purchase_date: NaiveDate,
        /// Read from the cache when omitted
        #[arg(long)]
        current_price: Option<Decimal>,
        /// Fraction of the portfolio this position represents
        #[arg(long)]
        position_weight: Option<f64>,
        /// Trading date for the T+1 check; defaults to today
        #[arg(long)]
        trade_date: Option<NaiveDate>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing (respects RUST_LOG env var)
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr);
    if cli.json_logs {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    // Load config
    let config_str = std::fs::read_to_string(&cli.config)
        .with_context(|| format!("Failed to read config: {}", cli.config))?;
    let config: AugurConfig =
        toml::from_str(&config_str).with_context(|| "Failed to parse config")?;

    let engine = augur::build_engine(&config).context("Failed to build engine")?;

    match cli.command {
        Command::Serve { bind } => {
            if config.narrator.enabled && !augur::agents::claude_cli::check_cli_available().await {
                warn!("Narrator enabled but the claude CLI is not available; using fallback text");
            }
            let bind = bind.unwrap_or_else(|| config.server.bind.clone());
            let listener = tokio::net::TcpListener::bind(&bind)
                .await
                .with_context(|| format!("Failed to bind {bind}"))?;
            info!(bind = %bind, "Serving");
            axum::serve(listener, augur::server::router(engine))
                .with_graceful_shutdown(shutdown_signal())
                .await
                .context("Server error")?;
        }
        Command::Analyze { symbol, as_of } => {
            let task_id = engine.tasks().create(&symbol, as_of).await?;
            let mut events = engine.tasks().subscribe(task_id).await?;
            while let Some(event) = events.next().await {
                match &event {
                    TaskEvent::Replay { messages, .. } => {
                        for m in messages {
                            eprintln!("[{:>3}%] {}", m.progress, m.message);
                        }
                    }
                    TaskEvent::Progress { message, .. } => {
                        eprintln!("[{:>3}%] {}", message.progress, message.message);
                    }
                    TaskEvent::Complete { .. } | TaskEvent::Error { .. } => {}
                }
            }

            let task = engine.tasks().get(task_id).await?;
            print_json(&task, cli.pretty)?;
            if task.status != TaskStatus::Completed {
                anyhow::bail!(
                    "Analysis {}: {}",
                    task.status,
                    task.error.as_deref().unwrap_or("no result")
                );
            }
        }
        Command::Position {
            symbol,
            quantity,
            avg_price,
            purchase_date,
            current_price,
            position_weight,
            trade_date,
        } => {
            let holding = Holding {
                quantity,
                avg_price,
                purchase_date,
                current_price,
                position_weight,
            };
            let analysis = engine
                .analyze_position(&symbol, holding, trade_date)
                .await
                .map_err(|e| anyhow::anyhow!("Position analysis failed: {e}"))?;
            print_json(&analysis, cli.pretty)?;
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let output = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{output}");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
    }
    info!("Shutting down");
}
