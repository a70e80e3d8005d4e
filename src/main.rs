use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gridbot::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "gridbot")]
#[command(about = "Grid trading and DCA engines: backtest, compare and paper trade", long_about = None)]
struct Cli {
    //debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    //backtest the configured strategy
    Backtest {
        //path to the run configuration (json)
        #[arg(long)]
        config: PathBuf,

        //overrides the candle archive of the config
        #[arg(long)]
        data: Option<PathBuf>,

        //output path for equity curve csv
        #[arg(long)]
        output_equity_csv: Option<PathBuf>,
    },

    //run the configured dca and grid pair side by side
    Compare {
        #[arg(long)]
        config: PathBuf,

        #[arg(long)]
        data: Option<PathBuf>,

        //also write the comparison as json
        #[arg(long)]
        output_json: Option<PathBuf>,
    },

    //paper trade the configured strategy by replaying the archive on a timer
    Paper {
        #[arg(long)]
        config: PathBuf,

        #[arg(long)]
        data: Option<PathBuf>,

        //milliseconds between ticks, defaults to the configured cadence
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        cadence_ms: Option<u64>,
    },

    //write a default run configuration
    InitConfig {
        #[arg(long, default_value = "gridbot.json")]
        output: PathBuf,
    },
}

fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match cli.command {
        Commands::Backtest {
            config,
            data,
            output_equity_csv,
        } => run_backtest(&config, data, output_equity_csv),
        Commands::Compare {
            config,
            data,
            output_json,
        } => run_compare(&config, data, output_json),
        Commands::Paper {
            config,
            data,
            cadence_ms,
        } => run_paper(&config, data, cadence_ms).await,
        Commands::InitConfig { output } => {
            RunConfiguration::default()
                .to_json_file(&output)
                .context(format!("Failed to write config to {:?}", output))?;
            println!("Default configuration written to {:?}", output);
            Ok(())
        }
    }
}

//loads the config and the candles of its window
fn load_run(
    config_path: &Path,
    data: Option<PathBuf>,
) -> Result<(RunConfiguration, Vec<Candle>, chrono::DateTime<chrono::Utc>, chrono::DateTime<chrono::Utc>)> {
    let mut config = RunConfiguration::from_json_file(config_path)?;
    if let Some(data) = data {
        config.data_path = data;
    }

    let candles = load_csv(&config.data_path)
        .context(format!("Failed to load data from {:?}", config.data_path))?;

    let (first, last) = match (candles.first(), candles.last()) {
        (Some(first), Some(last)) => (first.timestamp, last.timestamp),
        _ => anyhow::bail!("No candles in {:?}", config.data_path),
    };
    let (start, end) = config.window(first, last);

    if config.strategy.symbol() != config.symbol {
        warn!(
            config = %config.symbol,
            strategy = config.strategy.symbol(),
            "strategy symbol differs from the run symbol"
        );
    }

    info!(
        candles = candles.len(),
        %start,
        %end,
        "loaded {}",
        config.data_path.display()
    );

    Ok((config, candles, start, end))
}

fn run_backtest(
    config_path: &Path,
    data: Option<PathBuf>,
    output_equity_csv: Option<PathBuf>,
) -> Result<()> {
    println!("Gridbot Backtest");
    println!("================\n");

    let (config, candles, start, end) = load_run(config_path, data)?;
    let mut engine = config.strategy.build().context("invalid strategy config")?;

    println!("Strategy: {} on {}", engine.name(), engine.symbol());
    println!("Window: {} to {}", start, end);
    println!("Initial capital: ${:.2}", config.initial_capital);
    println!("Fee rate: {:.4}%\n", config.fee_rate * 100.0);

    let runner = BacktestRunner::new(BacktestConfig {
        initial_capital: config.initial_capital,
        fee_rate: config.fee_rate,
    });
    let result = runner.run(&candles, start, end, engine.as_mut());

    println!("Backtest Results");
    println!("================\n");
    result.metrics.pretty_print_table();
    println!(
        "Realized P&L: ${:.2}  Unrealized P&L: ${:.2}",
        result.realized_pnl, result.unrealized_pnl
    );

    let impact = FeeImpact::from_metrics(
        &result.strategy,
        &result.metrics,
        result.period,
        config.initial_capital,
    );
    print_fee_impact(&impact);

    if let Some(equity_path) = output_equity_csv.or(config.output_equity_csv) {
        save_equity_csv(&result.equity_points(), &equity_path)?;
        println!("\nEquity curve saved to {:?}", equity_path);
    }

    Ok(())
}

fn run_compare(config_path: &Path, data: Option<PathBuf>, output_json: Option<PathBuf>) -> Result<()> {
    let (config, candles, start, end) = load_run(config_path, data)?;
    let pair = config
        .comparison
        .clone()
        .context("config has no comparison pair")?;

    let comparison = compare(
        &config.symbol,
        &candles,
        start,
        end,
        config.initial_capital,
        config.fee_rate,
        pair.dca,
        pair.grid,
    )
    .context("invalid comparison config")?;

    println!("Strategy Comparison");
    println!("===================\n");
    comparison.pretty_print_table();
    println!("\nBest total return: {}", comparison.leader());

    if let Some(path) = output_json {
        let json = serde_json::to_string_pretty(&comparison)?;
        std::fs::write(&path, json).context(format!("Failed to write {:?}", path))?;
        println!("Comparison saved to {:?}", path);
    }

    Ok(())
}

async fn run_paper(config_path: &Path, data: Option<PathBuf>, cadence_ms: Option<u64>) -> Result<()> {
    let (config, candles, start, end) = load_run(config_path, data)?;
    let engine = config.strategy.build().context("invalid strategy config")?;

    let replay: Vec<Candle> = filter_window(&candles, start, end);
    let clock = Arc::new(ManualClock::new(start));
    let feed = ReplayFeed::new(replay, Arc::clone(&clock));
    let cadence = cadence_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| Duration::from_secs(config.live.cadence_secs));

    let bot = LiveBot::new(
        engine,
        feed,
        Ledger::new(config.initial_capital),
        clock,
        cadence,
        config.fee_rate,
    )
    .context("invalid paper trading settings")?;
    let handle = bot.handle();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl+C received, stopping after the current step");
                let _ = shutdown_tx.send(true);
            }
            Err(err) => error!("Failed to listen for shutdown signal: {}", err),
        }
    });

    let report = bot.run(shutdown_rx).await;
    let status = handle.status().await;

    println!("\nPaper Trading Summary");
    println!("=====================\n");
    println!("Ticks: {} ({} skipped)", report.ticks, report.skipped);
    println!("Orders: {}", report.venue.trade_log.len());
    println!("Trades counted: {}", status.engine.tally.trade_count);
    println!("Open quantity: {:.8}", status.engine.position_quantity);
    println!("Realized P&L: ${:.2}", report.venue.total_realized_pnl());
    if let Some(price) = status.last_price {
        println!(
            "Unrealized P&L: ${:.2}",
            report.venue.unrealized_pnl(&status.engine.symbol, price)
        );
        println!(
            "Final equity: ${:.2}",
            report.venue.equity(&status.engine.symbol, price)
        );
    }
    println!("Fees paid: ${:.2}", report.venue.total_fees);

    Ok(())
}

fn print_fee_impact(impact: &FeeImpact) {
    println!("\nFee Impact ({})", impact.strategy);
    println!("  Trades per month: {:.1}", impact.trades_per_month);
    println!("  Average fee: ${:.4}", impact.average_fee);
    println!("  Monthly fee cost: ${:.2}", impact.monthly_fee_cost);
    println!("  Fee/return ratio: {:.1}%", impact.fee_to_return_ratio);
    println!("  Minimum profitable move: ${:.4}", impact.optimal_min_profit);
}

fn save_equity_csv(equity_curve: &[EquityPoint], path: &Path) -> Result<()> {
    let mut writer =
        csv::Writer::from_path(path).context(format!("Failed to create {:?}", path))?;

    for point in equity_curve {
        writer.serialize(point)?;
    }
    writer.flush()?;

    Ok(())
}
