use anyhow::Context;
use clap::Parser;
use derivbot::api::{DhanClient, OptionsBroker, Underlying};
use derivbot::config::Settings;
use derivbot::models::TradingMode;
use derivbot::straddle::console::{format_pnl_table, format_strikes, MANAGE_MENU, SETUP_MENU};
use derivbot::straddle::{
    shift_strikes, straddle_strikes, ManageCommand, PositionMonitor, RollDirection, SetupCommand, Straddle,
    StraddleManager,
};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};
use tracing_subscriber::EnvFilter;

/// Short straddle manager for index options on Dhan
#[derive(Debug, Parser)]
#[command(name = "straddle", version)]
struct Cli {
    /// test: no orders are placed; prod: live orders. Prompted when omitted
    #[arg(long, value_enum)]
    mode: Option<TradingMode>,
}

type Console = Lines<BufReader<Stdin>>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();
    let settings = Settings::load().context("failed to load settings")?;
    let mut console = BufReader::new(tokio::io::stdin()).lines();

    let mode = match cli.mode {
        Some(mode) => mode,
        None => prompt_mode(&mut console).await?,
    };
    tracing::info!("🚀 Straddle manager starting in {} mode", mode);

    let underlying = Underlying {
        security_id: settings.underlying_security_id,
        segment: settings.underlying_segment.clone(),
        options_segment: settings.options_segment.clone(),
    };
    let credentials = settings.dhan_credentials().context("Dhan credentials")?;
    let broker = Arc::new(DhanClient::new(credentials, underlying));

    let manager = StraddleManager::new(broker.clone(), mode, settings.straddle_quantity, settings.strike_step);
    let monitor = PositionMonitor::new(broker.clone());

    let Some(mut tracked) = setup(&mut console, broker.as_ref(), &manager).await? else {
        tracing::info!("👋 Exited before firing");
        return Ok(());
    };

    if let Err(e) = monitor.await_execution(&tracked).await {
        tracing::error!("❌ Not every straddle order executed: {}", e);
    }

    manage(&mut console, &manager, &monitor, &mut tracked).await?;

    tracing::info!(
        "👋 Exiting with {} straddle(s) still open: {}",
        tracked.len(),
        format_strikes(&tracked.iter().map(|s| s.strike).collect::<Vec<_>>())
    );
    Ok(())
}

fn setup_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("derivbot=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn prompt(console: &mut Console, label: &str) -> anyhow::Result<Option<String>> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(label.as_bytes()).await?;
    stdout.flush().await?;
    Ok(console.next_line().await?)
}

async fn prompt_mode(console: &mut Console) -> anyhow::Result<TradingMode> {
    let input = prompt(console, "Mode (test/prod): ").await?.unwrap_or_default();
    Ok(TradingMode::from_prompt(&input).unwrap_or_else(|| {
        tracing::warn!("Unrecognised mode {:?}, defaulting to test", input.trim());
        TradingMode::Test
    }))
}

/// Pick strikes around spot and fire. `None` when the operator exits first.
async fn setup<B: OptionsBroker>(
    console: &mut Console,
    broker: &B,
    manager: &StraddleManager<B>,
) -> anyhow::Result<Option<Vec<Straddle>>> {
    let spot = broker.spot_price().await.context("failed to fetch spot price")?;
    let mut strikes = straddle_strikes(spot, manager.step());

    loop {
        println!("\nSpot {:.2} | Strikes {}", spot, format_strikes(&strikes));
        let Some(input) = prompt(console, &format!("{} > ", SETUP_MENU)).await? else {
            return Ok(None);
        };

        match SetupCommand::parse(&input) {
            Some(SetupCommand::Up) => strikes = shift_strikes(strikes, 1, manager.step()),
            Some(SetupCommand::Down) => strikes = shift_strikes(strikes, -1, manager.step()),
            Some(SetupCommand::Fire) => match manager.fire(&strikes).await {
                Ok(tracked) if tracked.is_empty() => {
                    tracing::error!("❌ No straddle could be opened");
                }
                Ok(tracked) => {
                    tracing::info!("🔥 Fired {} straddle(s)", tracked.len());
                    return Ok(Some(tracked));
                }
                Err(e) => tracing::error!("❌ Fire failed: {}", e),
            },
            Some(SetupCommand::Exit) => return Ok(None),
            None => println!("Unknown choice {:?}", input.trim()),
        }
    }
}

async fn manage<B: OptionsBroker>(
    console: &mut Console,
    manager: &StraddleManager<B>,
    monitor: &PositionMonitor<B>,
    tracked: &mut Vec<Straddle>,
) -> anyhow::Result<()> {
    loop {
        let rows = monitor.poll(tracked).await;
        println!();
        for line in format_pnl_table(&rows) {
            println!("{}", line);
        }

        let Some(input) = prompt(console, &format!("{} > ", MANAGE_MENU)).await? else {
            return Ok(());
        };

        let direction = match ManageCommand::parse(&input) {
            Some(ManageCommand::Update) => continue,
            Some(ManageCommand::MoveTop) => RollDirection::Up,
            Some(ManageCommand::MoveBottom) => RollDirection::Down,
            Some(ManageCommand::Exit) => return Ok(()),
            None => {
                println!("Unknown choice {:?}", input.trim());
                continue;
            }
        };

        match manager.roll(direction, tracked).await {
            Ok(opened) => {
                if let Err(e) = monitor.await_execution(std::slice::from_ref(&opened)).await {
                    tracing::error!("❌ Replacement at {} did not execute: {}", opened.strike, e);
                }
            }
            Err(e) => tracing::error!("❌ Roll failed: {}", e),
        }
    }
}
