use anyhow::{bail, Context};
use chrono::{Duration as ChronoDuration, Utc};
use clap::Parser;
use derivbot::api::DeltaClient;
use derivbot::config::Settings;
use derivbot::execution::{
    DeltaGateway, IndicatorParams, OrderGateway, Pipeline, SignalEvaluator, SimulatedGateway,
    TickOutcome, TimeframeState, TrendEngine,
};
use derivbot::models::TradingMode;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing_subscriber::EnvFilter;

/// Supertrend trend follower for Delta Exchange perpetuals
#[derive(Debug, Parser)]
#[command(name = "derivbot", version)]
struct Cli {
    /// test: simulated orders against the testnet feed; prod: live orders
    #[arg(long, value_enum, default_value_t = TradingMode::Test)]
    mode: TradingMode,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();
    let settings = Settings::load().context("failed to load settings")?;

    tracing::info!("🚀 derivbot starting in {} mode", cli.mode);

    let credentials = settings.delta_credentials(cli.mode);
    if cli.mode.is_live() && (credentials.api_key.is_none() || credentials.api_secret.is_none()) {
        bail!("prod mode needs DELTA_API_KEY_PROD and DELTA_API_SECRET_PROD");
    }
    let client = DeltaClient::new(credentials);

    let product = client
        .get_product(&settings.symbol)
        .await
        .with_context(|| format!("failed to look up product {}", settings.symbol))?;
    tracing::info!("📦 Trading {} (product id {})", product.symbol, product.id);

    let pipeline = bootstrap_pipeline(&client, &settings).await?;

    let gateway: Box<dyn OrderGateway> = match cli.mode {
        TradingMode::Prod => Box::new(DeltaGateway::new(client.clone(), product.id)),
        TradingMode::Test => Box::new(SimulatedGateway),
    };
    let mut engine = TrendEngine::new(pipeline, SignalEvaluator::new(settings.order_size), gateway);

    tracing::info!("\n📊 Configuration:");
    tracing::info!("  Symbol: {}", settings.symbol);
    tracing::info!("  Supertrend: period {} x {}", settings.atr_period, settings.atr_multiplier);
    tracing::info!("  Order size: {}", settings.order_size);
    tracing::info!("  Poll interval: {}s", settings.loop_interval_secs);
    tracing::info!("\nPress Ctrl+C to stop...\n");

    let mut ticker = interval(Duration::from_secs(settings.loop_interval_secs.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("\n⚠️  Received Ctrl+C, shutting down...");
                break;
            }
            _ = ticker.tick() => {
                run_cycle(&client, &settings.symbol, &mut engine).await;
            }
        }
    }

    tracing::info!("👋 derivbot stopped");
    Ok(())
}

// ============================================================================
// Initialization Functions
// ============================================================================

fn setup_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("derivbot=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Seed every configured timeframe from exchange history
async fn bootstrap_pipeline(client: &DeltaClient, settings: &Settings) -> anyhow::Result<Pipeline> {
    let params = IndicatorParams {
        period: settings.atr_period,
        multiplier: settings.atr_multiplier,
    };
    let end = Utc::now();
    let mut timeframes = Vec::with_capacity(settings.timeframes.len());

    for spec in &settings.timeframes {
        let start = end - ChronoDuration::seconds(spec.seconds * settings.lookback as i64);
        let history = client
            .get_history_candles(&settings.symbol, &spec.resolution, start.timestamp(), end.timestamp())
            .await
            .with_context(|| format!("failed to fetch {} history", spec.name))?;

        tracing::info!("📈 Loaded {} {} candles", history.len(), spec.name);

        let state = TimeframeState::from_history(spec.clone(), params, settings.lookback, history)
            .with_context(|| format!("failed to seed {} timeframe", spec.name))?;
        timeframes.push(state);
    }

    Ok(Pipeline::new(timeframes))
}

// ============================================================================
// Trading Loop
// ============================================================================

async fn run_cycle<G: OrderGateway>(client: &DeltaClient, symbol: &str, engine: &mut TrendEngine<G>) {
    let price = match client.spot_price(symbol).await {
        Ok(price) => price,
        Err(e) => {
            tracing::warn!("Ticker fetch failed: {}. Retrying next cycle", e);
            return;
        }
    };

    let now = Utc::now();
    for outcome in engine.on_tick(price, now).await {
        if let TickOutcome::OrderFailed { timeframe, error, .. } = outcome {
            tracing::warn!("❌ {} signal not executed: {}", timeframe, error);
        }
    }

    print_status(engine, price, now);
}

fn print_status<G: OrderGateway>(engine: &TrendEngine<G>, price: f64, now: chrono::DateTime<Utc>) {
    println!("\n=== {} | spot {:.2} ===", now.format("%Y-%m-%d %H:%M:%S"), price);
    for line in engine.status_lines(price) {
        println!("{}", line);
    }
}
