// Candle aggregation, signal evaluation and order placement for the trend bot
pub mod candle_pipeline;
pub mod order_gateway;
pub mod signal_evaluator;
pub mod trend_engine;

pub use candle_pipeline::{CandleEvent, IndicatorParams, Pipeline, TimeframeState};
pub use order_gateway::{DeltaGateway, OrderGateway, SimulatedGateway};
pub use signal_evaluator::{SignalAction, SignalDecision, SignalEvaluator};
pub use trend_engine::{TickOutcome, TrendEngine};
