use chrono::{DateTime, Utc};

use super::candle_pipeline::Pipeline;
use super::order_gateway::OrderGateway;
use super::signal_evaluator::{SignalAction, SignalEvaluator};
use crate::models::TrendDirection;

/// Outcome of one evaluated candle close
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Held { timeframe: String, reason: String },
    Filled { timeframe: String, action: SignalAction, order_id: String },
    OrderFailed { timeframe: String, action: SignalAction, error: String },
}

/// Candle pipeline, signal evaluator and order gateway wired together
pub struct TrendEngine<G: OrderGateway> {
    pipeline: Pipeline,
    evaluator: SignalEvaluator,
    gateway: G,
}

impl<G: OrderGateway> TrendEngine<G> {
    pub fn new(pipeline: Pipeline, evaluator: SignalEvaluator, gateway: G) -> Self {
        Self {
            pipeline,
            evaluator,
            gateway,
        }
    }

    /// Feed a tick to every timeframe and evaluate the ones whose candle closed.
    ///
    /// Orders are placed one at a time. A transition is only applied when
    /// its order succeeds; a failed order leaves the timeframe untouched.
    pub async fn on_tick(&mut self, price: f64, time: DateTime<Utc>) -> Vec<TickOutcome> {
        let closed = self.pipeline.on_tick(price, time);
        let mut outcomes = Vec::with_capacity(closed.len());

        for index in closed {
            let Some(tf) = self.pipeline.timeframe_mut(index) else {
                continue;
            };
            let timeframe = tf.name().to_string();
            let decision = self.evaluator.evaluate(tf);

            let Some((side, size)) = decision.action.order() else {
                tracing::debug!(timeframe = %timeframe, "{}", decision.reason);
                outcomes.push(TickOutcome::Held {
                    timeframe,
                    reason: decision.reason,
                });
                continue;
            };

            tracing::info!(timeframe = %timeframe, "SIGNAL: {}", decision.reason);

            match self.gateway.place_market_order(side, size).await {
                Ok(order_id) => {
                    self.evaluator.apply(tf, &decision.action, order_id.clone());
                    outcomes.push(TickOutcome::Filled {
                        timeframe,
                        action: decision.action,
                        order_id,
                    });
                }
                Err(e) => {
                    tracing::error!(
                        timeframe = %timeframe,
                        "Order for signal failed, state unchanged: {}",
                        e
                    );
                    outcomes.push(TickOutcome::OrderFailed {
                        timeframe,
                        action: decision.action,
                        error: e.to_string(),
                    });
                }
            }
        }

        outcomes
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Operator status table, one row per timeframe
    pub fn status_lines(&self, latest_price: f64) -> Vec<String> {
        self.pipeline
            .timeframes()
            .iter()
            .map(|tf| {
                let trend = tf
                    .latest_indicator()
                    .and_then(|p| p.direction)
                    .map(|d| match d {
                        TrendDirection::Up => "UP",
                        TrendDirection::Down => "DOWN",
                    })
                    .unwrap_or("-");

                let (status, entry, stop, pnl) = match tf.position() {
                    Some(p) => (
                        p.direction.to_string(),
                        p.entry_price,
                        p.stop_loss,
                        p.unrealized_pnl(latest_price),
                    ),
                    None => ("NONE".to_string(), 0.0, 0.0, 0.0),
                };

                format!(
                    "{:<5} | Position: {:<5} | Trend: {:<4} | Entry: {:>9.2} | P&L: {:>8.2} | Stop: {:>9.2}",
                    tf.name(),
                    status,
                    trend,
                    entry,
                    pnl,
                    stop
                )
            })
            .collect()
    }
}
