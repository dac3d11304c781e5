use super::candle_pipeline::TimeframeState;
use crate::models::{Candle, IndicatorPoint, Position, PositionDirection, Side, TrendDirection};

/// Long stop: the lower of the signal candle's low and the lower band
pub fn long_stop(candle: &Candle, point: &IndicatorPoint) -> f64 {
    candle.low.min(point.lower_band.unwrap_or(candle.low))
}

/// Short stop: the higher of the signal candle's high and the upper band
pub fn short_stop(candle: &Candle, point: &IndicatorPoint) -> f64 {
    candle.high.max(point.upper_band.unwrap_or(candle.high))
}

/// What the evaluator wants done on this candle close
#[derive(Debug, Clone, PartialEq)]
pub enum SignalAction {
    Enter {
        direction: PositionDirection,
        size: u32,
        entry_price: f64,
        stop_loss: f64,
    },
    StopOut {
        direction: PositionDirection,
        size: u32,
        exit_price: f64,
    },
    Hold,
}

impl SignalAction {
    /// Market order this action needs, if any
    pub fn order(&self) -> Option<(Side, u32)> {
        match self {
            Self::Enter { direction, size, .. } => Some((direction.entry_side(), *size)),
            Self::StopOut { direction, size, .. } => Some((direction.exit_side(), *size)),
            Self::Hold => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SignalDecision {
    pub action: SignalAction,
    pub reason: String,
}

impl SignalDecision {
    fn hold(reason: impl Into<String>) -> Self {
        Self {
            action: SignalAction::Hold,
            reason: reason.into(),
        }
    }
}

/// FLAT / LONG / SHORT state machine over one timeframe.
///
/// Evaluation is split from application: `evaluate` is pure, and `apply`
/// commits the transition only once the caller has an order id for it.
#[derive(Debug, Clone)]
pub struct SignalEvaluator {
    order_size: u32,
}

impl SignalEvaluator {
    pub fn new(order_size: u32) -> Self {
        Self { order_size }
    }

    /// Decide on the transition for a timeframe that just closed a candle.
    ///
    /// The signal candle is the latest sealed candle and the price is the
    /// close of the in-progress one. An open position suppresses entries.
    pub fn evaluate(&self, tf: &TimeframeState) -> SignalDecision {
        let price = tf.current_price();

        if let Some(position) = tf.position() {
            return self.check_stop(position, price);
        }

        let (Some(candle), Some(point)) = (tf.last_sealed(), tf.latest_indicator()) else {
            return SignalDecision::hold("Not enough candles");
        };
        let (Some(trend), Some(direction)) = (point.trend_value, point.direction) else {
            return SignalDecision::hold("Indicator warming up");
        };

        match direction {
            TrendDirection::Down if price > trend => {
                let stop_loss = long_stop(candle, point);
                SignalDecision {
                    action: SignalAction::Enter {
                        direction: PositionDirection::Long,
                        size: self.order_size,
                        entry_price: price,
                        stop_loss,
                    },
                    reason: format!("Price {:.2} crossed above Supertrend {:.2}", price, trend),
                }
            }
            TrendDirection::Up if price < trend => {
                let stop_loss = short_stop(candle, point);
                SignalDecision {
                    action: SignalAction::Enter {
                        direction: PositionDirection::Short,
                        size: self.order_size,
                        entry_price: price,
                        stop_loss,
                    },
                    reason: format!("Price {:.2} crossed below Supertrend {:.2}", price, trend),
                }
            }
            _ => SignalDecision::hold(format!("No cross (trend {}, line {:.2})", direction, trend)),
        }
    }

    fn check_stop(&self, position: &Position, price: f64) -> SignalDecision {
        let breached = match position.direction {
            PositionDirection::Long => price < position.stop_loss,
            PositionDirection::Short => price > position.stop_loss,
        };

        if !breached {
            return SignalDecision::hold(format!(
                "Holding {} (stop {:.2})",
                position.direction, position.stop_loss
            ));
        }

        SignalDecision {
            action: SignalAction::StopOut {
                direction: position.direction,
                size: position.size,
                exit_price: price,
            },
            reason: format!(
                "Stop loss {:.2} hit for {} at {:.2}",
                position.stop_loss, position.direction, price
            ),
        }
    }

    /// Commit an acknowledged action to the timeframe
    pub fn apply(&self, tf: &mut TimeframeState, action: &SignalAction, order_id: String) {
        match action {
            SignalAction::Enter {
                direction,
                size,
                entry_price,
                stop_loss,
            } => {
                tracing::info!(
                    timeframe = %tf.name(),
                    direction = %direction,
                    entry = entry_price,
                    stop = stop_loss,
                    order_id = %order_id,
                    "Entered position"
                );
                tf.set_position(Some(Position {
                    direction: *direction,
                    entry_price: *entry_price,
                    size: *size,
                    stop_loss: *stop_loss,
                    order_id,
                }));
            }
            SignalAction::StopOut { direction, exit_price, .. } => {
                tracing::info!(
                    timeframe = %tf.name(),
                    direction = %direction,
                    exit = exit_price,
                    order_id = %order_id,
                    "Closed position on stop loss"
                );
                tf.set_position(None);
            }
            SignalAction::Hold => {}
        }
    }
}

impl Default for SignalEvaluator {
    fn default() -> Self {
        Self::new(1)
    }
}
