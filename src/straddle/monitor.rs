use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use super::manager::Straddle;
use crate::api::{BrokerPosition, OptionsBroker};
use crate::error::BotError;
use crate::models::OrderStatus;

const EXECUTION_POLL_INTERVAL: Duration = Duration::from_secs(2);
const POSITION_RETRY_DELAY: Duration = Duration::from_secs(5);

/// P&L of a short leg: positive when the option has lost value since the sale
pub fn short_leg_pnl(entry_price: f64, current_price: f64, short_quantity: f64) -> f64 {
    (entry_price - current_price) * short_quantity
}

#[derive(Debug, Clone, PartialEq)]
pub struct LegPnl {
    pub security_id: String,
    pub entry_price: f64,
    pub current_price: f64,
    pub short_quantity: f64,
    pub pnl: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StraddlePnl {
    pub strike: i64,
    pub call: Option<LegPnl>,
    pub put: Option<LegPnl>,
}

impl StraddlePnl {
    pub fn total(&self) -> f64 {
        self.call.iter().chain(self.put.iter()).map(|leg| leg.pnl).sum()
    }
}

/// Polls broker positions and order states for the tracked straddles
pub struct PositionMonitor<B: OptionsBroker> {
    broker: Arc<B>,
    poll_interval: Duration,
    retry_delay: Duration,
}

impl<B: OptionsBroker> PositionMonitor<B> {
    pub fn new(broker: Arc<B>) -> Self {
        Self {
            broker,
            poll_interval: EXECUTION_POLL_INTERVAL,
            retry_delay: POSITION_RETRY_DELAY,
        }
    }

    pub fn with_intervals(mut self, poll_interval: Duration, retry_delay: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.retry_delay = retry_delay;
        self
    }

    async fn leg_pnl(&self, position: &BrokerPosition) -> LegPnl {
        let current_price = match self.broker.option_price(&position.security_id).await {
            Ok(price) => price,
            Err(e) => {
                tracing::warn!(
                    "Quote for {} failed ({}), using entry price",
                    position.security_id,
                    e
                );
                position.sell_avg
            }
        };
        let short_quantity = position.short_quantity();

        LegPnl {
            security_id: position.security_id.clone(),
            entry_price: position.sell_avg,
            current_price,
            short_quantity,
            pnl: short_leg_pnl(position.sell_avg, current_price, short_quantity),
        }
    }

    /// One pass over open positions, matched to straddles by security id
    pub async fn snapshot(&self, tracked: &[Straddle]) -> Result<Vec<StraddlePnl>, BotError> {
        let positions: Vec<BrokerPosition> = self
            .broker
            .positions()
            .await?
            .into_iter()
            .filter(|p| !p.is_closed())
            .collect();

        let mut rows = Vec::with_capacity(tracked.len());
        for straddle in tracked {
            let call = match positions.iter().find(|p| p.security_id == straddle.call_security_id) {
                Some(p) => Some(self.leg_pnl(p).await),
                None => None,
            };
            let put = match positions.iter().find(|p| p.security_id == straddle.put_security_id) {
                Some(p) => Some(self.leg_pnl(p).await),
                None => None,
            };
            rows.push(StraddlePnl {
                strike: straddle.strike,
                call,
                put,
            });
        }

        Ok(rows)
    }

    /// `snapshot`, retried on a fixed delay until the broker answers
    pub async fn poll(&self, tracked: &[Straddle]) -> Vec<StraddlePnl> {
        loop {
            match self.snapshot(tracked).await {
                Ok(rows) => return rows,
                Err(e) => {
                    tracing::warn!(
                        "Position poll failed: {}. Retrying in {}s",
                        e,
                        self.retry_delay.as_secs()
                    );
                    tokio::time::sleep(self.retry_delay).await;
                }
            }
        }
    }

    /// Wait until every leg order of every tracked straddle is executed.
    ///
    /// Synthetic `test_` ids count as executed. A rejected or cancelled order
    /// ends the wait with an error; status lookup failures are retried.
    pub async fn await_execution(&self, tracked: &[Straddle]) -> Result<(), BotError> {
        let mut pending: HashSet<String> = tracked
            .iter()
            .flat_map(|s| s.order_ids())
            .filter(|id| !id.starts_with("test_"))
            .map(str::to_string)
            .collect();

        while !pending.is_empty() {
            let mut executed = Vec::new();
            for order_id in &pending {
                match self.broker.order_status(order_id).await {
                    Ok(OrderStatus::Executed) => executed.push(order_id.clone()),
                    Ok(status) if status.is_failed() => {
                        return Err(BotError::api(
                            status.to_string(),
                            format!("order {} was {}", order_id, status),
                        ));
                    }
                    Ok(status) => tracing::debug!("Order {} still {}", order_id, status),
                    Err(e) => tracing::warn!("Status check for {} failed: {}", order_id, e),
                }
            }
            for order_id in executed {
                pending.remove(&order_id);
            }

            if !pending.is_empty() {
                tracing::info!("⏳ Waiting for {} order(s) to execute", pending.len());
                tokio::time::sleep(self.poll_interval).await;
            }
        }

        tracing::info!("✅ All straddle orders executed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::straddle::fake_broker::FakeBroker;

    fn straddle(strike: i64, call_order: &str, put_order: &str) -> Straddle {
        Straddle {
            strike,
            call_security_id: format!("{strike}CE"),
            put_security_id: format!("{strike}PE"),
            call_order_id: call_order.to_string(),
            put_order_id: put_order.to_string(),
        }
    }

    fn position(security_id: &str, net_qty: i64, sell_avg: f64, position_type: &str) -> BrokerPosition {
        BrokerPosition {
            security_id: security_id.to_string(),
            exchange_segment: "BSE_FNO".to_string(),
            position_type: position_type.to_string(),
            net_qty,
            sell_avg,
            buy_avg: 0.0,
        }
    }

    fn fast(monitor: PositionMonitor<FakeBroker>) -> PositionMonitor<FakeBroker> {
        monitor.with_intervals(Duration::from_millis(1), Duration::from_millis(1))
    }

    #[test]
    fn test_short_leg_pnl() {
        assert_eq!(short_leg_pnl(250.0, 200.0, 20.0), 1000.0);
        assert_eq!(short_leg_pnl(250.0, 260.0, 20.0), -200.0);
    }

    #[tokio::test]
    async fn test_snapshot_matches_legs_and_falls_back_to_entry() {
        let mut broker = FakeBroker::with_strikes(74_000, 76_000, 100);
        broker.positions = vec![
            position("75000CE", -20, 250.0, "SHORT"),
            position("75000PE", -20, 230.0, "SHORT"),
            position("74900CE", 0, 300.0, "CLOSED"),
        ];
        broker.prices.insert("75000CE".to_string(), 200.0);
        // no quote for the put: entry price is used
        let monitor = PositionMonitor::new(Arc::new(broker));

        let rows = monitor
            .snapshot(&[straddle(75_000, "1", "2"), straddle(74_900, "3", "4")])
            .await
            .unwrap();

        assert_eq!(rows[0].call.as_ref().unwrap().pnl, 1000.0);
        assert_eq!(rows[0].put.as_ref().unwrap().current_price, 230.0);
        assert_eq!(rows[0].total(), 1000.0);
        assert!(rows[1].call.is_none());
        assert_eq!(rows[1].total(), 0.0);
    }

    #[tokio::test]
    async fn test_test_ids_execute_immediately() {
        let broker = Arc::new(FakeBroker::default());
        broker
            .statuses
            .lock()
            .unwrap()
            .insert("test_ce_75000".to_string(), vec![OrderStatus::Rejected]);
        let monitor = PositionMonitor::new(broker);

        let tracked = [straddle(75_000, "test_ce_75000", "test_pe_75000")];
        monitor.await_execution(&tracked).await.unwrap();
    }

    #[tokio::test]
    async fn test_waits_for_pending_orders() {
        let broker = Arc::new(FakeBroker::default());
        broker.statuses.lock().unwrap().insert(
            "ord-1".to_string(),
            vec![OrderStatus::Pending, OrderStatus::Pending, OrderStatus::Executed],
        );
        let monitor = fast(PositionMonitor::new(broker.clone()));

        monitor
            .await_execution(&[straddle(75_000, "ord-1", "ord-2")])
            .await
            .unwrap();

        assert_eq!(broker.statuses.lock().unwrap()["ord-1"], vec![OrderStatus::Executed]);
    }

    #[tokio::test]
    async fn test_rejected_order_ends_wait() {
        let broker = Arc::new(FakeBroker::default());
        broker.statuses.lock().unwrap().insert(
            "ord-2".to_string(),
            vec![OrderStatus::Pending, OrderStatus::Rejected],
        );
        let monitor = fast(PositionMonitor::new(broker));

        let result = monitor.await_execution(&[straddle(75_000, "ord-1", "ord-2")]).await;

        assert!(matches!(result, Err(BotError::Api { ref code, .. }) if code == "REJECTED"));
    }
}
