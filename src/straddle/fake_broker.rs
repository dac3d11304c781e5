//! In-memory broker for straddle unit tests
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::api::{BrokerPosition, OptionChainRow, OptionsBroker};
use crate::error::BotError;
use crate::models::{OrderStatus, Side};

#[derive(Default)]
pub struct FakeBroker {
    pub spot: f64,
    pub chain: Vec<OptionChainRow>,
    pub prices: HashMap<String, f64>,
    pub positions: Vec<BrokerPosition>,
    pub statuses: Mutex<HashMap<String, Vec<OrderStatus>>>,
    pub reject: Mutex<HashSet<(String, Side)>>,
    pub orders: Mutex<Vec<(String, Side, u32)>>,
}

impl FakeBroker {
    /// Chain listing both legs at every strike in `from..=to`
    pub fn with_strikes(from: i64, to: i64, step: i64) -> Self {
        let chain = (0..=(to - from) / step)
            .map(|i| {
                let strike = from + i * step;
                OptionChainRow {
                    strike: strike as f64,
                    call_security_id: Some(format!("{strike}CE")),
                    put_security_id: Some(format!("{strike}PE")),
                }
            })
            .collect();
        Self {
            spot: 75_050.0,
            chain,
            ..Self::default()
        }
    }

    pub fn reject(&self, security_id: &str, side: Side) {
        self.reject.lock().unwrap().insert((security_id.to_string(), side));
    }

    pub fn orders(&self) -> Vec<(String, Side, u32)> {
        self.orders.lock().unwrap().clone()
    }
}

#[async_trait]
impl OptionsBroker for FakeBroker {
    async fn spot_price(&self) -> Result<f64, BotError> {
        Ok(self.spot)
    }

    async fn option_price(&self, security_id: &str) -> Result<f64, BotError> {
        self.prices
            .get(security_id)
            .copied()
            .ok_or_else(|| BotError::api("DH-904", "no quote"))
    }

    async fn nearest_expiry(&self) -> Result<String, BotError> {
        Ok("2024-06-07".to_string())
    }

    async fn option_chain(&self, _expiry: &str) -> Result<Vec<OptionChainRow>, BotError> {
        Ok(self.chain.clone())
    }

    async fn place_order(&self, security_id: &str, side: Side, quantity: u32) -> Result<String, BotError> {
        if self.reject.lock().unwrap().contains(&(security_id.to_string(), side)) {
            return Err(BotError::api("DH-906", format!("order rejected for {security_id}")));
        }
        let mut orders = self.orders.lock().unwrap();
        orders.push((security_id.to_string(), side, quantity));
        Ok(format!("ord-{}", orders.len()))
    }

    async fn order_status(&self, order_id: &str) -> Result<OrderStatus, BotError> {
        let mut statuses = self.statuses.lock().unwrap();
        match statuses.get_mut(order_id) {
            Some(queue) if queue.len() > 1 => Ok(queue.remove(0)),
            Some(queue) => Ok(queue.first().cloned().unwrap_or(OrderStatus::Executed)),
            None => Ok(OrderStatus::Executed),
        }
    }

    async fn positions(&self) -> Result<Vec<BrokerPosition>, BotError> {
        Ok(self.positions.clone())
    }
}
