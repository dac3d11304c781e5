pub mod delta;
pub mod dhan;

pub use delta::{DeltaClient, Product, Ticker};
pub use dhan::{DhanClient, Underlying};

use async_trait::async_trait;
use serde::{Deserialize, Deserializer};

use crate::error::BotError;
use crate::models::{OrderStatus, Side};

/// One strike row of an option chain, reduced to what the resolver needs
#[derive(Debug, Clone, PartialEq)]
pub struct OptionChainRow {
    pub strike: f64,
    pub call_security_id: Option<String>,
    pub put_security_id: Option<String>,
}

/// An open (or closed-today) position as the broker reports it
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokerPosition {
    #[serde(deserialize_with = "string_or_number")]
    pub security_id: String,
    #[serde(default)]
    pub exchange_segment: String,
    #[serde(default)]
    pub position_type: String,
    #[serde(default)]
    pub net_qty: i64,
    #[serde(default)]
    pub sell_avg: f64,
    #[serde(default)]
    pub buy_avg: f64,
}

impl BrokerPosition {
    pub fn is_closed(&self) -> bool {
        self.position_type.eq_ignore_ascii_case("CLOSED")
    }

    /// Quantity sold short (negative if the leg is net long)
    pub fn short_quantity(&self) -> f64 {
        -(self.net_qty as f64)
    }
}

/// Brokerage operations the straddle manager and position monitor rely on
#[async_trait]
pub trait OptionsBroker: Send + Sync {
    /// Last traded price of the underlying index
    async fn spot_price(&self) -> Result<f64, BotError>;

    /// Last traded price of an option contract
    async fn option_price(&self, security_id: &str) -> Result<f64, BotError>;

    /// Nearest listed expiry of the underlying, as `YYYY-MM-DD`
    async fn nearest_expiry(&self) -> Result<String, BotError>;

    async fn option_chain(&self, expiry: &str) -> Result<Vec<OptionChainRow>, BotError>;

    /// Place a market order for an option contract, returning the broker order id
    async fn place_order(&self, security_id: &str, side: Side, quantity: u32) -> Result<String, BotError>;

    async fn order_status(&self, order_id: &str) -> Result<OrderStatus, BotError>;

    async fn positions(&self) -> Result<Vec<BrokerPosition>, BotError>;
}

/// Accepts `"123"`, `123` or `123.0` and yields the canonical string form
pub(crate) fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Str(String),
        Int(i64),
        Float(f64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Str(s) => s,
        Raw::Int(i) => i.to_string(),
        Raw::Float(f) if f.fract() == 0.0 => (f as i64).to_string(),
        Raw::Float(f) => f.to_string(),
    })
}

/// Accepts `"67000.5"` or `67000.5`
pub(crate) fn f64_from_string_or_number<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(f64),
        Str(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Num(n) => Ok(n),
        Raw::Str(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}
