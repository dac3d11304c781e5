use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// OHLCV candlestick data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// A fresh candle seeded from a single tick (no volume available from tickers)
    pub fn from_tick(timestamp: DateTime<Utc>, price: f64) -> Self {
        Self {
            timestamp,
            open: price,
            high: price,
            low: price,
            close: price,
            volume: 0.0,
        }
    }

    /// Fold a tick into the candle: widen high/low, move close
    pub fn absorb(&mut self, price: f64) {
        self.high = self.high.max(price);
        self.low = self.low.min(price);
        self.close = price;
    }
}

/// Which way the Supertrend currently points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrendDirection {
    Up,
    Down,
}

impl std::fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Up => write!(f, "UP"),
            Self::Down => write!(f, "DOWN"),
        }
    }
}

/// One Supertrend output, aligned with the candle it was computed for.
///
/// During warm-up `trend_value` and `direction` are `None`. Once warm,
/// exactly one of `upper_band` / `lower_band` is set: the upper band while
/// the trend is down, the lower band while it is up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorPoint {
    pub timestamp: DateTime<Utc>,
    pub trend_value: Option<f64>,
    pub upper_band: Option<f64>,
    pub lower_band: Option<f64>,
    pub direction: Option<TrendDirection>,
}

/// Order side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of an open trend position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionDirection {
    Long,
    Short,
}

impl PositionDirection {
    /// Side of the order that opens this position
    pub fn entry_side(self) -> Side {
        match self {
            Self::Long => Side::Buy,
            Self::Short => Side::Sell,
        }
    }

    /// Side of the order that flattens this position
    pub fn exit_side(self) -> Side {
        self.entry_side().opposite()
    }
}

impl std::fmt::Display for PositionDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Long => write!(f, "LONG"),
            Self::Short => write!(f, "SHORT"),
        }
    }
}

/// Open position on one timeframe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub direction: PositionDirection,
    pub entry_price: f64,
    pub size: u32,
    pub stop_loss: f64,
    pub order_id: String,
}

impl Position {
    /// Unrealized P&L at `price`
    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        let size = self.size as f64;
        match self.direction {
            PositionDirection::Long => (price - self.entry_price) * size,
            PositionDirection::Short => (self.entry_price - price) * size,
        }
    }
}

/// Whether orders go to the exchange or are only simulated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TradingMode {
    #[default]
    Test,
    Prod,
}

impl TradingMode {
    pub fn is_live(self) -> bool {
        self == Self::Prod
    }

    /// Lenient parse for interactive prompts
    pub fn from_prompt(input: &str) -> Option<Self> {
        match input.trim().to_lowercase().as_str() {
            "test" => Some(Self::Test),
            "prod" => Some(Self::Prod),
            _ => None,
        }
    }
}

impl std::fmt::Display for TradingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Test => write!(f, "TEST"),
            Self::Prod => write!(f, "PROD"),
        }
    }
}

/// Call or put
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptionType {
    #[serde(rename = "CE")]
    Call,
    #[serde(rename = "PE")]
    Put,
}

impl std::fmt::Display for OptionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Call => write!(f, "CE"),
            Self::Put => write!(f, "PE"),
        }
    }
}

/// Broker-side order state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    Executed,
    Rejected,
    Cancelled,
    Other(String),
}

impl OrderStatus {
    /// Map a Dhan status string
    pub fn from_broker(status: &str) -> Self {
        match status.to_uppercase().as_str() {
            "TRADED" | "E" => Self::Executed,
            "PENDING" | "TRANSIT" | "PART_TRADED" => Self::Pending,
            "REJECTED" => Self::Rejected,
            "CANCELLED" | "EXPIRED" => Self::Cancelled,
            other => Self::Other(other.to_string()),
        }
    }

    /// Terminal without execution
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Rejected | Self::Cancelled)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Executed => write!(f, "EXECUTED"),
            Self::Rejected => write!(f, "REJECTED"),
            Self::Cancelled => write!(f, "CANCELLED"),
            Self::Other(s) => write!(f, "{}", s),
        }
    }
}
