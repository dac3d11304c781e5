//! Runtime settings, merged from an optional `derivbot.toml` and the process
//! environment (after `.env` has been loaded by the binaries).

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::error::BotError;
use crate::models::TradingMode;

pub const DELTA_API_URL_PROD: &str = "https://api.india.delta.exchange";
pub const DELTA_API_URL_TEST: &str = "https://cdn-ind.testnet.deltaex.org";
pub const DHAN_API_URL: &str = "https://api.dhan.co/v2";

/// Candle timeframe the trend bot follows
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TimeframeSpec {
    /// Display name, e.g. "5min"
    pub name: String,
    /// Exchange resolution string, e.g. "5m"
    pub resolution: String,
    pub seconds: i64,
}

impl TimeframeSpec {
    pub fn new(name: &str, resolution: &str, seconds: i64) -> Self {
        Self {
            name: name.to_string(),
            resolution: resolution.to_string(),
            seconds,
        }
    }
}

fn default_timeframes() -> Vec<TimeframeSpec> {
    vec![
        TimeframeSpec::new("3min", "3m", 180),
        TimeframeSpec::new("5min", "5m", 300),
        TimeframeSpec::new("15min", "15m", 900),
    ]
}

fn default_delta_url_prod() -> String {
    DELTA_API_URL_PROD.to_string()
}

fn default_delta_url_test() -> String {
    DELTA_API_URL_TEST.to_string()
}

fn default_dhan_url() -> String {
    DHAN_API_URL.to_string()
}

fn default_symbol() -> String {
    "BTCUSD".to_string()
}

fn default_atr_period() -> usize {
    8
}

fn default_atr_multiplier() -> f64 {
    2.0
}

fn default_loop_interval_secs() -> u64 {
    30
}

fn default_order_size() -> u32 {
    1
}

fn default_lookback() -> usize {
    250
}

fn default_strike_step() -> i64 {
    100
}

fn default_straddle_quantity() -> u32 {
    1
}

fn default_underlying_security_id() -> u64 {
    51 // SENSEX
}

fn default_underlying_segment() -> String {
    "IDX_I".to_string()
}

fn default_options_segment() -> String {
    "BSE_FNO".to_string()
}

/// Everything both binaries can be tuned with
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    // Delta Exchange (trend bot)
    pub delta_api_key_prod: Option<String>,
    pub delta_api_secret_prod: Option<String>,
    #[serde(default = "default_delta_url_prod")]
    pub delta_api_url_prod: String,
    pub delta_api_key_test: Option<String>,
    pub delta_api_secret_test: Option<String>,
    #[serde(default = "default_delta_url_test")]
    pub delta_api_url_test: String,

    // Dhan (straddle manager)
    pub dhan_client_id: Option<String>,
    pub dhan_access_token: Option<String>,
    #[serde(default = "default_dhan_url")]
    pub dhan_api_url: String,

    // Trend bot tunables
    #[serde(default = "default_symbol")]
    pub symbol: String,
    #[serde(default = "default_atr_period")]
    pub atr_period: usize,
    #[serde(default = "default_atr_multiplier")]
    pub atr_multiplier: f64,
    #[serde(default = "default_loop_interval_secs")]
    pub loop_interval_secs: u64,
    #[serde(default = "default_order_size")]
    pub order_size: u32,
    #[serde(default = "default_lookback")]
    pub lookback: usize,
    #[serde(default = "default_timeframes")]
    pub timeframes: Vec<TimeframeSpec>,

    // Straddle tunables
    #[serde(default = "default_strike_step")]
    pub strike_step: i64,
    #[serde(default = "default_straddle_quantity")]
    pub straddle_quantity: u32,
    #[serde(default = "default_underlying_security_id")]
    pub underlying_security_id: u64,
    #[serde(default = "default_underlying_segment")]
    pub underlying_segment: String,
    #[serde(default = "default_options_segment")]
    pub options_segment: String,
}

/// Key/secret/base-url triple for one exchange environment
#[derive(Debug, Clone)]
pub struct ApiCredentials {
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    pub base_url: String,
}

/// Dhan login material
#[derive(Debug, Clone)]
pub struct DhanCredentials {
    pub client_id: String,
    pub access_token: String,
    pub base_url: String,
}

impl Settings {
    /// Load from `derivbot.toml` (optional) overlaid with environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name("derivbot").required(false))
            .add_source(Environment::default().try_parsing(true))
            .build()?;

        config.try_deserialize()
    }

    /// Delta credentials for the given mode (test mode talks to the testnet)
    pub fn delta_credentials(&self, mode: TradingMode) -> ApiCredentials {
        match mode {
            TradingMode::Prod => ApiCredentials {
                api_key: self.delta_api_key_prod.clone(),
                api_secret: self.delta_api_secret_prod.clone(),
                base_url: self.delta_api_url_prod.clone(),
            },
            TradingMode::Test => ApiCredentials {
                api_key: self.delta_api_key_test.clone(),
                api_secret: self.delta_api_secret_test.clone(),
                base_url: self.delta_api_url_test.clone(),
            },
        }
    }

    /// Dhan has no separate sandbox; both modes read live market data
    pub fn dhan_credentials(&self) -> Result<DhanCredentials, BotError> {
        let client_id = self
            .dhan_client_id
            .clone()
            .ok_or_else(|| BotError::Credentials("DHAN_CLIENT_ID not set".to_string()))?;
        let access_token = self
            .dhan_access_token
            .clone()
            .ok_or_else(|| BotError::Credentials("DHAN_ACCESS_TOKEN not set".to_string()))?;

        Ok(DhanCredentials {
            client_id,
            access_token,
            base_url: self.dhan_api_url.clone(),
        })
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            delta_api_key_prod: None,
            delta_api_secret_prod: None,
            delta_api_url_prod: default_delta_url_prod(),
            delta_api_key_test: None,
            delta_api_secret_test: None,
            delta_api_url_test: default_delta_url_test(),
            dhan_client_id: None,
            dhan_access_token: None,
            dhan_api_url: default_dhan_url(),
            symbol: default_symbol(),
            atr_period: default_atr_period(),
            atr_multiplier: default_atr_multiplier(),
            loop_interval_secs: default_loop_interval_secs(),
            order_size: default_order_size(),
            lookback: default_lookback(),
            timeframes: default_timeframes(),
            strike_step: default_strike_step(),
            straddle_quantity: default_straddle_quantity(),
            underlying_security_id: default_underlying_security_id(),
            underlying_segment: default_underlying_segment(),
            options_segment: default_options_segment(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.symbol, "BTCUSD");
        assert_eq!(settings.atr_period, 8);
        assert_eq!(settings.atr_multiplier, 2.0);
        assert_eq!(settings.timeframes.len(), 3);
        assert_eq!(settings.timeframes[2].seconds, 900);
        assert_eq!(settings.strike_step, 100);
    }

    #[test]
    fn test_deserialize_overrides() {
        let config = Config::builder()
            .set_override("symbol", "ETHUSD")
            .unwrap()
            .set_override("strike_step", 50)
            .unwrap()
            .set_override("delta_api_key_prod", "key")
            .unwrap()
            .build()
            .unwrap();

        let settings: Settings = config.try_deserialize().unwrap();
        assert_eq!(settings.symbol, "ETHUSD");
        assert_eq!(settings.strike_step, 50);
        assert_eq!(settings.loop_interval_secs, 30);

        let creds = settings.delta_credentials(TradingMode::Prod);
        assert_eq!(creds.api_key.as_deref(), Some("key"));
        assert_eq!(creds.base_url, DELTA_API_URL_PROD);
    }

    #[test]
    fn test_test_mode_uses_testnet() {
        let creds = Settings::default().delta_credentials(TradingMode::Test);
        assert_eq!(creds.base_url, DELTA_API_URL_TEST);
        assert!(creds.api_key.is_none());
    }

    #[test]
    fn test_dhan_credentials_required() {
        let err = Settings::default().dhan_credentials().unwrap_err();
        assert!(matches!(err, BotError::Credentials(_)));
    }
}
