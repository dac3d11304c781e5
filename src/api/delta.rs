use chrono::{TimeZone, Utc};
use hmac::{Hmac, Mac};
use reqwest::{Client, Method, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha256;
use std::time::Duration;

use super::f64_from_string_or_number;
use crate::config::ApiCredentials;
use crate::error::BotError;
use crate::models::{Candle, Side};

type HmacSha256 = Hmac<Sha256>;

const REQUEST_TIMEOUT_SECS: u64 = 15;
const USER_AGENT: &str = "derivbot-rest-client";

/// Client for the Delta Exchange REST API
#[derive(Clone)]
pub struct DeltaClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    api_secret: Option<String>,
}

// ============== Response Types ==============

/// `{"success": bool, "result": ..., "error": ...}`
#[derive(Debug, Deserialize)]
struct DeltaEnvelope<T> {
    success: bool,
    result: Option<T>,
    #[serde(default)]
    error: Option<DeltaErrorBody>,
}

#[derive(Debug, Deserialize)]
struct DeltaErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    context: Option<Value>,
}

impl<T> DeltaEnvelope<T> {
    fn into_result(self) -> Result<T, BotError> {
        if !self.success {
            let (code, message) = match self.error {
                Some(err) => (
                    err.code.unwrap_or_else(|| "unknown".to_string()),
                    err.context.map(|c| c.to_string()).unwrap_or_default(),
                ),
                None => ("unknown".to_string(), String::new()),
            };
            return Err(BotError::api(code, message));
        }

        self.result
            .ok_or_else(|| BotError::Decode("response carried no result".to_string()))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Product {
    pub id: u64,
    pub symbol: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Ticker {
    pub symbol: String,
    #[serde(deserialize_with = "f64_from_string_or_number")]
    pub spot_price: f64,
}

#[derive(Debug, Deserialize)]
struct RawCandle {
    time: i64,
    #[serde(deserialize_with = "f64_from_string_or_number")]
    open: f64,
    #[serde(deserialize_with = "f64_from_string_or_number")]
    high: f64,
    #[serde(deserialize_with = "f64_from_string_or_number")]
    low: f64,
    #[serde(deserialize_with = "f64_from_string_or_number")]
    close: f64,
    #[serde(default)]
    volume: Option<f64>,
}

#[derive(Debug, Serialize)]
struct OrderRequest<'a> {
    product_id: u64,
    size: u32,
    side: &'a str,
    order_type: &'a str,
}

/// Exchange acknowledgement of a placed order
#[derive(Debug, Clone, Deserialize)]
pub struct OrderAck {
    pub id: u64,
    #[serde(default)]
    pub size: u32,
    #[serde(default)]
    pub side: String,
}

// ============== Implementation ==============

impl DeltaClient {
    pub fn new(credentials: ApiCredentials) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: credentials.base_url.trim_end_matches('/').to_string(),
            api_key: credentials.api_key,
            api_secret: credentials.api_secret,
        }
    }

    /// `hex(HMAC_SHA256(secret, method + timestamp + path + query + body))`
    fn sign(secret: &str, method: &str, timestamp: &str, path: &str, query: &str, body: &str) -> Result<String, BotError> {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| BotError::Credentials(format!("invalid API secret: {}", e)))?;
        mac.update(method.as_bytes());
        mac.update(timestamp.as_bytes());
        mac.update(path.as_bytes());
        mac.update(query.as_bytes());
        mac.update(body.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &str,
        body: Option<String>,
        authenticated: bool,
    ) -> Result<T, BotError> {
        let url = format!("{}{}{}", self.base_url, path, query);
        tracing::debug!("{} {}", method, url);

        let mut request = self
            .client
            .request(method.clone(), &url)
            .header("User-Agent", USER_AGENT)
            .header("Accept", "application/json");

        if authenticated {
            let (Some(api_key), Some(api_secret)) = (&self.api_key, &self.api_secret) else {
                return Err(BotError::Credentials("Delta API key/secret not set".to_string()));
            };
            let timestamp = Utc::now().timestamp().to_string();
            let signature = Self::sign(
                api_secret,
                method.as_str(),
                &timestamp,
                path,
                query,
                body.as_deref().unwrap_or(""),
            )?;
            request = request
                .header("api-key", api_key)
                .header("timestamp", timestamp)
                .header("signature", signature);
        }

        if let Some(body) = body {
            request = request
                .header("Content-Type", "application/json")
                .body(body);
        }

        let response = request.send().await?;
        read_envelope(response).await
    }

    /// Endpoint: GET /v2/products/{symbol}
    pub async fn get_product(&self, symbol: &str) -> Result<Product, BotError> {
        self.request(Method::GET, &format!("/v2/products/{}", symbol), "", None, false)
            .await
    }

    /// Endpoint: GET /v2/tickers/{symbol}
    pub async fn get_ticker(&self, symbol: &str) -> Result<Ticker, BotError> {
        self.request(Method::GET, &format!("/v2/tickers/{}", symbol), "", None, false)
            .await
    }

    /// Spot price of the symbol's underlying
    pub async fn spot_price(&self, symbol: &str) -> Result<f64, BotError> {
        Ok(self.get_ticker(symbol).await?.spot_price)
    }

    /// Historical OHLC candles, returned oldest first
    /// Endpoint: GET /v2/history/candles?resolution=..&symbol=..&start=..&end=..
    pub async fn get_history_candles(
        &self,
        symbol: &str,
        resolution: &str,
        start: i64,
        end: i64,
    ) -> Result<Vec<Candle>, BotError> {
        let query = format!(
            "?resolution={}&symbol={}&start={}&end={}",
            resolution, symbol, start, end
        );
        let raw: Vec<RawCandle> = self
            .request(Method::GET, "/v2/history/candles", &query, None, false)
            .await?;

        let mut candles: Vec<Candle> = raw
            .into_iter()
            .filter_map(|c| {
                let timestamp = Utc.timestamp_opt(c.time, 0).single()?;
                Some(Candle {
                    timestamp,
                    open: c.open,
                    high: c.high,
                    low: c.low,
                    close: c.close,
                    volume: c.volume.unwrap_or_default(),
                })
            })
            .collect();
        candles.sort_by_key(|c| c.timestamp);

        Ok(candles)
    }

    /// Place a market order
    /// Endpoint: POST /v2/orders (signed)
    pub async fn place_market_order(&self, product_id: u64, side: Side, size: u32) -> Result<OrderAck, BotError> {
        let request = OrderRequest {
            product_id,
            size,
            side: side.as_str(),
            order_type: "market_order",
        };
        let body = serde_json::to_string(&request)?;

        self.request(Method::POST, "/v2/orders", "", Some(body), true)
            .await
    }
}

async fn read_envelope<T: DeserializeOwned>(response: Response) -> Result<T, BotError> {
    let status = response.status();
    let text = response.text().await?;

    match serde_json::from_str::<DeltaEnvelope<T>>(&text) {
        Ok(envelope) => envelope.into_result(),
        Err(_) if !status.is_success() => Err(BotError::api(status.as_u16().to_string(), text)),
        Err(e) => Err(e.into()),
    }
}
