use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use super::{string_or_number, BrokerPosition, OptionChainRow, OptionsBroker};
use crate::config::DhanCredentials;
use crate::error::BotError;
use crate::models::{OrderStatus, Side};

// Market feed allows 1 request/second, option chain 1 unique request per 3 seconds
const OPTION_CHAIN_PERIOD_SECS: u64 = 3;
const REQUEST_TIMEOUT_SECS: u64 = 15;

type DhanRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Index the straddles are written on, plus the segment its options trade in
#[derive(Debug, Clone)]
pub struct Underlying {
    pub security_id: u64,
    /// Segment of the index itself, e.g. `IDX_I`
    pub segment: String,
    /// Segment of its options, e.g. `BSE_FNO`
    pub options_segment: String,
}

impl Underlying {
    pub fn sensex() -> Self {
        Self {
            security_id: 51,
            segment: "IDX_I".to_string(),
            options_segment: "BSE_FNO".to_string(),
        }
    }
}

/// Client for the Dhan v2 trading API
#[derive(Clone)]
pub struct DhanClient {
    client: Client,
    base_url: String,
    client_id: String,
    access_token: String,
    underlying: Underlying,
    quote_limiter: Arc<DhanRateLimiter>,
    chain_limiter: Arc<DhanRateLimiter>,
}

// ============== Response Types ==============

/// `{"status": "success", "data": ...}` wrapper used by market data endpoints
#[derive(Debug, Deserialize)]
struct DhanEnvelope<T> {
    #[serde(default)]
    status: Option<String>,
    data: Option<T>,
    #[serde(default)]
    remarks: Option<Value>,
}

impl<T> DhanEnvelope<T> {
    fn into_result(self) -> Result<T, BotError> {
        let ok = self
            .status
            .as_deref()
            .map(|s| s.eq_ignore_ascii_case("success"))
            .unwrap_or(true);

        match (ok, self.data) {
            (true, Some(data)) => Ok(data),
            (true, None) => Err(BotError::Decode("response carried no data".to_string())),
            (false, _) => Err(BotError::api(
                self.status.unwrap_or_default(),
                self.remarks.map(|r| r.to_string()).unwrap_or_default(),
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DhanErrorBody {
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LastPrice {
    last_price: f64,
}

#[derive(Debug, Deserialize)]
struct OptionChainData {
    oc: HashMap<String, StrikeEntry>,
}

#[derive(Debug, Deserialize)]
struct StrikeEntry {
    ce: Option<OptionLeg>,
    pe: Option<OptionLeg>,
}

#[derive(Debug, Deserialize)]
struct OptionLeg {
    #[serde(default, deserialize_with = "optional_id")]
    security_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OrderRequest<'a> {
    dhan_client_id: &'a str,
    transaction_type: &'a str,
    exchange_segment: &'a str,
    product_type: &'a str,
    order_type: &'a str,
    validity: &'a str,
    security_id: &'a str,
    quantity: u32,
    price: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderAck {
    #[serde(deserialize_with = "string_or_number")]
    order_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderDetail {
    order_status: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OrderDetailResponse {
    One(OrderDetail),
    Many(Vec<OrderDetail>),
}

fn optional_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    struct Wrap(#[serde(deserialize_with = "string_or_number")] String);

    let id = Option::<Wrap>::deserialize(deserializer)?.map(|Wrap(s)| s);
    Ok(id.filter(|s| !s.is_empty() && s != "0"))
}

// ============== Implementation ==============

impl DhanClient {
    pub fn new(credentials: DhanCredentials, underlying: Underlying) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| Client::new());

        let quote_quota = Quota::per_second(NonZeroU32::MIN);
        let chain_quota = Quota::with_period(Duration::from_secs(OPTION_CHAIN_PERIOD_SECS))
            .unwrap_or(quote_quota);

        Self {
            client,
            base_url: credentials.base_url.trim_end_matches('/').to_string(),
            client_id: credentials.client_id,
            access_token: credentials.access_token,
            underlying,
            quote_limiter: Arc::new(RateLimiter::direct(quote_quota)),
            chain_limiter: Arc::new(RateLimiter::direct(chain_quota)),
        }
    }

    pub fn underlying(&self) -> &Underlying {
        &self.underlying
    }

    async fn post<T: DeserializeOwned>(&self, path: &str, body: &Value) -> Result<T, BotError> {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .header("access-token", &self.access_token)
            .header("client-id", &self.client_id)
            .header("Accept", "application/json")
            .json(body)
            .send()
            .await?;

        read_json(response).await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, BotError> {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .header("access-token", &self.access_token)
            .header("client-id", &self.client_id)
            .header("Accept", "application/json")
            .send()
            .await?;

        read_json(response).await
    }

    /// Last traded price of any instrument via the market feed
    /// Endpoint: POST /marketfeed/ltp with `{"<segment>": [<security id>]}`
    pub async fn last_price(&self, segment: &str, security_id: &str) -> Result<f64, BotError> {
        let numeric_id: u64 = security_id
            .parse()
            .map_err(|_| BotError::MissingData(format!("invalid security id {}", security_id)))?;

        self.quote_limiter.until_ready().await;

        let mut body = serde_json::Map::new();
        body.insert(segment.to_string(), json!([numeric_id]));
        let body = Value::Object(body);
        let envelope: DhanEnvelope<HashMap<String, HashMap<String, LastPrice>>> =
            self.post("/marketfeed/ltp", &body).await?;
        let data = envelope.into_result()?;

        data.get(segment)
            .and_then(|quotes| quotes.get(security_id))
            .map(|quote| quote.last_price)
            .ok_or_else(|| BotError::MissingData(format!("no quote for {} {}", segment, security_id)))
    }

    /// Listed expiries for the underlying, nearest first
    /// Endpoint: POST /optionchain/expirylist
    pub async fn expiry_list(&self) -> Result<Vec<String>, BotError> {
        self.quote_limiter.until_ready().await;

        let body = json!({
            "UnderlyingScrip": self.underlying.security_id,
            "UnderlyingSeg": self.underlying.segment,
        });
        let envelope: DhanEnvelope<Vec<String>> = self.post("/optionchain/expirylist", &body).await?;
        let mut expiries = envelope.into_result()?;
        expiries.sort();
        Ok(expiries)
    }
}

/// Decode a Dhan response, turning non-2xx answers into `BotError::Api`
async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, BotError> {
    let status = response.status();
    let text = response.text().await?;

    if !status.is_success() {
        let (code, message) = match serde_json::from_str::<DhanErrorBody>(&text) {
            Ok(body) => (
                body.error_code.unwrap_or_else(|| status.as_u16().to_string()),
                body.error_message.unwrap_or_else(|| text.clone()),
            ),
            Err(_) => (status.as_u16().to_string(), text.clone()),
        };
        return Err(BotError::api(code, message));
    }

    Ok(serde_json::from_str(&text)?)
}

#[async_trait]
impl OptionsBroker for DhanClient {
    async fn spot_price(&self) -> Result<f64, BotError> {
        let security_id = self.underlying.security_id.to_string();
        self.last_price(&self.underlying.segment, &security_id).await
    }

    async fn option_price(&self, security_id: &str) -> Result<f64, BotError> {
        self.last_price(&self.underlying.options_segment, security_id).await
    }

    async fn nearest_expiry(&self) -> Result<String, BotError> {
        self.expiry_list()
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| BotError::MissingData("no expiries listed".to_string()))
    }

    /// Endpoint: POST /optionchain
    async fn option_chain(&self, expiry: &str) -> Result<Vec<OptionChainRow>, BotError> {
        self.chain_limiter.until_ready().await;

        let body = json!({
            "UnderlyingScrip": self.underlying.security_id,
            "UnderlyingSeg": self.underlying.segment,
            "Expiry": expiry,
        });
        let envelope: DhanEnvelope<OptionChainData> = self.post("/optionchain", &body).await?;
        let chain = envelope.into_result()?;

        let mut rows: Vec<OptionChainRow> = chain
            .oc
            .into_iter()
            .filter_map(|(strike, entry)| {
                let strike: f64 = strike.parse().ok()?;
                Some(OptionChainRow {
                    strike,
                    call_security_id: entry.ce.and_then(|leg| leg.security_id),
                    put_security_id: entry.pe.and_then(|leg| leg.security_id),
                })
            })
            .collect();
        rows.sort_by(|a, b| a.strike.total_cmp(&b.strike));

        tracing::debug!("Option chain for {}: {} strikes", expiry, rows.len());
        Ok(rows)
    }

    /// Endpoint: POST /orders
    async fn place_order(&self, security_id: &str, side: Side, quantity: u32) -> Result<String, BotError> {
        let transaction_type = match side {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        };
        let request = OrderRequest {
            dhan_client_id: &self.client_id,
            transaction_type,
            exchange_segment: &self.underlying.options_segment,
            product_type: "MARGIN",
            order_type: "MARKET",
            validity: "DAY",
            security_id,
            quantity,
            price: 0.0,
        };

        let body = serde_json::to_value(&request)?;
        let ack: OrderAck = self.post("/orders", &body).await?;

        tracing::info!(
            security_id = %security_id,
            side = %side,
            quantity,
            order_id = %ack.order_id,
            "Dhan order placed"
        );
        Ok(ack.order_id)
    }

    /// Endpoint: GET /orders/{order-id}
    async fn order_status(&self, order_id: &str) -> Result<OrderStatus, BotError> {
        let response: OrderDetailResponse = self.get(&format!("/orders/{}", order_id)).await?;
        let detail = match response {
            OrderDetailResponse::One(detail) => detail,
            OrderDetailResponse::Many(details) => details
                .into_iter()
                .next()
                .ok_or_else(|| BotError::MissingData(format!("order {} not found", order_id)))?,
        };

        Ok(OrderStatus::from_broker(&detail.order_status))
    }

    /// Endpoint: GET /positions
    async fn positions(&self) -> Result<Vec<BrokerPosition>, BotError> {
        self.get("/positions").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn client_for(server: &mockito::Server) -> DhanClient {
        DhanClient::new(
            DhanCredentials {
                client_id: "1000000001".to_string(),
                access_token: "token".to_string(),
                base_url: server.url(),
            },
            Underlying::sensex(),
        )
    }

    #[tokio::test]
    async fn test_spot_price() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/marketfeed/ltp")
            .match_header("access-token", "token")
            .match_header("client-id", "1000000001")
            .match_body(Matcher::Json(json!({ "IDX_I": [51] })))
            .with_status(200)
            .with_body(r#"{"data":{"IDX_I":{"51":{"last_price":75050.0}}},"status":"success"}"#)
            .create_async()
            .await;

        let price = client_for(&server).spot_price().await.unwrap();

        assert_eq!(price, 75050.0);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_failure_envelope_is_api_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/marketfeed/ltp")
            .with_status(200)
            .with_body(r#"{"status":"failure","remarks":{"error_message":"Invalid segment"}}"#)
            .create_async()
            .await;

        let err = client_for(&server).spot_price().await.unwrap_err();
        assert!(matches!(err, BotError::Api { .. }));
        assert!(err.to_string().contains("Invalid segment"));
    }

    #[tokio::test]
    async fn test_option_chain_rows() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/optionchain")
            .match_body(Matcher::PartialJson(json!({ "Expiry": "2024-10-18" })))
            .with_status(200)
            .with_body(
                r#"{"data":{"last_price":75050.0,"oc":{
                    "75100.000000":{"ce":{"security_id":844301,"last_price":210.5},"pe":{"security_id":844302,"last_price":260.0}},
                    "75000.000000":{"ce":{"security_id":844230,"last_price":250.0},"pe":null}
                }},"status":"success"}"#,
            )
            .create_async()
            .await;

        let rows = client_for(&server).option_chain("2024-10-18").await.unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].strike, 75000.0);
        assert_eq!(rows[0].call_security_id.as_deref(), Some("844230"));
        assert_eq!(rows[0].put_security_id, None);
        assert_eq!(rows[1].put_security_id.as_deref(), Some("844302"));
    }

    #[tokio::test]
    async fn test_nearest_expiry_sorted() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/optionchain/expirylist")
            .with_status(200)
            .with_body(r#"{"data":["2024-10-25","2024-10-18","2024-11-01"],"status":"success"}"#)
            .create_async()
            .await;

        let expiry = client_for(&server).nearest_expiry().await.unwrap();
        assert_eq!(expiry, "2024-10-18");
    }

    #[tokio::test]
    async fn test_place_order_payload() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/orders")
            .match_body(Matcher::PartialJson(json!({
                "dhanClientId": "1000000001",
                "transactionType": "SELL",
                "exchangeSegment": "BSE_FNO",
                "orderType": "MARKET",
                "securityId": "844230",
                "quantity": 20
            })))
            .with_status(200)
            .with_body(r#"{"orderId":"112111182198","orderStatus":"PENDING"}"#)
            .create_async()
            .await;

        let order_id = client_for(&server)
            .place_order("844230", Side::Sell, 20)
            .await
            .unwrap();

        assert_eq!(order_id, "112111182198");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_rejected_order_surfaces_message() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/orders")
            .with_status(400)
            .with_body(r#"{"errorType":"Order_Error","errorCode":"DH-906","errorMessage":"Insufficient margin"}"#)
            .create_async()
            .await;

        let err = client_for(&server)
            .place_order("844230", Side::Sell, 20)
            .await
            .unwrap_err();

        match err {
            BotError::Api { code, message } => {
                assert_eq!(code, "DH-906");
                assert_eq!(message, "Insufficient margin");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_order_status_accepts_list() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/orders/112111182198")
            .with_status(200)
            .with_body(r#"[{"orderId":"112111182198","orderStatus":"TRADED"}]"#)
            .create_async()
            .await;

        let status = client_for(&server).order_status("112111182198").await.unwrap();
        assert_eq!(status, OrderStatus::Executed);
    }

    #[tokio::test]
    async fn test_positions() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/positions")
            .with_status(200)
            .with_body(
                r#"[
                    {"securityId":"844230","exchangeSegment":"BSE_FNO","positionType":"SHORT","netQty":-20,"sellAvg":250.0,"buyAvg":0.0},
                    {"securityId":"844231","exchangeSegment":"BSE_FNO","positionType":"CLOSED","netQty":0,"sellAvg":180.0,"buyAvg":175.0}
                ]"#,
            )
            .create_async()
            .await;

        let positions = client_for(&server).positions().await.unwrap();
        assert_eq!(positions.len(), 2);
        assert!(positions[1].is_closed());
    }
}
