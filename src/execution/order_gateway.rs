use async_trait::async_trait;
use uuid::Uuid;

use crate::api::DeltaClient;
use crate::error::BotError;
use crate::models::{Side, TradingMode};

/// Places market orders for the trend bot's single product
#[async_trait]
pub trait OrderGateway: Send + Sync {
    /// Returns the exchange (or synthetic) order id
    async fn place_market_order(&self, side: Side, size: u32) -> Result<String, BotError>;

    fn mode(&self) -> TradingMode;
}

#[async_trait]
impl<T: OrderGateway + ?Sized> OrderGateway for Box<T> {
    async fn place_market_order(&self, side: Side, size: u32) -> Result<String, BotError> {
        (**self).place_market_order(side, size).await
    }

    fn mode(&self) -> TradingMode {
        (**self).mode()
    }
}

/// Test mode: nothing leaves the process, every order "fills" immediately
#[derive(Debug, Clone, Default)]
pub struct SimulatedGateway;

#[async_trait]
impl OrderGateway for SimulatedGateway {
    async fn place_market_order(&self, side: Side, size: u32) -> Result<String, BotError> {
        let order_id = format!("test_{}_{}", side, Uuid::new_v4().simple());
        tracing::info!(side = %side, size, order_id = %order_id, "[TEST MODE] Simulated market order");
        Ok(order_id)
    }

    fn mode(&self) -> TradingMode {
        TradingMode::Test
    }
}

/// Prod mode: market orders on Delta Exchange
#[derive(Clone)]
pub struct DeltaGateway {
    client: DeltaClient,
    product_id: u64,
}

impl DeltaGateway {
    pub fn new(client: DeltaClient, product_id: u64) -> Self {
        Self { client, product_id }
    }
}

#[async_trait]
impl OrderGateway for DeltaGateway {
    async fn place_market_order(&self, side: Side, size: u32) -> Result<String, BotError> {
        match self.client.place_market_order(self.product_id, side, size).await {
            Ok(ack) => {
                tracing::info!(
                    order_id = ack.id,
                    side = %ack.side,
                    size = ack.size,
                    "[PROD MODE] Order placed successfully"
                );
                Ok(ack.id.to_string())
            }
            Err(e) => {
                tracing::error!("[PROD MODE] Order placement failed: {}", e);
                Err(e)
            }
        }
    }

    fn mode(&self) -> TradingMode {
        TradingMode::Prod
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiCredentials;

    #[test]
    fn test_simulated_ids_are_unique_and_tagged() {
        let gateway = SimulatedGateway;
        let a = tokio_test::block_on(gateway.place_market_order(Side::Buy, 1)).unwrap();
        let b = tokio_test::block_on(gateway.place_market_order(Side::Buy, 1)).unwrap();

        assert!(a.starts_with("test_buy_"));
        assert_ne!(a, b);
        assert_eq!(gateway.mode(), TradingMode::Test);
    }

    #[tokio::test]
    async fn test_delta_gateway_returns_exchange_id() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v2/orders")
            .with_status(200)
            .with_body(r#"{"success":true,"result":{"id":4242,"size":1,"side":"sell"}}"#)
            .create_async()
            .await;

        let client = DeltaClient::new(ApiCredentials {
            api_key: Some("key".to_string()),
            api_secret: Some("secret".to_string()),
            base_url: server.url(),
        });
        let gateway = DeltaGateway::new(client, 27);

        let order_id = gateway.place_market_order(Side::Sell, 1).await.unwrap();
        assert_eq!(order_id, "4242");
        assert_eq!(gateway.mode(), TradingMode::Prod);
    }
}
