use chrono::{Duration, TimeZone, Utc};
use derivbot::api::DeltaClient;
use derivbot::config::{ApiCredentials, TimeframeSpec};
use derivbot::execution::{
    IndicatorParams, Pipeline, SignalAction, SignalEvaluator, SimulatedGateway, TickOutcome, TimeframeState,
    TrendEngine,
};
use derivbot::models::PositionDirection;
use serde_json::json;

const START: i64 = 1_717_200_000; // 2024-06-01 00:00:00 UTC

/// Thirty falling 3-minute candles, newest first as the exchange may send them
fn falling_history() -> String {
    let candles: Vec<_> = (0..30)
        .rev()
        .map(|i| {
            let close = 200.0 - i as f64 * 2.0;
            json!({
                "time": START + 180 * i,
                "open": close + 1.0,
                "high": close + 1.5,
                "low": close - 1.5,
                "close": close,
                "volume": 3
            })
        })
        .collect();
    json!({ "success": true, "result": candles }).to_string()
}

#[tokio::test]
async fn test_bootstrap_enter_and_stop_out() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/v2/history/candles")
        .match_query(mockito::Matcher::Any)
        .with_status(200)
        .with_body(falling_history())
        .create_async()
        .await;

    let client = DeltaClient::new(ApiCredentials {
        api_key: None,
        api_secret: None,
        base_url: server.url(),
    });
    let spec = TimeframeSpec::new("3min", "3m", 180);
    let history = client
        .get_history_candles("BTCUSD", &spec.resolution, START, START + 30 * 180)
        .await
        .unwrap();

    let state = TimeframeState::from_history(spec, IndicatorParams::default(), 250, history).unwrap();
    assert_eq!(state.sealed_count(), 29);
    assert_eq!(state.current_price(), 142.0);

    let mut engine = TrendEngine::new(Pipeline::new(vec![state]), SignalEvaluator::new(1), SimulatedGateway);
    let t0 = Utc.timestamp_opt(START, 0).unwrap();

    // Intra-candle tick: nothing sealed, nothing traded
    let outcomes = engine.on_tick(143.0, t0 + Duration::seconds(29 * 180 + 60)).await;
    assert!(outcomes.is_empty());
    assert_eq!(engine.pipeline().timeframes()[0].sealed_count(), 29);

    // Boundary tick well above the downtrend line: long entry
    let outcomes = engine.on_tick(170.0, t0 + Duration::seconds(30 * 180)).await;
    assert!(matches!(
        &outcomes[..],
        [TickOutcome::Filled { action: SignalAction::Enter { direction: PositionDirection::Long, .. }, .. }]
    ));
    let position = engine.pipeline().timeframes()[0].position().cloned().unwrap();
    // Down configuration carries no lower band, so the signal candle's low is the stop
    assert_eq!(position.stop_loss, 140.5);

    // Next close below the stop: flat again
    let outcomes = engine.on_tick(139.0, t0 + Duration::seconds(31 * 180)).await;
    assert!(matches!(
        &outcomes[..],
        [TickOutcome::Filled { action: SignalAction::StopOut { direction: PositionDirection::Long, .. }, .. }]
    ));
    assert!(engine.pipeline().timeframes()[0].position().is_none());
}
