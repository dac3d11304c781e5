/// Average True Range (ATR) indicator
///
/// True Range is the greatest of:
/// - Current High - Current Low
/// - Abs(Current High - Previous Close)
/// - Abs(Current Low - Previous Close)
///
/// Smoothed with Wilder's moving average.

use crate::models::Candle;

/// True range of `candles[i]` against the previous close; `None` for the first candle
fn true_range(candles: &[Candle], i: usize) -> Option<f64> {
    if i == 0 {
        return None;
    }

    let high = candles[i].high;
    let low = candles[i].low;
    let prev_close = candles[i - 1].close;

    Some(
        (high - low)
            .max((high - prev_close).abs())
            .max((low - prev_close).abs()),
    )
}

/// ATR aligned with the input: `None` until index `period`, then one value per candle
pub fn calculate_atr_series(candles: &[Candle], period: usize) -> Vec<Option<f64>> {
    let mut series = vec![None; candles.len()];
    if period == 0 || candles.len() < period + 1 {
        return series;
    }

    // First ATR is the simple average of the first `period` true ranges
    let first: f64 = (1..=period).filter_map(|i| true_range(candles, i)).sum::<f64>() / period as f64;
    series[period] = Some(first);

    let mut atr = first;
    for i in (period + 1)..candles.len() {
        let tr = true_range(candles, i).unwrap_or_default();
        atr = (atr * (period as f64 - 1.0) + tr) / period as f64;
        series[i] = Some(atr);
    }

    series
}

/// Latest ATR value, or None if insufficient data
pub fn calculate_atr(candles: &[Candle], period: usize) -> Option<f64> {
    calculate_atr_series(candles, period).last().copied().flatten()
}
