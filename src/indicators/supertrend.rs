/// Supertrend indicator
///
/// Bands sit `multiplier * ATR` above and below the candle midpoint. The upper
/// band may only ratchet down and the lower band only up, unless the previous
/// close broke through them. While price closes above the active band the
/// trend is up and the lower band is the trend line; otherwise the trend is
/// down and the upper band is the trend line.

use super::atr::calculate_atr_series;
use crate::models::{Candle, IndicatorPoint, TrendDirection};

/// Compute one indicator point per candle. The first `period` points are warm-up.
pub fn calculate_supertrend(candles: &[Candle], period: usize, multiplier: f64) -> Vec<IndicatorPoint> {
    let atr_series = calculate_atr_series(candles, period);

    let mut points = Vec::with_capacity(candles.len());
    let mut upper_band = f64::MAX;
    let mut lower_band = f64::MIN;
    let mut is_bullish = true;

    for (i, candle) in candles.iter().enumerate() {
        let Some(atr) = atr_series[i] else {
            points.push(IndicatorPoint {
                timestamp: candle.timestamp,
                trend_value: None,
                upper_band: None,
                lower_band: None,
                direction: None,
            });
            continue;
        };

        let mid = (candle.high + candle.low) / 2.0;
        let upper_eval = mid + multiplier * atr;
        let lower_eval = mid - multiplier * atr;
        let prev_close = candles[i - 1].close;

        if i == period {
            is_bullish = candle.close >= mid;
            upper_band = upper_eval;
            lower_band = lower_eval;
        }

        if upper_eval < upper_band || prev_close > upper_band {
            upper_band = upper_eval;
        }
        if lower_eval > lower_band || prev_close < lower_band {
            lower_band = lower_eval;
        }

        let active = if is_bullish { lower_band } else { upper_band };
        let point = if candle.close <= active {
            is_bullish = false;
            IndicatorPoint {
                timestamp: candle.timestamp,
                trend_value: Some(upper_band),
                upper_band: Some(upper_band),
                lower_band: None,
                direction: Some(TrendDirection::Down),
            }
        } else {
            is_bullish = true;
            IndicatorPoint {
                timestamp: candle.timestamp,
                trend_value: Some(lower_band),
                upper_band: None,
                lower_band: Some(lower_band),
                direction: Some(TrendDirection::Up),
            }
        };
        points.push(point);
    }

    points
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn candles_from_closes(closes: &[f64]) -> Vec<Candle> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Candle {
                timestamp: start + Duration::minutes(3 * i as i64),
                open: close,
                high: close + 1.0,
                low: close - 1.0,
                close,
                volume: 0.0,
            })
            .collect()
    }

    #[test]
    fn test_warmup_points_are_empty() {
        let candles = candles_from_closes(&[100.0; 12]);
        let points = calculate_supertrend(&candles, 8, 2.0);

        assert_eq!(points.len(), 12);
        assert!(points[..8].iter().all(|p| p.trend_value.is_none() && p.direction.is_none()));
        assert!(points[8..].iter().all(|p| p.trend_value.is_some()));
    }

    #[test]
    fn test_rising_market_is_uptrend() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + i as f64 * 2.0).collect();
        let points = calculate_supertrend(&candles_from_closes(&closes), 8, 2.0);

        let last = points.last().unwrap();
        assert_eq!(last.direction, Some(TrendDirection::Up));
        assert!(last.lower_band.is_some());
        assert!(last.upper_band.is_none());
        assert!(last.trend_value.unwrap() < closes[29]);
    }

    #[test]
    fn test_falling_market_is_downtrend() {
        let closes: Vec<f64> = (0..30).map(|i| 200.0 - i as f64 * 2.0).collect();
        let points = calculate_supertrend(&candles_from_closes(&closes), 8, 2.0);

        let last = points.last().unwrap();
        assert_eq!(last.direction, Some(TrendDirection::Down));
        assert!(last.upper_band.is_some());
        assert!(last.lower_band.is_none());
        assert!(last.trend_value.unwrap() > closes[29]);
    }

    #[test]
    fn test_reversal_flips_direction() {
        let mut closes: Vec<f64> = (0..25).map(|i| 100.0 + i as f64 * 2.0).collect();
        closes.extend((0..15).map(|i| 146.0 - i as f64 * 6.0));
        let points = calculate_supertrend(&candles_from_closes(&closes), 8, 2.0);

        assert_eq!(points[24].direction, Some(TrendDirection::Up));
        assert_eq!(points.last().unwrap().direction, Some(TrendDirection::Down));
    }

    #[test]
    fn test_lower_band_never_decreases_in_uptrend() {
        let closes: Vec<f64> = (0..40).map(|i| 100.0 + i as f64).collect();
        let points = calculate_supertrend(&candles_from_closes(&closes), 8, 2.0);

        let bands: Vec<f64> = points.iter().filter_map(|p| p.lower_band).collect();
        assert!(bands.windows(2).all(|w| w[1] >= w[0]));
    }
}
