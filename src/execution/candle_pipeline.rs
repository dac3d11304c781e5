use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::VecDeque;

use crate::config::TimeframeSpec;
use crate::error::BotError;
use crate::indicators::calculate_supertrend;
use crate::models::{Candle, IndicatorPoint, Position};

/// What a tick did to a timeframe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandleEvent {
    /// Folded into the in-progress candle
    Updated,
    /// Sealed the in-progress candle and opened a new one; indicator recomputed
    Closed,
}

/// Supertrend parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndicatorParams {
    pub period: usize,
    pub multiplier: f64,
}

impl Default for IndicatorParams {
    fn default() -> Self {
        Self {
            period: 8,
            multiplier: 2.0,
        }
    }
}

/// Rolling candle series, indicator and position for one timeframe
#[derive(Debug, Clone)]
pub struct TimeframeState {
    spec: TimeframeSpec,
    params: IndicatorParams,
    max_candles: usize,
    sealed: VecDeque<Candle>,
    open: Candle,
    indicator: Vec<IndicatorPoint>,
    position: Option<Position>,
}

fn floor_to_period(time: DateTime<Utc>, seconds: i64) -> DateTime<Utc> {
    let ts = time.timestamp();
    Utc.timestamp_opt(ts - ts.rem_euclid(seconds.max(1)), 0)
        .single()
        .unwrap_or(time)
}

impl TimeframeState {
    /// Start from an opening candle with no history
    pub fn new(spec: TimeframeSpec, params: IndicatorParams, max_candles: usize, open: Candle) -> Self {
        Self {
            spec,
            params,
            max_candles: max_candles.max(1),
            sealed: VecDeque::new(),
            open,
            indicator: Vec::new(),
            position: None,
        }
    }

    /// Seed from exchange history: every candle but the newest is sealed, the
    /// newest becomes the in-progress candle
    pub fn from_history(
        spec: TimeframeSpec,
        params: IndicatorParams,
        max_candles: usize,
        mut history: Vec<Candle>,
    ) -> Result<Self, BotError> {
        history.sort_by_key(|c| c.timestamp);
        let open = history
            .pop()
            .ok_or_else(|| BotError::MissingData(format!("no historical candles for {}", spec.name)))?;

        let mut state = Self::new(spec, params, max_candles, open);
        state.sealed.extend(history);
        state.trim();
        state.recompute_indicator();
        Ok(state)
    }

    /// Feed a price tick.
    ///
    /// A tick at or past the end of the open candle's period seals it and
    /// opens exactly one new candle anchored at the tick's period, even if
    /// several periods elapsed since the last tick. Those skipped periods are
    /// lost rather than back-filled, so the series drifts from the exchange's
    /// own candles after a stall.
    pub fn update(&mut self, price: f64, time: DateTime<Utc>) -> CandleEvent {
        let period = Duration::seconds(self.spec.seconds);
        let period_end = self.open.timestamp + period;

        if time < period_end {
            self.open.absorb(price);
            return CandleEvent::Updated;
        }

        let skipped = (time - period_end).num_seconds() / self.spec.seconds.max(1);
        if skipped > 0 {
            tracing::warn!(
                timeframe = %self.spec.name,
                skipped,
                "Periods elapsed without ticks; collapsing gap into a single candle"
            );
        }

        let new_open = Candle::from_tick(floor_to_period(time, self.spec.seconds), price);
        let sealed = std::mem::replace(&mut self.open, new_open);

        tracing::info!(
            timeframe = %self.spec.name,
            close = sealed.close,
            "Candle closed"
        );

        self.sealed.push_back(sealed);
        self.trim();
        self.recompute_indicator();

        CandleEvent::Closed
    }

    fn trim(&mut self) {
        while self.sealed.len() > self.max_candles {
            self.sealed.pop_front();
        }
    }

    /// Re-run the Supertrend over the whole sealed series
    fn recompute_indicator(&mut self) {
        let candles: Vec<Candle> = self.sealed.iter().cloned().collect();
        self.indicator = calculate_supertrend(&candles, self.params.period, self.params.multiplier);
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn spec(&self) -> &TimeframeSpec {
        &self.spec
    }

    pub fn sealed_count(&self) -> usize {
        self.sealed.len()
    }

    pub fn sealed(&self) -> impl Iterator<Item = &Candle> {
        self.sealed.iter()
    }

    pub fn last_sealed(&self) -> Option<&Candle> {
        self.sealed.back()
    }

    pub fn open_candle(&self) -> &Candle {
        &self.open
    }

    /// Close of the in-progress candle
    pub fn current_price(&self) -> f64 {
        self.open.close
    }

    /// Indicator point of the latest sealed candle
    pub fn latest_indicator(&self) -> Option<&IndicatorPoint> {
        self.indicator.last()
    }

    pub fn indicator(&self) -> &[IndicatorPoint] {
        &self.indicator
    }

    pub fn position(&self) -> Option<&Position> {
        self.position.as_ref()
    }

    pub(crate) fn set_position(&mut self, position: Option<Position>) {
        self.position = position;
    }
}

/// All timeframes the trend bot follows. Created at startup, mutated only by
/// ticks and by the signal evaluator, dropped at exit.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    timeframes: Vec<TimeframeState>,
}

impl Pipeline {
    pub fn new(timeframes: Vec<TimeframeState>) -> Self {
        Self { timeframes }
    }

    /// Feed one tick to every timeframe, returning the indexes whose candle closed
    pub fn on_tick(&mut self, price: f64, time: DateTime<Utc>) -> Vec<usize> {
        self.timeframes
            .iter_mut()
            .enumerate()
            .filter_map(|(i, tf)| (tf.update(price, time) == CandleEvent::Closed).then_some(i))
            .collect()
    }

    pub fn timeframes(&self) -> &[TimeframeState] {
        &self.timeframes
    }

    pub fn timeframe_mut(&mut self, index: usize) -> Option<&mut TimeframeState> {
        self.timeframes.get_mut(index)
    }
}
