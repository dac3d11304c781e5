use std::sync::Arc;

use crate::api::{OptionChainRow, OptionsBroker};
use crate::error::BotError;
use crate::models::{OptionType, Side, TradingMode};

/// A short call and a short put at one strike, tracked as a unit
#[derive(Debug, Clone, PartialEq)]
pub struct Straddle {
    pub strike: i64,
    pub call_security_id: String,
    pub put_security_id: String,
    pub call_order_id: String,
    pub put_order_id: String,
}

impl Straddle {
    pub fn order_ids(&self) -> [&str; 2] {
        [&self.call_order_id, &self.put_order_id]
    }
}

/// Which extreme straddle a roll replaces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollDirection {
    /// Move top: drop the highest strike, open one step below the lowest
    Up,
    /// Move bottom: drop the lowest strike, open one step above the highest
    Down,
}

/// Opens, closes and rolls short straddles through an options broker
pub struct StraddleManager<B: OptionsBroker> {
    broker: Arc<B>,
    mode: TradingMode,
    quantity: u32,
    step: i64,
}

fn find_leg(chain: &[OptionChainRow], strike: i64, option_type: OptionType) -> Option<String> {
    chain
        .iter()
        .find(|row| (row.strike - strike as f64).abs() < 1e-6)
        .and_then(|row| match option_type {
            OptionType::Call => row.call_security_id.clone(),
            OptionType::Put => row.put_security_id.clone(),
        })
}

impl<B: OptionsBroker> StraddleManager<B> {
    pub fn new(broker: Arc<B>, mode: TradingMode, quantity: u32, step: i64) -> Self {
        Self {
            broker,
            mode,
            quantity,
            step,
        }
    }

    pub fn mode(&self) -> TradingMode {
        self.mode
    }

    pub fn step(&self) -> i64 {
        self.step
    }

    async fn load_chain(&self) -> Result<Vec<OptionChainRow>, BotError> {
        let expiry = self.broker.nearest_expiry().await?;
        tracing::info!("Using nearest expiry {}", expiry);
        self.broker.option_chain(&expiry).await
    }

    /// Open one straddle at `strike` on the nearest expiry
    pub async fn open(&self, strike: i64) -> Result<Straddle, BotError> {
        let chain = self.load_chain().await?;
        self.open_from_chain(strike, &chain).await
    }

    /// Open a straddle at each strike, keeping whichever succeed
    pub async fn fire(&self, strikes: &[i64]) -> Result<Vec<Straddle>, BotError> {
        let chain = self.load_chain().await?;
        let mut opened = Vec::with_capacity(strikes.len());

        for &strike in strikes {
            match self.open_from_chain(strike, &chain).await {
                Ok(straddle) => opened.push(straddle),
                Err(e) => tracing::error!("❌ Failed to open straddle at {}: {}", strike, e),
            }
        }

        opened.sort_by_key(|s| s.strike);
        Ok(opened)
    }

    async fn open_from_chain(&self, strike: i64, chain: &[OptionChainRow]) -> Result<Straddle, BotError> {
        let call_security_id = find_leg(chain, strike, OptionType::Call)
            .ok_or_else(|| BotError::MissingData(format!("no {} option at strike {}", OptionType::Call, strike)))?;
        let put_security_id = find_leg(chain, strike, OptionType::Put)
            .ok_or_else(|| BotError::MissingData(format!("no {} option at strike {}", OptionType::Put, strike)))?;

        if !self.mode.is_live() {
            tracing::info!(
                "[TEST MODE] Would sell {} x {} CE ({}) and {} PE ({})",
                self.quantity,
                strike,
                call_security_id,
                strike,
                put_security_id
            );
            return Ok(Straddle {
                strike,
                call_order_id: format!("test_ce_{strike}"),
                put_order_id: format!("test_pe_{strike}"),
                call_security_id,
                put_security_id,
            });
        }

        let (call_order_id, put_order_id) = self
            .place_pair(strike, &call_security_id, &put_security_id, Side::Sell)
            .await?;

        tracing::info!(
            "✅ Opened straddle {} (CE order {}, PE order {})",
            strike,
            call_order_id,
            put_order_id
        );

        Ok(Straddle {
            strike,
            call_security_id,
            put_security_id,
            call_order_id,
            put_order_id,
        })
    }

    /// Place both legs in order; if the put fails, flatten the call that went through
    async fn place_pair(
        &self,
        strike: i64,
        call_security_id: &str,
        put_security_id: &str,
        side: Side,
    ) -> Result<(String, String), BotError> {
        let call_order_id = self.broker.place_order(call_security_id, side, self.quantity).await?;

        match self.broker.place_order(put_security_id, side, self.quantity).await {
            Ok(put_order_id) => Ok((call_order_id, put_order_id)),
            Err(e) => {
                tracing::warn!(
                    "⚠️  PE {} leg at {} failed after CE went through ({}); flattening CE",
                    side,
                    strike,
                    e
                );
                if let Err(flatten_err) = self
                    .broker
                    .place_order(call_security_id, side.opposite(), self.quantity)
                    .await
                {
                    tracing::error!(
                        "❌ Could not flatten CE {} at {}: {}. Manual intervention needed",
                        call_security_id,
                        strike,
                        flatten_err
                    );
                }
                Err(BotError::PartialFill(format!(
                    "{} PE at {} failed: {}",
                    side, strike, e
                )))
            }
        }
    }

    /// Buy back both legs. Fills are not verified.
    pub async fn close(&self, straddle: &Straddle) -> Result<(), BotError> {
        if !self.mode.is_live() {
            tracing::info!("[TEST MODE] Would buy back straddle {}", straddle.strike);
            return Ok(());
        }

        self.place_pair(
            straddle.strike,
            &straddle.call_security_id,
            &straddle.put_security_id,
            Side::Buy,
        )
        .await?;

        tracing::info!("✅ Closed straddle {}", straddle.strike);
        Ok(())
    }

    /// Replace the extreme straddle on one side with one beyond the other side.
    ///
    /// Returns the newly opened straddle. On error `tracked` holds the same
    /// strikes it did before the call, unless restoring the removed straddle
    /// also failed (logged).
    pub async fn roll(&self, direction: RollDirection, tracked: &mut Vec<Straddle>) -> Result<Straddle, BotError> {
        if tracked.len() < 3 {
            return Err(BotError::NotEnoughStraddles { tracked: tracked.len() });
        }

        tracked.sort_by_key(|s| s.strike);
        let remove_index = match direction {
            RollDirection::Up => tracked.len() - 1,
            RollDirection::Down => 0,
        };
        let new_strike = match direction {
            RollDirection::Up => tracked[0].strike - self.step,
            RollDirection::Down => tracked[tracked.len() - 1].strike + self.step,
        };

        let removed = tracked[remove_index].clone();
        tracing::info!("🔄 Rolling {:?}: closing {} and opening {}", direction, removed.strike, new_strike);

        self.close(&removed).await?;
        tracked.remove(remove_index);

        let chain = self.load_chain().await;
        let opened = match chain {
            Ok(chain) => self.open_from_chain(new_strike, &chain).await,
            Err(e) => Err(e),
        };

        match opened {
            Ok(straddle) => {
                tracked.push(straddle.clone());
                tracked.sort_by_key(|s| s.strike);
                Ok(straddle)
            }
            Err(e) => {
                tracing::error!("❌ Replacement at {} failed ({}); restoring {}", new_strike, e, removed.strike);
                match self.open(removed.strike).await {
                    Ok(restored) => {
                        tracked.push(restored);
                        tracked.sort_by_key(|s| s.strike);
                    }
                    Err(restore_err) => {
                        tracing::error!("❌ Could not restore straddle {}: {}", removed.strike, restore_err);
                    }
                }
                Err(e)
            }
        }
    }
}
