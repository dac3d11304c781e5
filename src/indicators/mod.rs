// Technical indicators module
// ATR and the Supertrend built on top of it

pub mod atr;
pub mod supertrend;

pub use atr::{calculate_atr, calculate_atr_series};
pub use supertrend::calculate_supertrend;
