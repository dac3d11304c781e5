// Short straddle management on index options
pub mod console;
pub mod manager;
pub mod monitor;
pub mod strikes;

#[cfg(test)]
mod fake_broker;

pub use console::{ManageCommand, SetupCommand};
pub use manager::{RollDirection, Straddle, StraddleManager};
pub use monitor::{LegPnl, PositionMonitor, StraddlePnl};
pub use strikes::{shift_strikes, straddle_strikes};
