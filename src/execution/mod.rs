// Order execution and position lifecycle
pub mod control_loop;
pub mod orchestrator;
pub mod position_manager;
pub mod trailing_stop;

pub use control_loop::{BotState, CycleReport, TradingBot};
pub use orchestrator::{
    BracketLevels, ExitOutcome, OrderOrchestrator, OrderSettings, ProtectionOutcome,
    UnprotectedPolicy,
};
pub use position_manager::{Position, PositionManager};
pub use trailing_stop::{TrailOutcome, TrailingSettings, TrailingStopManager};
