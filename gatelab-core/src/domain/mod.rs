//! Domain types shared by the pipeline, the executor and the position manager.

pub mod bar;
pub mod ids;
pub mod position;
pub mod trade;

pub use bar::{Bar, BarError, MarketData};
pub use ids::{ConfigHash, FullHash, IdGen, LedgerHash, SignalId, TradeId};
pub use position::{Position, PositionSide};
pub use trade::{ExitReason, TradeRecord};
