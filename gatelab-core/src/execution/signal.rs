//! Signal intent vs. confirmed execution.
//!
//! A `Signal` is what the pipeline *wants*; anyone can build one. An
//! `ExecutedTrade` is what the position manager *did*; only this crate can
//! build one, and cross-bar component state accepts nothing else.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::{PositionSide, SignalId, TradeId};

/// An allowed, directional decision on its way to the position manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub signal_id: SignalId,
    pub symbol: String,
    pub bar_index: usize,
    pub timestamp: NaiveDateTime,
    pub side: PositionSide,
    /// Aggregate pipeline confidence.
    pub confidence: f64,
    /// Raw model confidence from the context.
    pub model_confidence: f64,
}

/// Proof that the position manager opened a position.
///
/// Fields are private and the constructor is crate-private: outside this
/// crate an `ExecutedTrade` can only be obtained from an `ExecutionOutcome`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutedTrade {
    signal_id: SignalId,
    trade_id: TradeId,
    symbol: String,
    bar_index: usize,
    side: PositionSide,
    fill_price: f64,
    quantity: f64,
    fee: f64,
}

impl ExecutedTrade {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        signal_id: SignalId,
        trade_id: TradeId,
        symbol: impl Into<String>,
        bar_index: usize,
        side: PositionSide,
        fill_price: f64,
        quantity: f64,
        fee: f64,
    ) -> Self {
        Self {
            signal_id,
            trade_id,
            symbol: symbol.into(),
            bar_index,
            side,
            fill_price,
            quantity,
            fee,
        }
    }

    pub fn signal_id(&self) -> SignalId {
        self.signal_id
    }

    pub fn trade_id(&self) -> TradeId {
        self.trade_id
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn bar_index(&self) -> usize {
        self.bar_index
    }

    pub fn side(&self) -> PositionSide {
        self.side
    }

    pub fn fill_price(&self) -> f64 {
        self.fill_price
    }

    pub fn quantity(&self) -> f64 {
        self.quantity
    }

    pub fn fee(&self) -> f64 {
        self.fee
    }
}

/// Why the position manager declined a signal. A normal outcome, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectReason {
    /// Same-side position already open (no stacking).
    PositionAlreadyOpen,
    /// Opposite-side position open and not closed first.
    OppositePositionOpen,
    /// Size was zero, negative, or rounded to zero by the lot size.
    ZeroSize,
    /// Notional plus fees exceeds available cash.
    InsufficientCapital,
    /// Reference price was not a positive finite number.
    InvalidPrice,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::PositionAlreadyOpen => "POSITION_ALREADY_OPEN",
            Self::OppositePositionOpen => "OPPOSITE_POSITION_OPEN",
            Self::ZeroSize => "ZERO_SIZE",
            Self::InsufficientCapital => "INSUFFICIENT_CAPITAL",
            Self::InvalidPrice => "INVALID_PRICE",
        };
        write!(f, "{s}")
    }
}

/// The position manager's answer. `Executed` is the single source of truth
/// for whether cross-bar state may advance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ExecutionOutcome {
    Executed(ExecutedTrade),
    Rejected(RejectReason),
}

impl ExecutionOutcome {
    pub fn is_executed(&self) -> bool {
        matches!(self, Self::Executed(_))
    }

    pub fn executed(&self) -> Option<&ExecutedTrade> {
        match self {
            Self::Executed(trade) => Some(trade),
            Self::Rejected(_) => None,
        }
    }

    pub fn reject_reason(&self) -> Option<RejectReason> {
        match self {
            Self::Executed(_) => None,
            Self::Rejected(reason) => Some(*reason),
        }
    }
}

// ─── Per-signal state machine ────────────────────────────────────────

/// `SignalEvaluated → Sized → ExecutionAttempted → {Executed | Rejected}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStage {
    SignalEvaluated,
    Sized,
    ExecutionAttempted,
    Executed,
    Rejected,
}

impl ExecutionStage {
    pub fn can_advance_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::SignalEvaluated, Self::Sized)
                | (Self::Sized, Self::ExecutionAttempted)
                | (Self::ExecutionAttempted, Self::Executed)
                | (Self::ExecutionAttempted, Self::Rejected)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Executed | Self::Rejected)
    }
}

/// Tracks one signal through the execution stages.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalLifecycle {
    signal_id: SignalId,
    stage: ExecutionStage,
}

impl SignalLifecycle {
    pub fn new(signal_id: SignalId) -> Self {
        Self {
            signal_id,
            stage: ExecutionStage::SignalEvaluated,
        }
    }

    /// Move to `next`, or report the illegal transition.
    pub fn advance(&mut self, next: ExecutionStage) -> Result<(), (ExecutionStage, ExecutionStage)> {
        if !self.stage.can_advance_to(next) {
            return Err((self.stage, next));
        }
        tracing::trace!(signal = %self.signal_id, from = ?self.stage, to = ?next, "signal stage");
        self.stage = next;
        Ok(())
    }

    pub fn stage(&self) -> ExecutionStage {
        self.stage
    }

    pub fn signal_id(&self) -> SignalId {
        self.signal_id
    }
}
