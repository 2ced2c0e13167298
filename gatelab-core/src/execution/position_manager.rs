//! Position manager: admission, fills, exits and cash accounting.
//!
//! One position per symbol (no stacking). Entries and exits fill at the bar
//! close with adverse slippage. Fees and realized PnL touch cash only on
//! confirmed fills. Shorts reserve their entry notional as collateral, so
//! equity is `cash + Σ(entry notional + unrealized PnL)` for both sides.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::components::FactoryError;
use crate::domain::{Bar, ExitReason, IdGen, Position, PositionSide, TradeRecord};

use super::fees::{FeeModel, Leg};
use super::signal::{ExecutedTrade, ExecutionOutcome, RejectReason, Signal};

/// When an open position is closed, evaluated on each bar close.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExitPolicy {
    pub max_holding_bars: Option<usize>,
    /// Close when the close-to-entry return falls to `-stop_loss_pct`.
    pub stop_loss_pct: Option<f64>,
    /// Close when the close-to-entry return reaches `take_profit_pct`.
    pub take_profit_pct: Option<f64>,
    /// Close an open position when an allowed signal points the other way.
    pub exit_on_opposite_signal: bool,
}

impl ExitPolicy {
    pub fn validate(&self) -> Result<(), FactoryError> {
        if self.max_holding_bars == Some(0) {
            return Err(invalid("max_holding_bars", 0.0, "an integer >= 1"));
        }
        for (param, value) in [
            ("stop_loss_pct", self.stop_loss_pct),
            ("take_profit_pct", self.take_profit_pct),
        ] {
            if let Some(v) = value {
                if !(v.is_finite() && v > 0.0) {
                    return Err(invalid(param, v, "a finite value > 0"));
                }
            }
        }
        Ok(())
    }

    fn exit_reason(&self, position: &Position, bar_index: usize, close: f64) -> Option<ExitReason> {
        let ret = position.return_pct(close);
        if let Some(sl) = self.stop_loss_pct {
            if ret <= -sl {
                return Some(ExitReason::StopLoss);
            }
        }
        if let Some(tp) = self.take_profit_pct {
            if ret >= tp {
                return Some(ExitReason::TakeProfit);
            }
        }
        if let Some(max) = self.max_holding_bars {
            if position.bars_held(bar_index) >= max {
                return Some(ExitReason::MaxHoldingBars);
            }
        }
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionManagerConfig {
    pub initial_capital: f64,
    #[serde(default)]
    pub fees: FeeModel,
    /// Quantities are floored to a multiple of this; 0 disables rounding.
    #[serde(default)]
    pub lot_size: f64,
    #[serde(default)]
    pub exit: ExitPolicy,
}

impl PositionManagerConfig {
    /// Reject settings that would corrupt the cash ledger: negative fees or
    /// slippage, a negative or non-finite lot size, or degenerate exits.
    pub fn validate(&self) -> Result<(), FactoryError> {
        FeeModel::new(self.fees.fee_bps, self.fees.slippage_bps)?;
        if !(self.lot_size.is_finite() && self.lot_size >= 0.0) {
            return Err(invalid("lot_size", self.lot_size, "a finite value >= 0"));
        }
        self.exit.validate()
    }
}

fn invalid(param: &str, value: f64, expected: &'static str) -> FactoryError {
    FactoryError::InvalidParam {
        component: "position".into(),
        param: param.into(),
        value,
        expected,
    }
}

impl Default for PositionManagerConfig {
    fn default() -> Self {
        Self {
            initial_capital: 10_000.0,
            fees: FeeModel::default(),
            lot_size: 0.0,
            exit: ExitPolicy::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PositionManager {
    config: PositionManagerConfig,
    cash: f64,
    positions: BTreeMap<String, Position>,
    ledger: Vec<TradeRecord>,
    ids: IdGen,
    fees_paid: f64,
    realized_pnl: f64,
}

impl PositionManager {
    pub fn new(config: PositionManagerConfig) -> Self {
        Self {
            cash: config.initial_capital,
            config,
            positions: BTreeMap::new(),
            ledger: Vec::new(),
            ids: IdGen::new(),
            fees_paid: 0.0,
            realized_pnl: 0.0,
        }
    }

    pub fn config(&self) -> &PositionManagerConfig {
        &self.config
    }

    fn round_to_lot(&self, quantity: f64) -> f64 {
        if self.config.lot_size > 0.0 {
            (quantity / self.config.lot_size).floor() * self.config.lot_size
        } else {
            quantity
        }
    }

    /// Attempt to open a position for `signal` at the bar close.
    pub fn try_open(&mut self, signal: &Signal, quantity: f64, bar: &Bar) -> ExecutionOutcome {
        if !(bar.close.is_finite() && bar.close > 0.0) {
            return ExecutionOutcome::Rejected(RejectReason::InvalidPrice);
        }
        if let Some(open) = self.positions.get(&signal.symbol) {
            let reason = if open.side == signal.side {
                RejectReason::PositionAlreadyOpen
            } else {
                RejectReason::OppositePositionOpen
            };
            return ExecutionOutcome::Rejected(reason);
        }

        let quantity = if quantity.is_finite() {
            self.round_to_lot(quantity)
        } else {
            0.0
        };
        if quantity <= 0.0 {
            return ExecutionOutcome::Rejected(RejectReason::ZeroSize);
        }

        let fill_price = self.config.fees.fill_price(signal.side, Leg::Entry, bar.close);
        let notional = fill_price * quantity;
        let fee = self.config.fees.fee(notional);
        if notional + fee > self.cash {
            return ExecutionOutcome::Rejected(RejectReason::InsufficientCapital);
        }

        let trade_id = self.ids.next_trade_id();
        self.cash -= notional + fee;
        self.fees_paid += fee;
        self.positions.insert(
            signal.symbol.clone(),
            Position {
                trade_id,
                signal_id: signal.signal_id,
                symbol: signal.symbol.clone(),
                side: signal.side,
                entry_bar: signal.bar_index,
                entry_time: bar.timestamp,
                entry_price: fill_price,
                quantity,
                entry_fee: fee,
                entry_confidence: signal.confidence,
                mark_price: bar.close,
            },
        );
        ExecutionOutcome::Executed(ExecutedTrade::new(
            signal.signal_id,
            trade_id,
            signal.symbol.clone(),
            signal.bar_index,
            signal.side,
            fill_price,
            quantity,
            fee,
        ))
    }

    /// Mark the symbol's position to the bar close and apply the exit policy.
    pub fn check_exits(&mut self, bar_index: usize, bar: &Bar) -> Option<TradeRecord> {
        let position = self.positions.get_mut(&bar.symbol)?;
        position.mark_price = bar.close;
        if position.entry_bar >= bar_index {
            return None;
        }
        let reason = self.config.exit.exit_reason(position, bar_index, bar.close)?;
        self.close(bar_index, bar, reason)
    }

    /// Close the symbol's position at the bar close, if one is open.
    pub fn close(&mut self, bar_index: usize, bar: &Bar, reason: ExitReason) -> Option<TradeRecord> {
        let position = self.positions.remove(&bar.symbol)?;
        let exit_price = self.config.fees.fill_price(position.side, Leg::Exit, bar.close);
        let exit_fee = self.config.fees.fee(exit_price * position.quantity);
        let gross_pnl = position.unrealized_pnl(exit_price);
        let fees = position.entry_fee + exit_fee;
        let net_pnl = gross_pnl - fees;

        self.cash += position.notional() + gross_pnl - exit_fee;
        self.fees_paid += exit_fee;
        self.realized_pnl += net_pnl;

        let record = TradeRecord {
            trade_id: position.trade_id,
            signal_id: position.signal_id,
            symbol: position.symbol.clone(),
            side: position.side,
            entry_bar: position.entry_bar,
            entry_time: position.entry_time,
            entry_price: position.entry_price,
            entry_confidence: position.entry_confidence,
            exit_bar: bar_index,
            exit_time: bar.timestamp,
            exit_price,
            exit_reason: reason,
            quantity: position.quantity,
            gross_pnl,
            fees,
            net_pnl,
            bars_held: position.bars_held(bar_index),
        };
        self.ledger.push(record.clone());
        Some(record)
    }

    /// Close every open position against the given final bars.
    pub fn close_all<'a, I>(&mut self, final_bars: I, reason: ExitReason) -> Vec<TradeRecord>
    where
        I: IntoIterator<Item = (usize, &'a Bar)>,
    {
        final_bars
            .into_iter()
            .filter_map(|(bar_index, bar)| self.close(bar_index, bar, reason))
            .collect()
    }

    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    pub fn open_side(&self, symbol: &str) -> Option<PositionSide> {
        self.positions.get(symbol).map(|p| p.side)
    }

    pub fn open_positions(&self) -> usize {
        self.positions.len()
    }

    /// Cash plus the marked value of every open position.
    pub fn equity(&self) -> f64 {
        self.cash
            + self
                .positions
                .values()
                .map(|p| p.notional() + p.unrealized_pnl(p.mark_price))
                .sum::<f64>()
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn fees_paid(&self) -> f64 {
        self.fees_paid
    }

    pub fn realized_pnl(&self) -> f64 {
        self.realized_pnl
    }

    pub fn ledger(&self) -> &[TradeRecord] {
        &self.ledger
    }

    pub fn into_ledger(self) -> Vec<TradeRecord> {
        self.ledger
    }
}
