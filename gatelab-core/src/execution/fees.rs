//! Fee and slippage model.
//!
//! Fills happen at the bar close moved against the trader by `slippage_bps`;
//! a taker fee of `fee_bps` is charged on the filled notional of each side.

use serde::{Deserialize, Serialize};

use crate::components::FactoryError;
use crate::domain::PositionSide;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeeModel {
    pub fee_bps: f64,
    pub slippage_bps: f64,
}

impl Default for FeeModel {
    fn default() -> Self {
        Self {
            fee_bps: 0.0,
            slippage_bps: 0.0,
        }
    }
}

/// Which leg of a round trip is being filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Leg {
    Entry,
    Exit,
}

impl FeeModel {
    pub fn new(fee_bps: f64, slippage_bps: f64) -> Result<Self, FactoryError> {
        for (param, value) in [("fee_bps", fee_bps), ("slippage_bps", slippage_bps)] {
            if !value.is_finite() || value < 0.0 {
                return Err(FactoryError::InvalidParam {
                    component: "fees".into(),
                    param: param.into(),
                    value,
                    expected: "a finite value >= 0",
                });
            }
        }
        Ok(Self {
            fee_bps,
            slippage_bps,
        })
    }

    pub fn zero() -> Self {
        Self::default()
    }

    /// Buying (long entry, short exit) pays up; selling receives less.
    pub fn fill_price(&self, side: PositionSide, leg: Leg, reference: f64) -> f64 {
        let buying = matches!(
            (side, leg),
            (PositionSide::Long, Leg::Entry) | (PositionSide::Short, Leg::Exit)
        );
        let slip = self.slippage_bps / 10_000.0;
        if buying {
            reference * (1.0 + slip)
        } else {
            reference * (1.0 - slip)
        }
    }

    pub fn fee(&self, notional: f64) -> f64 {
        notional.abs() * self.fee_bps / 10_000.0
    }
}
