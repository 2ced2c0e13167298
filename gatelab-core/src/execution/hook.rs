//! Post-execution hook: the sole path from a confirmed fill to component state.
//!
//! `fire` runs after the position manager answers. On `Executed` it forwards
//! the `ExecutedTrade` to the pipeline's components; on `Rejected` it forwards
//! nothing and checks that no component state moved. It keeps its own ledger
//! of what every stateful component *should* hold, so any divergence, whether
//! from a phantom update or a missed one, is detected and reported as fatal.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::domain::{SignalId, TradeId};
use crate::pipeline::DecisionPipeline;

use super::signal::{ExecutionOutcome, RejectReason, Signal};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum StateConsistencyError {
    #[error("executed trade {trade_id} does not match signal {signal_id}: {detail}")]
    TradeMismatch {
        signal_id: SignalId,
        trade_id: TradeId,
        detail: String,
    },
    #[error(
        "component '{component}' recorded {recorded} trades but {expected} executions were confirmed"
    )]
    RecordCountDiverged {
        component: String,
        recorded: usize,
        expected: usize,
    },
    #[error(
        "component '{component}' holds bar {found:?} for '{symbol}', expected {expected:?}"
    )]
    StateDiverged {
        component: String,
        symbol: String,
        expected: Option<usize>,
        found: Option<usize>,
    },
    #[error("stateful component '{0}' appeared or vanished mid-run")]
    ComponentSetChanged(String),
}

/// What the hook did for one signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PostExecutionEvent {
    Recorded {
        signal_id: SignalId,
        trade_id: TradeId,
        symbol: String,
        bar_index: usize,
    },
    Skipped {
        signal_id: SignalId,
        reason: RejectReason,
    },
}

/// Summary returned by [`PostExecutionHook::audit`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HookAudit {
    pub executions_recorded: usize,
    pub rejections_skipped: usize,
    /// Stateful component → recorded trade count at audit time.
    pub component_records: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Default)]
pub struct PostExecutionHook {
    executed: usize,
    skipped: usize,
    /// Recorded counts per stateful component when the hook was attached.
    baseline_records: BTreeMap<String, usize>,
    /// What each stateful component's symbol → bar map must equal.
    expected_state: BTreeMap<String, BTreeMap<String, usize>>,
}

impl PostExecutionHook {
    /// Attach to a pipeline, capturing its current (possibly injected) state.
    pub fn attach(pipeline: &DecisionPipeline) -> Self {
        Self {
            executed: 0,
            skipped: 0,
            baseline_records: pipeline.recorded_trades(),
            expected_state: pipeline.state_snapshot(),
        }
    }

    /// React to the position manager's answer for `signal`.
    pub fn fire(
        &mut self,
        pipeline: &mut DecisionPipeline,
        signal: &Signal,
        outcome: &ExecutionOutcome,
    ) -> Result<PostExecutionEvent, StateConsistencyError> {
        match outcome {
            ExecutionOutcome::Executed(trade) => {
                let mismatch = |detail: String| StateConsistencyError::TradeMismatch {
                    signal_id: signal.signal_id,
                    trade_id: trade.trade_id(),
                    detail,
                };
                if trade.signal_id() != signal.signal_id {
                    return Err(mismatch(format!("trade carries signal {}", trade.signal_id())));
                }
                if trade.symbol() != signal.symbol {
                    return Err(mismatch(format!("symbol {} vs {}", trade.symbol(), signal.symbol)));
                }
                if trade.bar_index() != signal.bar_index {
                    return Err(mismatch(format!("bar {} vs {}", trade.bar_index(), signal.bar_index)));
                }
                if trade.side() != signal.side {
                    return Err(mismatch(format!("side {:?} vs {:?}", trade.side(), signal.side)));
                }

                pipeline.record_trade(trade);
                self.executed += 1;
                for state in self.expected_state.values_mut() {
                    state.insert(trade.symbol().to_string(), trade.bar_index());
                }
                self.check_state(pipeline)?;
                tracing::debug!(
                    signal = %signal.signal_id,
                    trade = %trade.trade_id(),
                    symbol = %signal.symbol,
                    bar = signal.bar_index,
                    "execution recorded"
                );
                Ok(PostExecutionEvent::Recorded {
                    signal_id: signal.signal_id,
                    trade_id: trade.trade_id(),
                    symbol: signal.symbol.clone(),
                    bar_index: signal.bar_index,
                })
            }
            ExecutionOutcome::Rejected(reason) => {
                self.skipped += 1;
                self.check_state(pipeline)?;
                tracing::debug!(
                    signal = %signal.signal_id,
                    symbol = %signal.symbol,
                    bar = signal.bar_index,
                    %reason,
                    "execution rejected, state untouched"
                );
                Ok(PostExecutionEvent::Skipped {
                    signal_id: signal.signal_id,
                    reason: *reason,
                })
            }
        }
    }

    fn check_state(&self, pipeline: &DecisionPipeline) -> Result<(), StateConsistencyError> {
        let actual = pipeline.state_snapshot();
        for name in actual.keys() {
            if !self.expected_state.contains_key(name) {
                return Err(StateConsistencyError::ComponentSetChanged(name.clone()));
            }
        }
        for (component, expected) in &self.expected_state {
            let Some(found) = actual.get(component) else {
                return Err(StateConsistencyError::ComponentSetChanged(component.clone()));
            };
            if found == expected {
                continue;
            }
            let symbol = expected
                .keys()
                .chain(found.keys())
                .find(|s| expected.get(*s) != found.get(*s))
                .cloned()
                .unwrap_or_default();
            return Err(StateConsistencyError::StateDiverged {
                component: component.clone(),
                expected: expected.get(&symbol).copied(),
                found: found.get(&symbol).copied(),
                symbol,
            });
        }
        Ok(())
    }

    /// End-of-run check: every stateful component recorded exactly the
    /// confirmed executions, and its state matches the hook's ledger.
    pub fn audit(&self, pipeline: &DecisionPipeline) -> Result<HookAudit, StateConsistencyError> {
        let records = pipeline.recorded_trades();
        for (component, &recorded) in &records {
            let baseline = self.baseline_records.get(component).copied().unwrap_or(0);
            let expected = baseline + self.executed;
            if recorded != expected {
                return Err(StateConsistencyError::RecordCountDiverged {
                    component: component.clone(),
                    recorded,
                    expected,
                });
            }
        }
        self.check_state(pipeline)?;
        Ok(HookAudit {
            executions_recorded: self.executed,
            rejections_skipped: self.skipped,
            component_records: records,
        })
    }

    pub fn executions_recorded(&self) -> usize {
        self.executed
    }

    pub fn rejections_skipped(&self) -> usize {
        self.skipped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{CooldownGate, CooldownState, StrategyComponent};
    use crate::domain::bar::make_bars;
    use crate::domain::PositionSide;
    use crate::execution::{ExecutedTrade, PositionManager, PositionManagerConfig};

    fn pipeline() -> DecisionPipeline {
        DecisionPipeline::from_components(vec![Box::new(CooldownGate::new(24))]).unwrap()
    }

    fn signal(bar_index: usize, id: u64) -> Signal {
        let bars = make_bars("BTC", &[100.0]);
        Signal {
            signal_id: SignalId(id),
            symbol: "BTC".into(),
            bar_index,
            timestamp: bars[0].timestamp,
            side: PositionSide::Long,
            confidence: 0.6,
            model_confidence: 0.6,
        }
    }

    #[test]
    fn executed_outcome_updates_state() {
        let mut p = pipeline();
        let mut hook = PostExecutionHook::attach(&p);
        let bars = make_bars("BTC", &[100.0]);
        let mut pm = PositionManager::new(PositionManagerConfig::default());
        let s = signal(0, 1);
        let outcome = pm.try_open(&s, 1.0, &bars[0]);
        let event = hook.fire(&mut p, &s, &outcome).unwrap();
        assert!(matches!(event, PostExecutionEvent::Recorded { bar_index: 0, .. }));
        assert_eq!(p.state_snapshot()["cooldown"].get("BTC"), Some(&0));
        assert_eq!(hook.audit(&p).unwrap().executions_recorded, 1);
    }

    #[test]
    fn rejected_outcome_leaves_state_untouched() {
        let mut p = pipeline();
        let mut hook = PostExecutionHook::attach(&p);
        let before = p.state_snapshot();
        let event = hook
            .fire(&mut p, &signal(3, 1), &ExecutionOutcome::Rejected(RejectReason::ZeroSize))
            .unwrap();
        assert!(matches!(event, PostExecutionEvent::Skipped { reason: RejectReason::ZeroSize, .. }));
        assert_eq!(p.state_snapshot(), before);
        let audit = hook.audit(&p).unwrap();
        assert_eq!(audit.executions_recorded, 0);
        assert_eq!(audit.rejections_skipped, 1);
    }

    #[test]
    fn mismatched_trade_is_fatal_and_not_recorded() {
        let mut p = pipeline();
        let mut hook = PostExecutionHook::attach(&p);
        let trade = ExecutedTrade::new(SignalId(9), TradeId(1), "BTC", 0, PositionSide::Long, 100.0, 1.0, 0.0);
        let err = hook
            .fire(&mut p, &signal(0, 1), &ExecutionOutcome::Executed(trade))
            .unwrap_err();
        assert!(matches!(err, StateConsistencyError::TradeMismatch { .. }));
        assert!(p.state_snapshot()["cooldown"].is_empty());
    }

    #[test]
    fn audit_detects_a_bypassed_hook() {
        let mut p = pipeline();
        let hook = PostExecutionHook::attach(&p);
        // Simulate a defect: state mutated without going through the hook.
        let trade = ExecutedTrade::new(SignalId(1), TradeId(1), "BTC", 5, PositionSide::Long, 100.0, 1.0, 0.0);
        p.record_trade(&trade);
        let err = hook.audit(&p).unwrap_err();
        assert!(matches!(err, StateConsistencyError::RecordCountDiverged { recorded: 1, expected: 0, .. }));
    }

    #[test]
    fn rejection_after_bypass_is_caught_immediately() {
        let mut p = pipeline();
        let mut hook = PostExecutionHook::attach(&p);
        let trade = ExecutedTrade::new(SignalId(1), TradeId(1), "BTC", 5, PositionSide::Long, 100.0, 1.0, 0.0);
        p.record_trade(&trade);
        let err = hook
            .fire(&mut p, &signal(6, 2), &ExecutionOutcome::Rejected(RejectReason::PositionAlreadyOpen))
            .unwrap_err();
        assert_eq!(
            err,
            StateConsistencyError::StateDiverged {
                component: "cooldown".into(),
                symbol: "BTC".into(),
                expected: None,
                found: Some(5),
            }
        );
    }

    #[test]
    fn injected_state_is_the_baseline() {
        let mut donor = CooldownGate::new(24);
        donor.record_trade(&ExecutedTrade::new(SignalId(1), TradeId(1), "ETH", 2, PositionSide::Long, 1.0, 1.0, 0.0));
        let state: CooldownState = donor.state().clone();
        let p = DecisionPipeline::from_components(vec![Box::new(CooldownGate::with_state(24, state))]).unwrap();
        let hook = PostExecutionHook::attach(&p);
        let audit = hook.audit(&p).unwrap();
        assert_eq!(audit.component_records.get("cooldown"), Some(&1));
    }
}
