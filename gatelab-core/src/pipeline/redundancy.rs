//! Gate-redundancy probe.
//!
//! Two gates can produce identical downstream results when one of them (or an
//! upstream sizing threshold) dominates the other. The probe shadow-evaluates
//! every gate on every directional bar, tracks which gates *would* block, and
//! reports pairs whose block sets are identical or nested. It observes only;
//! decisions and attribution never see it.
//!
//! The sizing policy participates as the pseudo-gate [`SIZING_GATE`], blocking
//! when it sizes a signal to zero.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Name of the pseudo-gate representing the sizing policy.
pub const SIZING_GATE: &str = "sizing";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedundancyKind {
    /// Both gates block exactly the same bars.
    Identical,
    /// Every bar `gate` blocks is also blocked by `dominated_by`.
    Subsumed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedundancyFinding {
    pub kind: RedundancyKind,
    pub gate: String,
    pub dominated_by: String,
    /// Bars blocked by `gate`.
    pub blocked: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RedundancyReport {
    pub observations: u64,
    pub blocks: BTreeMap<String, u64>,
    pub findings: Vec<RedundancyFinding>,
}

impl RedundancyReport {
    pub fn has_findings(&self) -> bool {
        !self.findings.is_empty()
    }
}

/// Pairwise co-blocking counts over a run.
#[derive(Debug, Clone, Default)]
pub struct RedundancyProbe {
    order: Vec<String>,
    observations: u64,
    blocks: BTreeMap<String, u64>,
    /// (a, b) with a < b in `order` → bars both blocked.
    co_blocks: BTreeMap<(usize, usize), u64>,
}

impl RedundancyProbe {
    pub fn new() -> Self {
        Self::default()
    }

    fn index_of(&mut self, gate: &str) -> usize {
        match self.order.iter().position(|g| g == gate) {
            Some(i) => i,
            None => {
                self.order.push(gate.to_string());
                self.blocks.insert(gate.to_string(), 0);
                self.order.len() - 1
            }
        }
    }

    /// Record one bar: `(gate, blocked)` for every gate, including sizing.
    pub fn observe<'a, I>(&mut self, gates: I)
    where
        I: IntoIterator<Item = (&'a str, bool)>,
    {
        self.observations += 1;
        let mut blocked = Vec::new();
        for (gate, is_blocked) in gates {
            let idx = self.index_of(gate);
            if is_blocked {
                *self.blocks.entry(gate.to_string()).or_default() += 1;
                blocked.push(idx);
            }
        }
        blocked.sort_unstable();
        for (pos, &a) in blocked.iter().enumerate() {
            for &b in &blocked[pos + 1..] {
                *self.co_blocks.entry((a, b)).or_default() += 1;
            }
        }
    }

    pub fn observations(&self) -> u64 {
        self.observations
    }

    pub fn report(&self) -> RedundancyReport {
        let count = |i: usize| self.blocks.get(&self.order[i]).copied().unwrap_or(0);
        let mut findings = Vec::new();
        for a in 0..self.order.len() {
            for b in a + 1..self.order.len() {
                let both = self.co_blocks.get(&(a, b)).copied().unwrap_or(0);
                let (ca, cb) = (count(a), count(b));
                if both == 0 {
                    continue;
                }
                if ca == both && cb == both {
                    findings.push(RedundancyFinding {
                        kind: RedundancyKind::Identical,
                        gate: self.order[b].clone(),
                        dominated_by: self.order[a].clone(),
                        blocked: cb,
                    });
                } else if ca == both {
                    findings.push(RedundancyFinding {
                        kind: RedundancyKind::Subsumed,
                        gate: self.order[a].clone(),
                        dominated_by: self.order[b].clone(),
                        blocked: ca,
                    });
                } else if cb == both {
                    findings.push(RedundancyFinding {
                        kind: RedundancyKind::Subsumed,
                        gate: self.order[b].clone(),
                        dominated_by: self.order[a].clone(),
                        blocked: cb,
                    });
                }
            }
        }
        for finding in &findings {
            tracing::warn!(
                gate = %finding.gate,
                dominated_by = %finding.dominated_by,
                kind = ?finding.kind,
                blocked = finding.blocked,
                "redundant gate detected"
            );
        }
        RedundancyReport {
            observations: self.observations,
            blocks: self.blocks.clone(),
            findings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_block_sets_are_reported() {
        let mut probe = RedundancyProbe::new();
        for i in 0..10 {
            let blocked = i % 3 == 0;
            probe.observe([("confidence", blocked), ("expected_value", blocked), ("cooldown", false)]);
        }
        let report = probe.report();
        assert_eq!(report.observations, 10);
        assert_eq!(report.findings.len(), 1);
        let f = &report.findings[0];
        assert_eq!(f.kind, RedundancyKind::Identical);
        assert_eq!(f.gate, "expected_value");
        assert_eq!(f.dominated_by, "confidence");
        assert_eq!(f.blocked, 4);
    }

    #[test]
    fn nested_block_sets_are_subsumed() {
        let mut probe = RedundancyProbe::new();
        for i in 0..10 {
            // sizing blocks a strict superset of what confidence blocks
            probe.observe([("confidence", i < 3), (SIZING_GATE, i < 6)]);
        }
        let report = probe.report();
        assert_eq!(report.findings.len(), 1);
        assert_eq!(report.findings[0].kind, RedundancyKind::Subsumed);
        assert_eq!(report.findings[0].gate, "confidence");
        assert_eq!(report.findings[0].dominated_by, SIZING_GATE);
    }

    #[test]
    fn independent_gates_are_clean() {
        let mut probe = RedundancyProbe::new();
        for i in 0..12 {
            probe.observe([("a", i % 2 == 0), ("b", i % 3 == 0)]);
        }
        assert!(!probe.report().has_findings());
    }

    #[test]
    fn never_blocking_gates_are_not_redundant() {
        let mut probe = RedundancyProbe::new();
        for _ in 0..5 {
            probe.observe([("a", false), ("b", false)]);
        }
        let report = probe.report();
        assert!(!report.has_findings());
        assert_eq!(report.blocks.get("a"), Some(&0));
    }
}
