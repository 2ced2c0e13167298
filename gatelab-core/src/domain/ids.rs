//! Identifier and content-hash types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of an allowed signal (one per non-NONE decision).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SignalId(pub u64);

/// Identifier of a position opened by the position manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TradeId(pub u64);

impl fmt::Display for SignalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sig-{}", self.0)
    }
}

impl fmt::Display for TradeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "trd-{}", self.0)
    }
}

/// Monotonic id generator owned by one run.
#[derive(Debug, Clone, Default)]
pub struct IdGen {
    next_signal: u64,
    next_trade: u64,
}

impl IdGen {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_signal_id(&mut self) -> SignalId {
        self.next_signal += 1;
        SignalId(self.next_signal)
    }

    pub fn next_trade_id(&mut self) -> TradeId {
        self.next_trade += 1;
        TradeId(self.next_trade)
    }
}

macro_rules! blake3_hash_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            /// BLAKE3 hex digest of `bytes`.
            pub fn from_bytes(bytes: &[u8]) -> Self {
                Self(blake3::hash(bytes).to_hex().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

blake3_hash_type!(
    /// Structural identity of a pipeline: component types in order, no parameters.
    ConfigHash
);
blake3_hash_type!(
    /// Exact identity of a pipeline: component types plus every parameter value.
    FullHash
);
blake3_hash_type!(
    /// Digest of a run's observable output (trade ledger + attribution + execution stats).
    LedgerHash
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_gen_is_monotonic_and_independent() {
        let mut ids = IdGen::new();
        assert_eq!(ids.next_signal_id(), SignalId(1));
        assert_eq!(ids.next_signal_id(), SignalId(2));
        assert_eq!(ids.next_trade_id(), TradeId(1));
        assert_eq!(ids.next_signal_id(), SignalId(3));
    }

    #[test]
    fn hashes_are_deterministic() {
        assert_eq!(ConfigHash::from_bytes(b"a"), ConfigHash::from_bytes(b"a"));
        assert_ne!(ConfigHash::from_bytes(b"a"), ConfigHash::from_bytes(b"b"));
        assert_eq!(LedgerHash::from_bytes(b"x").as_str().len(), 64);
    }

    #[test]
    fn display_formats() {
        assert_eq!(SignalId(7).to_string(), "sig-7");
        assert_eq!(TradeId(3).to_string(), "trd-3");
    }
}
