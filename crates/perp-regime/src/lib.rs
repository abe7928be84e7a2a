//! Market regime gate.
//!
//! Aggregates a fixed reference basket across several timeframes into a
//! market-wide bias used to veto or boost individual signals, and watches
//! the basket for synchronized reversals that trigger emergency flattening
//! and an entry lock.

mod classify;
mod gate;
mod reversal;

pub use classify::{MemberTrend, RegimeBias};
pub use gate::{RegimeAssessment, RegimeGate};
pub use reversal::{ReversalEvent, ReversalKind};
