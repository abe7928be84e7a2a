//! Signal detection for the perpetual-futures engine.
//!
//! Four detectors run in priority order per scan tick: confirmed-candle
//! crossover, sustained trend, oscillation reversal, and the limit-entry
//! variant. Every candidate passes the admission filters before it is
//! returned to the execution engine.

mod crossover;
mod detector;
mod filters;
mod oscillation;
mod sustained;

pub use crossover::{CrossoverCheck, CrossoverEvent};
pub use detector::SignalDetector;
pub use filters::AdmissionFilters;
pub use oscillation::{OscillationCheck, OscillationEvent, OscillationOutcome};
pub use sustained::{SustainedTrendCheck, TrendEvent};
