//! Execution engine: signal-to-order pipeline and exit state machine.

mod engine;
mod exits;
mod gates;
mod sizing;

pub use engine::{EngineSnapshot, ExecutionEngine, ExitTick, LedgerSide};
pub use exits::{ExitContext, ExitDecision, ExitEvaluator};
pub use gates::{is_chasing, CooldownTracker, GateBlock};
pub use sizing::{entry_quantity, risk_prices, VolatilityProfile};
