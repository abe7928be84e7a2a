//! Persistence boundary. The engine reads and writes ledger rows through
//! these narrow interfaces; schema and migration concerns live behind them.

use crate::error::LedgerError;
use crate::types::{AccountBalance, ExitReason, Position, PositionSide, Signal, SignalKind};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Authoritative position storage.
#[async_trait]
pub trait PositionRepository: Send + Sync {
    /// Persist a new position row.
    async fn create(&self, position: Position) -> Result<(), LedgerError>;

    /// Overwrite an existing row. One atomic write per exit decision.
    async fn update(&self, position: &Position) -> Result<(), LedgerError>;

    /// Find a position by ID.
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Position>, LedgerError>;

    /// All non-terminal positions.
    async fn find_open(&self) -> Result<Vec<Position>, LedgerError>;

    /// Non-terminal positions for one symbol.
    async fn find_open_for_symbol(&self, symbol: &str) -> Result<Vec<Position>, LedgerError>;
}

/// Account balance storage.
#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// Current balance snapshot.
    async fn balance(&self) -> Result<AccountBalance, LedgerError>;

    /// Freeze margin for a new position.
    async fn freeze(&self, margin: Decimal) -> Result<(), LedgerError>;

    /// Release margin and apply realized PnL at close.
    async fn release(&self, margin: Decimal, realized: Decimal) -> Result<(), LedgerError>;
}

/// One entry in the decision audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// When the decision was made
    pub at: DateTime<Utc>,
    /// What was decided
    pub decision: Decision,
}

/// An accepted or rejected engine decision, recorded for observability.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Decision {
    /// Signal cleared every gate and a position was opened
    Opened {
        position_id: Uuid,
        signal: Signal,
    },
    /// Signal was dropped by an admission filter or pre-open gate
    SignalDropped {
        symbol: String,
        signal_kind: SignalKind,
        direction: PositionSide,
        reason: String,
    },
    /// Position closed by the exit state machine
    Closed {
        position_id: Uuid,
        reason: ExitReason,
        realized_pnl: Decimal,
    },
    /// Close attempt failed; position stays open for the next tick
    CloseFailed {
        position_id: Uuid,
        error: String,
    },
}

/// Append-only audit log of engine decisions.
#[async_trait]
pub trait AuditRepository: Send + Sync {
    /// Append an entry.
    async fn record(&self, entry: AuditEntry) -> Result<(), LedgerError>;
}
