//! Append-only audit log.

use async_trait::async_trait;
use perp_core::error::LedgerError;
use perp_core::traits::{AuditEntry, AuditRepository, Decision};
use tokio::sync::RwLock;
use tracing::debug;

/// Audit entries held in process memory, newest last.
#[derive(Default)]
pub struct MemoryAuditLog {
    entries: RwLock<Vec<AuditEntry>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all recorded entries.
    pub async fn entries(&self) -> Vec<AuditEntry> {
        self.entries.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl AuditRepository for MemoryAuditLog {
    async fn record(&self, entry: AuditEntry) -> Result<(), LedgerError> {
        match &entry.decision {
            Decision::Opened { position_id, signal } => {
                debug!(%position_id, symbol = %signal.symbol, kind = %signal.kind, "audit: opened");
            }
            Decision::SignalDropped { symbol, reason, .. } => {
                debug!(%symbol, %reason, "audit: signal dropped");
            }
            Decision::Closed {
                position_id,
                reason,
                realized_pnl,
            } => {
                debug!(%position_id, %reason, %realized_pnl, "audit: closed");
            }
            Decision::CloseFailed { position_id, error } => {
                debug!(%position_id, %error, "audit: close failed");
            }
        }
        self.entries.write().await.push(entry);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use perp_core::types::ExitReason;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_entries_append_in_order() {
        let log = MemoryAuditLog::new();
        let id = Uuid::new_v4();

        log.record(AuditEntry {
            at: Utc::now(),
            decision: Decision::SignalDropped {
                symbol: "BTC-USDT-SWAP".to_string(),
                signal_kind: perp_core::types::SignalKind::Crossover,
                direction: perp_core::types::PositionSide::Long,
                reason: "cooldown active".to_string(),
            },
        })
        .await
        .unwrap();

        log.record(AuditEntry {
            at: Utc::now(),
            decision: Decision::Closed {
                position_id: id,
                reason: ExitReason::TrailingStop,
                realized_pnl: dec!(12.5),
            },
        })
        .await
        .unwrap();

        let entries = log.entries().await;
        assert_eq!(entries.len(), 2);
        assert!(matches!(
            &entries[1].decision,
            Decision::Closed { position_id, .. } if *position_id == id
        ));
    }
}
