//! In-memory position repository.

use async_trait::async_trait;
use perp_core::error::LedgerError;
use perp_core::traits::PositionRepository;
use perp_core::types::Position;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Position rows held in process memory.
///
/// Rows survive for the lifetime of the engine; closed positions stay in the
/// map so realized history remains queryable by ID.
#[derive(Default)]
pub struct MemoryPositionLedger {
    rows: RwLock<HashMap<Uuid, Position>>,
}

impl MemoryPositionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows, terminal ones included.
    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }
}

#[async_trait]
impl PositionRepository for MemoryPositionLedger {
    async fn create(&self, position: Position) -> Result<(), LedgerError> {
        let mut rows = self.rows.write().await;
        if rows.contains_key(&position.id) {
            return Err(LedgerError::Internal(format!(
                "position {} already exists",
                position.id
            )));
        }
        rows.insert(position.id, position);
        Ok(())
    }

    async fn update(&self, position: &Position) -> Result<(), LedgerError> {
        let mut rows = self.rows.write().await;
        match rows.get_mut(&position.id) {
            Some(row) => {
                *row = position.clone();
                Ok(())
            }
            None => Err(LedgerError::PositionNotFound(position.id)),
        }
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Position>, LedgerError> {
        Ok(self.rows.read().await.get(&id).cloned())
    }

    async fn find_open(&self) -> Result<Vec<Position>, LedgerError> {
        Ok(self
            .rows
            .read()
            .await
            .values()
            .filter(|p| !p.status.is_terminal())
            .cloned()
            .collect())
    }

    async fn find_open_for_symbol(&self, symbol: &str) -> Result<Vec<Position>, LedgerError> {
        Ok(self
            .rows
            .read()
            .await
            .values()
            .filter(|p| p.symbol == symbol && !p.status.is_terminal())
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use perp_core::types::{
        ExitReason, IndicatorSnapshot, PositionSide, PositionStatus, SignalKind,
    };
    use rust_decimal_macros::dec;

    fn snapshot() -> IndicatorSnapshot {
        IndicatorSnapshot {
            ema_spread_pct: 0.5,
            rsi: Some(55.0),
            macd_histogram: None,
            kdj_j: None,
            ma_distance_pct: 0.2,
        }
    }

    fn open_position(symbol: &str) -> Position {
        let mut position = Position::new(
            symbol.to_string(),
            PositionSide::Long,
            dec!(0.01),
            dec!(50000),
            10,
            dec!(50),
            dec!(49000),
            dec!(55000),
            SignalKind::Crossover,
            snapshot(),
            Utc::now() + chrono::Duration::hours(24),
        );
        position.transition(PositionStatus::Building).unwrap();
        position.transition(PositionStatus::Open).unwrap();
        position
    }

    #[tokio::test]
    async fn test_create_and_find() {
        let ledger = MemoryPositionLedger::new();
        let position = open_position("BTC-USDT-SWAP");
        let id = position.id;

        ledger.create(position).await.unwrap();
        let found = ledger.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(found.symbol, "BTC-USDT-SWAP");
        assert_eq!(found.status, PositionStatus::Open);
    }

    #[tokio::test]
    async fn test_duplicate_create_rejected() {
        let ledger = MemoryPositionLedger::new();
        let position = open_position("BTC-USDT-SWAP");

        ledger.create(position.clone()).await.unwrap();
        assert!(ledger.create(position).await.is_err());
    }

    #[tokio::test]
    async fn test_update_unknown_row_rejected() {
        let ledger = MemoryPositionLedger::new();
        let position = open_position("BTC-USDT-SWAP");

        let err = ledger.update(&position).await.unwrap_err();
        assert!(matches!(err, LedgerError::PositionNotFound(id) if id == position.id));
    }

    #[tokio::test]
    async fn test_find_open_excludes_terminal() {
        let ledger = MemoryPositionLedger::new();
        let open = open_position("BTC-USDT-SWAP");
        let mut closed = open_position("ETH-USDT-SWAP");
        closed
            .close(dec!(3100), dec!(5), ExitReason::MaxTakeProfit, Utc::now())
            .unwrap();

        ledger.create(open).await.unwrap();
        ledger.create(closed).await.unwrap();

        let open_rows = ledger.find_open().await.unwrap();
        assert_eq!(open_rows.len(), 1);
        assert_eq!(open_rows[0].symbol, "BTC-USDT-SWAP");
        assert_eq!(ledger.len().await, 2);
    }

    #[tokio::test]
    async fn test_find_open_for_symbol() {
        let ledger = MemoryPositionLedger::new();
        ledger.create(open_position("BTC-USDT-SWAP")).await.unwrap();
        ledger.create(open_position("BTC-USDT-SWAP")).await.unwrap();
        ledger.create(open_position("ETH-USDT-SWAP")).await.unwrap();

        let rows = ledger.find_open_for_symbol("BTC-USDT-SWAP").await.unwrap();
        assert_eq!(rows.len(), 2);
    }
}
