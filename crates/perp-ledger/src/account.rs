//! In-memory account ledger.

use async_trait::async_trait;
use perp_core::error::LedgerError;
use perp_core::traits::AccountRepository;
use perp_core::types::AccountBalance;
use rust_decimal::Decimal;
use tokio::sync::RwLock;

/// Account balance held in process memory.
///
/// All arithmetic and invariant checks live on [`AccountBalance`]; this type
/// only serializes access to the single row.
pub struct MemoryAccountLedger {
    balance: RwLock<AccountBalance>,
}

impl MemoryAccountLedger {
    pub fn new(starting_capital: Decimal) -> Self {
        Self {
            balance: RwLock::new(AccountBalance::new(starting_capital)),
        }
    }
}

#[async_trait]
impl AccountRepository for MemoryAccountLedger {
    async fn balance(&self) -> Result<AccountBalance, LedgerError> {
        Ok(*self.balance.read().await)
    }

    async fn freeze(&self, margin: Decimal) -> Result<(), LedgerError> {
        self.balance.write().await.freeze(margin)
    }

    async fn release(&self, margin: Decimal, realized: Decimal) -> Result<(), LedgerError> {
        self.balance.write().await.release(margin, realized)
    }
}
