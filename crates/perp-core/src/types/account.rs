//! Account balance.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

/// Account balance split into available and frozen margin.
///
/// Invariant: `available + frozen == total` at all times. Unrealized PnL is
/// never folded into the balance; only realized PnL moves `available`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct AccountBalance {
    /// Margin free to commit to new positions
    pub available: Decimal,
    /// Margin committed to open positions
    pub frozen: Decimal,
    /// Cumulative realized PnL since inception
    pub realized_pnl: Decimal,
}

impl AccountBalance {
    /// Create a balance with the given starting capital.
    pub fn new(available: Decimal) -> Self {
        Self {
            available,
            frozen: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
        }
    }

    /// Total balance (available + frozen).
    pub fn total(&self) -> Decimal {
        self.available + self.frozen
    }

    /// Freeze margin for a new position.
    pub fn freeze(&mut self, margin: Decimal) -> Result<(), LedgerError> {
        if margin > self.available {
            return Err(LedgerError::InsufficientBalance {
                required: margin,
                available: self.available,
            });
        }
        self.available -= margin;
        self.frozen += margin;
        Ok(())
    }

    /// Release margin at close, applying the realized PnL to available.
    pub fn release(&mut self, margin: Decimal, realized: Decimal) -> Result<(), LedgerError> {
        if margin > self.frozen {
            return Err(LedgerError::FrozenUnderflow {
                requested: margin,
                frozen: self.frozen,
            });
        }
        self.frozen -= margin;
        self.available += margin + realized;
        self.realized_pnl += realized;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_freeze_release_preserves_total() {
        let mut balance = AccountBalance::new(dec!(10000));
        let total_before = balance.total();

        balance.freeze(dec!(500)).unwrap();
        assert_eq!(balance.available, dec!(9500));
        assert_eq!(balance.frozen, dec!(500));
        assert_eq!(balance.total(), total_before);

        balance.release(dec!(500), dec!(75)).unwrap();
        assert_eq!(balance.frozen, Decimal::ZERO);
        assert_eq!(balance.total(), total_before + dec!(75));
        assert_eq!(balance.realized_pnl, dec!(75));
    }

    #[test]
    fn test_freeze_rejects_over_available() {
        let mut balance = AccountBalance::new(dec!(100));
        assert!(balance.freeze(dec!(101)).is_err());
        assert_eq!(balance.available, dec!(100));
    }

    #[test]
    fn test_release_rejects_frozen_underflow() {
        let mut balance = AccountBalance::new(dec!(1000));
        balance.freeze(dec!(100)).unwrap();
        assert!(balance.release(dec!(200), Decimal::ZERO).is_err());
    }
}
