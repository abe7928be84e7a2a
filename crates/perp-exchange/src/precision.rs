//! Symbol precision cache.
//!
//! Precision metadata changes rarely; the gateway caches it per symbol and
//! refreshes on a timer. Reads are concurrent; a stale entry is replaced by
//! whichever caller fetches next, never invalidated mid-read.

use perp_core::traits::SymbolPrecision;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Time-bounded cache of per-symbol precision metadata.
pub struct PrecisionCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, (SymbolPrecision, Instant)>>,
}

impl PrecisionCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// A still-fresh entry for the symbol.
    pub async fn get(&self, symbol: &str) -> Option<SymbolPrecision> {
        let entries = self.entries.read().await;
        let (precision, stored_at) = entries.get(symbol)?;
        if stored_at.elapsed() < self.ttl {
            Some(*precision)
        } else {
            None
        }
    }

    pub async fn put(&self, symbol: &str, precision: SymbolPrecision) {
        self.entries
            .write()
            .await
            .insert(symbol.to_string(), (precision, Instant::now()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn precision() -> SymbolPrecision {
        SymbolPrecision {
            price_tick: dec!(0.1),
            quantity_step: dec!(0.001),
            min_quantity: dec!(0.001),
        }
    }

    #[tokio::test]
    async fn test_fresh_entry_served() {
        let cache = PrecisionCache::new(Duration::from_secs(60));
        assert!(cache.get("BTC-USDT-SWAP").await.is_none());

        cache.put("BTC-USDT-SWAP", precision()).await;
        let entry = cache.get("BTC-USDT-SWAP").await.unwrap();
        assert_eq!(entry.price_tick, dec!(0.1));
    }

    #[tokio::test]
    async fn test_expired_entry_misses() {
        let cache = PrecisionCache::new(Duration::ZERO);
        cache.put("BTC-USDT-SWAP", precision()).await;
        assert!(cache.get("BTC-USDT-SWAP").await.is_none());
    }
}
