//! Entry blacklist.
//!
//! Operators can block new entries for a whole symbol or for one signal kind
//! in one direction, each with an effective time window. The blacklist is
//! consulted by the pre-open gates only; open positions are never touched.

use chrono::{DateTime, Utc};
use perp_core::types::{PositionSide, SignalKind};
use tokio::sync::RwLock;

/// What an entry blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlacklistScope {
    /// All new entries on the symbol, both directions, every signal kind.
    Symbol(String),
    /// New entries produced by one signal kind in one direction.
    KindSide(SignalKind, PositionSide),
}

#[derive(Debug, Clone)]
pub struct BlacklistEntry {
    pub scope: BlacklistScope,
    pub from: DateTime<Utc>,
    /// `None` blocks until the entry is removed.
    pub until: Option<DateTime<Utc>>,
}

impl BlacklistEntry {
    fn in_effect(&self, now: DateTime<Utc>) -> bool {
        now >= self.from && self.until.map_or(true, |u| now < u)
    }

    fn matches(&self, symbol: &str, kind: SignalKind, side: PositionSide) -> bool {
        match &self.scope {
            BlacklistScope::Symbol(s) => s == symbol,
            BlacklistScope::KindSide(k, d) => *k == kind && *d == side,
        }
    }
}

/// In-memory blacklist store.
#[derive(Default)]
pub struct Blacklist {
    entries: RwLock<Vec<BlacklistEntry>>,
}

impl Blacklist {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add(&self, entry: BlacklistEntry) {
        self.entries.write().await.push(entry);
    }

    pub async fn add_symbol(&self, symbol: &str, until: Option<DateTime<Utc>>) {
        self.add(BlacklistEntry {
            scope: BlacklistScope::Symbol(symbol.to_string()),
            from: Utc::now(),
            until,
        })
        .await;
    }

    pub async fn add_kind_side(
        &self,
        kind: SignalKind,
        side: PositionSide,
        until: Option<DateTime<Utc>>,
    ) {
        self.add(BlacklistEntry {
            scope: BlacklistScope::KindSide(kind, side),
            from: Utc::now(),
            until,
        })
        .await;
    }

    /// The reason a candidate entry is blocked, if any rule applies at `now`.
    pub async fn blocks(
        &self,
        symbol: &str,
        kind: SignalKind,
        side: PositionSide,
        now: DateTime<Utc>,
    ) -> Option<String> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .find(|e| e.in_effect(now) && e.matches(symbol, kind, side))
            .map(|e| match &e.scope {
                BlacklistScope::Symbol(s) => format!("symbol {s} blacklisted"),
                BlacklistScope::KindSide(k, d) => {
                    format!("{k} {d} entries blacklisted")
                }
            })
    }

    /// Drop entries whose window has fully passed.
    pub async fn prune(&self, now: DateTime<Utc>) {
        self.entries
            .write()
            .await
            .retain(|e| e.until.map_or(true, |u| now < u));
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn test_symbol_rule_blocks_both_directions() {
        let blacklist = Blacklist::new();
        let now = Utc::now();
        blacklist.add_symbol("BTC-USDT-SWAP", None).await;

        for side in [PositionSide::Long, PositionSide::Short] {
            assert!(blacklist
                .blocks("BTC-USDT-SWAP", SignalKind::Crossover, side, now)
                .await
                .is_some());
        }
        assert!(blacklist
            .blocks("ETH-USDT-SWAP", SignalKind::Crossover, PositionSide::Long, now)
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_kind_side_rule_is_narrow() {
        let blacklist = Blacklist::new();
        let now = Utc::now();
        blacklist
            .add_kind_side(SignalKind::LimitEntry, PositionSide::Short, None)
            .await;

        assert!(blacklist
            .blocks("BTC-USDT-SWAP", SignalKind::LimitEntry, PositionSide::Short, now)
            .await
            .is_some());
        assert!(blacklist
            .blocks("BTC-USDT-SWAP", SignalKind::LimitEntry, PositionSide::Long, now)
            .await
            .is_none());
        assert!(blacklist
            .blocks("BTC-USDT-SWAP", SignalKind::Crossover, PositionSide::Short, now)
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_window_expiry_and_prune() {
        let blacklist = Blacklist::new();
        let now = Utc::now();
        blacklist
            .add_symbol("BTC-USDT-SWAP", Some(now + Duration::minutes(30)))
            .await;

        assert!(blacklist
            .blocks("BTC-USDT-SWAP", SignalKind::Crossover, PositionSide::Long, now)
            .await
            .is_some());

        let later = now + Duration::hours(1);
        assert!(blacklist
            .blocks("BTC-USDT-SWAP", SignalKind::Crossover, PositionSide::Long, later)
            .await
            .is_none());

        blacklist.prune(later).await;
        assert!(blacklist.is_empty().await);
    }
}
