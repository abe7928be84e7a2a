//! Single-writer registry for position rows.
//!
//! Exactly one task may run the exit state machine for a given position at a
//! time. A monitor task acquires a lease before touching the row and holds it
//! for the duration of the evaluation; a second acquirer gets
//! [`LedgerError::WriterConflict`] instead of a lease.

use perp_core::error::LedgerError;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Tracks which position IDs currently have an active writer.
#[derive(Default, Clone)]
pub struct WriterRegistry {
    active: Arc<Mutex<HashSet<Uuid>>>,
}

impl WriterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim exclusive write access to a position row.
    pub fn acquire(&self, id: Uuid) -> Result<WriterLease, LedgerError> {
        let mut active = self
            .active
            .lock()
            .map_err(|_| LedgerError::Internal("writer registry poisoned".to_string()))?;
        if !active.insert(id) {
            return Err(LedgerError::WriterConflict(id));
        }
        Ok(WriterLease {
            registry: Arc::clone(&self.active),
            id,
        })
    }

    /// Whether some task currently holds the lease for this position.
    pub fn is_held(&self, id: Uuid) -> bool {
        self.active.lock().map(|a| a.contains(&id)).unwrap_or(false)
    }
}

/// Exclusive write claim on one position row. Released on drop.
#[derive(Debug)]
pub struct WriterLease {
    registry: Arc<Mutex<HashSet<Uuid>>>,
    id: Uuid,
}

impl WriterLease {
    pub fn position_id(&self) -> Uuid {
        self.id
    }
}

impl Drop for WriterLease {
    fn drop(&mut self) {
        if let Ok(mut active) = self.registry.lock() {
            active.remove(&self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_conflicts() {
        let registry = WriterRegistry::new();
        let id = Uuid::new_v4();

        let lease = registry.acquire(id).unwrap();
        assert!(registry.is_held(id));

        let err = registry.acquire(id).unwrap_err();
        assert!(matches!(err, LedgerError::WriterConflict(c) if c == id));

        drop(lease);
        assert!(!registry.is_held(id));
        assert!(registry.acquire(id).is_ok());
    }

    #[test]
    fn test_distinct_ids_do_not_conflict() {
        let registry = WriterRegistry::new();
        let _a = registry.acquire(Uuid::new_v4()).unwrap();
        let _b = registry.acquire(Uuid::new_v4()).unwrap();
    }
}
