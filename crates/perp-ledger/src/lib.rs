//! In-memory ledgers backing the engine's persistence traits.
//!
//! The paper and live sides of the engine each hold their own position and
//! account ledger pair; the audit log and blacklist are shared. Everything
//! here is process-local and lock-protected.

mod account;
mod audit;
mod blacklist;
mod positions;
mod writer;

pub use account::MemoryAccountLedger;
pub use audit::MemoryAuditLog;
pub use blacklist::{Blacklist, BlacklistEntry, BlacklistScope};
pub use positions::MemoryPositionLedger;
pub use writer::{WriterLease, WriterRegistry};
