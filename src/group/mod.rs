//! Grouped multi-servo transactions: one broadcast frame per round.
//!
//! Groups are value state plus a fixed `(start_address, data_length)`
//! window; they borrow the packet handler per call and never outlive the
//! port. On-wire id order is ascending regardless of insertion order, so a
//! given membership always emits the same bytes.

mod sync_read;
mod sync_write;

pub use sync_read::GroupSyncRead;
pub use sync_write::GroupSyncWrite;
