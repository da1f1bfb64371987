//! Stateful orchestration layer: per-material locking, the counter
//! reconciliation ledger, the append-only movement log, and the
//! [`InventoryEngine`] service exposing the registry and allocation
//! operations.
//!
//! Concurrency model: every material lives in its own slot behind a mutex, so
//! "validate availability + adjust counters + write rows + append history" is
//! one atomic unit per material. There is no cross-material locking; poisoned
//! locks surface as `StoreUnavailable`.

pub mod engine;
pub mod history;
pub mod ledger;

#[cfg(test)]
mod integration_tests;

pub use engine::{InventoryEngine, NewMaterial, NewSerialUnit};
pub use history::{HistoryQuery, MovementLog, MovementRecord, MovementType};
pub use ledger::Ledger;
