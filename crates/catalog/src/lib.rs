//! Material Registry + Serial Unit Tracker domain model.
//!
//! This crate contains the business rules for materials (catalog entries with
//! availability counters) and serial units (individually tracked physical
//! instances), implemented purely as deterministic domain logic (no IO, no
//! locking, no storage). Counter mutation goes through a single checked
//! primitive; the reconciliation ledger in the engine crate is its only
//! intended caller.

pub mod material;
pub mod serial;

pub use material::{ControlMode, Counter, Material, MaterialId, MaterialPatch};
pub use serial::{SerialNumber, SerialStatus, SerialUnit};
