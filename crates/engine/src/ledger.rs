//! Counter reconciliation ledger.
//!
//! The ledger is the sole writer of `quantity_available`/`quantity_total` on
//! materials. Every other component computes deltas and hands them here; raw
//! counter writes are forbidden by contract. Callers hold the owning
//! material's slot lock, so an adjustment and the state change that triggered
//! it commit as one atomic unit.

use tracing::debug;

use stockroom_allocation::CounterDeltas;
use stockroom_catalog::{Counter, Material};
use stockroom_core::DomainResult;

#[derive(Debug)]
pub struct Ledger;

impl Ledger {
    /// The atomic primitive: adjust one counter by a signed delta.
    ///
    /// Fails (never clamps) when the adjustment would push `available` below
    /// zero or above `total`, or `total` below `available`.
    pub fn adjust(material: &mut Material, counter: Counter, delta: i64) -> DomainResult<()> {
        if delta == 0 {
            return Ok(());
        }
        material.adjust_counter(counter, delta)?;
        debug!(
            material_id = %material.id_typed(),
            ?counter,
            delta,
            available = material.quantity_available(),
            total = material.quantity_total(),
            "counter adjusted"
        );
        Ok(())
    }

    /// Apply the full counter effect of one transition, all-or-nothing.
    ///
    /// Growth of `total` is applied before `available` and shrinkage after,
    /// so no intermediate step can trip the bounds a valid pair satisfies.
    pub fn apply(material: &mut Material, deltas: CounterDeltas) -> DomainResult<()> {
        if deltas.is_zero() {
            return Ok(());
        }

        // Stage on a copy so a rejected pair leaves the material untouched.
        let mut staged = material.clone();
        if deltas.total > 0 {
            staged.adjust_counter(Counter::Total, deltas.total)?;
        }
        if deltas.available != 0 {
            staged.adjust_counter(Counter::Available, deltas.available)?;
        }
        if deltas.total < 0 {
            staged.adjust_counter(Counter::Total, deltas.total)?;
        }
        *material = staged;

        debug!(
            material_id = %material.id_typed(),
            available_delta = deltas.available,
            total_delta = deltas.total,
            available = material.quantity_available(),
            total = material.quantity_total(),
            "counters reconciled"
        );
        Ok(())
    }
}
