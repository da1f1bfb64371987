//! The inventory engine: registry, tracker, state machine, and ledger wired
//! together behind per-material locks.
//!
//! Every mutation of one material — counters, serial statuses, allocation
//! rows, the history append — happens under that material's slot mutex, so a
//! reservation and its counter decrement are observed as a single atomic
//! unit. Materials are independent; there is no cross-material locking.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use stockroom_allocation::{
    Advance, Allocation, AllocationCommand, AllocationEvent, AllocationId, AllocationState,
    Cancel, CarrierInfo, CounterDeltas, Custodian, RecordWithdrawal, Reserve, ReserveSerial,
    Return, ReturnOutcome, SerialTransition, ShippingMode,
};
use stockroom_catalog::{
    ControlMode, Counter, Material, MaterialId, MaterialPatch, SerialNumber, SerialStatus,
    SerialUnit,
};
use stockroom_core::{
    ActorId, Aggregate, AggregateId, ConsumerId, DomainError, DomainEvent, DomainResult,
};

use crate::history::{HistoryQuery, MovementLog, MovementRecord, MovementType, NewMovement};
use crate::ledger::Ledger;

/// Input for material registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMaterial {
    pub name: String,
    pub category: String,
    /// Value per unit in smallest currency unit (e.g., cents).
    pub unit_value: u64,
    pub control_mode: ControlMode,
    /// Quantity-controlled: initial stock on hand. Serial-controlled: number
    /// of serial units to bulk-create with generated numbers (`SER-0001`…).
    pub initial_units: u64,
    /// Storage location for bulk-created serial units.
    pub location: String,
}

/// Input for registering one explicitly numbered serial unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSerialUnit {
    pub serial: SerialNumber,
    pub status: SerialStatus,
    pub location: String,
    pub acquired_at: DateTime<Utc>,
    pub notes: Option<String>,
}

/// One material's state: the catalog row, its serial units, and its
/// allocations. Everything in here is guarded by the slot mutex.
#[derive(Debug)]
struct MaterialSlot {
    material: Material,
    serials: BTreeMap<SerialNumber, SerialUnit>,
    allocations: HashMap<AllocationId, Allocation>,
    /// Set under the slot lock when the material is deleted, so a caller
    /// that grabbed the slot handle before removal cannot mutate an orphan.
    retired: bool,
}

/// The allocation & reconciliation engine.
#[derive(Debug, Default)]
pub struct InventoryEngine {
    slots: RwLock<HashMap<MaterialId, Arc<Mutex<MaterialSlot>>>>,
    allocation_index: RwLock<HashMap<AllocationId, MaterialId>>,
    history: MovementLog,
}

fn index_poisoned() -> DomainError {
    DomainError::store_unavailable("material index lock poisoned")
}

fn slot_poisoned() -> DomainError {
    DomainError::store_unavailable("material slot lock poisoned")
}

fn material_not_found(material_id: MaterialId) -> DomainError {
    DomainError::not_found(format!("material {material_id}"))
}

fn allocation_not_found(allocation_id: AllocationId) -> DomainError {
    DomainError::not_found(format!("allocation {allocation_id}"))
}

fn signed_quantity(quantity: u64) -> DomainResult<i64> {
    i64::try_from(quantity)
        .map_err(|_| DomainError::validation(format!("quantity {quantity} out of range")))
}

/// Audit record for one committed allocation transition.
fn movement_from_event(allocation: &Allocation, event: &AllocationEvent) -> NewMovement {
    match event {
        AllocationEvent::StockReserved(e) => NewMovement {
            movement: MovementType::Reserved,
            material_id: e.material_id,
            serial: None,
            consumer_id: Some(e.consumer_id),
            quantity: e.quantity,
            actor: e.actor,
            occurred_at: e.occurred_at,
        },
        AllocationEvent::SerialReserved(e) => NewMovement {
            movement: MovementType::Reserved,
            material_id: e.material_id,
            serial: Some(e.serial.clone()),
            consumer_id: Some(e.consumer_id),
            quantity: 1,
            actor: e.actor,
            occurred_at: e.occurred_at,
        },
        AllocationEvent::StageAdvanced(e) => NewMovement {
            movement: MovementType::StageAdvanced,
            material_id: e.material_id,
            serial: allocation.serial().cloned(),
            consumer_id: allocation.consumer_id(),
            quantity: allocation.quantity_outstanding(),
            actor: e.actor,
            occurred_at: e.occurred_at,
        },
        AllocationEvent::WithdrawalRecorded(e) => NewMovement {
            movement: MovementType::WithdrawalRecorded,
            material_id: e.material_id,
            serial: allocation.serial().cloned(),
            consumer_id: allocation.consumer_id(),
            quantity: allocation.quantity_outstanding(),
            actor: e.actor,
            occurred_at: e.occurred_at,
        },
        AllocationEvent::StockReturned(e) => NewMovement {
            movement: e.outcome.into(),
            material_id: e.material_id,
            serial: e.serial.clone(),
            consumer_id: allocation.consumer_id(),
            quantity: e.quantity,
            actor: e.actor,
            occurred_at: e.occurred_at,
        },
        AllocationEvent::AllocationCancelled(e) => NewMovement {
            movement: MovementType::Cancelled,
            material_id: e.material_id,
            serial: e.serial.clone(),
            consumer_id: allocation.consumer_id(),
            quantity: e.quantity_outstanding,
            actor: e.actor,
            occurred_at: e.occurred_at,
        },
    }
}

impl InventoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot_handle(&self, material_id: MaterialId) -> DomainResult<Arc<Mutex<MaterialSlot>>> {
        let slots = self.slots.read().map_err(|_| index_poisoned())?;
        slots
            .get(&material_id)
            .cloned()
            .ok_or_else(|| material_not_found(material_id))
    }

    fn material_of(&self, allocation_id: AllocationId) -> DomainResult<MaterialId> {
        let index = self.allocation_index.read().map_err(|_| index_poisoned())?;
        index
            .get(&allocation_id)
            .copied()
            .ok_or_else(|| allocation_not_found(allocation_id))
    }

    /// Commit one allocation transition: ledger deltas, serial status change,
    /// history append, state evolution. Effects are staged first so a
    /// rejected transition writes nothing.
    fn commit_event(
        &self,
        material: &mut Material,
        serials: &mut BTreeMap<SerialNumber, SerialUnit>,
        allocation: &mut Allocation,
        event: &AllocationEvent,
    ) -> DomainResult<()> {
        let mut staged_material = material.clone();
        Ledger::apply(&mut staged_material, event.counter_deltas())?;

        let staged_unit = match event.serial_transition() {
            Some((serial, transition)) => {
                let mut unit = serials.get(serial).cloned().ok_or_else(|| {
                    DomainError::not_found(format!(
                        "serial {serial} of material {}",
                        material.id_typed()
                    ))
                })?;
                match transition {
                    SerialTransition::CheckOut => unit.checkout()?,
                    SerialTransition::Release => unit.release()?,
                    SerialTransition::SendToMaintenance => unit.send_to_maintenance()?,
                    SerialTransition::MarkLost => unit.mark_lost()?,
                }
                Some(unit)
            }
            None => None,
        };

        self.history.append(movement_from_event(allocation, event))?;

        *material = staged_material;
        if let Some(unit) = staged_unit {
            serials.insert(unit.serial().clone(), unit);
        }
        allocation.apply(event);

        debug!(
            allocation_id = %allocation.id_typed(),
            event = event.event_type(),
            "allocation transition committed"
        );
        Ok(())
    }

    // ----- Material registry -------------------------------------------------

    pub fn add_material(&self, new: NewMaterial, actor: ActorId) -> DomainResult<MaterialId> {
        let material_id = MaterialId::new(AggregateId::new());
        let mut material = Material::new(
            material_id,
            new.name,
            new.category,
            new.unit_value,
            new.control_mode,
        )?;
        let initial = signed_quantity(new.initial_units)?;
        let now = Utc::now();

        let mut serials = BTreeMap::new();
        if new.control_mode == ControlMode::Serial {
            for n in 1..=new.initial_units {
                let serial = SerialNumber::new(format!("SER-{n:04}"))?;
                serials.insert(
                    serial.clone(),
                    SerialUnit::new(
                        material_id,
                        serial,
                        SerialStatus::Available,
                        new.location.clone(),
                        now,
                    ),
                );
            }
        }
        if initial > 0 {
            Ledger::apply(
                &mut material,
                CounterDeltas {
                    available: initial,
                    total: initial,
                },
            )?;
        }

        let slot = MaterialSlot {
            material,
            serials,
            allocations: HashMap::new(),
            retired: false,
        };
        {
            let mut slots = self.slots.write().map_err(|_| index_poisoned())?;
            slots.insert(material_id, Arc::new(Mutex::new(slot)));
        }

        self.history.append(NewMovement {
            movement: MovementType::MaterialRegistered,
            material_id,
            serial: None,
            consumer_id: None,
            quantity: new.initial_units,
            actor,
            occurred_at: now,
        })?;
        info!(%material_id, units = new.initial_units, "material registered");
        Ok(material_id)
    }

    /// Update descriptive fields only; counters are never touched here.
    pub fn edit_material(
        &self,
        material_id: MaterialId,
        patch: MaterialPatch,
        _actor: ActorId,
    ) -> DomainResult<Material> {
        let handle = self.slot_handle(material_id)?;
        let mut slot = handle.lock().map_err(|_| slot_poisoned())?;
        if slot.retired {
            return Err(material_not_found(material_id));
        }
        slot.material.apply_patch(&patch)?;
        Ok(slot.material.clone())
    }

    pub fn remove_material(&self, material_id: MaterialId, actor: ActorId) -> DomainResult<()> {
        let mut slots = self.slots.write().map_err(|_| index_poisoned())?;
        let handle = slots
            .get(&material_id)
            .cloned()
            .ok_or_else(|| material_not_found(material_id))?;
        let mut slot = handle.lock().map_err(|_| slot_poisoned())?;
        if slot.retired {
            return Err(material_not_found(material_id));
        }

        let in_use = slot
            .serials
            .values()
            .filter(|u| u.status() == SerialStatus::InUse)
            .count();
        if in_use > 0 {
            return Err(DomainError::conflict(format!("{in_use} unit(s) in use")));
        }
        let open = slot.allocations.values().filter(|a| a.is_open()).count();
        if open > 0 {
            return Err(DomainError::conflict(format!(
                "{open} open allocation(s) outstanding"
            )));
        }

        let quantity = slot.material.quantity_total();
        slot.retired = true;
        slots.remove(&material_id);
        drop(slot);
        drop(slots);

        let mut index = self.allocation_index.write().map_err(|_| index_poisoned())?;
        index.retain(|_, owner| *owner != material_id);
        drop(index);

        self.history.append(NewMovement {
            movement: MovementType::MaterialRemoved,
            material_id,
            serial: None,
            consumer_id: None,
            quantity,
            actor,
            occurred_at: Utc::now(),
        })?;
        info!(%material_id, "material removed");
        Ok(())
    }

    /// Quantity-controlled restock: raises total and available together.
    pub fn receive_stock(
        &self,
        material_id: MaterialId,
        quantity: u64,
        actor: ActorId,
    ) -> DomainResult<Material> {
        if quantity == 0 {
            return Err(DomainError::validation("received quantity must be positive"));
        }
        let delta = signed_quantity(quantity)?;

        let handle = self.slot_handle(material_id)?;
        let mut slot = handle.lock().map_err(|_| slot_poisoned())?;
        if slot.retired {
            return Err(material_not_found(material_id));
        }
        if slot.material.control_mode() != ControlMode::Quantity {
            return Err(DomainError::validation(format!(
                "material {material_id} is serial-controlled; register serial units instead"
            )));
        }

        Ledger::apply(
            &mut slot.material,
            CounterDeltas {
                available: delta,
                total: delta,
            },
        )?;
        self.history.append(NewMovement {
            movement: MovementType::StockReceived,
            material_id,
            serial: None,
            consumer_id: None,
            quantity,
            actor,
            occurred_at: Utc::now(),
        })?;
        Ok(slot.material.clone())
    }

    // ----- Serial unit tracker ----------------------------------------------

    pub fn add_serial_unit(
        &self,
        material_id: MaterialId,
        new: NewSerialUnit,
        actor: ActorId,
    ) -> DomainResult<()> {
        let handle = self.slot_handle(material_id)?;
        let mut slot = handle.lock().map_err(|_| slot_poisoned())?;
        if slot.retired {
            return Err(material_not_found(material_id));
        }
        if slot.material.control_mode() != ControlMode::Serial {
            return Err(DomainError::validation(format!(
                "material {material_id} is quantity-controlled; use receive_stock"
            )));
        }
        if new.status == SerialStatus::InUse {
            return Err(DomainError::validation(
                "a serial unit cannot be registered as in use",
            ));
        }
        if slot.serials.contains_key(&new.serial) {
            return Err(DomainError::conflict(format!(
                "serial {} already exists for material {material_id}",
                new.serial
            )));
        }

        Ledger::apply(
            &mut slot.material,
            CounterDeltas {
                available: if new.status == SerialStatus::Available {
                    1
                } else {
                    0
                },
                total: 1,
            },
        )?;

        let mut unit = SerialUnit::new(
            material_id,
            new.serial.clone(),
            new.status,
            new.location,
            new.acquired_at,
        );
        unit.set_notes(new.notes);
        slot.serials.insert(new.serial.clone(), unit);

        self.history.append(NewMovement {
            movement: MovementType::SerialAdded,
            material_id,
            serial: Some(new.serial),
            consumer_id: None,
            quantity: 1,
            actor,
            occurred_at: Utc::now(),
        })?;
        Ok(())
    }

    pub fn remove_serial_unit(
        &self,
        material_id: MaterialId,
        serial: SerialNumber,
        actor: ActorId,
    ) -> DomainResult<()> {
        let handle = self.slot_handle(material_id)?;
        let mut slot = handle.lock().map_err(|_| slot_poisoned())?;
        if slot.retired {
            return Err(material_not_found(material_id));
        }
        let unit = slot
            .serials
            .get(&serial)
            .ok_or_else(|| DomainError::not_found(format!("serial {serial}")))?;
        if !unit.is_deletable() {
            return Err(DomainError::conflict(format!("serial {serial} in use")));
        }

        let was_available = unit.status() == SerialStatus::Available;
        Ledger::apply(
            &mut slot.material,
            CounterDeltas {
                available: if was_available { -1 } else { 0 },
                total: -1,
            },
        )?;
        slot.serials.remove(&serial);

        self.history.append(NewMovement {
            movement: MovementType::SerialRemoved,
            material_id,
            serial: Some(serial),
            consumer_id: None,
            quantity: 1,
            actor,
            occurred_at: Utc::now(),
        })?;
        Ok(())
    }

    /// Take an idle unit out of stock for maintenance.
    pub fn begin_maintenance(
        &self,
        material_id: MaterialId,
        serial: SerialNumber,
        actor: ActorId,
    ) -> DomainResult<()> {
        let handle = self.slot_handle(material_id)?;
        let mut slot = handle.lock().map_err(|_| slot_poisoned())?;
        if slot.retired {
            return Err(material_not_found(material_id));
        }
        let MaterialSlot {
            material, serials, ..
        } = &mut *slot;
        let unit = serials
            .get_mut(&serial)
            .ok_or_else(|| DomainError::not_found(format!("serial {serial}")))?;
        if unit.status() == SerialStatus::InUse {
            return Err(DomainError::conflict(format!("serial {serial} in use")));
        }

        // Stage: availability moves only when the unit was on the shelf.
        let was_available = unit.status() == SerialStatus::Available;
        unit.send_to_maintenance()?;
        if was_available {
            Ledger::adjust(material, Counter::Available, -1)?;
        }

        self.history.append(NewMovement {
            movement: MovementType::MaintenanceStarted,
            material_id,
            serial: Some(serial),
            consumer_id: None,
            quantity: 1,
            actor,
            occurred_at: Utc::now(),
        })?;
        Ok(())
    }

    /// Maintenance finished; the unit returns to stock.
    pub fn complete_maintenance(
        &self,
        material_id: MaterialId,
        serial: SerialNumber,
        actor: ActorId,
    ) -> DomainResult<()> {
        let handle = self.slot_handle(material_id)?;
        let mut slot = handle.lock().map_err(|_| slot_poisoned())?;
        if slot.retired {
            return Err(material_not_found(material_id));
        }
        let MaterialSlot {
            material, serials, ..
        } = &mut *slot;
        let unit = serials
            .get_mut(&serial)
            .ok_or_else(|| DomainError::not_found(format!("serial {serial}")))?;

        let now = Utc::now();
        unit.complete_maintenance(now)?;
        Ledger::adjust(material, Counter::Available, 1)?;

        self.history.append(NewMovement {
            movement: MovementType::MaintenanceCompleted,
            material_id,
            serial: Some(serial),
            consumer_id: None,
            quantity: 1,
            actor,
            occurred_at: now,
        })?;
        Ok(())
    }

    pub fn relocate_serial(
        &self,
        material_id: MaterialId,
        serial: SerialNumber,
        location: impl Into<String>,
        actor: ActorId,
    ) -> DomainResult<()> {
        let handle = self.slot_handle(material_id)?;
        let mut slot = handle.lock().map_err(|_| slot_poisoned())?;
        if slot.retired {
            return Err(material_not_found(material_id));
        }
        let unit = slot
            .serials
            .get_mut(&serial)
            .ok_or_else(|| DomainError::not_found(format!("serial {serial}")))?;
        unit.relocate(location);

        self.history.append(NewMovement {
            movement: MovementType::Relocated,
            material_id,
            serial: Some(serial),
            consumer_id: None,
            quantity: 1,
            actor,
            occurred_at: Utc::now(),
        })?;
        Ok(())
    }

    // ----- Allocation lifecycle ---------------------------------------------

    /// Reserve a quantity of fungible stock for a consumer.
    pub fn reserve(
        &self,
        material_id: MaterialId,
        consumer_id: ConsumerId,
        quantity: u64,
        shipping_mode: ShippingMode,
        actor: ActorId,
    ) -> DomainResult<AllocationId> {
        let handle = self.slot_handle(material_id)?;
        let mut slot = handle.lock().map_err(|_| slot_poisoned())?;
        if slot.retired {
            return Err(material_not_found(material_id));
        }
        let MaterialSlot {
            material,
            serials,
            allocations,
            ..
        } = &mut *slot;

        if material.control_mode() != ControlMode::Quantity {
            return Err(DomainError::validation(format!(
                "material {material_id} is serial-controlled; reserve a specific serial"
            )));
        }
        if quantity > material.quantity_available() {
            return Err(DomainError::insufficient_stock(
                quantity,
                material.quantity_available(),
            ));
        }

        let allocation_id = AllocationId::new(AggregateId::new());
        let mut allocation = Allocation::empty(allocation_id);
        let events = allocation.handle(&AllocationCommand::Reserve(Reserve {
            allocation_id,
            material_id,
            consumer_id,
            quantity,
            shipping_mode,
            actor,
            occurred_at: Utc::now(),
        }))?;
        for event in &events {
            self.commit_event(material, serials, &mut allocation, event)?;
        }
        allocations.insert(allocation_id, allocation);
        drop(slot);

        let mut index = self.allocation_index.write().map_err(|_| index_poisoned())?;
        index.insert(allocation_id, material_id);
        drop(index);

        info!(%allocation_id, %material_id, quantity, "stock reserved");
        Ok(allocation_id)
    }

    /// Reserve one specific serial unit for a consumer.
    pub fn reserve_serial(
        &self,
        material_id: MaterialId,
        serial: SerialNumber,
        consumer_id: ConsumerId,
        shipping_mode: ShippingMode,
        actor: ActorId,
    ) -> DomainResult<AllocationId> {
        let handle = self.slot_handle(material_id)?;
        let mut slot = handle.lock().map_err(|_| slot_poisoned())?;
        if slot.retired {
            return Err(material_not_found(material_id));
        }
        let MaterialSlot {
            material,
            serials,
            allocations,
            ..
        } = &mut *slot;

        if material.control_mode() != ControlMode::Serial {
            return Err(DomainError::validation(format!(
                "material {material_id} is quantity-controlled; reserve by quantity"
            )));
        }
        let unit = serials
            .get(&serial)
            .ok_or_else(|| DomainError::not_found(format!("serial {serial}")))?;
        unit.ensure_available()?;

        let allocation_id = AllocationId::new(AggregateId::new());
        let mut allocation = Allocation::empty(allocation_id);
        let events = allocation.handle(&AllocationCommand::ReserveSerial(ReserveSerial {
            allocation_id,
            material_id,
            consumer_id,
            serial: serial.clone(),
            shipping_mode,
            actor,
            occurred_at: Utc::now(),
        }))?;
        for event in &events {
            self.commit_event(material, serials, &mut allocation, event)?;
        }
        allocations.insert(allocation_id, allocation);
        drop(slot);

        let mut index = self.allocation_index.write().map_err(|_| index_poisoned())?;
        index.insert(allocation_id, material_id);
        drop(index);

        info!(%allocation_id, %material_id, %serial, "serial reserved");
        Ok(allocation_id)
    }

    fn mutate_allocation(
        &self,
        allocation_id: AllocationId,
        command: AllocationCommand,
    ) -> DomainResult<Allocation> {
        let material_id = self.material_of(allocation_id)?;
        let handle = self.slot_handle(material_id)?;
        let mut slot = handle.lock().map_err(|_| slot_poisoned())?;
        if slot.retired {
            return Err(material_not_found(material_id));
        }
        let MaterialSlot {
            material,
            serials,
            allocations,
            ..
        } = &mut *slot;

        let allocation = allocations
            .get_mut(&allocation_id)
            .ok_or_else(|| allocation_not_found(allocation_id))?;
        let events = allocation.handle(&command)?;
        for event in &events {
            self.commit_event(material, serials, allocation, event)?;
        }
        Ok(allocation.clone())
    }

    /// Advance the allocation to the next forward stage
    /// (`separated → in-transit → delivered`), optionally recording carrier
    /// metadata. No counter effect.
    pub fn advance(
        &self,
        allocation_id: AllocationId,
        to: AllocationState,
        carrier: Option<CarrierInfo>,
        actor: ActorId,
    ) -> DomainResult<Allocation> {
        self.mutate_allocation(
            allocation_id,
            AllocationCommand::Advance(Advance {
                allocation_id,
                to,
                carrier,
                actor,
                occurred_at: Utc::now(),
            }),
        )
    }

    /// Record the custody handoff of a delivered allocation.
    pub fn record_withdrawal(
        &self,
        allocation_id: AllocationId,
        custodian: Custodian,
        actor: ActorId,
    ) -> DomainResult<Allocation> {
        self.mutate_allocation(
            allocation_id,
            AllocationCommand::RecordWithdrawal(RecordWithdrawal {
                allocation_id,
                custodian,
                actor,
                occurred_at: Utc::now(),
            }),
        )
    }

    /// Return stock with an outcome; counters and serial status follow the
    /// outcome's delta table.
    pub fn return_allocation(
        &self,
        allocation_id: AllocationId,
        outcome: ReturnOutcome,
        quantity: u64,
        actor: ActorId,
    ) -> DomainResult<Allocation> {
        self.mutate_allocation(
            allocation_id,
            AllocationCommand::Return(Return {
                allocation_id,
                outcome,
                quantity,
                actor,
                occurred_at: Utc::now(),
            }),
        )
    }

    /// Administrative correction: reverse exactly the counter effects the
    /// allocation's creation caused, then delete the row.
    pub fn cancel_allocation(&self, allocation_id: AllocationId, actor: ActorId) -> DomainResult<()> {
        let material_id = self.material_of(allocation_id)?;
        let handle = self.slot_handle(material_id)?;
        let mut slot = handle.lock().map_err(|_| slot_poisoned())?;
        if slot.retired {
            return Err(material_not_found(material_id));
        }
        let MaterialSlot {
            material,
            serials,
            allocations,
            ..
        } = &mut *slot;

        let allocation = allocations
            .get_mut(&allocation_id)
            .ok_or_else(|| allocation_not_found(allocation_id))?;
        let events = allocation.handle(&AllocationCommand::Cancel(Cancel {
            allocation_id,
            actor,
            occurred_at: Utc::now(),
        }))?;
        for event in &events {
            self.commit_event(material, serials, allocation, event)?;
        }
        allocations.remove(&allocation_id);
        drop(slot);

        let mut index = self.allocation_index.write().map_err(|_| index_poisoned())?;
        index.remove(&allocation_id);
        drop(index);

        info!(%allocation_id, "allocation cancelled");
        Ok(())
    }

    // ----- Queries -----------------------------------------------------------

    pub fn material(&self, material_id: MaterialId) -> DomainResult<Material> {
        let handle = self.slot_handle(material_id)?;
        let slot = handle.lock().map_err(|_| slot_poisoned())?;
        if slot.retired {
            return Err(material_not_found(material_id));
        }
        Ok(slot.material.clone())
    }

    pub fn materials(&self) -> DomainResult<Vec<Material>> {
        let handles: Vec<_> = {
            let slots = self.slots.read().map_err(|_| index_poisoned())?;
            slots.values().cloned().collect()
        };
        let mut materials = Vec::with_capacity(handles.len());
        for handle in handles {
            let slot = handle.lock().map_err(|_| slot_poisoned())?;
            if !slot.retired {
                materials.push(slot.material.clone());
            }
        }
        materials.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(materials)
    }

    pub fn serial_unit(
        &self,
        material_id: MaterialId,
        serial: &SerialNumber,
    ) -> DomainResult<SerialUnit> {
        let handle = self.slot_handle(material_id)?;
        let slot = handle.lock().map_err(|_| slot_poisoned())?;
        if slot.retired {
            return Err(material_not_found(material_id));
        }
        slot.serials
            .get(serial)
            .cloned()
            .ok_or_else(|| DomainError::not_found(format!("serial {serial}")))
    }

    pub fn serial_units(&self, material_id: MaterialId) -> DomainResult<Vec<SerialUnit>> {
        let handle = self.slot_handle(material_id)?;
        let slot = handle.lock().map_err(|_| slot_poisoned())?;
        if slot.retired {
            return Err(material_not_found(material_id));
        }
        Ok(slot.serials.values().cloned().collect())
    }

    pub fn allocation(&self, allocation_id: AllocationId) -> DomainResult<Allocation> {
        let material_id = self.material_of(allocation_id)?;
        let handle = self.slot_handle(material_id)?;
        let slot = handle.lock().map_err(|_| slot_poisoned())?;
        slot.allocations
            .get(&allocation_id)
            .cloned()
            .ok_or_else(|| allocation_not_found(allocation_id))
    }

    pub fn open_allocations(&self, material_id: MaterialId) -> DomainResult<Vec<Allocation>> {
        let handle = self.slot_handle(material_id)?;
        let slot = handle.lock().map_err(|_| slot_poisoned())?;
        if slot.retired {
            return Err(material_not_found(material_id));
        }
        Ok(slot
            .allocations
            .values()
            .filter(|a| a.is_open())
            .cloned()
            .collect())
    }

    pub fn query_history(&self, query: &HistoryQuery) -> DomainResult<Vec<MovementRecord>> {
        self.history.query(query)
    }
}
