//! End-to-end scenarios against the public engine API: full lifecycles,
//! counter reconciliation, serial transitions, concurrency.

use std::sync::Arc;

use proptest::prelude::*;

use stockroom_allocation::{
    AllocationState, CarrierInfo, Custodian, ReturnOutcome, ShippingMode,
};
use stockroom_catalog::{ControlMode, SerialNumber, SerialStatus};
use stockroom_core::{ActorId, ConsumerId, DomainError};

use crate::engine::{InventoryEngine, NewMaterial, NewSerialUnit};
use crate::history::{HistoryQuery, MovementType};

fn actor() -> ActorId {
    ActorId::new()
}

fn consumer() -> ConsumerId {
    ConsumerId::new()
}

fn quantity_material(engine: &InventoryEngine, initial: u64) -> stockroom_catalog::MaterialId {
    engine
        .add_material(
            NewMaterial {
                name: "Folding Chair".to_string(),
                category: "Furniture".to_string(),
                unit_value: 2_500,
                control_mode: ControlMode::Quantity,
                initial_units: initial,
                location: "warehouse A".to_string(),
            },
            actor(),
        )
        .unwrap()
}

fn serial_material(engine: &InventoryEngine, units: u64) -> stockroom_catalog::MaterialId {
    engine
        .add_material(
            NewMaterial {
                name: "Projector".to_string(),
                category: "AV".to_string(),
                unit_value: 150_000,
                control_mode: ControlMode::Serial,
                initial_units: units,
                location: "warehouse A".to_string(),
            },
            actor(),
        )
        .unwrap()
}

fn ser(n: &str) -> SerialNumber {
    SerialNumber::new(n).unwrap()
}

#[test]
fn quantity_lifecycle_restores_availability_on_clean_return() {
    let engine = InventoryEngine::new();
    let material_id = quantity_material(&engine, 100);

    let allocation_id = engine
        .reserve(material_id, consumer(), 20, ShippingMode::AdvanceShipment, actor())
        .unwrap();

    let m = engine.material(material_id).unwrap();
    assert_eq!(m.quantity_available(), 80);
    assert_eq!(m.quantity_total(), 100);

    engine
        .advance(allocation_id, AllocationState::Separated, None, actor())
        .unwrap();
    engine
        .advance(
            allocation_id,
            AllocationState::InTransit,
            Some(CarrierInfo {
                carrier: "Translog".to_string(),
                tracking_code: Some("TRK-42".to_string()),
            }),
            actor(),
        )
        .unwrap();
    let delivered = engine
        .advance(allocation_id, AllocationState::Delivered, None, actor())
        .unwrap();
    assert_eq!(delivered.carrier().unwrap().carrier, "Translog");

    engine
        .record_withdrawal(
            allocation_id,
            Custodian {
                name: "Ana".to_string(),
                document: Some("12345".to_string()),
                phone: None,
            },
            actor(),
        )
        .unwrap();

    let closed = engine
        .return_allocation(allocation_id, ReturnOutcome::ReturnedOk, 20, actor())
        .unwrap();
    assert_eq!(closed.state(), AllocationState::Closed);
    assert_eq!(closed.outcome(), Some(ReturnOutcome::ReturnedOk));

    let m = engine.material(material_id).unwrap();
    assert_eq!(m.quantity_available(), 100);
    assert_eq!(m.quantity_total(), 100);

    // Closed allocation stays queryable; it is not an open one.
    let row = engine.allocation(allocation_id).unwrap();
    assert!(!row.is_open());
    assert!(engine.open_allocations(material_id).unwrap().is_empty());
}

#[test]
fn damaged_lost_and_consumed_returns_shrink_total_permanently() {
    let engine = InventoryEngine::new();
    let material_id = quantity_material(&engine, 50);

    let allocation_id = engine
        .reserve(material_id, consumer(), 30, ShippingMode::WithStaff, actor())
        .unwrap();

    engine
        .return_allocation(allocation_id, ReturnOutcome::ReturnedDamaged, 10, actor())
        .unwrap();
    engine
        .return_allocation(allocation_id, ReturnOutcome::Lost, 5, actor())
        .unwrap();
    let closed = engine
        .return_allocation(allocation_id, ReturnOutcome::Consumed, 15, actor())
        .unwrap();
    assert_eq!(closed.state(), AllocationState::Closed);

    // 30 went out, none came back usable: total 50 -> 20, available stays 20.
    let m = engine.material(material_id).unwrap();
    assert_eq!(m.quantity_total(), 20);
    assert_eq!(m.quantity_available(), 20);
}

#[test]
fn serial_lifecycle_walks_unit_through_maintenance_and_back() {
    let engine = InventoryEngine::new();
    let material_id = serial_material(&engine, 3);

    // Bulk-generated numbers.
    let units = engine.serial_units(material_id).unwrap();
    assert_eq!(units.len(), 3);
    assert_eq!(units[0].serial().as_str(), "SER-0001");
    assert_eq!(units[2].serial().as_str(), "SER-0003");

    let allocation_id = engine
        .reserve_serial(
            material_id,
            ser("SER-0002"),
            consumer(),
            ShippingMode::WithStaff,
            actor(),
        )
        .unwrap();

    let m = engine.material(material_id).unwrap();
    assert_eq!(m.quantity_available(), 2);
    assert_eq!(m.quantity_total(), 3);
    assert_eq!(
        engine
            .serial_unit(material_id, &ser("SER-0002"))
            .unwrap()
            .status(),
        SerialStatus::InUse
    );

    // Damaged return: unit goes to maintenance, counters do not move.
    engine
        .return_allocation(allocation_id, ReturnOutcome::ReturnedDamaged, 1, actor())
        .unwrap();
    let m = engine.material(material_id).unwrap();
    assert_eq!(m.quantity_available(), 2);
    assert_eq!(m.quantity_total(), 3);
    assert_eq!(
        engine
            .serial_unit(material_id, &ser("SER-0002"))
            .unwrap()
            .status(),
        SerialStatus::Maintenance
    );

    engine
        .complete_maintenance(material_id, ser("SER-0002"), actor())
        .unwrap();
    let m = engine.material(material_id).unwrap();
    assert_eq!(m.quantity_available(), 3);
    assert!(
        engine
            .serial_unit(material_id, &ser("SER-0002"))
            .unwrap()
            .last_maintenance_at()
            .is_some()
    );
}

#[test]
fn reserve_rejects_insufficient_stock_with_both_figures() {
    let engine = InventoryEngine::new();
    let material_id = quantity_material(&engine, 10);
    engine
        .reserve(material_id, consumer(), 4, ShippingMode::WithStaff, actor())
        .unwrap();

    let err = engine
        .reserve(material_id, consumer(), 7, ShippingMode::WithStaff, actor())
        .unwrap_err();
    match err {
        DomainError::InsufficientStock {
            requested,
            available,
        } => {
            assert_eq!(requested, 7);
            assert_eq!(available, 6);
        }
        other => panic!("expected InsufficientStock, got {other:?}"),
    }

    // The failed attempt left no trace.
    let m = engine.material(material_id).unwrap();
    assert_eq!(m.quantity_available(), 6);
    let history = engine
        .query_history(&HistoryQuery {
            material_id: Some(material_id),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(history.len(), 2); // registered + first reserve
}

#[test]
fn reserve_serial_reports_the_blocking_status() {
    let engine = InventoryEngine::new();
    let material_id = serial_material(&engine, 2);

    engine
        .reserve_serial(
            material_id,
            ser("SER-0001"),
            consumer(),
            ShippingMode::WithStaff,
            actor(),
        )
        .unwrap();

    let err = engine
        .reserve_serial(
            material_id,
            ser("SER-0001"),
            consumer(),
            ShippingMode::WithStaff,
            actor(),
        )
        .unwrap_err();
    match err {
        DomainError::Conflict(msg) if msg.contains("already in use") => {}
        other => panic!("expected Conflict(already in use), got {other:?}"),
    }

    engine
        .begin_maintenance(material_id, ser("SER-0002"), actor())
        .unwrap();
    let err = engine
        .reserve_serial(
            material_id,
            ser("SER-0002"),
            consumer(),
            ShippingMode::WithStaff,
            actor(),
        )
        .unwrap_err();
    match err {
        DomainError::Conflict(msg) if msg.contains("in maintenance") => {}
        other => panic!("expected Conflict(in maintenance), got {other:?}"),
    }
}

#[test]
fn cancel_restores_outstanding_quantity_and_deletes_the_row() {
    let engine = InventoryEngine::new();
    let material_id = quantity_material(&engine, 40);

    let allocation_id = engine
        .reserve(material_id, consumer(), 25, ShippingMode::AdvanceShipment, actor())
        .unwrap();
    engine
        .return_allocation(allocation_id, ReturnOutcome::ReturnedOk, 10, actor())
        .unwrap();

    engine.cancel_allocation(allocation_id, actor()).unwrap();

    let m = engine.material(material_id).unwrap();
    assert_eq!(m.quantity_available(), 40);
    assert_eq!(m.quantity_total(), 40);

    let err = engine.allocation(allocation_id).unwrap_err();
    assert!(matches!(err, DomainError::NotFound(_)));
    let err = engine.cancel_allocation(allocation_id, actor()).unwrap_err();
    assert!(matches!(err, DomainError::NotFound(_)));
}

#[test]
fn cancel_releases_a_reserved_serial_unit() {
    let engine = InventoryEngine::new();
    let material_id = serial_material(&engine, 1);

    let allocation_id = engine
        .reserve_serial(
            material_id,
            ser("SER-0001"),
            consumer(),
            ShippingMode::WithStaff,
            actor(),
        )
        .unwrap();
    engine.cancel_allocation(allocation_id, actor()).unwrap();

    assert_eq!(
        engine
            .serial_unit(material_id, &ser("SER-0001"))
            .unwrap()
            .status(),
        SerialStatus::Available
    );
    assert_eq!(engine.material(material_id).unwrap().quantity_available(), 1);
}

#[test]
fn remove_material_is_blocked_while_stock_is_out() {
    let engine = InventoryEngine::new();
    let material_id = quantity_material(&engine, 10);
    let allocation_id = engine
        .reserve(material_id, consumer(), 3, ShippingMode::WithStaff, actor())
        .unwrap();

    let err = engine.remove_material(material_id, actor()).unwrap_err();
    match err {
        DomainError::Conflict(msg) if msg.contains("open allocation") => {}
        other => panic!("expected Conflict(open allocation), got {other:?}"),
    }

    engine
        .return_allocation(allocation_id, ReturnOutcome::ReturnedOk, 3, actor())
        .unwrap();
    engine.remove_material(material_id, actor()).unwrap();

    let err = engine.material(material_id).unwrap_err();
    assert!(matches!(err, DomainError::NotFound(_)));
}

#[test]
fn remove_material_is_blocked_by_units_in_use() {
    let engine = InventoryEngine::new();
    let material_id = serial_material(&engine, 2);
    engine
        .reserve_serial(
            material_id,
            ser("SER-0001"),
            consumer(),
            ShippingMode::WithStaff,
            actor(),
        )
        .unwrap();

    let err = engine.remove_material(material_id, actor()).unwrap_err();
    match err {
        DomainError::Conflict(msg) if msg.contains("unit(s) in use") => {}
        other => panic!("expected Conflict(units in use), got {other:?}"),
    }
}

#[test]
fn serial_unit_registry_keeps_counters_in_step() {
    let engine = InventoryEngine::new();
    let material_id = serial_material(&engine, 0);

    engine
        .add_serial_unit(
            material_id,
            NewSerialUnit {
                serial: ser("PRJ-17"),
                status: SerialStatus::Available,
                location: "warehouse B".to_string(),
                acquired_at: chrono::Utc::now(),
                notes: Some("refurbished".to_string()),
            },
            actor(),
        )
        .unwrap();
    engine
        .add_serial_unit(
            material_id,
            NewSerialUnit {
                serial: ser("PRJ-18"),
                status: SerialStatus::Maintenance,
                location: "repair shop".to_string(),
                acquired_at: chrono::Utc::now(),
                notes: None,
            },
            actor(),
        )
        .unwrap();

    let m = engine.material(material_id).unwrap();
    assert_eq!(m.quantity_total(), 2);
    assert_eq!(m.quantity_available(), 1);

    let unit = engine.serial_unit(material_id, &ser("PRJ-17")).unwrap();
    assert_eq!(unit.notes(), Some("refurbished"));
    assert_eq!(unit.location(), "warehouse B");

    let err = engine
        .add_serial_unit(
            material_id,
            NewSerialUnit {
                serial: ser("PRJ-17"),
                status: SerialStatus::Available,
                location: "warehouse B".to_string(),
                acquired_at: chrono::Utc::now(),
                notes: None,
            },
            actor(),
        )
        .unwrap_err();
    assert!(matches!(err, DomainError::Conflict(_)));

    engine
        .remove_serial_unit(material_id, ser("PRJ-17"), actor())
        .unwrap();
    let m = engine.material(material_id).unwrap();
    assert_eq!(m.quantity_total(), 1);
    assert_eq!(m.quantity_available(), 0);
}

#[test]
fn relocate_serial_moves_the_unit_and_leaves_a_trail() {
    let engine = InventoryEngine::new();
    let material_id = serial_material(&engine, 2);

    engine
        .relocate_serial(material_id, ser("SER-0001"), "warehouse B", actor())
        .unwrap();

    let unit = engine.serial_unit(material_id, &ser("SER-0001")).unwrap();
    assert_eq!(unit.location(), "warehouse B");
    assert_eq!(unit.status(), SerialStatus::Available);

    let trail = engine
        .query_history(&HistoryQuery {
            serial: Some(ser("SER-0001")),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(trail.len(), 1);
    assert_eq!(trail[0].movement, MovementType::Relocated);
    assert_eq!(trail[0].material_id, material_id);

    let err = engine
        .relocate_serial(material_id, ser("SER-9999"), "warehouse B", actor())
        .unwrap_err();
    assert!(matches!(err, DomainError::NotFound(_)));
}

#[test]
fn in_use_serial_unit_cannot_be_removed() {
    let engine = InventoryEngine::new();
    let material_id = serial_material(&engine, 1);
    engine
        .reserve_serial(
            material_id,
            ser("SER-0001"),
            consumer(),
            ShippingMode::WithStaff,
            actor(),
        )
        .unwrap();

    let err = engine
        .remove_serial_unit(material_id, ser("SER-0001"), actor())
        .unwrap_err();
    assert!(matches!(err, DomainError::Conflict(_)));
}

#[test]
fn receive_stock_raises_both_counters_for_quantity_mode_only() {
    let engine = InventoryEngine::new();
    let material_id = quantity_material(&engine, 5);

    let m = engine.receive_stock(material_id, 20, actor()).unwrap();
    assert_eq!(m.quantity_total(), 25);
    assert_eq!(m.quantity_available(), 25);

    let serial_id = serial_material(&engine, 1);
    let err = engine.receive_stock(serial_id, 5, actor()).unwrap_err();
    assert!(matches!(err, DomainError::Validation(_)));
}

#[test]
fn begin_maintenance_rejects_a_unit_that_is_out() {
    let engine = InventoryEngine::new();
    let material_id = serial_material(&engine, 1);
    engine
        .reserve_serial(
            material_id,
            ser("SER-0001"),
            consumer(),
            ShippingMode::WithStaff,
            actor(),
        )
        .unwrap();

    let err = engine
        .begin_maintenance(material_id, ser("SER-0001"), actor())
        .unwrap_err();
    assert!(matches!(err, DomainError::Conflict(_)));
}

#[test]
fn history_records_the_lifecycle_in_order() {
    let engine = InventoryEngine::new();
    let material_id = quantity_material(&engine, 10);
    let allocation_id = engine
        .reserve(material_id, consumer(), 10, ShippingMode::AdvanceShipment, actor())
        .unwrap();
    engine
        .advance(allocation_id, AllocationState::Separated, None, actor())
        .unwrap();
    engine
        .return_allocation(allocation_id, ReturnOutcome::ReturnedOk, 10, actor())
        .unwrap();

    let history = engine
        .query_history(&HistoryQuery {
            material_id: Some(material_id),
            ..Default::default()
        })
        .unwrap();
    let movements: Vec<MovementType> = history.iter().map(|r| r.movement).collect();
    assert_eq!(
        movements,
        vec![
            MovementType::MaterialRegistered,
            MovementType::Reserved,
            MovementType::StageAdvanced,
            MovementType::ReturnedOk,
        ]
    );

    // Sequences are monotonic; the cursor resumes mid-trail.
    assert!(history.windows(2).all(|w| w[0].sequence < w[1].sequence));
    let resumed = engine
        .query_history(&HistoryQuery {
            material_id: Some(material_id),
            after_sequence: Some(history[1].sequence),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(resumed.len(), 2);
}

#[test]
fn history_filters_by_serial_number() {
    let engine = InventoryEngine::new();
    let material_id = serial_material(&engine, 2);
    let allocation_id = engine
        .reserve_serial(
            material_id,
            ser("SER-0002"),
            consumer(),
            ShippingMode::WithStaff,
            actor(),
        )
        .unwrap();
    engine
        .return_allocation(allocation_id, ReturnOutcome::ReturnedOk, 1, actor())
        .unwrap();

    let trail = engine
        .query_history(&HistoryQuery {
            serial: Some(ser("SER-0002")),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(trail.len(), 2);
    assert!(trail.iter().all(|r| r.serial == Some(ser("SER-0002"))));
}

#[test]
fn racing_reservations_for_the_last_unit_produce_one_winner() {
    let engine = Arc::new(InventoryEngine::new());
    let material_id = quantity_material(&engine, 1);

    let mut outcomes = Vec::new();
    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let engine = Arc::clone(&engine);
                scope.spawn(move || {
                    engine.reserve(material_id, consumer(), 1, ShippingMode::WithStaff, actor())
                })
            })
            .collect();
        for handle in handles {
            outcomes.push(handle.join().unwrap());
        }
    });

    let wins = outcomes.iter().filter(|r| r.is_ok()).count();
    assert_eq!(wins, 1);
    let loss = outcomes.into_iter().find(|r| r.is_err()).unwrap();
    assert!(matches!(
        loss.unwrap_err(),
        DomainError::InsufficientStock {
            requested: 1,
            available: 0
        }
    ));

    let m = engine.material(material_id).unwrap();
    assert_eq!(m.quantity_available(), 0);
    assert_eq!(engine.open_allocations(material_id).unwrap().len(), 1);
}

#[test]
fn concurrent_reservations_never_oversell() {
    let engine = Arc::new(InventoryEngine::new());
    let material_id = quantity_material(&engine, 10);

    std::thread::scope(|scope| {
        for _ in 0..8 {
            let engine = Arc::clone(&engine);
            scope.spawn(move || {
                let _ = engine.reserve(material_id, consumer(), 3, ShippingMode::WithStaff, actor());
            });
        }
    });

    let m = engine.material(material_id).unwrap();
    let reserved: u64 = engine
        .open_allocations(material_id)
        .unwrap()
        .iter()
        .map(|a| a.quantity_outstanding())
        .sum();
    assert_eq!(m.quantity_available() + reserved, m.quantity_total());
    assert!(reserved <= 10);
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        ..ProptestConfig::default()
    })]

    /// Property: after any sequence of reservations and returns,
    /// `available + outstanding + shrinkage == initial stock`.
    #[test]
    fn stock_is_conserved_across_arbitrary_lifecycles(
        ops in prop::collection::vec((1u64..10, 0u8..4), 1..25)
    ) {
        let engine = InventoryEngine::new();
        let material_id = quantity_material(&engine, 200);
        let mut open = Vec::new();
        let mut shrinkage = 0u64;

        for (quantity, action) in ops {
            match action {
                // Reserve; ignore rejections (insufficient stock).
                0 => {
                    if let Ok(id) = engine.reserve(
                        material_id,
                        consumer(),
                        quantity,
                        ShippingMode::WithStaff,
                        actor(),
                    ) {
                        open.push(id);
                    }
                }
                // Full clean return of the oldest open allocation.
                1 => {
                    if let Some(id) = open.pop() {
                        let outstanding =
                            engine.allocation(id).unwrap().quantity_outstanding();
                        engine
                            .return_allocation(id, ReturnOutcome::ReturnedOk, outstanding, actor())
                            .unwrap();
                    }
                }
                // Full lossy return: permanent shrinkage.
                2 => {
                    if let Some(id) = open.pop() {
                        let outstanding =
                            engine.allocation(id).unwrap().quantity_outstanding();
                        engine
                            .return_allocation(id, ReturnOutcome::Lost, outstanding, actor())
                            .unwrap();
                        shrinkage += outstanding;
                    }
                }
                // Cancel: restores outstanding.
                _ => {
                    if let Some(id) = open.pop() {
                        engine.cancel_allocation(id, actor()).unwrap();
                    }
                }
            }
        }

        let m = engine.material(material_id).unwrap();
        let outstanding: u64 = open
            .iter()
            .map(|id| engine.allocation(*id).unwrap().quantity_outstanding())
            .sum();
        prop_assert_eq!(m.quantity_total(), 200 - shrinkage);
        prop_assert_eq!(m.quantity_available() + outstanding, m.quantity_total());
    }
}
