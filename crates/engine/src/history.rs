//! Append-only movement & location history.
//!
//! Every committed transition — registry mutation or allocation lifecycle
//! step — appends exactly one record here. Records are immutable; there are
//! no update or delete operations. Retention/compaction is an external
//! concern.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockroom_allocation::ReturnOutcome;
use stockroom_catalog::{MaterialId, SerialNumber};
use stockroom_core::{ActorId, ConsumerId, DomainError, DomainResult};

/// Kind of stock movement recorded in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MovementType {
    MaterialRegistered,
    MaterialRemoved,
    StockReceived,
    SerialAdded,
    SerialRemoved,
    Reserved,
    StageAdvanced,
    WithdrawalRecorded,
    ReturnedOk,
    ReturnedDamaged,
    Lost,
    Consumed,
    Cancelled,
    MaintenanceStarted,
    MaintenanceCompleted,
    Relocated,
}

impl From<ReturnOutcome> for MovementType {
    fn from(outcome: ReturnOutcome) -> Self {
        match outcome {
            ReturnOutcome::ReturnedOk => MovementType::ReturnedOk,
            ReturnOutcome::ReturnedDamaged => MovementType::ReturnedDamaged,
            ReturnOutcome::Lost => MovementType::Lost,
            ReturnOutcome::Consumed => MovementType::Consumed,
        }
    }
}

/// Immutable audit record of one committed movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementRecord {
    /// Monotonic append sequence (1-based); restart cursor for consumers.
    pub sequence: u64,
    pub movement: MovementType,
    pub material_id: MaterialId,
    pub serial: Option<SerialNumber>,
    pub consumer_id: Option<ConsumerId>,
    pub quantity: u64,
    pub actor: ActorId,
    pub occurred_at: DateTime<Utc>,
}

/// A movement about to be recorded (sequence assigned on append).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMovement {
    pub movement: MovementType,
    pub material_id: MaterialId,
    pub serial: Option<SerialNumber>,
    pub consumer_id: Option<ConsumerId>,
    pub quantity: u64,
    pub actor: ActorId,
    pub occurred_at: DateTime<Utc>,
}

/// Filter for history queries. Empty filter returns everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryQuery {
    pub material_id: Option<MaterialId>,
    pub serial: Option<SerialNumber>,
    /// Resume after a previously seen sequence number.
    pub after_sequence: Option<u64>,
}

/// In-memory append-only movement log.
#[derive(Debug, Default)]
pub struct MovementLog {
    records: Mutex<Vec<MovementRecord>>,
}

impl MovementLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one record, assigning the next sequence number.
    pub(crate) fn append(&self, movement: NewMovement) -> DomainResult<u64> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| DomainError::store_unavailable("movement log lock poisoned"))?;

        let sequence = records.len() as u64 + 1;
        records.push(MovementRecord {
            sequence,
            movement: movement.movement,
            material_id: movement.material_id,
            serial: movement.serial,
            consumer_id: movement.consumer_id,
            quantity: movement.quantity,
            actor: movement.actor,
            occurred_at: movement.occurred_at,
        });
        Ok(sequence)
    }

    /// Finite, ordered slice of the audit trail (timestamp order, sequence
    /// as tie-breaker). Restartable via `after_sequence`.
    pub fn query(&self, query: &HistoryQuery) -> DomainResult<Vec<MovementRecord>> {
        let records = self
            .records
            .lock()
            .map_err(|_| DomainError::store_unavailable("movement log lock poisoned"))?;

        let mut matched: Vec<MovementRecord> = records
            .iter()
            .filter(|r| {
                query.material_id.is_none_or(|id| r.material_id == id)
                    && query
                        .serial
                        .as_ref()
                        .is_none_or(|serial| r.serial.as_ref() == Some(serial))
                    && query.after_sequence.is_none_or(|seq| r.sequence > seq)
            })
            .cloned()
            .collect();

        matched.sort_by(|a, b| {
            a.occurred_at
                .cmp(&b.occurred_at)
                .then(a.sequence.cmp(&b.sequence))
        });
        Ok(matched)
    }

    pub fn len(&self) -> DomainResult<usize> {
        let records = self
            .records
            .lock()
            .map_err(|_| DomainError::store_unavailable("movement log lock poisoned"))?;
        Ok(records.len())
    }

    pub fn is_empty(&self) -> DomainResult<bool> {
        Ok(self.len()? == 0)
    }
}
