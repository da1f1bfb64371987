use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockroom_core::{DomainError, DomainResult, Entity, ValueObject};

use crate::material::MaterialId;

/// Serial number of one physical unit, unique within its material.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SerialNumber(String);

impl SerialNumber {
    pub fn new(value: impl Into<String>) -> DomainResult<Self> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(DomainError::validation("serial number cannot be empty"));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for SerialNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl ValueObject for SerialNumber {}

/// Status of a serial unit.
///
/// `InUse` holds exactly while an open allocation references the unit; the
/// other statuses are mutually exclusive resting states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerialStatus {
    Available,
    InUse,
    Maintenance,
    Lost,
}

impl SerialStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SerialStatus::Available => "available",
            SerialStatus::InUse => "in use",
            SerialStatus::Maintenance => "in maintenance",
            SerialStatus::Lost => "lost",
        }
    }
}

/// One individually tracked physical instance of a serial-controlled material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialUnit {
    material_id: MaterialId,
    serial: SerialNumber,
    status: SerialStatus,
    location: String,
    acquired_at: DateTime<Utc>,
    last_maintenance_at: Option<DateTime<Utc>>,
    notes: Option<String>,
}

impl SerialUnit {
    pub fn new(
        material_id: MaterialId,
        serial: SerialNumber,
        status: SerialStatus,
        location: impl Into<String>,
        acquired_at: DateTime<Utc>,
    ) -> Self {
        Self {
            material_id,
            serial,
            status,
            location: location.into(),
            acquired_at,
            last_maintenance_at: None,
            notes: None,
        }
    }

    pub fn material_id(&self) -> MaterialId {
        self.material_id
    }

    pub fn serial(&self) -> &SerialNumber {
        &self.serial
    }

    pub fn status(&self) -> SerialStatus {
        self.status
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn acquired_at(&self) -> DateTime<Utc> {
        self.acquired_at
    }

    pub fn last_maintenance_at(&self) -> Option<DateTime<Utc>> {
        self.last_maintenance_at
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    /// A unit can be deleted unless an open allocation holds it.
    pub fn is_deletable(&self) -> bool {
        self.status != SerialStatus::InUse
    }

    /// Check that the unit can be bound to a new allocation, reporting the
    /// blocking status otherwise ("already in use", "in maintenance", "lost").
    pub fn ensure_available(&self) -> DomainResult<()> {
        match self.status {
            SerialStatus::Available => Ok(()),
            SerialStatus::InUse => Err(DomainError::conflict(format!(
                "serial {} already in use",
                self.serial
            ))),
            SerialStatus::Maintenance | SerialStatus::Lost => Err(DomainError::conflict(format!(
                "serial {} is {}",
                self.serial,
                self.status.as_str()
            ))),
        }
    }

    /// Bind the unit to an allocation. Only an `Available` unit can be
    /// checked out.
    pub fn checkout(&mut self) -> DomainResult<()> {
        self.ensure_available()?;
        self.status = SerialStatus::InUse;
        Ok(())
    }

    /// Release the unit back to stock (allocation returned in good shape).
    pub fn release(&mut self) -> DomainResult<()> {
        if self.status != SerialStatus::InUse {
            return Err(DomainError::conflict(format!(
                "serial {} is not in use (status: {})",
                self.serial,
                self.status.as_str()
            )));
        }
        self.status = SerialStatus::Available;
        Ok(())
    }

    /// Put the unit into maintenance, either from a damaged return (`InUse`)
    /// or directly from stock (`Available`).
    pub fn send_to_maintenance(&mut self) -> DomainResult<()> {
        match self.status {
            SerialStatus::Available | SerialStatus::InUse => {
                self.status = SerialStatus::Maintenance;
                Ok(())
            }
            SerialStatus::Maintenance => Err(DomainError::conflict(format!(
                "serial {} is already in maintenance",
                self.serial
            ))),
            SerialStatus::Lost => Err(DomainError::conflict(format!(
                "serial {} is lost",
                self.serial
            ))),
        }
    }

    /// Maintenance finished; the unit is usable again.
    pub fn complete_maintenance(&mut self, at: DateTime<Utc>) -> DomainResult<()> {
        if self.status != SerialStatus::Maintenance {
            return Err(DomainError::conflict(format!(
                "serial {} is not in maintenance (status: {})",
                self.serial,
                self.status.as_str()
            )));
        }
        self.status = SerialStatus::Available;
        self.last_maintenance_at = Some(at);
        Ok(())
    }

    /// Permanent shrinkage: the unit is gone. Allowed from any status except
    /// one already marked lost.
    pub fn mark_lost(&mut self) -> DomainResult<()> {
        if self.status == SerialStatus::Lost {
            return Err(DomainError::conflict(format!(
                "serial {} is already lost",
                self.serial
            )));
        }
        self.status = SerialStatus::Lost;
        Ok(())
    }

    pub fn relocate(&mut self, location: impl Into<String>) {
        self.location = location.into();
    }

    pub fn set_notes(&mut self, notes: Option<String>) {
        self.notes = notes;
    }
}

impl Entity for SerialUnit {
    type Id = SerialNumber;

    fn id(&self) -> &Self::Id {
        &self.serial
    }
}
