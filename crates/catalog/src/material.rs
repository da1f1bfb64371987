use serde::{Deserialize, Serialize};

use stockroom_core::{AggregateId, DomainError, DomainResult, Entity};

/// Material identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MaterialId(pub AggregateId);

impl MaterialId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for MaterialId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// How stock of a material is tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlMode {
    /// Fungible stock tracked as a quantity.
    Quantity,
    /// Each physical unit tracked individually by serial number.
    Serial,
}

/// Which of the two availability counters an adjustment targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Counter {
    Available,
    Total,
}

/// Partial update of descriptive material fields. Never touches counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialPatch {
    pub name: Option<String>,
    pub category: Option<String>,
    /// Value per unit in smallest currency unit (e.g., cents).
    pub unit_value: Option<u64>,
}

/// Catalog entry for a class of trackable stock.
///
/// The counters are private: `0 <= quantity_available <= quantity_total`
/// holds at every observable instant, and the only mutation path is
/// [`Material::adjust_counter`], which the reconciliation ledger calls.
/// For serial-controlled materials the counters mirror the serial units'
/// statuses; they are never set independently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Material {
    id: MaterialId,
    name: String,
    category: String,
    /// Value per unit in smallest currency unit (e.g., cents).
    unit_value: u64,
    control_mode: ControlMode,
    quantity_total: u64,
    quantity_available: u64,
}

impl Material {
    /// Register a new material. Counters start at zero; stock enters through
    /// the ledger (initial quantity, serial unit registration, restock).
    pub fn new(
        id: MaterialId,
        name: impl Into<String>,
        category: impl Into<String>,
        unit_value: u64,
        control_mode: ControlMode,
    ) -> DomainResult<Self> {
        let name = name.into();
        let category = category.into();
        if name.trim().is_empty() {
            return Err(DomainError::validation("material name cannot be empty"));
        }
        if category.trim().is_empty() {
            return Err(DomainError::validation("material category cannot be empty"));
        }
        Ok(Self {
            id,
            name,
            category,
            unit_value,
            control_mode,
            quantity_total: 0,
            quantity_available: 0,
        })
    }

    pub fn id_typed(&self) -> MaterialId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn unit_value(&self) -> u64 {
        self.unit_value
    }

    pub fn control_mode(&self) -> ControlMode {
        self.control_mode
    }

    pub fn quantity_total(&self) -> u64 {
        self.quantity_total
    }

    pub fn quantity_available(&self) -> u64 {
        self.quantity_available
    }

    /// Update descriptive fields only (name, category, unit value).
    pub fn apply_patch(&mut self, patch: &MaterialPatch) -> DomainResult<()> {
        if let Some(name) = &patch.name {
            if name.trim().is_empty() {
                return Err(DomainError::validation("material name cannot be empty"));
            }
            self.name = name.clone();
        }
        if let Some(category) = &patch.category {
            if category.trim().is_empty() {
                return Err(DomainError::validation("material category cannot be empty"));
            }
            self.category = category.clone();
        }
        if let Some(unit_value) = patch.unit_value {
            self.unit_value = unit_value;
        }
        Ok(())
    }

    /// Checked counter mutation — the atomic primitive behind the ledger's
    /// `adjust`. Fails (never clamps) when the adjustment would push
    /// `available` below 0, above `total`, or `total` below `available`.
    ///
    /// Contract: only the reconciliation ledger calls this; every other
    /// component reads counters and routes writes through the ledger.
    pub fn adjust_counter(&mut self, counter: Counter, delta: i64) -> DomainResult<()> {
        match counter {
            Counter::Available => {
                let next = self.quantity_available as i128 + delta as i128;
                if next < 0 {
                    return Err(DomainError::invariant(format!(
                        "material {}: available would go negative ({} {delta:+})",
                        self.id, self.quantity_available
                    )));
                }
                if next > self.quantity_total as i128 {
                    return Err(DomainError::invariant(format!(
                        "material {}: available would exceed total ({} {delta:+} > {})",
                        self.id, self.quantity_available, self.quantity_total
                    )));
                }
                self.quantity_available = next as u64;
            }
            Counter::Total => {
                let next = self.quantity_total as i128 + delta as i128;
                if next < 0 {
                    return Err(DomainError::invariant(format!(
                        "material {}: total would go negative ({} {delta:+})",
                        self.id, self.quantity_total
                    )));
                }
                if next < self.quantity_available as i128 {
                    return Err(DomainError::invariant(format!(
                        "material {}: total would drop below available ({} {delta:+} < {})",
                        self.id, self.quantity_total, self.quantity_available
                    )));
                }
                self.quantity_total = next as u64;
            }
        }
        Ok(())
    }
}

impl Entity for Material {
    type Id = MaterialId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn test_material(mode: ControlMode) -> Material {
        Material::new(
            MaterialId::new(AggregateId::new()),
            "Chair",
            "Furniture",
            2_500,
            mode,
        )
        .unwrap()
    }

    #[test]
    fn new_material_starts_with_zero_counters() {
        let m = test_material(ControlMode::Quantity);
        assert_eq!(m.quantity_total(), 0);
        assert_eq!(m.quantity_available(), 0);
    }

    #[test]
    fn empty_name_or_category_is_rejected() {
        let id = MaterialId::new(AggregateId::new());
        let err = Material::new(id, "  ", "Furniture", 100, ControlMode::Quantity).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let err = Material::new(id, "Chair", "", 100, ControlMode::Quantity).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn patch_updates_descriptive_fields_only() {
        let mut m = test_material(ControlMode::Quantity);
        m.adjust_counter(Counter::Total, 10).unwrap();
        m.adjust_counter(Counter::Available, 10).unwrap();

        m.apply_patch(&MaterialPatch {
            name: Some("Folding Chair".to_string()),
            category: None,
            unit_value: Some(3_000),
        })
        .unwrap();

        assert_eq!(m.name(), "Folding Chair");
        assert_eq!(m.category(), "Furniture");
        assert_eq!(m.unit_value(), 3_000);
        assert_eq!(m.quantity_total(), 10);
        assert_eq!(m.quantity_available(), 10);
    }

    #[test]
    fn patch_rejects_empty_name() {
        let mut m = test_material(ControlMode::Quantity);
        let err = m
            .apply_patch(&MaterialPatch {
                name: Some("   ".to_string()),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(m.name(), "Chair");
    }

    #[test]
    fn available_cannot_exceed_total() {
        let mut m = test_material(ControlMode::Quantity);
        m.adjust_counter(Counter::Total, 5).unwrap();
        m.adjust_counter(Counter::Available, 5).unwrap();

        let err = m.adjust_counter(Counter::Available, 1).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
        assert_eq!(m.quantity_available(), 5);
    }

    #[test]
    fn available_cannot_go_negative() {
        let mut m = test_material(ControlMode::Quantity);
        let err = m.adjust_counter(Counter::Available, -1).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
        assert_eq!(m.quantity_available(), 0);
    }

    #[test]
    fn total_cannot_drop_below_available() {
        let mut m = test_material(ControlMode::Quantity);
        m.adjust_counter(Counter::Total, 10).unwrap();
        m.adjust_counter(Counter::Available, 10).unwrap();

        let err = m.adjust_counter(Counter::Total, -1).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
        assert_eq!(m.quantity_total(), 10);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: for any sequence of adjustments, failed ones leave the
        /// counters untouched and `0 <= available <= total` holds throughout.
        #[test]
        fn counter_bounds_hold_under_arbitrary_adjustments(
            deltas in prop::collection::vec((any::<bool>(), -50i64..50i64), 1..40)
        ) {
            let mut m = test_material(ControlMode::Quantity);

            for (on_total, delta) in deltas {
                let counter = if on_total { Counter::Total } else { Counter::Available };
                let before = (m.quantity_total(), m.quantity_available());
                if m.adjust_counter(counter, delta).is_err() {
                    prop_assert_eq!(before, (m.quantity_total(), m.quantity_available()));
                }
                prop_assert!(m.quantity_available() <= m.quantity_total());
            }
        }
    }
}
