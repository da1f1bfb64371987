//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are **immutable** and **compared by value**; they represent
/// concepts where identity doesn't matter. To "modify" one, create a new one
/// with the new values.
///
/// Example: a serial number string is a value object; the serial unit carrying
/// it is an entity.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
