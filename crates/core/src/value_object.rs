//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects should be immutable and compared by their contained values.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}

impl ValueObject for crate::experiment::ExperimentStatus {}
impl ValueObject for crate::experiment::EntryType {}
impl ValueObject for crate::attachment::AttachmentStatus {}
impl ValueObject for crate::reconcile::ReconcileFindingKind {}
impl ValueObject for crate::user::Role {}


