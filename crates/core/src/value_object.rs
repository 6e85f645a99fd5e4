//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are immutable and compared by their attribute values. `Amount`
/// and `InvitationCode` are value objects; a wallet or a group is an aggregate.
///
/// Construction is where validation happens: once a value object exists it is
/// known to be well-formed, so operations accepting one need not re-check it.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
