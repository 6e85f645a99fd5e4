//! Entity trait: identity + continuity across state changes.
//!
//! Child records owned by an aggregate (bank accounts in a wallet, membership rows
//! in a group) are entities keyed within their parent.

/// Entity marker + minimal interface.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}
