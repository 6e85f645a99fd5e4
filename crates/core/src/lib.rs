//! `ajo-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives shared by the wallet, group and
//! transaction ledgers (no infrastructure concerns).

pub mod aggregate;
pub mod entity;
pub mod error;
pub mod id;
pub mod money;
pub mod value_object;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{AggregateId, UserId};
pub use money::Amount;
pub use value_object::ValueObject;
