//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Every variant is a deterministic business failure with a stable machine-readable
/// [`kind`](DomainError::kind). Infrastructure concerns belong elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A ledger operation received a zero amount.
    #[error("amount must be positive")]
    InvalidAmount,

    /// A debit or lock exceeds the funds available for it.
    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),

    /// The `(account_number, bank_code)` pair is already linked to the wallet.
    #[error("bank account is already linked")]
    DuplicateAccount,

    /// The group has reached `max_members`.
    #[error("group is full")]
    GroupFull,

    /// The user is already a member of the group.
    #[error("user is already a member of this group")]
    AlreadyMember,

    /// The caller is not a member of the group.
    #[error("user is not a member of this group")]
    NotMember,

    /// Non-admin attempting an admin-only action.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// A status value outside its enum.
    #[error("invalid status: {0}")]
    InvalidStatus(String),

    /// A state machine refused a transition from its current state.
    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// A conflict occurred (e.g. stale version, exhausted unique-code attempts).
    #[error("conflict: {0}")]
    Conflict(String),
}

impl DomainError {
    pub fn insufficient_funds(msg: impl Into<String>) -> Self {
        Self::InsufficientFunds(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn invalid_status(msg: impl Into<String>) -> Self {
        Self::InvalidStatus(msg.into())
    }

    pub fn invalid_transition(msg: impl Into<String>) -> Self {
        Self::InvalidTransition(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Stable machine-readable error kind, safe to expose to callers.
    pub fn kind(&self) -> &'static str {
        match self {
            DomainError::InvalidAmount => "invalid_amount",
            DomainError::InsufficientFunds(_) => "insufficient_funds",
            DomainError::DuplicateAccount => "duplicate_account",
            DomainError::GroupFull => "group_full",
            DomainError::AlreadyMember => "already_member",
            DomainError::NotMember => "not_member",
            DomainError::Unauthorized(_) => "unauthorized",
            DomainError::InvalidStatus(_) => "invalid_status",
            DomainError::InvalidTransition(_) => "invalid_transition",
            DomainError::Validation(_) => "validation_error",
            DomainError::InvariantViolation(_) => "invariant_violation",
            DomainError::InvalidId(_) => "invalid_id",
            DomainError::NotFound(_) => "not_found",
            DomainError::Conflict(_) => "conflict",
        }
    }
}
