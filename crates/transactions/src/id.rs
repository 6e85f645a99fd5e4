use core::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use ajo_core::{AggregateId, DomainError};

const PREFIX: &str = "TXN";

/// Transaction identifier: a random 128-bit token rendered as `TXN` followed by
/// 32 uppercase hex digits.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TransactionId(Uuid);

impl TransactionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Event stream of this transaction.
    pub fn aggregate_id(&self) -> AggregateId {
        AggregateId::from_uuid(self.0)
    }
}

impl core::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{PREFIX}{:X}", self.0.simple())
    }
}

impl FromStr for TransactionId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_uppercase();
        let hex = s
            .strip_prefix(PREFIX)
            .filter(|h| h.len() == 32 && h.bytes().all(|b| b.is_ascii_hexdigit()))
            .ok_or_else(|| DomainError::invalid_id(format!("TransactionId: {s:?}")))?;
        let uuid = Uuid::parse_str(hex)
            .map_err(|e| DomainError::invalid_id(format!("TransactionId: {e}")))?;
        Ok(Self(uuid))
    }
}

impl TryFrom<String> for TransactionId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TransactionId> for String {
    fn from(value: TransactionId) -> Self {
        value.to_string()
    }
}
