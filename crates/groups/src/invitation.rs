//! Invitation codes.

use core::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};

use ajo_core::{DomainError, DomainResult, ValueObject};

pub const CODE_LEN: usize = 6;

const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Six uppercase alphanumeric characters identifying a group to would-be members.
///
/// Global uniqueness is not a property of the value itself; it is enforced when
/// the code is reserved in the infra unique index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InvitationCode(String);

impl InvitationCode {
    /// Draw a fresh code uniformly from `[A-Z0-9]`.
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let code = (0..CODE_LEN)
            .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
            .collect();
        Self(code)
    }

    /// Normalize user input (trim, uppercase) and validate the format.
    pub fn parse(raw: &str) -> DomainResult<Self> {
        let code = raw.trim().to_ascii_uppercase();
        if code.len() != CODE_LEN || !code.bytes().all(|b| ALPHABET.contains(&b)) {
            return Err(DomainError::validation(format!(
                "invitation code must be {CODE_LEN} characters from A-Z and 0-9"
            )));
        }
        Ok(Self(code))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl ValueObject for InvitationCode {}

impl FromStr for InvitationCode {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for InvitationCode {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<InvitationCode> for String {
    fn from(value: InvitationCode) -> Self {
        value.0
    }
}

impl core::fmt::Display for InvitationCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
