use ajo_core::UserId;

/// The authenticated user a service call acts for.
///
/// Authentication happens upstream; services trust this value and use it for every
/// ownership and admin check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    user_id: UserId,
    name: String,
}

impl Caller {
    pub fn new(user_id: UserId, name: impl Into<String>) -> Self {
        Self {
            user_id,
            name: name.into(),
        }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Display name recorded on group membership rows.
    pub fn name(&self) -> &str {
        &self.name
    }
}
