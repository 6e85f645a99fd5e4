//! Group membership table.
//!
//! One row per member, keyed by user id. The plain member id list is derived
//! from the rows, never stored alongside them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ajo_core::{Amount, DomainError, DomainResult, Entity, UserId};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Admin,
    Member,
}

/// Where a member stands in the payout rotation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberStatus {
    Pending,
    Current,
    Completed,
    Missed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub user_id: UserId,
    pub name: String,
    pub join_date: DateTime<Utc>,
    pub role: Role,
    pub status: MemberStatus,
    pub turns: u32,
    pub contributions_made: u32,
    pub missed_contributions: u32,
    /// Assigned when the group activates.
    pub turn_position: Option<u32>,
    pub bid: Option<Amount>,
    pub last_contribution_cycle: Option<u32>,
}

impl Member {
    pub fn new(user_id: UserId, name: impl Into<String>, role: Role, join_date: DateTime<Utc>) -> Self {
        Self {
            user_id,
            name: name.into(),
            join_date,
            role,
            status: MemberStatus::Pending,
            turns: 0,
            contributions_made: 0,
            missed_contributions: 0,
            turn_position: None,
            bid: None,
            last_contribution_cycle: None,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn contributed_in(&self, cycle: u32) -> bool {
        self.last_contribution_cycle == Some(cycle)
    }
}

impl Entity for Member {
    type Id = UserId;

    fn id(&self) -> &Self::Id {
        &self.user_id
    }
}

/// Members in join order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MembershipTable {
    rows: Vec<Member>,
}

impl MembershipTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Member> {
        self.rows.iter()
    }

    pub fn rows(&self) -> &[Member] {
        &self.rows
    }

    pub fn contains(&self, user_id: UserId) -> bool {
        self.get(user_id).is_some()
    }

    pub fn get(&self, user_id: UserId) -> Option<&Member> {
        self.rows.iter().find(|m| m.user_id == user_id)
    }

    pub(crate) fn get_mut(&mut self, user_id: UserId) -> Option<&mut Member> {
        self.rows.iter_mut().find(|m| m.user_id == user_id)
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Member> {
        self.rows.iter_mut()
    }

    /// Member ids in join order.
    pub fn user_ids(&self) -> Vec<UserId> {
        self.rows.iter().map(|m| m.user_id).collect()
    }

    pub fn at_turn(&self, position: u32) -> Option<&Member> {
        self.rows.iter().find(|m| m.turn_position == Some(position))
    }

    pub(crate) fn at_turn_mut(&mut self, position: u32) -> Option<&mut Member> {
        self.rows.iter_mut().find(|m| m.turn_position == Some(position))
    }

    pub fn total_contributions(&self) -> u64 {
        self.rows.iter().map(|m| u64::from(m.contributions_made)).sum()
    }

    pub fn total_missed(&self) -> u64 {
        self.rows.iter().map(|m| u64::from(m.missed_contributions)).sum()
    }

    pub fn ensure_absent(&self, user_id: UserId) -> DomainResult<()> {
        if self.contains(user_id) {
            return Err(DomainError::AlreadyMember);
        }
        Ok(())
    }

    pub fn ensure_member(&self, user_id: UserId) -> DomainResult<&Member> {
        self.get(user_id).ok_or(DomainError::NotMember)
    }

    /// Append a row; replaying a duplicate join is ignored.
    pub(crate) fn insert(&mut self, member: Member) {
        if !self.contains(member.user_id) {
            self.rows.push(member);
        }
    }
}
