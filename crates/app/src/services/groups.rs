use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, info, warn};

use ajo_core::{AggregateId, DomainError};
use ajo_groups::{
    AddMember, CloseCycle, CreateGroup, Frequency, Group, GroupCommand, GroupStats, GroupStatus, GroupSummary,
    InvitationCode, NewGroup, PayoutOrder, PlaceBid, UpdateStatus, shuffled_order,
};

use super::AppServices;
use crate::context::Caller;
use crate::error::ServiceResult;

/// Group settings as submitted by the creator; enum fields use their wire names.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGroupRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub max_members: u32,
    pub contribution_amount: u64,
    pub frequency: String,
    pub payout_order: String,
    pub duration_months: u32,
}

impl CreateGroupRequest {
    fn into_new_group(self) -> ServiceResult<NewGroup> {
        let frequency: Frequency = self.frequency.trim().parse()?;
        let payout_order: PayoutOrder = self.payout_order.trim().parse()?;
        Ok(NewGroup {
            name: self.name,
            description: self.description,
            max_members: self.max_members,
            contribution_amount: self.contribution_amount,
            frequency,
            payout_order,
            duration_months: self.duration_months,
        })
    }
}

impl AppServices {
    /// Create a group with the caller as admin and sole member.
    pub fn create_group(&self, caller: &Caller, request: CreateGroupRequest) -> ServiceResult<GroupSummary> {
        let group = request.into_new_group()?;
        let group_id = AggregateId::new();
        let invitation_code = self.reserve_invitation_code(group_id)?;

        let command = GroupCommand::Create(CreateGroup {
            admin_id: caller.user_id(),
            admin_name: caller.name().to_string(),
            invitation_code: invitation_code.clone(),
            group,
            occurred_at: Utc::now(),
        });

        match self.execute(group_id, ajo_groups::AGGREGATE_TYPE, &command, Group::empty) {
            Ok(dispatched) => {
                info!(group_id = %group_id, admin = %caller.user_id(), code = %invitation_code, "group created");
                Ok(GroupSummary::from(&dispatched.state))
            }
            Err(err) => {
                self.invitation_codes.release(&invitation_code, &group_id);
                Err(err)
            }
        }
    }

    /// Look a group up by invitation code (case-insensitive, surrounding whitespace ignored).
    pub fn find_group_by_code(&self, code: &str) -> ServiceResult<GroupSummary> {
        let group_id = self.group_id_for_code(code)?;
        let group = self.group_snapshot(group_id)?;
        Ok(GroupSummary::from(&group))
    }

    pub fn join_group(&self, caller: &Caller, group_id: AggregateId) -> ServiceResult<GroupSummary> {
        let command = GroupCommand::AddMember(AddMember {
            user_id: caller.user_id(),
            name: caller.name().to_string(),
            occurred_at: Utc::now(),
        });
        let group = self.group_command(group_id, &command)?;
        info!(group_id = %group_id, user_id = %caller.user_id(), members = group.members().len(), "member joined");
        Ok(GroupSummary::from(&group))
    }

    pub fn join_by_code(&self, caller: &Caller, code: &str) -> ServiceResult<GroupSummary> {
        let group_id = self.group_id_for_code(code)?;
        self.join_group(caller, group_id)
    }

    /// Offer to forgo `amount` of the payout in exchange for an earlier turn.
    pub fn place_bid(&self, caller: &Caller, group_id: AggregateId, amount: u64) -> ServiceResult<GroupSummary> {
        let command = GroupCommand::PlaceBid(PlaceBid {
            user_id: caller.user_id(),
            amount,
            occurred_at: Utc::now(),
        });
        let group = self.group_command(group_id, &command)?;
        Ok(GroupSummary::from(&group))
    }

    /// Admin status change. Activating a random-order group draws the turn order here.
    pub fn update_group_status(
        &self,
        caller: &Caller,
        group_id: AggregateId,
        status: &str,
    ) -> ServiceResult<GroupSummary> {
        let status = status.trim();
        let random_order = if status == GroupStatus::Active.as_str() {
            let current = self.load(group_id, Group::empty)?;
            if current.payout_order() == PayoutOrder::Random {
                Some(self.with_rng_mut(|rng| shuffled_order(current.members(), rng))?)
            } else {
                None
            }
        } else {
            None
        };

        let command = GroupCommand::UpdateStatus(UpdateStatus {
            caller: caller.user_id(),
            status: status.to_string(),
            random_order,
            occurred_at: Utc::now(),
        });
        let group = self.group_command(group_id, &command)?;
        info!(group_id = %group_id, status = %group.status(), "group status changed");
        Ok(GroupSummary::from(&group))
    }

    /// A group the caller belongs to.
    pub fn group(&self, caller: &Caller, group_id: AggregateId) -> ServiceResult<GroupSummary> {
        let group = self.member_group(caller, group_id)?;
        Ok(GroupSummary::from(&group))
    }

    /// Groups the caller belongs to, newest first.
    pub fn groups_for(&self, caller: &Caller) -> Vec<GroupSummary> {
        self.directory
            .groups_for(caller.user_id())
            .iter()
            .map(GroupSummary::from)
            .collect()
    }

    pub fn group_stats(&self, caller: &Caller, group_id: AggregateId) -> ServiceResult<GroupStats> {
        Ok(self.member_group(caller, group_id)?.stats())
    }

    // -------------------------
    // Sweep support
    // -------------------------

    pub(crate) fn overdue_groups(&self, now: DateTime<Utc>) -> Vec<AggregateId> {
        self.directory.overdue(now)
    }

    pub(crate) fn close_cycle(&self, group_id: AggregateId, now: DateTime<Utc>) -> ServiceResult<Group> {
        let group = self.group_command(group_id, &GroupCommand::CloseCycle(CloseCycle { now }))?;
        debug!(group_id = %group_id, cycle = group.cycle(), "contribution cycle closed");
        Ok(group)
    }

    // -------------------------
    // Helpers
    // -------------------------

    pub(super) fn group_command(&self, group_id: AggregateId, command: &GroupCommand) -> ServiceResult<Group> {
        let dispatched = self.execute(group_id, ajo_groups::AGGREGATE_TYPE, command, Group::empty)?;
        Ok(dispatched.state)
    }

    fn member_group(&self, caller: &Caller, group_id: AggregateId) -> ServiceResult<Group> {
        let group = self.group_snapshot(group_id)?;
        if !group.is_member(caller.user_id()) {
            return Err(DomainError::NotMember.into());
        }
        Ok(group)
    }

    fn group_snapshot(&self, group_id: AggregateId) -> ServiceResult<Group> {
        self.directory
            .get(group_id)
            .filter(Group::is_created)
            .ok_or_else(|| DomainError::not_found(format!("group {group_id}")).into())
    }

    fn group_id_for_code(&self, code: &str) -> ServiceResult<AggregateId> {
        let code = InvitationCode::parse(code)?;
        self.invitation_codes
            .lookup(&code)
            .ok_or_else(|| DomainError::not_found(format!("group with invitation code {code}")).into())
    }

    fn reserve_invitation_code(&self, group_id: AggregateId) -> ServiceResult<InvitationCode> {
        for attempt in 1..=self.config.code_generation_attempts {
            let code = self.with_rng_mut(|rng| InvitationCode::generate(rng))?;
            if self.invitation_codes.reserve(code.clone(), group_id).is_reserved() {
                return Ok(code);
            }
            debug!(attempt, code = %code, "invitation code already taken");
        }
        warn!(
            attempts = self.config.code_generation_attempts,
            "no free invitation code found"
        );
        Err(DomainError::conflict("could not allocate a unique invitation code").into())
    }
}
