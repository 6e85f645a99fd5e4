use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ajo_core::money::credit;
use ajo_core::{Aggregate, AggregateId, AggregateRoot, Amount, DomainError, DomainResult, UserId};
use ajo_events::Event;

use crate::invitation::InvitationCode;
use crate::membership::{Member, MemberStatus, MembershipTable, Role};
use crate::rotation::{PayoutOrder, assign_turns};
use crate::schedule::{Frequency, next_date};

pub const MIN_MEMBERS: u32 = 2;
pub const MAX_MEMBERS: u32 = 50;
pub const MIN_DURATION_MONTHS: u32 = 1;
pub const MAX_DURATION_MONTHS: u32 = 24;
pub const NAME_MIN_CHARS: usize = 2;
pub const NAME_MAX_CHARS: usize = 100;
pub const DESCRIPTION_MAX_CHARS: usize = 500;

/// Group lifecycle.
///
/// `pending -> active -> completed`, and `pending | active -> cancelled`.
/// `completed` and `cancelled` are terminal.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupStatus {
    Pending,
    Active,
    Completed,
    Cancelled,
}

impl GroupStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            GroupStatus::Pending => "pending",
            GroupStatus::Active => "active",
            GroupStatus::Completed => "completed",
            GroupStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, GroupStatus::Completed | GroupStatus::Cancelled)
    }

    pub fn can_transition_to(self, next: GroupStatus) -> bool {
        matches!(
            (self, next),
            (GroupStatus::Pending, GroupStatus::Active)
                | (GroupStatus::Pending, GroupStatus::Cancelled)
                | (GroupStatus::Active, GroupStatus::Completed)
                | (GroupStatus::Active, GroupStatus::Cancelled)
        )
    }
}

impl FromStr for GroupStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(GroupStatus::Pending),
            "active" => Ok(GroupStatus::Active),
            "completed" => Ok(GroupStatus::Completed),
            "cancelled" => Ok(GroupStatus::Cancelled),
            other => Err(DomainError::invalid_status(other)),
        }
    }
}

impl core::fmt::Display for GroupStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress snapshot of a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupStats {
    pub total_members: u32,
    pub max_members: u32,
    pub total_pool: u64,
    pub total_contributions: u64,
    pub total_missed: u64,
    pub completed_turns: u32,
    pub current_turn: u32,
    pub status: GroupStatus,
    pub credibility_score: u8,
    /// Percentage of turns paid out.
    pub progress: u8,
}

/// Aggregate root: Group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    id: AggregateId,
    name: String,
    description: Option<String>,
    invitation_code: Option<InvitationCode>,
    admin_id: Option<UserId>,
    max_members: u32,
    contribution_amount: u64,
    frequency: Frequency,
    payout_order: PayoutOrder,
    duration_months: u32,
    status: GroupStatus,
    current_turn: u32,
    cycle: u32,
    total_pool: u64,
    credibility_score: u8,
    start_date: Option<DateTime<Utc>>,
    next_contribution: Option<DateTime<Utc>>,
    next_payout: Option<DateTime<Utc>>,
    members: MembershipTable,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl Group {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: AggregateId) -> Self {
        Self {
            id,
            name: String::new(),
            description: None,
            invitation_code: None,
            admin_id: None,
            max_members: 0,
            contribution_amount: 0,
            frequency: Frequency::Monthly,
            payout_order: PayoutOrder::FirstCome,
            duration_months: 0,
            status: GroupStatus::Pending,
            current_turn: 0,
            cycle: 0,
            total_pool: 0,
            credibility_score: 100,
            start_date: None,
            next_contribution: None,
            next_payout: None,
            members: MembershipTable::new(),
            created_at: None,
            updated_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn invitation_code(&self) -> Option<&InvitationCode> {
        self.invitation_code.as_ref()
    }

    pub fn admin_id(&self) -> Option<UserId> {
        self.admin_id
    }

    pub fn max_members(&self) -> u32 {
        self.max_members
    }

    pub fn contribution_amount(&self) -> u64 {
        self.contribution_amount
    }

    pub fn frequency(&self) -> Frequency {
        self.frequency
    }

    pub fn payout_order(&self) -> PayoutOrder {
        self.payout_order
    }

    pub fn duration_months(&self) -> u32 {
        self.duration_months
    }

    pub fn status(&self) -> GroupStatus {
        self.status
    }

    pub fn current_turn(&self) -> u32 {
        self.current_turn
    }

    pub fn cycle(&self) -> u32 {
        self.cycle
    }

    pub fn total_pool(&self) -> u64 {
        self.total_pool
    }

    pub fn credibility_score(&self) -> u8 {
        self.credibility_score
    }

    pub fn start_date(&self) -> Option<DateTime<Utc>> {
        self.start_date
    }

    pub fn next_contribution(&self) -> Option<DateTime<Utc>> {
        self.next_contribution
    }

    pub fn next_payout(&self) -> Option<DateTime<Utc>> {
        self.next_payout
    }

    pub fn members(&self) -> &MembershipTable {
        &self.members
    }

    pub fn member_ids(&self) -> Vec<UserId> {
        self.members.user_ids()
    }

    pub fn is_member(&self, user_id: UserId) -> bool {
        self.members.contains(user_id)
    }

    pub fn is_admin(&self, user_id: UserId) -> bool {
        self.admin_id == Some(user_id)
    }

    pub fn is_full(&self) -> bool {
        self.members.len() >= self.max_members as usize
    }

    /// The member due to receive the next payout.
    pub fn current_recipient(&self) -> Option<&Member> {
        match self.status {
            GroupStatus::Active => self.members.at_turn(self.current_turn),
            _ => None,
        }
    }

    /// Whether the current contribution cycle has run past its deadline.
    pub fn is_cycle_due(&self, now: DateTime<Utc>) -> bool {
        self.status == GroupStatus::Active && self.next_contribution.is_some_and(|d| d <= now)
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub fn stats(&self) -> GroupStats {
        let completed_turns = self.members.iter().map(|m| m.turns).sum();
        let progress = if self.max_members == 0 {
            0
        } else {
            (u64::from(self.current_turn) * 100 / u64::from(self.max_members)).min(100) as u8
        };

        GroupStats {
            total_members: self.members.len() as u32,
            max_members: self.max_members,
            total_pool: self.total_pool,
            total_contributions: self.members.total_contributions(),
            total_missed: self.members.total_missed(),
            completed_turns,
            current_turn: self.current_turn,
            status: self.status,
            credibility_score: self.credibility_score,
            progress,
        }
    }

    fn recompute_credibility(&mut self) {
        let made = self.members.total_contributions();
        let missed = self.members.total_missed();
        self.credibility_score = match made + missed {
            0 => 100,
            due => (made * 100 / due) as u8,
        };
    }
}

impl AggregateRoot for Group {
    type Id = AggregateId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Group settings chosen by the creator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewGroup {
    pub name: String,
    pub description: Option<String>,
    pub max_members: u32,
    pub contribution_amount: u64,
    pub frequency: Frequency,
    pub payout_order: PayoutOrder,
    pub duration_months: u32,
}

impl NewGroup {
    fn validate(&self) -> DomainResult<()> {
        let name_len = self.name.trim().chars().count();
        if !(NAME_MIN_CHARS..=NAME_MAX_CHARS).contains(&name_len) {
            return Err(DomainError::validation(format!(
                "group name must be {NAME_MIN_CHARS}-{NAME_MAX_CHARS} characters"
            )));
        }
        if let Some(description) = &self.description {
            if description.trim().chars().count() > DESCRIPTION_MAX_CHARS {
                return Err(DomainError::validation(format!(
                    "description cannot exceed {DESCRIPTION_MAX_CHARS} characters"
                )));
            }
        }
        if !(MIN_MEMBERS..=MAX_MEMBERS).contains(&self.max_members) {
            return Err(DomainError::validation(format!(
                "max members must be between {MIN_MEMBERS} and {MAX_MEMBERS}"
            )));
        }
        if !(MIN_DURATION_MONTHS..=MAX_DURATION_MONTHS).contains(&self.duration_months) {
            return Err(DomainError::validation(format!(
                "duration must be between {MIN_DURATION_MONTHS} and {MAX_DURATION_MONTHS} months"
            )));
        }
        Amount::new(self.contribution_amount)?;
        Ok(())
    }
}

/// Command: CreateGroup. The admin becomes the first member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateGroup {
    pub admin_id: UserId,
    pub admin_name: String,
    pub invitation_code: InvitationCode,
    pub group: NewGroup,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AddMember.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddMember {
    pub user_id: UserId,
    pub name: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: PlaceBid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceBid {
    pub user_id: UserId,
    pub amount: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateStatus.
///
/// `status` is the wire value. Activating a random-order group must carry the
/// shuffled turn order in `random_order`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateStatus {
    pub caller: UserId,
    pub status: String,
    pub random_order: Option<Vec<UserId>>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordContribution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordContribution {
    pub user_id: UserId,
    pub amount: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ProcessPayout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessPayout {
    pub caller: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CloseCycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseCycle {
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupCommand {
    Create(CreateGroup),
    AddMember(AddMember),
    PlaceBid(PlaceBid),
    UpdateStatus(UpdateStatus),
    RecordContribution(RecordContribution),
    ProcessPayout(ProcessPayout),
    CloseCycle(CloseCycle),
}

/// Event: GroupCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupCreated {
    pub admin_id: UserId,
    pub admin_name: String,
    pub invitation_code: InvitationCode,
    pub name: String,
    pub description: Option<String>,
    pub max_members: u32,
    pub contribution_amount: Amount,
    pub frequency: Frequency,
    pub payout_order: PayoutOrder,
    pub duration_months: u32,
    pub next_contribution: DateTime<Utc>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: MemberJoined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberJoined {
    pub user_id: UserId,
    pub name: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: BidPlaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BidPlaced {
    pub user_id: UserId,
    pub amount: Amount,
    pub occurred_at: DateTime<Utc>,
}

/// Event: GroupActivated. `turn_order[i]` receives the payout at turn `i`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupActivated {
    pub turn_order: Vec<UserId>,
    pub next_contribution: DateTime<Utc>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: GroupStatusChanged (cancellation, manual completion).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupStatusChanged {
    pub from: GroupStatus,
    pub to: GroupStatus,
    pub changed_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ContributionReceived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributionReceived {
    pub user_id: UserId,
    pub amount: Amount,
    pub cycle: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PayoutProcessed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutProcessed {
    pub recipient: UserId,
    pub amount: Amount,
    pub turn: u32,
    pub next_payout: Option<DateTime<Utc>>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: GroupCompleted (every member has been paid once).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupCompleted {
    pub occurred_at: DateTime<Utc>,
}

/// Event: CycleClosed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleClosed {
    pub cycle: u32,
    pub missed: Vec<UserId>,
    pub next_contribution: DateTime<Utc>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupEvent {
    GroupCreated(GroupCreated),
    MemberJoined(MemberJoined),
    BidPlaced(BidPlaced),
    GroupActivated(GroupActivated),
    GroupStatusChanged(GroupStatusChanged),
    ContributionReceived(ContributionReceived),
    PayoutProcessed(PayoutProcessed),
    GroupCompleted(GroupCompleted),
    CycleClosed(CycleClosed),
}

impl Event for GroupEvent {
    fn event_type(&self) -> &'static str {
        match self {
            GroupEvent::GroupCreated(_) => "groups.group.created",
            GroupEvent::MemberJoined(_) => "groups.member.joined",
            GroupEvent::BidPlaced(_) => "groups.member.bid_placed",
            GroupEvent::GroupActivated(_) => "groups.group.activated",
            GroupEvent::GroupStatusChanged(_) => "groups.group.status_changed",
            GroupEvent::ContributionReceived(_) => "groups.contribution.received",
            GroupEvent::PayoutProcessed(_) => "groups.payout.processed",
            GroupEvent::GroupCompleted(_) => "groups.group.completed",
            GroupEvent::CycleClosed(_) => "groups.cycle.closed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            GroupEvent::GroupCreated(e) => e.occurred_at,
            GroupEvent::MemberJoined(e) => e.occurred_at,
            GroupEvent::BidPlaced(e) => e.occurred_at,
            GroupEvent::GroupActivated(e) => e.occurred_at,
            GroupEvent::GroupStatusChanged(e) => e.occurred_at,
            GroupEvent::ContributionReceived(e) => e.occurred_at,
            GroupEvent::PayoutProcessed(e) => e.occurred_at,
            GroupEvent::GroupCompleted(e) => e.occurred_at,
            GroupEvent::CycleClosed(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Group {
    type Command = GroupCommand;
    type Event = GroupEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            GroupEvent::GroupCreated(e) => {
                self.name = e.name.trim().to_string();
                self.description = e.description.as_ref().map(|d| d.trim().to_string());
                self.invitation_code = Some(e.invitation_code.clone());
                self.admin_id = Some(e.admin_id);
                self.max_members = e.max_members;
                self.contribution_amount = e.contribution_amount.get();
                self.frequency = e.frequency;
                self.payout_order = e.payout_order;
                self.duration_months = e.duration_months;
                self.status = GroupStatus::Pending;
                self.start_date = Some(e.occurred_at);
                self.next_contribution = Some(e.next_contribution);
                self.next_payout = Some(e.next_contribution);
                self.members
                    .insert(Member::new(e.admin_id, e.admin_name.clone(), Role::Admin, e.occurred_at));
                self.created_at = Some(e.occurred_at);
                self.created = true;
            }
            GroupEvent::MemberJoined(e) => {
                self.members
                    .insert(Member::new(e.user_id, e.name.clone(), Role::Member, e.occurred_at));
            }
            GroupEvent::BidPlaced(e) => {
                if let Some(member) = self.members.get_mut(e.user_id) {
                    member.bid = Some(e.amount);
                }
            }
            GroupEvent::GroupActivated(e) => {
                for (position, user_id) in e.turn_order.iter().enumerate() {
                    if let Some(member) = self.members.get_mut(*user_id) {
                        member.turn_position = Some(position as u32);
                    }
                }
                if let Some(first) = self.members.at_turn_mut(0) {
                    first.status = MemberStatus::Current;
                }
                self.status = GroupStatus::Active;
                self.current_turn = 0;
                self.start_date = Some(e.occurred_at);
                self.next_contribution = Some(e.next_contribution);
                self.next_payout = Some(e.next_contribution);
            }
            GroupEvent::GroupStatusChanged(e) => {
                self.status = e.to;
            }
            GroupEvent::ContributionReceived(e) => {
                self.total_pool = self.total_pool.saturating_add(e.amount.get());
                if let Some(member) = self.members.get_mut(e.user_id) {
                    member.contributions_made += 1;
                    member.last_contribution_cycle = Some(e.cycle);
                }
            }
            GroupEvent::PayoutProcessed(e) => {
                self.total_pool = 0;
                if let Some(member) = self.members.get_mut(e.recipient) {
                    member.status = MemberStatus::Completed;
                    member.turns += 1;
                }
                self.current_turn = e.turn + 1;
                if let Some(next) = self.members.at_turn_mut(self.current_turn) {
                    next.status = MemberStatus::Current;
                }
                self.next_payout = e.next_payout;
            }
            GroupEvent::GroupCompleted(_) => {
                self.status = GroupStatus::Completed;
                self.next_payout = None;
            }
            GroupEvent::CycleClosed(e) => {
                for member in self.members.iter_mut() {
                    if !e.missed.contains(&member.user_id) {
                        continue;
                    }
                    member.missed_contributions += 1;
                    if !matches!(member.status, MemberStatus::Completed | MemberStatus::Current) {
                        member.status = MemberStatus::Missed;
                    }
                }
                self.cycle = e.cycle + 1;
                self.next_contribution = Some(e.next_contribution);
            }
        }

        self.updated_at = Some(event.occurred_at());
        self.recompute_credibility();

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        if !self.created && !matches!(command, GroupCommand::Create(_)) {
            return Err(DomainError::not_found("group"));
        }

        match command {
            GroupCommand::Create(cmd) => self.handle_create(cmd),
            GroupCommand::AddMember(cmd) => self.handle_add_member(cmd),
            GroupCommand::PlaceBid(cmd) => self.handle_place_bid(cmd),
            GroupCommand::UpdateStatus(cmd) => self.handle_update_status(cmd),
            GroupCommand::RecordContribution(cmd) => self.handle_record_contribution(cmd),
            GroupCommand::ProcessPayout(cmd) => self.handle_process_payout(cmd),
            GroupCommand::CloseCycle(cmd) => self.handle_close_cycle(cmd),
        }
    }
}

impl Group {
    fn ensure_status(&self, expected: GroupStatus, action: &str) -> DomainResult<()> {
        if self.status != expected {
            return Err(DomainError::invalid_transition(format!(
                "cannot {action} while group is {}",
                self.status
            )));
        }
        Ok(())
    }

    fn ensure_admin(&self, caller: UserId, action: &str) -> DomainResult<()> {
        if !self.is_admin(caller) {
            return Err(DomainError::unauthorized(format!("only the group admin can {action}")));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateGroup) -> Result<Vec<GroupEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("group already exists"));
        }
        cmd.group.validate()?;
        let contribution_amount = Amount::new(cmd.group.contribution_amount)?;
        let next_contribution = next_date(cmd.group.frequency, cmd.occurred_at)?;

        Ok(vec![GroupEvent::GroupCreated(GroupCreated {
            admin_id: cmd.admin_id,
            admin_name: cmd.admin_name.clone(),
            invitation_code: cmd.invitation_code.clone(),
            name: cmd.group.name.clone(),
            description: cmd.group.description.clone(),
            max_members: cmd.group.max_members,
            contribution_amount,
            frequency: cmd.group.frequency,
            payout_order: cmd.group.payout_order,
            duration_months: cmd.group.duration_months,
            next_contribution,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_add_member(&self, cmd: &AddMember) -> Result<Vec<GroupEvent>, DomainError> {
        self.members.ensure_absent(cmd.user_id)?;
        if self.is_full() {
            return Err(DomainError::GroupFull);
        }
        self.ensure_status(GroupStatus::Pending, "add members")?;

        Ok(vec![GroupEvent::MemberJoined(MemberJoined {
            user_id: cmd.user_id,
            name: cmd.name.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_place_bid(&self, cmd: &PlaceBid) -> Result<Vec<GroupEvent>, DomainError> {
        self.ensure_status(GroupStatus::Pending, "place bids")?;
        if self.payout_order != PayoutOrder::Bidding {
            return Err(DomainError::validation("group does not use bidding payout order"));
        }
        self.members.ensure_member(cmd.user_id)?;
        let amount = Amount::new(cmd.amount)?;

        Ok(vec![GroupEvent::BidPlaced(BidPlaced {
            user_id: cmd.user_id,
            amount,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update_status(&self, cmd: &UpdateStatus) -> Result<Vec<GroupEvent>, DomainError> {
        self.ensure_admin(cmd.caller, "change the group status")?;
        let target: GroupStatus = cmd.status.parse()?;

        if !self.status.can_transition_to(target) {
            return Err(DomainError::invalid_transition(format!(
                "{} -> {}",
                self.status, target
            )));
        }

        match target {
            GroupStatus::Active => {
                if !self.is_full() {
                    return Err(DomainError::invalid_transition(format!(
                        "group needs {} members to start, has {}",
                        self.max_members,
                        self.members.len()
                    )));
                }
                let turn_order =
                    assign_turns(self.payout_order, &self.members, cmd.random_order.as_deref())?;
                let next_contribution = next_date(self.frequency, cmd.occurred_at)?;

                Ok(vec![GroupEvent::GroupActivated(GroupActivated {
                    turn_order,
                    next_contribution,
                    occurred_at: cmd.occurred_at,
                })])
            }
            GroupStatus::Completed if self.current_turn < self.max_members => {
                Err(DomainError::invalid_transition(
                    "payout rotation has not finished",
                ))
            }
            to => Ok(vec![GroupEvent::GroupStatusChanged(GroupStatusChanged {
                from: self.status,
                to,
                changed_by: cmd.caller,
                occurred_at: cmd.occurred_at,
            })]),
        }
    }

    fn handle_record_contribution(
        &self,
        cmd: &RecordContribution,
    ) -> Result<Vec<GroupEvent>, DomainError> {
        self.ensure_status(GroupStatus::Active, "contribute")?;
        let member = self.members.ensure_member(cmd.user_id)?;
        let amount = Amount::new(cmd.amount)?;

        if amount.get() != self.contribution_amount {
            return Err(DomainError::validation(format!(
                "contribution must be exactly {}",
                self.contribution_amount
            )));
        }
        if member.contributed_in(self.cycle) {
            return Err(DomainError::conflict(format!(
                "already contributed in cycle {}",
                self.cycle
            )));
        }
        credit(self.total_pool, amount, "group pool")?;

        Ok(vec![GroupEvent::ContributionReceived(ContributionReceived {
            user_id: cmd.user_id,
            amount,
            cycle: self.cycle,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_process_payout(&self, cmd: &ProcessPayout) -> Result<Vec<GroupEvent>, DomainError> {
        self.ensure_admin(cmd.caller, "process payouts")?;
        self.ensure_status(GroupStatus::Active, "process a payout")?;

        let amount = Amount::new(self.total_pool)
            .map_err(|_| DomainError::invalid_transition("no funds in the pool"))?;
        let recipient = self
            .members
            .at_turn(self.current_turn)
            .ok_or_else(|| DomainError::invariant(format!("no member holds turn {}", self.current_turn)))?;

        let finished = self.current_turn + 1 >= self.max_members;
        let next_payout = if finished {
            None
        } else {
            Some(next_date(self.frequency, self.next_payout.unwrap_or(cmd.occurred_at))?)
        };

        let mut events = vec![GroupEvent::PayoutProcessed(PayoutProcessed {
            recipient: recipient.user_id,
            amount,
            turn: self.current_turn,
            next_payout,
            occurred_at: cmd.occurred_at,
        })];
        if finished {
            events.push(GroupEvent::GroupCompleted(GroupCompleted {
                occurred_at: cmd.occurred_at,
            }));
        }
        Ok(events)
    }

    fn handle_close_cycle(&self, cmd: &CloseCycle) -> Result<Vec<GroupEvent>, DomainError> {
        self.ensure_status(GroupStatus::Active, "close a cycle")?;
        let due = self
            .next_contribution
            .filter(|d| *d <= cmd.now)
            .ok_or_else(|| DomainError::invalid_transition("contribution cycle is not due yet"))?;

        let missed = self
            .members
            .iter()
            .filter(|m| !m.contributed_in(self.cycle))
            .map(|m| m.user_id)
            .collect();

        Ok(vec![GroupEvent::CycleClosed(CycleClosed {
            cycle: self.cycle,
            missed,
            next_contribution: next_date(self.frequency, due)?,
            occurred_at: cmd.now,
        })])
    }
}
