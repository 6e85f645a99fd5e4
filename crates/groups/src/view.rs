use chrono::{DateTime, Utc};
use serde::Serialize;

use ajo_core::AggregateRoot;

use crate::group::{Group, GroupStatus};
use crate::membership::{Member, MemberStatus, Role};
use crate::rotation::PayoutOrder;
use crate::schedule::Frequency;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberView {
    pub user_id: String,
    pub name: String,
    pub join_date: DateTime<Utc>,
    pub role: Role,
    pub status: MemberStatus,
    pub turns: u32,
    pub contributions_made: u32,
    pub missed_contributions: u32,
    pub turn_position: Option<u32>,
}

impl From<&Member> for MemberView {
    fn from(m: &Member) -> Self {
        Self {
            user_id: m.user_id.to_string(),
            name: m.name.clone(),
            join_date: m.join_date,
            role: m.role,
            status: m.status,
            turns: m.turns,
            contributions_made: m.contributions_made,
            missed_contributions: m.missed_contributions,
            turn_position: m.turn_position,
        }
    }
}

/// Group as shown to its members and to users holding the invitation code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSummary {
    pub group_id: String,
    pub name: String,
    pub description: Option<String>,
    pub invitation_code: Option<String>,
    pub status: GroupStatus,
    pub credibility_score: u8,
    pub members_list: Vec<MemberView>,
    pub next_contribution: Option<DateTime<Utc>>,
    pub next_payout: Option<DateTime<Utc>>,
    pub total_pool: u64,
    pub current_turn: u32,
    pub max_members: u32,
    pub contribution_amount: u64,
    pub frequency: Frequency,
    pub payout_order: PayoutOrder,
}

impl From<&Group> for GroupSummary {
    fn from(group: &Group) -> Self {
        Self {
            group_id: group.id().to_string(),
            name: group.name().to_string(),
            description: group.description().map(str::to_string),
            invitation_code: group.invitation_code().map(|c| c.as_str().to_string()),
            status: group.status(),
            credibility_score: group.credibility_score(),
            members_list: group.members().iter().map(MemberView::from).collect(),
            next_contribution: group.next_contribution(),
            next_payout: group.next_payout(),
            total_pool: group.total_pool(),
            current_turn: group.current_turn(),
            max_members: group.max_members(),
            contribution_amount: group.contribution_amount(),
            frequency: group.frequency(),
            payout_order: group.payout_order(),
        }
    }
}
