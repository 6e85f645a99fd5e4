//! Savings groups (event-sourced).
//!
//! - `invitation`: invitation code value object and generation
//! - `schedule`: contribution frequency and next-date arithmetic
//! - `membership`: the single membership table of a group
//! - `rotation`: payout order and turn assignment
//! - `group`: the group aggregate (admission, contributions, payouts, cycles)
//! - `view`: outward-facing group summary

pub mod group;
pub mod invitation;
pub mod membership;
pub mod rotation;
pub mod schedule;
pub mod view;

pub use group::{
    AddMember, BidPlaced, CloseCycle, ContributionReceived, CreateGroup, CycleClosed, Group,
    GroupActivated, GroupCommand, GroupCompleted, GroupCreated, GroupEvent, GroupStats,
    GroupStatus, GroupStatusChanged, MemberJoined, NewGroup, PayoutProcessed, PlaceBid,
    ProcessPayout, RecordContribution, UpdateStatus,
};
pub use invitation::InvitationCode;
pub use membership::{Member, MemberStatus, MembershipTable, Role};
pub use rotation::{PayoutOrder, assign_turns, shuffled_order};
pub use schedule::{Frequency, next_date};
pub use view::{GroupSummary, MemberView};

/// Aggregate type tag of the event streams owned by this crate.
pub const AGGREGATE_TYPE: &str = "group";
