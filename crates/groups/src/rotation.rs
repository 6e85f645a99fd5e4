//! Payout order and turn assignment.

use core::cmp::Reverse;
use core::str::FromStr;
use std::collections::HashSet;

use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use ajo_core::{DomainError, DomainResult, UserId};

use crate::membership::MembershipTable;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PayoutOrder {
    #[serde(rename = "random")]
    Random,
    #[serde(rename = "firstCome")]
    FirstCome,
    #[serde(rename = "bidding")]
    Bidding,
}

impl PayoutOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            PayoutOrder::Random => "random",
            PayoutOrder::FirstCome => "firstCome",
            PayoutOrder::Bidding => "bidding",
        }
    }
}

impl FromStr for PayoutOrder {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "random" => Ok(PayoutOrder::Random),
            "firstCome" => Ok(PayoutOrder::FirstCome),
            "bidding" => Ok(PayoutOrder::Bidding),
            other => Err(DomainError::validation(format!(
                "payout order must be random, firstCome or bidding (got {other:?})"
            ))),
        }
    }
}

impl core::fmt::Display for PayoutOrder {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A uniformly shuffled copy of `members`, drawn once when a random-order group activates.
pub fn shuffled_order<R: Rng + ?Sized>(members: &MembershipTable, rng: &mut R) -> Vec<UserId> {
    let mut ids = members.user_ids();
    ids.shuffle(rng);
    ids
}

/// Decide the payout sequence (index = turn position).
///
/// - `FirstCome`: join order.
/// - `Random`: `random_order`, which must be a permutation of the members.
/// - `Bidding`: bidders first by descending bid; ties and non-bidders keep join order.
pub fn assign_turns(
    order: PayoutOrder,
    members: &MembershipTable,
    random_order: Option<&[UserId]>,
) -> DomainResult<Vec<UserId>> {
    match order {
        PayoutOrder::FirstCome => Ok(members.user_ids()),
        PayoutOrder::Random => {
            let proposed = random_order
                .ok_or_else(|| DomainError::validation("random payout order requires a shuffled turn order"))?;
            ensure_permutation(members, proposed)?;
            Ok(proposed.to_vec())
        }
        PayoutOrder::Bidding => {
            let mut rows: Vec<_> = members.iter().collect();
            // Stable sort: equal keys stay in join order.
            rows.sort_by_key(|m| Reverse(m.bid.map(|b| b.get())));
            Ok(rows.into_iter().map(|m| m.user_id).collect())
        }
    }
}

fn ensure_permutation(members: &MembershipTable, proposed: &[UserId]) -> DomainResult<()> {
    let unique: HashSet<_> = proposed.iter().copied().collect();
    let complete = proposed.len() == members.len()
        && unique.len() == proposed.len()
        && proposed.iter().all(|id| members.contains(*id));
    if !complete {
        return Err(DomainError::validation(
            "turn order must list every member exactly once",
        ));
    }
    Ok(())
}
