#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use rand::SeedableRng;
use rand::rngs::StdRng;

use ajo_app::collaborators::{
    BankAccountVerifier, CollaboratorError, ResolvedAccount, TransferGateway, TransferReceipt,
};
use ajo_app::services::{AddBankAccountRequest, CreateGroupRequest};
use ajo_app::{AppConfig, AppServices, Caller};
use ajo_core::{AggregateId, Amount, UserId};
use ajo_groups::GroupSummary;
use ajo_wallet::RecipientReference;

/// Account number the fake processor refuses to resolve.
pub const UNKNOWN_ACCOUNT: &str = "0000000000";

/// In-process stand-in for the payment processor.
#[derive(Debug, Default)]
pub struct FakeProcessor {
    refuse_transfers: AtomicBool,
    sequence: AtomicU32,
    transfers: Mutex<Vec<(String, u64)>>,
}

impl FakeProcessor {
    pub fn refuse_transfers(&self, refuse: bool) {
        self.refuse_transfers.store(refuse, Ordering::SeqCst);
    }

    /// `(recipient token, amount)` for every accepted transfer.
    pub fn transfers(&self) -> Vec<(String, u64)> {
        self.transfers.lock().unwrap().clone()
    }
}

impl BankAccountVerifier for FakeProcessor {
    fn resolve_account(&self, account_number: &str, _bank_code: &str) -> Result<ResolvedAccount, CollaboratorError> {
        if account_number == UNKNOWN_ACCOUNT {
            return Err(CollaboratorError::Rejected("could not resolve account name".to_string()));
        }
        Ok(ResolvedAccount {
            account_name: "ADAEZE OKAFOR".to_string(),
            account_number: account_number.to_string(),
        })
    }

    fn create_recipient(
        &self,
        account_number: &str,
        _account_name: &str,
        bank_code: &str,
        _currency: &str,
    ) -> Result<RecipientReference, CollaboratorError> {
        Ok(RecipientReference::new(format!("RCP_{bank_code}_{account_number}")))
    }
}

impl TransferGateway for FakeProcessor {
    fn transfer(
        &self,
        recipient: &RecipientReference,
        amount: Amount,
        _reason: &str,
    ) -> Result<TransferReceipt, CollaboratorError> {
        if self.refuse_transfers.load(Ordering::SeqCst) {
            return Err(CollaboratorError::Rejected("transfer declined".to_string()));
        }
        let n = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        self.transfers
            .lock()
            .unwrap()
            .push((recipient.expose().to_string(), amount.get()));
        Ok(TransferReceipt {
            transfer_code: format!("TRF_{n}"),
            reference: format!("wd_{n}"),
        })
    }
}

pub fn setup() -> (Arc<AppServices>, Arc<FakeProcessor>) {
    setup_with(AppConfig::default())
}

pub fn setup_with(config: AppConfig) -> (Arc<AppServices>, Arc<FakeProcessor>) {
    let processor = Arc::new(FakeProcessor::default());
    let services = AppServices::new(config, processor.clone(), processor.clone()).with_rng(StdRng::seed_from_u64(7));
    (Arc::new(services), processor)
}

pub fn caller(name: &str) -> Caller {
    Caller::new(UserId::new(), name)
}

pub fn group_request(max_members: u32, frequency: &str, payout_order: &str) -> CreateGroupRequest {
    CreateGroupRequest {
        name: "Balogun Market Ajo".to_string(),
        description: Some("Weekly traders' savings".to_string()),
        max_members,
        contribution_amount: 1_000,
        frequency: frequency.to_string(),
        payout_order: payout_order.to_string(),
        duration_months: 6,
    }
}

pub fn group_id(summary: &GroupSummary) -> AggregateId {
    summary.group_id.parse().unwrap()
}

/// Create a full first-come group of `admin` plus `members` and activate it.
pub fn active_group(services: &AppServices, admin: &Caller, members: &[&Caller], frequency: &str) -> AggregateId {
    let created = services
        .create_group(admin, group_request(members.len() as u32 + 1, frequency, "firstCome"))
        .unwrap();
    let id = group_id(&created);
    for member in members {
        services.join_group(member, id).unwrap();
    }
    services.update_group_status(admin, id, "active").unwrap();
    id
}

pub fn bank_account(account_number: &str, is_primary: bool) -> AddBankAccountRequest {
    AddBankAccountRequest {
        account_number: account_number.to_string(),
        bank_code: "058".to_string(),
        bank_name: "GTBank".to_string(),
        is_primary,
    }
}
