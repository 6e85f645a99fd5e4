mod common;

use std::sync::{Arc, Barrier};
use std::thread;

use chrono::{Duration, Utc};

use ajo_app::services::ContributionRequest;
use ajo_groups::{GroupStatus, MemberStatus};
use ajo_transactions::{PaymentMethod, TransactionStatus, TransactionType};

use common::*;

#[test]
fn contribution_needs_funds_and_settles_into_lifetime_total() {
    let (services, _) = setup();
    let (admin, bola) = (caller("Ada"), caller("Bola"));
    let id = active_group(&services, &admin, &[&bola], "Monthly");

    let wallet = services.wallet(&bola).unwrap();
    assert_eq!(wallet.available_balance, 0);

    let err = services.contribute(&bola, id, ContributionRequest::new(1_000)).unwrap_err();
    assert_eq!(err.kind(), "insufficient_funds");
    let wallet = services.wallet(&bola).unwrap();
    assert_eq!(wallet.total_contributions, 0);
    assert_eq!(wallet.locked_balance, 0);

    let failed = services.transactions_for(&bola);
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].status, TransactionStatus::Failed);
    assert_eq!(services.group(&bola, id).unwrap().total_pool, 0);

    services.deposit(&bola, 1_000).unwrap();
    let tx = services.contribute(&bola, id, ContributionRequest::new(1_000)).unwrap();
    assert_eq!(tx.status, TransactionStatus::Completed);
    assert_eq!(tx.kind, TransactionType::Contribution);
    assert_eq!(tx.payment_method, PaymentMethod::Card);
    assert!(tx.completed_at.is_some());

    let wallet = services.wallet(&bola).unwrap();
    assert_eq!(wallet.available_balance, 0);
    assert_eq!(wallet.locked_balance, 0);
    assert_eq!(wallet.total_balance, 0);
    assert_eq!(wallet.total_contributions, 1_000);

    let group = services.group(&bola, id).unwrap();
    assert_eq!(group.total_pool, 1_000);
}

#[test]
fn contribution_rules_are_checked_before_the_wallet_is_touched() {
    let (services, _) = setup();
    let (admin, bola) = (caller("Ada"), caller("Bola"));
    let id = active_group(&services, &admin, &[&bola], "Weekly");
    services.deposit(&bola, 5_000).unwrap();

    let wrong_amount = services.contribute(&bola, id, ContributionRequest::new(700)).unwrap_err();
    assert_eq!(wrong_amount.kind(), "validation_error");
    let outsider = caller("Stranger");
    services.deposit(&outsider, 5_000).unwrap();
    assert_eq!(
        services.contribute(&outsider, id, ContributionRequest::new(1_000)).unwrap_err().kind(),
        "not_member"
    );

    services.contribute(&bola, id, ContributionRequest::new(1_000)).unwrap();
    assert_eq!(
        services.contribute(&bola, id, ContributionRequest::new(1_000)).unwrap_err().kind(),
        "conflict"
    );

    let wallet = services.wallet(&bola).unwrap();
    assert_eq!(wallet.available_balance, 4_000);
    assert_eq!(wallet.locked_balance, 0);
    assert_eq!(services.transactions_for(&bola).len(), 1);
}

#[test]
fn repeated_payment_reference_is_charged_once() {
    let (services, _) = setup();
    let (admin, bola) = (caller("Ada"), caller("Bola"));
    let id = active_group(&services, &admin, &[&bola], "Weekly");
    services.deposit(&bola, 5_000).unwrap();

    let first = services
        .contribute(&bola, id, ContributionRequest::new(1_000).with_reference("PSK-778812"))
        .unwrap();
    let replay = services
        .contribute(&bola, id, ContributionRequest::new(1_000).with_reference(" PSK-778812 "))
        .unwrap();
    assert_eq!(replay, first);
    assert_eq!(replay.reference.as_deref(), Some("PSK-778812"));

    let wallet = services.wallet(&bola).unwrap();
    assert_eq!(wallet.available_balance, 4_000);
    assert_eq!(wallet.total_contributions, 1_000);
    assert_eq!(services.transactions_for(&bola).len(), 1);

    services.deposit(&admin, 1_000).unwrap();
    let err = services
        .contribute(&admin, id, ContributionRequest::new(1_000).with_reference("PSK-778812"))
        .unwrap_err();
    assert_eq!(err.kind(), "conflict");
    assert_eq!(services.wallet(&admin).unwrap().available_balance, 1_000);
}

#[test]
fn reference_reused_for_another_group_is_not_a_replay() {
    let (services, _) = setup();
    let (ada, bola, chidi) = (caller("Ada"), caller("Bola"), caller("Chidi"));
    let market = active_group(&services, &ada, &[&bola], "Weekly");
    let church = active_group(&services, &ada, &[&chidi], "Weekly");
    services.deposit(&ada, 5_000).unwrap();

    let first = services
        .contribute(&ada, market, ContributionRequest::new(1_000).with_reference("PAY-1"))
        .unwrap();
    assert_eq!(first.group_id.as_deref(), Some(market.to_string().as_str()));

    let err = services
        .contribute(&ada, church, ContributionRequest::new(1_000).with_reference("PAY-1"))
        .unwrap_err();
    assert_eq!(err.kind(), "conflict");
    assert_eq!(services.group(&ada, church).unwrap().total_pool, 0);

    // Same group, different amount: not the same payment either.
    let err = services
        .contribute(&ada, market, ContributionRequest::new(2_000).with_reference("PAY-1"))
        .unwrap_err();
    assert_eq!(err.kind(), "conflict");

    let wallet = services.wallet(&ada).unwrap();
    assert_eq!(wallet.available_balance, 4_000);
    assert_eq!(services.transactions_for(&ada).len(), 1);

    let second = services
        .contribute(&ada, church, ContributionRequest::new(1_000).with_reference("PAY-2"))
        .unwrap();
    assert_eq!(second.status, TransactionStatus::Completed);
    assert_eq!(services.group(&ada, church).unwrap().total_pool, 1_000);
}

#[test]
fn failed_contribution_frees_its_reference() {
    let (services, _) = setup();
    let (admin, bola) = (caller("Ada"), caller("Bola"));
    let id = active_group(&services, &admin, &[&bola], "Weekly");

    let err = services
        .contribute(&bola, id, ContributionRequest::new(1_000).with_reference("PSK-1"))
        .unwrap_err();
    assert_eq!(err.kind(), "insufficient_funds");

    services.deposit(&bola, 1_000).unwrap();
    let tx = services
        .contribute(&bola, id, ContributionRequest::new(1_000).with_reference("PSK-1"))
        .unwrap();
    assert_eq!(tx.status, TransactionStatus::Completed);
}

#[test]
fn payouts_rotate_through_every_member_then_complete_the_group() {
    let (services, _) = setup();
    let (admin, bola, chidi) = (caller("Ada"), caller("Bola"), caller("Chidi"));
    let members = [&admin, &bola, &chidi];
    let id = active_group(&services, &admin, &[&bola, &chidi], "Weekly");
    for member in members {
        services.deposit(member, 3_000).unwrap();
    }

    assert_eq!(
        services.process_payout(&admin, id).unwrap_err().kind(),
        "invalid_transition"
    );

    let start = Utc::now();
    for (turn, recipient) in members.iter().enumerate() {
        if turn > 0 {
            let report = services.run_sweep(start + Duration::days(7 * turn as i64) + Duration::hours(1)).unwrap();
            assert_eq!(report.closed, 1);
        }
        for member in members {
            services.contribute(member, id, ContributionRequest::new(1_000)).unwrap();
        }
        assert_eq!(
            services.process_payout(&bola, id).unwrap_err().kind(),
            "unauthorized"
        );

        let outcome = services.process_payout(&admin, id).unwrap();
        assert_eq!(outcome.transaction.kind, TransactionType::Payout);
        assert_eq!(outcome.transaction.status, TransactionStatus::Completed);
        assert_eq!(outcome.transaction.amount, 3_000);
        assert_eq!(outcome.transaction.user_id, recipient.user_id().to_string());
        assert_eq!(outcome.group.current_turn, turn as u32 + 1);
        assert_eq!(outcome.group.total_pool, 0);
    }

    let group = services.group(&admin, id).unwrap();
    assert_eq!(group.status, GroupStatus::Completed);
    assert!(group.next_payout.is_none());
    assert!(group.members_list.iter().all(|m| m.status == MemberStatus::Completed && m.turns == 1));
    assert_eq!(group.credibility_score, 100);

    for member in members {
        let wallet = services.wallet(member).unwrap();
        assert_eq!(wallet.total_contributions, 3_000);
        assert_eq!(wallet.total_payouts, 3_000);
        assert_eq!(wallet.available_balance, 3_000);

        let stats = services.transaction_stats(member);
        assert_eq!(stats.contributions.count, 3);
        assert_eq!(stats.payouts.total, 3_000);
    }

    assert_eq!(
        services.process_payout(&admin, id).unwrap_err().kind(),
        "invalid_transition"
    );
}

#[test]
fn payout_to_a_disabled_wallet_is_refused_before_the_turn_advances() {
    let (services, _) = setup();
    let (admin, bola) = (caller("Ada"), caller("Bola"));
    let id = active_group(&services, &admin, &[&bola], "Weekly");
    for member in [&admin, &bola] {
        services.deposit(member, 1_000).unwrap();
        services.contribute(member, id, ContributionRequest::new(1_000)).unwrap();
    }

    services.disable_wallet(&admin, Some("under review".to_string())).unwrap();
    let err = services.process_payout(&admin, id).unwrap_err();
    assert_eq!(err.kind(), "invalid_transition");

    let group = services.group(&admin, id).unwrap();
    assert_eq!(group.current_turn, 0);
    assert_eq!(group.total_pool, 2_000);
}

#[test]
fn bank_accounts_keep_a_single_primary() {
    let (services, _) = setup();
    let ada = caller("Ada");

    let first = services.add_bank_account(&ada, bank_account("0123456789", false)).unwrap();
    assert!(first.is_primary);
    assert!(first.is_verified);
    assert_eq!(first.account_name, "ADAEZE OKAFOR");

    let second = services.add_bank_account(&ada, bank_account("9876543210", false)).unwrap();
    assert!(!second.is_primary);
    let accounts = services.bank_accounts(&ada).unwrap();
    assert!(accounts[0].is_primary);
    assert!(!accounts[1].is_primary);

    let accounts = services.set_primary_account(&ada, second.account_id).unwrap();
    assert!(!accounts[0].is_primary);
    assert!(accounts[1].is_primary);

    let third = services.add_bank_account(&ada, bank_account("5555555555", true)).unwrap();
    assert!(third.is_primary);
    let accounts = services.bank_accounts(&ada).unwrap();
    assert_eq!(accounts.iter().filter(|a| a.is_primary).count(), 1);

    assert_eq!(
        services.add_bank_account(&ada, bank_account("0123456789", true)).unwrap_err().kind(),
        "duplicate_account"
    );
    assert_eq!(
        services.add_bank_account(&ada, bank_account(UNKNOWN_ACCOUNT, false)).unwrap_err().kind(),
        "validation_error"
    );
    assert_eq!(services.bank_accounts(&ada).unwrap().len(), 3);

    let json = serde_json::to_value(services.wallet(&ada).unwrap()).unwrap();
    assert!(!json.to_string().contains("RCP_"));
}

#[test]
fn withdrawal_transfers_to_the_primary_account() {
    let (services, processor) = setup();
    let ada = caller("Ada");

    assert_eq!(services.withdraw(&ada, 500).unwrap_err().kind(), "validation_error");

    services.add_bank_account(&ada, bank_account("0123456789", true)).unwrap();
    services.deposit(&ada, 5_000).unwrap();
    assert_eq!(services.withdraw(&ada, 0).unwrap_err().kind(), "invalid_amount");

    let tx = services.withdraw(&ada, 2_000).unwrap();
    assert_eq!(tx.kind, TransactionType::Withdrawal);
    assert_eq!(tx.status, TransactionStatus::Completed);
    assert_eq!(tx.payment_method, PaymentMethod::BankTransfer);
    assert_eq!(processor.transfers(), vec![("RCP_058_0123456789".to_string(), 2_000)]);

    let wallet = services.wallet(&ada).unwrap();
    assert_eq!(wallet.available_balance, 3_000);
    assert_eq!(wallet.locked_balance, 0);
    assert_eq!(wallet.total_withdrawals, 2_000);

    let err = services.withdraw(&ada, 10_000).unwrap_err();
    assert_eq!(err.kind(), "insufficient_funds");
    assert_eq!(processor.transfers().len(), 1);
}

#[test]
fn refused_transfer_unlocks_funds_and_can_be_retried() {
    let (services, processor) = setup();
    let ada = caller("Ada");
    services.add_bank_account(&ada, bank_account("0123456789", true)).unwrap();
    services.deposit(&ada, 5_000).unwrap();

    processor.refuse_transfers(true);
    let err = services.withdraw(&ada, 2_000).unwrap_err();
    assert_eq!(err.kind(), "validation_error");

    let wallet = services.wallet(&ada).unwrap();
    assert_eq!(wallet.available_balance, 5_000);
    assert_eq!(wallet.locked_balance, 0);
    assert_eq!(wallet.total_withdrawals, 0);

    let history = services.transactions_for(&ada);
    assert_eq!(history.len(), 1);
    let failed = history[0].clone();
    assert_eq!(failed.status, TransactionStatus::Failed);
    assert!(failed.failure_reason.is_some());

    processor.refuse_transfers(false);
    let retried = services.retry_transaction(&ada, &failed.transaction_id).unwrap();
    assert_eq!(retried.status, TransactionStatus::Completed);
    assert_eq!(retried.supersedes.as_deref(), Some(failed.transaction_id.as_str()));
    assert_ne!(retried.transaction_id, failed.transaction_id);

    assert_eq!(
        services.retry_transaction(&ada, &failed.transaction_id).unwrap_err().kind(),
        "conflict"
    );
    assert_eq!(
        services.retry_transaction(&ada, &retried.transaction_id).unwrap_err().kind(),
        "invalid_transition"
    );

    let wallet = services.wallet(&ada).unwrap();
    assert_eq!(wallet.available_balance, 3_000);
    assert_eq!(wallet.total_withdrawals, 2_000);

    let stats = services.transaction_stats(&ada);
    assert_eq!(stats.withdrawals.count, 1);
    assert_eq!(stats.withdrawals.total, 2_000);
}

#[test]
fn failed_contribution_is_retried_as_a_new_transaction() {
    let (services, _) = setup();
    let (admin, bola) = (caller("Ada"), caller("Bola"));
    let id = active_group(&services, &admin, &[&bola], "Weekly");

    services.contribute(&bola, id, ContributionRequest::new(1_000)).unwrap_err();
    let failed = services.transactions_for(&bola).remove(0);
    assert_eq!(failed.status, TransactionStatus::Failed);

    services.deposit(&bola, 1_000).unwrap();
    let retried = services.retry_transaction(&bola, &failed.transaction_id).unwrap();
    assert_eq!(retried.status, TransactionStatus::Completed);
    assert_eq!(retried.group_id, failed.group_id);
    assert_eq!(retried.supersedes, Some(failed.transaction_id.clone()));

    let history = services.transactions_for(&bola);
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].transaction_id, retried.transaction_id);
}

#[test]
fn disabled_wallet_rejects_money_movement() {
    let (services, _) = setup();
    let ada = caller("Ada");
    services.deposit(&ada, 1_000).unwrap();

    let wallet = services.disable_wallet(&ada, None).unwrap();
    assert!(wallet.disabled);
    assert_eq!(services.deposit(&ada, 1_000).unwrap_err().kind(), "invalid_transition");
    assert_eq!(services.wallet(&ada).unwrap().available_balance, 1_000);
}

#[test]
fn concurrent_retries_of_one_failure_transfer_once() {
    for _ in 0..25 {
        let (services, processor) = setup();
        let ada = caller("Ada");
        services.add_bank_account(&ada, bank_account("0123456789", true)).unwrap();
        services.deposit(&ada, 5_000).unwrap();

        processor.refuse_transfers(true);
        services.withdraw(&ada, 2_000).unwrap_err();
        processor.refuse_transfers(false);
        let failed = services.transactions_for(&ada)[0].transaction_id.clone();

        let barrier = Arc::new(Barrier::new(2));
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let (services, barrier, ada, failed) =
                    (Arc::clone(&services), Arc::clone(&barrier), ada.clone(), failed.clone());
                thread::spawn(move || {
                    barrier.wait();
                    services.retry_transaction(&ada, &failed)
                })
            })
            .collect();
        let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(outcomes.iter().filter(|o| o.is_ok()).count(), 1);
        let loser = outcomes.into_iter().find_map(Result::err).unwrap();
        assert_eq!(loser.kind(), "conflict");

        assert_eq!(processor.transfers().len(), 1);
        let wallet = services.wallet(&ada).unwrap();
        assert_eq!(wallet.available_balance, 3_000);
        assert_eq!(wallet.locked_balance, 0);
        assert_eq!(wallet.total_withdrawals, 2_000);
    }
}

#[test]
fn retry_that_fails_can_be_attempted_again() {
    let (services, processor) = setup();
    let ada = caller("Ada");
    services.add_bank_account(&ada, bank_account("0123456789", true)).unwrap();
    services.deposit(&ada, 5_000).unwrap();

    processor.refuse_transfers(true);
    services.withdraw(&ada, 2_000).unwrap_err();
    let failed = services.transactions_for(&ada)[0].transaction_id.clone();

    let err = services.retry_transaction(&ada, &failed).unwrap_err();
    assert_eq!(err.kind(), "validation_error");

    processor.refuse_transfers(false);
    let retried = services.retry_transaction(&ada, &failed).unwrap();
    assert_eq!(retried.status, TransactionStatus::Completed);
    assert_eq!(retried.supersedes.as_deref(), Some(failed.as_str()));
    assert_eq!(services.wallet(&ada).unwrap().total_withdrawals, 2_000);
    assert_eq!(services.transactions_for(&ada).len(), 3);
}
