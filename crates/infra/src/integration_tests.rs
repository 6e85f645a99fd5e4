//! Full pipeline: Command → EventStore → EventBus → Projection → ReadModel.
//!
//! Verifies:
//! - commands produce events that rehydrate to the same state
//! - racing writers cannot break capacity or balance invariants
//! - read models follow the bus and can be rebuilt from the store

use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::Value as JsonValue;

use ajo_core::{AggregateId, AggregateRoot, UserId};
use ajo_events::{EventBus, EventEnvelope, InMemoryEventBus};
use ajo_groups::{
    AddMember, CreateGroup, Frequency, Group, GroupCommand, GroupEvent, InvitationCode, NewGroup, PayoutOrder,
};
use ajo_transactions::{
    MarkCompleted, MarkFailed, PaymentDetails, PaymentMethod, RecordTransaction, Transaction, TransactionCommand,
    TransactionId, TransactionType,
};
use ajo_wallet::{MoveFunds, OpenWallet, Wallet, WalletCommand};

use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::event_store::{EventStore, InMemoryEventStore};
use crate::projections::{GroupDirectoryProjection, TransactionHistoryProjection};
use crate::read_model::InMemoryKeyedStore;
use crate::workers::ProjectionWorker;

type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;
type Dispatcher = CommandDispatcher<Arc<InMemoryEventStore>, Bus>;
type Directory = GroupDirectoryProjection<Arc<InMemoryKeyedStore<AggregateId, Group>>>;
type History = TransactionHistoryProjection<Arc<InMemoryKeyedStore<AggregateId, Transaction>>>;

fn setup() -> (Arc<Dispatcher>, Bus) {
    let store = Arc::new(InMemoryEventStore::new());
    let bus: Bus = Arc::new(InMemoryEventBus::new());
    let dispatcher = CommandDispatcher::new(store, bus.clone()).with_retry_attempts(64);
    (Arc::new(dispatcher), bus)
}

fn move_funds(user_id: UserId, amount: u64) -> MoveFunds {
    MoveFunds {
        user_id,
        amount,
        occurred_at: Utc::now(),
    }
}

fn create_group(dispatcher: &Dispatcher, admin: UserId, max_members: u32) -> AggregateId {
    let group_id = AggregateId::new();
    dispatcher
        .dispatch(
            group_id,
            ajo_groups::AGGREGATE_TYPE,
            &GroupCommand::Create(CreateGroup {
                admin_id: admin,
                admin_name: "Admin".to_string(),
                invitation_code: InvitationCode::parse("AJO123").unwrap(),
                group: NewGroup {
                    name: "Market women".to_string(),
                    description: None,
                    max_members,
                    contribution_amount: 10_000,
                    frequency: Frequency::Weekly,
                    payout_order: PayoutOrder::FirstCome,
                    duration_months: 3,
                },
                occurred_at: Utc::now(),
            }),
            Group::empty,
        )
        .unwrap();
    group_id
}

fn join(dispatcher: &Dispatcher, group_id: AggregateId, user_id: UserId) -> Result<Group, DispatchError> {
    dispatcher
        .dispatch_with_retry(
            group_id,
            ajo_groups::AGGREGATE_TYPE,
            &GroupCommand::AddMember(AddMember {
                user_id,
                name: "Member".to_string(),
                occurred_at: Utc::now(),
            }),
            Group::empty,
        )
        .map(|d| d.state)
}

fn domain_kind(err: &DispatchError) -> &'static str {
    err.as_domain().map(|e| e.kind()).unwrap_or("infrastructure")
}

fn wait_until(mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    done()
}

#[test]
fn wallet_commands_persist_and_rehydrate() {
    let (dispatcher, _bus) = setup();
    let user = UserId::new();
    let wallet_id = AggregateId::from(user);

    let opened = dispatcher
        .dispatch(
            wallet_id,
            ajo_wallet::AGGREGATE_TYPE,
            &WalletCommand::Open(OpenWallet {
                user_id: user,
                occurred_at: Utc::now(),
            }),
            Wallet::empty,
        )
        .unwrap();
    assert_eq!(opened.committed.len(), 1);

    dispatcher
        .dispatch(
            wallet_id,
            ajo_wallet::AGGREGATE_TYPE,
            &WalletCommand::AddFunds(move_funds(user, 50_000)),
            Wallet::empty,
        )
        .unwrap();
    let locked = dispatcher
        .dispatch(
            wallet_id,
            ajo_wallet::AGGREGATE_TYPE,
            &WalletCommand::LockFunds(move_funds(user, 20_000)),
            Wallet::empty,
        )
        .unwrap();
    assert_eq!(locked.committed[0].sequence_number, 3);

    let reloaded: Wallet = dispatcher.load(wallet_id, Wallet::empty).unwrap();
    assert_eq!(reloaded, locked.state);
    assert_eq!(reloaded.available_balance(), 30_000);
    assert_eq!(reloaded.locked_balance(), 20_000);
    assert_eq!(reloaded.total_balance(), 50_000);
    assert_eq!(reloaded.version(), 3);
}

#[test]
fn reopening_a_wallet_commits_nothing() {
    let (dispatcher, _bus) = setup();
    let user = UserId::new();
    let open = WalletCommand::Open(OpenWallet {
        user_id: user,
        occurred_at: Utc::now(),
    });

    dispatcher
        .dispatch(user.into(), ajo_wallet::AGGREGATE_TYPE, &open, Wallet::empty)
        .unwrap();
    let again = dispatcher
        .dispatch(user.into(), ajo_wallet::AGGREGATE_TYPE, &open, Wallet::empty)
        .unwrap();

    assert!(again.is_noop());
    assert_eq!(dispatcher.store().load_stream(user.into()).unwrap().len(), 1);
}

#[test]
fn rejected_commands_write_nothing() {
    let (dispatcher, _bus) = setup();
    let user = UserId::new();
    dispatcher
        .dispatch(
            user.into(),
            ajo_wallet::AGGREGATE_TYPE,
            &WalletCommand::AddFunds(move_funds(user, 100)),
            Wallet::empty,
        )
        .unwrap();

    let err = dispatcher
        .dispatch(
            user.into(),
            ajo_wallet::AGGREGATE_TYPE,
            &WalletCommand::DeductFunds(move_funds(user, 101)),
            Wallet::empty,
        )
        .unwrap_err();

    assert_eq!(domain_kind(&err), "insufficient_funds");
    let wallet = dispatcher.load(user.into(), Wallet::empty).unwrap();
    assert_eq!(wallet.available_balance(), 100);
}

#[test]
fn concurrent_joins_never_exceed_capacity() {
    let (dispatcher, _bus) = setup();
    let admin = UserId::new();
    let group_id = create_group(&dispatcher, admin, 5);

    let joiners: Vec<_> = (0..12).map(|_| UserId::new()).collect();
    let barrier = Arc::new(Barrier::new(joiners.len()));
    let handles: Vec<_> = joiners
        .iter()
        .map(|user| {
            let dispatcher = Arc::clone(&dispatcher);
            let barrier = Arc::clone(&barrier);
            let user = *user;
            thread::spawn(move || {
                barrier.wait();
                join(&dispatcher, group_id, user)
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let admitted = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(admitted, 4);
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert_eq!(domain_kind(err), "group_full");
    }

    let group = dispatcher.load(group_id, Group::empty).unwrap();
    assert_eq!(group.members().len(), 5);
    assert!(group.is_full());
}

#[test]
fn concurrent_duplicate_join_admits_once() {
    let (dispatcher, _bus) = setup();
    let group_id = create_group(&dispatcher, UserId::new(), 10);
    let user = UserId::new();

    let barrier = Arc::new(Barrier::new(4));
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let dispatcher = Arc::clone(&dispatcher);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                join(&dispatcher, group_id, user)
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert_eq!(domain_kind(err), "already_member");
    }
    assert_eq!(dispatcher.load(group_id, Group::empty).unwrap().members().len(), 2);
}

#[test]
fn concurrent_debits_cannot_overdraw() {
    let (dispatcher, _bus) = setup();
    let user = UserId::new();
    dispatcher
        .dispatch(
            user.into(),
            ajo_wallet::AGGREGATE_TYPE,
            &WalletCommand::AddFunds(move_funds(user, 100)),
            Wallet::empty,
        )
        .unwrap();

    let barrier = Arc::new(Barrier::new(10));
    let handles: Vec<_> = (0..10)
        .map(|_| {
            let dispatcher = Arc::clone(&dispatcher);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                dispatcher.dispatch_with_retry(
                    user.into(),
                    ajo_wallet::AGGREGATE_TYPE,
                    &WalletCommand::DeductFunds(move_funds(user, 30)),
                    Wallet::empty,
                )
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 3);
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert_eq!(domain_kind(err), "insufficient_funds");
    }
    let wallet = dispatcher.load(user.into(), Wallet::empty).unwrap();
    assert_eq!(wallet.available_balance(), 10);
}

#[test]
fn retry_exhaustion_reports_conflict() {
    let store = Arc::new(InMemoryEventStore::new());
    let bus: Bus = Arc::new(InMemoryEventBus::new());
    let dispatcher = CommandDispatcher::new(store.clone(), bus).with_retry_attempts(3);
    let user = UserId::new();

    // Every rehydration races a foreign write onto the stream before the append.
    let interfering = |id: AggregateId| {
        let mut other = Wallet::empty(id);
        let stream = store.load_stream(id).unwrap();
        for stored in &stream {
            let ev = serde_json::from_value(stored.payload.clone()).unwrap();
            ajo_core::Aggregate::apply(&mut other, &ev);
        }
        let ev = ajo_core::Aggregate::handle(&other, &WalletCommand::AddFunds(move_funds(user, 1))).unwrap();
        let uncommitted = ev
            .iter()
            .map(|e| crate::event_store::UncommittedEvent::from_typed(id, ajo_wallet::AGGREGATE_TYPE, uuid::Uuid::now_v7(), e))
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        store.append(uncommitted, ajo_core::ExpectedVersion::Any).unwrap();
        Wallet::empty(id)
    };

    let err = dispatcher
        .dispatch_with_retry(
            user.into(),
            ajo_wallet::AGGREGATE_TYPE,
            &WalletCommand::AddFunds(move_funds(user, 5)),
            interfering,
        )
        .unwrap_err();
    assert_eq!(domain_kind(&err), "conflict");

    // The first foreign write also opened the wallet; our own deposit never landed.
    assert_eq!(store.load_stream(user.into()).unwrap().len(), 4);
    let wallet = dispatcher.load(user.into(), Wallet::empty).unwrap();
    assert_eq!(wallet.available_balance(), 3);
}

#[test]
fn directory_follows_the_bus() {
    let (dispatcher, bus) = setup();
    let directory: Arc<Directory> = Arc::new(GroupDirectoryProjection::new(Arc::new(InMemoryKeyedStore::new())));

    let worker_directory = Arc::clone(&directory);
    let worker = ProjectionWorker::spawn("group-directory", &bus, move |env: EventEnvelope<JsonValue>| {
        worker_directory.apply_envelope(&env).map(|_| ())
    })
    .unwrap();

    let admin = UserId::new();
    let member = UserId::new();
    let group_id = create_group(&dispatcher, admin, 3);
    join(&dispatcher, group_id, member).unwrap();

    assert!(wait_until(|| directory.cursor(group_id) == 2));
    let listed = directory.groups_for(member);
    assert_eq!(listed.len(), 1);
    assert_eq!(*listed[0].id(), group_id);
    assert_eq!(listed[0].members().len(), 2);
    assert!(directory.groups_for(UserId::new()).is_empty());

    worker.shutdown();
}

#[test]
fn directory_rebuild_matches_incremental_state() {
    let (dispatcher, _bus) = setup();
    let directory: Directory = GroupDirectoryProjection::new(Arc::new(InMemoryKeyedStore::new()));
    let admin = UserId::new();

    let older = create_group(&dispatcher, admin, 4);
    thread::sleep(Duration::from_millis(2));
    let newer = create_group(&dispatcher, admin, 4);
    join(&dispatcher, older, UserId::new()).unwrap();

    let history = dispatcher.store().load_all().unwrap();
    directory.apply_committed(&history).unwrap();
    let incremental = directory.groups_for(admin);

    // Redelivery is a no-op.
    directory.apply_committed(&history).unwrap();
    assert_eq!(directory.groups_for(admin), incremental);

    directory.rebuild_from_scratch(&history).unwrap();
    let rebuilt = directory.groups_for(admin);
    assert_eq!(rebuilt, incremental);
    assert_eq!(rebuilt.iter().map(|g| *g.id()).collect::<Vec<_>>(), vec![newer, older]);
}

#[test]
fn directory_reports_gaps() {
    let (dispatcher, _bus) = setup();
    let directory: Directory = GroupDirectoryProjection::new(Arc::new(InMemoryKeyedStore::new()));
    let group_id = create_group(&dispatcher, UserId::new(), 4);
    join(&dispatcher, group_id, UserId::new()).unwrap();

    let history = dispatcher.store().load_stream(group_id).unwrap();
    let err = directory.apply_envelope(&history[1].to_envelope()).unwrap_err();
    assert!(matches!(err, crate::projections::ReadModelError::Sequence(_)));
}

#[test]
fn history_lists_newest_first_and_counts_completed() {
    let (dispatcher, _bus) = setup();
    let history: History = TransactionHistoryProjection::new(Arc::new(InMemoryKeyedStore::new()));
    let user = UserId::new();
    let group_id = AggregateId::new();

    let mut ids = Vec::new();
    for (kind, amount) in [(TransactionType::Contribution, 10_000), (TransactionType::Payout, 40_000)] {
        let id = TransactionId::generate();
        let recorded = dispatcher
            .dispatch(
                id.aggregate_id(),
                ajo_transactions::AGGREGATE_TYPE,
                &TransactionCommand::Record(RecordTransaction {
                    transaction_id: id,
                    user_id: user,
                    group_id: Some(group_id),
                    kind,
                    amount,
                    payment_method: PaymentMethod::Wallet,
                    payment_details: PaymentDetails::default(),
                    metadata: serde_json::json!({}),
                    description: None,
                    reference: None,
                    supersedes: None,
                    occurred_at: Utc::now(),
                }),
                Transaction::empty,
            )
            .unwrap();
        history.apply_committed(&recorded.committed).unwrap();
        ids.push(id);
        thread::sleep(Duration::from_millis(2));
    }

    let completed = dispatcher
        .dispatch(
            ids[0].aggregate_id(),
            ajo_transactions::AGGREGATE_TYPE,
            &TransactionCommand::MarkCompleted(MarkCompleted {
                processor_reference: None,
                occurred_at: Utc::now(),
            }),
            Transaction::empty,
        )
        .unwrap();
    history.apply_committed(&completed.committed).unwrap();
    let failed = dispatcher
        .dispatch(
            ids[1].aggregate_id(),
            ajo_transactions::AGGREGATE_TYPE,
            &TransactionCommand::MarkFailed(MarkFailed {
                reason: "processor declined".to_string(),
                occurred_at: Utc::now(),
            }),
            Transaction::empty,
        )
        .unwrap();
    history.apply_committed(&failed.committed).unwrap();

    let listed: Vec<_> = history
        .for_user(user)
        .iter()
        .filter_map(|tx| tx.transaction_id())
        .collect();
    assert_eq!(listed, vec![ids[1], ids[0]]);

    let stats = history.stats_for(user);
    assert_eq!(stats.contributions.count, 1);
    assert_eq!(stats.contributions.total, 10_000);
    assert_eq!(stats.payouts.count, 0);
    assert!(history.for_user(UserId::new()).is_empty());
}

#[test]
fn published_envelopes_match_committed_events() {
    let (dispatcher, bus) = setup();
    let sub = bus.subscribe();
    let admin = UserId::new();
    let group_id = create_group(&dispatcher, admin, 2);

    let env = sub.recv_timeout(Duration::from_secs(1)).unwrap();
    assert_eq!(env.aggregate_id(), group_id);
    assert_eq!(env.aggregate_type(), ajo_groups::AGGREGATE_TYPE);
    assert_eq!(env.sequence_number(), 1);
    let ev: GroupEvent = serde_json::from_value(env.into_payload()).unwrap();
    assert!(matches!(ev, GroupEvent::GroupCreated(_)));
}
