mod common;

use std::sync::Arc;
use std::thread;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};

use ajo_app::AppConfig;
use ajo_app::services::{ContributionRequest, CreateGroupRequest};
use ajo_groups::{GroupStatus, MemberStatus, Role};

use common::*;

#[test]
fn two_member_group_fills_and_turns_away_a_third() {
    let (services, _) = setup();
    let (a, b, c) = (caller("Ada"), caller("Bola"), caller("Chidi"));

    let created = services.create_group(&a, group_request(2, "Monthly", "firstCome")).unwrap();
    assert_eq!(created.members_list.len(), 1);
    assert_eq!(created.members_list[0].role, Role::Admin);
    assert_eq!(created.status, GroupStatus::Pending);
    assert_eq!(created.credibility_score, 100);
    assert_eq!(created.current_turn, 0);
    assert_eq!(created.total_pool, 0);
    assert_eq!(created.next_payout, created.next_contribution);

    let id = group_id(&created);
    let joined = services.join_group(&b, id).unwrap();
    assert_eq!(joined.members_list.len(), 2);

    let err = services.join_group(&c, id).unwrap_err();
    assert_eq!(err.kind(), "group_full");
    assert_eq!(services.group(&a, id).unwrap().members_list.len(), 2);
}

#[test]
fn invitation_codes_are_found_case_insensitively() {
    let (services, _) = setup();
    let admin = caller("Ada");
    let created = services.create_group(&admin, group_request(3, "Weekly", "firstCome")).unwrap();
    let code = created.invitation_code.clone().unwrap();

    assert_eq!(code.len(), 6);
    assert!(code.bytes().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit()));

    let found = services
        .find_group_by_code(&format!("  {}  ", code.to_ascii_lowercase()))
        .unwrap();
    assert_eq!(found.group_id, created.group_id);

    assert_eq!(services.find_group_by_code("AB12").unwrap_err().kind(), "validation_error");
    let unused = if code == "ZZZZZZ" { "YYYYYY" } else { "ZZZZZZ" };
    assert_eq!(services.find_group_by_code(unused).unwrap_err().kind(), "not_found");
}

#[test]
fn joining_by_code_and_rejoining() {
    let (services, _) = setup();
    let (admin, bola) = (caller("Ada"), caller("Bola"));
    let created = services.create_group(&admin, group_request(3, "Weekly", "firstCome")).unwrap();
    let code = created.invitation_code.unwrap();

    services.join_by_code(&bola, &code).unwrap();
    assert_eq!(services.join_by_code(&bola, &code).unwrap_err().kind(), "already_member");
    assert_eq!(services.join_by_code(&admin, &code).unwrap_err().kind(), "already_member");
}

#[test]
fn concurrent_joins_never_exceed_capacity() {
    let config = AppConfig {
        dispatch_retry_attempts: 64,
        ..AppConfig::default()
    };
    let (services, _) = setup_with(config);
    let admin = caller("Ada");
    let created = services.create_group(&admin, group_request(5, "Weekly", "firstCome")).unwrap();
    let code = created.invitation_code.clone().unwrap();

    let handles: Vec<_> = (0..12)
        .map(|i| {
            let services = Arc::clone(&services);
            let code = code.clone();
            thread::spawn(move || services.join_by_code(&caller(&format!("member-{i}")), &code))
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let admitted = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(admitted, 4);
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert_eq!(err.kind(), "group_full");
    }

    let group = services.group(&admin, group_id(&created)).unwrap();
    assert_eq!(group.members_list.len(), 5);
}

#[test]
fn activation_requires_a_full_group_and_the_admin() {
    let (services, _) = setup();
    let (admin, bola, chidi) = (caller("Ada"), caller("Bola"), caller("Chidi"));
    let id = group_id(&services.create_group(&admin, group_request(3, "Weekly", "firstCome")).unwrap());
    services.join_group(&bola, id).unwrap();

    assert_eq!(
        services.update_group_status(&admin, id, "active").unwrap_err().kind(),
        "invalid_transition"
    );
    services.join_group(&chidi, id).unwrap();
    assert_eq!(
        services.update_group_status(&bola, id, "active").unwrap_err().kind(),
        "unauthorized"
    );
    assert_eq!(
        services.update_group_status(&admin, id, "paused").unwrap_err().kind(),
        "invalid_status"
    );
    assert_eq!(
        services.update_group_status(&admin, id, "completed").unwrap_err().kind(),
        "invalid_transition"
    );

    let active = services.update_group_status(&admin, id, "active").unwrap();
    assert_eq!(active.status, GroupStatus::Active);
    let positions: Vec<_> = active.members_list.iter().map(|m| m.turn_position).collect();
    assert_eq!(positions, vec![Some(0), Some(1), Some(2)]);
    assert_eq!(active.members_list[0].status, MemberStatus::Current);

    assert_eq!(
        services.join_group(&caller("Dayo"), id).unwrap_err().kind(),
        "group_full"
    );
    services.update_group_status(&admin, id, "cancelled").unwrap();
    assert_eq!(
        services.update_group_status(&admin, id, "active").unwrap_err().kind(),
        "invalid_transition"
    );
}

#[test]
fn random_order_is_a_permutation_fixed_at_activation() {
    let (services, _) = setup();
    let admin = caller("Ada");
    let others: Vec<_> = (0..3).map(|i| caller(&format!("member-{i}"))).collect();
    let id = group_id(&services.create_group(&admin, group_request(4, "Monthly", "random")).unwrap());
    for member in &others {
        services.join_group(member, id).unwrap();
    }

    let active = services.update_group_status(&admin, id, "active").unwrap();
    let mut positions: Vec<_> = active.members_list.iter().filter_map(|m| m.turn_position).collect();
    positions.sort();
    assert_eq!(positions, vec![0, 1, 2, 3]);

    let current: Vec<_> = active
        .members_list
        .iter()
        .filter(|m| m.status == MemberStatus::Current)
        .collect();
    assert_eq!(current.len(), 1);
    assert_eq!(current[0].turn_position, Some(0));

    services.rebuild_read_models().unwrap();
    assert_eq!(services.group(&admin, id).unwrap().members_list, active.members_list);
}

#[test]
fn bidding_puts_the_highest_bidder_first() {
    let (services, _) = setup();
    let (admin, bola, chidi) = (caller("Ada"), caller("Bola"), caller("Chidi"));
    let id = group_id(&services.create_group(&admin, group_request(3, "Weekly", "bidding")).unwrap());
    services.join_group(&bola, id).unwrap();
    services.join_group(&chidi, id).unwrap();

    services.place_bid(&bola, id, 500).unwrap();
    services.place_bid(&chidi, id, 900).unwrap();
    assert_eq!(services.place_bid(&caller("Dayo"), id, 100).unwrap_err().kind(), "not_member");
    assert_eq!(services.place_bid(&bola, id, 0).unwrap_err().kind(), "invalid_amount");

    let active = services.update_group_status(&admin, id, "active").unwrap();
    let position_of = |name: &str| {
        active
            .members_list
            .iter()
            .find(|m| m.name == name)
            .and_then(|m| m.turn_position)
    };
    assert_eq!(position_of("Chidi"), Some(0));
    assert_eq!(position_of("Bola"), Some(1));
    assert_eq!(position_of("Ada"), Some(2));

    assert_eq!(services.place_bid(&bola, id, 800).unwrap_err().kind(), "invalid_transition");
}

#[test]
fn bids_are_rejected_for_other_payout_orders() {
    let (services, _) = setup();
    let (admin, bola) = (caller("Ada"), caller("Bola"));
    let id = group_id(&services.create_group(&admin, group_request(3, "Weekly", "firstCome")).unwrap());
    services.join_group(&bola, id).unwrap();
    assert_eq!(services.place_bid(&bola, id, 500).unwrap_err().kind(), "validation_error");
}

#[test]
fn create_group_validates_settings() {
    let (services, _) = setup();
    let admin = caller("Ada");

    let cases = [
        group_request(1, "Weekly", "firstCome"),
        group_request(51, "Weekly", "firstCome"),
        group_request(3, "Daily", "firstCome"),
        group_request(3, "Weekly", "lottery"),
        CreateGroupRequest {
            name: "A".to_string(),
            ..group_request(3, "Weekly", "firstCome")
        },
        CreateGroupRequest {
            duration_months: 25,
            ..group_request(3, "Weekly", "firstCome")
        },
    ];
    for request in cases {
        assert_eq!(
            services.create_group(&admin, request).unwrap_err().kind(),
            "validation_error"
        );
    }
    assert!(services.groups_for(&admin).is_empty());
}

#[test]
fn groups_for_lists_memberships_newest_first() {
    let (services, _) = setup();
    let (admin, bola) = (caller("Ada"), caller("Bola"));

    let older = services.create_group(&admin, group_request(3, "Weekly", "firstCome")).unwrap();
    thread::sleep(StdDuration::from_millis(2));
    let newer = services.create_group(&admin, group_request(3, "Monthly", "firstCome")).unwrap();
    services.join_group(&bola, group_id(&older)).unwrap();

    let ids: Vec<_> = services.groups_for(&admin).into_iter().map(|g| g.group_id).collect();
    assert_eq!(ids, vec![newer.group_id.clone(), older.group_id.clone()]);

    let ids: Vec<_> = services.groups_for(&bola).into_iter().map(|g| g.group_id).collect();
    assert_eq!(ids, vec![older.group_id]);

    services.rebuild_read_models().unwrap();
    assert_eq!(services.groups_for(&admin).len(), 2);
}

#[test]
fn group_details_are_for_members_only() {
    let (services, _) = setup();
    let admin = caller("Ada");
    let id = group_id(&services.create_group(&admin, group_request(3, "Weekly", "firstCome")).unwrap());

    assert_eq!(services.group(&caller("Stranger"), id).unwrap_err().kind(), "not_member");
    assert_eq!(services.group_stats(&caller("Stranger"), id).unwrap_err().kind(), "not_member");
    assert_eq!(
        services.group(&admin, ajo_core::AggregateId::new()).unwrap_err().kind(),
        "not_found"
    );

    let stats = services.group_stats(&admin, id).unwrap();
    assert_eq!(stats.total_members, 1);
    assert_eq!(stats.max_members, 3);
    assert_eq!(stats.status, GroupStatus::Pending);
}

#[test]
fn sweep_marks_missed_contributions() {
    let (services, _) = setup();
    let (admin, bola) = (caller("Ada"), caller("Bola"));
    let id = active_group(&services, &admin, &[&bola], "Weekly");

    services.deposit(&admin, 1_000).unwrap();
    services.contribute(&admin, id, ContributionRequest::new(1_000)).unwrap();

    let nothing_due = services.run_sweep(Utc::now()).unwrap();
    assert_eq!(nothing_due.closed, 0);

    let report = services.run_sweep(Utc::now() + Duration::days(8)).unwrap();
    assert_eq!(report.closed, 1);
    assert_eq!(report.failed, 0);

    let stats = services.group_stats(&admin, id).unwrap();
    assert_eq!(stats.total_contributions, 1);
    assert_eq!(stats.total_missed, 1);
    assert_eq!(stats.credibility_score, 50);

    let group = services.group(&admin, id).unwrap();
    let bola_row = group.members_list.iter().find(|m| m.name == "Bola").unwrap();
    assert_eq!(bola_row.status, MemberStatus::Missed);
    assert_eq!(bola_row.missed_contributions, 1);
    let ada_row = group.members_list.iter().find(|m| m.name == "Ada").unwrap();
    assert_eq!(ada_row.status, MemberStatus::Current);
    assert_eq!(ada_row.missed_contributions, 0);
}

#[test]
fn sweep_catches_up_on_several_missed_cycles() {
    let (services, _) = setup();
    let (admin, bola) = (caller("Ada"), caller("Bola"));
    let id = active_group(&services, &admin, &[&bola], "Weekly");

    let report = services.run_sweep(Utc::now() + Duration::days(22)).unwrap();
    assert_eq!(report.closed, 3);

    let stats = services.group_stats(&admin, id).unwrap();
    assert_eq!(stats.total_missed, 6);
    assert_eq!(stats.credibility_score, 0);

    let again = services.run_sweep(Utc::now() + Duration::days(22)).unwrap();
    assert_eq!(again.closed, 0);
}

#[test]
fn sweeper_thread_stops_on_shutdown() {
    let config = AppConfig {
        sweep_interval_secs: 1,
        ..AppConfig::default()
    };
    let (services, _) = setup_with(config);
    let handle = services.spawn_sweeper().unwrap();
    handle.shutdown();
}
