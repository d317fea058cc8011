//! Store lifecycle, transaction, and crash-safety behavior against a real
//! (temporary) state directory.

use std::fs;
use std::path::Path;

use chrono::{Duration, Utc};
use council_store::{
    ConclusionReason, MemberAddress, MemberInfo, MessageId, Poll, PollId, PollResult, PollState,
    PollStore, StoreError, StoreEvent, VoteValue,
};

const NICKS: [&str; 5] = ["dave", "emus", "flow", "ge0rg", "jonas"];

fn roster() -> Vec<MemberInfo> {
    NICKS
        .into_iter()
        .map(|nick| MemberInfo {
            address: MemberAddress(format!("{nick}@example.test")),
            nick: nick.to_owned(),
            display_name: None,
        })
        .collect()
}

fn member(i: usize) -> MemberAddress {
    MemberAddress(format!("{}@example.test", NICKS[i]))
}

fn msg(id: &str) -> MessageId {
    MessageId::from(id)
}

fn active_dir(state: &Path) -> std::path::PathBuf {
    state.join("polls").join("active")
}

fn trash_dir(state: &Path) -> std::path::PathBuf {
    state.join("polls").join("trash")
}

fn archive_dir(state: &Path) -> std::path::PathBuf {
    state.join("polls").join("archive")
}

/// Write a hand-built poll record straight into the active area, as a
/// pre-existing state directory would contain.
fn seed_poll(state: &Path, poll: &Poll) {
    let path = active_dir(state).join(format!("{}.json", poll.id()));
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut buf = Vec::new();
    poll.dump(&mut buf).unwrap();
    fs::write(path, buf).unwrap();
}

#[test]
fn created_poll_is_active_and_durable() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = PollStore::open(dir.path(), roster()).unwrap();

    let (tid, id) = store
        .create_poll(
            &member(0),
            &msg("m1"),
            "Adopt XEP-9999",
            Duration::days(14),
            Some("xep9999".into()),
            vec!["https://example.test/xep-9999.html".into()],
            None,
        )
        .unwrap();
    assert!(tid.0.starts_with('t'));

    assert_eq!(store.active_polls().unwrap(), vec![id.clone()]);
    let poll = store.get_poll(&id).unwrap();
    assert_eq!(poll.subject(), "Adopt XEP-9999");
    assert_eq!(poll.roster_size(), 5);
    assert_eq!(poll.tag(), Some("xep9999"));

    // The record survives a fresh store over the same directory.
    let mut reopened = PollStore::open(dir.path(), roster()).unwrap();
    assert_eq!(reopened.active_polls().unwrap(), vec![id]);
}

#[test]
fn cast_vote_then_matching_revert_restores_history_exactly() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = PollStore::open(dir.path(), roster()).unwrap();
    let alice = member(0);

    let (_, id) = store
        .create_poll(
            &alice,
            &msg("m1"),
            "Message styling",
            Duration::days(14),
            None,
            Vec::new(),
            None,
        )
        .unwrap();
    let before = store.get_poll(&id).unwrap().clone();

    store
        .cast_vote(&alice, &msg("m2"), &id, VoteValue::Ack, Some("fine".into()))
        .unwrap();
    assert_eq!(store.get_poll(&id).unwrap().votes_of(&alice).unwrap().len(), 1);

    let reverted = store.revert_last_transaction(&alice, &msg("m2")).unwrap();
    assert!(reverted.is_some());
    assert_eq!(store.get_poll(&id).unwrap(), &before);
}

#[test]
fn revert_with_stale_message_id_is_a_silent_noop() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = PollStore::open(dir.path(), roster()).unwrap();
    let alice = member(0);

    let (_, id) = store
        .create_poll(
            &alice,
            &msg("m1"),
            "Stale correction",
            Duration::days(14),
            None,
            Vec::new(),
            None,
        )
        .unwrap();
    store
        .cast_vote(&alice, &msg("m2"), &id, VoteValue::Ack, None)
        .unwrap();

    // Correcting anything but the immediately preceding message is ignored.
    let reverted = store.revert_last_transaction(&alice, &msg("m1")).unwrap();
    assert_eq!(reverted, None);
    assert_eq!(store.get_poll(&id).unwrap().votes_of(&alice).unwrap().len(), 1);

    // A later plain message confirms the pending transaction; after that
    // even the right id reverts nothing.
    store.write_last_message_id(&alice, &msg("m3")).unwrap();
    let reverted = store.revert_last_transaction(&alice, &msg("m3")).unwrap();
    assert_eq!(reverted, None);
    assert_eq!(store.get_poll(&id).unwrap().votes_of(&alice).unwrap().len(), 1);
}

#[test]
fn revert_survives_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let alice = member(0);
    let id;
    {
        let mut store = PollStore::open(dir.path(), roster()).unwrap();
        let (_, created) = store
            .create_poll(
                &alice,
                &msg("m1"),
                "Durable control state",
                Duration::days(14),
                None,
                Vec::new(),
                None,
            )
            .unwrap();
        store
            .cast_vote(&alice, &msg("m2"), &created, VoteValue::Veto, Some("no".into()))
            .unwrap();
        id = created;
    }

    // The pending transaction was recorded durably, so a fresh process can
    // still honor the correction.
    let mut store = PollStore::open(dir.path(), roster()).unwrap();
    let reverted = store.revert_last_transaction(&alice, &msg("m2")).unwrap();
    assert!(reverted.is_some());
    assert!(store.get_poll(&id).unwrap().votes_of(&alice).unwrap().is_empty());
}

#[test]
fn reverted_create_moves_poll_to_trash_without_a_further_window() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = PollStore::open(dir.path(), roster()).unwrap();
    let alice = member(0);

    let (_, id) = store
        .create_poll(
            &alice,
            &msg("m1"),
            "Mistyped topic",
            Duration::days(14),
            None,
            Vec::new(),
            None,
        )
        .unwrap();

    let reverted = store.revert_last_transaction(&alice, &msg("m1")).unwrap();
    assert!(reverted.is_some());
    assert!(store.active_polls().unwrap().is_empty());
    assert!(trash_dir(dir.path()).join(format!("{id}.json")).exists());

    // The revert consumed the window.
    let again = store.revert_last_transaction(&alice, &msg("m1")).unwrap();
    assert_eq!(again, None);
}

#[test]
fn reverted_delete_restores_the_poll() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = PollStore::open(dir.path(), roster()).unwrap();
    let alice = member(0);

    let (_, id) = store
        .create_poll(
            &alice,
            &msg("m1"),
            "Nearly lost",
            Duration::days(14),
            None,
            Vec::new(),
            None,
        )
        .unwrap();
    store.delete_poll(&alice, &msg("m2"), &id).unwrap();
    assert!(store.active_polls().unwrap().is_empty());
    assert!(trash_dir(dir.path()).join(format!("{id}.json")).exists());

    let reverted = store.revert_last_transaction(&alice, &msg("m2")).unwrap();
    assert!(reverted.is_some());
    assert_eq!(store.active_polls().unwrap(), vec![id.clone()]);
    assert!(active_dir(dir.path()).join(format!("{id}.json")).exists());
}

#[test]
fn confirmed_delete_erases_the_record_permanently() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = PollStore::open(dir.path(), roster()).unwrap();
    let alice = member(0);

    let (_, id) = store
        .create_poll(
            &alice,
            &msg("m1"),
            "Doomed poll",
            Duration::days(14),
            None,
            Vec::new(),
            None,
        )
        .unwrap();
    store.delete_poll(&alice, &msg("m2"), &id).unwrap();

    // The next message from the actor makes the delete irreversible.
    store.write_last_message_id(&alice, &msg("m3")).unwrap();
    assert!(!trash_dir(dir.path()).join(format!("{id}.json")).exists());
}

#[test]
fn attached_url_is_removed_on_revert() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = PollStore::open(dir.path(), roster()).unwrap();
    let alice = member(0);

    let (_, id) = store
        .create_poll(
            &alice,
            &msg("m1"),
            "Reference material",
            Duration::days(14),
            None,
            Vec::new(),
            None,
        )
        .unwrap();
    store
        .attach_url(&alice, &msg("m2"), &id, "https://example.test/minutes")
        .unwrap();
    assert_eq!(
        store.get_poll(&id).unwrap().urls(),
        ["https://example.test/minutes".to_owned()]
    );

    store.revert_last_transaction(&alice, &msg("m2")).unwrap();
    assert!(store.get_poll(&id).unwrap().urls().is_empty());
}

#[test]
fn expired_poll_is_concluded_and_announced() {
    let dir = tempfile::tempdir().unwrap();
    let start = Utc::now() - Duration::days(15);
    let poll = Poll::new(
        PollId::from("2024-01-01-tseed-forgotten"),
        start,
        Duration::days(14),
        "Forgotten",
        roster().into_iter().map(|m| m.address),
    );
    seed_poll(dir.path(), &poll);

    let mut store = PollStore::open(dir.path(), roster()).unwrap();
    let mut events = store.subscribe();
    store.expire_polls().unwrap();

    assert_eq!(
        events.try_recv().unwrap(),
        StoreEvent::PollConcluded {
            poll_id: poll.id().clone(),
            reason: ConclusionReason::Expiration,
        }
    );
    assert!(store.active_polls().unwrap().is_empty());
    assert!(archive_dir(dir.path())
        .join(format!("{}.json", poll.id()))
        .exists());

    // The archived record is still summarizable for the announcement.
    let summary = store.get_vote_summary(poll.id()).unwrap();
    assert_eq!(summary.state, PollState::Expired);
    assert_eq!(summary.result, PollResult::Fail);
}

#[test]
fn vote_complete_expired_poll_concludes_with_votes_cast() {
    let dir = tempfile::tempdir().unwrap();
    let start = Utc::now() - Duration::days(15);
    let mut poll = Poll::new(
        PollId::from("2024-01-01-tseed-decided"),
        start,
        Duration::days(14),
        "Decided",
        roster().into_iter().map(|m| m.address),
    );
    for i in 0..5 {
        poll.push_vote_at(&member(i), VoteValue::Ack, None, start + Duration::hours(1))
            .unwrap();
    }
    seed_poll(dir.path(), &poll);

    let mut store = PollStore::open(dir.path(), roster()).unwrap();
    let mut events = store.subscribe();
    store.expire_polls().unwrap();

    assert_eq!(
        events.try_recv().unwrap(),
        StoreEvent::PollConcluded {
            poll_id: poll.id().clone(),
            reason: ConclusionReason::VotesCast,
        }
    );
    let summary = store.get_vote_summary(poll.id()).unwrap();
    assert_eq!(summary.result, PollResult::Pass);
}

#[test]
fn expiration_never_touches_open_unexpired_polls() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = PollStore::open(dir.path(), roster()).unwrap();
    let mut events = store.subscribe();

    let (_, id) = store
        .create_poll(
            &member(0),
            &msg("m1"),
            "Plenty of time",
            Duration::days(14),
            None,
            Vec::new(),
            None,
        )
        .unwrap();

    store.expire_polls().unwrap();
    assert_eq!(store.active_polls().unwrap(), vec![id]);
    assert!(events.try_recv().is_err());
}

#[test]
fn autoconclusion_waits_for_the_quiet_period() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = PollStore::open(dir.path(), roster()).unwrap();
    let mut events = store.subscribe();

    let (_, id) = store
        .create_poll(
            &member(0),
            &msg("m1"),
            "Quick consensus",
            Duration::days(14),
            None,
            Vec::new(),
            None,
        )
        .unwrap();
    for i in 0..5 {
        let mid = MessageId(format!("vote-{i}"));
        store
            .cast_vote(&member(i), &mid, &id, VoteValue::Ack, None)
            .unwrap();
    }

    // All votes are seconds old: nothing qualifies yet.
    assert!(!store.autoconclude_polls(Duration::hours(1)).unwrap());
    assert_eq!(store.active_polls().unwrap(), vec![id.clone()]);

    // With the quiet period already behind every vote, it concludes.
    assert!(store.autoconclude_polls(Duration::seconds(-60)).unwrap());
    assert_eq!(
        events.try_recv().unwrap(),
        StoreEvent::PollConcluded {
            poll_id: id,
            reason: ConclusionReason::VotesCast,
        }
    );
}

#[test]
fn incomplete_polls_never_autoconclude() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = PollStore::open(dir.path(), roster()).unwrap();

    let (_, id) = store
        .create_poll(
            &member(0),
            &msg("m1"),
            "Waiting on votes",
            Duration::days(14),
            None,
            Vec::new(),
            None,
        )
        .unwrap();
    store
        .cast_vote(&member(0), &msg("m2"), &id, VoteValue::Ack, None)
        .unwrap();

    assert!(!store.autoconclude_polls(Duration::seconds(-60)).unwrap());
    assert_eq!(store.active_polls().unwrap(), vec![id]);
}

#[test]
fn find_poll_prefers_tags_and_falls_back_to_subjects() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = PollStore::open(dir.path(), roster()).unwrap();

    let (_, styling) = store
        .create_poll(
            &member(0),
            &msg("m1"),
            "Message Styling",
            Duration::days(14),
            Some("styling".into()),
            Vec::new(),
            None,
        )
        .unwrap();
    let (_, compliance) = store
        .create_poll(
            &member(0),
            &msg("m2"),
            "Compliance Suites 2025",
            Duration::days(14),
            None,
            Vec::new(),
            None,
        )
        .unwrap();

    assert_eq!(store.find_poll("styling").unwrap(), styling);
    assert_eq!(
        store.find_poll("compliance suites 2025").unwrap(),
        compliance
    );
    assert!(matches!(
        store.find_poll("qqqqxxxx").unwrap_err(),
        StoreError::NotFound(_)
    ));
}

#[test]
fn non_members_cannot_vote() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = PollStore::open(dir.path(), roster()).unwrap();

    let (_, id) = store
        .create_poll(
            &member(0),
            &msg("m1"),
            "Members only",
            Duration::days(14),
            None,
            Vec::new(),
            None,
        )
        .unwrap();

    let outsider = MemberAddress::from("mallory@example.test");
    assert!(!store.is_council_member(&outsider));
    let err = store
        .cast_vote(&outsider, &msg("m2"), &id, VoteValue::Ack, None)
        .unwrap_err();
    assert!(matches!(err, StoreError::NotAMember(_)));
    assert!(store.get_poll(&id).unwrap().current_votes().values().all(Option::is_none));
}

#[test]
fn rename_is_declared_but_unsupported() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = PollStore::open(dir.path(), roster()).unwrap();
    let err = store
        .rename_poll(&member(0), &msg("m1"), &PollId::from("whatever"), "new")
        .unwrap_err();
    assert!(matches!(err, StoreError::Unsupported("rename_poll")));
}

#[test]
fn corrupt_records_are_skipped_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    {
        let mut store = PollStore::open(dir.path(), roster()).unwrap();
        store
            .create_poll(
                &member(0),
                &msg("m1"),
                "The survivor",
                Duration::days(14),
                None,
                Vec::new(),
                None,
            )
            .unwrap();
    }
    fs::write(
        active_dir(dir.path()).join("2024-01-01-tbad-garbage.json"),
        b"{ not json",
    )
    .unwrap();

    let mut store = PollStore::open(dir.path(), roster()).unwrap();
    assert_eq!(store.active_polls().unwrap().len(), 1);
}

#[test]
fn vote_summary_reflects_current_votes() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = PollStore::open(dir.path(), roster()).unwrap();

    let (_, id) = store
        .create_poll(
            &member(0),
            &msg("m1"),
            "Summary check",
            Duration::days(14),
            None,
            Vec::new(),
            None,
        )
        .unwrap();
    for i in 0..3 {
        let mid = MessageId(format!("vote-{i}"));
        store
            .cast_vote(&member(i), &mid, &id, VoteValue::Ack, None)
            .unwrap();
    }

    let summary = store.get_vote_summary(&id).unwrap();
    assert_eq!(summary.subject, "Summary check");
    assert_eq!(summary.state, PollState::Open);
    assert_eq!(summary.result, PollResult::Pass);
    assert_eq!(summary.votes.len(), 5);
    assert_eq!(
        summary
            .votes
            .values()
            .filter(|record| record.is_some())
            .count(),
        3
    );
}
