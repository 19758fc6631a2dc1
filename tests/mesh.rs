//! End-to-end exercise of a two-storage mesh: join, connect participants,
//! submit a transaction, drive a gossip/commit round, and verify both
//! participants' chains and both storages' mesh tables converge.

use std::rc::Rc;

use blockmesh::{LogicalClock, ModeName, Participant, Storage};

fn storage(mode: ModeName, clock: &Rc<LogicalClock>) -> (tempfile::TempDir, Rc<std::cell::RefCell<Storage>>) {
    let tmp = tempfile::tempdir().unwrap();
    let stg = Storage::new(mode, tmp.path(), clock.clone() as Rc<dyn blockmesh::TimeSource>).unwrap();
    (tmp, stg)
}

#[test]
fn classic_two_party_transaction_commits_and_propagates() {
    let clock = Rc::new(LogicalClock::new());
    let (_t1, stg_a) = storage(ModeName::Classic, &clock);
    let (_t2, stg_b) = storage(ModeName::Classic, &clock);
    Storage::join(&stg_a, &stg_b).unwrap();

    let dir_alice = tempfile::tempdir().unwrap();
    let dir_bob = tempfile::tempdir().unwrap();
    let alice = Participant::new(ModeName::Classic, dir_alice.path(), "alice".into(), vec![1], &stg_a).unwrap();
    let bob = Participant::new(ModeName::Classic, dir_bob.path(), "bob".into(), vec![2], &stg_b).unwrap();

    clock.advance_to(1);
    let hash = Participant::perform(&alice, vec!["bob".into()], b"hello".to_vec()).unwrap();
    assert!(hash.is_some());

    // Gossiping from stg_a also seeds stg_b's shared buffer; each storage
    // still has to run its own step 2 to notify its own homed participants.
    Storage::gossip_round(&stg_a).unwrap();
    Storage::commit_round(&stg_a, 1).unwrap();
    Storage::commit_round(&stg_b, 1).unwrap();

    assert_eq!(alice.borrow().head(), hash.unwrap());
    assert_eq!(bob.borrow().head(), hash.unwrap());
    assert_eq!(stg_a.borrow().head_of("alice"), Some(hash.unwrap()));
    assert_eq!(stg_a.borrow().head_of("bob"), Some(hash.unwrap()));
    assert_eq!(stg_a.borrow().block_count(), 2);
}

#[test]
fn rejected_block_never_advances_sender_head() {
    let clock = Rc::new(LogicalClock::new());
    let tmp = tempfile::tempdir().unwrap();
    let stg = Storage::new_with(
        ModeName::Classic,
        tmp.path(),
        clock.clone() as Rc<dyn blockmesh::TimeSource>,
        blockmesh::validation::reject_all(),
        Box::new(blockmesh::NoOpSink),
    )
    .unwrap();

    let dir_alice = tempfile::tempdir().unwrap();
    let dir_bob = tempfile::tempdir().unwrap();
    let alice = Participant::new(ModeName::Classic, dir_alice.path(), "alice".into(), vec![1], &stg).unwrap();
    let _bob = Participant::new(ModeName::Classic, dir_bob.path(), "bob".into(), vec![2], &stg).unwrap();

    clock.advance_to(1);
    Participant::perform(&alice, vec!["bob".into()], b"hi".to_vec()).unwrap();
    Storage::gossip_round(&stg).unwrap();
    Storage::commit_round(&stg, 1).unwrap();

    assert_eq!(alice.borrow().head(), blockmesh::GENESIS_BLOCK);
    assert_eq!(stg.borrow().block_count(), 1);
}

#[test]
fn modified_mode_withholds_commit_until_quorum() {
    let clock = Rc::new(LogicalClock::new());
    let (_t1, stg_a) = storage(ModeName::Modified, &clock);
    let (_t2, stg_b) = storage(ModeName::Modified, &clock);
    Storage::join(&stg_a, &stg_b).unwrap();

    let dir_alice = tempfile::tempdir().unwrap();
    let dir_bob = tempfile::tempdir().unwrap();
    let alice = Participant::new(ModeName::Modified, dir_alice.path(), "alice".into(), vec![1], &stg_a).unwrap();
    let _bob = Participant::new(ModeName::Modified, dir_bob.path(), "bob".into(), vec![2], &stg_b).unwrap();

    clock.advance_to(1);
    // Modified mode submits the block to every participant's home, so both
    // stg_a and stg_b already queue it before any gossip happens.
    Participant::perform(&alice, vec!["bob".into()], b"hi".to_vec()).unwrap();
    assert_eq!(stg_a.borrow().queue_len(), 1);
    assert_eq!(stg_b.borrow().queue_len(), 1);

    // stg_a gossips its half (count 1 of 2 participants): quorum not met yet.
    Storage::gossip_round(&stg_a).unwrap();
    Storage::commit_round(&stg_a, 1).unwrap();
    assert_eq!(stg_a.borrow().block_count(), 1);
    assert_eq!(stg_b.borrow().block_count(), 1);

    // stg_b gossips its own half too, bringing its shared count to 2/2.
    Storage::gossip_round(&stg_b).unwrap();
    Storage::commit_round(&stg_b, 1).unwrap();
    assert_eq!(stg_b.borrow().block_count(), 2);
}

#[test]
fn same_round_conflicting_senders_resolve_by_tie_break() {
    let clock = Rc::new(LogicalClock::new());
    let (_t, stg) = storage(ModeName::Classic, &clock);

    let dir_alice = tempfile::tempdir().unwrap();
    let dir_bob = tempfile::tempdir().unwrap();
    let dir_carol = tempfile::tempdir().unwrap();
    let alice = Participant::new(ModeName::Classic, dir_alice.path(), "alice".into(), vec![1], &stg).unwrap();
    let bob = Participant::new(ModeName::Classic, dir_bob.path(), "bob".into(), vec![2], &stg).unwrap();
    let _carol = Participant::new(ModeName::Classic, dir_carol.path(), "carol".into(), vec![3], &stg).unwrap();

    clock.advance_to(1);
    let hash_a = Participant::perform(&alice, vec!["carol".into()], b"from alice".to_vec()).unwrap().unwrap();
    let hash_b = Participant::perform(&bob, vec!["carol".into()], b"from bob".to_vec()).unwrap().unwrap();
    assert_eq!(stg.borrow().queue_len(), 2);

    Storage::gossip_round(&stg).unwrap();
    Storage::commit_round(&stg, 1).unwrap();

    // Both blocks touch carol in the same round; only the lower content
    // hash commits, the other stays queued for the next round (I3).
    let (winner, winner_participant, loser_participant) =
        if hash_a < hash_b { (hash_a, &alice, &bob) } else { (hash_b, &bob, &alice) };

    assert_eq!(stg.borrow().block_count(), 2);
    assert_eq!(stg.borrow().queue_len(), 1);
    assert_eq!(stg.borrow().head_of("carol"), Some(winner));
    assert_eq!(winner_participant.borrow().head(), winner);
    assert_eq!(loser_participant.borrow().head(), blockmesh::GENESIS_BLOCK);
}

#[test]
fn disabled_peer_catches_up_via_refresh_on_enable() {
    let clock = Rc::new(LogicalClock::new());
    let (_t1, stg_a) = storage(ModeName::Classic, &clock);
    let (_t2, stg_b) = storage(ModeName::Classic, &clock);
    Storage::join(&stg_a, &stg_b).unwrap();

    let dir_alice = tempfile::tempdir().unwrap();
    let dir_bob = tempfile::tempdir().unwrap();
    let alice = Participant::new(ModeName::Classic, dir_alice.path(), "alice".into(), vec![1], &stg_a).unwrap();
    let _bob = Participant::new(ModeName::Classic, dir_bob.path(), "bob".into(), vec![2], &stg_b).unwrap();

    clock.advance_to(1);
    let hash = Participant::perform(&alice, vec!["bob".into()], b"hi".to_vec()).unwrap().unwrap();

    // stg_b drops offline before the round runs, so it neither receives the
    // gossip nor commits it; stg_a commits alone.
    stg_b.borrow_mut().disable();
    Storage::gossip_round(&stg_a).unwrap();
    Storage::commit_round(&stg_a, 1).unwrap();

    assert_eq!(stg_a.borrow().block_count(), 2);
    assert_eq!(stg_b.borrow().block_count(), 1);
    assert_eq!(stg_b.borrow().head_of("alice"), Some(blockmesh::GENESIS_BLOCK));

    // Re-enabling pulls the missing block and mesh state from stg_a.
    Storage::enable(&stg_b).unwrap();

    assert!(stg_b.borrow().available());
    assert_eq!(stg_b.borrow().block_count(), 2);
    assert_eq!(stg_b.borrow().head_of("alice"), Some(hash));
    assert_eq!(stg_b.borrow().head_of("bob"), Some(hash));
}
