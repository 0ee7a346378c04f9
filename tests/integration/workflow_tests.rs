use std::collections::{BTreeMap, HashSet};

use sieve::SieveError;
use sieve::cli::commands::simulate::simulate;
use sieve::engine::{Channel, ItemId, RequestTarget, SortOrder, Target, TransferMode};
use sieve::test_utils::fixtures::CorpusFixture;

fn assign(items: &[ItemId], target: Target) -> BTreeMap<ItemId, Option<Target>> {
    items.iter().map(|&item| (item, Some(target))).collect()
}

#[test]
fn test_bucket_learns_its_cluster() {
    let fixture = CorpusFixture::clustered(500).unwrap();
    let mut orch = fixture.orchestrator(&CorpusFixture::config(1)).unwrap();
    let cluster = fixture.cluster(2);
    orch.user_feedback(&assign(&cluster[..6], Target::Bucket(1)))
        .unwrap();
    assert!(orch.bucket(1).unwrap().is_trained());

    let suggestions = orch.suggest(&[(RequestTarget::Bucket(1), 10)], true).unwrap();
    assert_eq!(suggestions.len(), 10);
    let on_target = suggestions
        .iter()
        .filter(|e| fixture.corpus.labels[e.item as usize] == 2)
        .count();
    assert!(on_target >= 9, "only {on_target} of 10 suggestions on target");
    for entry in &suggestions {
        assert_eq!(entry.bucket, Some(Target::Bucket(1)));
        assert_eq!(entry.channel, Some(Channel::Classifier));
        let confidence = entry.confidence.unwrap();
        assert!((0.0..=1.0).contains(&confidence));
        assert!(!orch.seen().is_seen(entry.item));
    }
}

#[test]
fn test_fast_forward_then_transfer_to_the_pile() {
    let fixture = CorpusFixture::clustered(400).unwrap();
    let mut orch = fixture.orchestrator(&CorpusFixture::config(2)).unwrap();
    let cluster = fixture.cluster(0);
    orch.user_feedback(&assign(&cluster[..5], Target::Bucket(1)))
        .unwrap();

    orch.fast_forward(Target::Bucket(1), 8).unwrap();
    let staged = orch.bucket(1).unwrap().staged();
    assert_eq!(staged.len(), 8);
    let listing = orch
        .bucket_view_data(Target::Bucket(1), SortOrder::FastForward)
        .unwrap();
    assert!(listing[..8].iter().all(|e| e.is_fast_forward));
    assert!(listing[8..].iter().all(|e| !e.is_fast_forward));

    // pulling a staged item out rejects it for this fast-forward
    orch.transfer_images(&staged[..1], Target::Bucket(1), Target::Discard, TransferMode::Move)
        .unwrap();
    orch.ff_commit(Target::Bucket(1)).unwrap();

    let bucket = orch.bucket(1).unwrap();
    assert_eq!(bucket.len(), 5 + 7);
    assert!(!bucket.contains(staged[0]));
    assert!(orch.discard_pile().contains(staged[0]));
    assert!(staged.iter().all(|&item| orch.seen().is_seen(item)));
}

#[test]
fn test_copy_keeps_items_in_both_buckets() {
    let fixture = CorpusFixture::clustered(300).unwrap();
    let mut orch = fixture.orchestrator(&CorpusFixture::config(3)).unwrap();
    orch.create_bucket().unwrap();
    let items = fixture.cluster(1)[..4].to_vec();
    orch.user_feedback(&assign(&items, Target::Bucket(1))).unwrap();

    orch.transfer_images(&items[..2], Target::Bucket(1), Target::Bucket(2), TransferMode::Copy)
        .unwrap();
    assert!(orch.bucket(1).unwrap().contains(items[0]));
    assert!(orch.bucket(2).unwrap().contains(items[0]));

    let err = orch
        .transfer_images(&items[2..], Target::Bucket(2), Target::Bucket(1), TransferMode::Move)
        .unwrap_err();
    assert!(matches!(err, SieveError::ItemNotInBucket { .. }));
}

#[test]
fn test_scripted_session_keeps_bookkeeping_consistent() {
    let fixture = CorpusFixture::clustered(500).unwrap();
    let mut session = fixture.session(&CorpusFixture::config(4)).unwrap();
    let report = simulate(&mut session, &fixture.corpus.labels, 3, 10).unwrap();
    assert_eq!(report.rounds_run, 10);

    let orch = session.orchestrator();
    let placed = orch.placed_items();
    assert!(placed.iter().all(|&item| orch.seen().is_seen(item)));

    // with moves only, no item sits in two places
    let mut owners = HashSet::new();
    for bucket in orch.buckets() {
        for item in bucket.members() {
            assert!(owners.insert(item), "item {item} placed twice");
        }
    }
    for &item in orch.discard_pile().items() {
        assert!(owners.insert(item), "item {item} placed twice");
    }
    assert_eq!(owners.len(), placed.len());
    assert_eq!(report.seen, orch.seen().len());
}
