use std::collections::BTreeMap;
use std::sync::LazyLock;

use proptest::prelude::*;
use sieve::engine::{ItemId, Target};
use sieve::session::RoundView;
use sieve::test_utils::fixtures::CorpusFixture;

static CORPUS: LazyLock<CorpusFixture> =
    LazyLock::new(|| CorpusFixture::clustered(300).unwrap());

fn items(view: &RoundView) -> Vec<ItemId> {
    view.items().iter().map(|entry| entry.item).collect()
}

/// Two rounds: exploration, then the first cluster-0 items go to bucket 1.
fn replay(seed: u64) -> (Vec<ItemId>, Vec<ItemId>) {
    let mut session = CORPUS.session(&CorpusFixture::config(seed)).unwrap();
    let first = session.interaction_round(&BTreeMap::new(), true).unwrap();
    let feedback: BTreeMap<ItemId, Option<Target>> = CORPUS.cluster(0)[..5]
        .iter()
        .map(|&item| (item, Some(Target::Bucket(1))))
        .collect();
    let second = session.interaction_round(&feedback, true).unwrap();
    (items(&first), items(&second))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    #[test]
    fn test_seeded_sessions_replay_identically(seed in 0u64..1000) {
        prop_assert_eq!(replay(seed), replay(seed));
    }
}
