use std::collections::{BTreeMap, HashSet};
use std::sync::LazyLock;

use proptest::prelude::*;
use sieve::SieveError;
use sieve::engine::palette::confidence_color;
use sieve::engine::{ItemId, SeenSet, Target, split_evenly};
use sieve::test_utils::fixtures::CorpusFixture;

const CORPUS_SIZE: usize = 120;

static CORPUS: LazyLock<CorpusFixture> =
    LazyLock::new(|| CorpusFixture::clustered(CORPUS_SIZE).unwrap());

fn target() -> impl Strategy<Value = Option<Target>> {
    prop_oneof![
        Just(None),
        Just(Some(Target::Discard)),
        Just(Some(Target::Bucket(1))),
    ]
}

proptest! {
    #[test]
    fn test_seen_set_only_grows(batches in prop::collection::vec(prop::collection::vec(0u32..40, 0..15), 1..10)) {
        let mut seen = SeenSet::new(40);
        let mut expected: HashSet<ItemId> = HashSet::new();
        let mut exhaustions = 0;
        for batch in batches {
            let before = seen.len();
            let was_exhausted = seen.is_exhausted();
            match seen.update(batch.iter().copied()) {
                Ok(()) => {}
                Err(SieveError::DatasetExhausted) => exhaustions += 1,
                Err(err) => return Err(TestCaseError::fail(err.to_string())),
            }
            expected.extend(batch);
            prop_assert!(seen.len() >= before);
            prop_assert_eq!(seen.len(), expected.len());
            prop_assert!(expected.iter().all(|&item| seen.is_seen(item)));
            if was_exhausted {
                prop_assert!(seen.is_exhausted());
            }
        }
        prop_assert_eq!(exhaustions, usize::from(seen.is_exhausted()));
    }

    #[test]
    fn test_split_evenly_is_balanced(n in 0usize..200, t in 1usize..12) {
        let split = split_evenly(n, t);
        prop_assert_eq!(split.len(), t);
        prop_assert_eq!(split.iter().sum::<usize>(), n);
        prop_assert!(split.windows(2).all(|w| w[0] >= w[1] && w[0] - w[1] <= 1));
    }

    #[test]
    fn test_confidence_color_appends_an_alpha_byte(confidence in -1.0f64..2.0) {
        let color = confidence_color("#16db93", confidence);
        prop_assert_eq!(color.len(), 9);
        prop_assert!(color.starts_with("#16db93"));
        let alpha = u8::from_str_radix(&color[7..], 16).unwrap();
        prop_assert!(alpha >= 100);
    }

    #[test]
    fn test_pq_distances_are_symmetric(a in prop::collection::vec(0u32..120, 1..6), b in prop::collection::vec(0u32..120, 1..6)) {
        let index = CORPUS.dataset.index().unwrap();
        let ab = index.distances(&a, &b).unwrap();
        let ba = index.distances(&b, &a).unwrap();
        for i in 0..a.len() {
            for j in 0..b.len() {
                prop_assert!(ab.get(i, j) >= 0.0);
                prop_assert!((ab.get(i, j) - ba.get(j, i)).abs() < 1e-9);
            }
        }
        let mins = index.min_distances(&a, &b).unwrap();
        for (i, min) in mins.iter().enumerate() {
            prop_assert!(ab.row(i).iter().all(|d| min <= d));
        }
        let own = index.distances(&a, &a).unwrap();
        prop_assert!((0..a.len()).all(|i| own.get(i, i).abs() < 1e-12));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn test_feedback_places_only_seen_items(feedback in prop::collection::btree_map(0u32..120, target(), 0..20)) {
        let mut orch = CORPUS.orchestrator(&CorpusFixture::config(1)).unwrap();
        let feedback: BTreeMap<ItemId, Option<Target>> = feedback;
        orch.user_feedback(&feedback).unwrap();

        for (&item, assigned) in &feedback {
            prop_assert_eq!(orch.seen().is_seen(item), assigned.is_some());
            match assigned {
                Some(Target::Discard) => prop_assert!(orch.discard_pile().contains(item)),
                Some(Target::Bucket(id)) => prop_assert!(orch.bucket(*id).unwrap().contains(item)),
                None => {}
            }
        }
        let placed = orch.placed_items();
        prop_assert!(placed.iter().all(|&item| orch.seen().is_seen(item)));
        prop_assert_eq!(placed.len(), orch.seen().len());
    }
}
