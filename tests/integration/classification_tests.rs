use sieve::engine::{BucketId, Target, Verdict, classify, split_evenly};
use sieve::test_utils::{TestCase, run_table_tests};

fn verdict(
    discard: bool,
    good: Option<BucketId>,
    neutral: Option<BucketId>,
    bad: Option<BucketId>,
) -> Verdict {
    Verdict {
        discard,
        good,
        neutral,
        bad,
    }
}

#[test]
fn test_feedback_classification_table() {
    let cases = vec![
        TestCase {
            name: "discarded exploration item",
            input: (Target::Discard, None),
            expected: verdict(true, None, None, None),
        },
        TestCase {
            name: "discarded suggestion is bad for its bucket",
            input: (Target::Discard, Some(4)),
            expected: verdict(true, None, None, Some(4)),
        },
        TestCase {
            name: "exploration item filed into a bucket",
            input: (Target::Bucket(2), None),
            expected: verdict(false, None, Some(2), None),
        },
        TestCase {
            name: "accepted suggestion",
            input: (Target::Bucket(2), Some(2)),
            expected: verdict(false, Some(2), None, None),
        },
        TestCase {
            name: "suggestion moved to another bucket",
            input: (Target::Bucket(2), Some(5)),
            expected: verdict(false, None, Some(2), Some(5)),
        },
    ];
    run_table_tests(cases, |(assigned, suggested)| classify(assigned, suggested)).unwrap();
}

#[test]
fn test_split_evenly_table() {
    let cases = vec![
        TestCase {
            name: "exact split",
            input: (9, 3),
            expected: vec![3, 3, 3],
        },
        TestCase {
            name: "remainder goes first",
            input: (26, 4),
            expected: vec![7, 7, 6, 6],
        },
        TestCase {
            name: "fewer slots than buckets",
            input: (1, 3),
            expected: vec![1, 0, 0],
        },
        TestCase {
            name: "no buckets",
            input: (4, 0),
            expected: vec![],
        },
    ];
    run_table_tests(cases, |(n, t)| split_evenly(n, t)).unwrap();
}
