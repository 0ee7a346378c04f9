use std::io::Cursor;
use std::sync::Arc;

use serde_json::{Value, json};
use sieve::cli::commands::serve::serve_lines;
use sieve::config::Config;
use sieve::dataset::{DatasetContext, SyntheticSpec};
use sieve::session::SessionRegistry;
use sieve::test_utils::fixtures::DatasetDirFixture;

fn run_script(registry: &SessionRegistry, lines: &[Value]) -> Vec<Value> {
    let input: String = lines.iter().map(|line| format!("{line}\n")).collect();
    let mut output = Vec::new();
    serve_lines(registry, Cursor::new(input), &mut output).unwrap();
    String::from_utf8(output)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

#[test]
fn test_loaded_dataset_serves_a_full_session() {
    let fixture = DatasetDirFixture::new(&SyntheticSpec {
        n_items: 300,
        separation: 10.0,
        spread: 0.5,
        ..SyntheticSpec::default()
    })
    .unwrap();
    fixture
        .write("urls.json", r#""https://img.example/{}.jpg""#)
        .unwrap();
    let dataset = Arc::new(
        DatasetContext::load(fixture.path(), &Config::default().model.svm).unwrap(),
    );
    let registry = SessionRegistry::new(dataset, Config::default());

    let cluster: Vec<u32> = fixture.corpus.members_of(1)[..6].to_vec();
    let feedback: serde_json::Map<String, Value> = cluster
        .iter()
        .map(|item| (item.to_string(), json!(1)))
        .collect();

    let responses = run_script(
        &registry,
        &[
            json!({"op": "interaction_round", "feedback": feedback}),
            json!({"op": "fast_forward", "bucket": 1, "n": 4}),
            json!({"op": "bucket_view_data", "bucket": 1, "sort_by": "fast_forward"}),
            json!({"op": "ff_commit", "bucket": 1}),
            json!({"op": "bucket_info"}),
            json!({"op": "end_session"}),
        ],
    );

    assert!(responses.iter().all(|r| r["ok"] == true), "{responses:?}");

    let first = &responses[0]["data"];
    assert_eq!(first["mode"], "grid");
    let shown = first["grid_images"].as_array().unwrap();
    assert_eq!(shown.len(), 28);
    assert!(
        shown[0]["url"]
            .as_str()
            .unwrap()
            .starts_with("https://img.example/")
    );

    let listing = responses[2]["data"].as_array().unwrap();
    assert_eq!(listing.len(), 10);
    let staged = listing.iter().filter(|e| e["is_fast_forward"] == true).count();
    assert_eq!(staged, 4);
    assert_eq!(listing[0]["is_fast_forward"], true);

    let info = &responses[4]["data"];
    assert_eq!(info["buckets"][0]["n_items"], 10);
    assert_eq!(info["buckets"][0]["archetype_urls"].as_array().unwrap().len(), 3);
    assert_eq!(info["n_active_and_trained"], 1);

    assert_eq!(responses[5]["data"]["seen"], 10);
    assert!(registry.is_empty());
}

#[test]
fn test_failed_requests_leave_the_session_usable() {
    let fixture = DatasetDirFixture::new(&SyntheticSpec {
        n_items: 100,
        ..SyntheticSpec::default()
    })
    .unwrap();
    let dataset = Arc::new(
        DatasetContext::load(fixture.path(), &Config::default().model.svm).unwrap(),
    );
    let registry = SessionRegistry::new(dataset, Config::default());

    let responses = run_script(
        &registry,
        &[
            json!({"op": "interaction_round", "feedback": {"5": 1, "7": 4}}),
            json!({"op": "interaction_round", "feedback": {"5000": 1}}),
            json!({"op": "rename_bucket", "bucket": 1, "name": "a name far too long"}),
            json!({"op": "bucket_info"}),
        ],
    );

    assert_eq!(responses[0]["code"], "unknown_bucket");
    assert_eq!(responses[1]["code"], "item_out_of_range");
    assert_eq!(responses[2]["code"], "name_too_long");
    let info = &responses[3]["data"];
    assert_eq!(info["buckets"][0]["name"], "Bucket 1");
    assert_eq!(info["buckets"][0]["n_items"], 0);
}
