//! JSON-lines request/response protocol for one session.
//!
//! Each request is one JSON object tagged by `op`. Bucket ids travel as
//! integers, with the discard pile as `0`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::engine::{BucketId, ItemId, Target};
use crate::error::{Result, SieveError};
use crate::session::AnalyticSession;

const fn default_refresh() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    CreateBucket,
    DeleteBucket {
        bucket: i64,
    },
    RenameBucket {
        bucket: i64,
        name: String,
    },
    SwapBuckets {
        first: i64,
        second: i64,
    },
    ToggleBucket {
        bucket: i64,
    },
    InteractionRound {
        #[serde(default)]
        feedback: BTreeMap<ItemId, Option<i64>>,
        #[serde(default = "default_refresh")]
        refresh: bool,
    },
    BucketInfo,
    BucketViewData {
        bucket: i64,
        sort_by: String,
    },
    BucketName {
        bucket: i64,
    },
    FastForward {
        bucket: i64,
        n: i64,
    },
    FfCommit {
        bucket: i64,
    },
    TransferImages {
        items: Vec<ItemId>,
        src: i64,
        dst: i64,
        mode: String,
    },
    ToggleMode,
    GridSetSize {
        dim: String,
        size: i64,
    },
    EndSession,
}

impl Request {
    pub fn parse(line: &str) -> Result<Self> {
        Ok(serde_json::from_str(line.trim())?)
    }

    /// Operation name as it appears on the wire.
    #[must_use]
    pub const fn op(&self) -> &'static str {
        match self {
            Self::CreateBucket => "create_bucket",
            Self::DeleteBucket { .. } => "delete_bucket",
            Self::RenameBucket { .. } => "rename_bucket",
            Self::SwapBuckets { .. } => "swap_buckets",
            Self::ToggleBucket { .. } => "toggle_bucket",
            Self::InteractionRound { .. } => "interaction_round",
            Self::BucketInfo => "bucket_info",
            Self::BucketViewData { .. } => "bucket_view_data",
            Self::BucketName { .. } => "bucket_name",
            Self::FastForward { .. } => "fast_forward",
            Self::FfCommit { .. } => "ff_commit",
            Self::TransferImages { .. } => "transfer_images",
            Self::ToggleMode => "toggle_mode",
            Self::GridSetSize { .. } => "grid_set_size",
            Self::EndSession => "end_session",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Response {
    #[must_use]
    pub const fn ok(data: Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            code: None,
            message: None,
        }
    }

    #[must_use]
    pub fn error(err: &SieveError) -> Self {
        Self {
            ok: false,
            data: None,
            code: Some(err.code().to_string()),
            message: Some(err.to_string()),
        }
    }

    #[must_use]
    pub fn from_result(result: Result<Value>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(err) => {
                if err.is_internal() {
                    tracing::error!(code = err.code(), error = %err, "request failed");
                } else {
                    tracing::debug!(code = err.code(), error = %err, "request rejected");
                }
                Self::error(&err)
            }
        }
    }
}

fn bucket_id(raw: i64) -> Result<BucketId> {
    if raw <= 0 {
        return Err(SieveError::UnknownBucket(raw));
    }
    BucketId::try_from(raw).map_err(|_| SieveError::UnknownBucket(raw))
}

fn feedback_targets(
    feedback: BTreeMap<ItemId, Option<i64>>,
) -> Result<BTreeMap<ItemId, Option<Target>>> {
    feedback
        .into_iter()
        .map(|(item, raw)| Ok((item, raw.map(Target::try_from).transpose()?)))
        .collect()
}

/// Runs one request against `session` and returns its payload.
///
/// `end_session` only reports what the session saw; tearing the session
/// down is the caller's job.
pub fn dispatch(session: &mut AnalyticSession, request: Request) -> Result<Value> {
    tracing::debug!(op = request.op(), "dispatch");
    let data = match request {
        Request::CreateBucket => serde_json::to_value(session.create_bucket()?)?,
        Request::DeleteBucket { bucket } => {
            serde_json::to_value(session.delete_bucket(bucket_id(bucket)?)?)?
        }
        Request::RenameBucket { bucket, name } => {
            serde_json::to_value(session.rename_bucket(bucket_id(bucket)?, &name)?)?
        }
        Request::SwapBuckets { first, second } => {
            session.swap_buckets(bucket_id(first)?, bucket_id(second)?)?;
            Value::Null
        }
        Request::ToggleBucket { bucket } => {
            serde_json::to_value(session.toggle_bucket(bucket_id(bucket)?)?)?
        }
        Request::InteractionRound { feedback, refresh } => {
            let feedback = feedback_targets(feedback)?;
            serde_json::to_value(session.interaction_round(&feedback, refresh)?)?
        }
        Request::BucketInfo => serde_json::to_value(session.bucket_info())?,
        Request::BucketViewData { bucket, sort_by } => {
            let entries = session.bucket_view_data(Target::try_from(bucket)?, sort_by.parse()?)?;
            serde_json::to_value(entries)?
        }
        Request::BucketName { bucket } => {
            json!({ "name": session.bucket_name(Target::try_from(bucket)?)? })
        }
        Request::FastForward { bucket, n } => {
            session.fast_forward(Target::try_from(bucket)?, n)?;
            Value::Null
        }
        Request::FfCommit { bucket } => {
            session.ff_commit(Target::try_from(bucket)?)?;
            Value::Null
        }
        Request::TransferImages {
            items,
            src,
            dst,
            mode,
        } => {
            session.transfer_images(
                &items,
                Target::try_from(src)?,
                Target::try_from(dst)?,
                mode.parse()?,
            )?;
            Value::Null
        }
        Request::ToggleMode => json!({ "mode": session.toggle_mode() }),
        Request::GridSetSize { dim, size } => {
            serde_json::to_value(session.grid_set_size(dim.parse()?, size)?)?
        }
        Request::EndSession => json!({ "seen": session.orchestrator().seen().len() }),
    };
    Ok(data)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::{Config, SvmConfig};
    use crate::dataset::{SyntheticCorpus, SyntheticSpec};

    fn session() -> (SyntheticCorpus, AnalyticSession) {
        let corpus = SyntheticCorpus::generate(&SyntheticSpec {
            n_items: 150,
            separation: 10.0,
            spread: 0.5,
            ..SyntheticSpec::default()
        });
        let dataset = Arc::new(corpus.context(&SvmConfig::default()).unwrap());
        let mut config = Config::default();
        config.session.seed = Some(11);
        (corpus, AnalyticSession::new(dataset, &config).unwrap())
    }

    fn run(session: &mut AnalyticSession, line: &str) -> Response {
        Response::from_result(Request::parse(line).and_then(|req| dispatch(session, req)))
    }

    #[test]
    fn parses_tagged_requests() {
        let request = Request::parse(r#"{"op": "interaction_round", "feedback": {"4": 0, "9": null}}"#)
            .unwrap();
        assert_eq!(
            request,
            Request::InteractionRound {
                feedback: BTreeMap::from([(4, Some(0)), (9, None)]),
                refresh: true,
            }
        );
        assert_eq!(Request::parse(r#"{"op":"end_session"}"#).unwrap(), Request::EndSession);
        assert!(Request::parse(r#"{"op":"launch"}"#).is_err());
    }

    #[test]
    fn bucket_lifecycle_over_the_wire() {
        let (_, mut session) = session();
        let created = run(&mut session, r#"{"op":"create_bucket"}"#);
        assert!(created.ok);
        assert_eq!(created.data.as_ref().unwrap()["bucket_id"], 2);

        let renamed = run(&mut session, r#"{"op":"rename_bucket","bucket":2,"name":"Dogs"}"#);
        assert!(renamed.ok);
        let name = run(&mut session, r#"{"op":"bucket_name","bucket":2}"#);
        assert_eq!(name.data.unwrap()["name"], "Dogs");
        let pile = run(&mut session, r#"{"op":"bucket_name","bucket":0}"#);
        assert_eq!(pile.data.unwrap()["name"], "Discard pile");

        let deleted = run(&mut session, r#"{"op":"delete_bucket","bucket":2}"#);
        assert!(deleted.ok);
    }

    #[test]
    fn errors_carry_stable_codes() {
        let (_, mut session) = session();
        let cases = [
            (r#"{"op":"delete_bucket","bucket":0}"#, "unknown_bucket"),
            (r#"{"op":"delete_bucket","bucket":-1}"#, "unknown_bucket"),
            (r#"{"op":"delete_bucket","bucket":1}"#, "cannot_delete_last_bucket"),
            (r#"{"op":"fast_forward","bucket":1,"n":0}"#, "invalid_fast_forward_count"),
            (r#"{"op":"bucket_view_data","bucket":1,"sort_by":"size"}"#, "invalid_sort_order"),
            (r#"{"op":"grid_set_size","dim":"rows","size":11}"#, "invalid_grid_size"),
            (
                r#"{"op":"transfer_images","items":[],"src":1,"dst":0,"mode":"copy"}"#,
                "invalid_copy_target",
            ),
            ("not json", "serialization_error"),
        ];
        for (line, code) in cases {
            let response = run(&mut session, line);
            assert!(!response.ok, "{line}");
            assert_eq!(response.code.as_deref(), Some(code), "{line}");
            assert!(response.data.is_none());
        }
    }

    #[test]
    fn rounds_feed_back_into_buckets() {
        let (corpus, mut session) = session();
        let first = run(&mut session, r#"{"op":"interaction_round"}"#);
        assert_eq!(first.data.as_ref().unwrap()["mode"], "grid");

        let feedback: serde_json::Map<String, Value> = corpus.members_of(2)[..5]
            .iter()
            .map(|item| (item.to_string(), json!(1)))
            .collect();
        let line = json!({ "op": "interaction_round", "feedback": feedback }).to_string();
        let second = run(&mut session, &line);
        assert!(second.ok);

        let info = run(&mut session, r#"{"op":"bucket_info"}"#);
        let buckets = &info.data.unwrap()["buckets"];
        assert_eq!(buckets[0]["n_items"], 5);
        assert_eq!(buckets[0]["trained"], true);

        let end = run(&mut session, r#"{"op":"end_session"}"#);
        assert_eq!(end.data.unwrap()["seen"], 5);
    }

    #[test]
    fn toggle_mode_reports_the_new_mode() {
        let (_, mut session) = session();
        let response = run(&mut session, r#"{"op":"toggle_mode"}"#);
        assert_eq!(response.data.unwrap()["mode"], "single");
        let round = run(&mut session, r#"{"op":"interaction_round"}"#);
        assert_eq!(round.data.unwrap()["mode"], "single");
    }

    #[test]
    fn serialized_responses_omit_empty_fields() {
        let raw = serde_json::to_string(&Response::ok(Value::Null)).unwrap();
        assert_eq!(raw, r#"{"ok":true,"data":null}"#);
        let raw = serde_json::to_string(&Response::error(&SieveError::DatasetExhausted)).unwrap();
        assert!(raw.starts_with(r#"{"ok":false,"code":"dataset_exhausted""#));
    }
}
