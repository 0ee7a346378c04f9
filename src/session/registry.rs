//! Live sessions keyed by id.
//!
//! The dataset is shared read-only by every session. Each session sits
//! behind its own lock, held for the whole of one request.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use itertools::Itertools;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::Config;
use crate::dataset::DatasetContext;
use crate::error::{Result, SieveError};
use crate::session::AnalyticSession;

pub type SessionHandle = Arc<Mutex<AnalyticSession>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug)]
struct Entry {
    session: SessionHandle,
    started_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct SessionRegistry {
    dataset: Arc<DatasetContext>,
    config: Config,
    sessions: RwLock<HashMap<Uuid, Entry>>,
}

impl SessionRegistry {
    #[must_use]
    pub fn new(dataset: Arc<DatasetContext>, config: Config) -> Self {
        Self {
            dataset,
            config,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn dataset(&self) -> &Arc<DatasetContext> {
        &self.dataset
    }

    pub fn create(&self) -> Result<SessionSummary> {
        let session = AnalyticSession::new(Arc::clone(&self.dataset), &self.config)?;
        let id = Uuid::new_v4();
        let started_at = Utc::now();
        self.sessions.write().insert(
            id,
            Entry {
                session: Arc::new(Mutex::new(session)),
                started_at,
            },
        );
        tracing::info!(session = %id, "session started");
        Ok(SessionSummary { id, started_at })
    }

    pub fn get(&self, id: Uuid) -> Result<SessionHandle> {
        self.sessions
            .read()
            .get(&id)
            .map(|entry| Arc::clone(&entry.session))
            .ok_or_else(|| SieveError::UnknownSession(id.to_string()))
    }

    /// Runs `f` with the session locked.
    pub fn with_session<T>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut AnalyticSession) -> Result<T>,
    ) -> Result<T> {
        let handle = self.get(id)?;
        let mut session = handle.lock();
        f(&mut session)
    }

    pub fn end(&self, id: Uuid) -> Result<()> {
        let entry = self
            .sessions
            .write()
            .remove(&id)
            .ok_or_else(|| SieveError::UnknownSession(id.to_string()))?;
        let seen = entry.session.lock().orchestrator().seen().len();
        tracing::info!(
            session = %id,
            seen,
            duration_s = (Utc::now() - entry.started_at).num_seconds(),
            "session ended"
        );
        Ok(())
    }

    #[must_use]
    pub fn list(&self) -> Vec<SessionSummary> {
        self.sessions
            .read()
            .iter()
            .map(|(&id, entry)| SessionSummary {
                id,
                started_at: entry.started_at,
            })
            .sorted_by_key(|s| s.started_at)
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}
