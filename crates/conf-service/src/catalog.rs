//! Conference catalog.
//!
//! Resolves a conference id to its settings before a conference actor is
//! spawned. Scheduling and persistence live elsewhere; the in-memory catalog
//! is what the binary and tests use.

use common::secret::SecretString;
use common::types::ConferenceId;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Per-conference settings.
#[derive(Debug, Clone, Default)]
pub struct ConferenceSettings {
    pub title: String,
    /// Overrides the coordinator-wide participant bound when set.
    pub max_participants: Option<usize>,
    /// Join password, if the conference requires one.
    pub password: Option<SecretString>,
    /// User ids that are granted the host role on join.
    pub host_user_ids: Vec<String>,
}

impl ConferenceSettings {
    #[must_use]
    pub fn is_host(&self, user_id: Option<&str>) -> bool {
        user_id.is_some_and(|id| self.host_user_ids.iter().any(|h| h == id))
    }
}

/// Lookup of conference settings by id.
pub trait ConferenceCatalog: Send + Sync {
    /// `None` if the conference is unknown.
    fn lookup(&self, conference_id: &ConferenceId) -> Option<Arc<ConferenceSettings>>;
}

/// Catalog backed by a map, optionally admitting unknown ids with default
/// settings.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    conferences: RwLock<HashMap<ConferenceId, Arc<ConferenceSettings>>>,
    allow_adhoc: bool,
}

impl InMemoryCatalog {
    #[must_use]
    pub fn new(allow_adhoc: bool) -> Self {
        Self {
            conferences: RwLock::new(HashMap::new()),
            allow_adhoc,
        }
    }

    pub fn insert(&self, conference_id: ConferenceId, settings: ConferenceSettings) {
        self.conferences
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(conference_id, Arc::new(settings));
    }

    pub fn remove(&self, conference_id: &ConferenceId) -> Option<Arc<ConferenceSettings>> {
        self.conferences
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(conference_id)
    }
}

impl ConferenceCatalog for InMemoryCatalog {
    fn lookup(&self, conference_id: &ConferenceId) -> Option<Arc<ConferenceSettings>> {
        let known = self
            .conferences
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(conference_id)
            .cloned();

        known.or_else(|| {
            self.allow_adhoc
                .then(|| Arc::new(ConferenceSettings::default()))
        })
    }
}
