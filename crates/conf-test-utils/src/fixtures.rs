//! Pre-configured conferences and participants.

use common::secret::SecretString;
use common::types::ConferenceId;
use conf_service::actors::ConferenceLimits;
use conf_service::catalog::ConferenceSettings;
use conf_service::handler::CallerIdentity;
use std::time::Duration;
use uuid::Uuid;

/// Test conference fixture.
#[derive(Debug, Clone)]
pub struct TestConference {
    /// Conference ID.
    pub id: ConferenceId,
    /// Title.
    pub title: String,
    /// Main-room capacity override.
    pub max_participants: Option<usize>,
    /// Join password.
    pub password: Option<String>,
    /// User ids granted host on join.
    pub host_user_ids: Vec<String>,
}

impl TestConference {
    /// Create a new test conference with the given ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: ConferenceId::new(id),
            title: "Test Conference".to_string(),
            max_participants: None,
            password: None,
            host_user_ids: Vec::new(),
        }
    }

    /// Create a test conference with a random ID.
    #[must_use]
    pub fn random() -> Self {
        Self::new(format!("conf-{}", Uuid::new_v4()))
    }

    #[must_use]
    pub fn with_max_participants(mut self, max: usize) -> Self {
        self.max_participants = Some(max);
        self
    }

    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    #[must_use]
    pub fn with_host(mut self, user_id: impl Into<String>) -> Self {
        self.host_user_ids.push(user_id.into());
        self
    }

    /// Catalog settings for this conference.
    #[must_use]
    pub fn settings(&self) -> ConferenceSettings {
        ConferenceSettings {
            title: self.title.clone(),
            max_participants: self.max_participants,
            password: self.password.clone().map(SecretString::from),
            host_user_ids: self.host_user_ids.clone(),
        }
    }
}

/// Test participant fixture.
#[derive(Debug, Clone)]
pub struct TestParticipant {
    /// Display name used on join.
    pub display_name: String,
    /// Identity the transport would have attached.
    pub caller: CallerIdentity,
}

impl TestParticipant {
    /// Authenticated participant with default capabilities.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            caller: CallerIdentity::from_headers(Some(&format!("user-{name}")), None),
            display_name: name,
        }
    }

    /// Participant without an account.
    #[must_use]
    pub fn guest(name: impl Into<String>) -> Self {
        Self {
            display_name: name.into(),
            caller: CallerIdentity::guest(),
        }
    }

    /// Participant with the host role and every capability.
    #[must_use]
    pub fn host(name: impl Into<String>) -> Self {
        Self::with_permissions(name, "host,share-screen,record,whiteboard")
    }

    /// Participant with the co-host role.
    #[must_use]
    pub fn co_host(name: impl Into<String>) -> Self {
        Self::with_permissions(name, "co-host,share-screen,whiteboard")
    }

    /// Participant with an explicit permissions header value.
    #[must_use]
    pub fn with_permissions(name: impl Into<String>, permissions: &str) -> Self {
        let name = name.into();
        Self {
            caller: CallerIdentity::from_headers(Some(&format!("user-{name}")), Some(permissions)),
            display_name: name,
        }
    }

    /// The user id the fixture authenticates as.
    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        self.caller.user_id.as_deref()
    }
}

/// Small limits so capacity edges are easy to reach.
#[must_use]
pub fn small_limits() -> ConferenceLimits {
    ConferenceLimits {
        max_participants: 10,
        breakout_room_capacity: 2,
        max_breakout_rooms: 4,
        max_chat_length: 100,
        connection_buffer: 64,
        empty_timeout: Duration::from_secs(60),
    }
}
