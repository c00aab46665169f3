//! Connection Registry.
//!
//! Maps a transport connection id to the logical participant behind it:
//! identity, role flags, capability flags, and the mutable media-state flags.
//! The registry is the only owner of that mutable state; the room directory
//! stores bare connection ids so there is never a second copy to diverge.
//!
//! The registry never emits events. Callers notify other connections after a
//! registry operation has succeeded.

use crate::errors::ConfError;

use chrono::{DateTime, Utc};
use common::types::ConnectionId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Who is behind a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// Authenticated user id, `None` for guests.
    pub user_id: Option<String>,
    /// Display name chosen at join time.
    pub display_name: String,
    /// Contact email, if supplied.
    pub email: Option<String>,
    /// Whether the participant joined without an account.
    pub is_guest: bool,
}

/// Role flags granting host-control privileges.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Roles {
    pub host: bool,
    pub co_host: bool,
}

impl Roles {
    /// Host or co-host.
    #[must_use]
    pub fn is_privileged(&self) -> bool {
        self.host || self.co_host
    }
}

/// Capability flags gating individual features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    pub can_share_screen: bool,
    pub can_record: bool,
    pub can_use_whiteboard: bool,
}

impl Capabilities {
    /// Defaults for a participant without explicit grants.
    #[must_use]
    pub const fn participant() -> Self {
        Self {
            can_share_screen: true,
            can_record: false,
            can_use_whiteboard: true,
        }
    }

    /// Everything enabled.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            can_share_screen: true,
            can_record: true,
            can_use_whiteboard: true,
        }
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::participant()
    }
}

/// Client-reported media state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaState {
    pub audio_muted: bool,
    pub video_off: bool,
    pub hand_raised: bool,
    pub screen_sharing: bool,
}

/// Partial media-state update. `None` fields are left unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MediaStatePatch {
    pub audio_muted: Option<bool>,
    pub video_off: Option<bool>,
    pub hand_raised: Option<bool>,
    pub screen_sharing: Option<bool>,
}

impl MediaStatePatch {
    fn apply(self, state: &mut MediaState) {
        if let Some(v) = self.audio_muted {
            state.audio_muted = v;
        }
        if let Some(v) = self.video_off {
            state.video_off = v;
        }
        if let Some(v) = self.hand_raised {
            state.hand_raised = v;
        }
        if let Some(v) = self.screen_sharing {
            state.screen_sharing = v;
        }
    }
}

/// Self-reported network quality.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionQuality {
    #[default]
    Unknown,
    Excellent,
    Good,
    Fair,
    Poor,
}

/// A live, registered connection.
#[derive(Debug, Clone)]
pub struct Connection {
    pub id: ConnectionId,
    pub identity: Identity,
    pub roles: Roles,
    pub capabilities: Capabilities,
    pub media: MediaState,
    pub quality: ConnectionQuality,
    pub joined_at: DateTime<Utc>,
}

impl Connection {
    /// Build a freshly attached connection with default media state.
    #[must_use]
    pub fn new(
        id: ConnectionId,
        identity: Identity,
        roles: Roles,
        capabilities: Capabilities,
    ) -> Self {
        Self {
            id,
            identity,
            roles,
            capabilities,
            media: MediaState::default(),
            quality: ConnectionQuality::Unknown,
            joined_at: Utc::now(),
        }
    }
}

/// Registry of every connection in one conference.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: HashMap<ConnectionId, Connection>,
}

impl ConnectionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection. Fails if the id is already present.
    pub fn register(&mut self, connection: Connection) -> Result<(), ConfError> {
        if self.connections.contains_key(&connection.id) {
            return Err(ConfError::DuplicateConnection(connection.id.to_string()));
        }
        self.connections.insert(connection.id.clone(), connection);
        Ok(())
    }

    /// Look up a registered connection.
    pub fn lookup(&self, id: &ConnectionId) -> Result<&Connection, ConfError> {
        self.connections
            .get(id)
            .ok_or_else(|| ConfError::TargetNotFound(id.to_string()))
    }

    /// Merge only the supplied media-state fields. Returns the resulting state.
    pub fn update_media_state(
        &mut self,
        id: &ConnectionId,
        patch: MediaStatePatch,
    ) -> Result<MediaState, ConfError> {
        let connection = self.get_mut(id)?;
        patch.apply(&mut connection.media);
        Ok(connection.media)
    }

    /// Record a new connection-quality label.
    pub fn update_quality(
        &mut self,
        id: &ConnectionId,
        quality: ConnectionQuality,
    ) -> Result<(), ConfError> {
        self.get_mut(id)?.quality = quality;
        Ok(())
    }

    /// Replace role and capability flags.
    pub fn update_permissions(
        &mut self,
        id: &ConnectionId,
        roles: Roles,
        capabilities: Capabilities,
    ) -> Result<(), ConfError> {
        let connection = self.get_mut(id)?;
        connection.roles = roles;
        connection.capabilities = capabilities;
        Ok(())
    }

    /// Remove a connection, returning it so callers can announce the departure
    /// with the right display name.
    pub fn unregister(&mut self, id: &ConnectionId) -> Result<Connection, ConfError> {
        self.connections
            .remove(id)
            .ok_or_else(|| ConfError::TargetNotFound(id.to_string()))
    }

    #[must_use]
    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.connections.contains_key(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }

    fn get_mut(&mut self, id: &ConnectionId) -> Result<&mut Connection, ConfError> {
        self.connections
            .get_mut(id)
            .ok_or_else(|| ConfError::TargetNotFound(id.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn connection(id: &str, name: &str) -> Connection {
        Connection::new(
            ConnectionId::new(id),
            Identity {
                user_id: None,
                display_name: name.to_string(),
                email: None,
                is_guest: true,
            },
            Roles::default(),
            Capabilities::participant(),
        )
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = ConnectionRegistry::new();
        registry.register(connection("conn-1", "Alice")).unwrap();

        let found = registry.lookup(&ConnectionId::new("conn-1")).unwrap();
        assert_eq!(found.identity.display_name, "Alice");
        assert_eq!(found.media, MediaState::default());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_duplicate_register_rejected() {
        let mut registry = ConnectionRegistry::new();
        registry.register(connection("conn-1", "Alice")).unwrap();

        let result = registry.register(connection("conn-1", "Mallory"));
        assert!(matches!(result, Err(ConfError::DuplicateConnection(_))));

        // Original entry untouched
        let found = registry.lookup(&ConnectionId::new("conn-1")).unwrap();
        assert_eq!(found.identity.display_name, "Alice");
    }

    #[test]
    fn test_lookup_missing() {
        let registry = ConnectionRegistry::new();
        let result = registry.lookup(&ConnectionId::new("ghost"));
        assert!(matches!(result, Err(ConfError::TargetNotFound(_))));
    }

    #[test]
    fn test_media_patch_merges_only_supplied_fields() {
        let mut registry = ConnectionRegistry::new();
        let id = ConnectionId::new("conn-1");
        registry.register(connection("conn-1", "Alice")).unwrap();

        registry
            .update_media_state(
                &id,
                MediaStatePatch {
                    audio_muted: Some(true),
                    hand_raised: Some(true),
                    ..MediaStatePatch::default()
                },
            )
            .unwrap();

        let state = registry
            .update_media_state(
                &id,
                MediaStatePatch {
                    hand_raised: Some(false),
                    ..MediaStatePatch::default()
                },
            )
            .unwrap();

        assert!(state.audio_muted);
        assert!(!state.hand_raised);
        assert!(!state.video_off);
        assert!(!state.screen_sharing);
    }

    #[test]
    fn test_update_missing_connection() {
        let mut registry = ConnectionRegistry::new();
        let result =
            registry.update_media_state(&ConnectionId::new("ghost"), MediaStatePatch::default());
        assert!(matches!(result, Err(ConfError::TargetNotFound(_))));
    }

    #[test]
    fn test_unregister_returns_identity() {
        let mut registry = ConnectionRegistry::new();
        let id = ConnectionId::new("conn-1");
        registry.register(connection("conn-1", "Alice")).unwrap();

        let removed = registry.unregister(&id).unwrap();
        assert_eq!(removed.identity.display_name, "Alice");
        assert!(registry.is_empty());

        // Second unregister is a NotFound, not a panic
        assert!(matches!(
            registry.unregister(&id),
            Err(ConfError::TargetNotFound(_))
        ));
    }

    #[test]
    fn test_update_permissions_and_quality() {
        let mut registry = ConnectionRegistry::new();
        let id = ConnectionId::new("conn-1");
        registry.register(connection("conn-1", "Alice")).unwrap();

        registry
            .update_permissions(
                &id,
                Roles {
                    host: false,
                    co_host: true,
                },
                Capabilities::all(),
            )
            .unwrap();
        registry.update_quality(&id, ConnectionQuality::Poor).unwrap();

        let found = registry.lookup(&id).unwrap();
        assert!(found.roles.is_privileged());
        assert!(found.capabilities.can_record);
        assert_eq!(found.quality, ConnectionQuality::Poor);
    }
}
