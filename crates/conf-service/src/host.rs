//! Host Controls.
//!
//! Conference-level lock and recording state plus the authorization checks
//! for privileged operations. Everything here is pure: the owning
//! `ConferenceActor` applies the decision and does the dispatch.

use crate::errors::ConfError;
use crate::registry::{Capabilities, Connection, Roles};

use common::types::ConnectionId;
use serde::{Deserialize, Serialize};

/// Whether new non-privileged joins are admitted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LockState {
    #[default]
    Unlocked,
    Locked,
}

/// A capability flag checked before a gated action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    ShareScreen,
    Record,
    Whiteboard,
}

impl Capability {
    fn granted(self, capabilities: &Capabilities) -> bool {
        match self {
            Capability::ShareScreen => capabilities.can_share_screen,
            Capability::Record => capabilities.can_record,
            Capability::Whiteboard => capabilities.can_use_whiteboard,
        }
    }

    fn describe(self) -> &'static str {
        match self {
            Capability::ShareScreen => "share your screen",
            Capability::Record => "record",
            Capability::Whiteboard => "use the whiteboard",
        }
    }
}

/// Per-conference host state.
#[derive(Debug, Default)]
pub struct HostControls {
    lock: LockState,
    recording: bool,
}

impl HostControls {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn lock_state(&self) -> LockState {
        self.lock
    }

    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.lock == LockState::Locked
    }

    #[must_use]
    pub fn is_recording(&self) -> bool {
        self.recording
    }

    /// Returns true if the state changed.
    pub fn lock(&mut self) -> bool {
        let changed = self.lock != LockState::Locked;
        self.lock = LockState::Locked;
        changed
    }

    /// Returns true if the state changed.
    pub fn unlock(&mut self) -> bool {
        let changed = self.lock != LockState::Unlocked;
        self.lock = LockState::Unlocked;
        changed
    }

    pub fn start_recording(&mut self) -> bool {
        !std::mem::replace(&mut self.recording, true)
    }

    pub fn stop_recording(&mut self) -> bool {
        std::mem::replace(&mut self.recording, false)
    }

    /// Gate a new join. A locked conference only admits hosts and co-hosts.
    pub fn admit(&self, roles: &Roles) -> Result<(), ConfError> {
        if self.is_locked() && !roles.is_privileged() {
            return Err(ConfError::MeetingLocked);
        }
        Ok(())
    }
}

/// Require host or co-host.
pub fn require_privileged(actor: &Connection, action: &str) -> Result<(), ConfError> {
    if actor.roles.is_privileged() {
        Ok(())
    } else {
        Err(ConfError::PermissionDenied(format!(
            "Only hosts can {action}"
        )))
    }
}

/// Require a capability flag.
pub fn require_capability(actor: &Connection, capability: Capability) -> Result<(), ConfError> {
    if capability.granted(&actor.capabilities) {
        Ok(())
    } else {
        Err(ConfError::PermissionDenied(format!(
            "You do not have permission to {}",
            capability.describe()
        )))
    }
}

/// Moving a participant between rooms: privileged users may move anyone,
/// everyone else only themselves.
pub fn authorize_move(actor: &Connection, target: &ConnectionId) -> Result<(), ConfError> {
    if actor.roles.is_privileged() || &actor.id == target {
        Ok(())
    } else {
        Err(ConfError::PermissionDenied(
            "Only hosts can move other participants".to_string(),
        ))
    }
}

/// Removing a participant: privileged, never yourself, and co-hosts cannot
/// remove the host.
pub fn authorize_removal(actor: &Connection, target: &Connection) -> Result<(), ConfError> {
    require_privileged(actor, "remove participants")?;
    if actor.id == target.id {
        return Err(ConfError::InvalidRequest(
            "You cannot remove yourself; leave instead".to_string(),
        ));
    }
    if target.roles.host && !actor.roles.host {
        return Err(ConfError::PermissionDenied(
            "Co-hosts cannot remove the host".to_string(),
        ));
    }
    Ok(())
}

/// Changing roles or capabilities: privileged, and only a host may grant or
/// revoke the host flag.
pub fn authorize_permission_change(
    actor: &Connection,
    target: &Connection,
    new_roles: &Roles,
) -> Result<(), ConfError> {
    require_privileged(actor, "change permissions")?;
    if new_roles.host != target.roles.host && !actor.roles.host {
        return Err(ConfError::PermissionDenied(
            "Only the host can change host status".to_string(),
        ));
    }
    Ok(())
}

/// Which connections a mute-all applies to: everyone without host privileges.
pub fn mute_all_targets<'a, I>(connections: I) -> Vec<ConnectionId>
where
    I: IntoIterator<Item = &'a Connection>,
{
    connections
        .into_iter()
        .filter(|c| !c.roles.is_privileged())
        .map(|c| c.id.clone())
        .collect()
}
