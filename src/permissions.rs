//! Per-scope capability grants.
//!
//! The registry stores grants verbatim and encodes no policy of its own: a
//! missing entry means "no explicit grant", and `allows` turns that absence
//! into a deny. Callers wanting a different default must inspect `for_user`
//! themselves.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One thing a grant can permit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Edit,
    Comment,
    Invite,
    Delete,
    ManagePermissions,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Edit => "edit",
            Capability::Comment => "comment",
            Capability::Invite => "invite",
            Capability::Delete => "delete",
            Capability::ManagePermissions => "manage_permissions",
        }
    }
}

/// Explicit per-user grant within one scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollaborationPermission {
    pub user_id: String,
    pub can_edit: bool,
    pub can_comment: bool,
    pub can_invite: bool,
    pub can_delete: bool,
    pub can_manage_permissions: bool,
}

impl CollaborationPermission {
    /// Everything allowed. The grant an owner gets.
    pub fn full_access(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            can_edit: true,
            can_comment: true,
            can_invite: true,
            can_delete: true,
            can_manage_permissions: true,
        }
    }

    /// View only. An explicit grant that still denies every capability.
    pub fn read_only(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            can_edit: false,
            can_comment: false,
            can_invite: false,
            can_delete: false,
            can_manage_permissions: false,
        }
    }

    /// May comment, nothing else.
    pub fn commenter(user_id: impl Into<String>) -> Self {
        Self {
            can_comment: true,
            ..Self::read_only(user_id)
        }
    }

    pub fn allows(&self, capability: Capability) -> bool {
        match capability {
            Capability::Edit => self.can_edit,
            Capability::Comment => self.can_comment,
            Capability::Invite => self.can_invite,
            Capability::Delete => self.can_delete,
            Capability::ManagePermissions => self.can_manage_permissions,
        }
    }
}

/// Scope-keyed grant lists.
#[derive(Debug, Default)]
pub struct PermissionRegistry {
    grants: HashMap<String, Vec<CollaborationPermission>>,
}

impl PermissionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the scope's entire grant list. Not a merge.
    pub fn set(&mut self, scope: &str, permissions: Vec<CollaborationPermission>) {
        self.grants.insert(scope.to_string(), permissions);
    }

    /// All grants for the scope, in the order they were set.
    pub fn list(&self, scope: &str) -> &[CollaborationPermission] {
        self.grants.get(scope).map(Vec::as_slice).unwrap_or_default()
    }

    /// The user's explicit grant, if one exists.
    pub fn for_user(&self, scope: &str, user_id: &str) -> Option<&CollaborationPermission> {
        self.list(scope).iter().find(|p| p.user_id == user_id)
    }

    /// Whether the user's grant permits the capability. No grant is a deny.
    pub fn allows(&self, scope: &str, user_id: &str, capability: Capability) -> bool {
        self.for_user(scope, user_id)
            .map(|p| p.allows(capability))
            .unwrap_or(false)
    }
}
