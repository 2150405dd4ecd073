// 🔑 Role Resolver - role token → capability set → per-request session
//
// A session is resolved once at the boundary (HTTP query, CLI flag) and then
// passed explicitly to every access call.

use crate::error::{AccessError, AccessResult};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

// ============================================================================
// ROLE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Student,
    Professor,
    Admin,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Student, Role::Professor, Role::Admin];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Professor => "professor",
            Role::Admin => "admin",
        }
    }

    /// Lenient resolution for untrusted input. Missing or unknown tokens fall
    /// back to the least-privileged role instead of failing.
    pub fn from_token(token: Option<&str>) -> Role {
        match token.map(str::parse::<Role>) {
            Some(Ok(role)) => role,
            Some(Err(_)) => {
                tracing::debug!(token = ?token, "unknown role token, using student");
                Role::Student
            }
            None => Role::Student,
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        match self {
            Role::Admin => Capabilities {
                can_manage_branches: true,
                can_manage_instructors: true,
                can_post_announcements: true,
                can_view_all_instructors: true,
            },
            Role::Professor => Capabilities {
                can_post_announcements: true,
                ..Capabilities::default()
            },
            Role::Student => Capabilities::default(),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "student" => Ok(Role::Student),
            "professor" => Ok(Role::Professor),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role: {:?}", other)),
        }
    }
}

// ============================================================================
// CAPABILITIES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    pub can_manage_branches: bool,
    pub can_manage_instructors: bool,
    pub can_post_announcements: bool,
    pub can_view_all_instructors: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    ManageBranches,
    ManageInstructors,
    PostAnnouncements,
    ViewAllInstructors,
}

impl Capability {
    /// Verb phrase used in permission errors.
    pub fn action(&self) -> &'static str {
        match self {
            Capability::ManageBranches => "manage branches",
            Capability::ManageInstructors => "manage instructors",
            Capability::PostAnnouncements => "post announcements",
            Capability::ViewAllInstructors => "view all instructors",
        }
    }
}

impl Capabilities {
    pub fn allows(&self, capability: Capability) -> bool {
        match capability {
            Capability::ManageBranches => self.can_manage_branches,
            Capability::ManageInstructors => self.can_manage_instructors,
            Capability::PostAnnouncements => self.can_post_announcements,
            Capability::ViewAllInstructors => self.can_view_all_instructors,
        }
    }
}

// ============================================================================
// SESSION
// ============================================================================

/// Caller context for one request.
///
/// `branch_ids` scopes what non-admin callers can see: a student's own branch,
/// or every branch a professor teaches at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub role: Role,
    pub capabilities: Capabilities,
    pub user_id: Option<String>,
    pub branch_ids: Vec<String>,
}

impl Session {
    pub fn new(role: Role) -> Self {
        Session {
            role,
            capabilities: role.capabilities(),
            user_id: None,
            branch_ids: Vec::new(),
        }
    }

    pub fn resolve(token: Option<&str>) -> Self {
        Session::new(Role::from_token(token))
    }

    pub fn admin() -> Self {
        Session::new(Role::Admin)
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_branches<I, T>(mut self, branch_ids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        for id in branch_ids {
            let id = id.into();
            if !self.branch_ids.contains(&id) {
                self.branch_ids.push(id);
            }
        }
        self
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn is_user(&self, user_id: &str) -> bool {
        self.user_id.as_deref() == Some(user_id)
    }

    pub fn has_branch(&self, branch_id: &str) -> bool {
        self.branch_ids.iter().any(|b| b == branch_id)
    }

    pub fn require(&self, capability: Capability) -> AccessResult<()> {
        if self.capabilities.allows(capability) {
            Ok(())
        } else {
            Err(self.denied(capability.action()))
        }
    }

    pub fn denied(&self, action: &'static str) -> AccessError {
        tracing::warn!(role = %self.role, user = ?self.user_id, action, "permission denied");
        AccessError::PermissionDenied {
            role: self.role,
            action,
        }
    }

    /// Name recorded as the actor of audit events.
    pub fn actor(&self) -> String {
        match &self.user_id {
            Some(id) => format!("{}:{}", self.role, id),
            None => self.role.to_string(),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
