// 👤 User Profile - student, professor or admin account

use super::{double_option, is_blank, Belt, MAX_BLACK_BELT_STRIPES};
use crate::error::{ValidationError, ValidationResult};
use crate::roles::Role;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attendance {
    pub classes_attended: u32,
    #[serde(default)]
    pub last_check_in: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub belt: Option<Belt>,
    #[serde(default)]
    pub stripes: u8,
    /// Home branch id (older records may hold the branch name).
    #[serde(default)]
    pub branch_id: Option<String>,
    #[serde(default)]
    pub main_instructor: Option<String>,
    #[serde(default)]
    pub attendance: Attendance,
}

impl UserProfile {
    pub fn new(name: &str, email: &str, role: Role) -> Self {
        UserProfile {
            name: name.to_string(),
            email: email.to_string(),
            role,
            ..Default::default()
        }
    }

    pub fn at_branch(mut self, branch_id: &str) -> Self {
        self.branch_id = Some(branch_id.to_string());
        self
    }

    pub fn validate(&self) -> ValidationResult {
        let mut errors = Vec::new();

        if is_blank(&self.name) {
            errors.push(ValidationError::new("name", "Required field is empty"));
        }
        if !self.email.is_empty() && !self.email.contains('@') {
            errors.push(ValidationError::new("email", "Must contain '@'"));
        }
        if self.belt == Some(Belt::Preta) && self.stripes > MAX_BLACK_BELT_STRIPES {
            errors.push(ValidationError::new(
                "stripes",
                format!(
                    "Must be between 0 and {} for Preta, got {}",
                    MAX_BLACK_BELT_STRIPES, self.stripes
                ),
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    pub fn record_check_in(&mut self, at: DateTime<Utc>) {
        self.attendance.classes_attended += 1;
        self.attendance.last_check_in = Some(at);
    }
}

// ============================================================================
// PATCH
// ============================================================================

/// Partial update. `branch_id: Some(None)` clears the home branch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub belt: Option<Belt>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stripes: Option<u8>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub branch_id: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub main_instructor: Option<Option<String>>,
}

impl UserPatch {
    /// Contact details only; what a user may change on their own profile.
    pub fn is_self_service(&self) -> bool {
        self.role.is_none()
            && self.belt.is_none()
            && self.stripes.is_none()
            && self.branch_id.is_none()
            && self.main_instructor.is_none()
    }

    pub fn apply_to(&self, user: &mut UserProfile) {
        if let Some(name) = &self.name {
            user.name = name.clone();
        }
        if let Some(email) = &self.email {
            user.email = email.clone();
        }
        if let Some(phone) = &self.phone {
            user.phone = phone.clone();
        }
        if let Some(role) = self.role {
            user.role = role;
        }
        if let Some(belt) = self.belt {
            user.belt = Some(belt);
        }
        if let Some(stripes) = self.stripes {
            user.stripes = stripes;
        }
        if let Some(branch_id) = &self.branch_id {
            user.branch_id = branch_id.clone();
        }
        if let Some(main_instructor) = &self.main_instructor {
            user.main_instructor = main_instructor.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_black_belt_stripes_capped() {
        let mut user = UserProfile::new("Ana", "ana@mail.com", Role::Professor);
        user.belt = Some(Belt::Preta);
        user.stripes = 6;
        assert!(user.validate().is_ok());

        user.stripes = 9;
        let errors = user.validate().unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "stripes");

        // other belts keep whatever count they were given
        user.belt = Some(Belt::Azul);
        assert!(user.validate().is_ok());
    }

    #[test]
    fn test_check_in_counts() {
        let mut user = UserProfile::new("Ana", "ana@mail.com", Role::Student);
        let now = Utc::now();
        user.record_check_in(now);
        user.record_check_in(now);

        assert_eq!(user.attendance.classes_attended, 2);
        assert_eq!(user.attendance.last_check_in, Some(now));
    }

    #[test]
    fn test_self_service_patch() {
        let contact = UserPatch {
            phone: Some("11988887777".into()),
            ..Default::default()
        };
        assert!(contact.is_self_service());

        let promotion = UserPatch {
            role: Some(Role::Admin),
            ..Default::default()
        };
        assert!(!promotion.is_self_service());
    }

    #[test]
    fn test_patch_null_clears_branch() {
        let patch: UserPatch = serde_json::from_str(r#"{"branchId": null}"#).unwrap();
        assert_eq!(patch.branch_id, Some(None));

        let absent: UserPatch = serde_json::from_str("{}").unwrap();
        assert_eq!(absent.branch_id, None);

        let mut user = UserProfile::new("Ana", "", Role::Student).at_branch("b1");
        patch.apply_to(&mut user);
        assert_eq!(user.branch_id, None);

        let encoded = serde_json::to_value(&patch).unwrap();
        assert_eq!(encoded, serde_json::json!({"branchId": null}));
    }

    #[test]
    fn test_missing_role_defaults_to_student() {
        let user: UserProfile = serde_json::from_str(r#"{"name": "Ana"}"#).unwrap();
        assert_eq!(user.role, Role::Student);
        assert_eq!(user.attendance.classes_attended, 0);
    }
}
