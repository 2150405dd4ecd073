// 📣 Announcement - notice posted by staff, global or for one branch

use super::is_blank;
use crate::error::{ValidationError, ValidationResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnouncementDraft {
    pub title: String,
    pub body: String,
    /// `None` posts to every branch.
    #[serde(default)]
    pub branch_id: Option<String>,
}

impl AnnouncementDraft {
    pub fn new(title: &str, body: &str, branch_id: Option<&str>) -> Self {
        AnnouncementDraft {
            title: title.to_string(),
            body: body.to_string(),
            branch_id: branch_id.map(str::to_string),
        }
    }

    pub fn validate(&self) -> ValidationResult {
        let mut errors = Vec::new();
        if is_blank(&self.title) {
            errors.push(ValidationError::new("title", "Required field is empty"));
        }
        if is_blank(&self.body) {
            errors.push(ValidationError::new("body", "Required field is empty"));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Announcement {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub title: String,
    pub body: String,
    pub author: String,
    #[serde(default)]
    pub branch_id: Option<String>,
    pub posted_at: DateTime<Utc>,
}

impl Announcement {
    pub fn from_draft(draft: AnnouncementDraft, author: &str, posted_at: DateTime<Utc>) -> Self {
        Announcement {
            id: String::new(),
            title: draft.title,
            body: draft.body,
            author: author.to_string(),
            branch_id: draft.branch_id,
            posted_at,
        }
    }

    pub fn is_global(&self) -> bool {
        self.branch_id.is_none()
    }
}
