// 📜 Terms Acceptance - parental consent record for a minor's enrollment
//
// Append-only: created once, never updated or deleted. The digest lets an
// auditor detect a record edited behind the access layer's back.

use super::is_blank;
use crate::error::{ValidationError, ValidationResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// What the enrollment form submits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TermsRequest {
    pub parent_name: String,
    pub child_name: String,
    pub branch_id: String,
}

impl TermsRequest {
    pub fn new(parent_name: &str, child_name: &str, branch_id: &str) -> Self {
        TermsRequest {
            parent_name: parent_name.to_string(),
            child_name: child_name.to_string(),
            branch_id: branch_id.to_string(),
        }
    }

    pub fn validate(&self) -> ValidationResult {
        let mut errors = Vec::new();

        if is_blank(&self.parent_name) {
            errors.push(ValidationError::new("parentName", "Required field is empty"));
        }
        if is_blank(&self.child_name) {
            errors.push(ValidationError::new("childName", "Required field is empty"));
        }
        if is_blank(&self.branch_id) {
            errors.push(ValidationError::new("branchId", "Required field is empty"));
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
pub struct TermsAcceptance {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub parent_name: String,
    pub child_name: String,
    pub branch_id: String,
    /// Branch name as it was at acceptance time.
    pub branch_name: String,
    pub accepted_at: DateTime<Utc>,
    pub digest: String,
}

impl TermsAcceptance {
    /// Stamp a request with the branch snapshot and server time.
    pub fn stamp(request: TermsRequest, branch_name: &str, accepted_at: DateTime<Utc>) -> Self {
        let mut record = TermsAcceptance {
            id: String::new(),
            parent_name: request.parent_name.trim().to_string(),
            child_name: request.child_name.trim().to_string(),
            branch_id: request.branch_id,
            branch_name: branch_name.to_string(),
            accepted_at,
            digest: String::new(),
        };
        record.digest = record.compute_digest();
        record
    }

    pub fn compute_digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(format!(
            "{}|{}|{}|{}|{}",
            self.parent_name,
            self.child_name,
            self.branch_id,
            self.branch_name,
            self.accepted_at.to_rfc3339()
        ));
        format!("{:x}", hasher.finalize())
    }

    pub fn verify_digest(&self) -> bool {
        self.digest == self.compute_digest()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stamp_sets_digest() {
        let record = TermsAcceptance::stamp(
            TermsRequest::new(" Maria ", "João", "b1"),
            "Kings BJJ - Centro",
            Utc::now(),
        );

        assert_eq!(record.parent_name, "Maria");
        assert_eq!(record.digest.len(), 64, "SHA-256 hash should be 64 hex characters");
        assert!(record.verify_digest());
    }

    #[test]
    fn test_tampering_breaks_digest() {
        let mut record = TermsAcceptance::stamp(
            TermsRequest::new("Maria", "João", "b1"),
            "Kings BJJ - Centro",
            Utc::now(),
        );
        record.child_name = "Pedro".to_string();
        assert!(!record.verify_digest());
    }

    #[test]
    fn test_digest_survives_serialization() {
        let record = TermsAcceptance::stamp(
            TermsRequest::new("Maria", "João", "b1"),
            "Kings BJJ - Centro",
            Utc::now(),
        );
        let json = serde_json::to_string(&record).unwrap();
        let back: TermsAcceptance = serde_json::from_str(&json).unwrap();
        assert!(back.verify_digest());
    }

    #[test]
    fn test_request_requires_all_fields() {
        let errors = TermsRequest::new("", " ", "").validate().unwrap_err();
        assert_eq!(errors.len(), 3);
    }
}
