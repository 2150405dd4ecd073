use super::GymAccess;
use crate::entities::{to_document, Branch, TermsAcceptance, TermsRequest};
use crate::error::{AccessError, AccessResult, ValidationError};
use crate::roles::Session;
use crate::store::{BRANCHES, TERMS_ACCEPTANCES};
use chrono::Utc;

impl GymAccess {
    /// Record a parent's acceptance for a minor's enrollment. Any session may
    /// submit; the timestamp and branch name snapshot are assigned here.
    /// Records are append-only: there is no update or delete.
    pub fn accept_terms(&self, session: &Session, request: TermsRequest) -> AccessResult<TermsAcceptance> {
        request.validate()?;

        let branch: Branch = self.load(BRANCHES, &request.branch_id)?.ok_or_else(|| {
            AccessError::Invalid(vec![ValidationError::new(
                "branchId",
                format!("Unknown branch {:?}", request.branch_id),
            )])
        })?;

        let mut record = TermsAcceptance::stamp(request, &branch.name, Utc::now());
        record.id = self.store().create(TERMS_ACCEPTANCES, to_document(&record)?)?;

        tracing::info!(
            terms = %record.id,
            branch = %record.branch_id,
            actor = %session.actor(),
            "terms accepted"
        );
        self.record(
            session,
            "terms_accepted",
            "terms-acceptance",
            &record.id,
            serde_json::json!({ "branchId": record.branch_id, "digest": record.digest }),
        );

        Ok(record)
    }

    /// All acceptance records, newest first. Admin only.
    pub fn list_terms(&self, session: &Session) -> AccessResult<Vec<TermsAcceptance>> {
        if !session.is_admin() {
            return Err(session.denied("view terms acceptances"));
        }

        let mut records: Vec<TermsAcceptance> = self.load_all(TERMS_ACCEPTANCES, None)?;
        records.reverse();
        records.sort_by(|a, b| b.accepted_at.cmp(&a.accepted_at));

        for record in records.iter().filter(|r| !r.verify_digest()) {
            tracing::warn!(terms = %record.id, "terms acceptance digest mismatch");
        }

        Ok(records)
    }

    pub fn get_terms(&self, session: &Session, id: &str) -> AccessResult<Option<TermsAcceptance>> {
        if !session.is_admin() {
            return Err(session.denied("view terms acceptances"));
        }
        self.load(TERMS_ACCEPTANCES, id)
    }
}

#[cfg(test)]
mod tests {
    use crate::access::GymAccess;
    use crate::entities::{Branch, BranchPatch, TermsRequest};
    use crate::error::AccessError;
    use crate::roles::{Role, Session};
    use crate::store::MemoryStore;
    use std::sync::Arc;

    #[test]
    fn test_accept_terms_snapshots_branch() {
        let access = GymAccess::new(Arc::new(MemoryStore::new()));
        let admin = Session::admin();
        let centro = access
            .create_branch(&admin, Branch::new("Kings BJJ - Centro", "", "", "", ""))
            .unwrap();

        let record = access
            .accept_terms(&Session::resolve(None), TermsRequest::new("Maria", "João", &centro.id))
            .unwrap();
        assert!(!record.id.is_empty());
        assert_eq!(record.branch_name, "Kings BJJ - Centro");

        // snapshot is not rewritten by a later rename
        access
            .update_branch(&admin, &centro.id, BranchPatch::rename("Kings BJJ - Centro Novo"))
            .unwrap();
        let stored = access.get_terms(&admin, &record.id).unwrap().unwrap();
        assert_eq!(stored.branch_name, "Kings BJJ - Centro");
        assert!(stored.verify_digest());
    }

    #[test]
    fn test_accept_terms_unknown_branch() {
        let access = GymAccess::new(Arc::new(MemoryStore::new()));
        let err = access
            .accept_terms(&Session::resolve(None), TermsRequest::new("Maria", "João", "nope"))
            .unwrap_err();
        assert!(matches!(err, AccessError::Invalid(_)));
    }

    #[test]
    fn test_terms_are_admin_only_to_read() {
        let access = GymAccess::new(Arc::new(MemoryStore::new()));
        for role in [Role::Student, Role::Professor] {
            assert!(matches!(
                access.list_terms(&Session::new(role)),
                Err(AccessError::PermissionDenied { .. })
            ));
        }
        assert!(access.list_terms(&Session::admin()).unwrap().is_empty());
    }
}
