use super::GymAccess;
use crate::consistency::{DanglingReference, DeletePolicy};
use crate::entities::{to_document, Branch, BranchPatch};
use crate::error::{AccessError, AccessResult, ValidationError};
use crate::roles::{Capability, Session};
use crate::store::BRANCHES;
use serde::Serialize;

/// Outcome of a branch delete. `cleared` lists the references a cascade removed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchDeletion {
    pub branch: Branch,
    pub cleared: Vec<DanglingReference>,
}

impl GymAccess {
    /// All branches, ordered by name. Visible to every role.
    pub fn list_branches(&self, _session: &Session) -> AccessResult<Vec<Branch>> {
        self.load_all(BRANCHES, Some("name"))
    }

    /// `Ok(None)` when no branch has that id.
    pub fn get_branch(&self, _session: &Session, id: &str) -> AccessResult<Option<Branch>> {
        self.load(BRANCHES, id)
    }

    pub fn find_branch_by_name(&self, session: &Session, name: &str) -> AccessResult<Option<Branch>> {
        Ok(self
            .list_branches(session)?
            .into_iter()
            .find(|b| b.name == name))
    }

    pub fn create_branch(&self, session: &Session, branch: Branch) -> AccessResult<Branch> {
        session.require(Capability::ManageBranches)?;
        branch.validate()?;
        self.ensure_unique_name(&branch.name, None)?;

        let id = self.store().create(BRANCHES, to_document(&branch)?)?;
        let created = Branch { id, ..branch };

        tracing::info!(branch = %created.id, name = %created.name, actor = %session.actor(), "branch created");
        self.record(
            session,
            "branch_created",
            "branch",
            &created.id,
            serde_json::json!({ "name": created.name }),
        );

        Ok(created)
    }

    /// Partial update. A rename also rewrites legacy name references so no
    /// instructor or user is left pointing at the old name.
    pub fn update_branch(&self, session: &Session, id: &str, patch: BranchPatch) -> AccessResult<Branch> {
        session.require(Capability::ManageBranches)?;

        let mut branch: Branch = self
            .load(BRANCHES, id)?
            .ok_or_else(|| AccessError::not_found("branch", id))?;
        let old_name = branch.name.clone();

        patch.apply_to(&mut branch);
        branch.validate()?;

        let renamed = branch.name != old_name;
        if renamed {
            self.ensure_unique_name(&branch.name, Some(id))?;
        }

        // Legacy name references move to the id first; a failure here leaves
        // the branch untouched and every reference still resolving.
        if renamed {
            self.propagate_rename(session, &branch, &old_name)?;
        }

        if !self.store().update(BRANCHES, id, to_document(&patch)?)? {
            return Err(AccessError::not_found("branch", id));
        }

        tracing::info!(branch = %id, renamed, actor = %session.actor(), "branch updated");
        self.record(
            session,
            if renamed { "branch_renamed" } else { "branch_updated" },
            "branch",
            id,
            serde_json::json!({ "oldName": old_name, "patch": patch }),
        );

        Ok(branch)
    }

    /// Delete a branch. Under `DeletePolicy::Reject` a still-referenced branch
    /// is refused with `DanglingReference`; under `Cascade` the references are
    /// cleared first.
    pub fn delete_branch(&self, session: &Session, id: &str) -> AccessResult<BranchDeletion> {
        session.require(Capability::ManageBranches)?;

        let branch: Branch = self
            .load(BRANCHES, id)?
            .ok_or_else(|| AccessError::not_found("branch", id))?;

        let referrers = self.referrers_of(&branch)?;
        if !referrers.is_empty() {
            match self.delete_policy() {
                DeletePolicy::Reject => {
                    tracing::warn!(
                        branch = %id,
                        referrers = referrers.len(),
                        "refusing to delete referenced branch"
                    );
                    return Err(AccessError::DanglingReference(referrers));
                }
                DeletePolicy::Cascade => self.cascade_clear(session, &branch, &referrers)?,
            }
        }

        if !self.store().delete(BRANCHES, id)? {
            return Err(AccessError::not_found("branch", id));
        }

        tracing::info!(branch = %id, cleared = referrers.len(), actor = %session.actor(), "branch deleted");
        self.record(
            session,
            "branch_deleted",
            "branch",
            id,
            serde_json::json!({ "name": branch.name, "clearedReferences": referrers.len() }),
        );

        Ok(BranchDeletion {
            branch,
            cleared: referrers,
        })
    }

    fn ensure_unique_name(&self, name: &str, except_id: Option<&str>) -> AccessResult<()> {
        let branches: Vec<Branch> = self.load_all(BRANCHES, None)?;
        let taken = branches
            .iter()
            .any(|b| b.name == name && Some(b.id.as_str()) != except_id);

        if taken {
            Err(AccessError::Invalid(vec![ValidationError::new(
                "name",
                format!("A branch named {:?} already exists", name),
            )]))
        } else {
            Ok(())
        }
    }
}
