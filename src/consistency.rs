// 🔗 Consistency Rules - keep branch references usable
//
// Instructors and users point at branches by id. Records written before ids
// were used may still hold a branch *name*; those legacy references keep
// resolving (id first, then exact name) until a rename or a migration rewrites
// them to ids.
//
// Deleting a referenced branch is governed by `DeletePolicy`.

use crate::access::GymAccess;
use crate::entities::{to_document, Branch, Instructor, InstructorPatch, UserPatch, UserProfile};
use crate::error::AccessResult;
use crate::roles::Session;
use crate::store::{INSTRUCTORS, USERS};
use serde::Serialize;
use std::str::FromStr;

// ============================================================================
// DELETE POLICY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeletePolicy {
    /// Refuse to delete a branch that is still referenced.
    #[default]
    Reject,
    /// Drop the references first, then delete.
    Cascade,
}

impl FromStr for DeletePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "reject" => Ok(DeletePolicy::Reject),
            "cascade" => Ok(DeletePolicy::Cascade),
            other => Err(format!("unknown delete policy {:?} (expected reject or cascade)", other)),
        }
    }
}

impl std::fmt::Display for DeletePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeletePolicy::Reject => f.write_str("reject"),
            DeletePolicy::Cascade => f.write_str("cascade"),
        }
    }
}

// ============================================================================
// DANGLING REFERENCE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferrerKind {
    Instructor,
    User,
}

impl ReferrerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferrerKind::Instructor => "instructor",
            ReferrerKind::User => "user",
        }
    }
}

/// A record whose branch reference does not (or would no longer) resolve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DanglingReference {
    pub kind: ReferrerKind,
    pub referrer_id: String,
    pub referrer_name: String,
    pub reference: String,
}

impl std::fmt::Display for DanglingReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {:?} ({}) -> {:?}",
            self.kind.as_str(),
            self.referrer_name,
            self.referrer_id,
            self.reference
        )
    }
}

// ============================================================================
// BRANCH INDEX
// ============================================================================

/// Snapshot of all branches for resolving references at read time.
#[derive(Debug, Clone, Default)]
pub struct BranchIndex {
    branches: Vec<Branch>,
}

impl BranchIndex {
    pub fn new(branches: Vec<Branch>) -> Self {
        BranchIndex { branches }
    }

    pub fn resolve(&self, reference: &str) -> Option<&Branch> {
        self.branches
            .iter()
            .find(|b| b.id == reference)
            .or_else(|| self.branches.iter().find(|b| b.name == reference))
    }

    pub fn canonical_id(&self, reference: &str) -> Option<&str> {
        self.resolve(reference).map(|b| b.id.as_str())
    }

    pub fn name_of(&self, reference: &str) -> Option<&str> {
        self.resolve(reference).map(|b| b.name.as_str())
    }

    pub fn is_legacy(&self, reference: &str) -> bool {
        !self.branches.iter().any(|b| b.id == reference) && self.resolve(reference).is_some()
    }

    /// Map every reference to a branch id, dropping duplicates. On failure,
    /// returns the references that did not resolve.
    pub fn normalize(&self, references: &[String]) -> Result<Vec<String>, Vec<String>> {
        let mut ids: Vec<String> = Vec::new();
        let mut unresolved = Vec::new();

        for reference in references {
            match self.canonical_id(reference) {
                Some(id) => {
                    if !ids.iter().any(|known| known == id) {
                        ids.push(id.to_string());
                    }
                }
                None => unresolved.push(reference.clone()),
            }
        }

        if unresolved.is_empty() {
            Ok(ids)
        } else {
            Err(unresolved)
        }
    }
}

/// Does this reference point at `branch`, by id or by legacy name?
pub fn refers_to(reference: &str, branch: &Branch) -> bool {
    reference == branch.id || reference == branch.name
}

/// Records that would be left dangling if `branch` disappeared.
pub fn find_referrers(
    branch: &Branch,
    instructors: &[Instructor],
    users: &[UserProfile],
) -> Vec<DanglingReference> {
    let mut found = Vec::new();

    for instructor in instructors {
        for reference in instructor.affiliations.iter().filter(|r| refers_to(r, branch)) {
            found.push(DanglingReference {
                kind: ReferrerKind::Instructor,
                referrer_id: instructor.id.clone(),
                referrer_name: instructor.name.clone(),
                reference: reference.clone(),
            });
        }
    }

    for user in users {
        if let Some(reference) = user.branch_id.as_deref().filter(|r| refers_to(r, branch)) {
            found.push(DanglingReference {
                kind: ReferrerKind::User,
                referrer_id: user.id.clone(),
                referrer_name: user.name.clone(),
                reference: reference.to_string(),
            });
        }
    }

    found
}

/// Every reference in the data set that resolves to no branch.
pub fn find_dangling(
    index: &BranchIndex,
    instructors: &[Instructor],
    users: &[UserProfile],
) -> Vec<DanglingReference> {
    let mut found = Vec::new();

    for instructor in instructors {
        for reference in &instructor.affiliations {
            if index.resolve(reference).is_none() {
                found.push(DanglingReference {
                    kind: ReferrerKind::Instructor,
                    referrer_id: instructor.id.clone(),
                    referrer_name: instructor.name.clone(),
                    reference: reference.clone(),
                });
            }
        }
    }

    for user in users {
        if let Some(reference) = &user.branch_id {
            if index.resolve(reference).is_none() {
                found.push(DanglingReference {
                    kind: ReferrerKind::User,
                    referrer_id: user.id.clone(),
                    referrer_name: user.name.clone(),
                    reference: reference.clone(),
                });
            }
        }
    }

    found
}

/// Replace name references to `branch` with its id. `None` when unchanged.
fn rewrite_to_id(references: &[String], branch: &Branch, old_name: &str) -> Option<Vec<String>> {
    if !references.iter().any(|r| r == old_name || r == &branch.name) {
        return None;
    }

    let mut rewritten: Vec<String> = Vec::new();
    for reference in references {
        let id = if reference == old_name || reference == &branch.name {
            branch.id.clone()
        } else {
            reference.clone()
        };
        if !rewritten.contains(&id) {
            rewritten.push(id);
        }
    }
    Some(rewritten)
}

// ============================================================================
// STORE-LEVEL RULES
// ============================================================================

impl GymAccess {
    pub fn branch_index(&self) -> AccessResult<BranchIndex> {
        Ok(BranchIndex::new(self.load_all(crate::store::BRANCHES, Some("name"))?))
    }

    pub(crate) fn referrers_of(&self, branch: &Branch) -> AccessResult<Vec<DanglingReference>> {
        let instructors: Vec<Instructor> = self.load_all(INSTRUCTORS, None)?;
        let users: Vec<UserProfile> = self.load_all(USERS, None)?;
        Ok(find_referrers(branch, &instructors, &users))
    }

    /// After a rename, id references already follow the branch. Legacy
    /// references holding the old name are rewritten to the id here.
    /// Returns how many records changed.
    pub(crate) fn propagate_rename(
        &self,
        session: &Session,
        branch: &Branch,
        old_name: &str,
    ) -> AccessResult<usize> {
        let mut changed = 0;

        let instructors: Vec<Instructor> = self.load_all(INSTRUCTORS, None)?;
        for instructor in instructors {
            if let Some(affiliations) = rewrite_to_id(&instructor.affiliations, branch, old_name) {
                let patch = InstructorPatch {
                    affiliations: Some(affiliations),
                    ..Default::default()
                };
                self.store().update(INSTRUCTORS, &instructor.id, to_document(&patch)?)?;
                changed += 1;
            }
        }

        let users: Vec<UserProfile> = self.load_all(USERS, None)?;
        for user in users {
            let legacy = user
                .branch_id
                .as_deref()
                .map_or(false, |r| r == old_name || r == branch.name);
            if legacy {
                let patch = UserPatch {
                    branch_id: Some(Some(branch.id.clone())),
                    ..Default::default()
                };
                self.store().update(USERS, &user.id, to_document(&patch)?)?;
                changed += 1;
            }
        }

        if changed > 0 {
            tracing::info!(
                branch = %branch.id,
                old_name,
                new_name = %branch.name,
                changed,
                actor = %session.actor(),
                "rewrote legacy branch references after rename"
            );
        }

        Ok(changed)
    }

    /// Remove every reference in `referrers` to `branch`.
    pub(crate) fn cascade_clear(
        &self,
        session: &Session,
        branch: &Branch,
        referrers: &[DanglingReference],
    ) -> AccessResult<()> {
        for referrer in referrers {
            match referrer.kind {
                ReferrerKind::Instructor => {
                    let Some(instructor) =
                        self.load::<Instructor>(INSTRUCTORS, &referrer.referrer_id)?
                    else {
                        continue;
                    };
                    let remaining: Vec<String> = instructor
                        .affiliations
                        .into_iter()
                        .filter(|r| !refers_to(r, branch))
                        .collect();
                    let patch = InstructorPatch {
                        affiliations: Some(remaining),
                        ..Default::default()
                    };
                    self.store()
                        .update(INSTRUCTORS, &referrer.referrer_id, to_document(&patch)?)?;
                }
                ReferrerKind::User => {
                    let patch = UserPatch {
                        branch_id: Some(None),
                        ..Default::default()
                    };
                    self.store()
                        .update(USERS, &referrer.referrer_id, to_document(&patch)?)?;
                }
            }

            tracing::warn!(
                branch = %branch.id,
                referrer = %referrer,
                actor = %session.actor(),
                "cleared branch reference before delete"
            );
        }

        Ok(())
    }

    /// Admin report of every reference that resolves to no branch.
    pub fn audit_references(&self, session: &Session) -> AccessResult<Vec<DanglingReference>> {
        if !session.is_admin() {
            return Err(session.denied("audit references"));
        }

        let index = self.branch_index()?;
        let instructors: Vec<Instructor> = self.load_all(INSTRUCTORS, Some("name"))?;
        let users: Vec<UserProfile> = self.load_all(USERS, Some("name"))?;

        let dangling = find_dangling(&index, &instructors, &users);
        for reference in &dangling {
            tracing::warn!(%reference, "dangling branch reference");
        }

        Ok(dangling)
    }

    /// Rewrite every legacy name reference to the branch id it resolves to.
    /// Returns how many records changed.
    pub fn migrate_legacy_references(&self, session: &Session) -> AccessResult<usize> {
        if !session.is_admin() {
            return Err(session.denied("migrate references"));
        }

        let index = self.branch_index()?;
        let mut updated = 0;

        let instructors: Vec<Instructor> = self.load_all(INSTRUCTORS, None)?;
        for instructor in instructors {
            if !instructor.affiliations.iter().any(|r| index.is_legacy(r)) {
                continue;
            }
            // unresolvable entries are left in place for the audit report
            let affiliations: Vec<String> = instructor
                .affiliations
                .iter()
                .map(|r| index.canonical_id(r).unwrap_or(r.as_str()).to_string())
                .fold(Vec::new(), |mut acc, id| {
                    if !acc.contains(&id) {
                        acc.push(id);
                    }
                    acc
                });
            let patch = InstructorPatch {
                affiliations: Some(affiliations),
                ..Default::default()
            };
            self.store().update(INSTRUCTORS, &instructor.id, to_document(&patch)?)?;
            updated += 1;
        }

        let users: Vec<UserProfile> = self.load_all(USERS, None)?;
        for user in users {
            let Some(reference) = user.branch_id.as_deref() else {
                continue;
            };
            if index.is_legacy(reference) {
                let patch = UserPatch {
                    branch_id: Some(index.canonical_id(reference).map(str::to_string)),
                    ..Default::default()
                };
                self.store().update(USERS, &user.id, to_document(&patch)?)?;
                updated += 1;
            }
        }

        if updated > 0 {
            self.record(
                session,
                "references_migrated",
                "branch",
                "*",
                serde_json::json!({ "records": updated }),
            );
        }
        tracing::info!(updated, "migrated legacy branch references");

        Ok(updated)
    }
}

// ============================================================================
// TESTS
// ============================================================================
