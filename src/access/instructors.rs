use super::GymAccess;
use crate::consistency::{refers_to, BranchIndex, DanglingReference, ReferrerKind};
use crate::entities::{to_document, Instructor, InstructorPatch, InstructorProfile};
use crate::error::{AccessError, AccessResult};
use crate::roles::{Capability, Session};
use crate::store::INSTRUCTORS;

/// Admins see everyone; other roles only instructors sharing one of their branches.
fn can_see(session: &Session, index: &BranchIndex, instructor: &Instructor) -> bool {
    session.capabilities.can_view_all_instructors
        || instructor
            .affiliations
            .iter()
            .filter_map(|r| index.canonical_id(r))
            .any(|id| session.has_branch(id))
}

fn profile(index: &BranchIndex, instructor: Instructor) -> InstructorProfile {
    let affiliation_names = instructor
        .affiliations
        .iter()
        .filter_map(|r| index.name_of(r))
        .map(str::to_string)
        .collect();

    InstructorProfile {
        belt_label: instructor.belt_label(),
        affiliation_names,
        instructor,
    }
}

/// Affiliations as branch ids, or the references that resolve to nothing.
fn normalize_affiliations(
    index: &BranchIndex,
    instructor: &Instructor,
    affiliations: &[String],
) -> AccessResult<Vec<String>> {
    index.normalize(affiliations).map_err(|unresolved| {
        AccessError::DanglingReference(
            unresolved
                .into_iter()
                .map(|reference| DanglingReference {
                    kind: ReferrerKind::Instructor,
                    referrer_id: instructor.id.clone(),
                    referrer_name: instructor.name.clone(),
                    reference,
                })
                .collect(),
        )
    })
}

impl GymAccess {
    /// Instructors visible to the session, ordered by name.
    pub fn list_instructors(&self, session: &Session) -> AccessResult<Vec<Instructor>> {
        let instructors: Vec<Instructor> = self.load_all(INSTRUCTORS, Some("name"))?;
        if session.capabilities.can_view_all_instructors {
            return Ok(instructors);
        }

        let index = self.branch_index()?;
        Ok(instructors
            .into_iter()
            .filter(|i| can_see(session, &index, i))
            .collect())
    }

    /// `Ok(None)` when absent or not visible to the session.
    pub fn get_instructor(&self, session: &Session, id: &str) -> AccessResult<Option<Instructor>> {
        let Some(instructor) = self.load::<Instructor>(INSTRUCTORS, id)? else {
            return Ok(None);
        };
        if session.capabilities.can_view_all_instructors {
            return Ok(Some(instructor));
        }

        let index = self.branch_index()?;
        Ok(can_see(session, &index, &instructor).then_some(instructor))
    }

    /// Instructor with affiliation names joined from the current branches.
    pub fn instructor_profile(&self, session: &Session, id: &str) -> AccessResult<Option<InstructorProfile>> {
        let Some(instructor) = self.get_instructor(session, id)? else {
            return Ok(None);
        };
        let index = self.branch_index()?;
        Ok(Some(profile(&index, instructor)))
    }

    pub fn list_instructor_profiles(&self, session: &Session) -> AccessResult<Vec<InstructorProfile>> {
        let instructors = self.list_instructors(session)?;
        let index = self.branch_index()?;
        Ok(instructors
            .into_iter()
            .map(|i| profile(&index, i))
            .collect())
    }

    /// Visible instructors teaching at one branch.
    pub fn instructors_for_branch(&self, session: &Session, branch_id: &str) -> AccessResult<Vec<Instructor>> {
        let Some(branch) = self.get_branch(session, branch_id)? else {
            return Ok(Vec::new());
        };

        Ok(self
            .list_instructors(session)?
            .into_iter()
            .filter(|i| i.affiliations.iter().any(|r| refers_to(r, &branch)))
            .collect())
    }

    pub fn create_instructor(&self, session: &Session, mut instructor: Instructor) -> AccessResult<Instructor> {
        session.require(Capability::ManageInstructors)?;
        instructor.validate()?;

        let index = self.branch_index()?;
        instructor.affiliations = normalize_affiliations(&index, &instructor, &instructor.affiliations)?;

        instructor.id = self.store().create(INSTRUCTORS, to_document(&instructor)?)?;

        tracing::info!(
            instructor = %instructor.id,
            name = %instructor.name,
            branches = instructor.affiliations.len(),
            actor = %session.actor(),
            "instructor created"
        );
        self.record(
            session,
            "instructor_created",
            "instructor",
            &instructor.id,
            serde_json::json!({ "name": instructor.name, "affiliations": instructor.affiliations }),
        );

        Ok(instructor)
    }

    pub fn update_instructor(
        &self,
        session: &Session,
        id: &str,
        mut patch: InstructorPatch,
    ) -> AccessResult<Instructor> {
        session.require(Capability::ManageInstructors)?;

        let mut instructor: Instructor = self
            .load(INSTRUCTORS, id)?
            .ok_or_else(|| AccessError::not_found("instructor", id))?;

        if let Some(affiliations) = &patch.affiliations {
            let index = self.branch_index()?;
            patch.affiliations = Some(normalize_affiliations(&index, &instructor, affiliations)?);
        }

        patch.apply_to(&mut instructor);
        instructor.validate()?;

        if !self.store().update(INSTRUCTORS, id, to_document(&patch)?)? {
            return Err(AccessError::not_found("instructor", id));
        }

        tracing::info!(instructor = %id, actor = %session.actor(), "instructor updated");
        self.record(
            session,
            "instructor_updated",
            "instructor",
            id,
            serde_json::json!({ "patch": patch }),
        );

        Ok(instructor)
    }

    pub fn delete_instructor(&self, session: &Session, id: &str) -> AccessResult<Instructor> {
        session.require(Capability::ManageInstructors)?;

        let instructor: Instructor = self
            .load(INSTRUCTORS, id)?
            .ok_or_else(|| AccessError::not_found("instructor", id))?;

        if !self.store().delete(INSTRUCTORS, id)? {
            return Err(AccessError::not_found("instructor", id));
        }

        tracing::info!(instructor = %id, actor = %session.actor(), "instructor deleted");
        self.record(
            session,
            "instructor_deleted",
            "instructor",
            id,
            serde_json::json!({ "name": instructor.name }),
        );

        // Branch staff lists hold display names, not ids. Report only.
        match self.list_branches(session) {
            Ok(branches) => {
                for branch in branches {
                    if branch.staff().contains(&instructor.name.as_str()) {
                        tracing::warn!(
                            branch = %branch.id,
                            instructor = %instructor.name,
                            "deleted instructor still listed as branch staff"
                        );
                    }
                }
            }
            Err(e) => {
                tracing::warn!(instructor = %id, error = %e, "could not check branch staff lists");
            }
        }

        Ok(instructor)
    }
}

#[cfg(test)]
mod tests {
    use crate::access::GymAccess;
    use crate::entities::{Belt, Branch, Instructor, InstructorPatch};
    use crate::error::AccessError;
    use crate::roles::{Role, Session};
    use crate::store::{BrokenListStore, MemoryStore, BRANCHES};
    use std::sync::Arc;

    fn setup() -> (GymAccess, Branch, Branch) {
        let access = GymAccess::new(Arc::new(MemoryStore::new()));
        let admin = Session::admin();
        let centro = access
            .create_branch(&admin, Branch::new("Kings BJJ - Centro", "", "", "", ""))
            .unwrap();
        let sul = access
            .create_branch(&admin, Branch::new("Kings BJJ - Sul", "", "", "", ""))
            .unwrap();
        (access, centro, sul)
    }

    #[test]
    fn test_create_normalizes_names_to_ids() {
        let (access, centro, _) = setup();
        let created = access
            .create_instructor(
                &Session::admin(),
                Instructor::new("Prof. A", "a@kings.com", Belt::Preta, 3)
                    .with_affiliations(["Kings BJJ - Centro", centro.id.as_str()]),
            )
            .unwrap();

        assert_eq!(created.affiliations, vec![centro.id.clone()]);
    }

    #[test]
    fn test_create_rejects_unknown_branch() {
        let (access, _, _) = setup();
        let err = access
            .create_instructor(
                &Session::admin(),
                Instructor::new("Prof. A", "", Belt::Preta, 3).with_affiliations(["Kings BJJ - Norte"]),
            )
            .unwrap_err();

        match err {
            AccessError::DanglingReference(refs) => {
                assert_eq!(refs.len(), 1);
                assert_eq!(refs[0].reference, "Kings BJJ - Norte");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(access.list_instructors(&Session::admin()).unwrap().is_empty());
    }

    #[test]
    fn test_professor_cannot_manage_instructors() {
        let (access, _, _) = setup();
        let err = access
            .create_instructor(&Session::new(Role::Professor), Instructor::new("X", "", Belt::Azul, 0))
            .unwrap_err();
        assert!(matches!(err, AccessError::PermissionDenied { .. }));
    }

    #[test]
    fn test_visibility_is_scoped_by_branch() {
        let (access, centro, sul) = setup();
        let admin = Session::admin();
        let a = access
            .create_instructor(
                &admin,
                Instructor::new("Prof. A", "", Belt::Preta, 1).with_affiliations([centro.id.as_str()]),
            )
            .unwrap();
        access
            .create_instructor(
                &admin,
                Instructor::new("Prof. B", "", Belt::Marrom, 0).with_affiliations([sul.id.as_str()]),
            )
            .unwrap();

        assert_eq!(access.list_instructors(&admin).unwrap().len(), 2);

        let student = Session::new(Role::Student).with_branches([centro.id.as_str()]);
        let visible = access.list_instructors(&student).unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].name, "Prof. A");

        let outsider = Session::new(Role::Student);
        assert!(access.list_instructors(&outsider).unwrap().is_empty());
        assert!(access.get_instructor(&outsider, &a.id).unwrap().is_none());
        assert!(access.get_instructor(&student, &a.id).unwrap().is_some());
    }

    #[test]
    fn test_profile_joins_branch_names() {
        let (access, centro, sul) = setup();
        let admin = Session::admin();
        let created = access
            .create_instructor(
                &admin,
                Instructor::new("Prof. A", "", Belt::Azul, 3)
                    .with_affiliations([sul.id.as_str(), centro.id.as_str()]),
            )
            .unwrap();

        let profile = access.instructor_profile(&admin, &created.id).unwrap().unwrap();
        assert_eq!(profile.affiliation_names, vec!["Kings BJJ - Sul", "Kings BJJ - Centro"]);
        assert_eq!(profile.belt_label, "Faixa Azul");
    }

    #[test]
    fn test_update_validates_merged_record() {
        let (access, _, _) = setup();
        let admin = Session::admin();
        let created = access
            .create_instructor(&admin, Instructor::new("Prof. A", "", Belt::Preta, 5))
            .unwrap();

        let patch = InstructorPatch {
            stripes: Some(7),
            ..Default::default()
        };
        let err = access.update_instructor(&admin, &created.id, patch).unwrap_err();
        assert!(matches!(err, AccessError::Invalid(_)));

        let fetched = access.get_instructor(&admin, &created.id).unwrap().unwrap();
        assert_eq!(fetched.stripes, 5);
    }

    #[test]
    fn test_instructors_for_branch() {
        let (access, centro, sul) = setup();
        let admin = Session::admin();
        access
            .create_instructor(
                &admin,
                Instructor::new("Prof. A", "", Belt::Preta, 1).with_affiliations([centro.id.as_str()]),
            )
            .unwrap();

        assert_eq!(access.instructors_for_branch(&admin, &centro.id).unwrap().len(), 1);
        assert!(access.instructors_for_branch(&admin, &sul.id).unwrap().is_empty());
        assert!(access.instructors_for_branch(&admin, "missing").unwrap().is_empty());
    }

    #[test]
    fn test_delete_instructor() {
        let (access, _, _) = setup();
        let admin = Session::admin();
        let created = access
            .create_instructor(&admin, Instructor::new("Prof. A", "", Belt::Preta, 1))
            .unwrap();

        access.delete_instructor(&admin, &created.id).unwrap();
        assert!(access.get_instructor(&admin, &created.id).unwrap().is_none());
        assert!(matches!(
            access.delete_instructor(&admin, &created.id),
            Err(AccessError::NotFound { .. })
        ));
    }

    #[test]
    fn test_delete_survives_failing_staff_scan() {
        let store = Arc::new(BrokenListStore::new());
        let access = GymAccess::new(store.clone());
        let admin = Session::admin();
        let instructor = access
            .create_instructor(&admin, Instructor::new("Prof. A", "a@kings.com", Belt::Preta, 1))
            .unwrap();
        let before = access.revision();

        store.break_list(Some(BRANCHES));
        let deleted = access.delete_instructor(&admin, &instructor.id).unwrap();
        assert_eq!(deleted.id, instructor.id);
        assert_eq!(access.revision(), before + 1);

        store.break_list(None);
        assert!(access.get_instructor(&admin, &instructor.id).unwrap().is_none());
        let history = access.history(&admin, "instructor", &instructor.id).unwrap();
        assert_eq!(history[0].event_type, "instructor_deleted");
    }

    #[test]
    fn test_update_event_carries_patch() {
        let (access, _, _) = setup();
        let admin = Session::admin();
        let instructor = access
            .create_instructor(&admin, Instructor::new("Prof. A", "a@kings.com", Belt::Preta, 1))
            .unwrap();

        let patch = InstructorPatch {
            stripes: Some(2),
            ..Default::default()
        };
        access.update_instructor(&admin, &instructor.id, patch).unwrap();

        let history = access.history(&admin, "instructor", &instructor.id).unwrap();
        assert_eq!(history[0].event_type, "instructor_updated");
        assert_eq!(history[0].data["patch"]["stripes"], 2);
    }
}
