use super::GymAccess;
use crate::consistency::{BranchIndex, DanglingReference, ReferrerKind};
use crate::entities::{to_document, UserPatch, UserProfile};
use crate::error::{AccessError, AccessResult};
use crate::roles::{Role, Session};
use crate::store::USERS;
use chrono::Utc;

fn home_branch<'a>(index: &'a BranchIndex, user: &UserProfile) -> Option<&'a str> {
    user.branch_id.as_deref().and_then(|r| index.canonical_id(r))
}

/// Admin sees all, a professor sees their branches' members, everyone sees themselves.
fn can_see(session: &Session, index: &BranchIndex, user: &UserProfile) -> bool {
    session.is_admin()
        || session.is_user(&user.id)
        || (session.role == Role::Professor
            && home_branch(index, user).map_or(false, |b| session.has_branch(b)))
}

fn normalize_branch(index: &BranchIndex, user: &UserProfile, reference: &str) -> AccessResult<String> {
    index
        .canonical_id(reference)
        .map(str::to_string)
        .ok_or_else(|| {
            AccessError::DanglingReference(vec![DanglingReference {
                kind: ReferrerKind::User,
                referrer_id: user.id.clone(),
                referrer_name: user.name.clone(),
                reference: reference.to_string(),
            }])
        })
}

impl GymAccess {
    pub fn list_users(&self, session: &Session) -> AccessResult<Vec<UserProfile>> {
        let users: Vec<UserProfile> = self.load_all(USERS, Some("name"))?;
        if session.is_admin() {
            return Ok(users);
        }

        let index = self.branch_index()?;
        Ok(users
            .into_iter()
            .filter(|u| can_see(session, &index, u))
            .collect())
    }

    /// `Ok(None)` when absent or not visible to the session.
    pub fn get_user(&self, session: &Session, id: &str) -> AccessResult<Option<UserProfile>> {
        let Some(user) = self.load::<UserProfile>(USERS, id)? else {
            return Ok(None);
        };
        let index = self.branch_index()?;
        Ok(can_see(session, &index, &user).then_some(user))
    }

    pub fn create_user(&self, session: &Session, mut user: UserProfile) -> AccessResult<UserProfile> {
        if !session.is_admin() {
            return Err(session.denied("manage users"));
        }
        user.validate()?;

        if let Some(reference) = user.branch_id.clone() {
            let index = self.branch_index()?;
            user.branch_id = Some(normalize_branch(&index, &user, &reference)?);
        }

        user.id = self.store().create(USERS, to_document(&user)?)?;

        tracing::info!(user = %user.id, role = %user.role, actor = %session.actor(), "user created");
        self.record(
            session,
            "user_created",
            "user",
            &user.id,
            serde_json::json!({ "name": user.name, "role": user.role, "branchId": user.branch_id }),
        );

        Ok(user)
    }

    /// Admins may change anything. Other callers may only edit the contact
    /// details of their own profile.
    pub fn update_user(&self, session: &Session, id: &str, mut patch: UserPatch) -> AccessResult<UserProfile> {
        let allowed = session.is_admin() || (session.is_user(id) && patch.is_self_service());
        if !allowed {
            return Err(session.denied("update this profile"));
        }

        let mut user: UserProfile = self
            .load(USERS, id)?
            .ok_or_else(|| AccessError::not_found("user", id))?;

        if let Some(Some(reference)) = &patch.branch_id {
            let index = self.branch_index()?;
            patch.branch_id = Some(Some(normalize_branch(&index, &user, reference)?));
        }

        patch.apply_to(&mut user);
        user.validate()?;

        if !self.store().update(USERS, id, to_document(&patch)?)? {
            return Err(AccessError::not_found("user", id));
        }

        tracing::info!(user = %id, actor = %session.actor(), "user updated");
        self.record(
            session,
            "user_updated",
            "user",
            id,
            serde_json::json!({ "patch": patch }),
        );

        Ok(user)
    }

    pub fn delete_user(&self, session: &Session, id: &str) -> AccessResult<UserProfile> {
        if !session.is_admin() {
            return Err(session.denied("manage users"));
        }

        let user: UserProfile = self
            .load(USERS, id)?
            .ok_or_else(|| AccessError::not_found("user", id))?;

        if !self.store().delete(USERS, id)? {
            return Err(AccessError::not_found("user", id));
        }

        tracing::info!(user = %id, actor = %session.actor(), "user deleted");
        self.record(session, "user_deleted", "user", id, serde_json::json!({ "name": user.name }));

        Ok(user)
    }

    /// Count one class attended. Allowed for the user themself, a professor of
    /// the user's branch, or an admin. Concurrent check-ins are
    /// last-writer-wins on the counter.
    pub fn record_check_in(&self, session: &Session, user_id: &str) -> AccessResult<UserProfile> {
        let mut user: UserProfile = self
            .load(USERS, user_id)?
            .ok_or_else(|| AccessError::not_found("user", user_id))?;

        let allowed = session.is_admin()
            || session.is_user(user_id)
            || (session.role == Role::Professor && {
                let index = self.branch_index()?;
                home_branch(&index, &user).map_or(false, |b| session.has_branch(b))
            });
        if !allowed {
            return Err(session.denied("check in this student"));
        }

        user.record_check_in(Utc::now());

        let mut patch = crate::store::Document::new();
        patch.insert(
            "attendance".to_string(),
            serde_json::to_value(&user.attendance)
                .map_err(|e| AccessError::Fetch(format!("could not encode attendance: {}", e)))?,
        );
        if !self.store().update(USERS, user_id, patch)? {
            return Err(AccessError::not_found("user", user_id));
        }

        tracing::info!(
            user = %user_id,
            classes = user.attendance.classes_attended,
            actor = %session.actor(),
            "check-in recorded"
        );
        self.record(
            session,
            "check_in",
            "user",
            user_id,
            serde_json::json!({ "classesAttended": user.attendance.classes_attended }),
        );

        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use crate::access::GymAccess;
    use crate::entities::{Belt, Branch, UserPatch, UserProfile};
    use crate::error::AccessError;
    use crate::roles::{Role, Session};
    use crate::store::MemoryStore;
    use std::sync::Arc;

    fn setup() -> (GymAccess, Branch, Branch) {
        let access = GymAccess::new(Arc::new(MemoryStore::new()));
        let admin = Session::admin();
        let centro = access
            .create_branch(&admin, Branch::new("Centro", "", "", "", ""))
            .unwrap();
        let sul = access
            .create_branch(&admin, Branch::new("Sul", "", "", "", ""))
            .unwrap();
        (access, centro, sul)
    }

    #[test]
    fn test_create_user_checks_branch() {
        let (access, centro, _) = setup();
        let admin = Session::admin();

        let user = access
            .create_user(&admin, UserProfile::new("Ana", "ana@mail.com", Role::Student).at_branch("Centro"))
            .unwrap();
        assert_eq!(user.branch_id.as_deref(), Some(centro.id.as_str()));

        let err = access
            .create_user(&admin, UserProfile::new("Bia", "", Role::Student).at_branch("Norte"))
            .unwrap_err();
        assert!(matches!(err, AccessError::DanglingReference(_)));
    }

    #[test]
    fn test_visibility_by_role() {
        let (access, centro, sul) = setup();
        let admin = Session::admin();
        let ana = access
            .create_user(&admin, UserProfile::new("Ana", "", Role::Student).at_branch(&centro.id))
            .unwrap();
        let bia = access
            .create_user(&admin, UserProfile::new("Bia", "", Role::Student).at_branch(&sul.id))
            .unwrap();

        assert_eq!(access.list_users(&admin).unwrap().len(), 2);

        let professor = Session::new(Role::Professor).with_branches([centro.id.as_str()]);
        let seen: Vec<String> = access
            .list_users(&professor)
            .unwrap()
            .into_iter()
            .map(|u| u.name)
            .collect();
        assert_eq!(seen, vec!["Ana"]);

        let as_ana = Session::new(Role::Student).with_user(ana.id.as_str());
        assert!(access.get_user(&as_ana, &ana.id).unwrap().is_some());
        assert!(access.get_user(&as_ana, &bia.id).unwrap().is_none());
    }

    #[test]
    fn test_self_service_updates_only() {
        let (access, _, _) = setup();
        let ana = access
            .create_user(&Session::admin(), UserProfile::new("Ana", "", Role::Student))
            .unwrap();
        let as_ana = Session::new(Role::Student).with_user(ana.id.as_str());

        let contact = UserPatch {
            phone: Some("11988887777".into()),
            ..Default::default()
        };
        let updated = access.update_user(&as_ana, &ana.id, contact).unwrap();
        assert_eq!(updated.phone, "11988887777");

        let promotion = UserPatch {
            role: Some(Role::Admin),
            ..Default::default()
        };
        assert!(matches!(
            access.update_user(&as_ana, &ana.id, promotion),
            Err(AccessError::PermissionDenied { .. })
        ));

        let fetched = access.get_user(&Session::admin(), &ana.id).unwrap().unwrap();
        assert_eq!(fetched.role, Role::Student);
    }

    #[test]
    fn test_check_in_permissions() {
        let (access, centro, sul) = setup();
        let ana = access
            .create_user(&Session::admin(), UserProfile::new("Ana", "", Role::Student).at_branch(&centro.id))
            .unwrap();

        let own = Session::new(Role::Student).with_user(ana.id.as_str());
        assert_eq!(
            access.record_check_in(&own, &ana.id).unwrap().attendance.classes_attended,
            1
        );

        let local_prof = Session::new(Role::Professor).with_branches([centro.id.as_str()]);
        assert_eq!(
            access.record_check_in(&local_prof, &ana.id).unwrap().attendance.classes_attended,
            2
        );

        let other_prof = Session::new(Role::Professor).with_branches([sul.id.as_str()]);
        assert!(matches!(
            access.record_check_in(&other_prof, &ana.id),
            Err(AccessError::PermissionDenied { .. })
        ));

        let stranger = Session::new(Role::Student).with_user("someone-else");
        assert!(access.record_check_in(&stranger, &ana.id).is_err());

        let stored = access.get_user(&Session::admin(), &ana.id).unwrap().unwrap();
        assert_eq!(stored.attendance.classes_attended, 2);
        assert!(stored.attendance.last_check_in.is_some());
    }

    #[test]
    fn test_only_admin_deletes_users() {
        let (access, _, _) = setup();
        let ana = access
            .create_user(&Session::admin(), UserProfile::new("Ana", "", Role::Student))
            .unwrap();

        assert!(access
            .delete_user(&Session::new(Role::Professor), &ana.id)
            .is_err());
        access.delete_user(&Session::admin(), &ana.id).unwrap();
        assert!(access.get_user(&Session::admin(), &ana.id).unwrap().is_none());
    }

    #[test]
    fn test_black_belt_stripes_validated_on_write() {
        let (access, _, _) = setup();
        let admin = Session::admin();

        let mut over = UserProfile::new("Prof. A", "a@kings.com", Role::Professor);
        over.belt = Some(Belt::Preta);
        over.stripes = 9;
        let err = access.create_user(&admin, over).unwrap_err();
        assert!(matches!(err, AccessError::Invalid(_)));
        assert!(access.list_users(&admin).unwrap().is_empty());

        let mut prof = UserProfile::new("Prof. A", "a@kings.com", Role::Professor);
        prof.belt = Some(Belt::Preta);
        prof.stripes = 3;
        let prof = access.create_user(&admin, prof).unwrap();

        let patch = UserPatch {
            stripes: Some(7),
            ..Default::default()
        };
        let err = access.update_user(&admin, &prof.id, patch).unwrap_err();
        assert!(matches!(err, AccessError::Invalid(_)));

        let stored = access.get_user(&admin, &prof.id).unwrap().unwrap();
        assert_eq!(stored.stripes, 3);
    }
}
