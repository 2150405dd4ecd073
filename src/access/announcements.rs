use super::GymAccess;
use crate::entities::{to_document, Announcement, AnnouncementDraft, Branch};
use crate::error::{AccessError, AccessResult, ValidationError};
use crate::roles::{Capability, Session};
use crate::store::{ANNOUNCEMENTS, BRANCHES};
use chrono::Utc;

impl GymAccess {
    /// Professors post to their own branches; admins anywhere, including
    /// global announcements (`branch_id: None`).
    pub fn post_announcement(&self, session: &Session, draft: AnnouncementDraft) -> AccessResult<Announcement> {
        session.require(Capability::PostAnnouncements)?;
        draft.validate()?;

        match draft.branch_id.as_deref() {
            Some(branch_id) => {
                if self.load::<Branch>(BRANCHES, branch_id)?.is_none() {
                    return Err(AccessError::Invalid(vec![ValidationError::new(
                        "branchId",
                        format!("Unknown branch {:?}", branch_id),
                    )]));
                }
                if !session.is_admin() && !session.has_branch(branch_id) {
                    return Err(session.denied("post announcements to this branch"));
                }
            }
            None if !session.is_admin() => {
                return Err(session.denied("post global announcements"));
            }
            None => {}
        }

        let mut announcement = Announcement::from_draft(draft, &session.actor(), Utc::now());
        announcement.id = self.store().create(ANNOUNCEMENTS, to_document(&announcement)?)?;

        tracing::info!(announcement = %announcement.id, actor = %session.actor(), "announcement posted");
        self.record(
            session,
            "announcement_posted",
            "announcement",
            &announcement.id,
            serde_json::json!({ "title": announcement.title, "branchId": announcement.branch_id }),
        );

        Ok(announcement)
    }

    /// Global announcements plus those of the session's branches, newest first.
    pub fn list_announcements(&self, session: &Session) -> AccessResult<Vec<Announcement>> {
        let mut announcements: Vec<Announcement> = self.load_all(ANNOUNCEMENTS, None)?;
        announcements.retain(|a| {
            a.is_global()
                || session.is_admin()
                || a.branch_id.as_deref().map_or(false, |b| session.has_branch(b))
        });
        announcements.reverse();
        announcements.sort_by(|a, b| b.posted_at.cmp(&a.posted_at));

        Ok(announcements)
    }
}

#[cfg(test)]
mod tests {
    use crate::access::GymAccess;
    use crate::entities::{AnnouncementDraft, Branch};
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
    fn test_students_cannot_post() {
        let (access, centro, _) = setup();
        let student = Session::new(Role::Student).with_branches([centro.id.as_str()]);
        let err = access
            .post_announcement(&student, AnnouncementDraft::new("Aula", "Sem aula", Some(centro.id.as_str())))
            .unwrap_err();
        assert!(matches!(err, AccessError::PermissionDenied { .. }));
    }

    #[test]
    fn test_professor_posts_to_own_branch_only() {
        let (access, centro, sul) = setup();
        let professor = Session::new(Role::Professor).with_branches([centro.id.as_str()]);

        let posted = access
            .post_announcement(&professor, AnnouncementDraft::new("Feriado", "Sem aula", Some(centro.id.as_str())))
            .unwrap();
        assert_eq!(posted.author, "professor");

        assert!(access
            .post_announcement(&professor, AnnouncementDraft::new("X", "Y", Some(sul.id.as_str())))
            .is_err());
        assert!(access
            .post_announcement(&professor, AnnouncementDraft::new("X", "Y", None))
            .is_err());
    }

    #[test]
    fn test_listing_is_scoped() {
        let (access, centro, sul) = setup();
        let admin = Session::admin();
        access
            .post_announcement(&admin, AnnouncementDraft::new("Geral", "Todos", None))
            .unwrap();
        access
            .post_announcement(&admin, AnnouncementDraft::new("Centro", "Só centro", Some(centro.id.as_str())))
            .unwrap();
        access
            .post_announcement(&admin, AnnouncementDraft::new("Sul", "Só sul", Some(sul.id.as_str())))
            .unwrap();

        assert_eq!(access.list_announcements(&admin).unwrap().len(), 3);

        let student = Session::new(Role::Student).with_branches([centro.id.as_str()]);
        let titles: Vec<String> = access
            .list_announcements(&student)
            .unwrap()
            .into_iter()
            .map(|a| a.title)
            .collect();
        assert_eq!(titles.len(), 2);
        assert!(titles.contains(&"Geral".to_string()));
        assert!(titles.contains(&"Centro".to_string()));

        // a session without branches still gets the global ones
        let outsider = access.list_announcements(&Session::new(Role::Student)).unwrap();
        assert_eq!(outsider.len(), 1);
        assert!(outsider[0].is_global());
    }
}
