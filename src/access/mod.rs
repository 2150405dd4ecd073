// 🚪 Access Layer - the one authoritative path to every entity
//
// Each operation takes the caller's `Session` and re-checks capabilities here,
// whatever surface (HTTP, CLI, tests) is calling. Successful mutations bump
// `revision()` and append an audit event.
//
// No local cache: reads go straight to the store, so a caller that re-fetches
// after its own mutation sees it.

mod announcements;
mod branches;
mod instructors;
mod terms;
mod users;

pub use branches::BranchDeletion;

use crate::audit::{events_for_entity, insert_event, Event};
use crate::consistency::DeletePolicy;
use crate::entities::{from_document, Instructor, UserProfile};
use crate::error::AccessResult;
use crate::roles::{Role, Session};
use crate::store::{DocumentStore, INSTRUCTORS, USERS};
use serde::de::DeserializeOwned;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Clone)]
pub struct GymAccess {
    store: Arc<dyn DocumentStore>,
    delete_policy: DeletePolicy,
    revision: Arc<AtomicU64>,
}

impl GymAccess {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        GymAccess {
            store,
            delete_policy: DeletePolicy::default(),
            revision: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn with_delete_policy(mut self, policy: DeletePolicy) -> Self {
        self.delete_policy = policy;
        self
    }

    pub fn delete_policy(&self) -> DeletePolicy {
        self.delete_policy
    }

    pub fn store(&self) -> &dyn DocumentStore {
        self.store.as_ref()
    }

    /// Bumped after every successful mutation. A caller holding a cached list
    /// view compares this against the value it saw when it fetched.
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::SeqCst)
    }

    // ========================================================================
    // SESSION
    // ========================================================================

    /// Resolve the per-request session.
    ///
    /// Anonymous callers get the role named by `token` (least privilege when
    /// it is missing or unknown). A known `user_id` uses the role stored on
    /// the profile and scopes the session to the user's branch; professors
    /// also get every branch of the instructor record sharing their email.
    pub fn session_for(&self, token: Option<&str>, user_id: Option<&str>) -> AccessResult<Session> {
        let Some(user_id) = user_id.filter(|id| !id.trim().is_empty()) else {
            return Ok(Session::resolve(token));
        };

        let Some(user) = self.load::<UserProfile>(USERS, user_id)? else {
            tracing::debug!(user_id, "unknown user in session, resolving anonymously");
            return Ok(Session::resolve(token));
        };

        let index = self.branch_index()?;
        let mut branches: Vec<String> = user
            .branch_id
            .as_deref()
            .and_then(|r| index.canonical_id(r))
            .map(str::to_string)
            .into_iter()
            .collect();

        if user.role == Role::Professor && !user.email.is_empty() {
            let instructors: Vec<Instructor> = self.load_all(INSTRUCTORS, None)?;
            if let Some(instructor) = instructors
                .iter()
                .find(|i| i.email.eq_ignore_ascii_case(&user.email))
            {
                branches.extend(
                    instructor
                        .affiliations
                        .iter()
                        .filter_map(|r| index.canonical_id(r))
                        .map(str::to_string),
                );
            }
        }

        Ok(Session::new(user.role)
            .with_user(user.id)
            .with_branches(branches))
    }

    /// Audit history of one entity, newest first. Admin only.
    pub fn history(&self, session: &Session, entity_type: &str, entity_id: &str) -> AccessResult<Vec<Event>> {
        if !session.is_admin() {
            return Err(session.denied("view audit history"));
        }
        events_for_entity(self.store(), entity_type, entity_id)
    }

    // ========================================================================
    // HELPERS
    // ========================================================================

    pub(crate) fn load_all<T: DeserializeOwned>(
        &self,
        collection: &str,
        order_by: Option<&str>,
    ) -> AccessResult<Vec<T>> {
        self.store
            .list(collection, order_by)?
            .into_iter()
            .map(|doc| from_document(collection, doc))
            .collect()
    }

    pub(crate) fn load<T: DeserializeOwned>(&self, collection: &str, id: &str) -> AccessResult<Option<T>> {
        match self.store.get(collection, id)? {
            Some(doc) => Ok(Some(from_document(collection, doc)?)),
            None => Ok(None),
        }
    }

    /// Note a successful mutation. An audit write failure is logged rather
    /// than failing a mutation that already happened.
    pub(crate) fn record(
        &self,
        session: &Session,
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
    ) {
        self.revision.fetch_add(1, Ordering::SeqCst);

        let event = Event::new(event_type, entity_type, entity_id, data, &session.actor());
        if let Err(e) = insert_event(self.store(), &event) {
            tracing::warn!(event_type, entity_id, error = %e, "failed to append audit event");
        }
    }
}
