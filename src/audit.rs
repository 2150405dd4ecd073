// Audit trail: every mutation is an event
//
// Events live in the `events` collection of the same store, so any
// `DocumentStore` gets an audit log for free.

use crate::entities::{from_document, to_document};
use crate::error::AccessResult;
use crate::store::{DocumentStore, EVENTS};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            id: String::new(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

/// Append an event, returning its id.
pub fn insert_event(store: &dyn DocumentStore, event: &Event) -> AccessResult<String> {
    let doc = to_document(event)?;
    Ok(store.create(EVENTS, doc)?)
}

/// Events for one entity, newest first.
pub fn events_for_entity(
    store: &dyn DocumentStore,
    entity_type: &str,
    entity_id: &str,
) -> AccessResult<Vec<Event>> {
    let mut events = store
        .list(EVENTS, None)?
        .into_iter()
        .map(|doc| from_document::<Event>(EVENTS, doc))
        .collect::<AccessResult<Vec<_>>>()?;

    events.retain(|e| e.entity_type == entity_type && e.entity_id == entity_id);
    // Stores list in insertion order; reversing first keeps later writes ahead on equal timestamps.
    // RFC 3339 strings with varying fraction digits do not sort lexically
    events.reverse();
    events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

    Ok(events)
}
