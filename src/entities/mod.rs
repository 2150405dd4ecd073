// Entity Models
//
// Typed views over store documents. Every entity serializes camelCase and
// carries its store-assigned `id`. Branch references are branch ids; reads join
// them back to names through `consistency::BranchIndex`.

pub mod announcement;
pub mod branch;
pub mod instructor;
pub mod terms;
pub mod user;

pub use announcement::{Announcement, AnnouncementDraft};
pub use branch::{Branch, BranchPatch, ClassCategory, ScheduleEntry, MAX_ADDITIONAL_INSTRUCTORS};
pub use instructor::{Belt, Instructor, InstructorPatch, InstructorProfile, MAX_BLACK_BELT_STRIPES};
pub use terms::{TermsAcceptance, TermsRequest};
pub use user::{Attendance, UserPatch, UserProfile};

use crate::error::{AccessError, AccessResult};
use crate::store::Document;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub(crate) fn to_document<T: Serialize>(value: &T) -> AccessResult<Document> {
    match serde_json::to_value(value) {
        Ok(Value::Object(mut map)) => {
            map.remove("id");
            Ok(map)
        }
        Ok(other) => Err(AccessError::Fetch(format!(
            "expected an object document, got {}",
            other
        ))),
        Err(e) => Err(AccessError::Fetch(format!("could not encode document: {}", e))),
    }
}

pub(crate) fn from_document<T: DeserializeOwned>(collection: &str, doc: Document) -> AccessResult<T> {
    serde_json::from_value(Value::Object(doc))
        .map_err(|e| AccessError::Fetch(format!("malformed document in {}: {}", collection, e)))
}

/// Lets a patch tell "leave unchanged" (absent) apart from "clear" (null).
pub(crate) fn double_option<'de, D, T>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(de).map(Some)
}

pub(crate) fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}
