// Gym Access - Core Library
// Role-scoped access and cross-entity consistency for the gym dashboard.
// Used by the admin CLI, the API server, and tests.

pub mod access;
pub mod audit;
pub mod config;
pub mod consistency;
pub mod entities;
pub mod error;
pub mod import;
pub mod roles;
pub mod store;

#[cfg(feature = "server")]
pub mod api;

// Re-export commonly used types
pub use access::{BranchDeletion, GymAccess};
pub use audit::{events_for_entity, insert_event, Event};
pub use config::{init_logging, StoreArgs};
pub use consistency::{
    find_dangling, find_referrers, BranchIndex, DanglingReference, DeletePolicy, ReferrerKind,
};
pub use entities::{
    Announcement, AnnouncementDraft, Attendance, Belt, Branch, BranchPatch, ClassCategory,
    Instructor, InstructorPatch, InstructorProfile, ScheduleEntry, TermsAcceptance, TermsRequest,
    UserPatch, UserProfile,
};
pub use error::{AccessError, AccessResult, ValidationError};
pub use import::{
    import_branches, import_instructors, load_branches_csv, load_instructors_csv, ImportSummary,
};
pub use roles::{Capabilities, Capability, Role, Session};
pub use store::{Document, DocumentStore, MemoryStore, SqliteStore, StoreError};
