//! # LMS Coursework Synchronization Library
//!
//! This Rust library synchronizes locally authored coursework artifacts —
//! assignments, calendar events, rubrics, submissions and grades — with a
//! Canvas-style LMS REST API. Local descriptions live in JSON/CSV files; the
//! library makes the remote state converge toward them idempotently, walks
//! cursor-paginated collections to completion, materializes submission
//! attachments into a local hierarchy, and aggregates filled-in grading
//! rubrics into per-student grade uploads.
//!
//! ## Core behaviors
//!
//! - **Resource synchronization:** `AssignmentSync::upsert` decides create
//!   vs. update vs. abort from a locally described assignment, and refuses to
//!   mutate a published resource.
//! - **Pagination:** `Paginator` follows `Link: rel="next"` locators until a
//!   page reports none, yielding one logical sequence from many pages.
//! - **Materialization:** `Materializer` persists every attachment of the
//!   submitted/graded submissions of an assignment under a per-student
//!   directory, optionally rendering notebook files through a
//!   `DocumentRenderer`.
//! - **Rubric engine:** `validate_rubric` checks a rubric document's
//!   structural and arithmetic invariants, `rubric_to_template` produces a
//!   fillable grading template, and `push_grade` uploads the aggregated
//!   result per student in a single write.
//!
//! ## Usage
//!
//! Configuration is a single immutable [`ApiCredentials`] value, typically
//! loaded from the environment, injected into the gateway and every
//! component:
//!
//! ```no_run
//! use lms_course_sync::{ApiCredentials, AssignmentDescriptor, AssignmentSync, HttpGateway};
//! use std::path::Path;
//!
//! fn main() -> Result<(), lms_course_sync::SyncError> {
//!     let credentials = ApiCredentials::from_env()?;
//!     let gateway = HttpGateway::new(credentials.clone());
//!
//!     let descriptor = AssignmentDescriptor::load(Path::new("assignment.json"))?;
//!     let sync = AssignmentSync::new(&gateway, &credentials);
//!     println!("{:?}", sync.upsert(&descriptor)?);
//!     Ok(())
//! }
//! ```
//!
//! Everything is single-threaded, synchronous, blocking I/O: each public
//! operation runs to completion or failure before the next begins, and no
//! request is ever retried.

pub mod assignment; // Synchronizes assignment descriptors with the remote course.
pub mod calendar; // Replaces the course calendar from a local event list.
pub mod connection; // Gateway trait and the blocking HTTP implementation.
pub mod credentials; // Immutable API configuration loaded from the environment.
pub mod error;
pub mod groups; // Group categories, groups and memberships from a CSV plan.
pub mod materialize; // Downloads submission attachments into a local hierarchy.
pub mod pagination; // Cursor-paginated collection walking.
pub mod rubric; // Rubric validation, grading templates and grade uploads.
pub mod student; // Course roster fetching and CSV export.
pub mod submission; // Submission and attachment record parsing.

#[cfg(test)]
pub(crate) mod testutil;

// Exports key structures for external use.
pub use assignment::{AssignmentDescriptor, AssignmentSync, RemoteLookup, UpsertOutcome};
pub use calendar::{CalendarEventSpec, CalendarSync};
pub use connection::{Gateway, HttpGateway, HttpMethod, HttpResponse};
pub use credentials::ApiCredentials;
pub use error::SyncError;
pub use groups::{read_group_plan, GroupPlanRow, GroupSync};
pub use materialize::{DocumentRenderer, MaterializeReport, Materializer};
pub use pagination::{collect_collection, Page, Paginator};
pub use rubric::{
    build_grade_submission, push_grade, rubric_to_template, upload_rubric, validate_rubric,
    RubricReport, Severity, TemplateEntry,
};
pub use student::{fetch_students, write_roster_csv, StudentRecord};
pub use submission::{AttachmentRecord, SubmissionRecord, WorkflowState};
