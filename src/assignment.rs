// Import necessary crates and modules
use crate::connection::{Gateway, HttpMethod};
use crate::credentials::ApiCredentials;
use crate::error::SyncError;
use crate::pagination::collect_collection;
use chrono::DateTime;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fs;
use std::path::Path;

/// Locally authored description of an assignment.
///
/// Identity (`id`) is absent for "create" intents and present for
/// "update/verify" intents. `group_name` names the assignment group the
/// remote record must land in; it is resolved against the remote group list
/// before any write. The description may be given inline or indirected
/// through `description_file` (an HTML fragment on disk); the file wins when
/// both are present.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct AssignmentDescriptor {
    pub id: Option<u64>,
    pub group_name: String,
    pub name: String,
    pub due_at: String,
    pub description: Option<String>,
    pub description_file: Option<String>,
    #[serde(alias = "points")]
    pub points_possible: Option<f64>,
    pub grading_type: Option<String>,
    pub submission_types: Option<Vec<String>>,
    pub published: Option<bool>,
    pub allowed_extensions: Option<Vec<String>>,
}

impl AssignmentDescriptor {
    /// Loads a descriptor from a JSON document, resolving the
    /// `description_file` indirection relative to the current directory.
    ///
    /// The due date must be RFC 3339 so a typo fails here rather than as an
    /// opaque rejection from the server.
    pub fn load(path: &Path) -> Result<Self, SyncError> {
        let text = fs::read_to_string(path)?;
        let mut descriptor: AssignmentDescriptor = serde_json::from_str(&text)?;

        if descriptor.group_name.trim().is_empty() {
            return Err(SyncError::Config(
                "assignment descriptor is missing 'group_name'".to_string(),
            ));
        }
        if descriptor.name.trim().is_empty() {
            return Err(SyncError::Config(
                "assignment descriptor is missing 'name'".to_string(),
            ));
        }
        if DateTime::parse_from_rfc3339(&descriptor.due_at).is_err() {
            return Err(SyncError::Config(format!(
                "'due_at' is not a valid RFC 3339 timestamp: {}",
                descriptor.due_at
            )));
        }

        if let Some(file) = &descriptor.description_file {
            let html = fs::read_to_string(file).map_err(|_| {
                SyncError::Config(format!("description file not found: {}", file))
            })?;
            descriptor.description = Some(html);
        }

        Ok(descriptor)
    }

    /// Builds the write payload, nesting the fields under `assignment` the
    /// way the remote API expects and attaching the resolved group identity.
    fn payload(&self, group_id: u64) -> Value {
        let mut fields = Map::new();
        fields.insert("name".to_string(), json!(self.name));
        fields.insert("due_at".to_string(), json!(self.due_at));
        fields.insert(
            "description".to_string(),
            json!(self.description.clone().unwrap_or_default()),
        );
        fields.insert(
            "points_possible".to_string(),
            json!(self.points_possible.unwrap_or(0.0)),
        );
        fields.insert(
            "grading_type".to_string(),
            json!(self
                .grading_type
                .clone()
                .unwrap_or_else(|| "points".to_string())),
        );
        fields.insert(
            "submission_types".to_string(),
            json!(self
                .submission_types
                .clone()
                .unwrap_or_else(|| vec!["online_upload".to_string()])),
        );
        fields.insert(
            "published".to_string(),
            json!(self.published.unwrap_or(false)),
        );
        fields.insert(
            "allowed_extensions".to_string(),
            json!(self.allowed_extensions.clone().unwrap_or_default()),
        );
        fields.insert("assignment_group_id".to_string(), json!(group_id));
        json!({ "assignment": Value::Object(fields) })
    }
}

/// Three-way outcome of an identity-based lookup during synchronization.
///
/// Modeled as data rather than exception-driven control flow so `upsert` can
/// consume it as a small state machine.
#[derive(Debug)]
pub enum RemoteLookup {
    /// The record exists and is published; it must not be mutated.
    Locked(Value),
    /// The record exists and may be updated.
    Unlocked(Value),
    /// The referenced identity does not resolve (stale id or transport
    /// failure); the caller recreates the resource.
    Missing,
}

/// Terminal state of one `upsert` call.
#[derive(Debug, PartialEq)]
pub enum UpsertOutcome {
    /// A new remote record was created; carries the fresh identity.
    Created(u64),
    /// The existing record was updated in place.
    Updated(u64),
    /// The record is published; the upsert was aborted without side effects.
    SkippedLocked(u64),
}

/// Synchronizes locally described assignments with the remote course.
pub struct AssignmentSync<'a> {
    gateway: &'a dyn Gateway,
    credentials: &'a ApiCredentials,
}

impl<'a> AssignmentSync<'a> {
    pub fn new(gateway: &'a dyn Gateway, credentials: &'a ApiCredentials) -> Self {
        AssignmentSync {
            gateway,
            credentials,
        }
    }

    fn assignments_url(&self) -> String {
        self.credentials.course_url("assignments")
    }

    /// Makes the remote record converge toward the descriptor.
    ///
    /// State machine per call:
    /// `START → {no id: CREATE} | {id: LOOKUP → {missing: CREATE} |
    /// {locked: ABORT} | {unlocked: UPDATE}}`.
    ///
    /// The assignment group is resolved by case-insensitive exact name match
    /// before any write; no match aborts the whole upsert with
    /// `ResourceNotFound`. A locked (published) target is a deliberate no-op
    /// reported as `SkippedLocked`, never an error and never retried.
    pub fn upsert(&self, descriptor: &AssignmentDescriptor) -> Result<UpsertOutcome, SyncError> {
        let group_id = self.resolve_group_id(&descriptor.group_name)?;
        let payload = descriptor.payload(group_id);

        if let Some(id) = descriptor.id {
            match self.lookup(id) {
                RemoteLookup::Locked(_) => {
                    error!(
                        "Assignment '{}' is already published. Aborting...",
                        descriptor.name
                    );
                    return Ok(UpsertOutcome::SkippedLocked(id));
                }
                RemoteLookup::Unlocked(_) => {
                    info!("Assignment '{}' exists. Updating assignment...", descriptor.name);
                    self.update(id, &payload, &descriptor.name)?;
                    return Ok(UpsertOutcome::Updated(id));
                }
                RemoteLookup::Missing => {
                    warn!(
                        "Assignment '{}' with ID '{}' cannot be found. Creating a new assignment...",
                        descriptor.name, id
                    );
                }
            }
        }

        let new_id = self.create(&payload, &descriptor.name)?;
        Ok(UpsertOutcome::Created(new_id))
    }

    /// Fetches the remote record by identity, folding every failure mode
    /// into the tagged three-way outcome. Transport errors and non-200
    /// statuses both read as "the referenced identity is stale" and are
    /// logged before the caller falls through to create.
    fn lookup(&self, id: u64) -> RemoteLookup {
        let url = format!("{}/{}", self.assignments_url(), id);
        let response = match self.gateway.execute(HttpMethod::Get, &url, &[]) {
            Ok(response) => response,
            Err(e) => {
                warn!("Lookup of assignment {} failed: {}", id, e);
                return RemoteLookup::Missing;
            }
        };
        if !response.is_success() {
            return RemoteLookup::Missing;
        }
        let record: Value = match response.json() {
            Ok(record) => record,
            Err(e) => {
                warn!("Assignment {} returned an unreadable record: {}", id, e);
                return RemoteLookup::Missing;
            }
        };
        if record["published"].as_bool().unwrap_or(false) {
            RemoteLookup::Locked(record)
        } else {
            RemoteLookup::Unlocked(record)
        }
    }

    fn create(&self, payload: &Value, name: &str) -> Result<u64, SyncError> {
        let response =
            self.gateway
                .execute(HttpMethod::Post(payload.clone()), &self.assignments_url(), &[])?;
        // Creation success is the creation status code, nothing looser.
        if response.status != 201 {
            return Err(SyncError::RemoteWrite {
                status: response.status,
                body: response.body,
            });
        }
        let record: Value = response.json()?;
        let id = record["id"].as_u64().ok_or_else(|| {
            SyncError::ResourceNotFound(format!("created assignment '{}' has no id", name))
        })?;
        info!("Assignment '{}' created successfully with ID: {}", name, id);
        Ok(id)
    }

    fn update(&self, id: u64, payload: &Value, name: &str) -> Result<(), SyncError> {
        let url = format!("{}/{}", self.assignments_url(), id);
        let response = self
            .gateway
            .execute(HttpMethod::Put(payload.clone()), &url, &[])?;
        if !response.is_success() {
            return Err(SyncError::RemoteWrite {
                status: response.status,
                body: response.body,
            });
        }
        info!("Assignment '{}' updated successfully.", name);
        Ok(())
    }

    /// Resolves an assignment group name to its identity by case-insensitive
    /// exact match against the fetched group list.
    pub fn resolve_group_id(&self, group_name: &str) -> Result<u64, SyncError> {
        let wanted = group_name.to_lowercase();
        for (id, name) in self.assignment_groups()? {
            if name.to_lowercase() == wanted {
                return Ok(id);
            }
        }
        Err(SyncError::ResourceNotFound(format!(
            "Assignment group '{}' not found.",
            group_name
        )))
    }

    /// Fetches all assignment groups of the course as `(id, name)` pairs.
    pub fn assignment_groups(&self) -> Result<Vec<(u64, String)>, SyncError> {
        let url = self.credentials.course_url("assignment_groups");
        let params = vec![("per_page".to_string(), "100".to_string())];
        let records = collect_collection(self.gateway, &url, &params)?;
        Ok(records
            .iter()
            .filter_map(|group| {
                let id = group["id"].as_u64()?;
                let name = group["name"].as_str()?.to_string();
                Some((id, name))
            })
            .collect())
    }

    /// Retrieves a single assignment by identity.
    pub fn fetch_single(&self, id: u64) -> Result<Value, SyncError> {
        let url = format!("{}/{}", self.assignments_url(), id);
        let response = self.gateway.execute(HttpMethod::Get, &url, &[])?;
        if !response.is_success() {
            return Err(SyncError::RemoteFetch {
                status: response.status,
                body: response.body,
            });
        }
        response.json()
    }

    /// Retrieves every assignment of the course, across all pages.
    pub fn fetch_all(&self) -> Result<Vec<Value>, SyncError> {
        let params = vec![("per_page".to_string(), "100".to_string())];
        collect_collection(self.gateway, &self.assignments_url(), &params)
    }

    /// Retrieves all assignments nested under their groups, in a simplified
    /// shape suitable for writing to a local JSON file.
    ///
    /// Assignments pointing at an unknown group are logged and left out, the
    /// stance the original listing takes.
    pub fn grouped_assignments(&self) -> Result<Value, SyncError> {
        let groups = self.assignment_groups()?;
        let mut nested = Map::new();
        for (id, name) in &groups {
            nested.insert(
                id.to_string(),
                json!({ "name": name, "assignments": [] }),
            );
        }

        for assignment in self.fetch_all()? {
            let simplified = json!({
                "id": assignment["id"],
                "name": assignment["name"],
                "description": assignment.get("description").cloned()
                    .unwrap_or_else(|| json!("No description provided.")),
                "due_at": assignment["due_at"],
                "points": assignment.get("points_possible").cloned().unwrap_or(json!(0)),
                "published": assignment.get("published").cloned().unwrap_or(json!(false)),
                "allowed_extensions": assignment.get("allowed_extensions").cloned()
                    .unwrap_or(json!([])),
            });
            let group_key = assignment["assignment_group_id"]
                .as_u64()
                .map(|g| g.to_string());
            match group_key.and_then(|key| nested.get_mut(&key)) {
                Some(bucket) => {
                    if let Some(assignments) = bucket["assignments"].as_array_mut() {
                        assignments.push(simplified);
                    }
                }
                None => warn!(
                    "Assignment '{}' is in an unknown group: {:?}",
                    assignment["name"], assignment["assignment_group_id"]
                ),
            }
        }
        Ok(Value::Object(nested))
    }
}
