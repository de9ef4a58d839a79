use serde_json::Value;
use urlencoding::decode;

/// Workflow state of a submission. Only `Submitted` and `Graded` yield
/// materialization; everything else is skipped and reported as
/// informational.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowState {
    Unsubmitted,
    Submitted,
    Graded,
    PendingReview,
    Other,
}

impl WorkflowState {
    pub fn from_str(state: &str) -> Self {
        match state {
            "unsubmitted" => WorkflowState::Unsubmitted,
            "submitted" => WorkflowState::Submitted,
            "graded" => WorkflowState::Graded,
            "pending_review" => WorkflowState::PendingReview,
            _ => WorkflowState::Other,
        }
    }

    pub fn materializes(&self) -> bool {
        matches!(self, WorkflowState::Submitted | WorkflowState::Graded)
    }
}

/// One attachment of a submission: a display name and the locator of its
/// content. The record is discarded once the bytes are on disk.
#[derive(Debug, Clone)]
pub struct AttachmentRecord {
    pub display_name: String,
    pub url: String,
}

/// One student's submission to an assignment, reduced to what the
/// materializer needs.
#[derive(Debug, Clone)]
pub struct SubmissionRecord {
    pub assignment_id: u64,
    pub user_id: u64,
    pub user_name: Option<String>,
    pub state: WorkflowState,
    pub attachments: Vec<AttachmentRecord>,
}

impl SubmissionRecord {
    /// Converts the raw submission JSON into a record.
    ///
    /// The student's display name comes from the included `user` object when
    /// present. Attachments without a usable name or locator are dropped.
    pub fn from_value(j: &Value) -> Option<SubmissionRecord> {
        let user_id = j["user_id"].as_u64()?;
        let assignment_id = j["assignment_id"].as_u64()?;
        let state = j["workflow_state"]
            .as_str()
            .map(WorkflowState::from_str)
            .unwrap_or(WorkflowState::Other);
        let user_name = j["user"]["name"].as_str().map(String::from);

        let attachments = j["attachments"]
            .as_array()
            .map_or(Vec::new(), |attachments| {
                attachments
                    .iter()
                    .filter_map(|attachment| {
                        let raw_name = attachment["display_name"]
                            .as_str()
                            .or_else(|| attachment["filename"].as_str())?;
                        let url = attachment["url"].as_str()?.to_string();
                        Some(AttachmentRecord {
                            display_name: decode_file_name(raw_name),
                            url,
                        })
                    })
                    .collect()
            });

        Some(SubmissionRecord {
            assignment_id,
            user_id,
            user_name,
            state,
            attachments,
        })
    }

    /// Name of the per-student directory, derived from the display name with
    /// a synthesized `User_<id>` fallback when the name is absent.
    pub fn student_dir_name(&self) -> String {
        match &self.user_name {
            Some(name) if !name.trim().is_empty() => sanitize_component(name),
            _ => format!("User_{}", self.user_id),
        }
    }
}

/// Decodes a percent-encoded file name and replaces '+' with spaces.
fn decode_file_name(raw: &str) -> String {
    let decoded = decode(raw).map(|s| s.into_owned()).unwrap_or_else(|_| raw.to_string());
    sanitize_component(&decoded.replace('+', " "))
}

/// Strips path separators so a remote-supplied name cannot escape the
/// destination directory.
fn sanitize_component(name: &str) -> String {
    name.replace(['/', '\\'], "_").trim().to_string()
}
