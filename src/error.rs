use thiserror::Error;

/// Errors produced by the synchronization core.
///
/// Reads that come back non-2xx are `RemoteFetch`, create/update writes that
/// miss their success code are `RemoteWrite`, and a failed name or identity
/// lookup that must abort an operation before any write is
/// `ResourceNotFound`. Transport-level failures (DNS, connection reset) never
/// carry a status code and are reported separately.
///
/// Rubric validation problems are deliberately *not* part of this taxonomy:
/// they are returned as data (`RubricReport`), since a structurally suspect
/// rubric is something a user inspects, not something that unwinds the stack.
/// Likewise, refusing to touch a published resource is a successful no-op
/// outcome (`UpsertOutcome::SkippedLocked`), not an error.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Non-success status on a read.
    #[error("remote fetch failed with status {status}: {body}")]
    RemoteFetch { status: u16, body: String },

    /// Non-success status on a create or update.
    #[error("remote write failed with status {status}: {body}")]
    RemoteWrite { status: u16, body: String },

    /// A required name or identity lookup produced no match.
    #[error("resource not found: {0}")]
    ResourceNotFound(String),

    /// A per-student grade upload was rejected. Carries the student identity
    /// so batch callers can report which upload failed.
    #[error("grade upload for student {student_id} failed with status {status}: {body}")]
    GradeUpload {
        student_id: u64,
        status: u16,
        body: String,
    },

    /// The request never produced an HTTP response.
    #[error("transport error: {0}")]
    Transport(String),

    /// Missing or invalid configuration (environment variables, descriptor
    /// files).
    #[error("configuration error: {0}")]
    Config(String),

    /// A response body that should have been JSON of a known shape was not.
    #[error("malformed response body: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Raised out of a `DocumentRenderer` implementation.
    #[error("render error: {0}")]
    Render(String),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        SyncError::Transport(err.to_string())
    }
}
