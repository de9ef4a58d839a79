// Import necessary crates and modules
use crate::error::SyncError;
use serde::{Deserialize, Serialize};

/// Structure to hold LMS API credentials and course addressing.
///
/// This struct is the single immutable configuration value injected into the
/// gateway and every component at construction time. It stores the
/// institution base URL, the API version segment, the bearer token used
/// verbatim on every request, and the identity of the course being
/// synchronized.
///
/// Fields:
/// - `institution_url`: Base URL of the institution, e.g. `https://canvas.example.edu`.
/// - `api_version`: API version path segment, e.g. `v1`.
/// - `token`: API bearer token for authentication.
/// - `course_id`: Identity of the course all operations address.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
pub struct ApiCredentials {
    pub institution_url: String,
    pub api_version: String,
    pub token: String,
    pub course_id: u64,
}

impl ApiCredentials {
    /// Loads credentials from environment variables, honoring a `.env` file.
    ///
    /// Expected variables: `INSTITUTION_URL`, `API_VERSION`, `API_TOKEN`,
    /// `COURSE_ID`. Any missing or unparseable variable is a configuration
    /// error naming the offending key.
    pub fn from_env() -> Result<Self, SyncError> {
        // A missing .env file is fine; the variables may be set directly.
        let _ = dotenvy::dotenv();

        let institution_url = require_env("INSTITUTION_URL")?;
        let api_version = require_env("API_VERSION")?;
        let token = require_env("API_TOKEN")?;
        let course_id = require_env("COURSE_ID")?
            .parse::<u64>()
            .map_err(|_| SyncError::Config("COURSE_ID must be a numeric course identity".into()))?;

        Ok(ApiCredentials {
            institution_url,
            api_version,
            token,
            course_id,
        })
    }

    /// Base URL of the API, without a trailing slash.
    pub fn api_base(&self) -> String {
        format!("{}/api/{}", self.institution_url, self.api_version)
    }

    /// URL of an endpoint scoped to the configured course.
    ///
    /// `course_url("assignments")` yields
    /// `<institution>/api/<version>/courses/<course_id>/assignments`.
    pub fn course_url(&self, path: &str) -> String {
        format!("{}/courses/{}/{}", self.api_base(), self.course_id, path)
    }

    /// Context code the calendar API uses to scope events to this course.
    pub fn course_context_code(&self) -> String {
        format!("course_{}", self.course_id)
    }
}

fn require_env(key: &str) -> Result<String, SyncError> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(SyncError::Config(format!(
            "{} is missing. Please set it in the environment or .env file.",
            key
        ))),
    }
}
