// Import necessary crates and modules
use crate::connection::Gateway;
use crate::credentials::ApiCredentials;
use crate::error::SyncError;
use crate::pagination::collect_collection;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One enrolled student, reduced to what the roster export and the
/// materializer's name mapping need.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StudentRecord {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub login_id: String,
}

/// Fetches all students of the configured course, walking the paginated
/// user collection to exhaustion.
pub fn fetch_students(
    gateway: &dyn Gateway,
    credentials: &ApiCredentials,
) -> Result<Vec<StudentRecord>, SyncError> {
    let url = credentials.course_url("users");
    let params = vec![
        ("enrollment_type[]".to_string(), "student".to_string()),
        ("per_page".to_string(), "100".to_string()),
    ];
    let records = collect_collection(gateway, &url, &params)?;

    Ok(records
        .iter()
        .filter_map(|user| {
            Some(StudentRecord {
                id: user["id"].as_u64()?,
                name: user["name"].as_str()?.to_string(),
                login_id: user["login_id"].as_str().unwrap_or_default().to_string(),
            })
        })
        .collect())
}

/// Writes the roster to a CSV file with an `id,name,login_id` header, for
/// easy import into a spreadsheet.
pub fn write_roster_csv(path: &Path, students: &[StudentRecord]) -> Result<(), SyncError> {
    let mut writer = csv::Writer::from_path(path)?;
    for student in students {
        writer.serialize(student)?;
    }
    writer.flush()?;
    Ok(())
}
