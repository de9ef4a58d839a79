use crate::connection::{Gateway, HttpMethod};
use crate::credentials::ApiCredentials;
use crate::error::SyncError;
use crate::pagination::collect_collection;
use log::info;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::Path;

/// One row of a group plan CSV: which group number a student belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupPlanRow {
    pub canvas_id: u64,
    pub group_number: u32,
    pub student_name: String,
}

/// Reads a semicolon-delimited, headerless group plan
/// (`canvas_id;group_number;student_name` per row).
pub fn read_group_plan(path: &Path) -> Result<Vec<GroupPlanRow>, SyncError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .has_headers(false)
        .from_path(path)?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.len() < 3 {
            return Err(SyncError::Config(format!(
                "group plan row has {} fields, expected 3",
                record.len()
            )));
        }
        let canvas_id = record[0].trim().parse::<u64>().map_err(|_| {
            SyncError::Config(format!("invalid canvas id in group plan: {}", &record[0]))
        })?;
        let group_number = record[1].trim().parse::<u32>().map_err(|_| {
            SyncError::Config(format!("invalid group number in group plan: {}", &record[1]))
        })?;
        rows.push(GroupPlanRow {
            canvas_id,
            group_number,
            student_name: record[2].trim().to_string(),
        });
    }
    Ok(rows)
}

/// Creates course groups and assigns students to them from a group plan.
pub struct GroupSync<'a> {
    gateway: &'a dyn Gateway,
    credentials: &'a ApiCredentials,
}

impl<'a> GroupSync<'a> {
    pub fn new(gateway: &'a dyn Gateway, credentials: &'a ApiCredentials) -> Self {
        GroupSync {
            gateway,
            credentials,
        }
    }

    /// Resolves a group category by exact name, creating it when absent.
    pub fn ensure_group_category(&self, category_name: &str) -> Result<u64, SyncError> {
        let url = self.credentials.course_url("group_categories");
        let categories = collect_collection(self.gateway, &url, &[])?;
        for category in &categories {
            if category["name"].as_str() == Some(category_name) {
                let id = category["id"].as_u64().ok_or_else(|| {
                    SyncError::ResourceNotFound(format!(
                        "group category '{}' has no id",
                        category_name
                    ))
                })?;
                info!(
                    "Group category '{}' already exists with ID: {}",
                    category_name, id
                );
                return Ok(id);
            }
        }

        info!(
            "Group category '{}' does not exist. Creating a new one.",
            category_name
        );
        let payload = json!({ "name": category_name });
        let response = self.gateway.execute(HttpMethod::Post(payload), &url, &[])?;
        if !response.is_success() {
            return Err(SyncError::RemoteWrite {
                status: response.status,
                body: response.body,
            });
        }
        let record: Value = response.json()?;
        record["id"].as_u64().ok_or_else(|| {
            SyncError::ResourceNotFound(format!(
                "created group category '{}' has no id",
                category_name
            ))
        })
    }

    fn groups_url(&self, category_id: u64) -> String {
        format!(
            "{}/group_categories/{}/groups",
            self.credentials.api_base(),
            category_id
        )
    }

    /// Existing groups of a category as a name → identity map.
    pub fn existing_groups(&self, category_id: u64) -> Result<HashMap<String, u64>, SyncError> {
        let groups = collect_collection(self.gateway, &self.groups_url(category_id), &[])?;
        Ok(groups
            .iter()
            .filter_map(|group| {
                Some((group["name"].as_str()?.to_string(), group["id"].as_u64()?))
            })
            .collect())
    }

    pub fn create_group(&self, category_id: u64, group_name: &str) -> Result<u64, SyncError> {
        let payload = json!({ "name": group_name });
        let response =
            self.gateway
                .execute(HttpMethod::Post(payload), &self.groups_url(category_id), &[])?;
        if !response.is_success() {
            return Err(SyncError::RemoteWrite {
                status: response.status,
                body: response.body,
            });
        }
        let record: Value = response.json()?;
        record["id"].as_u64().ok_or_else(|| {
            SyncError::ResourceNotFound(format!("created group '{}' has no id", group_name))
        })
    }

    /// Adds a student to a group. A 409 means the student is already a
    /// member; that is logged and treated as success so re-running the plan
    /// stays idempotent.
    pub fn add_membership(&self, group_id: u64, canvas_id: u64) -> Result<(), SyncError> {
        let url = format!(
            "{}/groups/{}/memberships",
            self.credentials.api_base(),
            group_id
        );
        let payload = json!({ "user_id": canvas_id });
        let response = self.gateway.execute(HttpMethod::Post(payload), &url, &[])?;

        if response.status == 409 {
            info!("User {} is already in the group.", canvas_id);
            return Ok(());
        }
        if !response.is_success() {
            return Err(SyncError::RemoteWrite {
                status: response.status,
                body: response.body,
            });
        }
        info!("Assigned user {} to group {}", canvas_id, group_id);
        Ok(())
    }

    /// Applies a group plan: ensures the category, then for each row creates
    /// the `<prefix>-<number>` group on demand and assigns the student.
    pub fn apply_group_plan(
        &self,
        category_name: &str,
        group_prefix: &str,
        plan: &[GroupPlanRow],
    ) -> Result<(), SyncError> {
        let category_id = self.ensure_group_category(category_name)?;
        let mut groups = self.existing_groups(category_id)?;

        for row in plan {
            let group_name = format!("{}-{}", group_prefix, row.group_number);
            let group_id = match groups.get(&group_name) {
                Some(id) => *id,
                None => {
                    let id = self.create_group(category_id, &group_name)?;
                    info!("Created group: {} (ID: {})", group_name, id);
                    groups.insert(group_name.clone(), id);
                    id
                }
            };
            self.add_membership(group_id, row.canvas_id)?;
            info!(
                "Assigned {} (Canvas ID: {}) to {}",
                row.student_name, row.canvas_id, group_name
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::FakeGateway;
    use std::fs;
    use tempfile::TempDir;

    fn credentials() -> ApiCredentials {
        ApiCredentials {
            institution_url: "https://lms.example".to_string(),
            api_version: "v1".to_string(),
            token: "t".to_string(),
            course_id: 7,
        }
    }

    const CATEGORIES_URL: &str = "https://lms.example/api/v1/courses/7/group_categories";
    const CATEGORY_GROUPS_URL: &str = "https://lms.example/api/v1/group_categories/10/groups";

    #[test]
    fn test_read_group_plan_semicolon_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("groups.csv");
        fs::write(&path, "101;1;Anna\n102 ;2; Bjorn\n").unwrap();

        let plan = read_group_plan(&path).unwrap();
        assert_eq!(plan.len(), 2);
        assert_eq!(
            plan[0],
            GroupPlanRow {
                canvas_id: 101,
                group_number: 1,
                student_name: "Anna".to_string(),
            }
        );
        assert_eq!(plan[1].student_name, "Bjorn");
    }

    #[test]
    fn test_read_group_plan_rejects_bad_id() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("groups.csv");
        fs::write(&path, "abc;1;Anna\n").unwrap();
        match read_group_plan(&path) {
            Err(SyncError::Config(msg)) => assert!(msg.contains("abc")),
            other => panic!("expected Config error, got {:?}", other),
        }
    }

    #[test]
    fn test_apply_plan_reuses_category_and_creates_missing_groups() {
        let mut gateway = FakeGateway::new();
        gateway.respond(
            "GET",
            CATEGORIES_URL,
            200,
            r#"[{"id": 10, "name": "Projects"}]"#,
        );
        gateway.respond(
            "GET",
            CATEGORY_GROUPS_URL,
            200,
            r#"[{"id": 71, "name": "Team-1"}]"#,
        );
        gateway.respond("POST", CATEGORY_GROUPS_URL, 201, r#"{"id": 72}"#);
        gateway.respond(
            "POST",
            "https://lms.example/api/v1/groups/71/memberships",
            200,
            "{}",
        );
        gateway.respond(
            "POST",
            "https://lms.example/api/v1/groups/72/memberships",
            200,
            "{}",
        );

        let plan = vec![
            GroupPlanRow {
                canvas_id: 101,
                group_number: 1,
                student_name: "Anna".to_string(),
            },
            GroupPlanRow {
                canvas_id: 102,
                group_number: 2,
                student_name: "Bjorn".to_string(),
            },
        ];

        let creds = credentials();
        let sync = GroupSync::new(&gateway, &creds);
        sync.apply_group_plan("Projects", "Team", &plan).unwrap();

        // Only Team-2 needed creating; both memberships were posted.
        let posts = gateway.calls_with_method("POST");
        let group_creates: Vec<_> = posts
            .iter()
            .filter(|call| call.url == CATEGORY_GROUPS_URL)
            .collect();
        assert_eq!(group_creates.len(), 1);
        assert_eq!(
            group_creates[0].body.as_ref().unwrap()["name"],
            json!("Team-2")
        );
    }

    #[test]
    fn test_membership_conflict_is_tolerated() {
        let mut gateway = FakeGateway::new();
        gateway.respond(
            "POST",
            "https://lms.example/api/v1/groups/71/memberships",
            409,
            "already a member",
        );
        let creds = credentials();
        let sync = GroupSync::new(&gateway, &creds);
        assert!(sync.add_membership(71, 101).is_ok());
    }
}
