use crate::connection::{Gateway, HttpMethod};
use crate::credentials::ApiCredentials;
use crate::error::SyncError;
use log::info;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Severity class of one validation message. Warnings never affect the
/// overall verdict; errors do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone)]
pub struct ValidationMessage {
    pub severity: Severity,
    pub text: String,
}

/// Outcome of a rubric validation pass: `ok` is true iff no error-class
/// message was produced.
#[derive(Debug, Default)]
pub struct RubricReport {
    pub messages: Vec<ValidationMessage>,
}

impl RubricReport {
    pub fn ok(&self) -> bool {
        self.messages
            .iter()
            .all(|m| m.severity != Severity::Error)
    }

    fn error(&mut self, text: String) {
        self.messages.push(ValidationMessage {
            severity: Severity::Error,
            text,
        });
    }

    fn warning(&mut self, text: String) {
        self.messages.push(ValidationMessage {
            severity: Severity::Warning,
            text,
        });
    }
}

/// Validates a rubric document's structural and arithmetic invariants.
///
/// The rules, in evaluation order:
/// - missing `title` is an error; checking continues;
/// - missing `total_points` is an error, as is a non-numeric one; in either
///   case the arithmetic check is skipped. A numeric total is compared as a
///   float, so a fractional stated total still participates;
/// - missing `criteria` is an error and stops validation immediately, since
///   every later check presupposes the criteria array;
/// - per criterion, a missing `description` is an error; missing `ratings`
///   is an error that skips the per-rating checks (the criterion then
///   contributes 0 points);
/// - per rating, missing or non-integer `points` and missing `description`
///   are errors; a missing `long_description` is only a warning;
/// - a criterion contributes the maximum integer `points` among its valid
///   ratings to the running total;
/// - a stated `total_points` that differs from the summed contributions is
///   a warning naming both values.
///
/// Operates on the raw JSON value so half-formed documents can be described
/// precisely instead of failing deserialization wholesale.
pub fn validate_rubric(rubric: &Value) -> RubricReport {
    let mut report = RubricReport::default();

    if rubric.get("title").is_none() {
        report.error("Rubric is missing 'title' field.".to_string());
    }

    let expected_total = match rubric.get("total_points") {
        // Compared as a float so a stated total of 20.5 (or a 25.0 a JSON
        // writer emitted for 25) still takes part in the arithmetic check.
        Some(value) => match value.as_f64() {
            Some(expected) => Some(expected),
            None => {
                report.error("'total_points' must be a number.".to_string());
                None
            }
        },
        None => {
            report.error("Rubric is missing 'total_points' field.".to_string());
            None
        }
    };

    let criteria = match rubric.get("criteria").and_then(Value::as_array) {
        Some(criteria) => criteria,
        None => {
            report.error("Rubric is missing 'criteria' section.".to_string());
            return report;
        }
    };

    let mut total_points: i64 = 0;
    for criterion in criteria {
        let label = criterion["description"].as_str().unwrap_or("Unknown");

        if criterion.get("description").is_none() {
            report.error("Missing 'description' in criterion.".to_string());
        }

        let ratings = match criterion.get("ratings").and_then(Value::as_object) {
            Some(ratings) => ratings,
            None => {
                report.error(format!("Missing 'ratings' in criterion: {}", label));
                continue;
            }
        };

        let mut max_points: i64 = 0;
        for (rating_id, rating) in ratings {
            match rating.get("points") {
                None => report.error(format!("Missing 'points' in: {} #{}", label, rating_id)),
                Some(points) => match points.as_i64() {
                    Some(points) => max_points = max_points.max(points),
                    None => report.error(format!(
                        "'points' must be an integer: {} #{}",
                        label, rating_id
                    )),
                },
            }

            if rating.get("description").is_none() {
                report.error(format!("Missing 'description' in: {} #{}", label, rating_id));
            }
            if rating.get("long_description").is_none() {
                report.warning(format!(
                    "Missing 'long_description' in: {} #{}",
                    label, rating_id
                ));
            }
        }
        total_points += max_points;
    }

    if let Some(expected) = expected_total {
        if total_points as f64 != expected {
            report.warning(format!(
                "Total points sum to {}, but should be {}.",
                total_points, expected
            ));
        }
    }

    report
}

/// Loads a rubric document from a JSON file.
pub fn load_rubric(path: &Path) -> Result<Value, SyncError> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    Ok(serde_json::from_reader(reader)?)
}

/// Re-keys the criteria array positionally ("1", "2", ...) the way the
/// remote API expects, carrying rating keys through unchanged. Criterion
/// order in the local document determines the numbering, so re-serialization
/// is deterministic.
pub fn format_criteria(criteria: &[Value]) -> Value {
    let mut formatted = Map::new();
    for (idx, criterion) in criteria.iter().enumerate() {
        let ratings = criterion["ratings"]
            .as_object()
            .map(|ratings| {
                ratings
                    .iter()
                    .map(|(key, rating)| {
                        (
                            key.clone(),
                            json!({
                                "description": rating["description"],
                                "long_description": rating.get("long_description").cloned()
                                    .unwrap_or_else(|| json!("")),
                                "points": rating["points"],
                            }),
                        )
                    })
                    .collect::<Map<String, Value>>()
            })
            .unwrap_or_default();
        formatted.insert(
            (idx + 1).to_string(),
            json!({
                "description": criterion["description"],
                "ratings": Value::Object(ratings),
            }),
        );
    }
    Value::Object(formatted)
}

/// Uploads a rubric document to the course, associated for grading.
pub fn upload_rubric(
    gateway: &dyn Gateway,
    credentials: &ApiCredentials,
    rubric: &Value,
) -> Result<(), SyncError> {
    let title = rubric["title"].as_str().unwrap_or_default();
    let criteria = rubric["criteria"].as_array().cloned().unwrap_or_default();

    let payload = json!({
        "rubric_association": {
            "association_type": "Course",
            "association_id": credentials.course_id,
            "use_for_grading": true,
            "title": title,
        },
        "rubric": {
            "title": title,
            "criteria": format_criteria(&criteria),
        },
    });

    let url = credentials.course_url("rubrics");
    let response = gateway.execute(HttpMethod::Post(payload), &url, &[])?;
    if !response.is_success() {
        return Err(SyncError::RemoteWrite {
            status: response.status,
            body: response.body,
        });
    }
    info!("Rubric '{}' created successfully!", title);
    Ok(())
}

/// One fillable row of a grading template, produced 1:1 from a remote
/// rubric criterion.
///
/// `score` is optional on purpose: after the instructor edits the template,
/// an entry whose score field was removed reads as "not yet graded" and is
/// excluded from the aggregate, which is different from "graded as zero".
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TemplateEntry {
    pub criterion_id: String,
    pub criterion_name: String,
    pub max_points: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default)]
    pub comment: String,
}

/// Transforms a fetched remote rubric into a grading template, preserving
/// remote criterion order. Scores start at 0, comments empty.
pub fn rubric_to_template(rubric: &Value) -> Vec<TemplateEntry> {
    rubric["data"]
        .as_array()
        .map(|criteria| {
            criteria
                .iter()
                .filter_map(|criterion| {
                    Some(TemplateEntry {
                        criterion_id: criterion["id"].as_str()?.to_string(),
                        criterion_name: criterion["description"].as_str()?.to_string(),
                        max_points: criterion["points"].as_f64().unwrap_or(0.0),
                        score: Some(0.0),
                        comment: String::new(),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Reads a (possibly instructor-edited) grading template back from disk.
pub fn load_template(path: &Path) -> Result<Vec<TemplateEntry>, SyncError> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    Ok(serde_json::from_reader(reader)?)
}

/// Writes a grading template as indented JSON.
pub fn save_template(path: &Path, template: &[TemplateEntry]) -> Result<(), SyncError> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, template)?;
    Ok(())
}

/// Sum of the scores present in the template. Entries without a score field
/// are excluded, not counted as zero.
pub fn total_score(template: &[TemplateEntry]) -> f64 {
    template.iter().filter_map(|entry| entry.score).sum()
}

/// Builds the grade-submission payload for one student.
///
/// The aggregate score is posted as the grade; each scored criterion maps
/// its identity to `points` and, only when the trimmed comment is non-empty,
/// `comments`. The comments key is omitted rather than sent blank because
/// some servers reject blank comment fields.
pub fn build_grade_submission(student_id: u64, template: &[TemplateEntry]) -> Value {
    let mut assessment = Map::new();
    for entry in template {
        let score = match entry.score {
            Some(score) => score,
            None => continue, // not yet graded
        };
        let mut cell = Map::new();
        cell.insert("points".to_string(), json!(score));
        let comment = entry.comment.trim();
        if !comment.is_empty() {
            cell.insert("comments".to_string(), json!(comment));
        }
        assessment.insert(entry.criterion_id.clone(), Value::Object(cell));
    }

    json!({
        "submission": {
            "user_id": student_id,
            "posted_grade": total_score(template),
        },
        "rubric_assessment": Value::Object(assessment),
    })
}

/// Pushes one student's aggregated grade and per-criterion assessment in a
/// single write. Failure fails the whole per-student upload and is reported
/// with the student identity and the status/body; nothing is retried.
pub fn push_grade(
    gateway: &dyn Gateway,
    credentials: &ApiCredentials,
    assignment_id: u64,
    student_id: u64,
    template: &[TemplateEntry],
) -> Result<(), SyncError> {
    let url = credentials.course_url(&format!(
        "assignments/{}/submissions/{}",
        assignment_id, student_id
    ));
    let payload = build_grade_submission(student_id, template);
    let response = gateway.execute(HttpMethod::Put(payload), &url, &[])?;
    if !response.is_success() {
        return Err(SyncError::GradeUpload {
            student_id,
            status: response.status,
            body: response.body,
        });
    }
    info!(
        "Grade for student {} uploaded successfully ({} points).",
        student_id,
        total_score(template)
    );
    Ok(())
}
