use crate::connection::Gateway;
use crate::credentials::ApiCredentials;
use crate::error::SyncError;
use crate::pagination::collect_collection;
use crate::rubric::rubric_to_template;
use crate::submission::SubmissionRecord;
use log::{info, warn};
use serde_json::Value;
use std::fs;
use std::path::Path;

/// File name the raw remote rubric is written under in each student folder.
pub const ASSIGNMENT_RUBRIC_FILE: &str = "assignment_rubric.json";
/// File name of the fillable grading template in each student folder.
pub const GRADING_RUBRIC_FILE: &str = "grading_rubric.json";

/// Extensions that trigger the document renderer for a companion file.
const NOTEBOOK_EXTENSIONS: &[&str] = &["ipynb"];

/// Opaque collaborator that turns a structured document on disk into
/// rendered text. Any internal failure surfaces as an error to the caller;
/// the materializer reports it and moves on.
pub trait DocumentRenderer {
    fn render(&self, source: &Path) -> Result<String, SyncError>;
}

/// What one materialization run did, for reporting to the operator.
#[derive(Debug, Default)]
pub struct MaterializeReport {
    pub downloaded: usize,
    pub rendered: usize,
    pub skipped_submissions: usize,
    /// Per-item failure descriptions; a populated list does not make the run
    /// itself a failure.
    pub failures: Vec<String>,
}

/// Materializes every attachment of an assignment into a local hierarchy.
///
/// For each submission in `submitted` or `graded` state, a per-student
/// directory is created under the destination root and every attachment is
/// stream-downloaded into it. A failed individual download is reported and
/// processing continues; only the submission walk itself is fail-fast.
pub struct Materializer<'a> {
    gateway: &'a dyn Gateway,
    credentials: &'a ApiCredentials,
    renderer: Option<&'a dyn DocumentRenderer>,
    rubric: Option<Value>,
}

impl<'a> Materializer<'a> {
    pub fn new(gateway: &'a dyn Gateway, credentials: &'a ApiCredentials) -> Self {
        Materializer {
            gateway,
            credentials,
            renderer: None,
            rubric: None,
        }
    }

    /// Attaches a renderer; notebook attachments then get a rendered `.md`
    /// sibling.
    pub fn with_renderer(mut self, renderer: &'a dyn DocumentRenderer) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Attaches the assignment's rubric; each student folder then receives
    /// the raw rubric and a fresh grading template alongside the downloads.
    pub fn with_rubric(mut self, rubric: Value) -> Self {
        self.rubric = Some(rubric);
        self
    }

    /// Walks the full submission collection for the assignment and persists
    /// every attachment under `<dest_root>/<studentDir>/<displayName>`.
    ///
    /// Side effects are filesystem writes only; the remote is never mutated.
    /// Re-running overwrites downloaded files and reuses directories, so a
    /// crash mid-walk is repaired by running again.
    pub fn materialize(
        &self,
        assignment_id: u64,
        dest_root: &Path,
    ) -> Result<MaterializeReport, SyncError> {
        let url = self
            .credentials
            .course_url(&format!("assignments/{}/submissions", assignment_id));
        let params = vec![
            ("per_page".to_string(), "100".to_string()),
            ("include[]".to_string(), "user".to_string()),
        ];
        let records = collect_collection(self.gateway, &url, &params)?;

        let mut report = MaterializeReport::default();
        for raw in &records {
            let submission = match SubmissionRecord::from_value(raw) {
                Some(submission) => submission,
                None => {
                    report
                        .failures
                        .push("submission record missing user or assignment identity".to_string());
                    continue;
                }
            };

            if !submission.state.materializes() {
                info!(
                    "Skipping submission of user {} in state {:?}.",
                    submission.user_id, submission.state
                );
                report.skipped_submissions += 1;
                continue;
            }

            // Creating an existing directory is not an error.
            let student_dir = dest_root.join(submission.student_dir_name());
            fs::create_dir_all(&student_dir)?;

            for attachment in &submission.attachments {
                let target = student_dir.join(&attachment.display_name);
                match self.gateway.download(&attachment.url, &target) {
                    Ok(()) => {
                        report.downloaded += 1;
                        self.maybe_render(&target, &mut report);
                    }
                    Err(e) => {
                        warn!(
                            "Failed to download '{}' for user {}: {}",
                            attachment.display_name, submission.user_id, e
                        );
                        report.failures.push(format!(
                            "user {}: {}: {}",
                            submission.user_id, attachment.display_name, e
                        ));
                    }
                }
            }

            if let Some(rubric) = &self.rubric {
                if let Err(e) = self.write_rubric_files(&student_dir, rubric) {
                    warn!(
                        "Failed to write rubric files for user {}: {}",
                        submission.user_id, e
                    );
                    report
                        .failures
                        .push(format!("user {}: rubric files: {}", submission.user_id, e));
                }
            }
        }

        info!(
            "Materialized {} attachment(s), skipped {} submission(s), {} failure(s).",
            report.downloaded,
            report.skipped_submissions,
            report.failures.len()
        );
        Ok(report)
    }

    /// Renders a companion document next to a recognized notebook file.
    /// Rendering failures are reported but never block later attachments.
    fn maybe_render(&self, target: &Path, report: &mut MaterializeReport) {
        let renderer = match self.renderer {
            Some(renderer) => renderer,
            None => return,
        };
        let is_notebook = target
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| NOTEBOOK_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
            .unwrap_or(false);
        if !is_notebook {
            return;
        }

        let companion = target.with_extension("md");
        match renderer
            .render(target)
            .and_then(|text| fs::write(&companion, text).map_err(SyncError::from))
        {
            Ok(()) => report.rendered += 1,
            Err(e) => {
                warn!("Failed to render '{}': {}", target.display(), e);
                report
                    .failures
                    .push(format!("render {}: {}", target.display(), e));
            }
        }
    }

    /// Writes the raw rubric and, unless one already exists with instructor
    /// edits, a fresh grading template into the student directory.
    fn write_rubric_files(&self, student_dir: &Path, rubric: &Value) -> Result<(), SyncError> {
        let raw_path = student_dir.join(ASSIGNMENT_RUBRIC_FILE);
        fs::write(&raw_path, serde_json::to_string_pretty(rubric)?)?;

        let template_path = student_dir.join(GRADING_RUBRIC_FILE);
        if !template_path.exists() {
            let template = rubric_to_template(rubric);
            fs::write(&template_path, serde_json::to_string_pretty(&template)?)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{FakeGateway, FakeRenderer};
    use serde_json::json;
    use tempfile::TempDir;

    fn credentials() -> ApiCredentials {
        ApiCredentials {
            institution_url: "https://lms.example".to_string(),
            api_version: "v1".to_string(),
            token: "t".to_string(),
            course_id: 7,
        }
    }

    const SUBMISSIONS_URL: &str =
        "https://lms.example/api/v1/courses/7/assignments/44/submissions";

    fn submitted_with_two_attachments() -> Value {
        json!([{
            "assignment_id": 44,
            "user_id": 321,
            "workflow_state": "submitted",
            "user": {"name": "Jona Jonsdottir"},
            "attachments": [
                {"display_name": "report.pdf", "url": "https://files.example/1"},
                {"display_name": "data.csv", "url": "https://files.example/2"}
            ]
        }])
    }

    #[test]
    fn test_submitted_attachments_land_in_student_dir() {
        let mut gateway = FakeGateway::new();
        gateway.respond_json("GET", SUBMISSIONS_URL, 200, &submitted_with_two_attachments());
        gateway.serve_download("https://files.example/1", b"pdf bytes");
        gateway.serve_download("https://files.example/2", b"a;b;c");

        let root = TempDir::new().unwrap();
        let creds = credentials();
        let report = Materializer::new(&gateway, &creds)
            .materialize(44, root.path())
            .unwrap();

        assert_eq!(report.downloaded, 2);
        assert!(report.failures.is_empty());
        let student_dir = root.path().join("Jona Jonsdottir");
        assert_eq!(
            fs::read(student_dir.join("report.pdf")).unwrap(),
            b"pdf bytes"
        );
        assert_eq!(fs::read(student_dir.join("data.csv")).unwrap(), b"a;b;c");
    }

    #[test]
    fn test_unsubmitted_produces_zero_filesystem_writes() {
        let mut gateway = FakeGateway::new();
        gateway.respond_json(
            "GET",
            SUBMISSIONS_URL,
            200,
            &json!([{
                "assignment_id": 44,
                "user_id": 5,
                "workflow_state": "unsubmitted",
                "attachments": [
                    {"display_name": "ghost.pdf", "url": "https://files.example/9"}
                ]
            }]),
        );

        let root = TempDir::new().unwrap();
        let creds = credentials();
        let report = Materializer::new(&gateway, &creds)
            .materialize(44, root.path())
            .unwrap();

        assert_eq!(report.downloaded, 0);
        assert_eq!(report.skipped_submissions, 1);
        assert!(gateway.downloaded.borrow().is_empty());
        assert_eq!(fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_failed_download_is_tolerated_and_reported() {
        let mut gateway = FakeGateway::new();
        gateway.respond_json("GET", SUBMISSIONS_URL, 200, &submitted_with_two_attachments());
        // Only the second attachment is downloadable.
        gateway.serve_download("https://files.example/2", b"a;b;c");

        let root = TempDir::new().unwrap();
        let creds = credentials();
        let report = Materializer::new(&gateway, &creds)
            .materialize(44, root.path())
            .unwrap();

        assert_eq!(report.downloaded, 1);
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].contains("report.pdf"));
        assert!(root
            .path()
            .join("Jona Jonsdottir")
            .join("data.csv")
            .exists());
    }

    #[test]
    fn test_notebook_attachment_gets_rendered_companion() {
        let mut gateway = FakeGateway::new();
        gateway.respond_json(
            "GET",
            SUBMISSIONS_URL,
            200,
            &json!([{
                "assignment_id": 44,
                "user_id": 6,
                "workflow_state": "graded",
                "user": {"name": "Kari"},
                "attachments": [
                    {"display_name": "analysis.ipynb", "url": "https://files.example/nb"}
                ]
            }]),
        );
        gateway.serve_download("https://files.example/nb", b"{\"cells\": []}");

        let root = TempDir::new().unwrap();
        let creds = credentials();
        let renderer = FakeRenderer::new("# rendered notebook");
        let report = Materializer::new(&gateway, &creds)
            .with_renderer(&renderer)
            .materialize(44, root.path())
            .unwrap();

        assert_eq!(report.rendered, 1);
        let companion = root.path().join("Kari").join("analysis.md");
        assert_eq!(
            fs::read_to_string(companion).unwrap(),
            "# rendered notebook"
        );
    }

    #[test]
    fn test_render_failure_does_not_block_later_attachments() {
        let mut gateway = FakeGateway::new();
        gateway.respond_json(
            "GET",
            SUBMISSIONS_URL,
            200,
            &json!([{
                "assignment_id": 44,
                "user_id": 6,
                "workflow_state": "submitted",
                "user": {"name": "Kari"},
                "attachments": [
                    {"display_name": "analysis.ipynb", "url": "https://files.example/nb"},
                    {"display_name": "readme.txt", "url": "https://files.example/txt"}
                ]
            }]),
        );
        gateway.serve_download("https://files.example/nb", b"{}");
        gateway.serve_download("https://files.example/txt", b"hello");

        let root = TempDir::new().unwrap();
        let creds = credentials();
        let renderer = FakeRenderer::failing();
        let report = Materializer::new(&gateway, &creds)
            .with_renderer(&renderer)
            .materialize(44, root.path())
            .unwrap();

        assert_eq!(report.downloaded, 2);
        assert_eq!(report.rendered, 0);
        assert_eq!(report.failures.len(), 1);
        assert!(root.path().join("Kari").join("readme.txt").exists());
    }

    #[test]
    fn test_rubric_sidecar_files_written_once() {
        let mut gateway = FakeGateway::new();
        gateway.respond_json("GET", SUBMISSIONS_URL, 200, &submitted_with_two_attachments());
        gateway.serve_download("https://files.example/1", b"x");
        gateway.serve_download("https://files.example/2", b"y");

        let rubric = json!({
            "id": 88,
            "data": [{"id": "_c1", "description": "Analysis", "points": 10.0}]
        });

        let root = TempDir::new().unwrap();
        let creds = credentials();
        let student_dir = root.path().join("Jona Jonsdottir");

        // Simulate an instructor-edited template surviving a re-run.
        fs::create_dir_all(&student_dir).unwrap();
        fs::write(student_dir.join(GRADING_RUBRIC_FILE), "[{\"edited\": true}]").unwrap();

        Materializer::new(&gateway, &creds)
            .with_rubric(rubric)
            .materialize(44, root.path())
            .unwrap();

        assert!(student_dir.join(ASSIGNMENT_RUBRIC_FILE).exists());
        let template = fs::read_to_string(student_dir.join(GRADING_RUBRIC_FILE)).unwrap();
        assert!(template.contains("edited"));
    }

    #[test]
    fn test_submission_walk_failure_aborts_whole_run() {
        let mut gateway = FakeGateway::new();
        gateway.respond("GET", SUBMISSIONS_URL, 500, "boom");

        let root = TempDir::new().unwrap();
        let creds = credentials();
        match Materializer::new(&gateway, &creds).materialize(44, root.path()) {
            Err(SyncError::RemoteFetch { status: 500, body }) => assert_eq!(body, "boom"),
            other => panic!("expected RemoteFetch, got {:?}", other),
        }
    }
}
