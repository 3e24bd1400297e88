use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::allure::{
    attachment_source, write_attachment, write_result, AttachmentRef, Label, Stage,
    StatusDetails, StepResult, TestResult,
};
use super::error::{ReportError, ReportResult};
use super::{Attachment, AttachmentBody, ReportSink, Severity, Status};

#[derive(Debug, Clone)]
pub struct TestMeta {
    pub name: String,
    pub full_name: String,
    pub description: Option<String>,
    pub labels: Vec<Label>,
}

impl TestMeta {
    pub fn new(name: impl Into<String>, full_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            full_name: full_name.into(),
            description: None,
            labels: Vec::new(),
        }
    }

    pub fn label(mut self, name: &str, value: impl Into<String>) -> Self {
        self.labels.push(Label::new(name, value));
        self
    }

    pub fn epic(self, value: impl Into<String>) -> Self {
        self.label("epic", value)
    }

    pub fn feature(self, value: impl Into<String>) -> Self {
        self.label("feature", value)
    }

    pub fn story(self, value: impl Into<String>) -> Self {
        self.label("story", value)
    }

    pub fn suite(self, value: impl Into<String>) -> Self {
        self.label("suite", value)
    }

    pub fn severity(self, severity: Severity) -> Self {
        self.label("severity", severity.to_string())
    }

    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }
}

#[derive(Debug)]
struct OpenTest {
    result: TestResult,
    open_steps: Vec<StepResult>,
}

#[derive(Debug, Default)]
struct ReporterState {
    current: Option<OpenTest>,
    completed: Vec<TestResult>,
    retained: Vec<(String, AttachmentBody)>,
}

/// Collects test cases, steps and attachments and writes them as Allure results.
///
/// Without a results directory everything stays in memory, which is what the
/// test-suite and runs with `reporting.enabled = false` use.
#[derive(Debug)]
pub struct Reporter {
    results_dir: Option<PathBuf>,
    state: Mutex<ReporterState>,
}

impl Reporter {
    pub fn in_memory() -> Self {
        Self {
            results_dir: None,
            state: Mutex::new(ReporterState::default()),
        }
    }

    pub fn with_results_dir(dir: impl AsRef<Path>) -> ReportResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            results_dir: Some(dir),
            state: Mutex::new(ReporterState::default()),
        })
    }

    pub fn results_dir(&self) -> Option<&Path> {
        self.results_dir.as_deref()
    }

    fn lock(&self) -> MutexGuard<'_, ReporterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn start_test(&self, meta: TestMeta) {
        let mut state = self.lock();
        if let Some(open) = state.current.take() {
            warn!(test = %open.result.name, "test case still open, closing as broken");
            let result = close_test(open, Status::Broken, None);
            self.persist(&result);
            state.completed.push(result);
        }
        let now = Utc::now().timestamp_millis();
        state.current = Some(OpenTest {
            result: TestResult {
                uuid: Uuid::new_v4().to_string(),
                history_id: meta.full_name.clone(),
                name: meta.name,
                full_name: meta.full_name,
                status: Status::Passed,
                status_details: None,
                stage: Stage::Running,
                description: meta.description,
                start: now,
                stop: now,
                labels: meta.labels,
                steps: Vec::new(),
                attachments: Vec::new(),
            },
            open_steps: Vec::new(),
        });
    }

    /// Closes the open test case; dangling steps are closed as broken.
    pub fn finish_test(&self, status: Status, message: Option<String>) -> ReportResult<TestResult> {
        let mut state = self.lock();
        let open = state.current.take().ok_or(ReportError::NoOpenTest)?;
        let result = close_test(open, status, message);
        if let Some(dir) = &self.results_dir {
            write_result(dir, &result)?;
        }
        state.completed.push(result.clone());
        Ok(result)
    }

    pub fn completed(&self) -> Vec<TestResult> {
        self.lock().completed.clone()
    }

    /// Text bodies of attachments with the given name, in recording order.
    /// Only populated for in-memory reporters.
    pub fn texts_named(&self, name: &str) -> Vec<String> {
        self.lock()
            .retained
            .iter()
            .filter(|(candidate, _)| candidate == name)
            .filter_map(|(_, body)| body.as_text().map(str::to_string))
            .collect()
    }

    fn persist(&self, result: &TestResult) {
        if let Some(dir) = &self.results_dir {
            if let Err(err) = write_result(dir, result) {
                warn!(error = %err, test = %result.name, "failed to write test result");
            }
        }
    }
}

fn close_test(mut open: OpenTest, status: Status, message: Option<String>) -> TestResult {
    let now = Utc::now().timestamp_millis();
    while let Some(step) = open.open_steps.pop() {
        let step = close_step(step, Status::Broken, now);
        match open.open_steps.last_mut() {
            Some(parent) => parent.steps.push(step),
            None => open.result.steps.push(step),
        }
    }
    open.result.status = status;
    open.result.status_details = message.map(|message| StatusDetails {
        message: Some(message),
        trace: None,
    });
    open.result.stage = Stage::Finished;
    open.result.stop = now;
    open.result
}

fn close_step(mut step: StepResult, status: Status, now: i64) -> StepResult {
    step.status = status;
    step.stage = Stage::Finished;
    step.stop = now;
    step
}

impl ReportSink for Reporter {
    fn attach(&self, attachment: Attachment) {
        let mut state = self.lock();
        if self.results_dir.is_none() {
            state
                .retained
                .push((attachment.name.clone(), attachment.body.clone()));
        }
        let Some(open) = state.current.as_mut() else {
            debug!(name = %attachment.name, "attachment outside of a test case");
            return;
        };
        let source = attachment_source(
            &Uuid::new_v4().to_string(),
            attachment.content_type.extension(),
        );
        if let Some(dir) = &self.results_dir {
            if let Err(err) = write_attachment(dir, &source, attachment.body.as_bytes()) {
                warn!(error = %err, name = %attachment.name, "failed to write attachment");
                return;
            }
        }
        let reference = AttachmentRef {
            name: attachment.name,
            source,
            content_type: attachment.content_type.mime().to_string(),
        };
        match open.open_steps.last_mut() {
            Some(step) => step.attachments.push(reference),
            None => open.result.attachments.push(reference),
        }
    }

    fn start_step(&self, name: &str) {
        let mut state = self.lock();
        let Some(open) = state.current.as_mut() else {
            debug!(step = name, "step outside of a test case");
            return;
        };
        let now = Utc::now().timestamp_millis();
        open.open_steps.push(StepResult {
            name: name.to_string(),
            status: Status::Passed,
            stage: Stage::Running,
            start: now,
            stop: now,
            steps: Vec::new(),
            attachments: Vec::new(),
        });
    }

    fn finish_step(&self, status: Status) {
        let mut state = self.lock();
        let Some(open) = state.current.as_mut() else {
            return;
        };
        let Some(step) = open.open_steps.pop() else {
            debug!("finish_step without an open step");
            return;
        };
        let step = close_step(step, status, Utc::now().timestamp_millis());
        match open.open_steps.last_mut() {
            Some(parent) => parent.steps.push(step),
            None => open.result.steps.push(step),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::Step;
    use tempfile::tempdir;

    #[test]
    fn nests_steps_and_routes_attachments_to_innermost_step() {
        let reporter = Reporter::in_memory();
        reporter.start_test(
            TestMeta::new("Search", "api::search")
                .feature("Search")
                .severity(Severity::Critical),
        );
        {
            let outer = Step::start(&reporter, "Search products: 'книга'");
            {
                let inner = Step::start(&reporter, "HTTP request: GET /search");
                inner.attach(Attachment::text("Request details", "URL: http://x/search"));
            }
            outer.attach(Attachment::text("Search result", "ok"));
        }
        let result = reporter.finish_test(Status::Passed, None).unwrap();

        assert_eq!(result.stage, Stage::Finished);
        assert_eq!(result.label("severity"), Some("critical"));
        assert_eq!(result.steps.len(), 1);
        let outer = &result.steps[0];
        assert_eq!(outer.attachments[0].name, "Search result");
        assert_eq!(outer.steps[0].name, "HTTP request: GET /search");
        assert_eq!(outer.steps[0].attachments[0].name, "Request details");
        assert_eq!(
            reporter.texts_named("Request details"),
            vec!["URL: http://x/search".to_string()]
        );
    }

    #[test]
    fn dangling_steps_close_as_broken() {
        let reporter = Reporter::in_memory();
        reporter.start_test(TestMeta::new("t", "suite::t"));
        reporter.start_step("never finished");
        let result = reporter
            .finish_test(Status::Failed, Some("boom".into()))
            .unwrap();
        assert_eq!(result.steps[0].status, Status::Broken);
        assert_eq!(
            result.status_details.unwrap().message.as_deref(),
            Some("boom")
        );
    }

    #[test]
    fn finish_without_open_test_is_an_error() {
        let reporter = Reporter::in_memory();
        assert!(matches!(
            reporter.finish_test(Status::Passed, None),
            Err(ReportError::NoOpenTest)
        ));
    }

    #[test]
    fn writes_result_and_attachment_files() {
        let dir = tempdir().unwrap();
        let reporter = Reporter::with_results_dir(dir.path()).unwrap();
        reporter.start_test(TestMeta::new("Cart", "api::cart"));
        reporter.attach(Attachment::text("Details", "Status code: 200"));
        reporter.attach(Attachment::png("Screen", vec![0x89, b'P', b'N', b'G']));
        let result = reporter.finish_test(Status::Passed, None).unwrap();

        let result_file = dir.path().join(format!("{}-result.json", result.uuid));
        assert!(result_file.exists());
        assert_eq!(result.attachments.len(), 2);
        let text = &result.attachments[0];
        assert!(text.source.ends_with(".txt"));
        assert_eq!(
            std::fs::read_to_string(dir.path().join(&text.source)).unwrap(),
            "Status code: 200"
        );
        assert_eq!(result.attachments[1].content_type, "image/png");
        assert!(reporter.texts_named("Details").is_empty());
    }

    #[test]
    fn starting_a_new_test_closes_the_previous_one() {
        let reporter = Reporter::in_memory();
        reporter.start_test(TestMeta::new("first", "s::first"));
        reporter.start_test(TestMeta::new("second", "s::second"));
        reporter.finish_test(Status::Passed, None).unwrap();
        let completed = reporter.completed();
        assert_eq!(completed.len(), 2);
        assert_eq!(completed[0].status, Status::Broken);
        assert_eq!(completed[1].name, "second");
    }
}
