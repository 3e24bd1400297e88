use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::report::{Attachment, ReportSink, Reporter, Severity, Status, Step, TestMeta};

use super::{CaseInfo, SmokeSuite, SuiteError, Verdict};

#[derive(Debug, Clone, Serialize)]
pub struct CaseOutcome {
    pub id: String,
    pub title: String,
    pub verdict: Option<Verdict>,
    pub message: Option<String>,
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl CaseOutcome {
    /// True when the case ran to completion, whatever its verdict.
    pub fn completed(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SuiteSummary {
    pub suite: String,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub success_rate: f64,
    pub finished_at: DateTime<Utc>,
    pub cases: Vec<CaseOutcome>,
}

impl SuiteSummary {
    fn from_cases(suite: &str, cases: Vec<CaseOutcome>) -> Self {
        let total = cases.len();
        let passed = cases.iter().filter(|case| case.completed()).count();
        let failed = total - passed;
        let success_rate = if total == 0 {
            0.0
        } else {
            passed as f64 / total as f64 * 100.0
        };
        Self {
            suite: suite.to_string(),
            total,
            passed,
            failed,
            success_rate,
            finished_at: Utc::now(),
            cases,
        }
    }

    pub fn has_failed_verdicts(&self) -> bool {
        self.cases
            .iter()
            .any(|case| case.verdict == Some(Verdict::Failed))
    }

    pub fn render(&self) -> String {
        format!(
            "=============================\n\
             TEST RESULTS: {}\n\
             =============================\n\
             Total tests: {}\n\
             Completed: {}\n\
             Execution errors: {}\n\
             Success rate: {:.1}%\n\
             Time: {}\n\
             =============================",
            self.suite,
            self.total,
            self.passed,
            self.failed,
            self.success_rate,
            self.finished_at.format("%Y-%m-%d %H:%M:%S"),
        )
    }
}

/// Runs the cases of a suite one after another, each as its own report
/// test case, pausing after every case.
#[derive(Debug, Clone)]
pub struct SuiteRunner {
    reporter: Arc<Reporter>,
    pause: Duration,
}

impl SuiteRunner {
    pub fn new(reporter: Arc<Reporter>, pause: Duration) -> Self {
        Self { reporter, pause }
    }

    pub fn reporter(&self) -> &Arc<Reporter> {
        &self.reporter
    }

    pub async fn run<S: SmokeSuite + ?Sized>(&self, suite: &mut S) -> SuiteSummary {
        let suite_name = suite.name().to_string();
        let cases: Vec<CaseInfo> = suite.cases().to_vec();
        info!(suite = %suite_name, cases = cases.len(), "starting suite");

        let mut outcomes = Vec::with_capacity(cases.len());
        for (index, case) in cases.iter().enumerate() {
            outcomes.push(self.run_one(suite, &suite_name, index, case).await);
            sleep(self.pause).await;
        }

        if let Err(err) = suite.teardown().await {
            warn!(suite = %suite_name, error = %err, "suite teardown failed");
        }

        let summary = SuiteSummary::from_cases(&suite_name, outcomes);
        self.record_summary(&summary);
        info!(
            suite = %suite_name,
            total = summary.total,
            passed = summary.passed,
            failed = summary.failed,
            "suite finished"
        );
        summary
    }

    async fn run_one<S: SmokeSuite + ?Sized>(
        &self,
        suite: &mut S,
        suite_name: &str,
        index: usize,
        case: &CaseInfo,
    ) -> CaseOutcome {
        self.reporter.start_test(
            TestMeta::new(case.title, format!("{suite_name}::{}", case.id))
                .suite(suite_name)
                .epic(case.epic)
                .feature(case.feature)
                .story(case.story)
                .severity(case.severity),
        );
        info!(suite = %suite_name, case = case.id, "running case");
        let started = Instant::now();

        let step = Step::start(self.reporter.as_ref(), format!("Run test: {}", case.title));
        let result = suite.run_case(index).await;
        let (status, outcome) = match result {
            Ok(report) => {
                step.attach(Attachment::text(
                    "Result",
                    format!("Test '{}' completed successfully\n{}", case.title, report.line()),
                ));
                step.finish(Status::Passed);
                (
                    Status::Passed,
                    CaseOutcome {
                        id: case.id.to_string(),
                        title: case.title.to_string(),
                        verdict: Some(report.verdict),
                        message: Some(report.message),
                        error: None,
                        duration_ms: 0,
                    },
                )
            }
            Err(err) => {
                error!(suite = %suite_name, case = case.id, error = %err, "case failed");
                step.attach(Attachment::text(
                    "Error",
                    format!("Error in test '{}': {err}", case.title),
                ));
                let status = status_for(&err);
                step.finish(status);
                (
                    status,
                    CaseOutcome {
                        id: case.id.to_string(),
                        title: case.title.to_string(),
                        verdict: err.is_assertion().then_some(Verdict::Failed),
                        message: None,
                        error: Some(err.to_string()),
                        duration_ms: 0,
                    },
                )
            }
        };

        let message = outcome.error.clone();
        if let Err(err) = self.reporter.finish_test(status, message) {
            warn!(case = case.id, error = %err, "failed to record test result");
        }
        CaseOutcome {
            duration_ms: started.elapsed().as_millis() as u64,
            ..outcome
        }
    }

    fn record_summary(&self, summary: &SuiteSummary) {
        self.reporter.start_test(
            TestMeta::new(
                format!("{} summary", summary.suite),
                format!("{}::summary", summary.suite),
            )
            .suite(summary.suite.as_str())
            .severity(Severity::Trivial)
            .description(format!(
                "{} of {} test(s) completed",
                summary.passed, summary.total
            )),
        );
        self.reporter
            .attach(Attachment::text("Final report", summary.render()));
        if let Ok(json) = serde_json::to_string_pretty(summary) {
            self.reporter.attach(Attachment::json("Summary", json));
        }
        if let Err(err) = self.reporter.finish_test(Status::Passed, None) {
            warn!(suite = %summary.suite, error = %err, "failed to record suite summary");
        }
    }
}

fn status_for(err: &SuiteError) -> Status {
    if err.is_assertion() {
        Status::Failed
    } else {
        Status::Broken
    }
}
