mod api;
mod error;
mod runner;
mod ui;

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;

use crate::report::Severity;

pub use api::{classify_cart, classify_categories, classify_health, classify_search, ApiSuite};
pub use api::{content_checks, rate_response_time, ContentCheck};
pub use error::{SuiteError, SuiteResult};
pub use runner::{CaseOutcome, SuiteRunner, SuiteSummary};
pub use ui::UiSuite;

/// Per-case classification recorded for human review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Passed,
    Warning,
    Failed,
}

impl Verdict {
    pub fn symbol(&self) -> &'static str {
        match self {
            Verdict::Passed => "✅",
            Verdict::Warning => "⚠️",
            Verdict::Failed => "❌",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Verdict::Passed => "passed",
            Verdict::Warning => "warning",
            Verdict::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// What a case observed, as shown in the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaseReport {
    pub verdict: Verdict,
    pub message: String,
}

impl CaseReport {
    pub fn new(verdict: Verdict, message: impl Into<String>) -> Self {
        Self {
            verdict,
            message: message.into(),
        }
    }

    pub fn passed(message: impl Into<String>) -> Self {
        Self::new(Verdict::Passed, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Verdict::Warning, message)
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::new(Verdict::Failed, message)
    }

    /// Message prefixed with the verdict symbol.
    pub fn line(&self) -> String {
        format!("{} {}", self.verdict.symbol(), self.message)
    }
}

/// Static description of one test case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaseInfo {
    pub id: &'static str,
    pub title: &'static str,
    pub epic: &'static str,
    pub feature: &'static str,
    pub story: &'static str,
    pub severity: Severity,
}

/// An ordered set of smoke checks run by [`SuiteRunner`].
#[async_trait(?Send)]
pub trait SmokeSuite {
    fn name(&self) -> &str;

    fn cases(&self) -> &[CaseInfo];

    async fn run_case(&mut self, index: usize) -> SuiteResult<CaseReport>;

    async fn teardown(&mut self) -> SuiteResult<()> {
        Ok(())
    }
}
