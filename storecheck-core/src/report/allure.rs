//! Allure 2 result-file model.
//!
//! A finished test case becomes `<uuid>-result.json` in the results directory;
//! every attachment is a sibling file referenced by `source`.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::error::ReportResult;
use super::Status;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Running,
    Finished,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
    pub value: String,
}

impl Label {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRef {
    pub name: String,
    pub source: String,
    #[serde(rename = "type")]
    pub content_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepResult {
    pub name: String,
    pub status: Status,
    pub stage: Stage,
    pub start: i64,
    pub stop: i64,
    #[serde(default)]
    pub steps: Vec<StepResult>,
    #[serde(default)]
    pub attachments: Vec<AttachmentRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    pub uuid: String,
    pub history_id: String,
    pub name: String,
    pub full_name: String,
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_details: Option<StatusDetails>,
    pub stage: Stage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub start: i64,
    pub stop: i64,
    #[serde(default)]
    pub labels: Vec<Label>,
    #[serde(default)]
    pub steps: Vec<StepResult>,
    #[serde(default)]
    pub attachments: Vec<AttachmentRef>,
}

impl TestResult {
    pub fn label(&self, name: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|label| label.name == name)
            .map(|label| label.value.as_str())
    }

    /// Every attachment of the test case, steps included, in recording order.
    pub fn all_attachments(&self) -> Vec<&AttachmentRef> {
        fn walk<'a>(steps: &'a [StepResult], out: &mut Vec<&'a AttachmentRef>) {
            for step in steps {
                walk(&step.steps, out);
                out.extend(step.attachments.iter());
            }
        }
        let mut out = Vec::new();
        walk(&self.steps, &mut out);
        out.extend(self.attachments.iter());
        out
    }
}

pub(crate) fn attachment_source(uuid: &str, extension: &str) -> String {
    format!("{uuid}-attachment.{extension}")
}

pub(crate) fn write_attachment(dir: &Path, source: &str, bytes: &[u8]) -> ReportResult<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(source);
    fs::write(&path, bytes)?;
    Ok(path)
}

pub(crate) fn write_result(dir: &Path, result: &TestResult) -> ReportResult<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(format!("{}-result.json", result.uuid));
    let json = serde_json::to_vec_pretty(result)?;
    fs::write(&path, json)?;
    Ok(path)
}
