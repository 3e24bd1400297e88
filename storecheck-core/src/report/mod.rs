mod allure;
mod error;
mod reporter;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use allure::{AttachmentRef, Label, Stage, StatusDetails, StepResult, TestResult};
pub use error::{ReportError, ReportResult};
pub use reporter::{Reporter, TestMeta};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Passed,
    Failed,
    Broken,
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Blocker,
    Critical,
    Normal,
    Minor,
    Trivial,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Severity::Blocker => "blocker",
            Severity::Critical => "critical",
            Severity::Normal => "normal",
            Severity::Minor => "minor",
            Severity::Trivial => "trivial",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Text,
    Png,
    Json,
}

impl ContentType {
    pub fn mime(&self) -> &'static str {
        match self {
            ContentType::Text => "text/plain",
            ContentType::Png => "image/png",
            ContentType::Json => "application/json",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ContentType::Text => "txt",
            ContentType::Png => "png",
            ContentType::Json => "json",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachmentBody {
    Text(String),
    Binary(Vec<u8>),
}

impl AttachmentBody {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            AttachmentBody::Text(text) => text.as_bytes(),
            AttachmentBody::Binary(bytes) => bytes,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttachmentBody::Text(text) => Some(text),
            AttachmentBody::Binary(_) => None,
        }
    }
}

/// One (label, content, content-type) triple handed to a [`ReportSink`].
#[derive(Debug, Clone)]
pub struct Attachment {
    pub name: String,
    pub body: AttachmentBody,
    pub content_type: ContentType,
}

impl Attachment {
    pub fn text(name: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            body: AttachmentBody::Text(body.into()),
            content_type: ContentType::Text,
        }
    }

    pub fn png(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            body: AttachmentBody::Binary(bytes),
            content_type: ContentType::Png,
        }
    }

    pub fn json(name: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            body: AttachmentBody::Text(body.into()),
            content_type: ContentType::Json,
        }
    }
}

/// Write-only destination for report steps and attachments.
///
/// Producers never read back from a sink and a sink never fails the caller:
/// implementations log their own I/O problems.
pub trait ReportSink: Send + Sync {
    fn attach(&self, attachment: Attachment);
    fn start_step(&self, name: &str);
    fn finish_step(&self, status: Status);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl ReportSink for NoopSink {
    fn attach(&self, _attachment: Attachment) {}
    fn start_step(&self, _name: &str) {}
    fn finish_step(&self, _status: Status) {}
}

/// Open report step, closed as passed on drop unless finished explicitly.
pub struct Step<'a> {
    sink: &'a dyn ReportSink,
    finished: bool,
}

impl<'a> Step<'a> {
    pub fn start(sink: &'a dyn ReportSink, name: impl AsRef<str>) -> Self {
        sink.start_step(name.as_ref());
        Self {
            sink,
            finished: false,
        }
    }

    pub fn attach(&self, attachment: Attachment) {
        self.sink.attach(attachment);
    }

    pub fn finish(mut self, status: Status) {
        self.finished = true;
        self.sink.finish_step(status);
    }
}

impl Drop for Step<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.sink.finish_step(Status::Passed);
        }
    }
}
