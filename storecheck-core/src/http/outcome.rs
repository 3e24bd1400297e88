use std::borrow::Cow;
use std::fmt;
use std::time::Duration;

use reqwest::header::HeaderMap;
use serde::Serialize;

/// Status reported for a request that never produced a real response.
pub const SYNTHETIC_STATUS: u16 = 500;

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub requested_url: String,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
    pub elapsed: Duration,
    pub attempts: usize,
}

impl HttpResponse {
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    pub fn was_redirected(&self) -> bool {
        self.url != self.requested_url
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureKind {
    Connect,
    Timeout,
    Body,
    RetriesExhausted { last_status: u16 },
    Other,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Connect => f.write_str("connect"),
            FailureKind::Timeout => f.write_str("timeout"),
            FailureKind::Body => f.write_str("body"),
            FailureKind::RetriesExhausted { last_status } => {
                write!(f, "retries exhausted (last status {last_status})")
            }
            FailureKind::Other => f.write_str("other"),
        }
    }
}

impl FailureKind {
    pub(crate) fn classify(error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            FailureKind::Timeout
        } else if error.is_connect() {
            FailureKind::Connect
        } else if error.is_body() || error.is_decode() {
            FailureKind::Body
        } else {
            FailureKind::Other
        }
    }
}

/// A transport fault converted into a value: the synthetic stand-in for a
/// response that never arrived.
#[derive(Debug, Clone, Serialize)]
pub struct TransportFailure {
    pub url: String,
    pub message: String,
    pub kind: FailureKind,
    pub attempts: usize,
}

#[derive(Debug, Clone)]
pub enum FetchOutcome {
    Response(HttpResponse),
    Failed(TransportFailure),
}

impl FetchOutcome {
    pub fn status(&self) -> u16 {
        match self {
            FetchOutcome::Response(response) => response.status,
            FetchOutcome::Failed(_) => SYNTHETIC_STATUS,
        }
    }

    /// Final URL of a response, or the originally requested URL of a failure.
    pub fn url(&self) -> &str {
        match self {
            FetchOutcome::Response(response) => &response.url,
            FetchOutcome::Failed(failure) => &failure.url,
        }
    }

    pub fn text(&self) -> Cow<'_, str> {
        match self {
            FetchOutcome::Response(response) => response.text(),
            FetchOutcome::Failed(failure) => Cow::Borrowed(&failure.message),
        }
    }

    pub fn body_len(&self) -> usize {
        match self {
            FetchOutcome::Response(response) => response.body.len(),
            FetchOutcome::Failed(failure) => failure.message.len(),
        }
    }

    pub fn attempts(&self) -> usize {
        match self {
            FetchOutcome::Response(response) => response.attempts,
            FetchOutcome::Failed(failure) => failure.attempts,
        }
    }

    pub fn response(&self) -> Option<&HttpResponse> {
        match self {
            FetchOutcome::Response(response) => Some(response),
            FetchOutcome::Failed(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&TransportFailure> {
        match self {
            FetchOutcome::Response(_) => None,
            FetchOutcome::Failed(failure) => Some(failure),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, FetchOutcome::Failed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_behaves_like_a_server_error_response() {
        let outcome = FetchOutcome::Failed(TransportFailure {
            url: "https://shop.test/catalog".into(),
            message: "error sending request".into(),
            kind: FailureKind::Connect,
            attempts: 4,
        });
        assert_eq!(outcome.status(), 500);
        assert_eq!(outcome.url(), "https://shop.test/catalog");
        assert_eq!(outcome.text(), "error sending request");
        assert_eq!(outcome.body_len(), "error sending request".len());
        assert!(outcome.response().is_none());
    }

    #[test]
    fn kind_serializes_with_tag() {
        let value =
            serde_json::to_value(FailureKind::RetriesExhausted { last_status: 503 }).unwrap();
        assert_eq!(value["kind"], "retries_exhausted");
        assert_eq!(value["last_status"], 503);
    }
}
