use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use reqwest::redirect::Policy;
use reqwest::Method;
use tokio::time::sleep;
use tracing::{debug, warn};
use url::Url;

use crate::config::TargetSection;
use crate::report::{Attachment, ReportSink, Step};

use super::error::{ClientError, ClientResult};
use super::outcome::{FailureKind, FetchOutcome, HttpResponse, TransportFailure};
use super::retry::RetryPolicy;

pub const DEFAULT_MAX_REDIRECTS: usize = 5;

/// One logical request against the shop: method, path and query, plus how
/// many redirect hops may be followed.
#[derive(Debug, Clone)]
pub struct ShopRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    follow_redirects: bool,
    max_redirects: usize,
}

impl ShopRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            follow_redirects: true,
            max_redirects: DEFAULT_MAX_REDIRECTS,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn follow_redirects(mut self, follow: bool) -> Self {
        self.follow_redirects = follow;
        self
    }

    pub fn max_redirects(mut self, max: usize) -> Self {
        self.max_redirects = max;
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn params(&self) -> &[(String, String)] {
        &self.query
    }

    /// Hops the session may follow for this request.
    pub fn redirect_cap(&self) -> usize {
        if self.follow_redirects {
            self.max_redirects
        } else {
            0
        }
    }
}

/// Shared HTTP session for the target shop.
///
/// Redirects are followed by reqwest itself; one client is kept per distinct
/// hop cap because the redirect policy is fixed at build time.
pub struct ShopClient {
    base_url: Url,
    timeout: Duration,
    headers: HeaderMap,
    retry: RetryPolicy,
    clients: Mutex<HashMap<usize, reqwest::Client>>,
    sink: Arc<dyn ReportSink>,
}

impl fmt::Debug for ShopClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShopClient")
            .field("base_url", &self.base_url.as_str())
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl ShopClient {
    pub fn new(target: &TargetSection, sink: Arc<dyn ReportSink>) -> ClientResult<Self> {
        let base_url = Url::parse(&target.base_url).map_err(|source| ClientError::BaseUrl {
            url: target.base_url.clone(),
            source,
        })?;
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&target.user_agent)
                .map_err(|_| ClientError::Header("user-agent"))?,
        );
        headers.insert(
            ACCEPT,
            HeaderValue::from_str(&target.accept).map_err(|_| ClientError::Header("accept"))?,
        );
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_str(&target.accept_language)
                .map_err(|_| ClientError::Header("accept-language"))?,
        );
        let client = Self {
            base_url,
            timeout: target.timeout(),
            headers,
            retry: RetryPolicy::standard(),
            clients: Mutex::new(HashMap::new()),
            sink,
        };
        client.client_for(DEFAULT_MAX_REDIRECTS)?;
        Ok(client)
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn sink(&self) -> &dyn ReportSink {
        self.sink.as_ref()
    }

    /// Base URL with `path` appended verbatim, as the shop's paths are absolute.
    pub fn url_for(&self, path: &str) -> Result<Url, url::ParseError> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Url::parse(&format!("{base}{path}"))
    }

    /// Issues the request and always returns an outcome; transport faults
    /// come back as [`FetchOutcome::Failed`].
    pub async fn execute(&self, request: &ShopRequest) -> FetchOutcome {
        let step = Step::start(
            self.sink(),
            format!("HTTP request: {} {}", request.method(), request.path()),
        );
        let target = self.url_for(request.path()).map(|mut url| {
            if !request.params().is_empty() {
                url.query_pairs_mut().extend_pairs(request.params());
            }
            url
        });

        let mut details = format!("URL: {}", self.url_display(request.path()));
        if !request.params().is_empty() {
            details.push_str(&format!("\nParams: {}", render_params(request.params())));
        }
        step.attach(Attachment::text("Request details", details));

        let outcome = match target {
            Ok(url) => self.send_with_retry(request, url).await,
            Err(err) => FetchOutcome::Failed(TransportFailure {
                url: self.url_display(request.path()),
                message: err.to_string(),
                kind: FailureKind::Other,
                attempts: 0,
            }),
        };

        match &outcome {
            FetchOutcome::Response(response) => {
                debug!(
                    status = response.status,
                    url = %response.url,
                    bytes = response.body.len(),
                    attempts = response.attempts,
                    "request completed"
                );
                step.attach(Attachment::text(
                    "Response info",
                    format!(
                        "Status: {}\nURL: {}\nSize: {} bytes",
                        response.status,
                        response.url,
                        response.body.len()
                    ),
                ));
            }
            FetchOutcome::Failed(failure) => {
                warn!(
                    url = %failure.url,
                    kind = %failure.kind,
                    attempts = failure.attempts,
                    error = %failure.message,
                    "request failed"
                );
                step.attach(Attachment::text(
                    "Request error",
                    format!("Request failed: {}", failure.message),
                ));
            }
        }
        outcome
    }

    fn url_display(&self, path: &str) -> String {
        format!("{}{}", self.base_url.as_str().trim_end_matches('/'), path)
    }

    async fn send_with_retry(&self, request: &ShopRequest, url: Url) -> FetchOutcome {
        let requested_url = url.to_string();
        let client = match self.client_for(request.redirect_cap()) {
            Ok(client) => client,
            Err(err) => {
                return FetchOutcome::Failed(TransportFailure {
                    url: requested_url,
                    message: err.to_string(),
                    kind: FailureKind::Other,
                    attempts: 0,
                })
            }
        };
        let method = request.method().clone();
        let started = Instant::now();
        let mut attempt = 0usize;
        loop {
            attempt += 1;
            debug!(method = %method, url = %requested_url, attempt, "sending request");
            match client.request(method.clone(), url.clone()).send().await {
                Ok(response) => {
                    let status = response.status().as_u16();
                    if self.retry.is_retryable_status(&method, status) {
                        if attempt <= self.retry.total() {
                            let delay =
                                self.retry
                                    .delay_before(attempt, Some(status), Some(response.headers()));
                            warn!(
                                status,
                                attempt,
                                delay_ms = delay.as_millis() as u64,
                                url = %requested_url,
                                "retryable status, retrying"
                            );
                            drop(response);
                            sleep(delay).await;
                            continue;
                        }
                        return FetchOutcome::Failed(TransportFailure {
                            message: format!(
                                "max retries exceeded with url {requested_url}: too many {status} error responses"
                            ),
                            url: requested_url,
                            kind: FailureKind::RetriesExhausted {
                                last_status: status,
                            },
                            attempts: attempt,
                        });
                    }
                    let final_url = response.url().to_string();
                    let headers = response.headers().clone();
                    return match response.bytes().await {
                        Ok(body) => FetchOutcome::Response(HttpResponse {
                            status,
                            requested_url,
                            url: final_url,
                            headers,
                            body: body.to_vec(),
                            elapsed: started.elapsed(),
                            attempts: attempt,
                        }),
                        Err(err) => FetchOutcome::Failed(TransportFailure {
                            url: requested_url,
                            message: err.to_string(),
                            kind: FailureKind::Body,
                            attempts: attempt,
                        }),
                    };
                }
                Err(err) => {
                    let kind = FailureKind::classify(&err);
                    if attempt <= self.retry.total() && self.retry.is_retryable_failure(&method, &kind)
                    {
                        let delay = self.retry.delay_before(attempt, None, None);
                        warn!(
                            error = %err,
                            kind = %kind,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            "transport error, retrying"
                        );
                        sleep(delay).await;
                        continue;
                    }
                    return FetchOutcome::Failed(TransportFailure {
                        url: requested_url,
                        message: err.to_string(),
                        kind,
                        attempts: attempt,
                    });
                }
            }
        }
    }

    fn client_for(&self, cap: usize) -> ClientResult<reqwest::Client> {
        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(client) = clients.get(&cap) {
            return Ok(client.clone());
        }
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .default_headers(self.headers.clone())
            .danger_accept_invalid_certs(true)
            .redirect(redirect_policy(cap))
            .build()?;
        clients.insert(cap, client.clone());
        Ok(client)
    }
}

/// Follows at most `cap` hops; once the cap is reached the 3xx response is
/// returned as-is instead of an error.
fn redirect_policy(cap: usize) -> Policy {
    if cap == 0 {
        return Policy::none();
    }
    Policy::custom(move |attempt| {
        // previous() holds the original URL plus every hop already followed
        if attempt.previous().len() > cap {
            attempt.stop()
        } else {
            attempt.follow()
        }
    })
}

fn render_params(params: &[(String, String)]) -> String {
    let pairs = params
        .iter()
        .map(|(key, value)| format!("'{key}': '{value}'"))
        .collect::<Vec<_>>();
    format!("{{{}}}", pairs.join(", "))
}
