use thiserror::Error;

pub type ClientResult<T> = Result<T, ClientError>;

/// Errors raised while building the HTTP session. Request-time failures are
/// never errors: they come back as [`super::FetchOutcome::Failed`].
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid base url {url}: {source}")]
    BaseUrl {
        url: String,
        source: url::ParseError,
    },
    #[error("invalid header value for {0}")]
    Header(&'static str),
    #[error("failed to build http client: {0}")]
    Build(#[from] reqwest::Error),
}
