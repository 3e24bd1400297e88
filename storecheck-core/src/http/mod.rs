mod api;
mod client;
mod error;
mod outcome;
mod retry;

pub use api::{preview, StorefrontApi, CONTENT_PREVIEW_CHARS};
pub use client::{ShopClient, ShopRequest, DEFAULT_MAX_REDIRECTS};
pub use error::{ClientError, ClientResult};
pub use outcome::{FailureKind, FetchOutcome, HttpResponse, TransportFailure, SYNTHETIC_STATUS};
pub use retry::RetryPolicy;
