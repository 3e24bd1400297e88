pub mod browser;
pub mod config;
pub mod error;
pub mod http;
pub mod report;
pub mod suite;

pub use browser::{
    BrowserError, BrowserLauncher, BrowserResult, BrowserSession, ChromiumPage, Locator, Lookup,
    PageDriver, StorefrontPage,
};
pub use config::{load_config, StorecheckConfig, DEFAULT_BASE_URL, DEFAULT_SEARCH_QUERY};
pub use error::{ConfigError, Result};
pub use http::{FetchOutcome, HttpResponse, ShopClient, ShopRequest, StorefrontApi};
pub use report::{Attachment, NoopSink, ReportSink, Reporter};
pub use suite::{ApiSuite, SmokeSuite, SuiteRunner, SuiteSummary, UiSuite, Verdict};
