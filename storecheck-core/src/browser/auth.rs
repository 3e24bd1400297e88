use tracing::info;

use crate::report::{Attachment, ReportSink, Step};

use super::driver::{BrowserCookie, PageDriver};
use super::error::BrowserResult;

pub const AUTH_COOKIE_NAME: &str = "auth_token";

pub fn auth_cookie(token: &str, domain: &str) -> BrowserCookie {
    BrowserCookie {
        name: AUTH_COOKIE_NAME.to_string(),
        value: token.to_string(),
        domain: domain.to_string(),
        path: "/".to_string(),
        secure: true,
    }
}

/// Injects the session cookie so the UI login form can be skipped.
///
/// The driver must already be on a page of `domain`.
pub async fn set_auth_cookie<D: PageDriver + ?Sized>(
    driver: &D,
    sink: &dyn ReportSink,
    token: &str,
    domain: &str,
) -> BrowserResult<()> {
    let step = Step::start(sink, "Set auth cookie");
    driver.add_cookie(&auth_cookie(token, domain)).await?;
    info!(domain, "auth cookie set");
    step.attach(Attachment::text("Cookie set", format!("Auth cookie set: {token}")));
    Ok(())
}
