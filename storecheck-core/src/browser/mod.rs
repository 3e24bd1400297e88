mod auth;
mod driver;
mod error;
mod launcher;
mod locator;
mod page;

pub use auth::{auth_cookie, set_auth_cookie, AUTH_COOKIE_NAME};
pub use driver::{BrowserCookie, ChromiumPage, PageDriver};
pub use error::{BrowserError, BrowserResult};
pub use launcher::{BrowserLauncher, BrowserSession, LaunchOverrides};
pub use locator::{Locator, Lookup};
pub use page::{PageTiming, StorefrontPage};
