use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::network::CookieParam;
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
use chromiumoxide::element::Element;
use chromiumoxide::page::{Page, ScreenshotParams};
use tracing::debug;

use super::error::{BrowserError, BrowserResult};
use super::locator::{Locator, TARGET_ATTRIBUTE};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    pub secure: bool,
}

/// The page operations the storefront page object needs.
#[async_trait(?Send)]
pub trait PageDriver {
    async fn goto(&self, url: &str) -> BrowserResult<()>;
    async fn title(&self) -> BrowserResult<String>;
    async fn current_url(&self) -> BrowserResult<String>;
    async fn ready_state(&self) -> BrowserResult<String>;
    async fn count(&self, locator: &Locator) -> BrowserResult<usize>;
    async fn texts(&self, locator: &Locator) -> BrowserResult<Vec<String>>;
    async fn click(&self, locator: &Locator) -> BrowserResult<()>;
    /// Replaces the element's value with `text`, pressing Enter afterwards
    /// when `submit` is set.
    async fn type_text(&self, locator: &Locator, text: &str, submit: bool) -> BrowserResult<()>;
    async fn screenshot(&self) -> BrowserResult<Vec<u8>>;
    async fn add_cookie(&self, cookie: &BrowserCookie) -> BrowserResult<()>;
}

/// [`PageDriver`] over a chromiumoxide tab.
#[derive(Debug)]
pub struct ChromiumPage {
    page: Page,
    markers: AtomicU64,
}

impl ChromiumPage {
    pub(crate) fn new(page: Page) -> Self {
        Self {
            page,
            markers: AtomicU64::new(0),
        }
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    async fn evaluate<T: serde::de::DeserializeOwned>(&self, script: String) -> BrowserResult<T> {
        self.page
            .evaluate(script.as_str())
            .await?
            .into_value()
            .map_err(|err| BrowserError::Script(format!("failed to decode result: {err}")))
    }

    async fn element(&self, locator: &Locator) -> BrowserResult<Element> {
        if let Some(selector) = locator.as_css() {
            return self
                .page
                .find_element(selector)
                .await
                .map_err(|_| BrowserError::NotFound(locator.to_string()));
        }
        let marker = self.markers.fetch_add(1, Ordering::Relaxed).to_string();
        let marked: bool = self.evaluate(locator.mark_script(&marker)).await?;
        if !marked {
            return Err(BrowserError::NotFound(locator.to_string()));
        }
        let selector = format!("[{TARGET_ATTRIBUTE}='{marker}']");
        debug!(%locator, %selector, "resolved xpath through marker attribute");
        self.page
            .find_element(selector.as_str())
            .await
            .map_err(|_| BrowserError::NotFound(locator.to_string()))
    }
}

#[async_trait(?Send)]
impl PageDriver for ChromiumPage {
    async fn goto(&self, url: &str) -> BrowserResult<()> {
        let params = NavigateParams::builder()
            .url(url)
            .build()
            .map_err(BrowserError::Configuration)?;
        self.page.goto(params).await?;
        self.page.wait_for_navigation().await?;
        Ok(())
    }

    async fn title(&self) -> BrowserResult<String> {
        Ok(self.page.get_title().await?.unwrap_or_default())
    }

    async fn current_url(&self) -> BrowserResult<String> {
        Ok(self.page.url().await?.unwrap_or_default())
    }

    async fn ready_state(&self) -> BrowserResult<String> {
        self.evaluate("document.readyState".to_string()).await
    }

    async fn count(&self, locator: &Locator) -> BrowserResult<usize> {
        self.evaluate(locator.count_script()).await
    }

    async fn texts(&self, locator: &Locator) -> BrowserResult<Vec<String>> {
        self.evaluate(locator.texts_script()).await
    }

    async fn click(&self, locator: &Locator) -> BrowserResult<()> {
        self.element(locator).await?.click().await?;
        Ok(())
    }

    async fn type_text(&self, locator: &Locator, text: &str, submit: bool) -> BrowserResult<()> {
        let element = self.element(locator).await?;
        element.click().await?;
        element
            .call_js_fn("function() { if ('value' in this) { this.value = ''; } }", false)
            .await?;
        element.type_str(text).await?;
        if submit {
            element.press_key("Enter").await?;
        }
        Ok(())
    }

    async fn screenshot(&self) -> BrowserResult<Vec<u8>> {
        let params = ScreenshotParams::builder().full_page(true).build();
        Ok(self.page.screenshot(params).await?)
    }

    async fn add_cookie(&self, cookie: &BrowserCookie) -> BrowserResult<()> {
        let param = CookieParam::builder()
            .name(cookie.name.clone())
            .value(cookie.value.clone())
            .domain(cookie.domain.clone())
            .path(cookie.path.clone())
            .secure(cookie.secure)
            .build()
            .map_err(BrowserError::Configuration)?;
        self.page.set_cookie(param).await?;
        Ok(())
    }
}
