use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::config::{SelectorSection, StorecheckConfig};
use crate::report::{Attachment, ReportSink, Step};

use super::driver::PageDriver;
use super::error::BrowserResult;
use super::locator::{Locator, Lookup};

const COOKIE_DISMISS_PAUSE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy)]
pub struct PageTiming {
    pub wait_timeout: Duration,
    pub poll_interval: Duration,
    pub settle: Duration,
}

/// Page object for the storefront's main page.
pub struct StorefrontPage<D> {
    driver: D,
    base_url: String,
    selectors: SelectorSection,
    timing: PageTiming,
    screenshots_dir: PathBuf,
    sink: Arc<dyn ReportSink>,
}

impl<D: PageDriver> StorefrontPage<D> {
    pub fn new(driver: D, config: &StorecheckConfig, sink: Arc<dyn ReportSink>) -> Self {
        Self {
            driver,
            base_url: config.target.base_url.clone(),
            selectors: config.selectors.clone(),
            timing: PageTiming {
                wait_timeout: config.browser.wait_timeout(),
                poll_interval: Duration::from_millis(config.browser.poll_interval_ms.max(1)),
                settle: Duration::from_millis(config.browser.settle_ms),
            },
            screenshots_dir: config.screenshots_dir(),
            sink,
        }
    }

    pub fn with_timing(mut self, timing: PageTiming) -> Self {
        self.timing = timing;
        self
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn sink(&self) -> &dyn ReportSink {
        self.sink.as_ref()
    }

    pub async fn open_main_page(&self) -> BrowserResult<()> {
        let _step = Step::start(self.sink(), "Open main page");
        info!(url = %self.base_url, "opening main page");
        self.driver.goto(&self.base_url).await?;
        sleep(self.timing.settle).await;
        Ok(())
    }

    /// Dismisses the cookie banner when one shows up.
    pub async fn accept_cookies(&self) {
        let step = Step::start(self.sink(), "Accept cookies");
        let candidates = [Locator::parse(&self.selectors.cookie_accept)];
        let Lookup::Found { locator, .. } =
            self.locate_first(&candidates, self.timing.wait_timeout).await
        else {
            step.attach(Attachment::text("Cookie popup", "No cookies popup"));
            return;
        };
        match self.driver.click(&locator).await {
            Ok(()) => {
                step.attach(Attachment::text("Cookie popup", "Cookies accepted"));
                sleep(COOKIE_DISMISS_PAUSE).await;
            }
            Err(err) => {
                warn!(error = %err, "cookie banner found but not clickable");
                step.attach(Attachment::text("Cookie popup", "No cookies popup"));
            }
        }
    }

    /// Types `query` into the first search input found and submits it.
    pub async fn search_products(&self, query: &str) -> bool {
        let _step = Step::start(self.sink(), format!("Search: '{query}'"));
        let candidates = locators(&self.selectors.search_inputs);
        let Lookup::Found { locator, .. } =
            self.locate_first(&candidates, self.timing.wait_timeout).await
        else {
            info!("search input not found");
            return false;
        };
        debug!(%locator, "search input found");
        match self.driver.type_text(&locator, query, true).await {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, "typing into search input failed, trying search button");
                self.driver
                    .click(&Locator::parse(&self.selectors.search_button))
                    .await
                    .is_ok()
            }
        }
    }

    /// Names of the landmark tags present on the page.
    pub async fn check_page_elements(&self) -> Vec<String> {
        let _step = Step::start(self.sink(), "Check page elements");
        let mut found = Vec::new();
        for name in &self.selectors.landmarks {
            match self.driver.count(&Locator::tag(name.as_str())).await {
                Ok(count) if count > 0 => found.push(name.clone()),
                Ok(_) => {}
                Err(err) => debug!(error = %err, landmark = %name, "landmark lookup failed"),
            }
        }
        found
    }

    pub async fn find_product_cards(&self) -> usize {
        let _step = Step::start(self.sink(), "Find product cards");
        let candidates = locators(&self.selectors.product_cards);
        self.locate_first(&candidates, self.timing.wait_timeout)
            .await
            .count()
    }

    pub async fn search_results(&self) -> Vec<String> {
        let _step = Step::start(self.sink(), "Get search results");
        let selector = self.selectors.product_cards.join(", ");
        self.non_blank_texts(&Locator::css(selector)).await
    }

    pub async fn navigation_items(&self) -> Vec<String> {
        let _step = Step::start(self.sink(), "Get navigation items");
        self.non_blank_texts(&Locator::parse(&self.selectors.navigation_links))
            .await
    }

    pub async fn page_title(&self) -> String {
        let _step = Step::start(self.sink(), "Get page title");
        self.driver.title().await.unwrap_or_else(|err| {
            warn!(error = %err, "failed to read page title");
            String::new()
        })
    }

    pub async fn current_url(&self) -> String {
        let _step = Step::start(self.sink(), "Get current URL");
        self.driver.current_url().await.unwrap_or_else(|err| {
            warn!(error = %err, "failed to read current url");
            String::new()
        })
    }

    pub async fn is_page_loaded(&self) -> bool {
        let _step = Step::start(self.sink(), "Check page is loaded");
        matches!(self.driver.ready_state().await.as_deref(), Ok("complete"))
    }

    /// Saves `{name}.png` into the screenshots directory and attaches it.
    pub async fn take_screenshot(&self, name: &str) -> BrowserResult<PathBuf> {
        let step = Step::start(self.sink(), format!("Take screenshot: {name}"));
        let bytes = self.driver.screenshot().await?;
        tokio::fs::create_dir_all(&self.screenshots_dir).await?;
        let path = self.screenshots_dir.join(format!("{name}.png"));
        tokio::fs::write(&path, &bytes).await?;
        info!(path = %path.display(), "screenshot saved");
        step.attach(Attachment::png(name, bytes));
        Ok(path)
    }

    /// Tries each candidate in order, polling until `timeout` elapses for
    /// each one, and reports the first that matched.
    pub async fn locate_first(&self, candidates: &[Locator], timeout: Duration) -> Lookup {
        for locator in candidates {
            let deadline = Instant::now() + timeout;
            loop {
                match self.driver.count(locator).await {
                    Ok(count) if count > 0 => {
                        return Lookup::Found {
                            locator: locator.clone(),
                            count,
                        }
                    }
                    Ok(_) => {}
                    Err(err) => debug!(error = %err, %locator, "lookup attempt failed"),
                }
                if Instant::now() >= deadline {
                    debug!(%locator, "candidate not present before timeout");
                    break;
                }
                sleep(self.timing.poll_interval).await;
            }
        }
        Lookup::NotFound
    }

    async fn non_blank_texts(&self, locator: &Locator) -> Vec<String> {
        match self.driver.texts(locator).await {
            Ok(texts) => texts
                .into_iter()
                .filter(|text| !text.trim().is_empty())
                .collect(),
            Err(err) => {
                debug!(error = %err, %locator, "text lookup failed");
                Vec::new()
            }
        }
    }
}

fn locators(selectors: &[String]) -> Vec<Locator> {
    selectors.iter().map(|raw| Locator::parse(raw)).collect()
}
