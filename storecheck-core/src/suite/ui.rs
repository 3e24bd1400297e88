use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::browser::{set_auth_cookie, PageDriver, StorefrontPage};
use crate::report::{ReportSink, Severity};

use super::{CaseInfo, CaseReport, SmokeSuite, SuiteError, SuiteResult};

const MAIN_EPIC: &str = "UI tests";
const EXTRA_EPIC: &str = "Additional checks";
const MIN_LANDMARKS: usize = 2;
const MIN_TITLE_CHARS: usize = 10;

const CASES: [CaseInfo; 6] = [
    CaseInfo {
        id: "open_main_page",
        title: "Open main page",
        epic: MAIN_EPIC,
        feature: "Main page",
        story: "Test 1: Open main page",
        severity: Severity::Blocker,
    },
    CaseInfo {
        id: "basic_functionality",
        title: "Basic functionality",
        epic: MAIN_EPIC,
        feature: "Main page",
        story: "Test 2: Basic functionality",
        severity: Severity::Critical,
    },
    CaseInfo {
        id: "page_elements",
        title: "Page elements",
        epic: MAIN_EPIC,
        feature: "Layout",
        story: "Test 3: Page elements",
        severity: Severity::Normal,
    },
    CaseInfo {
        id: "product_cards",
        title: "Product cards",
        epic: MAIN_EPIC,
        feature: "Catalog",
        story: "Test 4: Product cards",
        severity: Severity::Normal,
    },
    CaseInfo {
        id: "page_title_length",
        title: "Page title",
        epic: EXTRA_EPIC,
        feature: "Metadata",
        story: "Test 5: Page title",
        severity: Severity::Minor,
    },
    CaseInfo {
        id: "page_url",
        title: "Page URL",
        epic: EXTRA_EPIC,
        feature: "Metadata",
        story: "Test 6: Page URL",
        severity: Severity::Minor,
    },
];

/// Six browser checks against the main page; these do assert.
pub struct UiSuite<D> {
    page: StorefrontPage<D>,
    sink: Arc<dyn ReportSink>,
    auth: Option<(String, String)>,
}

impl<D: PageDriver> UiSuite<D> {
    pub fn new(page: StorefrontPage<D>, sink: Arc<dyn ReportSink>) -> Self {
        Self {
            page,
            sink,
            auth: None,
        }
    }

    /// Injects an auth cookie for `domain` after every page open.
    pub fn with_auth(mut self, token: impl Into<String>, domain: impl Into<String>) -> Self {
        self.auth = Some((token.into(), domain.into()));
        self
    }

    pub fn page(&self) -> &StorefrontPage<D> {
        &self.page
    }

    async fn open(&self) -> SuiteResult<()> {
        self.page.open_main_page().await?;
        self.page.accept_cookies().await;
        if let Some((token, domain)) = &self.auth {
            set_auth_cookie(self.page.driver(), self.sink.as_ref(), token, domain).await?;
        }
        Ok(())
    }

    /// Captures a screenshot and turns `message` into an assertion error.
    async fn fail(&self, case: &str, message: String) -> SuiteError {
        if let Err(err) = self.page.take_screenshot(&format!("{case}_failure")).await {
            warn!(error = %err, case, "failed to capture failure screenshot");
        }
        SuiteError::Assertion(message)
    }

    async fn ensure(
        &self,
        case: &str,
        condition: bool,
        message: impl FnOnce() -> String,
    ) -> SuiteResult<()> {
        if condition {
            Ok(())
        } else {
            Err(self.fail(case, message()).await)
        }
    }

    async fn open_main_page(&self) -> SuiteResult<CaseReport> {
        self.open().await?;
        let loaded = self.page.is_page_loaded().await;
        self.ensure("open_main_page", loaded, || "Page did not load".into())
            .await?;
        let title = self.page.page_title().await;
        self.ensure("open_main_page", !title.is_empty(), || {
            "Page title must not be empty".into()
        })
        .await?;
        Ok(CaseReport::passed("Main page opened"))
    }

    async fn basic_functionality(&self) -> SuiteResult<CaseReport> {
        self.open().await?;
        let loaded = self.page.is_page_loaded().await;
        self.ensure("basic_functionality", loaded, || "Page did not load".into())
            .await?;
        let elements = self.page.check_page_elements().await;
        self.ensure("basic_functionality", elements.len() >= MIN_LANDMARKS, || {
            "Page should contain the main elements".into()
        })
        .await?;
        Ok(CaseReport::passed("Basic functionality works"))
    }

    async fn page_elements(&self) -> SuiteResult<CaseReport> {
        self.open().await?;
        let elements = self.page.check_page_elements().await;
        self.ensure("page_elements", elements.len() >= MIN_LANDMARKS, || {
            format!("Expected at least {MIN_LANDMARKS} elements, found: {elements:?}")
        })
        .await?;
        Ok(CaseReport::passed(format!("Elements found: {elements:?}")))
    }

    async fn product_cards(&self) -> SuiteResult<CaseReport> {
        self.open().await?;
        let cards = self.page.find_product_cards().await;
        self.ensure("product_cards", cards > 0, || {
            "Product cards should be present".into()
        })
        .await?;
        Ok(CaseReport::passed(format!("Found {cards} product cards")))
    }

    async fn page_title_length(&self) -> SuiteResult<CaseReport> {
        self.open().await?;
        let title = self.page.page_title().await;
        let length = title.chars().count();
        self.ensure("page_title_length", length > MIN_TITLE_CHARS, || {
            format!("Page title is too short: {title}")
        })
        .await?;
        Ok(CaseReport::passed(format!("Title length: {length} characters")))
    }

    async fn page_url(&self) -> SuiteResult<CaseReport> {
        self.open().await?;
        let current = self.page.current_url().await;
        let expected = format!("{}/", self.page.base_url().trim_end_matches('/'));
        self.ensure("page_url", current.starts_with(&expected), || {
            format!("Unexpected URL: {current}")
        })
        .await?;
        Ok(CaseReport::passed(format!("URL is correct: {current}")))
    }
}

#[async_trait(?Send)]
impl<D: PageDriver> SmokeSuite for UiSuite<D> {
    fn name(&self) -> &str {
        "ui"
    }

    fn cases(&self) -> &[CaseInfo] {
        &CASES
    }

    async fn run_case(&mut self, index: usize) -> SuiteResult<CaseReport> {
        let report = match index {
            0 => self.open_main_page().await?,
            1 => self.basic_functionality().await?,
            2 => self.page_elements().await?,
            3 => self.product_cards().await?,
            4 => self.page_title_length().await?,
            5 => self.page_url().await?,
            other => return Err(SuiteError::UnknownCase(other)),
        };
        info!(case = CASES[index].id, "ui case passed");
        Ok(report)
    }
}
