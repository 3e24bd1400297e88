use tracing::info;

use crate::report::{Attachment, Step};

use super::client::{ShopClient, ShopRequest};
use super::outcome::FetchOutcome;

pub const CONTENT_PREVIEW_CHARS: usize = 500;

const API_MAX_REDIRECTS: usize = 3;

/// The storefront endpoints the smoke checks exercise.
#[derive(Debug)]
pub struct StorefrontApi {
    client: ShopClient,
}

impl StorefrontApi {
    pub fn new(client: ShopClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &ShopClient {
        &self.client
    }

    pub async fn health_check(&self) -> FetchOutcome {
        let _step = Step::start(self.client.sink(), "Check site availability");
        self.get(ShopRequest::get("/")).await
    }

    pub async fn search_products(&self, query: &str) -> FetchOutcome {
        let _step = Step::start(
            self.client.sink(),
            format!("Search products: '{query}'"),
        );
        self.get(ShopRequest::get("/search").query("q", query).query("page", "1"))
            .await
    }

    pub async fn get_categories(&self) -> FetchOutcome {
        let _step = Step::start(self.client.sink(), "Get category list");
        self.get(ShopRequest::get("/catalog")).await
    }

    pub async fn get_cart_info(&self) -> FetchOutcome {
        let _step = Step::start(self.client.sink(), "Get cart info");
        self.get(ShopRequest::get("/personal/cart/")).await
    }

    /// Main page body when it answered 200, otherwise an empty string.
    pub async fn main_page_content(&self) -> String {
        let step = Step::start(self.client.sink(), "Analyze main page content");
        let outcome = self.health_check().await;
        if outcome.status() != 200 {
            info!(status = outcome.status(), "main page not available for analysis");
            return String::new();
        }
        let body = outcome.text().into_owned();
        step.attach(Attachment::text(
            format!("Content preview (first {CONTENT_PREVIEW_CHARS} chars)"),
            preview(&body, CONTENT_PREVIEW_CHARS),
        ));
        body
    }

    async fn get(&self, request: ShopRequest) -> FetchOutcome {
        self.client
            .execute(&request.max_redirects(API_MAX_REDIRECTS))
            .await
    }
}

/// First `limit` characters, with `...` appended when something was cut.
pub fn preview(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
