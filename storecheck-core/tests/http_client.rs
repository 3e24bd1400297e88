use std::net::TcpListener;
use std::sync::Arc;

use storecheck_core::config::TargetSection;
use storecheck_core::http::{
    FailureKind, FetchOutcome, RetryPolicy, ShopClient, ShopRequest, StorefrontApi,
};
use storecheck_core::report::{ReportSink, Reporter};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn shop(base_url: &str, sink: Arc<dyn ReportSink>) -> ShopClient {
    let target = TargetSection {
        base_url: base_url.to_string(),
        ..TargetSection::default()
    };
    ShopClient::new(&target, sink)
        .unwrap()
        .with_retry_policy(RetryPolicy::standard().with_backoff_factor(0.0))
}

fn quiet_shop(server: &MockServer) -> ShopClient {
    shop(&server.uri(), Arc::new(Reporter::in_memory()))
}

#[tokio::test]
async fn search_response_is_returned_unchanged() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("q", "книга"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>results</html>"))
        .expect(1)
        .mount(&server)
        .await;

    let api = StorefrontApi::new(quiet_shop(&server));
    let outcome = api.search_products("книга").await;

    assert_eq!(outcome.status(), 200);
    assert_eq!(outcome.text(), "<html>results</html>");
    let response = outcome.response().unwrap();
    assert!(!response.was_redirected());
    assert_eq!(response.attempts, 1);
}

#[tokio::test]
async fn follows_relative_location_to_final_page() {
    let server = MockServer::start().await;
    Mock::given(path("/old-path"))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", "/new-path"))
        .mount(&server)
        .await;
    Mock::given(path("/new-path"))
        .respond_with(ResponseTemplate::new(200).set_body_string("moved here"))
        .mount(&server)
        .await;

    let client = quiet_shop(&server);
    let outcome = client
        .execute(&ShopRequest::get("/old-path").max_redirects(3))
        .await;

    assert_eq!(outcome.status(), 200);
    assert!(outcome.url().ends_with("/new-path"));
    assert!(outcome.response().unwrap().was_redirected());
}

#[tokio::test]
async fn zero_redirect_cap_returns_the_redirect_itself() {
    let server = MockServer::start().await;
    Mock::given(path("/catalog"))
        .respond_with(ResponseTemplate::new(301).insert_header("Location", "/catalog/"))
        .mount(&server)
        .await;
    Mock::given(path("/catalog/"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = quiet_shop(&server);
    for request in [
        ShopRequest::get("/catalog").max_redirects(0),
        ShopRequest::get("/catalog").follow_redirects(false),
    ] {
        let outcome = client.execute(&request).await;
        assert_eq!(outcome.status(), 301);
        assert!(outcome.url().ends_with("/catalog"));
        assert_eq!(
            outcome.response().unwrap().header("location"),
            Some("/catalog/")
        );
    }
}

#[tokio::test]
async fn redirect_without_location_stops_immediately() {
    let server = MockServer::start().await;
    Mock::given(path("/personal/cart/"))
        .respond_with(ResponseTemplate::new(302))
        .expect(1)
        .mount(&server)
        .await;

    let api = StorefrontApi::new(quiet_shop(&server));
    let outcome = api.get_cart_info().await;

    assert_eq!(outcome.status(), 302);
    assert!(outcome.url().ends_with("/personal/cart/"));
}

#[tokio::test]
async fn hop_cap_returns_last_redirect_response() {
    let server = MockServer::start().await;
    for (from, to) in [("/a", "/b"), ("/b", "/c"), ("/c", "/d")] {
        Mock::given(path(from))
            .respond_with(ResponseTemplate::new(307).insert_header("Location", to))
            .mount(&server)
            .await;
    }
    Mock::given(path("/d"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = quiet_shop(&server);
    let outcome = client.execute(&ShopRequest::get("/a").max_redirects(2)).await;

    assert_eq!(outcome.status(), 307);
    assert!(outcome.url().ends_with("/c"));
}

#[tokio::test]
async fn every_redirect_status_is_followed() {
    let server = MockServer::start().await;
    for code in [301u16, 302, 303, 307, 308] {
        Mock::given(path(format!("/from-{code}")))
            .respond_with(
                ResponseTemplate::new(code)
                    .insert_header("Location", format!("/to-{code}").as_str()),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(path(format!("/to-{code}")))
            .respond_with(ResponseTemplate::new(200).set_body_string("landed"))
            .expect(1)
            .mount(&server)
            .await;
    }

    let client = quiet_shop(&server);
    for code in [301u16, 302, 303, 307, 308] {
        let outcome = client
            .execute(&ShopRequest::get(format!("/from-{code}")).max_redirects(1))
            .await;
        assert_eq!(outcome.status(), 200, "status {code}");
        assert!(outcome.url().ends_with(&format!("/to-{code}")), "status {code}");
        assert!(outcome.response().unwrap().was_redirected());
    }
}

#[tokio::test]
async fn mixed_redirect_chain_follows_exactly_cap_hops() {
    let server = MockServer::start().await;
    let codes: [u16; 7] = [301, 302, 303, 307, 308, 301, 302];
    for (hop, code) in codes.iter().enumerate() {
        Mock::given(path(format!("/h{hop}")))
            .respond_with(
                ResponseTemplate::new(*code)
                    .insert_header("Location", format!("/h{}", hop + 1).as_str()),
            )
            .mount(&server)
            .await;
    }
    Mock::given(path("/h7"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let client = quiet_shop(&server);
    for (cap, status, last) in [
        (1, 302, "/h1"),
        (3, 307, "/h3"),
        (5, 301, "/h5"),
        (7, 200, "/h7"),
    ] {
        let outcome = client
            .execute(&ShopRequest::get("/h0").max_redirects(cap))
            .await;
        assert_eq!(outcome.status(), status, "cap {cap}");
        assert!(outcome.url().ends_with(last), "cap {cap}");
    }

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2 + 4 + 6 + 8);
}

#[tokio::test]
async fn transient_status_is_retried() {
    let server = MockServer::start().await;
    Mock::given(path("/"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let api = StorefrontApi::new(quiet_shop(&server));
    let outcome = api.health_check().await;

    assert_eq!(outcome.status(), 200);
    assert_eq!(outcome.attempts(), 2);
}

#[tokio::test]
async fn persistent_server_error_exhausts_retries() {
    let server = MockServer::start().await;
    Mock::given(path("/"))
        .respond_with(ResponseTemplate::new(503))
        .expect(4)
        .mount(&server)
        .await;

    let client = quiet_shop(&server);
    let outcome = client.execute(&ShopRequest::get("/")).await;

    let failure = outcome.failure().expect("retries should be exhausted");
    assert_eq!(
        failure.kind,
        FailureKind::RetriesExhausted { last_status: 503 }
    );
    assert_eq!(failure.attempts, 4);
    assert_eq!(outcome.status(), 500);
}

#[tokio::test]
async fn non_retryable_status_is_returned_as_is() {
    let server = MockServer::start().await;
    Mock::given(path("/catalog"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let api = StorefrontApi::new(quiet_shop(&server));
    let outcome = api.get_categories().await;

    assert_eq!(outcome.status(), 404);
    assert_eq!(outcome.attempts(), 1);
}

#[tokio::test]
async fn connection_error_becomes_synthetic_server_error() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let base = format!("http://127.0.0.1:{port}");
    let client = shop(&base, Arc::new(Reporter::in_memory()));

    let outcome = client.execute(&ShopRequest::get("/catalog")).await;

    let FetchOutcome::Failed(failure) = &outcome else {
        panic!("expected a transport failure, got {outcome:?}");
    };
    assert_eq!(failure.kind, FailureKind::Connect);
    assert_eq!(failure.attempts, 4);
    assert_eq!(outcome.status(), 500);
    assert_eq!(outcome.url(), format!("{base}/catalog"));
    assert_eq!(outcome.text(), failure.message.as_str());
}

#[tokio::test]
async fn records_request_and_response_attachments() {
    let server = MockServer::start().await;
    Mock::given(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<title>Читай-город</title>"))
        .mount(&server)
        .await;

    let reporter = Arc::new(Reporter::in_memory());
    let api = StorefrontApi::new(shop(&server.uri(), reporter.clone()));
    let content = api.main_page_content().await;

    assert_eq!(content, "<title>Читай-город</title>");
    let details = reporter.texts_named("Request details");
    assert_eq!(details, vec![format!("URL: {}/", server.uri())]);
    let info = reporter.texts_named("Response info");
    assert_eq!(info.len(), 1);
    assert!(info[0].starts_with("Status: 200"));
    assert_eq!(
        reporter.texts_named("Content preview (first 500 chars)"),
        vec![content]
    );
}

#[tokio::test]
async fn main_page_content_is_empty_unless_ok() {
    let server = MockServer::start().await;
    Mock::given(path("/"))
        .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
        .mount(&server)
        .await;

    let reporter = Arc::new(Reporter::in_memory());
    let api = StorefrontApi::new(shop(&server.uri(), reporter.clone()));

    assert_eq!(api.main_page_content().await, "");
    assert!(reporter
        .texts_named("Content preview (first 500 chars)")
        .is_empty());
}
