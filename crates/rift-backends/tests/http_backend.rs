//! HTTP backend served through the launcher and exercised over the network.

mod common;

use common::TEST_TIMEOUT;
use reqwest::{Client, Method, StatusCode};
use rift_backends::http::{build_response, from_fn, FixedResult, HttpBackend, HttpRequest, HttpRule};
use rift_backends::predicate::{MappingValidator, Matcher};
use rift_backends::spy::Spy;
use rift_backends::{backends_manager, Backend, BackendsGuard};
use serde_json::{json, Value};

fn get_test_port() -> u16 {
    use std::sync::atomic::{AtomicU16, Ordering};
    static PORT_COUNTER: AtomicU16 = AtomicU16::new(18000);
    PORT_COUNTER.fetch_add(1, Ordering::SeqCst)
}

fn serve(port: u16, rules: Vec<HttpRule>) -> BackendsGuard {
    let backends: Vec<Box<dyn Backend>> = vec![Box::new(HttpBackend::with_rules(port, rules))];
    backends_manager(backends).expect("Failed to start HTTP backend")
}

fn client() -> Client {
    Client::builder().timeout(TEST_TIMEOUT).build().unwrap()
}

#[tokio::test]
async fn test_search_rule_with_default_fallback() {
    let port = get_test_port();
    let _guard = serve(
        port,
        vec![
            HttpRule::new().path("/search").respond("found", 200),
            HttpRule::default(),
        ],
    );
    let client = client();

    let response = client
        .get(format!("http://127.0.0.1:{port}/search"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "found");

    let response = client
        .get(format!("http://127.0.0.1:{port}/other"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "HTTP BACKEND RESULT");
}

#[tokio::test]
async fn test_first_matching_rule_wins() {
    let port = get_test_port();
    let second = Spy::new(|path: String| path);
    let second_calls = second.clone();
    let _guard = serve(
        port,
        vec![
            HttpRule::new().result(FixedResult::new("ANOTHER HTTP BACKEND RESULT", 200)),
            HttpRule::new().result(from_fn(move |req: &HttpRequest| {
                build_response(hyper::StatusCode::OK, second.call(req.path.clone()))
            })),
        ],
    );

    for path in ["/", "/search", "/other"] {
        let body = client()
            .get(format!("http://127.0.0.1:{port}{path}"))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert_eq!(body, "ANOTHER HTTP BACKEND RESULT");
    }
    assert_eq!(second_calls.call_count(), 0);
}

#[tokio::test]
async fn test_no_match_returns_diagnostic_json() {
    let port = get_test_port();
    let _guard = serve(port, vec![HttpRule::new().path("/search").method("POST")]);

    let response = client()
        .get(format!("http://127.0.0.1:{port}/search?q=vk"))
        .header("x-test", "1")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["ERROR"], "No matching rule found for incoming request");
    let info = &body["incoming_request_info"];
    assert_eq!(info["method"], "GET");
    assert_eq!(info["path"], "/search");
    assert_eq!(info["query_params"], json!({"q": "vk"}));
    assert_eq!(info["headers"]["x-test"], "1");
}

#[tokio::test]
async fn test_query_tolerance_flag() {
    let port = get_test_port();
    let _guard = serve(
        port,
        vec![
            HttpRule::new()
                .query_params([("q", "vk")].into_iter().collect())
                .respond("exact", 200),
            HttpRule::new()
                .query_params([("q", "vk")].into_iter().collect())
                .ignore_extra_query_params(true)
                .respond("tolerant", 200),
        ],
    );
    let client = client();

    let exact = client
        .get(format!("http://127.0.0.1:{port}/search?q=vk"))
        .send()
        .await
        .unwrap();
    assert_eq!(exact.text().await.unwrap(), "exact");

    let tolerant = client
        .get(format!("http://127.0.0.1:{port}/search?q=vk&num=10"))
        .send()
        .await
        .unwrap();
    assert_eq!(tolerant.text().await.unwrap(), "tolerant");

    let missing = client
        .get(format!("http://127.0.0.1:{port}/search?num=10"))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_headers_and_method() {
    let port = get_test_port();
    let _guard = serve(
        port,
        vec![HttpRule::new()
            .method("post")
            .path(Matcher::pattern("^/api/").unwrap())
            .headers(MappingValidator::new().entry("X-Client", Matcher::pattern("^rift").unwrap()))
            .ignore_extra_headers(true)
            .result(
                FixedResult::new(r#"{"ok":true}"#, 201).with_header("content-type", "application/json"),
            )],
    );
    let client = client();

    let response = client
        .post(format!("http://127.0.0.1:{port}/api/items"))
        .header("x-client", "rift-tests")
        .body("payload")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(response.headers()["content-type"], "application/json");
    assert_eq!(response.json::<Value>().await.unwrap(), json!({"ok": true}));

    let response = client
        .post(format!("http://127.0.0.1:{port}/api/items"))
        .header("x-client", "curl")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_custom_result_sees_body() {
    let port = get_test_port();
    let _guard = serve(
        port,
        vec![HttpRule::new().result(from_fn(|req: &HttpRequest| {
            let mut body = req.body.to_vec();
            body.reverse();
            build_response(hyper::StatusCode::OK, body)
        }))],
    );

    let response = client()
        .put(format!("http://127.0.0.1:{port}/echo"))
        .body("abc")
        .send()
        .await
        .unwrap();
    assert_eq!(response.text().await.unwrap(), "cba");
}

#[tokio::test]
async fn test_unrouted_method_is_405() {
    let port = get_test_port();
    let _guard = serve(port, vec![HttpRule::default()]);

    let response = client()
        .request(Method::OPTIONS, format!("http://127.0.0.1:{port}/"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}
