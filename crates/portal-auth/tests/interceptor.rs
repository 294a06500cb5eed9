mod common;

use common::{credentials, ok, ok_after, unauthorized, MemberHarness, LOGIN_ENTRY};
use futures_util::future::join_all;
use portal_auth::{ApiRequest, AuthError, Session};
use serde_json::{json, Value};
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const REFRESH_PATH: &str = "/api/v1/member/auth/refresh-token";

#[tokio::test]
async fn request_carries_session_header() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/member/orders"))
        .and(header("Authorization", "Bearer T1"))
        .respond_with(ok(json!([{"id": 1}])))
        .expect(1)
        .mount(&server)
        .await;

    let harness = MemberHarness::new(&server.uri());
    harness.seed(&Session::new("T1").with_refresh_token("R1"));

    let orders: Vec<Value> = harness
        .api
        .send(&ApiRequest::get("/api/v1/member/orders"))
        .await
        .expect("request should succeed");
    assert_eq!(orders, vec![json!({"id": 1})]);
}

#[tokio::test]
async fn unauthorized_request_is_retried_once_with_renewed_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/member/orders"))
        .and(header("Authorization", "Bearer T1"))
        .respond_with(unauthorized())
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/member/orders"))
        .and(header("Authorization", "Bearer T2"))
        .respond_with(ok(json!({"total": 3})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(REFRESH_PATH))
        .respond_with(ok(credentials("T2", "R2")))
        .expect(1)
        .mount(&server)
        .await;

    let harness = MemberHarness::new(&server.uri());
    harness.seed(&Session::new("T1").with_refresh_token("R1"));

    let result: Value = harness
        .api
        .send(&ApiRequest::get("/api/v1/member/orders"))
        .await
        .expect("retry should succeed");

    assert_eq!(result, json!({"total": 3}));
    assert!(harness.navigator.visited().is_empty());
}

#[tokio::test]
async fn second_unauthorized_response_is_returned_without_another_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/member/orders"))
        .respond_with(unauthorized())
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(REFRESH_PATH))
        .respond_with(ok(credentials("T2", "R2")))
        .expect(1)
        .mount(&server)
        .await;

    let harness = MemberHarness::new(&server.uri());
    harness.seed(&Session::new("T1").with_refresh_token("R1"));

    let err = harness
        .api
        .send::<Value>(&ApiRequest::get("/api/v1/member/orders"))
        .await
        .expect_err("request should fail");

    assert!(err.is_unauthorized());
    // renewal worked, so the user stays signed in
    assert!(harness.navigator.visited().is_empty());
    assert_eq!(harness.manager.auth_header(), "Bearer T2");
}

#[tokio::test]
async fn unrecoverable_unauthorized_redirects_and_reraises() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/member/orders"))
        .respond_with(unauthorized())
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(REFRESH_PATH))
        .respond_with(ok(credentials("T2", "R2")))
        .expect(0)
        .mount(&server)
        .await;

    let harness = MemberHarness::new(&server.uri());
    harness.seed(&Session::new("T1"));

    let err = harness
        .api
        .send::<Value>(&ApiRequest::get("/api/v1/member/orders"))
        .await
        .expect_err("request should fail");

    assert_eq!(err, AuthError::transport(Some(401), "token expired"));
    assert_eq!(harness.navigator.visited(), vec![LOGIN_ENTRY.to_string()]);
    assert!(!harness.manager.is_authenticated());
}

#[tokio::test]
async fn failed_renewal_redirects_to_login() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/member/orders"))
        .respond_with(unauthorized())
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(REFRESH_PATH))
        .respond_with(unauthorized())
        .expect(1)
        .mount(&server)
        .await;

    let harness = MemberHarness::new(&server.uri());
    harness.seed(&Session::new("T1").with_refresh_token("R1"));

    let err = harness
        .api
        .send::<Value>(&ApiRequest::get("/api/v1/member/orders"))
        .await
        .expect_err("request should fail");

    assert!(err.is_unauthorized());
    assert_eq!(harness.navigator.visited(), vec![LOGIN_ENTRY.to_string()]);
    assert!(harness.stored().is_none());
}

#[tokio::test]
async fn concurrent_unauthorized_requests_share_one_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/member/orders"))
        .and(header("Authorization", "Bearer T1"))
        .respond_with(unauthorized())
        .expect(5)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/member/orders"))
        .and(header("Authorization", "Bearer T2"))
        .respond_with(ok(json!("fresh")))
        .expect(5)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(REFRESH_PATH))
        .respond_with(ok_after(
            credentials("T2", "R2"),
            Duration::from_millis(200),
        ))
        .expect(1)
        .mount(&server)
        .await;

    let harness = MemberHarness::new(&server.uri());
    harness.seed(&Session::new("T1").with_refresh_token("R1"));

    let request = ApiRequest::get("/api/v1/member/orders");
    let results = join_all((0..5).map(|_| harness.api.send::<String>(&request))).await;

    for result in results {
        assert_eq!(result.expect("retry should succeed"), "fresh");
    }
}

#[tokio::test]
async fn skip_auth_requests_send_no_header_and_never_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/public/notice"))
        .respond_with(unauthorized())
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(REFRESH_PATH))
        .respond_with(ok(credentials("T2", "R2")))
        .expect(0)
        .mount(&server)
        .await;

    let harness = MemberHarness::new(&server.uri());
    harness.seed(&Session::new("T1").with_refresh_token("R1"));

    let err = harness
        .api
        .send::<Value>(&ApiRequest::get("/api/v1/public/notice").skip_auth())
        .await
        .expect_err("request should fail");
    assert!(err.is_unauthorized());

    let requests = server.received_requests().await.expect("recording enabled");
    assert_eq!(requests.len(), 1);
    assert!(requests[0].headers.get("authorization").is_none());
    assert!(harness.navigator.visited().is_empty());
    assert!(harness.manager.is_authenticated());
}

#[tokio::test]
async fn business_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/member/orders"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"code": 403, "message": "forbidden"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let harness = MemberHarness::new(&server.uri());
    harness.seed(&Session::new("T1").with_refresh_token("R1"));

    let err = harness
        .api
        .send::<Value>(&ApiRequest::get("/api/v1/member/orders"))
        .await
        .expect_err("request should fail");

    assert!(matches!(err, AuthError::Business { code: 403, .. }));
    assert!(harness.manager.is_authenticated());
}

#[tokio::test]
async fn unauthenticated_request_goes_out_without_header() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/member/catalog"))
        .respond_with(ok(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let harness = MemberHarness::new(&server.uri());
    let catalog: Vec<Value> = harness
        .api
        .send(&ApiRequest::get("/api/v1/member/catalog"))
        .await
        .expect("request should succeed");
    assert!(catalog.is_empty());

    let requests = server.received_requests().await.expect("recording enabled");
    assert!(requests[0].headers.get("authorization").is_none());
}
