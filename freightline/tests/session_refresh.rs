//! End-to-end token refresh behaviour against a mock API.

use freightline::{
    ApiError, ClientConfig, CredentialStore, FreightlineClient, InMemoryCredentialStore, Location,
    StaticLocation, TokenPair,
};
use futures::future::join_all;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use rstest::rstest;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio_test::assert_err;
use wiremock::matchers::{body_json, header, method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Harness {
    client: FreightlineClient,
    store: Arc<InMemoryCredentialStore>,
    redirects: Arc<Mutex<Vec<String>>>,
}

impl Harness {
    /// Login paths the session hook was sent to.
    fn login_redirects(&self) -> Vec<String> {
        self.redirects.lock().clone()
    }
}

fn harness(server: &MockServer, store: InMemoryCredentialStore, location: Location) -> Harness {
    let store = Arc::new(store);
    let redirects = Arc::new(Mutex::new(Vec::new()));
    let log = redirects.clone();

    let config = ClientConfig::new()
        .with_api_url(&server.uri())
        .unwrap()
        .with_base_domain("freightline.app")
        .with_refresh_timeout(Duration::from_secs(5))
        .with_login_path("/signin");

    let client = FreightlineClient::builder()
        .config(config)
        .credential_store(store.clone())
        .location_source(Arc::new(StaticLocation::new(location)))
        .on_session_expired(Arc::new(move |path: &str| log.lock().push(path.to_string())))
        .build()
        .unwrap();

    Harness {
        client,
        store,
        redirects,
    }
}

fn signed_in() -> InMemoryCredentialStore {
    InMemoryCredentialStore::with_tokens(TokenPair::new("T1", "R1"))
}

fn tokens(access: &str, refresh: &str) -> Value {
    json!({
        "success": true,
        "data": { "tokens": { "accessToken": access, "refreshToken": refresh } }
    })
}

fn ok(data: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "success": true, "data": data }))
}

fn unauthorized() -> ResponseTemplate {
    ResponseTemplate::new(401).set_body_json(json!({
        "success": false,
        "error": { "message": "Token expired" }
    }))
}

async fn refresh_calls(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == "/v1/auth/refresh")
        .count()
}

#[tokio::test]
async fn three_concurrent_401s_share_one_refresh() {
    let server = MockServer::start().await;

    for name in ["a", "b", "c"] {
        Mock::given(method("GET"))
            .and(path(format!("/v1/{name}")))
            .and(header("authorization", "Bearer T1"))
            .respond_with(unauthorized())
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/v1/{name}")))
            .and(header("authorization", "Bearer T2"))
            .respond_with(ok(json!({ "endpoint": name })))
            .expect(1)
            .mount(&server)
            .await;
    }

    Mock::given(method("POST"))
        .and(path("/v1/auth/refresh"))
        .and(body_json(json!({ "refresh_token": "R1" })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(tokens("T2", "R2"))
                .set_delay(Duration::from_millis(100)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server, signed_in(), Location::default());

    let results = join_all(
        ["a", "b", "c"].map(|name| {
            let client = h.client.clone();
            async move { client.get_json::<Value>(&format!("/v1/{name}")).await }
        }),
    )
    .await;

    let endpoints: Vec<Value> = results
        .into_iter()
        .map(|r| r.unwrap()["endpoint"].clone())
        .collect();
    assert_eq!(endpoints, vec![json!("a"), json!("b"), json!("c")]);
    assert_eq!(refresh_calls(&server).await, 1);
    assert_eq!(h.store.access_token().as_deref(), Some("T2"));
    assert_eq!(h.store.refresh_token().as_deref(), Some("R2"));
    assert!(h.login_redirects().is_empty());
    assert_eq!(h.client.coordinator().refresh_count(), 1);
}

#[rstest]
#[case(2)]
#[case(10)]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn single_refresh_for_any_number_of_requests(#[case] n: usize) {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path_regex(r"^/v1/loads/\d+$"))
        .and(header("authorization", "Bearer T1"))
        .respond_with(unauthorized())
        .expect(n as u64)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/v1/loads/\d+$"))
        .and(header("authorization", "Bearer T2"))
        .respond_with(ok(json!({ "status": "dispatched" })))
        .expect(n as u64)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(tokens("T2", "R2"))
                .set_delay(Duration::from_millis(50)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server, signed_in(), Location::default());

    let handles: Vec<_> = (0..n)
        .map(|i| {
            let client = h.client.clone();
            tokio::spawn(async move {
                client
                    .get_json::<Value>(&format!("/v1/loads/{i}"))
                    .await
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap()["status"], "dispatched");
    }
    assert_eq!(refresh_calls(&server).await, 1);
}

#[tokio::test]
async fn missing_refresh_token_ends_session_without_network_refresh() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/drivers"))
        .respond_with(unauthorized())
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/auth/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(tokens("T2", "R2")))
        .expect(0)
        .mount(&server)
        .await;

    let h = harness(&server, InMemoryCredentialStore::new(), Location::default());

    let err = assert_err!(h.client.get_json::<Value>("/v1/drivers").await);

    assert!(matches!(err, ApiError::Unauthenticated { .. }));
    assert_eq!(refresh_calls(&server).await, 0);
    assert!(h.store.load().is_empty());
    assert_eq!(h.login_redirects(), vec!["/signin".to_string()]);
}

#[tokio::test]
async fn replay_is_attempted_at_most_once() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/trailers"))
        .respond_with(unauthorized())
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/auth/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(tokens("T2", "R2")))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server, signed_in(), Location::default());

    let err = assert_err!(h.client.get_json::<Value>("/v1/trailers").await);

    assert!(matches!(err, ApiError::SessionExpired { .. }));
    assert_eq!(refresh_calls(&server).await, 1);
    assert!(h.login_redirects().is_empty());
}

#[tokio::test]
async fn rejected_refresh_clears_credentials_and_fires_hook() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path_regex(r"^/v1/customers/\d+$"))
        .respond_with(unauthorized())
        .expect(3)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(json!({ "success": false, "error": "Refresh token revoked" }))
                .set_delay(Duration::from_millis(50)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server, signed_in(), Location::default());

    let results = join_all((0..3).map(|i| {
        let client = h.client.clone();
        async move { client.get_json::<Value>(&format!("/v1/customers/{i}")).await }
    }))
    .await;

    for result in results {
        assert!(matches!(result, Err(ApiError::SessionExpired { .. })));
    }
    assert_eq!(h.store.access_token(), None);
    assert_eq!(h.store.refresh_token(), None);
    assert_eq!(h.login_redirects(), vec!["/signin".to_string()]);
}

#[tokio::test]
async fn tenant_header_follows_navigation() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/trucks"))
        .and(header("x-organization-slug", "acme"))
        .and(header("authorization", "Bearer T1"))
        .respond_with(ok(json!([{ "unit": "T-101" }])))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(
        &server,
        signed_in(),
        Location::new("acme.freightline.app", "/fleet/trucks"),
    );

    let trucks: Value = h.client.get_json("/v1/trucks").await.unwrap();
    assert_eq!(trucks[0]["unit"], "T-101");
    assert_eq!(h.client.tenant().as_deref(), Some("acme"));
}

#[tokio::test]
async fn password_login_me_and_logout() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/auth/login/password"))
        .and(body_json(json!({ "email": "dispatch@acme.test", "password": "hunter2" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(tokens("T1", "R1")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/auth/me"))
        .and(header("authorization", "Bearer T1"))
        .respond_with(ok(json!({
            "user": { "id": "u_1", "email": "dispatch@acme.test" },
            "memberships": [
                {
                    "organization": { "id": "o_1", "slug": "acme", "name": "Acme Freight" },
                    "role": "dispatcher"
                }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/auth/logout"))
        .and(body_json(json!({ "refresh_token": "R1" })))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server, InMemoryCredentialStore::new(), Location::default());
    assert_eq!(h.client.restore_session().await.unwrap(), None);

    h.client
        .login_with_password("dispatch@acme.test", "hunter2")
        .await
        .unwrap();
    assert!(h.client.is_authenticated());

    let me = h.client.restore_session().await.unwrap().unwrap();
    assert!(me.is_member_of("acme"));

    h.client.logout().await;
    assert!(h.store.load().is_empty());
    assert!(h.login_redirects().is_empty());
}

#[tokio::test]
async fn bad_login_code_is_not_refreshed() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/auth/verify"))
        .respond_with(unauthorized())
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/auth/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(tokens("T2", "R2")))
        .expect(0)
        .mount(&server)
        .await;

    let h = harness(&server, signed_in(), Location::default());

    let err = h
        .client
        .verify_code("driver@acme.test", "000000")
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::Unauthenticated { .. }));
    assert_eq!(h.store.access_token().as_deref(), Some("T1"));
    assert!(h.login_redirects().is_empty());
}

#[tokio::test]
async fn validation_errors_pass_through_untouched() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/trucks"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({
            "success": false,
            "error": { "message": "Invalid truck", "fields": { "vin": ["must be 17 characters"] } }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server, signed_in(), Location::default());

    let err = h
        .client
        .post_json::<_, Value>("/v1/trucks", &json!({ "vin": "123" }))
        .await
        .unwrap_err();

    assert_eq!(
        err.field_errors().unwrap()["vin"],
        vec!["must be 17 characters".to_string()]
    );
    assert_eq!(refresh_calls(&server).await, 0);
    assert_eq!(h.store.access_token().as_deref(), Some("T1"));
}
