use super::db::TestDb;
use axum::body::Body;
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::Router;
use privacydesk::settings::Settings;
use privacydesk::storage::RecordStore;
use privacydesk::web::{self, AppState};
use serde_json::Value;
use std::path::PathBuf;
use tower::ServiceExt;

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap_or_else(|e| {
            panic!(
                "response is not JSON ({e}): {}",
                String::from_utf8_lossy(&self.body)
            )
        })
    }

    pub fn header(&self, name: header::HeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Router wired to a throwaway database (or to no database at all)
pub struct TestApp {
    router: Router,
    db: Option<TestDb>,
}

pub fn test_settings() -> Settings {
    let mut settings = Settings::default();
    settings.server.static_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("static");
    settings.session.secret = "integration-test-secret".to_string();
    settings
}

impl TestApp {
    pub async fn new() -> Self {
        let db = TestDb::new().await;
        let state = AppState::new(test_settings(), db.store().clone());
        Self {
            router: web::router(state),
            db: Some(db),
        }
    }

    pub fn unconfigured() -> Self {
        let state = AppState::new(test_settings(), RecordStore::Unconfigured);
        Self {
            router: web::router(state),
            db: None,
        }
    }

    pub fn store(&self) -> &RecordStore {
        self.db.as_ref().expect("app has no database").store()
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router failed");
        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("failed to read body")
            .to_vec();
        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn get(&self, uri: &str, cookie: Option<&str>) -> TestResponse {
        self.send(build(Method::GET, uri, cookie, None)).await
    }

    pub async fn delete(&self, uri: &str, cookie: Option<&str>) -> TestResponse {
        self.send(build(Method::DELETE, uri, cookie, None)).await
    }

    pub async fn post_json(&self, uri: &str, cookie: Option<&str>, body: Value) -> TestResponse {
        self.send(build(Method::POST, uri, cookie, Some(body))).await
    }

    pub async fn put_json(&self, uri: &str, cookie: Option<&str>, body: Value) -> TestResponse {
        self.send(build(Method::PUT, uri, cookie, Some(body))).await
    }

    pub async fn post_form(&self, uri: &str, pairs: &[(&str, &str)]) -> TestResponse {
        let body = pairs
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body))
            .expect("bad request");
        self.send(request).await
    }

    /// Sign in and return the `Cookie` header value for later requests.
    pub async fn login(&self, email: &str, password: &str) -> String {
        let response = self
            .post_json(
                "/api/login",
                None,
                serde_json::json!({ "email": email, "password": password }),
            )
            .await;
        assert_eq!(response.status, StatusCode::OK, "login failed");
        let set_cookie = response
            .header(header::SET_COOKIE)
            .expect("login did not set a cookie");
        set_cookie
            .split(';')
            .next()
            .expect("empty cookie")
            .to_string()
    }
}

fn build(method: Method, uri: &str, cookie: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    let body = match body {
        Some(value) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };
    builder.body(body).expect("bad request")
}
