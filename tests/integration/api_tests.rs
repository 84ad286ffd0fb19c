//! API integration tests
//!
//! Drive the full router in-process against the in-memory record store.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use librario_server::{
    api,
    config::AppConfig,
    repository::Repository,
    services::{email::Notifier, Services},
    AppResult, AppState,
};

const ADMIN_EMAIL: &str = "admin@librario.com";
const ADMIN_PASSWORD: &str = "admin123";

/// Keeps the body of every message sent to each address
#[derive(Default)]
struct CapturingNotifier(Mutex<Vec<(String, String)>>);

impl CapturingNotifier {
    fn last_body_for(&self, to: &str) -> String {
        self.0
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(address, _)| address == to)
            .map(|(_, body)| body.clone())
            .expect("no message sent to this address")
    }
}

#[async_trait]
impl Notifier for CapturingNotifier {
    async fn deliver(&self, to: &str, _subject: &str, body: &str) -> AppResult<()> {
        self.0.lock().unwrap().push((to.to_string(), body.to_string()));
        Ok(())
    }
}

struct TestApp {
    router: Router,
    notifier: Arc<CapturingNotifier>,
}

impl TestApp {
    async fn new() -> Self {
        let mut config = AppConfig::default();
        config.database.in_memory = true;
        config.auth.jwt_secret = "integration-secret".to_string();
        config.auth.password_hash_memory_kib = 8;
        config.auth.password_hash_iterations = 1;

        let notifier = Arc::new(CapturingNotifier::default());
        let services = Services::new(
            Repository::in_memory(),
            &config,
            notifier.clone(),
            Arc::new(mockable::DefaultClock),
        )
        .unwrap();
        services.users.ensure_admin(&config.bootstrap).await.unwrap();

        let state = AppState {
            config: Arc::new(config),
            services: Arc::new(services),
        };

        Self {
            router: api::create_router(state),
            notifier,
        }
    }

    async fn send(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(method)
            .uri(format!("/api/v1{}", uri))
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let body = body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty);

        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn login(&self, email: &str, password: &str) -> String {
        let (status, body) = self
            .send(
                Method::POST,
                "/auth/login",
                None,
                Some(json!({ "email": email, "password": password })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "login failed: {}", body);
        body["token"].as_str().unwrap().to_string()
    }

    /// Register, verify through the emailed link, and log in
    async fn member(&self, email: &str) -> String {
        let (status, _) = self
            .send(
                Method::POST,
                "/auth/register",
                None,
                Some(json!({ "email": email, "password": "secret1", "first_name": "Ada" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);

        let code = verification_code(&self.notifier.last_body_for(email));
        let (status, _) = self
            .send(Method::GET, &format!("/auth/verify?code={}", code), None, None)
            .await;
        assert_eq!(status, StatusCode::OK);

        self.login(email, "secret1").await
    }

    async fn book(&self, admin: &str, title: &str, copies: i32) -> String {
        let (status, body) = self
            .send(
                Method::POST,
                "/books",
                Some(admin),
                Some(json!({ "title": title, "total_copies": copies })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        body["id"].as_str().unwrap().to_string()
    }
}

fn verification_code(body: &str) -> String {
    let start = body.find("?code=").expect("no verification link") + "?code=".len();
    body[start..].lines().next().unwrap().trim().to_string()
}

#[tokio::test]
async fn test_health_check() {
    let app = TestApp::new().await;

    let (status, body) = app.send(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, body) = app.send(Method::GET, "/ready", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["storage"], "memory");
}

#[tokio::test]
async fn test_registration_requires_verification() {
    let app = TestApp::new().await;

    let (status, body) = app
        .send(
            Method::POST,
            "/auth/register",
            None,
            Some(json!({ "email": "ada@example.com", "password": "secret1" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["role"], "MEMBER");
    assert!(body.get("password_hash").is_none());

    let (status, body) = app
        .send(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({ "email": "ada@example.com", "password": "secret1" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], 10);

    let code = verification_code(&app.notifier.last_body_for("ada@example.com"));
    let uri = format!("/auth/verify?code={}", code);
    let (status, _) = app.send(Method::GET, &uri, None, None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app.send(Method::GET, &uri, None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 11);

    let token = app.login("ada@example.com", "secret1").await;
    let (status, body) = app.send(Method::GET, "/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email"], "ada@example.com");
    assert_eq!(body["active"], true);
}

#[tokio::test]
async fn test_duplicate_registration_conflicts() {
    let app = TestApp::new().await;
    app.member("ada@example.com").await;

    let (status, body) = app
        .send(
            Method::POST,
            "/auth/register",
            None,
            Some(json!({ "email": "ada@example.com", "password": "another" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], 8);
}

#[tokio::test]
async fn test_login_invalid_credentials() {
    let app = TestApp::new().await;

    let (status, body) = app
        .send(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({ "email": ADMIN_EMAIL, "password": "wrong" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], 9);
}

#[tokio::test]
async fn test_borrow_and_return_lifecycle() {
    let app = TestApp::new().await;
    let admin = app.login(ADMIN_EMAIL, ADMIN_PASSWORD).await;
    let member = app.member("ada@example.com").await;
    let book_id = app.book(&admin, "Dune", 3).await;

    let borrow_uri = format!("/borrow/{}?email=ada@example.com", book_id);
    let (status, record) = app.send(Method::POST, &borrow_uri, Some(&member), None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(record["status"], "BORROWED");

    let (_, book) = app.send(Method::GET, &format!("/books/{}", book_id), None, None).await;
    assert_eq!(book["available_copies"], 2);

    let (status, body) = app.send(Method::POST, &borrow_uri, Some(&member), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], 5);

    let return_uri = format!("/borrow/return/{}", record["id"]);
    let (status, _) = app.send(Method::PUT, &return_uri, Some(&member), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, returned) = app.send(Method::PUT, &return_uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(returned["status"], "RETURNED");
    assert!(returned["return_date"].is_string());

    let (status, body) = app.send(Method::PUT, &return_uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], 6);

    let (_, book) = app.send(Method::GET, &format!("/books/{}", book_id), None, None).await;
    assert_eq!(book["available_copies"], 3);
    assert_eq!(book["total_copies"], 3);

    let (status, history) = app
        .send(Method::GET, "/borrow/user/ada@example.com", Some(&member), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history.as_array().unwrap().len(), 1);
    assert_eq!(history[0]["book_title"], "Dune");
}

#[tokio::test]
async fn test_last_copy_is_unavailable() {
    let app = TestApp::new().await;
    let admin = app.login(ADMIN_EMAIL, ADMIN_PASSWORD).await;
    let ada = app.member("ada@example.com").await;
    let bob = app.member("bob@example.com").await;
    let book_id = app.book(&admin, "Emma", 1).await;

    let (status, _) = app
        .send(Method::POST, &format!("/borrow/{}?email=ada@example.com", book_id), Some(&ada), None)
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app
        .send(Method::POST, &format!("/borrow/{}?email=bob@example.com", book_id), Some(&bob), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], 7);
}

#[tokio::test]
async fn test_borrow_authorization() {
    let app = TestApp::new().await;
    let admin = app.login(ADMIN_EMAIL, ADMIN_PASSWORD).await;
    let ada = app.member("ada@example.com").await;
    app.member("bob@example.com").await;
    let book_id = app.book(&admin, "Dune", 2).await;

    let (status, _) = app
        .send(Method::POST, &format!("/borrow/{}?email=ada@example.com", book_id), None, None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .send(Method::POST, &format!("/borrow/{}?email=bob@example.com", book_id), Some(&ada), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .send(Method::POST, &format!("/borrow/{}?email=admin@librario.com", book_id), Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.send(Method::GET, "/borrow/all", Some(&ada), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .send(Method::GET, "/borrow/user/bob@example.com", Some(&ada), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .send(Method::GET, "/borrow/all", Some("not-a-token"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_catalog_management() {
    let app = TestApp::new().await;
    let admin = app.login(ADMIN_EMAIL, ADMIN_PASSWORD).await;
    let member = app.member("ada@example.com").await;

    let (status, _) = app
        .send(Method::POST, "/books", Some(&member), Some(json!({ "title": "X", "total_copies": 1 })))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let book_id = app.book(&admin, "Dune", 2).await;
    let (status, book) = app
        .send(
            Method::PUT,
            &format!("/books/{}", book_id),
            Some(&admin),
            Some(json!({ "author": "Frank Herbert", "total_copies": 4, "categories": ["Science Fiction"] })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(book["author"], "Frank Herbert");
    assert_eq!(book["available_copies"], 4);
    assert_eq!(book["categories"], json!(["Science Fiction"]));

    let (_, tagged) = app.send(Method::GET, "/books?category=science%20fiction", None, None).await;
    assert_eq!(tagged.as_array().unwrap().len(), 1);
    let (_, untagged) = app.send(Method::GET, "/books?category=poetry", None, None).await;
    assert!(untagged.as_array().unwrap().is_empty());

    let (status, _) = app
        .send(Method::DELETE, &format!("/books/{}", book_id), Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, books) = app.send(Method::GET, "/books", None, None).await;
    assert!(books.as_array().unwrap().is_empty());

    let (status, _) = app
        .send(Method::POST, &format!("/borrow/{}?email=ada@example.com", book_id), Some(&member), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_password_reset_flow() {
    let app = TestApp::new().await;
    app.member("ada@example.com").await;

    let (status, _) = app
        .send(
            Method::POST,
            "/auth/password-reset/request",
            None,
            Some(json!({ "email": "ada@example.com" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let body = app.notifier.last_body_for("ada@example.com");
    let otp: String = body
        .split_whitespace()
        .find(|word| word.len() == 6 && word.chars().all(|c| c.is_ascii_digit()))
        .unwrap()
        .to_string();

    let reset = json!({ "email": "ada@example.com", "otp": otp, "new_password": "changed1" });
    let (status, _) = app
        .send(Method::POST, "/auth/password-reset/verify", None, Some(reset.clone()))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .send(Method::POST, "/auth/password-reset/verify", None, Some(reset))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 12);

    let token = app.login("ada@example.com", "changed1").await;
    let (status, _) = app
        .send(
            Method::POST,
            "/auth/password-change",
            Some(&token),
            Some(json!({ "old_password": "wrong", "new_password": "changed2" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .send(
            Method::POST,
            "/auth/password-reset/request",
            None,
            Some(json!({ "email": "ghost@example.com" })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_member_removal() {
    let app = TestApp::new().await;
    let admin = app.login(ADMIN_EMAIL, ADMIN_PASSWORD).await;
    let member = app.member("ada@example.com").await;
    let book_id = app.book(&admin, "Dune", 1).await;

    let (status, users) = app.send(Method::GET, "/admin/users", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    let users = users.as_array().unwrap();
    let member_id = users
        .iter()
        .find(|u| u["email"] == "ada@example.com")
        .unwrap()["id"]
        .as_str()
        .unwrap()
        .to_string();
    let admin_id = users
        .iter()
        .find(|u| u["email"] == ADMIN_EMAIL)
        .unwrap()["id"]
        .as_str()
        .unwrap()
        .to_string();

    let (status, _) = app.send(Method::GET, "/admin/users", Some(&member), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .send(Method::DELETE, &format!("/admin/users/member/{}", admin_id), Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (_, record) = app
        .send(Method::POST, &format!("/borrow/{}?email=ada@example.com", book_id), Some(&member), None)
        .await;
    let (status, _) = app
        .send(Method::DELETE, &format!("/admin/users/member/{}", member_id), Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    app.send(Method::PUT, &format!("/borrow/return/{}", record["id"]), Some(&admin), None)
        .await;
    let (status, _) = app
        .send(Method::DELETE, &format!("/admin/users/member/{}", member_id), Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, history) = app
        .send(Method::GET, &format!("/borrow/book/{}", book_id), Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history.as_array().unwrap().len(), 1);
}
