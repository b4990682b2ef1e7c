use std::net::TcpListener;
use movietrack::configuration::{get_configuration, RepositoryBackend};
use movietrack::startup::{build_auth_service, run};
use serde_json::{json, Value};

pub struct TestApp {
    pub address: String,
    pub client: reqwest::Client,
}

async fn spawn_app() -> TestApp {
    let listener = TcpListener::bind("127.0.0.1:0")
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    let mut configuration = get_configuration().expect("Failed to read configuration.");
    // Cheap hashing and no database for tests
    configuration.hashing.cost = 4;
    configuration.repository.backend = RepositoryBackend::Memory;

    let auth = build_auth_service(&configuration)
        .await
        .expect("Failed to build auth service");
    let server = run(listener, auth).expect("Failed to bind address");
    let _ = tokio::spawn(server);

    TestApp {
        address,
        client: reqwest::Client::new(),
    }
}

impl TestApp {
    async fn post_json(&self, path: &str, body: &Value) -> reqwest::Response {
        self.client
            .post(&format!("{}{}", &self.address, path))
            .json(body)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    async fn register(&self, username: &str, password: &str) -> reqwest::Response {
        self.post_json(
            "/auth/register",
            &json!({ "username": username, "password": password }),
        )
        .await
    }

    /// Register and log in, returning the login response body
    async fn login_new_user(&self, username: &str, password: &str) -> Value {
        assert_eq!(201, self.register(username, password).await.status().as_u16());
        let response = self
            .post_json(
                "/auth/login",
                &json!({ "username": username, "password": password }),
            )
            .await;
        assert_eq!(200, response.status().as_u16());
        response.json().await.expect("Failed to parse response")
    }

    async fn refresh(&self, refresh_token: &str) -> reqwest::Response {
        self.post_json("/auth/refresh", &json!({ "refresh_token": refresh_token }))
            .await
    }
}

fn token(body: &Value, field: &str) -> String {
    body[field]
        .as_str()
        .unwrap_or_else(|| panic!("No {} in response", field))
        .to_string()
}

// --- Registration Tests ---

#[tokio::test]
async fn register_returns_201_for_valid_credentials() {
    let app = spawn_app().await;

    let response = app.register("alice", "secret1").await;
    assert_eq!(201, response.status().as_u16());

    let response_body: Value = response.json().await.expect("Failed to parse response");
    let user_id = response_body["user_id"].as_str().expect("No user_id in response");
    assert!(uuid::Uuid::parse_str(user_id).is_ok());
}

#[tokio::test]
async fn register_returns_409_for_duplicate_username() {
    let app = spawn_app().await;

    assert_eq!(201, app.register("alice", "secret1").await.status().as_u16());

    let response = app.register("alice", "different").await;
    assert_eq!(409, response.status().as_u16());

    let response_body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(response_body["code"], "DUPLICATE_USERNAME");
}

#[tokio::test]
async fn register_returns_400_for_invalid_input() {
    let app = spawn_app().await;
    let long_password = "p".repeat(73);

    let cases = vec![
        ("", "secret1", "empty username"),
        ("al ice", "secret1", "whitespace in username"),
        ("alice", "", "empty password"),
        ("alice", long_password.as_str(), "password over 72 bytes"),
    ];

    for (username, password, description) in cases {
        let response = app.register(username, password).await;
        assert_eq!(
            400,
            response.status().as_u16(),
            "Should reject {}",
            description
        );
    }
}

#[tokio::test]
async fn register_returns_400_for_missing_fields() {
    let app = spawn_app().await;

    let bodies = vec![
        json!({ "username": "alice" }),
        json!({ "password": "secret1" }),
        json!({}),
    ];

    for body in bodies {
        let response = app.post_json("/auth/register", &body).await;
        assert_eq!(400, response.status().as_u16(), "Should reject body: {}", body);
    }
}

// --- Login Tests ---

#[tokio::test]
async fn login_returns_200_with_token_pair() {
    let app = spawn_app().await;

    let body = app.login_new_user("alice", "secret1").await;

    assert!(body.get("access_token").is_some());
    assert!(body.get("refresh_token").is_some());
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["expires_in"], 900);
}

#[tokio::test]
async fn login_failures_are_indistinguishable() {
    let app = spawn_app().await;
    assert_eq!(201, app.register("alice", "secret1").await.status().as_u16());

    let wrong_password = app
        .post_json("/auth/login", &json!({ "username": "alice", "password": "nope" }))
        .await;
    let unknown_user = app
        .post_json("/auth/login", &json!({ "username": "bob", "password": "x" }))
        .await;

    assert_eq!(401, wrong_password.status().as_u16());
    assert_eq!(401, unknown_user.status().as_u16());

    let wrong_password: Value = wrong_password.json().await.unwrap();
    let unknown_user: Value = unknown_user.json().await.unwrap();
    assert_eq!(wrong_password["code"], unknown_user["code"]);
    assert_eq!(wrong_password["message"], unknown_user["message"]);
}

// --- Refresh Tests ---

#[tokio::test]
async fn refresh_rotates_tokens_and_rejects_replay() {
    let app = spawn_app().await;
    let login = app.login_new_user("alice", "secret1").await;
    let first_refresh = token(&login, "refresh_token");

    let response = app.refresh(&first_refresh).await;
    assert_eq!(200, response.status().as_u16());
    let rotated: Value = response.json().await.unwrap();
    let second_refresh = token(&rotated, "refresh_token");
    assert_ne!(first_refresh, second_refresh);

    // Replaying the spent token fails
    let replay = app.refresh(&first_refresh).await;
    assert_eq!(401, replay.status().as_u16());
    let replay: Value = replay.json().await.unwrap();
    assert_eq!(replay["code"], "TOKEN_REVOKED");

    // The rotated token still works
    assert_eq!(200, app.refresh(&second_refresh).await.status().as_u16());
}

#[tokio::test]
async fn refresh_returns_401_for_invalid_token() {
    let app = spawn_app().await;

    let response = app.refresh("invalid.token.here").await;
    assert_eq!(401, response.status().as_u16());

    let response_body: Value = response.json().await.unwrap();
    assert_eq!(response_body["code"], "TOKEN_INVALID");
}

#[tokio::test]
async fn refresh_rejects_access_token() {
    let app = spawn_app().await;
    let login = app.login_new_user("alice", "secret1").await;

    let response = app.refresh(&token(&login, "access_token")).await;
    assert_eq!(401, response.status().as_u16());
}

#[tokio::test]
async fn refresh_returns_400_for_missing_token() {
    let app = spawn_app().await;

    let response = app.post_json("/auth/refresh", &json!({})).await;
    assert_eq!(400, response.status().as_u16());
}

// --- Logout Tests ---

#[tokio::test]
async fn logout_revokes_refresh_token() {
    let app = spawn_app().await;
    let login = app.login_new_user("alice", "secret1").await;
    let refresh_token = token(&login, "refresh_token");

    let response = app
        .post_json("/auth/logout", &json!({ "refresh_token": refresh_token }))
        .await;
    assert_eq!(204, response.status().as_u16());

    assert_eq!(401, app.refresh(&refresh_token).await.status().as_u16());
}

#[tokio::test]
async fn logout_accepts_invalid_token() {
    let app = spawn_app().await;

    let response = app
        .post_json("/auth/logout", &json!({ "refresh_token": "garbage" }))
        .await;
    assert_eq!(204, response.status().as_u16());
}

// --- Account Tests ---

#[tokio::test]
async fn account_returns_401_without_token() {
    let app = spawn_app().await;

    let response = app
        .client
        .get(&format!("{}/auth/account", &app.address))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(401, response.status().as_u16());
    let response_body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(response_body["code"], "TOKEN_INVALID");
}

#[tokio::test]
async fn account_rejects_malformed_authorization_header() {
    let app = spawn_app().await;

    let malformed_headers = vec![
        "Bearer",              // missing token
        "Basic dXNlcjpwYXNz",  // not Bearer
        "BearerToken",         // missing space
        "Bearer invalid.token.here",
    ];

    for header in malformed_headers {
        let response = app
            .client
            .get(&format!("{}/auth/account", &app.address))
            .header("Authorization", header)
            .send()
            .await
            .expect("Failed to execute request.");

        assert_eq!(401, response.status().as_u16(), "Should reject header: {}", header);
    }
}

#[tokio::test]
async fn account_rejects_refresh_token_as_bearer() {
    let app = spawn_app().await;
    let login = app.login_new_user("alice", "secret1").await;

    let response = app
        .client
        .get(&format!("{}/auth/account", &app.address))
        .bearer_auth(token(&login, "refresh_token"))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(401, response.status().as_u16());
}

#[tokio::test]
async fn account_returns_200_with_valid_token() {
    let app = spawn_app().await;
    let login = app.login_new_user("alice", "secret1").await;

    let response = app
        .client
        .get(&format!("{}/auth/account", &app.address))
        .bearer_auth(token(&login, "access_token"))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(200, response.status().as_u16());
    let response_body: Value = response.json().await.unwrap();
    assert_eq!(response_body["username"], "alice");
    assert!(response_body.get("id").is_some());
    assert!(response_body.get("password_hash").is_none());
}

#[tokio::test]
async fn change_password_through_account_endpoint() {
    let app = spawn_app().await;
    let login = app.login_new_user("alice", "secret1").await;
    let access_token = token(&login, "access_token");

    let response = app
        .client
        .patch(&format!("{}/auth/account", &app.address))
        .bearer_auth(&access_token)
        .json(&json!({ "password": "secret2" }))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(204, response.status().as_u16());

    let old = app
        .post_json("/auth/login", &json!({ "username": "alice", "password": "secret1" }))
        .await;
    assert_eq!(401, old.status().as_u16());

    let new = app
        .post_json("/auth/login", &json!({ "username": "alice", "password": "secret2" }))
        .await;
    assert_eq!(200, new.status().as_u16());
}

#[tokio::test]
async fn account_update_rejections() {
    let app = spawn_app().await;
    let login = app.login_new_user("alice", "secret1").await;
    assert_eq!(201, app.register("bob", "secret1").await.status().as_u16());
    let access_token = token(&login, "access_token");

    let cases = vec![
        (json!({ "id": "00000000-0000-0000-0000-000000000000" }), 400, "IMMUTABLE_FIELD"),
        (json!({ "user_id": "x" }), 400, "IMMUTABLE_FIELD"),
        (json!({ "password": "secret1" }), 400, "PASSWORD_UNCHANGED"),
        (json!({ "username": "bob" }), 409, "DUPLICATE_USERNAME"),
    ];

    for (body, status, code) in cases {
        let response = app
            .client
            .patch(&format!("{}/auth/account", &app.address))
            .bearer_auth(&access_token)
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request.");

        assert_eq!(status, response.status().as_u16(), "Unexpected status for {}", body);
        let response_body: Value = response.json().await.unwrap();
        assert_eq!(response_body["code"], code, "Unexpected code for {}", body);
    }
}

#[tokio::test]
async fn delete_account_then_login_fails() {
    let app = spawn_app().await;
    let login = app.login_new_user("alice", "secret1").await;

    let response = app
        .client
        .delete(&format!("{}/auth/account", &app.address))
        .bearer_auth(token(&login, "access_token"))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(204, response.status().as_u16());

    let response = app
        .post_json("/auth/login", &json!({ "username": "alice", "password": "secret1" }))
        .await;
    assert_eq!(401, response.status().as_u16());
}

#[tokio::test]
async fn account_accepts_lowercase_bearer_scheme() {
    let app = spawn_app().await;
    let login = app.login_new_user("alice", "secret1").await;

    let response = app
        .client
        .get(&format!("{}/auth/account", &app.address))
        .header("Authorization", format!("bearer {}", token(&login, "access_token")))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(200, response.status().as_u16());
}

#[tokio::test]
async fn old_tokens_cannot_take_over_reregistered_username() {
    let app = spawn_app().await;
    let old_login = app.login_new_user("alice", "secret1").await;
    let old_access = token(&old_login, "access_token");

    let response = app
        .client
        .delete(&format!("{}/auth/account", &app.address))
        .bearer_auth(&old_access)
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(204, response.status().as_u16());

    assert_eq!(201, app.register("alice", "victimpw").await.status().as_u16());

    let response = app.refresh(&token(&old_login, "refresh_token")).await;
    assert_eq!(401, response.status().as_u16());
    let response_body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(response_body["code"], "TOKEN_REVOKED");

    let response = app
        .client
        .patch(&format!("{}/auth/account", &app.address))
        .bearer_auth(&old_access)
        .json(&json!({ "password": "hijacked" }))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(404, response.status().as_u16());

    let response = app
        .client
        .get(&format!("{}/auth/account", &app.address))
        .bearer_auth(&old_access)
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(404, response.status().as_u16());

    let response = app
        .post_json("/auth/login", &json!({ "username": "alice", "password": "victimpw" }))
        .await;
    assert_eq!(200, response.status().as_u16());
}

#[tokio::test]
async fn renamed_account_keeps_its_tokens() {
    let app = spawn_app().await;
    let login = app.login_new_user("alice", "secret1").await;
    let access_token = token(&login, "access_token");

    let response = app
        .client
        .patch(&format!("{}/auth/account", &app.address))
        .bearer_auth(&access_token)
        .json(&json!({ "username": "alice2" }))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(204, response.status().as_u16());

    // Same access token still reaches the renamed account
    let response = app
        .client
        .get(&format!("{}/auth/account", &app.address))
        .bearer_auth(&access_token)
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(200, response.status().as_u16());
    let response_body: Value = response.json().await.unwrap();
    assert_eq!(response_body["username"], "alice2");

    let response = app.refresh(&token(&login, "refresh_token")).await;
    assert_eq!(200, response.status().as_u16());
}
