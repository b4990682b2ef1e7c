//! Integration tests for the movietrack server

use std::net::TcpListener;
use movietrack::configuration::{get_configuration, RepositoryBackend};
use movietrack::startup::{build_auth_service, run};

async fn spawn_app() -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();

    let mut configuration = get_configuration().expect("Failed to read configuration.");
    configuration.hashing.cost = 4;
    configuration.repository.backend = RepositoryBackend::Memory;
    let auth = build_auth_service(&configuration)
        .await
        .expect("Failed to build auth service");

    let server = run(listener, auth).expect("Failed to create server");
    let _ = tokio::spawn(async move {
        let _ = server.await;
    });

    format!("http://127.0.0.1:{}", port)
}

#[tokio::test]
async fn health_check_works() {
    let addr = spawn_app().await;

    let response = reqwest::Client::new()
        .get(&format!("{}/health_check", addr))
        .send()
        .await
        .expect("Failed to execute request");

    assert!(response.status().is_success());
    assert_eq!(Some(0), response.content_length());
}

#[tokio::test]
async fn unknown_route_returns_404() {
    let addr = spawn_app().await;

    let response = reqwest::Client::new()
        .get(&format!("{}/subscriptions", addr))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(404, response.status().as_u16());
}
