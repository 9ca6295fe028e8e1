#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use anyhow::{Context, Result};
use common::{account, client, ServerBuilder, PASSWORD, USERNAME};
use reqwest::{header, StatusCode};
use secrecy::SecretString;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use warden::{
    account::MemoryAccountStore,
    api::ApiConfig,
    credentials::{password, TokenIssuer},
};

const LOGIN: &str = "/api/auth/login";

fn session_cookie(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find(|value| value.starts_with("access_token="))
        .map(ToString::to_string)
}

fn token_of(cookie: &str) -> Option<&str> {
    cookie
        .split(';')
        .next()
        .and_then(|pair| pair.strip_prefix("access_token="))
}

async fn server_with_alice() -> Result<common::TestServer> {
    ServerBuilder::new()
        .store(MemoryAccountStore::new().with_account(account(USERNAME, PASSWORD)?))
        .spawn()
        .await
}

#[tokio::test]
async fn valid_credentials_set_session_cookie() -> Result<()> {
    let server = server_with_alice().await?;
    let response = client()?
        .post(server.url(LOGIN))
        .json(&json!({ "username": USERNAME, "password": PASSWORD }))
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::CREATED);
    assert!(response.headers().contains_key("x-request-id"));

    let cookie = session_cookie(&response).context("missing access_token cookie")?;
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("Path=/"));
    let token = token_of(&cookie).context("cookie without token")?;
    let claims = TokenIssuer::new(&SecretString::from(common::JWT_KEY))?.verify(token)?;
    assert_eq!(claims.role.as_str(), "agent");

    let body: Value = response.json().await?;
    assert_eq!(body["role"], "agent");
    assert_eq!(body["details"]["username"], USERNAME);
    assert_eq!(body["details"]["GSTno"], "33ABCDE1234F1Z5");
    let details = body["details"].as_object().context("details not an object")?;
    for private in ["password", "passwordHash", "_id", "id", "role", "__v"] {
        assert!(!details.contains_key(private), "leaked {private}");
    }
    assert!(!body.to_string().contains("$2b$"));

    server.stop().await
}

#[tokio::test]
async fn unknown_username_is_not_found() -> Result<()> {
    let server = server_with_alice().await?;
    for secret in [PASSWORD, "anything"] {
        let response = client()?
            .post(server.url(LOGIN))
            .json(&json!({ "username": "mallory", "password": secret }))
            .send()
            .await?;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(session_cookie(&response).is_none());
        let body: Value = response.json().await?;
        assert_eq!(body["success"], false);
        assert_eq!(body["status"], 404);
        assert_eq!(body["message"], "User not found");
    }

    server.stop().await
}

#[tokio::test]
async fn wrong_password_is_rejected() -> Result<()> {
    let server = server_with_alice().await?;
    let response = client()?
        .post(server.url(LOGIN))
        .json(&json!({ "username": USERNAME, "password": "wrong" }))
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(session_cookie(&response).is_none());
    let body: Value = response.json().await?;
    assert_eq!(body["status"], 400);
    assert_eq!(body["message"], "password incorrect");

    server.stop().await
}

#[tokio::test]
async fn malformed_and_oversized_bodies() -> Result<()> {
    let server = ServerBuilder::new()
        .config(ApiConfig::new().with_body_limit(64))
        .store(MemoryAccountStore::new().with_account(account(USERNAME, PASSWORD)?))
        .spawn()
        .await?;
    let client = client()?;

    let malformed = client
        .post(server.url(LOGIN))
        .header(header::CONTENT_TYPE, "application/json")
        .body("{\"username\": ")
        .send()
        .await?;
    assert_eq!(malformed.status(), StatusCode::BAD_REQUEST);
    let body: Value = malformed.json().await?;
    assert_eq!(body["success"], false);

    let missing = client
        .post(server.url(LOGIN))
        .json(&json!({ "username": USERNAME }))
        .send()
        .await?;
    assert_eq!(missing.status(), StatusCode::BAD_REQUEST);

    let numeric = client
        .post(server.url(LOGIN))
        .json(&json!({ "username": USERNAME, "password": 98_765_432 }))
        .send()
        .await?;
    assert_eq!(numeric.status(), StatusCode::BAD_REQUEST);
    let body = numeric.text().await?;
    assert!(!body.contains("98765432"), "leaked: {body}");

    let oversized = client
        .post(server.url(LOGIN))
        .json(&json!({ "username": USERNAME, "password": "x".repeat(256) }))
        .send()
        .await?;
    assert_eq!(oversized.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let body: Value = oversized.json().await?;
    assert_eq!(body["status"], 413);

    server.stop().await
}

#[tokio::test]
async fn hundred_and_first_request_is_limited_per_address() -> Result<()> {
    let server = ServerBuilder::new()
        .config(ApiConfig::new().with_trust_proxy(true))
        .spawn()
        .await?;
    let client = client()?;

    for _ in 0..100 {
        let response = client
            .get(server.url("/nothing"))
            .header("x-forwarded-for", "203.0.113.7")
            .send()
            .await?;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    let limited = client
        .get(server.url("/nothing"))
        .header("x-forwarded-for", "203.0.113.7")
        .send()
        .await?;
    assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(limited.headers().contains_key(header::RETRY_AFTER));
    assert_eq!(
        limited
            .headers()
            .get("ratelimit-remaining")
            .and_then(|value| value.to_str().ok()),
        Some("0")
    );

    let other = client
        .get(server.url("/nothing"))
        .header("x-forwarded-for", "198.51.100.9")
        .send()
        .await?;
    assert_eq!(other.status(), StatusCode::NOT_FOUND);

    server.stop().await
}

#[tokio::test]
async fn successive_logins_issue_independent_tokens() -> Result<()> {
    let server = server_with_alice().await?;
    let client = client()?;

    let mut tokens = Vec::new();
    for _ in 0..2 {
        let response = client
            .post(server.url(LOGIN))
            .json(&json!({ "username": USERNAME, "password": PASSWORD }))
            .send()
            .await?;
        assert_eq!(response.status(), StatusCode::CREATED);
        let cookie = session_cookie(&response).context("missing access_token cookie")?;
        tokens.push(token_of(&cookie).context("cookie without token")?.to_string());
    }
    assert_ne!(tokens[0], tokens[1]);

    server.stop().await
}

fn median(mut samples: Vec<Duration>) -> Duration {
    samples.sort();
    samples[samples.len() / 2]
}

#[test]
fn verification_time_does_not_track_matching_prefix() -> Result<()> {
    let stored = password::hash_password("correct-horse-battery-staple", 4)?;
    let rounds = 25;

    let mut near = Vec::with_capacity(rounds);
    let mut far = Vec::with_capacity(rounds);
    for _ in 0..rounds {
        let started = Instant::now();
        assert!(!password::verify("correct-horse-battery-stapl_", &stored));
        near.push(started.elapsed());

        let started = Instant::now();
        assert!(!password::verify("_", &stored));
        far.push(started.elapsed());
    }

    let near = median(near).as_secs_f64();
    let far = median(far).as_secs_f64();
    let ratio = near.max(far) / near.min(far).max(f64::EPSILON);
    assert!(ratio < 3.0, "near={near}s far={far}s");
    Ok(())
}
