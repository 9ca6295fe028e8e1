mod common;

use anyhow::Result;
use common::{account, client, ServerBuilder, PASSWORD, USERNAME};
use reqwest::StatusCode;
use serde_json::json;
use std::time::{Duration, Instant};
use warden::account::MemoryAccountStore;

#[tokio::test]
async fn in_flight_login_completes_before_store_closes() -> Result<()> {
    let mut server = ServerBuilder::new()
        .store(
            MemoryAccountStore::new()
                .with_account(account(USERNAME, PASSWORD)?)
                .with_lookup_delay(Duration::from_millis(500)),
        )
        .spawn()
        .await?;

    let request = client()?
        .post(server.url("/api/auth/login"))
        .json(&json!({ "username": USERNAME, "password": PASSWORD }))
        .send();
    let in_flight = tokio::spawn(request);

    tokio::time::sleep(Duration::from_millis(150)).await;
    server.signal_shutdown();

    let response = in_flight.await??;
    // The lookup runs after the delay, so a 201 means the store was still open.
    assert_eq!(response.status(), StatusCode::CREATED);

    let store = server.store.clone();
    server.stop().await?;
    assert!(store.is_closed());
    Ok(())
}

#[tokio::test]
async fn requests_past_the_grace_period_are_aborted() -> Result<()> {
    let mut server = ServerBuilder::new()
        .grace(Duration::from_millis(200))
        .store(
            MemoryAccountStore::new()
                .with_account(account(USERNAME, PASSWORD)?)
                .with_lookup_delay(Duration::from_millis(1500)),
        )
        .spawn()
        .await?;

    let started = Instant::now();
    let request = client()?
        .post(server.url("/api/auth/login"))
        .json(&json!({ "username": USERNAME, "password": PASSWORD }))
        .send();
    let in_flight = tokio::spawn(request);

    tokio::time::sleep(Duration::from_millis(100)).await;
    server.signal_shutdown();

    let store = server.store.clone();
    server.stop().await?;
    assert!(store.is_closed());

    let response = in_flight.await??;
    // Answered by the abort, not by a lookup against the closed store.
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(started.elapsed() < Duration::from_millis(1400));
    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["message"], "Server shutting down");
    Ok(())
}

#[tokio::test]
async fn idle_server_stops_cleanly() -> Result<()> {
    let server = ServerBuilder::new().spawn().await?;
    let base = server.base_url.clone();
    let store = server.store.clone();

    let health = client()?.get(format!("{base}/health")).send().await?;
    assert_eq!(health.status(), StatusCode::OK);

    server.stop().await?;
    assert!(store.is_closed());
    assert!(client()?.get(format!("{base}/health")).send().await.is_err());
    Ok(())
}
