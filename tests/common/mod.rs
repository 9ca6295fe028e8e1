#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use anyhow::Result;
use chrono::Utc;
use secrecy::SecretString;
use std::{sync::Arc, time::Duration};
use tokio::{net::TcpListener, sync::oneshot, task::JoinHandle};
use uuid::Uuid;
use warden::{
    account::{AccountRecord, AccountStore, Address, MemoryAccountStore, Role},
    api::{
        self,
        handlers::auth::{AuthConfig, AuthState},
        middleware::{FixedWindowLimiter, RateLimiter},
        ApiConfig,
    },
    credentials::{password::hash_password, TokenIssuer},
    lifecycle::Lifecycle,
};

pub const USERNAME: &str = "alice";
pub const PASSWORD: &str = "correct";
pub const JWT_KEY: &str = "integration-signing-key";

pub fn account(username: &str, password: &str) -> Result<AccountRecord> {
    Ok(AccountRecord {
        id: Uuid::new_v4(),
        username: username.to_string(),
        email: format!("{username}@example.com"),
        password_hash: SecretString::from(hash_password(password, 4)?),
        role: Role::Agent,
        address: Address {
            region: "south".to_string(),
            city: "Chennai".to_string(),
            street: "1 Anna Salai".to_string(),
            state: "TN".to_string(),
            pincode: "600002".to_string(),
        },
        location: Some("Chennai".to_string()),
        phone: "9000000000".to_string(),
        alternate_phone: None,
        verified: true,
        joined_on: Utc::now(),
        manufacturer_id: 12345,
        wholesaler_id: 54321,
        gst_no: "33ABCDE1234F1Z5".to_string(),
        blocked: false,
        brand_name: "Acme".to_string(),
        shop_name: "Acme Stores".to_string(),
        vehicle_number: None,
        sales_region: vec!["south".to_string()],
        created_at: Utc::now(),
        updated_at: Utc::now(),
        version: 0,
    })
}

pub struct TestServer {
    pub base_url: String,
    pub store: Arc<MemoryAccountStore>,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<Result<()>>,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Send the shutdown signal without waiting for the server to stop.
    pub fn signal_shutdown(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }

    pub async fn stop(mut self) -> Result<()> {
        self.signal_shutdown();
        self.handle.await?
    }
}

pub struct ServerBuilder {
    config: ApiConfig,
    max_requests: u32,
    window: Duration,
    grace: Duration,
    store: MemoryAccountStore,
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self {
            config: ApiConfig::new(),
            max_requests: 100,
            window: Duration::from_secs(15 * 60),
            grace: Duration::from_secs(5),
            store: MemoryAccountStore::new(),
        }
    }

    pub fn config(mut self, config: ApiConfig) -> Self {
        self.config = config;
        self
    }

    pub fn rate_limit(mut self, max_requests: u32, window: Duration) -> Self {
        self.max_requests = max_requests;
        self.window = window;
        self
    }

    pub fn grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn store(mut self, store: MemoryAccountStore) -> Self {
        self.store = store;
        self
    }

    pub async fn spawn(self) -> Result<TestServer> {
        let store = Arc::new(self.store);
        let dyn_store: Arc<dyn AccountStore> = store.clone();
        let limiter: Arc<dyn RateLimiter> =
            Arc::new(FixedWindowLimiter::new(self.max_requests, self.window));
        let issuer = TokenIssuer::new(&SecretString::from(JWT_KEY))?;
        let auth = Arc::new(AuthState::new(AuthConfig::new(), dyn_store.clone(), issuer));

        let pipeline = api::pipeline(&self.config, auth, dyn_store.clone(), limiter.clone());
        let app = api::app(Arc::new(pipeline));

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let base_url = format!("http://{}", listener.local_addr()?);

        let (tx, rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(
            Lifecycle::new(dyn_store)
                .with_limiter(limiter, Duration::from_secs(1))
                .with_grace(self.grace)
                .with_monitor_interval(Duration::from_millis(200))
                .run(listener, app, async move {
                    let _ = rx.await;
                }),
        );

        Ok(TestServer {
            base_url,
            store,
            shutdown: Some(tx),
            handle,
        })
    }
}

pub fn client() -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder().build()?)
}
