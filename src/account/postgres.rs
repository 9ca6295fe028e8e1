//! `PostgreSQL` account store.
//!
//! Accounts live in the `users` table (see `sql/schema.sql`). The pool is
//! created once at startup; transient connection failures are retried with
//! exponential backoff, anything else is fatal.

use super::{AccountRecord, AccountStore, Address, Role, StoreError};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use sqlx::{
    postgres::{PgPool, PgPoolOptions, PgRow},
    types::Json,
    Connection, Row,
};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, instrument, warn, Instrument};

const CONNECT_ATTEMPTS: u32 = 3;

const FIND_BY_USERNAME: &str = r"
    SELECT id, username, email, password_hash, role, address, location, phone,
           alternate_phone, verified, joined_on, manufacturer_id, wholesaler_id,
           gst_no, blocked, brand_name, shop_name, vehicle_number, sales_region,
           created_at, updated_at, version
    FROM users
    WHERE username = $1
";

#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub min_connections: u32,
    pub max_connections: u32,
    pub max_lifetime: Duration,
    pub acquire_timeout: Duration,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            min_connections: 1,
            max_connections: 5,
            max_lifetime: Duration::from_secs(60 * 2),
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PgAccountStore {
    pool: PgPool,
}

impl PgAccountStore {
    /// Connect to the datastore, retrying transient failures.
    ///
    /// # Errors
    /// Returns the last [`StoreError`] when the connection cannot be
    /// established: immediately for non-retryable failures (bad DSN,
    /// authentication), after the final attempt otherwise.
    #[instrument(skip(dsn))]
    pub async fn connect(dsn: &SecretString, options: &ConnectOptions) -> Result<Self, StoreError> {
        for attempt in 1..=CONNECT_ATTEMPTS {
            if attempt > 1 {
                let backoff_time = 2u64.pow(attempt - 2);
                warn!("Backing off for {} seconds", backoff_time);
                sleep(Duration::from_secs(backoff_time)).await;
            }

            let result = PgPoolOptions::new()
                .min_connections(options.min_connections)
                .max_connections(options.max_connections)
                .max_lifetime(options.max_lifetime)
                .acquire_timeout(options.acquire_timeout)
                .test_before_acquire(true)
                .connect(dsn.expose_secret())
                .await;

            match result {
                Ok(pool) => {
                    info!(attempt, "datastore connected");
                    return Ok(Self { pool });
                }
                Err(err) => {
                    let err = classify(err);
                    error!(attempt, error = %err, "Error connecting to datastore");

                    if !err.is_retryable() || attempt == CONNECT_ATTEMPTS {
                        return Err(err);
                    }
                }
            }
        }

        Err(StoreError::Unavailable(
            "no connection attempt was made".to_string(),
        ))
    }
}

#[async_trait]
impl AccountStore for PgAccountStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<AccountRecord>, StoreError> {
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = FIND_BY_USERNAME
        );
        let row = sqlx::query(FIND_BY_USERNAME)
            .bind(username)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .map_err(classify)?;

        row.map(|row| account_from_row(&row)).transpose()
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let acquire_span = tracing::info_span!(
            "db.acquire",
            db.system = "postgresql",
            db.operation = "ACQUIRE"
        );
        let mut conn = self
            .pool
            .acquire()
            .instrument(acquire_span)
            .await
            .map_err(classify)?;

        let ping_span = tracing::info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
        conn.ping().instrument(ping_span).await.map_err(classify)
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

fn account_from_row(row: &PgRow) -> Result<AccountRecord, StoreError> {
    let role: String = row.try_get("role").map_err(corrupt)?;
    let role = role
        .parse::<Role>()
        .map_err(|err| StoreError::Corrupt(err.to_string()))?;
    let Json(address): Json<Address> = row.try_get("address").map_err(corrupt)?;
    let password_hash: String = row.try_get("password_hash").map_err(corrupt)?;

    Ok(AccountRecord {
        id: row.try_get("id").map_err(corrupt)?,
        username: row.try_get("username").map_err(corrupt)?,
        email: row.try_get("email").map_err(corrupt)?,
        password_hash: SecretString::from(password_hash),
        role,
        address,
        location: row.try_get("location").map_err(corrupt)?,
        phone: row.try_get("phone").map_err(corrupt)?,
        alternate_phone: row.try_get("alternate_phone").map_err(corrupt)?,
        verified: row.try_get("verified").map_err(corrupt)?,
        joined_on: row.try_get("joined_on").map_err(corrupt)?,
        manufacturer_id: row.try_get("manufacturer_id").map_err(corrupt)?,
        wholesaler_id: row.try_get("wholesaler_id").map_err(corrupt)?,
        gst_no: row.try_get("gst_no").map_err(corrupt)?,
        blocked: row.try_get("blocked").map_err(corrupt)?,
        brand_name: row.try_get("brand_name").map_err(corrupt)?,
        shop_name: row.try_get("shop_name").map_err(corrupt)?,
        vehicle_number: row.try_get("vehicle_number").map_err(corrupt)?,
        sales_region: row.try_get("sales_region").map_err(corrupt)?,
        created_at: row.try_get("created_at").map_err(corrupt)?,
        updated_at: row.try_get("updated_at").map_err(corrupt)?,
        version: row.try_get("version").map_err(corrupt)?,
    })
}

fn corrupt(err: sqlx::Error) -> StoreError {
    StoreError::Corrupt(err.to_string())
}

/// Split `sqlx` failures into "try again later", unreadable rows and
/// requests the server refused.
fn classify(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => StoreError::Unavailable(err.to_string()),
        sqlx::Error::Database(db) if db.code().is_some_and(|code| transient_sqlstate(&code)) => {
            StoreError::Unavailable(err.to_string())
        }
        sqlx::Error::RowNotFound
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::TypeNotFound { .. } => StoreError::Corrupt(err.to_string()),
        _ => StoreError::Rejected(err.to_string()),
    }
}

/// SQLSTATE classes 08 (connection exception) and 53 (insufficient
/// resources, e.g. too many clients), plus 57P03 (cannot connect now).
fn transient_sqlstate(code: &str) -> bool {
    code.starts_with("08") || code.starts_with("53") || code == "57P03"
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context, Result};
    use std::io;

    const USERS_SCHEMA_SQL: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/sql/schema.sql"));

    #[test]
    fn io_and_pool_failures_are_retryable() {
        let io_err = sqlx::Error::Io(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"));
        assert!(classify(io_err).is_retryable());
        assert!(classify(sqlx::Error::PoolTimedOut).is_retryable());
        assert!(classify(sqlx::Error::PoolClosed).is_retryable());
    }

    #[test]
    fn configuration_failures_are_rejected_not_corrupt() {
        let err = classify(sqlx::Error::Configuration("invalid port number".into()));
        assert!(matches!(err, StoreError::Rejected(_)));
        assert!(!err.is_retryable());
        assert!(err.to_string().starts_with("datastore rejected the request"));

        let err = classify(sqlx::Error::ColumnNotFound("role".to_string()));
        assert!(matches!(err, StoreError::Corrupt(_)));
    }

    #[test]
    fn resource_and_connection_sqlstates_are_transient() {
        assert!(transient_sqlstate("53300"));
        assert!(transient_sqlstate("08006"));
        assert!(transient_sqlstate("57P03"));
        assert!(!transient_sqlstate("28P01"));
        assert!(!transient_sqlstate("42P01"));
    }

    #[test]
    fn default_connect_options_match_service_pool() {
        let options = ConnectOptions::default();
        assert_eq!(options.min_connections, 1);
        assert_eq!(options.max_connections, 5);
        assert_eq!(options.max_lifetime, Duration::from_secs(120));
    }

    #[tokio::test]
    async fn bad_dsn_fails_without_retrying() {
        let dsn = SecretString::from("not a url");
        let started = std::time::Instant::now();
        let result = PgAccountStore::connect(&dsn, &ConnectOptions::default()).await;
        assert!(matches!(result, Err(StoreError::Rejected(_))));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    // Runs against a live database only when WARDEN_TEST_DSN is set.
    #[tokio::test]
    async fn finds_account_by_username() -> Result<()> {
        let Ok(dsn) = std::env::var("WARDEN_TEST_DSN") else {
            eprintln!("Skipping datastore test: WARDEN_TEST_DSN not set");
            return Ok(());
        };
        let store = PgAccountStore::connect(&SecretString::from(dsn), &ConnectOptions::default())
            .await
            .context("failed to connect test store")?;

        for statement in USERS_SCHEMA_SQL.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            sqlx::query(statement).execute(&store.pool).await?;
        }

        let username = format!("user-{}", uuid::Uuid::new_v4());
        let hash = crate::credentials::password::hash_password("correct", 4)?;
        sqlx::query(
            r"INSERT INTO users (username, email, password_hash, role, address, phone, joined_on,
                 manufacturer_id, wholesaler_id, gst_no, brand_name, shop_name, sales_region)
              VALUES ($1, $2, $3, 'agent', $4, '9000000000', NOW(), 12345, 54321, 'GST', 'Acme', 'Acme Stores', $5)",
        )
        .bind(&username)
        .bind(format!("{username}@example.com"))
        .bind(hash)
        .bind(Json(Address {
            region: "south".to_string(),
            city: "Chennai".to_string(),
            street: "1 Anna Salai".to_string(),
            state: "TN".to_string(),
            pincode: "600002".to_string(),
        }))
        .bind(vec!["south".to_string()])
        .execute(&store.pool)
        .await?;

        let found = store
            .find_by_username(&username)
            .await?
            .context("account should exist")?;
        assert_eq!(found.role, Role::Agent);
        assert_eq!(found.address.city, "Chennai");

        assert!(store.find_by_username(&username.to_uppercase()).await?.is_none());
        store.ping().await?;

        store.close().await;
        assert!(matches!(
            store.find_by_username(&username).await,
            Err(StoreError::Unavailable(_))
        ));
        Ok(())
    }
}
