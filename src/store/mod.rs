//! SQLite-backed persistence for proxy state and users.

use crate::utils::error::{ProxyError, ProxyResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{FromRow, SqlitePool};
use std::str::FromStr;

/// `DB_PATH` environment variable; falls back to `./proxy-pool.db`.
pub fn db_path_from_env() -> String {
    std::env::var("DB_PATH").unwrap_or_else(|_| "./proxy-pool.db".to_string())
}

/// A row of the `proxies` table, as handed to and returned from callers.
/// Stored as `i64` columns under the hood (see [`ProxyRecordRow`]) since
/// sqlite has no unsigned integer type.
#[derive(Debug, Clone)]
pub struct ProxyRecord {
    pub url: String,
    pub score: f64,
    pub alive: bool,
    pub last_test: DateTime<Utc>,
    pub usage_count: u64,
    pub fail_count: u64,
    pub success_count: u64,
    pub latency_ms: u64,
}

#[derive(Debug, Clone, FromRow)]
struct UserRow {
    id: String,
    username: String,
    password_hash: String,
}

/// Narrow persistence contract the core depends on. The concrete backing
/// (SQLite via `sqlx`, behind [`Store`]) is opaque to callers, so a
/// fixture store can stand in for it in tests.
#[async_trait]
pub trait StoreAdapter: Send + Sync {
    /// Load every persisted proxy record, in no particular order.
    async fn load_proxies(&self) -> ProxyResult<Vec<ProxyRecord>>;

    /// Upsert a single proxy record by URL.
    async fn save_proxy(&self, record: &ProxyRecord) -> ProxyResult<()>;

    /// Upsert every record; logs and continues past individual failures
    /// so one bad row never blocks the rest of a checkpoint sweep.
    async fn save_all(&self, records: &[ProxyRecord]);

    /// Create a user with an already-generated id and hashed password.
    /// Fails with [`ProxyError::UserConflict`] if the username is taken.
    async fn create_user(&self, id: &str, username: &str, password_hash: &str) -> ProxyResult<()>;

    /// Fetch a user row by username, for password verification by the
    /// caller (the store never sees plaintext passwords).
    async fn get_user_by_username(&self, username: &str) -> ProxyResult<Option<(String, String)>>;
}

/// Owns the SQLite connection pool and creates the schema on first run.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Connect to `db_path`, creating the file and schema if absent.
    /// `":memory:"` opens a private in-memory database, used by tests.
    pub async fn connect(db_path: &str) -> ProxyResult<Self> {
        let (options, max_connections) = if db_path == ":memory:" {
            (
                SqliteConnectOptions::from_str("sqlite::memory:")
                    .map_err(|e| ProxyError::Persistence(e.to_string()))?,
                1,
            )
        } else {
            (
                SqliteConnectOptions::from_str(&format!("sqlite://{}", db_path))
                    .map_err(|e| ProxyError::Persistence(e.to_string()))?
                    .create_if_missing(true),
                5,
            )
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| ProxyError::Persistence(e.to_string()))?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> ProxyResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS proxies (
                url TEXT PRIMARY KEY,
                score REAL NOT NULL,
                alive INTEGER NOT NULL,
                last_test TEXT NOT NULL,
                usage_count INTEGER NOT NULL,
                fail_count INTEGER NOT NULL,
                success_count INTEGER NOT NULL,
                latency_ms INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| ProxyError::Persistence(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| ProxyError::Persistence(e.to_string()))?;

        Ok(())
    }
}

#[async_trait]
impl StoreAdapter for Store {
    async fn load_proxies(&self) -> ProxyResult<Vec<ProxyRecord>> {
        let rows = sqlx::query_as::<_, ProxyRecordRow>(
            r#"
            SELECT url, score, alive, last_test, usage_count, fail_count, success_count, latency_ms
            FROM proxies
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ProxyError::Persistence(e.to_string()))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn save_proxy(&self, record: &ProxyRecord) -> ProxyResult<()> {
        sqlx::query(
            r#"
            INSERT INTO proxies (url, score, alive, last_test, usage_count, fail_count, success_count, latency_ms)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(url) DO UPDATE SET
                score = excluded.score,
                alive = excluded.alive,
                last_test = excluded.last_test,
                usage_count = excluded.usage_count,
                fail_count = excluded.fail_count,
                success_count = excluded.success_count,
                latency_ms = excluded.latency_ms
            "#,
        )
        .bind(&record.url)
        .bind(record.score)
        .bind(record.alive)
        .bind(record.last_test.to_rfc3339())
        .bind(record.usage_count as i64)
        .bind(record.fail_count as i64)
        .bind(record.success_count as i64)
        .bind(record.latency_ms as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| ProxyError::Persistence(e.to_string()))?;

        Ok(())
    }

    async fn save_all(&self, records: &[ProxyRecord]) {
        for record in records {
            if let Err(e) = self.save_proxy(record).await {
                log::warn!("failed to save proxy {}: {}", record.url, e);
            }
        }
    }

    async fn create_user(&self, id: &str, username: &str, password_hash: &str) -> ProxyResult<()> {
        sqlx::query("INSERT INTO users (id, username, password_hash, created_at) VALUES (?, ?, ?, ?)")
            .bind(id)
            .bind(username)
            .bind(password_hash)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    ProxyError::UserConflict
                } else {
                    ProxyError::Persistence(e.to_string())
                }
            })?;
        Ok(())
    }

    async fn get_user_by_username(&self, username: &str) -> ProxyResult<Option<(String, String)>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, username, password_hash FROM users WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| ProxyError::Persistence(e.to_string()))?;

        Ok(row.map(|r| (r.id, r.password_hash)))
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

#[derive(Debug, FromRow)]
struct ProxyRecordRow {
    url: String,
    score: f64,
    alive: bool,
    last_test: String,
    usage_count: i64,
    fail_count: i64,
    success_count: i64,
    latency_ms: i64,
}

impl From<ProxyRecordRow> for ProxyRecord {
    fn from(row: ProxyRecordRow) -> Self {
        let last_test = DateTime::parse_from_rfc3339(&row.last_test)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());
        ProxyRecord {
            url: row.url,
            score: row.score,
            alive: row.alive,
            last_test,
            usage_count: row.usage_count as u64,
            fail_count: row.fail_count as u64,
            success_count: row.success_count as u64,
            latency_ms: row.latency_ms as u64,
        }
    }
}

/// In-memory [`StoreAdapter`] test-double: no sqlite, no schema, just two
/// guarded maps. Lets pool/health/API tests substitute a fixture store
/// instead of standing up a real database.
#[cfg(test)]
pub struct FixtureStore {
    proxies: parking_lot::Mutex<std::collections::HashMap<String, ProxyRecord>>,
    users: parking_lot::Mutex<std::collections::HashMap<String, (String, String)>>,
}

#[cfg(test)]
impl FixtureStore {
    pub fn new() -> Self {
        Self {
            proxies: parking_lot::Mutex::new(std::collections::HashMap::new()),
            users: parking_lot::Mutex::new(std::collections::HashMap::new()),
        }
    }
}

#[cfg(test)]
#[async_trait]
impl StoreAdapter for FixtureStore {
    async fn load_proxies(&self) -> ProxyResult<Vec<ProxyRecord>> {
        Ok(self.proxies.lock().values().cloned().collect())
    }

    async fn save_proxy(&self, record: &ProxyRecord) -> ProxyResult<()> {
        self.proxies.lock().insert(record.url.clone(), record.clone());
        Ok(())
    }

    async fn save_all(&self, records: &[ProxyRecord]) {
        for record in records {
            let _ = self.save_proxy(record).await;
        }
    }

    async fn create_user(&self, id: &str, username: &str, password_hash: &str) -> ProxyResult<()> {
        let mut users = self.users.lock();
        if users.values().any(|(_, existing_username)| existing_username == username) {
            return Err(ProxyError::UserConflict);
        }
        users.insert(username.to_string(), (id.to_string(), password_hash.to_string()));
        Ok(())
    }

    async fn get_user_by_username(&self, username: &str) -> ProxyResult<Option<(String, String)>> {
        Ok(self.users.lock().get(username).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_store() -> Store {
        Store::connect(":memory:").await.unwrap()
    }

    #[tokio::test]
    async fn round_trips_a_proxy_record() {
        let store = memory_store().await;
        let record = ProxyRecord {
            url: "http://127.0.0.1:8080".to_string(),
            score: 6.37,
            alive: true,
            last_test: Utc::now(),
            usage_count: 3,
            fail_count: 1,
            success_count: 2,
            latency_ms: 88,
        };
        store.save_proxy(&record).await.unwrap();

        let loaded = store.load_proxies().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].url, record.url);
        assert_eq!(loaded[0].usage_count, 3);
    }

    #[tokio::test]
    async fn save_proxy_upserts_by_url() {
        let store = memory_store().await;
        let mut record = ProxyRecord {
            url: "http://127.0.0.1:8080".to_string(),
            score: 6.0,
            alive: true,
            last_test: Utc::now(),
            usage_count: 0,
            fail_count: 0,
            success_count: 0,
            latency_ms: 0,
        };
        store.save_proxy(&record).await.unwrap();
        record.usage_count = 1;
        record.score = 6.37;
        store.save_proxy(&record).await.unwrap();

        let loaded = store.load_proxies().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].usage_count, 1);
    }

    #[tokio::test]
    async fn creates_user_and_rejects_duplicate_username() {
        let store = memory_store().await;
        store.create_user("user-1", "alice", "hash").await.unwrap();

        let (_, hash) = store.get_user_by_username("alice").await.unwrap().unwrap();
        assert_eq!(hash, "hash");

        let conflict = store.create_user("user-2", "alice", "other-hash").await;
        assert!(matches!(conflict, Err(ProxyError::UserConflict)));
    }

    #[tokio::test]
    async fn unknown_username_returns_none() {
        let store = memory_store().await;
        assert!(store.get_user_by_username("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn fixture_store_round_trips_proxies_and_users() {
        let store = FixtureStore::new();
        let record = ProxyRecord {
            url: "http://127.0.0.1:9000".to_string(),
            score: 6.0,
            alive: true,
            last_test: Utc::now(),
            usage_count: 0,
            fail_count: 0,
            success_count: 0,
            latency_ms: 0,
        };
        store.save_proxy(&record).await.unwrap();
        assert_eq!(store.load_proxies().await.unwrap().len(), 1);

        store.create_user("user-1", "bob", "hash").await.unwrap();
        assert!(matches!(
            store.create_user("user-2", "bob", "hash").await,
            Err(ProxyError::UserConflict)
        ));
    }
}
