//! postgres-adapter — PostgreSQL implementation of the UserRepository port.
//!
//! Every call checks a connection out of a `sqlx::PgPool` and runs exactly
//! one statement. No transaction spans calls. Dropping the returned future
//! cancels the query in flight.

use async_trait::async_trait;
use domain::{CoreError, User, UserRepository};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool};
use tracing::info;

/// Row shape of the `users` table.
#[derive(Debug, FromRow)]
struct UserRow {
    id: String,
    name: String,
    email: String,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            name: row.name,
            email: row.email,
        }
    }
}

/// Postgres-backed user repository.
#[derive(Clone)]
pub struct PostgresUserRepo {
    pool: PgPool,
}

impl PostgresUserRepo {
    /// Connect a pool to `url` and ensure the schema exists.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, CoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(map_pgerr)?;
        let repo = Self::from_pool(pool);
        repo.ensure_schema().await?;
        info!(max_connections, "postgres pool ready");
        Ok(repo)
    }

    /// Wrap an existing pool. The caller is responsible for the schema.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn ensure_schema(&self) -> Result<(), CoreError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                email TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map(|_| ())
        .map_err(map_pgerr)
    }
}

fn map_pgerr(e: sqlx::Error) -> CoreError {
    match e {
        sqlx::Error::RowNotFound => CoreError::NotFound,
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            CoreError::Storage(format!("duplicate user id: {}", db.message()))
        }
        other => CoreError::Storage(format!("postgres error: {other}")),
    }
}

#[async_trait]
impl UserRepository for PostgresUserRepo {
    async fn get(&self, id: &str) -> Result<User, CoreError> {
        sqlx::query_as::<_, UserRow>("SELECT id, name, email FROM users WHERE id = $1")
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map(User::from)
            .map_err(map_pgerr)
    }

    async fn save(&self, user: &User) -> Result<(), CoreError> {
        sqlx::query("INSERT INTO users (id, name, email) VALUES ($1, $2, $3)")
            .bind(&user.id)
            .bind(&user.name)
            .bind(&user.email)
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(map_pgerr)
    }
}
