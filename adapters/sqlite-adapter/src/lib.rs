//! sqlite-adapter — SQLite implementation of the UserRepository port.
//!
//! Purpose
//! - Provide a lightweight, file-based repository to run the service locally
//!   without an external database server.
//! - Implements the `UserRepository` trait from the `domain` crate.
//!
//! Notes
//! - Uses `rusqlite` with the `bundled` feature for portability.
//! - `rusqlite` is blocking, so every call runs on tokio's blocking pool.
//! - A call whose future is dropped is abandoned: skipped if it has not
//!   started, interrupted through the connection's interrupt handle if it has.

use std::path::Path;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use domain::{CoreError, User, UserRepository};
use rusqlite::{params, Connection, InterruptHandle};
use tracing::debug;

const PENDING: u8 = 0;
const RUNNING: u8 = 1;
const FINISHED: u8 = 2;
const ABANDONED: u8 = 3;

/// SQLite-backed user repository.
pub struct SqliteUserRepo {
    conn: Arc<Mutex<Connection>>,
    interrupt: Arc<InterruptHandle>,
}

impl SqliteUserRepo {
    /// Open (or create) a SQLite database at the given path and ensure schema.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, CoreError> {
        let conn = Connection::open(path).map_err(map_sqerr)?;
        Self::from_connection(conn)
    }

    /// Private in-memory database, mostly for tests.
    pub fn in_memory() -> Result<Self, CoreError> {
        let conn = Connection::open_in_memory().map_err(map_sqerr)?;
        Self::from_connection(conn)
    }

    /// Open the database file, creating missing parent directories first.
    pub fn open_creating_dirs<P: AsRef<Path>>(path: P) -> Result<Self, CoreError> {
        let path = path.as_ref();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .map_err(|e| CoreError::Storage(format!("create {}: {e}", dir.display())))?;
        }
        Self::new(path)
    }

    fn from_connection(conn: Connection) -> Result<Self, CoreError> {
        init_schema(&conn)?;
        let interrupt = Arc::new(conn.get_interrupt_handle());
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            interrupt,
        })
    }

    /// Run one statement on the blocking pool, honouring abandonment.
    async fn run<T, F>(&self, f: F) -> Result<T, CoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, CoreError> + Send + 'static,
    {
        let state = Arc::new(AtomicU8::new(PENDING));
        let _guard = AbandonGuard {
            state: state.clone(),
            interrupt: self.interrupt.clone(),
        };
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|_| CoreError::Storage("mutex poisoned".into()))?;
            if state
                .compare_exchange(PENDING, RUNNING, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
            {
                debug!("sqlite call abandoned before execution");
                return Err(CoreError::Storage("call abandoned".into()));
            }
            let out = f(&conn);
            // Still under the lock, so a late interrupt cannot hit the next caller.
            state.store(FINISHED, Ordering::SeqCst);
            out
        })
        .await
        .map_err(|e| CoreError::Storage(format!("sqlite task failed: {e}")))?
    }
}

/// Marks the call abandoned when the awaiting future goes away early.
struct AbandonGuard {
    state: Arc<AtomicU8>,
    interrupt: Arc<InterruptHandle>,
}

impl Drop for AbandonGuard {
    fn drop(&mut self) {
        if self.state.swap(ABANDONED, Ordering::SeqCst) == RUNNING {
            debug!("interrupting abandoned sqlite statement");
            self.interrupt.interrupt();
        }
    }
}

fn init_schema(conn: &Connection) -> Result<(), CoreError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT NOT NULL
        );
        "#,
    )
    .map_err(map_sqerr)
}

fn map_sqerr(e: rusqlite::Error) -> CoreError {
    match &e {
        rusqlite::Error::QueryReturnedNoRows => CoreError::NotFound,
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            CoreError::Storage(format!("sqlite constraint violation: {e}"))
        }
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::OperationInterrupted =>
        {
            CoreError::Storage("sqlite operation interrupted".into())
        }
        _ => CoreError::Storage(format!("sqlite error: {e}")),
    }
}

#[async_trait]
impl UserRepository for SqliteUserRepo {
    async fn get(&self, id: &str) -> Result<User, CoreError> {
        let id = id.to_string();
        self.run(move |conn| {
            conn.query_row(
                "SELECT id, name, email FROM users WHERE id = ?1",
                params![id],
                |row| {
                    Ok(User {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        email: row.get(2)?,
                    })
                },
            )
            .map_err(map_sqerr)
        })
        .await
    }

    async fn save(&self, user: &User) -> Result<(), CoreError> {
        let user = user.clone();
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO users(id, name, email) VALUES (?1, ?2, ?3)",
                params![user.id, user.name, user.email],
            )
            .map(|_| ())
            .map_err(map_sqerr)
        })
        .await
    }
}
