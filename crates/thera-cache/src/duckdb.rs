//! `DuckDB` connection pool management.
//!
//! All pooled connections are cloned from a single root connection so that
//! every handle shares one database instance (and one write-ahead log).

use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use ::duckdb::Connection;

struct PoolState {
    root: Connection,
    idle: Vec<Connection>,
}

struct PoolInner {
    db_path: Option<PathBuf>,
    max_pool_size: usize,
    state: Mutex<PoolState>,
}

/// A connection pool manager for `DuckDB` connections.
#[derive(Clone)]
pub struct DuckDbConnectionManager {
    inner: Arc<PoolInner>,
}

impl DuckDbConnectionManager {
    /// Open the database file and create a pool around it.
    ///
    /// # Errors
    /// Returns an error if the database file cannot be opened or configured.
    pub fn open(path: impl Into<PathBuf>, max_pool_size: usize) -> Result<Self, ::duckdb::Error> {
        let path = path.into();
        let root = Connection::open(path.as_path())?;
        configure_connection(&root)?;
        Ok(Self::from_root(root, Some(path), max_pool_size))
    }

    /// Create a pool over a private in-memory database.
    ///
    /// # Errors
    /// Returns an error if `DuckDB` fails to initialise the in-memory instance.
    pub fn open_in_memory(max_pool_size: usize) -> Result<Self, ::duckdb::Error> {
        let root = Connection::open_in_memory()?;
        configure_connection(&root)?;
        Ok(Self::from_root(root, None, max_pool_size))
    }

    fn from_root(root: Connection, db_path: Option<PathBuf>, max_pool_size: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                db_path,
                max_pool_size: max_pool_size.max(1),
                state: Mutex::new(PoolState {
                    root,
                    idle: Vec::new(),
                }),
            }),
        }
    }

    /// Acquire a connection from the pool, cloning a new one from the root
    /// connection when no idle handle is available.
    ///
    /// # Errors
    /// Returns an error if a new connection handle cannot be created.
    pub fn acquire(&self) -> Result<PooledConnection, ::duckdb::Error> {
        let mut state = self
            .inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let connection = match state.idle.pop() {
            Some(connection) => connection,
            None => state.root.try_clone()?,
        };
        drop(state);

        Ok(PooledConnection {
            pool: Arc::clone(&self.inner),
            connection: Some(connection),
        })
    }

    /// Path to the database file, `None` for in-memory pools.
    #[must_use]
    pub fn db_path(&self) -> Option<&Path> {
        self.inner.db_path.as_deref()
    }
}

/// A pooled connection that returns to the pool when dropped.
pub struct PooledConnection {
    pool: Arc<PoolInner>,
    connection: Option<Connection>,
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Self::Target {
        self.connection
            .as_ref()
            .expect("pooled connection unexpectedly missing")
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.connection
            .as_mut()
            .expect("pooled connection unexpectedly missing")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let Some(connection) = self.connection.take() else {
            return;
        };

        let mut state = self
            .pool
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if state.idle.len() < self.pool.max_pool_size {
            state.idle.push(connection);
        }
    }
}

/// Configure a database connection with appropriate settings.
///
/// # Errors
/// Returns an error if configuration SQL fails to execute.
fn configure_connection(connection: &Connection) -> Result<(), ::duckdb::Error> {
    connection.execute_batch("PRAGMA disable_progress_bar;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pooled_connections_share_one_database() {
        let manager = DuckDbConnectionManager::open_in_memory(2).expect("open");

        {
            let first = manager.acquire().expect("first");
            first
                .execute_batch("CREATE TABLE shared (id INTEGER); INSERT INTO shared VALUES (7);")
                .expect("create");
        }

        let second = manager.acquire().expect("second");
        let id: i64 = second
            .query_row("SELECT id FROM shared", [], |row| row.get(0))
            .expect("select");
        assert_eq!(id, 7);
        assert!(manager.db_path().is_none());
    }
}
