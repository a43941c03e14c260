//! Connection provider for the master registry and tenant databases.
//!
//! A [`ConnectionProvider`] owns one sqlx `AnyPool` per database name and hands
//! out scoped [`ConnectionHandle`]s. Pools are created on first use and cached
//! for the provider's lifetime. Only *admitted* database names can be opened;
//! the master database is admitted at construction and tenant names are
//! admitted from the master registry.
//!
//! ## Transactions
//!
//! [`ConnectionProvider::with_transaction`] runs a closure inside a
//! transaction. The closure receives a plain `&mut AnyConnection` and returns
//! a boxed future:
//!
//! ```ignore
//! provider
//!     .with_transaction(&db, |conn| {
//!         Box::pin(async move {
//!             sqlx::query("DELETE FROM tickets WHERE status = $1")
//!                 .bind(3_i64)
//!                 .execute(&mut *conn)
//!                 .await
//!                 .sql_context("Failed to purge tickets")?;
//!             Ok(())
//!         })
//!     })
//!     .await?;
//! ```
//!
//! Values captured by the closure must be owned, since the future may not
//! borrow from the caller's stack beyond the connection it is given.

mod errors;

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::ops::{Deref, DerefMut};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use sqlx::AnyConnection;
use sqlx::any::AnyPoolOptions;
use sqlx::pool::PoolConnection;
use sqlx::{Any, AnyPool, Connection, Executor};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

pub use errors::ConnectionError;

use crate::Result;
use crate::config::{ConnectionSettings, ConnectionTarget};
use crate::validation::DatabaseName;

/// Boxed future returned by transaction closures.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Extension trait for sqlx Result types to simplify error handling.
///
/// Similar to `anyhow::Context`, this converts sqlx errors into
/// [`ConnectionError::Sql`] with a context message.
pub trait SqlxResultExt<T> {
    /// Convert a sqlx error to a crate error with a context message.
    fn sql_context(self, context: &str) -> Result<T>;
}

impl<T> SqlxResultExt<T> for std::result::Result<T, sqlx::Error> {
    fn sql_context(self, context: &str) -> Result<T> {
        self.map_err(|e| {
            ConnectionError::Sql {
                reason: format!("{context}: {e}"),
                source: Some(e),
            }
            .into()
        })
    }
}

/// An exclusively owned connection to one named database.
///
/// The connection goes back to its pool when the handle is dropped, whether
/// the surrounding operation succeeded, failed or was cancelled.
pub struct ConnectionHandle {
    database: DatabaseName,
    conn: PoolConnection<Any>,
}

impl ConnectionHandle {
    /// The database this handle is connected to.
    pub fn database(&self) -> &DatabaseName {
        &self.database
    }
}

impl Deref for ConnectionHandle {
    type Target = AnyConnection;

    fn deref(&self) -> &Self::Target {
        &self.conn
    }
}

impl DerefMut for ConnectionHandle {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.conn
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        tracing::trace!(database = %self.database, "Releasing connection");
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("database", &self.database)
            .finish_non_exhaustive()
    }
}

/// Point-in-time occupancy of one cached pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolStatus {
    /// The database the pool connects to
    pub database: DatabaseName,
    /// Open connections, idle or checked out
    pub size: u32,
    /// Open connections currently idle in the pool
    pub idle: usize,
}

impl PoolStatus {
    /// Connections currently checked out.
    pub fn in_use(&self) -> usize {
        (self.size as usize).saturating_sub(self.idle)
    }
}

/// Supplies scoped connections to admitted databases.
///
/// `ConnectionProvider` is `Send + Sync` and is meant to be shared through an
/// `Arc`. The pool map is guarded by an async `RwLock` that is never held
/// while a connection is being opened.
///
/// SQLite allows a single writer per database, and two transactions that both
/// read before writing can deadlock on a shared-cache database. Transactions
/// on SQLite targets therefore queue on a per-database lock; plain
/// [`acquire`](Self::acquire) calls never wait on it.
pub struct ConnectionProvider {
    settings: ConnectionSettings,
    master: DatabaseName,
    admitted: std::sync::RwLock<HashSet<DatabaseName>>,
    pools: RwLock<HashMap<DatabaseName, AnyPool>>,
    write_locks: std::sync::Mutex<HashMap<DatabaseName, Arc<Mutex<()>>>>,
    closed: AtomicBool,
}

impl ConnectionProvider {
    /// Create a provider with `master` admitted.
    ///
    /// No connection is opened until the first [`acquire`](Self::acquire).
    pub fn new(settings: ConnectionSettings, master: DatabaseName) -> Result<Self> {
        settings.validate()?;

        // Install any driver support
        sqlx::any::install_default_drivers();

        tracing::info!(
            connection_target = %settings.target.redacted(),
            master = %master,
            max_connections = settings.max_connections,
            "Connection provider configured"
        );

        let mut admitted = HashSet::new();
        admitted.insert(master.clone());

        Ok(Self {
            settings,
            master,
            admitted: std::sync::RwLock::new(admitted),
            pools: RwLock::new(HashMap::new()),
            write_locks: std::sync::Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        })
    }

    /// The master registry database name.
    pub fn master(&self) -> &DatabaseName {
        &self.master
    }

    /// The connection target.
    pub fn target(&self) -> &ConnectionTarget {
        &self.settings.target
    }

    /// Add a database name to the allow-list.
    pub fn admit(&self, database: &DatabaseName) {
        let mut admitted = self
            .admitted
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if admitted.insert(database.clone()) {
            tracing::debug!(database = %database, "Admitted database");
        }
    }

    /// Check whether a database name is on the allow-list.
    pub fn is_admitted(&self, database: &DatabaseName) -> bool {
        self.admitted
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains(database)
    }

    /// All admitted database names, sorted.
    pub fn admitted(&self) -> Vec<DatabaseName> {
        let mut names: Vec<_> = self
            .admitted
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Check out a connection to `database`.
    ///
    /// Waits up to the configured acquire timeout for a free connection.
    /// Dropping the returned future before it resolves leaks nothing: sqlx
    /// returns a connection that finishes opening late to the pool.
    pub async fn acquire(&self, database: &DatabaseName) -> Result<ConnectionHandle> {
        let pool = self.pool_for(database).await?;
        let conn = pool
            .acquire()
            .await
            .map_err(|e| classify(database, e))?;
        tracing::trace!(database = %database, "Acquired connection");
        Ok(ConnectionHandle {
            database: database.clone(),
            conn,
        })
    }

    /// Run `work` inside a transaction on `database`.
    ///
    /// Commits when `work` returns `Ok`. When it returns `Err`, every effect
    /// is rolled back before the error is handed back to the caller. A panic
    /// inside `work` drops the transaction, which also rolls it back.
    ///
    /// On SQLite targets transactions on the same database run one at a time.
    /// Waiting for that turn counts against the acquire timeout.
    pub async fn with_transaction<T, F>(&self, database: &DatabaseName, work: F) -> Result<T>
    where
        T: Send,
        F: for<'c> FnOnce(&'c mut AnyConnection) -> BoxFuture<'c, Result<T>> + Send,
    {
        let _writer = self.writer_turn(database).await?;
        let mut handle = self.acquire(database).await?;
        let mut tx = Connection::begin(&mut *handle)
            .await
            .sql_context("Failed to begin transaction")?;

        match work(&mut *tx).await {
            Ok(value) => {
                tx.commit()
                    .await
                    .sql_context("Failed to commit transaction")?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(
                        database = %database,
                        "Rollback failed after error ({err}): {rollback_err}"
                    );
                } else {
                    tracing::debug!(database = %database, "Rolled back transaction: {err}");
                }
                Err(err)
            }
        }
    }

    /// Occupancy of every pool opened so far, sorted by database name.
    pub async fn status(&self) -> Vec<PoolStatus> {
        let pools = self.pools.read().await;
        let mut status: Vec<_> = pools
            .iter()
            .map(|(database, pool)| PoolStatus {
                database: database.clone(),
                size: pool.size(),
                idle: pool.num_idle(),
            })
            .collect();
        status.sort_by(|a, b| a.database.cmp(&b.database));
        status
    }

    /// Close every pool. Later acquisitions fail with [`ConnectionError::Closed`].
    pub async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let pools: Vec<_> = self.pools.write().await.drain().collect();
        for (database, pool) in pools {
            pool.close().await;
            tracing::debug!(database = %database, "Closed pool");
        }
    }

    /// Get the cached pool for `database`, opening it on first use.
    async fn pool_for(&self, database: &DatabaseName) -> Result<AnyPool> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ConnectionError::Closed.into());
        }
        if !self.is_admitted(database) {
            return Err(ConnectionError::UnknownDatabase {
                name: database.to_string(),
            }
            .into());
        }

        if let Some(pool) = self.pools.read().await.get(database) {
            return Ok(pool.clone());
        }

        let pool = self.open_pool(database).await?;

        let mut pools = self.pools.write().await;
        if self.closed.load(Ordering::SeqCst) {
            // close() drained the map while this pool was opening
            drop(pools);
            pool.close().await;
            return Err(ConnectionError::Closed.into());
        }
        if let Some(existing) = pools.get(database) {
            // Another caller opened the same database first; keep theirs.
            let existing = existing.clone();
            drop(pools);
            pool.close().await;
            return Ok(existing);
        }
        pools.insert(database.clone(), pool.clone());
        Ok(pool)
    }

    /// Wait for the exclusive transaction slot of a SQLite database.
    ///
    /// Returns `None` for servers that handle concurrent writers themselves.
    async fn writer_turn(&self, database: &DatabaseName) -> Result<Option<OwnedMutexGuard<()>>> {
        if !self.settings.target.is_sqlite() || !self.is_admitted(database) {
            return Ok(None);
        }
        let lock = {
            let mut locks = self
                .write_locks
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            Arc::clone(locks.entry(database.clone()).or_default())
        };
        match tokio::time::timeout(self.settings.acquire_timeout(), lock.lock_owned()).await {
            Ok(guard) => Ok(Some(guard)),
            Err(_) => {
                tracing::warn!(database = %database, "Timed out waiting for the writer slot");
                Err(ConnectionError::AcquireTimeout {
                    database: database.to_string(),
                }
                .into())
            }
        }
    }

    async fn open_pool(&self, database: &DatabaseName) -> Result<AnyPool> {
        let url = self.settings.target.url_for(database)?;
        let mut options = AnyPoolOptions::new()
            .max_connections(self.settings.max_connections)
            .acquire_timeout(self.settings.acquire_timeout());

        if self.settings.target.is_in_memory() {
            // A shared-cache in-memory database is destroyed when its last
            // connection closes, so one connection must always stay open.
            options = options
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }

        if self.settings.target.is_sqlite() {
            let pragmas = if self.settings.target.is_in_memory() {
                "PRAGMA busy_timeout = 5000;"
            } else {
                "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA busy_timeout = 5000;"
            };
            options = options.after_connect(move |conn, _meta| {
                Box::pin(async move {
                    conn.execute(pragmas).await?;
                    Ok(())
                })
            });
        }

        let pool = options
            .connect(&url)
            .await
            .map_err(|e| classify(database, e))?;

        tracing::info!(database = %database, "Opened connection pool");
        Ok(pool)
    }
}

impl std::fmt::Debug for ConnectionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionProvider")
            .field("target", &self.settings.target.redacted())
            .field("master", &self.master)
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

/// Map a pool-level sqlx error onto the connection taxonomy.
fn classify(database: &DatabaseName, err: sqlx::Error) -> crate::Error {
    match err {
        sqlx::Error::PoolTimedOut => ConnectionError::AcquireTimeout {
            database: database.to_string(),
        },
        sqlx::Error::PoolClosed => ConnectionError::Closed,
        source => ConnectionError::ConnectFailed {
            database: database.to_string(),
            source,
        },
    }
    .into()
}
