//! # Immediate Transactions
//!
//! `BEGIN IMMEDIATE` transactions for read-then-write sequences.
//!
//! ## Why Not `pool.begin()`?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  BEGIN (deferred)                 BEGIN IMMEDIATE                       │
//! │  ───────────────                  ───────────────                       │
//! │  A: read stock (shared lock)      A: take write lock, read stock        │
//! │  B: read stock (shared lock)      B: waits (busy_timeout)               │
//! │  A: upsert → needs write lock     A: upsert, COMMIT                     │
//! │  B: upsert → SQLITE_BUSY          B: takes lock, sees A's claim         │
//! │                                                                         │
//! │  Two readers both saw the old    Claims are serialised per database    │
//! │  total; one fails or both win.   file, across processes too.           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust,ignore
//! let mut tx = db.begin_immediate().await?;
//! let result = ReservationRepository::upsert_in(tx.conn(), &row).await;
//! tx.finish(result).await?;
//! ```
//!
//! Always end with [`ImmediateTx::finish`], [`ImmediateTx::commit`] or
//! [`ImmediateTx::rollback`]. A guard dropped while open closes its
//! connection instead of returning it, which discards the transaction
//! (and, for an in-memory database, the database itself).

use sqlx::pool::PoolConnection;
use sqlx::{Sqlite, SqliteConnection, SqlitePool};
use tracing::{debug, warn};

use crate::error::DbResult;

/// An open `BEGIN IMMEDIATE` transaction on a pooled connection.
#[derive(Debug)]
pub struct ImmediateTx {
    conn: PoolConnection<Sqlite>,
    open: bool,
}

impl ImmediateTx {
    /// Acquires a connection and takes the database write lock.
    pub async fn begin(pool: &SqlitePool) -> DbResult<Self> {
        let mut conn = pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;
        debug!("Immediate transaction started");
        Ok(ImmediateTx { conn, open: true })
    }

    /// The connection to run statements on.
    pub fn conn(&mut self) -> &mut SqliteConnection {
        &mut self.conn
    }

    /// Commits the transaction.
    pub async fn commit(mut self) -> DbResult<()> {
        sqlx::query("COMMIT").execute(&mut *self.conn).await?;
        self.open = false;
        debug!("Immediate transaction committed");
        Ok(())
    }

    /// Rolls the transaction back.
    pub async fn rollback(mut self) -> DbResult<()> {
        sqlx::query("ROLLBACK").execute(&mut *self.conn).await?;
        self.open = false;
        debug!("Immediate transaction rolled back");
        Ok(())
    }

    /// Commits when `result` is `Ok`, rolls back when it is `Err`.
    ///
    /// The original error is returned even if the rollback fails.
    pub async fn finish<T, E>(self, result: Result<T, E>) -> Result<T, E>
    where
        E: From<crate::error::DbError>,
    {
        match result {
            Ok(value) => {
                self.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = self.rollback().await {
                    warn!(error = %rollback_err, "Rollback failed");
                }
                Err(err)
            }
        }
    }
}

impl Drop for ImmediateTx {
    fn drop(&mut self) {
        if self.open {
            warn!("Immediate transaction dropped while open; closing connection");
            self.conn.close_on_drop();
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use crate::{Database, DbConfig, DbError};

    #[tokio::test]
    async fn test_finish_commits_on_ok() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let mut tx = db.begin_immediate().await.unwrap();
        let result: Result<(), DbError> = sqlx::query(
            "INSERT INTO price_groups (id, name, discount_bps) VALUES ('g1', 'Gold', 1000)",
        )
        .execute(tx.conn())
        .await
        .map(|_| ())
        .map_err(DbError::from);
        tx.finish(result).await.unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM price_groups")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_finish_rolls_back_on_err() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let mut tx = db.begin_immediate().await.unwrap();
        sqlx::query("INSERT INTO price_groups (id, name, discount_bps) VALUES ('g1', 'Gold', 1000)")
            .execute(tx.conn())
            .await
            .unwrap();
        let failed: Result<(), DbError> = Err(DbError::not_found("Campaign", "nope"));
        assert!(tx.finish(failed).await.is_err());

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM price_groups")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}
