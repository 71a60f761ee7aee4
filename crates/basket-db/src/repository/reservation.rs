//! # Reservation Repository
//!
//! Stock claims held by customers while items sit in their carts.
//!
//! ## Claim Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  BEGIN IMMEDIATE  (caller)                                              │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  reserve_in(conn, customer, key, desired, now, ttl)                    │
//! │       ├── stock_records row            → StockRecord                   │
//! │       ├── reservations rows for key    → others (non-expired), own     │
//! │       ├── basket_core::assess_claim    → accept / refuse               │
//! │       └── accepted: UPSERT own row (quantity = desired, created_at=now)│
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  COMMIT / ROLLBACK  (caller)                                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Expired rows are ignored on read. [`ReservationRepository::purge_expired`]
//! deletes them physically; nothing depends on it running.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::repository::inventory::InventoryRepository;
use crate::repository::{format_decimal, parse_decimal};
use crate::tx::ImmediateTx;
use basket_core::reservation::{active_total, assess_claim, is_expired, ClaimAssessment};
use basket_core::{ProductUnitKey, Reservation, ReservationFailure, UnitType};

#[derive(Debug, sqlx::FromRow)]
struct ReservationRow {
    customer_id: String,
    product_id: String,
    unit: UnitType,
    quantity: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<ReservationRow> for Reservation {
    type Error = DbError;

    fn try_from(row: ReservationRow) -> DbResult<Self> {
        Ok(Reservation {
            customer_id: row.customer_id,
            key: ProductUnitKey::new(row.product_id, row.unit),
            quantity: parse_decimal("quantity", &row.quantity)?,
            created_at: row.created_at,
        })
    }
}

/// Outcome of a claim: accepted, or refused for a reportable reason.
///
/// Storage failures are the outer `DbResult`.
pub type ClaimResult = Result<ClaimAssessment, ReservationFailure>;

/// Repository for reservations.
#[derive(Debug, Clone)]
pub struct ReservationRepository {
    pool: SqlitePool,
}

impl ReservationRepository {
    /// Creates a new ReservationRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ReservationRepository { pool }
    }

    // -------------------------------------------------------------------------
    // Claims
    // -------------------------------------------------------------------------

    /// Claims `desired` of `key` for `customer_id` in its own IMMEDIATE
    /// transaction.
    pub async fn reserve(
        &self,
        customer_id: &str,
        key: &ProductUnitKey,
        desired: Decimal,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> DbResult<ClaimResult> {
        let mut tx = ImmediateTx::begin(&self.pool).await?;
        let result = Self::reserve_in(tx.conn(), customer_id, key, desired, now, ttl).await;
        tx.finish(result).await
    }

    /// Claims `desired` of `key` for `customer_id` on the caller's
    /// connection. The caller must hold the write lock (BEGIN IMMEDIATE).
    ///
    /// ## Returns
    /// - `Ok(Ok(assessment))` - row upserted to `desired`, `created_at = now`
    /// - `Ok(Err(failure))` - refused, nothing written
    /// - `Err(db_error)` - storage failure
    pub async fn reserve_in(
        conn: &mut SqliteConnection,
        customer_id: &str,
        key: &ProductUnitKey,
        desired: Decimal,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> DbResult<ClaimResult> {
        let stock = InventoryRepository::get_stock_in(conn, key).await?;
        let rows = Self::list_for_key_in(conn, key).await?;

        let reserved_by_others = active_total(&rows, now, ttl, Some(customer_id));
        let existing = rows
            .iter()
            .find(|r| r.customer_id == customer_id && !is_expired(r.created_at, now, ttl))
            .map(|r| r.quantity)
            .unwrap_or(Decimal::ZERO);

        let assessment =
            match assess_claim(key, stock.as_ref(), reserved_by_others, existing, desired) {
                Ok(assessment) => assessment,
                Err(failure) => {
                    debug!(
                        customer_id = %customer_id,
                        key = %key,
                        desired = %desired,
                        reserved_by_others = %reserved_by_others,
                        "Claim refused"
                    );
                    return Ok(Err(failure));
                }
            };

        Self::upsert_in(
            conn,
            &Reservation {
                customer_id: customer_id.to_string(),
                key: key.clone(),
                quantity: desired,
                created_at: now,
            },
        )
        .await?;

        debug!(
            customer_id = %customer_id,
            key = %key,
            desired = %desired,
            net_claim = %assessment.net_claim,
            available = %assessment.available,
            "Claim accepted"
        );
        Ok(Ok(assessment))
    }

    /// Writes a reservation row, replacing the customer's row for the key.
    pub async fn upsert_in(conn: &mut SqliteConnection, reservation: &Reservation) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO reservations (customer_id, product_id, unit, quantity, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT (customer_id, product_id, unit) DO UPDATE SET
                quantity = excluded.quantity,
                created_at = excluded.created_at
            "#,
        )
        .bind(&reservation.customer_id)
        .bind(&reservation.key.product_id)
        .bind(reservation.key.unit)
        .bind(format_decimal(reservation.quantity))
        .bind(reservation.created_at)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Release
    // -------------------------------------------------------------------------

    /// Deletes the customer's reservation for `key`. Idempotent.
    ///
    /// Returns whether a row was deleted.
    pub async fn release(&self, customer_id: &str, key: &ProductUnitKey) -> DbResult<bool> {
        let mut conn = self.pool.acquire().await?;
        Self::release_in(&mut conn, customer_id, key).await
    }

    /// Deletes the customer's reservation for `key` on the caller's connection.
    pub async fn release_in(
        conn: &mut SqliteConnection,
        customer_id: &str,
        key: &ProductUnitKey,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            "DELETE FROM reservations WHERE customer_id = ?1 AND product_id = ?2 AND unit = ?3",
        )
        .bind(customer_id)
        .bind(&key.product_id)
        .bind(key.unit)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Deletes every reservation the customer holds.
    pub async fn release_all(&self, customer_id: &str) -> DbResult<u64> {
        let mut conn = self.pool.acquire().await?;
        Self::release_all_in(&mut conn, customer_id).await
    }

    /// Deletes every reservation the customer holds, on the caller's connection.
    pub async fn release_all_in(conn: &mut SqliteConnection, customer_id: &str) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM reservations WHERE customer_id = ?1")
            .bind(customer_id)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected())
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    /// The customer's reservation for `key`, expired or not.
    pub async fn get(
        &self,
        customer_id: &str,
        key: &ProductUnitKey,
    ) -> DbResult<Option<Reservation>> {
        let row: Option<ReservationRow> = sqlx::query_as(
            r#"
            SELECT customer_id, product_id, unit, quantity, created_at
            FROM reservations
            WHERE customer_id = ?1 AND product_id = ?2 AND unit = ?3
            "#,
        )
        .bind(customer_id)
        .bind(&key.product_id)
        .bind(key.unit)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Reservation::try_from).transpose()
    }

    /// All rows for a key, expired or not.
    pub async fn list_for_key_in(
        conn: &mut SqliteConnection,
        key: &ProductUnitKey,
    ) -> DbResult<Vec<Reservation>> {
        let rows: Vec<ReservationRow> = sqlx::query_as(
            r#"
            SELECT customer_id, product_id, unit, quantity, created_at
            FROM reservations
            WHERE product_id = ?1 AND unit = ?2
            "#,
        )
        .bind(&key.product_id)
        .bind(key.unit)
        .fetch_all(&mut *conn)
        .await?;

        rows.into_iter().map(Reservation::try_from).collect()
    }

    /// All rows the customer holds, expired or not.
    pub async fn list_for_customer(&self, customer_id: &str) -> DbResult<Vec<Reservation>> {
        let rows: Vec<ReservationRow> = sqlx::query_as(
            r#"
            SELECT customer_id, product_id, unit, quantity, created_at
            FROM reservations
            WHERE customer_id = ?1
            ORDER BY product_id, unit
            "#,
        )
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Reservation::try_from).collect()
    }

    /// Σ quantity of non-expired reservations for `key`.
    pub async fn reserved_total(
        &self,
        key: &ProductUnitKey,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> DbResult<Decimal> {
        let mut conn = self.pool.acquire().await?;
        let rows = Self::list_for_key_in(&mut conn, key).await?;
        Ok(active_total(&rows, now, ttl, None))
    }

    // -------------------------------------------------------------------------
    // Expiry
    // -------------------------------------------------------------------------

    /// Physically deletes reservations expired at `now`.
    ///
    /// Returns the number of rows deleted.
    pub async fn purge_expired(&self, now: DateTime<Utc>, ttl: Duration) -> DbResult<u64> {
        let mut tx = ImmediateTx::begin(&self.pool).await?;
        let result = Self::purge_expired_in(tx.conn(), now, ttl).await;
        let purged = tx.finish(result).await?;

        if purged > 0 {
            info!(purged, "Expired reservations purged");
        }
        Ok(purged)
    }

    async fn purge_expired_in(
        conn: &mut SqliteConnection,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> DbResult<u64> {
        let rows: Vec<ReservationRow> = sqlx::query_as(
            "SELECT customer_id, product_id, unit, quantity, created_at FROM reservations",
        )
        .fetch_all(&mut *conn)
        .await?;

        let mut purged = 0;
        for row in rows
            .into_iter()
            .filter(|r| is_expired(r.created_at, now, ttl))
        {
            let key = ProductUnitKey::new(row.product_id, row.unit);
            if Self::release_in(conn, &row.customer_id, &key).await? {
                purged += 1;
            }
        }
        Ok(purged)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use basket_core::StockRecord;

    fn ttl() -> Duration {
        Duration::hours(24)
    }

    async fn db_with_stock(qty: i64) -> (Database, ProductUnitKey) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let key = ProductUnitKey::new("olive-oil", UnitType::Piece);
        db.inventory()
            .set_stock(&StockRecord {
                key: key.clone(),
                available_quantity: Decimal::from(qty),
                stock_unit: UnitType::Piece,
                is_active: true,
                updated_at: Utc::now(),
            })
            .await
            .unwrap();
        (db, key)
    }

    #[tokio::test]
    async fn test_second_customer_sees_remaining() {
        let (db, key) = db_with_stock(10).await;
        let repo = db.reservations();
        let now = Utc::now();

        let a = repo
            .reserve("cust-a", &key, Decimal::from(4), now, ttl())
            .await
            .unwrap();
        assert!(a.is_ok());

        let b = repo
            .reserve("cust-b", &key, Decimal::from(7), now, ttl())
            .await
            .unwrap();
        assert_eq!(b.unwrap_err().available(), Some(Decimal::from(6)));

        // Nothing written for B
        assert!(repo.get("cust-b", &key).await.unwrap().is_none());
        assert_eq!(
            repo.reserved_total(&key, now, ttl()).await.unwrap(),
            Decimal::from(4)
        );
    }

    #[tokio::test]
    async fn test_reserve_is_idempotent() {
        let (db, key) = db_with_stock(5).await;
        let repo = db.reservations();
        let now = Utc::now();

        for _ in 0..3 {
            repo.reserve("cust-a", &key, Decimal::from(5), now, ttl())
                .await
                .unwrap()
                .unwrap();
        }
        assert_eq!(
            repo.reserved_total(&key, now, ttl()).await.unwrap(),
            Decimal::from(5)
        );
        assert_eq!(repo.list_for_customer("cust-a").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_stock_is_not_available() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let key = ProductUnitKey::new("ghost", UnitType::Piece);
        let outcome = db
            .reservations()
            .reserve("cust-a", &key, Decimal::ONE, Utc::now(), ttl())
            .await
            .unwrap();
        assert!(matches!(outcome, Err(ReservationFailure::NotAvailable { .. })));
    }

    #[tokio::test]
    async fn test_expired_claims_do_not_count() {
        let (db, key) = db_with_stock(10).await;
        let repo = db.reservations();
        let now = Utc::now();
        let long_ago = now - Duration::hours(30);

        repo.reserve("cust-a", &key, Decimal::from(8), long_ago, ttl())
            .await
            .unwrap()
            .unwrap();

        // A's claim has lapsed: B may take all 10.
        repo.reserve("cust-b", &key, Decimal::from(10), now, ttl())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            repo.reserved_total(&key, now, ttl()).await.unwrap(),
            Decimal::from(10)
        );

        assert_eq!(repo.purge_expired(now, ttl()).await.unwrap(), 1);
        assert!(repo.get("cust-a", &key).await.unwrap().is_none());
        assert_eq!(repo.purge_expired(now, ttl()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_upsert_refreshes_created_at() {
        let (db, key) = db_with_stock(10).await;
        let repo = db.reservations();
        let earlier = Utc::now() - Duration::hours(23);
        let now = Utc::now();

        repo.reserve("cust-a", &key, Decimal::from(2), earlier, ttl())
            .await
            .unwrap()
            .unwrap();
        repo.reserve("cust-a", &key, Decimal::from(3), now, ttl())
            .await
            .unwrap()
            .unwrap();

        let row = repo.get("cust-a", &key).await.unwrap().unwrap();
        assert_eq!(row.quantity, Decimal::from(3));
        assert_eq!(row.created_at, now);
    }

    #[tokio::test]
    async fn test_release_and_release_all() {
        let (db, key) = db_with_stock(10).await;
        let repo = db.reservations();
        let now = Utc::now();

        repo.reserve("cust-a", &key, Decimal::from(2), now, ttl())
            .await
            .unwrap()
            .unwrap();

        assert!(repo.release("cust-a", &key).await.unwrap());
        assert!(!repo.release("cust-a", &key).await.unwrap());

        repo.reserve("cust-a", &key, Decimal::from(2), now, ttl())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(repo.release_all("cust-a").await.unwrap(), 1);
        assert_eq!(
            repo.reserved_total(&key, now, ttl()).await.unwrap(),
            Decimal::ZERO
        );
    }
}
