//! # Inventory Repository
//!
//! Stock records per product unit key.
//!
//! ## Key Operations
//! - `get_stock` - read a record (the reservation check reads it in-tx)
//! - `set_stock` - write a record, gated on unit compatibility
//! - `decrement_stock` - take sold quantity off, converted into stock units
//!
//! ## Units
//! ```text
//! key: coffee/gram   stock_unit: kilogram   available_quantity: 2.5
//!
//!   reads  → 2500 (gram)
//!   sell 750 gram → stock 2.5 - 0.75 = 1.75 kilogram
//! ```

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};

use crate::error::{DbError, DbResult};
use crate::repository::{format_decimal, parse_decimal};
use basket_core::units::stock_after_sale;
use basket_core::{ProductUnitKey, StockRecord, UnitType, ValidationError};

#[derive(Debug, sqlx::FromRow)]
struct StockRow {
    product_id: String,
    unit: UnitType,
    available_quantity: String,
    stock_unit: UnitType,
    is_active: bool,
    updated_at: DateTime<Utc>,
}

impl TryFrom<StockRow> for StockRecord {
    type Error = DbError;

    fn try_from(row: StockRow) -> DbResult<Self> {
        Ok(StockRecord {
            key: ProductUnitKey::new(row.product_id, row.unit),
            available_quantity: parse_decimal("available_quantity", &row.available_quantity)?,
            stock_unit: row.stock_unit,
            is_active: row.is_active,
            updated_at: row.updated_at,
        })
    }
}

/// Repository for stock records.
#[derive(Debug, Clone)]
pub struct InventoryRepository {
    pool: SqlitePool,
}

impl InventoryRepository {
    /// Creates a new InventoryRepository.
    pub fn new(pool: SqlitePool) -> Self {
        InventoryRepository { pool }
    }

    /// Reads the stock record for a key.
    pub async fn get_stock(&self, key: &ProductUnitKey) -> DbResult<Option<StockRecord>> {
        let mut conn = self.pool.acquire().await?;
        Self::get_stock_in(&mut conn, key).await
    }

    /// Reads the stock record for a key on the caller's connection.
    pub async fn get_stock_in(
        conn: &mut SqliteConnection,
        key: &ProductUnitKey,
    ) -> DbResult<Option<StockRecord>> {
        let row: Option<StockRow> = sqlx::query_as(
            r#"
            SELECT product_id, unit, available_quantity, stock_unit, is_active, updated_at
            FROM stock_records
            WHERE product_id = ?1 AND unit = ?2
            "#,
        )
        .bind(&key.product_id)
        .bind(key.unit)
        .fetch_optional(&mut *conn)
        .await?;

        row.map(StockRecord::try_from).transpose()
    }

    /// Lists all stock records, ordered by key.
    pub async fn list(&self) -> DbResult<Vec<StockRecord>> {
        let rows: Vec<StockRow> = sqlx::query_as(
            r#"
            SELECT product_id, unit, available_quantity, stock_unit, is_active, updated_at
            FROM stock_records
            ORDER BY product_id, unit
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(StockRecord::try_from).collect()
    }

    /// Creates or replaces the stock record for `record.key`.
    ///
    /// ## Errors
    /// `DbError::Invalid` when `stock_unit` cannot be converted to the
    /// key's unit (piece stock behind a gram listing, for instance).
    pub async fn set_stock(&self, record: &StockRecord) -> DbResult<()> {
        if !record.stock_unit.is_compatible_with(record.key.unit) {
            warn!(
                key = %record.key,
                stock_unit = %record.stock_unit,
                "Refusing incompatible stock unit"
            );
            return Err(ValidationError::IncompatibleUnits {
                left: record.key.unit,
                right: record.stock_unit,
            }
            .into());
        }
        if record.available_quantity.is_sign_negative() {
            return Err(ValidationError::MustBePositive {
                field: "available_quantity".to_string(),
            }
            .into());
        }

        sqlx::query(
            r#"
            INSERT INTO stock_records (
                product_id, unit, available_quantity, stock_unit, is_active, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT (product_id, unit) DO UPDATE SET
                available_quantity = excluded.available_quantity,
                stock_unit = excluded.stock_unit,
                is_active = excluded.is_active,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&record.key.product_id)
        .bind(record.key.unit)
        .bind(format_decimal(record.available_quantity))
        .bind(record.stock_unit)
        .bind(record.is_active)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;

        info!(
            key = %record.key,
            available = %record.available_quantity,
            stock_unit = %record.stock_unit,
            "Stock record saved"
        );
        Ok(())
    }

    /// Takes `sold` (in the key's unit) off the stock of `key`.
    ///
    /// Returns the remaining stock in the stock unit.
    pub async fn decrement_stock(&self, key: &ProductUnitKey, sold: Decimal) -> DbResult<Decimal> {
        let mut tx = crate::tx::ImmediateTx::begin(&self.pool).await?;
        let result = Self::decrement_stock_in(tx.conn(), key, sold).await;
        tx.finish(result).await
    }

    /// Takes `sold` (in the key's unit) off the stock of `key`, floored at
    /// zero, on the caller's connection.
    pub async fn decrement_stock_in(
        conn: &mut SqliteConnection,
        key: &ProductUnitKey,
        sold: Decimal,
    ) -> DbResult<Decimal> {
        let record = Self::get_stock_in(conn, key)
            .await?
            .ok_or_else(|| DbError::not_found("Stock record", key.to_string()))?;

        let remaining =
            stock_after_sale(record.available_quantity, record.stock_unit, sold, key.unit);

        sqlx::query(
            r#"
            UPDATE stock_records
            SET available_quantity = ?3, updated_at = ?4
            WHERE product_id = ?1 AND unit = ?2
            "#,
        )
        .bind(&key.product_id)
        .bind(key.unit)
        .bind(format_decimal(remaining))
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;

        debug!(
            key = %key,
            sold = %sold,
            remaining = %remaining,
            stock_unit = %record.stock_unit,
            "Stock decremented"
        );
        Ok(remaining)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};

    fn record(product: &str, unit: UnitType, qty: Decimal, stock_unit: UnitType) -> StockRecord {
        StockRecord {
            key: ProductUnitKey::new(product, unit),
            available_quantity: qty,
            stock_unit,
            is_active: true,
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_set_and_get_stock() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.inventory();

        let coffee = record("coffee", UnitType::Gram, Decimal::new(25, 1), UnitType::Kilogram);
        repo.set_stock(&coffee).await.unwrap();

        let loaded = repo.get_stock(&coffee.key).await.unwrap().unwrap();
        assert_eq!(loaded.available_quantity, Decimal::new(25, 1));
        assert_eq!(loaded.stock_unit, UnitType::Kilogram);
        assert_eq!(loaded.available_in_key_unit(), Decimal::from(2500));

        let missing = ProductUnitKey::new("tea", UnitType::Piece);
        assert!(repo.get_stock(&missing).await.unwrap().is_none());
        assert_eq!(repo.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_set_stock_rejects_incompatible_unit() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let bad = record("oil", UnitType::Piece, Decimal::from(10), UnitType::Kilogram);

        let err = db.inventory().set_stock(&bad).await.unwrap_err();
        assert!(matches!(
            err,
            DbError::Invalid(ValidationError::IncompatibleUnits { .. })
        ));
        assert!(db.inventory().get_stock(&bad.key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_decrement_converts_and_floors() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.inventory();

        let coffee = record("coffee", UnitType::Gram, Decimal::new(25, 1), UnitType::Kilogram);
        repo.set_stock(&coffee).await.unwrap();

        let remaining = repo
            .decrement_stock(&coffee.key, Decimal::from(750))
            .await
            .unwrap();
        assert_eq!(remaining, Decimal::new(175, 2));

        let remaining = repo
            .decrement_stock(&coffee.key, Decimal::from(5000))
            .await
            .unwrap();
        assert_eq!(remaining, Decimal::ZERO);

        let missing = ProductUnitKey::new("tea", UnitType::Piece);
        assert!(matches!(
            repo.decrement_stock(&missing, Decimal::ONE).await,
            Err(DbError::NotFound { .. })
        ));
    }
}
