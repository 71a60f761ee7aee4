//! # Cart Repository
//!
//! Persisted cart lines of signed-in customers. Guest carts never reach
//! the database.
//!
//! Every write takes the caller's connection: the engine pairs each line
//! write with a reservation write in one transaction.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::repository::{format_decimal, parse_decimal, parse_optional_decimal};
use basket_core::{CartLine, Money, UnitType};

const LINE_COLUMNS: &str = r#"
    product_id, unit, name, unit_count, unit_price_cents, quantity, min_order_quantity
"#;

#[derive(Debug, sqlx::FromRow)]
struct CartLineRow {
    product_id: String,
    unit: UnitType,
    name: String,
    unit_count: Option<String>,
    unit_price_cents: i64,
    quantity: String,
    min_order_quantity: Option<String>,
}

impl TryFrom<CartLineRow> for CartLine {
    type Error = DbError;

    fn try_from(row: CartLineRow) -> DbResult<Self> {
        Ok(CartLine {
            product_id: row.product_id,
            name: row.name,
            unit: row.unit,
            unit_count: parse_optional_decimal("unit_count", row.unit_count.as_deref())?,
            unit_price: Money::from_cents(row.unit_price_cents),
            quantity: parse_decimal("quantity", &row.quantity)?,
            min_order_quantity: parse_optional_decimal(
                "min_order_quantity",
                row.min_order_quantity.as_deref(),
            )?,
        })
    }
}

/// Repository for persisted cart lines.
#[derive(Debug, Clone)]
pub struct CartRepository {
    pool: SqlitePool,
}

impl CartRepository {
    /// Creates a new CartRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CartRepository { pool }
    }

    /// Lines of a customer's cart, in the order they were added.
    pub async fn list_lines(&self, customer_id: &str) -> DbResult<Vec<CartLine>> {
        let mut conn = self.pool.acquire().await?;
        Self::list_lines_in(&mut conn, customer_id).await
    }

    /// Lines of a customer's cart on the caller's connection.
    pub async fn list_lines_in(
        conn: &mut SqliteConnection,
        customer_id: &str,
    ) -> DbResult<Vec<CartLine>> {
        let sql = format!(
            "SELECT {LINE_COLUMNS} FROM cart_lines WHERE customer_id = ?1 \
             ORDER BY added_at, product_id, unit"
        );
        let rows: Vec<CartLineRow> = sqlx::query_as(&sql)
            .bind(customer_id)
            .fetch_all(&mut *conn)
            .await?;

        rows.into_iter().map(CartLine::try_from).collect()
    }

    /// One line of a customer's cart.
    pub async fn get_line_in(
        conn: &mut SqliteConnection,
        customer_id: &str,
        product_id: &str,
        unit: UnitType,
    ) -> DbResult<Option<CartLine>> {
        let sql = format!(
            "SELECT {LINE_COLUMNS} FROM cart_lines \
             WHERE customer_id = ?1 AND product_id = ?2 AND unit = ?3"
        );
        let row: Option<CartLineRow> = sqlx::query_as(&sql)
            .bind(customer_id)
            .bind(product_id)
            .bind(unit)
            .fetch_optional(&mut *conn)
            .await?;

        row.map(CartLine::try_from).transpose()
    }

    /// Number of distinct lines in a customer's cart.
    pub async fn count_lines_in(conn: &mut SqliteConnection, customer_id: &str) -> DbResult<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM cart_lines WHERE customer_id = ?1")
            .bind(customer_id)
            .fetch_one(&mut *conn)
            .await?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// Writes a line with its absolute quantity. `added_at` survives
    /// updates of an existing line.
    pub async fn upsert_line_in(
        conn: &mut SqliteConnection,
        customer_id: &str,
        line: &CartLine,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO cart_lines (
                customer_id, product_id, unit, name, unit_count, unit_price_cents,
                quantity, min_order_quantity, added_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
            ON CONFLICT (customer_id, product_id, unit) DO UPDATE SET
                name = excluded.name,
                unit_count = excluded.unit_count,
                unit_price_cents = excluded.unit_price_cents,
                quantity = excluded.quantity,
                min_order_quantity = excluded.min_order_quantity,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(customer_id)
        .bind(&line.product_id)
        .bind(line.unit)
        .bind(&line.name)
        .bind(line.unit_count.map(format_decimal))
        .bind(line.unit_price.cents())
        .bind(format_decimal(line.quantity))
        .bind(line.min_order_quantity.map(format_decimal))
        .bind(now)
        .execute(&mut *conn)
        .await?;

        debug!(
            customer_id = %customer_id,
            key = %line.key(),
            quantity = %line.quantity,
            "Cart line saved"
        );
        Ok(())
    }

    /// Deletes one line. Returns whether it existed.
    pub async fn delete_line_in(
        conn: &mut SqliteConnection,
        customer_id: &str,
        product_id: &str,
        unit: UnitType,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            "DELETE FROM cart_lines WHERE customer_id = ?1 AND product_id = ?2 AND unit = ?3",
        )
        .bind(customer_id)
        .bind(product_id)
        .bind(unit)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Deletes every line of a customer's cart.
    pub async fn clear_in(conn: &mut SqliteConnection, customer_id: &str) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM cart_lines WHERE customer_id = ?1")
            .bind(customer_id)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
