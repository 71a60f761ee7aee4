//! # Customer Repository
//!
//! Customers, price groups and dated individual discounts, resolved into a
//! [`CustomerTier`] for pricing.
//!
//! ## Tier Resolution
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  individual_discounts (active, starts_on ≤ today ≤ ends_on)             │
//! │       │                                                                 │
//! │       ├── any? ──► individual_rate = highest,  group_rate = 0           │
//! │       │                                                                 │
//! │       └── none ──► group_rate      = price_groups.discount_bps          │
//! │                    individual_rate = customers.special_discount_bps     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use basket_core::validation::validate_rate;
use basket_core::{CustomerClass, CustomerTier, DiscountRate};

/// A named group of customers sharing a discount rate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceGroup {
    pub id: String,
    pub name: String,
    pub rate: DiscountRate,
}

/// A registered customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,
    pub name: String,
    pub class: CustomerClass,
    pub price_group_id: Option<String>,
    pub special_rate: DiscountRate,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct CustomerRow {
    id: String,
    name: String,
    class: CustomerClass,
    price_group_id: Option<String>,
    special_discount_bps: i64,
    created_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct TierRow {
    id: String,
    class: CustomerClass,
    special_discount_bps: i64,
    group_discount_bps: Option<i64>,
}

/// Negative stored rates read as zero.
fn rate_column(field: &str, bps: i64) -> DbResult<DiscountRate> {
    if bps <= 0 {
        return Ok(DiscountRate::zero());
    }
    u32::try_from(bps)
        .map(DiscountRate::from_bps)
        .map_err(|_| DbError::corrupt(field, bps.to_string()))
}

impl TryFrom<CustomerRow> for Customer {
    type Error = DbError;

    fn try_from(row: CustomerRow) -> DbResult<Self> {
        Ok(Customer {
            special_rate: rate_column("special_discount_bps", row.special_discount_bps)?,
            id: row.id,
            name: row.name,
            class: row.class,
            price_group_id: row.price_group_id,
            created_at: row.created_at,
        })
    }
}

/// Repository for customers and their pricing tiers.
#[derive(Debug, Clone)]
pub struct CustomerRepository {
    pool: SqlitePool,
}

impl CustomerRepository {
    /// Creates a new CustomerRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CustomerRepository { pool }
    }

    /// Creates a price group with a generated ID.
    pub async fn insert_price_group(&self, name: &str, rate: DiscountRate) -> DbResult<PriceGroup> {
        validate_rate("price_group.rate", rate)?;
        let group = PriceGroup {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            rate,
        };

        sqlx::query("INSERT INTO price_groups (id, name, discount_bps) VALUES (?1, ?2, ?3)")
            .bind(&group.id)
            .bind(&group.name)
            .bind(i64::from(group.rate.bps()))
            .execute(&self.pool)
            .await?;

        info!(group_id = %group.id, name = %group.name, rate = %group.rate, "Price group created");
        Ok(group)
    }

    /// Inserts a customer.
    pub async fn insert_customer(&self, customer: &Customer) -> DbResult<()> {
        validate_rate("customer.special_rate", customer.special_rate)?;

        sqlx::query(
            r#"
            INSERT INTO customers (
                id, name, class, price_group_id, special_discount_bps, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&customer.id)
        .bind(&customer.name)
        .bind(customer.class)
        .bind(&customer.price_group_id)
        .bind(i64::from(customer.special_rate.bps()))
        .bind(customer.created_at)
        .execute(&self.pool)
        .await?;

        info!(customer_id = %customer.id, class = %customer.class, "Customer created");
        Ok(())
    }

    /// Gets a customer by ID.
    pub async fn get_customer(&self, id: &str) -> DbResult<Option<Customer>> {
        let row: Option<CustomerRow> = sqlx::query_as(
            r#"
            SELECT id, name, class, price_group_id, special_discount_bps, created_at
            FROM customers
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Customer::try_from).transpose()
    }

    /// Grants a dated discount to a customer. Both dates are inclusive.
    ///
    /// Returns the new discount's ID.
    pub async fn insert_individual_discount(
        &self,
        customer_id: &str,
        rate: DiscountRate,
        starts_on: NaiveDate,
        ends_on: NaiveDate,
    ) -> DbResult<String> {
        validate_rate("individual_discount.rate", rate)?;
        let id = Uuid::new_v4().to_string();

        sqlx::query(
            r#"
            INSERT INTO individual_discounts (
                id, customer_id, discount_bps, starts_on, ends_on, active
            ) VALUES (?1, ?2, ?3, ?4, ?5, 1)
            "#,
        )
        .bind(&id)
        .bind(customer_id)
        .bind(i64::from(rate.bps()))
        .bind(starts_on)
        .bind(ends_on)
        .execute(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::ForeignKeyViolation { .. } => DbError::not_found("Customer", customer_id),
            other => other,
        })?;

        debug!(customer_id = %customer_id, rate = %rate, %starts_on, %ends_on, "Individual discount granted");
        Ok(id)
    }

    /// Resolves the pricing tier of a customer on `today`.
    ///
    /// Returns `None` for an unknown customer.
    pub async fn get_customer_tier(
        &self,
        customer_id: &str,
        today: NaiveDate,
    ) -> DbResult<Option<CustomerTier>> {
        let row: Option<TierRow> = sqlx::query_as(
            r#"
            SELECT c.id, c.class, c.special_discount_bps,
                   g.discount_bps AS group_discount_bps
            FROM customers c
            LEFT JOIN price_groups g ON g.id = c.price_group_id
            WHERE c.id = ?1
            "#,
        )
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let dated: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT MAX(discount_bps)
            FROM individual_discounts
            WHERE customer_id = ?1
              AND active = 1
              AND discount_bps > 0
              AND starts_on <= ?2
              AND ends_on >= ?2
            "#,
        )
        .bind(customer_id)
        .bind(today)
        .fetch_one(&self.pool)
        .await?;

        let tier = match dated {
            Some(bps) => CustomerTier {
                customer_id: row.id,
                class: row.class,
                group_rate: DiscountRate::zero(),
                individual_rate: rate_column("individual_discounts.discount_bps", bps)?,
            },
            None => CustomerTier {
                customer_id: row.id,
                class: row.class,
                group_rate: rate_column(
                    "price_groups.discount_bps",
                    row.group_discount_bps.unwrap_or(0),
                )?,
                individual_rate: rate_column("special_discount_bps", row.special_discount_bps)?,
            },
        };

        debug!(
            customer_id = %customer_id,
            group_rate = %tier.group_rate,
            individual_rate = %tier.individual_rate,
            dated = dated.is_some(),
            "Customer tier resolved"
        );
        Ok(Some(tier))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};

    fn customer(id: &str, class: CustomerClass, group: Option<String>, special: u32) -> Customer {
        Customer {
            id: id.to_string(),
            name: format!("Customer {id}"),
            class,
            price_group_id: group,
            special_rate: DiscountRate::from_bps(special),
            created_at: Utc::now(),
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn test_tier_from_group_and_special_rate() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.customers();

        let gold = repo
            .insert_price_group("Gold", DiscountRate::from_bps(1000))
            .await
            .unwrap();
        repo.insert_customer(&customer("c1", CustomerClass::Dealer, Some(gold.id), 500))
            .await
            .unwrap();

        let tier = repo
            .get_customer_tier("c1", date(2026, 6, 1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tier.class, CustomerClass::Dealer);
        assert_eq!(tier.group_rate.bps(), 1000);
        assert_eq!(tier.individual_rate.bps(), 500);
    }

    #[tokio::test]
    async fn test_dated_discount_overrides_and_highest_wins() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.customers();

        let gold = repo
            .insert_price_group("Gold", DiscountRate::from_bps(1000))
            .await
            .unwrap();
        repo.insert_customer(&customer("c1", CustomerClass::Retail, Some(gold.id), 500))
            .await
            .unwrap();
        repo.insert_individual_discount("c1", DiscountRate::from_bps(700), date(2026, 6, 1), date(2026, 6, 30))
            .await
            .unwrap();
        repo.insert_individual_discount("c1", DiscountRate::from_bps(1200), date(2026, 6, 10), date(2026, 6, 10))
            .await
            .unwrap();

        // Inclusive single-day window
        let tier = repo.get_customer_tier("c1", date(2026, 6, 10)).await.unwrap().unwrap();
        assert!(tier.group_rate.is_zero());
        assert_eq!(tier.individual_rate.bps(), 1200);

        let tier = repo.get_customer_tier("c1", date(2026, 6, 30)).await.unwrap().unwrap();
        assert_eq!(tier.individual_rate.bps(), 700);

        // Outside every window: back to group + special
        let tier = repo.get_customer_tier("c1", date(2026, 7, 1)).await.unwrap().unwrap();
        assert_eq!(tier.group_rate.bps(), 1000);
        assert_eq!(tier.individual_rate.bps(), 500);
    }

    #[tokio::test]
    async fn test_unknown_customer_has_no_tier() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.customers();
        assert!(repo.get_customer_tier("nobody", date(2026, 1, 1)).await.unwrap().is_none());

        let err = repo
            .insert_individual_discount("nobody", DiscountRate::from_bps(100), date(2026, 1, 1), date(2026, 1, 2))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_customer_without_group() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.customers();
        repo.insert_customer(&customer("c2", CustomerClass::Retail, None, 0))
            .await
            .unwrap();

        let tier = repo.get_customer_tier("c2", date(2026, 1, 1)).await.unwrap().unwrap();
        assert_eq!(tier, CustomerTier::retail("c2"));

        let loaded = repo.get_customer("c2").await.unwrap().unwrap();
        assert!(loaded.price_group_id.is_none());
    }
}
