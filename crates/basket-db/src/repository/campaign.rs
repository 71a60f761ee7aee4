//! # Campaign Repository
//!
//! Standing campaigns and the single-use codes that unlock them.
//!
//! ## Code Lookup
//! ```text
//! typed code ──normalize──► "SUMMER10"
//!     │
//!     ├── single_use_codes.code = ?   found → CodeLookup::SingleUse
//!     │                                        campaign = active campaign by id
//!     │
//!     └── campaigns.code = ? AND active       → CodeLookup::Standing
//! ```
//!
//! ## Commit-Time Guards
//! `increment_usage_in` and `redeem_in` are conditional UPDATEs; a `false`
//! return means another checkout got there first.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use basket_core::campaign::{normalize_code, CodeLookup};
use basket_core::validation::validate_code;
use basket_core::{Audience, Campaign, CampaignDiscount, DiscountRate, Money, SingleUseCode};

const DISCOUNT_PERCENTAGE: &str = "percentage";
const DISCOUNT_FLAT: &str = "flat";

const CAMPAIGN_COLUMNS: &str = r#"
    id, code, name, description, discount_kind, discount_value, max_discount_cents,
    min_cart_value_cents, target_audience, starts_at, ends_at, usage_limit,
    usage_count, active, created_at
"#;

#[derive(Debug, sqlx::FromRow)]
struct CampaignRow {
    id: String,
    code: String,
    name: String,
    description: Option<String>,
    discount_kind: String,
    discount_value: i64,
    max_discount_cents: Option<i64>,
    min_cart_value_cents: i64,
    target_audience: Audience,
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
    usage_limit: Option<i64>,
    usage_count: i64,
    active: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<CampaignRow> for Campaign {
    type Error = DbError;

    fn try_from(row: CampaignRow) -> DbResult<Self> {
        let discount = match row.discount_kind.as_str() {
            DISCOUNT_PERCENTAGE => {
                let bps = u32::try_from(row.discount_value)
                    .map_err(|_| DbError::corrupt("discount_value", row.discount_value.to_string()))?;
                CampaignDiscount::Percentage {
                    rate: DiscountRate::from_bps(bps),
                    max_discount_amount: row.max_discount_cents.map(Money::from_cents),
                }
            }
            DISCOUNT_FLAT => CampaignDiscount::Flat {
                amount: Money::from_cents(row.discount_value),
            },
            other => return Err(DbError::corrupt("discount_kind", other)),
        };

        Ok(Campaign {
            id: row.id,
            code: row.code,
            name: row.name,
            description: row.description,
            discount,
            min_cart_value: Money::from_cents(row.min_cart_value_cents),
            target_audience: row.target_audience,
            starts_at: row.starts_at,
            ends_at: row.ends_at,
            usage_limit: row.usage_limit,
            usage_count: row.usage_count,
            active: row.active,
            created_at: row.created_at,
        })
    }
}

/// (kind, value, cap) columns for a discount.
fn discount_columns(discount: &CampaignDiscount) -> (&'static str, i64, Option<i64>) {
    match discount {
        CampaignDiscount::Percentage {
            rate,
            max_discount_amount,
        } => (
            DISCOUNT_PERCENTAGE,
            i64::from(rate.bps()),
            max_discount_amount.map(|m| m.cents()),
        ),
        CampaignDiscount::Flat { amount } => (DISCOUNT_FLAT, amount.cents(), None),
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SingleUseRow {
    code: String,
    campaign_id: String,
    redeemed: bool,
    redeemed_by: Option<String>,
    redeemed_at: Option<DateTime<Utc>>,
}

impl From<SingleUseRow> for SingleUseCode {
    fn from(row: SingleUseRow) -> Self {
        SingleUseCode {
            code: row.code,
            campaign_id: row.campaign_id,
            redeemed: row.redeemed,
            redeemed_by: row.redeemed_by,
            redeemed_at: row.redeemed_at,
        }
    }
}

/// Repository for campaigns and single-use codes.
#[derive(Debug, Clone)]
pub struct CampaignRepository {
    pool: SqlitePool,
}

impl CampaignRepository {
    /// Creates a new CampaignRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CampaignRepository { pool }
    }

    // -------------------------------------------------------------------------
    // Campaigns
    // -------------------------------------------------------------------------

    /// Inserts a campaign. The code is stored normalized.
    ///
    /// Returns the campaign as stored.
    pub async fn insert(&self, campaign: &Campaign) -> DbResult<Campaign> {
        let code = validate_code(&campaign.code)?;
        let (kind, value, cap) = discount_columns(&campaign.discount);

        sqlx::query(
            r#"
            INSERT INTO campaigns (
                id, code, name, description, discount_kind, discount_value,
                max_discount_cents, min_cart_value_cents, target_audience,
                starts_at, ends_at, usage_limit, usage_count, active, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            "#,
        )
        .bind(&campaign.id)
        .bind(&code)
        .bind(&campaign.name)
        .bind(&campaign.description)
        .bind(kind)
        .bind(value)
        .bind(cap)
        .bind(campaign.min_cart_value.cents())
        .bind(campaign.target_audience)
        .bind(campaign.starts_at)
        .bind(campaign.ends_at)
        .bind(campaign.usage_limit)
        .bind(campaign.usage_count)
        .bind(campaign.active)
        .bind(campaign.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { .. } => DbError::duplicate("campaigns.code", code.clone()),
            other => other,
        })?;

        info!(campaign_id = %campaign.id, code = %code, "Campaign created");

        Ok(Campaign {
            code,
            ..campaign.clone()
        })
    }

    /// Gets a campaign by ID, active or not.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Campaign>> {
        let sql = format!("SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE id = ?1");
        let row: Option<CampaignRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Campaign::try_from).transpose()
    }

    /// Finds the active campaign with `code` (matched normalized).
    pub async fn find_active_by_code(&self, code: &str) -> DbResult<Option<Campaign>> {
        let sql = format!("SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE code = ?1 AND active = 1");
        let row: Option<CampaignRow> = sqlx::query_as(&sql)
            .bind(normalize_code(code))
            .fetch_optional(&self.pool)
            .await?;

        row.map(Campaign::try_from).transpose()
    }

    /// Lists active campaigns, newest first.
    pub async fn list_active(&self) -> DbResult<Vec<Campaign>> {
        let sql = format!(
            "SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE active = 1 ORDER BY created_at DESC"
        );
        let rows: Vec<CampaignRow> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;

        rows.into_iter().map(Campaign::try_from).collect()
    }

    /// Turns a campaign on or off.
    pub async fn set_active(&self, id: &str, active: bool) -> DbResult<()> {
        let result = sqlx::query("UPDATE campaigns SET active = ?2 WHERE id = ?1")
            .bind(id)
            .bind(active)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Campaign", id));
        }
        debug!(campaign_id = %id, active, "Campaign toggled");
        Ok(())
    }

    /// Counts one use of the campaign unless its limit is reached.
    ///
    /// A missing or zero limit is unlimited. Returns `false` when the
    /// limit was already reached.
    pub async fn increment_usage_in(conn: &mut SqliteConnection, id: &str) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE campaigns
            SET usage_count = usage_count + 1
            WHERE id = ?1
              AND (usage_limit IS NULL OR usage_limit <= 0 OR usage_count < usage_limit)
            "#,
        )
        .bind(id)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    // -------------------------------------------------------------------------
    // Single-use codes
    // -------------------------------------------------------------------------

    /// Issues a single-use code for a campaign.
    pub async fn insert_single_use(&self, code: &str, campaign_id: &str) -> DbResult<SingleUseCode> {
        let code = validate_code(code)?;

        sqlx::query("INSERT INTO single_use_codes (code, campaign_id) VALUES (?1, ?2)")
            .bind(&code)
            .bind(campaign_id)
            .execute(&self.pool)
            .await
            .map_err(|e| match DbError::from(e) {
                DbError::UniqueViolation { .. } => {
                    DbError::duplicate("single_use_codes.code", code.clone())
                }
                DbError::ForeignKeyViolation { .. } => DbError::not_found("Campaign", campaign_id),
                other => other,
            })?;

        debug!(campaign_id = %campaign_id, "Single-use code issued");
        Ok(SingleUseCode {
            code,
            campaign_id: campaign_id.to_string(),
            redeemed: false,
            redeemed_by: None,
            redeemed_at: None,
        })
    }

    /// Finds a single-use code (matched normalized), redeemed or not.
    pub async fn find_single_use(&self, code: &str) -> DbResult<Option<SingleUseCode>> {
        let row: Option<SingleUseRow> = sqlx::query_as(
            r#"
            SELECT code, campaign_id, redeemed, redeemed_by, redeemed_at
            FROM single_use_codes
            WHERE code = ?1
            "#,
        )
        .bind(normalize_code(code))
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(SingleUseCode::from))
    }

    /// Marks a code redeemed by `customer_id`.
    ///
    /// Returns `false` when the code is unknown or already redeemed.
    pub async fn redeem_in(
        conn: &mut SqliteConnection,
        code: &str,
        customer_id: &str,
        now: DateTime<Utc>,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE single_use_codes
            SET redeemed = 1, redeemed_by = ?2, redeemed_at = ?3
            WHERE code = ?1 AND redeemed = 0
            "#,
        )
        .bind(normalize_code(code))
        .bind(customer_id)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    // -------------------------------------------------------------------------
    // Lookup
    // -------------------------------------------------------------------------

    /// Resolves a typed code: single-use codes first, then standing
    /// campaigns.
    pub async fn lookup(&self, code: &str) -> DbResult<CodeLookup> {
        if let Some(single_use) = self.find_single_use(code).await? {
            let campaign = self
                .get_by_id(&single_use.campaign_id)
                .await?
                .filter(|c| c.active);
            return Ok(CodeLookup::SingleUse {
                code: single_use,
                campaign,
            });
        }

        let campaign = self.find_active_by_code(code).await?;
        Ok(CodeLookup::Standing { campaign })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use chrono::Duration;

    fn summer10() -> Campaign {
        let now = Utc::now();
        Campaign {
            id: uuid::Uuid::new_v4().to_string(),
            code: " summer10 ".to_string(),
            name: "Summer sale".to_string(),
            description: Some("10% off over 100".to_string()),
            discount: CampaignDiscount::Percentage {
                rate: DiscountRate::from_bps(1000),
                max_discount_amount: Some(Money::from_cents(1500)),
            },
            min_cart_value: Money::from_cents(10000),
            target_audience: Audience::All,
            starts_at: now - Duration::days(1),
            ends_at: now + Duration::days(30),
            usage_limit: Some(2),
            usage_count: 0,
            active: true,
            created_at: now,
        }
    }

    #[tokio::test]
    async fn test_insert_and_find_by_code() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.campaigns();

        let stored = repo.insert(&summer10()).await.unwrap();
        assert_eq!(stored.code, "SUMMER10");

        let found = repo.find_active_by_code("Summer10").await.unwrap().unwrap();
        assert_eq!(found, stored);

        let err = repo.insert(&summer10()).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }

    #[tokio::test]
    async fn test_flat_discount_round_trips() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let campaign = Campaign {
            code: "FLAT5".to_string(),
            discount: CampaignDiscount::Flat {
                amount: Money::from_cents(500),
            },
            ..summer10()
        };
        let stored = db.campaigns().insert(&campaign).await.unwrap();
        let loaded = db.campaigns().get_by_id(&stored.id).await.unwrap().unwrap();
        assert_eq!(loaded.discount, campaign.discount);
    }

    #[tokio::test]
    async fn test_inactive_campaign_is_hidden() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.campaigns();
        let stored = repo.insert(&summer10()).await.unwrap();

        repo.set_active(&stored.id, false).await.unwrap();
        assert!(repo.find_active_by_code("SUMMER10").await.unwrap().is_none());
        assert!(repo.list_active().await.unwrap().is_empty());
        assert!(matches!(
            repo.lookup("summer10").await.unwrap(),
            CodeLookup::Standing { campaign: None }
        ));
    }

    #[tokio::test]
    async fn test_usage_increment_respects_limit() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let stored = db.campaigns().insert(&summer10()).await.unwrap();

        let mut conn = db.pool().acquire().await.unwrap();
        assert!(CampaignRepository::increment_usage_in(&mut conn, &stored.id).await.unwrap());
        assert!(CampaignRepository::increment_usage_in(&mut conn, &stored.id).await.unwrap());
        assert!(!CampaignRepository::increment_usage_in(&mut conn, &stored.id).await.unwrap());
        drop(conn);

        let loaded = db.campaigns().get_by_id(&stored.id).await.unwrap().unwrap();
        assert_eq!(loaded.usage_count, 2);
    }

    #[tokio::test]
    async fn test_single_use_lookup_and_redeem() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.campaigns();
        let stored = repo.insert(&summer10()).await.unwrap();
        repo.insert_single_use("vip-0001", &stored.id).await.unwrap();

        match repo.lookup("VIP-0001").await.unwrap() {
            CodeLookup::SingleUse { code, campaign } => {
                assert!(!code.redeemed);
                assert_eq!(campaign.unwrap().id, stored.id);
            }
            other => panic!("expected single-use lookup, got {other:?}"),
        }

        let mut conn = db.pool().acquire().await.unwrap();
        let now = Utc::now();
        assert!(CampaignRepository::redeem_in(&mut conn, "vip-0001", "cust-a", now).await.unwrap());
        assert!(!CampaignRepository::redeem_in(&mut conn, "vip-0001", "cust-b", now).await.unwrap());
        drop(conn);

        let code = repo.find_single_use("VIP-0001").await.unwrap().unwrap();
        assert!(code.redeemed);
        assert_eq!(code.redeemed_by.as_deref(), Some("cust-a"));
    }

    #[tokio::test]
    async fn test_single_use_for_unknown_campaign() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let err = db
            .campaigns()
            .insert_single_use("ORPHAN", "no-such-campaign")
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }
}
