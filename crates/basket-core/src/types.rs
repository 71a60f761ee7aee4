//! # Domain Types
//!
//! Core domain types used throughout Basket.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │ ProductUnitKey  │   │  StockRecord    │   │  Reservation    │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  product_id     │◄──│  key            │   │  customer_id    │       │
//! │  │  unit           │   │  available_qty  │   │  key            │       │
//! │  └─────────────────┘   │  stock_unit     │   │  quantity       │       │
//! │                        └─────────────────┘   │  created_at     │       │
//! │                                              └─────────────────┘       │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │   Campaign      │   │ SingleUseCode   │   │  CustomerTier   │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  code (UPPER)   │◄──│  campaign_id    │   │  class          │       │
//! │  │  discount       │   │  redeemed       │   │  group_rate     │       │
//! │  │  window, cap    │   └─────────────────┘   │  individual_rate│       │
//! │  └─────────────────┘                         └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐                                                    │
//! │  │  DiscountRate   │   bps (u32): 1000 = 10%                           │
//! │  └─────────────────┘                                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Identity
//! Entities use string identifiers (UUID v4 for rows we create, the
//! catalogue's own ids for products and customers).

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;
use crate::units::UnitType;

// =============================================================================
// Discount Rate
// =============================================================================

/// Discount rate represented in basis points (bps).
///
/// ## Why Basis Points?
/// 1 basis point = 0.01% = 1/10000
/// 1000 bps = 10%, 1450 bps = 14.5%
///
/// Rates are stored as entered. Only rates in (0, 100%] take part in
/// pricing; see [`DiscountRate::is_effective`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DiscountRate(u32);

impl DiscountRate {
    /// 100%.
    pub const FULL: DiscountRate = DiscountRate(10_000);

    /// Creates a rate from basis points.
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        DiscountRate(bps)
    }

    /// Creates a rate from a percentage (`10` or `12.5`).
    ///
    /// Rounds to the nearest basis point. Negative input becomes zero.
    pub fn from_percent(pct: Decimal) -> Self {
        if pct.is_sign_negative() {
            return DiscountRate(0);
        }
        let bps = (pct * Decimal::ONE_HUNDRED).round();
        DiscountRate(bps.to_u32().unwrap_or(u32::MAX))
    }

    /// Returns the rate in basis points.
    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Returns the rate as a percentage (`12.5` for 1250 bps).
    pub fn percent(&self) -> Decimal {
        Decimal::new(self.0 as i64, 2).normalize()
    }

    /// Zero rate.
    #[inline]
    pub const fn zero() -> Self {
        DiscountRate(0)
    }

    /// Checks if the rate is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Whether the rate takes part in pricing: 0 < rate ≤ 100%.
    #[inline]
    pub const fn is_effective(&self) -> bool {
        self.0 > 0 && self.0 <= Self::FULL.0
    }

    /// The rate if effective, otherwise zero.
    #[inline]
    pub const fn effective_or_zero(&self) -> Self {
        if self.is_effective() {
            *self
        } else {
            DiscountRate(0)
        }
    }
}

impl Default for DiscountRate {
    fn default() -> Self {
        DiscountRate::zero()
    }
}

impl fmt::Display for DiscountRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.percent())
    }
}

// =============================================================================
// Product Unit Key
// =============================================================================

/// The pair stock is tracked by: one product sold in one unit.
///
/// The same product may be listed per piece and per kilogram; those are
/// different keys with their own stock.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ProductUnitKey {
    pub product_id: String,
    pub unit: UnitType,
}

impl ProductUnitKey {
    pub fn new(product_id: impl Into<String>, unit: UnitType) -> Self {
        Self {
            product_id: product_id.into(),
            unit,
        }
    }
}

impl fmt::Display for ProductUnitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.product_id, self.unit)
    }
}

// =============================================================================
// Customer Class & Audience
// =============================================================================

/// Commercial class of a signed-in customer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum CustomerClass {
    /// End consumer.
    Retail,
    /// Reseller with an approved dealer account.
    Dealer,
}

impl Default for CustomerClass {
    fn default() -> Self {
        CustomerClass::Retail
    }
}

impl fmt::Display for CustomerClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CustomerClass::Retail => f.write_str("retail"),
            CustomerClass::Dealer => f.write_str("dealer"),
        }
    }
}

/// Who a campaign is meant for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum Audience {
    Retail,
    Dealer,
    All,
}

impl Audience {
    /// Whether a shopper of `class` (`None` = anonymous) may use the campaign.
    pub fn admits(&self, class: Option<CustomerClass>) -> bool {
        match (self, class) {
            (Audience::All, _) => true,
            (Audience::Retail, Some(CustomerClass::Retail)) => true,
            (Audience::Dealer, Some(CustomerClass::Dealer)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Audience {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Audience::Retail => f.write_str("retail"),
            Audience::Dealer => f.write_str("dealer"),
            Audience::All => f.write_str("all"),
        }
    }
}

// =============================================================================
// Customer Tier
// =============================================================================

/// Resolved pricing tier for one customer.
///
/// ## Resolution
/// ```text
/// active dated individual discount? ──yes──► individual_rate = it, group = 0
///            │
///            no
///            ▼
/// group_rate      = customer's price group rate
/// individual_rate = customer's special rate
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CustomerTier {
    pub customer_id: String,
    pub class: CustomerClass,
    pub group_rate: DiscountRate,
    pub individual_rate: DiscountRate,
}

impl CustomerTier {
    /// Tier for a customer with no price group and no special rate.
    pub fn retail(customer_id: impl Into<String>) -> Self {
        Self {
            customer_id: customer_id.into(),
            class: CustomerClass::Retail,
            group_rate: DiscountRate::zero(),
            individual_rate: DiscountRate::zero(),
        }
    }
}

// =============================================================================
// Stock Record
// =============================================================================

/// Stock held for one product unit key.
///
/// `available_quantity` is expressed in `stock_unit`, which must be
/// compatible with `key.unit` (kilogram stock can back a gram listing).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StockRecord {
    pub key: ProductUnitKey,

    #[ts(as = "String")]
    pub available_quantity: Decimal,

    pub stock_unit: UnitType,

    pub is_active: bool,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl StockRecord {
    /// Available quantity converted into the key's unit.
    pub fn available_in_key_unit(&self) -> Decimal {
        self.stock_unit
            .convert_to(self.available_quantity, self.key.unit)
    }
}

// =============================================================================
// Reservation
// =============================================================================

/// A customer's claim on stock for one key while it sits in their cart.
///
/// At most one per (customer, key). `quantity` is in the key's unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Reservation {
    pub customer_id: String,
    pub key: ProductUnitKey,

    #[ts(as = "String")]
    pub quantity: Decimal,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Campaign
// =============================================================================

/// How a campaign reduces the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CampaignDiscount {
    /// Share of the subtotal, optionally capped.
    Percentage {
        rate: DiscountRate,
        max_discount_amount: Option<Money>,
    },
    /// Fixed amount off the cart.
    Flat { amount: Money },
}

/// A standing, code-entered or listed promotion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Campaign {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Code shoppers type, stored upper-cased.
    pub code: String,

    pub name: String,

    pub description: Option<String>,

    pub discount: CampaignDiscount,

    /// Subtotal the cart must reach.
    pub min_cart_value: Money,

    pub target_audience: Audience,

    #[ts(as = "String")]
    pub starts_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub ends_at: DateTime<Utc>,

    /// Total redemptions allowed. `None` = unlimited.
    pub usage_limit: Option<i64>,

    pub usage_count: i64,

    pub active: bool,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// A one-time code that unlocks a campaign.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SingleUseCode {
    pub code: String,
    pub campaign_id: String,

    /// Terminal once true.
    pub redeemed: bool,

    pub redeemed_by: Option<String>,

    #[ts(as = "Option<String>")]
    pub redeemed_at: Option<DateTime<Utc>>,
}

/// A campaign accepted for a cart, with the discount it yields there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AppliedCampaign {
    pub campaign: Campaign,
    pub discount_amount: Money,

    /// Set when the campaign was unlocked with a single-use code.
    pub single_use_code: Option<String>,
}

// =============================================================================
// Unit Tests
// =============================================================================
