//! # Discount Calculator
//!
//! All price reduction arithmetic lives here.
//!
//! ## Discount Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Which Discount Applies?                           │
//! │                                                                         │
//! │   campaign applied to cart?                                             │
//! │        │                                                                │
//! │        ├── yes ──► apply_campaign(subtotal)     (tier is NOT stacked)   │
//! │        │                                                                │
//! │        └── no ───► apply_tiered(subtotal, group, individual)            │
//! │                                                                         │
//! │   payable = max(subtotal - discount, 0)                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Tiered Compounding
//! ```text
//! price 100.00, group 10%, individual 5%
//!
//!   100.00 ──(-10%)──► 90.00 ──(-5%)──► 85.50
//!
//!   effective = (100.00 - 85.50) / 100.00 = 14.5%   (not 10% + 5%)
//! ```
//!
//! Each step rounds once to the nearest cent.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;
use crate::types::{AppliedCampaign, CampaignDiscount, CustomerTier, DiscountRate};

// =============================================================================
// Tiered Discount
// =============================================================================

/// Result of applying customer-tier rates to a price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TieredDiscount {
    /// Whether any reduction took place.
    pub applies: bool,
    pub final_price: Money,
    pub original_price: Money,
    /// Recomputed from the two prices, never the sum of the rates.
    pub effective_rate: DiscountRate,
}

impl TieredDiscount {
    fn unchanged(price: Money) -> Self {
        Self {
            applies: false,
            final_price: price,
            original_price: price,
            effective_rate: DiscountRate::zero(),
        }
    }

    /// Amount taken off the original price.
    pub fn discount_amount(&self) -> Money {
        self.original_price - self.final_price
    }
}

/// Applies the group rate, then the individual rate on what remains.
///
/// Rates outside (0, 100%] count as zero. `applies` is true whenever either
/// rate is effective, even if rounding leaves the price unchanged.
///
/// ## Example
/// ```rust
/// use basket_core::discount::apply_tiered;
/// use basket_core::money::Money;
/// use basket_core::types::DiscountRate;
///
/// let result = apply_tiered(
///     Money::from_cents(10000),
///     DiscountRate::from_bps(1000),
///     DiscountRate::from_bps(500),
/// );
/// assert_eq!(result.final_price.cents(), 8550);
/// assert_eq!(result.effective_rate.bps(), 1450);
/// ```
pub fn apply_tiered(
    price: Money,
    group_rate: DiscountRate,
    individual_rate: DiscountRate,
) -> TieredDiscount {
    let group = group_rate.effective_or_zero();
    let individual = individual_rate.effective_or_zero();

    if group.is_zero() && individual.is_zero() {
        return TieredDiscount::unchanged(price);
    }

    let after_group = price.apply_discount(group);
    let final_price = after_group.apply_discount(individual);

    TieredDiscount {
        applies: true,
        final_price,
        original_price: price,
        effective_rate: effective_rate(price, final_price),
    }
}

/// Single-rate form used on product cards.
pub fn apply_rate(price: Money, rate: DiscountRate) -> TieredDiscount {
    apply_tiered(price, rate, DiscountRate::zero())
}

/// `(original - final) / original` in basis points, rounded half up.
fn effective_rate(original: Money, final_price: Money) -> DiscountRate {
    if original.cents() <= 0 {
        return DiscountRate::zero();
    }
    let saved = (original - final_price).cents().max(0) as i128;
    let bps = (saved * 10_000 + original.cents() as i128 / 2) / original.cents() as i128;
    DiscountRate::from_bps(bps.min(u32::MAX as i128) as u32)
}

// =============================================================================
// Campaign Discount
// =============================================================================

/// Discount a campaign yields on `subtotal`.
///
/// - Percentage: `subtotal × rate`, clamped to `max_discount_amount`. A
///   cap of zero means no cap.
/// - Flat: the amount as-is. It is NOT clamped to the subtotal; the
///   payable is floored at zero by [`payable`] instead.
pub fn apply_campaign(subtotal: Money, discount: &CampaignDiscount) -> Money {
    match discount {
        CampaignDiscount::Percentage {
            rate,
            max_discount_amount,
        } => {
            let amount = subtotal.percentage(rate.effective_or_zero());
            match max_discount_amount {
                Some(cap) if cap.cents() > 0 && amount > *cap => *cap,
                _ => amount,
            }
        }
        CampaignDiscount::Flat { amount } => *amount,
    }
}

/// What the shopper pays: `subtotal - discount`, floored at zero.
#[inline]
pub fn payable(subtotal: Money, discount: Money) -> Money {
    (subtotal - discount).floor_zero()
}

/// How much more the cart needs to reach `min_cart_value` (zero if met).
#[inline]
pub fn missing_to_qualify(subtotal: Money, min_cart_value: Money) -> Money {
    (min_cart_value - subtotal).floor_zero()
}

// =============================================================================
// Cart Pricing
// =============================================================================

/// Where the cart discount came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum DiscountSource {
    None,
    Tiered {
        group_rate: DiscountRate,
        individual_rate: DiscountRate,
        effective_rate: DiscountRate,
    },
    Campaign {
        campaign_id: String,
        code: String,
        single_use_code: Option<String>,
    },
}

/// A priced cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PricedCart {
    pub subtotal: Money,
    pub discount: Money,
    pub total_payable: Money,
    pub source: DiscountSource,
}

/// Prices a cart subtotal.
///
/// An applied campaign replaces the tier discount entirely. The campaign
/// amount is recomputed against `subtotal` so a stale preview cannot leak
/// into the total.
pub fn price_cart(
    subtotal: Money,
    tier: Option<&CustomerTier>,
    applied: Option<&AppliedCampaign>,
) -> PricedCart {
    if let Some(applied) = applied {
        let discount = apply_campaign(subtotal, &applied.campaign.discount);
        return PricedCart {
            subtotal,
            discount,
            total_payable: payable(subtotal, discount),
            source: DiscountSource::Campaign {
                campaign_id: applied.campaign.id.clone(),
                code: applied.campaign.code.clone(),
                single_use_code: applied.single_use_code.clone(),
            },
        };
    }

    if let Some(tier) = tier {
        let tiered = apply_tiered(subtotal, tier.group_rate, tier.individual_rate);
        if tiered.applies {
            return PricedCart {
                subtotal,
                discount: tiered.discount_amount(),
                total_payable: tiered.final_price.floor_zero(),
                source: DiscountSource::Tiered {
                    group_rate: tier.group_rate.effective_or_zero(),
                    individual_rate: tier.individual_rate.effective_or_zero(),
                    effective_rate: tiered.effective_rate,
                },
            };
        }
    }

    PricedCart {
        subtotal,
        discount: Money::zero(),
        total_payable: subtotal.floor_zero(),
        source: DiscountSource::None,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Audience, Campaign};
    use chrono::{Duration, Utc};

    fn campaign(discount: CampaignDiscount) -> Campaign {
        let now = Utc::now();
        Campaign {
            id: "c-1".to_string(),
            code: "SUMMER10".to_string(),
            name: "Summer".to_string(),
            description: None,
            discount,
            min_cart_value: Money::from_cents(10000),
            target_audience: Audience::All,
            starts_at: now - Duration::days(1),
            ends_at: now + Duration::days(1),
            usage_limit: None,
            usage_count: 0,
            active: true,
            created_at: now,
        }
    }

    #[test]
    fn test_tiered_compounds_not_adds() {
        let result = apply_tiered(
            Money::from_cents(10000),
            DiscountRate::from_bps(1000),
            DiscountRate::from_bps(500),
        );
        assert!(result.applies);
        assert_eq!(result.final_price.cents(), 8550);
        assert_eq!(result.original_price.cents(), 10000);
        assert_eq!(result.effective_rate.bps(), 1450);
        assert_eq!(result.discount_amount().cents(), 1450);
    }

    #[test]
    fn test_tiered_no_rates() {
        let price = Money::from_cents(4999);
        let result = apply_tiered(price, DiscountRate::zero(), DiscountRate::zero());
        assert!(!result.applies);
        assert_eq!(result.final_price, price);
        assert_eq!(result.effective_rate, DiscountRate::zero());
    }

    #[test]
    fn test_tiered_ignores_out_of_range_rates() {
        let price = Money::from_cents(10000);
        let result = apply_tiered(
            price,
            DiscountRate::from_bps(15_000),
            DiscountRate::from_bps(1000),
        );
        assert_eq!(result.final_price.cents(), 9000);

        let result = apply_rate(price, DiscountRate::from_bps(20_000));
        assert!(!result.applies);
        assert_eq!(result.final_price, price);
    }

    #[test]
    fn test_tiered_final_never_exceeds_price() {
        for cents in [1, 99, 1000, 12345, 999_999] {
            for (g, i) in [(1, 1), (333, 777), (5000, 5000), (10_000, 0), (9999, 9999)] {
                let price = Money::from_cents(cents);
                let r = apply_tiered(price, DiscountRate::from_bps(g), DiscountRate::from_bps(i));
                assert!(r.final_price <= price);
                assert!(!r.final_price.is_negative());
            }
        }
    }

    #[test]
    fn test_percentage_campaign_capped() {
        // 10% of 200.00 = 20.00, capped at 15.00
        let discount = CampaignDiscount::Percentage {
            rate: DiscountRate::from_bps(1000),
            max_discount_amount: Some(Money::from_cents(1500)),
        };
        assert_eq!(
            apply_campaign(Money::from_cents(20000), &discount).cents(),
            1500
        );
        // Below the cap
        assert_eq!(
            apply_campaign(Money::from_cents(12000), &discount).cents(),
            1200
        );
    }

    #[test]
    fn test_zero_cap_means_uncapped() {
        let discount = CampaignDiscount::Percentage {
            rate: DiscountRate::from_bps(1000),
            max_discount_amount: Some(Money::zero()),
        };
        assert_eq!(
            apply_campaign(Money::from_cents(20000), &discount).cents(),
            2000
        );
    }

    #[test]
    fn test_tiered_applies_when_rounding_keeps_price() {
        // 10% of 0.01 rounds to 0.00 off
        let result = apply_rate(Money::from_cents(1), DiscountRate::from_bps(1000));
        assert!(result.applies);
        assert_eq!(result.final_price.cents(), 1);

        let result = apply_tiered(Money::zero(), DiscountRate::from_bps(500), DiscountRate::zero());
        assert!(result.applies);
        assert_eq!(result.discount_amount(), Money::zero());
    }

    #[test]
    fn test_flat_campaign_not_clamped_but_payable_floored() {
        let discount = CampaignDiscount::Flat {
            amount: Money::from_cents(5000),
        };
        let subtotal = Money::from_cents(3000);
        let amount = apply_campaign(subtotal, &discount);
        assert_eq!(amount.cents(), 5000);
        assert_eq!(payable(subtotal, amount), Money::zero());
    }

    #[test]
    fn test_missing_to_qualify() {
        assert_eq!(
            missing_to_qualify(Money::from_cents(7450), Money::from_cents(10000)).cents(),
            2550
        );
        assert!(missing_to_qualify(Money::from_cents(20000), Money::from_cents(10000)).is_zero());
    }

    #[test]
    fn test_price_cart_campaign_replaces_tier() {
        let tier = CustomerTier {
            customer_id: "cust-1".to_string(),
            class: crate::types::CustomerClass::Dealer,
            group_rate: DiscountRate::from_bps(2000),
            individual_rate: DiscountRate::zero(),
        };
        let applied = AppliedCampaign {
            campaign: campaign(CampaignDiscount::Percentage {
                rate: DiscountRate::from_bps(1000),
                max_discount_amount: Some(Money::from_cents(1500)),
            }),
            discount_amount: Money::from_cents(1500),
            single_use_code: None,
        };

        let priced = price_cart(Money::from_cents(20000), Some(&tier), Some(&applied));
        assert_eq!(priced.discount.cents(), 1500);
        assert_eq!(priced.total_payable.cents(), 18500);
        assert!(matches!(priced.source, DiscountSource::Campaign { .. }));

        let priced = price_cart(Money::from_cents(20000), Some(&tier), None);
        assert_eq!(priced.discount.cents(), 4000);
        assert_eq!(priced.total_payable.cents(), 16000);
        assert!(matches!(priced.source, DiscountSource::Tiered { .. }));
    }

    #[test]
    fn test_price_cart_without_discounts() {
        let priced = price_cart(Money::from_cents(1234), None, None);
        assert_eq!(priced.discount, Money::zero());
        assert_eq!(priced.total_payable.cents(), 1234);
        assert_eq!(priced.source, DiscountSource::None);
    }
}
