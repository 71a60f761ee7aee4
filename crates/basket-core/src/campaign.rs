//! # Campaign Rules
//!
//! Decides whether a campaign may be applied to a cart. No lookups happen
//! here: the caller fetches the code records and passes them in.
//!
//! ## Code Entry Order
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. single-use code found?  ── redeemed ──► CodeAlreadyUsed (terminal)  │
//! │  2. campaign found & active? ── no ───────► InvalidCode                 │
//! │  3. starts_at ≤ now ≤ ends_at ────────────► NotStarted / Expired        │
//! │  4. usage_count < usage_limit ────────────► UsageLimitReached           │
//! │  5. audience admits shopper ──────────────► SignInRequired /            │
//! │                                             AudienceMismatch            │
//! │  6. subtotal ≥ min_cart_value ────────────► BelowMinimum                │
//! │  7. AppliedCampaign { discount_amount }                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Listing mode runs 3-5 as filters and reports 6 as `eligible` plus the
//! amount still missing, so the storefront can say "add 25.50 more".

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::discount::{apply_campaign, missing_to_qualify};
use crate::error::CampaignRejection;
use crate::money::Money;
use crate::types::{AppliedCampaign, Campaign, CustomerClass, SingleUseCode};

/// Maximum accepted code length.
pub const MAX_CODE_LENGTH: usize = 64;

/// Canonical form of a typed code: trimmed, upper-cased.
pub fn normalize_code(raw: &str) -> String {
    raw.trim().to_uppercase()
}

// =============================================================================
// Evaluation Context
// =============================================================================

/// Who is asking, when, and for how much.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CampaignContext {
    pub now: DateTime<Utc>,
    /// `None` for an anonymous cart.
    pub class: Option<CustomerClass>,
    pub subtotal: Money,
}

/// What a code lookup found.
#[derive(Debug, Clone, PartialEq)]
pub enum CodeLookup {
    /// A single-use code matched. `campaign` is its campaign if it exists
    /// and is active.
    SingleUse {
        code: SingleUseCode,
        campaign: Option<Campaign>,
    },
    /// No single-use code matched. `campaign` is the active standing
    /// campaign with this code, if any.
    Standing { campaign: Option<Campaign> },
}

// =============================================================================
// Checks
// =============================================================================

/// Check 3: the campaign window contains `now` (bounds inclusive).
pub fn check_window(campaign: &Campaign, now: DateTime<Utc>) -> Result<(), CampaignRejection> {
    if now < campaign.starts_at {
        return Err(CampaignRejection::NotStarted);
    }
    if now > campaign.ends_at {
        return Err(CampaignRejection::Expired);
    }
    Ok(())
}

/// Check 4: the usage cap is not reached. A missing or zero limit means
/// unlimited.
pub fn check_usage(campaign: &Campaign) -> Result<(), CampaignRejection> {
    match campaign.usage_limit {
        Some(limit) if limit > 0 && campaign.usage_count >= limit => {
            Err(CampaignRejection::UsageLimitReached)
        }
        _ => Ok(()),
    }
}

/// Check 5: the shopper belongs to the target audience.
pub fn check_audience(
    campaign: &Campaign,
    class: Option<CustomerClass>,
) -> Result<(), CampaignRejection> {
    if campaign.target_audience.admits(class) {
        return Ok(());
    }
    match class {
        None => Err(CampaignRejection::SignInRequired),
        Some(_) => Err(CampaignRejection::AudienceMismatch {
            required: campaign.target_audience,
        }),
    }
}

/// Check 6: the subtotal reaches the campaign minimum.
pub fn check_minimum(campaign: &Campaign, subtotal: Money) -> Result<(), CampaignRejection> {
    if subtotal < campaign.min_cart_value {
        return Err(CampaignRejection::BelowMinimum {
            minimum: campaign.min_cart_value,
            missing: missing_to_qualify(subtotal, campaign.min_cart_value),
        });
    }
    Ok(())
}

/// Runs checks 3-6 and prices the campaign.
pub fn evaluate(campaign: &Campaign, ctx: &CampaignContext) -> Result<Money, CampaignRejection> {
    check_window(campaign, ctx.now)?;
    check_usage(campaign)?;
    check_audience(campaign, ctx.class)?;
    check_minimum(campaign, ctx.subtotal)?;
    Ok(apply_campaign(ctx.subtotal, &campaign.discount))
}

// =============================================================================
// Code Entry & Listing
// =============================================================================

/// Validates a typed code against what the lookup found.
pub fn validate_code(
    lookup: CodeLookup,
    ctx: &CampaignContext,
) -> Result<AppliedCampaign, CampaignRejection> {
    let (campaign, single_use_code) = match lookup {
        CodeLookup::SingleUse { code, .. } if code.redeemed => {
            return Err(CampaignRejection::CodeAlreadyUsed)
        }
        CodeLookup::SingleUse { code, campaign } => (campaign, Some(code.code)),
        CodeLookup::Standing { campaign } => (campaign, None),
    };

    let campaign = match campaign {
        Some(c) if c.active => c,
        _ => return Err(CampaignRejection::InvalidCode),
    };

    let discount_amount = evaluate(&campaign, ctx)?;
    Ok(AppliedCampaign {
        campaign,
        discount_amount,
        single_use_code,
    })
}

/// Applies a campaign picked from the listing. Never carries a single-use
/// code.
pub fn select_listed(
    campaign: Campaign,
    ctx: &CampaignContext,
) -> Result<AppliedCampaign, CampaignRejection> {
    if !campaign.active {
        return Err(CampaignRejection::InvalidCode);
    }
    let discount_amount = evaluate(&campaign, ctx)?;
    Ok(AppliedCampaign {
        campaign,
        discount_amount,
        single_use_code: None,
    })
}

/// A campaign as shown in the storefront listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CampaignOffer {
    pub campaign: Campaign,
    /// Whether the cart meets the minimum right now.
    pub eligible: bool,
    pub missing_amount_to_qualify: Money,
    /// Discount the campaign would give on the current subtotal.
    pub discount_preview: Money,
}

/// Builds the listing: active campaigns that pass checks 3-5, newest first.
pub fn list_offers(campaigns: Vec<Campaign>, ctx: &CampaignContext) -> Vec<CampaignOffer> {
    let mut offers: Vec<CampaignOffer> = campaigns
        .into_iter()
        .filter(|c| c.active)
        .filter(|c| check_window(c, ctx.now).is_ok())
        .filter(|c| check_usage(c).is_ok())
        .filter(|c| c.target_audience.admits(ctx.class))
        .map(|campaign| {
            let missing = missing_to_qualify(ctx.subtotal, campaign.min_cart_value);
            let discount_preview = apply_campaign(ctx.subtotal, &campaign.discount);
            CampaignOffer {
                eligible: missing.is_zero(),
                missing_amount_to_qualify: missing,
                discount_preview,
                campaign,
            }
        })
        .collect();

    offers.sort_by(|a, b| b.campaign.created_at.cmp(&a.campaign.created_at));
    offers
}

// =============================================================================
// Unit Tests
// =============================================================================
