//! # Campaign Service
//!
//! Code entry, the campaign listing and re-validation at checkout.
//!
//! ```text
//! typed code ──validate format──► lookup (single-use first, then standing)
//!                                      │
//!                                      ▼
//!                          basket_core::campaign::validate_code
//!                          (used? active? window, usage, audience, minimum)
//!                                      │
//!                                      ▼
//!                               AppliedCampaign
//! ```
//!
//! The service only reads. Usage counts and single-use redemption are
//! written by `CartStore::complete_checkout`.

use chrono::Utc;
use tracing::debug;

use basket_core::campaign::{self, CampaignContext, CampaignOffer, CodeLookup};
use basket_core::validation;
use basket_core::{AppliedCampaign, CampaignRejection, CustomerClass, Money, ValidationError};
use basket_db::Database;

use crate::error::{EngineError, EngineResult};

/// Validates and lists campaigns.
#[derive(Debug, Clone)]
pub struct CampaignService {
    db: Database,
}

impl CampaignService {
    pub fn new(db: Database) -> Self {
        CampaignService { db }
    }

    fn context(class: Option<CustomerClass>, subtotal: Money) -> CampaignContext {
        CampaignContext {
            now: Utc::now(),
            class,
            subtotal,
        }
    }

    /// Validates a code typed by the shopper.
    ///
    /// `class` is `None` for an anonymous cart.
    ///
    /// ## Errors
    /// - `EngineError::Validation` - blank code
    /// - `EngineError::Campaign` - the code was refused, with the reason
    pub async fn validate_code(
        &self,
        raw: &str,
        class: Option<CustomerClass>,
        subtotal: Money,
    ) -> EngineResult<AppliedCampaign> {
        let code = match validation::validate_code(raw) {
            Ok(code) => code,
            // No stored code can look like this.
            Err(ValidationError::InvalidFormat { .. } | ValidationError::TooLong { .. }) => {
                debug!(code = %raw.trim(), "Campaign code refused: malformed");
                return Err(CampaignRejection::InvalidCode.into());
            }
            Err(err) => return Err(err.into()),
        };
        let lookup = self.db.campaigns().lookup(&code).await?;

        match campaign::validate_code(lookup, &Self::context(class, subtotal)) {
            Ok(applied) => {
                debug!(
                    code = %code,
                    campaign_id = %applied.campaign.id,
                    discount = %applied.discount_amount,
                    "Campaign code accepted"
                );
                Ok(applied)
            }
            Err(rejection) => {
                debug!(code = %code, reason = %rejection, "Campaign code refused");
                Err(rejection.into())
            }
        }
    }

    /// Campaigns the shopper may pick, newest first.
    pub async fn list_campaigns(
        &self,
        class: Option<CustomerClass>,
        subtotal: Money,
    ) -> EngineResult<Vec<CampaignOffer>> {
        let active = self.db.campaigns().list_active().await?;
        Ok(campaign::list_offers(active, &Self::context(class, subtotal)))
    }

    /// Applies a campaign picked from the listing.
    pub async fn select_listed(
        &self,
        campaign_id: &str,
        class: Option<CustomerClass>,
        subtotal: Money,
    ) -> EngineResult<AppliedCampaign> {
        let campaign = self
            .db
            .campaigns()
            .get_by_id(campaign_id)
            .await?
            .ok_or(EngineError::Campaign(CampaignRejection::InvalidCode))?;

        Ok(campaign::select_listed(campaign, &Self::context(class, subtotal))?)
    }

    /// Re-runs every check for a campaign applied earlier, against fresh
    /// data and the current subtotal.
    pub async fn reapply(
        &self,
        applied: &AppliedCampaign,
        class: Option<CustomerClass>,
        subtotal: Money,
    ) -> EngineResult<AppliedCampaign> {
        match &applied.single_use_code {
            Some(code) => {
                let lookup = self.db.campaigns().lookup(code).await?;
                // The code must still point at the same campaign.
                if let CodeLookup::SingleUse { code, .. } = &lookup {
                    if code.campaign_id != applied.campaign.id {
                        return Err(CampaignRejection::InvalidCode.into());
                    }
                }
                Ok(campaign::validate_code(lookup, &Self::context(class, subtotal))?)
            }
            None => self.select_listed(&applied.campaign.id, class, subtotal).await,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
