//! # Error Types
//!
//! Domain-specific error types for basket-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  basket-core errors (this file)                                        │
//! │  ├── CoreError          - General domain errors                        │
//! │  ├── ValidationError    - Input validation failures                    │
//! │  ├── ReservationFailure - Stock claim refused (resource error)         │
//! │  └── CampaignRejection  - Campaign code refused (validation error)     │
//! │                                                                         │
//! │  basket-db errors (separate crate)                                     │
//! │  └── DbError            - Database operation failures                  │
//! │                                                                         │
//! │  basket-engine errors                                                  │
//! │  └── EngineError        - What callers see (categorised)               │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → EngineError → storefront UI       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. `Display` of reservation and campaign errors is the user-facing text
//! 3. Errors are enum variants, never String

use rust_decimal::Decimal;
use thiserror::Error;

use crate::money::Money;
use crate::types::Audience;
use crate::units::UnitType;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The stock claim for a cart line was refused.
    #[error(transparent)]
    Reservation(#[from] ReservationFailure),

    /// A campaign could not be applied.
    #[error(transparent)]
    Campaign(#[from] CampaignRejection),

    /// Cart has exceeded maximum allowed lines.
    #[error("Cart cannot have more than {max} items")]
    CartTooLarge { max: usize },

    /// Line quantity exceeds maximum allowed.
    #[error("Quantity {requested} exceeds maximum allowed ({max})")]
    QuantityTooLarge { requested: Decimal, max: i64 },

    /// Line quantity is below the product's minimum order quantity.
    ///
    /// ## User Workflow
    /// ```text
    /// Product: Coffee beans, minimum order 2 kg
    ///      │
    ///      ▼
    /// Set quantity: 1 kg
    ///      │
    ///      ▼
    /// BelowMinimumOrder { minimum: 2, requested: 1 }
    ///      │
    ///      ▼
    /// UI shows: "Minimum order quantity is 2"
    /// ```
    #[error("Minimum order quantity is {minimum}, requested {requested}")]
    BelowMinimumOrder { minimum: Decimal, requested: Decimal },

    /// The cart has no line for this product and unit.
    #[error("Product {product_id} ({unit}) is not in the cart")]
    LineNotFound { product_id: String, unit: UnitType },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when input doesn't meet requirements.
/// Used for early validation before business logic runs.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., unknown unit, malformed decimal).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Two units that must be convertible are not.
    #[error("Unit {left} is not compatible with {right}")]
    IncompatibleUnits { left: UnitType, right: UnitType },
}

// =============================================================================
// Reservation Failure
// =============================================================================

/// Why a stock claim was refused.
///
/// These are expected outcomes of `reserve`, not faults. The `Display`
/// text is shown to the shopper as-is.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReservationFailure {
    /// No stock record exists for the key, or it is switched off.
    #[error("This product is not available")]
    NotAvailable { product_id: String, unit: UnitType },

    /// Not enough unclaimed stock left.
    ///
    /// `available` is what this customer could still claim, in the
    /// unit of the cart line.
    #[error("Insufficient stock: only {available} {unit} available, requested {requested}")]
    InsufficientStock {
        product_id: String,
        unit: UnitType,
        available: Decimal,
        requested: Decimal,
    },
}

impl ReservationFailure {
    /// Quantity still claimable, when known.
    pub fn available(&self) -> Option<Decimal> {
        match self {
            ReservationFailure::NotAvailable { .. } => None,
            ReservationFailure::InsufficientStock { available, .. } => Some(*available),
        }
    }
}

// =============================================================================
// Campaign Rejection
// =============================================================================

/// Why a campaign or single-use code was refused.
///
/// Variants are listed in evaluation order. The `Display` text is shown to
/// the shopper as-is.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CampaignRejection {
    /// Single-use code was redeemed before. Terminal.
    #[error("This campaign code has already been used")]
    CodeAlreadyUsed,

    /// No active campaign or single-use code with this code.
    #[error("Invalid campaign code")]
    InvalidCode,

    /// `now` is before the campaign window.
    #[error("This campaign has not started yet")]
    NotStarted,

    /// `now` is after the campaign window.
    #[error("This campaign has expired")]
    Expired,

    /// `usage_count` reached `usage_limit`.
    #[error("This campaign has reached its usage limit")]
    UsageLimitReached,

    /// Audience-restricted campaign presented by an anonymous cart.
    #[error("You must sign in to use this campaign")]
    SignInRequired,

    /// Customer class differs from the campaign audience.
    #[error("This campaign is only valid for {required} customers")]
    AudienceMismatch { required: Audience },

    /// Cart subtotal is below the campaign minimum.
    #[error("Minimum cart value for this campaign is {minimum} ({missing} more needed)")]
    BelowMinimum { minimum: Money, missing: Money },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reservation_failure_messages() {
        let err = ReservationFailure::InsufficientStock {
            product_id: "coffee".to_string(),
            unit: UnitType::Kilogram,
            available: Decimal::from(6),
            requested: Decimal::from(7),
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock: only 6 kilogram available, requested 7"
        );
        assert_eq!(err.available(), Some(Decimal::from(6)));

        let err = ReservationFailure::NotAvailable {
            product_id: "coffee".to_string(),
            unit: UnitType::Gram,
        };
        assert_eq!(err.to_string(), "This product is not available");
        assert_eq!(err.available(), None);
    }

    #[test]
    fn test_campaign_rejection_messages() {
        assert_eq!(
            CampaignRejection::CodeAlreadyUsed.to_string(),
            "This campaign code has already been used"
        );
        assert_eq!(
            CampaignRejection::AudienceMismatch {
                required: Audience::Dealer
            }
            .to_string(),
            "This campaign is only valid for dealer customers"
        );
        assert_eq!(
            CampaignRejection::BelowMinimum {
                minimum: Money::from_cents(10000),
                missing: Money::from_cents(2550),
            }
            .to_string(),
            "Minimum cart value for this campaign is 100.00 (25.50 more needed)"
        );
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "product_id".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));

        let core_err: CoreError = CampaignRejection::InvalidCode.into();
        assert_eq!(core_err.to_string(), "Invalid campaign code");
    }
}
