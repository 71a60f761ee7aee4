//! # Engine Error Types
//!
//! What callers of the engine see when an operation does not go through.
//!
//! ## Error Categories
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Engine Error Categories                           │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │   Validation    │  │    Resource     │  │    Infrastructure       │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  Campaign       │  │  Reservation    │  │  Database               │ │
//! │  │  Validation     │  │  (stock)        │  │  Config                 │ │
//! │  │  LineNotFound   │  │                 │  │                         │ │
//! │  │  NotAuthenticated│ │                 │  │                         │ │
//! │  │  EmptyCart      │  │                 │  │                         │ │
//! │  │  StaleCheckout  │  │                 │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  Validation and resource errors carry user-facing text.                │
//! │  Infrastructure errors are logged and shown generically.               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every variant leaves the cart as it was: writes run in transactions
//! that roll back on error.

use thiserror::Error;
use tracing::error;

use basket_core::{CampaignRejection, CoreError, ReservationFailure, UnitType, ValidationError};
use basket_db::DbError;

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Shown for infrastructure failures.
const GENERIC_FAILURE: &str = "Something went wrong. Please try again.";

/// Engine error type.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A stock claim was refused.
    #[error(transparent)]
    Reservation(#[from] ReservationFailure),

    /// A campaign code or listed campaign was refused.
    #[error(transparent)]
    Campaign(#[from] CampaignRejection),

    /// Cart input broke a business rule (quantity, minimum order, size).
    #[error("{0}")]
    Validation(CoreError),

    /// The operation needs a signed-in customer.
    #[error("Please sign in to continue")]
    NotAuthenticated,

    /// The cart has no line for this product and unit.
    #[error("Product {product_id} ({unit}) is not in the cart")]
    LineNotFound { product_id: String, unit: UnitType },

    /// Checkout was requested for an empty cart.
    #[error("Your cart is empty")]
    EmptyCart,

    /// The cart changed between the checkout snapshot and payment.
    #[error("Your cart changed. Please review it before paying.")]
    StaleCheckout,

    /// Storage failure.
    #[error("Database error: {0}")]
    Database(DbError),

    /// Invalid or unreadable configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Broad category of an [`EngineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request itself was not acceptable.
    Validation,
    /// Not enough stock.
    Resource,
    /// Storage or configuration failed.
    Infrastructure,
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<CoreError> for EngineError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Reservation(failure) => EngineError::Reservation(failure),
            CoreError::Campaign(rejection) => EngineError::Campaign(rejection),
            CoreError::LineNotFound { product_id, unit } => {
                EngineError::LineNotFound { product_id, unit }
            }
            other => EngineError::Validation(other),
        }
    }
}

impl From<ValidationError> for EngineError {
    fn from(err: ValidationError) -> Self {
        EngineError::Validation(CoreError::Validation(err))
    }
}

impl From<DbError> for EngineError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Invalid(validation) => validation.into(),
            other => EngineError::Database(other),
        }
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::Config(err.to_string())
    }
}

impl From<toml::de::Error> for EngineError {
    fn from(err: toml::de::Error) -> Self {
        EngineError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for EngineError {
    fn from(err: toml::ser::Error) -> Self {
        EngineError::Config(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl EngineError {
    /// The category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Reservation(_) => ErrorKind::Resource,
            EngineError::Campaign(_)
            | EngineError::Validation(_)
            | EngineError::NotAuthenticated
            | EngineError::LineNotFound { .. }
            | EngineError::EmptyCart
            | EngineError::StaleCheckout => ErrorKind::Validation,
            EngineError::Database(_) | EngineError::Config(_) => ErrorKind::Infrastructure,
        }
    }

    /// Returns true if the caller can retry or adjust the request and
    /// expect it to go through.
    ///
    /// ## Recoverable
    /// - Every validation and resource error
    /// - A busy or exhausted database
    ///
    /// ## Not Recoverable
    /// - Configuration errors
    /// - Corrupt data, failed migrations, internal database errors
    pub fn is_recoverable(&self) -> bool {
        match self {
            EngineError::Database(db) => matches!(
                db,
                DbError::PoolExhausted | DbError::TransactionFailed(_) | DbError::ConnectionFailed(_)
            ),
            EngineError::Config(_) => false,
            _ => true,
        }
    }

    /// Text to show the shopper.
    ///
    /// Infrastructure details are logged here and replaced by a generic
    /// message.
    pub fn user_message(&self) -> String {
        match self.kind() {
            ErrorKind::Infrastructure => {
                error!(error = %self, "Engine operation failed");
                GENERIC_FAILURE.to_string()
            }
            _ => self.to_string(),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use basket_core::{Audience, Money};
    use rust_decimal::Decimal;

    #[test]
    fn test_kinds() {
        let stock = EngineError::from(ReservationFailure::NotAvailable {
            product_id: "oil".into(),
            unit: UnitType::Piece,
        });
        assert_eq!(stock.kind(), ErrorKind::Resource);
        assert!(stock.is_recoverable());

        let db = EngineError::from(DbError::Internal("disk".into()));
        assert_eq!(db.kind(), ErrorKind::Infrastructure);
        assert!(!db.is_recoverable());
        assert!(EngineError::from(DbError::PoolExhausted).is_recoverable());
    }

    #[test]
    fn test_core_errors_are_unwrapped() {
        let err = EngineError::from(CoreError::Campaign(CampaignRejection::Expired));
        assert!(matches!(err, EngineError::Campaign(CampaignRejection::Expired)));

        let err = EngineError::from(CoreError::LineNotFound {
            product_id: "tea".into(),
            unit: UnitType::Gram,
        });
        assert!(matches!(err, EngineError::LineNotFound { .. }));

        let err = EngineError::from(DbError::Invalid(ValidationError::MustBePositive {
            field: "quantity".into(),
        }));
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_user_messages() {
        let err = EngineError::from(ReservationFailure::InsufficientStock {
            product_id: "oil".into(),
            unit: UnitType::Piece,
            available: Decimal::from(6),
            requested: Decimal::from(7),
        });
        assert_eq!(
            err.user_message(),
            "Insufficient stock: only 6 piece available, requested 7"
        );

        let err = EngineError::from(CampaignRejection::AudienceMismatch {
            required: Audience::Dealer,
        });
        assert_eq!(
            err.user_message(),
            "This campaign is only valid for dealer customers"
        );

        let err = EngineError::from(CampaignRejection::BelowMinimum {
            minimum: Money::from_cents(10000),
            missing: Money::from_cents(2550),
        });
        assert_eq!(
            err.user_message(),
            "Minimum cart value for this campaign is 100.00 (25.50 more needed)"
        );

        let err = EngineError::from(DbError::QueryFailed("near SELECT: syntax error".into()));
        assert_eq!(err.user_message(), GENERIC_FAILURE);
    }
}
