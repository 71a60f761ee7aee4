//! # Validation Module
//!
//! Input validation utilities for Basket.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Storefront (TypeScript)                                      │
//! │  ├── Basic format checks (empty, length)                               │
//! │  └── Immediate shopper feedback                                        │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: basket-engine / GuestCart (Rust)                             │
//! │  └── THIS MODULE: quantity, price, cart size, codes                    │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── NOT NULL / CHECK constraints                                      │
//! │  └── PRIMARY KEY (customer, product, unit)                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use basket_core::cart::CartLimits;
//! use basket_core::units::UnitType;
//! use basket_core::validation::{validate_product_id, validate_quantity};
//! use rust_decimal::Decimal;
//!
//! validate_product_id("olive-oil-1l").unwrap();
//! validate_quantity(Decimal::from(2), UnitType::Piece, None, &CartLimits::default()).unwrap();
//! ```

use rust_decimal::Decimal;

use crate::campaign::MAX_CODE_LENGTH;
use crate::cart::{CartLimits, CartLine};
use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::types::DiscountRate;
use crate::units::UnitType;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Longest product identifier accepted.
const MAX_PRODUCT_ID_LENGTH: usize = 128;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a product identifier.
///
/// ## Example
/// ```rust
/// use basket_core::validation::validate_product_id;
///
/// assert!(validate_product_id("coffee-beans").is_ok());
/// assert!(validate_product_id("  ").is_err());
/// ```
pub fn validate_product_id(product_id: &str) -> ValidationResult<()> {
    let product_id = product_id.trim();

    if product_id.is_empty() {
        return Err(ValidationError::Required {
            field: "product_id".to_string(),
        });
    }

    if product_id.len() > MAX_PRODUCT_ID_LENGTH {
        return Err(ValidationError::TooLong {
            field: "product_id".to_string(),
            max: MAX_PRODUCT_ID_LENGTH,
        });
    }

    Ok(())
}

/// Validates a typed campaign code and returns it normalized.
///
/// ## Rules
/// - Must not be empty after trimming
/// - At most 64 characters
/// - Letters, digits, hyphens and underscores only
pub fn validate_code(code: &str) -> ValidationResult<String> {
    let code = code.trim();

    if code.is_empty() {
        return Err(ValidationError::Required {
            field: "code".to_string(),
        });
    }

    if code.len() > MAX_CODE_LENGTH {
        return Err(ValidationError::TooLong {
            field: "code".to_string(),
            max: MAX_CODE_LENGTH,
        });
    }

    if !code
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::InvalidFormat {
            field: "code".to_string(),
            reason: "must contain only letters, numbers, hyphens, and underscores".to_string(),
        });
    }

    Ok(crate::campaign::normalize_code(code))
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a line quantity.
///
/// ## Rules
/// - Must be positive (callers turn `≤ 0` into a removal first)
/// - At most `limits.max_line_quantity`; gram lines are measured by
///   their kilogram equivalent
/// - At least `min_order_quantity`, when one is set
pub fn validate_quantity(
    quantity: Decimal,
    unit: UnitType,
    min_order_quantity: Option<Decimal>,
    limits: &CartLimits,
) -> CoreResult<()> {
    if quantity <= Decimal::ZERO {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        }
        .into());
    }

    let measured = match unit {
        UnitType::Gram => unit.convert_to(quantity, UnitType::Kilogram),
        _ => quantity,
    };
    if measured > Decimal::from(limits.max_line_quantity) {
        return Err(CoreError::QuantityTooLarge {
            requested: quantity,
            max: limits.max_line_quantity,
        });
    }

    if let Some(minimum) = min_order_quantity {
        if quantity < minimum {
            return Err(CoreError::BelowMinimumOrder {
                minimum,
                requested: quantity,
            });
        }
    }

    Ok(())
}

/// Validates a unit price. Zero is allowed (free samples).
pub fn validate_price(price: Money) -> ValidationResult<()> {
    if price.is_negative() {
        return Err(ValidationError::OutOfRange {
            field: "unit_price".to_string(),
            min: 0,
            max: i64::MAX,
        });
    }
    Ok(())
}

/// Validates a stored discount rate (0% to 100%).
pub fn validate_rate(field: &str, rate: DiscountRate) -> ValidationResult<()> {
    if rate.bps() > DiscountRate::FULL.bps() {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: DiscountRate::FULL.bps() as i64,
        });
    }
    Ok(())
}

/// Validates that one more distinct line fits in the cart.
pub fn validate_cart_size(current_lines: usize, limits: &CartLimits) -> CoreResult<()> {
    if current_lines >= limits.max_lines {
        return Err(CoreError::CartTooLarge {
            max: limits.max_lines,
        });
    }
    Ok(())
}

/// Validates everything about a line except cart size.
pub fn validate_line(line: &CartLine, limits: &CartLimits) -> CoreResult<()> {
    validate_product_id(&line.product_id)?;
    validate_price(line.unit_price)?;
    validate_quantity(line.quantity, line.unit, line.min_order_quantity, limits)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_product_id() {
        assert!(validate_product_id("abc-123").is_ok());
        assert!(matches!(
            validate_product_id(""),
            Err(ValidationError::Required { .. })
        ));
        assert!(matches!(
            validate_product_id(&"x".repeat(200)),
            Err(ValidationError::TooLong { max: 128, .. })
        ));
    }

    #[test]
    fn test_validate_code() {
        assert_eq!(validate_code(" summer10 ").unwrap(), "SUMMER10");
        assert!(validate_code("").is_err());
        assert!(matches!(
            validate_code("BAD CODE"),
            Err(ValidationError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn test_validate_quantity() {
        let limits = CartLimits::default();

        assert!(validate_quantity(Decimal::ONE, UnitType::Piece, None, &limits).is_ok());
        assert!(matches!(
            validate_quantity(Decimal::ZERO, UnitType::Piece, None, &limits),
            Err(CoreError::Validation(ValidationError::MustBePositive { .. }))
        ));
        assert!(matches!(
            validate_quantity(Decimal::from(1000), UnitType::Piece, None, &limits),
            Err(CoreError::QuantityTooLarge { max: 999, .. })
        ));
        // 1500 g is 1.5 kg: fine.
        assert!(validate_quantity(Decimal::from(1500), UnitType::Gram, None, &limits).is_ok());
        assert!(matches!(
            validate_quantity(
                Decimal::ONE,
                UnitType::Kilogram,
                Some(Decimal::from(2)),
                &limits
            ),
            Err(CoreError::BelowMinimumOrder { .. })
        ));
    }

    #[test]
    fn test_validate_price_and_rate() {
        assert!(validate_price(Money::zero()).is_ok());
        assert!(validate_price(Money::from_cents(-1)).is_err());
        assert!(validate_rate("group_rate", DiscountRate::from_bps(10_000)).is_ok());
        assert!(validate_rate("group_rate", DiscountRate::from_bps(10_001)).is_err());
    }

    #[test]
    fn test_validate_cart_size() {
        let limits = CartLimits {
            max_lines: 2,
            max_line_quantity: 999,
        };
        assert!(validate_cart_size(1, &limits).is_ok());
        assert!(matches!(
            validate_cart_size(2, &limits),
            Err(CoreError::CartTooLarge { max: 2 })
        ));
    }
}
