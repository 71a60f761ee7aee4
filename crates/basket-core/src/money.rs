//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  In floating point:                                                     │
//! │    100 × 0.9 × 0.95 = 85.49999999999999   ❌ WRONG!                     │
//! │                                                                         │
//! │  OUR SOLUTION: Integer Cents                                            │
//! │    10000 cents → 9000 cents → 8550 cents                                │
//! │    Every discount step rounds once, to the nearest cent                 │
//! │                                                                         │
//! │  Quantities are NOT integers here (1.5 kg of coffee), so line totals   │
//! │  go through `multiply_quantity(Decimal)` and round exactly once.       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use basket_core::money::Money;
//! use rust_decimal::Decimal;
//!
//! let price = Money::from_cents(1099); // 10.99
//!
//! let doubled = price * 2;                        // 21.98
//! let total = price + Money::from_cents(500);     // 15.99
//! let beans = price.multiply_quantity(Decimal::new(15, 1)); // 1.5 kg
//! assert_eq!(beans.cents(), 1649);
//! ```

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::types::DiscountRate;

// =============================================================================
// Money Type
// =============================================================================

/// Represents a monetary value in the smallest currency unit (cents).
///
/// ## Design Decisions
/// - **i64 (signed)**: Allows negative intermediate values (flat discounts
///   larger than the cart) before the payable is floored at zero
/// - **Single field tuple struct**: Zero-cost abstraction over i64
/// - **Derives**: Full serde support for JSON serialization
///
/// ## User Workflow Context
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │                    Where Money is Used                                  │
/// │                                                                         │
/// │  CartLine.unit_price ──► × quantity ──► line total ──► subtotal        │
/// │                                                                         │
/// │  subtotal ──► tiered OR campaign discount ──► payable (≥ 0)            │
/// │                                                                         │
/// │  Campaign.min_cart_value, max_discount_amount, flat amount             │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// 1099 → 10.99
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Creates Money from a decimal amount in major units, rounding half
    /// away from zero to the nearest cent.
    ///
    /// ## Example
    /// ```rust
    /// use basket_core::money::Money;
    /// use rust_decimal::Decimal;
    ///
    /// assert_eq!(Money::from_decimal(Decimal::new(85505, 3)).cents(), 8551);
    /// ```
    pub fn from_decimal(amount: Decimal) -> Self {
        Money(round_to_cents(amount * Decimal::ONE_HUNDRED))
    }

    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    #[inline]
    pub const fn major(&self) -> i64 {
        self.0 / 100
    }

    /// Cents part, always 0-99.
    #[inline]
    pub const fn minor_part(&self) -> i64 {
        (self.0 % 100).abs()
    }

    /// Returns the value as an exact decimal in major units (scale 2).
    #[inline]
    pub fn to_decimal(&self) -> Decimal {
        Decimal::new(self.0, 2)
    }

    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Returns the value, or zero when negative.
    ///
    /// ## User Workflow
    /// ```text
    /// Subtotal: 30.00, flat campaign discount: 50.00
    ///      │
    ///      ▼
    /// 30.00 - 50.00 = -20.00
    ///      │
    ///      ▼
    /// floor_zero() ← THIS FUNCTION
    ///      │
    ///      ▼
    /// Payable: 0.00
    /// ```
    #[inline]
    pub const fn floor_zero(&self) -> Self {
        if self.0 < 0 {
            Money(0)
        } else {
            *self
        }
    }

    /// Returns `rate` of this amount, rounded half up to the nearest cent.
    ///
    /// ## Implementation
    /// Integer math: `(amount * bps + 5000) / 10000`. The +5000 provides
    /// rounding (5000/10000 = 0.5). i128 prevents overflow.
    ///
    /// ## Example
    /// ```rust
    /// use basket_core::money::Money;
    /// use basket_core::types::DiscountRate;
    ///
    /// let subtotal = Money::from_cents(20000);      // 200.00
    /// let rate = DiscountRate::from_bps(1000);      // 10%
    /// assert_eq!(subtotal.percentage(rate).cents(), 2000);
    /// ```
    pub fn percentage(&self, rate: DiscountRate) -> Money {
        let cents = (self.0 as i128 * rate.bps() as i128 + 5000) / 10000;
        Money::from_cents(cents as i64)
    }

    /// Applies a percentage discount and returns the discounted amount.
    ///
    /// ## Example
    /// ```rust
    /// use basket_core::money::Money;
    /// use basket_core::types::DiscountRate;
    ///
    /// let subtotal = Money::from_cents(10000);
    /// let discounted = subtotal.apply_discount(DiscountRate::from_bps(1000));
    /// assert_eq!(discounted.cents(), 9000);
    /// ```
    pub fn apply_discount(&self, rate: DiscountRate) -> Money {
        *self - self.percentage(rate)
    }

    /// Multiplies money by an exact decimal quantity.
    ///
    /// Rounds half away from zero to the nearest cent.
    ///
    /// ## Example
    /// ```rust
    /// use basket_core::money::Money;
    /// use rust_decimal::Decimal;
    ///
    /// let per_kg = Money::from_cents(4000);                  // 40.00 / kg
    /// let line = per_kg.multiply_quantity(Decimal::new(25, 2)); // 0.25 kg
    /// assert_eq!(line.cents(), 1000);
    /// ```
    ///
    /// ## User Workflow
    /// ```text
    /// Product: Olive oil 12.99 / kg
    /// Quantity: 1.5 kg
    ///      │
    ///      ▼
    /// multiply_quantity(1.5) ← THIS FUNCTION
    ///      │
    ///      ▼
    /// Line Total: 19.485 → 19.49
    /// ```
    pub fn multiply_quantity(&self, qty: Decimal) -> Self {
        Money(round_to_cents(Decimal::from(self.0) * qty))
    }
}

/// Rounds a value already expressed in cents, saturating at the i64 range.
fn round_to_cents(cents: Decimal) -> i64 {
    let rounded = cents.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    rounded.to_i64().unwrap_or(if rounded.is_sign_negative() {
        i64::MIN
    } else {
        i64::MAX
    })
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Display shows the amount with two decimals and no currency symbol.
///
/// ## Note
/// The storefront formats currency itself. This is for logs and messages.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}{}.{:02}", sign, self.major().abs(), self.minor_part())
    }
}

/// Default money is zero.
impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

/// Multiplication by i64.
impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
