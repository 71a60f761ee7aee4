//! # Cart Lines & Guest Cart
//!
//! Line items and the in-memory cart used before sign-in.
//!
//! ## Line Identity
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Lines are unique by (product_id, unit):                               │
//! │                                                                         │
//! │   add coffee 500 gram  ──► [coffee/gram 500]                           │
//! │   add coffee 250 gram  ──► [coffee/gram 750]          (merged)         │
//! │   add coffee 1 kilogram ─► [coffee/gram 750, coffee/kilogram 1]        │
//! │                                                                         │
//! │   update coffee/gram 0 ──► [coffee/kilogram 1]        (≤ 0 removes)    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A guest cart holds no reservations. On sign-in its lines are replayed
//! through the signed-in cart, where stock is claimed.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::ProductUnitKey;
use crate::units::{display_quantity, UnitType};
use crate::validation::{validate_cart_size, validate_line, validate_quantity};
use crate::{MAX_CART_LINES, MAX_LINE_QUANTITY};

// =============================================================================
// Cart Line
// =============================================================================

/// One product, in one unit, in a cart.
///
/// ## Design Notes
/// - `unit_price` is frozen when the line is first added
/// - `unit_count` is the nominal pack size shown next to the name
///   ("6 x 1 L"); stock math never uses it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CartLine {
    pub product_id: String,

    /// Product name at time of adding (frozen).
    pub name: String,

    pub unit: UnitType,

    #[ts(as = "Option<String>")]
    pub unit_count: Option<Decimal>,

    /// Price per one `unit`.
    pub unit_price: Money,

    /// Quantity in `unit`.
    #[ts(as = "String")]
    pub quantity: Decimal,

    #[ts(as = "Option<String>")]
    pub min_order_quantity: Option<Decimal>,
}

impl CartLine {
    pub fn new(
        product_id: impl Into<String>,
        name: impl Into<String>,
        unit: UnitType,
        unit_price: Money,
        quantity: Decimal,
    ) -> Self {
        Self {
            product_id: product_id.into(),
            name: name.into(),
            unit,
            unit_count: None,
            unit_price,
            quantity,
            min_order_quantity: None,
        }
    }

    /// Sets the minimum order quantity.
    pub fn with_min_order(mut self, minimum: Decimal) -> Self {
        self.min_order_quantity = Some(minimum);
        self
    }

    /// Sets the nominal pack size.
    pub fn with_unit_count(mut self, count: Decimal) -> Self {
        self.unit_count = Some(count);
        self
    }

    /// The stock key this line draws from.
    pub fn key(&self) -> ProductUnitKey {
        ProductUnitKey::new(self.product_id.clone(), self.unit)
    }

    /// Whether this line is for `product_id` in `unit`.
    #[inline]
    pub fn matches(&self, product_id: &str, unit: UnitType) -> bool {
        self.product_id == product_id && self.unit == unit
    }

    /// unit_price × quantity, rounded to the cent.
    pub fn line_total(&self) -> Money {
        self.unit_price.multiply_quantity(self.quantity)
    }

    /// Quantity as shown to the shopper ("750 Gr", "1.5 Kg").
    pub fn display_quantity(&self) -> String {
        display_quantity(self.quantity, self.unit.as_str())
    }
}

/// Σ line totals.
pub fn subtotal(lines: &[CartLine]) -> Money {
    lines.iter().map(CartLine::line_total).sum()
}

/// Σ quantities.
pub fn total_quantity(lines: &[CartLine]) -> Decimal {
    lines.iter().map(|l| l.quantity).sum()
}

// =============================================================================
// Cart Limits
// =============================================================================

/// Size limits applied to every cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLimits {
    /// Maximum distinct lines.
    pub max_lines: usize,
    /// Maximum quantity per line (gram lines in kilograms).
    pub max_line_quantity: i64,
}

impl Default for CartLimits {
    fn default() -> Self {
        Self {
            max_lines: MAX_CART_LINES,
            max_line_quantity: MAX_LINE_QUANTITY,
        }
    }
}

// =============================================================================
// Guest Cart
// =============================================================================

/// The cart of a shopper who has not signed in.
///
/// ## Invariants
/// - Lines are unique by (product_id, unit)
/// - Every line quantity is > 0 and ≥ its minimum order quantity
/// - At most `limits.max_lines` lines
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuestCart {
    lines: Vec<CartLine>,

    /// When the cart was created or last cleared.
    created_at: DateTime<Utc>,

    #[serde(skip, default)]
    limits: CartLimits,
}

impl Default for GuestCart {
    fn default() -> Self {
        Self::new()
    }
}

impl GuestCart {
    /// Creates an empty cart with the default limits.
    pub fn new() -> Self {
        Self::with_limits(CartLimits::default())
    }

    pub fn with_limits(limits: CartLimits) -> Self {
        Self {
            lines: Vec::new(),
            created_at: Utc::now(),
            limits,
        }
    }

    /// Adds a line, or increases the quantity of the matching line.
    ///
    /// The merged quantity is validated as a whole. On error the cart is
    /// unchanged.
    pub fn add_item(&mut self, line: CartLine) -> CoreResult<()> {
        validate_line(&line, &self.limits)?;

        if let Some(existing) = self
            .lines
            .iter_mut()
            .find(|l| l.matches(&line.product_id, line.unit))
        {
            let merged = existing.quantity + line.quantity;
            validate_quantity(
                merged,
                existing.unit,
                existing.min_order_quantity,
                &self.limits,
            )?;
            existing.quantity = merged;
            return Ok(());
        }

        validate_cart_size(self.lines.len(), &self.limits)?;
        self.lines.push(line);
        Ok(())
    }

    /// Sets a line's quantity. `quantity ≤ 0` removes the line.
    pub fn update_quantity(
        &mut self,
        product_id: &str,
        unit: UnitType,
        quantity: Decimal,
    ) -> CoreResult<()> {
        if quantity <= Decimal::ZERO {
            self.remove_item(product_id, unit);
            return Ok(());
        }

        let line = self
            .lines
            .iter_mut()
            .find(|l| l.matches(product_id, unit))
            .ok_or_else(|| CoreError::LineNotFound {
                product_id: product_id.to_string(),
                unit,
            })?;

        validate_quantity(quantity, unit, line.min_order_quantity, &self.limits)?;
        line.quantity = quantity;
        Ok(())
    }

    /// Removes a line. Returns whether one was removed.
    pub fn remove_item(&mut self, product_id: &str, unit: UnitType) -> bool {
        let before = self.lines.len();
        self.lines.retain(|l| !l.matches(product_id, unit));
        self.lines.len() != before
    }

    /// Clears all lines.
    pub fn clear(&mut self) {
        self.lines.clear();
        self.created_at = Utc::now();
    }

    /// Σ unit_price × quantity.
    pub fn total(&self) -> Money {
        subtotal(&self.lines)
    }

    /// Σ quantity across lines.
    pub fn count(&self) -> Decimal {
        total_quantity(&self.lines)
    }

    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    /// Takes the lines out, e.g. to merge them on sign-in.
    pub fn into_lines(self) -> Vec<CartLine> {
        self.lines
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
