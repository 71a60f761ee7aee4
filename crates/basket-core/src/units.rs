//! # Units Module
//!
//! Unit handling for stock and cart quantities.
//!
//! ## Unit Families
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Unit Compatibility                              │
//! │                                                                         │
//! │   COUNT                         MASS                                    │
//! │   ─────                         ────                                    │
//! │   piece ◄──► piece              gram ◄──── ×1000 ────► kilogram         │
//! │                                                                         │
//! │   piece ◄──╳──► gram/kilogram   (never convertible)                     │
//! │                                                                         │
//! │   Spellings accepted: g, gr, gram, grams / kg, kilo, kilogram /         │
//! │                       pc, pcs, piece, pieces, adet                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Fallback Rule
//! The string-based [`convert`] never fails. An unknown spelling or a
//! piece/mass pair returns the amount unchanged, because the same function
//! also feeds display-only code paths.
//!
//! ## Usage
//! ```rust
//! use basket_core::units::{convert, compatible};
//! use rust_decimal::Decimal;
//!
//! let kg = convert(Decimal::new(250, 0), "gr", "kg");
//! assert_eq!(kg, Decimal::new(25, 2)); // 0.25
//!
//! assert!(compatible("gram", "KG"));
//! assert!(!compatible("piece", "gram"));
//! ```

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::ValidationError;

/// Grams per kilogram.
const GRAMS_PER_KILOGRAM: i64 = 1000;

// =============================================================================
// Unit Type
// =============================================================================

/// The unit a product is sold or stocked in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum UnitType {
    /// Counted items.
    Piece,
    /// Mass in grams.
    Gram,
    /// Mass in kilograms.
    Kilogram,
}

impl UnitType {
    /// All supported units, in display order.
    pub const ALL: [UnitType; 3] = [UnitType::Piece, UnitType::Gram, UnitType::Kilogram];

    /// Normalizes a unit spelling to its canonical unit.
    ///
    /// Matching is case-insensitive and ignores surrounding whitespace.
    /// Returns `None` for spellings we don't recognize.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "piece" | "pieces" | "pc" | "pcs" | "adet" => Some(UnitType::Piece),
            "gram" | "grams" | "gr" | "g" => Some(UnitType::Gram),
            "kilogram" | "kilograms" | "kilo" | "kg" => Some(UnitType::Kilogram),
            _ => None,
        }
    }

    /// Canonical lowercase name (also the database representation).
    pub const fn as_str(&self) -> &'static str {
        match self {
            UnitType::Piece => "piece",
            UnitType::Gram => "gram",
            UnitType::Kilogram => "kilogram",
        }
    }

    /// Returns true for gram and kilogram.
    pub const fn is_mass(&self) -> bool {
        matches!(self, UnitType::Gram | UnitType::Kilogram)
    }

    /// Grams represented by one of this unit. `None` for counted units.
    fn grams(&self) -> Option<Decimal> {
        match self {
            UnitType::Piece => None,
            UnitType::Gram => Some(Decimal::ONE),
            UnitType::Kilogram => Some(Decimal::from(GRAMS_PER_KILOGRAM)),
        }
    }

    /// Checks whether quantities of `self` can be expressed in `other`.
    pub fn is_compatible_with(&self, other: UnitType) -> bool {
        match (self, other) {
            (UnitType::Piece, UnitType::Piece) => true,
            (UnitType::Piece, _) | (_, UnitType::Piece) => false,
            _ => true,
        }
    }

    /// Converts `amount` from this unit into `target`.
    ///
    /// Incompatible pairs return `amount` unchanged.
    pub fn convert_to(&self, amount: Decimal, target: UnitType) -> Decimal {
        if *self == target {
            return amount;
        }

        match (self.grams(), target.grams()) {
            (Some(from), Some(to)) => amount * from / to,
            _ => amount,
        }
    }

    /// Short label used in quantity displays.
    pub const fn short_label(&self) -> &'static str {
        match self {
            UnitType::Piece => "Pcs",
            UnitType::Gram => "Gr",
            UnitType::Kilogram => "Kg",
        }
    }
}

impl fmt::Display for UnitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UnitType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        UnitType::parse(s).ok_or_else(|| ValidationError::InvalidFormat {
            field: "unit".to_string(),
            reason: format!("unknown unit '{}'", s),
        })
    }
}

// =============================================================================
// String-Based Conversion
// =============================================================================

/// Converts `amount` between two unit spellings.
///
/// ## Behavior
/// - Spellings are normalized first (`gr` → gram, `kg` → kilogram)
/// - Unknown spellings or piece/mass pairs return `amount` unchanged
///
/// ## Example
/// ```rust
/// use basket_core::units::convert;
/// use rust_decimal::Decimal;
///
/// assert_eq!(convert(Decimal::new(15, 1), "kg", "g"), Decimal::from(1500));
/// assert_eq!(convert(Decimal::from(3), "piece", "kg"), Decimal::from(3));
/// assert_eq!(convert(Decimal::from(3), "liter", "kg"), Decimal::from(3));
/// ```
pub fn convert(amount: Decimal, from: &str, to: &str) -> Decimal {
    match (UnitType::parse(from), UnitType::parse(to)) {
        (Some(from), Some(to)) => from.convert_to(amount, to),
        _ => amount,
    }
}

/// Checks whether two unit spellings can be converted into each other.
///
/// Used to gate stock-record edits: the stock unit must be compatible with
/// the unit the product is listed in.
pub fn compatible(a: &str, b: &str) -> bool {
    match (UnitType::parse(a), UnitType::parse(b)) {
        (Some(a), Some(b)) => a.is_compatible_with(b),
        _ => false,
    }
}

/// Units a product listed in `base` may be sold in.
pub fn unit_options(base: UnitType) -> &'static [UnitType] {
    match base {
        UnitType::Piece => &[UnitType::Piece],
        UnitType::Gram | UnitType::Kilogram => &[UnitType::Gram, UnitType::Kilogram],
    }
}

/// Remaining stock after a sale, floored at zero.
///
/// The sold amount is converted into the stock unit first, so 250 g sold
/// from 10 kg of stock leaves 9.75 kg.
pub fn stock_after_sale(
    stock: Decimal,
    stock_unit: UnitType,
    sold: Decimal,
    sale_unit: UnitType,
) -> Decimal {
    let sold_in_stock_units = sale_unit.convert_to(sold, stock_unit);
    (stock - sold_in_stock_units).max(Decimal::ZERO)
}

// =============================================================================
// Display Helpers
// =============================================================================

/// Formats a quantity the way a shopper reads it.
///
/// Whole kilograms entered in grams are shown in Kg; fractions of a
/// kilogram are shown in Gr.
pub fn display_quantity(amount: Decimal, unit: &str) -> String {
    let grams_per_kg = Decimal::from(GRAMS_PER_KILOGRAM);

    match UnitType::parse(unit) {
        Some(UnitType::Piece) => format!("{} Pcs", amount.normalize()),
        Some(UnitType::Gram) => {
            if amount >= grams_per_kg && (amount % grams_per_kg).is_zero() {
                format!("{} Kg", (amount / grams_per_kg).normalize())
            } else {
                format!("{} Gr", amount.normalize())
            }
        }
        Some(UnitType::Kilogram) => {
            if amount < Decimal::ONE {
                format!("{} Gr", (amount * grams_per_kg).normalize())
            } else {
                format!("{} Kg", amount.normalize())
            }
        }
        None => format!("{} {}", amount.normalize(), unit),
    }
}

/// Formats a stock level for inventory screens.
pub fn display_stock(stock: Decimal, unit: &str) -> String {
    let grams_per_kg = Decimal::from(GRAMS_PER_KILOGRAM);

    match UnitType::parse(unit) {
        Some(UnitType::Piece) => format!("{} Pcs", stock.floor()),
        Some(UnitType::Gram) => {
            if stock >= grams_per_kg {
                format!("{:.3} Kg ({:.1} Gr)", stock / grams_per_kg, stock)
            } else {
                format!("{:.1} Gr", stock)
            }
        }
        Some(UnitType::Kilogram) => format!("{:.3} Kg", stock),
        None => format!("{:.2} {}", stock, unit),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
