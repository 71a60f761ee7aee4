//! # basket-core: Pure Business Logic for Basket
//!
//! This crate holds the pricing and stock-claim rules of the storefront
//! cart as pure functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Basket Architecture                              │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    Storefront (TypeScript)                      │   │
//! │  │    Product card ──► Cart ──► Campaign box ──► Checkout          │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    basket-engine                                │   │
//! │  │    CartStore, ReservationManager, CampaignService               │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ basket-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌──────────┐ ┌──────────┐ ┌──────────┐ ┌──────────────────┐  │   │
//! │  │   │  units   │ │ discount │ │ campaign │ │ reservation/cart │  │   │
//! │  │   │ g ⇄ kg   │ │ tiered   │ │ rules    │ │ claim, guest     │  │   │
//! │  │   └──────────┘ └──────────┘ └──────────┘ └──────────────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO CLOCK • PURE FUNCTIONS             │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    basket-db (Database Layer)                   │   │
//! │  │              SQLite queries, migrations, repositories           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (StockRecord, Reservation, Campaign, ...)
//! - [`money`] - Money type with integer arithmetic
//! - [`units`] - Unit parsing, conversion and display
//! - [`discount`] - Tiered and campaign discount arithmetic
//! - [`campaign`] - Campaign applicability rules
//! - [`reservation`] - Stock claim assessment and lazy expiry
//! - [`cart`] - Cart lines and the guest cart
//! - [`error`] - Domain error types
//! - [`validation`] - Business rule validation
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: Callers pass `now`; nothing reads the clock
//! 2. **No I/O**: Database, network, file system access is FORBIDDEN here
//! 3. **Integer Money, Exact Quantities**: cents in `i64`, quantities in `Decimal`
//! 4. **Explicit Errors**: All errors are typed, never strings or panics
//!
//! ## Example Usage
//!
//! ```rust
//! use basket_core::discount::apply_tiered;
//! use basket_core::money::Money;
//! use basket_core::types::DiscountRate;
//!
//! let price = Money::from_cents(10000);
//! let result = apply_tiered(price, DiscountRate::from_bps(1000), DiscountRate::from_bps(500));
//!
//! assert_eq!(result.final_price.cents(), 8550);
//! assert_eq!(result.effective_rate.bps(), 1450);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod campaign;
pub mod cart;
pub mod discount;
pub mod error;
pub mod money;
pub mod reservation;
pub mod types;
pub mod units;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use cart::{CartLimits, CartLine, GuestCart};
pub use error::{CampaignRejection, CoreError, ReservationFailure, ValidationError};
pub use money::Money;
pub use types::*;
pub use units::UnitType;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum distinct lines allowed in a single cart.
pub const MAX_CART_LINES: usize = 100;

/// Maximum quantity of a single line.
///
/// Gram lines are measured in kilograms against this limit.
pub const MAX_LINE_QUANTITY: i64 = 999;

/// Hours a reservation keeps counting after it was last written.
pub const RESERVATION_TTL_HOURS: i64 = 24;
