//! # Repository Module
//!
//! Database repository implementations for Basket.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Pattern Explained                         │
//! │                                                                         │
//! │  Engine service                                                        │
//! │       │                                                                 │
//! │       │  db.reservations().release(customer, &key)                     │
//! │       ▼                                                                 │
//! │  ReservationRepository                                                 │
//! │  ├── release(&self, ...)          ← pooled connection, own statement   │
//! │  └── upsert_in(conn, ...)         ← caller's transaction               │
//! │       │                                                                 │
//! │       │  SQL Query                                                      │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! │                                                                         │
//! │  `*_in(conn, ...)` functions run on a connection the caller owns, so   │
//! │  several repositories can share one BEGIN IMMEDIATE transaction.       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`InventoryRepository`](inventory::InventoryRepository) - Stock records
//! - [`ReservationRepository`](reservation::ReservationRepository) - Stock claims
//! - [`CampaignRepository`](campaign::CampaignRepository) - Campaigns and single-use codes
//! - [`CustomerRepository`](customer::CustomerRepository) - Price groups and tiers
//! - [`CartRepository`](cart::CartRepository) - Persisted cart lines

pub mod campaign;
pub mod cart;
pub mod customer;
pub mod inventory;
pub mod reservation;

use std::str::FromStr;

use rust_decimal::Decimal;

use crate::error::{DbError, DbResult};

/// Reads a decimal stored as TEXT.
pub(crate) fn parse_decimal(field: &str, raw: &str) -> DbResult<Decimal> {
    Decimal::from_str(raw).map_err(|_| DbError::corrupt(field, raw))
}

/// Reads an optional decimal stored as TEXT.
pub(crate) fn parse_optional_decimal(field: &str, raw: Option<&str>) -> DbResult<Option<Decimal>> {
    raw.map(|r| parse_decimal(field, r)).transpose()
}

/// Writes a decimal as TEXT without trailing zeros ("1.50" → "1.5").
pub(crate) fn format_decimal(value: Decimal) -> String {
    value.normalize().to_string()
}
