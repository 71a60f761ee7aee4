//! # Reservation Rules
//!
//! Pure claim assessment and lazy expiry. The engine reads stock and
//! existing reservations inside a write transaction, then asks
//! [`assess_claim`] whether the caller's desired quantity fits.
//!
//! ## Claim Math
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  stock (key unit)          10                                           │
//! │  reserved_by_others         4   (non-expired, excluding caller)         │
//! │  ─────────────────────────────                                          │
//! │  available                  6                                           │
//! │                                                                         │
//! │  existing (caller)          2                                           │
//! │  desired                    5   → net claim = 3                         │
//! │                                                                         │
//! │  desired ≤ available ✔  → upsert caller's row to 5                      │
//! │                                                                         │
//! │  Σ non-expired reservations ≤ stock holds after every accepted claim   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Lazy Expiry
//! A reservation older than the TTL no longer counts, whether or not a
//! sweep has deleted it yet.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;

use crate::error::ReservationFailure;
use crate::types::{ProductUnitKey, Reservation, StockRecord};

/// Outcome of an accepted claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClaimAssessment {
    /// Stock left for this caller before the claim, in the key's unit.
    pub available: Decimal,
    /// Caller's current reservation (zero if none).
    pub existing: Decimal,
    /// `desired - existing`; negative when the caller shrinks a claim.
    pub net_claim: Decimal,
}

/// Decides whether `desired` may be reserved for `key`.
///
/// `stock` is `None` when no record exists. `reserved_by_others` must
/// already exclude expired rows and the caller's own row.
pub fn assess_claim(
    key: &ProductUnitKey,
    stock: Option<&StockRecord>,
    reserved_by_others: Decimal,
    existing: Decimal,
    desired: Decimal,
) -> Result<ClaimAssessment, ReservationFailure> {
    let stock = match stock {
        Some(record) if record.is_active => record,
        _ => {
            return Err(ReservationFailure::NotAvailable {
                product_id: key.product_id.clone(),
                unit: key.unit,
            })
        }
    };

    let available = (stock.available_in_key_unit() - reserved_by_others).max(Decimal::ZERO);

    if desired > available {
        return Err(ReservationFailure::InsufficientStock {
            product_id: key.product_id.clone(),
            unit: key.unit,
            available,
            requested: desired,
        });
    }

    Ok(ClaimAssessment {
        available,
        existing,
        net_claim: desired - existing,
    })
}

/// When a reservation created at `created_at` stops counting.
#[inline]
pub fn expires_at(created_at: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    created_at + ttl
}

/// Whether a reservation created at `created_at` has expired at `now`.
#[inline]
pub fn is_expired(created_at: DateTime<Utc>, now: DateTime<Utc>, ttl: Duration) -> bool {
    now >= expires_at(created_at, ttl)
}

/// Oldest `created_at` still counted at `now`. Rows created at or before
/// this instant are expired.
#[inline]
pub fn expiry_cutoff(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    now - ttl
}

/// Σ quantity of non-expired reservations, optionally skipping one
/// customer's row.
pub fn active_total<'a, I>(
    reservations: I,
    now: DateTime<Utc>,
    ttl: Duration,
    excluding_customer: Option<&str>,
) -> Decimal
where
    I: IntoIterator<Item = &'a Reservation>,
{
    reservations
        .into_iter()
        .filter(|r| !is_expired(r.created_at, now, ttl))
        .filter(|r| excluding_customer != Some(r.customer_id.as_str()))
        .map(|r| r.quantity)
        .sum()
}

// =============================================================================
// Unit Tests
// =============================================================================
