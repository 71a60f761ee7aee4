//! # Reservation Manager
//!
//! Holds stock for customers while items sit in their carts.
//!
//! ## Locking
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Two Layers of Mutual Exclusion                       │
//! │                                                                         │
//! │  Task A: reserve(oil/piece)      Task B: reserve(oil/piece)            │
//! │       │                               │                                 │
//! │       ▼                               ▼                                 │
//! │  KeyLocks[oil/piece].lock() ◄──── waits here (in-process)              │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  BEGIN IMMEDIATE ◄────────────── other processes wait here             │
//! │  read stock + reservations                                             │
//! │  upsert own row                                                        │
//! │  COMMIT                                                                │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  unlock ───────────────────────► Task B proceeds, sees A's claim       │
//! │                                                                         │
//! │  Task C: reserve(tea/gram) does not wait on oil/piece.                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Invariant: for every key, Σ non-expired reservations ≤ available stock
//! at the moment of the last successful claim.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};

use basket_core::reservation::ClaimAssessment;
use basket_core::{ProductUnitKey, Reservation};
use basket_db::{Database, ReservationRepository, SqliteConnection};

use crate::error::{EngineError, EngineResult};

// =============================================================================
// Key Locks
// =============================================================================

/// One async mutex per product unit key.
#[derive(Debug, Default, Clone)]
pub struct KeyLocks {
    locks: Arc<Mutex<HashMap<ProductUnitKey, Arc<Mutex<()>>>>>,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `key`.
    pub async fn acquire(&self, key: &ProductUnitKey) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.entry(key.clone()).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Waits for exclusive access to every key, in key order so two
    /// callers never wait on each other crosswise.
    pub async fn acquire_many<'a, I>(&self, keys: I) -> Vec<OwnedMutexGuard<()>>
    where
        I: IntoIterator<Item = &'a ProductUnitKey>,
    {
        let mut keys: Vec<&ProductUnitKey> = keys.into_iter().collect();
        keys.sort();
        keys.dedup();

        let mut guards = Vec::with_capacity(keys.len());
        for key in keys {
            guards.push(self.acquire(key).await);
        }
        guards
    }

    /// Drops locks nobody holds or waits for. Returns how many were dropped.
    pub async fn prune(&self) -> usize {
        let mut locks = self.locks.lock().await;
        let before = locks.len();
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        before - locks.len()
    }

    /// Number of keys with a lock entry.
    pub async fn len(&self) -> usize {
        self.locks.lock().await.len()
    }
}

// =============================================================================
// Reservation Manager
// =============================================================================

/// Claims, releases and inspects stock reservations.
///
/// Cloning is cheap; clones share the key locks.
#[derive(Debug, Clone)]
pub struct ReservationManager {
    db: Database,
    locks: KeyLocks,
    ttl: Duration,
}

impl ReservationManager {
    /// Creates a manager whose reservations live for `ttl`.
    pub fn new(db: Database, ttl: Duration) -> Self {
        ReservationManager {
            db,
            locks: KeyLocks::new(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The per-key locks, for callers that claim inside a wider
    /// transaction.
    pub fn locks(&self) -> &KeyLocks {
        &self.locks
    }

    /// Claims `desired` of `key` for `customer_id`, replacing any claim the
    /// customer already holds.
    ///
    /// ## Errors
    /// - `EngineError::Reservation` - not available or not enough stock;
    ///   nothing was written
    /// - `EngineError::Database` - storage failure; nothing was written
    pub async fn reserve(
        &self,
        customer_id: &str,
        key: &ProductUnitKey,
        desired: Decimal,
    ) -> EngineResult<ClaimAssessment> {
        let _guard = self.locks.acquire(key).await;

        let mut tx = self.db.begin_immediate().await?;
        let result = self.claim_in(tx.conn(), customer_id, key, desired, Utc::now()).await;
        tx.finish(result).await
    }

    /// Claims on the caller's connection. The caller must hold the key lock
    /// and an IMMEDIATE transaction.
    pub async fn claim_in(
        &self,
        conn: &mut SqliteConnection,
        customer_id: &str,
        key: &ProductUnitKey,
        desired: Decimal,
        now: DateTime<Utc>,
    ) -> EngineResult<ClaimAssessment> {
        match ReservationRepository::reserve_in(conn, customer_id, key, desired, now, self.ttl)
            .await?
        {
            Ok(assessment) => Ok(assessment),
            Err(failure) => {
                debug!(
                    customer_id = %customer_id,
                    key = %key,
                    desired = %desired,
                    reason = %failure,
                    "Reservation refused"
                );
                Err(EngineError::Reservation(failure))
            }
        }
    }

    /// Deletes the customer's reservation for `key`. Idempotent.
    pub async fn release(&self, customer_id: &str, key: &ProductUnitKey) -> EngineResult<bool> {
        let released = self.db.reservations().release(customer_id, key).await?;
        if released {
            debug!(customer_id = %customer_id, key = %key, "Reservation released");
        }
        Ok(released)
    }

    /// Deletes every reservation the customer holds.
    pub async fn release_all(&self, customer_id: &str) -> EngineResult<u64> {
        let released = self.db.reservations().release_all(customer_id).await?;
        debug!(customer_id = %customer_id, released, "Reservations released");
        Ok(released)
    }

    /// Σ non-expired reservations for `key`.
    pub async fn reserved_total(&self, key: &ProductUnitKey) -> EngineResult<Decimal> {
        Ok(self
            .db
            .reservations()
            .reserved_total(key, Utc::now(), self.ttl)
            .await?)
    }

    /// The customer's reservations, expired ones included.
    pub async fn list_for_customer(&self, customer_id: &str) -> EngineResult<Vec<Reservation>> {
        Ok(self.db.reservations().list_for_customer(customer_id).await?)
    }

    /// Deletes expired reservations and unused key locks.
    pub async fn purge_expired(&self) -> EngineResult<u64> {
        let purged = self
            .db
            .reservations()
            .purge_expired(Utc::now(), self.ttl)
            .await?;
        let pruned = self.locks.prune().await;

        if purged > 0 || pruned > 0 {
            info!(purged, pruned_locks = pruned, "Reservation sweep finished");
        }
        Ok(purged)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use basket_core::{ReservationFailure, StockRecord, UnitType};
    use basket_db::DbConfig;

    async fn manager_with_stock(qty: i64) -> (ReservationManager, ProductUnitKey) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let key = ProductUnitKey::new("olive-oil", UnitType::Piece);
        db.inventory()
            .set_stock(&StockRecord {
                key: key.clone(),
                available_quantity: Decimal::from(qty),
                stock_unit: UnitType::Piece,
                is_active: true,
                updated_at: Utc::now(),
            })
            .await
            .unwrap();
        (ReservationManager::new(db, Duration::hours(24)), key)
    }

    #[tokio::test]
    async fn test_scenario_second_customer_over_asks() {
        let (manager, key) = manager_with_stock(10).await;

        manager.reserve("cust-a", &key, Decimal::from(4)).await.unwrap();
        let err = manager
            .reserve("cust-b", &key, Decimal::from(7))
            .await
            .unwrap_err();

        match err {
            EngineError::Reservation(failure @ ReservationFailure::InsufficientStock { .. }) => {
                assert_eq!(failure.available(), Some(Decimal::from(6)));
            }
            other => panic!("expected insufficient stock, got {other:?}"),
        }
        assert_eq!(manager.reserved_total(&key).await.unwrap(), Decimal::from(4));
    }

    #[tokio::test]
    async fn test_own_claim_can_grow_and_shrink() {
        let (manager, key) = manager_with_stock(10).await;

        manager.reserve("cust-a", &key, Decimal::from(4)).await.unwrap();
        let grown = manager.reserve("cust-a", &key, Decimal::from(10)).await.unwrap();
        assert_eq!(grown.existing, Decimal::from(4));
        assert_eq!(grown.net_claim, Decimal::from(6));

        let shrunk = manager.reserve("cust-a", &key, Decimal::from(2)).await.unwrap();
        assert_eq!(shrunk.net_claim, Decimal::from(-8));
        assert_eq!(manager.reserved_total(&key).await.unwrap(), Decimal::from(2));
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let (manager, key) = manager_with_stock(10).await;

        manager.reserve("cust-a", &key, Decimal::from(3)).await.unwrap();
        assert!(manager.release("cust-a", &key).await.unwrap());
        assert!(!manager.release("cust-a", &key).await.unwrap());
        assert_eq!(manager.release_all("cust-a").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_claims_never_exceed_stock() {
        let (manager, key) = manager_with_stock(10).await;

        let mut tasks = Vec::new();
        for i in 0..8 {
            let manager = manager.clone();
            let key = key.clone();
            tasks.push(tokio::spawn(async move {
                manager
                    .reserve(&format!("cust-{i}"), &key, Decimal::from(3))
                    .await
            }));
        }

        let mut accepted = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => accepted += 1,
                Err(EngineError::Reservation(_)) => {}
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }

        assert_eq!(accepted, 3);
        assert_eq!(manager.reserved_total(&key).await.unwrap(), Decimal::from(9));
    }

    #[tokio::test]
    async fn test_key_locks_are_pruned() {
        let locks = KeyLocks::new();
        let oil = ProductUnitKey::new("oil", UnitType::Piece);
        let tea = ProductUnitKey::new("tea", UnitType::Gram);

        let held = locks.acquire(&oil).await;
        drop(locks.acquire(&tea).await);
        assert_eq!(locks.len().await, 2);

        assert_eq!(locks.prune().await, 1);
        drop(held);
        assert_eq!(locks.prune().await, 1);
        assert_eq!(locks.len().await, 0);
    }

    #[tokio::test]
    async fn test_acquire_many_dedups() {
        let locks = KeyLocks::new();
        let oil = ProductUnitKey::new("oil", UnitType::Piece);
        let tea = ProductUnitKey::new("tea", UnitType::Gram);

        let guards = locks.acquire_many([&tea, &oil, &tea]).await;
        assert_eq!(guards.len(), 2);
    }
}
