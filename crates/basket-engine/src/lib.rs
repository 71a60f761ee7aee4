//! # basket-engine: Cart, Reservation and Campaign Services
//!
//! Wires the pure rules of `basket-core` to the storage of `basket-db`.
//!
//! ## Control Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Engine Control Flow                              │
//! │                                                                         │
//! │  CartStore::add_item ──► ReservationManager::claim_in ──► line saved   │
//! │        │                        (stock check)                          │
//! │        │                                                                │
//! │  CartStore::checkout_snapshot                                          │
//! │        ├── CampaignService::reapply ──► campaign replaces tier         │
//! │        └── price_cart (DiscountCalculator)                             │
//! │        │                                                                │
//! │  CartStore::complete_checkout                                          │
//! │        └── stock, usage count, single-use code, clear (one tx)         │
//! │                                                                         │
//! │  ReservationReaper (optional) ──► purge_expired every N seconds        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust,ignore
//! use basket_engine::{Engine, EngineConfig};
//!
//! let engine = Engine::start(EngineConfig::load(None)?).await?;
//!
//! let mut session = engine.guest_session();
//! engine.carts().add_item(&mut session, line).await?;
//!
//! let report = engine.carts().sign_in(&mut session, "cust-42").await;
//! let snapshot = engine.carts().checkout_snapshot(&session, None).await?;
//!
//! engine.shutdown().await;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod campaign;
pub mod cart;
pub mod config;
pub mod error;
pub mod reaper;
pub mod reservation;

// =============================================================================
// Re-exports
// =============================================================================

pub use campaign::CampaignService;
pub use cart::{CartStore, CheckoutReceipt, CheckoutSnapshot, MergeReport, MergeWarning, Session};
pub use config::EngineConfig;
pub use error::{EngineError, EngineResult, ErrorKind};
pub use reaper::{ReaperHandle, ReservationReaper};
pub use reservation::{KeyLocks, ReservationManager};

use tracing::info;
use tracing_subscriber::EnvFilter;

use basket_db::Database;

// =============================================================================
// Engine
// =============================================================================

/// The assembled services over one database.
#[derive(Debug)]
pub struct Engine {
    db: Database,
    reservations: ReservationManager,
    campaigns: CampaignService,
    carts: CartStore,
    reaper: Option<ReaperHandle>,
}

impl Engine {
    /// Validates the configuration, opens the database and starts the
    /// reaper if it is enabled.
    pub async fn start(config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        let db = Database::new(config.db_config()).await?;
        Ok(Self::with_database(db, &config))
    }

    /// Builds the services over an open database.
    pub fn with_database(db: Database, config: &EngineConfig) -> Self {
        let reservations = ReservationManager::new(db.clone(), config.reservation_ttl());
        let campaigns = CampaignService::new(db.clone());
        let carts = CartStore::new(
            db.clone(),
            reservations.clone(),
            campaigns.clone(),
            config.cart_limits(),
        );

        let reaper = config.reservations.reaper_enabled.then(|| {
            ReservationReaper::spawn(reservations.clone(), config.reaper_interval())
        });

        info!(
            ttl_hours = config.reservations.ttl_hours,
            reaper = reaper.is_some(),
            "Basket engine ready"
        );

        Engine {
            db,
            reservations,
            campaigns,
            carts,
            reaper,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn reservations(&self) -> &ReservationManager {
        &self.reservations
    }

    pub fn campaigns(&self) -> &CampaignService {
        &self.campaigns
    }

    pub fn carts(&self) -> &CartStore {
        &self.carts
    }

    /// A fresh guest session.
    pub fn guest_session(&self) -> Session {
        self.carts.guest_session()
    }

    /// Stops the reaper and closes the database.
    pub async fn shutdown(self) {
        if let Some(reaper) = self.reaper {
            reaper.shutdown().await;
        }
        self.db.close().await;
        info!("Basket engine stopped");
    }
}

/// Installs a `tracing` subscriber filtered by `RUST_LOG`.
///
/// Defaults to `info` with SQL statements at `warn`. Does nothing if a
/// subscriber is already installed.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,basket=debug,sqlx=warn"));

    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use basket_core::{CartLine, Money, ProductUnitKey, StockRecord, UnitType};
    use chrono::Utc;
    use rust_decimal::Decimal;

    #[tokio::test]
    async fn test_engine_round_trip() {
        let mut config = EngineConfig::in_memory();
        config.reservations.reaper_enabled = true;
        config.reservations.reaper_interval_secs = 1;

        let engine = Engine::start(config).await.unwrap();
        engine
            .database()
            .inventory()
            .set_stock(&StockRecord {
                key: ProductUnitKey::new("olive-oil", UnitType::Piece),
                available_quantity: Decimal::from(5),
                stock_unit: UnitType::Piece,
                is_active: true,
                updated_at: Utc::now(),
            })
            .await
            .unwrap();

        let mut session = engine.guest_session();
        engine
            .carts()
            .add_item(
                &mut session,
                CartLine::new(
                    "olive-oil",
                    "Olive Oil 1 L",
                    UnitType::Piece,
                    Money::from_cents(2500),
                    Decimal::from(2),
                ),
            )
            .await
            .unwrap();

        let report = engine.carts().sign_in(&mut session, "cust-a").await;
        assert!(report.is_clean());
        assert_eq!(
            engine
                .reservations()
                .reserved_total(&ProductUnitKey::new("olive-oil", UnitType::Piece))
                .await
                .unwrap(),
            Decimal::from(2)
        );

        let snapshot = engine.carts().checkout_snapshot(&session, None).await.unwrap();
        assert_eq!(snapshot.total_payable, Money::from_cents(5000));

        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_start_rejects_invalid_config() {
        let mut config = EngineConfig::in_memory();
        config.reservations.ttl_hours = 0;

        let err = Engine::start(config).await.unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }
}
