//! # basket-db: Database Layer for Basket
//!
//! This crate provides database access for the Basket cart engine.
//! It uses SQLite for storage with sqlx for async operations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Basket Data Flow                                 │
//! │                                                                         │
//! │  CartStore::add_item (basket-engine)                                   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    basket-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories  │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │                │    │  (embedded)  │  │   │
//! │  │   │               │    │ InventoryRepo  │    │ 001_init.sql │  │   │
//! │  │   │ SqlitePool    │◄───│ ReservationRepo│    │              │  │   │
//! │  │   │ ImmediateTx   │    │ CampaignRepo   │    │              │  │   │
//! │  │   │  (tx.rs)      │    │ CustomerRepo   │    │              │  │   │
//! │  │   │               │    │ CartRepo       │    │              │  │   │
//! │  │   └───────────────┘    └────────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database (WAL)                       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`tx`] - `BEGIN IMMEDIATE` transactions
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations
//!
//! ## Usage
//!
//! ```rust,ignore
//! use basket_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("path/to/basket.db")).await?;
//!
//! let stock = db.inventory().get_stock(&key).await?;
//! let total = db.reservations().reserved_total(&key, now, ttl).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod tx;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};
pub use tx::ImmediateTx;

// Connection type taken by the `*_in` repository functions
pub use sqlx::SqliteConnection;

// Repository re-exports for convenience
pub use repository::campaign::CampaignRepository;
pub use repository::cart::CartRepository;
pub use repository::customer::{Customer, CustomerRepository, PriceGroup};
pub use repository::inventory::InventoryRepository;
pub use repository::reservation::{ClaimResult, ReservationRepository};
