//! # Cart Store
//!
//! Carts for guests and signed-in customers, with stock held for every line
//! of a signed-in cart.
//!
//! ## Cart Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Cart Lifecycle                                  │
//! │                                                                         │
//! │  ┌──────────┐  sign_in   ┌───────────────┐  checkout   ┌────────────┐  │
//! │  │  Guest   │──(merge)──►│ Authenticated │──snapshot──►│  Checkout  │  │
//! │  │ (memory) │            │  (persisted,  │             │  Snapshot  │  │
//! │  │          │◄──logout───│   reserved)   │             └─────┬──────┘  │
//! │  └──────────┘            └───────────────┘                   │         │
//! │                            add_item                complete_checkout   │
//! │                            update_quantity         (stock, usage,      │
//! │                            remove_item              code, clear)       │
//! │                            clear                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## One Transaction Per Write
//! ```text
//! key lock ──► BEGIN IMMEDIATE ──► read line ──► claim stock ──► write line
//!                                                     │
//!                                               refused? ROLLBACK,
//!                                               line untouched
//! ```
//!
//! Logging out keeps the server-side reservations. They lapse after the TTL
//! unless the customer signs in again first.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info, warn};

use basket_core::cart::{subtotal, total_quantity};
use basket_core::discount::{price_cart, DiscountSource};
use basket_core::validation::{validate_cart_size, validate_line, validate_quantity};
use basket_core::{
    AppliedCampaign, CampaignRejection, CartLimits, CartLine, CustomerTier, GuestCart, Money,
    ProductUnitKey, UnitType,
};
use basket_db::{
    CampaignRepository, CartRepository, Database, InventoryRepository, ReservationRepository,
    SqliteConnection,
};

use crate::campaign::CampaignService;
use crate::error::{EngineError, EngineResult};
use crate::reservation::ReservationManager;

// =============================================================================
// Session
// =============================================================================

/// Who the cart belongs to. Passed to every cart operation.
#[derive(Debug, Clone)]
pub enum Session {
    /// Anonymous shopper; the cart lives in memory and holds no stock.
    Guest(GuestCart),
    /// Signed-in customer; the cart is persisted and reserves stock.
    Authenticated { customer_id: String },
}

impl Session {
    /// A guest session with an empty cart.
    pub fn guest(limits: CartLimits) -> Self {
        Session::Guest(GuestCart::with_limits(limits))
    }

    pub fn customer_id(&self) -> Option<&str> {
        match self {
            Session::Guest(_) => None,
            Session::Authenticated { customer_id } => Some(customer_id),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Session::Authenticated { .. })
    }

    fn require_customer(&self) -> EngineResult<&str> {
        self.customer_id().ok_or(EngineError::NotAuthenticated)
    }
}

// =============================================================================
// Reports
// =============================================================================

/// A guest line that could not be carried into the customer's cart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergeWarning {
    pub product_id: String,
    pub unit: UnitType,
    /// Shopper-facing reason.
    pub message: String,
}

/// Outcome of merging a guest cart on sign-in.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MergeReport {
    /// Lines carried over.
    pub merged: usize,
    pub warnings: Vec<MergeWarning>,
}

impl MergeReport {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// A priced cart, handed to the payment step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckoutSnapshot {
    pub customer_id: String,
    pub lines: Vec<CartLine>,
    pub tier: CustomerTier,
    pub applied_campaign: Option<AppliedCampaign>,
    pub source: DiscountSource,
    pub subtotal: Money,
    pub discount: Money,
    pub total_payable: Money,
}

/// Record of a completed checkout.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckoutReceipt {
    pub customer_id: String,
    pub lines: Vec<CartLine>,
    pub subtotal: Money,
    pub discount: Money,
    pub total_payable: Money,
    pub campaign_id: Option<String>,
    pub single_use_code: Option<String>,
    pub completed_at: DateTime<Utc>,
}

// =============================================================================
// Cart Store
// =============================================================================

/// Cart operations for both kinds of session.
#[derive(Debug, Clone)]
pub struct CartStore {
    db: Database,
    reservations: ReservationManager,
    campaigns: CampaignService,
    limits: CartLimits,
}

impl CartStore {
    pub fn new(
        db: Database,
        reservations: ReservationManager,
        campaigns: CampaignService,
        limits: CartLimits,
    ) -> Self {
        CartStore {
            db,
            reservations,
            campaigns,
            limits,
        }
    }

    pub fn limits(&self) -> CartLimits {
        self.limits
    }

    /// A fresh guest session using this store's limits.
    pub fn guest_session(&self) -> Session {
        Session::guest(self.limits)
    }

    // -------------------------------------------------------------------------
    // Line operations
    // -------------------------------------------------------------------------

    /// Adds a line, or adds to the quantity of the matching line.
    ///
    /// For a signed-in customer the merged quantity is reserved first. If
    /// the reservation is refused the cart is not touched.
    pub async fn add_item(&self, session: &mut Session, line: CartLine) -> EngineResult<()> {
        match session {
            Session::Guest(cart) => Ok(cart.add_item(line)?),
            Session::Authenticated { customer_id } => {
                self.add_for_customer(customer_id, line).await.map(|_| ())
            }
        }
    }

    async fn add_for_customer(&self, customer_id: &str, line: CartLine) -> EngineResult<CartLine> {
        validate_line(&line, &self.limits)?;

        let key = line.key();
        let _guard = self.reservations.locks().acquire(&key).await;

        let mut tx = self.db.begin_immediate().await?;
        let result = self.add_item_in(tx.conn(), customer_id, line).await;
        tx.finish(result).await
    }

    async fn add_item_in(
        &self,
        conn: &mut SqliteConnection,
        customer_id: &str,
        line: CartLine,
    ) -> EngineResult<CartLine> {
        let now = Utc::now();
        let existing =
            CartRepository::get_line_in(conn, customer_id, &line.product_id, line.unit).await?;

        let merged = match existing {
            Some(mut current) => {
                current.quantity += line.quantity;
                current
            }
            None => {
                let lines = CartRepository::count_lines_in(conn, customer_id).await?;
                validate_cart_size(lines, &self.limits)?;
                line
            }
        };

        validate_quantity(
            merged.quantity,
            merged.unit,
            merged.min_order_quantity,
            &self.limits,
        )?;

        self.reservations
            .claim_in(conn, customer_id, &merged.key(), merged.quantity, now)
            .await?;
        CartRepository::upsert_line_in(conn, customer_id, &merged, now).await?;

        debug!(
            customer_id = %customer_id,
            key = %merged.key(),
            quantity = %merged.quantity,
            "Item added"
        );
        Ok(merged)
    }

    /// Sets the quantity of a line. `quantity ≤ 0` removes it.
    ///
    /// ## Errors
    /// - `EngineError::LineNotFound` - no such line
    /// - `EngineError::Reservation` - not enough stock; the line keeps its
    ///   previous quantity
    pub async fn update_quantity(
        &self,
        session: &mut Session,
        product_id: &str,
        unit: UnitType,
        quantity: Decimal,
    ) -> EngineResult<()> {
        let customer_id = match session {
            Session::Guest(cart) => return Ok(cart.update_quantity(product_id, unit, quantity)?),
            Session::Authenticated { customer_id } => customer_id.clone(),
        };

        if quantity <= Decimal::ZERO {
            self.remove_for_customer(&customer_id, product_id, unit).await?;
            return Ok(());
        }

        let key = ProductUnitKey::new(product_id, unit);
        let _guard = self.reservations.locks().acquire(&key).await;

        let mut tx = self.db.begin_immediate().await?;
        let result = self
            .update_quantity_in(tx.conn(), &customer_id, &key, quantity)
            .await;
        tx.finish(result).await
    }

    async fn update_quantity_in(
        &self,
        conn: &mut SqliteConnection,
        customer_id: &str,
        key: &ProductUnitKey,
        quantity: Decimal,
    ) -> EngineResult<()> {
        let now = Utc::now();
        let mut line = CartRepository::get_line_in(conn, customer_id, &key.product_id, key.unit)
            .await?
            .ok_or_else(|| EngineError::LineNotFound {
                product_id: key.product_id.clone(),
                unit: key.unit,
            })?;

        validate_quantity(quantity, key.unit, line.min_order_quantity, &self.limits)?;

        self.reservations
            .claim_in(conn, customer_id, key, quantity, now)
            .await?;
        line.quantity = quantity;
        CartRepository::upsert_line_in(conn, customer_id, &line, now).await?;

        debug!(customer_id = %customer_id, key = %key, quantity = %quantity, "Quantity updated");
        Ok(())
    }

    /// Removes a line and its reservation. Returns whether anything was
    /// removed; removing a missing line is not an error.
    pub async fn remove_item(
        &self,
        session: &mut Session,
        product_id: &str,
        unit: UnitType,
    ) -> EngineResult<bool> {
        match session {
            Session::Guest(cart) => Ok(cart.remove_item(product_id, unit)),
            Session::Authenticated { customer_id } => {
                self.remove_for_customer(customer_id, product_id, unit).await
            }
        }
    }

    async fn remove_for_customer(
        &self,
        customer_id: &str,
        product_id: &str,
        unit: UnitType,
    ) -> EngineResult<bool> {
        let key = ProductUnitKey::new(product_id, unit);
        let _guard = self.reservations.locks().acquire(&key).await;

        let mut tx = self.db.begin_immediate().await?;
        let result = Self::remove_in(tx.conn(), customer_id, &key).await;
        let removed = tx.finish(result).await?;

        if removed {
            debug!(customer_id = %customer_id, key = %key, "Item removed");
        }
        Ok(removed)
    }

    async fn remove_in(
        conn: &mut SqliteConnection,
        customer_id: &str,
        key: &ProductUnitKey,
    ) -> EngineResult<bool> {
        let released = ReservationRepository::release_in(conn, customer_id, key).await?;
        let deleted =
            CartRepository::delete_line_in(conn, customer_id, &key.product_id, key.unit).await?;
        Ok(released || deleted)
    }

    /// Empties the cart and releases every reservation.
    pub async fn clear(&self, session: &mut Session) -> EngineResult<()> {
        let customer_id = match session {
            Session::Guest(cart) => {
                cart.clear();
                return Ok(());
            }
            Session::Authenticated { customer_id } => customer_id.clone(),
        };

        let mut tx = self.db.begin_immediate().await?;
        let result = Self::clear_in(tx.conn(), &customer_id).await;
        let (released, deleted) = tx.finish(result).await?;

        info!(customer_id = %customer_id, released, deleted, "Cart cleared");
        Ok(())
    }

    async fn clear_in(conn: &mut SqliteConnection, customer_id: &str) -> EngineResult<(u64, u64)> {
        let released = ReservationRepository::release_all_in(conn, customer_id).await?;
        let deleted = CartRepository::clear_in(conn, customer_id).await?;
        Ok((released, deleted))
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    pub async fn lines(&self, session: &Session) -> EngineResult<Vec<CartLine>> {
        match session {
            Session::Guest(cart) => Ok(cart.lines().to_vec()),
            Session::Authenticated { customer_id } => {
                Ok(self.db.carts().list_lines(customer_id).await?)
            }
        }
    }

    /// Σ unit_price × quantity, before discounts.
    pub async fn total(&self, session: &Session) -> EngineResult<Money> {
        match session {
            Session::Guest(cart) => Ok(cart.total()),
            Session::Authenticated { .. } => Ok(subtotal(&self.lines(session).await?)),
        }
    }

    /// Σ quantities across lines.
    pub async fn count(&self, session: &Session) -> EngineResult<Decimal> {
        match session {
            Session::Guest(cart) => Ok(cart.count()),
            Session::Authenticated { .. } => Ok(total_quantity(&self.lines(session).await?)),
        }
    }

    // -------------------------------------------------------------------------
    // Sign-in / sign-out
    // -------------------------------------------------------------------------

    /// Replays every guest line into the customer's cart.
    ///
    /// Lines that cannot be added become warnings; the rest are kept.
    pub async fn merge_guest_cart(&self, customer_id: &str, guest: GuestCart) -> MergeReport {
        let mut report = MergeReport::default();

        for line in guest.into_lines() {
            let product_id = line.product_id.clone();
            let unit = line.unit;

            match self.add_for_customer(customer_id, line).await {
                Ok(_) => report.merged += 1,
                Err(e) => {
                    warn!(
                        customer_id = %customer_id,
                        product_id = %product_id,
                        unit = %unit,
                        error = %e,
                        "Guest line not merged"
                    );
                    report.warnings.push(MergeWarning {
                        product_id,
                        unit,
                        message: e.user_message(),
                    });
                }
            }
        }

        info!(
            customer_id = %customer_id,
            merged = report.merged,
            warnings = report.warnings.len(),
            "Guest cart merged"
        );
        report
    }

    /// Signs the session in, carrying over a guest cart if there is one.
    pub async fn sign_in(&self, session: &mut Session, customer_id: &str) -> MergeReport {
        let previous = std::mem::replace(
            session,
            Session::Authenticated {
                customer_id: customer_id.to_string(),
            },
        );

        match previous {
            Session::Guest(cart) if !cart.is_empty() => {
                self.merge_guest_cart(customer_id, cart).await
            }
            _ => MergeReport::default(),
        }
    }

    /// Signs the session out. Server-side reservations stay in place.
    pub fn logout(&self, session: &mut Session) {
        if let Some(customer_id) = session.customer_id() {
            info!(customer_id = %customer_id, "Signed out");
        }
        *session = self.guest_session();
    }

    // -------------------------------------------------------------------------
    // Checkout
    // -------------------------------------------------------------------------

    /// Prices the customer's cart for payment.
    ///
    /// An applied campaign is checked again against the current cart and
    /// replaces the tier discount.
    pub async fn checkout_snapshot(
        &self,
        session: &Session,
        applied: Option<&AppliedCampaign>,
    ) -> EngineResult<CheckoutSnapshot> {
        let customer_id = session.require_customer()?;

        let lines = self.db.carts().list_lines(customer_id).await?;
        if lines.is_empty() {
            return Err(EngineError::EmptyCart);
        }
        let subtotal = subtotal(&lines);

        let tier = self
            .db
            .customers()
            .get_customer_tier(customer_id, Utc::now().date_naive())
            .await?
            .unwrap_or_else(|| CustomerTier::retail(customer_id));

        let applied_campaign = match applied {
            Some(applied) => Some(
                self.campaigns
                    .reapply(applied, Some(tier.class), subtotal)
                    .await?,
            ),
            None => None,
        };

        let priced = price_cart(subtotal, Some(&tier), applied_campaign.as_ref());
        debug!(
            customer_id = %customer_id,
            subtotal = %priced.subtotal,
            discount = %priced.discount,
            total = %priced.total_payable,
            "Checkout priced"
        );

        Ok(CheckoutSnapshot {
            customer_id: customer_id.to_string(),
            lines,
            tier,
            applied_campaign,
            source: priced.source,
            subtotal: priced.subtotal,
            discount: priced.discount,
            total_payable: priced.total_payable,
        })
    }

    /// Commits a paid checkout: takes the stock, counts the campaign use,
    /// redeems the single-use code, then empties the cart.
    ///
    /// Runs in one transaction; on any error nothing changes.
    ///
    /// ## Errors
    /// - `EngineError::StaleCheckout` - the cart changed since the snapshot
    /// - `EngineError::Reservation` - a product is gone or short
    /// - `EngineError::Campaign` - the campaign hit its limit or the code
    ///   was redeemed meanwhile
    pub async fn complete_checkout(
        &self,
        session: &Session,
        snapshot: &CheckoutSnapshot,
    ) -> EngineResult<CheckoutReceipt> {
        let customer_id = session.require_customer()?;
        if snapshot.customer_id != customer_id {
            return Err(EngineError::StaleCheckout);
        }

        let keys: Vec<ProductUnitKey> = snapshot.lines.iter().map(CartLine::key).collect();
        let _guards = self.reservations.locks().acquire_many(&keys).await;

        let mut tx = self.db.begin_immediate().await?;
        let result = self.complete_in(tx.conn(), customer_id, snapshot, Utc::now()).await;
        let receipt = tx.finish(result).await?;

        info!(
            customer_id = %customer_id,
            lines = receipt.lines.len(),
            total = %receipt.total_payable,
            campaign_id = ?receipt.campaign_id,
            "Checkout completed"
        );
        Ok(receipt)
    }

    async fn complete_in(
        &self,
        conn: &mut SqliteConnection,
        customer_id: &str,
        snapshot: &CheckoutSnapshot,
        now: DateTime<Utc>,
    ) -> EngineResult<CheckoutReceipt> {
        let current = CartRepository::list_lines_in(conn, customer_id).await?;
        if current.is_empty() {
            return Err(EngineError::EmptyCart);
        }
        if current != snapshot.lines {
            return Err(EngineError::StaleCheckout);
        }

        // Lines are claimed again: stock held by other live reservations
        // is off limits even if this customer's own claim lapsed.
        for line in &current {
            let key = line.key();
            self.reservations
                .claim_in(conn, customer_id, &key, line.quantity, now)
                .await?;

            InventoryRepository::decrement_stock_in(conn, &key, line.quantity).await?;
        }

        if let Some(applied) = &snapshot.applied_campaign {
            if !CampaignRepository::increment_usage_in(conn, &applied.campaign.id).await? {
                return Err(CampaignRejection::UsageLimitReached.into());
            }
            if let Some(code) = &applied.single_use_code {
                if !CampaignRepository::redeem_in(conn, code, customer_id, now).await? {
                    return Err(CampaignRejection::CodeAlreadyUsed.into());
                }
            }
        }

        Self::clear_in(conn, customer_id).await?;

        Ok(CheckoutReceipt {
            customer_id: customer_id.to_string(),
            lines: current,
            subtotal: snapshot.subtotal,
            discount: snapshot.discount,
            total_payable: snapshot.total_payable,
            campaign_id: snapshot.applied_campaign.as_ref().map(|a| a.campaign.id.clone()),
            single_use_code: snapshot
                .applied_campaign
                .as_ref()
                .and_then(|a| a.single_use_code.clone()),
            completed_at: now,
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use basket_core::{
        Audience, Campaign, CampaignDiscount, CustomerClass, DiscountRate, ReservationFailure,
        StockRecord,
    };
    use basket_db::{Customer, DbConfig};
    use chrono::Duration;

    async fn setup() -> (CartStore, Database) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let reservations = ReservationManager::new(db.clone(), Duration::hours(24));
        let campaigns = CampaignService::new(db.clone());
        let store = CartStore::new(db.clone(), reservations, campaigns, CartLimits::default());
        (store, db)
    }

    async fn stock(db: &Database, product_id: &str, unit: UnitType, qty: i64, stock_unit: UnitType) {
        db.inventory()
            .set_stock(&StockRecord {
                key: ProductUnitKey::new(product_id, unit),
                available_quantity: Decimal::from(qty),
                stock_unit,
                is_active: true,
                updated_at: Utc::now(),
            })
            .await
            .unwrap();
    }

    fn oil(qty: i64) -> CartLine {
        CartLine::new(
            "olive-oil",
            "Olive Oil 1 L",
            UnitType::Piece,
            Money::from_cents(2500),
            Decimal::from(qty),
        )
    }

    fn tea(grams: i64) -> CartLine {
        CartLine::new(
            "black-tea",
            "Black Tea",
            UnitType::Gram,
            Money::from_cents(4),
            Decimal::from(grams),
        )
    }

    fn signed_in(customer_id: &str) -> Session {
        Session::Authenticated {
            customer_id: customer_id.to_string(),
        }
    }

    #[tokio::test]
    async fn test_add_merges_and_reserves_total() {
        let (store, db) = setup().await;
        stock(&db, "olive-oil", UnitType::Piece, 10, UnitType::Piece).await;
        let mut session = signed_in("cust-a");

        store.add_item(&mut session, oil(2)).await.unwrap();
        store.add_item(&mut session, oil(3)).await.unwrap();

        let lines = store.lines(&session).await.unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].quantity, Decimal::from(5));

        let reservation = db
            .reservations()
            .get("cust-a", &ProductUnitKey::new("olive-oil", UnitType::Piece))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reservation.quantity, Decimal::from(5));
        assert_eq!(store.total(&session).await.unwrap(), Money::from_cents(12500));
    }

    #[tokio::test]
    async fn test_refused_add_leaves_line_untouched() {
        let (store, db) = setup().await;
        stock(&db, "olive-oil", UnitType::Piece, 4, UnitType::Piece).await;
        let mut session = signed_in("cust-a");

        store.add_item(&mut session, oil(3)).await.unwrap();
        let err = store.add_item(&mut session, oil(2)).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Reservation(ReservationFailure::InsufficientStock { .. })
        ));

        let lines = store.lines(&session).await.unwrap();
        assert_eq!(lines[0].quantity, Decimal::from(3));
        assert_eq!(
            store
                .reservations
                .reserved_total(&ProductUnitKey::new("olive-oil", UnitType::Piece))
                .await
                .unwrap(),
            Decimal::from(3)
        );
    }

    #[tokio::test]
    async fn test_gram_line_draws_on_kilogram_stock() {
        let (store, db) = setup().await;
        stock(&db, "black-tea", UnitType::Gram, 2, UnitType::Kilogram).await;
        let mut session = signed_in("cust-a");

        store.add_item(&mut session, tea(1500)).await.unwrap();
        let err = store.add_item(&mut session, tea(600)).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Resource);
    }

    #[tokio::test]
    async fn test_update_quantity() {
        let (store, db) = setup().await;
        stock(&db, "olive-oil", UnitType::Piece, 10, UnitType::Piece).await;
        let mut session = signed_in("cust-a");
        let key = ProductUnitKey::new("olive-oil", UnitType::Piece);

        let err = store
            .update_quantity(&mut session, "olive-oil", UnitType::Piece, Decimal::from(2))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::LineNotFound { .. }));

        store.add_item(&mut session, oil(2)).await.unwrap();
        store
            .update_quantity(&mut session, "olive-oil", UnitType::Piece, Decimal::from(7))
            .await
            .unwrap();
        assert_eq!(store.count(&session).await.unwrap(), Decimal::from(7));

        let err = store
            .update_quantity(&mut session, "olive-oil", UnitType::Piece, Decimal::from(11))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Reservation(_)));
        assert_eq!(store.count(&session).await.unwrap(), Decimal::from(7));

        store
            .update_quantity(&mut session, "olive-oil", UnitType::Piece, Decimal::ZERO)
            .await
            .unwrap();
        assert!(store.lines(&session).await.unwrap().is_empty());
        assert!(db.reservations().get("cust-a", &key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remove_and_clear_release_stock() {
        let (store, db) = setup().await;
        stock(&db, "olive-oil", UnitType::Piece, 10, UnitType::Piece).await;
        stock(&db, "black-tea", UnitType::Gram, 5, UnitType::Kilogram).await;
        let mut session = signed_in("cust-a");

        store.add_item(&mut session, oil(2)).await.unwrap();
        store.add_item(&mut session, tea(500)).await.unwrap();

        assert!(store
            .remove_item(&mut session, "olive-oil", UnitType::Piece)
            .await
            .unwrap());
        assert!(!store
            .remove_item(&mut session, "olive-oil", UnitType::Piece)
            .await
            .unwrap());

        store.clear(&mut session).await.unwrap();
        assert!(store.lines(&session).await.unwrap().is_empty());
        assert!(store.reservations.list_for_customer("cust-a").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_guest_merge_reports_out_of_stock_line() {
        let (store, db) = setup().await;
        stock(&db, "olive-oil", UnitType::Piece, 10, UnitType::Piece).await;
        stock(&db, "black-tea", UnitType::Gram, 0, UnitType::Kilogram).await;

        let mut session = store.guest_session();
        store.add_item(&mut session, oil(2)).await.unwrap();
        store.add_item(&mut session, tea(250)).await.unwrap();
        assert_eq!(store.count(&session).await.unwrap(), Decimal::from(252));

        let report = store.sign_in(&mut session, "cust-a").await;
        assert_eq!(report.merged, 1);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].product_id, "black-tea");
        assert!(report.warnings[0].message.starts_with("Insufficient stock"));

        let lines = store.lines(&session).await.unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].product_id, "olive-oil");
    }

    #[tokio::test]
    async fn test_logout_keeps_reservations() {
        let (store, db) = setup().await;
        stock(&db, "olive-oil", UnitType::Piece, 10, UnitType::Piece).await;
        let mut session = signed_in("cust-a");
        store.add_item(&mut session, oil(2)).await.unwrap();

        store.logout(&mut session);
        assert!(!session.is_authenticated());
        assert!(store.lines(&session).await.unwrap().is_empty());
        assert_eq!(store.reservations.list_for_customer("cust-a").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_checkout_requires_sign_in_and_lines() {
        let (store, _db) = setup().await;

        let err = store
            .checkout_snapshot(&store.guest_session(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotAuthenticated));

        let err = store
            .checkout_snapshot(&signed_in("cust-a"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::EmptyCart));
    }

    #[tokio::test]
    async fn test_checkout_applies_tier_then_commits() {
        let (store, db) = setup().await;
        stock(&db, "olive-oil", UnitType::Piece, 10, UnitType::Piece).await;

        let group = db
            .customers()
            .insert_price_group("Gold", DiscountRate::from_bps(1000))
            .await
            .unwrap();
        db.customers()
            .insert_customer(&Customer {
                id: "cust-a".to_string(),
                name: "Ayse".to_string(),
                class: CustomerClass::Dealer,
                price_group_id: Some(group.id),
                special_rate: DiscountRate::from_bps(500),
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        let mut session = signed_in("cust-a");
        store.add_item(&mut session, oil(4)).await.unwrap();

        let snapshot = store.checkout_snapshot(&session, None).await.unwrap();
        assert_eq!(snapshot.subtotal, Money::from_cents(10000));
        assert_eq!(snapshot.total_payable, Money::from_cents(8550));
        assert!(matches!(snapshot.source, DiscountSource::Tiered { .. }));

        let receipt = store.complete_checkout(&session, &snapshot).await.unwrap();
        assert_eq!(receipt.total_payable, Money::from_cents(8550));

        let key = ProductUnitKey::new("olive-oil", UnitType::Piece);
        let record = db.inventory().get_stock(&key).await.unwrap().unwrap();
        assert_eq!(record.available_quantity, Decimal::from(6));
        assert!(store.lines(&session).await.unwrap().is_empty());
        assert!(db.reservations().get("cust-a", &key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_lapsed_claim_cannot_take_stock_held_by_others() {
        let (store, db) = setup().await;
        stock(&db, "olive-oil", UnitType::Piece, 10, UnitType::Piece).await;
        let key = ProductUnitKey::new("olive-oil", UnitType::Piece);

        let mut first = signed_in("cust-a");
        store.add_item(&mut first, oil(8)).await.unwrap();
        db.reservations()
            .reserve(
                "cust-a",
                &key,
                Decimal::from(8),
                Utc::now() - Duration::hours(25),
                Duration::hours(24),
            )
            .await
            .unwrap()
            .unwrap();

        let mut second = signed_in("cust-b");
        store.add_item(&mut second, oil(10)).await.unwrap();

        let snap_a = store.checkout_snapshot(&first, None).await.unwrap();
        let err = store.complete_checkout(&first, &snap_a).await.unwrap_err();
        match err {
            EngineError::Reservation(ReservationFailure::InsufficientStock {
                available,
                requested,
                ..
            }) => {
                assert_eq!(available, Decimal::ZERO);
                assert_eq!(requested, Decimal::from(8));
            }
            other => panic!("expected insufficient stock, got {other:?}"),
        }
        let record = db.inventory().get_stock(&key).await.unwrap().unwrap();
        assert_eq!(record.available_quantity, Decimal::from(10));
        assert_eq!(store.count(&first).await.unwrap(), Decimal::from(8));

        let snap_b = store.checkout_snapshot(&second, None).await.unwrap();
        store.complete_checkout(&second, &snap_b).await.unwrap();
        let record = db.inventory().get_stock(&key).await.unwrap().unwrap();
        assert_eq!(record.available_quantity, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_checkout_rejects_changed_cart() {
        let (store, db) = setup().await;
        stock(&db, "olive-oil", UnitType::Piece, 10, UnitType::Piece).await;
        let mut session = signed_in("cust-a");
        store.add_item(&mut session, oil(2)).await.unwrap();

        let snapshot = store.checkout_snapshot(&session, None).await.unwrap();
        store.add_item(&mut session, oil(1)).await.unwrap();

        let err = store.complete_checkout(&session, &snapshot).await.unwrap_err();
        assert!(matches!(err, EngineError::StaleCheckout));
        assert_eq!(store.count(&session).await.unwrap(), Decimal::from(3));
    }

    #[tokio::test]
    async fn test_single_use_code_is_redeemed_once() {
        let (store, db) = setup().await;
        stock(&db, "olive-oil", UnitType::Piece, 20, UnitType::Piece).await;

        let now = Utc::now();
        let campaign = db
            .campaigns()
            .insert(&Campaign {
                id: uuid::Uuid::new_v4().to_string(),
                code: "FLAT5".to_string(),
                name: "Five off".to_string(),
                description: None,
                discount: CampaignDiscount::Flat {
                    amount: Money::from_cents(500),
                },
                min_cart_value: Money::zero(),
                target_audience: Audience::All,
                starts_at: now - Duration::days(1),
                ends_at: now + Duration::days(1),
                usage_limit: None,
                usage_count: 0,
                active: true,
                created_at: now,
            })
            .await
            .unwrap();
        db.campaigns().insert_single_use("VIP-0042", &campaign.id).await.unwrap();

        let mut first = signed_in("cust-a");
        let mut second = signed_in("cust-b");
        store.add_item(&mut first, oil(1)).await.unwrap();
        store.add_item(&mut second, oil(1)).await.unwrap();

        let applied = store
            .campaigns
            .validate_code("VIP-0042", Some(CustomerClass::Retail), Money::from_cents(2500))
            .await
            .unwrap();

        let snap_a = store.checkout_snapshot(&first, Some(&applied)).await.unwrap();
        let snap_b = store.checkout_snapshot(&second, Some(&applied)).await.unwrap();
        assert_eq!(snap_a.total_payable, Money::from_cents(2000));

        store.complete_checkout(&first, &snap_a).await.unwrap();
        let err = store.complete_checkout(&second, &snap_b).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Campaign(CampaignRejection::CodeAlreadyUsed)
        ));
        assert_eq!(store.count(&second).await.unwrap(), Decimal::from(1));

        let stored = db.campaigns().get_by_id(&campaign.id).await.unwrap().unwrap();
        assert_eq!(stored.usage_count, 1);
    }
}
