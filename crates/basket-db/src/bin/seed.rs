//! # Seed Data Loader
//!
//! Populates the database with a demo storefront for development.
//!
//! ## Usage
//! ```bash
//! # Seed ./basket_dev.db
//! cargo run -p basket-db --bin seed
//!
//! # Specify database path
//! cargo run -p basket-db --bin seed -- --db ./data/basket.db
//!
//! # More log output
//! RUST_LOG=basket_db=debug cargo run -p basket-db --bin seed
//! ```
//!
//! ## Seeded Data
//! - Stock for a small catalog sold per piece, per gram and per kilogram
//! - Campaigns: SUMMER10 (10%, min 100.00, cap 15.00), DEALER5 (flat 5.00
//!   for dealers), and one single-use code per run for SUMMER10
//! - Price groups Gold (10%) and Silver (5%), with one retail and one
//!   dealer customer

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use std::env;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use basket_core::{
    Audience, Campaign, CampaignDiscount, CustomerClass, DiscountRate, Money, ProductUnitKey,
    StockRecord, UnitType,
};
use basket_db::repository::customer::Customer;
use basket_db::{Database, DbConfig};

/// (product_id, listed unit, stock mantissa, stock scale, stock unit)
const CATALOG: &[(&str, UnitType, i64, u32, UnitType)] = &[
    ("olive-oil-1l", UnitType::Piece, 40, 0, UnitType::Piece),
    ("green-tea-box", UnitType::Piece, 120, 0, UnitType::Piece),
    ("coffee-house-blend", UnitType::Gram, 125, 1, UnitType::Kilogram),
    ("coffee-house-blend", UnitType::Kilogram, 8, 0, UnitType::Kilogram),
    ("hazelnuts", UnitType::Gram, 15000, 0, UnitType::Gram),
    ("dried-apricots", UnitType::Kilogram, 255, 1, UnitType::Kilogram),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Parse command line arguments
    let args: Vec<String> = env::args().collect();

    let mut db_path = String::from("./basket_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Basket Seed Data Loader");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>    Database file path (default: ./basket_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("🌱 Basket Seed Data Loader");
    println!("==========================");
    println!("Database: {}", db_path);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;
    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    // Stock is upserted, so reruns just reset it.
    let now = Utc::now();
    for (product_id, unit, mantissa, scale, stock_unit) in CATALOG {
        let record = StockRecord {
            key: ProductUnitKey::new(*product_id, *unit),
            available_quantity: Decimal::new(*mantissa, *scale),
            stock_unit: *stock_unit,
            is_active: true,
            updated_at: now,
        };
        db.inventory().set_stock(&record).await?;
    }
    println!("✓ Stock for {} product unit keys", CATALOG.len());

    if db.campaigns().find_active_by_code("SUMMER10").await?.is_some() {
        println!("⚠ Campaigns already seeded; skipping campaigns and customers.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    let summer = db
        .campaigns()
        .insert(&Campaign {
            id: Uuid::new_v4().to_string(),
            code: "SUMMER10".to_string(),
            name: "Summer sale".to_string(),
            description: Some("10% off carts over 100.00, up to 15.00".to_string()),
            discount: CampaignDiscount::Percentage {
                rate: DiscountRate::from_bps(1000),
                max_discount_amount: Some(Money::from_cents(1500)),
            },
            min_cart_value: Money::from_cents(10000),
            target_audience: Audience::All,
            starts_at: now - Duration::days(1),
            ends_at: now + Duration::days(90),
            usage_limit: Some(500),
            usage_count: 0,
            active: true,
            created_at: now,
        })
        .await?;

    db.campaigns()
        .insert(&Campaign {
            id: Uuid::new_v4().to_string(),
            code: "DEALER5".to_string(),
            name: "Dealer welcome".to_string(),
            description: None,
            discount: CampaignDiscount::Flat {
                amount: Money::from_cents(500),
            },
            min_cart_value: Money::zero(),
            target_audience: Audience::Dealer,
            starts_at: now - Duration::days(1),
            ends_at: now + Duration::days(365),
            usage_limit: None,
            usage_count: 0,
            active: true,
            created_at: now,
        })
        .await?;

    let single_use_code = format!("VIP-{}", &Uuid::new_v4().simple().to_string()[..8]);
    let issued = db
        .campaigns()
        .insert_single_use(&single_use_code, &summer.id)
        .await?;
    println!("✓ Campaigns SUMMER10, DEALER5");
    println!("  Single-use code: {}", issued.code);

    let gold = db
        .customers()
        .insert_price_group("Gold", DiscountRate::from_bps(1000))
        .await?;
    let silver = db
        .customers()
        .insert_price_group("Silver", DiscountRate::from_bps(500))
        .await?;

    db.customers()
        .insert_customer(&Customer {
            id: "demo-retail".to_string(),
            name: "Demo Retail Customer".to_string(),
            class: CustomerClass::Retail,
            price_group_id: Some(silver.id),
            special_rate: DiscountRate::zero(),
            created_at: now,
        })
        .await?;
    db.customers()
        .insert_customer(&Customer {
            id: "demo-dealer".to_string(),
            name: "Demo Dealer".to_string(),
            class: CustomerClass::Dealer,
            price_group_id: Some(gold.id),
            special_rate: DiscountRate::from_bps(500),
            created_at: now,
        })
        .await?;
    println!("✓ Customers demo-retail (Silver), demo-dealer (Gold + 5%)");

    println!();
    println!("✓ Seed complete!");

    Ok(())
}
