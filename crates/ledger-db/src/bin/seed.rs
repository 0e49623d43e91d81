//! # Ledger Setup Tool
//!
//! Prepares a database for the sync daemon: seeds the first watermark,
//! sets the destination warehouse for transfers and links partners to the
//! warehouses their goods ship from.
//!
//! ## Usage
//! ```bash
//! # Seed the first watermark for a tenant
//! cargo run -p ledger-db --bin seed -- --db ./ledger.db \
//!     --tenant 302563778 --watermark 2024-01-01T00:00:00Z
//!
//! # Destination warehouse for materialized transfers
//! cargo run -p ledger-db --bin seed -- --destination WH-CENTRAL
//!
//! # Link a supplier (by TIN) to its warehouse
//! cargo run -p ledger-db --bin seed -- --partner-warehouse 111=WH-SUPPLIER
//! ```

use chrono::{DateTime, Utc};
use std::env;

use ledger_core::DESTINATION_WAREHOUSE_SETTING;
use ledger_db::{Database, DbConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut db_path = String::from("./ledger_dev.db");
    let mut tenant: Option<String> = None;
    let mut watermark: Option<DateTime<Utc>> = None;
    let mut destination: Option<String> = None;
    let mut partner_links: Vec<(String, String)> = Vec::new();

    let mut i = 1;
    while i < args.len() {
        let value = args.get(i + 1).cloned();
        match args[i].as_str() {
            "--db" | "-d" => {
                if let Some(v) = value {
                    db_path = v;
                    i += 1;
                }
            }
            "--tenant" | "-t" => {
                tenant = value;
                i += 1;
            }
            "--watermark" | "-w" => {
                if let Some(v) = value {
                    watermark = Some(DateTime::parse_from_rfc3339(&v)?.with_timezone(&Utc));
                    i += 1;
                }
            }
            "--destination" => {
                destination = value;
                i += 1;
            }
            "--partner-warehouse" => {
                if let Some((tin, wh)) = value.as_deref().and_then(|v| v.split_once('=')) {
                    partner_links.push((tin.to_string(), wh.to_string()));
                }
                i += 1;
            }
            "--help" | "-h" => {
                println!("Ledger Setup Tool");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>                 Database file (default: ./ledger_dev.db)");
                println!("  -t, --tenant <TIN>              Tenant whose watermark is seeded");
                println!("  -w, --watermark <RFC3339>       First watermark (requires --tenant)");
                println!("      --destination <WAREHOUSE>   Destination warehouse for transfers");
                println!("      --partner-warehouse TIN=WH  Link a partner to its warehouse");
                println!("  -h, --help                      Show this help message");
                return Ok(());
            }
            other => {
                eprintln!("Ignoring unknown argument: {}", other);
            }
        }
        i += 1;
    }

    println!("Ledger Setup Tool");
    println!("=================");
    println!("Database: {}", db_path);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;
    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    match (tenant, watermark) {
        (Some(tenant), Some(watermark)) => {
            if let Some(existing) = db.sync_state().get(&tenant).await? {
                println!(
                    "⚠ Tenant {} already has watermark {}; overwriting",
                    tenant, existing.watermark
                );
            }
            db.sync_state().seed(&tenant, watermark).await?;
            println!("✓ Watermark for {} set to {}", tenant, watermark);
        }
        (None, Some(_)) => eprintln!("⚠ --watermark needs --tenant; skipped"),
        _ => {}
    }

    if let Some(destination) = destination {
        db.settings()
            .set(DESTINATION_WAREHOUSE_SETTING, &destination)
            .await?;
        println!("✓ Destination warehouse set to {}", destination);
    }

    for (tin, warehouse) in partner_links {
        match db.partners().get_by_tin(&tin).await? {
            Some(partner) => {
                db.partners()
                    .set_warehouse(&partner.id, Some(&warehouse))
                    .await?;
                println!("✓ Partner {} linked to {}", tin, warehouse);
            }
            None => eprintln!("⚠ No partner with TIN {}; run a sync first", tin),
        }
    }

    println!();
    println!("✓ Setup complete!");

    db.close().await;
    Ok(())
}
