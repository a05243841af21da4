//! House catalog inserted into an empty `products` table on startup.

use anyhow::{Context, Result};
use sqlx::{PgPool, Row};
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

const SEED_STOCK: i64 = 100;
const SEED_PRICE: f64 = 15.00;

pub(super) struct CatalogItem {
    pub(super) code: &'static str,
    pub(super) title: &'static str,
    pub(super) description: &'static str,
    pub(super) images: [&'static str; 2],
}

pub(super) const CATALOG: [CatalogItem; 5] = [
    CatalogItem {
        code: "BEAN001",
        title: "Peruvian Whole Bean Coffee",
        description: "High-altitude Arabica beans, perfect for home roasting.",
        images: ["whole_bean1.jpg", "whole_bean2.jpg"],
    },
    CatalogItem {
        code: "DRINK001",
        title: "Classic Cappuccino",
        description: "Espresso with steamed milk and foamed milk.",
        images: ["cappuccino1.jpg", "cappuccino2.jpg"],
    },
    CatalogItem {
        code: "BLEND002",
        title: "Kaffino Signature Blend",
        description: "A unique blend of Peruvian and Ethiopian beans.",
        images: ["signature_blend1.jpg", "signature_blend2.jpg"],
    },
    CatalogItem {
        code: "ACC001",
        title: "French Press",
        description: "Classic coffee brewing device.",
        images: ["french_press1.jpg", "french_press2.jpg"],
    },
    CatalogItem {
        code: "GRIND001",
        title: "Coffee Grinder",
        description: "Electric coffee grinder for home use.",
        images: ["coffee_grinder1.jpg", "coffee_grinder2.jpg"],
    },
];

/// Insert the house catalog when `products` is empty.
///
/// Returns the number of products inserted (0 when the table already had rows).
///
/// # Errors
/// Returns an error if any insert fails; nothing is committed in that case.
pub async fn seed_catalog(pool: &PgPool) -> Result<usize> {
    let mut tx = pool.begin().await.context("failed to begin seed transaction")?;

    let query = "SELECT EXISTS (SELECT 1 FROM products) AS populated";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let populated: bool = sqlx::query(query)
        .fetch_one(&mut *tx)
        .instrument(span)
        .await
        .context("failed to check catalog")?
        .get("populated");

    if populated {
        info!("Catalog already populated");
        return Ok(0);
    }

    let product_query = r"
        INSERT INTO products (code, images, title, description)
        VALUES ($1, $2, $3, $4)
        RETURNING id
    ";
    let inventory_query = r"
        INSERT INTO inventory (product_id, stock, price)
        VALUES ($1, $2, $3)
    ";

    for item in &CATALOG {
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = product_query
        );
        let product_id: Uuid = sqlx::query(product_query)
            .bind(item.code)
            .bind(item.images.map(str::to_string).to_vec())
            .bind(item.title)
            .bind(item.description)
            .fetch_one(&mut *tx)
            .instrument(span)
            .await
            .with_context(|| format!("failed to seed product {}", item.code))?
            .get("id");

        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = inventory_query
        );
        sqlx::query(inventory_query)
            .bind(product_id)
            .bind(SEED_STOCK)
            .bind(SEED_PRICE)
            .execute(&mut *tx)
            .instrument(span)
            .await
            .with_context(|| format!("failed to seed inventory for {}", item.code))?;
    }

    tx.commit().await.context("failed to commit seed transaction")?;
    info!("Seeded catalog with {} products", CATALOG.len());
    Ok(CATALOG.len())
}
