//! Catalog queries.

use anyhow::{Context, Result};
use sqlx::{postgres::PgRow, PgPool, Row};
use tracing::{info_span, Instrument};
use uuid::Uuid;

use super::types::{Product, ProductInput};
use crate::api::handlers::is_unique_violation;

const LIST_LIMIT: i64 = 10;

// Products are joined with their first inventory row; a product without one
// reports no stock and no price.
const PRODUCT_SELECT: &str = r"
    SELECT p.id, p.code, p.images, p.title, p.description, p.created_at, p.updated_at,
           i.stock, i.price
    FROM products p
    LEFT JOIN LATERAL (
        SELECT stock, price
        FROM inventory
        WHERE inventory.product_id = p.id
        ORDER BY inventory.created_at
        LIMIT 1
    ) i ON TRUE
";

#[derive(Debug)]
pub(super) enum WriteOutcome {
    Saved(Product),
    DuplicateCode,
    NotFound,
}

fn product_from_row(row: &PgRow) -> Product {
    Product {
        id: row.get("id"),
        code: row.get("code"),
        images: row.get("images"),
        title: row.get("title"),
        description: row.get("description"),
        stock: row.get("stock"),
        price: row.get("price"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

pub(super) async fn list_products(pool: &PgPool) -> Result<Vec<Product>> {
    let query = format!("{PRODUCT_SELECT} ORDER BY p.title LIMIT $1");
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let rows = sqlx::query(&query)
        .bind(LIST_LIMIT)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to list products")?;
    Ok(rows.iter().map(product_from_row).collect())
}

pub(super) async fn get_product(pool: &PgPool, id: Uuid) -> Result<Option<Product>> {
    let query = format!("{PRODUCT_SELECT} WHERE p.id = $1");
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to get product")?;
    Ok(row.as_ref().map(product_from_row))
}

pub(super) async fn insert_product(pool: &PgPool, input: &ProductInput) -> Result<WriteOutcome> {
    let query = r"
        INSERT INTO products (code, images, title, description)
        VALUES ($1, $2, $3, $4)
        RETURNING id, code, images, title, description, created_at, updated_at,
                  NULL::BIGINT AS stock, NULL::DOUBLE PRECISION AS price
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(&input.code)
        .bind(&input.images)
        .bind(&input.title)
        .bind(&input.description)
        .fetch_one(pool)
        .instrument(span)
        .await;

    match result {
        Ok(row) => Ok(WriteOutcome::Saved(product_from_row(&row))),
        Err(err) if is_unique_violation(&err) => Ok(WriteOutcome::DuplicateCode),
        Err(err) => Err(err).context("failed to insert product"),
    }
}

pub(super) async fn update_product(
    pool: &PgPool,
    id: Uuid,
    input: &ProductInput,
) -> Result<WriteOutcome> {
    let query = r"
        UPDATE products
        SET code = $1, images = $2, title = $3, description = $4, updated_at = NOW()
        WHERE id = $5
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(&input.code)
        .bind(&input.images)
        .bind(&input.title)
        .bind(&input.description)
        .bind(id)
        .execute(pool)
        .instrument(span)
        .await;

    match result {
        Ok(done) if done.rows_affected() == 0 => Ok(WriteOutcome::NotFound),
        Ok(_) => Ok(get_product(pool, id)
            .await?
            .map_or(WriteOutcome::NotFound, WriteOutcome::Saved)),
        Err(err) if is_unique_violation(&err) => Ok(WriteOutcome::DuplicateCode),
        Err(err) => Err(err).context("failed to update product"),
    }
}

/// Delete a product and, through the foreign key, its inventory.
/// Returns `false` when no product had that id.
pub(super) async fn delete_product(pool: &PgPool, id: Uuid) -> Result<bool> {
    let query = "DELETE FROM products WHERE id = $1";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    let done = sqlx::query(query)
        .bind(id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to delete product")?;
    Ok(done.rows_affected() > 0)
}
