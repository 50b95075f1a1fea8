// crates/db/src/queries.rs
// Read-side queries over imported records.

use batchwright_core::types::JobType;
use serde::Serialize;
use ts_rs::TS;

use crate::{Database, DbResult};

/// Row counts of every record table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, TS)]
#[ts(export, export_to = "../../../bindings/")]
#[serde(rename_all = "camelCase")]
pub struct RecordCounts {
    #[ts(type = "number")]
    pub customers: i64,
    #[ts(type = "number")]
    pub products: i64,
    #[ts(type = "number")]
    pub orders: i64,
    #[ts(type = "number")]
    pub order_lines: i64,
}

/// Table holding the records an import job type writes.
fn table_for(job_type: JobType) -> Option<&'static str> {
    match job_type {
        JobType::Customers => Some("customers"),
        JobType::Products => Some("products"),
        JobType::Orders => Some("orders"),
        JobType::Backup => None,
    }
}

impl Database {
    pub async fn record_counts(&self) -> DbResult<RecordCounts> {
        let (customers, products, orders, order_lines): (i64, i64, i64, i64) = sqlx::query_as(
            r#"SELECT
                (SELECT COUNT(*) FROM customers),
                (SELECT COUNT(*) FROM products),
                (SELECT COUNT(*) FROM orders),
                (SELECT COUNT(*) FROM order_lines)"#,
        )
        .fetch_one(self.pool())
        .await?;

        Ok(RecordCounts {
            customers,
            products,
            orders,
            order_lines,
        })
    }

    /// Number of stored records for an import job type; `None` for job types
    /// that do not write records.
    pub async fn count_records(&self, job_type: JobType) -> DbResult<Option<i64>> {
        let Some(table) = table_for(job_type) else {
            return Ok(None);
        };
        let (count,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(self.pool())
            .await?;
        Ok(Some(count))
    }

    /// Quantities of the lines of one order, in insertion order.
    pub async fn order_line_quantities(&self, order_ref: &str) -> DbResult<Vec<i64>> {
        let rows: Vec<(i64,)> = sqlx::query_as(
            r#"SELECT l.quantity FROM order_lines l
               JOIN orders o ON o.id = l.order_id
               WHERE o.order_ref = ?
               ORDER BY l.id"#,
        )
        .bind(order_ref)
        .fetch_all(self.pool())
        .await?;
        Ok(rows.into_iter().map(|(q,)| q).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_counts_start_at_zero() {
        let db = Database::new_in_memory().await.unwrap();
        assert_eq!(db.record_counts().await.unwrap(), RecordCounts::default());
        assert_eq!(db.count_records(JobType::Products).await.unwrap(), Some(0));
        assert_eq!(db.count_records(JobType::Backup).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_counts_follow_inserts() {
        let db = Database::new_in_memory().await.unwrap();
        sqlx::query(
            "INSERT INTO products (sku, name, price_cents, quantity, created_at) VALUES ('A', 'a', 100, 1, 0)",
        )
        .execute(db.pool())
        .await
        .unwrap();

        let counts = db.record_counts().await.unwrap();
        assert_eq!(counts.products, 1);
        assert_eq!(counts.customers, 0);
        assert_eq!(db.count_records(JobType::Products).await.unwrap(), Some(1));
    }
}
