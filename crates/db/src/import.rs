//! Import sink: writes customers, products and order lines.
//!
//! One SQLite transaction per batch. Each unit runs inside its own
//! `SAVEPOINT`, so a unit that fails halfway leaves nothing behind while its
//! siblings still commit with the batch.

use async_trait::async_trait;
use batchwright_core::artifact::Unit;
use batchwright_core::error::{BatchError, UnitError};
use batchwright_core::sink::{BatchSink, BatchTx, CarryOver, HandlerSet, UnitReport, UnitResult};
use batchwright_core::types::JobType;
use serde::{Deserialize, Serialize};
use sqlx::{Sqlite, SqliteConnection, Transaction};
use std::sync::Arc;

use crate::records::{CustomerRecord, OrderLineRecord, ProductRecord};
use crate::Database;

/// Batch sink for every import job type.
#[derive(Debug, Clone)]
pub struct ImportSink {
    db: Database,
}

impl ImportSink {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Register this sink for every import job type.
    pub fn register(self, handlers: HandlerSet) -> HandlerSet {
        let sink = Arc::new(self);
        JobType::ALL
            .into_iter()
            .filter(|t| t.is_import())
            .fold(handlers, |set, t| set.register(t, sink.clone()))
    }
}

#[async_trait]
impl BatchSink for ImportSink {
    async fn begin(&self, job_type: JobType) -> Result<Box<dyn BatchTx>, BatchError> {
        if !job_type.is_import() {
            return Err(BatchError::NoHandler(job_type));
        }
        let tx = self.db.pool().begin().await.map_err(BatchError::sink)?;
        Ok(Box::new(ImportTx { tx, job_type }))
    }
}

/// Order opened by the last successful order line. Consecutive rows with the
/// same `order_ref` add lines to it instead of opening a new order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenOrder {
    order_ref: String,
    order_id: i64,
    customer_id: i64,
}

enum ImportFailure {
    Unit(UnitError),
    Batch(BatchError),
}

impl From<UnitError> for ImportFailure {
    fn from(err: UnitError) -> Self {
        ImportFailure::Unit(err)
    }
}

impl From<sqlx::Error> for ImportFailure {
    fn from(err: sqlx::Error) -> Self {
        ImportFailure::Batch(BatchError::sink(err))
    }
}

/// Constraint violations belong to the unit; anything else breaks the batch.
fn constraint(err: sqlx::Error, duplicate: impl FnOnce() -> String) -> ImportFailure {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return UnitError::duplicate(duplicate()).into();
        }
        if db_err.is_foreign_key_violation() {
            return UnitError::unresolved(db_err.message().to_string()).into();
        }
        if db_err.is_check_violation() {
            return UnitError::invalid(db_err.message().to_string()).into();
        }
    }
    err.into()
}

struct ImportTx {
    tx: Transaction<'static, Sqlite>,
    job_type: JobType,
}

impl ImportTx {
    async fn savepoint(&mut self, sql: &str) -> Result<(), BatchError> {
        sqlx::query(sql)
            .execute(&mut *self.tx)
            .await
            .map(|_| ())
            .map_err(BatchError::sink)
    }
}

#[async_trait]
impl BatchTx for ImportTx {
    async fn apply(&mut self, unit: &Unit, carry: &mut CarryOver) -> Result<UnitResult, BatchError> {
        self.savepoint("SAVEPOINT unit").await?;
        let conn: &mut SqliteConnection = &mut self.tx;
        let result = match self.job_type {
            JobType::Customers => import_customer(conn, unit).await,
            JobType::Products => import_product(conn, unit).await,
            JobType::Orders => import_order_line(conn, unit, carry).await,
            JobType::Backup => Err(ImportFailure::Batch(BatchError::NoHandler(JobType::Backup))),
        };

        match result {
            Ok(report) => {
                self.savepoint("RELEASE unit").await?;
                Ok(Ok(report))
            }
            Err(ImportFailure::Unit(err)) => {
                self.savepoint("ROLLBACK TO unit").await?;
                self.savepoint("RELEASE unit").await?;
                Ok(Err(err))
            }
            Err(ImportFailure::Batch(err)) => Err(err),
        }
    }

    async fn commit(self: Box<Self>) -> Result<(), BatchError> {
        self.tx.commit().await.map_err(BatchError::sink)
    }

    async fn rollback(self: Box<Self>) -> Result<(), BatchError> {
        self.tx.rollback().await.map_err(BatchError::sink)
    }
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

async fn import_customer(conn: &mut SqliteConnection, unit: &Unit) -> Result<UnitReport, ImportFailure> {
    let customer = CustomerRecord::parse(unit)?;
    sqlx::query(
        "INSERT INTO customers (email, first_name, last_name, city, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&customer.email)
    .bind(&customer.first_name)
    .bind(&customer.last_name)
    .bind(&customer.city)
    .bind(now())
    .execute(&mut *conn)
    .await
    .map_err(|e| constraint(e, || format!("customer {} already exists", customer.email)))?;

    Ok(UnitReport::success(format!(
        "Imported customer {} {} <{}>",
        customer.first_name, customer.last_name, customer.email
    )))
}

async fn import_product(conn: &mut SqliteConnection, unit: &Unit) -> Result<UnitReport, ImportFailure> {
    let product = ProductRecord::parse(unit)?;
    sqlx::query(
        "INSERT INTO products (sku, name, price_cents, quantity, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&product.sku)
    .bind(&product.name)
    .bind(product.price_cents)
    .bind(product.quantity)
    .bind(now())
    .execute(&mut *conn)
    .await
    .map_err(|e| constraint(e, || format!("product {} already exists", product.sku)))?;

    Ok(UnitReport::success(format!(
        "Imported product {} ({})",
        product.sku, product.name
    )))
}

async fn import_order_line(
    conn: &mut SqliteConnection,
    unit: &Unit,
    carry: &mut CarryOver,
) -> Result<UnitReport, ImportFailure> {
    let line = OrderLineRecord::parse(unit)?;

    let customer: Option<(i64,)> = sqlx::query_as("SELECT id FROM customers WHERE email = ?")
        .bind(&line.customer_email)
        .fetch_optional(&mut *conn)
        .await?;
    let Some((customer_id,)) = customer else {
        return Err(UnitError::unresolved(format!("unknown customer {}", line.customer_email)).into());
    };

    let product: Option<(i64, i64)> =
        sqlx::query_as("SELECT id, price_cents FROM products WHERE sku = ?")
            .bind(&line.sku)
            .fetch_optional(&mut *conn)
            .await?;
    let Some((product_id, price_cents)) = product else {
        return Err(UnitError::unresolved(format!("unknown product {}", line.sku)).into());
    };

    let open = carry
        .as_ref()
        .and_then(|value| serde_json::from_value::<OpenOrder>(value.clone()).ok())
        .filter(|open| open.order_ref == line.order_ref);

    let (order_id, opened) = match open {
        Some(open) if open.customer_id != customer_id => {
            return Err(UnitError::invalid(format!(
                "order {} belongs to a different customer",
                line.order_ref
            ))
            .into());
        }
        Some(open) => (open.order_id, false),
        None => {
            let result = sqlx::query(
                "INSERT INTO orders (order_ref, customer_id, created_at) VALUES (?, ?, ?)",
            )
            .bind(&line.order_ref)
            .bind(customer_id)
            .bind(now())
            .execute(&mut *conn)
            .await
            .map_err(|e| constraint(e, || format!("order {} already exists", line.order_ref)))?;
            (result.last_insert_rowid(), true)
        }
    };

    sqlx::query(
        "INSERT INTO order_lines (order_id, product_id, quantity, unit_price_cents) VALUES (?, ?, ?, ?)",
    )
    .bind(order_id)
    .bind(product_id)
    .bind(line.quantity)
    .bind(price_cents)
    .execute(&mut *conn)
    .await
    .map_err(|e| constraint(e, || format!("duplicate line in order {}", line.order_ref)))?;

    let next = OpenOrder {
        order_ref: line.order_ref.clone(),
        order_id,
        customer_id,
    };
    *carry = Some(serde_json::to_value(&next).map_err(|e| ImportFailure::Batch(BatchError::sink(e)))?);

    let message = if opened {
        format!(
            "Opened order {} for {} with {} x {}",
            line.order_ref, line.customer_email, line.quantity, line.sku
        )
    } else {
        format!("Added {} x {} to order {}", line.quantity, line.sku, line.order_ref)
    };
    Ok(UnitReport::success(message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use batchwright_core::error::UnitErrorKind;
    use batchwright_core::types::Cursor;

    fn unit(row: u64, fields: &[&str]) -> Unit {
        Unit {
            row,
            fields: fields.iter().map(|f| f.to_string()).collect(),
            next: Cursor::default(),
        }
    }

    async fn seeded() -> Database {
        let db = Database::new_in_memory().await.unwrap();
        let sink = ImportSink::new(db.clone());

        let mut tx = sink.begin(JobType::Customers).await.unwrap();
        let mut carry = None;
        tx.apply(&unit(1, &["ann@example.com", "Ann", "Lee", "Oslo"]), &mut carry)
            .await
            .unwrap()
            .unwrap();
        tx.commit().await.unwrap();

        let mut tx = sink.begin(JobType::Products).await.unwrap();
        tx.apply(&unit(1, &["SKU-1", "Widget", "2.50", "10"]), &mut carry)
            .await
            .unwrap()
            .unwrap();
        tx.commit().await.unwrap();
        db
    }

    #[tokio::test]
    async fn test_duplicate_key_is_a_unit_error() {
        let db = seeded().await;
        let sink = ImportSink::new(db.clone());
        let mut tx = sink.begin(JobType::Customers).await.unwrap();
        let mut carry = None;

        let err = tx
            .apply(&unit(2, &["ANN@example.com", "Ann", "Lee", "Oslo"]), &mut carry)
            .await
            .unwrap()
            .unwrap_err();
        assert_eq!(err.kind, UnitErrorKind::DuplicateKey);

        // The transaction is still usable after the rolled-back savepoint.
        tx.apply(&unit(3, &["bob@example.com", "Bob", "Ray", ""]), &mut carry)
            .await
            .unwrap()
            .unwrap();
        tx.commit().await.unwrap();
        assert_eq!(db.record_counts().await.unwrap().customers, 2);
    }

    #[tokio::test]
    async fn test_rollback_discards_applied_units() {
        let db = Database::new_in_memory().await.unwrap();
        let sink = ImportSink::new(db.clone());
        let mut tx = sink.begin(JobType::Products).await.unwrap();
        let mut carry = None;
        tx.apply(&unit(1, &["A", "a", "1", "1"]), &mut carry)
            .await
            .unwrap()
            .unwrap();
        tx.rollback().await.unwrap();
        assert_eq!(db.record_counts().await.unwrap().products, 0);
    }

    #[tokio::test]
    async fn test_order_lines_share_an_open_order() {
        let db = seeded().await;
        let sink = ImportSink::new(db.clone());
        let mut tx = sink.begin(JobType::Orders).await.unwrap();
        let mut carry = None;

        let first = tx
            .apply(&unit(1, &["R-1", "ann@example.com", "SKU-1", "2"]), &mut carry)
            .await
            .unwrap()
            .unwrap();
        assert!(first.message.starts_with("Opened order R-1"));
        let second = tx
            .apply(&unit(2, &["R-1", "ann@example.com", "SKU-1", "3"]), &mut carry)
            .await
            .unwrap()
            .unwrap();
        assert!(second.message.starts_with("Added 3 x SKU-1"));
        tx.commit().await.unwrap();

        let counts = db.record_counts().await.unwrap();
        assert_eq!(counts.orders, 1);
        assert_eq!(counts.order_lines, 2);
        assert_eq!(db.order_line_quantities("R-1").await.unwrap(), vec![2, 3]);

        let open: OpenOrder = serde_json::from_value(carry.unwrap()).unwrap();
        assert_eq!(open.order_ref, "R-1");
    }

    #[tokio::test]
    async fn test_unknown_references_leave_no_partial_order() {
        let db = seeded().await;
        let sink = ImportSink::new(db.clone());
        let mut tx = sink.begin(JobType::Orders).await.unwrap();
        let mut carry = None;

        let err = tx
            .apply(&unit(1, &["R-9", "nobody@example.com", "SKU-1", "1"]), &mut carry)
            .await
            .unwrap()
            .unwrap_err();
        assert_eq!(err.kind, UnitErrorKind::UnresolvedReference);

        let err = tx
            .apply(&unit(2, &["R-9", "ann@example.com", "NOPE", "1"]), &mut carry)
            .await
            .unwrap()
            .unwrap_err();
        assert_eq!(err.kind, UnitErrorKind::UnresolvedReference);
        assert!(carry.is_none());
        tx.commit().await.unwrap();

        assert_eq!(db.record_counts().await.unwrap().orders, 0);
    }

    #[tokio::test]
    async fn test_backup_is_not_an_import_type() {
        let db = Database::new_in_memory().await.unwrap();
        let sink = ImportSink::new(db);
        assert!(matches!(
            sink.begin(JobType::Backup).await,
            Err(BatchError::NoHandler(JobType::Backup))
        ));
        let handlers = sink.register(HandlerSet::new());
        assert!(handlers.supports(JobType::Orders));
        assert!(!handlers.supports(JobType::Backup));
    }
}
