//! Postgres-backed ledger store.
//!
//! One engine transaction is one SQL transaction. Balance and consignment
//! reads use `SELECT ... FOR UPDATE`, and every update is guarded by
//! `WHERE version = $n`, so a stale write affects zero rows and surfaces as
//! [`StoreError::Conflict`].
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (serialization failure / deadlock) | `40001` / `40P01` | `Conflict` |
//! | Database (check / foreign key violation) | `23514` / `23503` | `Backend` |
//! | ColumnDecode / ColumnNotFound | N/A | `Corrupt` |
//! | Other | N/A | `Backend` |
//!
//! ## Runtime
//!
//! The store traits are synchronous. The store owns a tokio runtime and blocks
//! on it, so it must not be called from inside another async runtime.

use anyhow::Context;
use rust_decimal::Decimal;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use supplyledger_audit::{
    AdjustmentFilter, DiscrepancyFilter, WarehouseBalanceAdjustment, WarehouseDiscrepancy,
};
use supplyledger_core::{
    AggregateRoot, ExpectedVersion, ItemId, Money, ProductId, Quantity, ReasonId, RoundingPolicy,
    TransferId, UnitPrice, WarehouseId,
};
use supplyledger_ledger::{BalanceKey, Driver, OwnerKind, ProductBalance, Warehouse};
use supplyledger_transfers::{ProductTransfer, WithdrawalReason};
use supplyledger_withdrawals::{Consignment, ConsignmentItem, ConsignmentKind, Shipment, Vehicle};

use super::{
    AuditRepository, BalanceRepository, ConsignmentRepository, LedgerStore, LedgerTx,
    ReasonRepository, StoreError, StoreResult, TransferRepository,
};
use crate::config::EngineConfig;
use crate::error::EngineError;

const SCHEMA: &str = include_str!("../../migrations/0001_ledger.sql");

#[derive(Debug)]
pub struct PostgresLedgerStore {
    pool: PgPool,
    runtime: tokio::runtime::Runtime,
    policy: RoundingPolicy,
}

impl PostgresLedgerStore {
    /// Connect using `database.url` / `database.max_connections`.
    pub fn connect(config: &EngineConfig) -> anyhow::Result<Self> {
        let url = config
            .database
            .url
            .as_deref()
            .context("database.url is not configured")?;
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .context("failed to start the database runtime")?;
        let pool = runtime
            .block_on(
                PgPoolOptions::new()
                    .max_connections(config.database.max_connections)
                    .connect(url),
            )
            .context("failed to connect to postgres")?;

        Ok(Self {
            pool,
            runtime,
            policy: config.rounding,
        })
    }

    /// Create the ledger tables if they do not exist yet.
    pub fn apply_schema(&self) -> anyhow::Result<()> {
        self.runtime
            .block_on(sqlx::raw_sql(SCHEMA).execute(&self.pool))
            .context("failed to apply the ledger schema")?;
        Ok(())
    }
}

impl LedgerStore for PostgresLedgerStore {
    fn transaction<T, F>(&self, work: F) -> Result<T, EngineError>
    where
        F: FnOnce(&mut dyn LedgerTx) -> Result<T, EngineError>,
    {
        let handle = self.runtime.handle().clone();
        let tx = handle
            .block_on(self.pool.begin())
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let mut pg = PgTx {
            tx,
            handle: handle.clone(),
            policy: self.policy,
        };

        match work(&mut pg) {
            Ok(out) => {
                handle
                    .block_on(pg.tx.commit())
                    .map_err(|e| map_sqlx_error("commit_transaction", e))?;
                Ok(out)
            }
            Err(err) => {
                if let Err(rollback) = handle.block_on(pg.tx.rollback()) {
                    tracing::warn!(error = %rollback, "rollback failed");
                }
                Err(err)
            }
        }
    }
}

struct PgTx {
    tx: Transaction<'static, Postgres>,
    handle: tokio::runtime::Handle,
    policy: RoundingPolicy,
}

fn stale(what: impl core::fmt::Display, expected: ExpectedVersion) -> StoreError {
    StoreError::Conflict(format!("{what}: expected {expected:?}, row changed or vanished"))
}

impl<K: OwnerKind> BalanceRepository<K> for PgTx {
    #[instrument(skip(self), fields(owner = %K::KIND, key = %key), err)]
    fn find(&mut self, key: &BalanceKey<K>) -> StoreResult<Option<ProductBalance<K>>> {
        let (tx, policy) = (&mut self.tx, self.policy);
        let owner: Uuid = key.owner_id.into();
        let row = self
            .handle
            .block_on(
                sqlx::query(
                    r#"
                    SELECT quantity, total_cost, version
                    FROM product_balances
                    WHERE owner_kind = $1 AND owner_id = $2 AND product_id = $3
                    FOR UPDATE
                    "#,
                )
                .bind(K::KIND.as_str())
                .bind(owner)
                .bind(*key.product_id.as_uuid())
                .fetch_optional(&mut **tx),
            )
            .map_err(|e| map_sqlx_error("find_balance", e))?;

        row.map(|row| balance_from_row(*key, &row, policy)).transpose()
    }

    #[instrument(skip(self, balance), fields(owner = %K::KIND, key = %balance.key()), err)]
    fn save(&mut self, balance: &ProductBalance<K>, expected: ExpectedVersion) -> StoreResult<u64> {
        let tx = &mut self.tx;
        let owner: Uuid = balance.owner_id().into();
        let product = *balance.product_id().as_uuid();
        let (quantity, total_cost, average) = (
            balance.quantity().value(),
            balance.total_cost().value(),
            balance.average_unit_cost().value(),
        );

        match expected {
            ExpectedVersion::Exact(0) => {
                let done = self
                    .handle
                    .block_on(
                        sqlx::query(
                            r#"
                            INSERT INTO product_balances
                                (owner_kind, owner_id, product_id, quantity, total_cost, average_unit_cost, version)
                            VALUES ($1, $2, $3, $4, $5, $6, 1)
                            ON CONFLICT DO NOTHING
                            "#,
                        )
                        .bind(K::KIND.as_str())
                        .bind(owner)
                        .bind(product)
                        .bind(quantity)
                        .bind(total_cost)
                        .bind(average)
                        .execute(&mut **tx),
                    )
                    .map_err(|e| map_sqlx_error("insert_balance", e))?;
                if done.rows_affected() == 0 {
                    return Err(stale(balance.key(), expected));
                }
                Ok(1)
            }
            ExpectedVersion::Exact(version) => {
                let done = self
                    .handle
                    .block_on(
                        sqlx::query(
                            r#"
                            UPDATE product_balances
                            SET quantity = $4, total_cost = $5, average_unit_cost = $6, version = version + 1
                            WHERE owner_kind = $1 AND owner_id = $2 AND product_id = $3 AND version = $7
                            "#,
                        )
                        .bind(K::KIND.as_str())
                        .bind(owner)
                        .bind(product)
                        .bind(quantity)
                        .bind(total_cost)
                        .bind(average)
                        .bind(version as i64)
                        .execute(&mut **tx),
                    )
                    .map_err(|e| map_sqlx_error("update_balance", e))?;
                if done.rows_affected() == 0 {
                    return Err(stale(balance.key(), expected));
                }
                Ok(version + 1)
            }
            ExpectedVersion::Any => {
                let row = self
                    .handle
                    .block_on(
                        sqlx::query(
                            r#"
                            INSERT INTO product_balances
                                (owner_kind, owner_id, product_id, quantity, total_cost, average_unit_cost, version)
                            VALUES ($1, $2, $3, $4, $5, $6, 1)
                            ON CONFLICT (owner_kind, owner_id, product_id) DO UPDATE
                            SET quantity = EXCLUDED.quantity,
                                total_cost = EXCLUDED.total_cost,
                                average_unit_cost = EXCLUDED.average_unit_cost,
                                version = product_balances.version + 1
                            RETURNING version
                            "#,
                        )
                        .bind(K::KIND.as_str())
                        .bind(owner)
                        .bind(product)
                        .bind(quantity)
                        .bind(total_cost)
                        .bind(average)
                        .fetch_one(&mut **tx),
                    )
                    .map_err(|e| map_sqlx_error("upsert_balance", e))?;
                version_of(&row)
            }
        }
    }

    #[instrument(skip(self), fields(owner = %K::KIND, key = %key), err)]
    fn delete(&mut self, key: &BalanceKey<K>, expected: ExpectedVersion) -> StoreResult<()> {
        let tx = &mut self.tx;
        let owner: Uuid = key.owner_id.into();
        let version = match expected {
            ExpectedVersion::Any => None,
            ExpectedVersion::Exact(0) => return Ok(()),
            ExpectedVersion::Exact(v) => Some(v as i64),
        };
        let done = self
            .handle
            .block_on(
                sqlx::query(
                    r#"
                    DELETE FROM product_balances
                    WHERE owner_kind = $1 AND owner_id = $2 AND product_id = $3
                      AND ($4::BIGINT IS NULL OR version = $4)
                    "#,
                )
                .bind(K::KIND.as_str())
                .bind(owner)
                .bind(*key.product_id.as_uuid())
                .bind(version)
                .execute(&mut **tx),
            )
            .map_err(|e| map_sqlx_error("delete_balance", e))?;
        if version.is_some() && done.rows_affected() == 0 {
            return Err(stale(key, expected));
        }
        Ok(())
    }

    fn list_by_owner(&mut self, owner_id: K::Id) -> StoreResult<Vec<ProductBalance<K>>> {
        let owner: Uuid = owner_id.into();
        self.list_balances("owner_id = $2", Some(owner))
    }

    fn list_by_product(&mut self, product_id: ProductId) -> StoreResult<Vec<ProductBalance<K>>> {
        self.list_balances("product_id = $2", Some(*product_id.as_uuid()))
    }

    fn list_positive(&mut self) -> StoreResult<Vec<ProductBalance<K>>> {
        self.list_balances("quantity > 0 AND $2::UUID IS NULL", None)
    }
}

impl PgTx {
    fn list_balances<K: OwnerKind>(
        &mut self,
        condition: &str,
        arg: Option<Uuid>,
    ) -> StoreResult<Vec<ProductBalance<K>>> {
        let (tx, policy) = (&mut self.tx, self.policy);
        let sql = format!(
            "SELECT owner_id, product_id, quantity, total_cost, version \
             FROM product_balances WHERE owner_kind = $1 AND {condition} \
             ORDER BY owner_id, product_id"
        );
        let rows = self
            .handle
            .block_on(
                sqlx::query(&sql)
                    .bind(K::KIND.as_str())
                    .bind(arg)
                    .fetch_all(&mut **tx),
            )
            .map_err(|e| map_sqlx_error("list_balances", e))?;

        rows.iter()
            .map(|row| {
                let owner: Uuid = get(row, "owner_id")?;
                let product: Uuid = get(row, "product_id")?;
                let key = BalanceKey::new(K::Id::from(owner), ProductId::from(product));
                balance_from_row(key, row, policy)
            })
            .collect()
    }
}

impl<K: ConsignmentKind> ConsignmentRepository<K> for PgTx {
    #[instrument(skip(self), fields(kind = %K::KIND, id = %id), err)]
    fn find(&mut self, id: K::Id) -> StoreResult<Option<Consignment<K>>> {
        let tx = &mut self.tx;
        let row = self
            .handle
            .block_on(
                sqlx::query(
                    r#"
                    SELECT running_total_cost, version
                    FROM consignments
                    WHERE owner_kind = $1 AND owner_id = $2
                    FOR UPDATE
                    "#,
                )
                .bind(K::KIND.as_str())
                .bind(Into::<Uuid>::into(id))
                .fetch_optional(&mut **tx),
            )
            .map_err(|e| map_sqlx_error("find_consignment", e))?;

        row.map(|row| {
            let total = money(&row, "running_total_cost")?;
            let version = version_of(&row)?;
            Ok(Consignment::restore(id, total, version))
        })
        .transpose()
    }

    #[instrument(skip(self, consignment), fields(kind = %K::KIND, id = %consignment.id()), err)]
    fn save(&mut self, consignment: &Consignment<K>, expected: ExpectedVersion) -> StoreResult<u64> {
        let tx = &mut self.tx;
        let id: Uuid = (*consignment.id()).into();
        let total = consignment.running_total_cost().value();
        let what = format!("{} {}", K::KIND, consignment.id());

        match expected {
            ExpectedVersion::Exact(0) => {
                let done = self
                    .handle
                    .block_on(
                        sqlx::query(
                            r#"
                            INSERT INTO consignments (owner_kind, owner_id, running_total_cost, version)
                            VALUES ($1, $2, $3, 1)
                            ON CONFLICT DO NOTHING
                            "#,
                        )
                        .bind(K::KIND.as_str())
                        .bind(id)
                        .bind(total)
                        .execute(&mut **tx),
                    )
                    .map_err(|e| map_sqlx_error("insert_consignment", e))?;
                if done.rows_affected() == 0 {
                    return Err(stale(what, expected));
                }
                Ok(1)
            }
            ExpectedVersion::Exact(version) => {
                let done = self
                    .handle
                    .block_on(
                        sqlx::query(
                            r#"
                            UPDATE consignments
                            SET running_total_cost = $3, version = version + 1
                            WHERE owner_kind = $1 AND owner_id = $2 AND version = $4
                            "#,
                        )
                        .bind(K::KIND.as_str())
                        .bind(id)
                        .bind(total)
                        .bind(version as i64)
                        .execute(&mut **tx),
                    )
                    .map_err(|e| map_sqlx_error("update_consignment", e))?;
                if done.rows_affected() == 0 {
                    return Err(stale(what, expected));
                }
                Ok(version + 1)
            }
            ExpectedVersion::Any => {
                let row = self
                    .handle
                    .block_on(
                        sqlx::query(
                            r#"
                            INSERT INTO consignments (owner_kind, owner_id, running_total_cost, version)
                            VALUES ($1, $2, $3, 1)
                            ON CONFLICT (owner_kind, owner_id) DO UPDATE
                            SET running_total_cost = EXCLUDED.running_total_cost,
                                version = consignments.version + 1
                            RETURNING version
                            "#,
                        )
                        .bind(K::KIND.as_str())
                        .bind(id)
                        .bind(total)
                        .fetch_one(&mut **tx),
                    )
                    .map_err(|e| map_sqlx_error("upsert_consignment", e))?;
                version_of(&row)
            }
        }
    }

    #[instrument(skip(self), fields(kind = %K::KIND, id = %id), err)]
    fn delete(&mut self, id: K::Id, expected: ExpectedVersion) -> StoreResult<()> {
        let tx = &mut self.tx;
        let version = match expected {
            ExpectedVersion::Any => None,
            ExpectedVersion::Exact(0) => return Ok(()),
            ExpectedVersion::Exact(v) => Some(v as i64),
        };
        // Item lines go with the consignment (ON DELETE CASCADE).
        let done = self
            .handle
            .block_on(
                sqlx::query(
                    r#"
                    DELETE FROM consignments
                    WHERE owner_kind = $1 AND owner_id = $2
                      AND ($3::BIGINT IS NULL OR version = $3)
                    "#,
                )
                .bind(K::KIND.as_str())
                .bind(Into::<Uuid>::into(id))
                .bind(version)
                .execute(&mut **tx),
            )
            .map_err(|e| map_sqlx_error("delete_consignment", e))?;
        if version.is_some() && done.rows_affected() == 0 {
            return Err(stale(format_args!("{} {id}", K::KIND), expected));
        }
        Ok(())
    }

    fn find_item(&mut self, id: K::Id, item_id: ItemId) -> StoreResult<Option<ConsignmentItem<K>>> {
        let tx = &mut self.tx;
        let row = self
            .handle
            .block_on(
                sqlx::query(
                    r#"
                    SELECT item_id, owner_id, warehouse_id, product_id, quantity, unit_cost,
                           total_cost, created_by, created_at, updated_at
                    FROM consignment_items
                    WHERE owner_kind = $1 AND owner_id = $2 AND item_id = $3
                    "#,
                )
                .bind(K::KIND.as_str())
                .bind(Into::<Uuid>::into(id))
                .bind(*item_id.as_uuid())
                .fetch_optional(&mut **tx),
            )
            .map_err(|e| map_sqlx_error("find_item", e))?;

        row.as_ref().map(item_from_row).transpose()
    }

    fn list_items(&mut self, id: K::Id) -> StoreResult<Vec<ConsignmentItem<K>>> {
        let tx = &mut self.tx;
        let rows = self
            .handle
            .block_on(
                sqlx::query(
                    r#"
                    SELECT item_id, owner_id, warehouse_id, product_id, quantity, unit_cost,
                           total_cost, created_by, created_at, updated_at
                    FROM consignment_items
                    WHERE owner_kind = $1 AND owner_id = $2
                    ORDER BY created_at, item_id
                    "#,
                )
                .bind(K::KIND.as_str())
                .bind(Into::<Uuid>::into(id))
                .fetch_all(&mut **tx),
            )
            .map_err(|e| map_sqlx_error("list_items", e))?;

        rows.iter().map(item_from_row).collect()
    }

    fn save_item(&mut self, item: &ConsignmentItem<K>) -> StoreResult<()> {
        let tx = &mut self.tx;
        self.handle
            .block_on(
                sqlx::query(
                    r#"
                    INSERT INTO consignment_items
                        (item_id, owner_kind, owner_id, warehouse_id, product_id, quantity,
                         unit_cost, total_cost, created_by, created_at, updated_at)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                    ON CONFLICT (item_id) DO UPDATE
                    SET quantity = EXCLUDED.quantity,
                        unit_cost = EXCLUDED.unit_cost,
                        total_cost = EXCLUDED.total_cost,
                        updated_at = EXCLUDED.updated_at
                    "#,
                )
                .bind(*item.id.as_uuid())
                .bind(K::KIND.as_str())
                .bind(Into::<Uuid>::into(item.consignment_id))
                .bind(*item.warehouse_id.as_uuid())
                .bind(*item.product_id.as_uuid())
                .bind(item.quantity.value())
                .bind(item.unit_cost.value())
                .bind(item.total_cost.value())
                .bind(*item.created_by.as_uuid())
                .bind(item.created_at)
                .bind(item.updated_at)
                .execute(&mut **tx),
            )
            .map_err(|e| map_sqlx_error("save_item", e))?;
        Ok(())
    }

    fn delete_item(&mut self, item_id: ItemId) -> StoreResult<()> {
        let tx = &mut self.tx;
        self.handle
            .block_on(
                sqlx::query("DELETE FROM consignment_items WHERE item_id = $1")
                    .bind(*item_id.as_uuid())
                    .execute(&mut **tx),
            )
            .map_err(|e| map_sqlx_error("delete_item", e))?;
        Ok(())
    }
}

const TRANSFER_COLUMNS: &str = "transfer_id, warehouse_id, from_product, to_product, quantity, \
     unit_price, total_cost, reason_id, description, user_id, created_at, updated_at";

impl TransferRepository for PgTx {
    fn find(&mut self, id: TransferId) -> StoreResult<Option<ProductTransfer>> {
        let tx = &mut self.tx;
        let sql = format!("SELECT {TRANSFER_COLUMNS} FROM product_transfers WHERE transfer_id = $1 FOR UPDATE");
        let row = self
            .handle
            .block_on(sqlx::query(&sql).bind(*id.as_uuid()).fetch_optional(&mut **tx))
            .map_err(|e| map_sqlx_error("find_transfer", e))?;
        row.as_ref().map(transfer_from_row).transpose()
    }

    fn save(&mut self, transfer: &ProductTransfer) -> StoreResult<()> {
        let tx = &mut self.tx;
        self.handle
            .block_on(
                sqlx::query(
                    r#"
                    INSERT INTO product_transfers
                        (transfer_id, warehouse_id, from_product, to_product, quantity, unit_price,
                         total_cost, reason_id, description, user_id, created_at, updated_at)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                    ON CONFLICT (transfer_id) DO UPDATE
                    SET quantity = EXCLUDED.quantity,
                        total_cost = EXCLUDED.total_cost,
                        reason_id = EXCLUDED.reason_id,
                        description = EXCLUDED.description,
                        updated_at = EXCLUDED.updated_at
                    "#,
                )
                .bind(*transfer.id.as_uuid())
                .bind(*transfer.warehouse_id.as_uuid())
                .bind(*transfer.from_product.as_uuid())
                .bind(*transfer.to_product.as_uuid())
                .bind(transfer.quantity.value())
                .bind(transfer.unit_price.value())
                .bind(transfer.total_cost.value())
                .bind(*transfer.reason_id.as_uuid())
                .bind(transfer.description.as_deref())
                .bind(*transfer.user_id.as_uuid())
                .bind(transfer.created_at)
                .bind(transfer.updated_at)
                .execute(&mut **tx),
            )
            .map_err(|e| map_sqlx_error("save_transfer", e))?;
        Ok(())
    }

    fn delete(&mut self, id: TransferId) -> StoreResult<()> {
        let tx = &mut self.tx;
        self.handle
            .block_on(
                sqlx::query("DELETE FROM product_transfers WHERE transfer_id = $1")
                    .bind(*id.as_uuid())
                    .execute(&mut **tx),
            )
            .map_err(|e| map_sqlx_error("delete_transfer", e))?;
        Ok(())
    }

    fn list_by_warehouse(&mut self, warehouse_id: WarehouseId) -> StoreResult<Vec<ProductTransfer>> {
        let tx = &mut self.tx;
        let sql = format!(
            "SELECT {TRANSFER_COLUMNS} FROM product_transfers WHERE warehouse_id = $1 \
             ORDER BY created_at, transfer_id"
        );
        let rows = self
            .handle
            .block_on(sqlx::query(&sql).bind(*warehouse_id.as_uuid()).fetch_all(&mut **tx))
            .map_err(|e| map_sqlx_error("list_transfers", e))?;
        rows.iter().map(transfer_from_row).collect()
    }
}

impl AuditRepository for PgTx {
    fn append_discrepancy(&mut self, record: &WarehouseDiscrepancy) -> StoreResult<()> {
        let tx = &mut self.tx;
        self.handle
            .block_on(
                sqlx::query(
                    r#"
                    INSERT INTO warehouse_discrepancies
                        (record_id, driver_id, product_id, warehouse_id, purchased_quantity,
                         received_quantity, discrepancy_quantity, unit_price, discrepancy_value,
                         discrepancy_type, user_id, recorded_at)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                    "#,
                )
                .bind(*record.id.as_uuid())
                .bind(*record.driver_id.as_uuid())
                .bind(*record.product_id.as_uuid())
                .bind(*record.warehouse_id.as_uuid())
                .bind(record.purchased_quantity.value())
                .bind(record.received_quantity.value())
                .bind(record.discrepancy_quantity)
                .bind(record.unit_price.value())
                .bind(record.discrepancy_value.value())
                .bind(record.discrepancy_type.as_str())
                .bind(*record.user_id.as_uuid())
                .bind(record.recorded_at)
                .execute(&mut **tx),
            )
            .map_err(|e| map_sqlx_error("append_discrepancy", e))?;
        Ok(())
    }

    fn append_adjustment(&mut self, record: &WarehouseBalanceAdjustment) -> StoreResult<()> {
        let tx = &mut self.tx;
        self.handle
            .block_on(
                sqlx::query(
                    r#"
                    INSERT INTO warehouse_balance_adjustments
                        (record_id, warehouse_id, product_id, previous_quantity, new_quantity,
                         previous_total_cost, new_total_cost, previous_average, new_average,
                         adjustment_type, description, user_id, recorded_at)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
                    "#,
                )
                .bind(*record.id.as_uuid())
                .bind(*record.warehouse_id.as_uuid())
                .bind(*record.product_id.as_uuid())
                .bind(record.previous_quantity.value())
                .bind(record.new_quantity.value())
                .bind(record.previous_total_cost.value())
                .bind(record.new_total_cost.value())
                .bind(record.previous_average.value())
                .bind(record.new_average.value())
                .bind(record.adjustment_type.as_str())
                .bind(record.description.as_deref())
                .bind(*record.user_id.as_uuid())
                .bind(record.recorded_at)
                .execute(&mut **tx),
            )
            .map_err(|e| map_sqlx_error("append_adjustment", e))?;
        Ok(())
    }

    fn list_discrepancies(&mut self, filter: &DiscrepancyFilter) -> StoreResult<Vec<WarehouseDiscrepancy>> {
        let tx = &mut self.tx;
        let rows = self
            .handle
            .block_on(
                sqlx::query(
                    r#"
                    SELECT record_id, driver_id, product_id, warehouse_id, purchased_quantity,
                           received_quantity, discrepancy_quantity, unit_price, discrepancy_value,
                           discrepancy_type, user_id, recorded_at
                    FROM warehouse_discrepancies
                    WHERE ($1::UUID IS NULL OR warehouse_id = $1)
                      AND ($2::UUID IS NULL OR driver_id = $2)
                      AND ($3::UUID IS NULL OR product_id = $3)
                      AND ($4::TEXT IS NULL OR discrepancy_type = $4)
                      AND ($5::TIMESTAMPTZ IS NULL OR recorded_at >= $5)
                      AND ($6::TIMESTAMPTZ IS NULL OR recorded_at <= $6)
                    ORDER BY recorded_at, record_id
                    "#,
                )
                .bind(filter.warehouse_id.map(|id| *id.as_uuid()))
                .bind(filter.driver_id.map(|id| *id.as_uuid()))
                .bind(filter.product_id.map(|id| *id.as_uuid()))
                .bind(filter.discrepancy_type.map(|t| t.as_str()))
                .bind(filter.recorded_from)
                .bind(filter.recorded_to)
                .fetch_all(&mut **tx),
            )
            .map_err(|e| map_sqlx_error("list_discrepancies", e))?;
        rows.iter().map(discrepancy_from_row).collect()
    }

    fn list_adjustments(&mut self, filter: &AdjustmentFilter) -> StoreResult<Vec<WarehouseBalanceAdjustment>> {
        let tx = &mut self.tx;
        let rows = self
            .handle
            .block_on(
                sqlx::query(
                    r#"
                    SELECT record_id, warehouse_id, product_id, previous_quantity, new_quantity,
                           previous_total_cost, new_total_cost, previous_average, new_average,
                           adjustment_type, description, user_id, recorded_at
                    FROM warehouse_balance_adjustments
                    WHERE ($1::UUID IS NULL OR warehouse_id = $1)
                      AND ($2::UUID IS NULL OR product_id = $2)
                    ORDER BY recorded_at, record_id
                    "#,
                )
                .bind(filter.warehouse_id.map(|id| *id.as_uuid()))
                .bind(filter.product_id.map(|id| *id.as_uuid()))
                .fetch_all(&mut **tx),
            )
            .map_err(|e| map_sqlx_error("list_adjustments", e))?;
        rows.iter().map(adjustment_from_row).collect()
    }
}

impl ReasonRepository for PgTx {
    fn find(&mut self, id: ReasonId) -> StoreResult<Option<WithdrawalReason>> {
        let tx = &mut self.tx;
        let row = self
            .handle
            .block_on(
                sqlx::query("SELECT reason_id, name, purpose FROM withdrawal_reasons WHERE reason_id = $1")
                    .bind(*id.as_uuid())
                    .fetch_optional(&mut **tx),
            )
            .map_err(|e| map_sqlx_error("find_reason", e))?;

        row.map(|row| {
            let name: String = get(&row, "name")?;
            let purpose: String = get(&row, "purpose")?;
            let purpose = purpose.parse().map_err(StoreError::Corrupt)?;
            Ok(WithdrawalReason::new(id, name, purpose))
        })
        .transpose()
    }

    fn save(&mut self, reason: &WithdrawalReason) -> StoreResult<()> {
        let tx = &mut self.tx;
        self.handle
            .block_on(
                sqlx::query(
                    r#"
                    INSERT INTO withdrawal_reasons (reason_id, name, purpose)
                    VALUES ($1, $2, $3)
                    ON CONFLICT (reason_id) DO UPDATE
                    SET name = EXCLUDED.name, purpose = EXCLUDED.purpose
                    "#,
                )
                .bind(*reason.id.as_uuid())
                .bind(&reason.name)
                .bind(reason.purpose.as_str())
                .execute(&mut **tx),
            )
            .map_err(|e| map_sqlx_error("save_reason", e))?;
        Ok(())
    }
}

impl LedgerTx for PgTx {
    fn warehouse_balances(&mut self) -> &mut dyn BalanceRepository<Warehouse> {
        self
    }

    fn driver_balances(&mut self) -> &mut dyn BalanceRepository<Driver> {
        self
    }

    fn vehicles(&mut self) -> &mut dyn ConsignmentRepository<Vehicle> {
        self
    }

    fn shipments(&mut self) -> &mut dyn ConsignmentRepository<Shipment> {
        self
    }

    fn transfers(&mut self) -> &mut dyn TransferRepository {
        self
    }

    fn audit(&mut self) -> &mut dyn AuditRepository {
        self
    }

    fn reasons(&mut self) -> &mut dyn ReasonRepository {
        self
    }
}

// Row decoding

fn get<'r, T>(row: &'r PgRow, column: &str) -> StoreResult<T>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(column)
        .map_err(|e| StoreError::Corrupt(format!("column {column}: {e}")))
}

fn corrupt(column: &str, err: impl core::fmt::Display) -> StoreError {
    StoreError::Corrupt(format!("column {column}: {err}"))
}

fn quantity(row: &PgRow, column: &str) -> StoreResult<Quantity> {
    let value: Decimal = get(row, column)?;
    Quantity::new(value).map_err(|e| corrupt(column, e))
}

fn money(row: &PgRow, column: &str) -> StoreResult<Money> {
    let value: Decimal = get(row, column)?;
    Money::new(value).map_err(|e| corrupt(column, e))
}

fn price(row: &PgRow, column: &str) -> StoreResult<UnitPrice> {
    let value: Decimal = get(row, column)?;
    UnitPrice::new(value).map_err(|e| corrupt(column, e))
}

fn version_of(row: &PgRow) -> StoreResult<u64> {
    let version: i64 = get(row, "version")?;
    u64::try_from(version).map_err(|e| corrupt("version", e))
}

fn balance_from_row<K: OwnerKind>(
    key: BalanceKey<K>,
    row: &PgRow,
    policy: RoundingPolicy,
) -> StoreResult<ProductBalance<K>> {
    ProductBalance::restore(
        key,
        quantity(row, "quantity")?,
        money(row, "total_cost")?,
        version_of(row)?,
        policy,
    )
    .map_err(|e| StoreError::Corrupt(e.to_string()))
}

fn item_from_row<K: ConsignmentKind>(row: &PgRow) -> StoreResult<ConsignmentItem<K>> {
    Ok(ConsignmentItem {
        id: ItemId::from(get::<Uuid>(row, "item_id")?),
        consignment_id: K::Id::from(get::<Uuid>(row, "owner_id")?),
        warehouse_id: WarehouseId::from(get::<Uuid>(row, "warehouse_id")?),
        product_id: ProductId::from(get::<Uuid>(row, "product_id")?),
        quantity: quantity(row, "quantity")?,
        unit_cost: price(row, "unit_cost")?,
        total_cost: money(row, "total_cost")?,
        created_by: get::<Uuid>(row, "created_by")?.into(),
        created_at: get(row, "created_at")?,
        updated_at: get(row, "updated_at")?,
    })
}

fn transfer_from_row(row: &PgRow) -> StoreResult<ProductTransfer> {
    Ok(ProductTransfer {
        id: TransferId::from(get::<Uuid>(row, "transfer_id")?),
        warehouse_id: WarehouseId::from(get::<Uuid>(row, "warehouse_id")?),
        from_product: ProductId::from(get::<Uuid>(row, "from_product")?),
        to_product: ProductId::from(get::<Uuid>(row, "to_product")?),
        quantity: quantity(row, "quantity")?,
        unit_price: price(row, "unit_price")?,
        total_cost: money(row, "total_cost")?,
        reason_id: ReasonId::from(get::<Uuid>(row, "reason_id")?),
        description: get(row, "description")?,
        user_id: get::<Uuid>(row, "user_id")?.into(),
        created_at: get(row, "created_at")?,
        updated_at: get(row, "updated_at")?,
    })
}

fn discrepancy_from_row(row: &PgRow) -> StoreResult<WarehouseDiscrepancy> {
    let kind: String = get(row, "discrepancy_type")?;
    Ok(WarehouseDiscrepancy {
        id: get::<Uuid>(row, "record_id")?.into(),
        driver_id: get::<Uuid>(row, "driver_id")?.into(),
        product_id: get::<Uuid>(row, "product_id")?.into(),
        warehouse_id: get::<Uuid>(row, "warehouse_id")?.into(),
        purchased_quantity: quantity(row, "purchased_quantity")?,
        received_quantity: quantity(row, "received_quantity")?,
        discrepancy_quantity: get::<Decimal>(row, "discrepancy_quantity")?.normalize(),
        unit_price: price(row, "unit_price")?,
        discrepancy_value: money(row, "discrepancy_value")?,
        discrepancy_type: kind.parse().map_err(StoreError::Corrupt)?,
        user_id: get::<Uuid>(row, "user_id")?.into(),
        recorded_at: get(row, "recorded_at")?,
    })
}

fn adjustment_from_row(row: &PgRow) -> StoreResult<WarehouseBalanceAdjustment> {
    let kind: String = get(row, "adjustment_type")?;
    Ok(WarehouseBalanceAdjustment {
        id: get::<Uuid>(row, "record_id")?.into(),
        warehouse_id: get::<Uuid>(row, "warehouse_id")?.into(),
        product_id: get::<Uuid>(row, "product_id")?.into(),
        previous_quantity: quantity(row, "previous_quantity")?,
        new_quantity: quantity(row, "new_quantity")?,
        previous_total_cost: money(row, "previous_total_cost")?,
        new_total_cost: money(row, "new_total_cost")?,
        previous_average: price(row, "previous_average")?,
        new_average: price(row, "new_average")?,
        adjustment_type: kind.parse().map_err(StoreError::Corrupt)?,
        description: get(row, "description")?,
        user_id: get::<Uuid>(row, "user_id")?.into(),
        recorded_at: get(row, "recorded_at")?,
    })
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {operation}: {}", db_err.message());
            match db_err.code().as_deref() {
                // unique violation, serialization failure, deadlock
                Some("23505") | Some("40001") | Some("40P01") => StoreError::Conflict(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::ColumnNotFound(_) => {
            StoreError::Corrupt(format!("failed to decode row in {operation}: {err}"))
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {operation}"))
        }
        _ => StoreError::Backend(format!("sqlx error in {operation}: {err}")),
    }
}
