//! Database Connection Pool Module
//!
//! PostgreSQL connection pooling via deadpool-postgres and the Postgres
//! implementation of the order persistence gateway.
//!
//! An order spans four tables (`orders`, `deliveries`, `payments`, `items`)
//! joined on `order_uid`. Saves run in one transaction that upserts the order
//! row and replaces every child row, so readers never see a mix of two
//! messages.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_postgres::{
    Config, ManagerConfig, Pool, PoolConfig, PoolError, RecyclingMethod, Runtime, Timeouts,
};
use orders_core::{Delivery, Item, Order, Payment, StorageError};
use orders_storage::{OrderStore, StorageResult};
use tokio_postgres::{NoTls, Row};

use crate::config::{env_flag, env_parse};
use crate::constants::{DEFAULT_DB_POOL_SIZE, DEFAULT_DB_TIMEOUT_SECS, DEFAULT_POSTGRES_DSN};
use crate::error::{ApiError, ApiResult};

/// Idempotent schema applied at boot when migrations are enabled.
const SCHEMA_SQL: &str = include_str!("../sql/orders_schema.sql");

// ============================================================================
// CONNECTION POOL CONFIGURATION
// ============================================================================

/// Database connection pool configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct DbConfig {
    /// libpq-style connection string
    pub dsn: String,
    /// Maximum pool size
    pub max_size: usize,
    /// Wait/create/recycle timeout for pooled connections
    pub timeout: Duration,
    /// Apply the bundled schema at startup
    pub run_migrations: bool,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            dsn: DEFAULT_POSTGRES_DSN.to_string(),
            max_size: DEFAULT_DB_POOL_SIZE,
            timeout: Duration::from_secs(DEFAULT_DB_TIMEOUT_SECS),
            run_migrations: true,
        }
    }
}

impl DbConfig {
    /// Create a new database configuration from environment variables.
    ///
    /// - `POSTGRES_DSN`: connection string
    /// - `ORDERS_DB_POOL_SIZE`: pool size (default: 16)
    /// - `ORDERS_DB_TIMEOUT_SECS`: connection timeout (default: 30)
    /// - `ORDERS_RUN_MIGRATIONS`: apply schema at boot (default: true)
    pub fn from_env() -> Self {
        Self {
            dsn: std::env::var("POSTGRES_DSN")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_POSTGRES_DSN.to_string()),
            max_size: env_parse("ORDERS_DB_POOL_SIZE", DEFAULT_DB_POOL_SIZE),
            timeout: Duration::from_secs(env_parse(
                "ORDERS_DB_TIMEOUT_SECS",
                DEFAULT_DB_TIMEOUT_SECS,
            )),
            run_migrations: env_flag("ORDERS_RUN_MIGRATIONS", true),
        }
    }

    /// Create a connection pool from this configuration.
    pub fn create_pool(&self) -> ApiResult<Pool> {
        let mut cfg = Config::new();
        cfg.url = Some(self.dsn.clone());

        let mut pool_cfg = PoolConfig::new(self.max_size);
        pool_cfg.timeouts = Timeouts {
            wait: Some(self.timeout),
            create: Some(self.timeout),
            recycle: Some(self.timeout),
        };
        cfg.pool = Some(pool_cfg);

        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| ApiError::database_error(format!("Failed to create pool: {}", e)))?;

        Ok(pool)
    }
}

// ============================================================================
// QUERIES
// ============================================================================

macro_rules! order_select {
    () => {
        "SELECT o.order_uid, o.track_number, o.entry, o.locale, o.internal_signature, \
                o.customer_id, o.delivery_service, o.shardkey, o.sm_id, o.date_created, o.oof_shard, \
                d.name, d.phone, d.zip, d.city, d.address, d.region, d.email, \
                p.transaction, p.request_id, p.currency, p.provider, p.amount, p.payment_dt, \
                p.bank, p.delivery_cost, p.goods_total, p.custom_fee \
         FROM orders o \
         LEFT JOIN deliveries d ON d.order_uid = o.order_uid \
         LEFT JOIN payments p ON p.order_uid = o.order_uid"
    };
}

const SELECT_ORDER_BY_KEY: &str = concat!(order_select!(), " WHERE o.order_uid = $1");

const SELECT_RECENT_ORDERS: &str =
    concat!(order_select!(), " ORDER BY o.date_created DESC LIMIT $1");

const SELECT_ITEMS: &str = "SELECT order_uid, chrt_id, track_number, price, rid, name, sale, size, \
            total_price, nm_id, brand, status \
     FROM items WHERE order_uid = ANY($1) ORDER BY order_uid, id";

const UPSERT_ORDER: &str = "INSERT INTO orders (order_uid, track_number, entry, locale, internal_signature, \
            customer_id, delivery_service, shardkey, sm_id, date_created, oof_shard) \
     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
     ON CONFLICT (order_uid) DO UPDATE SET \
        track_number = EXCLUDED.track_number, \
        entry = EXCLUDED.entry, \
        locale = EXCLUDED.locale, \
        internal_signature = EXCLUDED.internal_signature, \
        customer_id = EXCLUDED.customer_id, \
        delivery_service = EXCLUDED.delivery_service, \
        shardkey = EXCLUDED.shardkey, \
        sm_id = EXCLUDED.sm_id, \
        date_created = EXCLUDED.date_created, \
        oof_shard = EXCLUDED.oof_shard";

const INSERT_DELIVERY: &str = "INSERT INTO deliveries (order_uid, name, phone, zip, city, address, region, email) \
     VALUES ($1, $2, $3, $4, $5, $6, $7, $8)";

const INSERT_PAYMENT: &str = "INSERT INTO payments (order_uid, transaction, request_id, currency, provider, amount, \
            payment_dt, bank, delivery_cost, goods_total, custom_fee) \
     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)";

const INSERT_ITEM: &str = "INSERT INTO items (order_uid, chrt_id, track_number, price, rid, name, sale, size, \
            total_price, nm_id, brand, status) \
     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)";

// ============================================================================
// POSTGRES ORDER STORE
// ============================================================================

/// Persistence gateway backed by a PostgreSQL connection pool.
#[derive(Clone)]
pub struct PgOrderStore {
    pool: Pool,
}

impl PgOrderStore {
    /// Create a new store with the given pool.
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Create a new store from configuration.
    pub fn from_config(config: &DbConfig) -> ApiResult<Self> {
        let pool = config.create_pool()?;
        Ok(Self::new(pool))
    }

    /// Get the current pool size for observability.
    pub fn pool_size(&self) -> usize {
        self.pool.status().size
    }

    /// Get a connection from the pool.
    async fn get_conn(&self) -> ApiResult<deadpool_postgres::Object> {
        self.pool.get().await.map_err(ApiError::from)
    }

    /// Open a connection and run a trivial query. Used at boot, where a
    /// failure is fatal.
    pub async fn verify_connection(&self) -> ApiResult<()> {
        let conn = self.get_conn().await?;
        conn.query_one("SELECT 1", &[]).await?;
        Ok(())
    }

    /// Apply the bundled schema.
    pub async fn migrate(&self) -> ApiResult<()> {
        let conn = self.get_conn().await?;
        conn.batch_execute(SCHEMA_SQL).await?;
        tracing::info!("Order schema applied");
        Ok(())
    }

    /// Close the pool. Checked-out connections finish their current work.
    pub fn close(&self) {
        self.pool.close();
        tracing::info!("Database pool closed");
    }

    async fn attach_items(
        &self,
        conn: &deadpool_postgres::Object,
        orders: &mut [Order],
    ) -> StorageResult<()> {
        if orders.is_empty() {
            return Ok(());
        }

        let uids: Vec<String> = orders.iter().map(|o| o.order_uid.clone()).collect();
        let rows = conn
            .query(SELECT_ITEMS, &[&uids])
            .await
            .map_err(query_error("load items"))?;

        let mut by_order: HashMap<String, Vec<Item>> = HashMap::new();
        for row in &rows {
            let order_uid: String = row.try_get("order_uid").map_err(query_error("read item"))?;
            let item = item_from_row(row).map_err(query_error("read item"))?;
            by_order.entry(order_uid).or_default().push(item);
        }

        for order in orders.iter_mut() {
            order.items = by_order.remove(&order.order_uid).unwrap_or_default();
        }
        Ok(())
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn save_order(&self, order: &Order) -> StorageResult<()> {
        let mut conn = self.pool.get().await.map_err(pool_error)?;
        // Dropping an uncommitted transaction rolls it back.
        let tx = conn
            .transaction()
            .await
            .map_err(query_error("begin transaction"))?;

        let uid = &order.order_uid;
        tx.execute(
            UPSERT_ORDER,
            &[
                uid,
                &order.track_number,
                &order.entry,
                &order.locale,
                &order.internal_signature,
                &order.customer_id,
                &order.delivery_service,
                &order.shardkey,
                &order.sm_id,
                &order.date_created,
                &order.oof_shard,
            ],
        )
        .await
        .map_err(query_error("upsert order"))?;

        let d = &order.delivery;
        tx.execute("DELETE FROM deliveries WHERE order_uid = $1", &[uid])
            .await
            .map_err(query_error("delete delivery"))?;
        tx.execute(
            INSERT_DELIVERY,
            &[uid, &d.name, &d.phone, &d.zip, &d.city, &d.address, &d.region, &d.email],
        )
        .await
        .map_err(query_error("insert delivery"))?;

        let p = &order.payment;
        tx.execute("DELETE FROM payments WHERE order_uid = $1", &[uid])
            .await
            .map_err(query_error("delete payment"))?;
        tx.execute(
            INSERT_PAYMENT,
            &[
                uid,
                &p.transaction,
                &p.request_id,
                &p.currency,
                &p.provider,
                &p.amount,
                &p.payment_dt,
                &p.bank,
                &p.delivery_cost,
                &p.goods_total,
                &p.custom_fee,
            ],
        )
        .await
        .map_err(query_error("insert payment"))?;

        tx.execute("DELETE FROM items WHERE order_uid = $1", &[uid])
            .await
            .map_err(query_error("delete items"))?;
        if !order.items.is_empty() {
            let insert_item = tx
                .prepare(INSERT_ITEM)
                .await
                .map_err(query_error("prepare item insert"))?;
            for item in &order.items {
                tx.execute(
                    &insert_item,
                    &[
                        uid,
                        &item.chrt_id,
                        &item.track_number,
                        &item.price,
                        &item.rid,
                        &item.name,
                        &item.sale,
                        &item.size,
                        &item.total_price,
                        &item.nm_id,
                        &item.brand,
                        &item.status,
                    ],
                )
                .await
                .map_err(query_error("insert item"))?;
            }
        }

        tx.commit().await.map_err(|e| {
            tracing::error!(order_uid = %uid, error = ?e, "Order transaction commit failed");
            StorageError::transaction_failed(e.to_string())
        })?;

        Ok(())
    }

    async fn load_by_key(&self, order_uid: &str) -> StorageResult<Option<Order>> {
        let conn = self.pool.get().await.map_err(pool_error)?;

        let row = conn
            .query_opt(SELECT_ORDER_BY_KEY, &[&order_uid])
            .await
            .map_err(query_error("load order"))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut orders = vec![order_from_row(&row).map_err(query_error("read order"))?];
        self.attach_items(&conn, &mut orders).await?;
        Ok(orders.pop())
    }

    async fn load_recent(&self, limit: usize) -> StorageResult<Vec<Order>> {
        let conn = self.pool.get().await.map_err(pool_error)?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let rows = conn
            .query(SELECT_RECENT_ORDERS, &[&limit])
            .await
            .map_err(query_error("load recent orders"))?;

        let mut orders = rows
            .iter()
            .map(order_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(query_error("read order"))?;
        self.attach_items(&conn, &mut orders).await?;
        Ok(orders)
    }

    async fn health_check(&self) -> StorageResult<()> {
        let conn = self.pool.get().await.map_err(pool_error)?;
        conn.query_one("SELECT 1", &[])
            .await
            .map_err(query_error("health check"))?;
        Ok(())
    }
}

// ============================================================================
// ROW MAPPING
// ============================================================================

/// Child columns come from LEFT JOINs and may be NULL; they read as zero values.
fn text(row: &Row, column: &str) -> Result<String, tokio_postgres::Error> {
    Ok(row.try_get::<_, Option<String>>(column)?.unwrap_or_default())
}

fn int(row: &Row, column: &str) -> Result<i64, tokio_postgres::Error> {
    Ok(row.try_get::<_, Option<i64>>(column)?.unwrap_or_default())
}

fn order_from_row(row: &Row) -> Result<Order, tokio_postgres::Error> {
    Ok(Order {
        order_uid: row.try_get("order_uid")?,
        track_number: row.try_get("track_number")?,
        entry: row.try_get("entry")?,
        delivery: Delivery {
            name: text(row, "name")?,
            phone: text(row, "phone")?,
            zip: text(row, "zip")?,
            city: text(row, "city")?,
            address: text(row, "address")?,
            region: text(row, "region")?,
            email: text(row, "email")?,
        },
        payment: Payment {
            transaction: text(row, "transaction")?,
            request_id: text(row, "request_id")?,
            currency: text(row, "currency")?,
            provider: text(row, "provider")?,
            amount: int(row, "amount")?,
            payment_dt: int(row, "payment_dt")?,
            bank: text(row, "bank")?,
            delivery_cost: int(row, "delivery_cost")?,
            goods_total: int(row, "goods_total")?,
            custom_fee: int(row, "custom_fee")?,
        },
        items: Vec::new(),
        locale: row.try_get("locale")?,
        internal_signature: row.try_get("internal_signature")?,
        customer_id: row.try_get("customer_id")?,
        delivery_service: row.try_get("delivery_service")?,
        shardkey: row.try_get("shardkey")?,
        sm_id: row.try_get("sm_id")?,
        date_created: row.try_get("date_created")?,
        oof_shard: row.try_get("oof_shard")?,
    })
}

fn item_from_row(row: &Row) -> Result<Item, tokio_postgres::Error> {
    Ok(Item {
        chrt_id: row.try_get("chrt_id")?,
        track_number: row.try_get("track_number")?,
        price: row.try_get("price")?,
        rid: row.try_get("rid")?,
        name: row.try_get("name")?,
        sale: row.try_get("sale")?,
        size: row.try_get("size")?,
        total_price: row.try_get("total_price")?,
        nm_id: row.try_get("nm_id")?,
        brand: row.try_get("brand")?,
        status: row.try_get("status")?,
    })
}

// ============================================================================
// ERROR MAPPING
// ============================================================================

fn query_error(operation: &'static str) -> impl Fn(tokio_postgres::Error) -> StorageError {
    move |err| {
        tracing::error!(operation, error = ?err, "Order store query failed");
        StorageError::query_failed(operation, err.to_string())
    }
}

fn pool_error(err: PoolError) -> StorageError {
    tracing::error!(error = ?err, "Connection pool error");
    match err {
        PoolError::Timeout(_) => StorageError::unavailable("connection pool exhausted"),
        PoolError::Closed => StorageError::unavailable("connection pool is closed"),
        other => StorageError::unavailable(other.to_string()),
    }
}
