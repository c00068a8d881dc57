use crate::DbError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core_types::{
    Counts, HistoryEntry, Holding, HoldingKey, InventoryId, ItemDetails, TradeAction, TradeId,
    TradeLine, TradeLines, TradeRecord, TradeStatus, UserId,
};
use serde_json::Value as JsonValue;
use sqlx::postgres::{PgPool, Postgres};
use sqlx::{FromRow, Transaction};
use store::{Directory, HistoryStore, HoldingStore, LineCounts, StoreError, TradeStore};
use uuid::Uuid;

/// The `DbRepository` implements every store contract against PostgreSQL. It
/// encapsulates all SQL queries and row decoding.
#[derive(Debug, Clone)]
pub struct DbRepository {
    pool: PgPool,
}

// --- Row types ---

#[derive(FromRow, Debug, Clone)]
struct HoldingRow {
    inventory_id: Uuid,
    card_id: String,
    quantity: i64,
    locked_quantity: i64,
    is_tradeable: bool,
}

#[derive(FromRow, Debug, Clone)]
struct TradeRow {
    trade_id: Uuid,
    root_trade_id: Uuid,
    parent_trade_id: Option<Uuid>,
    counter_count: i32,
    initiator_user_id: String,
    initiator_inventory_id: Uuid,
    recipient_user_id: String,
    recipient_inventory_id: Uuid,
    status: String,
    initiator_confirmed: bool,
    initiator_confirmed_at: Option<DateTime<Utc>>,
    recipient_confirmed: bool,
    recipient_confirmed_at: Option<DateTime<Utc>>,
    resolved_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    message: Option<String>,
    cancel_reason: Option<String>,
    version: i64,
}

#[derive(FromRow, Debug, Clone)]
struct LineRow {
    card_id: String,
    quantity: i64,
}

#[derive(FromRow, Debug, Clone)]
struct HistoryRow {
    history_id: Uuid,
    trade_id: Uuid,
    root_trade_id: Uuid,
    sequence_number: i64,
    actor_user_id: String,
    action: String,
    details: JsonValue,
    created_at: DateTime<Utc>,
}

#[derive(FromRow, Debug, Clone)]
struct CardRow {
    card_id: String,
    name: String,
    image_url: Option<String>,
    rarity: Option<String>,
    set_id: Option<String>,
}

const TRADE_COLUMNS: &str = "trade_id, root_trade_id, parent_trade_id, counter_count, \
    initiator_user_id, initiator_inventory_id, recipient_user_id, recipient_inventory_id, \
    status, initiator_confirmed, initiator_confirmed_at, recipient_confirmed, \
    recipient_confirmed_at, resolved_at, created_at, updated_at, message, cancel_reason, version";

fn quantity(value: i64, column: &str) -> Result<u32, DbError> {
    u32::try_from(value).map_err(|_| DbError::Corrupt(format!("{column} out of range: {value}")))
}

impl TryFrom<HoldingRow> for Holding {
    type Error = DbError;

    fn try_from(row: HoldingRow) -> Result<Self, Self::Error> {
        Ok(Holding {
            inventory_id: row.inventory_id,
            item_id: row.card_id,
            quantity: quantity(row.quantity, "quantity")?,
            locked_quantity: quantity(row.locked_quantity, "locked_quantity")?,
            tradeable: row.is_tradeable,
        })
    }
}

impl TryFrom<TradeRow> for TradeRecord {
    type Error = DbError;

    fn try_from(row: TradeRow) -> Result<Self, Self::Error> {
        let status: TradeStatus = row
            .status
            .parse()
            .map_err(|_| DbError::Corrupt(format!("unknown trade status '{}'", row.status)))?;
        let counter_count = u32::try_from(row.counter_count)
            .map_err(|_| DbError::Corrupt(format!("negative counter_count {}", row.counter_count)))?;
        Ok(TradeRecord {
            trade_id: row.trade_id,
            root_trade_id: row.root_trade_id,
            parent_trade_id: row.parent_trade_id,
            counter_count,
            initiator_user_id: row.initiator_user_id,
            initiator_inventory_id: row.initiator_inventory_id,
            recipient_user_id: row.recipient_user_id,
            recipient_inventory_id: row.recipient_inventory_id,
            status,
            initiator_confirmed: row.initiator_confirmed,
            initiator_confirmed_at: row.initiator_confirmed_at,
            recipient_confirmed: row.recipient_confirmed,
            recipient_confirmed_at: row.recipient_confirmed_at,
            resolved_at: row.resolved_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
            message: row.message,
            cancel_reason: row.cancel_reason,
            version: row.version,
        })
    }
}

impl TryFrom<HistoryRow> for HistoryEntry {
    type Error = DbError;

    fn try_from(row: HistoryRow) -> Result<Self, Self::Error> {
        let action: TradeAction = row
            .action
            .parse()
            .map_err(|_| DbError::Corrupt(format!("unknown history action '{}'", row.action)))?;
        Ok(HistoryEntry {
            history_id: row.history_id,
            trade_id: row.trade_id,
            root_trade_id: row.root_trade_id,
            sequence_number: row.sequence_number,
            actor_user_id: row.actor_user_id,
            action,
            details: row.details,
            created_at: row.created_at,
        })
    }
}

impl DbRepository {
    /// Creates a new `DbRepository` with a shared database connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // --- Holdings ---

    async fn fetch_holding(&self, key: &HoldingKey) -> Result<Option<Holding>, DbError> {
        let row = sqlx::query_as::<_, HoldingRow>(
            r#"
            SELECT inventory_id, card_id, quantity, locked_quantity, is_tradeable
            FROM inventory_cards
            WHERE inventory_id = $1 AND card_id = $2
            "#,
        )
        .bind(key.inventory_id)
        .bind(&key.item_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Holding::try_from).transpose()
    }

    /// Inserts a holding unless one already exists for the key.
    async fn insert_holding(&self, holding: &Holding) -> Result<bool, DbError> {
        let result = sqlx::query(
            r#"
            INSERT INTO inventory_cards (inventory_id, card_id, quantity, locked_quantity, is_tradeable)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (inventory_id, card_id) DO NOTHING
            "#,
        )
        .bind(holding.inventory_id)
        .bind(&holding.item_id)
        .bind(i64::from(holding.quantity))
        .bind(i64::from(holding.locked_quantity))
        .bind(holding.tradeable)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// The conditional update every holding change goes through.
    async fn swap_counts(&self, key: &HoldingKey, expected: Counts, next: Counts) -> Result<bool, DbError> {
        let result = sqlx::query(
            r#"
            UPDATE inventory_cards
            SET quantity = $3, locked_quantity = $4
            WHERE inventory_id = $1 AND card_id = $2
              AND quantity = $5 AND locked_quantity = $6
            "#,
        )
        .bind(key.inventory_id)
        .bind(&key.item_id)
        .bind(i64::from(next.quantity))
        .bind(i64::from(next.locked_quantity))
        .bind(i64::from(expected.quantity))
        .bind(i64::from(expected.locked_quantity))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete_holding_if(&self, key: &HoldingKey, expected: Counts) -> Result<bool, DbError> {
        let result = sqlx::query(
            r#"
            DELETE FROM inventory_cards
            WHERE inventory_id = $1 AND card_id = $2
              AND quantity = $3 AND locked_quantity = $4
            "#,
        )
        .bind(key.inventory_id)
        .bind(&key.item_id)
        .bind(i64::from(expected.quantity))
        .bind(i64::from(expected.locked_quantity))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    // --- Trades ---

    /// Saves a trade and its lines within a single transaction for atomicity.
    async fn save_trade(&self, record: &TradeRecord, lines: &TradeLines) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO trades (
                trade_id, root_trade_id, parent_trade_id, counter_count,
                initiator_user_id, initiator_inventory_id, recipient_user_id, recipient_inventory_id,
                status, initiator_confirmed, initiator_confirmed_at, recipient_confirmed,
                recipient_confirmed_at, resolved_at, created_at, updated_at, message, cancel_reason, version
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19
            )
            "#,
        )
        .bind(record.trade_id)
        .bind(record.root_trade_id)
        .bind(record.parent_trade_id)
        .bind(i32::try_from(record.counter_count).unwrap_or(i32::MAX))
        .bind(&record.initiator_user_id)
        .bind(record.initiator_inventory_id)
        .bind(&record.recipient_user_id)
        .bind(record.recipient_inventory_id)
        .bind(record.status.as_str())
        .bind(record.initiator_confirmed)
        .bind(record.initiator_confirmed_at)
        .bind(record.recipient_confirmed)
        .bind(record.recipient_confirmed_at)
        .bind(record.resolved_at)
        .bind(record.created_at)
        .bind(record.updated_at)
        .bind(&record.message)
        .bind(&record.cancel_reason)
        .bind(record.version)
        .execute(&mut *tx) // Note: must use the transaction object `tx` here
        .await
        .map_err(|e| DbError::on_insert(e, &format!("trade {}", record.trade_id)))?;

        insert_lines(&mut tx, "trade_escrow", record.trade_id, &lines.escrow).await?;
        insert_lines(&mut tx, "trade_requested", record.trade_id, &lines.requested).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn fetch_trade(&self, trade_id: TradeId) -> Result<Option<TradeRecord>, DbError> {
        let sql = format!("SELECT {TRADE_COLUMNS} FROM trades WHERE trade_id = $1");
        let row = sqlx::query_as::<_, TradeRow>(&sql)
            .bind(trade_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(TradeRecord::try_from).transpose()
    }

    async fn fetch_trades(&self, filter: &str, bind: TradeBind<'_>) -> Result<Vec<TradeRecord>, DbError> {
        let sql = format!("SELECT {TRADE_COLUMNS} FROM trades WHERE {filter}");
        let query = sqlx::query_as::<_, TradeRow>(&sql);
        let query = match bind {
            TradeBind::Id(id) => query.bind(id),
            TradeBind::User(user_id) => query.bind(user_id),
            TradeBind::Time(at) => query.bind(at),
        };
        let rows = query.fetch_all(&self.pool).await?;
        rows.into_iter().map(TradeRecord::try_from).collect()
    }

    async fn fetch_lines(&self, table: &str, trade_id: TradeId) -> Result<Vec<TradeLine>, DbError> {
        let sql = format!("SELECT card_id, quantity FROM {table} WHERE trade_id = $1 ORDER BY position ASC");
        let rows = sqlx::query_as::<_, LineRow>(&sql)
            .bind(trade_id)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(|row| Ok(TradeLine::new(row.card_id, quantity(row.quantity, "line quantity")?)))
            .collect()
    }

    /// Compare-and-swap on the trade's version.
    async fn save_trade_update(&self, expected_version: i64, record: &TradeRecord) -> Result<bool, DbError> {
        let result = sqlx::query(
            r#"
            UPDATE trades SET
                status = $3,
                initiator_confirmed = $4,
                initiator_confirmed_at = $5,
                recipient_confirmed = $6,
                recipient_confirmed_at = $7,
                resolved_at = $8,
                updated_at = $9,
                message = $10,
                cancel_reason = $11,
                version = $12
            WHERE trade_id = $1 AND version = $2
            "#,
        )
        .bind(record.trade_id)
        .bind(expected_version)
        .bind(record.status.as_str())
        .bind(record.initiator_confirmed)
        .bind(record.initiator_confirmed_at)
        .bind(record.recipient_confirmed)
        .bind(record.recipient_confirmed_at)
        .bind(record.resolved_at)
        .bind(record.updated_at)
        .bind(&record.message)
        .bind(&record.cancel_reason)
        .bind(record.version)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn remove_trade(&self, trade_id: TradeId) -> Result<(), DbError> {
        // Lines go with the trade (ON DELETE CASCADE).
        sqlx::query("DELETE FROM trades WHERE trade_id = $1")
            .bind(trade_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn line_counts(&self, trade_id: TradeId) -> Result<LineCounts, DbError> {
        let (escrow, requested): (i64, i64) = sqlx::query_as(
            r#"
            SELECT
                (SELECT COUNT(*) FROM trade_escrow WHERE trade_id = $1),
                (SELECT COUNT(*) FROM trade_requested WHERE trade_id = $1)
            "#,
        )
        .bind(trade_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(LineCounts {
            escrow: escrow.max(0) as u64,
            requested: requested.max(0) as u64,
        })
    }

    async fn remove_lines(&self, trade_id: TradeId) -> Result<LineCounts, DbError> {
        let mut tx = self.pool.begin().await?;
        let escrow = sqlx::query("DELETE FROM trade_escrow WHERE trade_id = $1")
            .bind(trade_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let requested = sqlx::query("DELETE FROM trade_requested WHERE trade_id = $1")
            .bind(trade_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        tx.commit().await?;
        Ok(LineCounts { escrow, requested })
    }

    // --- History ---

    async fn latest_sequence(&self, root_trade_id: TradeId) -> Result<Option<i64>, DbError> {
        let max: Option<i64> =
            sqlx::query_scalar("SELECT MAX(sequence_number) FROM trade_history WHERE root_trade_id = $1")
                .bind(root_trade_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(max)
    }

    /// Returns false when the chain already has an entry at this sequence number.
    async fn save_history_entry(&self, entry: &HistoryEntry) -> Result<bool, DbError> {
        let result = sqlx::query(
            r#"
            INSERT INTO trade_history (
                history_id, trade_id, root_trade_id, sequence_number,
                actor_user_id, action, details, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (root_trade_id, sequence_number) DO NOTHING
            "#,
        )
        .bind(entry.history_id)
        .bind(entry.trade_id)
        .bind(entry.root_trade_id)
        .bind(entry.sequence_number)
        .bind(&entry.actor_user_id)
        .bind(entry.action.as_str())
        .bind(&entry.details)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn fetch_history(&self, root_trade_id: TradeId) -> Result<Vec<HistoryEntry>, DbError> {
        let rows = sqlx::query_as::<_, HistoryRow>(
            r#"
            SELECT history_id, trade_id, root_trade_id, sequence_number,
                   actor_user_id, action, details, created_at
            FROM trade_history
            WHERE root_trade_id = $1
            ORDER BY sequence_number ASC
            "#,
        )
        .bind(root_trade_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(HistoryEntry::try_from).collect()
    }

    // --- Directory ---

    async fn fetch_inventory_owner(&self, inventory_id: InventoryId) -> Result<Option<UserId>, DbError> {
        let owner = sqlx::query_scalar("SELECT user_id FROM inventories WHERE inventory_id = $1")
            .bind(inventory_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(owner)
    }

    async fn fetch_user_name(&self, user_id: &str) -> Result<Option<String>, DbError> {
        let name = sqlx::query_scalar("SELECT display_name FROM users WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(name)
    }

    async fn fetch_card(&self, card_id: &str) -> Result<Option<ItemDetails>, DbError> {
        let row = sqlx::query_as::<_, CardRow>(
            "SELECT card_id, name, image_url, rarity, set_id FROM cards WHERE card_id = $1",
        )
        .bind(card_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|card| ItemDetails {
            item_id: card.card_id,
            name: card.name,
            image_url: card.image_url,
            rarity: card.rarity,
            set_id: card.set_id,
        }))
    }
}

/// The single parameter of a trade listing query.
enum TradeBind<'a> {
    Id(Uuid),
    User(&'a str),
    Time(DateTime<Utc>),
}

async fn insert_lines(
    tx: &mut Transaction<'_, Postgres>,
    table: &str,
    trade_id: TradeId,
    lines: &[TradeLine],
) -> Result<(), DbError> {
    let sql = format!("INSERT INTO {table} (trade_id, position, card_id, quantity) VALUES ($1, $2, $3, $4)");
    for (position, line) in lines.iter().enumerate() {
        sqlx::query(&sql)
            .bind(trade_id)
            .bind(i32::try_from(position).unwrap_or(i32::MAX))
            .bind(&line.item_id)
            .bind(i64::from(line.quantity))
            .execute(&mut **tx)
            .await?;
    }
    Ok(())
}

#[async_trait]
impl HoldingStore for DbRepository {
    async fn get(&self, key: &HoldingKey) -> Result<Option<Holding>, StoreError> {
        Ok(self.fetch_holding(key).await?)
    }

    async fn insert(&self, holding: &Holding) -> Result<bool, StoreError> {
        Ok(self.insert_holding(holding).await?)
    }

    async fn compare_and_set(
        &self,
        key: &HoldingKey,
        expected: Counts,
        next: Counts,
    ) -> Result<bool, StoreError> {
        Ok(self.swap_counts(key, expected, next).await?)
    }

    async fn delete_if(&self, key: &HoldingKey, expected: Counts) -> Result<bool, StoreError> {
        Ok(self.delete_holding_if(key, expected).await?)
    }
}

#[async_trait]
impl TradeStore for DbRepository {
    async fn insert_trade(&self, record: &TradeRecord, lines: &TradeLines) -> Result<(), StoreError> {
        Ok(self.save_trade(record, lines).await?)
    }

    async fn get_trade(&self, trade_id: TradeId) -> Result<Option<TradeRecord>, StoreError> {
        Ok(self.fetch_trade(trade_id).await?)
    }

    async fn get_lines(&self, trade_id: TradeId) -> Result<TradeLines, StoreError> {
        let escrow = self.fetch_lines("trade_escrow", trade_id).await?;
        let requested = self.fetch_lines("trade_requested", trade_id).await?;
        Ok(TradeLines::new(escrow, requested))
    }

    async fn update_trade(&self, expected_version: i64, record: &TradeRecord) -> Result<bool, StoreError> {
        Ok(self.save_trade_update(expected_version, record).await?)
    }

    async fn delete_trade(&self, trade_id: TradeId) -> Result<(), StoreError> {
        Ok(self.remove_trade(trade_id).await?)
    }

    async fn chain(&self, root_trade_id: TradeId) -> Result<Vec<TradeRecord>, StoreError> {
        Ok(self
            .fetch_trades("root_trade_id = $1 ORDER BY counter_count ASC", TradeBind::Id(root_trade_id))
            .await?)
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<TradeRecord>, StoreError> {
        Ok(self
            .fetch_trades(
                "initiator_user_id = $1 OR recipient_user_id = $1 ORDER BY created_at DESC",
                TradeBind::User(user_id),
            )
            .await?)
    }

    async fn resolved_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<TradeRecord>, StoreError> {
        Ok(self
            .fetch_trades(
                "resolved_at IS NOT NULL AND resolved_at < $1 ORDER BY resolved_at ASC",
                TradeBind::Time(cutoff),
            )
            .await?)
    }

    async fn count_lines(&self, trade_id: TradeId) -> Result<LineCounts, StoreError> {
        Ok(self.line_counts(trade_id).await?)
    }

    async fn delete_lines(&self, trade_id: TradeId) -> Result<LineCounts, StoreError> {
        Ok(self.remove_lines(trade_id).await?)
    }
}

#[async_trait]
impl HistoryStore for DbRepository {
    async fn max_sequence(&self, root_trade_id: TradeId) -> Result<Option<i64>, StoreError> {
        Ok(self.latest_sequence(root_trade_id).await?)
    }

    async fn insert_entry(&self, entry: &HistoryEntry) -> Result<bool, StoreError> {
        Ok(self.save_history_entry(entry).await?)
    }

    async fn list_entries(&self, root_trade_id: TradeId) -> Result<Vec<HistoryEntry>, StoreError> {
        Ok(self.fetch_history(root_trade_id).await?)
    }
}

#[async_trait]
impl Directory for DbRepository {
    async fn inventory_owner(&self, inventory_id: InventoryId) -> Result<Option<UserId>, StoreError> {
        Ok(self.fetch_inventory_owner(inventory_id).await?)
    }

    async fn user_name(&self, user_id: &str) -> Result<Option<String>, StoreError> {
        Ok(self.fetch_user_name(user_id).await?)
    }

    async fn item_details(&self, item_id: &str) -> Result<Option<ItemDetails>, StoreError> {
        Ok(self.fetch_card(item_id).await?)
    }
}
