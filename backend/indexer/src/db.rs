//! Database layer: migrations, queries, the transactional entity store
//! and cursor management.

use std::str::FromStr;

use serde::Deserialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Executor, Sqlite, SqlitePool, Transaction};
use tracing::info;

use crate::errors::Result;
use crate::gig::{Activity, Gig, GigStatus};
use crate::store::EntityStore;

/// Establish a SQLite connection pool and run pending migrations.
pub async fn init_pool(database_url: &str) -> Result<SqlitePool> {
    let url = if database_url.starts_with("sqlite:") {
        database_url.to_string()
    } else {
        format!("sqlite:{database_url}")
    };

    // Make sure the file is created if it doesn't exist yet.
    let options = SqliteConnectOptions::from_str(&url)?.create_if_missing(true);

    // Every connection to `:memory:` is a separate database, so pin those
    // to a single long-lived connection.
    let pool_options = if url.contains(":memory:") {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(5)
    };

    let pool = pool_options.connect_with(options).await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database migrations applied successfully");
    Ok(pool)
}

// ─────────────────────────────────────────────────────────
// Row mapping
// ─────────────────────────────────────────────────────────

#[derive(sqlx::FromRow)]
struct GigRow {
    id: String,
    creator: String,
    writer: Option<String>,
    amount: String,
    status: String,
    created_at: i64,
    last_updated: i64,
}

#[derive(sqlx::FromRow)]
struct ActivityRow {
    id: String,
    gig_id: String,
    kind: String,
    actor: Option<String>,
    amount: Option<String>,
    timestamp: i64,
    block_number: i64,
    transaction_hash: Option<String>,
    log_index: i64,
}

fn decode_status(column: &str, raw: &str) -> std::result::Result<GigStatus, sqlx::Error> {
    raw.parse().map_err(|e: String| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: e.into(),
    })
}

impl TryFrom<GigRow> for Gig {
    type Error = sqlx::Error;

    fn try_from(row: GigRow) -> std::result::Result<Self, Self::Error> {
        Ok(Gig {
            status: decode_status("status", &row.status)?,
            id: row.id,
            creator: row.creator,
            writer: row.writer,
            amount: row.amount,
            created_at: row.created_at,
            last_updated: row.last_updated,
        })
    }
}

impl TryFrom<ActivityRow> for Activity {
    type Error = sqlx::Error;

    fn try_from(row: ActivityRow) -> std::result::Result<Self, Self::Error> {
        Ok(Activity {
            kind: decode_status("kind", &row.kind)?,
            id: row.id,
            gig: row.gig_id,
            actor: row.actor,
            amount: row.amount,
            timestamp: row.timestamp,
            block_number: row.block_number,
            transaction_hash: row.transaction_hash,
            log_index: row.log_index,
        })
    }
}

const GIG_COLUMNS: &str = "id, creator, writer, amount, status, created_at, last_updated";
const ACTIVITY_COLUMNS: &str =
    "id, gig_id, kind, actor, amount, timestamp, block_number, transaction_hash, log_index";

async fn fetch_gig<'e, E>(executor: E, gig_id: &str) -> Result<Option<Gig>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query_as::<_, GigRow>(&format!(
        "SELECT {GIG_COLUMNS} FROM gigs WHERE id = ?1"
    ))
    .bind(gig_id)
    .fetch_optional(executor)
    .await?;
    Ok(row.map(Gig::try_from).transpose()?)
}

async fn fetch_activity<'e, E>(executor: E, activity_id: &str) -> Result<Option<Activity>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query_as::<_, ActivityRow>(&format!(
        "SELECT {ACTIVITY_COLUMNS} FROM activities WHERE id = ?1"
    ))
    .bind(activity_id)
    .fetch_optional(executor)
    .await?;
    Ok(row.map(Activity::try_from).transpose()?)
}

// ─────────────────────────────────────────────────────────
// Transactional entity store
// ─────────────────────────────────────────────────────────

/// [`EntityStore`] over one open SQLite transaction.
///
/// Nothing written through it is visible to readers until [`commit`]
/// succeeds; dropping it rolls everything back.
///
/// [`commit`]: SqliteStore::commit
pub struct SqliteStore {
    tx: Transaction<'static, Sqlite>,
}

impl SqliteStore {
    pub async fn begin(pool: &SqlitePool) -> Result<Self> {
        Ok(Self {
            tx: pool.begin().await?,
        })
    }

    /// Persist the checkpoint as part of the same transaction.
    pub async fn save_cursor(&mut self, last_block: i64, last_cursor: Option<&str>) -> Result<()> {
        sqlx::query("UPDATE indexer_cursor SET last_block = ?1, last_cursor = ?2 WHERE id = 1")
            .bind(last_block)
            .bind(last_cursor)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    pub async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

impl EntityStore for SqliteStore {
    async fn load(&mut self, gig_id: &str) -> Result<Option<Gig>> {
        fetch_gig(&mut *self.tx, gig_id).await
    }

    async fn has_activity(&mut self, activity_id: &str) -> Result<bool> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM activities WHERE id = ?1")
            .bind(activity_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row.is_some())
    }

    async fn save(&mut self, gig: &Gig) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO gigs (id, creator, writer, amount, status, created_at, last_updated)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT (id) DO UPDATE SET
                writer       = excluded.writer,
                status       = excluded.status,
                last_updated = excluded.last_updated
            "#,
        )
        .bind(&gig.id)
        .bind(&gig.creator)
        .bind(&gig.writer)
        .bind(&gig.amount)
        .bind(gig.status.as_str())
        .bind(gig.created_at)
        .bind(gig.last_updated)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn append_activity(&mut self, activity: &Activity) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO activities
                (id, gig_id, kind, actor, amount, timestamp, block_number, transaction_hash, log_index)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&activity.id)
        .bind(&activity.gig)
        .bind(activity.kind.as_str())
        .bind(&activity.actor)
        .bind(&activity.amount)
        .bind(activity.timestamp)
        .bind(activity.block_number)
        .bind(&activity.transaction_hash)
        .bind(activity.log_index)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────
// Cursor helpers
// ─────────────────────────────────────────────────────────

/// Read the last committed block from the cursor row.
/// Returns `0` when no cursor has been persisted yet.
pub async fn get_last_block(pool: &SqlitePool) -> Result<i64> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT last_block FROM indexer_cursor WHERE id = 1")
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|(v,)| v).unwrap_or(0))
}

/// Read back the raw cursor string (used to resume pagination mid-range).
pub async fn get_cursor_string(pool: &SqlitePool) -> Result<Option<String>> {
    let row: Option<(Option<String>,)> =
        sqlx::query_as("SELECT last_cursor FROM indexer_cursor WHERE id = 1")
            .fetch_optional(pool)
            .await?;
    Ok(row.and_then(|(v,)| v))
}

// ─────────────────────────────────────────────────────────
// Reads
// ─────────────────────────────────────────────────────────

/// Activity ordering by timestamp; ties keep append order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    fn sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

pub async fn get_gig(pool: &SqlitePool, gig_id: &str) -> Result<Option<Gig>> {
    fetch_gig(pool, gig_id).await
}

/// All gigs, in numeric id order.
pub async fn get_all_gigs(pool: &SqlitePool) -> Result<Vec<Gig>> {
    let rows = sqlx::query_as::<_, GigRow>(&format!(
        "SELECT {GIG_COLUMNS} FROM gigs ORDER BY length(id) ASC, id ASC"
    ))
    .fetch_all(pool)
    .await?;
    Ok(rows
        .into_iter()
        .map(Gig::try_from)
        .collect::<std::result::Result<_, _>>()?)
}

pub async fn get_activity(pool: &SqlitePool, activity_id: &str) -> Result<Option<Activity>> {
    fetch_activity(pool, activity_id).await
}

/// Activities, optionally restricted to one gig, ordered by timestamp.
pub async fn get_activities(
    pool: &SqlitePool,
    gig_id: Option<&str>,
    order: SortOrder,
) -> Result<Vec<Activity>> {
    let dir = order.sql();
    let rows = sqlx::query_as::<_, ActivityRow>(&format!(
        r#"
        SELECT {ACTIVITY_COLUMNS}
        FROM   activities
        WHERE  ?1 IS NULL OR gig_id = ?1
        ORDER  BY timestamp {dir}, rowid {dir}
        "#
    ))
    .bind(gig_id)
    .fetch_all(pool)
    .await?;
    Ok(rows
        .into_iter()
        .map(Activity::try_from)
        .collect::<std::result::Result<_, _>>()?)
}
