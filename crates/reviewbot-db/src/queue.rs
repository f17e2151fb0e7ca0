use chrono::Utc;
use serde::{de::DeserializeOwned, Serialize};
use sqlx::{Any, Pool, Row};

use crate::error::DbResult;
use crate::models::{QueueMessage, QueueMessageRaw};

/// A named durable queue backed by the shared `queue_messages` table.
///
/// Claiming a message is an UPDATE-then-verify: the claim `UPDATE` sets
/// `visible_at` forward and bumps `read_ct` for the oldest due row, then a
/// follow-up `SELECT` by id confirms this caller actually won the race
/// (mirrors the connected-repo upsert's UPDATE-then-check-rows-affected
/// idiom, adapted from a single-row upsert to a claim-one-of-many pop).
pub struct Queue<'a> {
    pool: &'a Pool<Any>,
    name: &'static str,
}

impl<'a> Queue<'a> {
    pub fn new(pool: &'a Pool<Any>, name: &'static str) -> Self {
        Self { pool, name }
    }

    pub async fn enqueue<T: Serialize>(&self, body: &T) -> DbResult<i64> {
        let now = Utc::now().to_rfc3339();
        let body = serde_json::to_string(body)?;

        let row = sqlx::query(
            "INSERT INTO queue_messages (queue_name, body, read_ct, enqueued_at, visible_at) \
             VALUES ($1, $2, 0, $3, $3) RETURNING id",
        )
        .bind(self.name)
        .bind(body)
        .bind(now)
        .fetch_one(self.pool)
        .await?;

        Ok(row.try_get::<i64, _>("id")?)
    }

    /// Claim the oldest due message and make it invisible until `visible_for`
    /// elapses. Returns `None` if no message in this queue is currently due.
    pub async fn read<T: DeserializeOwned>(
        &self,
        visible_for: chrono::Duration,
    ) -> DbResult<Option<QueueMessage<T>>> {
        let now = Utc::now();

        let candidate = sqlx::query("SELECT id FROM queue_messages \
             WHERE queue_name = $1 AND visible_at <= $2 ORDER BY id ASC LIMIT 1")
            .bind(self.name)
            .bind(now.to_rfc3339())
            .fetch_optional(self.pool)
            .await?;

        let Some(candidate) = candidate else {
            return Ok(None);
        };
        let id: i64 = candidate.try_get("id")?;

        let new_visible_at = (now + visible_for).to_rfc3339();
        let claimed = sqlx::query(
            "UPDATE queue_messages SET visible_at = $1, read_ct = read_ct + 1 \
             WHERE id = $2 AND visible_at <= $3",
        )
        .bind(&new_visible_at)
        .bind(id)
        .bind(now.to_rfc3339())
        .execute(self.pool)
        .await?;

        if claimed.rows_affected() == 0 {
            // Another worker claimed it between our SELECT and UPDATE.
            return Ok(None);
        }

        let raw: QueueMessageRaw = sqlx::query_as(
            "SELECT id, body, read_ct, enqueued_at, visible_at FROM queue_messages WHERE id = $1",
        )
        .bind(id)
        .fetch_one(self.pool)
        .await?;

        Ok(Some(raw.into_typed()?))
    }

    pub async fn delete(&self, msg_id: i64) -> DbResult<()> {
        sqlx::query("DELETE FROM queue_messages WHERE id = $1 AND queue_name = $2")
            .bind(msg_id)
            .bind(self.name)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Release a claim early (e.g. after a `Transient` failure) by setting
    /// `visible_at` back to now, without waiting out the lease.
    pub async fn release(&self, msg_id: i64) -> DbResult<()> {
        sqlx::query("UPDATE queue_messages SET visible_at = $1 WHERE id = $2 AND queue_name = $3")
            .bind(Utc::now().to_rfc3339())
            .bind(msg_id)
            .bind(self.name)
            .execute(self.pool)
            .await?;
        Ok(())
    }
}

pub const WEBHOOK_EVENTS_QUEUE: &str = "webhook_events";
pub const REPO_ANALYSIS_QUEUE: &str = "repo_analysis";
