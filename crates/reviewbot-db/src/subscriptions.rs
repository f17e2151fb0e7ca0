use chrono::Utc;
use reviewbot_core::Subscription;
use sqlx::{Any, Pool};

use crate::error::{DbError, DbResult};
use crate::models::SubscriptionRaw;

const COLUMNS: &str =
    "user_id, plan, status, review_count_month, review_count_reset_at, current_period_end";

pub async fn get(pool: &Pool<Any>, user_id: &str) -> DbResult<Subscription> {
    let raw: SubscriptionRaw = sqlx::query_as(&format!(
        "SELECT {COLUMNS} FROM subscriptions WHERE user_id = $1"
    ))
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| DbError::SubscriptionNotFound(user_id.to_string()))?;

    raw.try_into()
}

/// Create the free-tier default row a brand new user starts with.
pub async fn insert_default(pool: &Pool<Any>, user_id: &str) -> DbResult<()> {
    sqlx::query(
        "INSERT INTO subscriptions (user_id, plan, status, review_count_month, review_count_reset_at) \
         VALUES ($1, 'free', 'active', 0, $2)",
    )
    .bind(user_id)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;
    Ok(())
}

/// Atomically bump the monthly review counter, resetting it first if the
/// 30-day window has elapsed. Called once per accepted Reviewer job, right
/// before dispatch, so the cap is enforced against in-flight work too.
pub async fn increment_review_count(pool: &Pool<Any>, user_id: &str) -> DbResult<Subscription> {
    let current = get(pool, user_id).await?;
    let now = Utc::now();

    if current.counter_window_elapsed(now) {
        sqlx::query(
            "UPDATE subscriptions SET review_count_month = 1, review_count_reset_at = $1 \
             WHERE user_id = $2",
        )
        .bind(now.to_rfc3339())
        .bind(user_id)
        .execute(pool)
        .await?;
    } else {
        sqlx::query(
            "UPDATE subscriptions SET review_count_month = review_count_month + 1 \
             WHERE user_id = $1",
        )
        .bind(user_id)
        .execute(pool)
        .await?;
    }

    get(pool, user_id).await
}

pub async fn set_plan(pool: &Pool<Any>, user_id: &str, plan: reviewbot_core::model::Plan) -> DbResult<()> {
    let plan_str = match plan {
        reviewbot_core::model::Plan::Free => "free",
        reviewbot_core::model::Plan::Pro => "pro",
    };
    let result = sqlx::query("UPDATE subscriptions SET plan = $1 WHERE user_id = $2")
        .bind(plan_str)
        .bind(user_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::SubscriptionNotFound(user_id.to_string()));
    }
    Ok(())
}
