use reviewbot_core::Review;
use sqlx::{Any, Pool, Row};

use crate::error::DbResult;
use crate::models::ReviewRaw;

const COLUMNS: &str = "id, user_id, repo_slug, pr_number, pr_title, pr_url, pr_author, \
     verdict, summary, comment_count, posted_count, comments, llm_provider, llm_model, created_at";

pub async fn insert(
    pool: &Pool<Any>,
    user_id: &str,
    repo_slug: &str,
    pr_number: i64,
    pr_title: &str,
    pr_url: &str,
    pr_author: &str,
    verdict: &str,
    summary: Option<&str>,
    comments: &[reviewbot_core::ReviewComment],
    posted_count: i32,
    llm_provider: &str,
    llm_model: &str,
) -> DbResult<i64> {
    let encoded_comments = serde_json::to_string(comments)?;
    let now = chrono::Utc::now().to_rfc3339();

    let row = sqlx::query(
        "INSERT INTO reviews \
            (user_id, repo_slug, pr_number, pr_title, pr_url, pr_author, verdict, summary, \
             comment_count, posted_count, comments, llm_provider, llm_model, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) RETURNING id",
    )
    .bind(user_id)
    .bind(repo_slug)
    .bind(pr_number)
    .bind(pr_title)
    .bind(pr_url)
    .bind(pr_author)
    .bind(verdict)
    .bind(summary)
    .bind(comments.len() as i32)
    .bind(posted_count)
    .bind(encoded_comments)
    .bind(llm_provider)
    .bind(llm_model)
    .bind(now)
    .fetch_one(pool)
    .await?;

    Ok(row.try_get::<i64, _>("id")?)
}

/// All reviews for a PR, newest first. Used to build the
/// already-posted-comment set for duplicate suppression on re-review — the
/// full history, not a recent slice, since an issue flagged once should
/// never be re-flagged regardless of how many reviews have run since.
pub async fn recent_for_pr(
    pool: &Pool<Any>,
    user_id: &str,
    repo_slug: &str,
    pr_number: i64,
) -> DbResult<Vec<Review>> {
    let rows: Vec<ReviewRaw> = sqlx::query_as(&format!(
        "SELECT {COLUMNS} FROM reviews \
         WHERE user_id = $1 AND repo_slug = $2 AND pr_number = $3 \
         ORDER BY created_at DESC"
    ))
    .bind(user_id)
    .bind(repo_slug)
    .bind(pr_number)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(TryInto::try_into).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{create_pool, run_migrations};
    use reviewbot_core::{ReviewComment, Severity};

    async fn setup_test_db() -> Pool<Any> {
        sqlx::any::install_default_drivers();
        let pool = create_pool("sqlite::memory:", 1).await.unwrap();
        run_migrations(&pool).await.unwrap();
        pool
    }

    fn sample_comment() -> ReviewComment {
        ReviewComment {
            file: "src/lib.rs".into(),
            line: 10,
            end_line: None,
            severity: Severity::Warning,
            category: "style".into(),
            message: "consider extracting".into(),
            suggestion: None,
        }
    }

    #[tokio::test]
    async fn insert_then_recent_for_pr_roundtrips() {
        let pool = setup_test_db().await;
        let comments = vec![sample_comment()];

        insert(
            &pool, "u1", "acme-widgets", 42, "Add feature", "https://x/42", "alice",
            "approve", Some("looks good"), &comments, 1, "anthropic", "claude-opus-4",
        )
        .await
        .unwrap();

        let reviews = recent_for_pr(&pool, "u1", "acme-widgets", 42).await.unwrap();
        assert_eq!(reviews.len(), 1);
        assert_eq!(reviews[0].comment_count, 1);
        assert_eq!(reviews[0].posted_count, 1);
        assert_eq!(reviews[0].comments.len(), 1);
    }

    #[tokio::test]
    async fn recent_for_pr_orders_newest_first() {
        let pool = setup_test_db().await;
        for verdict in ["request_changes", "approve"] {
            insert(
                &pool, "u1", "acme-widgets", 1, "t", "u", "a",
                verdict, None, &[], 0, "anthropic", "claude-opus-4",
            )
            .await
            .unwrap();
        }

        let reviews = recent_for_pr(&pool, "u1", "acme-widgets", 1).await.unwrap();
        assert_eq!(reviews.len(), 2);
        assert_eq!(reviews[0].verdict, "approve");
    }

    #[tokio::test]
    async fn recent_for_pr_returns_entire_history_unbounded() {
        let pool = setup_test_db().await;
        for _ in 0..15 {
            insert(
                &pool, "u1", "acme-widgets", 1, "t", "u", "a",
                "approve", None, &[], 0, "anthropic", "claude-opus-4",
            )
            .await
            .unwrap();
        }

        let reviews = recent_for_pr(&pool, "u1", "acme-widgets", 1).await.unwrap();
        assert_eq!(reviews.len(), 15);
    }
}
