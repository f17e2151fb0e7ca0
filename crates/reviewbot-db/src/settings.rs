use reviewbot_core::UserSettings;
use sqlx::{Any, FromRow, Pool};

use crate::error::{DbError, DbResult};

#[derive(Debug, Clone, FromRow)]
struct UserSettingsRaw {
    user_id: String,
    github_token: Option<String>,
    github_refresh_token: Option<String>,
    gitlab_token: Option<String>,
    gitlab_refresh_token: Option<String>,
    llm_provider: String,
    llm_model: String,
    api_key: Option<String>,
    max_comments: i32,
}

impl From<UserSettingsRaw> for UserSettings {
    fn from(raw: UserSettingsRaw) -> Self {
        UserSettings {
            user_id: raw.user_id,
            github_token: raw.github_token,
            github_refresh_token: raw.github_refresh_token,
            gitlab_token: raw.gitlab_token,
            gitlab_refresh_token: raw.gitlab_refresh_token,
            llm_provider: raw.llm_provider,
            llm_model: raw.llm_model,
            api_key: raw.api_key,
            max_comments: raw.max_comments,
        }
    }
}

const COLUMNS: &str = "user_id, github_token, github_refresh_token, gitlab_token, \
     gitlab_refresh_token, llm_provider, llm_model, api_key, max_comments";

pub async fn get(pool: &Pool<Any>, user_id: &str) -> DbResult<UserSettings> {
    let raw: UserSettingsRaw = sqlx::query_as(&format!(
        "SELECT {COLUMNS} FROM user_settings WHERE user_id = $1"
    ))
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| DbError::SettingsNotFound(user_id.to_string()))?;

    Ok(raw.into())
}

/// Upsert the whole settings row. Mirrors the connected-repo-config
/// UPDATE-then-INSERT-if-unmatched idiom rather than relying on a
/// driver-specific `ON CONFLICT` clause, since `sqlx::Any` must stay
/// portable across sqlite and postgres.
pub async fn upsert(pool: &Pool<Any>, settings: &UserSettings) -> DbResult<()> {
    let updated = sqlx::query(
        "UPDATE user_settings SET github_token = $1, github_refresh_token = $2, \
             gitlab_token = $3, gitlab_refresh_token = $4, llm_provider = $5, \
             llm_model = $6, api_key = $7, max_comments = $8 \
         WHERE user_id = $9",
    )
    .bind(&settings.github_token)
    .bind(&settings.github_refresh_token)
    .bind(&settings.gitlab_token)
    .bind(&settings.gitlab_refresh_token)
    .bind(&settings.llm_provider)
    .bind(&settings.llm_model)
    .bind(&settings.api_key)
    .bind(settings.max_comments)
    .bind(&settings.user_id)
    .execute(pool)
    .await?;

    if updated.rows_affected() == 0 {
        sqlx::query(
            "INSERT INTO user_settings \
                (user_id, github_token, github_refresh_token, gitlab_token, \
                 gitlab_refresh_token, llm_provider, llm_model, api_key, max_comments) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(&settings.user_id)
        .bind(&settings.github_token)
        .bind(&settings.github_refresh_token)
        .bind(&settings.gitlab_token)
        .bind(&settings.gitlab_refresh_token)
        .bind(&settings.llm_provider)
        .bind(&settings.llm_model)
        .bind(&settings.api_key)
        .bind(settings.max_comments)
        .execute(pool)
        .await?;
    }

    Ok(())
}

/// Write back a refreshed access/refresh token pair for one provider,
/// without disturbing the rest of the row. Used by the TokenStore after a
/// successful refresh.
pub async fn save_tokens(
    pool: &Pool<Any>,
    user_id: &str,
    provider: reviewbot_core::Provider,
    access_token: &str,
    refresh_token: Option<&str>,
) -> DbResult<()> {
    let result = match provider {
        reviewbot_core::Provider::Github => {
            sqlx::query(
                "UPDATE user_settings SET github_token = $1, \
                 github_refresh_token = COALESCE($2, github_refresh_token) WHERE user_id = $3",
            )
            .bind(access_token)
            .bind(refresh_token)
            .bind(user_id)
            .execute(pool)
            .await?
        }
        reviewbot_core::Provider::Gitlab => {
            sqlx::query(
                "UPDATE user_settings SET gitlab_token = $1, \
                 gitlab_refresh_token = COALESCE($2, gitlab_refresh_token) WHERE user_id = $3",
            )
            .bind(access_token)
            .bind(refresh_token)
            .bind(user_id)
            .execute(pool)
            .await?
        }
    };

    if result.rows_affected() == 0 {
        return Err(DbError::SettingsNotFound(user_id.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{create_pool, run_migrations};

    async fn setup_test_db() -> Pool<Any> {
        sqlx::any::install_default_drivers();
        let pool = create_pool("sqlite::memory:", 1).await.unwrap();
        run_migrations(&pool).await.unwrap();
        pool
    }

    fn sample() -> UserSettings {
        UserSettings {
            user_id: "u1".into(),
            github_token: Some("gh-token".into()),
            github_refresh_token: None,
            gitlab_token: None,
            gitlab_refresh_token: None,
            llm_provider: "anthropic".into(),
            llm_model: "claude-opus-4".into(),
            api_key: None,
            max_comments: 10,
        }
    }

    #[tokio::test]
    async fn upsert_inserts_when_absent() {
        let pool = setup_test_db().await;
        upsert(&pool, &sample()).await.unwrap();
        let fetched = get(&pool, "u1").await.unwrap();
        assert_eq!(fetched.github_token.as_deref(), Some("gh-token"));
    }

    #[tokio::test]
    async fn upsert_updates_when_present() {
        let pool = setup_test_db().await;
        upsert(&pool, &sample()).await.unwrap();

        let mut changed = sample();
        changed.max_comments = 25;
        upsert(&pool, &changed).await.unwrap();

        let fetched = get(&pool, "u1").await.unwrap();
        assert_eq!(fetched.max_comments, 25);
    }

    #[tokio::test]
    async fn save_tokens_preserves_other_provider() {
        let pool = setup_test_db().await;
        let mut s = sample();
        s.gitlab_token = Some("gl-old".into());
        upsert(&pool, &s).await.unwrap();

        save_tokens(&pool, "u1", reviewbot_core::Provider::Github, "gh-new", Some("gh-refresh"))
            .await
            .unwrap();

        let fetched = get(&pool, "u1").await.unwrap();
        assert_eq!(fetched.github_token.as_deref(), Some("gh-new"));
        assert_eq!(fetched.gitlab_token.as_deref(), Some("gl-old"));
    }

    #[tokio::test]
    async fn save_tokens_missing_user_errors() {
        let pool = setup_test_db().await;
        let err = save_tokens(&pool, "ghost", reviewbot_core::Provider::Github, "x", None)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::SettingsNotFound(_)));
    }
}
