use chrono::Utc;
use reviewbot_core::{ConnectedRepo, CustomSkill, Provider, RepoStatus};
use sqlx::{Any, Pool};

use crate::error::{DbError, DbResult};
use crate::models::{status_str, ConnectedRepoRaw};

pub async fn insert(pool: &Pool<Any>, repo: &ConnectedRepo) -> DbResult<()> {
    let custom_skills = serde_json::to_string(&repo.custom_skills)?;

    sqlx::query(
        "INSERT INTO connected_repositories \
            (user_id, slug, name, provider, status, connected_at, analysis_profile, \
             persona, persona_edited, custom_skills, webhook_hook_id, webhook_secret) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
    )
    .bind(&repo.user_id)
    .bind(&repo.slug)
    .bind(&repo.name)
    .bind(repo.provider.as_str())
    .bind(status_str(repo.status))
    .bind(repo.connected_at.to_rfc3339())
    .bind(&repo.analysis_profile)
    .bind(&repo.persona)
    .bind(repo.persona_edited as i32)
    .bind(custom_skills)
    .bind(repo.webhook_hook_id)
    .bind(&repo.webhook_secret)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn get(pool: &Pool<Any>, user_id: &str, slug: &str) -> DbResult<ConnectedRepo> {
    let raw: ConnectedRepoRaw = sqlx::query_as(
        "SELECT user_id, slug, name, provider, status, connected_at, analysis_profile, \
                persona, persona_edited, custom_skills, webhook_hook_id, webhook_secret \
         FROM connected_repositories WHERE user_id = $1 AND slug = $2",
    )
    .bind(user_id)
    .bind(slug)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| DbError::RepoNotFound(user_id.to_string(), slug.to_string()))?;

    raw.try_into()
}

pub async fn list_for_user(pool: &Pool<Any>, user_id: &str) -> DbResult<Vec<ConnectedRepo>> {
    let rows: Vec<ConnectedRepoRaw> = sqlx::query_as(
        "SELECT user_id, slug, name, provider, status, connected_at, analysis_profile, \
                persona, persona_edited, custom_skills, webhook_hook_id, webhook_secret \
         FROM connected_repositories WHERE user_id = $1 ORDER BY connected_at ASC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(TryInto::try_into).collect()
}

/// Look up every connected repo across all users matching a forge-reported
/// full name (`owner/repo`), used by webhook ingress to fan an inbound event
/// out to each subscriber of that repo.
pub async fn list_by_name(
    pool: &Pool<Any>,
    provider: Provider,
    name: &str,
) -> DbResult<Vec<ConnectedRepo>> {
    let rows: Vec<ConnectedRepoRaw> = sqlx::query_as(
        "SELECT user_id, slug, name, provider, status, connected_at, analysis_profile, \
                persona, persona_edited, custom_skills, webhook_hook_id, webhook_secret \
         FROM connected_repositories WHERE provider = $1 AND name = $2",
    )
    .bind(provider.as_str())
    .bind(name)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(TryInto::try_into).collect()
}

pub async fn set_status(
    pool: &Pool<Any>,
    user_id: &str,
    slug: &str,
    status: RepoStatus,
) -> DbResult<()> {
    let result = sqlx::query(
        "UPDATE connected_repositories SET status = $1 WHERE user_id = $2 AND slug = $3",
    )
    .bind(status_str(status))
    .bind(user_id)
    .bind(slug)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::RepoNotFound(user_id.to_string(), slug.to_string()));
    }
    Ok(())
}

pub async fn set_persona(
    pool: &Pool<Any>,
    user_id: &str,
    slug: &str,
    persona: &str,
    analysis_profile: Option<&str>,
    edited: bool,
) -> DbResult<()> {
    let result = sqlx::query(
        "UPDATE connected_repositories \
         SET persona = $1, analysis_profile = $2, persona_edited = $3 \
         WHERE user_id = $4 AND slug = $5",
    )
    .bind(persona)
    .bind(analysis_profile)
    .bind(edited as i32)
    .bind(user_id)
    .bind(slug)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::RepoNotFound(user_id.to_string(), slug.to_string()));
    }
    Ok(())
}

pub async fn set_custom_skills(
    pool: &Pool<Any>,
    user_id: &str,
    slug: &str,
    skills: &[CustomSkill],
) -> DbResult<()> {
    let encoded = serde_json::to_string(skills)?;
    let result = sqlx::query(
        "UPDATE connected_repositories SET custom_skills = $1 WHERE user_id = $2 AND slug = $3",
    )
    .bind(encoded)
    .bind(user_id)
    .bind(slug)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::RepoNotFound(user_id.to_string(), slug.to_string()));
    }
    Ok(())
}

pub async fn set_webhook(
    pool: &Pool<Any>,
    user_id: &str,
    slug: &str,
    hook_id: i64,
    secret: &str,
) -> DbResult<()> {
    let result = sqlx::query(
        "UPDATE connected_repositories SET webhook_hook_id = $1, webhook_secret = $2 \
         WHERE user_id = $3 AND slug = $4",
    )
    .bind(hook_id)
    .bind(secret)
    .bind(user_id)
    .bind(slug)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::RepoNotFound(user_id.to_string(), slug.to_string()));
    }
    Ok(())
}

/// The in-progress interview transcript (question/answer pairs so far,
/// caller-encoded), stored alongside the repo row between successive
/// interview steps. `None` means no interview has started yet.
pub async fn get_interview_transcript(
    pool: &Pool<Any>,
    user_id: &str,
    slug: &str,
) -> DbResult<Option<String>> {
    let row: Option<(Option<String>,)> = sqlx::query_as(
        "SELECT interview_transcript FROM connected_repositories WHERE user_id = $1 AND slug = $2",
    )
    .bind(user_id)
    .bind(slug)
    .fetch_optional(pool)
    .await?;

    row.map(|(t,)| t)
        .ok_or_else(|| DbError::RepoNotFound(user_id.to_string(), slug.to_string()))
}

pub async fn set_interview_transcript(
    pool: &Pool<Any>,
    user_id: &str,
    slug: &str,
    transcript: Option<&str>,
) -> DbResult<()> {
    let result = sqlx::query(
        "UPDATE connected_repositories SET interview_transcript = $1 \
         WHERE user_id = $2 AND slug = $3",
    )
    .bind(transcript)
    .bind(user_id)
    .bind(slug)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::RepoNotFound(user_id.to_string(), slug.to_string()));
    }
    Ok(())
}

pub async fn delete(pool: &Pool<Any>, user_id: &str, slug: &str) -> DbResult<()> {
    let result = sqlx::query("DELETE FROM connected_repositories WHERE user_id = $1 AND slug = $2")
        .bind(user_id)
        .bind(slug)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::RepoNotFound(user_id.to_string(), slug.to_string()));
    }
    Ok(())
}

pub fn now() -> chrono::DateTime<Utc> {
    Utc::now()
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

    fn sample_repo() -> ConnectedRepo {
        ConnectedRepo {
            user_id: "u1".into(),
            slug: "acme-widgets".into(),
            name: "acme/widgets".into(),
            provider: Provider::Github,
            status: RepoStatus::Analyzing,
            connected_at: now(),
            analysis_profile: None,
            persona: None,
            persona_edited: false,
            custom_skills: vec![],
            webhook_hook_id: None,
            webhook_secret: None,
        }
    }

    #[tokio::test]
    async fn insert_then_get_roundtrips() {
        let pool = setup_test_db().await;
        insert(&pool, &sample_repo()).await.unwrap();

        let fetched = get(&pool, "u1", "acme-widgets").await.unwrap();
        assert_eq!(fetched.name, "acme/widgets");
        assert_eq!(fetched.status, RepoStatus::Analyzing);
    }

    #[tokio::test]
    async fn get_missing_repo_errors() {
        let pool = setup_test_db().await;
        let err = get(&pool, "u1", "nope").await.unwrap_err();
        assert!(matches!(err, DbError::RepoNotFound(_, _)));
    }

    #[tokio::test]
    async fn set_status_transitions_lifecycle() {
        let pool = setup_test_db().await;
        insert(&pool, &sample_repo()).await.unwrap();

        set_status(&pool, "u1", "acme-widgets", RepoStatus::Active)
            .await
            .unwrap();
        let fetched = get(&pool, "u1", "acme-widgets").await.unwrap();
        assert_eq!(fetched.status, RepoStatus::Active);
    }

    #[tokio::test]
    async fn list_by_name_finds_every_subscriber() {
        let pool = setup_test_db().await;
        let mut a = sample_repo();
        a.user_id = "u1".into();
        let mut b = sample_repo();
        b.user_id = "u2".into();
        insert(&pool, &a).await.unwrap();
        insert(&pool, &b).await.unwrap();

        let found = list_by_name(&pool, Provider::Github, "acme/widgets")
            .await
            .unwrap();
        assert_eq!(found.len(), 2);
    }

    #[tokio::test]
    async fn interview_transcript_roundtrips_and_defaults_to_none() {
        let pool = setup_test_db().await;
        insert(&pool, &sample_repo()).await.unwrap();

        assert_eq!(get_interview_transcript(&pool, "u1", "acme-widgets").await.unwrap(), None);

        set_interview_transcript(&pool, "u1", "acme-widgets", Some("[{\"q\":1}]"))
            .await
            .unwrap();
        assert_eq!(
            get_interview_transcript(&pool, "u1", "acme-widgets").await.unwrap(),
            Some("[{\"q\":1}]".to_string())
        );
    }

    #[tokio::test]
    async fn delete_removes_row() {
        let pool = setup_test_db().await;
        insert(&pool, &sample_repo()).await.unwrap();
        delete(&pool, "u1", "acme-widgets").await.unwrap();
        assert!(get(&pool, "u1", "acme-widgets").await.is_err());
    }
}
