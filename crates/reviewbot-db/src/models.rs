use chrono::{DateTime, Utc};
use reviewbot_core::{ConnectedRepo, Provider, RepoStatus, Review, ReviewComment, Subscription};
use sqlx::FromRow;

use crate::error::DbError;

fn parse_rfc3339(s: &str) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DbError::Serde(serde::de::Error::custom(e.to_string())))
}

/// `sqlx::Any` doesn't bind chrono types cleanly across sqlite/postgres, so
/// every table is read into a `*Raw` row (timestamps as RFC3339 strings,
/// enums/jsonb columns as plain text) and converted with `TryFrom`.
#[derive(Debug, Clone, FromRow)]
pub(crate) struct ConnectedRepoRaw {
    pub user_id: String,
    pub slug: String,
    pub name: String,
    pub provider: String,
    pub status: String,
    pub connected_at: String,
    pub analysis_profile: Option<String>,
    pub persona: Option<String>,
    pub persona_edited: i32,
    pub custom_skills: String,
    pub webhook_hook_id: Option<i64>,
    pub webhook_secret: Option<String>,
}

impl TryFrom<ConnectedRepoRaw> for ConnectedRepo {
    type Error = DbError;

    fn try_from(raw: ConnectedRepoRaw) -> Result<Self, Self::Error> {
        Ok(ConnectedRepo {
            user_id: raw.user_id,
            slug: raw.slug,
            name: raw.name,
            provider: match raw.provider.as_str() {
                "github" => Provider::Github,
                "gitlab" => Provider::Gitlab,
                other => {
                    return Err(DbError::Serde(serde::de::Error::custom(format!(
                        "unknown provider {other}"
                    ))))
                }
            },
            status: match raw.status.as_str() {
                "analyzing" => RepoStatus::Analyzing,
                "interview" => RepoStatus::Interview,
                "active" => RepoStatus::Active,
                "paused" => RepoStatus::Paused,
                other => {
                    return Err(DbError::Serde(serde::de::Error::custom(format!(
                        "unknown status {other}"
                    ))))
                }
            },
            connected_at: parse_rfc3339(&raw.connected_at)?,
            analysis_profile: raw.analysis_profile,
            persona: raw.persona,
            persona_edited: raw.persona_edited != 0,
            custom_skills: serde_json::from_str(&raw.custom_skills)?,
            webhook_hook_id: raw.webhook_hook_id,
            webhook_secret: raw.webhook_secret,
        })
    }
}

pub(crate) fn status_str(status: RepoStatus) -> &'static str {
    match status {
        RepoStatus::Analyzing => "analyzing",
        RepoStatus::Interview => "interview",
        RepoStatus::Active => "active",
        RepoStatus::Paused => "paused",
    }
}

#[derive(Debug, Clone, FromRow)]
pub(crate) struct ReviewRaw {
    pub id: i64,
    pub user_id: String,
    pub repo_slug: String,
    pub pr_number: i64,
    pub pr_title: String,
    pub pr_url: String,
    pub pr_author: String,
    pub verdict: String,
    pub summary: Option<String>,
    pub comment_count: i32,
    pub posted_count: i32,
    pub comments: String,
    pub llm_provider: String,
    pub llm_model: String,
    pub created_at: String,
}

impl TryFrom<ReviewRaw> for Review {
    type Error = DbError;

    fn try_from(raw: ReviewRaw) -> Result<Self, Self::Error> {
        let comments: Vec<ReviewComment> = serde_json::from_str(&raw.comments)?;
        Ok(Review {
            id: raw.id,
            user_id: raw.user_id,
            repo_slug: raw.repo_slug,
            pr_number: raw.pr_number,
            pr_title: raw.pr_title,
            pr_url: raw.pr_url,
            pr_author: raw.pr_author,
            verdict: raw.verdict,
            summary: raw.summary,
            comment_count: raw.comment_count,
            posted_count: raw.posted_count,
            comments,
            llm_provider: raw.llm_provider,
            llm_model: raw.llm_model,
            created_at: parse_rfc3339(&raw.created_at)?,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub(crate) struct SubscriptionRaw {
    pub user_id: String,
    pub plan: String,
    pub status: String,
    pub review_count_month: i32,
    pub review_count_reset_at: String,
    pub current_period_end: Option<String>,
}

impl TryFrom<SubscriptionRaw> for Subscription {
    type Error = DbError;

    fn try_from(raw: SubscriptionRaw) -> Result<Self, Self::Error> {
        use reviewbot_core::model::Plan;
        Ok(Subscription {
            user_id: raw.user_id,
            plan: if raw.plan == "pro" { Plan::Pro } else { Plan::Free },
            status: raw.status,
            review_count_month: raw.review_count_month,
            review_count_reset_at: parse_rfc3339(&raw.review_count_reset_at)?,
            current_period_end: raw.current_period_end.map(|s| parse_rfc3339(&s)).transpose()?,
        })
    }
}

/// A leased message popped from the Queue. `read_ct` starts at 1 for the
/// first delivery (incremented by `read`, not by `enqueue`).
#[derive(Debug, Clone)]
pub struct QueueMessage<T> {
    pub msg_id: i64,
    pub read_ct: i32,
    pub enqueued_at: DateTime<Utc>,
    pub visible_at: DateTime<Utc>,
    pub body: T,
}

#[derive(Debug, Clone, FromRow)]
pub(crate) struct QueueMessageRaw {
    pub id: i64,
    pub body: String,
    pub read_ct: i32,
    pub enqueued_at: String,
    pub visible_at: String,
}

impl QueueMessageRaw {
    pub(crate) fn into_typed<T: serde::de::DeserializeOwned>(
        self,
    ) -> Result<QueueMessage<T>, DbError> {
        Ok(QueueMessage {
            msg_id: self.id,
            read_ct: self.read_ct,
            enqueued_at: parse_rfc3339(&self.enqueued_at)?,
            visible_at: parse_rfc3339(&self.visible_at)?,
            body: serde_json::from_str(&self.body)?,
        })
    }
}
