use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which forge a connected repository lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Github,
    Gitlab,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Github => "github",
            Provider::Gitlab => "gitlab",
        }
    }
}

/// Lifecycle of a `ConnectedRepo`. Only ever advances
/// `analyzing -> interview -> active <-> paused`; never regresses to `analyzing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepoStatus {
    Analyzing,
    Interview,
    Active,
    Paused,
}

/// Normalized webhook action, already mapped from the forge-specific raw action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    PrOpened,
    PrUpdated,
    PrClosed,
    PrReopened,
}

impl EventType {
    /// Map a GitHub `pull_request.action` to a normalized event type.
    pub fn from_github_action(action: &str) -> Option<Self> {
        match action {
            "opened" => Some(Self::PrOpened),
            "synchronize" => Some(Self::PrUpdated),
            "reopened" => Some(Self::PrReopened),
            "closed" => Some(Self::PrClosed),
            _ => None,
        }
    }

    /// Map a GitLab `object_attributes.action` to a normalized event type.
    pub fn from_gitlab_action(action: &str) -> Option<Self> {
        match action {
            "open" => Some(Self::PrOpened),
            "update" => Some(Self::PrUpdated),
            "reopen" => Some(Self::PrReopened),
            "close" | "merge" => Some(Self::PrClosed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    Warning,
    Suggestion,
}

/// A review-profile skill bundle attached directly to a repo, distinct from
/// the on-disk predefined catalog (see [`crate::skills`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomSkill {
    pub name: String,
    pub content: String,
}

pub const MAX_CUSTOM_SKILLS: usize = 5;
pub const MAX_CUSTOM_SKILL_CHARS: usize = 2000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectedRepo {
    pub user_id: String,
    pub slug: String,
    pub name: String,
    pub provider: Provider,
    pub status: RepoStatus,
    pub connected_at: DateTime<Utc>,
    pub analysis_profile: Option<String>,
    pub persona: Option<String>,
    pub persona_edited: bool,
    pub custom_skills: Vec<CustomSkill>,
    pub webhook_hook_id: Option<i64>,
    pub webhook_secret: Option<String>,
}

impl ConnectedRepo {
    pub fn owner_repo(&self) -> Option<(&str, &str)> {
        self.name.split_once('/')
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSettings {
    pub user_id: String,
    pub github_token: Option<String>,
    pub github_refresh_token: Option<String>,
    pub gitlab_token: Option<String>,
    pub gitlab_refresh_token: Option<String>,
    pub llm_provider: String,
    pub llm_model: String,
    pub api_key: Option<String>,
    pub max_comments: i32,
}

impl UserSettings {
    /// `llm_model` normalized to `provider/model` form, falling back to
    /// `llm_provider` when a legacy value was stored without the slash.
    pub fn normalized_model(&self) -> String {
        if self.llm_model.contains('/') {
            self.llm_model.clone()
        } else {
            format!("{}/{}", self.llm_provider, self.llm_model)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewComment {
    pub file: String,
    pub line: u32,
    pub end_line: Option<u32>,
    pub severity: Severity,
    pub category: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl ReviewComment {
    pub fn is_well_formed(&self) -> bool {
        self.end_line.is_none_or(|end| end >= self.line)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
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
    pub comments: Vec<ReviewComment>,
    pub llm_provider: String,
    pub llm_model: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Plan {
    Free,
    Pro,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub user_id: String,
    pub plan: Plan,
    pub status: String,
    pub review_count_month: i32,
    pub review_count_reset_at: DateTime<Utc>,
    pub current_period_end: Option<DateTime<Utc>>,
}

pub const FREE_PLAN_MONTHLY_REVIEW_CAP: i32 = 50;

impl Subscription {
    /// Whether the 30-day counter window has elapsed and should reset.
    pub fn counter_window_elapsed(&self, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.review_count_reset_at) > chrono::Duration::days(30)
    }

    /// Whether this subscription has exhausted its monthly review budget.
    /// Pro plans never hit the cap.
    pub fn over_review_cap(&self) -> bool {
        self.plan != Plan::Pro && self.review_count_month >= FREE_PLAN_MONTHLY_REVIEW_CAP
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub provider: Provider,
    pub event_type: EventType,
    pub repo_slug: String,
    pub repo_name: String,
    pub pr_number: i64,
    pub pr_title: String,
    pub pr_url: String,
    pub pr_author: String,
    pub base_branch: String,
    pub head_branch: String,
    pub raw_action: String,
    pub user_id: String,
    pub received_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_includes_a_slash() {
        let mut s = UserSettings {
            user_id: "u1".into(),
            github_token: None,
            github_refresh_token: None,
            gitlab_token: None,
            gitlab_refresh_token: None,
            llm_provider: "anthropic".into(),
            llm_model: "claude-opus".into(),
            api_key: None,
            max_comments: 10,
        };
        assert_eq!(s.normalized_model(), "anthropic/claude-opus");
        s.llm_model = "anthropic/claude-opus".into();
        assert_eq!(s.normalized_model(), "anthropic/claude-opus");
    }

    #[test]
    fn review_comment_end_line_invariant() {
        let mut c = ReviewComment {
            file: "a.rs".into(),
            line: 10,
            end_line: Some(12),
            severity: Severity::Warning,
            category: "style".into(),
            message: "msg".into(),
            suggestion: None,
        };
        assert!(c.is_well_formed());
        c.end_line = Some(5);
        assert!(!c.is_well_formed());
    }

    #[test]
    fn free_plan_cap_boundary() {
        let now = Utc::now();
        let mut sub = Subscription {
            user_id: "u1".into(),
            plan: Plan::Free,
            status: "active".into(),
            review_count_month: 49,
            review_count_reset_at: now,
            current_period_end: None,
        };
        assert!(!sub.over_review_cap());
        sub.review_count_month = 50;
        assert!(sub.over_review_cap());

        sub.plan = Plan::Pro;
        assert!(!sub.over_review_cap());
    }

    #[test]
    fn counter_window_elapsed_after_30_days() {
        let sub = Subscription {
            user_id: "u1".into(),
            plan: Plan::Free,
            status: "active".into(),
            review_count_month: 10,
            review_count_reset_at: Utc::now() - chrono::Duration::days(31),
            current_period_end: None,
        };
        assert!(sub.counter_window_elapsed(Utc::now()));
    }
}
