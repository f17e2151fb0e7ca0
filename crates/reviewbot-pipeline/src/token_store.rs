use reqwest::Client;
use reviewbot_core::Provider;
use serde::Deserialize;
use sqlx::{Any, Pool};

/// OAuth app credentials for one forge, used only to refresh a user's
/// access token; never to mint new authorizations.
#[derive(Debug, Clone)]
pub struct OAuthClientConfig {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// Provides a valid provider access token for `(user, provider)`,
/// refreshing on demand via the forge's OAuth token endpoint. Writes are
/// unlocked: concurrent refreshes may race, the later write simply wins,
/// and both callers still receive a token that was valid at mint time.
pub struct TokenStore {
    pool: Pool<Any>,
    client: Client,
    github_oauth: OAuthClientConfig,
    gitlab_oauth: OAuthClientConfig,
    github_api_base: String,
    gitlab_api_base: String,
    github_oauth_url: String,
    gitlab_oauth_url: String,
}

const GITHUB_API_BASE: &str = "https://api.github.com";
const GITLAB_API_BASE: &str = "https://gitlab.com/api/v4";
const GITHUB_OAUTH_URL: &str = "https://github.com/login/oauth/access_token";
const GITLAB_OAUTH_URL: &str = "https://gitlab.com/oauth/token";

impl TokenStore {
    pub fn new(
        pool: Pool<Any>,
        client: Client,
        github_oauth: OAuthClientConfig,
        gitlab_oauth: OAuthClientConfig,
    ) -> Self {
        Self {
            pool,
            client,
            github_oauth,
            gitlab_oauth,
            github_api_base: GITHUB_API_BASE.to_string(),
            gitlab_api_base: GITLAB_API_BASE.to_string(),
            github_oauth_url: GITHUB_OAUTH_URL.to_string(),
            gitlab_oauth_url: GITLAB_OAUTH_URL.to_string(),
        }
    }

    /// Point every forge host at a mock server instead of the real APIs.
    #[cfg(test)]
    fn new_with_base(
        pool: Pool<Any>,
        client: Client,
        github_oauth: OAuthClientConfig,
        gitlab_oauth: OAuthClientConfig,
        base_url: String,
    ) -> Self {
        Self {
            pool,
            client,
            github_oauth,
            gitlab_oauth,
            github_api_base: base_url.clone(),
            gitlab_api_base: base_url.clone(),
            github_oauth_url: format!("{base_url}/login/oauth/access_token"),
            gitlab_oauth_url: format!("{base_url}/oauth/token"),
        }
    }

    /// Upsert the initial access/refresh pair obtained from an OAuth
    /// authorization, e.g. right after the connect flow completes.
    pub async fn save_initial(
        &self,
        user_id: &str,
        provider: Provider,
        access: &str,
        refresh: Option<&str>,
    ) -> Result<(), reviewbot_db::DbError> {
        reviewbot_db::settings::save_tokens(&self.pool, user_id, provider, access, refresh).await
    }

    /// Return a token that is valid at the moment of return (modulo
    /// races), probing the forge and refreshing once if the stored access
    /// token has gone stale.
    pub async fn get_valid(&self, user_id: &str, provider: Provider) -> Option<String> {
        let settings = reviewbot_db::settings::get(&self.pool, user_id).await.ok()?;

        let (access, refresh) = match provider {
            Provider::Github => (settings.github_token, settings.github_refresh_token),
            Provider::Gitlab => (settings.gitlab_token, settings.gitlab_refresh_token),
        };

        if let Some(access) = &access {
            if self.probe(provider, access).await {
                return Some(access.clone());
            }
        }

        let refresh = refresh?;
        let new_access = self.refresh(provider, &refresh).await?;
        if let Err(e) = self.save_initial(user_id, provider, &new_access.0, new_access.1.as_deref()).await {
            tracing::warn!(user_id, error = %e, "failed to persist refreshed token");
        }
        Some(new_access.0)
    }

    /// Lightweight `whoami` probe: a 2xx response means the token is
    /// currently accepted, anything else (including network failure)
    /// counts as invalid.
    async fn probe(&self, provider: Provider, access_token: &str) -> bool {
        let request = match provider {
            Provider::Github => self
                .client
                .get(format!("{}/user", self.github_api_base))
                .bearer_auth(access_token)
                .header("Accept", "application/vnd.github+json")
                .header("X-GitHub-Api-Version", "2022-11-28")
                .header("User-Agent", "reviewbot"),
            Provider::Gitlab => self
                .client
                .get(format!("{}/user", self.gitlab_api_base))
                .bearer_auth(access_token),
        };

        matches!(request.send().await, Ok(resp) if resp.status().is_success())
    }

    async fn refresh(&self, provider: Provider, refresh_token: &str) -> Option<(String, Option<String>)> {
        let (url, oauth) = match provider {
            Provider::Github => (self.github_oauth_url.as_str(), &self.github_oauth),
            Provider::Gitlab => (self.gitlab_oauth_url.as_str(), &self.gitlab_oauth),
        };

        let body = serde_json::json!({
            "grant_type": "refresh_token",
            "refresh_token": refresh_token,
            "client_id": oauth.client_id,
            "client_secret": oauth.client_secret,
        });

        let response = self
            .client
            .post(url)
            .header("Accept", "application/json")
            .json(&body)
            .send()
            .await
            .ok()?;

        if !response.status().is_success() {
            return None;
        }

        let parsed: RefreshResponse = response.json().await.ok()?;
        Some((parsed.access_token, parsed.refresh_token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reviewbot_core::UserSettings;
    use reviewbot_db::pool::{create_pool, run_migrations};

    async fn setup_test_db() -> Pool<Any> {
        sqlx::any::install_default_drivers();
        let pool = create_pool("sqlite::memory:", 1).await.unwrap();
        run_migrations(&pool).await.unwrap();
        pool
    }

    fn oauth_config() -> OAuthClientConfig {
        OAuthClientConfig {
            client_id: "id".into(),
            client_secret: "secret".into(),
        }
    }

    #[tokio::test]
    async fn refresh_preserves_refresh_token_when_provider_omits_new_one() {
        let pool = setup_test_db().await;
        reviewbot_db::settings::upsert(
            &pool,
            &UserSettings {
                user_id: "u1".into(),
                github_token: Some("stale".into()),
                github_refresh_token: Some("refresh-1".into()),
                gitlab_token: None,
                gitlab_refresh_token: None,
                llm_provider: "anthropic".into(),
                llm_model: "claude".into(),
                api_key: None,
                max_comments: 10,
            },
        )
        .await
        .unwrap();

        let store = TokenStore::new(pool.clone(), Client::new(), oauth_config(), oauth_config());

        store
            .save_initial("u1", Provider::Github, "fresh", None)
            .await
            .unwrap();

        let settings = reviewbot_db::settings::get(&pool, "u1").await.unwrap();
        assert_eq!(settings.github_token.as_deref(), Some("fresh"));
        assert_eq!(settings.github_refresh_token.as_deref(), Some("refresh-1"));
    }

    #[tokio::test]
    async fn get_valid_returns_none_when_no_settings_row() {
        let pool = setup_test_db().await;
        let store = TokenStore::new(pool, Client::new(), oauth_config(), oauth_config());
        assert!(store.get_valid("ghost", Provider::Github).await.is_none());
    }

    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn probe_accepts_a_2xx_whoami_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let pool = setup_test_db().await;
        let store =
            TokenStore::new_with_base(pool, Client::new(), oauth_config(), oauth_config(), server.uri());
        assert!(store.probe(Provider::Github, "tok").await);
    }

    #[tokio::test]
    async fn probe_rejects_a_401_whoami_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let pool = setup_test_db().await;
        let store =
            TokenStore::new_with_base(pool, Client::new(), oauth_config(), oauth_config(), server.uri());
        assert!(!store.probe(Provider::Gitlab, "tok").await);
    }

    #[tokio::test]
    async fn refresh_returns_new_access_and_refresh_tokens_on_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/login/oauth/access_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "new-access",
                "refresh_token": "new-refresh",
            })))
            .mount(&server)
            .await;

        let pool = setup_test_db().await;
        let store =
            TokenStore::new_with_base(pool, Client::new(), oauth_config(), oauth_config(), server.uri());
        let (access, refresh) = store.refresh(Provider::Github, "old-refresh").await.unwrap();
        assert_eq!(access, "new-access");
        assert_eq!(refresh.as_deref(), Some("new-refresh"));
    }

    #[tokio::test]
    async fn refresh_returns_none_on_non_success_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&server)
            .await;

        let pool = setup_test_db().await;
        let store =
            TokenStore::new_with_base(pool, Client::new(), oauth_config(), oauth_config(), server.uri());
        assert!(store.refresh(Provider::Gitlab, "old-refresh").await.is_none());
    }

    #[tokio::test]
    async fn get_valid_refreshes_and_persists_when_probe_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/login/oauth/access_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "refreshed-access",
                "refresh_token": "refreshed-refresh",
            })))
            .mount(&server)
            .await;

        let pool = setup_test_db().await;
        reviewbot_db::settings::upsert(
            &pool,
            &UserSettings {
                user_id: "u1".into(),
                github_token: Some("stale".into()),
                github_refresh_token: Some("refresh-1".into()),
                gitlab_token: None,
                gitlab_refresh_token: None,
                llm_provider: "anthropic".into(),
                llm_model: "claude".into(),
                api_key: None,
                max_comments: 10,
            },
        )
        .await
        .unwrap();

        let store = TokenStore::new_with_base(
            pool.clone(),
            Client::new(),
            oauth_config(),
            oauth_config(),
            server.uri(),
        );

        let token = store.get_valid("u1", Provider::Github).await.unwrap();
        assert_eq!(token, "refreshed-access");

        let settings = reviewbot_db::settings::get(&pool, "u1").await.unwrap();
        assert_eq!(settings.github_token.as_deref(), Some("refreshed-access"));
        assert_eq!(settings.github_refresh_token.as_deref(), Some("refreshed-refresh"));
    }
}
