use std::collections::HashMap;
use std::sync::Arc;

use reviewbot_core::{Provider, SkillsCatalog};
use reviewbot_forge::{ForgeAdapter, InstallationTokenManager};
use sqlx::{Any, Pool};

use crate::config::PipelineConfig;
use crate::token_store::TokenStore;

/// Everything Analyzer, Reviewer, and InterviewDriver share: the db pool,
/// one `ForgeAdapter` per provider, the token store, the eagerly-loaded
/// skills catalog, and optional bot identities for posting-as-bot instead
/// of as the connecting user.
pub struct Services {
    pub pool: Pool<Any>,
    pub token_store: TokenStore,
    pub config: PipelineConfig,
    pub skills: SkillsCatalog,
    adapters: HashMap<Provider, Arc<dyn ForgeAdapter>>,
    pub github_installation_tokens: Option<Arc<InstallationTokenManager>>,
    pub gitlab_bot_token: Option<String>,
}

impl Services {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: Pool<Any>,
        token_store: TokenStore,
        config: PipelineConfig,
        skills: SkillsCatalog,
        github_adapter: Arc<dyn ForgeAdapter>,
        gitlab_adapter: Arc<dyn ForgeAdapter>,
        github_installation_tokens: Option<Arc<InstallationTokenManager>>,
        gitlab_bot_token: Option<String>,
    ) -> Self {
        let mut adapters: HashMap<Provider, Arc<dyn ForgeAdapter>> = HashMap::new();
        adapters.insert(Provider::Github, github_adapter);
        adapters.insert(Provider::Gitlab, gitlab_adapter);
        Self {
            pool,
            token_store,
            config,
            skills,
            adapters,
            github_installation_tokens,
            gitlab_bot_token,
        }
    }

    pub fn adapter(&self, provider: Provider) -> &Arc<dyn ForgeAdapter> {
        self.adapters
            .get(&provider)
            .expect("an adapter is registered for every Provider variant")
    }

    /// The `x-access-token`/`oauth2` placeholder username a clone URL needs
    /// in front of the access token, per provider.
    pub fn clone_url_user(provider: Provider) -> &'static str {
        match provider {
            Provider::Github => "x-access-token",
            Provider::Gitlab => "oauth2",
        }
    }

    pub fn forge_host(provider: Provider) -> &'static str {
        match provider {
            Provider::Github => "github.com",
            Provider::Gitlab => "gitlab.com",
        }
    }

    /// Resolve the token to post a review with: a bot identity if
    /// configured for this provider, falling back to the user's own token.
    pub async fn posting_token(&self, provider: Provider, repo_name: &str, user_token: &str) -> String {
        match provider {
            Provider::Github => {
                if let Some(manager) = &self.github_installation_tokens {
                    if let Ok(token) = manager.get_token(repo_name).await {
                        return token;
                    }
                }
                user_token.to_string()
            }
            Provider::Gitlab => self.gitlab_bot_token.clone().unwrap_or_else(|| user_token.to_string()),
        }
    }
}
