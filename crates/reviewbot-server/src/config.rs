use std::path::Path;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use reviewbot_pipeline::{OAuthClientConfig, PipelineConfig};
use serde::{Deserialize, Serialize};

/// Complete application configuration for the server binary: HTTP ingress,
/// the background scheduler loop, and every forge/LLM credential they
/// share. Distinct from `reviewbot_pipeline::PipelineConfig`, which only
/// carries the knobs the orchestration crate itself needs and has no
/// dependency on server/HTTP concerns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub github: GithubConfig,
    pub gitlab: GitlabConfig,
    pub sandbox: SandboxConfig,
    pub webhook_base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// GitHub-side configuration. `oauth_client_id`/`oauth_client_secret` are
/// required (the `TokenStore` needs them to refresh any user's token).
/// `app_id`/`private_key_path` are optional: without them, reviews post
/// with the connecting user's own token instead of a bot installation
/// token (see §4.C's "Authentication for posting-as-bot (optional)").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubConfig {
    pub oauth_client_id: String,
    pub oauth_client_secret: String,
    pub webhook_secret: String,
    #[serde(default)]
    pub app_id: Option<i64>,
    #[serde(default)]
    pub private_key_path: Option<String>,
}

/// GitLab-side configuration. `bot_token` is the optional `GITLAB_BOT_TOKEN`
/// from §4.I step 16; prefixed `glpat-` tokens are sent via `PRIVATE-TOKEN`
/// instead of `Authorization: Bearer` (handled in `reviewbot-forge`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitlabConfig {
    pub oauth_client_id: String,
    pub oauth_client_secret: String,
    #[serde(default)]
    pub bot_token: Option<String>,
    #[serde(default)]
    pub bot_user_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    #[serde(default = "default_sandbox_image")]
    pub image: String,
    #[serde(default = "default_docker_bin")]
    pub docker_bin: String,
    #[serde(default = "default_agent_bin")]
    pub agent_bin: String,
    #[serde(default = "default_skills_root")]
    pub skills_root: String,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_analyze_timeout_secs")]
    pub analyze_timeout_secs: u64,
    #[serde(default = "default_review_timeout_secs")]
    pub review_timeout_secs: u64,
}

fn default_sandbox_image() -> String {
    "reviewbot-sandbox:latest".to_string()
}
fn default_docker_bin() -> String {
    "docker".to_string()
}
fn default_agent_bin() -> String {
    "agent".to_string()
}
fn default_skills_root() -> String {
    "./skills".to_string()
}
fn default_poll_interval_ms() -> u64 {
    5000
}
fn default_analyze_timeout_secs() -> u64 {
    15 * 60
}
fn default_review_timeout_secs() -> u64 {
    5 * 60
}

impl SandboxConfig {
    pub fn to_pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            sandbox_image: self.image.clone(),
            docker_bin: self.docker_bin.clone(),
            agent_bin: self.agent_bin.clone(),
            skills_root: Path::new(&self.skills_root).to_path_buf(),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            analyze_timeout: Duration::from_secs(self.analyze_timeout_secs),
            review_timeout: Duration::from_secs(self.review_timeout_secs),
        }
    }
}

impl GithubConfig {
    pub fn oauth_config(&self) -> OAuthClientConfig {
        OAuthClientConfig {
            client_id: self.oauth_client_id.clone(),
            client_secret: self.oauth_client_secret.clone(),
        }
    }
}

impl GitlabConfig {
    pub fn oauth_config(&self) -> OAuthClientConfig {
        OAuthClientConfig {
            client_id: self.oauth_client_id.clone(),
            client_secret: self.oauth_client_secret.clone(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file and environment variables.
    ///
    /// Sources, later overriding earlier:
    /// 1. Default values (sandbox/server/database knobs only — credentials
    ///    have no sane default and are required).
    /// 2. `config.toml` in the working directory, if present.
    /// 3. Environment variables prefixed `REVIEWBOT__`, double-underscore
    ///    nested (e.g. `REVIEWBOT__GITHUB__WEBHOOK_SECRET=...`).
    pub fn load() -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("database.url", "sqlite://reviewbot.db")?
            .set_default("database.max_connections", 10)?
            .set_default("sandbox.image", default_sandbox_image())?
            .set_default("sandbox.docker_bin", default_docker_bin())?
            .set_default("sandbox.agent_bin", default_agent_bin())?
            .set_default("sandbox.skills_root", default_skills_root())?
            .set_default("sandbox.poll_interval_ms", default_poll_interval_ms())?
            .set_default("sandbox.analyze_timeout_secs", default_analyze_timeout_secs())?
            .set_default("sandbox.review_timeout_secs", default_review_timeout_secs())?;

        let builder = if Path::new("config.toml").exists() {
            builder.add_source(File::with_name("config"))
        } else {
            builder
        };

        let builder = builder.add_source(
            Environment::with_prefix("REVIEWBOT")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}
