use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use reviewbot_core::{EventType, Provider, WebhookEvent};

type HmacSha256 = Hmac<Sha256>;

/// A PR/MR event parsed from a forge payload but not yet bound to any
/// particular connected-repo subscriber. The webhook handler looks up every
/// `ConnectedRepo` matching `repo_name` and turns each match into its own
/// `WebhookEvent` by supplying that row's `user_id`/`slug`.
#[derive(Debug, Clone)]
pub struct ParsedPrEvent {
    pub provider: Provider,
    pub event_type: EventType,
    pub repo_name: String,
    pub pr_number: i64,
    pub pr_title: String,
    pub pr_url: String,
    pub pr_author: String,
    pub base_branch: String,
    pub head_branch: String,
    pub raw_action: String,
}

impl ParsedPrEvent {
    pub fn into_webhook_event(self, user_id: &str, repo_slug: &str) -> WebhookEvent {
        WebhookEvent {
            provider: self.provider,
            event_type: self.event_type,
            repo_slug: repo_slug.to_string(),
            repo_name: self.repo_name,
            pr_number: self.pr_number,
            pr_title: self.pr_title,
            pr_url: self.pr_url,
            pr_author: self.pr_author,
            base_branch: self.base_branch,
            head_branch: self.head_branch,
            raw_action: self.raw_action,
            user_id: user_id.to_string(),
            received_at: chrono::Utc::now(),
        }
    }
}

/// Verify a GitHub `X-Hub-Signature-256: sha256=<hex>` header against the
/// raw request body using constant-time comparison.
pub fn verify_github_signature(body: &[u8], signature_header: &str, secret: &str) -> bool {
    let Some(signature_hex) = signature_header.strip_prefix("sha256=") else {
        return false;
    };
    let Ok(signature) = hex::decode(signature_hex) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    let expected = mac.finalize().into_bytes();
    expected.ct_eq(&signature).into()
}

/// Verify a GitLab `X-Gitlab-Token` header equals the configured per-repo
/// secret, constant-time. Per the redesign, this no longer uses `==`
/// (which short-circuits on the first mismatched byte and leaks length/
/// prefix information via timing) — it pads to a fixed width before the
/// constant-time comparison so length itself isn't observable either.
pub fn verify_gitlab_token(header_value: &str, secret: &str) -> bool {
    const WIDTH: usize = 256;
    if header_value.len() > WIDTH || secret.len() > WIDTH {
        return false;
    }
    let mut a = [0u8; WIDTH];
    let mut b = [0u8; WIDTH];
    a[..header_value.len()].copy_from_slice(header_value.as_bytes());
    b[..secret.len()].copy_from_slice(secret.as_bytes());
    let len_eq = (header_value.len() as u8).ct_eq(&(secret.len() as u8));
    let bytes_eq = a.ct_eq(&b);
    (len_eq & bytes_eq).into()
}

/// Parse a GitHub `pull_request` webhook body into a provider-neutral event,
/// not yet bound to any subscriber. Returns `None` for unknown actions
/// (caller should 200 `{skipped: true}`).
pub fn parse_github_event(body: &Value) -> Option<ParsedPrEvent> {
    let action = body.get("action")?.as_str()?;
    let event_type = EventType::from_github_action(action)?;

    let pr = body.get("pull_request")?;
    let repo = body.get("repository")?;

    Some(ParsedPrEvent {
        provider: Provider::Github,
        event_type,
        repo_name: repo.get("full_name")?.as_str()?.to_string(),
        pr_number: pr.get("number")?.as_i64()?,
        pr_title: pr.get("title")?.as_str()?.to_string(),
        pr_url: pr.get("html_url")?.as_str()?.to_string(),
        pr_author: pr.get("user")?.get("login")?.as_str()?.to_string(),
        base_branch: pr.get("base")?.get("ref")?.as_str()?.to_string(),
        head_branch: pr.get("head")?.get("ref")?.as_str()?.to_string(),
        raw_action: action.to_string(),
    })
}

/// Parse a GitLab `Merge Request Hook` webhook body into a provider-neutral event.
pub fn parse_gitlab_event(body: &Value) -> Option<ParsedPrEvent> {
    let attrs = body.get("object_attributes")?;
    let action = attrs.get("action")?.as_str()?;
    let event_type = EventType::from_gitlab_action(action)?;

    let project = body.get("project")?;

    Some(ParsedPrEvent {
        provider: Provider::Gitlab,
        event_type,
        repo_name: project.get("path_with_namespace")?.as_str()?.to_string(),
        pr_number: attrs.get("iid")?.as_i64()?,
        pr_title: attrs.get("title")?.as_str()?.to_string(),
        pr_url: attrs.get("url")?.as_str()?.to_string(),
        pr_author: body
            .get("user")
            .and_then(|u| u.get("username"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string(),
        base_branch: attrs.get("target_branch")?.as_str()?.to_string(),
        head_branch: attrs.get("source_branch")?.as_str()?.to_string(),
        raw_action: action.to_string(),
    })
}

/// Extract the `repository.full_name` (GitHub) / `project.path_with_namespace`
/// (GitLab) a raw webhook body names, without requiring the full event to
/// parse. GitLab's token-verification step needs this before it can pick
/// the right row's `webhook_secret` to check against.
pub fn extract_repo_full_name(body: &Value, provider: Provider) -> Option<String> {
    match provider {
        Provider::Github => body.get("repository")?.get("full_name")?.as_str().map(str::to_string),
        Provider::Gitlab => body
            .get("project")?
            .get("path_with_namespace")?
            .as_str()
            .map(str::to_string),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn compute_signature(body: &[u8], secret: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn valid_github_signature_verifies() {
        let body = b"test body";
        let sig = compute_signature(body, "s3cret");
        assert!(verify_github_signature(body, &sig, "s3cret"));
    }

    #[test]
    fn tampered_body_fails_github_signature() {
        let sig = compute_signature(b"original", "s3cret");
        assert!(!verify_github_signature(b"tampered", &sig, "s3cret"));
    }

    #[test]
    fn missing_prefix_fails_github_signature() {
        assert!(!verify_github_signature(b"x", "deadbeef", "s3cret"));
    }

    #[test]
    fn gitlab_token_exact_match() {
        assert!(verify_gitlab_token("my-secret", "my-secret"));
    }

    #[test]
    fn gitlab_token_mismatch_rejected() {
        assert!(!verify_gitlab_token("wrong", "my-secret"));
        assert!(!verify_gitlab_token("my-secre", "my-secret"));
        assert!(!verify_gitlab_token("my-secretX", "my-secret"));
    }

    #[test]
    fn parse_github_event_opened_maps_to_pr_opened() {
        let body = json!({
            "action": "opened",
            "pull_request": {
                "number": 42,
                "title": "Add feature",
                "html_url": "https://github.com/acme/widgets/pull/42",
                "user": {"login": "alice"},
                "base": {"ref": "main"},
                "head": {"ref": "feature"},
            },
            "repository": {"full_name": "acme/widgets"},
        });

        let event = parse_github_event(&body).expect("should parse");
        assert_eq!(event.event_type, EventType::PrOpened);
        assert_eq!(event.pr_number, 42);
        assert_eq!(event.repo_name, "acme/widgets");
    }

    #[test]
    fn parse_github_event_unknown_action_skips() {
        let body = json!({"action": "labeled", "pull_request": {}, "repository": {}});
        assert!(parse_github_event(&body).is_none());
    }

    #[test]
    fn parse_gitlab_event_open_maps_to_pr_opened() {
        let body = json!({
            "object_attributes": {
                "action": "open",
                "iid": 7,
                "title": "Fix bug",
                "url": "https://gitlab.com/acme/widgets/-/merge_requests/7",
                "target_branch": "main",
                "source_branch": "fix",
            },
            "project": {"path_with_namespace": "acme/widgets"},
            "user": {"username": "bob"},
        });

        let event = parse_gitlab_event(&body).expect("should parse");
        assert_eq!(event.event_type, EventType::PrOpened);
        assert_eq!(event.pr_author, "bob");
    }

    #[test]
    fn extract_repo_full_name_reads_provider_specific_field() {
        let gh_body = json!({"repository": {"full_name": "acme/widgets"}});
        assert_eq!(
            extract_repo_full_name(&gh_body, Provider::Github).as_deref(),
            Some("acme/widgets")
        );

        let gl_body = json!({"project": {"path_with_namespace": "acme/widgets"}});
        assert_eq!(
            extract_repo_full_name(&gl_body, Provider::Gitlab).as_deref(),
            Some("acme/widgets")
        );
    }

    #[test]
    fn into_webhook_event_binds_subscriber_fields() {
        let body = json!({
            "action": "opened",
            "pull_request": {
                "number": 1, "title": "t", "html_url": "u",
                "user": {"login": "a"}, "base": {"ref": "main"}, "head": {"ref": "f"},
            },
            "repository": {"full_name": "acme/widgets"},
        });
        let parsed = parse_github_event(&body).unwrap();
        let event = parsed.into_webhook_event("user-1", "acme-widgets");
        assert_eq!(event.user_id, "user-1");
        assert_eq!(event.repo_slug, "acme-widgets");
    }
}
