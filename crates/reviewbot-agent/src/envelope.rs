use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;
use serde_json::Value;

use crate::error::{AgentError, AgentResult};
use crate::sanitize::sanitize;

/// One line of the agent's NDJSON stdout stream. Only `type: "text"` events
/// carry content we care about; every other event type (tool calls, step
/// markers, etc.) is ignored. Lines that don't even parse as JSON are
/// skipped rather than failing the whole extraction, since a stray log
/// line on stdout shouldn't sink an otherwise-good run.
#[derive(Debug, Deserialize)]
struct NdjsonEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

/// Concatenate the `text` field of every `type: "text"` line in an NDJSON
/// stream, in order. This is the raw agent "final answer" before any
/// fence-stripping or JSON parsing is attempted.
pub fn extract_text(stdout: &str) -> String {
    let mut out = String::new();
    for line in stdout.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Ok(event) = serde_json::from_str::<NdjsonEvent>(line) else {
            continue;
        };
        if event.kind == "text" {
            out.push_str(&event.text);
        }
    }
    out
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.strip_prefix('\n').unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Parse an agent's NDJSON stdout into the final structured review
/// response. Tries a plain parse first; on failure, strips an optional
/// markdown code fence and retries; on a further failure, runs the
/// scanner-based sanitizer and retries once more. Only gives up after
/// all three attempts fail.
pub fn parse_agent_response(stdout: &str) -> AgentResult<Value> {
    let text = extract_text(stdout);
    let candidate = strip_code_fence(&text);

    if let Ok(value) = serde_json::from_str::<Value>(candidate) {
        return Ok(value);
    }

    let sanitized = sanitize(candidate);
    serde_json::from_str::<Value>(&sanitized)
        .map_err(|e| AgentError::Malformed(format!("response was not valid JSON even after sanitizing: {e}")))
}

/// Resolve `~/.local/share/opencode/auth.json`, the path the agent CLI
/// reads its provider credentials from.
fn auth_json_path() -> AgentResult<PathBuf> {
    let home = dirs::home_dir().ok_or(AgentError::NoHomeDir)?;
    Ok(home.join(".local").join("share").join("opencode").join("auth.json"))
}

/// Write `{"type": "api", "key": ...}` entries for each provider API key
/// into the agent CLI's `auth.json`, creating parent directories as
/// needed. Keys are passed in rather than read from a config type here,
/// so callers decide which providers to populate.
pub async fn write_auth_json(keys: &BTreeMap<String, String>) -> AgentResult<()> {
    let path = auth_json_path()?;
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut entries = serde_json::Map::new();
    for (provider, key) in keys {
        let mut entry = serde_json::Map::new();
        entry.insert("type".to_string(), Value::String("api".to_string()));
        entry.insert("key".to_string(), Value::String(key.clone()));
        entries.insert(provider.clone(), Value::Object(entry));
    }

    let contents = serde_json::to_string_pretty(&Value::Object(entries))
        .map_err(|e| AgentError::Malformed(format!("failed to serialize auth.json: {e}")))?;
    tokio::fs::write(&path, contents).await?;
    Ok(())
}
