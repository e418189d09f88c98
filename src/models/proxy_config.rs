//! Typed proxy options and their rendering into the YAML document the proxy
//! binary reads via `--config`.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::Result;

/// Directory name under the user's home used when no `auth-dir` is given.
pub const DEFAULT_AUTH_DIR_NAME: &str = ".cli-proxy-api";

/// Remote management API settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct RemoteManagement {
    /// Accept management requests from non-loopback clients.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_remote: Option<bool>,
    /// Management secret; empty disables the management API.
    #[serde(default)]
    pub secret_key: String,
    /// Hide the bundled control panel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disable_control_panel: Option<bool>,
}

/// Behavior when an upstream quota is exhausted.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct QuotaExceeded {
    /// Rotate to another project.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub switch_project: Option<bool>,
    /// Fall back to a preview model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub switch_preview_model: Option<bool>,
}

/// Model name with an optional client-facing alias.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct ModelAlias {
    /// Upstream model name.
    pub name: String,
    /// Name exposed to clients.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

/// Upstream API key with optional routing overrides.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct ApiKeyEntry {
    /// Upstream key.
    pub api_key: String,
    /// Alternate upstream base URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Extra headers sent upstream.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, String>>,
    /// Outbound proxy for this key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_url: Option<String>,
    /// Models served through this key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub models: Option<Vec<ModelAlias>>,
}

/// Key entry of an OpenAI-compatible provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct CompatibilityKey {
    /// Upstream key.
    pub api_key: String,
    /// Outbound proxy for this key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_url: Option<String>,
}

/// OpenAI-compatible upstream provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct OpenAiCompatibility {
    /// Provider name.
    pub name: String,
    /// Provider base URL.
    pub base_url: String,
    /// Extra headers sent upstream.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, String>>,
    /// Keys with per-key proxy settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_entries: Option<Vec<CompatibilityKey>>,
    /// Plain keys.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_keys: Option<Vec<String>>,
    /// Models served by the provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub models: Option<Vec<ModelAlias>>,
}

/// Model matcher inside a payload rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct PayloadModel {
    /// Model name or pattern.
    pub name: String,
    /// Restrict the rule to one protocol.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
}

/// Request payload rewrite rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct PayloadRule {
    /// Models the rule applies to.
    pub models: Vec<PayloadModel>,
    /// Parameters to set.
    pub params: serde_json::Map<String, serde_json::Value>,
}

/// Payload defaults and overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct PayloadConfig {
    /// Applied only when the request leaves the parameter unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Vec<PayloadRule>>,
    /// Always applied.
    #[serde(default, rename = "override", skip_serializing_if = "Option::is_none")]
    pub override_rules: Option<Vec<PayloadRule>>,
}

/// Proxy options. Only `port` and `auth-dir` are touched by the supervisor;
/// everything else passes through to the rendered document.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct ProxyConfig {
    /// Listen port; overwritten with the allocated port at render time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Directory holding provider credentials.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_dir: Option<PathBuf>,
    /// Management API settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_management: Option<RemoteManagement>,
    /// Client keys accepted by the proxy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_keys: Option<Vec<String>>,
    /// Verbose proxy logging.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug: Option<bool>,
    /// Write proxy logs to files instead of stdout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging_to_file: Option<bool>,
    /// Collect usage statistics.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_statistics_enabled: Option<bool>,
    /// Outbound proxy URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_url: Option<String>,
    /// Upstream retry count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_retry: Option<u32>,
    /// Quota exhaustion behavior.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quota_exceeded: Option<QuotaExceeded>,
    /// Require auth on websocket endpoints.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ws_auth: Option<bool>,
    /// Log full requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_log: Option<bool>,
    /// Gemini upstream keys.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gemini_api_key: Option<Vec<ApiKeyEntry>>,
    /// Generative Language API keys.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generative_language_api_key: Option<Vec<String>>,
    /// Codex upstream keys.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codex_api_key: Option<Vec<ApiKeyEntry>>,
    /// Claude upstream keys.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claude_api_key: Option<Vec<ApiKeyEntry>>,
    /// OpenAI-compatible providers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openai_compatibility: Option<Vec<OpenAiCompatibility>>,
    /// Payload rewrite rules.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<PayloadConfig>,
    /// Opaque auth section forwarded verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<serde_json::Value>,
    /// Top-level keys merged last, overriding anything above.
    #[serde(default, skip_serializing)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl ProxyConfig {
    /// First client key, used to authenticate readiness probes.
    #[must_use]
    pub fn first_api_key(&self) -> Option<&str> {
        self.api_keys
            .as_ref()
            .and_then(|keys| keys.first())
            .map(String::as_str)
    }
}

/// `$HOME/.cli-proxy-api`, or a relative `.cli-proxy-api` without a home.
#[must_use]
pub fn default_auth_dir() -> PathBuf {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map_or_else(
            || PathBuf::from(DEFAULT_AUTH_DIR_NAME),
            |home| PathBuf::from(home).join(DEFAULT_AUTH_DIR_NAME),
        )
}

/// Render `config` as the YAML document passed to the proxy, forcing `port`.
///
/// # Errors
///
/// Returns `AppError::Config` if the options cannot be represented as YAML
/// (for example a non UTF-8 `auth-dir`).
pub fn render_config(config: &ProxyConfig, port: u16) -> Result<String> {
    let mut doc = config.clone();
    doc.port = Some(port);
    if doc.auth_dir.is_none() {
        doc.auth_dir = Some(default_auth_dir());
    }

    let mut value = serde_yaml::to_value(&doc)?;
    if let serde_yaml::Value::Mapping(map) = &mut value {
        for (key, extra) in &config.extra {
            map.insert(
                serde_yaml::Value::String(key.clone()),
                serde_yaml::to_value(extra)?,
            );
        }
    }

    Ok(serde_yaml::to_string(&value)?)
}
