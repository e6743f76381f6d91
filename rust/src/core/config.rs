use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::transport::{HttpMessageTransport, MessageTransport, OfflineTransport, Page};

use super::AppCore;

pub(crate) const CONFIG_FILE_NAME: &str = "alertchat_config.json";

const DEFAULT_POLL_INTERVAL_MS: u64 = 2_000;
const MIN_POLL_INTERVAL_MS: u64 = 100;
const DEFAULT_PAGE_LIMIT: u32 = 100;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct AppConfig {
    pub(crate) api_base_url: Option<String>,
    pub(crate) auth_token: Option<String>,
    pub(crate) viewer_id: Option<String>,
    pub(crate) poll_interval_ms: Option<u64>,
    pub(crate) page_limit: Option<u32>,
    // Keeps tests deterministic and offline.
    pub(crate) disable_network: Option<bool>,
}

fn read_app_config(path: &Path) -> anyhow::Result<AppConfig> {
    let bytes = std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("parse {}", path.display()))
}

pub(crate) fn load_app_config(data_dir: &str) -> AppConfig {
    let path = Path::new(data_dir).join(CONFIG_FILE_NAME);
    if !path.exists() {
        return AppConfig::default();
    }
    read_app_config(&path).unwrap_or_else(|e| {
        tracing::warn!(error = %format!("{e:#}"), "ignoring unreadable config");
        AppConfig::default()
    })
}

pub(crate) fn default_app_config_json() -> String {
    let config = AppConfig {
        api_base_url: None,
        auth_token: None,
        viewer_id: None,
        poll_interval_ms: Some(DEFAULT_POLL_INTERVAL_MS),
        page_limit: Some(DEFAULT_PAGE_LIMIT),
        disable_network: Some(false),
    };
    serde_json::to_string_pretty(&config).unwrap_or_else(|_| "{}".to_string())
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl AppConfig {
    pub(crate) fn poll_interval(&self) -> Duration {
        let ms = self
            .poll_interval_ms
            .unwrap_or(DEFAULT_POLL_INTERVAL_MS)
            .max(MIN_POLL_INTERVAL_MS);
        Duration::from_millis(ms)
    }

    pub(crate) fn page(&self) -> Page {
        Page::latest(self.page_limit.filter(|l| *l > 0).unwrap_or(DEFAULT_PAGE_LIMIT))
    }

    pub(crate) fn api_base_url(&self) -> Option<String> {
        env_nonempty("ALERTCHAT_API_URL").or_else(|| {
            self.api_base_url
                .as_ref()
                .map(|u| u.trim().to_string())
                .filter(|u| !u.is_empty())
        })
    }

    pub(crate) fn auth_token(&self) -> Option<String> {
        env_nonempty("ALERTCHAT_AUTH_TOKEN").or_else(|| self.auth_token.clone())
    }

    pub(crate) fn network_enabled(&self) -> bool {
        if let Some(disable) = self.disable_network {
            return !disable;
        }
        std::env::var("ALERTCHAT_DISABLE_NETWORK").ok().as_deref() != Some("1")
    }

    /// Transport used when nothing is injected: HTTP when configured, offline otherwise.
    pub(crate) fn build_transport(&self) -> Arc<dyn MessageTransport> {
        if !self.network_enabled() {
            tracing::info!("network disabled; using offline transport");
            return Arc::new(OfflineTransport);
        }
        let Some(base_url) = self.api_base_url() else {
            tracing::warn!("no api_base_url configured; using offline transport");
            return Arc::new(OfflineTransport);
        };
        match HttpMessageTransport::new(&base_url, self.auth_token()) {
            Ok(t) => Arc::new(t),
            Err(e) => {
                tracing::error!(%e, "failed to build http transport");
                Arc::new(OfflineTransport)
            }
        }
    }
}

impl AppCore {
    pub(super) fn network_enabled(&self) -> bool {
        self.config.network_enabled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_for_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_app_config(dir.path().to_str().unwrap());
        assert_eq!(config.poll_interval(), Duration::from_secs(2));
        assert_eq!(config.page(), Page { limit: 100, skip: 0 });
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            r#"{ "poll_interval_ms": 250, "viewer_id": "u1", "disable_network": true }"#,
        )
        .unwrap();
        let config = load_app_config(dir.path().to_str().unwrap());
        assert_eq!(config.poll_interval(), Duration::from_millis(250));
        assert_eq!(config.viewer_id.as_deref(), Some("u1"));
        assert!(!config.network_enabled());
        assert_eq!(config.page().limit, 100);
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), b"{ not json").unwrap();
        let config = load_app_config(dir.path().to_str().unwrap());
        assert!(config.api_base_url.is_none());
    }

    #[test]
    fn poll_interval_has_a_floor() {
        let config = AppConfig {
            poll_interval_ms: Some(1),
            ..AppConfig::default()
        };
        assert_eq!(config.poll_interval(), Duration::from_millis(MIN_POLL_INTERVAL_MS));
    }

    #[test]
    fn default_json_round_trips_through_loader() {
        let parsed: AppConfig = serde_json::from_str(&default_app_config_json()).unwrap();
        assert_eq!(parsed.poll_interval_ms, Some(DEFAULT_POLL_INTERVAL_MS));
        assert_eq!(parsed.disable_network, Some(false));
    }
}
