//! Static YAML configuration loading and config/store merge.

use crate::proxy::entry::ProxyEntry;
use crate::store::ProxyRecord;
use crate::utils::error::{ProxyError, ProxyResult};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use url::Url;

/// On-disk configuration document.
///
/// ```yaml
/// health_check_url: https://example.com/
/// timeout_seconds: 5
/// proxies:
///   - http://127.0.0.1:8080
///   - http://127.0.0.1:8081
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub health_check_url: String,
    pub timeout_seconds: u64,
    pub proxies: Vec<String>,
}

impl AppConfig {
    pub fn load(path: impl AsRef<Path>) -> ProxyResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ProxyError::Config(format!("failed to read {}: {}", path.display(), e)))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> ProxyResult<Self> {
        let config: AppConfig = serde_yaml::from_str(content)
            .map_err(|e| ProxyError::Config(format!("failed to parse config: {}", e)))?;

        if config.timeout_seconds == 0 {
            return Err(ProxyError::Config(
                "timeout_seconds must be a positive integer".to_string(),
            ));
        }
        if Url::parse(&config.health_check_url).is_err() {
            return Err(ProxyError::Config(format!(
                "invalid health_check_url: {}",
                config.health_check_url
            )));
        }

        Ok(config)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Build the initial set of fresh entries from the config's `proxies`
    /// list. Entries whose URL does not parse are skipped with a warning.
    pub fn fresh_entries(&self) -> Vec<ProxyEntry> {
        let timeout = self.timeout();
        self.proxies
            .iter()
            .filter_map(|url| {
                if Url::parse(url).is_err() {
                    log::warn!("skipping unparseable proxy url: {}", url);
                    return None;
                }
                Some(ProxyEntry::new(
                    url.clone(),
                    self.health_check_url.clone(),
                    timeout,
                ))
            })
            .collect()
    }
}

/// Merge a config-derived entry list with stored records: stored entries
/// override config entries by URL (rehydrating counters/score), config-only
/// URLs are appended fresh. Never silently drops a configured URL absent
/// from the store.
pub fn merge_config_and_store(
    config: &AppConfig,
    stored: Vec<ProxyRecord>,
) -> Vec<ProxyEntry> {
    let timeout = config.timeout();
    let mut by_url: std::collections::HashMap<String, ProxyRecord> =
        stored.into_iter().map(|r| (r.url.clone(), r)).collect();

    let mut entries = Vec::with_capacity(config.proxies.len());
    for url in &config.proxies {
        if Url::parse(url).is_err() {
            log::warn!("skipping unparseable proxy url: {}", url);
            continue;
        }
        let entry = match by_url.remove(url) {
            Some(record) => ProxyEntry::from_record(record, config.health_check_url.clone(), timeout),
            None => ProxyEntry::new(url.clone(), config.health_check_url.clone(), timeout),
        };
        entries.push(entry);
    }

    // Stored entries whose URL no longer appears in the static config list
    // are intentionally dropped here: the config list is the source of
    // truth for which proxies are in scope.
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_config() {
        let yaml = r#"
health_check_url: https://example.com/
timeout_seconds: 5
proxies:
  - http://127.0.0.1:8080
  - http://127.0.0.1:8081
"#;
        let config = AppConfig::parse(yaml).unwrap();
        assert_eq!(config.timeout_seconds, 5);
        assert_eq!(config.proxies.len(), 2);
    }

    #[test]
    fn rejects_zero_timeout() {
        let yaml = r#"
health_check_url: https://example.com/
timeout_seconds: 0
proxies: []
"#;
        assert!(AppConfig::parse(yaml).is_err());
    }

    #[test]
    fn rejects_bad_health_check_url() {
        let yaml = r#"
health_check_url: "not a url"
timeout_seconds: 5
proxies: []
"#;
        assert!(AppConfig::parse(yaml).is_err());
    }

    #[test]
    fn fresh_entries_skips_unparseable_urls() {
        let yaml = r#"
health_check_url: https://example.com/
timeout_seconds: 5
proxies:
  - http://127.0.0.1:8080
  - "not a url"
"#;
        let config = AppConfig::parse(yaml).unwrap();
        let entries = config.fresh_entries();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn merge_overrides_by_url_and_appends_config_only() {
        let yaml = r#"
health_check_url: https://example.com/
timeout_seconds: 5
proxies:
  - http://127.0.0.1:8080
  - http://127.0.0.1:8081
"#;
        let config = AppConfig::parse(yaml).unwrap();
        let stored = vec![ProxyRecord {
            url: "http://127.0.0.1:8080".to_string(),
            score: 9.0,
            alive: false,
            last_test: chrono::Utc::now(),
            usage_count: 42,
            fail_count: 3,
            success_count: 10,
            latency_ms: 120,
        }];

        let entries = merge_config_and_store(&config, stored);
        assert_eq!(entries.len(), 2);
        let rehydrated = entries.iter().find(|e| e.url() == "http://127.0.0.1:8080").unwrap();
        assert_eq!(rehydrated.stats().usage_count, 42);
        let fresh = entries.iter().find(|e| e.url() == "http://127.0.0.1:8081").unwrap();
        assert_eq!(fresh.stats().usage_count, 0);
    }
}
