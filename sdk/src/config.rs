use anyhow::Context;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::authorization::DEFAULT_VALIDITY_WINDOW;
use crate::chain::JsonRpcChainClient;
use crate::errors::SdkError;
use crate::orchestration::PollingConfig;
use crate::retry::{RetryConfig, RetryPolicy};

pub const API_KEY_ENV: &str = "ORCHESTRATION_API_KEY";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SdkConfig {
    pub backend_url: Url,
    /// Module metadata service; the backend itself when absent.
    #[serde(default)]
    pub modules_url: Option<Url>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub rpc_urls: BTreeMap<u64, Url>,
    /// Block explorer base per chain, used for transaction links.
    #[serde(default)]
    pub explorer_urls: BTreeMap<u64, Url>,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default = "default_retry")]
    pub retry: RetryConfig,
    #[serde(default = "default_authorization_validity_secs")]
    pub authorization_validity_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_retry() -> RetryConfig {
    let policy = RetryPolicy::default();
    RetryConfig {
        max_retries: policy.max_retries,
        delay_ms: u64::try_from(policy.delay.as_millis()).unwrap_or(u64::MAX),
    }
}

fn default_authorization_validity_secs() -> u64 {
    DEFAULT_VALIDITY_WINDOW.as_secs()
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl SdkConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let file = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&file)?;
        Ok(config)
    }

    pub fn modules_url(&self) -> &Url {
        self.modules_url.as_ref().unwrap_or(&self.backend_url)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry.into()
    }

    pub fn authorization_validity(&self) -> Duration {
        Duration::from_secs(self.authorization_validity_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn api_key(&self) -> Result<&str, SdkError> {
        self.api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                SdkError::Configuration(format!(
                    "no API key configured; set `api_key` or {API_KEY_ENV}"
                ))
            })
    }

    pub fn chain_client(&self, chain_id: u64) -> Result<JsonRpcChainClient, SdkError> {
        let url = self
            .rpc_urls
            .get(&chain_id)
            .ok_or_else(|| SdkError::Configuration(format!("unsupported chain id {chain_id}")))?;
        JsonRpcChainClient::with_timeout(
            url.clone(),
            chain_id,
            self.retry_policy(),
            self.request_timeout(),
        )
    }

    /// [`Self::chain_client`] after checking that the endpoint serves `chain_id`.
    pub async fn connect_chain(&self, chain_id: u64) -> Result<JsonRpcChainClient, SdkError> {
        let client = self.chain_client(chain_id)?;
        client.verify_chain_id().await?;
        Ok(client)
    }

    /// Block explorer base for transaction links on `chain_id`.
    pub fn explorer(&self, chain_id: u64) -> Option<&Url> {
        self.explorer_urls.get(&chain_id)
    }

    fn apply_env_override(&mut self, api_key: Option<String>) {
        if let Some(api_key) = api_key.filter(|key| !key.is_empty()) {
            self.api_key = Some(api_key);
        }
    }
}

/// Reads the YAML file at `path` and applies the environment overrides.
pub fn load_config(path: &Path) -> anyhow::Result<SdkConfig> {
    let mut config = SdkConfig::from_file(path)
        .with_context(|| format!("Load SDK config from {}", path.display()))?;
    config.apply_env_override(std::env::var(API_KEY_ENV).ok());
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deposit::transaction_link;
    use crate::TransactionHash;
    use assert_matches::assert_matches;
    use httpmock::prelude::*;
    use serde_json::json;
    use std::io::Write;

    const FULL: &str = r#"
backend_url: https://api.example.com
modules_url: https://modules.example.com
api_key: file-key
rpc_urls:
  8453: https://base.example.com
  42161: https://arbitrum.example.com
explorer_urls:
  8453: https://basescan.org/
polling:
  interval_ms: 2000
  max_attempts: 30
retry:
  max_retries: 3
  delay_ms: 500
authorization_validity_secs: 600
"#;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_full_config() {
        let file = write_config(FULL);
        let config = SdkConfig::from_file(file.path()).unwrap();

        assert_eq!(config.modules_url().as_str(), "https://modules.example.com/");
        assert_eq!(config.api_key().unwrap(), "file-key");
        assert_eq!(config.rpc_urls.len(), 2);
        assert_eq!(config.polling.max_attempts, 30);
        assert_eq!(config.retry_policy().delay, Duration::from_millis(500));
        assert_eq!(config.authorization_validity(), Duration::from_secs(600));
        let hash = TransactionHash::from([0xab; 32]);
        assert_eq!(
            config.explorer(8453).map(|explorer| transaction_link(explorer, &hash)),
            Some(format!("https://basescan.org/tx/0x{}", "ab".repeat(32)))
        );
        assert_eq!(config.explorer(1), None);
    }

    #[tokio::test]
    async fn test_connect_chain_checks_the_served_chain() {
        // Given
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/");
                then.status(200)
                    .header("content-type", "application/json")
                    .json_body(json!({ "jsonrpc": "2.0", "id": 0, "result": "0xa4b1" }));
            })
            .await;
        let config = SdkConfig::from_file(
            write_config(&format!(
                "backend_url: https://api.example.com\nrpc_urls:\n  8453: {}\n",
                server.url("/")
            ))
            .path(),
        )
        .unwrap();

        // When
        let result = config.connect_chain(8453).await;

        // Then
        assert_matches!(result, Err(SdkError::Configuration(message)) if message.contains("42161"));
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let file = write_config("backend_url: https://api.example.com\n");
        let config = SdkConfig::from_file(file.path()).unwrap();

        assert_eq!(config.modules_url(), &config.backend_url);
        assert_eq!(config.authorization_validity(), DEFAULT_VALIDITY_WINDOW);
        assert_eq!(config.polling, PollingConfig::default());
        assert_eq!(config.retry_policy(), RetryPolicy::default());
        assert_matches!(config.api_key(), Err(SdkError::Configuration(_)));
        assert_matches!(config.chain_client(8453), Err(SdkError::Configuration(_)));
    }

    #[test]
    fn test_env_overrides_file_api_key() {
        let file = write_config(FULL);
        let mut config = SdkConfig::from_file(file.path()).unwrap();

        config.apply_env_override(Some(String::new()));
        assert_eq!(config.api_key().unwrap(), "file-key");

        config.apply_env_override(Some("env-key".to_string()));
        assert_eq!(config.api_key().unwrap(), "env-key");
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = load_config(Path::new("/nonexistent/orchestration.yaml")).unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/orchestration.yaml"));
    }
}
