use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use super::{EncodedModule, ModuleConfig, ModuleKind};
use crate::backend::{join_path, read_json};
use crate::errors::SdkError;

const LIST_PATH: &str = "modules";
const BUILD_PATH: &str = "api/v1/modules/build";
const BUILD_BATCH_PATH: &str = "api/v1/modules/build-batch";
const VALIDATE_PATH: &str = "api/v1/modules/validate";

/// A module the backend knows how to install.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleInfo {
    pub module_type: ModuleKind,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub supported_chain_ids: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleValidation {
    pub valid: bool,
    #[serde(default)]
    pub errors: Vec<String>,
}

#[derive(Debug, Serialize)]
struct BuildRequest<'a> {
    config: &'a ModuleConfig,
}

#[derive(Debug, Serialize)]
struct BuildBatchRequest<'a> {
    configs: &'a [ModuleConfig],
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BuildResponse {
    encoded_data: String,
}

#[derive(Debug, Deserialize)]
struct BuildBatchResponse {
    modules: Vec<BuildResponse>,
}

/// Thin client for the module metadata and encoding endpoints.
///
/// Building never depends on the backend: when the server cannot encode a module, the local
/// encoding of [`ModuleConfig::encode`] is used instead.
#[derive(Debug, Clone)]
pub struct ModulesClient {
    client: Client,
    base_url: Url,
}

impl ModulesClient {
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self, SdkError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| SdkError::Configuration(format!("failed to build HTTP client: {err}")))?;
        Ok(Self { client, base_url })
    }

    pub async fn list_modules(&self) -> Result<Vec<ModuleInfo>, SdkError> {
        let response = self
            .client
            .get(join_path(&self.base_url, LIST_PATH)?)
            .send()
            .await
            .map_err(|err| SdkError::dependency("listing modules", err))?;
        read_json(LIST_PATH, response).await
    }

    pub async fn build(&self, config: &ModuleConfig) -> Result<EncodedModule, SdkError> {
        let local = config.encode()?;
        match self.build_remote(config).await {
            Ok(encoded_data) => Ok(EncodedModule {
                encoded_data,
                ..local
            }),
            Err(err) => {
                tracing::warn!(%err, module = %config.kind, "remote module build failed, using local encoding");
                Ok(local)
            }
        }
    }

    pub async fn build_batch(&self, configs: &[ModuleConfig]) -> Result<Vec<EncodedModule>, SdkError> {
        let local = configs
            .iter()
            .map(ModuleConfig::encode)
            .collect::<Result<Vec<_>, _>>()?;
        match self.build_batch_remote(configs).await {
            Ok(remote) if remote.len() == local.len() => Ok(local
                .into_iter()
                .zip(remote)
                .map(|(local, encoded_data)| EncodedModule {
                    encoded_data,
                    ..local
                })
                .collect()),
            Ok(remote) => {
                tracing::warn!(
                    expected = local.len(),
                    got = remote.len(),
                    "remote batch build returned the wrong number of modules, using local encoding"
                );
                Ok(local)
            }
            Err(err) => {
                tracing::warn!(%err, "remote batch build failed, using local encoding");
                Ok(local)
            }
        }
    }

    pub async fn validate(&self, config: &ModuleConfig) -> Result<ModuleValidation, SdkError> {
        let response = self
            .client
            .post(join_path(&self.base_url, VALIDATE_PATH)?)
            .json(&BuildRequest { config })
            .send()
            .await
            .map_err(|err| SdkError::dependency("validating module", err))?;
        read_json(VALIDATE_PATH, response).await
    }

    async fn build_remote(&self, config: &ModuleConfig) -> Result<String, SdkError> {
        let response = self
            .client
            .post(join_path(&self.base_url, BUILD_PATH)?)
            .json(&BuildRequest { config })
            .send()
            .await
            .map_err(|err| SdkError::dependency("building module", err))?;
        let built: BuildResponse = read_json(BUILD_PATH, response).await?;
        Ok(built.encoded_data)
    }

    async fn build_batch_remote(&self, configs: &[ModuleConfig]) -> Result<Vec<String>, SdkError> {
        let response = self
            .client
            .post(join_path(&self.base_url, BUILD_BATCH_PATH)?)
            .json(&BuildBatchRequest { configs })
            .send()
            .await
            .map_err(|err| SdkError::dependency("building modules", err))?;
        let built: BuildBatchResponse = read_json(BUILD_BATCH_PATH, response).await?;
        Ok(built.modules.into_iter().map(|m| m.encoded_data).collect())
    }
}
