pub mod traits;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use crate::{
    config::FalConfig,
    error::{FalbatchError, Result},
    models::RequestPayload,
};

pub use traits::GenerationBackend;

const DEFAULT_BASE_URL: &str = "https://fal.run";
const DEFAULT_UPLOAD_URL: &str = "https://rest.alpha.fal.ai/storage/upload/initiate";
const DEFAULT_RUN_TIMEOUT_SECS: u64 = 120;
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

#[derive(serde::Deserialize)]
struct InitiateUploadResponse {
    upload_url: String,
    file_url: String,
}

/// reqwest-backed client for the fal.ai HTTP API.
pub struct FalClient {
    run_client: Client,
    fetch_client: Client,
    api_key: String,
    base_url: String,
    upload_url: String,
}

impl FalClient {
    pub fn new(config: FalConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .ok_or_else(|| FalbatchError::Config("fal.ai API key is required".into()))?;

        let run_client = Client::builder()
            .timeout(Duration::from_secs(
                config.run_timeout_secs.unwrap_or(DEFAULT_RUN_TIMEOUT_SECS),
            ))
            .build()
            .map_err(|e| FalbatchError::Config(format!("Failed to build HTTP client: {}", e)))?;

        let fetch_client = Client::builder()
            .timeout(Duration::from_secs(
                config
                    .fetch_timeout_secs
                    .unwrap_or(DEFAULT_FETCH_TIMEOUT_SECS),
            ))
            .build()
            .map_err(|e| FalbatchError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            run_client,
            fetch_client,
            api_key,
            base_url: config
                .base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            upload_url: config
                .upload_url
                .unwrap_or_else(|| DEFAULT_UPLOAD_URL.to_string()),
        })
    }

    fn auth_header(&self) -> String {
        format!("Key {}", self.api_key)
    }
}

#[async_trait]
impl GenerationBackend for FalClient {
    async fn run(&self, model: &str, payload: &RequestPayload) -> Result<Value> {
        log::debug!("Submitting generation call to model: {}", model);

        let response = self
            .run_client
            .post(format!("{}/{}", self.base_url, model))
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .json(payload)
            .send()
            .await
            .map_err(|e| FalbatchError::RemoteCall(format!("Generation request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            // Billing and quota denials also land here with a 4xx body.
            let body = response.text().await.unwrap_or_default();
            return Err(FalbatchError::RemoteCall(format!(
                "Generation call returned HTTP {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| FalbatchError::RemoteCall(format!("Malformed response body: {}", e)))
    }

    async fn upload(&self, bytes: &[u8], content_type: &str) -> Result<String> {
        let initiate = self
            .run_client
            .post(&self.upload_url)
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .json(&serde_json::json!({ "content_type": content_type }))
            .send()
            .await
            .map_err(|e| FalbatchError::RemoteCall(format!("Upload initiation failed: {}", e)))?;

        if !initiate.status().is_success() {
            return Err(FalbatchError::RemoteCall(format!(
                "Upload initiation returned HTTP {}",
                initiate.status()
            )));
        }

        let target: InitiateUploadResponse = initiate
            .json()
            .await
            .map_err(|e| FalbatchError::RemoteCall(format!("Malformed upload grant: {}", e)))?;

        let put = self
            .run_client
            .put(&target.upload_url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(|e| FalbatchError::RemoteCall(format!("Upload failed: {}", e)))?;

        if !put.status().is_success() {
            return Err(FalbatchError::RemoteCall(format!(
                "Upload returned HTTP {}",
                put.status()
            )));
        }

        Ok(target.file_url)
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .fetch_client
            .get(url)
            .send()
            .await
            .map_err(|e| FalbatchError::Fetch(format!("Download request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(FalbatchError::Fetch(format!(
                "Download returned HTTP {}",
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FalbatchError::Fetch(format!("Download interrupted: {}", e)))?;

        Ok(bytes.to_vec())
    }
}
