use crate::{error::Result, models::RequestPayload};
use async_trait::async_trait;
use serde_json::Value;

/// The remote side of a batch run: the generation endpoint, the storage
/// upload used for edit-model reference images, and the final image
/// download. Kept behind a trait so batches can run against a fake backend
/// in tests.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Submit one generation call and return the raw, loosely-structured
    /// response. Every call is bounded by the client timeout; a single
    /// failed attempt is terminal.
    async fn run(&self, model: &str, payload: &RequestPayload) -> Result<Value>;

    /// Upload bytes to externally-addressable storage and return their URL.
    async fn upload(&self, bytes: &[u8], content_type: &str) -> Result<String>;

    /// Download the generated image bytes.
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}
