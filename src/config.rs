use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::batch::ExecutionMode;
use crate::error::Result;

/// Connection settings for the fal.ai API.
#[derive(Debug, Clone)]
pub struct FalConfig {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub upload_url: Option<String>,
    pub run_timeout_secs: Option<u64>,
    pub fetch_timeout_secs: Option<u64>,
}

impl Default for FalConfig {
    fn default() -> Self {
        FalConfig {
            api_key: None,
            base_url: None,
            upload_url: None,
            run_timeout_secs: None,
            fetch_timeout_secs: None,
        }
    }
}

impl FalConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_env() -> Self {
        let api_key = env::var("FAL_KEY").ok();
        let base_url = env::var("FAL_BASE_URL").ok();
        let upload_url = env::var("FAL_UPLOAD_URL").ok();

        FalConfig {
            api_key,
            base_url,
            upload_url,
            run_timeout_secs: None,
            fetch_timeout_secs: None,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_timeouts(mut self, run_secs: u64, fetch_secs: u64) -> Self {
        self.run_timeout_secs = Some(run_secs);
        self.fetch_timeout_secs = Some(fetch_secs);
        self
    }
}

/// Settings for one batch run that are not per-prompt: where images land
/// and how the batch executes. Passed explicitly to the runner; nothing is
/// read from ambient process state at run time.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub output_dir: Option<PathBuf>,
    pub mode: Option<ExecutionMode>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        BatchConfig {
            output_dir: None,
            mode: None,
        }
    }
}

impl BatchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_env() -> Self {
        let output_dir = env::var("FALBATCH_OUTPUT_DIR").ok().map(PathBuf::from);
        let mode = env::var("FALBATCH_MODE")
            .ok()
            .and_then(|val| match val.as_str() {
                "sequential" => Some(ExecutionMode::Sequential),
                "concurrent" => Some(ExecutionMode::Concurrent),
                _ => None,
            });

        BatchConfig { output_dir, mode }
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn output_dir(&self) -> PathBuf {
        self.output_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("images"))
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode.unwrap_or(ExecutionMode::Concurrent)
    }
}

/// Single-scalar credential file. The whole file is the key; saving
/// overwrites it wholesale.
#[derive(Debug, Clone)]
pub struct KeyStore {
    path: PathBuf,
}

impl KeyStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        KeyStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Option<String>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let key = fs::read_to_string(&self.path)?.trim().to_string();
        if key.is_empty() {
            Ok(None)
        } else {
            Ok(Some(key))
        }
    }

    pub fn save(&self, key: &str) -> Result<()> {
        fs::write(&self.path, key.trim())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyStore::new(dir.path().join("config.txt"));

        assert_eq!(store.load().unwrap(), None);

        store.save("  fal-key-123  \n").unwrap();
        assert_eq!(store.load().unwrap(), Some("fal-key-123".to_string()));

        store.save("fal-key-456").unwrap();
        assert_eq!(store.load().unwrap(), Some("fal-key-456".to_string()));
    }

    #[test]
    fn batch_config_defaults() {
        let config = BatchConfig::new();
        assert_eq!(config.output_dir(), PathBuf::from("images"));
        assert_eq!(config.mode(), ExecutionMode::Concurrent);
    }

    #[test]
    fn fal_config_builder() {
        let config = FalConfig::new()
            .with_api_key("k")
            .with_base_url("http://localhost:9000")
            .with_timeouts(60, 10);
        assert_eq!(config.api_key.as_deref(), Some("k"));
        assert_eq!(config.base_url.as_deref(), Some("http://localhost:9000"));
        assert_eq!(config.run_timeout_secs, Some(60));
    }
}
