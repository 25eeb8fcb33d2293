use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::{
    builder::build_request,
    config::BatchConfig,
    error::Result,
    fal::GenerationBackend,
    models::{BatchState, GenerationResult, GenerationSettings, Outcome, ReferenceImage},
    resolver::resolve_image_url,
};

/// Receives one notification per prompt as soon as its outcome is known,
/// then a single completion notification. Under concurrent execution the
/// notifications arrive in completion order, always from the task that
/// called `run_batch` (never from a worker).
pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, index: usize, outcome: &Outcome);
    fn on_batch_complete(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// One prompt is fully processed before the next starts.
    Sequential,
    /// All prompts are issued at once; completions arrive in any order.
    Concurrent,
}

/// Drives one batch of prompts through build → generate → resolve →
/// download → persist. Individual failures never abort the batch and no
/// attempt is retried.
pub struct BatchRunner {
    backend: Arc<dyn GenerationBackend>,
    settings: GenerationSettings,
    output_dir: PathBuf,
    mode: ExecutionMode,
}

impl BatchRunner {
    pub fn new(
        backend: Arc<dyn GenerationBackend>,
        settings: GenerationSettings,
        config: &BatchConfig,
    ) -> Self {
        Self {
            backend,
            settings,
            output_dir: config.output_dir(),
            mode: config.mode(),
        }
    }

    /// Runs every prompt to completion. The returned state holds one result
    /// per prompt; the observer has been notified exactly `prompts.len()`
    /// times plus one completion.
    pub async fn run_batch(
        &self,
        prompts: Vec<String>,
        observer: &dyn ProgressObserver,
    ) -> Result<BatchState> {
        let batch_id = Uuid::new_v4();
        let total = prompts.len();
        log::info!(
            "🚀 Starting batch {} ({} prompts, {:?} mode)",
            batch_id,
            total,
            self.mode
        );

        std::fs::create_dir_all(&self.output_dir)?;

        let state = match self.mode {
            ExecutionMode::Sequential => self.run_sequential(prompts, observer).await,
            ExecutionMode::Concurrent => self.run_concurrent(prompts, observer).await,
        };

        log::info!(
            "🎉 Batch {} finished: {} succeeded, {} failed",
            batch_id,
            state.success_count(),
            state.failure_count()
        );
        Ok(state)
    }

    async fn run_sequential(
        &self,
        prompts: Vec<String>,
        observer: &dyn ProgressObserver,
    ) -> BatchState {
        let mut state = BatchState::new(prompts.len());
        for (index, prompt) in prompts.iter().enumerate() {
            let outcome = generate_one(
                self.backend.as_ref(),
                &self.settings,
                &self.output_dir,
                index,
                prompt,
            )
            .await;
            observer.on_progress(index, &outcome);
            state.record(GenerationResult { index, outcome });
        }
        observer.on_batch_complete();
        state
    }

    /// Fan-out mode. Workers report over a channel; this loop is the single
    /// consumer, so it alone touches the observer and the batch state.
    async fn run_concurrent(
        &self,
        prompts: Vec<String>,
        observer: &dyn ProgressObserver,
    ) -> BatchState {
        let total = prompts.len();
        let mut state = BatchState::new(total);
        let (tx, mut rx) = mpsc::channel::<GenerationResult>(total.max(1));

        for (index, prompt) in prompts.into_iter().enumerate() {
            let tx = tx.clone();
            let backend = Arc::clone(&self.backend);
            let settings = self.settings.clone();
            let output_dir = self.output_dir.clone();
            tokio::spawn(async move {
                let outcome =
                    generate_one(backend.as_ref(), &settings, &output_dir, index, &prompt).await;
                // The receiver outlives every worker; a send error only
                // means the whole batch was dropped.
                let _ = tx.send(GenerationResult { index, outcome }).await;
            });
        }
        drop(tx);

        while let Some(result) = rx.recv().await {
            observer.on_progress(result.index, &result.outcome);
            state.record(result);
        }
        observer.on_batch_complete();
        state
    }
}

/// Full pipeline for one prompt. Every error is absorbed into a `Failure`
/// outcome here; nothing propagates to the batch.
async fn generate_one(
    backend: &dyn GenerationBackend,
    settings: &GenerationSettings,
    output_dir: &Path,
    index: usize,
    prompt: &str,
) -> Outcome {
    match generate_and_persist(backend, settings, output_dir, index, prompt).await {
        Ok(outcome) => {
            log::info!("✅ Prompt {} done", index + 1);
            outcome
        }
        Err(e) => {
            let reason = e.to_string();
            log::error!("❌ Prompt {}: {}", index + 1, reason);
            Outcome::Failure { reason }
        }
    }
}

async fn generate_and_persist(
    backend: &dyn GenerationBackend,
    settings: &GenerationSettings,
    output_dir: &Path,
    index: usize,
    prompt: &str,
) -> Result<Outcome> {
    let settings = prepare_references(backend, settings).await?;
    let payload = build_request(prompt, &settings)?;
    let response = backend.run(&settings.model, &payload).await?;
    let url = resolve_image_url(&response)?;
    let bytes = backend.fetch(&url).await?;

    let path = output_dir.join(format!("image_{}.{}", index + 1, extension_of(&url)));
    tokio::fs::write(&path, &bytes).await?;

    Ok(Outcome::Success {
        path,
        size_bytes: bytes.len(),
    })
}

/// Edit models only accept externally-addressable reference images, so raw
/// byte references are pushed through the upload collaborator first.
async fn prepare_references(
    backend: &dyn GenerationBackend,
    settings: &GenerationSettings,
) -> Result<GenerationSettings> {
    if !settings.is_edit_model()
        || settings
            .reference_images
            .iter()
            .all(|r| matches!(r, ReferenceImage::Url(_)))
    {
        return Ok(settings.clone());
    }

    let mut prepared = settings.clone();
    for image in prepared.reference_images.iter_mut() {
        if let ReferenceImage::Bytes(bytes) = image {
            let url = backend.upload(bytes, "image/png").await?;
            *image = ReferenceImage::Url(url);
        }
    }
    Ok(prepared)
}

fn extension_of(url: &str) -> &'static str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    match path.rsplit('.').next() {
        Some("jpg") | Some("jpeg") => "jpg",
        Some("webp") => "webp",
        _ => "png",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FalbatchError;
    use crate::models::RequestPayload;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Backend that succeeds unless the prompt contains "boom". Records
    /// payloads and upload calls for assertions.
    struct MockBackend {
        uploads: AtomicUsize,
        payloads: Mutex<Vec<RequestPayload>>,
    }

    impl MockBackend {
        fn new() -> Self {
            Self {
                uploads: AtomicUsize::new(0),
                payloads: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl GenerationBackend for MockBackend {
        async fn run(&self, _model: &str, payload: &RequestPayload) -> crate::error::Result<Value> {
            self.payloads.lock().unwrap().push(payload.clone());
            let prompt = payload
                .get("prompt")
                .and_then(Value::as_str)
                .unwrap_or_default();
            if prompt.contains("boom") {
                return Err(FalbatchError::RemoteCall("quota exceeded".into()));
            }
            Ok(json!({"images": [{"url": "http://test.local/out.png"}]}))
        }

        async fn upload(&self, _bytes: &[u8], _content_type: &str) -> crate::error::Result<String> {
            self.uploads.fetch_add(1, Ordering::SeqCst);
            Ok("http://test.local/uploaded.png".to_string())
        }

        async fn fetch(&self, _url: &str) -> crate::error::Result<Vec<u8>> {
            Ok(b"image-bytes".to_vec())
        }
    }

    #[derive(Default)]
    struct RecordingObserver {
        progress: Mutex<Vec<(usize, bool)>>,
        completions: AtomicUsize,
    }

    impl ProgressObserver for RecordingObserver {
        fn on_progress(&self, index: usize, outcome: &Outcome) {
            self.progress.lock().unwrap().push((index, outcome.is_success()));
        }

        fn on_batch_complete(&self) {
            self.completions.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn runner(backend: Arc<dyn GenerationBackend>, dir: &Path, mode: ExecutionMode) -> BatchRunner {
        let config = BatchConfig::new().with_output_dir(dir).with_mode(mode);
        BatchRunner::new(backend, GenerationSettings::new(), &config)
    }

    #[tokio::test]
    async fn failed_prompt_does_not_abort_the_batch() {
        for mode in [ExecutionMode::Sequential, ExecutionMode::Concurrent] {
            let dir = tempfile::tempdir().unwrap();
            let observer = RecordingObserver::default();
            let runner = runner(Arc::new(MockBackend::new()), dir.path(), mode);

            let prompts = vec![
                "a quiet harbor".to_string(),
                "boom".to_string(),
                "a mountain pass".to_string(),
            ];
            let state = runner.run_batch(prompts, &observer).await.unwrap();

            assert_eq!(state.completed, 3);
            assert_eq!(state.success_count(), 2);
            assert_eq!(state.failure_count(), 1);

            let progress = observer.progress.lock().unwrap();
            assert_eq!(progress.len(), 3);
            assert_eq!(observer.completions.load(Ordering::SeqCst), 1);

            let failed: Vec<usize> = progress
                .iter()
                .filter(|(_, ok)| !ok)
                .map(|(i, _)| *i)
                .collect();
            assert_eq!(failed, vec![1]);
        }
    }

    #[tokio::test]
    async fn sequential_batch_persists_images_in_index_order() {
        let dir = tempfile::tempdir().unwrap();
        let observer = RecordingObserver::default();
        let runner = runner(
            Arc::new(MockBackend::new()),
            dir.path(),
            ExecutionMode::Sequential,
        );

        let state = runner
            .run_batch(vec!["one".into(), "two".into()], &observer)
            .await
            .unwrap();

        assert!(state.is_complete());
        assert!(dir.path().join("image_1.png").exists());
        assert!(dir.path().join("image_2.png").exists());
        assert_eq!(
            std::fs::read(dir.path().join("image_1.png")).unwrap(),
            b"image-bytes"
        );

        // Sequential mode reports strictly in index order.
        let progress = observer.progress.lock().unwrap();
        let indices: Vec<usize> = progress.iter().map(|(i, _)| *i).collect();
        assert_eq!(indices, vec![0, 1]);
    }

    #[tokio::test]
    async fn concurrent_batch_attributes_every_index_exactly_once() {
        for _ in 0..2 {
            let dir = tempfile::tempdir().unwrap();
            let observer = RecordingObserver::default();
            let runner = runner(
                Arc::new(MockBackend::new()),
                dir.path(),
                ExecutionMode::Concurrent,
            );

            let prompts: Vec<String> = (0..10).map(|i| format!("prompt {}", i)).collect();
            let state = runner.run_batch(prompts, &observer).await.unwrap();

            assert_eq!(state.completed, 10);
            let indices: HashSet<usize> = state.results.iter().map(|r| r.index).collect();
            assert_eq!(indices.len(), 10);
            assert_eq!(indices, (0..10).collect::<HashSet<_>>());
            assert_eq!(observer.completions.load(Ordering::SeqCst), 1);
        }
    }

    #[tokio::test]
    async fn edit_model_uploads_byte_references_before_building() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(MockBackend::new());
        let observer = RecordingObserver::default();

        let settings = GenerationSettings::new()
            .with_model("fal-ai/flux-pro/kontext/edit")
            .with_reference_images(vec![ReferenceImage::Bytes(b"raw".to_vec())]);
        let config = BatchConfig::new()
            .with_output_dir(dir.path())
            .with_mode(ExecutionMode::Sequential);
        let runner = BatchRunner::new(backend.clone(), settings, &config);

        let state = runner
            .run_batch(vec!["swap the sky".into()], &observer)
            .await
            .unwrap();

        assert_eq!(state.success_count(), 1);
        assert_eq!(backend.uploads.load(Ordering::SeqCst), 1);
        let payloads = backend.payloads.lock().unwrap();
        assert_eq!(
            payloads[0].get("image_urls").unwrap(),
            &json!(["http://test.local/uploaded.png"])
        );
    }

    #[tokio::test]
    async fn edit_model_without_references_records_failure_and_continues() {
        let dir = tempfile::tempdir().unwrap();
        let observer = RecordingObserver::default();

        let settings = GenerationSettings::new().with_model("fal-ai/flux-pro/kontext/edit");
        let config = BatchConfig::new()
            .with_output_dir(dir.path())
            .with_mode(ExecutionMode::Sequential);
        let runner = BatchRunner::new(Arc::new(MockBackend::new()), settings, &config);

        let state = runner
            .run_batch(vec!["first".into(), "second".into()], &observer)
            .await
            .unwrap();

        assert_eq!(state.completed, 2);
        assert_eq!(state.failure_count(), 2);
        match &state.results[0].outcome {
            Outcome::Failure { reason } => assert!(reason.contains("Reference images")),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_batch_completes_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let observer = RecordingObserver::default();
        let runner = runner(
            Arc::new(MockBackend::new()),
            dir.path(),
            ExecutionMode::Concurrent,
        );

        let state = runner.run_batch(Vec::new(), &observer).await.unwrap();
        assert_eq!(state.total, 0);
        assert!(state.is_complete());
        assert!(observer.progress.lock().unwrap().is_empty());
        assert_eq!(observer.completions.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn extension_follows_resolved_url() {
        assert_eq!(extension_of("http://x/a.png"), "png");
        assert_eq!(extension_of("http://x/a.jpeg?sig=abc"), "jpg");
        assert_eq!(extension_of("http://x/a.webp"), "webp");
        assert_eq!(extension_of("http://x/no-extension"), "png");
    }
}
