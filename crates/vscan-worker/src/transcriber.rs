//! Process-wide lazily loaded transcription engine.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::{info, warn};
use vscan_media::{MediaResult, Transcriber, TranscriberLoader, Transcript};

use crate::metrics;

/// Loads the engine on first use and shares it across jobs.
///
/// Concurrent first callers wait on one load. A failed load is not
/// cached; the next caller tries again.
pub struct LazyTranscriber {
    loader: Arc<dyn TranscriberLoader>,
    engine: OnceCell<Arc<dyn Transcriber>>,
}

impl LazyTranscriber {
    pub fn new(loader: Arc<dyn TranscriberLoader>) -> Self {
        Self {
            loader,
            engine: OnceCell::new(),
        }
    }

    /// Wrap an already loaded engine.
    pub fn warm(engine: Arc<dyn Transcriber>) -> Self {
        Self {
            loader: Arc::new(Preloaded(engine.clone())),
            engine: OnceCell::new_with(Some(engine)),
        }
    }

    pub fn is_warm(&self) -> bool {
        self.engine.initialized()
    }

    /// The loaded engine, loading it if needed.
    pub async fn get(&self) -> MediaResult<Arc<dyn Transcriber>> {
        let engine = self
            .engine
            .get_or_try_init(|| async {
                info!("Loading transcription engine");
                let result = self.loader.load().await;
                metrics::record_transcriber_load(result.is_ok());
                match &result {
                    Ok(engine) => info!(engine = engine.name(), "Transcription engine ready"),
                    Err(e) => warn!("Transcription engine failed to load: {}", e),
                }
                result
            })
            .await?;
        Ok(Arc::clone(engine))
    }

    pub async fn transcribe(&self, audio_path: &Path) -> MediaResult<Transcript> {
        self.get().await?.transcribe(audio_path).await
    }
}

struct Preloaded(Arc<dyn Transcriber>);

#[async_trait::async_trait]
impl TranscriberLoader for Preloaded {
    async fn load(&self) -> MediaResult<Arc<dyn Transcriber>> {
        Ok(Arc::clone(&self.0))
    }
}
