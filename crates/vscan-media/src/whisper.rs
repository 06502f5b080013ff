//! Local whisper.cpp transcription via `whisper-rs`.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use crate::audio::{load_wav_mono, SAMPLE_RATE};
use crate::error::{MediaError, MediaResult};
use crate::transcribe::{RawSegment, Transcriber, TranscriberLoader, Transcript};

/// whisper.cpp model held in memory.
pub struct WhisperTranscriber {
    context: Arc<WhisperContext>,
    language: Option<String>,
}

impl WhisperTranscriber {
    /// Load a GGML model. Blocking and slow; call from a blocking thread.
    pub fn load(model_path: &Path, language: Option<String>) -> MediaResult<Self> {
        if !model_path.exists() {
            return Err(MediaError::model_not_found(model_path.display().to_string()));
        }
        let context = WhisperContext::new_with_params(
            &model_path.to_string_lossy(),
            WhisperContextParameters::default(),
        )
        .map_err(|e| MediaError::transcription_failed(format!("load model: {}", e)))?;

        info!(model = %model_path.display(), "Whisper model loaded");
        Ok(Self {
            context: Arc::new(context),
            language,
        })
    }

    fn run(context: &WhisperContext, language: Option<&str>, audio: &Path) -> MediaResult<Transcript> {
        let (samples, rate) = load_wav_mono(audio)?;
        if rate != SAMPLE_RATE {
            return Err(MediaError::InvalidArgument(format!(
                "whisper expects {} Hz audio, got {} Hz",
                SAMPLE_RATE, rate
            )));
        }

        let err = |e: whisper_rs::WhisperError| MediaError::transcription_failed(e.to_string());

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        params.set_language(language);
        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);

        let mut state = context.create_state().map_err(err)?;
        state.full(params, &samples).map_err(err)?;

        let mut segments = Vec::new();
        for i in 0..state.full_n_segments().map_err(err)? {
            let text = state.full_get_segment_text_lossy(i).map_err(err)?;
            // Timestamps are in centiseconds.
            let start = state.full_get_segment_t0(i).map_err(err)? as f64 / 100.0;
            let end = state.full_get_segment_t1(i).map_err(err)? as f64 / 100.0;

            let n_tokens = state.full_n_tokens(i).map_err(err)?;
            let mut logprob_sum = 0.0;
            for t in 0..n_tokens {
                logprob_sum += state.full_get_token_data(i, t).map_err(err)?.plog as f64;
            }
            let avg_logprob = if n_tokens > 0 {
                logprob_sum / n_tokens as f64
            } else {
                0.0
            };

            segments.push(RawSegment::new(start, end, text, avg_logprob));
        }

        let language = state
            .full_lang_id_from_state()
            .ok()
            .and_then(whisper_rs::get_lang_str)
            .map(str::to_string);

        Ok(Transcript { segments, language })
    }
}

#[async_trait]
impl Transcriber for WhisperTranscriber {
    fn name(&self) -> &str {
        "whisper"
    }

    async fn transcribe(&self, audio_path: &Path) -> MediaResult<Transcript> {
        let context = Arc::clone(&self.context);
        let language = self.language.clone();
        let audio = audio_path.to_path_buf();

        tokio::task::spawn_blocking(move || Self::run(&context, language.as_deref(), &audio))
            .await
            .map_err(|e| MediaError::internal(format!("whisper task panicked: {}", e)))?
    }
}

/// Loads a [`WhisperTranscriber`] from a model file.
#[derive(Debug, Clone)]
pub struct WhisperLoader {
    pub model_path: PathBuf,
    pub language: Option<String>,
}

#[async_trait]
impl TranscriberLoader for WhisperLoader {
    async fn load(&self) -> MediaResult<Arc<dyn Transcriber>> {
        let path = self.model_path.clone();
        let language = self.language.clone();
        let transcriber = tokio::task::spawn_blocking(move || WhisperTranscriber::load(&path, language))
            .await
            .map_err(|e| MediaError::internal(format!("whisper load panicked: {}", e)))??;
        Ok(Arc::new(transcriber))
    }
}
