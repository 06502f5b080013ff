//! Audio track extraction and WAV loading.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// Sample rate used for transcription and pitch analysis (16kHz).
pub const SAMPLE_RATE: u32 = 16_000;

/// Demuxes a video's audio track to a waveform file.
#[async_trait]
pub trait AudioExtractor: Send + Sync {
    /// Write the audio track of `video` to `output` and return its path.
    async fn extract(&self, video: &Path, output: &Path) -> MediaResult<PathBuf>;
}

/// FFmpeg-backed extractor writing 16kHz mono 16-bit PCM WAV.
#[derive(Debug, Clone, Default)]
pub struct FfmpegAudioExtractor {
    runner: FfmpegRunner,
}

impl FfmpegAudioExtractor {
    pub fn new(runner: FfmpegRunner) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl AudioExtractor for FfmpegAudioExtractor {
    async fn extract(&self, video: &Path, output: &Path) -> MediaResult<PathBuf> {
        if !video.exists() {
            return Err(MediaError::FileNotFound(video.to_path_buf()));
        }
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        debug!(
            input = %video.display(),
            output = %output.display(),
            "Extracting audio"
        );

        let cmd = FfmpegCommand::new(video, output)
            .no_video()
            .audio_codec("pcm_s16le")
            .audio_sample_rate(SAMPLE_RATE)
            .audio_channels(1);

        self.runner.run(&cmd).await.map_err(|e| match e {
            MediaError::FfmpegFailed { ref message, .. }
                if message.contains("does not contain any stream")
                    || message.contains("matches no streams") =>
            {
                MediaError::NoAudio(video.display().to_string())
            }
            other => other,
        })?;

        let metadata = tokio::fs::metadata(output).await?;
        if metadata.len() == 0 {
            return Err(MediaError::NoAudio(video.display().to_string()));
        }

        info!(output = %output.display(), bytes = metadata.len(), "Audio extracted");
        Ok(output.to_path_buf())
    }
}

/// Load a WAV file as mono f32 samples in `[-1, 1]`.
///
/// Multi-channel input is averaged down to one channel.
pub fn load_wav_mono(path: &Path) -> MediaResult<(Vec<f32>, u32)> {
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()?
        }
    };

    let mono = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    };

    Ok((mono, spec.sample_rate))
}

/// Write mono f32 samples as a 16-bit PCM WAV file.
pub fn write_wav_mono(path: &Path, samples: &[f32], sample_rate: u32) -> MediaResult<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for sample in samples {
        let clamped = sample.clamp(-1.0, 1.0);
        writer.write_sample((clamped * i16::MAX as f32) as i16)?;
    }
    writer.finalize()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wav_roundtrip_mono() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let samples: Vec<f32> = (0..1600).map(|i| ((i as f32) * 0.01).sin() * 0.5).collect();

        write_wav_mono(&path, &samples, SAMPLE_RATE).unwrap();
        let (loaded, rate) = load_wav_mono(&path).unwrap();

        assert_eq!(rate, SAMPLE_RATE);
        assert_eq!(loaded.len(), samples.len());
        assert!(loaded
            .iter()
            .zip(&samples)
            .all(|(a, b)| (a - b).abs() < 1e-3));
    }

    #[test]
    fn test_stereo_is_downmixed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for _ in 0..10 {
            writer.write_sample(16384i16).unwrap();
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();

        let (mono, rate) = load_wav_mono(&path).unwrap();
        assert_eq!(rate, 8000);
        assert_eq!(mono.len(), 10);
        assert!((mono[0] - 0.25).abs() < 1e-3);
    }

    #[tokio::test]
    async fn test_missing_video_is_reported() {
        let extractor = FfmpegAudioExtractor::default();
        let err = extractor
            .extract(Path::new("/definitely/not/here.mp4"), Path::new("/tmp/out.wav"))
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::FileNotFound(_)));
    }
}
