//! Pitch contour extraction and emotion tagging.
//!
//! The contour is computed with a short-time normalized autocorrelation
//! tracker: each 40 ms window (10 ms hop) is searched for the strongest
//! periodicity between 75 and 600 Hz. Windows that are too quiet or not
//! periodic enough are unvoiced and reported as 0 Hz. Autocorrelation goes
//! through a real FFT of the zero-padded window.

use std::path::Path;
use std::sync::Arc;

use realfft::num_complex::Complex;
use realfft::{ComplexToReal, FftError, RealFftPlanner, RealToComplex};
use tracing::{debug, warn};
use vscan_models::{EmotionLabel, PitchAnalysis, TranscriptionSegment};

use crate::audio::load_wav_mono;
use crate::error::{MediaError, MediaResult};

/// Pitch tracker settings.
#[derive(Debug, Clone)]
pub struct PitchConfig {
    pub min_hz: f64,
    pub max_hz: f64,
    pub window_ms: f64,
    pub hop_ms: f64,
    /// Minimum normalized autocorrelation peak for a voiced window
    pub voicing_threshold: f64,
    /// Minimum RMS for a window to be considered at all
    pub silence_rms: f64,
}

impl Default for PitchConfig {
    fn default() -> Self {
        Self {
            min_hz: 75.0,
            max_hz: 600.0,
            window_ms: 40.0,
            hop_ms: 10.0,
            voicing_threshold: 0.45,
            silence_rms: 0.01,
        }
    }
}

/// One contour point; `hz == 0.0` means unvoiced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PitchSample {
    /// Window center in seconds
    pub time: f64,
    pub hz: f64,
}

/// Contour plus its aggregate statistics.
#[derive(Debug, Clone)]
pub struct PitchReport {
    pub contour: Vec<PitchSample>,
    pub analysis: PitchAnalysis,
}

impl PitchReport {
    /// Mean voiced pitch within `[start, end]` seconds.
    pub fn mean_in_range(&self, start: f64, end: f64) -> Option<f64> {
        let voiced: Vec<f64> = self
            .contour
            .iter()
            .filter(|s| s.hz > 0.0 && s.time >= start && s.time <= end)
            .map(|s| s.hz)
            .collect();
        if voiced.is_empty() {
            return None;
        }
        Some(voiced.iter().sum::<f64>() / voiced.len() as f64)
    }

    /// Attach per-segment pitch and emotion where the segment has voiced
    /// samples. Segments without any are left untouched.
    pub fn tag_segments(&self, segments: &mut [TranscriptionSegment]) {
        for segment in segments.iter_mut() {
            if let Some(mean) = self.mean_in_range(segment.start_seconds, segment.end_seconds) {
                segment.pitch_hz = Some(vscan_models::confidence::round_to(mean, 2));
                segment.emotion_label = Some(EmotionLabel::from_mean_hz(mean));
            }
        }
    }
}

/// Autocorrelation pitch analyzer.
#[derive(Debug, Clone, Default)]
pub struct PitchAnalyzer {
    config: PitchConfig,
}

impl PitchAnalyzer {
    pub fn new(config: PitchConfig) -> Self {
        Self { config }
    }

    /// Extract the pitch contour of a mono signal.
    pub fn contour(&self, samples: &[f32], sample_rate: u32) -> Vec<PitchSample> {
        let sr = sample_rate as f64;
        let window = ((self.config.window_ms / 1000.0) * sr).round() as usize;
        let hop = ((self.config.hop_ms / 1000.0) * sr).round().max(1.0) as usize;
        let min_lag = (sr / self.config.max_hz).floor().max(1.0) as usize;
        let max_lag = (sr / self.config.min_hz).ceil() as usize;

        if window == 0 || samples.len() < window || max_lag + 1 >= window {
            return Vec::new();
        }

        let mut contour = Vec::with_capacity((samples.len() - window) / hop + 1);
        let mut frame = vec![0f64; window];
        let mut acf = Autocorrelator::new(window);
        let mut corr = vec![0f64; max_lag + 2];
        let mut start = 0;

        while start + window <= samples.len() {
            for (dst, src) in frame.iter_mut().zip(&samples[start..start + window]) {
                *dst = *src as f64;
            }
            let hz = self.frame_pitch(&mut acf, &mut frame, &mut corr, sr, min_lag, max_lag);
            contour.push(PitchSample {
                time: (start as f64 + window as f64 / 2.0) / sr,
                hz,
            });
            start += hop;
        }

        contour
    }

    /// Pitch of one window in Hz, or 0.0 when unvoiced.
    fn frame_pitch(
        &self,
        acf: &mut Autocorrelator,
        frame: &mut [f64],
        corr: &mut [f64],
        sr: f64,
        min_lag: usize,
        max_lag: usize,
    ) -> f64 {
        let mean = frame.iter().sum::<f64>() / frame.len() as f64;
        frame.iter_mut().for_each(|v| *v -= mean);

        let energy: f64 = frame.iter().map(|v| v * v).sum();
        let rms = (energy / frame.len() as f64).sqrt();
        if rms < self.config.silence_rms {
            return 0.0;
        }

        let lags = min_lag.saturating_sub(1)..=(max_lag + 1).min(frame.len() - 1);
        if let Err(e) = acf.normalized(frame, lags, corr) {
            debug!("Autocorrelation failed, window treated as unvoiced: {}", e);
            return 0.0;
        }

        let best = corr[min_lag..=max_lag]
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);
        if best < self.config.voicing_threshold {
            return 0.0;
        }

        // Shortest lag close to the best peak; avoids picking a multiple of
        // the true period.
        let lag = (min_lag..=max_lag)
            .find(|&l| {
                corr[l] >= 0.9 * best && corr[l] >= corr[l - 1] && corr[l] >= corr[l + 1]
            })
            .unwrap_or(min_lag);

        let refined = parabolic_peak(corr[lag - 1], corr[lag], corr[lag + 1]) + lag as f64;
        if refined <= 0.0 {
            return 0.0;
        }
        sr / refined
    }

    /// Analyze a mono signal.
    pub fn analyze_samples(&self, samples: &[f32], sample_rate: u32) -> PitchReport {
        let contour = self.contour(samples, sample_rate);
        let hz: Vec<f64> = contour.iter().map(|s| s.hz).collect();
        let analysis = PitchAnalysis::from_contour(&hz);
        PitchReport { contour, analysis }
    }

    /// Analyze a WAV file.
    pub fn analyze_file(&self, path: &Path) -> MediaResult<PitchReport> {
        let (samples, sample_rate) = load_wav_mono(path)?;
        if sample_rate == 0 {
            return Err(MediaError::InvalidArgument("WAV sample rate is zero".into()));
        }
        let report = self.analyze_samples(&samples, sample_rate);
        debug!(
            path = %path.display(),
            voiced = report.analysis.voiced_samples,
            mean_hz = report.analysis.mean_hz,
            "Pitch analysis finished"
        );
        Ok(report)
    }

    /// Best-effort analysis: failures become an error-carrying result with
    /// zeroed statistics and an empty contour.
    pub fn analyze_file_lossy(&self, path: &Path) -> PitchReport {
        match self.analyze_file(path) {
            Ok(report) => report,
            Err(e) => {
                warn!(path = %path.display(), "Pitch analysis failed: {}", e);
                PitchReport {
                    contour: Vec::new(),
                    analysis: PitchAnalysis::from_error(e),
                }
            }
        }
    }
}

/// Normalized autocorrelation of fixed-length windows.
///
/// `corr[lag] = Σ x[i]·x[i+lag] / sqrt(Σ x[i]² · Σ x[i+lag]²)`, with both
/// energy sums taken over the overlapping part only. The raw products come
/// from one forward and one inverse real FFT; the energies from prefix sums.
struct Autocorrelator {
    forward: Arc<dyn RealToComplex<f64>>,
    inverse: Arc<dyn ComplexToReal<f64>>,
    padded: Vec<f64>,
    spectrum: Vec<Complex<f64>>,
    products: Vec<f64>,
    /// `energy[i]` is the sum of the first `i` squared samples
    energy: Vec<f64>,
}

impl Autocorrelator {
    fn new(window: usize) -> Self {
        // At least 2n points so the circular correlation has no wrap-around.
        let len = (2 * window).next_power_of_two();
        let mut planner = RealFftPlanner::<f64>::new();
        let forward = planner.plan_fft_forward(len);
        let inverse = planner.plan_fft_inverse(len);

        Self {
            padded: forward.make_input_vec(),
            spectrum: forward.make_output_vec(),
            products: inverse.make_output_vec(),
            energy: vec![0.0; window + 1],
            forward,
            inverse,
        }
    }

    fn normalized(
        &mut self,
        frame: &[f64],
        lags: std::ops::RangeInclusive<usize>,
        corr: &mut [f64],
    ) -> Result<(), FftError> {
        let n = frame.len();

        self.padded.fill(0.0);
        self.padded[..n].copy_from_slice(frame);
        self.forward.process(&mut self.padded, &mut self.spectrum)?;
        for bin in self.spectrum.iter_mut() {
            *bin = Complex::new(bin.norm_sqr(), 0.0);
        }
        self.inverse.process(&mut self.spectrum, &mut self.products)?;
        // realfft leaves the inverse unnormalized.
        let scale = self.products.len() as f64;

        for (i, v) in frame.iter().enumerate() {
            self.energy[i + 1] = self.energy[i] + v * v;
        }

        for lag in lags {
            let xy = self.products[lag] / scale;
            let xx = self.energy[n - lag];
            let yy = self.energy[n] - self.energy[lag];
            let denom = (xx * yy).sqrt();
            corr[lag] = if denom > 0.0 { xy / denom } else { 0.0 };
        }
        Ok(())
    }
}

/// Offset of the vertex of the parabola through three equally spaced points.
fn parabolic_peak(left: f64, center: f64, right: f64) -> f64 {
    let denom = left - 2.0 * center + right;
    if denom.abs() < f64::EPSILON {
        return 0.0;
    }
    (0.5 * (left - right) / denom).clamp(-0.5, 0.5)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{write_wav_mono, SAMPLE_RATE};
    use std::f64::consts::PI;

    fn tone(hz: f64, seconds: f64) -> Vec<f32> {
        let n = (seconds * SAMPLE_RATE as f64) as usize;
        (0..n)
            .map(|i| (0.5 * (2.0 * PI * hz * i as f64 / SAMPLE_RATE as f64).sin()) as f32)
            .collect()
    }

    #[test]
    fn test_sine_pitch_is_recovered() {
        let report = PitchAnalyzer::default().analyze_samples(&tone(220.0, 1.0), SAMPLE_RATE);
        assert!(report.analysis.is_voiced());
        assert!((report.analysis.mean_hz - 220.0).abs() < 3.0, "{}", report.analysis.mean_hz);
        assert_eq!(report.analysis.emotion, Some(EmotionLabel::AnimatedEngaged));
    }

    #[test]
    fn test_low_voice_is_calm() {
        let report = PitchAnalyzer::default().analyze_samples(&tone(110.0, 1.0), SAMPLE_RATE);
        assert!((report.analysis.mean_hz - 110.0).abs() < 3.0);
        assert_eq!(report.analysis.emotion, Some(EmotionLabel::CalmDeep));
    }

    #[test]
    fn test_autocorrelation_matches_direct_sum() {
        let frame: Vec<f64> = (0..640)
            .map(|i| {
                let t = i as f64 / SAMPLE_RATE as f64;
                (2.0 * PI * 180.0 * t).sin() + 0.3 * (2.0 * PI * 530.0 * t).cos()
                    + 0.05 * ((i * 7919 % 97) as f64 / 97.0 - 0.5)
            })
            .collect();

        let mut acf = Autocorrelator::new(frame.len());
        let mut corr = vec![0.0; 215];
        acf.normalized(&frame, 25..=214, &mut corr).unwrap();

        for lag in [25, 60, 89, 150, 214] {
            let n = frame.len();
            let xy: f64 = (0..n - lag).map(|i| frame[i] * frame[i + lag]).sum();
            let xx: f64 = (0..n - lag).map(|i| frame[i] * frame[i]).sum();
            let yy: f64 = (lag..n).map(|i| frame[i] * frame[i]).sum();
            let direct = xy / (xx * yy).sqrt();
            assert!((corr[lag] - direct).abs() < 1e-9, "lag {}: {} vs {}", lag, corr[lag], direct);
        }
    }

    #[test]
    fn test_long_signal_contour_density() {
        // One minute: one contour point per 10 ms hop.
        let report = PitchAnalyzer::default().analyze_samples(&tone(160.0, 60.0), SAMPLE_RATE);
        assert_eq!(report.contour.len(), (60 * 16_000 - 640) / 160 + 1);
        assert!((report.analysis.mean_hz - 160.0).abs() < 3.0);
    }

    #[test]
    fn test_silence_is_no_voice() {
        let report = PitchAnalyzer::default().analyze_samples(&vec![0.0; 16_000], SAMPLE_RATE);
        assert!(!report.contour.is_empty());
        assert_eq!(report.analysis, PitchAnalysis::no_voice());
        assert_eq!(report.analysis.emotion_label(), PitchAnalysis::NO_VOICE_LABEL);
    }

    #[test]
    fn test_too_short_signal_is_no_voice() {
        let report = PitchAnalyzer::default().analyze_samples(&[0.1; 100], SAMPLE_RATE);
        assert!(report.contour.is_empty());
        assert!(!report.analysis.is_voiced());
    }

    #[test]
    fn test_missing_file_degrades() {
        let report = PitchAnalyzer::default().analyze_file_lossy(Path::new("/no/such/audio.wav"));
        assert!(report.analysis.error.is_some());
        assert_eq!(report.analysis.emotion_label(), PitchAnalysis::ERROR_LABEL);
        assert_eq!(report.analysis.mean_hz, 0.0);
    }

    #[test]
    fn test_segments_are_tagged_by_time_range() {
        let mut samples = tone(120.0, 1.0);
        samples.extend(vec![0.0; SAMPLE_RATE as usize]);
        samples.extend(tone(300.0, 1.0));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("speech.wav");
        write_wav_mono(&path, &samples, SAMPLE_RATE).unwrap();

        let report = PitchAnalyzer::default().analyze_file(&path).unwrap();
        let mut segments = vec![
            TranscriptionSegment::new(0.1, 0.9, "low", -0.2),
            TranscriptionSegment::new(1.1, 1.9, "silent", -0.2),
            TranscriptionSegment::new(2.1, 2.9, "high", -0.2),
        ];
        report.tag_segments(&mut segments);

        assert_eq!(segments[0].emotion_label, Some(EmotionLabel::CalmDeep));
        assert!(segments[1].pitch_hz.is_none());
        assert_eq!(segments[2].emotion_label, Some(EmotionLabel::ExcitedHighPitched));
    }
}
