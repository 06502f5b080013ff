//! Frame sources and fixed-interval frame sampling.
//!
//! A [`FrameSource`] yields decoded RGB frames in stream order. The
//! [`FrameSampler`] walks a source and emits every `k`-th frame as a
//! lazy, restartable iterator; frames in between are skipped without
//! being handed to the caller.

use image::RgbImage;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use tracing::{debug, warn};

use crate::command::{check_ffmpeg, FfmpegCommand};
use crate::error::{MediaError, MediaResult};

/// A decoded frame together with its position in the stream.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Zero-based frame index
    pub index: u64,
    /// RGB pixel data
    pub image: RgbImage,
}

/// Sequential source of decoded frames.
pub trait FrameSource: Send {
    /// Frame dimensions (width, height).
    fn dimensions(&self) -> (u32, u32);

    /// Decode the next frame, or `None` at end of stream.
    fn next_frame(&mut self) -> MediaResult<Option<RgbImage>>;

    /// Advance past the next frame. Returns `false` at end of stream.
    ///
    /// Sources that can skip without producing pixels should override this.
    fn skip_frame(&mut self) -> MediaResult<bool> {
        Ok(self.next_frame()?.is_some())
    }

    /// Go back to the first frame.
    fn rewind(&mut self) -> MediaResult<()>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn dimensions(&self) -> (u32, u32) {
        (**self).dimensions()
    }

    fn next_frame(&mut self) -> MediaResult<Option<RgbImage>> {
        (**self).next_frame()
    }

    fn skip_frame(&mut self) -> MediaResult<bool> {
        (**self).skip_frame()
    }

    fn rewind(&mut self) -> MediaResult<()> {
        (**self).rewind()
    }
}

/// Emits frames whose index is a multiple of `interval`.
pub struct FrameSampler<S> {
    source: S,
    interval: u64,
    position: u64,
    sampled: u64,
    finished: bool,
}

impl<S: FrameSource> FrameSampler<S> {
    /// Create a sampler. An interval of zero is rejected.
    pub fn new(source: S, interval: u32) -> MediaResult<Self> {
        if interval == 0 {
            return Err(MediaError::InvalidArgument(
                "frame interval must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            source,
            interval: interval as u64,
            position: 0,
            sampled: 0,
            finished: false,
        })
    }

    pub fn interval(&self) -> u64 {
        self.interval
    }

    /// Frames walked so far, sampled or not.
    pub fn frames_read(&self) -> u64 {
        self.position
    }

    /// Frames emitted so far.
    pub fn frames_sampled(&self) -> u64 {
        self.sampled
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.source.dimensions()
    }

    /// Rewind the source and start over from frame 0.
    pub fn restart(&mut self) -> MediaResult<()> {
        self.source.rewind()?;
        self.position = 0;
        self.sampled = 0;
        self.finished = false;
        Ok(())
    }

    pub fn into_inner(self) -> S {
        self.source
    }
}

impl<S: FrameSource> Iterator for FrameSampler<S> {
    type Item = MediaResult<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        loop {
            let index = self.position;

            if index % self.interval == 0 {
                return match self.source.next_frame() {
                    Ok(Some(image)) => {
                        self.position += 1;
                        self.sampled += 1;
                        Some(Ok(Frame { index, image }))
                    }
                    Ok(None) => {
                        self.finished = true;
                        None
                    }
                    Err(e) => {
                        self.finished = true;
                        Some(Err(e))
                    }
                };
            }

            match self.source.skip_frame() {
                Ok(true) => self.position += 1,
                Ok(false) => {
                    self.finished = true;
                    return None;
                }
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

/// Frames already held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryFrameSource {
    frames: Vec<RgbImage>,
    cursor: usize,
}

impl MemoryFrameSource {
    pub fn new(frames: Vec<RgbImage>) -> Self {
        Self { frames, cursor: 0 }
    }

    /// `count` solid frames of the given size.
    pub fn solid(count: usize, width: u32, height: u32, color: [u8; 3]) -> Self {
        let frame = RgbImage::from_pixel(width, height, image::Rgb(color));
        Self::new(vec![frame; count])
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl FrameSource for MemoryFrameSource {
    fn dimensions(&self) -> (u32, u32) {
        self.frames
            .first()
            .map(|f| f.dimensions())
            .unwrap_or((0, 0))
    }

    fn next_frame(&mut self) -> MediaResult<Option<RgbImage>> {
        let frame = self.frames.get(self.cursor).cloned();
        if frame.is_some() {
            self.cursor += 1;
        }
        Ok(frame)
    }

    fn skip_frame(&mut self) -> MediaResult<bool> {
        if self.cursor < self.frames.len() {
            self.cursor += 1;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn rewind(&mut self) -> MediaResult<()> {
        self.cursor = 0;
        Ok(())
    }
}

/// Decodes frames through an `ffmpeg` rawvideo (rgb24) pipe.
///
/// Blocking: run it on a blocking thread.
pub struct FfmpegFrameSource {
    path: PathBuf,
    width: u32,
    height: u32,
    child: Option<Child>,
    stdout: Option<ChildStdout>,
    buffer: Vec<u8>,
    frames_read: u64,
}

impl FfmpegFrameSource {
    /// Open a video. Dimensions come from a prior probe.
    pub fn open(path: impl AsRef<Path>, width: u32, height: u32) -> MediaResult<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(MediaError::FileNotFound(path));
        }
        if width == 0 || height == 0 {
            return Err(MediaError::InvalidVideo(format!(
                "{} has no decodable video dimensions",
                path.display()
            )));
        }

        let frame_bytes = width as usize * height as usize * 3;
        let mut source = Self {
            path,
            width,
            height,
            child: None,
            stdout: None,
            buffer: vec![0; frame_bytes],
            frames_read: 0,
        };
        source.spawn()?;
        Ok(source)
    }

    fn spawn(&mut self) -> MediaResult<()> {
        check_ffmpeg()?;

        let args = self.decoder_args();

        debug!(path = %self.path.display(), "Spawning ffmpeg frame decoder");

        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;

        self.stdout = child.stdout.take();
        self.child = Some(child);
        self.frames_read = 0;
        Ok(())
    }

    /// The scale filter pins the pipe's frame size to the buffer size, so a
    /// rotation the probe missed distorts frames instead of shearing them.
    fn decoder_args(&self) -> Vec<String> {
        FfmpegCommand::new(&self.path, "pipe:1")
            .output_arg("-vf")
            .output_arg(format!("scale={}:{}", self.width, self.height))
            .format("rawvideo")
            .pixel_format("rgb24")
            .output_arg("-an")
            .build_args()
    }

    fn stop(&mut self) {
        self.stdout = None;
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }

    /// Fill the frame buffer. Returns `false` at end of stream.
    fn read_into_buffer(&mut self) -> MediaResult<bool> {
        let Some(stdout) = self.stdout.as_mut() else {
            return Ok(false);
        };

        let mut filled = 0;
        while filled < self.buffer.len() {
            let n = stdout.read(&mut self.buffer[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }

        if filled == self.buffer.len() {
            self.frames_read += 1;
            return Ok(true);
        }

        if filled > 0 {
            warn!(
                path = %self.path.display(),
                bytes = filled,
                "Discarding truncated trailing frame"
            );
        }
        self.finish()?;
        Ok(false)
    }

    /// Reap the decoder at end of stream. A decoder that produced nothing
    /// and exited non-zero means the file could not be decoded.
    fn finish(&mut self) -> MediaResult<()> {
        self.stdout = None;
        if let Some(mut child) = self.child.take() {
            let status = child.wait()?;
            if !status.success() && self.frames_read == 0 {
                return Err(MediaError::decode_failed(format!(
                    "ffmpeg could not decode {} (exit code {:?})",
                    self.path.display(),
                    status.code()
                )));
            }
        }
        Ok(())
    }
}

impl FrameSource for FfmpegFrameSource {
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn next_frame(&mut self) -> MediaResult<Option<RgbImage>> {
        if !self.read_into_buffer()? {
            return Ok(None);
        }
        let image = RgbImage::from_raw(self.width, self.height, self.buffer.clone())
            .ok_or_else(|| MediaError::decode_failed("frame buffer size mismatch"))?;
        Ok(Some(image))
    }

    fn skip_frame(&mut self) -> MediaResult<bool> {
        self.read_into_buffer()
    }

    fn rewind(&mut self) -> MediaResult<()> {
        self.stop();
        self.spawn()
    }
}

impl Drop for FfmpegFrameSource {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn indices(sampler: &mut FrameSampler<MemoryFrameSource>) -> Vec<u64> {
        sampler.map(|f| f.unwrap().index).collect()
    }

    #[test]
    fn test_samples_every_kth_frame() {
        let mut sampler = FrameSampler::new(MemoryFrameSource::solid(90, 4, 4, [0, 0, 0]), 30).unwrap();
        assert_eq!(indices(&mut sampler), vec![0, 30, 60]);
        assert_eq!(sampler.frames_read(), 90);
        assert_eq!(sampler.frames_sampled(), 3);
    }

    #[test]
    fn test_sample_count_is_ceil_n_over_k() {
        for (n, k) in [(0usize, 30u32), (1, 30), (29, 30), (31, 30), (91, 30), (10, 1), (10, 3)] {
            let mut sampler = FrameSampler::new(MemoryFrameSource::solid(n, 2, 2, [1, 2, 3]), k).unwrap();
            let got = indices(&mut sampler);
            let expected = n.div_ceil(k as usize);
            assert_eq!(got.len(), expected, "n={} k={}", n, k);
            assert!(got.iter().all(|i| i % k as u64 == 0));
            assert!(got.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn test_zero_interval_rejected() {
        assert!(matches!(
            FrameSampler::new(MemoryFrameSource::default(), 0),
            Err(MediaError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_restart_replays_sequence() {
        let mut sampler = FrameSampler::new(MemoryFrameSource::solid(7, 2, 2, [0, 0, 0]), 3).unwrap();
        let first = indices(&mut sampler);
        assert!(sampler.next().is_none());
        sampler.restart().unwrap();
        assert_eq!(indices(&mut sampler), first);
    }

    struct FailingSource {
        fail_at: u64,
        position: u64,
    }

    impl FrameSource for FailingSource {
        fn dimensions(&self) -> (u32, u32) {
            (2, 2)
        }

        fn next_frame(&mut self) -> MediaResult<Option<RgbImage>> {
            if self.position == self.fail_at {
                return Err(MediaError::decode_failed("corrupt packet"));
            }
            self.position += 1;
            Ok(Some(RgbImage::new(2, 2)))
        }

        fn rewind(&mut self) -> MediaResult<()> {
            self.position = 0;
            Ok(())
        }
    }

    #[test]
    fn test_error_ends_iteration() {
        let source = FailingSource { fail_at: 4, position: 0 };
        let mut sampler = FrameSampler::new(source, 2).unwrap();
        assert_eq!(sampler.next().unwrap().unwrap().index, 0);
        assert_eq!(sampler.next().unwrap().unwrap().index, 2);
        assert!(sampler.next().unwrap().is_err());
        assert!(sampler.next().is_none());
    }

    #[test]
    fn test_decoder_output_is_pinned_to_probed_size() {
        // Display size of a 1920x1080 clip tagged rotate=90.
        let source = FfmpegFrameSource {
            path: PathBuf::from("/videos/portrait.mp4"),
            width: 1080,
            height: 1920,
            child: None,
            stdout: None,
            buffer: Vec::new(),
            frames_read: 0,
        };
        let args = source.decoder_args();

        let vf = args.iter().position(|a| a == "-vf").unwrap();
        assert_eq!(args[vf + 1], "scale=1080:1920");
        let input = args.iter().position(|a| a == "-i").unwrap();
        assert!(vf > input, "filter must apply to the output");
        assert_eq!(args.last().map(String::as_str), Some("pipe:1"));
    }
}
