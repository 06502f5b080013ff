//! Face extraction over sampled frames.
//!
//! For every sampled frame with at least one detection the full frame is
//! written once as `frame_{index:06}.jpg` and each box as
//! `face_{index:06}_{n}.jpg`. Frames without detections are not written.
//! Files written before a failure are left in place.

use image::imageops;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::MediaResult;
use crate::face::{FaceDetector, CROP_MARGIN_PX};
use crate::frames::{FrameSampler, FrameSource};

/// Counters produced by a face extraction pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaceExtractionStats {
    pub total_frames: u64,
    pub sampled_frames: u64,
    pub faces_detected: u64,
    pub frames_persisted: u64,
    pub crops_persisted: u64,
    pub output_dir: PathBuf,
}

/// Runs a detector over a sampler and persists frames and crops.
#[derive(Debug, Clone)]
pub struct FaceExtractor {
    output_dir: PathBuf,
    margin: u32,
}

impl FaceExtractor {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            margin: CROP_MARGIN_PX,
        }
    }

    pub fn with_margin(mut self, margin: u32) -> Self {
        self.margin = margin;
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Walk the sampler to end of stream.
    pub fn run<S, D>(
        &self,
        sampler: &mut FrameSampler<S>,
        detector: &mut D,
    ) -> MediaResult<FaceExtractionStats>
    where
        S: FrameSource,
        D: FaceDetector + ?Sized,
    {
        std::fs::create_dir_all(&self.output_dir)?;

        let mut faces_detected = 0u64;
        let mut frames_persisted = 0u64;
        let mut crops_persisted = 0u64;

        for frame in sampler.by_ref() {
            let frame = frame?;
            let boxes = detector.detect(&frame.image)?;

            if boxes.is_empty() {
                continue;
            }

            faces_detected += boxes.len() as u64;
            debug!(frame = frame.index, faces = boxes.len(), "Faces detected");

            frame
                .image
                .save(self.output_dir.join(frame_file_name(frame.index)))?;
            frames_persisted += 1;

            let (width, height) = frame.image.dimensions();
            for (n, bbox) in boxes.iter().enumerate() {
                let Some(rect) = bbox.crop_rect(self.margin, width, height) else {
                    continue;
                };
                let crop = imageops::crop_imm(&frame.image, rect.x, rect.y, rect.width, rect.height)
                    .to_image();
                crop.save(self.output_dir.join(crop_file_name(frame.index, n)))?;
                crops_persisted += 1;
            }
        }

        let stats = FaceExtractionStats {
            total_frames: sampler.frames_read(),
            sampled_frames: sampler.frames_sampled(),
            faces_detected,
            frames_persisted,
            crops_persisted,
            output_dir: self.output_dir.clone(),
        };

        info!(
            detector = detector.name(),
            total_frames = stats.total_frames,
            sampled = stats.sampled_frames,
            faces = stats.faces_detected,
            "Face extraction finished"
        );

        Ok(stats)
    }
}

pub fn frame_file_name(index: u64) -> String {
    format!("frame_{:06}.jpg", index)
}

pub fn crop_file_name(index: u64, face: usize) -> String {
    format!("face_{:06}_{}.jpg", index, face)
}
