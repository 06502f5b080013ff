//! OpenCV backends: `VideoCapture` frame source and YuNet face detector.
//!
//! YuNet is a lightweight CNN face detector exposed through OpenCV's
//! `FaceDetectorYN`. The 2023mar models need OpenCV 4.8+; 2022mar works
//! with 4.5+.

use image::RgbImage;
use opencv::core::{Mat, Ptr, Size, Vec3b};
use opencv::objdetect::FaceDetectorYN;
use opencv::prelude::*;
use opencv::videoio;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{MediaError, MediaResult};
use crate::face::{BoundingBox, FaceDetector};
use crate::frames::FrameSource;

/// Score threshold for face detection.
const SCORE_THRESHOLD: f32 = 0.6;

/// NMS threshold for face detection
const NMS_THRESHOLD: f32 = 0.3;

/// Top K faces to keep
const TOP_K: i32 = 50;

/// Model locations in preference order.
pub const YUNET_MODEL_PATHS: &[&str] = &[
    "./models/face_detection_yunet_2023mar.onnx",
    "./models/face_detection_yunet_2022mar.onnx",
    "/app/models/face_detection_yunet_2023mar.onnx",
    "/app/models/face_detection_yunet_2022mar.onnx",
    "/usr/share/opencv/models/face_detection_yunet_2023mar.onnx",
];

/// First existing YuNet model, if any.
pub fn find_yunet_model() -> Option<PathBuf> {
    YUNET_MODEL_PATHS
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
}

fn cv_err(context: &str) -> impl Fn(opencv::Error) -> MediaError + '_ {
    move |e| MediaError::detection_failed(format!("{}: {}", context, e))
}

/// Frame source backed by `cv::VideoCapture`.
pub struct OpenCvFrameSource {
    path: PathBuf,
    capture: videoio::VideoCapture,
    width: u32,
    height: u32,
}

// VideoCapture is only touched from the owning thread.
unsafe impl Send for OpenCvFrameSource {}

impl OpenCvFrameSource {
    pub fn open(path: impl AsRef<Path>) -> MediaResult<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(MediaError::FileNotFound(path));
        }

        let capture = Self::open_capture(&path)?;
        let width = capture
            .get(videoio::CAP_PROP_FRAME_WIDTH)
            .map_err(cv_err("read frame width"))? as u32;
        let height = capture
            .get(videoio::CAP_PROP_FRAME_HEIGHT)
            .map_err(cv_err("read frame height"))? as u32;

        Ok(Self {
            path,
            capture,
            width,
            height,
        })
    }

    fn open_capture(path: &Path) -> MediaResult<videoio::VideoCapture> {
        let capture = videoio::VideoCapture::from_file(&path.to_string_lossy(), videoio::CAP_ANY)
            .map_err(cv_err("open video"))?;
        if !capture.is_opened().map_err(cv_err("open video"))? {
            return Err(MediaError::InvalidVideo(format!(
                "OpenCV cannot open {}",
                path.display()
            )));
        }
        Ok(capture)
    }

    /// Frame count reported by the container.
    pub fn frame_count_hint(&self) -> Option<u64> {
        self.capture
            .get(videoio::CAP_PROP_FRAME_COUNT)
            .ok()
            .filter(|n| *n > 0.0)
            .map(|n| n as u64)
    }
}

impl FrameSource for OpenCvFrameSource {
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn next_frame(&mut self) -> MediaResult<Option<RgbImage>> {
        let mut bgr = Mat::default();
        if !self.capture.read(&mut bgr).map_err(cv_err("read frame"))? || bgr.empty() {
            return Ok(None);
        }
        mat_to_rgb(&bgr).map(Some)
    }

    fn skip_frame(&mut self) -> MediaResult<bool> {
        self.capture.grab().map_err(cv_err("grab frame"))
    }

    fn rewind(&mut self) -> MediaResult<()> {
        self.capture = Self::open_capture(&self.path)?;
        Ok(())
    }
}

fn mat_to_rgb(bgr: &Mat) -> MediaResult<RgbImage> {
    let width = bgr.cols() as u32;
    let height = bgr.rows() as u32;
    let mut image = RgbImage::new(width, height);
    for y in 0..height {
        for x in 0..width {
            let px = bgr
                .at_2d::<Vec3b>(y as i32, x as i32)
                .map_err(cv_err("read pixel"))?;
            image.put_pixel(x, y, image::Rgb([px[2], px[1], px[0]]));
        }
    }
    Ok(image)
}

fn rgb_to_mat(frame: &RgbImage) -> MediaResult<Mat> {
    let (width, height) = frame.dimensions();
    let mut mat = Mat::new_rows_cols_with_default(
        height as i32,
        width as i32,
        opencv::core::CV_8UC3,
        opencv::core::Scalar::all(0.0),
    )
    .map_err(cv_err("allocate frame"))?;
    for (x, y, px) in frame.enumerate_pixels() {
        let dst = mat
            .at_2d_mut::<Vec3b>(y as i32, x as i32)
            .map_err(cv_err("write pixel"))?;
        *dst = Vec3b::from([px[2], px[1], px[0]]);
    }
    Ok(mat)
}

/// YuNet face detector using OpenCV.
pub struct YuNetDetector {
    detector: Ptr<FaceDetectorYN>,
    input_size: (i32, i32),
}

// FaceDetectorYN is only touched from the owning thread.
unsafe impl Send for YuNetDetector {}

impl YuNetDetector {
    /// Load the first model found in [`YUNET_MODEL_PATHS`].
    pub fn from_default_paths() -> MediaResult<Self> {
        let path = find_yunet_model().ok_or_else(|| {
            MediaError::model_not_found("face_detection_yunet_*.onnx in ./models or /app/models")
        })?;
        Self::new(&path)
    }

    pub fn new(model_path: &Path) -> MediaResult<Self> {
        let metadata = std::fs::metadata(model_path)
            .map_err(|_| MediaError::model_not_found(model_path.display().to_string()))?;
        if metadata.len() < 50_000 {
            return Err(MediaError::detection_failed(format!(
                "YuNet model file appears corrupted (size: {} bytes)",
                metadata.len()
            )));
        }

        let input_size = (320, 320);
        let detector = FaceDetectorYN::create(
            &model_path.to_string_lossy(),
            "",
            Size::new(input_size.0, input_size.1),
            SCORE_THRESHOLD,
            NMS_THRESHOLD,
            TOP_K,
            opencv::dnn::DNN_BACKEND_DEFAULT,
            opencv::dnn::DNN_TARGET_CPU,
        )
        .map_err(cv_err("create YuNet detector"))?;

        info!(model = %model_path.display(), "YuNet detector initialized");

        Ok(Self {
            detector,
            input_size,
        })
    }

    fn ensure_input_size(&mut self, width: i32, height: i32) -> MediaResult<()> {
        if self.input_size != (width, height) {
            self.detector
                .set_input_size(Size::new(width, height))
                .map_err(cv_err("set input size"))?;
            self.input_size = (width, height);
        }
        Ok(())
    }
}

impl FaceDetector for YuNetDetector {
    fn name(&self) -> &str {
        "yunet"
    }

    fn detect(&mut self, frame: &RgbImage) -> MediaResult<Vec<BoundingBox>> {
        let bgr = rgb_to_mat(frame)?;
        let (width, height) = (bgr.cols(), bgr.rows());
        if width <= 0 || height <= 0 {
            return Ok(Vec::new());
        }
        self.ensure_input_size(width, height)?;

        let mut faces = Mat::default();
        self.detector
            .detect(&bgr, &mut faces)
            .map_err(cv_err("YuNet detection"))?;

        // Row layout: x, y, w, h, 5 landmark pairs, score
        let mut boxes = Vec::with_capacity(faces.rows().max(0) as usize);
        for row in 0..faces.rows() {
            let value = |col: i32| -> MediaResult<f64> {
                faces
                    .at_2d::<f32>(row, col)
                    .map(|v| *v as f64)
                    .map_err(cv_err("read detection"))
            };
            let (w, h) = (value(2)?, value(3)?);
            if w <= 0.0 || h <= 0.0 {
                continue;
            }
            if value(14)? < SCORE_THRESHOLD as f64 {
                continue;
            }
            boxes.push(BoundingBox::new(value(0)?, value(1)?, w, h));
        }

        if boxes.is_empty() && faces.rows() > 0 {
            warn!(candidates = faces.rows(), "YuNet filtered all candidates");
        }
        debug!(faces = boxes.len(), "YuNet detection");
        Ok(boxes)
    }
}
