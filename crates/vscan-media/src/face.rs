//! Face bounding boxes, crop geometry and the detector seam.

use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::error::MediaResult;

/// Default margin added around each face crop, in pixels.
pub const CROP_MARGIN_PX: u32 = 20;

/// Bounding box in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Left edge x-coordinate
    pub x: f64,
    /// Top edge y-coordinate
    pub y: f64,
    /// Box width
    pub width: f64,
    /// Box height
    pub height: f64,
}

impl BoundingBox {
    /// Create a new bounding box.
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// Right edge x-coordinate.
    #[inline]
    pub fn x2(&self) -> f64 {
        self.x + self.width
    }

    /// Bottom edge y-coordinate.
    #[inline]
    pub fn y2(&self) -> f64 {
        self.y + self.height
    }

    /// Box area in pixels.
    #[inline]
    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    /// Return a new box with padding added on all sides.
    pub fn pad(&self, padding: f64) -> BoundingBox {
        BoundingBox {
            x: self.x - padding,
            y: self.y - padding,
            width: self.width + 2.0 * padding,
            height: self.height + 2.0 * padding,
        }
    }

    /// Integer pixel rectangle of `self` grown by `margin` on every side and
    /// cut to the frame. `None` when nothing of the box lies inside it.
    pub fn crop_rect(&self, margin: u32, frame_width: u32, frame_height: u32) -> Option<CropRect> {
        let padded = self.pad(margin as f64);

        let x1 = padded.x.floor().clamp(0.0, frame_width as f64);
        let y1 = padded.y.floor().clamp(0.0, frame_height as f64);
        let x2 = padded.x2().ceil().clamp(0.0, frame_width as f64);
        let y2 = padded.y2().ceil().clamp(0.0, frame_height as f64);

        if !(x2 > x1 && y2 > y1) {
            return None;
        }

        Some(CropRect {
            x: x1 as u32,
            y: y1 as u32,
            width: (x2 - x1) as u32,
            height: (y2 - y1) as u32,
        })
    }
}

/// Pixel rectangle inside a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRect {
    pub fn fits_within(&self, frame_width: u32, frame_height: u32) -> bool {
        self.x + self.width <= frame_width && self.y + self.height <= frame_height
    }
}

/// Face detection model.
///
/// Implementations return axis-aligned boxes in the frame's pixel
/// coordinates; zero boxes means no face.
pub trait FaceDetector: Send {
    fn name(&self) -> &str;

    fn detect(&mut self, frame: &RgbImage) -> MediaResult<Vec<BoundingBox>>;
}

impl<D: FaceDetector + ?Sized> FaceDetector for Box<D> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn detect(&mut self, frame: &RgbImage) -> MediaResult<Vec<BoundingBox>> {
        (**self).detect(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crop_rect_adds_margin() {
        let rect = BoundingBox::new(100.0, 100.0, 50.0, 60.0)
            .crop_rect(20, 640, 480)
            .unwrap();
        assert_eq!(rect, CropRect { x: 80, y: 80, width: 90, height: 100 });
    }

    #[test]
    fn test_crop_rect_clamps_to_frame() {
        let rect = BoundingBox::new(5.0, 450.0, 40.0, 40.0)
            .crop_rect(20, 640, 480)
            .unwrap();
        assert_eq!(rect, CropRect { x: 0, y: 430, width: 65, height: 50 });
        assert!(rect.fits_within(640, 480));
    }

    #[test]
    fn test_crop_rect_never_exceeds_bounds() {
        let (w, h) = (320, 240);
        let boxes = [
            BoundingBox::new(-30.0, -30.0, 100.0, 100.0),
            BoundingBox::new(300.0, 220.0, 80.0, 80.0),
            BoundingBox::new(0.0, 0.0, 320.0, 240.0),
            BoundingBox::new(10.4, 17.6, 0.5, 0.5),
        ];
        for bbox in boxes {
            let rect = bbox.crop_rect(CROP_MARGIN_PX, w, h).unwrap();
            assert!(rect.fits_within(w, h), "{:?} -> {:?}", bbox, rect);
        }
    }

    #[test]
    fn test_crop_rect_outside_frame() {
        assert!(BoundingBox::new(1000.0, 1000.0, 10.0, 10.0)
            .crop_rect(20, 320, 240)
            .is_none());
    }
}
