use crate::common::config::DetectorConfig;
use crate::common::{FaceGateError, Result};
use image::{DynamicImage, GrayImage};
use rustface::ImageData;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
}

impl FaceBox {
    pub fn from_rect(x: i32, y: i32, width: u32, height: u32, confidence: f32) -> Self {
        Self {
            x1: x as f32,
            y1: y as f32,
            x2: x as f32 + width as f32,
            y2: y as f32 + height as f32,
            confidence,
        }
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    /// Pixel rectangle `(x, y, w, h)` grown by `margin` (a fraction of the box
    /// size on each side) and clamped to an image of `width` x `height`.
    /// `None` when nothing of the box lies inside the image.
    pub fn crop_rect(&self, margin: f32, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        let dx = self.width() * margin;
        let dy = self.height() * margin;
        let x1 = (self.x1 - dx).max(0.0).floor();
        let y1 = (self.y1 - dy).max(0.0).floor();
        let x2 = (self.x2 + dx).min(width as f32).ceil();
        let y2 = (self.y2 + dy).min(height as f32).ceil();

        if x2 - x1 < 1.0 || y2 - y1 < 1.0 {
            return None;
        }
        Some((x1 as u32, y1 as u32, (x2 - x1) as u32, (y2 - y1) as u32))
    }
}

/// Crops `face` out of `image`, keeping `margin` around the box.
pub fn crop_face(image: &DynamicImage, face: &FaceBox, margin: f32) -> Result<DynamicImage> {
    let (x, y, w, h) = face
        .crop_rect(margin, image.width(), image.height())
        .ok_or_else(|| FaceGateError::Other(anyhow::anyhow!("Face box {:?} lies outside the frame", face)))?;
    Ok(image.crop_imm(x, y, w, h))
}

/// Finds faces in a grayscale image.
pub trait FaceDetector {
    fn detect(&mut self, gray: &GrayImage) -> Result<Vec<FaceBox>>;
}

/// Funnel-structured cascade detector backed by a SeetaFace model file.
pub struct CascadeDetector {
    inner: Box<dyn rustface::Detector>,
}

impl CascadeDetector {
    pub fn new(config: &DetectorConfig) -> Result<Self> {
        let model_path = &config.model_path;
        if !model_path.exists() {
            return Err(FaceGateError::Model(
                format!("Detector model not found at: {:?}", model_path)
            ));
        }

        let path = model_path.to_str()
            .ok_or_else(|| FaceGateError::Model(format!("Non UTF-8 model path: {:?}", model_path)))?;
        let mut inner = rustface::create_detector(path)
            .map_err(|e| FaceGateError::Model(format!("Failed to load cascade model: {}", e)))?;

        inner.set_min_face_size(config.min_face_size);
        inner.set_score_thresh(config.score_thresh);
        inner.set_pyramid_scale_factor(config.pyramid_scale_factor);
        inner.set_slide_window_step(config.slide_window_step, config.slide_window_step);

        tracing::debug!("Cascade detector loaded from {:?}", model_path);
        Ok(Self { inner })
    }
}

impl FaceDetector for CascadeDetector {
    fn detect(&mut self, gray: &GrayImage) -> Result<Vec<FaceBox>> {
        let (width, height) = gray.dimensions();
        let mut image = ImageData::new(gray.as_raw(), width, height);

        let mut faces: Vec<FaceBox> = self.inner
            .detect(&mut image)
            .into_iter()
            .map(|face| {
                let bbox = face.bbox();
                FaceBox::from_rect(bbox.x(), bbox.y(), bbox.width(), bbox.height(), face.score() as f32)
            })
            .collect();

        // Highest score first so "first face" means the most confident one
        faces.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        Ok(faces)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn crop_rect_applies_margin_and_clamps() {
        let face = FaceBox::from_rect(10, 10, 20, 20, 1.0);
        assert_eq!(face.crop_rect(0.0, 100, 100), Some((10, 10, 20, 20)));
        assert_eq!(face.crop_rect(0.5, 100, 100), Some((0, 0, 40, 40)));
        assert_eq!(face.crop_rect(0.5, 35, 35), Some((0, 0, 35, 35)));
    }

    #[test]
    fn crop_rect_outside_image_is_none() {
        let face = FaceBox::from_rect(200, 200, 20, 20, 1.0);
        assert_eq!(face.crop_rect(0.0, 100, 100), None);
    }

    #[test]
    fn crop_face_returns_box_sized_image() {
        let image = DynamicImage::new_luma8(64, 48);
        let face = FaceBox::from_rect(8, 4, 16, 12, 1.0);
        let crop = crop_face(&image, &face, 0.0).unwrap();
        assert_eq!((crop.width(), crop.height()), (16, 12));
    }

    #[test]
    fn missing_model_is_a_model_error() {
        let config = DetectorConfig {
            model_path: PathBuf::from("/nonexistent/seeta.bin"),
            ..DetectorConfig::default()
        };
        assert!(matches!(CascadeDetector::new(&config), Err(FaceGateError::Model(_))));
    }
}
