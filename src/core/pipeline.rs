use crate::common::{RecognizerBackend, Result};
use crate::core::detector::{crop_face, FaceBox, FaceDetector};
use crate::core::matcher::{Identity, MatchOutcome, Matcher};
use crate::core::recognizer::{Embedder, Embedding};
use crate::storage::Gallery;
use image::DynamicImage;

/// One detected face in one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionResult {
    pub bounding_box: FaceBox,
    pub identity: Identity,
    pub distance: Option<f32>,
}

/// Detector, embedder and matcher wired together.
pub struct FacePipeline {
    detector: Box<dyn FaceDetector>,
    embedder: Box<dyn Embedder>,
    matcher: Matcher,
}

impl FacePipeline {
    pub fn new(detector: Box<dyn FaceDetector>, embedder: Box<dyn Embedder>, matcher: Matcher) -> Self {
        Self { detector, embedder, matcher }
    }

    pub fn backend(&self) -> RecognizerBackend {
        self.embedder.backend()
    }

    pub fn detect(&mut self, image: &DynamicImage) -> Result<Vec<FaceBox>> {
        self.detector.detect(&image.to_luma8())
    }

    pub fn embed_face(&self, image: &DynamicImage, face: &FaceBox, margin: f32) -> Result<Embedding> {
        let crop = crop_face(image, face, margin)?;
        self.embedder.embed(&crop)
    }

    /// Detects every face in `frame` and matches each against `gallery`.
    /// A face whose embedding fails is reported as unknown.
    pub fn recognize(&mut self, frame: &DynamicImage, gallery: &Gallery) -> Result<Vec<RecognitionResult>> {
        let faces = self.detect(frame)?;

        let results = faces
            .into_iter()
            .map(|face| {
                let outcome = match self.embed_face(frame, &face, 0.0) {
                    Ok(embedding) => self.matcher.match_embedding(&embedding, gallery.entries()),
                    Err(e) => {
                        tracing::debug!("Embedding failed for face at {:?}: {}", face, e);
                        MatchOutcome::unknown()
                    }
                };
                RecognitionResult {
                    bounding_box: face,
                    identity: outcome.identity,
                    distance: outcome.distance,
                }
            })
            .collect();

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::config::RecognizerConfig;
    use crate::core::lbph::LbphEmbedder;
    use crate::core::testing::{solid_square, BrightRegionDetector, FailingEmbedder, MeanColorEmbedder};

    fn pipeline() -> FacePipeline {
        FacePipeline::new(Box::new(BrightRegionDetector), Box::new(MeanColorEmbedder), Matcher::new(0.45))
    }

    #[test]
    fn no_faces_means_no_results() {
        let mut pipeline = pipeline();
        let frame = DynamicImage::new_rgb8(64, 64);
        assert!(pipeline.recognize(&frame, &Gallery::new()).unwrap().is_empty());
    }

    #[test]
    fn matches_face_against_gallery() {
        let mut pipeline = pipeline();
        let mut gallery = Gallery::new();
        gallery.push(vec![1.0, 0.0, 0.0], "ana").unwrap();

        let frame = solid_square(100, 100, [200, 0, 0]);
        let results = pipeline.recognize(&frame, &gallery).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].identity, Identity::Known("ana".into()));
        assert!(results[0].distance.unwrap() < 1e-5);
    }

    #[test]
    fn embedding_failure_degrades_to_unknown() {
        let mut pipeline = FacePipeline::new(Box::new(BrightRegionDetector), Box::new(FailingEmbedder), Matcher::new(0.45));
        let mut gallery = Gallery::new();
        gallery.push(vec![1.0, 0.0, 0.0], "ana").unwrap();

        let frame = solid_square(100, 100, [200, 0, 0]);
        let results = pipeline.recognize(&frame, &gallery).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].identity, Identity::Unknown);
        assert_eq!(results[0].distance, None);
    }

    #[test]
    fn backend_follows_the_embedder() {
        assert_eq!(pipeline().backend(), RecognizerBackend::Onnx);

        let lbph = LbphEmbedder::new(&RecognizerConfig::default());
        let pipeline = FacePipeline::new(Box::new(BrightRegionDetector), Box::new(lbph), Matcher::new(0.45));
        assert_eq!(pipeline.backend(), RecognizerBackend::Lbph);
    }
}
