use crate::common::config::{PerformanceConfig, RecognizerConfig};
use crate::common::{FaceGateError, RecognizerBackend, Result};
use crate::core::lbph::LbphEmbedder;
use image::{imageops::FilterType, DynamicImage};
use ndarray::Array4;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use std::sync::Mutex;

pub type Embedding = Vec<f32>;

/// Turns a cropped face into a fixed-length vector.
pub trait Embedder {
    fn backend(&self) -> RecognizerBackend;

    fn embed(&self, face: &DynamicImage) -> Result<Embedding>;
}

/// Builds the embedder selected by `config.backend`.
pub fn build_embedder(config: &RecognizerConfig, performance: &PerformanceConfig) -> Result<Box<dyn Embedder>> {
    match config.backend {
        RecognizerBackend::Onnx => Ok(Box::new(OnnxEmbedder::new(config, performance)?)),
        RecognizerBackend::Lbph => Ok(Box::new(LbphEmbedder::new(config))),
    }
}

/// Face embedding model run through ONNX Runtime (FaceNet-style RGB input).
pub struct OnnxEmbedder {
    // Running a session needs exclusive access
    session: Mutex<Session>,
    input_size: u32,
    normalization_value: f32,
}

impl OnnxEmbedder {
    pub fn new(config: &RecognizerConfig, performance: &PerformanceConfig) -> Result<Self> {
        let model_path = &config.model_path;
        if !model_path.exists() {
            return Err(FaceGateError::Model(
                format!("Recognition model not found at: {:?}", model_path)
            ));
        }

        let opt_level = match performance.optimization_level {
            0 => GraphOptimizationLevel::Disable,
            1 => GraphOptimizationLevel::Level1,
            2 => GraphOptimizationLevel::Level2,
            _ => GraphOptimizationLevel::Level3,
        };
        let session = Session::builder()?
            .with_optimization_level(opt_level)?
            .commit_from_file(model_path)?;

        tracing::debug!("Embedding model loaded from {:?}", model_path);
        Ok(Self {
            session: Mutex::new(session),
            input_size: config.input_size,
            normalization_value: config.normalization_value,
        })
    }

    fn preprocess(&self, face: &DynamicImage) -> Array4<f32> {
        let size = self.input_size;
        let rgb = face.resize_exact(size, size, FilterType::Triangle).to_rgb8();
        let size = size as usize;
        let norm = self.normalization_value;

        let mut array = Array4::<f32>::zeros((1, 3, size, size));
        for (x, y, pixel) in rgb.enumerate_pixels() {
            for c in 0..3 {
                array[[0, c, y as usize, x as usize]] = (pixel[c] as f32 - norm) / norm;
            }
        }
        array
    }
}

impl Embedder for OnnxEmbedder {
    fn backend(&self) -> RecognizerBackend {
        RecognizerBackend::Onnx
    }

    fn embed(&self, face: &DynamicImage) -> Result<Embedding> {
        if face.width() == 0 || face.height() == 0 {
            return Err(FaceGateError::NoFaceDetected);
        }

        let input = Tensor::from_array(self.preprocess(face))?;
        let mut session = self.session
            .lock()
            .map_err(|_| FaceGateError::Model("Embedding session lock poisoned".into()))?;
        let outputs = session.run(ort::inputs![input])?;

        if outputs.len() == 0 {
            return Err(FaceGateError::Model("Embedding model returned no outputs".into()));
        }
        let (_, data) = outputs[0].try_extract_tensor::<f32>()?;
        let embedding = data.to_vec();

        if embedding.is_empty() {
            return Err(FaceGateError::Model("Embedding model returned an empty vector".into()));
        }
        Ok(embedding)
    }
}
