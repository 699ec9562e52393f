// Core modules
pub mod camera;
pub mod cli;
pub mod common;
pub mod core;
pub mod diagnostics;
pub mod storage;

// Re-export commonly used types
pub use camera::{Camera, FrameSource};
pub use common::{Config, DataLayout, FaceGateError, RecognizerBackend, Result};
pub use crate::core::{
    DisplaySink, DisplayState, Embedder, EnrollmentWorkflow, FaceBox, FaceDetector, FacePipeline, Identity,
    IdentityForm, Matcher, RecognitionLoop,
};
pub use storage::{EnrollmentStore, Gallery, GalleryEntry, UserRecord, UserStore};
