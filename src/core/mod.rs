pub mod detector;
pub mod enrollment;
pub mod lbph;
pub mod matcher;
pub mod pipeline;
pub mod recognition;
pub mod recognizer;

#[cfg(test)]
pub(crate) mod testing;

pub use detector::{CascadeDetector, FaceBox, FaceDetector};
pub use enrollment::{
    import_folder, rebuild_gallery, CaptureCommand, CaptureControl, CaptureMode, EnrollmentOutcome,
    EnrollmentWorkflow, IdentityForm,
};
pub use lbph::LbphEmbedder;
pub use matcher::{cosine_distance, Identity, MatchOutcome, Matcher};
pub use pipeline::{FacePipeline, RecognitionResult};
pub use recognition::{Access, DisplaySink, DisplayState, LoopState, RecognitionLoop, Role};
pub use recognizer::{build_embedder, Embedder, Embedding, OnnxEmbedder};
