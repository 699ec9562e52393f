use thiserror::Error;

#[derive(Error, Debug)]
pub enum FaceGateError {
    #[error("Camera error: {0}")]
    Camera(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("No face detected")]
    NoFaceDetected,

    #[error("Login already registered: {0}")]
    DuplicateLogin(String),

    #[error("Required field is blank: {0}")]
    MissingField(&'static str),

    #[error("Login may not contain path separators or '..': {0}")]
    InvalidLogin(String),

    #[error("Face capture cancelled")]
    CaptureCancelled,

    #[error("Embedding dimension mismatch: gallery holds {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("ORT error: {0}")]
    Ort(#[from] ort::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, FaceGateError>;
