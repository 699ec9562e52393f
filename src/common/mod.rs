pub mod config;
pub mod error;
pub mod paths;

pub use config::{Config, RecognizerBackend};
pub use error::{FaceGateError, Result};
pub use paths::DataLayout;
