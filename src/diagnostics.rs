//! Health checks for the models, camera and enrollment data.

use crate::camera::FrameSource;
use crate::common::{Config, DataLayout, RecognizerBackend};
use crate::core::detector::CascadeDetector;
use crate::core::recognizer::OnnxEmbedder;
use crate::storage::EnrollmentStore;
use chrono::{DateTime, Local};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    Ok,
    Warn,
    Fail,
}

impl CheckStatus {
    fn symbol(&self) -> &'static str {
        match self {
            CheckStatus::Ok => "✅",
            CheckStatus::Warn => "⚠️ ",
            CheckStatus::Fail => "❌",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CheckResult {
    pub label: String,
    pub status: CheckStatus,
    pub detail: String,
}

impl CheckResult {
    fn new(label: impl Into<String>, status: CheckStatus, detail: impl Into<String>) -> Self {
        Self { label: label.into(), status, detail: detail.into() }
    }
}

#[derive(Debug, Clone)]
pub struct DiagnosticReport {
    pub generated_at: DateTime<Local>,
    pub checks: Vec<CheckResult>,
}

impl DiagnosticReport {
    pub fn has_failures(&self) -> bool {
        self.checks.iter().any(|c| c.status == CheckStatus::Fail)
    }

    pub fn find(&self, label: &str) -> Option<&CheckResult> {
        self.checks.iter().find(|c| c.label == label)
    }
}

impl fmt::Display for DiagnosticReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Face recognition system diagnostics ({})", self.generated_at.format("%Y-%m-%d %H:%M:%S"))?;
        writeln!(f, "{}", "=".repeat(50))?;
        for check in &self.checks {
            writeln!(f, "{} {}: {}", check.status.symbol(), check.label, check.detail)?;
        }
        write!(f, "{}", "=".repeat(50))
    }
}

/// Runs every check. `camera` is opened once and closed again.
pub fn diagnose(config: &Config, camera: &mut dyn FrameSource) -> DiagnosticReport {
    let mut checks = vec![check_detector(config), check_embedder(config), check_camera(camera)];
    checks.extend(check_enrollment_data(config));

    DiagnosticReport { generated_at: Local::now(), checks }
}

fn check_detector(config: &Config) -> CheckResult {
    let label = "Face detector";
    match CascadeDetector::new(&config.detector) {
        Ok(_) => CheckResult::new(label, CheckStatus::Ok, format!("loaded {:?}", config.detector.model_path)),
        Err(e) => CheckResult::new(label, CheckStatus::Fail, e.to_string()),
    }
}

fn check_embedder(config: &Config) -> CheckResult {
    let label = "Embedder";
    match config.recognizer.backend {
        RecognizerBackend::Lbph => CheckResult::new(label, CheckStatus::Ok, "lbph (no model file needed)"),
        RecognizerBackend::Onnx => match OnnxEmbedder::new(&config.recognizer, &config.performance) {
            Ok(_) => CheckResult::new(label, CheckStatus::Ok, format!("loaded {:?}", config.recognizer.model_path)),
            Err(e) => CheckResult::new(label, CheckStatus::Fail, e.to_string()),
        },
    }
}

fn check_camera(camera: &mut dyn FrameSource) -> CheckResult {
    let label = "Camera";
    match camera.open() {
        Ok(()) => {
            camera.close();
            CheckResult::new(label, CheckStatus::Ok, "opened")
        }
        Err(e) => CheckResult::new(label, CheckStatus::Fail, e.to_string()),
    }
}

fn check_enrollment_data(config: &Config) -> Vec<CheckResult> {
    let layout = DataLayout::new(&config.storage.data_dir);
    if !layout.users_file().exists() {
        return vec![CheckResult::new(
            "Users",
            CheckStatus::Fail,
            format!("no user file at {:?}", layout.users_file()),
        )];
    }

    let store = match EnrollmentStore::load(&layout, config.recognizer.backend) {
        Ok(store) => store,
        Err(e) => return vec![CheckResult::new("Users", CheckStatus::Fail, e.to_string())],
    };

    let mut checks = vec![CheckResult::new(
        "Users",
        if store.users().is_empty() { CheckStatus::Warn } else { CheckStatus::Ok },
        format!("{} registered", store.users().len()),
    )];

    for user in store.users() {
        let path = layout.resolve_face_path(&user.face_image_path);
        let (status, detail) = if path.exists() {
            (CheckStatus::Ok, user.face_image_path.clone())
        } else {
            (CheckStatus::Fail, format!("{} not found", user.face_image_path))
        };
        checks.push(CheckResult::new(format!("  {}", user.display_name), status, detail));
    }

    let gallery = store.gallery();
    let gallery_check = if store.has_saved_gallery() {
        CheckResult::new(
            "Gallery",
            if gallery.is_empty() { CheckStatus::Warn } else { CheckStatus::Ok },
            format!("{} embeddings ({})", gallery.len(), config.recognizer.backend),
        )
    } else {
        CheckResult::new(
            "Gallery",
            CheckStatus::Warn,
            format!("no saved gallery for {}; run rebuild-gallery", config.recognizer.backend),
        )
    };
    checks.push(gallery_check);

    let report = store.audit();
    let audit = if report.is_consistent() {
        CheckResult::new("Consistency", CheckStatus::Ok, "every user has an embedding")
    } else {
        CheckResult::new(
            "Consistency",
            CheckStatus::Warn,
            format!(
                "orphaned embeddings {:?}, users without embeddings {:?}",
                report.orphaned_embeddings, report.users_without_embeddings
            ),
        )
    };
    checks.push(audit);

    checks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testing::ScriptedSource;
    use crate::storage::UserRecord;
    use std::fs;
    use tempfile::tempdir;

    fn config_in(dir: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.storage.data_dir = dir.join("Datos");
        config.detector.model_path = dir.join("missing_detector.bin");
        config.recognizer.model_path = dir.join("missing_embedder.onnx");
        config
    }

    #[test]
    fn reports_missing_models_and_camera() {
        let dir = tempdir().unwrap();
        let config = config_in(dir.path());

        let report = diagnose(&config, &mut ScriptedSource::unavailable());
        assert_eq!(report.find("Face detector").unwrap().status, CheckStatus::Fail);
        assert_eq!(report.find("Embedder").unwrap().status, CheckStatus::Fail);
        assert_eq!(report.find("Camera").unwrap().status, CheckStatus::Fail);
        assert_eq!(report.find("Users").unwrap().status, CheckStatus::Fail);
        assert!(report.has_failures());
        // Diagnosing never creates the user file
        assert!(!dir.path().join("Datos/usuarios.json").exists());
    }

    #[test]
    fn lbph_needs_no_model_and_camera_is_released() {
        let dir = tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.recognizer.backend = RecognizerBackend::Lbph;

        let mut camera = ScriptedSource::new(Vec::new());
        let log = camera.log.clone();
        let report = diagnose(&config, &mut camera);

        assert_eq!(report.find("Embedder").unwrap().status, CheckStatus::Ok);
        assert_eq!(report.find("Camera").unwrap().status, CheckStatus::Ok);
        assert_eq!((log.borrow().opens, log.borrow().closes), (1, 1));
    }

    #[test]
    fn lists_each_user_face_image() {
        let dir = tempdir().unwrap();
        let config = config_in(dir.path());
        let layout = DataLayout::new(&config.storage.data_dir);
        let mut store = EnrollmentStore::load(&layout, RecognizerBackend::Onnx).unwrap();

        let ana_face = layout.face_image_path("ana");
        fs::write(&ana_face, b"png").unwrap();
        for (name, login) in [("Ana", "ana"), ("Bob", "bob")] {
            store
                .append_user(UserRecord {
                    display_name: name.into(),
                    login: login.into(),
                    password: "pw".into(),
                    face_image_path: layout.face_image_path(login).to_string_lossy().into_owned(),
                })
                .unwrap();
        }
        store.append_embedding(vec![1.0, 0.0], "Ana").unwrap();

        let report = diagnose(&config, &mut ScriptedSource::new(Vec::new()));
        assert_eq!(report.find("Users").unwrap().detail, "2 registered");
        assert_eq!(report.find("  Ana").unwrap().status, CheckStatus::Ok);
        assert_eq!(report.find("  Bob").unwrap().status, CheckStatus::Fail);
        assert_eq!(report.find("Gallery").unwrap().detail, "1 embeddings (onnx)");
        assert_eq!(report.find("Consistency").unwrap().status, CheckStatus::Warn);

        let text = report.to_string();
        assert!(text.contains("1 embeddings (onnx)"));
        assert!(text.starts_with("Face recognition system diagnostics"));
        assert!(text.contains("Bob"));
    }

    #[test]
    fn reports_gallery_that_was_never_saved() {
        let dir = tempdir().unwrap();
        let config = config_in(dir.path());
        let layout = DataLayout::new(&config.storage.data_dir);
        EnrollmentStore::load(&layout, RecognizerBackend::Onnx).unwrap();

        let report = diagnose(&config, &mut ScriptedSource::new(Vec::new()));
        let gallery = report.find("Gallery").unwrap();
        assert_eq!(gallery.status, CheckStatus::Warn);
        assert_eq!(gallery.detail, "no saved gallery for onnx; run rebuild-gallery");
    }
}
