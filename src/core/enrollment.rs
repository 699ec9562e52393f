use crate::camera::FrameSource;
use crate::common::{DataLayout, FaceGateError, Result};
use crate::core::detector::{crop_face, FaceBox};
use crate::core::pipeline::FacePipeline;
use crate::storage::{EnrollmentStore, Gallery, UserRecord};
use image::DynamicImage;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

const IMPORT_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Identity fields typed in by the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityForm {
    pub display_name: String,
    pub login: String,
    pub password: String,
}

impl IdentityForm {
    pub fn new(display_name: impl Into<String>, login: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            login: login.into(),
            password: password.into(),
        }
    }

    /// Trims every field; any blank field is rejected. The login names the
    /// stored face image, so it may not contain path separators or `..`.
    pub fn validated(&self) -> Result<Self> {
        let field = |value: &str, name: &'static str| {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                Err(FaceGateError::MissingField(name))
            } else {
                Ok(trimmed.to_string())
            }
        };

        let login = field(&self.login, "login")?;
        if login.contains(['/', '\\']) || login.contains("..") {
            return Err(FaceGateError::InvalidLogin(login));
        }

        Ok(Self {
            display_name: field(&self.display_name, "display_name")?,
            login,
            password: field(&self.password, "password")?,
        })
    }
}

/// What the operator asked for while the capture preview runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureCommand {
    Continue,
    Save,
    Cancel,
}

/// Shows the capture preview and reports operator key presses.
pub trait CaptureControl {
    fn poll(&mut self, frame: &DynamicImage, faces: &[FaceBox]) -> CaptureCommand;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureMode {
    /// Take the first face that shows up.
    Auto,
    /// Take the latest face when the operator presses save.
    Manual,
}

#[derive(Debug, Clone)]
pub struct EnrollmentOutcome {
    pub record: UserRecord,
    pub embedding_stored: bool,
}

/// Enrolls one person at a time into the store.
pub struct EnrollmentWorkflow<'a> {
    store: &'a mut EnrollmentStore,
    pipeline: &'a mut FacePipeline,
    layout: &'a DataLayout,
    crop_margin: f32,
}

impl<'a> EnrollmentWorkflow<'a> {
    pub fn new(
        store: &'a mut EnrollmentStore,
        pipeline: &'a mut FacePipeline,
        layout: &'a DataLayout,
        crop_margin: f32,
    ) -> Self {
        Self { store, pipeline, layout, crop_margin }
    }

    /// Validates the form and checks the login is free. Run this before
    /// opening the camera so the operator isn't asked to pose for nothing.
    pub fn check(&self, form: &IdentityForm) -> Result<IdentityForm> {
        let form = form.validated()?;
        if self.store.contains_login(&form.login) {
            return Err(FaceGateError::DuplicateLogin(form.login));
        }
        Ok(form)
    }

    /// Runs the live preview until a face is captured. The source is always
    /// closed on return.
    pub fn capture_face(
        &mut self,
        source: &mut dyn FrameSource,
        mode: CaptureMode,
        control: &mut dyn CaptureControl,
        timeout: Duration,
    ) -> Result<DynamicImage> {
        source.open()?;
        let captured = self.capture_loop(source, mode, control, timeout);
        source.close();
        captured
    }

    fn capture_loop(
        &mut self,
        source: &mut dyn FrameSource,
        mode: CaptureMode,
        control: &mut dyn CaptureControl,
        timeout: Duration,
    ) -> Result<DynamicImage> {
        let deadline = Instant::now() + timeout;
        let mut last_seen: Option<(DynamicImage, FaceBox)> = None;

        while Instant::now() < deadline {
            let frame = match source.read_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    std::thread::sleep(Duration::from_millis(5));
                    continue;
                }
                Err(e) => {
                    tracing::error!("Frame capture failed: {}", e);
                    return Err(e);
                }
            };

            let faces = match self.pipeline.detect(&frame) {
                Ok(faces) => faces,
                Err(e) => {
                    tracing::warn!("Detection failed during capture: {}", e);
                    Vec::new()
                }
            };

            match control.poll(&frame, &faces) {
                CaptureCommand::Cancel => return Err(FaceGateError::CaptureCancelled),
                CaptureCommand::Save if mode == CaptureMode::Manual => match (faces.first(), last_seen.take()) {
                    (Some(face), _) => return crop_face(&frame, face, self.crop_margin),
                    (None, Some((seen, face))) => return crop_face(&seen, &face, self.crop_margin),
                    (None, None) => tracing::warn!("No face in view yet; keep looking at the camera"),
                },
                _ => {}
            }

            if let Some(face) = faces.first() {
                if mode == CaptureMode::Auto {
                    tracing::info!("Face captured (confidence {:.2})", face.confidence);
                    return crop_face(&frame, face, self.crop_margin);
                }
                last_seen = Some((frame, *face));
            }
        }

        tracing::warn!("No face captured within {:?}", timeout);
        Err(FaceGateError::NoFaceDetected)
    }

    /// Saves the captured face, registers the user and, if possible, stores
    /// an embedding under the display name.
    pub fn enroll(&mut self, form: &IdentityForm, face: &DynamicImage) -> Result<EnrollmentOutcome> {
        let form = self.check(form)?;

        let face_path = self.layout.face_image_path(&form.login);
        if let Some(parent) = face_path.parent() {
            fs::create_dir_all(parent)?;
        }
        face.to_rgb8().save(&face_path)?;
        tracing::debug!("Face image written to {:?}", face_path);

        // Re-check the stored image so the gallery is built from what is on disk
        let saved = image::open(&face_path)?;
        let faces = match self.pipeline.detect(&saved) {
            Ok(faces) => faces,
            Err(e) => {
                discard(&face_path);
                return Err(e);
            }
        };
        let Some(face_box) = faces.first().copied() else {
            tracing::warn!("No face found in the saved capture for {}; discarding it", form.login);
            discard(&face_path);
            return Err(FaceGateError::NoFaceDetected);
        };

        let record = UserRecord {
            display_name: form.display_name.clone(),
            login: form.login.clone(),
            password: form.password.clone(),
            face_image_path: face_path.to_string_lossy().into_owned(),
        };
        if let Err(e) = self.store.append_user(record.clone()) {
            discard(&face_path);
            return Err(e);
        }

        let embedding_stored = match self
            .pipeline
            .embed_face(&saved, &face_box, 0.0)
            .and_then(|vector| self.store.append_embedding(vector, &form.display_name))
        {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("User {} registered without an embedding: {}", form.login, e);
                false
            }
        };

        tracing::info!("Enrolled {} ({})", form.display_name, form.login);
        Ok(EnrollmentOutcome { record, embedding_stored })
    }

    pub fn enroll_from_image(&mut self, form: &IdentityForm, path: &Path) -> Result<EnrollmentOutcome> {
        let form = self.check(form)?;
        let image = image::open(path)?;
        self.enroll(&form, &image)
    }
}

fn discard(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        tracing::warn!("Failed to remove {:?}: {}", path, e);
    }
}

/// Embeds the first detected face of `path`.
fn embed_image_file(pipeline: &mut FacePipeline, path: &Path) -> Result<Vec<f32>> {
    let image = image::open(path)?;
    let faces = pipeline.detect(&image)?;
    let face = faces.first().ok_or(FaceGateError::NoFaceDetected)?;
    pipeline.embed_face(&image, face, 0.0)
}

/// Rebuilds the gallery from every user's stored face image, one entry per
/// user. Users whose image is missing or unusable are skipped.
pub fn rebuild_gallery(store: &mut EnrollmentStore, pipeline: &mut FacePipeline, layout: &DataLayout) -> Result<usize> {
    let mut gallery = Gallery::new();

    for user in store.users() {
        let path = layout.resolve_face_path(&user.face_image_path);
        if !path.exists() {
            tracing::warn!("Face image for {} not found at {:?}", user.login, path);
            continue;
        }

        match embed_image_file(pipeline, &path).and_then(|vector| gallery.push(vector, user.display_name.as_str())) {
            Ok(()) => tracing::debug!("Embedded {} from {:?}", user.login, path),
            Err(e) => tracing::warn!("Skipping {}: {}", user.login, e),
        }
    }

    let count = gallery.len();
    store.replace_gallery(gallery)?;
    tracing::info!("Gallery rebuilt with {} of {} users", count, store.users().len());
    Ok(count)
}

/// Appends one embedding per usable image found under `root/<person>/`.
pub fn import_folder(store: &mut EnrollmentStore, pipeline: &mut FacePipeline, root: &Path) -> Result<usize> {
    if !root.is_dir() {
        return Err(FaceGateError::Storage(format!("Import directory not found: {:?}", root)));
    }

    let mut gallery = store.gallery().clone();
    let mut imported = 0;

    for person_dir in sorted_entries(root)?.into_iter().filter(|p| p.is_dir()) {
        let Some(person) = person_dir.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            continue;
        };

        let images = sorted_entries(&person_dir)?.into_iter().filter(|p| is_importable(p));
        for path in images {
            match embed_image_file(pipeline, &path).and_then(|vector| gallery.push(vector, person.as_str())) {
                Ok(()) => imported += 1,
                Err(e) => tracing::warn!("Skipping {:?}: {}", path, e),
            }
        }
    }

    if imported > 0 {
        store.replace_gallery(gallery)?;
    }
    tracing::info!("Imported {} embeddings from {:?}", imported, root);
    Ok(imported)
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()?;
    entries.sort();
    Ok(entries)
}

fn is_importable(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| IMPORT_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
            .unwrap_or(false)
}
