use std::fs;
use std::path::{Path, PathBuf};
use crate::common::config::RecognizerBackend;
use crate::common::error::Result;

/// On-disk layout of the enrollment data, anchored at one data directory.
#[derive(Debug, Clone)]
pub struct DataLayout {
    root: PathBuf,
}

impl DataLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Creates the data, faces and embeddings directories if missing.
    pub fn ensure_dirs(&self) -> Result<()> {
        fs::create_dir_all(&self.root)?;
        fs::create_dir_all(self.faces_dir())?;
        fs::create_dir_all(self.embeddings_dir())?;
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn users_file(&self) -> PathBuf {
        self.root.join("usuarios.json")
    }

    pub fn faces_dir(&self) -> PathBuf {
        self.root.join("rostros")
    }

    pub fn embeddings_dir(&self) -> PathBuf {
        self.root.join("embeddings")
    }

    pub fn face_image_path(&self, login: &str) -> PathBuf {
        self.faces_dir().join(format!("{}.png", login))
    }

    /// Vector matrix and name list for one recognizer backend.
    pub fn gallery_files(&self, backend: RecognizerBackend) -> (PathBuf, PathBuf) {
        let dir = self.embeddings_dir();
        match backend {
            RecognizerBackend::Onnx => (dir.join("embeddings.npy"), dir.join("nombres.json")),
            RecognizerBackend::Lbph => (dir.join("lbph_embeddings.npy"), dir.join("lbph_nombres.json")),
        }
    }

    /// Stored face paths are kept relative to the directory that contains the
    /// data root, so `Datos/rostros/ana.png` resolves the same from any cwd
    /// that uses the same layout.
    pub fn resolve_face_path(&self, stored: &str) -> PathBuf {
        let stored = Path::new(stored);
        if stored.is_absolute() || stored.exists() {
            return stored.to_path_buf();
        }
        match self.root.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.join(stored),
            _ => stored.to_path_buf(),
        }
    }
}

/// Writes `contents` next to `path` and renames it into place.
pub fn write_replace(path: &Path, contents: &[u8]) -> Result<()> {
    let tmp = temp_sibling(path);
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

pub fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
