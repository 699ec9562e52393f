use crate::common::paths::{temp_sibling, write_replace};
use crate::common::{FaceGateError, Result};
use crate::core::recognizer::Embedding;
use ndarray::{Array1, Array2, Axis};
use ndarray_npy::{read_npy, write_npy};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq)]
pub struct GalleryEntry {
    pub vector: Embedding,
    pub owner_name: String,
}

/// Enrolled (vector, name) pairs in insertion order. All vectors share one
/// dimension, fixed by the first entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Gallery {
    entries: Vec<GalleryEntry>,
}

impl Gallery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[GalleryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dimension(&self) -> Option<usize> {
        self.entries.first().map(|e| e.vector.len())
    }

    pub fn push(&mut self, vector: Embedding, owner_name: impl Into<String>) -> Result<()> {
        if vector.is_empty() {
            return Err(FaceGateError::Storage("Refusing to store an empty embedding".into()));
        }
        if let Some(expected) = self.dimension() {
            if expected != vector.len() {
                return Err(FaceGateError::DimensionMismatch { expected, actual: vector.len() });
            }
        }
        self.entries.push(GalleryEntry { vector, owner_name: owner_name.into() });
        Ok(())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.owner_name.as_str())
    }
}

/// The two backing files: an f32 matrix with one row per entry and a JSON
/// array of owner names with the same order.
#[derive(Debug, Clone)]
pub struct GalleryFiles {
    pub vectors: PathBuf,
    pub names: PathBuf,
}

impl GalleryFiles {
    pub fn new(vectors: PathBuf, names: PathBuf) -> Self {
        Self { vectors, names }
    }

    pub fn exist(&self) -> bool {
        self.vectors.exists() && self.names.exists()
    }

    /// Never fails: missing or unreadable files give an empty gallery.
    pub fn load(&self) -> Gallery {
        if !self.exist() {
            tracing::info!("No saved embeddings at {:?}", self.vectors);
            return Gallery::new();
        }

        let matrix = match read_matrix(&self.vectors) {
            Ok(matrix) => matrix,
            Err(e) => {
                tracing::warn!("Failed to read embeddings {:?}: {}. Starting with an empty gallery.", self.vectors, e);
                return Gallery::new();
            }
        };

        let names: Vec<String> = match fs::read_to_string(&self.names)
            .map_err(|e| e.to_string())
            .and_then(|text| serde_json::from_str(&text).map_err(|e| e.to_string()))
        {
            Ok(names) => names,
            Err(e) => {
                tracing::warn!("Failed to read embedding names {:?}: {}. Starting with an empty gallery.", self.names, e);
                return Gallery::new();
            }
        };

        let rows = matrix.len_of(Axis(0));
        if rows != names.len() {
            tracing::warn!(
                "Embedding files out of step ({} vectors, {} names); keeping the first {}",
                rows,
                names.len(),
                rows.min(names.len())
            );
        }

        let entries = matrix
            .axis_iter(Axis(0))
            .zip(names)
            .map(|(row, owner_name)| GalleryEntry { vector: row.to_vec(), owner_name })
            .collect::<Vec<_>>();

        tracing::info!("Loaded {} embeddings", entries.len());
        Gallery { entries }
    }

    /// Rewrites both files in full.
    pub fn save(&self, gallery: &Gallery) -> Result<()> {
        if let Some(parent) = self.vectors.parent() {
            fs::create_dir_all(parent)?;
        }

        let dimension = gallery.dimension().unwrap_or(0);
        let flat: Vec<f32> = gallery.entries.iter().flat_map(|e| e.vector.iter().copied()).collect();
        let matrix = Array2::from_shape_vec((gallery.len(), dimension), flat)
            .map_err(|e| FaceGateError::Storage(format!("Failed to shape embedding matrix: {}", e)))?;

        let tmp = temp_sibling(&self.vectors);
        write_npy(&tmp, &matrix)
            .map_err(|e| FaceGateError::Storage(format!("Failed to write {:?}: {}", self.vectors, e)))?;
        fs::rename(&tmp, &self.vectors)?;

        let names: Vec<&str> = gallery.names().collect();
        let json = serde_json::to_vec_pretty(&names)
            .map_err(|e| FaceGateError::Storage(format!("Failed to serialize names: {}", e)))?;
        write_replace(&self.names, &json)?;

        tracing::debug!("Saved {} embeddings to {:?}", gallery.len(), self.vectors);
        Ok(())
    }
}

/// Accepts a 2-D matrix, or a 1-D array holding a single vector.
fn read_matrix(path: &Path) -> std::result::Result<Array2<f32>, String> {
    match read_npy::<_, Array2<f32>>(path) {
        Ok(matrix) => Ok(matrix),
        Err(matrix_err) => match read_npy::<_, Array1<f32>>(path) {
            Ok(row) => Ok(row.insert_axis(Axis(0))),
            Err(_) => Err(matrix_err.to_string()),
        },
    }
}
