pub mod gallery;
pub mod user_store;

pub use gallery::{Gallery, GalleryEntry, GalleryFiles};
pub use user_store::{UserRecord, UserStore};

use crate::common::{DataLayout, RecognizerBackend, Result};
use crate::core::recognizer::Embedding;
use std::collections::HashSet;

/// Gallery names with no matching user, and users with no gallery entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntegrityReport {
    pub orphaned_embeddings: Vec<String>,
    pub users_without_embeddings: Vec<String>,
}

impl IntegrityReport {
    pub fn is_consistent(&self) -> bool {
        self.orphaned_embeddings.is_empty() && self.users_without_embeddings.is_empty()
    }
}

/// User records plus the embedding gallery of one recognizer backend.
pub struct EnrollmentStore {
    users: UserStore,
    gallery: Gallery,
    gallery_files: GalleryFiles,
}

impl EnrollmentStore {
    pub fn load(layout: &DataLayout, backend: RecognizerBackend) -> Result<Self> {
        layout.ensure_dirs()?;
        let (vectors, names) = layout.gallery_files(backend);
        let gallery_files = GalleryFiles::new(vectors, names);

        let store = Self {
            users: UserStore::load(layout.users_file())?,
            gallery: gallery_files.load(),
            gallery_files,
        };
        store.log_audit();
        Ok(store)
    }

    /// Re-reads both collections from disk.
    pub fn reload(&mut self) -> Result<()> {
        self.users = UserStore::load(self.users.path().to_path_buf())?;
        self.gallery = self.gallery_files.load();
        self.log_audit();
        Ok(())
    }

    pub fn users(&self) -> &[UserRecord] {
        self.users.users()
    }

    pub fn gallery(&self) -> &Gallery {
        &self.gallery
    }

    pub fn has_saved_gallery(&self) -> bool {
        self.gallery_files.exist()
    }

    pub fn contains_login(&self, login: &str) -> bool {
        self.users.contains_login(login)
    }

    pub fn append_user(&mut self, record: UserRecord) -> Result<()> {
        self.users.append(record)
    }

    /// Appends one entry and rewrites both gallery files. The owner name is
    /// not checked against the user list.
    pub fn append_embedding(&mut self, vector: Embedding, owner_name: &str) -> Result<()> {
        self.gallery.push(vector, owner_name)?;
        if let Err(e) = self.gallery_files.save(&self.gallery) {
            // Keep memory in step with what is on disk
            self.gallery = self.gallery_files.load();
            return Err(e);
        }
        Ok(())
    }

    /// Replaces the gallery wholesale and saves it.
    pub fn replace_gallery(&mut self, gallery: Gallery) -> Result<()> {
        self.gallery_files.save(&gallery)?;
        self.gallery = gallery;
        Ok(())
    }

    pub fn audit(&self) -> IntegrityReport {
        let display_names: HashSet<&str> = self.users().iter().map(|u| u.display_name.as_str()).collect();
        let owners: HashSet<&str> = self.gallery.names().collect();

        let mut orphaned: Vec<String> = owners
            .iter()
            .filter(|name| !display_names.contains(*name))
            .map(|name| name.to_string())
            .collect();
        orphaned.sort();

        let users_without_embeddings = self
            .users()
            .iter()
            .filter(|u| !owners.contains(u.display_name.as_str()))
            .map(|u| u.login.clone())
            .collect();

        IntegrityReport { orphaned_embeddings: orphaned, users_without_embeddings }
    }

    fn log_audit(&self) {
        let report = self.audit();
        if !report.orphaned_embeddings.is_empty() {
            tracing::warn!("Embeddings with no registered user: {:?}", report.orphaned_embeddings);
        }
        if !report.users_without_embeddings.is_empty() {
            tracing::warn!("Users with no stored embedding: {:?}", report.users_without_embeddings);
        }
    }
}
