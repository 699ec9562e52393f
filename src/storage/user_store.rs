use crate::common::paths::write_replace;
use crate::common::{FaceGateError, Result};
use serde::{Deserialize, Serialize};
use serde_json::ser::PrettyFormatter;
use std::fs;
use std::path::{Path, PathBuf};

/// One enrolled person. `login` is the identity key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    #[serde(rename = "nombre")]
    pub display_name: String,
    #[serde(rename = "usuario")]
    pub login: String,
    /// Stored as entered.
    #[serde(rename = "contrasena")]
    pub password: String,
    #[serde(rename = "rostro")]
    pub face_image_path: String,
}

/// The user list, persisted as one pretty-printed JSON array.
pub struct UserStore {
    path: PathBuf,
    users: Vec<UserRecord>,
}

impl UserStore {
    /// Reads the user file. A missing file is created as `[]`; an unreadable
    /// one is treated as empty and left untouched until the next append.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        if !path.exists() {
            tracing::info!("No user file at {:?}; creating an empty one", path);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let store = Self { path, users: Vec::new() };
            store.save()?;
            return Ok(store);
        }

        let users = match read_users(&path) {
            Ok(users) => users,
            Err(e) => {
                tracing::warn!("Failed to read users from {:?}: {}. Treating as empty.", path, e);
                Vec::new()
            }
        };

        tracing::debug!("Loaded {} users from {:?}", users.len(), path);
        Ok(Self { path, users })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn users(&self) -> &[UserRecord] {
        &self.users
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn find(&self, login: &str) -> Option<&UserRecord> {
        self.users.iter().find(|u| u.login == login)
    }

    pub fn contains_login(&self, login: &str) -> bool {
        self.find(login).is_some()
    }

    /// Appends and rewrites the whole file. An existing login is rejected
    /// without touching the file.
    pub fn append(&mut self, record: UserRecord) -> Result<()> {
        if self.contains_login(&record.login) {
            return Err(FaceGateError::DuplicateLogin(record.login));
        }

        self.users.push(record);
        if let Err(e) = self.save() {
            self.users.pop();
            return Err(e);
        }

        tracing::info!("Saved user {:?}", self.users.last().map(|u| &u.login));
        Ok(())
    }

    fn save(&self) -> Result<()> {
        let mut buf = Vec::new();
        let formatter = PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.users
            .serialize(&mut serializer)
            .map_err(|e| FaceGateError::Storage(format!("Failed to serialize users: {}", e)))?;
        write_replace(&self.path, &buf)
    }
}

fn read_users(path: &Path) -> std::result::Result<Vec<UserRecord>, String> {
    let text = fs::read_to_string(path).map_err(|e| e.to_string())?;
    serde_json::from_str(&text).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(name: &str, login: &str) -> UserRecord {
        UserRecord {
            display_name: name.into(),
            login: login.into(),
            password: "secreto".into(),
            face_image_path: format!("Datos/rostros/{}.png", login),
        }
    }

    #[test]
    fn missing_file_is_created_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Datos/usuarios.json");
        let store = UserStore::load(&path).unwrap();
        assert!(store.is_empty());
        assert_eq!(fs::read_to_string(&path).unwrap(), "[]");
    }

    #[test]
    fn uses_spanish_field_names() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("usuarios.json");
        let mut store = UserStore::load(&path).unwrap();
        store.append(record("Ana Pérez", "ana")).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"nombre\": \"Ana Pérez\""));
        assert!(text.contains("\"usuario\": \"ana\""));
        assert!(text.contains("\"contrasena\": \"secreto\""));
        assert!(text.contains("\"rostro\": \"Datos/rostros/ana.png\""));
        assert!(text.contains("\n        \"nombre\""));
    }

    #[test]
    fn duplicate_login_leaves_file_unchanged() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("usuarios.json");
        let mut store = UserStore::load(&path).unwrap();
        store.append(record("Ana", "ana")).unwrap();
        let before = fs::read_to_string(&path).unwrap();

        let err = store.append(record("Another Ana", "ana")).unwrap_err();
        assert!(matches!(err, FaceGateError::DuplicateLogin(ref login) if login == "ana"));
        assert_eq!(store.len(), 1);
        assert_eq!(fs::read_to_string(&path).unwrap(), before);
    }

    #[test]
    fn reload_reads_appended_users() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("usuarios.json");
        let mut store = UserStore::load(&path).unwrap();
        store.append(record("Ana", "ana")).unwrap();
        store.append(record("Bob", "bob")).unwrap();

        let reloaded = UserStore::load(&path).unwrap();
        assert_eq!(reloaded.users(), store.users());
        assert_eq!(reloaded.find("bob").unwrap().display_name, "Bob");
    }

    #[test]
    fn corrupt_file_is_treated_as_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("usuarios.json");
        fs::write(&path, "{ not json").unwrap();

        let store = UserStore::load(&path).unwrap();
        assert!(store.is_empty());
        assert_eq!(fs::read_to_string(&path).unwrap(), "{ not json");
    }
}
