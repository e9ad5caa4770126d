//! Directory-backed medium: one JSON file per key
//!
//! File names are the SHA-256 of the key so identities (emails) never reach
//! the filesystem verbatim.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use super::KeyValueMedium;
use crate::error::MediumError;

#[derive(Debug, Clone)]
pub struct DirMedium {
    root: PathBuf,
}

impl DirMedium {
    /// The directory is created on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File holding the value for `key`
    pub fn path_for(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        let name: String = digest.iter().map(|b| format!("{b:02x}")).collect();
        self.root.join(format!("{name}.json"))
    }
}

impl KeyValueMedium for DirMedium {
    fn get(&self, key: &str) -> Result<Option<String>, MediumError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Write-to-temp-then-rename so a crash never leaves a torn record.
    fn set(&mut self, key: &str, value: &str) -> Result<(), MediumError> {
        fs::create_dir_all(&self.root)?;
        let path = self.path_for(key);
        let temp = path.with_extension("json.tmp");
        fs::write(&temp, value)?;
        fs::rename(&temp, &path)?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), MediumError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
