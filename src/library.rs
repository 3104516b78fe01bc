use crate::error::{Error, Result};
use crate::fingerprint::Fingerprint;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

pub const DEFAULT_CATEGORY: &str = "Unsorted";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DatasetKind {
    /// Standalone game data (IWAD).
    BaseDataset,
    /// Add-on that loads on top of a base dataset (PWAD).
    Patch,
}

impl DatasetKind {
    pub fn label(self) -> &'static str {
        match self {
            DatasetKind::BaseDataset => "IWAD",
            DatasetKind::Patch => "PWAD",
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FileEntry {
    pub path: PathBuf,
    pub fingerprint: Fingerprint,
    pub kind: DatasetKind,
    pub category: String,
}

impl FileEntry {
    pub fn new(path: PathBuf, fingerprint: Fingerprint, kind: DatasetKind) -> Self {
        Self {
            path,
            fingerprint,
            kind,
            category: DEFAULT_CATEGORY.to_string(),
        }
    }

    pub fn name(&self) -> String {
        display_name(&self.path)
    }

    pub fn is_patch(&self) -> bool {
        matches!(self.kind, DatasetKind::Patch)
    }
}

pub fn display_name(path: &Path) -> String {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.to_string())
        .unwrap_or_else(|| path.display().to_string())
}

pub fn is_hidden_name(name: &str) -> bool {
    name.starts_with('.')
}

/// Writes through a sibling `.tmp` file; a failed write leaves the previous
/// contents in place.
pub fn write_file_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|err| Error::io(parent, err))?;
        }
    }
    let mut temp_name = path.as_os_str().to_os_string();
    temp_name.push(".tmp");
    let temp = PathBuf::from(temp_name);
    fs::write(&temp, contents).map_err(|err| Error::io(&temp, err))?;
    if let Err(err) = fs::rename(&temp, path) {
        let _ = fs::remove_file(&temp);
        return Err(Error::io(path, err));
    }
    Ok(())
}
