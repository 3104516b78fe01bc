use crate::catalog::Catalog;
use crate::error::{Error, Result};
use crate::fingerprint::Fingerprint;
use crate::library::{write_file_atomic, FileEntry};
use serde::{Deserialize, Serialize};
use std::{
    ffi::OsString,
    fs, io,
    path::{Path, PathBuf},
};
use tracing::warn;

/// What gets handed to the engine: one IWAD plus PWADs in load order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionConfig {
    #[serde(default)]
    pub selected_base: Option<PathBuf>,
    #[serde(default)]
    pub selected_base_fingerprint: Option<Fingerprint>,
    #[serde(default)]
    pub selected_patches: Vec<PathBuf>,
}

impl SessionConfig {
    pub fn load(path: &Path) -> Self {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Self::default(),
            Err(err) => {
                warn!("Couldn't load last used game config from {}: {err}", path.display());
                return Self::default();
            }
        };
        serde_json::from_str(&raw).unwrap_or_else(|err| {
            warn!("Last used game config {} is malformed: {err}", path.display());
            Self::default()
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let raw = serde_json::to_vec_pretty(self)?;
        write_file_atomic(path, &raw)
    }

    pub fn select_base(&mut self, entry: &FileEntry) {
        self.selected_base = Some(entry.path.clone());
        self.selected_base_fingerprint = Some(entry.fingerprint);
    }

    pub fn clear_base(&mut self) {
        self.selected_base = None;
        self.selected_base_fingerprint = None;
    }

    pub fn is_patch_selected(&self, path: &Path) -> bool {
        self.selected_patches.iter().any(|selected| selected == path)
    }

    /// Checking appends to the end of the load order; unchecking removes.
    pub fn set_patch(&mut self, path: &Path, checked: bool) {
        if checked {
            if !self.is_patch_selected(path) {
                self.selected_patches.push(path.to_path_buf());
            }
        } else {
            self.selected_patches.retain(|selected| selected != path);
        }
    }

    pub fn move_patch(&mut self, from: usize, to: usize) {
        if from >= self.selected_patches.len() || to >= self.selected_patches.len() {
            return;
        }
        let item = self.selected_patches.remove(from);
        self.selected_patches.insert(to, item);
    }

    /// Called after a full rescan. Entries are matched by fingerprint and path
    /// together, never by position.
    pub fn resolve_after_refresh(&mut self, bases: &Catalog, patches: &Catalog) {
        if let Some(path) = self.selected_base.clone() {
            let still_there = bases.entries().iter().find(|entry| {
                entry.path == path
                    && self
                        .selected_base_fingerprint
                        .map_or(true, |fingerprint| fingerprint == entry.fingerprint)
            });
            match still_there {
                Some(entry) => self.selected_base_fingerprint = Some(entry.fingerprint),
                None => {
                    warn!("Selected IWAD {} is no longer available", path.display());
                    self.clear_base();
                }
            }
        }

        self.selected_patches.retain(|path| {
            let keep = patches.contains_path(path);
            if !keep {
                warn!("Selected PWAD {} is no longer available", path.display());
            }
            keep
        });
    }

    /// `-iwad <base>` followed by one `-file <pwad>` pair per selected patch.
    pub fn launch_args(&self) -> Result<Vec<OsString>> {
        let base = self.selected_base.as_ref().ok_or(Error::NoBaseSelected)?;
        let mut args = Vec::with_capacity(2 + self.selected_patches.len() * 2);
        args.push(OsString::from("-iwad"));
        args.push(base.clone().into_os_string());
        for patch in &self.selected_patches {
            args.push(OsString::from("-file"));
            args.push(patch.clone().into_os_string());
        }
        Ok(args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::DatasetKind;

    fn entry(path: &str, kind: DatasetKind) -> FileEntry {
        FileEntry::new(
            PathBuf::from(path),
            Fingerprint::of_bytes(path.as_bytes()),
            kind,
        )
    }

    #[test]
    fn launch_args_follow_selection_order() {
        let mut session = SessionConfig::default();
        session.select_base(&entry("/wads/doom2.wad", DatasetKind::BaseDataset));
        session.set_patch(Path::new("/wads/b.wad"), true);
        session.set_patch(Path::new("/wads/a.pk3"), true);
        session.set_patch(Path::new("/wads/b.wad"), true);

        let args = session.launch_args().unwrap();

        assert_eq!(
            args,
            ["-iwad", "/wads/doom2.wad", "-file", "/wads/b.wad", "-file", "/wads/a.pk3"]
                .iter()
                .map(OsString::from)
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn launch_requires_a_base() {
        let session = SessionConfig::default();
        assert!(matches!(session.launch_args(), Err(Error::NoBaseSelected)));
    }

    #[test]
    fn unchecking_and_reordering() {
        let mut session = SessionConfig::default();
        for path in ["/a.wad", "/b.wad", "/c.wad"] {
            session.set_patch(Path::new(path), true);
        }
        session.set_patch(Path::new("/b.wad"), false);
        session.move_patch(1, 0);
        session.move_patch(5, 0);

        assert_eq!(
            session.selected_patches,
            vec![PathBuf::from("/c.wad"), PathBuf::from("/a.wad")]
        );
    }

    #[test]
    fn refresh_keeps_only_matching_selection() {
        let doom2 = entry("/wads/doom2.wad", DatasetKind::BaseDataset);
        let sunlust = entry("/wads/sunlust.wad", DatasetKind::Patch);
        let mut session = SessionConfig::default();
        session.select_base(&doom2);
        session.set_patch(&sunlust.path, true);
        session.set_patch(Path::new("/wads/gone.wad"), true);

        let bases = Catalog::from_entries(DatasetKind::BaseDataset, [doom2.clone()]);
        let patches = Catalog::from_entries(DatasetKind::Patch, [sunlust.clone()]);
        session.resolve_after_refresh(&bases, &patches);

        assert_eq!(session.selected_base.as_ref(), Some(&doom2.path));
        assert_eq!(session.selected_patches, vec![sunlust.path.clone()]);

        let mut changed = doom2.clone();
        changed.fingerprint = Fingerprint::of_bytes(b"patched iwad");
        let bases = Catalog::from_entries(DatasetKind::BaseDataset, [changed]);
        session.resolve_after_refresh(&bases, &patches);

        assert_eq!(session.selected_base, None);
        assert_eq!(session.selected_base_fingerprint, None);
    }

    #[test]
    fn save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let mut session = SessionConfig::default();
        session.select_base(&entry("/wads/doom.wad", DatasetKind::BaseDataset));
        session.set_patch(Path::new("/wads/x.wad"), true);
        session.save(&path).unwrap();

        assert_eq!(SessionConfig::load(&path), session);

        fs::write(&path, "nope").unwrap();
        assert_eq!(SessionConfig::load(&path), SessionConfig::default());
    }
}
