use crate::error::{Error, Result};
use crate::fingerprint::Fingerprint;
use crate::library::{write_file_atomic, DatasetKind, FileEntry};
use serde::{Deserialize, Serialize};
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use tracing::{debug, warn};

/// On-disk record: `[fingerprint, path, category]`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct CatalogRecord(String, PathBuf, String);

/// One kind of dataset, unique by fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    kind: DatasetKind,
    entries: Vec<FileEntry>,
}

#[derive(Debug, Default)]
pub struct LoadReport {
    pub loaded: usize,
    pub dropped: Vec<Error>,
}

impl Catalog {
    pub fn new(kind: DatasetKind) -> Self {
        Self {
            kind,
            entries: Vec::new(),
        }
    }

    pub fn from_entries(kind: DatasetKind, entries: impl IntoIterator<Item = FileEntry>) -> Self {
        let mut catalog = Self::new(kind);
        for entry in entries {
            catalog.insert(entry);
        }
        catalog
    }

    pub fn entries(&self) -> &[FileEntry] {
        &self.entries
    }

    pub fn entries_mut(&mut self) -> &mut [FileEntry] {
        &mut self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Replaces any entry with the same fingerprint.
    pub fn insert(&mut self, mut entry: FileEntry) {
        entry.kind = self.kind;
        match self
            .entries
            .iter_mut()
            .find(|existing| existing.fingerprint == entry.fingerprint)
        {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    pub fn find_by_fingerprint(&self, fingerprint: &Fingerprint) -> Option<&FileEntry> {
        self.entries
            .iter()
            .find(|entry| entry.fingerprint == *fingerprint)
    }

    pub fn find_by_path(&self, path: &Path) -> Option<&FileEntry> {
        self.entries.iter().find(|entry| entry.path == path)
    }

    pub fn contains_path(&self, path: &Path) -> bool {
        self.find_by_path(path).is_some()
    }

    /// Fingerprints a file picked by hand and adds it without inspecting it.
    pub fn add_file(&mut self, path: &Path, category: &str) -> Result<&FileEntry> {
        let path = fs::canonicalize(path).map_err(|err| Error::io(path, err))?;
        let fingerprint = Fingerprint::of_file(&path)?;
        let mut entry = FileEntry::new(path, fingerprint, self.kind);
        entry.category = category.to_string();
        self.insert(entry);
        self.find_by_fingerprint(&fingerprint)
            .ok_or(Error::InvalidFingerprint(fingerprint.to_hex()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let records: Vec<CatalogRecord> = self
            .entries
            .iter()
            .map(|entry| {
                CatalogRecord(
                    entry.fingerprint.to_hex(),
                    entry.path.clone(),
                    entry.category.clone(),
                )
            })
            .collect();
        let raw = serde_json::to_vec(&records)?;
        write_file_atomic(path, &raw)
    }

    /// Every record is re-hashed; anything missing, modified or unparsable is
    /// dropped and reported. An absent or unreadable file is an empty catalog.
    pub fn load(path: &Path, kind: DatasetKind) -> (Self, LoadReport) {
        let mut catalog = Self::new(kind);
        let mut report = LoadReport::default();

        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return (catalog, report),
            Err(err) => {
                warn!("Couldn't load {} list from {}: {err}", kind.label(), path.display());
                return (catalog, report);
            }
        };
        let records: Vec<CatalogRecord> = match serde_json::from_str(&raw) {
            Ok(records) => records,
            Err(err) => {
                warn!(
                    "Couldn't parse {} list {}: {err}",
                    kind.label(),
                    path.display()
                );
                return (catalog, report);
            }
        };

        for CatalogRecord(hex, file, category) in records {
            match revalidate(&hex, &file) {
                Ok(fingerprint) => {
                    let mut entry = FileEntry::new(file, fingerprint, kind);
                    entry.category = category;
                    catalog.insert(entry);
                }
                Err(err) => {
                    warn!("{err}");
                    report.dropped.push(err);
                }
            }
        }

        report.loaded = catalog.len();
        debug!(
            "Loaded {} {}(s) from {} ({} dropped)",
            report.loaded,
            kind.label(),
            path.display(),
            report.dropped.len()
        );
        (catalog, report)
    }
}

fn revalidate(hex: &str, path: &Path) -> Result<Fingerprint> {
    if !path.exists() {
        return Err(Error::MissingFile {
            path: path.to_path_buf(),
        });
    }
    let actual = Fingerprint::of_file(path)?;
    let expected: Fingerprint = hex.parse().map_err(|_| Error::ChecksumMismatch {
        path: path.to_path_buf(),
        expected: hex.to_string(),
        actual: actual.to_hex(),
    })?;
    if expected != actual {
        return Err(Error::ChecksumMismatch {
            path: path.to_path_buf(),
            expected: expected.to_hex(),
            actual: actual.to_hex(),
        });
    }
    Ok(actual)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inspect::tests::write_wad;
    use crate::library::DEFAULT_CATEGORY;

    fn entry_for(path: PathBuf, category: &str) -> FileEntry {
        let fingerprint = Fingerprint::of_file(&path).unwrap();
        let mut entry = FileEntry::new(path, fingerprint, DatasetKind::Patch);
        entry.category = category.to_string();
        entry
    }

    fn triples(catalog: &Catalog) -> Vec<(String, PathBuf, String)> {
        let mut out: Vec<_> = catalog
            .entries()
            .iter()
            .map(|entry| {
                (
                    entry.fingerprint.to_hex(),
                    entry.path.clone(),
                    entry.category.clone(),
                )
            })
            .collect();
        out.sort();
        out
    }

    #[test]
    fn save_then_load_keeps_every_record() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_wad(dir.path(), "a.wad", b"PWAD");
        let b = write_wad(dir.path(), "b.wad", b"PWAD");
        let catalog = Catalog::from_entries(
            DatasetKind::Patch,
            [entry_for(a, "Maps"), entry_for(b, DEFAULT_CATEGORY)],
        );
        let store = dir.path().join("pwads.json");

        catalog.save(&store).unwrap();
        let (loaded, report) = Catalog::load(&store, DatasetKind::Patch);

        assert!(report.dropped.is_empty());
        assert_eq!(report.loaded, 2);
        assert_eq!(triples(&loaded), triples(&catalog));
        assert!(!dir.path().join("pwads.json.tmp").exists());
    }

    #[test]
    fn persisted_form_is_array_of_triples() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_wad(dir.path(), "a.wad", b"IWAD");
        let fingerprint = Fingerprint::of_file(&a).unwrap();
        let catalog = Catalog::from_entries(
            DatasetKind::BaseDataset,
            [FileEntry::new(a.clone(), fingerprint, DatasetKind::BaseDataset)],
        );
        let store = dir.path().join("iwads.json");
        catalog.save(&store).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&store).unwrap()).unwrap();
        assert_eq!(
            value,
            serde_json::json!([[fingerprint.to_hex(), a, DEFAULT_CATEGORY]])
        );
    }

    #[test]
    fn missing_file_is_dropped_without_aborting() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_wad(dir.path(), "a.wad", b"PWAD");
        let b = write_wad(dir.path(), "b.wad", b"PWAD");
        let catalog = Catalog::from_entries(
            DatasetKind::Patch,
            [entry_for(a, DEFAULT_CATEGORY), entry_for(b.clone(), DEFAULT_CATEGORY)],
        );
        let store = dir.path().join("pwads.json");
        catalog.save(&store).unwrap();
        fs::remove_file(&b).unwrap();

        let (loaded, report) = Catalog::load(&store, DatasetKind::Patch);

        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.entries()[0].name(), "a.wad");
        assert_eq!(report.dropped.len(), 1);
        assert!(matches!(&report.dropped[0], Error::MissingFile { path } if *path == b));
    }

    #[test]
    fn modified_file_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_wad(dir.path(), "a.wad", b"PWAD");
        let catalog = Catalog::from_entries(DatasetKind::Patch, [entry_for(a.clone(), "Maps")]);
        let store = dir.path().join("pwads.json");
        catalog.save(&store).unwrap();
        fs::write(&a, b"PWAD but different now").unwrap();

        let (loaded, report) = Catalog::load(&store, DatasetKind::Patch);

        assert!(loaded.is_empty());
        assert!(matches!(
            report.dropped.as_slice(),
            [Error::ChecksumMismatch { .. }]
        ));
    }

    #[test]
    fn bad_fingerprint_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_wad(dir.path(), "a.wad", b"PWAD");
        let store = dir.path().join("pwads.json");
        fs::write(
            &store,
            serde_json::to_string(&serde_json::json!([["not-a-hash", a, "Maps"]])).unwrap(),
        )
        .unwrap();

        let (loaded, report) = Catalog::load(&store, DatasetKind::Patch);

        assert!(loaded.is_empty());
        assert_eq!(report.dropped.len(), 1);
    }

    #[test]
    fn absent_or_garbage_store_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = dir.path().join("iwads.json");
        let (loaded, _) = Catalog::load(&store, DatasetKind::BaseDataset);
        assert!(loaded.is_empty());

        fs::write(&store, "[[1, 2").unwrap();
        let (loaded, report) = Catalog::load(&store, DatasetKind::BaseDataset);
        assert!(loaded.is_empty());
        assert!(report.dropped.is_empty());
    }

    #[test]
    fn insert_deduplicates_by_fingerprint() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_wad(dir.path(), "a.wad", b"PWAD");
        let copy = dir.path().join("copy.wad");
        fs::copy(&a, &copy).unwrap();
        let mut catalog = Catalog::new(DatasetKind::Patch);

        catalog.insert(entry_for(a, DEFAULT_CATEGORY));
        catalog.insert(entry_for(copy.clone(), DEFAULT_CATEGORY));

        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.entries()[0].path, copy);
    }

    #[test]
    fn add_file_fingerprints_and_inserts() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_wad(dir.path(), "doom.wad", b"IWAD");
        let mut catalog = Catalog::new(DatasetKind::BaseDataset);

        let fingerprint = catalog.add_file(&a, DEFAULT_CATEGORY).unwrap().fingerprint;

        assert_eq!(fingerprint, Fingerprint::of_file(&a).unwrap());
        assert!(catalog.find_by_fingerprint(&fingerprint).is_some());
        assert!(catalog
            .add_file(&dir.path().join("missing.wad"), DEFAULT_CATEGORY)
            .is_err());
    }
}
