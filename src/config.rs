use anyhow::{Context, Result};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::warn;

pub const PREFS_FILE: &str = "prefs.json";
pub const SESSION_FILE: &str = "session.json";
pub const IWAD_LIST_FILE: &str = "iwads.json";
pub const PWAD_LIST_FILE: &str = "pwads.json";
pub const CATEGORY_FILE: &str = "categories.json";
pub const LOG_FILE: &str = "wadsmith.log";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Preferences {
    #[serde(default)]
    pub general: GeneralPrefs,
    #[serde(default)]
    pub scan_paths: ScanPaths,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GeneralPrefs {
    #[serde(default)]
    pub engine_dir: PathBuf,
    #[serde(default = "default_executable")]
    pub executable: String,
    #[serde(default = "default_true")]
    pub recursive_scan: bool,
}

impl Default for GeneralPrefs {
    fn default() -> Self {
        Self {
            engine_dir: PathBuf::new(),
            executable: default_executable(),
            recursive_scan: true,
        }
    }
}

/// Scan roots, one per line.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScanPaths {
    #[serde(default)]
    pub path: String,
}

impl Preferences {
    pub fn load_or_create(data_dir: &Path) -> Result<Self> {
        fs::create_dir_all(data_dir).context("create app data dir")?;
        let path = data_dir.join(PREFS_FILE);
        if path.exists() {
            let raw = fs::read_to_string(&path).context("read preferences")?;
            return Ok(serde_json::from_str(&raw).unwrap_or_else(|err| {
                warn!("Couldn't read preferences file ({err}), using default settings.");
                Preferences::default()
            }));
        }

        let prefs = Preferences::default();
        prefs.save(data_dir)?;
        Ok(prefs)
    }

    pub fn save(&self, data_dir: &Path) -> Result<()> {
        let raw = serde_json::to_vec_pretty(self).context("serialize preferences")?;
        crate::library::write_file_atomic(&data_dir.join(PREFS_FILE), &raw)
            .context("write preferences")?;
        Ok(())
    }

    pub fn scan_roots(&self) -> Vec<PathBuf> {
        self.scan_paths
            .path
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(PathBuf::from)
            .collect()
    }

    pub fn set_scan_roots(&mut self, roots: &[PathBuf]) {
        self.scan_paths.path = roots
            .iter()
            .map(|root| root.display().to_string())
            .collect::<Vec<String>>()
            .join("\n");
    }

    /// Returns false when the root was already listed.
    pub fn add_scan_root(&mut self, root: &Path) -> bool {
        let mut roots = self.scan_roots();
        if roots.iter().any(|existing| existing == root) {
            return false;
        }
        roots.push(root.to_path_buf());
        self.set_scan_roots(&roots);
        true
    }

    pub fn remove_scan_root(&mut self, root: &Path) -> bool {
        let mut roots = self.scan_roots();
        let before = roots.len();
        roots.retain(|existing| existing != root);
        let removed = roots.len() != before;
        self.set_scan_roots(&roots);
        removed
    }

    pub fn executable_path(&self) -> PathBuf {
        self.general.engine_dir.join(&self.general.executable)
    }
}

fn default_executable() -> String {
    if cfg!(windows) {
        "gzdoom.exe".to_string()
    } else {
        "gzdoom".to_string()
    }
}

fn default_true() -> bool {
    true
}

pub fn base_data_dir() -> Result<PathBuf> {
    let base = BaseDirs::new().context("resolve home dir")?;
    Ok(base.data_local_dir().join("wadsmith"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_roots_skip_blank_lines() {
        let mut prefs = Preferences::default();
        prefs.scan_paths.path = "/wads\n\n  /more/wads  \n".to_string();
        assert_eq!(
            prefs.scan_roots(),
            vec![PathBuf::from("/wads"), PathBuf::from("/more/wads")]
        );
    }

    #[test]
    fn add_and_remove_roots() {
        let mut prefs = Preferences::default();
        assert!(prefs.add_scan_root(Path::new("/wads")));
        assert!(prefs.add_scan_root(Path::new("/pwads")));
        assert!(!prefs.add_scan_root(Path::new("/wads")));
        assert_eq!(prefs.scan_paths.path, "/wads\n/pwads");

        assert!(prefs.remove_scan_root(Path::new("/wads")));
        assert!(!prefs.remove_scan_root(Path::new("/wads")));
        assert_eq!(prefs.scan_roots(), vec![PathBuf::from("/pwads")]);
    }

    #[test]
    fn load_or_create_writes_defaults_once() {
        let dir = tempfile::tempdir().unwrap();
        let prefs = Preferences::load_or_create(dir.path()).unwrap();
        assert_eq!(prefs, Preferences::default());
        assert!(dir.path().join(PREFS_FILE).exists());

        let mut changed = prefs.clone();
        changed.general.engine_dir = PathBuf::from("/opt/gzdoom");
        changed.save(dir.path()).unwrap();
        assert_eq!(Preferences::load_or_create(dir.path()).unwrap(), changed);
    }

    #[test]
    fn malformed_prefs_fall_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(PREFS_FILE), "{{{").unwrap();
        assert_eq!(
            Preferences::load_or_create(dir.path()).unwrap(),
            Preferences::default()
        );
    }
}
