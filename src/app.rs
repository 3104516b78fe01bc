use crate::catalog::Catalog;
use crate::category::CategoryIndex;
use crate::config::{
    base_data_dir, Preferences, CATEGORY_FILE, IWAD_LIST_FILE, PWAD_LIST_FILE, SESSION_FILE,
};
use crate::engine::{self, PathShortcuts};
use crate::inspect;
use crate::library::{DatasetKind, FileEntry};
use crate::scanner::{self, PatchTree, ProgressCallback, ScanOptions, ScanOutcome};
use crate::session::SessionConfig;
use anyhow::{anyhow, bail, Context, Result};
use std::{
    fs,
    path::{Path, PathBuf},
    process::{Command, ExitStatus},
};
use tracing::info;

/// Everything the launcher knows, owned in one place and persisted by
/// [`App::shutdown`].
pub struct App {
    pub data_dir: PathBuf,
    pub prefs: Preferences,
    pub session: SessionConfig,
    pub bases: Catalog,
    pub patches: Catalog,
    pub patch_tree: PatchTree,
    pub categories: CategoryIndex,
}

impl App {
    pub fn initialize() -> Result<Self> {
        Self::initialize_at(base_data_dir()?)
    }

    pub fn initialize_at(data_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&data_dir).context("create app data dir")?;
        let prefs = Preferences::load_or_create(&data_dir)?;
        let mut session = SessionConfig::load(&data_dir.join(SESSION_FILE));
        let (bases, base_report) =
            Catalog::load(&data_dir.join(IWAD_LIST_FILE), DatasetKind::BaseDataset);
        let (mut patches, patch_report) =
            Catalog::load(&data_dir.join(PWAD_LIST_FILE), DatasetKind::Patch);
        info!(
            "Restored {} IWAD(s) and {} PWAD(s), dropped {} stale record(s)",
            base_report.loaded,
            patch_report.loaded,
            base_report.dropped.len() + patch_report.dropped.len()
        );
        let mut categories = CategoryIndex::load(&data_dir.join(CATEGORY_FILE));
        categories.apply(patches.entries_mut());
        session.resolve_after_refresh(&bases, &patches);

        Ok(Self {
            data_dir,
            prefs,
            session,
            bases,
            patches,
            patch_tree: PatchTree::default(),
            categories,
        })
    }

    /// Full rebuild of both collections from the configured scan roots.
    pub fn refresh(&mut self, progress: Option<ProgressCallback>) -> ScanOutcome {
        self.bases.clear();
        self.patches.clear();
        self.patch_tree.clear();

        let mut options = if self.prefs.general.recursive_scan {
            ScanOptions::recursive()
        } else {
            ScanOptions::default()
        };
        options.progress = progress;
        let outcome = scanner::scan(&self.prefs.scan_roots(), &options, &mut self.categories);

        self.bases = Catalog::from_entries(DatasetKind::BaseDataset, outcome.bases.iter().cloned());
        self.patches = Catalog::from_entries(
            DatasetKind::Patch,
            outcome.patches.files().into_iter().cloned(),
        );
        self.patch_tree = outcome.patches.clone();
        self.session.resolve_after_refresh(&self.bases, &self.patches);
        outcome
    }

    pub fn add_file(&mut self, path: &Path, kind: DatasetKind) -> Result<FileEntry> {
        let entry = match kind {
            DatasetKind::BaseDataset => self
                .bases
                .add_file(path, self.categories.default_category())?
                .clone(),
            DatasetKind::Patch => {
                let category = self.categories.lookup(&crate::library::display_name(path));
                self.patches.add_file(path, &category)?.clone()
            }
        };
        info!("Added {} {}", kind.label(), entry.path.display());
        if kind == DatasetKind::BaseDataset && self.session.selected_base.is_none() {
            self.session.select_base(&entry);
        }
        Ok(entry)
    }

    /// Manual add where the kind comes from inspecting the file.
    pub fn add_detected_file(&mut self, path: &Path) -> Result<FileEntry> {
        if !inspect::is_candidate(path) {
            bail!("{} is not a WAD or PK3", path.display());
        }
        let kind = inspect::classify(path).into_result(path)?;
        self.add_file(path, kind)
    }

    pub fn select_base(&mut self, path: &Path) -> Result<()> {
        let entry = find_entry(&self.bases, path)
            .ok_or_else(|| anyhow!("Unknown IWAD: {}", path.display()))?
            .clone();
        self.session.select_base(&entry);
        Ok(())
    }

    pub fn set_patch(&mut self, path: &Path, checked: bool) -> Result<()> {
        let path = find_entry(&self.patches, path)
            .map(|entry| entry.path.clone())
            .ok_or_else(|| anyhow!("Unknown PWAD: {}", path.display()))?;
        self.session.set_patch(&path, checked);
        Ok(())
    }

    pub fn assign_category(&mut self, name: &str, category: &str) -> Result<()> {
        self.categories.assign(name, category)?;
        self.reconcile_categories();
        Ok(())
    }

    pub fn rename_category(&mut self, old: &str, new: &str) -> Result<()> {
        self.categories.rename(old, new)?;
        self.reconcile_categories();
        Ok(())
    }

    pub fn delete_category(&mut self, category: &str) -> Result<()> {
        self.categories.delete(category)?;
        self.reconcile_categories();
        Ok(())
    }

    fn reconcile_categories(&mut self) {
        self.categories.apply(self.patches.entries_mut());
        self.categories.apply(self.patch_tree.files_mut());
    }

    /// Adds the engine's own IWAD/file search directories to the scan roots.
    pub fn import_engine_search_dirs(&mut self) -> Result<Vec<PathBuf>> {
        let engine_dir = self.prefs.general.engine_dir.clone();
        let user = engine::current_user().context("resolve current user name")?;
        let shortcuts = PathShortcuts::from_env(&engine_dir);
        let dirs = engine::search_dirs_from_ini(&engine_dir, &user, &shortcuts)
            .context("Couldn't read the source port's config file")?;
        let added = dirs
            .into_iter()
            .filter(|dir| self.prefs.add_scan_root(dir))
            .collect();
        Ok(added)
    }

    pub fn launch_command(&self) -> Result<Command> {
        Ok(engine::build_command(
            &self.prefs.executable_path(),
            &self.session,
        )?)
    }

    pub fn launch(&self) -> Result<ExitStatus> {
        Ok(engine::launch(&self.prefs.executable_path(), &self.session)?)
    }

    pub fn shutdown(&self) -> Result<()> {
        self.prefs.save(&self.data_dir)?;
        self.session
            .save(&self.data_dir.join(SESSION_FILE))
            .context("save session")?;
        self.bases
            .save(&self.data_dir.join(IWAD_LIST_FILE))
            .context("save IWAD list")?;
        self.patches
            .save(&self.data_dir.join(PWAD_LIST_FILE))
            .context("save PWAD list")?;
        self.categories
            .save(&self.data_dir.join(CATEGORY_FILE))
            .context("save category list")?;
        Ok(())
    }
}

/// Accepts either the stored path or anything that canonicalizes to it.
fn find_entry<'a>(catalog: &'a Catalog, path: &Path) -> Option<&'a FileEntry> {
    catalog.find_by_path(path).or_else(|| {
        fs::canonicalize(path)
            .ok()
            .and_then(|canonical| catalog.find_by_path(&canonical))
    })
}
