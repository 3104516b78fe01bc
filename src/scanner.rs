use crate::category::CategoryIndex;
use crate::fingerprint::Fingerprint;
use crate::inspect::{self, ContainerFormat};
use crate::library::{display_name, is_hidden_name, DatasetKind, FileEntry};
use serde::Serialize;
use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Instant,
};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TreeNode {
    File(FileEntry),
    Directory(DirectoryNode),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirectoryNode {
    pub name: String,
    pub path: PathBuf,
    pub children: Vec<TreeNode>,
}

impl DirectoryNode {
    pub fn new(path: &Path) -> Self {
        Self {
            name: display_name(path),
            path: path.to_path_buf(),
            children: Vec::new(),
        }
    }

    /// Depth-first, in scan order.
    pub fn files(&self) -> Vec<&FileEntry> {
        let mut out = Vec::new();
        self.collect_files(&mut out);
        out
    }

    fn collect_files<'a>(&'a self, out: &mut Vec<&'a FileEntry>) {
        for child in &self.children {
            match child {
                TreeNode::File(entry) => out.push(entry),
                TreeNode::Directory(dir) => dir.collect_files(out),
            }
        }
    }

    pub fn files_mut(&mut self) -> Vec<&mut FileEntry> {
        let mut out = Vec::new();
        self.collect_files_mut(&mut out);
        out
    }

    fn collect_files_mut<'a>(&'a mut self, out: &mut Vec<&'a mut FileEntry>) {
        for child in &mut self.children {
            match child {
                TreeNode::File(entry) => out.push(entry),
                TreeNode::Directory(dir) => dir.collect_files_mut(out),
            }
        }
    }

    pub fn file_count(&self) -> usize {
        self.children
            .iter()
            .map(|child| match child {
                TreeNode::File(_) => 1,
                TreeNode::Directory(dir) => dir.file_count(),
            })
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Post-order: drops every subdirectory without file descendants and
    /// reports whether this node should be kept.
    pub fn prune(&mut self) -> bool {
        self.children.retain_mut(|child| match child {
            TreeNode::File(_) => true,
            TreeNode::Directory(dir) => dir.prune(),
        });
        !self.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PatchTree {
    pub roots: Vec<DirectoryNode>,
}

impl PatchTree {
    pub fn files(&self) -> Vec<&FileEntry> {
        self.roots.iter().flat_map(|root| root.files()).collect()
    }

    pub fn files_mut(&mut self) -> Vec<&mut FileEntry> {
        self.roots
            .iter_mut()
            .flat_map(|root| root.files_mut())
            .collect()
    }

    pub fn file_count(&self) -> usize {
        self.roots.iter().map(DirectoryNode::file_count).sum()
    }

    pub fn clear(&mut self) {
        self.roots.clear();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    MissingRoot,
    Unreadable,
    Rejected,
    Duplicate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanDiagnostic {
    pub kind: DiagnosticKind,
    pub path: PathBuf,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct ScanProgress {
    pub examined: usize,
    pub path: PathBuf,
}

pub type ProgressCallback = Arc<dyn Fn(ScanProgress) + Send + Sync>;

#[derive(Clone, Default)]
pub struct ScanOptions {
    pub recursive: bool,
    pub progress: Option<ProgressCallback>,
    pub cancel: Option<Arc<AtomicBool>>,
}

impl ScanOptions {
    pub fn recursive() -> Self {
        Self {
            recursive: true,
            ..Self::default()
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map(|flag| flag.load(Ordering::Relaxed))
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanOutcome {
    pub bases: Vec<FileEntry>,
    pub patches: PatchTree,
    pub diagnostics: Vec<ScanDiagnostic>,
    pub cancelled: bool,
}

/// Walks every root, classifying candidate files. Output order follows
/// directory iteration order; nothing is re-sorted.
pub fn scan(
    roots: &[PathBuf],
    options: &ScanOptions,
    categories: &mut CategoryIndex,
) -> ScanOutcome {
    let started = Instant::now();
    let mut scan = Scan {
        options,
        categories,
        outcome: ScanOutcome::default(),
        seen_bases: HashSet::new(),
        seen_patches: HashSet::new(),
        examined: 0,
    };

    for root in roots {
        if options.is_cancelled() {
            scan.outcome.cancelled = true;
            break;
        }
        let root = match fs::canonicalize(root) {
            Ok(path) if path.is_dir() => path,
            _ => {
                warn!("Path {} does not exist.", root.display());
                scan.diagnose(DiagnosticKind::MissingRoot, root, "scan root does not exist");
                continue;
            }
        };
        let mut node = scan.walk_root(&root);
        if node.prune() {
            scan.outcome.patches.roots.push(node);
        }
    }

    let outcome = scan.outcome;
    info!(
        "Folder scan complete in {:.3} seconds: {} IWAD(s), {} PWAD(s), {} diagnostic(s)",
        started.elapsed().as_secs_f64(),
        outcome.bases.len(),
        outcome.patches.file_count(),
        outcome.diagnostics.len()
    );
    outcome
}

struct Scan<'a> {
    options: &'a ScanOptions,
    categories: &'a mut CategoryIndex,
    outcome: ScanOutcome,
    seen_bases: HashSet<Fingerprint>,
    seen_patches: HashSet<Fingerprint>,
    examined: usize,
}

impl Scan<'_> {
    /// Builds the full tree for one root. `stack[d]` is the open directory at
    /// depth `d`; a directory is attached to its parent once the walk leaves it.
    fn walk_root(&mut self, root: &Path) -> DirectoryNode {
        let max_depth = if self.options.recursive { usize::MAX } else { 1 };
        let walker = WalkDir::new(root)
            .min_depth(1)
            .max_depth(max_depth)
            .follow_links(true)
            .into_iter()
            .filter_entry(|entry| {
                entry.depth() == 0 || !is_hidden_name(&entry.file_name().to_string_lossy())
            });

        let mut stack = vec![DirectoryNode::new(root)];
        for entry in walker {
            if self.options.is_cancelled() {
                self.outcome.cancelled = true;
                break;
            }
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    let path = err.path().unwrap_or(root).to_path_buf();
                    warn!("Skipping {}: {err}", path.display());
                    self.diagnose(DiagnosticKind::Unreadable, &path, &err.to_string());
                    continue;
                }
            };

            close_until(&mut stack, entry.depth());
            if entry.file_type().is_dir() {
                stack.push(DirectoryNode::new(entry.path()));
            } else if entry.file_type().is_file() {
                if let Some(patch) = self.visit_file(entry.path()) {
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(TreeNode::File(patch));
                    }
                }
            }
        }

        close_until(&mut stack, 1);
        stack.pop().unwrap_or_else(|| DirectoryNode::new(root))
    }

    /// Returns the entry when it belongs in the patch tree.
    fn visit_file(&mut self, path: &Path) -> Option<FileEntry> {
        let format = ContainerFormat::from_path(path)?;
        self.examined += 1;
        if let Some(callback) = &self.options.progress {
            callback(ScanProgress {
                examined: self.examined,
                path: path.to_path_buf(),
            });
        }

        let kind = match inspect::classify_as(path, format).into_result(path) {
            Ok(kind) => kind,
            Err(err) => {
                warn!("{err}");
                self.diagnose(DiagnosticKind::Rejected, path, &err.to_string());
                return None;
            }
        };

        let fingerprint = match Fingerprint::of_file(path) {
            Ok(fingerprint) => fingerprint,
            Err(err) => {
                warn!("{err}");
                self.diagnose(DiagnosticKind::Unreadable, path, &err.to_string());
                return None;
            }
        };

        let mut entry = FileEntry::new(path.to_path_buf(), fingerprint, kind);
        let seen = match kind {
            DatasetKind::BaseDataset => &mut self.seen_bases,
            DatasetKind::Patch => &mut self.seen_patches,
        };
        if !seen.insert(fingerprint) {
            debug!("{}: duplicate of an earlier {}", path.display(), kind.label());
            self.diagnose(
                DiagnosticKind::Duplicate,
                path,
                &format!("same content as an earlier {} ({fingerprint})", kind.label()),
            );
            return None;
        }

        debug!("{} - {} {}", kind.label(), entry.name(), fingerprint);
        match kind {
            DatasetKind::BaseDataset => {
                self.outcome.bases.push(entry);
                None
            }
            DatasetKind::Patch => {
                entry.category = self.categories.lookup(&entry.name());
                Some(entry)
            }
        }
    }

    fn diagnose(&mut self, kind: DiagnosticKind, path: &Path, message: &str) {
        self.outcome.diagnostics.push(ScanDiagnostic {
            kind,
            path: path.to_path_buf(),
            message: message.to_string(),
        });
    }
}

fn close_until(stack: &mut Vec<DirectoryNode>, depth: usize) {
    while stack.len() > depth.max(1) {
        let Some(done) = stack.pop() else {
            break;
        };
        if let Some(parent) = stack.last_mut() {
            parent.children.push(TreeNode::Directory(done));
        }
    }
}
