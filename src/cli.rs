use crate::{
    app::App,
    library::{DatasetKind, FileEntry},
    scanner::{DirectoryNode, ProgressCallback, ScanOutcome, ScanProgress, TreeNode},
};
use anyhow::{anyhow, bail, Context, Result};
use serde::Serialize;
use std::{fs, path::PathBuf, sync::Arc};
use tracing::debug;

#[derive(Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "json" => Some(OutputFormat::Json),
            "text" => Some(OutputFormat::Text),
            _ => None,
        }
    }
}

struct GlobalOptions {
    format: OutputFormat,
}

#[derive(Debug, PartialEq, Eq)]
enum CliCommand {
    Scan,
    List(ListTarget),
    RootsList,
    RootsAdd(PathBuf),
    RootsRemove(PathBuf),
    RootsImportEngine,
    Engine {
        dir: PathBuf,
        executable: Option<String>,
    },
    Select(PathBuf),
    Enable(PathBuf),
    Disable(PathBuf),
    Order {
        from: usize,
        to: usize,
    },
    Add {
        path: PathBuf,
        kind: Option<DatasetKind>,
    },
    CategoryList,
    CategoryAdd(String),
    CategoryAssign {
        name: String,
        category: String,
    },
    CategoryRename {
        old: String,
        new: String,
    },
    CategoryDelete(String),
    Launch {
        dry_run: bool,
    },
    Help,
    Version,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListTarget {
    Iwads,
    Pwads,
    Tree,
}

pub fn run() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let (global, tokens) = parse_global_options(&args);
    let command = parse_command(&tokens)?;
    match command {
        CliCommand::Help => {
            print_help();
            Ok(())
        }
        CliCommand::Version => {
            println!("wadsmith v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        command => {
            let mut app = App::initialize()?;
            run_command(&mut app, command, global.format)
        }
    }
}

fn parse_global_options(args: &[String]) -> (GlobalOptions, Vec<String>) {
    let mut format = OutputFormat::Text;
    let mut tokens = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if let Some(value) = arg.strip_prefix("--format=") {
            if let Some(parsed) = OutputFormat::parse(value) {
                format = parsed;
            }
            continue;
        }
        if arg == "--format" {
            if let Some(value) = iter.next() {
                if let Some(parsed) = OutputFormat::parse(value) {
                    format = parsed;
                }
            }
            continue;
        }
        tokens.push(arg.to_string());
    }

    (GlobalOptions { format }, tokens)
}

fn parse_command(tokens: &[String]) -> Result<CliCommand> {
    let Some(head) = tokens.first() else {
        return Ok(CliCommand::Help);
    };
    let rest = tokens.get(1..).unwrap_or(&[]);
    let command = match head.as_str() {
        "--help" | "-h" | "help" => CliCommand::Help,
        "--version" | "-V" | "version" => CliCommand::Version,
        "scan" => CliCommand::Scan,
        "list" => {
            let target = match rest.first().map(|value| value.as_str()).unwrap_or("pwads") {
                "iwads" => ListTarget::Iwads,
                "pwads" => ListTarget::Pwads,
                "tree" => ListTarget::Tree,
                other => bail!("Unknown list target: {other} (use 'iwads', 'pwads', or 'tree')"),
            };
            CliCommand::List(target)
        }
        "roots" => {
            let sub = rest.first().map(|value| value.as_str()).unwrap_or("list");
            match sub {
                "list" => CliCommand::RootsList,
                "add" => {
                    CliCommand::RootsAdd(required(rest, 1, "roots add requires a directory")?.into())
                }
                "remove" => CliCommand::RootsRemove(
                    required(rest, 1, "roots remove requires a directory")?.into(),
                ),
                "import-engine" => CliCommand::RootsImportEngine,
                _ => bail!("Unknown roots command: {sub}"),
            }
        }
        "engine" => {
            let mut dir = None;
            let mut executable = None;
            let mut iter = rest.iter();
            while let Some(arg) = iter.next() {
                match arg.as_str() {
                    "--exe" => {
                        let Some(value) = iter.next() else {
                            bail!("--exe requires a value");
                        };
                        executable = Some(value.to_string());
                    }
                    value if value.starts_with("--exe=") => {
                        executable = Some(value.trim_start_matches("--exe=").to_string());
                    }
                    value => dir = Some(PathBuf::from(value)),
                }
            }
            let dir = dir.ok_or_else(|| anyhow!("engine requires the engine directory"))?;
            CliCommand::Engine { dir, executable }
        }
        "select" => CliCommand::Select(required(rest, 0, "select requires an IWAD path")?.into()),
        "enable" => CliCommand::Enable(required(rest, 0, "enable requires a PWAD path")?.into()),
        "disable" => CliCommand::Disable(required(rest, 0, "disable requires a PWAD path")?.into()),
        "order" => {
            let from = parse_position(required(rest, 0, "order requires <from> <to>")?)?;
            let to = parse_position(required(rest, 1, "order requires <from> <to>")?)?;
            CliCommand::Order { from, to }
        }
        "add" => {
            let mut path = None;
            let mut kind = None;
            for arg in rest {
                match arg.as_str() {
                    "--iwad" => kind = Some(DatasetKind::BaseDataset),
                    "--pwad" => kind = Some(DatasetKind::Patch),
                    value => path = Some(PathBuf::from(value)),
                }
            }
            let path = path.ok_or_else(|| anyhow!("add requires a file"))?;
            CliCommand::Add { path, kind }
        }
        "category" => {
            let sub = rest.first().map(|value| value.as_str()).unwrap_or("list");
            match sub {
                "list" => CliCommand::CategoryList,
                "add" => CliCommand::CategoryAdd(
                    required(rest, 1, "category add requires a name")?.to_string(),
                ),
                "assign" => CliCommand::CategoryAssign {
                    name: required(rest, 1, "category assign requires <wad> <category>")?
                        .to_string(),
                    category: required(rest, 2, "category assign requires <wad> <category>")?
                        .to_string(),
                },
                "rename" => CliCommand::CategoryRename {
                    old: required(rest, 1, "category rename requires <old> <new>")?.to_string(),
                    new: required(rest, 2, "category rename requires <old> <new>")?.to_string(),
                },
                "delete" => CliCommand::CategoryDelete(
                    required(rest, 1, "category delete requires a name")?.to_string(),
                ),
                _ => bail!("Unknown category command: {sub}"),
            }
        }
        "launch" => CliCommand::Launch {
            dry_run: rest.iter().any(|arg| arg == "--dry-run" || arg == "-n"),
        },
        other => bail!("Unknown command: {other} (see 'wadsmith help')"),
    };
    Ok(command)
}

fn required<'a>(args: &'a [String], index: usize, message: &str) -> Result<&'a str> {
    args.get(index)
        .map(|value| value.as_str())
        .ok_or_else(|| anyhow!("{message}"))
}

/// Positions are 1-based on the command line.
fn parse_position(value: &str) -> Result<usize> {
    let position: usize = value
        .parse()
        .with_context(|| format!("Invalid position: {value}"))?;
    if position == 0 {
        bail!("Positions start at 1");
    }
    Ok(position - 1)
}

fn run_command(app: &mut App, command: CliCommand, format: OutputFormat) -> Result<()> {
    match command {
        CliCommand::Scan => {
            let outcome = app.refresh(Some(progress_logger()));
            app.shutdown()?;
            print_scan_summary(&outcome, format)
        }
        CliCommand::List(ListTarget::Iwads) => list_iwads(app, format),
        CliCommand::List(ListTarget::Pwads) => list_pwads(app, format),
        CliCommand::List(ListTarget::Tree) => {
            app.refresh(Some(progress_logger()));
            app.shutdown()?;
            list_tree(app, format)
        }
        CliCommand::RootsList => list_roots(app, format),
        CliCommand::RootsAdd(dir) => {
            let dir = fs::canonicalize(&dir)
                .with_context(|| format!("Scan root {} doesn't exist", dir.display()))?;
            if !app.prefs.add_scan_root(&dir) {
                println!("{} is already a scan root", dir.display());
            }
            app.shutdown()?;
            list_roots(app, format)
        }
        CliCommand::RootsRemove(dir) => {
            let canonical = fs::canonicalize(&dir).unwrap_or_else(|_| dir.clone());
            if !app.prefs.remove_scan_root(&dir) && !app.prefs.remove_scan_root(&canonical) {
                bail!("{} is not a scan root", dir.display());
            }
            app.shutdown()?;
            list_roots(app, format)
        }
        CliCommand::RootsImportEngine => {
            let added = app.import_engine_search_dirs()?;
            app.shutdown()?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&added)?),
                OutputFormat::Text => {
                    if added.is_empty() {
                        println!("No new scan roots found in the engine config");
                    }
                    for dir in added {
                        println!("Added {}", dir.display());
                    }
                }
            }
            Ok(())
        }
        CliCommand::Engine { dir, executable } => {
            app.prefs.general.engine_dir = fs::canonicalize(&dir)
                .with_context(|| format!("Engine directory {} doesn't exist", dir.display()))?;
            if let Some(executable) = executable {
                app.prefs.general.executable = executable;
            }
            app.shutdown()?;
            println!("Engine: {}", app.prefs.executable_path().display());
            Ok(())
        }
        CliCommand::Select(path) => {
            app.select_base(&path)?;
            app.shutdown()?;
            list_iwads(app, format)
        }
        CliCommand::Enable(path) => {
            app.set_patch(&path, true)?;
            app.shutdown()?;
            list_selected(app, format)
        }
        CliCommand::Disable(path) => {
            app.set_patch(&path, false)?;
            app.shutdown()?;
            list_selected(app, format)
        }
        CliCommand::Order { from, to } => {
            let count = app.session.selected_patches.len();
            if from >= count || to >= count {
                bail!("Only {count} PWAD(s) are enabled");
            }
            app.session.move_patch(from, to);
            app.shutdown()?;
            list_selected(app, format)
        }
        CliCommand::Add { path, kind } => {
            let entry = match kind {
                Some(kind) => app.add_file(&path, kind)?,
                None => app.add_detected_file(&path)?,
            };
            app.shutdown()?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&entry)?),
                OutputFormat::Text => {
                    println!("Added {} {}", entry.kind.label(), entry.path.display())
                }
            }
            Ok(())
        }
        CliCommand::CategoryList => list_categories(app, format),
        CliCommand::CategoryAdd(name) => {
            app.categories.add_category(&name)?;
            app.shutdown()?;
            list_categories(app, format)
        }
        CliCommand::CategoryAssign { name, category } => {
            let created = !app.categories.contains(&category);
            app.assign_category(&name, &category)?;
            app.shutdown()?;
            if format == OutputFormat::Json {
                return list_categories(app, format);
            }
            if created {
                println!("Created category {category}");
            }
            if let Some(assigned) = app.categories.get(&name) {
                println!("{name}: {assigned}");
            }
            Ok(())
        }
        CliCommand::CategoryRename { old, new } => {
            app.rename_category(&old, &new)?;
            app.shutdown()?;
            list_categories(app, format)
        }
        CliCommand::CategoryDelete(name) => {
            app.delete_category(&name)?;
            app.shutdown()?;
            list_categories(app, format)
        }
        CliCommand::Launch { dry_run } => {
            let command = app.launch_command()?;
            if dry_run {
                let mut parts = vec![command.get_program().to_string_lossy().into_owned()];
                parts.extend(command.get_args().map(|arg| arg.to_string_lossy().into_owned()));
                match format {
                    OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&parts)?),
                    OutputFormat::Text => println!("{}", parts.join(" ")),
                }
                return Ok(());
            }
            app.shutdown()?;
            let status = app.launch()?;
            if !status.success() {
                bail!("Engine exited with {status}");
            }
            Ok(())
        }
        CliCommand::Help | CliCommand::Version => Ok(()),
    }
}

fn progress_logger() -> ProgressCallback {
    Arc::new(|progress: ScanProgress| {
        if progress.examined % 100 == 0 {
            debug!("Examined {} files ({})", progress.examined, progress.path.display());
        }
    })
}

#[derive(Serialize)]
struct ScanSummary<'a> {
    iwads: usize,
    pwads: usize,
    cancelled: bool,
    diagnostics: &'a [crate::scanner::ScanDiagnostic],
}

fn print_scan_summary(outcome: &ScanOutcome, format: OutputFormat) -> Result<()> {
    let summary = ScanSummary {
        iwads: outcome.bases.len(),
        pwads: outcome.patches.file_count(),
        cancelled: outcome.cancelled,
        diagnostics: &outcome.diagnostics,
    };
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        OutputFormat::Text => {
            println!("Found {} IWAD(s), {} PWAD(s)", summary.iwads, summary.pwads);
            for diagnostic in summary.diagnostics {
                println!(
                    "  {:?}: {} ({})",
                    diagnostic.kind,
                    diagnostic.path.display(),
                    diagnostic.message
                );
            }
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct IwadListItem {
    name: String,
    path: PathBuf,
    fingerprint: String,
    selected: bool,
}

fn list_iwads(app: &App, format: OutputFormat) -> Result<()> {
    let items: Vec<IwadListItem> = app
        .bases
        .entries()
        .iter()
        .map(|entry| IwadListItem {
            name: entry.name(),
            path: entry.path.clone(),
            fingerprint: entry.fingerprint.to_hex(),
            selected: app.session.selected_base.as_ref() == Some(&entry.path),
        })
        .collect();

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&items)?);
        }
        OutputFormat::Text => {
            if app.bases.is_empty() {
                println!("No IWADs known yet (add a scan root and run 'wadsmith scan')");
            }
            for item in items {
                let marker = if item.selected { "*" } else { " " };
                println!("{marker} {:<20} {}", item.name, item.path.display());
            }
        }
    }

    Ok(())
}

#[derive(Serialize)]
struct PwadListItem {
    name: String,
    path: PathBuf,
    category: String,
    fingerprint: String,
    order: Option<usize>,
}

fn pwad_item(app: &App, entry: &FileEntry) -> PwadListItem {
    let order = app
        .session
        .selected_patches
        .iter()
        .position(|path| path == &entry.path)
        .map(|index| index + 1);
    PwadListItem {
        name: entry.name(),
        path: entry.path.clone(),
        category: entry.category.clone(),
        fingerprint: entry.fingerprint.to_hex(),
        order,
    }
}

fn print_pwads(items: &[PwadListItem], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(items)?);
        }
        OutputFormat::Text => {
            for item in items {
                let order = item
                    .order
                    .map(|value| value.to_string())
                    .unwrap_or_else(|| "-".to_string());
                let enabled = if item.order.is_some() { "x" } else { " " };
                println!(
                    "{order:>3} [{enabled}] {category:<14} {name}",
                    category = item.category,
                    name = item.name
                );
            }
        }
    }
    Ok(())
}

fn list_pwads(app: &App, format: OutputFormat) -> Result<()> {
    let items: Vec<PwadListItem> = app
        .patches
        .entries()
        .iter()
        .map(|entry| pwad_item(app, entry))
        .collect();
    print_pwads(&items, format)
}

/// Enabled PWADs in load order.
fn list_selected(app: &App, format: OutputFormat) -> Result<()> {
    let items: Vec<PwadListItem> = app
        .session
        .selected_patches
        .iter()
        .filter_map(|path| app.patches.find_by_path(path))
        .map(|entry| pwad_item(app, entry))
        .collect();
    print_pwads(&items, format)
}

fn list_tree(app: &App, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&app.patch_tree)?);
        }
        OutputFormat::Text => {
            for root in &app.patch_tree.roots {
                println!("{}", root.path.display());
                print_tree_children(app, root, 1);
            }
        }
    }
    Ok(())
}

fn print_tree_children(app: &App, dir: &DirectoryNode, depth: usize) {
    let indent = "  ".repeat(depth);
    for child in &dir.children {
        match child {
            TreeNode::Directory(sub) => {
                println!("{indent}{}/", sub.name);
                print_tree_children(app, sub, depth + 1);
            }
            TreeNode::File(entry) => {
                let enabled = if app.session.is_patch_selected(&entry.path) {
                    "x"
                } else {
                    " "
                };
                println!("{indent}[{enabled}] {} ({})", entry.name(), entry.category);
            }
        }
    }
}

fn list_roots(app: &App, format: OutputFormat) -> Result<()> {
    let roots = app.prefs.scan_roots();
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&roots)?);
        }
        OutputFormat::Text => {
            for root in roots {
                let missing = if root.is_dir() { "" } else { " (missing)" };
                println!("{}{missing}", root.display());
            }
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct CategoryListItem<'a> {
    name: &'a str,
    default: bool,
    members: Vec<&'a str>,
}

fn list_categories(app: &App, format: OutputFormat) -> Result<()> {
    let default = app.categories.default_category();
    let items: Vec<CategoryListItem> = app
        .categories
        .categories()
        .iter()
        .map(|name| name.as_str())
        .map(|name| CategoryListItem {
            name,
            default: name == default,
            members: app.categories.members(name),
        })
        .collect();

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&items)?);
        }
        OutputFormat::Text => {
            for item in items {
                let marker = if item.default { "*" } else { " " };
                println!("{marker} {} ({})", item.name, item.members.len());
                for member in item.members {
                    println!("    {member}");
                }
            }
        }
    }
    Ok(())
}

fn print_help() {
    println!("wadsmith v{}", env!("CARGO_PKG_VERSION"));
    println!("Usage:");
    println!("  wadsmith scan                        Rescan all scan roots");
    println!("  wadsmith list [iwads|pwads|tree]     List known files (tree rescans)");
    println!("  wadsmith roots list                  Show scan roots");
    println!("  wadsmith roots add <dir>             Add a scan root");
    println!("  wadsmith roots remove <dir>          Remove a scan root");
    println!("  wadsmith roots import-engine         Add the engine's own search dirs");
    println!("  wadsmith engine <dir> [--exe <name>] Set the engine location");
    println!("  wadsmith select <iwad>               Pick the IWAD to launch");
    println!("  wadsmith enable <pwad>               Append a PWAD to the load order");
    println!("  wadsmith disable <pwad>              Remove a PWAD from the load order");
    println!("  wadsmith order <from> <to>           Move an enabled PWAD (1-based)");
    println!("  wadsmith add <file> [--iwad|--pwad]  Add a file outside the scan roots");
    println!("  wadsmith category list               List categories and members");
    println!("  wadsmith category add <name>         Create a category");
    println!("  wadsmith category assign <wad> <cat> Move a PWAD to a category");
    println!("  wadsmith category rename <old> <new> Rename or merge a category");
    println!("  wadsmith category delete <name>      Delete a category");
    println!("  wadsmith launch [--dry-run]          Start the engine");
    println!();
    println!("Global options:");
    println!("  --format <json|text>                 Output format");
    println!("  -h, --help                           Show help");
    println!("  -V, --version                        Show version");
    println!();
    println!("Set WADSMITH_LOG (e.g. debug) to change log verbosity.");
}
