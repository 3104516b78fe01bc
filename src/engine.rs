use crate::error::{Error, Result};
use crate::session::SessionConfig;
use std::{
    fs,
    path::{Component, Path, PathBuf},
    process::{Command, ExitStatus},
};
use tracing::{info, warn};

const SEARCH_SECTIONS: [&str; 2] = ["[IWADSearch.Directories]", "[FileSearch.Directories]"];

/// Values substituted into `Path=` entries of the engine ini.
#[derive(Debug, Clone, Default)]
pub struct PathShortcuts {
    pub progdir: PathBuf,
    pub doomwaddir: Option<PathBuf>,
    pub home: Option<PathBuf>,
}

impl PathShortcuts {
    pub fn from_env(engine_dir: &Path) -> Self {
        Self {
            progdir: engine_dir.to_path_buf(),
            doomwaddir: non_empty_env("DOOMWADDIR"),
            home: non_empty_env("HOME").or_else(|| non_empty_env("USERPROFILE")),
        }
    }

    fn expand(&self, raw: &str) -> Option<PathBuf> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        if raw == "." {
            return Some(self.progdir.clone());
        }
        let mut value = raw.to_string();
        for (key, replacement) in [
            ("$PROGDIR", Some(&self.progdir)),
            ("$DOOMWADDIR", self.doomwaddir.as_ref()),
            ("$HOME", self.home.as_ref()),
        ] {
            if !value.contains(key) {
                continue;
            }
            let replacement = replacement?;
            value = value.replace(key, &replacement.to_string_lossy());
        }
        Some(normalize_path(Path::new(&value)))
    }
}

fn non_empty_env(key: &str) -> Option<PathBuf> {
    std::env::var_os(key)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

pub fn current_user() -> Option<String> {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .ok()
        .filter(|user| !user.is_empty())
}

pub fn ini_path(engine_dir: &Path, user: &str) -> PathBuf {
    engine_dir.join(format!("gzdoom-{user}.ini"))
}

/// Reads the directories the engine itself searches for IWADs and PWADs.
pub fn search_dirs_from_ini(
    engine_dir: &Path,
    user: &str,
    shortcuts: &PathShortcuts,
) -> Result<Vec<PathBuf>> {
    let path = ini_path(engine_dir, user);
    if !path.exists() {
        return Err(Error::MissingFile { path });
    }
    let raw = fs::read_to_string(&path).map_err(|err| Error::io(&path, err))?;
    Ok(parse_search_dirs(&raw, shortcuts))
}

pub fn parse_search_dirs(raw: &str, shortcuts: &PathShortcuts) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = Vec::new();
    let mut reading = false;

    for line in raw.lines() {
        let line = line.trim();
        if line.starts_with('[') {
            reading = SEARCH_SECTIONS
                .iter()
                .any(|section| line.eq_ignore_ascii_case(section));
            continue;
        }
        if !reading {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        if !key.trim().eq_ignore_ascii_case("path") {
            continue;
        }
        match shortcuts.expand(value) {
            Some(dir) if !dirs.contains(&dir) => dirs.push(dir),
            Some(_) => {}
            None => warn!("Skipping engine search path {value:?}: unresolved variable"),
        }
    }

    dirs
}

/// Lexical normalization: drops `.` and folds `..` without touching the disk.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

pub fn build_command(executable: &Path, session: &SessionConfig) -> Result<Command> {
    let mut command = Command::new(executable);
    command.args(session.launch_args()?);
    if let Some(dir) = executable.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        command.current_dir(dir);
    }
    Ok(command)
}

/// Spawns the engine and blocks until it exits.
pub fn launch(executable: &Path, session: &SessionConfig) -> Result<ExitStatus> {
    let mut command = build_command(executable, session)?;
    info!("Launching {:?}", command);
    let status = command
        .spawn()
        .and_then(|mut child| child.wait())
        .map_err(|err| Error::io(executable, err))?;
    info!("Engine exited with {status}");
    Ok(status)
}
