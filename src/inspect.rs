use crate::error::{Error, Result};
use crate::library::DatasetKind;
use std::{
    fs,
    io::{self, Read},
    path::Path,
};
use zip::ZipArchive;

/// Entry name that marks a zip-style archive as a standalone game.
pub const IWAD_MARKER: &str = "iwadinfo";

/// Top-level folders that only a content add-on would ship.
pub const LUMP_FOLDERS: [&str; 14] = [
    "acs",
    "colormaps",
    "filter",
    "flats",
    "graphics",
    "hires",
    "maps",
    "music",
    "patches",
    "sounds",
    "sprites",
    "textures",
    "voices",
    "voxels",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerFormat {
    /// `.wad`: 4-byte magic at offset 0.
    FlatHeader,
    /// `.pk3`, `.ipk3`, `.zip`: inspected through the central directory.
    StructuredArchive,
    /// `.pk7`, `.ipk7`: 7z containers. Contents are not inspected; the kind
    /// is implied by the extension.
    UnimplementedDeep { assumed: DatasetKind },
}

impl ContainerFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "wad" => Some(ContainerFormat::FlatHeader),
            "pk3" | "ipk3" | "zip" => Some(ContainerFormat::StructuredArchive),
            "ipk7" => Some(ContainerFormat::UnimplementedDeep {
                assumed: DatasetKind::BaseDataset,
            }),
            "pk7" => Some(ContainerFormat::UnimplementedDeep {
                assumed: DatasetKind::Patch,
            }),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Accepted(DatasetKind),
    Rejected(String),
}

impl Classification {
    /// A rejection becomes `MalformedArchive` for `path`.
    pub fn into_result(self, path: &Path) -> Result<DatasetKind> {
        match self {
            Classification::Accepted(kind) => Ok(kind),
            Classification::Rejected(reason) => Err(Error::MalformedArchive {
                path: path.to_path_buf(),
                reason,
            }),
        }
    }
}

pub fn is_candidate(path: &Path) -> bool {
    ContainerFormat::from_path(path).is_some()
}

pub fn classify(path: &Path) -> Classification {
    match ContainerFormat::from_path(path) {
        Some(format) => classify_as(path, format),
        None => Classification::Rejected("unsupported file extension".to_string()),
    }
}

pub fn classify_as(path: &Path, format: ContainerFormat) -> Classification {
    match format {
        ContainerFormat::FlatHeader => match read_header(path) {
            Ok(header) => classify_header(&header),
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => {
                Classification::Rejected("WAD header not found (file too short)".to_string())
            }
            Err(err) => Classification::Rejected(format!("read WAD header: {err}")),
        },
        ContainerFormat::StructuredArchive => classify_archive(path),
        ContainerFormat::UnimplementedDeep { assumed } => Classification::Accepted(assumed),
    }
}

pub fn classify_header(header: &[u8; 4]) -> Classification {
    match header {
        b"IWAD" => Classification::Accepted(DatasetKind::BaseDataset),
        b"PWAD" => Classification::Accepted(DatasetKind::Patch),
        _ => Classification::Rejected(format!(
            "WAD header not found (got {:?})",
            String::from_utf8_lossy(header)
        )),
    }
}

fn read_header(path: &Path) -> io::Result<[u8; 4]> {
    let mut file = fs::File::open(path)?;
    let mut header = [0u8; 4];
    file.read_exact(&mut header)?;
    Ok(header)
}

fn classify_archive(path: &Path) -> Classification {
    let file = match fs::File::open(path) {
        Ok(file) => file,
        Err(err) => return Classification::Rejected(format!("open archive: {err}")),
    };
    let mut archive = match ZipArchive::new(file) {
        Ok(archive) => archive,
        Err(err) => return Classification::Rejected(format!("read archive: {err}")),
    };

    let mut names = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        match archive.by_index_raw(index) {
            Ok(entry) => names.push(entry.name().to_string()),
            Err(err) => return Classification::Rejected(format!("archive entry {index}: {err}")),
        }
    }
    classify_entry_names(names.iter().map(String::as_str))
}

/// The marker wins over lump folders no matter where either appears, so the
/// walk only stops early on the marker.
pub fn classify_entry_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Classification {
    let mut has_lump_folder = false;
    for name in names {
        if name.eq_ignore_ascii_case(IWAD_MARKER) {
            return Classification::Accepted(DatasetKind::BaseDataset);
        }
        if !has_lump_folder {
            let top = name.split('/').next().unwrap_or("");
            has_lump_folder = LUMP_FOLDERS
                .iter()
                .any(|folder| folder.eq_ignore_ascii_case(top));
        }
    }

    if has_lump_folder {
        Classification::Accepted(DatasetKind::Patch)
    } else {
        Classification::Rejected("archive has no iwadinfo or lump folders".to_string())
    }
}
