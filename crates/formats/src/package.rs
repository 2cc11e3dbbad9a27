use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::manifest::{HierarchyManifest, MANIFEST_VERSION};

pub const MANIFEST_FILE_NAME: &str = "hierarchy.manifest.json";

/// A directory holding a hierarchy manifest plus one GeoJSON file per level.
#[derive(Debug, Clone)]
pub struct HierarchyPackage {
    root: PathBuf,
    manifest: HierarchyManifest,
}

#[derive(Debug)]
pub enum PackageError {
    Io(std::io::Error),
    Parse(serde_json::Error),
    UnsupportedVersion { found: String },
}

impl fmt::Display for PackageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackageError::Io(err) => write!(f, "I/O error: {err}"),
            PackageError::Parse(err) => write!(f, "Manifest parse error: {err}"),
            PackageError::UnsupportedVersion { found } => {
                write!(f, "Unsupported manifest version: {found}")
            }
        }
    }
}

impl std::error::Error for PackageError {}

impl HierarchyPackage {
    pub fn load(root: impl AsRef<Path>) -> Result<Self, PackageError> {
        let root = root.as_ref().to_path_buf();
        let manifest_path = root.join(MANIFEST_FILE_NAME);
        let payload = fs::read_to_string(&manifest_path).map_err(PackageError::Io)?;
        let manifest = parse_manifest(&payload)?;
        Ok(Self { root, manifest })
    }

    pub fn manifest(&self) -> &HierarchyManifest {
        &self.manifest
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn into_parts(self) -> (PathBuf, HierarchyManifest) {
        (self.root, self.manifest)
    }
}

pub fn parse_manifest(payload: &str) -> Result<HierarchyManifest, PackageError> {
    let manifest: HierarchyManifest =
        serde_json::from_str(payload).map_err(PackageError::Parse)?;
    if manifest.version != MANIFEST_VERSION {
        return Err(PackageError::UnsupportedVersion {
            found: manifest.version,
        });
    }
    Ok(manifest)
}

/// Hex BLAKE3 digest, the format used by `LevelEntry::content_hash`.
pub fn content_hash_hex(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}
