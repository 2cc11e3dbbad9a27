use std::collections::BTreeSet;
use std::fmt;

use formats::{GeometryKind, HierarchyManifest, LevelEntry};
use foundation::LevelId;

/// One rung of the drill-down chain.
///
/// The next level is implied by position: `LevelRegistry::level_after`.
#[derive(Debug, Clone, PartialEq)]
pub struct Level {
    pub id: LevelId,
    pub ordinal: usize,
    pub kind: GeometryKind,
    pub label: String,
    pub id_field: String,
    pub parent_field: Option<String>,
    pub name_field: String,
    pub source: String,
    pub content_hash: Option<String>,
}

impl Level {
    pub fn is_root(&self) -> bool {
        self.ordinal == 0
    }

    fn from_entry(ordinal: usize, entry: &LevelEntry) -> Self {
        Self {
            id: entry.id.clone(),
            ordinal,
            kind: entry.kind,
            label: entry.label.clone(),
            id_field: entry.id_field.clone(),
            parent_field: entry.parent_field.clone(),
            name_field: entry.name_field.clone(),
            source: entry.path.clone(),
            content_hash: entry.content_hash.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    Empty,
    DuplicateLevel(LevelId),
    RootHasParentField(LevelId),
    MissingParentField(LevelId),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::Empty => write!(f, "hierarchy declares no levels"),
            RegistryError::DuplicateLevel(id) => write!(f, "level {id} is declared twice"),
            RegistryError::RootHasParentField(id) => {
                write!(f, "root level {id} must not declare a parent field")
            }
            RegistryError::MissingParentField(id) => {
                write!(f, "non-root level {id} must declare a parent field")
            }
        }
    }
}

impl std::error::Error for RegistryError {}

/// Static, ordered chain of levels (root first, leaf last).
///
/// Validated once at construction; every query afterwards is infallible.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelRegistry {
    levels: Vec<Level>,
}

impl LevelRegistry {
    pub fn from_manifest(manifest: &HierarchyManifest) -> Result<Self, RegistryError> {
        Self::from_entries(&manifest.levels)
    }

    pub fn from_entries(entries: &[LevelEntry]) -> Result<Self, RegistryError> {
        if entries.is_empty() {
            return Err(RegistryError::Empty);
        }

        let mut seen = BTreeSet::new();
        let mut levels = Vec::with_capacity(entries.len());
        for (ordinal, entry) in entries.iter().enumerate() {
            if !seen.insert(entry.id.clone()) {
                return Err(RegistryError::DuplicateLevel(entry.id.clone()));
            }
            match (ordinal, &entry.parent_field) {
                (0, Some(_)) => return Err(RegistryError::RootHasParentField(entry.id.clone())),
                (n, None) if n > 0 => {
                    return Err(RegistryError::MissingParentField(entry.id.clone()));
                }
                _ => {}
            }
            levels.push(Level::from_entry(ordinal, entry));
        }

        Ok(Self { levels })
    }

    pub fn root(&self) -> &Level {
        &self.levels[0]
    }

    pub fn leaf(&self) -> &Level {
        &self.levels[self.levels.len() - 1]
    }

    pub fn level(&self, id: &LevelId) -> Option<&Level> {
        self.levels.iter().find(|l| &l.id == id)
    }

    pub fn level_after(&self, id: &LevelId) -> Option<&Level> {
        let current = self.level(id)?;
        self.levels.get(current.ordinal + 1)
    }

    pub fn level_before(&self, id: &LevelId) -> Option<&Level> {
        let current = self.level(id)?;
        let ordinal = current.ordinal.checked_sub(1)?;
        self.levels.get(ordinal)
    }

    pub fn is_leaf(&self, id: &LevelId) -> bool {
        self.level(id).is_some() && self.level_after(id).is_none()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Level> {
        self.levels.iter()
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}
