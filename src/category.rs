use crate::error::{Error, Result};
use crate::library::{write_file_atomic, FileEntry, DEFAULT_CATEGORY};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fs, io, path::Path};
use tracing::warn;

/// PWAD display name -> category label. `FileEntry::category` is a cache of
/// this map, refreshed by [`CategoryIndex::apply`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CategoryIndex {
    categories: Vec<String>,
    #[serde(default)]
    assignments: BTreeMap<String, String>,
}

impl Default for CategoryIndex {
    fn default() -> Self {
        Self {
            categories: vec![DEFAULT_CATEGORY.to_string()],
            assignments: BTreeMap::new(),
        }
    }
}

impl CategoryIndex {
    pub fn load(path: &Path) -> Self {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Self::default(),
            Err(err) => {
                warn!("Couldn't read category list {}: {err}", path.display());
                return Self::default();
            }
        };
        match serde_json::from_str::<CategoryIndex>(&raw) {
            Ok(mut index) => {
                index.normalize();
                index
            }
            Err(err) => {
                warn!(
                    "Category list {} is malformed ({err}); starting fresh",
                    path.display()
                );
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let raw = serde_json::to_vec_pretty(self)?;
        write_file_atomic(path, &raw)
    }

    fn normalize(&mut self) {
        self.categories.retain(|name| name != DEFAULT_CATEGORY);
        self.categories.insert(0, DEFAULT_CATEGORY.to_string());
        let mut seen = Vec::with_capacity(self.categories.len());
        self.categories.retain(|name| {
            if seen.contains(name) {
                false
            } else {
                seen.push(name.clone());
                true
            }
        });
        let missing: Vec<String> = self
            .assignments
            .values()
            .filter(|category| !self.categories.contains(*category))
            .cloned()
            .collect();
        for category in missing {
            if !self.categories.contains(&category) {
                self.categories.push(category);
            }
        }
    }

    pub fn default_category(&self) -> &str {
        DEFAULT_CATEGORY
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    pub fn contains(&self, category: &str) -> bool {
        self.categories.iter().any(|name| name == category)
    }

    /// Category of `name`; unassigned names are registered under the default.
    pub fn lookup(&mut self, name: &str) -> String {
        self.assignments
            .entry(name.to_string())
            .or_insert_with(|| DEFAULT_CATEGORY.to_string())
            .clone()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.assignments.get(name).map(String::as_str)
    }

    pub fn members(&self, category: &str) -> Vec<&str> {
        self.assignments
            .iter()
            .filter(|(_, assigned)| assigned.as_str() == category)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn add_category(&mut self, category: &str) -> Result<()> {
        let category = category.trim();
        if category.is_empty() {
            return Err(Error::InvariantViolation(
                "category name cannot be empty".to_string(),
            ));
        }
        if self.contains(category) {
            return Err(Error::DuplicateCategory(category.to_string()));
        }
        self.categories.push(category.to_string());
        Ok(())
    }

    pub fn assign(&mut self, name: &str, category: &str) -> Result<()> {
        let category = category.trim();
        if !self.contains(category) {
            self.add_category(category)?;
        }
        self.assignments
            .insert(name.to_string(), category.to_string());
        Ok(())
    }

    /// Renaming onto an existing category merges the two.
    pub fn rename(&mut self, old: &str, new: &str) -> Result<()> {
        let new = new.trim();
        if old == DEFAULT_CATEGORY {
            return Err(Error::InvariantViolation(format!(
                "{DEFAULT_CATEGORY} is the default category and cannot be renamed"
            )));
        }
        let Some(position) = self.categories.iter().position(|name| name == old) else {
            return Err(Error::UnknownCategory(old.to_string()));
        };
        if new.is_empty() {
            return Err(Error::InvariantViolation(
                "category name cannot be empty".to_string(),
            ));
        }
        if old == new {
            return Ok(());
        }

        if self.contains(new) {
            self.categories.remove(position);
        } else {
            self.categories[position] = new.to_string();
        }
        self.move_members(old, new);
        Ok(())
    }

    pub fn delete(&mut self, category: &str) -> Result<()> {
        if category == DEFAULT_CATEGORY {
            return Err(Error::InvariantViolation(format!(
                "{DEFAULT_CATEGORY} is the default category and cannot be removed"
            )));
        }
        let Some(position) = self.categories.iter().position(|name| name == category) else {
            return Err(Error::UnknownCategory(category.to_string()));
        };
        self.move_members(category, DEFAULT_CATEGORY);
        self.categories.remove(position);
        Ok(())
    }

    fn move_members(&mut self, from: &str, to: &str) {
        for assigned in self.assignments.values_mut() {
            if assigned == from {
                *assigned = to.to_string();
            }
        }
    }

    /// Refreshes the cached category on each patch entry.
    pub fn apply<'a>(&mut self, entries: impl IntoIterator<Item = &'a mut FileEntry>) {
        for entry in entries {
            if entry.is_patch() {
                entry.category = self.lookup(&entry.name());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_defaults_and_registers() {
        let mut index = CategoryIndex::default();
        assert_eq!(index.lookup("sunlust.wad"), DEFAULT_CATEGORY);
        assert_eq!(index.members(DEFAULT_CATEGORY), vec!["sunlust.wad"]);
        assert_eq!(index.get("sunlust.wad"), Some(DEFAULT_CATEGORY));
    }

    #[test]
    fn assign_creates_missing_category() {
        let mut index = CategoryIndex::default();
        index.assign("eviternity.wad", "Megawads").unwrap();
        assert!(index.contains("Megawads"));
        assert_eq!(index.lookup("eviternity.wad"), "Megawads");
    }

    #[test]
    fn add_category_rejects_duplicates() {
        let mut index = CategoryIndex::default();
        index.add_category("Gameplay").unwrap();
        assert!(matches!(
            index.add_category("Gameplay"),
            Err(Error::DuplicateCategory(_))
        ));
        assert!(matches!(
            index.add_category(DEFAULT_CATEGORY),
            Err(Error::DuplicateCategory(_))
        ));
    }

    #[test]
    fn delete_moves_members_to_default() {
        let mut index = CategoryIndex::default();
        index.assign("a.wad", "Maps").unwrap();
        index.assign("b.pk3", "Maps").unwrap();
        index.assign("c.pk3", "Gameplay").unwrap();

        index.delete("Maps").unwrap();

        assert!(!index.contains("Maps"));
        assert_eq!(index.members(DEFAULT_CATEGORY), vec!["a.wad", "b.pk3"]);
        assert_eq!(index.lookup("c.pk3"), "Gameplay");
    }

    #[test]
    fn default_category_cannot_be_deleted_or_renamed() {
        let mut index = CategoryIndex::default();
        index.lookup("a.wad");
        assert!(matches!(
            index.delete(DEFAULT_CATEGORY),
            Err(Error::InvariantViolation(_))
        ));
        assert!(matches!(
            index.rename(DEFAULT_CATEGORY, "Other"),
            Err(Error::InvariantViolation(_))
        ));
        assert!(index.contains(DEFAULT_CATEGORY));
        assert_eq!(index.lookup("a.wad"), DEFAULT_CATEGORY);
    }

    #[test]
    fn delete_unknown_category_fails() {
        let mut index = CategoryIndex::default();
        assert!(matches!(
            index.delete("Nope"),
            Err(Error::UnknownCategory(_))
        ));
    }

    #[test]
    fn rename_keeps_position_and_members() {
        let mut index = CategoryIndex::default();
        index.add_category("Maps").unwrap();
        index.add_category("Mods").unwrap();
        index.assign("a.wad", "Maps").unwrap();

        index.rename("Maps", "Megawads").unwrap();

        assert_eq!(index.categories(), &[DEFAULT_CATEGORY, "Megawads", "Mods"]);
        assert_eq!(index.lookup("a.wad"), "Megawads");
    }

    #[test]
    fn rename_onto_existing_merges() {
        let mut index = CategoryIndex::default();
        index.assign("a.wad", "Maps").unwrap();
        index.assign("b.wad", "Megawads").unwrap();

        index.rename("Maps", "Megawads").unwrap();

        assert!(!index.contains("Maps"));
        assert_eq!(index.members("Megawads"), vec!["a.wad", "b.wad"]);
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("categories.json");
        let mut index = CategoryIndex::default();
        index.assign("a.wad", "Maps").unwrap();
        index.lookup("b.wad");
        index.save(&path).unwrap();

        assert_eq!(CategoryIndex::load(&path), index);
    }

    #[test]
    fn malformed_or_missing_file_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("categories.json");
        assert_eq!(CategoryIndex::load(&path), CategoryIndex::default());
        fs::write(&path, "{ not json").unwrap();
        assert_eq!(CategoryIndex::load(&path), CategoryIndex::default());
    }

    #[test]
    fn load_restores_default_category() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("categories.json");
        fs::write(
            &path,
            r#"{"categories":["Maps"],"assignments":{"x.wad":"Slaughter"}}"#,
        )
        .unwrap();
        let index = CategoryIndex::load(&path);
        assert_eq!(index.categories(), &[DEFAULT_CATEGORY, "Maps", "Slaughter"]);
    }
}
