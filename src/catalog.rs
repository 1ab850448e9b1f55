//! Quest Catalog
//!
//! Loads quest definitions from TOML files and seeds them into the ledger.
//!
//! ```toml
//! [[quests]]
//! name = "Clear the cellar"
//! description = "Rats again."
//! experience = 10
//! ```

use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::{info, warn};

use crate::error::{LedgerError, LedgerResult};
use crate::ledger::{Ledger, NewQuest};

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    quests: Vec<NewQuest>,
}

/// Quest definitions read from a catalog directory
#[derive(Debug, Default)]
pub struct QuestCatalog {
    quests: Vec<NewQuest>,
}

impl QuestCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load all `*.toml` files in a directory, in file name order
    pub fn load_from_directory(&mut self, path: &Path) -> LedgerResult<()> {
        if !path.exists() {
            warn!("Quest catalog directory does not exist: {:?}", path);
            return Ok(());
        }

        let mut files = Vec::new();
        for entry in fs::read_dir(path).map_err(|e| LedgerError::Catalog(e.to_string()))? {
            let entry = entry.map_err(|e| LedgerError::Catalog(e.to_string()))?;
            let file_path = entry.path();
            if file_path.extension().and_then(|s| s.to_str()) == Some("toml") {
                files.push(file_path);
            }
        }
        files.sort();

        for file_path in files {
            let contents = fs::read_to_string(&file_path)
                .map_err(|e| LedgerError::Catalog(format!("Failed to read {:?}: {}", file_path, e)))?;
            let file: CatalogFile = toml::from_str(&contents)
                .map_err(|e| LedgerError::Catalog(format!("Failed to parse {:?}: {}", file_path, e)))?;

            for mut quest in file.quests {
                // Names are stored trimmed, so compare them that way too
                quest.name = quest.name.trim().to_string();
                if self.quests.iter().any(|q| q.name == quest.name) {
                    warn!("Duplicate quest name '{}' in {:?}, skipping", quest.name, file_path);
                    continue;
                }
                self.quests.push(quest);
            }
        }

        info!("Loaded {} quest definitions", self.quests.len());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.quests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quests.is_empty()
    }

    /// Create every quest whose name is not already in the ledger. Returns how many were created.
    pub async fn seed(&self, ledger: &Ledger) -> LedgerResult<usize> {
        let mut created = 0;
        for quest in &self.quests {
            if ledger.find_quest_by_name(&quest.name).await?.is_some() {
                continue;
            }
            ledger.create_quest(quest.clone()).await?;
            created += 1;
        }
        if created > 0 {
            info!("Seeded {} quest(s) from catalog", created);
        }
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::MemoryLedger;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_file(dir: &Path, name: &str, contents: &str) {
        let mut file = fs::File::create(dir.join(name)).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
    }

    #[test]
    fn test_load_quests_from_directory() {
        let temp_dir = TempDir::new().unwrap();
        write_file(
            temp_dir.path(),
            "village.toml",
            r#"
[[quests]]
name = "Clear the cellar"
description = "Rats again."
experience = 10

[[quests]]
name = "Fetch water"
"#,
        );
        write_file(temp_dir.path(), "notes.txt", "not a quest file");

        let mut catalog = QuestCatalog::new();
        catalog.load_from_directory(temp_dir.path()).unwrap();

        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.quests[0].experience, 10);
        assert_eq!(catalog.quests[1].experience, 0);
    }

    #[tokio::test]
    async fn test_names_differing_only_by_whitespace_are_duplicates() {
        let temp_dir = TempDir::new().unwrap();
        write_file(
            temp_dir.path(),
            "a.toml",
            "[[quests]]\nname = \"Fetch water\"\nexperience = 5\n",
        );
        write_file(
            temp_dir.path(),
            "b.toml",
            "[[quests]]\nname = \"Fetch water \"\nexperience = 50\n",
        );

        let mut catalog = QuestCatalog::new();
        catalog.load_from_directory(temp_dir.path()).unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.quests[0].experience, 5);

        let ledger = Ledger::Memory(MemoryLedger::new());
        assert_eq!(catalog.seed(&ledger).await.unwrap(), 1);
        assert_eq!(ledger.list_quests().await.unwrap()[0].name, "Fetch water");
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let mut catalog = QuestCatalog::new();
        catalog.load_from_directory(&temp_dir.path().join("missing")).unwrap();
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_parse_error() {
        let temp_dir = TempDir::new().unwrap();
        write_file(temp_dir.path(), "broken.toml", "[[quests]]\nexperience = 5\n");

        let mut catalog = QuestCatalog::new();
        let err = catalog.load_from_directory(temp_dir.path()).unwrap_err();
        assert!(matches!(err, LedgerError::Catalog(_)));
    }

    #[tokio::test]
    async fn test_seed_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        write_file(
            temp_dir.path(),
            "a.toml",
            "[[quests]]\nname = \"Clear the cellar\"\nexperience = 10\n",
        );

        let mut catalog = QuestCatalog::new();
        catalog.load_from_directory(temp_dir.path()).unwrap();

        let ledger = Ledger::Memory(MemoryLedger::new());
        assert_eq!(catalog.seed(&ledger).await.unwrap(), 1);
        assert_eq!(catalog.seed(&ledger).await.unwrap(), 0);
        assert_eq!(ledger.list_quests().await.unwrap().len(), 1);
    }
}
