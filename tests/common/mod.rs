#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use results_ingest::{
    json_store::JsonFileStore,
    resolve::CatalogCategory,
    store::{MemoryStore, NamedRecord, StoreDocument},
};
use tempfile::{TempDir, tempdir};

pub const EVENT: &str = "copa-2024";

/// Header used by most organizer exports in these tests.
pub const HEADER: &str = "Posição,Atleta,Clube,Categoria,Tempo";

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }

    /// Creates a JSON store seeded with [`seed_document`].
    pub fn store(&self, name: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        JsonFileStore::create(&path, seed_document()).expect("create json store");
        path
    }
}

pub fn seed_document() -> StoreDocument {
    let mut document = StoreDocument::default();
    document.categories.insert(
        EVENT.to_string(),
        vec![
            CatalogCategory::new("cat-elite-m", "Elite Masculino"),
            CatalogCategory::new("cat-sub23-f", "Sub-23 Feminino"),
            CatalogCategory::new("cat-sub23", "Sub-23"),
        ],
    );
    document.people = vec![
        NamedRecord::new("user-1", "Atleta Elite 1 da Silva"),
        NamedRecord::new("user-2", "Joana Sub 1"),
    ];
    document.clubs = vec![NamedRecord::new("club-1", "Clube Pedal Forte")];
    document
}

pub fn seeded_memory_store() -> MemoryStore {
    MemoryStore::from_document(seed_document())
}

/// Seven Elite Masculino finishers (out of order) and three Sub-23 Feminino.
pub fn podium_csv() -> String {
    let mut lines = vec![HEADER.to_string()];
    for position in [3, 1, 7, 2, 5, 4, 6] {
        lines.push(format!(
            "{position},Atleta Elite {position},Pedal Forte,Elite Masculino,01:0{position}:00"
        ));
    }
    for position in 1..=3 {
        lines.push(format!(
            "{position},Joana Sub {position},Equipe Sul,Sub-23 Feminino,00:5{position}:00"
        ));
    }
    lines.join("\n") + "\n"
}
