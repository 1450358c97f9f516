#![allow(dead_code)]

use std::path::PathBuf;

use chrono::{DateTime, TimeZone, Utc};
use covhub::model::{Block, Coverage, CoverageEntry, Profile};
use covhub::store::SqliteCoverageStore;
use tempfile::TempDir;

/// Create a fresh temporary store, returning it plus the dir handle and db
/// path. The caller must hold onto `TempDir` to keep the directory alive.
pub fn setup_store() -> (SqliteCoverageStore, TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("test.db");
    let store = SqliteCoverageStore::open(&db_path).unwrap();
    (store, dir, db_path)
}

pub fn timestamp() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

pub fn profile(file: &str, blocks: &[(u32, u32, u64)]) -> Profile {
    let mut p = Profile::new(file.to_string());
    p.blocks = blocks
        .iter()
        .map(|&(s, e, c)| Block::new(s, e, c))
        .collect();
    p.recount();
    p
}

pub fn entry(name: &str, profiles: Vec<Profile>) -> CoverageEntry {
    let mut e = CoverageEntry::new(name.to_string());
    for p in profiles {
        e.profiles.insert(p.file_name.clone(), p);
    }
    e.recount();
    e
}

pub fn coverage(repo_id: i64, revision: &str, entries: Vec<CoverageEntry>) -> Coverage {
    let mut cov = Coverage::new(repo_id, revision.to_string(), timestamp());
    cov.entries = entries;
    cov
}
