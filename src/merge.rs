//! Pure merge operations for combining partial uploads of one revision.
//!
//! Entry merge is a dictionary union over file names, which makes the
//! aggregate result commutative and associative: applying any number of
//! uploads in any order converges to the same per-file totals. That property
//! is what lets the provider serialize concurrent uploads without caring
//! about their arrival order.

use std::collections::BTreeMap;

use crate::error::{CovhubError, Result};
use crate::model::{Coverage, CoverageEntry};

/// Merge two entries with the same name into one.
///
/// Profiles are unioned by file name. When both sides cover the same file,
/// the incoming side (`b`) wins: it represents the newer upload, typically a
/// retry or re-run of the same job. Totals are recomputed from the merged
/// profile set, never copied from an operand.
pub fn merge_entry(a: &CoverageEntry, b: &CoverageEntry) -> CoverageEntry {
    let mut merged = CoverageEntry::new(a.name.clone());

    for (file, profile) in &a.profiles {
        merged.profiles.insert(file.clone(), profile.clone());
    }
    for (file, profile) in &b.profiles {
        merged.profiles.insert(file.clone(), profile.clone());
    }

    merged.recount();
    merged
}

/// Merge two coverages for the same (repository, revision) into one.
///
/// The result keeps `a`'s id and timestamp: `a` is the previously stored
/// record and the creation time of a snapshot never advances on merge.
/// Entries present in both operands are combined with [`merge_entry`];
/// the result is sorted by entry name for deterministic serialization.
pub fn merge_coverage(a: &Coverage, b: &Coverage) -> Result<Coverage> {
    if a.repo_id != b.repo_id || a.revision != b.revision {
        return Err(CovhubError::Merge(
            "can not merge two coverages with different repo and/or revision".to_string(),
        ));
    }

    let mut entries: BTreeMap<String, CoverageEntry> = BTreeMap::new();

    for e in &a.entries {
        entries.insert(e.name.clone(), e.clone());
    }
    for e in &b.entries {
        match entries.get(&e.name) {
            Some(existing) => {
                let merged = merge_entry(existing, e);
                entries.insert(e.name.clone(), merged);
            }
            None => {
                entries.insert(e.name.clone(), e.clone());
            }
        }
    }

    Ok(Coverage {
        id: a.id,
        repo_id: a.repo_id,
        revision: a.revision.clone(),
        timestamp: a.timestamp,
        entries: entries.into_values().collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Block, Profile};
    use chrono::{TimeZone, Utc};

    fn profile(file: &str, blocks: Vec<Block>) -> Profile {
        let mut p = Profile::new(file.to_string());
        p.blocks = blocks;
        p.recount();
        p
    }

    fn entry(name: &str, profiles: Vec<Profile>) -> CoverageEntry {
        let mut e = CoverageEntry::new(name.to_string());
        for p in profiles {
            e.profiles.insert(p.file_name.clone(), p);
        }
        e.recount();
        e
    }

    fn coverage(repo_id: i64, revision: &str, entries: Vec<CoverageEntry>) -> Coverage {
        let mut cov = Coverage::new(
            repo_id,
            revision.to_string(),
            Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
        );
        cov.entries = entries;
        cov
    }

    #[test]
    fn test_merge_entry_unions_disjoint_files() {
        let a = entry("go", vec![profile("a.go", vec![Block::new(1, 2, 1)])]);
        let b = entry("go", vec![profile("b.go", vec![Block::new(1, 4, 0)])]);

        let merged = merge_entry(&a, &b);

        assert_eq!(merged.profiles.len(), 2);
        assert_eq!(merged.hits, 2);
        assert_eq!(merged.lines, 6);
    }

    #[test]
    fn test_merge_entry_same_file_prefers_incoming() {
        let a = entry("go", vec![profile("a.go", vec![Block::new(1, 2, 0)])]);
        let b = entry("go", vec![profile("a.go", vec![Block::new(1, 2, 9)])]);

        let merged = merge_entry(&a, &b);

        assert_eq!(merged.profiles.len(), 1);
        assert_eq!(merged.profiles["a.go"].blocks, vec![Block::new(1, 2, 9)]);
        assert_eq!(merged.hits, 2);
        assert_eq!(merged.lines, 2);
    }

    #[test]
    fn test_merge_coverage_disjoint_entries_sorted_by_name() {
        let a = coverage(1, "rev", vec![entry("rust", vec![])]);
        let b = coverage(1, "rev", vec![entry("go", vec![])]);

        let merged = merge_coverage(&a, &b).unwrap();

        let names: Vec<&str> = merged.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["go", "rust"]);
    }

    #[test]
    fn test_merge_coverage_combines_same_name_entries() {
        let a = coverage(
            1,
            "rev",
            vec![entry("go", vec![profile("a.go", vec![Block::new(1, 2, 1)])])],
        );
        let b = coverage(
            1,
            "rev",
            vec![entry("go", vec![profile("b.go", vec![Block::new(1, 2, 1)])])],
        );

        let merged = merge_coverage(&a, &b).unwrap();

        assert_eq!(merged.entries.len(), 1);
        assert_eq!(merged.entries[0].profiles.len(), 2);
        assert_eq!(merged.entries[0].hits, 4);
        assert_eq!(merged.entries[0].lines, 4);
    }

    #[test]
    fn test_merge_coverage_keeps_first_timestamp_and_id() {
        let mut a = coverage(1, "rev", vec![]);
        a.id = 42;
        let mut b = coverage(1, "rev", vec![]);
        b.timestamp = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();

        let merged = merge_coverage(&a, &b).unwrap();

        assert_eq!(merged.id, 42);
        assert_eq!(merged.timestamp, a.timestamp);
    }

    #[test]
    fn test_merge_coverage_different_repo_is_an_error() {
        let a = coverage(1, "rev", vec![]);
        let b = coverage(2, "rev", vec![]);
        assert!(merge_coverage(&a, &b).is_err());
    }

    #[test]
    fn test_merge_coverage_different_revision_is_an_error() {
        let a = coverage(1, "rev-a", vec![]);
        let b = coverage(1, "rev-b", vec![]);
        assert!(merge_coverage(&a, &b).is_err());
    }

    #[test]
    fn test_merge_coverage_is_commutative_on_disjoint_files() {
        let a = coverage(
            1,
            "rev",
            vec![
                entry("go", vec![profile("a.go", vec![Block::new(1, 5, 1)])]),
                entry("rust", vec![profile("x.rs", vec![Block::new(1, 3, 0)])]),
            ],
        );
        let b = coverage(
            1,
            "rev",
            vec![entry("go", vec![profile("b.go", vec![Block::new(2, 4, 2)])])],
        );

        let ab = merge_coverage(&a, &b).unwrap();
        let ba = merge_coverage(&b, &a).unwrap();

        assert_eq!(ab.entries, ba.entries);
    }
}
