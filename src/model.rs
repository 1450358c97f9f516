//! Uniform in-memory representation of coverage data, independent of any
//! specific upload format. Parsers produce `Profile`s, the upload decoder
//! assembles them into a `Coverage`, and the store persists one `Coverage`
//! per (repository, revision).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Compute a coverage rate, returning 0.0 when the total is zero.
#[must_use]
pub fn rate(covered: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        covered as f64 / total as f64
    }
}

/// A contiguous run of source lines sharing one execution count.
///
/// Serializes as a three-element array `[start_line, end_line, count]`,
/// which is the wire and storage form of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(u32, u32, u64)", into = "(u32, u32, u64)")]
pub struct Block {
    pub start_line: u32,
    pub end_line: u32,
    pub count: u64,
}

impl Block {
    pub fn new(start_line: u32, end_line: u32, count: u64) -> Self {
        Self {
            start_line,
            end_line,
            count,
        }
    }

    /// Number of source lines this block spans (both ends inclusive).
    #[must_use]
    pub fn span(&self) -> u64 {
        u64::from(self.end_line - self.start_line) + 1
    }
}

impl From<(u32, u32, u64)> for Block {
    fn from((start_line, end_line, count): (u32, u32, u64)) -> Self {
        Self {
            start_line,
            end_line,
            count,
        }
    }
}

impl From<Block> for (u32, u32, u64) {
    fn from(b: Block) -> Self {
        (b.start_line, b.end_line, b.count)
    }
}

/// Coverage data for a single source file: a normalized block list plus the
/// derived hit/line totals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(rename = "filename")]
    pub file_name: String,
    pub hits: u64,
    pub lines: u64,
    pub blocks: Vec<Block>,
}

impl Profile {
    pub fn new(file_name: String) -> Self {
        Self {
            file_name,
            ..Default::default()
        }
    }

    /// Sort blocks, accumulate duplicate ranges, coalesce adjacent runs with
    /// equal counts, then recompute the derived totals. Idempotent: applying
    /// it to an already-normalized profile is a no-op.
    pub fn normalize(&mut self) {
        self.blocks = normalize_blocks(std::mem::take(&mut self.blocks));
        self.recount();
    }

    /// Recompute `hits`/`lines` from `blocks`. Must be called by anything
    /// that changes the block list.
    pub fn recount(&mut self) {
        self.hits = self
            .blocks
            .iter()
            .filter(|b| b.count > 0)
            .map(Block::span)
            .sum();
        self.lines = self.blocks.iter().map(Block::span).sum();
    }
}

fn normalize_blocks(mut blocks: Vec<Block>) -> Vec<Block> {
    blocks.sort_by_key(|b| (b.start_line, b.end_line));

    // Fragments covering the same range accumulate their counts. Overlapping
    // instrumentation emits one single-line fragment per line, so equal start
    // implies equal range here.
    let mut merged: Vec<Block> = Vec::with_capacity(blocks.len());
    for b in blocks {
        match merged.last_mut() {
            Some(prev) if prev.start_line == b.start_line && prev.end_line == b.end_line => {
                prev.count += b.count;
            }
            _ => merged.push(b),
        }
    }

    merge_adjacent(merged)
}

/// Run-length merge: adjacent blocks with identical counts become one.
fn merge_adjacent(blocks: Vec<Block>) -> Vec<Block> {
    let mut ret: Vec<Block> = Vec::with_capacity(blocks.len());
    for b in blocks {
        match ret.last_mut() {
            Some(prev) if prev.end_line + 1 == b.start_line && prev.count == b.count => {
                prev.end_line = b.end_line;
            }
            _ => ret.push(b),
        }
    }
    ret
}

/// One named measurement unit within a revision, e.g. a language or test
/// suite. Holds at most one profile per file name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoverageEntry {
    pub name: String,
    pub hits: u64,
    pub lines: u64,
    pub profiles: BTreeMap<String, Profile>,
}

impl CoverageEntry {
    pub fn new(name: String) -> Self {
        Self {
            name,
            ..Default::default()
        }
    }

    /// Recompute `hits`/`lines` as sums over the profiles.
    pub fn recount(&mut self) {
        self.hits = self.profiles.values().map(|p| p.hits).sum();
        self.lines = self.profiles.values().map(|p| p.lines).sum();
    }
}

/// One persisted coverage snapshot for a (repository, revision) pair.
///
/// `id` is assigned by the store on first insert and stable across merges.
/// `timestamp` records the first upload; merges never advance it.
#[derive(Debug, Clone, PartialEq)]
pub struct Coverage {
    pub id: i64,
    pub repo_id: i64,
    pub revision: String,
    pub timestamp: DateTime<Utc>,
    pub entries: Vec<CoverageEntry>,
}

impl Coverage {
    pub fn new(repo_id: i64, revision: String, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            repo_id,
            revision,
            timestamp,
            entries: Vec::new(),
        }
    }

    #[must_use]
    pub fn find_entry(&self, name: &str) -> Option<&CoverageEntry> {
        self.entries.iter().find(|e| e.name == name)
    }
}

/// Repository identity, owned by the hosting application and resolved from
/// an upload's repository URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub id: i64,
    pub url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_serializes_as_array() {
        let json = serde_json::to_string(&Block::new(5, 8, 2)).unwrap();
        assert_eq!(json, "[5,8,2]");

        let back: Block = serde_json::from_str("[5,8,2]").unwrap();
        assert_eq!(back, Block::new(5, 8, 2));
    }

    #[test]
    fn test_normalize_coalesces_adjacent_equal_counts() {
        let mut p = Profile::new("a.rs".to_string());
        p.blocks = vec![
            Block::new(5, 5, 1),
            Block::new(6, 6, 1),
            Block::new(10, 10, 0),
        ];
        p.normalize();

        assert_eq!(p.blocks, vec![Block::new(5, 6, 1), Block::new(10, 10, 0)]);
        assert_eq!(p.hits, 2);
        assert_eq!(p.lines, 3);
    }

    #[test]
    fn test_normalize_accumulates_duplicate_lines() {
        let mut p = Profile::new("a.rs".to_string());
        p.blocks = vec![
            Block::new(3, 3, 2),
            Block::new(3, 3, 5),
            Block::new(4, 4, 7),
        ];
        p.normalize();

        // 3 and 4 both end up at count 7, then coalesce.
        assert_eq!(p.blocks, vec![Block::new(3, 4, 7)]);
        assert_eq!(p.hits, 2);
        assert_eq!(p.lines, 2);
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let mut p = Profile::new("a.rs".to_string());
        p.blocks = vec![
            Block::new(1, 1, 1),
            Block::new(2, 2, 1),
            Block::new(4, 4, 0),
        ];
        p.normalize();
        let once = p.clone();
        p.normalize();
        assert_eq!(p, once);
    }

    #[test]
    fn test_recount_hits_never_exceed_lines() {
        let mut p = Profile::new("a.rs".to_string());
        p.blocks = vec![Block::new(1, 3, 9), Block::new(4, 6, 0)];
        p.recount();
        assert!(p.hits <= p.lines);
        assert_eq!(p.hits, 3);
        assert_eq!(p.lines, 6);
    }

    #[test]
    fn test_entry_recount_sums_profiles() {
        let mut a = Profile::new("a.rs".to_string());
        a.blocks = vec![Block::new(1, 2, 1)];
        a.recount();
        let mut b = Profile::new("b.rs".to_string());
        b.blocks = vec![Block::new(1, 4, 0)];
        b.recount();

        let mut entry = CoverageEntry::new("go".to_string());
        entry.profiles.insert(a.file_name.clone(), a);
        entry.profiles.insert(b.file_name.clone(), b);
        entry.recount();

        assert_eq!(entry.hits, 2);
        assert_eq!(entry.lines, 6);
    }

    #[test]
    fn test_rate() {
        assert_eq!(rate(0, 0), 0.0);
        assert_eq!(rate(1, 2), 0.5);
    }
}
