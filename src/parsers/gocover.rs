//! Parser for Go's `-coverprofile` text format.
//!
//! Reference: https://go.dev/blog/cover
//!
//! Format:
//!   mode: set|count|atomic
//!   <file>:<startLine>.<startCol>,<endLine>.<endCol> <numStatements> <count>
//!
//! Each line describes a basic block (a range of source lines) with its
//! execution count. Since covhub tracks per-line coverage, every block is
//! expanded into one fragment per line carrying the block's count; counts of
//! fragments landing on the same line accumulate during post-processing.
//! `numStatements` is ignored: without the source it cannot be mapped back
//! to lines.

use std::collections::HashMap;
use std::io::BufRead;

use crate::error::{CovhubError, Result};
use crate::model::{Block, Profile};

/// Parse a Go coverage profile from raw bytes into normalized per-file
/// profiles. Lines that do not match the block grammar are skipped; input
/// with no matching line at all is an error.
pub fn parse(input: &[u8]) -> Result<Vec<Profile>> {
    let mut reader = input;

    let mut file_order: Vec<String> = Vec::new();
    let mut file_blocks: HashMap<String, Vec<Block>> = HashMap::new();

    let mut raw_line = String::new();
    loop {
        raw_line.clear();
        let n = reader
            .read_line(&mut raw_line)
            .map_err(|_| CovhubError::Parse("invalid UTF-8 in Go coverage data".to_string()))?;
        if n == 0 {
            break;
        }

        let line = raw_line.trim();
        if line.is_empty() || line.starts_with("mode:") {
            continue;
        }

        if let Some((file, start_line, end_line, count)) = parse_block_line(line) {
            let file_str = file.to_string();
            if !file_blocks.contains_key(&file_str) {
                file_order.push(file_str.clone());
            }
            let blocks = file_blocks.entry(file_str).or_default();
            for l in start_line..=end_line {
                blocks.push(Block::new(l, l, count));
            }
        }
    }

    if file_order.is_empty() {
        return Err(CovhubError::Parse("no profile found".to_string()));
    }

    let mut profiles = Vec::with_capacity(file_order.len());
    for name in file_order {
        let mut profile = Profile::new(name);
        if let Some(blocks) = file_blocks.remove(&profile.file_name) {
            profile.blocks = blocks;
        }
        profiles.push(profile);
    }

    Ok(super::postprocess(profiles))
}

/// Parse a single block line, returning (file_path, start_line, end_line,
/// count).
///
/// The path/range separator is the last `:` on the line, so paths containing
/// colons survive.
fn parse_block_line(line: &str) -> Option<(&str, u32, u32, u64)> {
    let (file, rest) = line.rsplit_once(':')?;
    if file.is_empty() {
        return None;
    }

    // rest = "startLine.startCol,endLine.endCol numStmt count"
    let (range, tail) = rest.split_once(' ')?;
    let (start, end) = range.split_once(',')?;

    let start_line: u32 = start.split_once('.')?.0.parse().ok()?;
    let end_line: u32 = end.split_once('.')?.0.parse().ok()?;
    if end_line < start_line {
        return None;
    }

    let mut parts = tail.split_whitespace();
    let _num_stmt: u64 = parts.next()?.parse().ok()?;
    let count: u64 = parts.next()?.parse().ok()?;

    Some((file, start_line, end_line, count))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_gocover() {
        let input = b"mode: count\n\
            github.com/user/project/main.go:10.2,12.10 2 5\n\
            github.com/user/project/main.go:14.2,16.3 1 0\n\
            github.com/user/project/util.go:3.1,5.2 2 3\n";
        let profiles = parse(input).unwrap();

        assert_eq!(profiles.len(), 2);

        let main = &profiles[0];
        assert_eq!(main.file_name, "github.com/user/project/main.go");
        assert_eq!(main.blocks, vec![Block::new(10, 12, 5), Block::new(14, 16, 0)]);
        assert_eq!(main.hits, 3);
        assert_eq!(main.lines, 6);

        let util = &profiles[1];
        assert_eq!(util.file_name, "github.com/user/project/util.go");
        assert_eq!(util.blocks, vec![Block::new(3, 5, 3)]);
        assert_eq!(util.hits, 3);
        assert_eq!(util.lines, 3);
    }

    #[test]
    fn test_parse_gocover_overlapping_blocks_accumulate() {
        let input = b"mode: count\n\
            example.com/pkg/f.go:5.1,7.10 3 2\n\
            example.com/pkg/f.go:6.1,8.10 2 7\n";
        let profiles = parse(input).unwrap();

        assert_eq!(profiles.len(), 1);
        // Line 5: 2. Lines 6-7: 2+7=9. Line 8: 7.
        assert_eq!(
            profiles[0].blocks,
            vec![
                Block::new(5, 5, 2),
                Block::new(6, 7, 9),
                Block::new(8, 8, 7),
            ]
        );
        assert_eq!(profiles[0].lines, 4);
        assert_eq!(profiles[0].hits, 4);
    }

    #[test]
    fn test_parse_gocover_path_with_colon() {
        let input = b"mode: set\nC:/work/project/main.go:1.1,2.5 1 1\n";
        let profiles = parse(input).unwrap();
        assert_eq!(profiles[0].file_name, "C:/work/project/main.go");
        assert_eq!(profiles[0].blocks, vec![Block::new(1, 2, 1)]);
    }

    #[test]
    fn test_parse_gocover_no_mode_header() {
        // Some merge tools produce profiles without a mode line.
        let input = b"example.com/pkg/f.go:1.1,5.10 2 3\n";
        let profiles = parse(input).unwrap();
        assert_eq!(profiles.len(), 1);
        assert_eq!(profiles[0].blocks, vec![Block::new(1, 5, 3)]);
    }

    #[test]
    fn test_parse_gocover_empty_is_an_error() {
        let err = parse(b"").unwrap_err();
        assert!(err.to_string().contains("no profile found"));

        // A mode header alone carries no coverage either.
        assert!(parse(b"mode: count\n").is_err());
    }

    #[test]
    fn test_parse_block_line() {
        let (file, start, end, count) =
            parse_block_line("github.com/user/repo/file.go:10.1,20.5 3 1").unwrap();
        assert_eq!(file, "github.com/user/repo/file.go");
        assert_eq!(start, 10);
        assert_eq!(end, 20);
        assert_eq!(count, 1);

        assert!(parse_block_line("mode: count").is_none());
        assert!(parse_block_line("SF:src/lib.rs").is_none());
        assert!(parse_block_line("").is_none());
    }
}
