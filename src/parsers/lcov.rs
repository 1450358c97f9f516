//! Parser for the LCOV `.info` text format.
//!
//! Reference: https://ltp.sourceforge.net/coverage/lcov/geninfo.1.php
//!
//! Records used here:
//!   TN:<test name>
//!   SF:<path to source file>
//!   DA:<line number>,<execution count>[,<checksum>]
//!   end_of_record
//!
//! Other record types (FN/FNDA/BRDA/summary lines) are skipped; covhub
//! tracks line coverage only.

use std::collections::HashMap;
use std::io::BufRead;

use crate::error::{CovhubError, Result};
use crate::model::{Block, Profile};

/// Parse LCOV records from raw bytes into normalized per-file profiles.
///
/// Multiple records for the same file name are merged into one profile;
/// their per-line counts accumulate during post-processing. A record closed
/// without an `SF` marker is an error, as is input with no complete record
/// at all.
pub fn parse(input: &[u8]) -> Result<Vec<Profile>> {
    let mut reader = input;

    // Blocks per file, plus first-seen order so output is stable.
    let mut file_order: Vec<String> = Vec::new();
    let mut file_blocks: HashMap<String, Vec<Block>> = HashMap::new();

    let mut filename: Option<String> = None;
    let mut blocks: Vec<Block> = Vec::new();

    let mut raw_line = String::new();
    loop {
        raw_line.clear();
        let n = reader
            .read_line(&mut raw_line)
            .map_err(|_| CovhubError::Parse("invalid UTF-8 in LCOV data".to_string()))?;
        if n == 0 {
            break; // EOF
        }

        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }

        if line == "end_of_record" {
            let name = filename
                .take()
                .ok_or_else(|| CovhubError::Parse("no SF found for this TN".to_string()))?;
            if !file_blocks.contains_key(&name) {
                file_order.push(name.clone());
            }
            file_blocks.entry(name).or_default().append(&mut blocks);
            continue;
        }

        let (tag, value) = match line.split_once(':') {
            Some(pair) => pair,
            None => continue, // Skip lines we don't understand
        };

        match tag {
            "TN" => {
                // Start of a record; the test name itself is unused.
                blocks.clear();
            }
            "SF" => {
                filename = Some(value.to_string());
            }
            "DA" => {
                // DA:<line_number>,<execution_count>[,<checksum>]
                let mut parts = value.splitn(3, ',');
                let line_str = parts.next().unwrap_or_default();
                let count_str = parts.next().ok_or_else(|| {
                    CovhubError::Parse(format!("malformed DA record: {}", line))
                })?;
                let line_number: u32 = line_str.trim().parse().map_err(|_| {
                    CovhubError::Parse(format!("malformed DA record: {}", line))
                })?;
                let count: i64 = count_str.trim().parse().map_err(|_| {
                    CovhubError::Parse(format!("malformed DA record: {}", line))
                })?;
                // Some instrumenters use negative counts to mark
                // non-instrumentable lines; skip those.
                if count >= 0 {
                    blocks.push(Block::new(line_number, line_number, count as u64));
                }
            }
            _ => {}
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
