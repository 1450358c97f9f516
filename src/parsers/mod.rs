//! Parsers for raw coverage tool output.
//!
//! Each format parser converts its input into per-file [`Profile`]s with
//! single-line block fragments, then runs the shared post-processing step:
//! sort, accumulate duplicate lines, run-length merge adjacent equal-count
//! ranges, and recompute the derived totals.

pub mod gocover;
pub mod lcov;

use std::io::Read;

use crate::error::{CovhubError, Result};
use crate::model::Profile;

/// Supported coverage formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Lcov,
    Gocover,
}

impl Format {
    pub fn as_str(&self) -> &'static str {
        match self {
            Format::Lcov => "lcov",
            Format::Gocover => "gocover",
        }
    }
}

impl std::str::FromStr for Format {
    type Err = CovhubError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "lcov" => Ok(Format::Lcov),
            "gocover" | "go" => Ok(Format::Gocover),
            _ => Err(CovhubError::Parse(format!(
                "Unknown format: '{}'. Supported: lcov, gocover",
                s
            ))),
        }
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse raw coverage output, trying LCOV first and falling back to the
/// Go-style format when LCOV finds no records. Inputs matching neither
/// format are an error, never an empty list.
pub fn parse_coverage<R: Read>(mut reader: R) -> Result<Vec<Profile>> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf)?;
    parse_bytes(&buf)
}

/// Byte-slice variant of [`parse_coverage`].
///
/// The fallback fires only when LCOV found no record markers at all; a
/// malformed LCOV record (missing `SF`, bad `DA` numbers) is reported as
/// such rather than re-tried as another format.
pub fn parse_bytes(input: &[u8]) -> Result<Vec<Profile>> {
    match lcov::parse(input) {
        Ok(profiles) => Ok(profiles),
        Err(CovhubError::Parse(msg)) if msg == "no profile found" => gocover::parse(input),
        Err(e) => Err(e),
    }
}

/// Parse with an explicit format, skipping auto-detection.
pub fn parse_with_format(format: Format, input: &[u8]) -> Result<Vec<Profile>> {
    match format {
        Format::Lcov => lcov::parse(input),
        Format::Gocover => gocover::parse(input),
    }
}

/// Shared post-processing for every format parser.
pub(crate) fn postprocess(mut profiles: Vec<Profile>) -> Vec<Profile> {
    for p in &mut profiles {
        p.normalize();
    }
    profiles
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bytes_detects_lcov() {
        let input = b"TN:\nSF:src/lib.rs\nDA:1,1\nend_of_record\n";
        let profiles = parse_bytes(input).unwrap();
        assert_eq!(profiles.len(), 1);
        assert_eq!(profiles[0].file_name, "src/lib.rs");
    }

    #[test]
    fn test_parse_bytes_falls_back_to_gocover() {
        let input = b"mode: count\nexample.com/pkg/f.go:1.1,2.10 1 3\n";
        let profiles = parse_bytes(input).unwrap();
        assert_eq!(profiles.len(), 1);
        assert_eq!(profiles[0].file_name, "example.com/pkg/f.go");
        assert_eq!(profiles[0].lines, 2);
    }

    #[test]
    fn test_parse_bytes_empty_input_is_an_error() {
        let err = parse_bytes(b"").unwrap_err();
        assert!(err.to_string().contains("no profile found"));
    }

    #[test]
    fn test_parse_bytes_garbage_is_an_error() {
        let err = parse_bytes(b"hello world\n").unwrap_err();
        assert!(err.to_string().contains("no profile found"));
    }

    #[test]
    fn test_parse_bytes_malformed_lcov_does_not_fall_back() {
        let err = parse_bytes(b"TN:\nDA:1,1\nend_of_record\n").unwrap_err();
        assert!(err.to_string().contains("no SF found for this TN"));
    }

    #[test]
    fn test_format_round_trip() {
        use std::str::FromStr;
        assert_eq!(Format::from_str("lcov").unwrap(), Format::Lcov);
        assert_eq!(Format::from_str("gocover").unwrap(), Format::Gocover);
        assert_eq!(Format::from_str("go").unwrap(), Format::Gocover);
        assert!(Format::from_str("cobertura").is_err());
        assert_eq!(Format::Lcov.to_string(), "lcov");
    }
}
