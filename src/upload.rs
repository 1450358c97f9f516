//! Upload request decoding and validation.
//!
//! The upload body is JSON produced by build jobs (directly or via the
//! `covhub upload` client). Decoding re-normalizes every profile and
//! recomputes all derived totals, so nothing downstream ever trusts the
//! hit/line numbers a client sent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CovhubError, Result};
use crate::model::{Coverage, CoverageEntry, Profile};

/// One named entry in an upload request. Also the unit of the persisted
/// entries blob, so the stored form and the wire form never drift apart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoverageEntryUploadRequest {
    #[serde(rename = "entry")]
    pub name: String,
    pub hits: u64,
    pub lines: u64,
    pub profiles: Vec<Profile>,
}

impl CoverageEntryUploadRequest {
    pub fn from_entry(entry: &CoverageEntry) -> Self {
        Self {
            name: entry.name.clone(),
            hits: entry.hits,
            lines: entry.lines,
            profiles: entry.profiles.values().cloned().collect(),
        }
    }
}

/// A complete upload request for one (repository, revision).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoverageUploadRequest {
    #[serde(rename = "repo")]
    pub repo_url: String,
    pub revision: String,
    #[serde(rename = "time")]
    pub timestamp: DateTime<Utc>,
    pub entries: Vec<CoverageEntryUploadRequest>,
}

/// Decode an upload request from raw JSON.
pub fn decode_request(body: &[u8]) -> Result<CoverageUploadRequest> {
    Ok(serde_json::from_slice(body)?)
}

/// Validate one request entry and build the model entry from it.
///
/// Duplicate file names within one entry are last-write-wins; every profile
/// is normalized and the entry totals recomputed.
pub fn parse_entry(req: &CoverageEntryUploadRequest) -> Result<CoverageEntry> {
    if req.name.is_empty() {
        return Err(CovhubError::Parse("entry name is empty".to_string()));
    }

    let mut entry = CoverageEntry::new(req.name.clone());
    for profile in &req.profiles {
        let mut profile = profile.clone();
        profile.normalize();
        entry.profiles.insert(profile.file_name.clone(), profile);
    }
    entry.recount();

    Ok(entry)
}

pub fn parse_entries(reqs: &[CoverageEntryUploadRequest]) -> Result<Vec<CoverageEntry>> {
    reqs.iter().map(parse_entry).collect()
}

/// Build an in-memory `Coverage` from a validated request and the resolved
/// repository id. The caller resolves the repository URL first; an empty URL
/// is rejected here as a backstop.
pub fn parse_upload_request(req: &CoverageUploadRequest, repo_id: i64) -> Result<Coverage> {
    if req.repo_url.is_empty() {
        return Err(CovhubError::Parse("repo url is empty".to_string()));
    }

    let mut cov = Coverage::new(repo_id, req.revision.clone(), req.timestamp);
    cov.entries = parse_entries(&req.entries)?;
    Ok(cov)
}
