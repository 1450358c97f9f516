//! Query-response construction for the web/API tier, plus the collaborator
//! traits the hosting application implements.
//!
//! Everything the HTTP layer needs is passed in explicitly; none of these
//! functions reach into ambient request state.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{CovhubError, Result};
use crate::model::{Block, Coverage, Repository};

/// Resolves an upload's repository URL to a registered repository.
/// Registration and access control live in the hosting application.
pub trait RepositoryResolver {
    fn resolve(&self, url: &str) -> Result<Option<Repository>>;
}

/// SCM collaborator: revision links for the UI and source content for the
/// single-file view.
pub trait Scm {
    fn revision_url(&self, repo: &Repository, revision: &str) -> String;
    fn fetch_source(&self, repo: &Repository, revision: &str, path: &str) -> Result<String>;
}

/// Resolve a repository URL, mapping absence to an error the upload path
/// can surface directly.
pub fn resolve_repo(resolver: &dyn RepositoryResolver, url: &str) -> Result<Repository> {
    if url.is_empty() {
        return Err(CovhubError::Parse("repo url is empty".to_string()));
    }
    resolver
        .resolve(url)?
        .ok_or_else(|| CovhubError::RepoNotFound(url.to_string()))
}

#[derive(Debug, Serialize)]
pub struct EntryResponse {
    pub name: String,
    pub hits: u64,
    pub lines: u64,
}

/// One coverage snapshot in the list view. Profiles are always omitted to
/// keep the payload small.
#[derive(Debug, Serialize)]
pub struct CoverageResponse {
    #[serde(rename = "index")]
    pub id: i64,
    #[serde(rename = "time")]
    pub timestamp: DateTime<Utc>,
    pub revision: String,
    pub revision_url: String,
    pub entries: Vec<EntryResponse>,
}

#[derive(Debug, Serialize)]
pub struct FileResponse {
    #[serde(rename = "filename")]
    pub file_name: String,
    pub hits: u64,
    pub lines: u64,
}

#[derive(Debug, Serialize)]
pub struct MetaResponse {
    pub revision: String,
    pub revision_url: String,
    #[serde(rename = "time")]
    pub timestamp: DateTime<Utc>,
    pub hits: u64,
    pub lines: u64,
}

#[derive(Debug, Serialize)]
pub struct FileListResponse {
    pub meta: MetaResponse,
    pub files: Vec<FileResponse>,
}

#[derive(Debug, Serialize)]
pub struct CodeResponse {
    #[serde(rename = "filename")]
    pub file_name: String,
    pub code: String,
    pub blocks: Vec<Block>,
}

pub fn make_coverage_response(scm: &dyn Scm, repo: &Repository, cov: &Coverage) -> CoverageResponse {
    CoverageResponse {
        id: cov.id,
        timestamp: cov.timestamp,
        revision: cov.revision.clone(),
        revision_url: scm.revision_url(repo, &cov.revision),
        entries: cov
            .entries
            .iter()
            .map(|e| EntryResponse {
                name: e.name.clone(),
                hits: e.hits,
                lines: e.lines,
            })
            .collect(),
    }
}

/// Build the list view for a repository, oldest first.
pub fn make_coverage_list_response(
    scm: &dyn Scm,
    repo: &Repository,
    coverages: &[Coverage],
) -> Vec<CoverageResponse> {
    let mut coverages: Vec<&Coverage> = coverages.iter().collect();
    coverages.sort_by_key(|c| c.timestamp);

    coverages
        .into_iter()
        .map(|cov| make_coverage_response(scm, repo, cov))
        .collect()
}

/// Build the file list for one entry of a coverage snapshot. Returns `None`
/// when the entry does not exist (the caller's 404).
pub fn make_file_list_response(
    scm: &dyn Scm,
    repo: &Repository,
    cov: &Coverage,
    entry_name: &str,
) -> Option<FileListResponse> {
    let entry = cov.find_entry(entry_name)?;

    // BTreeMap iteration is already sorted by file name.
    let files = entry
        .profiles
        .values()
        .map(|p| FileResponse {
            file_name: p.file_name.clone(),
            hits: p.hits,
            lines: p.lines,
        })
        .collect();

    Some(FileListResponse {
        meta: MetaResponse {
            revision: cov.revision.clone(),
            revision_url: scm.revision_url(repo, &cov.revision),
            timestamp: cov.timestamp,
            hits: entry.hits,
            lines: entry.lines,
        },
        files,
    })
}

/// Build the code view for one file of one entry: the profile's blocks plus
/// the source text fetched through the SCM collaborator. Returns `Ok(None)`
/// when the entry or file is unknown; SCM fetch failures propagate.
pub fn make_code_response(
    scm: &dyn Scm,
    repo: &Repository,
    cov: &Coverage,
    entry_name: &str,
    path: &str,
) -> Result<Option<CodeResponse>> {
    let entry = match cov.find_entry(entry_name) {
        Some(entry) => entry,
        None => return Ok(None),
    };
    let profile = match entry.profiles.get(path) {
        Some(profile) => profile,
        None => return Ok(None),
    };

    let code = scm.fetch_source(repo, &cov.revision, path)?;

    Ok(Some(CodeResponse {
        file_name: profile.file_name.clone(),
        code,
        blocks: profile.blocks.clone(),
    }))
}
