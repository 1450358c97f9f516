//! Command handler functions for the covhub CLI.
//!
//! Each `cmd_*` function returns its output as a `String`, making them easy
//! to test without capturing stdout. Local commands operate on a SQLite
//! store directly; `upload` talks to a covhub server over HTTP.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};

use crate::api::{self, Scm};
use crate::error::CovhubError;
use crate::model::{Coverage, CoverageEntry, Repository};
use crate::parsers::{self, Format};
use crate::provider::CoverageProvider;
use crate::store::CoverageStore;
use crate::upload::{
    decode_request, parse_upload_request, CoverageEntryUploadRequest, CoverageUploadRequest,
};

/// SCM collaborator for local commands: builds revision links when a
/// repository URL is known, and has no source access.
struct UrlScm;

impl Scm for UrlScm {
    fn revision_url(&self, repo: &Repository, revision: &str) -> String {
        if repo.url.is_empty() {
            String::new()
        } else {
            format!("{}/commit/{}", repo.url, revision)
        }
    }

    fn fetch_source(
        &self,
        _repo: &Repository,
        _revision: &str,
        path: &str,
    ) -> crate::error::Result<String> {
        Err(CovhubError::Other(format!(
            "source for {} is not available locally",
            path
        )))
    }
}

fn parse_profiles(
    file: &Path,
    format_override: Option<&str>,
    strip_prefix: Option<&str>,
) -> Result<Vec<crate::model::Profile>> {
    let content = std::fs::read(file)
        .with_context(|| format!("Failed to read coverage file {}", file.display()))?;

    let mut profiles = match format_override {
        Some(fmt) => {
            let format: Format = fmt.parse()?;
            parsers::parse_with_format(format, &content)?
        }
        None => parsers::parse_bytes(&content)?,
    };

    // Tools often emit paths relative to the build machine or module root;
    // stripping a prefix makes them repo-relative.
    if let Some(prefix) = strip_prefix {
        let prefix = prefix.trim_end_matches('/');
        for p in &mut profiles {
            if let Some(rest) = p.file_name.strip_prefix(prefix) {
                p.file_name = rest.trim_start_matches('/').to_string();
            }
        }
    }

    Ok(profiles)
}

fn entry_from_profiles(name: &str, profiles: Vec<crate::model::Profile>) -> Result<CoverageEntry> {
    if name.is_empty() {
        bail!("entry name is empty");
    }
    let mut entry = CoverageEntry::new(name.to_string());
    for p in profiles {
        entry.profiles.insert(p.file_name.clone(), p);
    }
    entry.recount();
    Ok(entry)
}

/// Parse a raw coverage file and add it to the local store as one entry of
/// a (repo, revision) snapshot.
pub fn cmd_ingest<S: CoverageStore>(
    provider: &CoverageProvider<S>,
    file: &Path,
    format_override: Option<&str>,
    strip_prefix: Option<&str>,
    repo_id: i64,
    revision: &str,
    entry_name: &str,
    timestamp: DateTime<Utc>,
) -> Result<String> {
    let profiles = parse_profiles(file, format_override, strip_prefix)?;
    let entry = entry_from_profiles(entry_name, profiles)?;

    let mut cov = Coverage::new(repo_id, revision.to_string(), timestamp);
    cov.entries = vec![entry];

    let stored = provider.add_coverage(cov)?;
    let entry = match stored.find_entry(entry_name) {
        Some(e) => e,
        None => bail!("stored coverage is missing entry '{}'", entry_name),
    };

    Ok(format!(
        "Added '{}' to coverage {} (repo {}, revision {}): {}/{} lines covered\n",
        entry_name, stored.id, repo_id, revision, entry.hits, entry.lines,
    ))
}

/// Apply an upload-request JSON document to the local store, exactly as the
/// server's upload endpoint would.
pub fn cmd_apply<S: CoverageStore>(
    provider: &CoverageProvider<S>,
    file: &Path,
    repo_id: i64,
) -> Result<String> {
    let body = std::fs::read(file)
        .with_context(|| format!("Failed to read request file {}", file.display()))?;
    let request = decode_request(&body)?;
    let cov = parse_upload_request(&request, repo_id)?;
    let stored = provider.add_coverage(cov)?;

    Ok(format!(
        "Applied upload for revision {}: coverage {} now has {} entries\n",
        stored.revision,
        stored.id,
        stored.entries.len(),
    ))
}

/// Render the coverage-list response for a repository as JSON.
pub fn cmd_list<S: CoverageStore>(
    provider: &CoverageProvider<S>,
    repo_id: i64,
    repo_url: Option<&str>,
) -> Result<String> {
    let repo = Repository {
        id: repo_id,
        url: repo_url.unwrap_or_default().to_string(),
    };
    let coverages = provider.list(repo_id);
    let resp = api::make_coverage_list_response(&UrlScm, &repo, &coverages);
    let mut out = serde_json::to_string_pretty(&resp)?;
    out.push('\n');
    Ok(out)
}

/// Render the file-list response for one entry of one coverage as JSON.
pub fn cmd_files<S: CoverageStore>(
    provider: &CoverageProvider<S>,
    coverage_id: i64,
    entry_name: &str,
    repo_url: Option<&str>,
) -> Result<String> {
    let cov = match provider.find(coverage_id)? {
        Some(cov) => cov,
        None => bail!("no coverage with id {}", coverage_id),
    };
    let repo = Repository {
        id: cov.repo_id,
        url: repo_url.unwrap_or_default().to_string(),
    };

    let resp = match api::make_file_list_response(&UrlScm, &repo, &cov, entry_name) {
        Some(resp) => resp,
        None => bail!("coverage {} has no entry '{}'", coverage_id, entry_name),
    };
    let mut out = serde_json::to_string_pretty(&resp)?;
    out.push('\n');
    Ok(out)
}

/// Build the upload request for a set of coverage files, all under one
/// entry name.
pub fn build_upload_request(
    files: &[PathBuf],
    format_override: Option<&str>,
    strip_prefix: Option<&str>,
    repo_url: &str,
    revision: &str,
    entry_name: &str,
    timestamp: DateTime<Utc>,
) -> Result<CoverageUploadRequest> {
    if repo_url.is_empty() {
        bail!("repo url is empty");
    }

    let mut entries = Vec::new();
    for file in files {
        let profiles = parse_profiles(file, format_override, strip_prefix)?;
        let entry = entry_from_profiles(entry_name, profiles)?;
        entries.push(CoverageEntryUploadRequest::from_entry(&entry));
    }

    Ok(CoverageUploadRequest {
        repo_url: repo_url.to_string(),
        revision: revision.to_string(),
        timestamp,
        entries,
    })
}

/// POST an upload request to a covhub server. The API key is read from the
/// `COVHUB_API_KEY` environment variable.
pub fn cmd_upload(
    server: &str,
    request: &CoverageUploadRequest,
    dry_run: bool,
) -> Result<String> {
    let body = serde_json::to_string_pretty(request)?;

    if dry_run {
        return Ok(format!("{}\n", body));
    }

    let token = std::env::var("COVHUB_API_KEY")
        .context("COVHUB_API_KEY environment variable is required")?;
    let url = format!("{}/api/coverages", server.trim_end_matches('/'));

    let resp = ureq::post(&url)
        .set("Authorization", &format!("Bearer {}", token))
        .set("Content-Type", "application/json")
        .send_string(&body);

    match resp {
        Ok(_) => Ok(format!("Uploaded revision {} to {}\n", request.revision, server)),
        Err(ureq::Error::Status(code, resp)) => {
            let body = resp.into_string().unwrap_or_default();
            bail!("covhub server error (HTTP {}): {}", code, body)
        }
        Err(e) => bail!("Failed to upload: {}", e),
    }
}
