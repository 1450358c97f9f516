use thiserror::Error;

#[derive(Error, Debug)]
pub enum CovhubError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Merge error: {0}")]
    Merge(String),

    #[error("repo is not found: {0}")]
    RepoNotFound(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, CovhubError>;
