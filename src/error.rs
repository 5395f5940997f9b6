// Error taxonomy shared by every library module. The binary wraps these
// in `anyhow` at the command boundary and decides on the exit code.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Local file could not be opened, read or written.
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Remote path is not absolute or escapes the drive root.
    #[error("invalid remote path '{0}' (should start with /)")]
    InvalidPath(String),

    #[error("please specify a file, not a directory")]
    NotAFile,

    /// Chunk size is not a positive multiple of 320 KiB.
    #[error("upload chunk size must be a positive multiple of 320 (KiB), got {0}")]
    InvalidChunkSize(u64),

    #[error("invalid config: {0}")]
    Config(String),

    /// No access token stored; `login` has to run first.
    #[error("not logged in (run `login` first)")]
    NotLoggedIn,

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("could not decode response: {0}")]
    Json(#[from] serde_json::Error),

    /// Non-2xx response whose body carried a well-formed error object.
    #[error("received unexpected status code {status}: {message} ({code})")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("received unexpected status code {0}")]
    UnexpectedStatus(u16),

    /// 401 from the token endpoint.
    #[error("unauthorized: check the client secret and the configured scopes")]
    Unauthorized,

    #[error("received empty access token")]
    EmptyAccessToken,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("callback listener failed: {0}")]
    Callback(String),
}

impl Error {
    /// Wrap an I/O error together with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}
