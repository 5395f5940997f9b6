// Client configuration: the JSON record on disk, its defaults, and where it
// lives. The stored tokens are part of the same record and are written
// back wholesale whenever they change.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{Error, Result};
use crate::token::Credentials;

/// Session chunks must be aligned to this many KiB.
pub const CHUNK_MULTIPLE_KIB: u64 = 320;
/// Ten aligned ranges per request unless configured otherwise.
pub const DEFAULT_CHUNK_SIZE_KIB: u64 = CHUNK_MULTIPLE_KIB * 10;
pub const DEFAULT_REDIRECT_URL: &str = "http://localhost:53682/";
pub const DEFAULT_ROOT: &str = "/drive/root";
pub const APP_ROOT: &str = "/drive/special/approot";

const APP_DIR: &str = "driveup";
const CONFIG_FILE: &str = "config.json";

/// Scopes granting full drive access plus a refresh token.
pub fn default_scopes() -> Vec<String> {
    [
        "Files.Read",
        "Files.ReadWrite",
        "Files.Read.All",
        "Files.ReadWrite.All",
        "offline_access",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Scopes restricted to the application's own folder.
pub fn app_folder_scopes() -> Vec<String> {
    vec!["Files.ReadWrite.AppFolder".into(), "offline_access".into()]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// File this config was read from and is saved back to.
    #[serde(skip)]
    path: Option<PathBuf>,
    pub client_id: String,
    pub client_secret: String,
    pub scopes: Vec<String>,
    #[serde(rename = "redirect_uri")]
    pub redirect_url: String,
    pub root: String,
    #[serde(flatten)]
    pub credentials: Credentials,
    /// Session upload chunk size in KiB.
    pub upload_chunk_size: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            path: None,
            client_id: String::new(),
            client_secret: String::new(),
            scopes: default_scopes(),
            redirect_url: DEFAULT_REDIRECT_URL.to_string(),
            root: DEFAULT_ROOT.to_string(),
            credentials: Credentials::default(),
            upload_chunk_size: DEFAULT_CHUNK_SIZE_KIB,
        }
    }
}

impl Config {
    /// Parse a config record and normalize the drive root.
    pub fn from_json(data: &str) -> Result<Self> {
        let mut config: Config = serde_json::from_str(data)?;
        config.root = normalize_root(&config.root);
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let mut config = Self::from_json(&data)?;
        config.path = Some(path.to_path_buf());
        debug!(path = %path.display(), "config loaded");
        Ok(config)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Write the whole record back to where it was loaded from.
    pub fn save(&self) -> Result<()> {
        let path = self
            .path
            .as_deref()
            .ok_or_else(|| Error::Config("config has no file path to save to".into()))?;
        write_atomic(path, self)
    }

    pub fn save_to(&mut self, path: &Path) -> Result<()> {
        self.path = Some(path.to_path_buf());
        self.save()
    }

    /// Space-joined scopes, as the authorization endpoint expects them.
    pub fn scope_string(&self) -> String {
        self.scopes.join(" ")
    }

    /// Chunk size in bytes, after checking the 320 KiB alignment rule.
    pub fn chunk_size_bytes(&self) -> Result<u64> {
        validate_chunk_size(self.upload_chunk_size)
    }
}

/// Strip trailing slashes and make sure the root starts with one.
pub fn normalize_root(root: &str) -> String {
    let trimmed = root.trim().trim_end_matches('/');
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

/// Chunk size in bytes for a setting in KiB. Rejects zero, sizes that are
/// not a multiple of 320 KiB, and sizes that do not fit in bytes.
pub fn validate_chunk_size(kib: u64) -> Result<u64> {
    if kib == 0 || kib % CHUNK_MULTIPLE_KIB != 0 {
        return Err(Error::InvalidChunkSize(kib));
    }
    kib.checked_mul(1024).ok_or(Error::InvalidChunkSize(kib))
}

/// Resolve the config file path: an explicit path wins, then the OS config
/// directory, then the current working directory.
pub fn resolve_path(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    match dirs::config_dir() {
        Some(base) => {
            let dir = base.join(APP_DIR);
            if !dir.exists() {
                create_private_dir(&dir)?;
            }
            Ok(dir.join(CONFIG_FILE))
        }
        None => {
            let cwd = std::env::current_dir().map_err(|e| Error::io(".", e))?;
            Ok(cwd.join(CONFIG_FILE))
        }
    }
}

fn create_private_dir(dir: &Path) -> Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder.create(dir).map_err(|e| Error::io(dir, e))
}

// Full overwrite through a sibling temp file, so a crash never leaves a
// half-written config behind. The temp file is created 0600.
fn write_atomic(path: &Path, config: &Config) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| Error::io(dir, e))?;
    serde_json::to_writer_pretty(&mut tmp, config)?;
    tmp.write_all(b"\n").map_err(|e| Error::io(tmp.path(), e))?;
    tmp.as_file().sync_all().map_err(|e| Error::io(tmp.path(), e))?;
    tmp.persist(path).map_err(|e| Error::io(path, e.error))?;
    debug!(path = %path.display(), "config written");
    Ok(())
}
