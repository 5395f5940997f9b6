// Upload engine. Small files go up in one PUT; anything from 10 MiB on
// goes through an upload session, one aligned byte range at a time.

use std::fs::File;
use std::io::{Cursor, Read, Seek, SeekFrom};
use std::path::Path;

use chrono::{DateTime, Utc};
use reqwest::blocking::Body;
use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE};
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::api::{check, Client};
use crate::error::{Error, Result};
use crate::progress::ProgressReader;
use crate::signal::{Signals, TransferInfo};

/// Files smaller than this are sent with a single PUT.
pub const SIMPLE_UPLOAD_LIMIT: u64 = 10 * 1024 * 1024;

/// Characters the drive refuses in item names.
const FORBIDDEN_CHARS: &[char] = &['~', '"', '#', '%', '&', '*', ':', '<', '>', '?', '/', '\\', '{', '|', '}'];

const OCTET_STREAM: &str = "application/octet-stream";

/// Server-side context for a chunked upload. Lives for one `upload` call.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSession {
    pub upload_url: String,
    #[serde(rename = "expirationDateTime")]
    pub expiry: Option<DateTime<Utc>>,
}

/// A local file resolved and validated for upload.
struct LocalFile<'a> {
    path: &'a Path,
    name: String,
    size: u64,
    mime: String,
}

impl Client {
    /// Upload `local_path` into the remote folder `target_folder`.
    pub fn upload(&self, local_path: &Path, target_folder: &str) -> Result<()> {
        let chunk_size = self.config().chunk_size_bytes()?;
        let folder = normalize_folder(target_folder)?;
        let file = inspect_local(local_path)?;
        debug!(file = %file.name, size = file.size, folder = %folder, "uploading");

        let guard = self.signals().begin(Some(TransferInfo {
            name: file.name.clone(),
            size: file.size,
        }));
        if file.size < SIMPLE_UPLOAD_LIMIT {
            self.upload_simple(&file, &folder, guard.signals())
        } else {
            let session = self.create_upload_session(&file.name, &folder)?;
            self.upload_to_session(&session, &file, chunk_size, guard.signals())
        }
    }

    fn upload_simple(&self, file: &LocalFile<'_>, folder: &str, signals: &Signals) -> Result<()> {
        let url = self.item_action_url(&format!("{}{}", folder, file.name), "content");
        let handle = File::open(file.path).map_err(|e| Error::io(file.path, e))?;
        let signals = signals.clone();
        let reader = ProgressReader::cumulative(handle, 0, move |total| signals.progress(total));

        debug!(url = %url, mime = %file.mime, "simple upload");
        let response = self
            .authed(Method::PUT, &url)?
            .header(CONTENT_TYPE, file.mime.as_str())
            .body(Body::sized(reader, file.size))
            .send()?;
        check(response)?;
        Ok(())
    }

    /// Open an upload session for `folder/name`.
    pub fn create_upload_session(&self, name: &str, folder: &str) -> Result<UploadSession> {
        let url = self.item_action_url(&format!("{}{}", folder, name), "createUploadSession");
        let response = self.authed(Method::POST, &url)?.json(&json!({})).send()?;
        let session: UploadSession = check(response)?.json()?;
        debug!(expiry = ?session.expiry, "upload session created");
        Ok(session)
    }

    fn upload_to_session(
        &self,
        session: &UploadSession,
        file: &LocalFile<'_>,
        chunk_size: u64,
        signals: &Signals,
    ) -> Result<()> {
        let mut handle = File::open(file.path).map_err(|e| Error::io(file.path, e))?;
        let mut offset = 0u64;

        while offset < file.size {
            let chunk = read_chunk(&mut handle, offset, chunk_size.min(file.size - offset))
                .map_err(|e| Error::io(file.path, e))?;
            let n = chunk.len() as u64;
            if n == 0 {
                // File shrank underneath us; the server would never complete.
                return Err(Error::io(
                    file.path,
                    std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "file truncated during upload"),
                ));
            }
            let range = content_range(offset, n, file.size);
            debug!(range = %range, "sending chunk");

            let progress = signals.clone();
            let reader =
                ProgressReader::cumulative(Cursor::new(chunk), offset, move |total| progress.progress(total));
            let response = self
                .request(Method::PUT, &session.upload_url)
                .header(CONTENT_TYPE, file.mime.as_str())
                .header(CONTENT_LENGTH, n)
                .header(CONTENT_RANGE, range)
                .body(Body::sized(reader, n))
                .send()?;
            check(response)?;
            offset += n;
        }
        Ok(())
    }
}

/// Read up to `len` bytes at `offset`. Comes back shorter if the file ends
/// first; an empty vector means end of file.
fn read_chunk(file: &mut File, offset: u64, len: u64) -> std::io::Result<Vec<u8>> {
    file.seek(SeekFrom::Start(offset))?;
    let mut chunk = Vec::new();
    file.take(len).read_to_end(&mut chunk)?;
    Ok(chunk)
}

/// `bytes {first}-{last}/{total}` for a chunk of `n` bytes at `offset`.
pub fn content_range(offset: u64, n: u64, total: u64) -> String {
    format!("bytes {}-{}/{}", offset, offset + n - 1, total)
}

/// Replace characters the drive rejects with `_` and trim whitespace.
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| if FORBIDDEN_CHARS.contains(&c) { '_' } else { c })
        .collect::<String>()
        .trim()
        .to_string()
}

/// Check a remote path is absolute. `.`-relative paths and `..` segments
/// are rejected.
pub fn validate_remote_path(path: &str) -> Result<()> {
    if path.starts_with('.') || path.split('/').any(|segment| segment == "..") {
        return Err(Error::InvalidPath(path.to_string()));
    }
    Ok(())
}

/// Validate and turn `docs`, `/docs`, `docs/` into `/docs/`.
pub fn normalize_folder(folder: &str) -> Result<String> {
    validate_remote_path(folder)?;
    let trimmed = folder.trim_matches('/');
    if trimmed.is_empty() {
        Ok("/".to_string())
    } else {
        Ok(format!("/{}/", trimmed))
    }
}

pub fn guess_mime(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_raw()
        .unwrap_or(OCTET_STREAM)
        .to_string()
}

fn inspect_local(path: &Path) -> Result<LocalFile<'_>> {
    let raw_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or(Error::NotAFile)?;
    let name = sanitize_file_name(raw_name);
    if name.is_empty() {
        return Err(Error::NotAFile);
    }
    let meta = std::fs::metadata(path).map_err(|e| Error::io(path, e))?;
    if meta.is_dir() {
        return Err(Error::NotAFile);
    }
    Ok(LocalFile {
        path,
        name,
        size: meta.len(),
        mime: guess_mime(path),
    })
}
