// Drive items: the metadata model and the single-shot requests around it
// (info, list, mkdir, rm, hashes).

use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::api::{check, check_found, Client};
use crate::error::{Error, Result};
use crate::upload::validate_remote_path;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Hashes {
    pub quick_xor_hash: Option<String>,
    pub sha1_hash: Option<String>,
    pub sha256_hash: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FileFacet {
    pub mime_type: String,
    pub hashes: Hashes,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FolderFacet {
    pub child_count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FileSystemInfo {
    pub created_date_time: Option<DateTime<Utc>>,
    pub last_modified_date_time: Option<DateTime<Utc>>,
}

/// A file or folder as the drive API describes it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DriveItem {
    pub name: String,
    pub size: u64,
    pub file: Option<FileFacet>,
    pub folder: Option<FolderFacet>,
    pub file_system_info: Option<FileSystemInfo>,
}

impl DriveItem {
    pub fn is_folder(&self) -> bool {
        self.folder.is_some()
    }

    pub fn is_file(&self) -> bool {
        self.file.is_some()
    }

    pub fn hashes(&self) -> Option<&Hashes> {
        self.file.as_ref().map(|f| &f.hashes)
    }
}

#[derive(Debug, Deserialize)]
struct ListPage {
    #[serde(default)]
    value: Vec<DriveItem>,
    #[serde(rename = "@odata.nextLink")]
    next_link: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashKind {
    Sha1,
    Sha256,
}

impl HashKind {
    fn label(self) -> &'static str {
        match self {
            HashKind::Sha1 => "SHA1",
            HashKind::Sha256 => "SHA256",
        }
    }
}

/// Validate a remote item path and give it one leading and no trailing `/`.
pub fn normalize_item_path(path: &str) -> Result<String> {
    validate_remote_path(path)?;
    let trimmed = path.trim_matches('/');
    Ok(format!("/{}", trimmed))
}

impl Client {
    /// Metadata of the item at `path`.
    pub fn info(&self, path: &str) -> Result<DriveItem> {
        let path = normalize_item_path(path)?;
        self.get_json(&self.item_url(&path), &[], &path)
    }

    /// Children of the folder at `path`, ordered by name. Follows
    /// `@odata.nextLink` until the listing is complete.
    pub fn list(&self, path: &str) -> Result<Vec<DriveItem>> {
        let path = normalize_item_path(path)?;
        let mut page: ListPage = self.get_json(
            &self.item_action_url(&path, "children"),
            &[("$top", "100000"), ("$orderby", "name")],
            &path,
        )?;
        let mut items = std::mem::take(&mut page.value);
        while let Some(next) = page.next_link.take() {
            debug!(next = %next, "fetching next listing page");
            page = self.get_json(&next, &[], &path)?;
            items.append(&mut page.value);
        }
        Ok(items)
    }

    /// Create the folder `path`. The parent has to exist; name clashes are
    /// resolved by the service renaming the new folder.
    pub fn create_dir(&self, path: &str) -> Result<DriveItem> {
        let path = normalize_item_path(path)?;
        let (parent, name) = match path.rsplit_once('/') {
            Some(("", name)) => ("/", name.trim()),
            Some((parent, name)) => (parent, name.trim()),
            None => ("/", path.trim()),
        };
        if name.is_empty() {
            return Err(Error::InvalidPath(path.clone()));
        }
        debug!(parent, name, "creating folder");

        let body = json!({
            "name": name,
            "folder": {},
            "@microsoft.graph.conflictBehavior": "rename",
        });
        let response = self
            .authed(Method::POST, &self.item_action_url(parent, "children"))?
            .json(&body)
            .send()?;
        Ok(check(response)?.json()?)
    }

    /// Delete the item at `path`. Refuses to delete the drive root.
    pub fn delete(&self, path: &str) -> Result<()> {
        let path = normalize_item_path(path)?;
        if path == "/" {
            return Err(Error::InvalidPath(path));
        }
        let response = self.authed(Method::DELETE, &self.item_url(&path))?.send()?;
        check_found(response, &path)?;
        Ok(())
    }

    /// Hash the service computed for the file at `path`.
    pub fn hash(&self, path: &str, kind: HashKind) -> Result<String> {
        let item = self.info(path)?;
        if !item.is_file() {
            return Err(Error::NotAFile);
        }
        let hashes = item.hashes().cloned().unwrap_or_default();
        let hash = match kind {
            HashKind::Sha1 => hashes.sha1_hash,
            HashKind::Sha256 => hashes.sha256_hash,
        };
        hash.ok_or_else(|| Error::NotFound(format!("{} hash of {}", kind.label(), path)))
    }
}
