//! Remote object store abstraction
//!
//! The pipeline talks to the object store only through [`ObjectStore`].
//! [`DropboxStore`] implements it over the Dropbox HTTP API and
//! [`MemoryObjectStore`] keeps everything in process for dry runs and tests.
//!
//! Paths are absolute, `/`-separated remote paths such as
//! `/Store/orders/a@b.com/100/roll_001/0001.jpg`.

pub mod dropbox;
pub mod memory;

use crate::domain::Result;
use async_trait::async_trait;

pub use dropbox::DropboxStore;
pub use memory::{InjectedFailure, MemoryObjectStore, StoreCall};

/// Outcome of creating a folder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FolderCreation {
    /// The folder was created by this call
    Created,
    /// The folder was already there (not an error)
    AlreadyExists,
}

/// Outcome of creating a shared link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkCreation {
    /// A new link was created
    Created(String),
    /// A link already exists for the path; list it to obtain the URL
    AlreadyExists,
}

/// What lives at a remote path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathStatus {
    /// A file of the given size
    File { size: u64 },
    /// A folder
    Folder,
    /// Nothing
    NotFound,
}

impl PathStatus {
    /// Returns true for files and folders
    pub fn exists(&self) -> bool {
        !matches!(self, PathStatus::NotFound)
    }
}

/// One entry of a folder listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderEntry {
    /// Last path segment
    pub name: String,
    /// Full path as displayed by the store
    pub path: String,
    /// True for folders
    pub is_folder: bool,
}

/// One page of a folder listing
#[derive(Debug, Clone, Default)]
pub struct FolderPage {
    /// Entries on this page
    pub entries: Vec<FolderEntry>,
    /// Cursor for the next page
    pub cursor: Option<String>,
    /// Whether more pages follow
    pub has_more: bool,
}

/// Remote object store
///
/// All methods are idempotent-friendly: creating something that already
/// exists is reported as a value, not an error.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Create a folder, along with any missing parents
    async fn create_folder(&self, path: &str) -> Result<FolderCreation>;

    /// List the direct children of a folder
    async fn list_folder(&self, path: &str) -> Result<FolderPage>;

    /// Continue a listing from a cursor
    async fn list_folder_continue(&self, cursor: &str) -> Result<FolderPage>;

    /// Upload a file in a single request
    async fn upload(&self, data: Vec<u8>, path: &str, overwrite: bool) -> Result<()>;

    /// Start an upload session with the first chunk, returning the session id
    async fn start_upload_session(&self, first_chunk: Vec<u8>) -> Result<String>;

    /// Append a chunk at `offset` (bytes already sent)
    async fn append_to_session(&self, session_id: &str, chunk: Vec<u8>, offset: u64)
        -> Result<()>;

    /// Send the last chunk and commit the session to `path`
    async fn finish_session(
        &self,
        session_id: &str,
        last_chunk: Vec<u8>,
        offset: u64,
        path: &str,
        overwrite: bool,
    ) -> Result<()>;

    /// Create a shared link for a path
    async fn create_shared_link(&self, path: &str) -> Result<LinkCreation>;

    /// Existing shared link URLs for a path
    async fn list_shared_links(&self, path: &str) -> Result<Vec<String>>;

    /// Resolve a shared link URL to the path it points at, `None` if it no longer resolves
    async fn resolve_shared_link(&self, url: &str) -> Result<Option<String>>;

    /// Metadata for a path
    async fn get_metadata(&self, path: &str) -> Result<PathStatus>;

    /// Move a file or folder
    async fn move_path(&self, from: &str, to: &str) -> Result<()>;
}

/// Join a remote parent and a relative child path
pub fn join_path(parent: &str, child: &str) -> String {
    let parent = parent.trim_end_matches('/');
    let child = child.trim_start_matches('/');
    if child.is_empty() {
        parent.to_string()
    } else {
        format!("{parent}/{child}")
    }
}

/// Parent of a remote path, `None` for the root
pub fn parent_path(path: &str) -> Option<&str> {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) if trimmed.len() > 1 => Some("/"),
        Some(0) | None => None,
        Some(i) => Some(&trimmed[..i]),
    }
}

/// List every entry of a folder, following pagination cursors
pub async fn list_all(store: &dyn ObjectStore, path: &str) -> Result<Vec<FolderEntry>> {
    let mut page = store.list_folder(path).await?;
    let mut entries = std::mem::take(&mut page.entries);

    while page.has_more {
        let Some(cursor) = page.cursor.take() else {
            break;
        };
        page = store.list_folder_continue(&cursor).await?;
        entries.append(&mut page.entries);
    }

    Ok(entries)
}
