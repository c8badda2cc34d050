//! In-memory [`ObjectStore`] for dry runs and tests
//!
//! Paths are compared case-insensitively, as Dropbox does. Failures can be
//! scripted per operation and path so retry behavior can be exercised
//! without a network.

use super::{
    parent_path, FolderCreation, FolderEntry, FolderPage, LinkCreation, ObjectStore, PathStatus,
};
use crate::domain::{Result, StoreError};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

/// Operations recorded by [`MemoryObjectStore`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreCall {
    CreateFolder,
    ListFolder,
    Upload,
    StartSession,
    AppendSession,
    FinishSession,
    CreateSharedLink,
    ListSharedLinks,
    ResolveSharedLink,
    GetMetadata,
    MovePath,
}

/// A failure to return from a scripted call
#[derive(Debug, Clone)]
pub enum InjectedFailure {
    /// 429 with an optional Retry-After
    RateLimited(Option<Duration>),
    /// 503
    ServerError,
    /// 400, not retryable
    Rejected,
}

impl InjectedFailure {
    fn to_error(&self, path: &str) -> StoreError {
        match self {
            InjectedFailure::RateLimited(retry_after) => StoreError::RateLimited {
                retry_after: *retry_after,
                message: format!("injected rate limit for {path}"),
            },
            InjectedFailure::ServerError => StoreError::ServerError {
                status: 503,
                message: format!("injected server error for {path}"),
            },
            InjectedFailure::Rejected => StoreError::ClientError {
                status: 400,
                message: format!("injected rejection for {path}"),
            },
        }
    }
}

#[derive(Debug, Clone)]
struct StoredFile {
    path: String,
    data: Vec<u8>,
}

#[derive(Default)]
struct State {
    /// lower path → display path
    folders: BTreeMap<String, String>,
    /// lower path → file
    files: BTreeMap<String, StoredFile>,
    /// lower path → url
    links: HashMap<String, String>,
    sessions: HashMap<String, Vec<u8>>,
    next_id: u64,
    failures: HashMap<(StoreCall, String), VecDeque<InjectedFailure>>,
    calls: Vec<(StoreCall, String)>,
    cursors: HashMap<String, (Vec<FolderEntry>, usize)>,
}

/// In-memory object store
pub struct MemoryObjectStore {
    state: Mutex<State>,
    page_size: usize,
}

impl MemoryObjectStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            page_size: 500,
        }
    }

    /// Limit listing pages to `page_size` entries
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // A panic while holding the lock only happens in a failing test
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Fail the next `times` calls of `call` on `path`
    pub fn inject_failures(
        &self,
        call: StoreCall,
        path: &str,
        failure: InjectedFailure,
        times: usize,
    ) {
        let mut state = self.lock();
        let queue = state
            .failures
            .entry((call, path.to_lowercase()))
            .or_default();
        for _ in 0..times {
            queue.push_back(failure.clone());
        }
    }

    /// Create a folder (and its parents) directly
    pub fn seed_folder(&self, path: &str) {
        let mut state = self.lock();
        add_folder_with_parents(&mut state, path);
    }

    /// Create a shared link for an existing path directly
    pub fn seed_shared_link(&self, path: &str, url: &str) {
        let mut state = self.lock();
        add_folder_with_parents(&mut state, path);
        state.links.insert(path.to_lowercase(), url.to_string());
    }

    /// Number of recorded calls of one kind
    pub fn call_count(&self, call: StoreCall) -> usize {
        self.lock().calls.iter().filter(|(c, _)| *c == call).count()
    }

    /// Number of recorded calls of one kind on one path
    pub fn calls_for(&self, call: StoreCall, path: &str) -> usize {
        let lower = path.to_lowercase();
        self.lock()
            .calls
            .iter()
            .filter(|(c, p)| *c == call && *p == lower)
            .count()
    }

    /// Display paths of every stored file, sorted
    pub fn file_paths(&self) -> Vec<String> {
        self.lock().files.values().map(|f| f.path.clone()).collect()
    }

    /// Contents of a stored file
    pub fn file_data(&self, path: &str) -> Option<Vec<u8>> {
        self.lock()
            .files
            .get(&path.to_lowercase())
            .map(|f| f.data.clone())
    }

    /// Returns true when a folder exists
    pub fn has_folder(&self, path: &str) -> bool {
        self.lock().folders.contains_key(&path.to_lowercase())
    }

    fn begin(&self, call: StoreCall, path: &str) -> Result<()> {
        let mut state = self.lock();
        let lower = path.to_lowercase();
        state.calls.push((call, lower.clone()));
        if let Some(queue) = state.failures.get_mut(&(call, lower)) {
            if let Some(failure) = queue.pop_front() {
                return Err(failure.to_error(path).into());
            }
        }
        Ok(())
    }

    fn next_id(state: &mut State) -> u64 {
        state.next_id += 1;
        state.next_id
    }

    fn page_from(&self, state: &mut State, entries: Vec<FolderEntry>, start: usize) -> FolderPage {
        let end = (start + self.page_size).min(entries.len());
        let page_entries = entries[start..end].to_vec();
        let has_more = end < entries.len();
        let cursor = if has_more {
            let id = format!("cursor-{}", Self::next_id(state));
            state.cursors.insert(id.clone(), (entries, end));
            Some(id)
        } else {
            None
        };
        FolderPage {
            entries: page_entries,
            cursor,
            has_more,
        }
    }

    fn store_file(state: &mut State, path: &str, data: Vec<u8>, overwrite: bool) -> Result<()> {
        let lower = path.to_lowercase();
        if !overwrite && state.files.contains_key(&lower) {
            return Err(StoreError::Conflict(format!("path/conflict/file/ {path}")).into());
        }
        if let Some(parent) = parent_path(path) {
            add_folder_with_parents(state, parent);
        }
        state.files.insert(
            lower,
            StoredFile {
                path: path.to_string(),
                data,
            },
        );
        Ok(())
    }
}

impl Default for MemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

fn add_folder_with_parents(state: &mut State, path: &str) {
    let mut current = Some(path.trim_end_matches('/'));
    while let Some(p) = current {
        if p.is_empty() || p == "/" {
            break;
        }
        state
            .folders
            .entry(p.to_lowercase())
            .or_insert_with(|| p.to_string());
        current = parent_path(p);
    }
}

fn name_of(path: &str) -> String {
    path.rsplit('/').next().unwrap_or(path).to_string()
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn create_folder(&self, path: &str) -> Result<FolderCreation> {
        self.begin(StoreCall::CreateFolder, path)?;
        let mut state = self.lock();
        let lower = path.to_lowercase();
        if state.folders.contains_key(&lower) {
            return Ok(FolderCreation::AlreadyExists);
        }
        if state.files.contains_key(&lower) {
            return Err(StoreError::Conflict(format!("path/conflict/file/ {path}")).into());
        }
        add_folder_with_parents(&mut state, path);
        Ok(FolderCreation::Created)
    }

    async fn list_folder(&self, path: &str) -> Result<FolderPage> {
        self.begin(StoreCall::ListFolder, path)?;
        let mut state = self.lock();
        let lower = path.trim_end_matches('/').to_lowercase();
        if !state.folders.contains_key(&lower) {
            return Err(StoreError::NotFound(path.to_string()).into());
        }

        let is_child = |candidate: &str| parent_path(candidate) == Some(lower.as_str());
        let mut entries: Vec<FolderEntry> = state
            .folders
            .iter()
            .filter(|(k, _)| is_child(k))
            .map(|(_, display)| FolderEntry {
                name: name_of(display),
                path: display.clone(),
                is_folder: true,
            })
            .chain(state.files.iter().filter(|(k, _)| is_child(k)).map(|(_, f)| {
                FolderEntry {
                    name: name_of(&f.path),
                    path: f.path.clone(),
                    is_folder: false,
                }
            }))
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(self.page_from(&mut state, entries, 0))
    }

    async fn list_folder_continue(&self, cursor: &str) -> Result<FolderPage> {
        self.begin(StoreCall::ListFolder, cursor)?;
        let mut state = self.lock();
        let (entries, start) = state
            .cursors
            .remove(cursor)
            .ok_or_else(|| StoreError::ClientError {
                status: 400,
                message: format!("unknown cursor {cursor}"),
            })?;
        Ok(self.page_from(&mut state, entries, start))
    }

    async fn upload(&self, data: Vec<u8>, path: &str, overwrite: bool) -> Result<()> {
        self.begin(StoreCall::Upload, path)?;
        let mut state = self.lock();
        Self::store_file(&mut state, path, data, overwrite)
    }

    async fn start_upload_session(&self, first_chunk: Vec<u8>) -> Result<String> {
        self.begin(StoreCall::StartSession, "")?;
        let mut state = self.lock();
        let id = format!("session-{}", Self::next_id(&mut state));
        state.sessions.insert(id.clone(), first_chunk);
        Ok(id)
    }

    async fn append_to_session(
        &self,
        session_id: &str,
        chunk: Vec<u8>,
        offset: u64,
    ) -> Result<()> {
        self.begin(StoreCall::AppendSession, session_id)?;
        let mut state = self.lock();
        let buffer = state
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| StoreError::NotFound(format!("session {session_id}")))?;
        if buffer.len() as u64 != offset {
            return Err(StoreError::Conflict(format!(
                "incorrect_offset: expected {}, got {offset}",
                buffer.len()
            ))
            .into());
        }
        buffer.extend_from_slice(&chunk);
        Ok(())
    }

    async fn finish_session(
        &self,
        session_id: &str,
        last_chunk: Vec<u8>,
        offset: u64,
        path: &str,
        overwrite: bool,
    ) -> Result<()> {
        self.begin(StoreCall::FinishSession, path)?;
        let mut state = self.lock();
        let mut buffer = state
            .sessions
            .remove(session_id)
            .ok_or_else(|| StoreError::NotFound(format!("session {session_id}")))?;
        if buffer.len() as u64 != offset {
            let expected = buffer.len();
            state.sessions.insert(session_id.to_string(), buffer);
            return Err(StoreError::Conflict(format!(
                "incorrect_offset: expected {expected}, got {offset}"
            ))
            .into());
        }
        buffer.extend_from_slice(&last_chunk);
        Self::store_file(&mut state, path, buffer, overwrite)
    }

    async fn create_shared_link(&self, path: &str) -> Result<LinkCreation> {
        self.begin(StoreCall::CreateSharedLink, path)?;
        let mut state = self.lock();
        let lower = path.to_lowercase();
        if !state.folders.contains_key(&lower) && !state.files.contains_key(&lower) {
            return Err(StoreError::NotFound(path.to_string()).into());
        }
        if state.links.contains_key(&lower) {
            return Ok(LinkCreation::AlreadyExists);
        }
        let url = format!(
            "https://www.dropbox.com/scl/fo/mem{}/{}?dl=0",
            Self::next_id(&mut state),
            name_of(path)
        );
        state.links.insert(lower, url.clone());
        Ok(LinkCreation::Created(url))
    }

    async fn list_shared_links(&self, path: &str) -> Result<Vec<String>> {
        self.begin(StoreCall::ListSharedLinks, path)?;
        let state = self.lock();
        Ok(state
            .links
            .get(&path.to_lowercase())
            .cloned()
            .into_iter()
            .collect())
    }

    async fn resolve_shared_link(&self, url: &str) -> Result<Option<String>> {
        self.begin(StoreCall::ResolveSharedLink, url)?;
        let state = self.lock();
        let resolved = state
            .links
            .iter()
            .find(|(_, u)| u.as_str() == url)
            .map(|(path, _)| path.clone())
            .filter(|path| state.folders.contains_key(path) || state.files.contains_key(path));
        Ok(resolved)
    }

    async fn get_metadata(&self, path: &str) -> Result<PathStatus> {
        self.begin(StoreCall::GetMetadata, path)?;
        let state = self.lock();
        let lower = path.to_lowercase();
        if let Some(file) = state.files.get(&lower) {
            return Ok(PathStatus::File {
                size: file.data.len() as u64,
            });
        }
        if state.folders.contains_key(&lower) {
            return Ok(PathStatus::Folder);
        }
        Ok(PathStatus::NotFound)
    }

    async fn move_path(&self, from: &str, to: &str) -> Result<()> {
        self.begin(StoreCall::MovePath, from)?;
        let mut state = self.lock();
        let from_lower = from.trim_end_matches('/').to_lowercase();
        let to_trimmed = to.trim_end_matches('/');
        let to_lower = to_trimmed.to_lowercase();

        if state.folders.contains_key(&to_lower) || state.files.contains_key(&to_lower) {
            return Err(StoreError::Conflict(format!("to/conflict/ {to}")).into());
        }

        if let Some(file) = state.files.remove(&from_lower) {
            return Self::store_file(&mut state, to_trimmed, file.data, false);
        }
        if !state.folders.contains_key(&from_lower) {
            return Err(StoreError::NotFound(from.to_string()).into());
        }

        let prefix = format!("{from_lower}/");
        let rebase = |lower: &str| -> Option<String> {
            if lower == from_lower {
                Some(to_trimmed.to_string())
            } else {
                lower
                    .strip_prefix(&prefix)
                    .map(|rest| format!("{to_trimmed}/{rest}"))
            }
        };

        let moved_folders: Vec<String> = state
            .folders
            .keys()
            .filter_map(|k| rebase(k).map(|_| k.clone()))
            .collect();
        for key in moved_folders {
            let display = state.folders.remove(&key).unwrap_or_default();
            let suffix = &display[from_lower.len().min(display.len())..];
            let new_path = format!("{to_trimmed}{suffix}");
            add_folder_with_parents(&mut state, &new_path);
        }

        let moved_files: Vec<String> = state
            .files
            .keys()
            .filter(|k| k.starts_with(&prefix))
            .cloned()
            .collect();
        for key in moved_files {
            if let Some(file) = state.files.remove(&key) {
                let suffix = file.path[from_lower.len().min(file.path.len())..].to_string();
                let new_path = format!("{to_trimmed}{suffix}");
                Self::store_file(&mut state, &new_path, file.data, true)?;
            }
        }

        if let Some(url) = state.links.remove(&from_lower) {
            state.links.insert(to_lower, url);
        }
        Ok(())
    }
}
