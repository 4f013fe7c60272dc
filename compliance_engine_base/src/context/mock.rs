// src/context/mock.rs
//! Deterministic context for procedure tests
//!
//! Commands, files, metadata and directories are preprogrammed by exact key.
//! Writes, ownership and mode changes update the in-memory state, and every
//! command invocation is logged so tests can assert a command never ran.

use super::{Context, DirEntry, EntryKind, FileMetadata};
use crate::error::{Error, Result, ENOENT};
use crate::package_cache::CachePolicy;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};

pub const MOCK_PACKAGE_CACHE_PATH: &str = "/mock/packagecache";

pub struct MockContext {
    commands: HashMap<String, Result<String>>,
    files: RefCell<BTreeMap<String, String>>,
    metadata: RefCell<BTreeMap<String, FileMetadata>>,
    special_paths: HashMap<String, String>,
    executed: RefCell<Vec<String>>,
    now: Cell<i64>,
    cache_policy: CachePolicy,
}

impl MockContext {
    pub fn new() -> Self {
        Self {
            commands: HashMap::new(),
            files: RefCell::new(BTreeMap::new()),
            metadata: RefCell::new(BTreeMap::new()),
            special_paths: HashMap::new(),
            executed: RefCell::new(Vec::new()),
            now: Cell::new(1_700_000_000),
            cache_policy: CachePolicy {
                path: MOCK_PACKAGE_CACHE_PATH.to_string(),
                ttl: crate::config::DEFAULT_PACKAGE_LIST_TTL_SECS as i64,
                stale_ttl: crate::config::DEFAULT_PACKAGE_LIST_STALE_TTL_SECS as i64,
            },
        }
    }

    /// Program a successful command output
    pub fn with_command(mut self, command: &str, output: &str) -> Self {
        self.commands
            .insert(command.to_string(), Ok(output.to_string()));
        self
    }

    /// Program a failing command
    pub fn with_failing_command(mut self, command: &str, error: Error) -> Self {
        self.commands.insert(command.to_string(), Err(error));
        self
    }

    /// Add a regular file owned by root with mode 0644, creating parent directories
    pub fn with_file(self, path: &str, contents: &str) -> Self {
        self.add_parents(path);
        self.files
            .borrow_mut()
            .insert(path.to_string(), contents.to_string());
        self.metadata
            .borrow_mut()
            .entry(path.to_string())
            .or_insert_with(|| FileMetadata::file(0, 0, 0o644));
        self
    }

    /// Set the ownership and mode reported for `path`
    pub fn with_metadata(self, path: &str, metadata: FileMetadata) -> Self {
        self.add_parents(path);
        self.metadata
            .borrow_mut()
            .insert(path.to_string(), metadata);
        self
    }

    pub fn with_directory(self, path: &str) -> Self {
        self.with_metadata(path, FileMetadata::directory(0, 0, 0o755))
    }

    pub fn with_special_path(mut self, path: &str, redirect: &str) -> Self {
        self.special_paths
            .insert(path.to_string(), redirect.to_string());
        self
    }

    pub fn with_now(self, now: i64) -> Self {
        self.now.set(now);
        self
    }

    pub fn with_cache_policy(mut self, policy: CachePolicy) -> Self {
        self.cache_policy = policy;
        self
    }

    pub fn set_now(&self, now: i64) {
        self.now.set(now);
    }

    /// Command lines executed so far, in order
    pub fn executed_commands(&self) -> Vec<String> {
        self.executed.borrow().clone()
    }

    pub fn file(&self, path: &str) -> Option<String> {
        self.files.borrow().get(path).cloned()
    }

    pub fn metadata_of(&self, path: &str) -> Option<FileMetadata> {
        self.metadata.borrow().get(path).copied()
    }

    fn add_parents(&self, path: &str) {
        let mut metadata = self.metadata.borrow_mut();
        let mut current = path;
        while let Some(pos) = current.rfind('/') {
            current = &current[..pos];
            if current.is_empty() {
                break;
            }
            metadata
                .entry(current.to_string())
                .or_insert_with(|| FileMetadata::directory(0, 0, 0o755));
        }
    }
}

impl Default for MockContext {
    fn default() -> Self {
        Self::new()
    }
}

impl Context for MockContext {
    fn execute_command(&self, command: &str) -> Result<String> {
        self.executed.borrow_mut().push(command.to_string());
        match self.commands.get(command) {
            Some(result) => result.clone(),
            None => Err(Error::new(
                format!("Command '{}' is not programmed in the mock context", command),
                ENOENT,
            )),
        }
    }

    fn get_file_contents(&self, path: &str) -> Result<String> {
        self.files
            .borrow()
            .get(path)
            .cloned()
            .ok_or_else(|| Error::new(format!("Failed to read '{}': No such file", path), ENOENT))
    }

    fn write_file(&self, path: &str, contents: &str) -> Result<()> {
        self.add_parents(path);
        self.files
            .borrow_mut()
            .insert(path.to_string(), contents.to_string());
        self.metadata
            .borrow_mut()
            .entry(path.to_string())
            .or_insert_with(|| FileMetadata::file(0, 0, 0o644));
        Ok(())
    }

    fn file_metadata(&self, path: &str) -> Result<FileMetadata> {
        self.metadata_of(path)
            .ok_or_else(|| Error::new(format!("Failed to stat '{}': No such file", path), ENOENT))
    }

    fn list_directory(&self, path: &str, recursive: bool) -> Result<Vec<DirEntry>> {
        let metadata = self.metadata.borrow();
        match metadata.get(path) {
            Some(m) if m.is_dir() => {}
            Some(_) => return Err(Error::invalid(format!("'{}' is not a directory", path))),
            None => {
                return Err(Error::new(
                    format!("Failed to list '{}': No such directory", path),
                    ENOENT,
                ))
            }
        }

        let prefix = format!("{}/", path.trim_end_matches('/'));
        Ok(metadata
            .iter()
            .filter_map(|(entry_path, entry)| {
                let relative = entry_path.strip_prefix(&prefix)?;
                if relative.is_empty() || (!recursive && relative.contains('/')) {
                    return None;
                }
                let name = relative.rsplit('/').next().unwrap_or(relative);
                Some(DirEntry {
                    path: entry_path.clone(),
                    name: name.to_string(),
                    kind: entry.kind,
                })
            })
            .collect())
    }

    fn set_owner(&self, path: &str, uid: u32, gid: u32) -> Result<()> {
        let mut metadata = self.metadata.borrow_mut();
        let entry = metadata
            .get_mut(path)
            .ok_or_else(|| Error::new(format!("Failed to change ownership of '{}'", path), ENOENT))?;
        entry.uid = uid;
        entry.gid = gid;
        Ok(())
    }

    fn set_mode(&self, path: &str, mode: u32) -> Result<()> {
        let mut metadata = self.metadata.borrow_mut();
        let entry = metadata
            .get_mut(path)
            .ok_or_else(|| Error::new(format!("Failed to change mode of '{}'", path), ENOENT))?;
        entry.mode = mode & 0o7777;
        Ok(())
    }

    fn now(&self) -> i64 {
        self.now.get()
    }

    fn package_cache_policy(&self) -> CachePolicy {
        self.cache_policy.clone()
    }

    fn special_file_path(&self, path: &str) -> String {
        self.special_paths
            .get(path)
            .cloned()
            .unwrap_or_else(|| path.to_string())
    }
}
