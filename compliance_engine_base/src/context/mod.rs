// src/context/mod.rs
//! The I/O boundary procedures use to inspect and change the host
//!
//! Procedures never touch the OS directly. Everything they need (commands,
//! file contents, metadata, ownership changes, account lookups, the package
//! list) goes through a [`Context`], so the same procedure runs against the
//! live system via [`SystemContext`] or against preprogrammed state via
//! [`MockContext`].

pub mod mock;
pub mod system;

pub use mock::MockContext;
pub use system::SystemContext;

use crate::error::{Error, Result, ENOENT};
use crate::package_cache::{self, CachePolicy, PackageCache, PackageManager};

/// Kind of a directory entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
    Other,
}

/// Ownership and mode of a filesystem object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileMetadata {
    pub uid: u32,
    pub gid: u32,
    /// Permission bits including setuid/setgid/sticky (`mode & 0o7777`)
    pub mode: u32,
    pub kind: EntryKind,
}

impl FileMetadata {
    pub fn file(uid: u32, gid: u32, mode: u32) -> Self {
        Self {
            uid,
            gid,
            mode: mode & 0o7777,
            kind: EntryKind::File,
        }
    }

    pub fn directory(uid: u32, gid: u32, mode: u32) -> Self {
        Self {
            uid,
            gid,
            mode: mode & 0o7777,
            kind: EntryKind::Directory,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// One entry returned by [`Context::list_directory`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Full path of the entry
    pub path: String,
    /// Final path component
    pub name: String,
    pub kind: EntryKind,
}

/// Capability interface for everything a procedure observes or changes
pub trait Context {
    /// Run an external command line and return its standard output
    fn execute_command(&self, command: &str) -> Result<String>;

    /// Read a whole file
    fn get_file_contents(&self, path: &str) -> Result<String>;

    /// Replace a file's contents atomically
    fn write_file(&self, path: &str, contents: &str) -> Result<()>;

    /// Ownership and mode of `path` (following symlinks)
    fn file_metadata(&self, path: &str) -> Result<FileMetadata>;

    /// Entries below `path`, sorted by path; descends into sub-directories when `recursive`
    fn list_directory(&self, path: &str, recursive: bool) -> Result<Vec<DirEntry>>;

    fn set_owner(&self, path: &str, uid: u32, gid: u32) -> Result<()>;

    fn set_mode(&self, path: &str, mode: u32) -> Result<()>;

    /// Current unix time in seconds
    fn now(&self) -> i64;

    /// Location and freshness limits of the package list cache
    fn package_cache_policy(&self) -> CachePolicy;

    /// Where a well-known system path actually lives for this context
    fn special_file_path(&self, path: &str) -> String {
        path.to_string()
    }

    /// Installed packages, served from the cache when it is fresh enough
    fn package_list(&self, manager: Option<PackageManager>) -> Result<PackageCache> {
        package_cache::get_package_list(self, manager, &self.package_cache_policy())
    }

    fn user_name(&self, uid: u32) -> Result<String> {
        lookup_name(self, "/etc/passwd", uid, "user")
    }

    fn user_id(&self, name: &str) -> Result<u32> {
        lookup_id(self, "/etc/passwd", name, "user")
    }

    fn group_name(&self, gid: u32) -> Result<String> {
        lookup_name(self, "/etc/group", gid, "group")
    }

    fn group_id(&self, name: &str) -> Result<u32> {
        lookup_id(self, "/etc/group", name, "group")
    }
}

// ============================================================================
// /etc/passwd and /etc/group lookups
// ============================================================================

/// `(name, id)` pairs from a colon-separated account database
fn account_entries<C: Context + ?Sized>(context: &C, database: &str) -> Result<Vec<(String, u32)>> {
    let contents = context.get_file_contents(&context.special_file_path(database))?;
    Ok(contents
        .lines()
        .filter(|line| !line.trim().is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let mut fields = line.split(':');
            let name = fields.next()?;
            let id = fields.nth(1)?.parse().ok()?;
            Some((name.to_string(), id))
        })
        .collect())
}

fn lookup_name<C: Context + ?Sized>(context: &C, database: &str, id: u32, what: &str) -> Result<String> {
    account_entries(context, database)?
        .into_iter()
        .find(|(_, entry_id)| *entry_id == id)
        .map(|(name, _)| name)
        .ok_or_else(|| Error::new(format!("No {} with id {}", what, id), ENOENT))
}

fn lookup_id<C: Context + ?Sized>(context: &C, database: &str, name: &str, what: &str) -> Result<u32> {
    account_entries(context, database)?
        .into_iter()
        .find(|(entry_name, _)| entry_name == name)
        .map(|(_, id)| id)
        .ok_or_else(|| Error::new(format!("No {} named '{}'", what, name), ENOENT))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_lookups() {
        let context = MockContext::new()
            .with_file(
                "/etc/passwd",
                "root:x:0:0:root:/root:/bin/bash\n# comment\nbin:x:1:1:bin:/bin:/sbin/nologin\n",
            )
            .with_file("/etc/group", "root:x:0:\nwheel:x:10:alice\n");

        assert_eq!(context.user_name(1).unwrap(), "bin");
        assert_eq!(context.user_id("root").unwrap(), 0);
        assert_eq!(context.group_id("wheel").unwrap(), 10);
        assert_eq!(context.group_name(0).unwrap(), "root");

        let missing = context.user_name(42).unwrap_err();
        assert_eq!(missing.code, ENOENT);
    }

    #[test]
    fn test_account_lookup_uses_special_path() {
        let context = MockContext::new()
            .with_special_path("/etc/passwd", "/fixtures/passwd")
            .with_file("/fixtures/passwd", "daemon:x:2:2::/:/sbin/nologin\n");

        assert_eq!(context.user_id("daemon").unwrap(), 2);
    }
}
