// src/context/system.rs
//! Context backed by the live host

use super::{Context, DirEntry, EntryKind, FileMetadata};
use crate::command_executor::{CommandError, SystemCommandExecutor};
use crate::config::EngineConfig;
use crate::error::{Error, Result, EIO};
use crate::package_cache::CachePolicy;
use std::fs;
use std::io::Write;
use std::path::Path;

/// Production context: shells out and reads the real filesystem
pub struct SystemContext {
    executor: SystemCommandExecutor,
    config: EngineConfig,
}

impl SystemContext {
    pub fn new(executor: SystemCommandExecutor, config: EngineConfig) -> Self {
        Self { executor, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn executor(&self) -> &SystemCommandExecutor {
        &self.executor
    }
}

fn entry_kind(file_type: fs::FileType) -> EntryKind {
    if file_type.is_symlink() {
        EntryKind::Symlink
    } else if file_type.is_dir() {
        EntryKind::Directory
    } else if file_type.is_file() {
        EntryKind::File
    } else {
        EntryKind::Other
    }
}

impl Context for SystemContext {
    fn execute_command(&self, command: &str) -> Result<String> {
        let output = self
            .executor
            .execute(command, Some(self.config.command_timeout()))?;

        if !output.success() {
            let mut combined = output.stdout.trim_end().to_string();
            if !output.stderr.trim().is_empty() {
                if !combined.is_empty() {
                    combined.push('\n');
                }
                combined.push_str(output.stderr.trim_end());
            }
            return Err(CommandError::NonZeroExit {
                command: command.to_string(),
                exit_code: output.exit_code,
                output: combined,
            }
            .into());
        }

        Ok(output.stdout)
    }

    fn get_file_contents(&self, path: &str) -> Result<String> {
        fs::read_to_string(path).map_err(|e| Error::from(e).context(format!("Failed to read '{}'", path)))
    }

    fn write_file(&self, path: &str, contents: &str) -> Result<()> {
        let target = Path::new(path);
        let dir = target
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir)?;

        let mut temp = tempfile::NamedTempFile::new_in(dir)?;
        temp.write_all(contents.as_bytes())?;
        temp.flush()?;
        temp.persist(target)
            .map_err(|e| Error::from(e.error).context(format!("Failed to replace '{}'", path)))?;
        Ok(())
    }

    fn file_metadata(&self, path: &str) -> Result<FileMetadata> {
        use std::os::unix::fs::MetadataExt;

        let metadata = fs::metadata(path).map_err(|e| Error::from(e).context(format!("Failed to stat '{}'", path)))?;
        Ok(FileMetadata {
            uid: metadata.uid(),
            gid: metadata.gid(),
            mode: metadata.mode() & 0o7777,
            kind: entry_kind(metadata.file_type()),
        })
    }

    fn list_directory(&self, path: &str, recursive: bool) -> Result<Vec<DirEntry>> {
        let max_depth = if recursive { usize::MAX } else { 1 };
        let mut entries = Vec::new();

        for entry in walkdir::WalkDir::new(path)
            .min_depth(1)
            .max_depth(max_depth)
            .follow_links(false)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|e| {
                let message = e.to_string();
                match e.into_io_error() {
                    Some(io) => Error::from(io).context(format!("Failed to list '{}'", path)),
                    None => Error::new(message, EIO),
                }
            })?;
            entries.push(DirEntry {
                path: entry.path().to_string_lossy().to_string(),
                name: entry.file_name().to_string_lossy().to_string(),
                kind: entry_kind(entry.file_type()),
            });
        }

        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    fn set_owner(&self, path: &str, uid: u32, gid: u32) -> Result<()> {
        log::info!("Changing ownership of '{}' to {}:{}", path, uid, gid);
        std::os::unix::fs::chown(path, Some(uid), Some(gid))
            .map_err(|e| Error::from(e).context(format!("Failed to change ownership of '{}'", path)))
    }

    fn set_mode(&self, path: &str, mode: u32) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        log::info!("Changing mode of '{}' to {:o}", path, mode);
        fs::set_permissions(path, fs::Permissions::from_mode(mode))
            .map_err(|e| Error::from(e).context(format!("Failed to change mode of '{}'", path)))
    }

    fn now(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }

    fn package_cache_policy(&self) -> CachePolicy {
        CachePolicy {
            path: self.config.package_cache_path.to_string_lossy().to_string(),
            ttl: self.config.package_list_ttl_secs as i64,
            stale_ttl: self.config.package_list_stale_ttl_secs as i64,
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::error::ENOENT;
    use std::os::unix::fs::PermissionsExt;

    fn context() -> SystemContext {
        let mut executor = SystemCommandExecutor::new();
        executor.allow_commands(&["echo", "false"]);
        SystemContext::new(executor, EngineConfig::default())
    }

    #[test]
    fn test_missing_file_is_enoent() {
        let err = context().get_file_contents("/nonexistent/compliance/file").unwrap_err();
        assert_eq!(err.code, ENOENT);
    }

    #[test]
    fn test_write_then_read_and_chmod() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cache");
        let path = path.to_str().unwrap();
        let ctx = context();

        ctx.write_file(path, "# PackageCache rpm@1\n").unwrap();
        assert_eq!(ctx.get_file_contents(path).unwrap(), "# PackageCache rpm@1\n");

        ctx.set_mode(path, 0o600).unwrap();
        let metadata = ctx.file_metadata(path).unwrap();
        assert_eq!(metadata.mode, 0o600);
        assert_eq!(metadata.kind, EntryKind::File);
        assert_eq!(
            fs::metadata(path).unwrap().permissions().mode() & 0o777,
            0o600
        );
    }

    #[test]
    fn test_list_directory_recursion() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("a.conf"), "").unwrap();
        fs::write(dir.path().join("sub").join("b.conf"), "").unwrap();
        let root = dir.path().to_str().unwrap();
        let ctx = context();

        let shallow: Vec<_> = ctx
            .list_directory(root, false)
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(shallow, vec!["a.conf", "sub"]);

        let deep = ctx.list_directory(root, true).unwrap();
        assert_eq!(deep.len(), 3);
        assert!(deep.iter().any(|e| e.name == "b.conf" && e.kind == EntryKind::File));
    }

    #[test]
    fn test_command_failure_is_error() {
        let ctx = context();
        assert_eq!(ctx.execute_command("echo ok").unwrap(), "ok\n");
        let err = ctx.execute_command("false").unwrap_err();
        assert!(err.message.contains("exit code 1"), "{}", err.message);
    }
}
