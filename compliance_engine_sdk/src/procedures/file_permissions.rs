//! File ownership and permission procedures
//!
//! `EnsureFilePermissions` checks a single file against an owner list, a
//! group list, required permission bits and a mask of forbidden bits.
//! `EnsureFilePermissionsCollection` applies the same check to every file in
//! a directory whose name matches a shell glob.

use compliance_engine_base::bindings::{Arguments, Bindings, FileMode, Separated};
use compliance_engine_base::context::{Context, EntryKind, FileMetadata};
use compliance_engine_base::error::{Error, Result, Status, ENOENT};
use compliance_engine_base::indicators::{IndicatorsTree, ScopeId};

/// Bits shown in permission messages
const DISPLAY_MASK: u32 = 0o7777;

/// Alternative names compared exactly, e.g. `root|shadow`
type NameList = Separated<String, '|'>;

pub struct EnsureFilePermissionsParams {
    pub filename: String,
    /// Acceptable owners; the first one is used for remediation
    pub owner: Option<NameList>,
    /// Acceptable groups; the first one is used for remediation
    pub group: Option<NameList>,
    /// Bits that must be set
    pub permissions: Option<FileMode>,
    /// Bits that must be clear
    pub mask: Option<FileMode>,
}

impl Bindings for EnsureFilePermissionsParams {
    const FIELDS: &'static [&'static str] = &["filename", "owner", "group", "permissions", "mask"];

    fn bind(args: &Arguments<'_>) -> Result<Self> {
        Ok(Self {
            filename: args.required("filename")?,
            owner: args.optional("owner")?,
            group: args.optional("group")?,
            permissions: args.optional("permissions")?,
            mask: args.optional("mask")?,
        })
    }
}

pub struct EnsureFilePermissionsCollectionParams {
    pub directory: String,
    /// Shell glob matched against file names, e.g. `*.conf`
    pub ext: glob::Pattern,
    pub owner: Option<NameList>,
    pub group: Option<NameList>,
    pub permissions: Option<FileMode>,
    pub mask: Option<FileMode>,
    pub recurse: bool,
}

impl Bindings for EnsureFilePermissionsCollectionParams {
    const FIELDS: &'static [&'static str] = &[
        "directory",
        "ext",
        "owner",
        "group",
        "permissions",
        "mask",
        "recurse",
    ];

    fn bind(args: &Arguments<'_>) -> Result<Self> {
        let ext: String = args.required("ext")?;
        let ext = glob::Pattern::new(&ext).map_err(|e| {
            Error::invalid(format!("Failed to parse parameter 'ext': invalid glob '{}': {}", ext, e))
        })?;

        Ok(Self {
            directory: args.required("directory")?,
            ext,
            owner: args.optional("owner")?,
            group: args.optional("group")?,
            permissions: args.optional("permissions")?,
            mask: args.optional("mask")?,
            recurse: args.optional_or("recurse", true)?,
        })
    }
}

fn list_text(list: &NameList) -> String {
    list.iter().map(String::as_str).collect::<Vec<_>>().join("|")
}

fn is_listed(list: &NameList, name: &str) -> bool {
    list.iter().any(|n| n == name)
}

fn check_exclusive_bits(params: &EnsureFilePermissionsParams) -> Result<()> {
    if let (Some(permissions), Some(mask)) = (params.permissions, params.mask) {
        if permissions.0 & mask.0 != 0 {
            log::error!("Invalid permissions and mask - same bits set in both");
            return Err(Error::invalid("Invalid permissions and mask - same bits set in both"));
        }
    }
    Ok(())
}

/// Metadata of `path`, or `None` when it does not exist
fn stat(context: &dyn Context, path: &str) -> Result<Option<FileMetadata>> {
    match context.file_metadata(path) {
        Ok(metadata) => Ok(Some(metadata)),
        Err(e) if e.code == ENOENT => Ok(None),
        Err(e) => {
            log::error!("Stat error on '{}': {}", path, e);
            Err(e.context("Stat error"))
        }
    }
}

// ============================================================================
// Single file
// ============================================================================

pub fn audit_ensure_file_permissions(
    params: &EnsureFilePermissionsParams,
    indicators: &mut IndicatorsTree,
    scope: ScopeId,
    context: &dyn Context,
) -> Result<Status> {
    let filename = &params.filename;
    let metadata = match stat(context, filename)? {
        Some(metadata) => metadata,
        None => {
            log::debug!("File '{}' does not exist", filename);
            return Ok(indicators.compliant(scope, format!("File '{}' does not exist", filename)));
        }
    };

    if let Some(owner) = &params.owner {
        let name = match context.user_name(metadata.uid) {
            Ok(name) => name,
            Err(_) => {
                return Ok(indicators.non_compliant(scope, format!("No user with uid {}", metadata.uid)))
            }
        };
        if !is_listed(owner, &name) {
            return Ok(indicators.non_compliant(
                scope,
                format!(
                    "Invalid owner on '{}' - is '{}' should be '{}'",
                    filename,
                    name,
                    list_text(owner)
                ),
            ));
        }
        indicators.compliant(
            scope,
            format!("{} owner matches expected value '{}'", filename, list_text(owner)),
        );
    }

    if let Some(group) = &params.group {
        let name = match context.group_name(metadata.gid) {
            Ok(name) => name,
            Err(_) => {
                return Ok(indicators.non_compliant(scope, format!("No group with gid {}", metadata.gid)))
            }
        };
        if !is_listed(group, &name) {
            return Ok(indicators.non_compliant(
                scope,
                format!(
                    "Invalid group on '{}' - is '{}' should be '{}'",
                    filename,
                    name,
                    list_text(group)
                ),
            ));
        }
        indicators.compliant(
            scope,
            format!("{} group matches expected value '{}'", filename, list_text(group)),
        );
    }

    check_exclusive_bits(params)?;

    let mode = metadata.mode & DISPLAY_MASK;
    if let Some(FileMode(permissions)) = params.permissions {
        if mode & permissions != permissions {
            return Ok(indicators.non_compliant(
                scope,
                format!(
                    "Invalid permissions on '{}' - are {:o} should be at least {:o}",
                    filename, mode, permissions
                ),
            ));
        }
        indicators.compliant(
            scope,
            format!("{} matches expected permissions {:o}", filename, permissions),
        );
    }

    if let Some(FileMode(mask)) = params.mask {
        if mode & mask != 0 {
            return Ok(indicators.non_compliant(
                scope,
                format!(
                    "Invalid permissions on '{}' - are {:o} should be set to {:03o} or a more restrictive value",
                    filename,
                    mode,
                    mode & !mask
                ),
            ));
        }
        indicators.compliant(scope, format!("{} mask matches expected mask {:o}", filename, mask));
    }

    Ok(indicators.compliant(
        scope,
        format!("File '{}' has correct permissions and ownership", filename),
    ))
}

/// Resolve the id to apply: the current one when its name is acceptable, else the first listed name
fn target_id(
    list: &NameList,
    current_id: u32,
    current_name: Option<String>,
    lookup: impl Fn(&str) -> Result<u32>,
) -> std::result::Result<u32, String> {
    if let Some(name) = current_name {
        if is_listed(list, &name) {
            return Ok(current_id);
        }
    }
    let first = list.first().map(String::as_str).unwrap_or_default();
    lookup(first).map_err(|_| first.to_string())
}

pub fn remediate_ensure_file_permissions(
    params: &EnsureFilePermissionsParams,
    indicators: &mut IndicatorsTree,
    scope: ScopeId,
    context: &dyn Context,
) -> Result<Status> {
    let filename = &params.filename;
    let metadata = match stat(context, filename)? {
        Some(metadata) => metadata,
        None => {
            log::debug!("File '{}' does not exist", filename);
            return Ok(indicators.non_compliant(scope, format!("File '{}' does not exist", filename)));
        }
    };
    check_exclusive_bits(params)?;

    let mut uid = metadata.uid;
    if let Some(owner) = &params.owner {
        uid = match target_id(owner, metadata.uid, context.user_name(metadata.uid).ok(), |n| {
            context.user_id(n)
        }) {
            Ok(uid) => uid,
            Err(name) => {
                return Ok(indicators.non_compliant(scope, format!("No user with name {}", name)))
            }
        };
    }

    let mut gid = metadata.gid;
    if let Some(group) = &params.group {
        gid = match target_id(group, metadata.gid, context.group_name(metadata.gid).ok(), |n| {
            context.group_id(n)
        }) {
            Ok(gid) => gid,
            Err(name) => {
                return Ok(indicators.non_compliant(scope, format!("No group with name {}", name)))
            }
        };
    }

    if (uid, gid) != (metadata.uid, metadata.gid) {
        log::info!(
            "Changing owner of '{}' from {}:{} to {}:{}",
            filename,
            metadata.uid,
            metadata.gid,
            uid,
            gid
        );
        context
            .set_owner(filename, uid, gid)
            .map_err(|e| e.context("Chown error"))?;
        indicators.compliant(scope, format!("{} owner changed to {}:{}", filename, uid, gid));
    }

    let mut mode = metadata.mode & DISPLAY_MASK;
    if let Some(FileMode(permissions)) = params.permissions {
        mode |= permissions;
    }
    if let Some(FileMode(mask)) = params.mask {
        mode &= !mask;
    }
    if mode != metadata.mode & DISPLAY_MASK {
        log::info!(
            "Changing permissions of '{}' from {:o} to {:o}",
            filename,
            metadata.mode,
            mode
        );
        context
            .set_mode(filename, mode)
            .map_err(|e| e.context("Chmod error"))?;
        indicators.compliant(scope, format!("{} permissions changed to {:o}", filename, mode));
    }

    log::debug!("File '{}' remediation succeeded", filename);
    Ok(Status::Compliant)
}

// ============================================================================
// Directory collection
// ============================================================================

fn collection_helper(
    params: &EnsureFilePermissionsCollectionParams,
    indicators: &mut IndicatorsTree,
    scope: ScopeId,
    context: &dyn Context,
    remediate: bool,
) -> Result<Status> {
    let directory = &params.directory;
    let entries = match context.list_directory(directory, params.recurse) {
        Ok(entries) => entries,
        Err(e) if e.code == ENOENT => {
            log::info!("Directory '{}' does not exist", directory);
            return Ok(indicators.compliant(scope, format!("Directory '{}' does not exist", directory)));
        }
        Err(e) => return Err(e),
    };

    let mut has_files = false;
    for entry in entries
        .iter()
        .filter(|e| e.kind == EntryKind::File && params.ext.matches(&e.name))
    {
        has_files = true;
        let file_params = EnsureFilePermissionsParams {
            filename: entry.path.clone(),
            owner: params.owner.clone(),
            group: params.group.clone(),
            permissions: params.permissions,
            mask: params.mask,
        };

        let child = indicators.push("EnsureFilePermissions");
        let result = if remediate {
            remediate_ensure_file_permissions(&file_params, indicators, child, context)
        } else {
            audit_ensure_file_permissions(&file_params, indicators, child, context)
        };
        if let Ok(status) = &result {
            indicators.set_status(child, *status);
        }
        indicators.pop(child)?;

        match result {
            Err(e) => {
                log::error!("Error processing permissions for '{}': {}", entry.path, e);
                return Err(e);
            }
            Ok(Status::NonCompliant) => {
                log::info!("File '{}' does not match expected permissions", entry.path);
                return Ok(Status::NonCompliant);
            }
            Ok(Status::Compliant) => {}
        }
    }

    if has_files {
        Ok(indicators.compliant(
            scope,
            format!("All matching files in '{}' match expected permissions", directory),
        ))
    } else {
        Ok(indicators.compliant(scope, format!("No files in '{}' match the pattern", directory)))
    }
}

pub fn audit_ensure_file_permissions_collection(
    params: &EnsureFilePermissionsCollectionParams,
    indicators: &mut IndicatorsTree,
    scope: ScopeId,
    context: &dyn Context,
) -> Result<Status> {
    collection_helper(params, indicators, scope, context, false)
}

pub fn remediate_ensure_file_permissions_collection(
    params: &EnsureFilePermissionsCollectionParams,
    indicators: &mut IndicatorsTree,
    scope: ScopeId,
    context: &dyn Context,
) -> Result<Status> {
    collection_helper(params, indicators, scope, context, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use compliance_engine_base::bindings::{arg_map, bind};
    use compliance_engine_base::context::MockContext;
    use compliance_engine_base::error::EINVAL;
    use compliance_engine_base::formatters::{CompactListFormatter, PayloadFormatter};

    const PASSWD: &str = "root:x:0:0:root:/root:/bin/bash\nbin:x:1:1:bin:/bin:/sbin/nologin\n";
    const GROUP: &str = "root:x:0:\nbin:x:1:\nadm:x:4:\n";

    fn accounts() -> MockContext {
        MockContext::new()
            .with_file("/etc/passwd", PASSWD)
            .with_file("/etc/group", GROUP)
    }

    fn run(
        function: fn(&EnsureFilePermissionsParams, &mut IndicatorsTree, ScopeId, &dyn Context) -> Result<Status>,
        args: &[(&str, &str)],
        context: &MockContext,
    ) -> (Result<Status>, IndicatorsTree) {
        let params: EnsureFilePermissionsParams = bind(&arg_map(args.iter().copied())).unwrap();
        let mut tree = IndicatorsTree::new();
        let scope = tree.push("EnsureFilePermissions");
        let result = function(&params, &mut tree, scope, context);
        tree.pop(scope).unwrap();
        (result, tree)
    }

    fn report(tree: &IndicatorsTree) -> String {
        CompactListFormatter.format(tree).unwrap()
    }

    #[test]
    fn test_wrong_owner_remediated_idempotently() {
        let context = accounts()
            .with_file("/tmp/x", "")
            .with_metadata("/tmp/x", FileMetadata::file(1, 0, 0o610));
        let args = [
            ("filename", "/tmp/x"),
            ("owner", "root"),
            ("group", "root"),
            ("permissions", "0400"),
            ("mask", "0066"),
        ];

        let (status, tree) = run(audit_ensure_file_permissions, &args, &context);
        assert_eq!(status.unwrap(), Status::NonCompliant);
        assert!(report(&tree).contains("owner"));

        let (status, tree) = run(remediate_ensure_file_permissions, &args, &context);
        assert_eq!(status.unwrap(), Status::Compliant);
        assert!(report(&tree).contains("/tmp/x owner changed to 0:0"));
        let metadata = context.metadata_of("/tmp/x").unwrap();
        assert_eq!((metadata.uid, metadata.gid, metadata.mode & 0o777), (0, 0, 0o610));

        let (status, tree) = run(remediate_ensure_file_permissions, &args, &context);
        assert_eq!(status.unwrap(), Status::Compliant);
        assert_eq!(report(&tree), "");

        let (status, _) = run(audit_ensure_file_permissions, &args, &context);
        assert_eq!(status.unwrap(), Status::Compliant);
    }

    #[test]
    fn test_permission_and_mask_messages() {
        let context = accounts()
            .with_file("/etc/shadow", "")
            .with_metadata("/etc/shadow", FileMetadata::file(0, 0, 0o644));

        let (status, tree) = run(
            audit_ensure_file_permissions,
            &[("filename", "/etc/shadow"), ("permissions", "0700")],
            &context,
        );
        assert_eq!(status.unwrap(), Status::NonCompliant);
        assert_eq!(
            report(&tree),
            "[NonCompliant] Invalid permissions on '/etc/shadow' - are 644 should be at least 700\n"
        );

        let (status, tree) = run(
            audit_ensure_file_permissions,
            &[("filename", "/etc/shadow"), ("mask", "0077")],
            &context,
        );
        assert_eq!(status.unwrap(), Status::NonCompliant);
        assert!(report(&tree).contains("should be set to 600 or a more restrictive value"));

        let (status, _) = run(
            remediate_ensure_file_permissions,
            &[("filename", "/etc/shadow"), ("mask", "0077")],
            &context,
        );
        assert_eq!(status.unwrap(), Status::Compliant);
        assert_eq!(context.metadata_of("/etc/shadow").unwrap().mode, 0o600);
    }

    #[test]
    fn test_alternative_owners_and_missing_file() {
        let context = accounts()
            .with_file("/var/log/syslog", "")
            .with_metadata("/var/log/syslog", FileMetadata::file(0, 4, 0o640));

        let (status, tree) = run(
            audit_ensure_file_permissions,
            &[("filename", "/var/log/syslog"), ("group", "root|adm")],
            &context,
        );
        assert_eq!(status.unwrap(), Status::Compliant);
        assert!(report(&tree).contains("group matches expected value 'root|adm'"));

        let (status, tree) = run(audit_ensure_file_permissions, &[("filename", "/nope")], &context);
        assert_eq!(status.unwrap(), Status::Compliant);
        assert_eq!(report(&tree), "[Compliant] File '/nope' does not exist\n");

        let (status, _) = run(remediate_ensure_file_permissions, &[("filename", "/nope")], &context);
        assert_eq!(status.unwrap(), Status::NonCompliant);
    }

    #[test]
    fn test_owner_and_group_names_compared_literally() {
        let context = accounts()
            .with_file("/tmp/x", "")
            .with_metadata("/tmp/x", FileMetadata::file(0, 0, 0o600));

        let (status, tree) = run(
            audit_ensure_file_permissions,
            &[("filename", "/tmp/x"), ("owner", "r.+"), ("group", ".*")],
            &context,
        );
        assert_eq!(status.unwrap(), Status::NonCompliant);
        assert_eq!(
            report(&tree),
            "[NonCompliant] Invalid owner on '/tmp/x' - is 'root' should be 'r.+'\n"
        );

        let (status, tree) = run(
            audit_ensure_file_permissions,
            &[("filename", "/tmp/x"), ("owner", "root"), ("group", "ro.t")],
            &context,
        );
        assert_eq!(status.unwrap(), Status::NonCompliant);
        assert!(report(&tree).contains("Invalid group on '/tmp/x' - is 'root' should be 'ro.t'"));

        let (status, tree) = run(
            remediate_ensure_file_permissions,
            &[("filename", "/tmp/x"), ("owner", "r.+")],
            &context,
        );
        assert_eq!(status.unwrap(), Status::NonCompliant);
        assert_eq!(report(&tree), "[NonCompliant] No user with name r.+\n");
    }

    #[test]
    fn test_unknown_uid_and_overlapping_bits() {
        let context = accounts()
            .with_file("/srv/data", "")
            .with_metadata("/srv/data", FileMetadata::file(99, 0, 0o600));

        let (status, tree) = run(
            audit_ensure_file_permissions,
            &[("filename", "/srv/data"), ("owner", "root")],
            &context,
        );
        assert_eq!(status.unwrap(), Status::NonCompliant);
        assert_eq!(report(&tree), "[NonCompliant] No user with uid 99\n");

        let (result, _) = run(
            audit_ensure_file_permissions,
            &[("filename", "/srv/data"), ("permissions", "0600"), ("mask", "0644")],
            &context,
        );
        match result {
            Err(e) => assert_eq!(e.code, EINVAL),
            _ => panic!("Expected overlapping bits to be rejected"),
        }

        let (status, tree) = run(
            remediate_ensure_file_permissions,
            &[("filename", "/srv/data"), ("owner", "nobody")],
            &context,
        );
        assert_eq!(status.unwrap(), Status::NonCompliant);
        assert_eq!(report(&tree), "[NonCompliant] No user with name nobody\n");
    }

    fn run_collection(
        remediate: bool,
        args: &[(&str, &str)],
        context: &MockContext,
    ) -> (Result<Status>, IndicatorsTree) {
        let params: EnsureFilePermissionsCollectionParams =
            bind(&arg_map(args.iter().copied())).unwrap();
        let mut tree = IndicatorsTree::new();
        let scope = tree.push("EnsureFilePermissionsCollection");
        let result = if remediate {
            remediate_ensure_file_permissions_collection(&params, &mut tree, scope, context)
        } else {
            audit_ensure_file_permissions_collection(&params, &mut tree, scope, context)
        };
        tree.pop(scope).unwrap();
        (result, tree)
    }

    #[test]
    fn test_collection_matches_glob_and_recurse() {
        let context = accounts()
            .with_file("/etc/cron.d/a.conf", "")
            .with_file("/etc/cron.d/readme", "")
            .with_metadata("/etc/cron.d/readme", FileMetadata::file(0, 0, 0o666))
            .with_file("/etc/cron.d/sub/b.conf", "")
            .with_metadata("/etc/cron.d/sub/b.conf", FileMetadata::file(0, 0, 0o666));
        let args = [("directory", "/etc/cron.d"), ("ext", "*.conf"), ("mask", "0022")];

        let (status, _) = run_collection(false, &args, &context);
        assert_eq!(status.unwrap(), Status::NonCompliant);

        let shallow = [
            ("directory", "/etc/cron.d"),
            ("ext", "*.conf"),
            ("mask", "0022"),
            ("recurse", "false"),
        ];
        let (status, tree) = run_collection(false, &shallow, &context);
        assert_eq!(status.unwrap(), Status::Compliant);
        assert!(report(&tree).contains("All matching files in '/etc/cron.d' match expected permissions"));

        let (status, _) = run_collection(true, &args, &context);
        assert_eq!(status.unwrap(), Status::Compliant);
        assert_eq!(context.metadata_of("/etc/cron.d/sub/b.conf").unwrap().mode, 0o644);
        assert_eq!(context.metadata_of("/etc/cron.d/readme").unwrap().mode, 0o666);

        let (status, _) = run_collection(false, &args, &context);
        assert_eq!(status.unwrap(), Status::Compliant);
    }

    #[test]
    fn test_collection_missing_directory_and_no_matches() {
        let context = accounts().with_file("/etc/ssh/moduli", "");

        let (status, tree) = run_collection(false, &[("directory", "/etc/nope"), ("ext", "*")], &context);
        assert_eq!(status.unwrap(), Status::Compliant);
        assert_eq!(report(&tree), "[Compliant] Directory '/etc/nope' does not exist\n");

        let (status, tree) =
            run_collection(false, &[("directory", "/etc/ssh"), ("ext", "*.pub")], &context);
        assert_eq!(status.unwrap(), Status::Compliant);
        assert_eq!(report(&tree), "[Compliant] No files in '/etc/ssh' match the pattern\n");
    }

    #[test]
    fn test_invalid_glob_is_binding_error() {
        let err = bind::<EnsureFilePermissionsCollectionParams>(&arg_map([
            ("directory", "/etc"),
            ("ext", "[*"),
        ]))
        .err()
        .unwrap();
        assert_eq!(err.code, EINVAL);
    }
}
