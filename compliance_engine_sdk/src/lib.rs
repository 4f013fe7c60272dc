//! # Compliance Engine SDK
//!
//! Host compliance procedures built on `compliance_engine_base`: file
//! permissions, kernel parameters, packages, file content, firewall and
//! systemd unit checks.

pub mod commands;
pub mod procedures;

use compliance_engine_base::registry::{ProcedureRegistry, RegistryBuilder};
use compliance_engine_base::Result;
use procedures::*;

/// Create a registry with every available procedure
///
/// Includes:
/// - File ownership and permissions, single file and directory (audit + remediate)
/// - Kernel parameters, runtime and persisted
/// - Package presence and minimum version
/// - Regex search over file contents
/// - Firewall and kernel command output grep
/// - systemd unit properties
/// - Duplicate entries in delimited files
/// - Fixed-outcome testing procedures
pub fn create_procedure_registry() -> Result<ProcedureRegistry> {
    let registry = RegistryBuilder::new()
        .audit_and_remediate(
            "EnsureFilePermissions",
            audit_ensure_file_permissions,
            remediate_ensure_file_permissions,
        )?
        .audit_and_remediate(
            "EnsureFilePermissionsCollection",
            audit_ensure_file_permissions_collection,
            remediate_ensure_file_permissions_collection,
        )?
        .audit("EnsureSysctl", audit_ensure_sysctl)?
        .audit("PackageInstalled", audit_package_installed)?
        .audit("FileRegexMatch", audit_file_regex_match)?
        .audit("ExecuteCommandGrep", audit_execute_command_grep)?
        .audit("SystemdUnitState", audit_systemd_unit_state)?
        .audit("EnsureNoDuplicateEntriesExist", audit_ensure_no_duplicate_entries_exist)?
        // Testing procedures
        .audit("AuditSuccess", testing::audit_success)?
        .audit("AuditFailure", testing::audit_failure)?
        .remediate("RemediationSuccess", testing::remediation_success)?
        .remediate("RemediationFailure", testing::remediation_failure)?
        .build();

    log::debug!(
        "Registered {} procedures",
        registry.get_statistics().total_procedures
    );
    Ok(registry)
}
