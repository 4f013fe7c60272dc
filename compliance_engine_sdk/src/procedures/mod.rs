//! Compliance procedures
//!
//! Each module defines a parameter struct with its [`Bindings`] and the
//! audit (and where supported, remediate) functions over it.
//!
//! [`Bindings`]: compliance_engine_base::bindings::Bindings

pub mod execute_command_grep;
pub mod file_permissions;
pub mod file_regex_match;
pub mod no_duplicate_entries;
pub mod package_installed;
pub mod sysctl;
pub mod systemd_unit_state;
pub mod testing;

pub use execute_command_grep::audit_execute_command_grep;
pub use file_permissions::{
    audit_ensure_file_permissions, audit_ensure_file_permissions_collection,
    remediate_ensure_file_permissions, remediate_ensure_file_permissions_collection,
};
pub use file_regex_match::audit_file_regex_match;
pub use no_duplicate_entries::audit_ensure_no_duplicate_entries_exist;
pub use package_installed::audit_package_installed;
pub use sysctl::audit_ensure_sysctl;
pub use systemd_unit_state::audit_systemd_unit_state;
