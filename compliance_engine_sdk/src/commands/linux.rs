//! Linux command executor configuration
//!
//! Whitelists exactly the programs the registered procedures shell out to.

use compliance_engine_base::command_executor::SystemCommandExecutor;
use std::time::Duration;

/// Programs invoked by the procedures
pub const ALLOWED_PROGRAMS: &[&str] = &[
    "rpm",                             // Package list (PackageInstalled)
    "dpkg",                            // Package list (PackageInstalled)
    "systemctl",                       // Unit properties
    "/lib/systemd/systemd-sysctl",     // Stored sysctl configuration
    "/usr/lib/systemd/systemd-sysctl", // Same, merged-/usr layout
    "nft",                             // Firewall inspection (ExecuteCommandGrep)
    "iptables",
    "ip6tables",
    "uname",
];

/// Create the command executor used by [`SystemContext`]
///
/// [`SystemContext`]: compliance_engine_base::context::SystemContext
pub fn create_linux_command_executor(timeout: Duration) -> SystemCommandExecutor {
    let mut executor = SystemCommandExecutor::with_timeout(timeout);
    executor.allow_commands(ALLOWED_PROGRAMS);
    executor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linux_executor_whitelist() {
        let executor = create_linux_command_executor(Duration::from_secs(5));

        assert!(executor.is_allowed("rpm"));
        assert!(executor.is_allowed("systemctl"));
        assert!(executor.is_allowed("/usr/lib/systemd/systemd-sysctl"));
        assert!(executor.is_allowed("nft"));

        assert!(!executor.is_allowed("rm"));
        assert!(!executor.is_allowed("curl"));
        assert!(!executor.is_allowed("sh"));
    }

    #[test]
    fn test_timeout_is_applied() {
        let executor = create_linux_command_executor(Duration::from_secs(7));
        assert_eq!(executor.timeout(), Duration::from_secs(7));
    }

    #[test]
    fn test_non_whitelisted_command_refused() {
        let executor = create_linux_command_executor(Duration::from_secs(5));
        let result = executor.execute("cat /etc/shadow", None);
        match result {
            Err(compliance_engine_base::command_executor::CommandError::SecurityViolation { .. }) => {}
            _ => panic!("Expected a security violation"),
        }
    }
}
