//! Kernel parameter procedure
//!
//! A parameter is compliant when both the running kernel and the persisted
//! configuration agree with the expected pattern. The persisted value is the
//! one systemd-sysctl would apply last; a UFW sysctl file is consulted when no
//! sysctl.d fragment sets the key.

use compliance_engine_base::bindings::{Arguments, Bindings};
use compliance_engine_base::context::Context;
use compliance_engine_base::error::{Error, Result, Status};
use compliance_engine_base::indicators::{IndicatorsTree, ScopeId};
use compliance_engine_base::pattern::Pattern;
use lazy_static::lazy_static;
use regex::Regex;

const PROC_SYS: &str = "/proc/sys";
const SYSTEMD_SYSCTL_LOCATIONS: &[&str] = &["/lib/systemd/systemd-sysctl", "/usr/lib/systemd/systemd-sysctl"];
const UFW_DEFAULTS: &str = "/etc/default/ufw";
const UFW_SYSCTL_KEY: &str = "IPT_SYSCTL=";

pub struct EnsureSysctlParams {
    /// Dotted parameter name, e.g. `net.ipv4.ip_forward`
    pub sysctl_name: String,
    /// Pattern the value must contain
    pub value: Pattern,
}

impl Bindings for EnsureSysctlParams {
    const FIELDS: &'static [&'static str] = &["sysctlName", "value"];

    fn bind(args: &Arguments<'_>) -> Result<Self> {
        Ok(Self {
            sysctl_name: args.required("sysctlName")?,
            value: args.required("value")?,
        })
    }
}

lazy_static! {
    static ref ASSIGNMENT: Regex = Regex::new(r"^\s*([a-zA-Z0-9_]+[.a-zA-Z0-9_-]+)\s*=\s*(.*)$").unwrap();
    static ref FILE_HEADER: Regex = Regex::new(r"^\s*#\s*(/.*\.conf)\s*$").unwrap();
}

/// Last assignment of `name` in `--cat-config` output
#[derive(Debug, PartialEq, Eq)]
pub struct StoredValue {
    pub value: String,
    /// Fragment the assignment came from, when a header precedes it
    pub file: Option<String>,
}

/// Find the assignment of `name` that takes effect: the last one in declaration order
pub fn find_stored_value(cat_config: &str, name: &str) -> Option<StoredValue> {
    let lines: Vec<&str> = cat_config.lines().collect();

    let (index, value) = lines.iter().enumerate().rev().find_map(|(index, line)| {
        let line = line.split('#').next().unwrap_or_default();
        let captures = ASSIGNMENT.captures(line)?;
        (captures[1].trim() == name).then(|| (index, captures[2].trim().to_string()))
    })?;

    let file = lines[..index]
        .iter()
        .rev()
        .find_map(|line| FILE_HEADER.captures(line).map(|c| c[1].to_string()));

    Some(StoredValue { value, file })
}

fn systemd_sysctl(context: &dyn Context) -> Result<&'static str> {
    SYSTEMD_SYSCTL_LOCATIONS
        .iter()
        .copied()
        .find(|location| context.execute_command(&format!("{} --version", location)).is_ok())
        .ok_or_else(|| Error::not_found("Cannot find systemd-sysctl command"))
}

pub fn audit_ensure_sysctl(
    params: &EnsureSysctlParams,
    indicators: &mut IndicatorsTree,
    scope: ScopeId,
    context: &dyn Context,
) -> Result<Status> {
    let name = &params.sysctl_name;
    let relative = name.replace('.', "/");
    let proc_path = context.special_file_path(&format!("{}/{}", PROC_SYS, relative));

    let runtime = context.get_file_contents(&proc_path)?;
    let runtime = runtime.strip_suffix('\n').unwrap_or(&runtime);
    if !params.value.is_match(runtime) {
        return Ok(indicators.non_compliant(
            scope,
            format!("Expected '{}' got '{}' in runtime configuration", name, runtime),
        ));
    }
    indicators.compliant(scope, format!("Correct value for '{}' in runtime configuration", name));

    let command = systemd_sysctl(context)?;
    let cat_config = context
        .execute_command(&format!("{} --cat-config", command))
        .map_err(|e| {
            log::error!("Failed to execute systemd-sysctl command: {}", e);
            e
        })?;

    match find_stored_value(&cat_config, name) {
        Some(stored) if params.value.is_match(&stored.value) => {
            return Ok(indicators.compliant(
                scope,
                format!("Correct value for '{}' in stored configuration", name),
            ));
        }
        Some(stored) => {
            return Ok(indicators.non_compliant(
                scope,
                format!(
                    "Expected '{}' got '{}' found in: '{}'",
                    name,
                    stored.value,
                    stored.file.unwrap_or_default()
                ),
            ));
        }
        None => {
            indicators.non_compliant(
                scope,
                format!("Expected '{}' not found in stored sysctl configuration", name),
            );
        }
    }

    audit_ufw_sysctl(params, &relative, indicators, scope, context)
}

/// Fallback to the sysctl file UFW applies when it starts
fn audit_ufw_sysctl(
    params: &EnsureSysctlParams,
    relative: &str,
    indicators: &mut IndicatorsTree,
    scope: ScopeId,
    context: &dyn Context,
) -> Result<Status> {
    let name = &params.sysctl_name;
    let defaults = match context.get_file_contents(UFW_DEFAULTS) {
        Ok(defaults) => defaults,
        Err(e) => {
            return Ok(indicators.non_compliant(
                scope,
                format!("Failed to read {}: {}", UFW_DEFAULTS, e.message),
            ))
        }
    };

    let sysctl_file = defaults
        .lines()
        .find_map(|line| line.strip_prefix(UFW_SYSCTL_KEY))
        .map(str::trim)
        .filter(|file| !file.is_empty());
    let sysctl_file = match sysctl_file {
        Some(file) => file,
        None => {
            return Ok(indicators.non_compliant(
                scope,
                format!("Failed to find IPT_SYSCTL in {}", UFW_DEFAULTS),
            ))
        }
    };

    let contents = match context.get_file_contents(sysctl_file) {
        Ok(contents) => contents,
        Err(e) => {
            return Ok(indicators.non_compliant(
                scope,
                format!("Failed to read ufw sysctl config file: {}", e.message),
            ))
        }
    };

    let prefix = format!("{}=", relative);
    match contents.lines().find_map(|line| line.strip_prefix(&prefix)) {
        Some(value) if params.value.is_match(value) => Ok(indicators.compliant(
            scope,
            format!("Correct value for '{}' in UFW configuration", name),
        )),
        Some(value) => Ok(indicators.non_compliant(
            scope,
            format!("Expected '{}', got '{}' in UFW configuration", name, value),
        )),
        None => Ok(indicators.non_compliant(
            scope,
            format!("Value not found in UFW configuration for '{}'", name),
        )),
    }
}
