//! Package presence procedure
//!
//! The installed list comes from [`Context::package_list`], which serves the
//! on-disk cache when it is fresh and only shells out to rpm or dpkg when it
//! has to.

use compliance_engine_base::bindings::{Arguments, Bindings};
use compliance_engine_base::context::Context;
use compliance_engine_base::error::{Result, Status};
use compliance_engine_base::indicators::{IndicatorsTree, ScopeId};
use compliance_engine_base::package_cache::PackageManager;
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManagerChoice {
    Autodetect,
    Rpm,
    Dpkg,
}

compliance_engine_base::map_enum!(PackageManagerChoice {
    "autodetect" => PackageManagerChoice::Autodetect,
    "rpm" => PackageManagerChoice::Rpm,
    "dpkg" => PackageManagerChoice::Dpkg,
});

impl PackageManagerChoice {
    fn pinned(self) -> Option<PackageManager> {
        match self {
            PackageManagerChoice::Autodetect => None,
            PackageManagerChoice::Rpm => Some(PackageManager::Rpm),
            PackageManagerChoice::Dpkg => Some(PackageManager::Dpkg),
        }
    }
}

pub struct PackageInstalledParams {
    pub package_name: String,
    pub min_package_version: Option<String>,
    pub package_manager: PackageManagerChoice,
}

impl Bindings for PackageInstalledParams {
    const FIELDS: &'static [&'static str] = &["packageName", "minPackageVersion", "packageManager"];

    fn bind(args: &Arguments<'_>) -> Result<Self> {
        Ok(Self {
            package_name: args.required("packageName")?,
            min_package_version: args.optional("minPackageVersion")?,
            package_manager: args.optional_or("packageManager", PackageManagerChoice::Autodetect)?,
        })
    }
}

// ============================================================================
// Version comparison
// ============================================================================

/// Split `[epoch:]version[-release]` into its three parts
fn split_evr(version: &str) -> (&str, &str, &str) {
    let (epoch, rest) = match version.split_once(':') {
        Some((epoch, rest)) => (epoch, rest),
        None => ("0", version),
    };
    match rest.rfind('-') {
        Some(dash) if dash > 0 => (epoch, &rest[..dash], &rest[dash + 1..]),
        _ => (epoch, rest, "0"),
    }
}

/// Maximal runs of digits or of letters; everything else separates segments
fn segments(part: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut chars = part.char_indices().peekable();
    while let Some((start, c)) = chars.next() {
        if !c.is_ascii_alphanumeric() {
            continue;
        }
        let numeric = c.is_ascii_digit();
        let mut end = start + c.len_utf8();
        while let Some(&(i, next)) = chars.peek() {
            if !next.is_ascii_alphanumeric() || next.is_ascii_digit() != numeric {
                break;
            }
            end = i + next.len_utf8();
            chars.next();
        }
        out.push(&part[start..end]);
    }
    out
}

fn strip_zeros(digits: &str) -> &str {
    match digits.trim_start_matches('0') {
        "" => "0",
        trimmed => trimmed,
    }
}

fn compare_segment(a: &str, b: &str) -> Ordering {
    let a_numeric = a.starts_with(|c: char| c.is_ascii_digit());
    let b_numeric = b.starts_with(|c: char| c.is_ascii_digit());
    match (a_numeric, b_numeric) {
        (true, true) => {
            let a = strip_zeros(a);
            let b = strip_zeros(b);
            a.len().cmp(&b.len()).then_with(|| a.cmp(b))
        }
        (false, false) => a.cmp(b),
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
    }
}

fn compare_part(a: &str, b: &str) -> Ordering {
    let a = segments(a);
    let b = segments(b);
    for (x, y) in a.iter().zip(&b) {
        let ordering = compare_segment(x, y);
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    a.len().cmp(&b.len())
}

/// Compare two package versions in rpm EVR order
pub fn version_compare(a: &str, b: &str) -> Ordering {
    let (a_epoch, a_version, a_release) = split_evr(a);
    let (b_epoch, b_version, b_release) = split_evr(b);
    compare_part(a_epoch, b_epoch)
        .then_with(|| compare_part(a_version, b_version))
        .then_with(|| compare_part(a_release, b_release))
}

// ============================================================================
// Procedure
// ============================================================================

pub fn audit_package_installed(
    params: &PackageInstalledParams,
    indicators: &mut IndicatorsTree,
    scope: ScopeId,
    context: &dyn Context,
) -> Result<Status> {
    let packages = context.package_list(params.package_manager.pinned())?;
    let name = &params.package_name;

    let installed = match packages.version_of(name) {
        Some(version) => version,
        None => return Ok(indicators.non_compliant(scope, format!("Package {} is not installed", name))),
    };

    match &params.min_package_version {
        Some(minimum) if version_compare(installed, minimum) == Ordering::Less => {
            log::debug!("Package {} version {} is below {}", name, installed, minimum);
            Ok(indicators.non_compliant(
                scope,
                format!(
                    "Package {} is installed but version {} is less than minimum required version {}",
                    name, installed, minimum
                ),
            ))
        }
        Some(minimum) => Ok(indicators.compliant(
            scope,
            format!(
                "Package {} is installed with version {}, which meets or exceeds the minimum required version {}",
                name, installed, minimum
            ),
        )),
        None => Ok(indicators.compliant(scope, format!("Package {} is installed", name))),
    }
}
