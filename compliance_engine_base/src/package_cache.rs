// src/package_cache.rs
//! Installed-package list with a persisted freshness cache
//!
//! Cache file layout:
//!
//! ```text
//! # PackageCache rpm@1700000000
//! bash 5.1.8-6.el9
//! openssh-server 8.7p1-34.el9
//! ```
//!
//! Freshness policy, by cache age:
//! - `< ttl`: served as-is, no package manager command runs
//! - `>= ttl`: refreshed; on refresh failure the old list is still served
//!   while its age is `< stale_ttl`, otherwise the failure is returned

use crate::context::Context;
use crate::error::{Error, Result, ENOENT};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

const CACHE_HEADER: &str = "# PackageCache ";
const RPM_LIST_COMMAND: &str = "rpm -qa --qf='%{NAME} %{EVR}\\n'";
const DPKG_LIST_COMMAND: &str = "dpkg -l";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PackageManager {
    Rpm,
    Dpkg,
}

impl PackageManager {
    pub fn as_str(self) -> &'static str {
        match self {
            PackageManager::Rpm => "rpm",
            PackageManager::Dpkg => "dpkg",
        }
    }
}

impl fmt::Display for PackageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PackageManager {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "rpm" => Ok(PackageManager::Rpm),
            "dpkg" => Ok(PackageManager::Dpkg),
            other => Err(Error::invalid(format!("Invalid package manager type '{}'", other))),
        }
    }
}

/// Where the cache lives and how long it may be served
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePolicy {
    pub path: String,
    pub ttl: i64,
    pub stale_ttl: i64,
}

/// Snapshot of installed packages
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageCache {
    pub package_manager: PackageManager,
    /// Unix time the list was taken
    pub timestamp: i64,
    pub packages: BTreeMap<String, String>,
}

impl PackageCache {
    pub fn new(package_manager: PackageManager, timestamp: i64) -> Self {
        Self {
            package_manager,
            timestamp,
            packages: BTreeMap::new(),
        }
    }

    pub fn version_of(&self, name: &str) -> Option<&str> {
        self.packages.get(name).map(String::as_str)
    }

    /// Parse the on-disk format; any deviation is an `EINVAL` error
    pub fn parse(text: &str) -> Result<Self> {
        let mut lines = text.lines();
        let header = lines
            .next()
            .ok_or_else(|| Error::invalid("Invalid cache file format"))?;
        let tag = header
            .strip_prefix(CACHE_HEADER)
            .ok_or_else(|| Error::invalid("Invalid cache file header format"))?;
        let (manager, timestamp) = tag
            .trim()
            .split_once('@')
            .ok_or_else(|| Error::invalid("Invalid cache file header format"))?;

        let package_manager: PackageManager = manager.parse()?;
        let timestamp: i64 = timestamp
            .parse()
            .map_err(|_| Error::invalid("Invalid timestamp in cache file header"))?;

        let mut cache = Self::new(package_manager, timestamp);
        for line in lines {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let (name, version) = match line.split_once(' ') {
                Some(entry) => entry,
                None => {
                    log::debug!("Skipping invalid package cache entry '{}'", line);
                    continue;
                }
            };
            cache
                .packages
                .insert(name.to_string(), version.trim().to_string());
        }
        Ok(cache)
    }

    pub fn serialize(&self) -> String {
        let mut out = format!("{}{}@{}\n", CACHE_HEADER, self.package_manager, self.timestamp);
        for (name, version) in &self.packages {
            out.push_str(name);
            out.push(' ');
            out.push_str(version);
            out.push('\n');
        }
        out
    }
}

// ============================================================================
// Package manager access
// ============================================================================

/// Probe for dpkg first, then rpm
pub fn detect_package_manager<C: Context + ?Sized>(context: &C) -> Result<PackageManager> {
    if context.execute_command("dpkg -l dpkg").is_ok() {
        return Ok(PackageManager::Dpkg);
    }
    if context.execute_command("rpm -q rpm").is_ok()
        || context.execute_command("rpm -q rpm-ndb").is_ok()
    {
        return Ok(PackageManager::Rpm);
    }
    Err(Error::new("No package manager found", ENOENT))
}

/// `name version` per line, as printed by the rpm query format
pub fn parse_rpm_list(output: &str) -> BTreeMap<String, String> {
    output
        .lines()
        .filter_map(|line| {
            let (name, version) = line.trim().split_once(' ')?;
            Some((name.to_string(), version.trim().to_string()))
        })
        .collect()
}

/// Installed (`ii`) rows of the `dpkg -l` table; architecture suffixes are dropped
pub fn parse_dpkg_list(output: &str) -> BTreeMap<String, String> {
    output
        .lines()
        .skip_while(|line| !line.starts_with("+++-"))
        .skip(1)
        .filter(|line| line.starts_with("ii "))
        .filter_map(|line| {
            let mut fields = line.split_whitespace().skip(1);
            let name = fields.next()?;
            let version = fields.next()?;
            let name = name.split(':').next().unwrap_or(name);
            Some((name.to_string(), version.to_string()))
        })
        .collect()
}

/// Query the package manager for the full installed list
pub fn fetch_package_list<C: Context + ?Sized>(
    context: &C,
    manager: PackageManager,
) -> Result<PackageCache> {
    let (command, parse): (&str, fn(&str) -> BTreeMap<String, String>) = match manager {
        PackageManager::Rpm => (RPM_LIST_COMMAND, parse_rpm_list),
        PackageManager::Dpkg => (DPKG_LIST_COMMAND, parse_dpkg_list),
    };

    let output = context
        .execute_command(command)
        .map_err(|e| e.context(format!("Failed to execute {} command", manager)))?;

    let mut cache = PackageCache::new(manager, context.now());
    cache.packages = parse(&output);
    Ok(cache)
}

fn load_cache<C: Context + ?Sized>(context: &C, policy: &CachePolicy) -> Option<PackageCache> {
    let text = match context.get_file_contents(&policy.path) {
        Ok(text) => text,
        Err(e) => {
            log::info!("No usable package cache at '{}': {}", policy.path, e);
            return None;
        }
    };

    match PackageCache::parse(&text) {
        Ok(cache) => Some(cache),
        Err(e) => {
            log::warn!("Ignoring malformed package cache '{}': {}", policy.path, e);
            None
        }
    }
}

/// Installed packages according to the freshness policy.
///
/// `requested` pins the package manager; a cache written by a different
/// manager is then ignored.
pub fn get_package_list<C: Context + ?Sized>(
    context: &C,
    requested: Option<PackageManager>,
    policy: &CachePolicy,
) -> Result<PackageCache> {
    let now = context.now();
    let mut cache = load_cache(context, policy);

    if let (Some(c), Some(manager)) = (&cache, requested) {
        if c.package_manager != manager {
            log::info!(
                "Package manager mismatch: cache has {}, requested {}",
                c.package_manager,
                manager
            );
            cache = None;
        }
    }

    if let Some(c) = &cache {
        if c.timestamp > now {
            log::warn!("Package cache timestamp {} is in the future, ignoring", c.timestamp);
            cache = None;
        }
    }

    let stale = match cache {
        Some(c) => {
            let age = now - c.timestamp;
            if age < policy.ttl {
                log::debug!("Serving package list from cache (age {}s)", age);
                return Ok(c);
            }
            log::info!("Package cache is {}s old, refreshing", age);
            Some((c, age))
        }
        None => None,
    };

    let refreshed = match requested.or(stale.as_ref().map(|(c, _)| c.package_manager)) {
        Some(manager) => fetch_package_list(context, manager),
        None => detect_package_manager(context).and_then(|m| fetch_package_list(context, m)),
    };

    match refreshed {
        Ok(fresh) => {
            if let Err(e) = context.write_file(&policy.path, &fresh.serialize()) {
                log::error!("Failed to save package cache: {}", e);
            }
            Ok(fresh)
        }
        Err(e) => match stale {
            Some((c, age)) if age < policy.stale_ttl => {
                log::error!("Failed to get installed packages: {}, reusing stale cache", e);
                Ok(c)
            }
            _ => Err(e.context("Failed to get installed packages")),
        },
    }
}
