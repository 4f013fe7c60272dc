// src/error.rs
//! Error, Result and Status types shared by every part of the engine
//!
//! Errors carry a human readable message and a POSIX errno-style code so the
//! caller can tell a malformed rule (`EINVAL`) from a missing resource
//! (`ENOENT`) or a forbidden-but-present condition (`EEXIST`).

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// errno codes
// ============================================================================

pub const EPERM: i32 = 1;
pub const ENOENT: i32 = 2;
pub const EIO: i32 = 5;
pub const ENOMEM: i32 = 12;
pub const EACCES: i32 = 13;
pub const EEXIST: i32 = 17;
pub const EINVAL: i32 = 22;

/// Engine error: a message plus an errno-style code
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct Error {
    pub message: String,
    pub code: i32,
}

impl Error {
    pub fn new(message: impl Into<String>, code: i32) -> Self {
        Self {
            message: message.into(),
            code,
        }
    }

    /// Shorthand for a binding/argument error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(message, EINVAL)
    }

    /// Shorthand for a missing resource
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(message, ENOENT)
    }

    /// Prefix the message with additional context, keeping the code
    pub fn context(self, prefix: impl fmt::Display) -> Self {
        Self {
            message: format!("{}: {}", prefix, self.message),
            code: self.code,
        }
    }
}

/// Engine-wide result alias
pub type Result<T> = std::result::Result<T, Error>;

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        let code = match e.kind() {
            std::io::ErrorKind::NotFound => ENOENT,
            std::io::ErrorKind::PermissionDenied => EACCES,
            std::io::ErrorKind::AlreadyExists => EEXIST,
            std::io::ErrorKind::InvalidInput | std::io::ErrorKind::InvalidData => EINVAL,
            _ => e.raw_os_error().unwrap_or(EIO),
        };
        Self::new(e.to_string(), code)
    }
}

// ============================================================================
// Status
// ============================================================================

/// Terminal verdict of a successful audit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    Compliant,
    NonCompliant,
}

impl Status {
    pub fn is_compliant(self) -> bool {
        self == Status::Compliant
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Compliant => "Compliant",
            Status::NonCompliant => "NonCompliant",
        }
    }

    /// Status of a negated check
    pub fn invert(self) -> Self {
        match self {
            Status::Compliant => Status::NonCompliant,
            Status::NonCompliant => Status::Compliant,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
