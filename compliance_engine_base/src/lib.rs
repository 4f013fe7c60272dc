//! # Compliance Engine Base
//!
//! Procedure evaluation framework for auditing and remediating host
//! configuration: typed parameter binding, name-based dispatch, a scoped
//! findings log with report formatters, validated regex patterns, and the
//! I/O context boundary with its package list cache.

pub mod bindings;
pub mod command_executor;
pub mod config;
pub mod context;
pub mod error;
pub mod evaluator;
pub mod formatters;
pub mod indicators;
pub mod package_cache;
pub mod pattern;
pub mod registry;
pub mod report;

// Convenience re-exports
pub use error::{Error, Result, Status};

pub mod prelude {
    pub use crate::bindings::{
        bind, ArgMap, Arguments, Bindings, FileMode, FromArg, MapEnum, Separated,
    };
    pub use crate::command_executor::{CommandError, CommandOutput, SystemCommandExecutor};
    pub use crate::config::EngineConfig;
    pub use crate::context::{Context, DirEntry, EntryKind, FileMetadata, MockContext, SystemContext};
    pub use crate::error::{Error, Result, Status, EEXIST, EINVAL, EIO, ENOENT};
    pub use crate::evaluator::{AuditResult, Evaluator};
    pub use crate::formatters::{
        CompactListFormatter, DebugFormatter, JsonFormatter, LastIncomplianceFormatter,
        NestedListFormatter, PayloadFormatter,
    };
    pub use crate::indicators::{Indicator, IndicatorsTree, ScopeId};
    pub use crate::package_cache::{PackageCache, PackageManager};
    pub use crate::pattern::Pattern;
    pub use crate::registry::{Action, ProcedureFn, ProcedureRegistry, RegistryBuilder};
}
