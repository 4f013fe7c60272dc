//! Command execution configuration
//!
//! Provides the whitelisted command executor the procedures run through.

pub mod linux;

pub use linux::create_linux_command_executor;
