//! Error types for isoenv operations.
//!
//! This module defines [`IsoEnvError`], the primary error type used throughout
//! the crate, and a [`Result`] type alias for convenience.
//!
//! # Error Handling Strategy
//!
//! - Use `IsoEnvError` for domain-specific errors that need distinct handling
//! - Use `anyhow::Error` (via `IsoEnvError::Other`) for unexpected errors
//! - No variant is retried internally; retry policy belongs to the caller

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for isoenv operations.
#[derive(Debug, Error)]
pub enum IsoEnvError {
    /// Requirement text could not be split into name/operator/version.
    #[error("Malformed requirement specifier '{raw}': {message}")]
    MalformedSpecifier { raw: String, message: String },

    /// Version text after the operator does not parse as a semantic version.
    #[error("Malformed version in '{raw}': {message}")]
    MalformedVersion { raw: String, message: String },

    /// Attempted to create an environment that already exists on disk.
    #[error("Environment already provisioned at {path}")]
    EnvironmentExists { path: PathBuf },

    /// Attempted to operate on an environment that does not exist.
    #[error("Environment missing at {path}")]
    EnvironmentMissing { path: PathBuf },

    /// Environment creation command failed.
    #[error("Failed to provision environment at {path}: {message}")]
    ProvisionFailed { path: PathBuf, message: String },

    /// The installer exited with a non-success status.
    #[error("Install failed for '{package}' with exit code {code:?}")]
    InstallFailed { package: String, code: Option<i32> },

    /// The lock primitive itself failed (not mere contention, which blocks).
    #[error("Could not acquire environment lock at {path}: {message}")]
    LockFailed { path: PathBuf, message: String },

    /// Persisted state file exists but does not parse.
    #[error("Failed to parse state at {path}: {message}")]
    StateParseError { path: PathBuf, message: String },

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic wrapped error for anyhow interop.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias for isoenv operations.
pub type Result<T> = std::result::Result<T, IsoEnvError>;
