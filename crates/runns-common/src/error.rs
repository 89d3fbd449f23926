//! Unified error types for the runns workspace.
//!
//! Every crate returns this enum; errors are not recovered internally and
//! surface at the CLI boundary as a single line and a nonzero exit.

use std::ffi::NulError;
use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum RunnsError {
    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The runtime spec is missing, malformed, or fails validation.
    #[error("invalid spec: {message}")]
    Spec {
        /// Description of the invalid spec.
        message: String,
    },

    /// A `run` was asked to reuse a name that is already registered.
    #[error("container {name} exist")]
    ContainerExists {
        /// The colliding container name.
        name: String,
    },

    /// A registry operation referenced an unknown container.
    #[error("container {name} not exist")]
    ContainerNotFound {
        /// The missing container name.
        name: String,
    },

    /// A registry entry is unreadable or malformed.
    #[error("registry entry for {name}: {message}")]
    Registry {
        /// Container name of the offending entry.
        name: String,
        /// Description of the problem.
        message: String,
    },

    /// A mount(2)-family syscall failed.
    #[error("mounting {source_path} to {dest} as {device}: {errno}")]
    Mount {
        /// Mount source path or pseudo-source.
        source_path: String,
        /// Effective mount destination.
        dest: PathBuf,
        /// Filesystem type keyword.
        device: String,
        /// Errno returned by the kernel.
        errno: nix::Error,
    },

    /// A non-mount syscall failed.
    #[error("{op}: {errno}")]
    Sys {
        /// The operation that failed.
        op: &'static str,
        /// Errno returned by the kernel.
        errno: nix::Error,
    },

    /// A path left the scope it must stay inside.
    #[error("{path} is not within {root}")]
    OutOfScope {
        /// The offending path.
        path: PathBuf,
        /// The scope root it escaped.
        root: PathBuf,
    },

    /// Symlink resolution exceeded the hop limit.
    #[error("too many links resolving {path}")]
    TooManyLinks {
        /// The path whose resolution looped.
        path: PathBuf,
    },

    /// A mount destination resolved under a protected path.
    #[error("{dest} cannot be mounted because it is inside /proc")]
    MountDestination {
        /// The rejected destination.
        dest: PathBuf,
    },

    /// No mount table entry covers the given path.
    #[error("could not find parent mount of {path}")]
    ParentMountNotFound {
        /// The path with no covering mount.
        path: PathBuf,
    },

    /// A string crossing the exec boundary contained an interior NUL byte.
    #[error("interior NUL byte in exec argument")]
    Nul(#[from] NulError),

    /// Spec (de)serialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, RunnsError>;
