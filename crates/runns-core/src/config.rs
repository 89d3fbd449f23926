//! Resolved launch configuration.
//!
//! Built once in the parent from the parsed spec, shipped to the child via
//! the environment, and consumed exactly once during rootfs construction.

use std::env;
use std::path::{Path, PathBuf};

use nix::mount::MsFlags;
use runns_common::error::{Result, RunnsError};

use crate::options::parse_mount_options;
use crate::spec::{MountSpec, Spec};

/// A mount operation resolved against the invocation environment.
#[derive(Debug, Clone)]
pub struct Mount {
    /// Filesystem type keyword driving the rootfs dispatch.
    pub device: String,
    /// Source path or pseudo-source (`proc`, `tmpfs`, ...); bind sources
    /// are absolute.
    pub source: String,
    /// Destination path relative to the container root.
    pub destination: PathBuf,
    /// Kernel mount flags.
    pub flags: MsFlags,
    /// Propagation flags applied as secondary mounts, in option order.
    pub propagation: Vec<MsFlags>,
    /// Comma-joined filesystem-specific data.
    pub data: String,
    /// Non-kernel extension bits.
    pub extensions: u32,
}

/// Everything the child needs to build the container.
#[derive(Debug, Clone)]
pub struct Config {
    /// Absolute path of the directory that becomes `/`.
    pub rootfs: PathBuf,
    /// Whether the container root was requested read-only.
    pub readonly_fs: bool,
    /// Container hostname; carried but not applied, there is no UTS
    /// namespace to scope a `sethostname` to.
    pub hostname: String,
    /// `key=value` annotation labels plus a synthetic `bundle=<cwd>`.
    pub labels: Vec<String>,
    /// Switch roots with move-root instead of `pivot_root`.
    pub no_pivot_root: bool,
    /// Propagation applied to `/` before mounting; empty means the
    /// `MS_SLAVE | MS_REC` default.
    pub root_propagation: MsFlags,
    /// Optional SELinux-style context threaded into mount data.
    pub mount_label: Option<String>,
    /// Mounts to execute against the rootfs, in spec order.
    pub mounts: Vec<Mount>,
}

/// Resolves the parsed spec against the caller's working directory.
///
/// # Errors
///
/// Returns a spec error when the `root` section is missing.
pub fn resolve_config(spec: &Spec) -> Result<Config> {
    let cwd = env::current_dir().map_err(|e| RunnsError::Io {
        path: PathBuf::from("."),
        source: e,
    })?;
    resolve_at(&cwd, spec)
}

fn resolve_at(cwd: &Path, spec: &Spec) -> Result<Config> {
    let root = spec.root.as_ref().ok_or_else(|| RunnsError::Spec {
        message: "root must be specified".into(),
    })?;
    let rootfs = if Path::new(&root.path).is_absolute() {
        PathBuf::from(&root.path)
    } else {
        cwd.join(&root.path)
    };

    let mut labels: Vec<String> = spec
        .annotations
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect();
    labels.push(format!("bundle={}", cwd.display()));

    Ok(Config {
        rootfs,
        readonly_fs: root.readonly,
        hostname: spec.hostname.clone(),
        labels,
        no_pivot_root: false,
        root_propagation: MsFlags::empty(),
        mount_label: None,
        mounts: spec.mounts.iter().map(|m| resolve_mount(cwd, m)).collect(),
    })
}

fn resolve_mount(cwd: &Path, m: &MountSpec) -> Mount {
    let parsed = parse_mount_options(&m.options);
    let mut source = m.source.clone();
    // Only bind mounts name a real filesystem path; everything else is a
    // pseudo-source the kernel interprets.
    if m.fstype == "bind" && !Path::new(&source).is_absolute() {
        source = cwd.join(&m.source).to_string_lossy().into_owned();
    }
    Mount {
        device: m.fstype.clone(),
        source,
        destination: PathBuf::from(&m.destination),
        flags: parsed.flags,
        propagation: parsed.propagation,
        data: parsed.data,
        extensions: parsed.extensions,
    }
}
