//! Two-stage container launch.
//!
//! Namespace membership is fixed at process creation, so the parent cannot
//! simply unshare and keep going: it clones itself into new mount and PID
//! namespaces and re-executes `/proc/self/exe child <name>`, handing the
//! spec over in the environment. The child builds the rootfs and replaces
//! itself with the user program.

use std::env;
use std::ffi::CString;
use std::os::unix::ffi::OsStringExt;
use std::path::Path;

use nix::sched::{clone, CloneFlags};
use nix::sys::signal::Signal;
use nix::unistd::{execve, execvp, setsid, Pid};
use runns_common::constants::{REGISTRY_DIR, SPEC_ENV};
use runns_common::error::{Result, RunnsError};
use runns_core::config::resolve_config;
use runns_core::rootfs::prepare_rootfs;
use runns_core::spec::{validate_process, Spec};

use crate::registry;

/// Stack handed to `clone(2)`; the child only execs, so small is plenty.
const CHILD_STACK_SIZE: usize = 64 * 1024;

/// Exit status reported when the re-exec itself fails.
const EXEC_FAILED: isize = 127;

/// Ensures the registry directory exists and that `name` is free.
///
/// Callers launching a container run this before loading the spec, so a
/// name collision is reported ahead of any spec problem.
///
/// # Errors
///
/// Fails on registry I/O and when `name` already has an entry.
pub fn validate_name(name: &str) -> Result<()> {
    let registry_dir = Path::new(REGISTRY_DIR);
    registry::ensure(registry_dir)?;
    if registry::exists(registry_dir, name)? {
        return Err(RunnsError::ContainerExists { name: name.into() });
    }
    Ok(())
}

/// Launches container `name` from `spec` inside fresh mount and PID
/// namespaces and records the child PID in the registry.
///
/// The parent does not wait: the container runs detached and is reparented
/// to init once this process exits. The registry entry is written as soon
/// as the clone succeeds, before the child has proven it can set up its
/// rootfs, so entries may reference an already-dead PID.
///
/// # Errors
///
/// Fails on a name collision, on registry I/O, and when `clone(2)` is
/// refused.
pub fn start(name: &str, spec: &Spec) -> Result<Pid> {
    validate_name(name)?;

    let payload = serde_json::to_string(spec)?;
    let argv = [
        CString::new("/proc/self/exe")?,
        CString::new("child")?,
        CString::new(name)?,
    ];
    let mut envp = Vec::new();
    for (key, value) in env::vars_os() {
        if key == SPEC_ENV {
            continue;
        }
        let mut kv = key.into_vec();
        kv.push(b'=');
        kv.extend(value.into_vec());
        envp.push(CString::new(kv)?);
    }
    envp.push(CString::new(format!("{SPEC_ENV}={payload}"))?);

    let mut stack = vec![0u8; CHILD_STACK_SIZE];
    // SAFETY: the callback only execs; it allocates nothing and touches no
    // state shared with the parent.
    let pid = unsafe {
        clone(
            Box::new(|| {
                let _ = execve(&argv[0], &argv, &envp);
                EXEC_FAILED
            }),
            &mut stack,
            CloneFlags::CLONE_NEWNS | CloneFlags::CLONE_NEWPID,
            Some(Signal::SIGCHLD as libc::c_int),
        )
    }
    .map_err(|e| RunnsError::Sys {
        op: "clone",
        errno: e,
    })?;

    registry::record(Path::new(REGISTRY_DIR), name, pid.as_raw())?;
    tracing::info!(name, pid = pid.as_raw(), "container started");
    Ok(pid)
}

/// Child-side entry: runs inside the fresh namespaces, builds the rootfs,
/// and replaces this process with the user program. Does not return on
/// success.
///
/// # Errors
///
/// Fails when the spec is missing from the environment or invalid, when
/// rootfs construction fails, or when the final exec is refused.
pub fn init_container() -> Result<()> {
    setsid().map_err(|e| RunnsError::Sys {
        op: "setsid",
        errno: e,
    })?;
    registry::ensure(Path::new(REGISTRY_DIR))?;

    let payload = env::var(SPEC_ENV).map_err(|_| RunnsError::Spec {
        message: format!("{SPEC_ENV} not set in child environment"),
    })?;
    let spec: Spec = serde_json::from_str(&payload)?;
    validate_process(&spec)?;
    let config = resolve_config(&spec)?;
    prepare_rootfs(&config)?;

    let process = spec.process.as_ref().ok_or_else(|| RunnsError::Spec {
        message: "process must be specified".into(),
    })?;
    let args = process
        .args
        .iter()
        .map(|a| CString::new(a.as_str()))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    tracing::debug!(program = %process.args[0], "executing user process");
    // execvp resolves args[0] against PATH inside the new root and only
    // returns on failure.
    execvp(&args[0], &args).map_err(|e| RunnsError::Sys {
        op: "exec user process",
        errno: e,
    })?;
    Ok(())
}
