//! Directory-backed registry of running containers.
//!
//! One regular file per container, named after the container and holding
//! the child PID as decimal ASCII. Access is not locked: a concurrent
//! `run` of the same name can race between the existence check and the
//! write, and the loser overwrites the PID file. `list` and `kill`
//! tolerate stale entries from children that died early.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

use runns_common::error::{Result, RunnsError};

/// Creates the registry directory; idempotent.
///
/// # Errors
///
/// Returns an I/O error when the directory cannot be created.
pub fn ensure(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(|e| RunnsError::Io {
        path: dir.to_path_buf(),
        source: e,
    })
}

/// Whether `name` already has a registry entry.
///
/// # Errors
///
/// Returns an I/O error when the registry directory cannot be read.
pub fn exists(dir: &Path, name: &str) -> Result<bool> {
    for entry in fs::read_dir(dir).map_err(|e| RunnsError::Io {
        path: dir.to_path_buf(),
        source: e,
    })? {
        let entry = entry.map_err(|e| RunnsError::Io {
            path: dir.to_path_buf(),
            source: e,
        })?;
        if entry.file_name().to_string_lossy() == name {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Records the container PID, truncating any previous entry.
///
/// # Errors
///
/// Returns an I/O error when the entry cannot be written.
pub fn record(dir: &Path, name: &str, pid: i32) -> Result<()> {
    let path = dir.join(name);
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o644)
        .open(&path)
        .map_err(|e| RunnsError::Io {
            path: path.clone(),
            source: e,
        })?;
    file.write_all(pid.to_string().as_bytes())
        .map_err(|e| RunnsError::Io { path, source: e })
}

/// Reads the PID recorded for `name`.
///
/// # Errors
///
/// Returns an I/O error when the entry cannot be read and a registry error
/// when its content is not a PID.
pub fn read_pid(dir: &Path, name: &str) -> Result<i32> {
    let path = dir.join(name);
    let content = fs::read_to_string(&path).map_err(|e| RunnsError::Io {
        path: path.clone(),
        source: e,
    })?;
    content.trim().parse().map_err(|_| RunnsError::Registry {
        name: name.into(),
        message: format!("cannot parse {:?} as a pid", content.trim()),
    })
}

/// Removes the entry for `name`.
///
/// # Errors
///
/// Returns an I/O error when the entry cannot be removed.
pub fn remove(dir: &Path, name: &str) -> Result<()> {
    let path = dir.join(name);
    fs::remove_file(&path).map_err(|e| RunnsError::Io { path, source: e })
}

/// Lists `(name, pid)` pairs for every regular file in the registry,
/// sorted by name. Non-regular entries are skipped.
///
/// # Errors
///
/// Returns an I/O error when the directory or an entry cannot be read.
pub fn entries(dir: &Path) -> Result<Vec<(String, String)>> {
    let mut out = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| RunnsError::Io {
        path: dir.to_path_buf(),
        source: e,
    })? {
        let entry = entry.map_err(|e| RunnsError::Io {
            path: dir.to_path_buf(),
            source: e,
        })?;
        let meta = entry.metadata().map_err(|e| RunnsError::Io {
            path: entry.path(),
            source: e,
        })?;
        if !meta.is_file() {
            continue;
        }
        let pid = fs::read_to_string(entry.path()).map_err(|e| RunnsError::Io {
            path: entry.path(),
            source: e,
        })?;
        out.push((
            entry.file_name().to_string_lossy().into_owned(),
            pid.trim_end().to_string(),
        ));
    }
    out.sort();
    Ok(out)
}
