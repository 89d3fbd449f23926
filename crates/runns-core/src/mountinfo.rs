//! `/proc/self/mountinfo` parsing.
//!
//! The rootfs builder only needs mount points and their optional fields
//! (peer-group tags such as `shared:N`), so that is all this keeps.

use std::fs;
use std::path::{Path, PathBuf};

use runns_common::error::{Result, RunnsError};

/// One mount table entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountInfo {
    /// Filesystem mount point.
    pub mount_point: PathBuf,
    /// Space-joined optional fields; empty when there are none.
    pub optional: String,
}

/// Reads the calling process's mount table.
///
/// # Errors
///
/// Returns an I/O error when `/proc` is not available.
pub fn mounts() -> Result<Vec<MountInfo>> {
    let path = Path::new("/proc/self/mountinfo");
    let content = fs::read_to_string(path).map_err(|e| RunnsError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(parse(&content))
}

fn parse(content: &str) -> Vec<MountInfo> {
    content.lines().filter_map(parse_line).collect()
}

/// Parses one mountinfo line:
/// `id parent major:minor root mount-point options [optional...] - fstype source super-options`.
fn parse_line(line: &str) -> Option<MountInfo> {
    let (before, _after) = line.split_once(" - ")?;
    let fields: Vec<&str> = before.split_whitespace().collect();
    if fields.len() < 6 {
        return None;
    }
    Some(MountInfo {
        mount_point: PathBuf::from(fields[4]),
        optional: fields[6..].join(" "),
    })
}

/// Finds the mount covering `dir` by walking parent directories until a
/// mount point matches, and returns it with its optional fields. `/` is
/// always mounted, so the walk terminates.
///
/// # Errors
///
/// Returns an error when no entry matches even `/` (a malformed table).
pub fn parent_mount(dir: &Path) -> Result<(PathBuf, String)> {
    let table = mounts()?;
    let mut path = dir.to_path_buf();
    loop {
        if let Some(info) = table.iter().find(|m| m.mount_point == path) {
            return Ok((path, info.optional.clone()));
        }
        if !path.pop() {
            return Err(RunnsError::ParentMountNotFound {
                path: dir.to_path_buf(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = "\
22 27 0:21 / /proc rw,nosuid,nodev,noexec,relatime shared:12 - proc proc rw
27 0 253:0 / / rw,relatime shared:1 - ext4 /dev/mapper/root rw
29 27 0:24 / /tmp rw,nosuid,nodev - tmpfs tmpfs rw,size=4096k
31 27 0:26 / /mnt/data rw,relatime shared:5 master:2 - ext4 /dev/sdb1 rw
garbage line without separator
";

    #[test]
    fn parses_mount_points_and_optional_fields() {
        let entries = parse(TABLE);
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[0].mount_point, PathBuf::from("/proc"));
        assert_eq!(entries[0].optional, "shared:12");
        assert_eq!(entries[1].mount_point, PathBuf::from("/"));
        assert_eq!(entries[1].optional, "shared:1");
    }

    #[test]
    fn optional_fields_may_be_absent() {
        let entries = parse(TABLE);
        assert_eq!(entries[2].mount_point, PathBuf::from("/tmp"));
        assert_eq!(entries[2].optional, "");
    }

    #[test]
    fn multiple_optional_fields_are_joined() {
        let entries = parse(TABLE);
        assert_eq!(entries[3].optional, "shared:5 master:2");
    }

    #[test]
    fn malformed_lines_are_skipped() {
        assert!(parse("nonsense\n1 2 3\n").is_empty());
    }
}
