//! Symlink-scoped path evaluation and lexical path cleaning.
//!
//! [`follow_symlink_in_scope`] is the sole defense against a mount
//! destination escaping the container through a symlink planted inside the
//! rootfs by an earlier mount: link targets are reinterpreted relative to
//! the scope root instead of being followed onto the host filesystem.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{Result, RunnsError};

/// Upper bound on resolution steps before the walk is declared a loop.
const MAX_SYMLINK_HOPS: usize = 255;

/// Lexically cleans `path` so that prepending it to another path can never
/// resolve upward out of that path. Relative inputs are cleaned as if
/// rooted at `/` and made relative again, turning `../../x` into `x`.
/// Empty input stays empty. Purely lexical; symlinks are not considered.
pub fn clean_path(path: &str) -> String {
    if path.is_empty() {
        return String::new();
    }
    let cleaned = lexical_clean(path);
    if !cleaned.starts_with('/') {
        let rooted = lexical_clean(&format!("/{cleaned}"));
        return lexical_clean(rooted.strip_prefix('/').unwrap_or("."));
    }
    cleaned
}

/// Normalizes a path the way `path_resolution(7)` would read it: duplicate
/// separators and `.` components dropped, `..` collapsed against prior
/// components, leading `..` preserved for relative paths and dropped for
/// absolute ones. Returns `.` for an empty result.
fn lexical_clean(path: &str) -> String {
    if path.is_empty() {
        return ".".to_string();
    }
    let rooted = path.starts_with('/');
    let mut out: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                if out.last().is_some_and(|p| *p != "..") {
                    out.pop();
                } else if !rooted {
                    out.push("..");
                }
            }
            _ => out.push(part),
        }
    }
    let joined = out.join("/");
    match (rooted, joined.is_empty()) {
        (true, true) => "/".to_string(),
        (true, false) => format!("/{joined}"),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    }
}

/// Makes `path` absolute against the current working directory and cleans
/// it lexically.
fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(PathBuf::from(lexical_clean(&path.to_string_lossy())));
    }
    let cwd = std::env::current_dir().map_err(|e| RunnsError::Io {
        path: PathBuf::from("."),
        source: e,
    })?;
    Ok(PathBuf::from(lexical_clean(
        &cwd.join(path).to_string_lossy(),
    )))
}

/// Returns the on-disk real path of `path` with all symlinks chased, under
/// the constraint that the result stays lexically within `root`: absolute
/// link targets are re-rooted at `root`, relative ones are replayed against
/// the remainder. Both arguments are made absolute first; symlinks in
/// `root` itself are not traversed. Non-existing trailing components are
/// accepted verbatim.
///
/// The caller must re-resolve after any operation that can plant new links
/// under `root`; a previously safe answer does not survive later mounts.
///
/// # Errors
///
/// Fails when `path` does not have `root` as a prefix (*out-of-scope*),
/// when more than 255 resolution steps are needed (*too-many-links*), or
/// when reading a link from disk fails.
pub fn follow_symlink_in_scope(path: &Path, root: &Path) -> Result<PathBuf> {
    let path = absolute(path)?;
    let root = absolute(root)?;
    eval_symlinks_in_scope(&path, &root)
}

fn eval_symlinks_in_scope(path: &Path, root: &Path) -> Result<PathBuf> {
    let root_s = lexical_clean(&root.to_string_lossy());
    let path_s = path.to_string_lossy().into_owned();
    if path_s == root_s {
        return Ok(PathBuf::from(path_s));
    }

    let out_of_scope = || RunnsError::OutOfScope {
        path: PathBuf::from(&path_s),
        root: PathBuf::from(&root_s),
    };
    if !path_s.starts_with(&root_s) {
        return Err(out_of_scope());
    }
    let mut rest = path_s[root_s.len()..].to_string();
    if root_s == "/" {
        rest = format!("/{rest}");
    }
    if !rest.starts_with('/') {
        return Err(out_of_scope());
    }
    let mut rest = lexical_clean(&rest);

    // Consume `rest` one component at a time, expanding symlinks back onto
    // the front of it; `acc` is the resolved path inside root, each element
    // followed by a separator.
    let mut acc = String::new();
    let mut hops = 0usize;
    while !rest.is_empty() {
        if hops > MAX_SYMLINK_HOPS {
            return Err(RunnsError::TooManyLinks {
                path: PathBuf::from(&path_s),
            });
        }
        hops += 1;

        let (p, remainder) = match rest.find('/') {
            Some(i) => (rest[..i].to_string(), rest[i + 1..].to_string()),
            None => (rest.clone(), String::new()),
        };
        rest = remainder;
        if p.is_empty() {
            continue;
        }

        // `..` in acc can cancel out; never lstat the root itself.
        let clean_p = lexical_clean(&format!("/{acc}{p}"));
        if clean_p == "/" {
            acc.clear();
            continue;
        }
        let full_p = lexical_clean(&format!("{root_s}{clean_p}"));

        let meta = match fs::symlink_metadata(&full_p) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                acc.push_str(&p);
                acc.push('/');
                continue;
            }
            Err(e) => {
                return Err(RunnsError::Io {
                    path: PathBuf::from(full_p),
                    source: e,
                })
            }
        };
        if !meta.file_type().is_symlink() {
            acc.push_str(&p);
            acc.push('/');
            continue;
        }

        let dest = fs::read_link(&full_p).map_err(|e| RunnsError::Io {
            path: PathBuf::from(&full_p),
            source: e,
        })?;
        if dest.is_absolute() {
            acc.clear();
        }
        rest = format!("{}/{rest}", dest.to_string_lossy());
    }

    Ok(PathBuf::from(lexical_clean(&format!(
        "{root_s}{}",
        lexical_clean(&format!("/{acc}"))
    ))))
}

#[cfg(test)]
mod tests {
    use std::os::unix::fs::symlink;

    use super::*;

    #[test]
    fn clean_path_collapses_dots_and_separators() {
        assert_eq!(clean_path("/a/b/../c"), "/a/c");
        assert_eq!(clean_path("/a//b/./c/"), "/a/b/c");
        assert_eq!(clean_path("/../../a"), "/a");
        assert_eq!(clean_path("a/b/../c"), "a/c");
    }

    #[test]
    fn clean_path_cannot_escape_upward() {
        assert_eq!(clean_path("../../x"), "x");
        assert_eq!(clean_path(".."), ".");
        assert_eq!(clean_path("../.."), ".");
    }

    #[test]
    fn clean_path_empty_stays_empty() {
        assert_eq!(clean_path(""), "");
    }

    #[test]
    fn clean_path_is_idempotent() {
        let inputs = [
            "", ".", "..", "/", "//", "/..", "a", "/a/b/../c", "../../x",
            "a//b///c/./..", "/a/./b", "./a", "a/..", "/a/../..",
        ];
        for input in inputs {
            let once = clean_path(input);
            assert_eq!(clean_path(&once), once, "not idempotent for {input:?}");
        }
    }

    #[test]
    fn scope_resolves_nonexistent_components_verbatim() {
        let root = tempfile::tempdir().expect("tempdir");
        let target = root.path().join("no/such/dir");
        let resolved = follow_symlink_in_scope(&target, root.path()).expect("resolve");
        assert_eq!(resolved, target);
    }

    #[test]
    fn scope_clamps_absolute_symlink_targets() {
        let root = tempfile::tempdir().expect("tempdir");
        symlink("/etc", root.path().join("evil")).expect("symlink");

        let resolved =
            follow_symlink_in_scope(&root.path().join("evil/passwd"), root.path()).expect("resolve");
        assert_eq!(resolved, root.path().join("etc/passwd"));
    }

    #[test]
    fn scope_follows_relative_symlink_targets() {
        let root = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir(root.path().join("real")).expect("mkdir");
        symlink("real", root.path().join("alias")).expect("symlink");

        let resolved =
            follow_symlink_in_scope(&root.path().join("alias/file"), root.path()).expect("resolve");
        assert_eq!(resolved, root.path().join("real/file"));
    }

    #[test]
    fn scope_clamps_parent_escapes_in_link_target() {
        let root = tempfile::tempdir().expect("tempdir");
        symlink("../../../outside", root.path().join("up")).expect("symlink");

        let resolved = follow_symlink_in_scope(&root.path().join("up"), root.path()).expect("resolve");
        assert_eq!(resolved, root.path().join("outside"));
    }

    #[test]
    fn scope_rejects_paths_outside_root() {
        let root = tempfile::tempdir().expect("tempdir");
        let err = follow_symlink_in_scope(Path::new("/etc/passwd"), root.path()).unwrap_err();
        assert!(matches!(err, RunnsError::OutOfScope { .. }));
    }

    #[test]
    fn scope_fails_on_symlink_loop() {
        let root = tempfile::tempdir().expect("tempdir");
        symlink("b", root.path().join("a")).expect("symlink");
        symlink("a", root.path().join("b")).expect("symlink");

        let err = follow_symlink_in_scope(&root.path().join("a"), root.path()).unwrap_err();
        assert!(matches!(err, RunnsError::TooManyLinks { .. }));
    }

    #[test]
    fn scope_result_always_stays_under_root() {
        let root = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir(root.path().join("dir")).expect("mkdir");
        symlink("/", root.path().join("slash")).expect("symlink");
        symlink("../..", root.path().join("dotdot")).expect("symlink");

        let candidates = [
            "dir/a/b",
            "slash/etc",
            "dotdot/secret",
            "dir/../dir/./x",
            "missing/..../x",
        ];
        for candidate in candidates {
            let resolved =
                follow_symlink_in_scope(&root.path().join(candidate), root.path()).expect(candidate);
            assert!(
                resolved.starts_with(root.path()),
                "{candidate:?} resolved to {resolved:?} outside {:?}",
                root.path()
            );
        }
    }

    #[test]
    fn scope_of_root_itself_is_identity() {
        let root = tempfile::tempdir().expect("tempdir");
        let resolved = follow_symlink_in_scope(root.path(), root.path()).expect("resolve");
        assert_eq!(resolved, root.path());
    }
}
