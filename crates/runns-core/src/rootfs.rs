//! Rootfs construction inside the container's mount namespace.
//!
//! Runs in the child after namespace entry, in a fixed order: propagation
//! of `/` is cut first so nothing leaks back to the host, the rootfs is
//! turned into a mount point (a `pivot_root` precondition), the configured
//! mounts are applied in spec order, and the root switch happens last.
//! On error the child exits and the kernel tears the namespace down,
//! mounts included; there is no partial-mount cleanup here.

use std::fs::{self, File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use nix::mount::{mount, umount2, MntFlags, MsFlags};
use nix::unistd::{chdir, chroot, fchdir, pivot_root};
use runns_common::error::{Result, RunnsError};
use runns_common::paths::{clean_path, follow_symlink_in_scope};

use crate::config::{Config, Mount};
use crate::mountinfo;
use crate::options::EXT_TMPCOPYUP;

/// Builds the container filesystem and switches the process root into it.
///
/// # Errors
///
/// Any failing syscall or scope violation aborts the build; the caller is
/// expected to exit and let the namespace unwind the partial state.
pub fn prepare_rootfs(config: &Config) -> Result<()> {
    tracing::debug!(rootfs = %config.rootfs.display(), "preparing rootfs");
    prepare_root(config)?;

    for m in &config.mounts {
        tracing::debug!(
            source = %m.source,
            dest = %m.destination.display(),
            device = %m.device,
            "mounting"
        );
        mount_to_rootfs(m, &config.rootfs, config.mount_label.as_deref())?;
    }

    chdir(&config.rootfs).map_err(|e| RunnsError::Sys {
        op: "chdir to rootfs",
        errno: e,
    })?;
    if config.no_pivot_root {
        move_root(&config.rootfs)?;
    } else {
        pivot_to(&config.rootfs)?;
    }
    tracing::debug!("root switch complete");
    Ok(())
}

/// Cuts mount propagation back to the host and makes the rootfs a mount
/// point.
fn prepare_root(config: &Config) -> Result<()> {
    let flags = if config.root_propagation.is_empty() {
        MsFlags::MS_SLAVE | MsFlags::MS_REC
    } else {
        config.root_propagation
    };
    mount(None::<&str>, "/", None::<&str>, flags, None::<&str>)
        .map_err(|e| mount_err("", Path::new("/"), "", e))?;

    make_parent_private(&config.rootfs)?;

    // pivot_root requires the new root to be a mount point.
    mount(
        Some(&config.rootfs),
        &config.rootfs,
        Some("bind"),
        MsFlags::MS_BIND | MsFlags::MS_REC,
        None::<&str>,
    )
    .map_err(|e| mount_err(&config.rootfs.to_string_lossy(), &config.rootfs, "bind", e))?;
    Ok(())
}

/// Remounts the parent mount of `rootfs` private when it is shared.
///
/// pivot_root refuses a shared parent mount, and a shared parent would
/// also propagate the rootfs self-bind back into the host namespace.
fn make_parent_private(rootfs: &Path) -> Result<()> {
    let (parent, optional) = mountinfo::parent_mount(rootfs)?;
    if optional.split(' ').any(|o| o.starts_with("shared:")) {
        mount(
            None::<&str>,
            &parent,
            None::<&str>,
            MsFlags::MS_PRIVATE,
            None::<&str>,
        )
        .map_err(|e| mount_err("", &parent, "", e))?;
    }
    Ok(())
}

/// Applies one configured mount against the rootfs, dispatching on device.
fn mount_to_rootfs(m: &Mount, rootfs: &Path, mount_label: Option<&str>) -> Result<()> {
    let dest = join_rootfs(rootfs, &m.destination);

    match m.device.as_str() {
        // The kernel rejects labelled mounts of these pseudo-filesystems.
        "proc" | "sysfs" => {
            fs::create_dir_all(&dest).map_err(|e| io_err(&dest, e))?;
            mount_propagate(m, rootfs, None)
        }
        "tmpfs" => mount_tmpfs(m, rootfs, mount_label, &dest),
        "bind" => mount_bind(m, rootfs, mount_label),
        _ => {
            // Earlier mounts can plant symlinks under the rootfs, so the
            // destination is re-resolved at mount time, scoped to it.
            let dest = follow_symlink_in_scope(&dest, rootfs)?;
            check_mount_destination(rootfs, &dest)?;
            fs::create_dir_all(&dest).map_err(|e| io_err(&dest, e))?;
            let resolved = Mount {
                destination: dest,
                ..m.clone()
            };
            mount_propagate(&resolved, rootfs, mount_label)
        }
    }
}

fn mount_bind(m: &Mount, rootfs: &Path, mount_label: Option<&str>) -> Result<()> {
    // A bind needs something to bind.
    let stat = fs::metadata(&m.source).map_err(|e| io_err(Path::new(&m.source), e))?;

    let dest = follow_symlink_in_scope(&join_rootfs(rootfs, &m.destination), rootfs)?;
    check_mount_destination(rootfs, &dest)?;
    create_if_not_exists(&dest, stat.is_dir())?;

    let resolved = Mount {
        destination: dest,
        ..m.clone()
    };
    mount_propagate(&resolved, rootfs, mount_label)?;

    // Bind mounts inherit the source's options at creation; a remount is
    // needed to make ro, noexec and friends effective.
    if resolved
        .flags
        .intersects(!(MsFlags::MS_REC | MsFlags::MS_REMOUNT | MsFlags::MS_BIND))
    {
        remount(&resolved, rootfs)?;
    }
    Ok(())
}

fn mount_tmpfs(m: &Mount, rootfs: &Path, mount_label: Option<&str>, dest: &Path) -> Result<()> {
    let prior = match fs::metadata(dest) {
        Ok(meta) => Some(meta),
        Err(_) => {
            fs::create_dir_all(dest).map_err(|e| io_err(dest, e))?;
            None
        }
    };

    if m.extensions & EXT_TMPCOPYUP != 0 {
        let staging = tempfile::Builder::new()
            .prefix("runnstmpdir")
            .tempdir_in("/tmp")
            .map_err(|e| io_err(Path::new("/tmp"), e))?;
        let staged = Mount {
            destination: staging.path().to_path_buf(),
            ..m.clone()
        };
        mount_propagate(&staged, rootfs, mount_label)?;

        if let Err(err) = copy_directory(dest, staging.path()) {
            let _ = umount2(staging.path(), MntFlags::MNT_DETACH);
            return Err(err);
        }
        if let Err(errno) = mount(
            Some(staging.path()),
            dest,
            None::<&str>,
            MsFlags::MS_MOVE,
            None::<&str>,
        ) {
            let _ = umount2(staging.path(), MntFlags::MNT_DETACH);
            return Err(mount_err(&staging.path().to_string_lossy(), dest, "", errno));
        }
    } else {
        mount_propagate(m, rootfs, mount_label)?;
    }

    // A pre-existing destination keeps its mode across the mount.
    if let Some(meta) = prior {
        fs::set_permissions(dest, meta.permissions()).map_err(|e| io_err(dest, e))?;
    }
    Ok(())
}

/// Performs the primary mount followed by one extra mount per propagation
/// flag. The kernel refuses propagation changes combined with the initial
/// mount, so they are separate calls.
fn mount_propagate(m: &Mount, rootfs: &Path, mount_label: Option<&str>) -> Result<()> {
    // A tmpcopyup staging destination lives outside the rootfs on purpose.
    let copy_up = m.device == "tmpfs" && m.extensions & EXT_TMPCOPYUP != 0;
    let dest = if copy_up {
        m.destination.clone()
    } else {
        join_rootfs(rootfs, &m.destination)
    };

    let data = format_mount_label(&m.data, mount_label);
    let mut flags = m.flags;
    // The kernel rejects a read-only /dev at initial mount time.
    if clean_path(&m.destination.to_string_lossy()) == "/dev" {
        flags.remove(MsFlags::MS_RDONLY);
    }

    mount(
        Some(m.source.as_str()),
        &dest,
        Some(m.device.as_str()),
        flags,
        Some(data.as_str()),
    )
    .map_err(|e| mount_err(&m.source, &dest, &m.device, e))?;

    for pflag in &m.propagation {
        mount(None::<&str>, &dest, None::<&str>, *pflag, None::<&str>)
            .map_err(|e| mount_err("", &dest, "", e))?;
    }
    Ok(())
}

fn remount(m: &Mount, rootfs: &Path) -> Result<()> {
    let dest = join_rootfs(rootfs, &m.destination);
    mount(
        Some(m.source.as_str()),
        &dest,
        Some(m.device.as_str()),
        m.flags | MsFlags::MS_REMOUNT,
        None::<&str>,
    )
    .map_err(|e| mount_err(&m.source, &dest, &m.device, e))?;
    Ok(())
}

/// Rejects destinations under `/proc` so a mount cannot mask kernel state,
/// except for pseudo-files commonly emulated by FUSE so `top` and `free`
/// keep working inside the container.
fn check_mount_destination(rootfs: &Path, dest: &Path) -> Result<()> {
    const VALID_DESTINATIONS: &[&str] = &[
        "proc/cpuinfo",
        "proc/diskstats",
        "proc/meminfo",
        "proc/stat",
        "proc/swaps",
        "proc/uptime",
        "proc/net/dev",
    ];
    for valid in VALID_DESTINATIONS {
        if dest == rootfs.join(valid) {
            return Ok(());
        }
    }
    if dest.strip_prefix(rootfs.join("proc")).is_ok() {
        return Err(RunnsError::MountDestination {
            dest: dest.to_path_buf(),
        });
    }
    Ok(())
}

/// Creates `path` as a directory or an empty regular file unless present.
fn create_if_not_exists(path: &Path, is_dir: bool) -> Result<()> {
    match fs::metadata(path) {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            if is_dir {
                return fs::create_dir_all(path).map_err(|e| io_err(path, e));
            }
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
            }
            OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(false)
                .mode(0o755)
                .open(path)
                .map_err(|e| io_err(path, e))?;
            Ok(())
        }
        Err(e) => Err(io_err(path, e)),
    }
}

/// Recursively copies the contents of `src` into `dst`, preserving
/// directory modes and recreating symlinks.
fn copy_directory(src: &Path, dst: &Path) -> Result<()> {
    for entry in fs::read_dir(src).map_err(|e| io_err(src, e))? {
        let entry = entry.map_err(|e| io_err(src, e))?;
        let path = entry.path();
        let target = dst.join(entry.file_name());

        let meta = fs::symlink_metadata(&path).map_err(|e| io_err(&path, e))?;
        let ftype = meta.file_type();
        if ftype.is_dir() {
            fs::create_dir_all(&target).map_err(|e| io_err(&target, e))?;
            fs::set_permissions(&target, meta.permissions()).map_err(|e| io_err(&target, e))?;
            copy_directory(&path, &target)?;
        } else if ftype.is_symlink() {
            let link = fs::read_link(&path).map_err(|e| io_err(&path, e))?;
            std::os::unix::fs::symlink(link, &target).map_err(|e| io_err(&target, e))?;
        } else {
            fs::copy(&path, &target).map_err(|e| io_err(&target, e))?;
        }
    }
    Ok(())
}

/// Swaps the process root onto the rootfs with `pivot_root(".", ".")` and
/// detaches the old root.
fn pivot_to(rootfs: &Path) -> Result<()> {
    // pivot_root(".", ".") stacks the old root on top of the new one,
    // reachable through the current directory until unmounted, so no
    // staging directory is needed inside the rootfs. Both fds are held for
    // the duration; the kernel does not guarantee where /proc/self/cwd
    // points after the pivot.
    let oldroot = open_dir(Path::new("/"))?;
    let newroot = open_dir(rootfs)?;

    fchdir(newroot.as_raw_fd()).map_err(|e| RunnsError::Sys {
        op: "fchdir to new root",
        errno: e,
    })?;
    pivot_root(".", ".").map_err(|e| RunnsError::Sys {
        op: "pivot_root",
        errno: e,
    })?;
    fchdir(oldroot.as_raw_fd()).map_err(|e| RunnsError::Sys {
        op: "fchdir to old root",
        errno: e,
    })?;

    // Keep the coming unmount from propagating back to the host.
    mount(
        None::<&str>,
        ".",
        None::<&str>,
        MsFlags::MS_PRIVATE | MsFlags::MS_REC,
        None::<&str>,
    )
    .map_err(|e| mount_err("", Path::new("."), "", e))?;
    // MNT_DETACH allows unmounting the directory we are standing in.
    umount2(".", MntFlags::MNT_DETACH).map_err(|e| RunnsError::Sys {
        op: "umount old root",
        errno: e,
    })?;

    chdir("/").map_err(|e| RunnsError::Sys {
        op: "chdir to /",
        errno: e,
    })?;
    Ok(())
}

/// Root switch without `pivot_root`: move the rootfs mount over `/` and
/// chroot into it.
fn move_root(rootfs: &Path) -> Result<()> {
    mount(
        Some(rootfs),
        "/",
        None::<&str>,
        MsFlags::MS_MOVE,
        None::<&str>,
    )
    .map_err(|e| mount_err(&rootfs.to_string_lossy(), Path::new("/"), "", e))?;
    chroot(".").map_err(|e| RunnsError::Sys {
        op: "chroot",
        errno: e,
    })?;
    chdir("/").map_err(|e| RunnsError::Sys {
        op: "chdir to /",
        errno: e,
    })?;
    Ok(())
}

fn open_dir(path: &Path) -> Result<File> {
    OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_DIRECTORY)
        .open(path)
        .map_err(|e| io_err(path, e))
}

/// Prefixes `dest` with the rootfs unless it already is.
fn join_rootfs(rootfs: &Path, dest: &Path) -> PathBuf {
    if dest.starts_with(rootfs) {
        return dest.to_path_buf();
    }
    rootfs.join(dest.strip_prefix("/").unwrap_or(dest))
}

/// Appends an SELinux-style context option to filesystem data.
fn format_mount_label(data: &str, label: Option<&str>) -> String {
    match label {
        None | Some("") => data.to_string(),
        Some(label) if data.is_empty() => format!("context=\"{label}\""),
        Some(label) => format!("{data},context=\"{label}\""),
    }
}

fn io_err(path: &Path, source: std::io::Error) -> RunnsError {
    RunnsError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn mount_err(source: &str, dest: &Path, device: &str, errno: nix::Error) -> RunnsError {
    RunnsError::Mount {
        source_path: source.into(),
        dest: dest.to_path_buf(),
        device: device.into(),
        errno,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_rootfs_prefixes_absolute_destinations() {
        let rootfs = Path::new("/srv/box");
        assert_eq!(
            join_rootfs(rootfs, Path::new("/data")),
            PathBuf::from("/srv/box/data")
        );
    }

    #[test]
    fn join_rootfs_leaves_prefixed_destinations_alone() {
        let rootfs = Path::new("/srv/box");
        assert_eq!(
            join_rootfs(rootfs, Path::new("/srv/box/data")),
            PathBuf::from("/srv/box/data")
        );
    }

    #[test]
    fn destination_check_rejects_proc_itself() {
        let rootfs = Path::new("/srv/box");
        let err = check_mount_destination(rootfs, &rootfs.join("proc")).unwrap_err();
        assert!(matches!(err, RunnsError::MountDestination { .. }));
    }

    #[test]
    fn destination_check_rejects_non_whitelisted_descendants() {
        let rootfs = Path::new("/srv/box");
        for dest in ["proc/self", "proc/sys/kernel", "proc/net"] {
            assert!(
                check_mount_destination(rootfs, &rootfs.join(dest)).is_err(),
                "{dest} should be rejected"
            );
        }
    }

    #[test]
    fn destination_check_accepts_whitelisted_pseudo_files() {
        let rootfs = Path::new("/srv/box");
        for dest in [
            "proc/cpuinfo",
            "proc/diskstats",
            "proc/meminfo",
            "proc/stat",
            "proc/swaps",
            "proc/uptime",
            "proc/net/dev",
        ] {
            assert!(
                check_mount_destination(rootfs, &rootfs.join(dest)).is_ok(),
                "{dest} should be accepted"
            );
        }
    }

    #[test]
    fn destination_check_accepts_paths_outside_proc() {
        let rootfs = Path::new("/srv/box");
        for dest in ["data", "etc/hosts", "procfiles", "sys"] {
            assert!(
                check_mount_destination(rootfs, &rootfs.join(dest)).is_ok(),
                "{dest} should be accepted"
            );
        }
    }

    #[test]
    fn format_mount_label_appends_context() {
        assert_eq!(format_mount_label("", None), "");
        assert_eq!(format_mount_label("size=64m", None), "size=64m");
        assert_eq!(
            format_mount_label("", Some("system_u:object_r:container_file_t:s0")),
            "context=\"system_u:object_r:container_file_t:s0\""
        );
        assert_eq!(
            format_mount_label("size=64m", Some("label")),
            "size=64m,context=\"label\""
        );
    }

    #[test]
    fn create_if_not_exists_makes_directories() {
        let dir = tempfile::tempdir().expect("tempdir");
        let target = dir.path().join("a/b/c");
        create_if_not_exists(&target, true).expect("create");
        assert!(target.is_dir());
        // Idempotent on a second call.
        create_if_not_exists(&target, true).expect("recreate");
    }

    #[test]
    fn create_if_not_exists_makes_files_with_parents() {
        let dir = tempfile::tempdir().expect("tempdir");
        let target = dir.path().join("sub/file");
        create_if_not_exists(&target, false).expect("create");
        assert!(target.is_file());
    }

    #[test]
    fn create_if_not_exists_keeps_existing_content() {
        let dir = tempfile::tempdir().expect("tempdir");
        let target = dir.path().join("file");
        fs::write(&target, b"keep").expect("write");
        create_if_not_exists(&target, false).expect("noop");
        assert_eq!(fs::read(&target).expect("read"), b"keep");
    }

    #[test]
    fn copy_directory_preserves_structure_and_symlinks() {
        let src = tempfile::tempdir().expect("tempdir");
        let dst = tempfile::tempdir().expect("tempdir");
        fs::create_dir(src.path().join("sub")).expect("mkdir");
        fs::write(src.path().join("sub/file"), b"data").expect("write");
        std::os::unix::fs::symlink("sub/file", src.path().join("link")).expect("symlink");

        copy_directory(src.path(), dst.path()).expect("copy");

        assert_eq!(fs::read(dst.path().join("sub/file")).expect("read"), b"data");
        let link = fs::read_link(dst.path().join("link")).expect("readlink");
        assert_eq!(link, PathBuf::from("sub/file"));
    }
}
