//! Mount option parsing.
//!
//! Translates the textual option vocabulary into kernel mount flags,
//! propagation flags, filesystem-specific data, and extension bits. The
//! parser is a table-driven fold and never fails: anything it does not
//! recognize is filesystem-specific data.

use nix::mount::MsFlags;

/// Non-kernel extension bit: copy the destination's existing contents up
/// into the freshly mounted tmpfs.
pub const EXT_TMPCOPYUP: u32 = 1;

/// Parsed form of a mount's option list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountOptions {
    /// Kernel mount flag bitmask.
    pub flags: MsFlags,
    /// Propagation flags, applied as separate mounts in input order.
    pub propagation: Vec<MsFlags>,
    /// Comma-joined filesystem-specific data.
    pub data: String,
    /// Non-kernel extension bits.
    pub extensions: u32,
}

/// One mount-flag table entry; `clear` removes the bit instead of adding it.
struct FlagEntry {
    name: &'static str,
    clear: bool,
    flag: MsFlags,
}

const MOUNT_FLAGS: &[FlagEntry] = &[
    FlagEntry { name: "acl", clear: false, flag: MsFlags::MS_POSIXACL },
    FlagEntry { name: "async", clear: true, flag: MsFlags::MS_SYNCHRONOUS },
    FlagEntry { name: "atime", clear: true, flag: MsFlags::MS_NOATIME },
    FlagEntry { name: "bind", clear: false, flag: MsFlags::MS_BIND },
    FlagEntry { name: "defaults", clear: false, flag: MsFlags::empty() },
    FlagEntry { name: "dev", clear: true, flag: MsFlags::MS_NODEV },
    FlagEntry { name: "diratime", clear: true, flag: MsFlags::MS_NODIRATIME },
    FlagEntry { name: "dirsync", clear: false, flag: MsFlags::MS_DIRSYNC },
    FlagEntry { name: "exec", clear: true, flag: MsFlags::MS_NOEXEC },
    FlagEntry { name: "iversion", clear: false, flag: MsFlags::MS_I_VERSION },
    FlagEntry { name: "lazytime", clear: false, flag: MsFlags::MS_LAZYTIME },
    FlagEntry { name: "loud", clear: true, flag: MsFlags::MS_SILENT },
    FlagEntry { name: "mand", clear: false, flag: MsFlags::MS_MANDLOCK },
    FlagEntry { name: "noacl", clear: true, flag: MsFlags::MS_POSIXACL },
    FlagEntry { name: "noatime", clear: false, flag: MsFlags::MS_NOATIME },
    FlagEntry { name: "nodev", clear: false, flag: MsFlags::MS_NODEV },
    FlagEntry { name: "nodiratime", clear: false, flag: MsFlags::MS_NODIRATIME },
    FlagEntry { name: "noexec", clear: false, flag: MsFlags::MS_NOEXEC },
    FlagEntry { name: "noiversion", clear: true, flag: MsFlags::MS_I_VERSION },
    FlagEntry { name: "nolazytime", clear: true, flag: MsFlags::MS_LAZYTIME },
    FlagEntry { name: "nomand", clear: true, flag: MsFlags::MS_MANDLOCK },
    FlagEntry { name: "norelatime", clear: true, flag: MsFlags::MS_RELATIME },
    FlagEntry { name: "nostrictatime", clear: true, flag: MsFlags::MS_STRICTATIME },
    FlagEntry { name: "nosuid", clear: false, flag: MsFlags::MS_NOSUID },
    FlagEntry { name: "rbind", clear: false, flag: MsFlags::MS_BIND.union(MsFlags::MS_REC) },
    FlagEntry { name: "relatime", clear: false, flag: MsFlags::MS_RELATIME },
    FlagEntry { name: "remount", clear: false, flag: MsFlags::MS_REMOUNT },
    FlagEntry { name: "ro", clear: false, flag: MsFlags::MS_RDONLY },
    FlagEntry { name: "rw", clear: true, flag: MsFlags::MS_RDONLY },
    FlagEntry { name: "silent", clear: false, flag: MsFlags::MS_SILENT },
    FlagEntry { name: "strictatime", clear: false, flag: MsFlags::MS_STRICTATIME },
    FlagEntry { name: "suid", clear: true, flag: MsFlags::MS_NOSUID },
    FlagEntry { name: "sync", clear: false, flag: MsFlags::MS_SYNCHRONOUS },
];

const PROPAGATION_FLAGS: &[(&str, MsFlags)] = &[
    ("private", MsFlags::MS_PRIVATE),
    ("shared", MsFlags::MS_SHARED),
    ("slave", MsFlags::MS_SLAVE),
    ("unbindable", MsFlags::MS_UNBINDABLE),
    ("rprivate", MsFlags::MS_PRIVATE.union(MsFlags::MS_REC)),
    ("rshared", MsFlags::MS_SHARED.union(MsFlags::MS_REC)),
    ("rslave", MsFlags::MS_SLAVE.union(MsFlags::MS_REC)),
    ("runbindable", MsFlags::MS_UNBINDABLE.union(MsFlags::MS_REC)),
];

const EXTENSION_FLAGS: &[(&str, u32)] = &[("tmpcopyup", EXT_TMPCOPYUP)];

/// Classifies each option token against the mount-flag, propagation, and
/// extension tables, in that order. Mount-flag entries fold with set/clear
/// semantics; entries with a zero bit (`defaults`) are recognized but
/// contribute nothing. Unknown tokens join `data` in input order.
pub fn parse_mount_options(options: &[String]) -> MountOptions {
    let mut flags = MsFlags::empty();
    let mut propagation = Vec::new();
    let mut data: Vec<&str> = Vec::new();
    let mut extensions = 0u32;

    for opt in options {
        let opt = opt.as_str();
        if let Some(entry) = MOUNT_FLAGS.iter().find(|e| e.name == opt) {
            if entry.clear {
                flags.remove(entry.flag);
            } else {
                flags.insert(entry.flag);
            }
        } else if let Some((_, pflag)) = PROPAGATION_FLAGS.iter().find(|(name, _)| *name == opt) {
            propagation.push(*pflag);
        } else if let Some((_, ext)) = EXTENSION_FLAGS.iter().find(|(name, _)| *name == opt) {
            extensions |= ext;
        } else {
            data.push(opt);
        }
    }

    MountOptions {
        flags,
        propagation,
        data: data.join(","),
        extensions,
    }
}
