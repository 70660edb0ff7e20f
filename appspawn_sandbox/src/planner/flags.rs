//! Symbolic mount flag tokens and their `MsFlags` bits, plus the permission
//! tokens of `dest-mode`.

use crate::error::SandboxError;
use nix::mount::MsFlags;

/// Every accepted token. Short names first, kernel constant names second.
const FLAG_TABLE: &[(&str, MsFlags)] = &[
    ("bind", MsFlags::MS_BIND),
    ("rec", MsFlags::MS_REC),
    ("rdonly", MsFlags::MS_RDONLY),
    ("nosuid", MsFlags::MS_NOSUID),
    ("nodev", MsFlags::MS_NODEV),
    ("noexec", MsFlags::MS_NOEXEC),
    ("private", MsFlags::MS_PRIVATE),
    ("slave", MsFlags::MS_SLAVE),
    ("shared", MsFlags::MS_SHARED),
    ("unbindable", MsFlags::MS_UNBINDABLE),
    ("MS_BIND", MsFlags::MS_BIND),
    ("MS_REC", MsFlags::MS_REC),
    ("MS_RDONLY", MsFlags::MS_RDONLY),
    ("MS_NOSUID", MsFlags::MS_NOSUID),
    ("MS_NODEV", MsFlags::MS_NODEV),
    ("MS_NOEXEC", MsFlags::MS_NOEXEC),
    ("MS_PRIVATE", MsFlags::MS_PRIVATE),
    ("MS_SLAVE", MsFlags::MS_SLAVE),
    ("MS_SHARED", MsFlags::MS_SHARED),
    ("MS_UNBINDABLE", MsFlags::MS_UNBINDABLE),
];

/// Permission tokens accepted in `dest-mode`.
const MODE_TABLE: &[(&str, u32)] = &[
    ("S_IRUSR", 0o400),
    ("S_IWUSR", 0o200),
    ("S_IXUSR", 0o100),
    ("S_IRWXU", 0o700),
    ("S_IRGRP", 0o040),
    ("S_IWGRP", 0o020),
    ("S_IXGRP", 0o010),
    ("S_IRWXG", 0o070),
    ("S_IROTH", 0o004),
    ("S_IWOTH", 0o002),
    ("S_IXOTH", 0o001),
    ("S_IRWXO", 0o007),
];

/// Flags that only take effect through a bind remount.
pub const REMOUNT_FLAGS: MsFlags = MsFlags::MS_RDONLY
    .union(MsFlags::MS_NOSUID)
    .union(MsFlags::MS_NODEV)
    .union(MsFlags::MS_NOEXEC);

/// Mount propagation types. At most one may be requested.
pub const PROPAGATION_FLAGS: MsFlags = MsFlags::MS_PRIVATE
    .union(MsFlags::MS_SLAVE)
    .union(MsFlags::MS_SHARED)
    .union(MsFlags::MS_UNBINDABLE);

pub fn lookup(token: &str) -> Option<MsFlags> {
    FLAG_TABLE
        .iter()
        .find(|(name, _)| *name == token)
        .map(|(_, flag)| *flag)
}

/// Translate `tokens` into a mask. `MS_BIND` is always included.
///
/// `entry` names the policy entry in error messages.
pub fn parse_flags<S: AsRef<str>>(tokens: &[S], entry: &str) -> Result<MsFlags, SandboxError> {
    let mut flags = MsFlags::MS_BIND;
    let mut propagation = Vec::new();

    for token in tokens {
        let token = token.as_ref();
        let flag = lookup(token).ok_or_else(|| SandboxError::UnknownMountFlag {
            token: token.to_string(),
            entry: entry.to_string(),
        })?;
        if PROPAGATION_FLAGS.contains(flag) && !flags.contains(flag) {
            propagation.push(token.to_string());
        }
        flags |= flag;
    }

    if propagation.len() > 1 {
        return Err(SandboxError::ConflictingMountFlags {
            tokens: propagation,
            entry: entry.to_string(),
        });
    }
    Ok(flags)
}

/// Translate a `|`-separated `dest-mode` such as `"S_IRWXU | S_IXOTH"` into
/// permission bits.
pub fn parse_mode(spec: &str, entry: &str) -> Result<u32, SandboxError> {
    spec.split('|').map(str::trim).try_fold(0, |mode, token| {
        MODE_TABLE
            .iter()
            .find(|(name, _)| *name == token)
            .map(|(_, bits)| mode | bits)
            .ok_or_else(|| SandboxError::UnknownModeBit {
                token: token.to_string(),
                entry: entry.to_string(),
            })
    })
}

/// Short token names set in `flags`, in table order.
pub fn flag_names(flags: MsFlags) -> Vec<&'static str> {
    FLAG_TABLE
        .iter()
        .filter(|(name, flag)| !name.starts_with("MS_") && flags.contains(*flag))
        .map(|(name, _)| *name)
        .collect()
}
