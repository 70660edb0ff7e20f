use super::flags::{parse_flags, parse_mode};
use super::{MountOperation, PlanContext, ResolvedOperation, Scope};
use crate::error::SandboxError;
use crate::policy::MountPoint;

/// Resolve `entries` into mount operations, keeping document order.
///
/// Flags and `dest-mode` are checked before any path is resolved so a bad
/// token is reported even when a template would also fail.
pub fn plan(
    ctx: &PlanContext<'_>,
    scope: Scope,
    entries: &[MountPoint],
) -> Result<Vec<ResolvedOperation>, SandboxError> {
    entries
        .iter()
        .map(|entry| {
            let label = entry.to_string();
            let flags = parse_flags(&entry.flags, &label)?;
            let mode = entry
                .dest_mode
                .as_deref()
                .map(|spec| parse_mode(spec, &label))
                .transpose()?;
            Ok(ResolvedOperation::Mount(MountOperation {
                scope,
                source: ctx.source_path(&entry.source)?,
                target: ctx.destination_path(&entry.target)?,
                flags,
                mode,
            }))
        })
        .collect()
}
