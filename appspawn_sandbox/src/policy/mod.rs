//! Sandbox policy: the typed document model and the process-wide store.

pub mod model;
pub mod store;

pub use model::{
    InstallPoint, MountPoint, PackageSection, PolicySection, SandboxPolicy, SectionEntries,
    SymlinkPoint,
};
pub use store::PolicyStore;
