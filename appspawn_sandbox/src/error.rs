use appspawn_common::{ConstructionState, InvalidTransition};
use std::path::PathBuf;

/// Errors raised while loading policy, planning or building an app sandbox.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("Sandbox policy not loaded - call PolicyStore::store before constructing sandboxes")]
    NotLoaded,

    #[error("Failed to read sandbox policy '{path:?}': {source}")]
    PolicyRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid sandbox policy: {reason}")]
    PolicyParse { reason: String },

    #[error("Unknown mount flag '{token}' in mount entry '{entry}'")]
    UnknownMountFlag { token: String, entry: String },

    #[error("Mount entry '{entry}' requests more than one propagation type: {tokens:?}")]
    ConflictingMountFlags { tokens: Vec<String>, entry: String },

    #[error("Unknown mode token '{token}' in dest-mode of mount entry '{entry}'")]
    UnknownModeBit { token: String, entry: String },

    #[error("Malformed path template '{template}': {reason}")]
    InvalidTemplate { template: String, reason: String },

    #[error("Variable <{name}> has no value for package '{package}'")]
    UnresolvedVariable { name: String, package: String },

    #[error("Invalid app property {field}: {reason}")]
    InvalidAppProperty { field: &'static str, reason: String },

    #[error("Resolved path '{path:?}' escapes the sandbox root '{root:?}'")]
    PathEscapesRoot { path: PathBuf, root: PathBuf },

    #[error("Failed to create sandbox root '{path:?}': {source}")]
    RootCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to bind mount '{source_path:?}' onto '{target:?}' (flags {flags:#x}): {reason}")]
    Mount {
        source_path: PathBuf,
        target: PathBuf,
        flags: u64,
        reason: String,
    },

    #[error("Failed to create symlink '{link:?}' -> '{source_path:?}': {reason}")]
    Symlink {
        source_path: PathBuf,
        link: PathBuf,
        reason: String,
    },

    #[error(
        "Sandbox construction for '{package}' aborted after reaching {state} ({applied} operations applied); root '{root:?}' must be discarded: {cause}"
    )]
    Aborted {
        package: String,
        root: PathBuf,
        state: ConstructionState,
        applied: usize,
        #[source]
        cause: Box<SandboxError>,
    },

    #[error("Refusing to discard '{path:?}': {reason}")]
    Cleanup { path: PathBuf, reason: String },

    #[error(transparent)]
    State(#[from] InvalidTransition),
}

impl SandboxError {
    /// The error that actually stopped construction, looking through `Aborted`.
    pub fn root_cause(&self) -> &SandboxError {
        match self {
            SandboxError::Aborted { cause, .. } => cause.root_cause(),
            other => other,
        }
    }

    /// Whether the filesystem may hold a partially built sandbox after this error.
    pub fn left_partial_root(&self) -> bool {
        matches!(
            self,
            SandboxError::Aborted { .. } | SandboxError::RootCreate { .. }
        )
    }
}
