use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to load config from {path}")]
    ConfigLoad {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config at {path}")]
    ConfigParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    // ── Image references and modes ──
    #[error("invalid image reference {reference:?}: {reason}")]
    InvalidImageRef {
        reference: String,
        reason: &'static str,
    },

    #[error("invalid file mode {mode:?}: {reason}")]
    InvalidMode { mode: String, reason: &'static str },

    // ── Plan validation ──
    #[error(
        "base image '{image}' is not pinned — use an exact version tag (e.g. python:3.7-alpine) or a digest"
    )]
    UnpinnedBaseImage { image: String },

    #[error(
        "packages listed as both runtime and build dependencies: {}; removing the build group would remove them",
        packages.join(", ")
    )]
    OverlappingPackages { packages: Vec<String> },

    #[error("invalid environment variable name {name:?}")]
    InvalidEnvName { name: String },

    #[error("value of {name} contains control characters")]
    InvalidValue { name: String },

    #[error("invalid package name {name:?}")]
    InvalidPackageName { name: String },

    #[error("invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: &'static str },

    #[error("volume mode {mode} is insecure: {reason}")]
    InsecureVolumeMode { mode: String, reason: &'static str },

    #[error("execution user '{name}' is privileged — choose a non-root account name")]
    PrivilegedUser { name: String },

    #[error("invalid user name {name:?}")]
    InvalidUserName { name: String },

    #[error("invalid build group {name:?}")]
    InvalidBuildGroup { name: String },

    #[error("step '{step}' appears after '{previous}'")]
    StepOutOfOrder {
        step: &'static str,
        previous: &'static str,
    },

    #[error("plan does not end by switching to the execution user")]
    MissingUserSwitch,
}
