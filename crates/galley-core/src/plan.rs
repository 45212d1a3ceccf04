//! The image build plan.
//!
//! An [`ImagePlan`] is the ordered list of steps that turns a dependency
//! manifest and a source tree into a least-privilege runtime image:
//!
//! ```text
//!  1. FROM        pinned base image
//!  2. ENV         unbuffered runtime output (+ static env)
//!  3. COPY        dependency manifest only
//!  4. RUN         persistent native runtime packages
//!  5. RUN         build-only packages, as a removable group
//!  6. RUN         install the manifest
//!  7. RUN         remove exactly the group from step 5
//!  8. WORKDIR     + COPY application source
//!  9. RUN         mkdir -p shared volume dirs
//! 10. RUN         create the execution account
//! 11. RUN         chown -R volume root
//! 12. RUN         chmod -R volume root
//! 13. USER        execution account
//! ```
//!
//! Steps 3-7 come before the source copy so that editing application code
//! never invalidates the dependency layers. Steps 5 and 7 are omitted when
//! there are no build packages.

use std::collections::BTreeSet;

use crate::config::{GalleyConfig, PackageManager};
use crate::image::ImageRef;
use crate::mode::FileMode;
use crate::{Error, Result};

/// Position of a step in the build sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StepKind {
    Base = 1,
    Environment = 2,
    CopyManifest = 3,
    RuntimePackages = 4,
    BuildPackages = 5,
    InstallManifest = 6,
    RemoveBuildPackages = 7,
    CopySource = 8,
    VolumeDirs = 9,
    CreateUser = 10,
    ChownVolumes = 11,
    ChmodVolumes = 12,
    SwitchUser = 13,
    Command = 14,
}

impl StepKind {
    pub fn ordinal(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Base => "base image",
            Self::Environment => "environment",
            Self::CopyManifest => "copy manifest",
            Self::RuntimePackages => "runtime packages",
            Self::BuildPackages => "build packages",
            Self::InstallManifest => "install manifest",
            Self::RemoveBuildPackages => "remove build packages",
            Self::CopySource => "copy source",
            Self::VolumeDirs => "volume directories",
            Self::CreateUser => "create user",
            Self::ChownVolumes => "chown volumes",
            Self::ChmodVolumes => "chmod volumes",
            Self::SwitchUser => "switch user",
            Self::Command => "command",
        }
    }

    /// Whether the step adds a filesystem layer to the image.
    pub fn creates_layer(self) -> bool {
        !matches!(
            self,
            Self::Base | Self::Environment | Self::SwitchUser | Self::Command
        )
    }
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:>2}. {}", self.ordinal(), self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildStep {
    From {
        image: ImageRef,
    },
    Label {
        key: String,
        value: String,
    },
    Env {
        key: String,
        value: String,
    },
    CopyManifest {
        src: String,
        dest: String,
    },
    InstallRuntimePackages {
        manager: PackageManager,
        packages: Vec<String>,
    },
    InstallBuildPackages {
        manager: PackageManager,
        group: String,
        packages: Vec<String>,
    },
    InstallManifest {
        command: String,
        manifest: String,
    },
    RemoveBuildPackages {
        manager: PackageManager,
        group: String,
        packages: Vec<String>,
    },
    CopySource {
        src: String,
        workdir: String,
    },
    CreateVolumeDirs {
        paths: Vec<String>,
    },
    CreateUser {
        manager: PackageManager,
        name: String,
    },
    ChownVolumes {
        root: String,
        user: String,
    },
    ChmodVolumes {
        root: String,
        mode: FileMode,
    },
    SwitchUser {
        name: String,
    },
    Cmd {
        args: Vec<String>,
    },
}

impl BuildStep {
    pub fn kind(&self) -> StepKind {
        match self {
            Self::From { .. } | Self::Label { .. } => StepKind::Base,
            Self::Env { .. } => StepKind::Environment,
            Self::CopyManifest { .. } => StepKind::CopyManifest,
            Self::InstallRuntimePackages { .. } => StepKind::RuntimePackages,
            Self::InstallBuildPackages { .. } => StepKind::BuildPackages,
            Self::InstallManifest { .. } => StepKind::InstallManifest,
            Self::RemoveBuildPackages { .. } => StepKind::RemoveBuildPackages,
            Self::CopySource { .. } => StepKind::CopySource,
            Self::CreateVolumeDirs { .. } => StepKind::VolumeDirs,
            Self::CreateUser { .. } => StepKind::CreateUser,
            Self::ChownVolumes { .. } => StepKind::ChownVolumes,
            Self::ChmodVolumes { .. } => StepKind::ChmodVolumes,
            Self::SwitchUser { .. } => StepKind::SwitchUser,
            Self::Cmd { .. } => StepKind::Command,
        }
    }
}

/// Validated, ordered build plan for one image.
#[derive(Debug, Clone)]
pub struct ImagePlan {
    steps: Vec<BuildStep>,
    base_image: ImageRef,
    package_manager: PackageManager,
    manifest_src: String,
    manifest_dest: String,
    install_command: String,
    unbuffered_env: String,
    runtime_packages: Vec<String>,
    build_packages: Vec<String>,
    build_group: String,
    source_src: String,
    workdir: String,
    volume_root: String,
    volume_dirs: Vec<String>,
    volume_mode: FileMode,
    user: String,
}

impl ImagePlan {
    /// Build and validate the plan described by `config`.
    pub fn from_config(config: &GalleyConfig) -> Result<Self> {
        let deps = &config.dependencies;
        let manifest_src = trim_dot_slash(&deps.manifest).to_owned();
        let source_src = trim_dot_slash(&config.app.source)
            .trim_end_matches('/')
            .to_owned();
        let volume_root = config.volumes.root.trim_end_matches('/').to_owned();
        let workdir = config.app.workdir.trim_end_matches('/').to_owned();

        let base_image = ImageRef::parse(&config.image.base_image)?;
        let volume_mode = FileMode::parse(&config.volumes.mode)?;

        let mut plan = Self {
            steps: Vec::new(),
            base_image,
            package_manager: deps.package_manager,
            manifest_dest: format!("/{manifest_src}"),
            manifest_src,
            install_command: deps.install_command.trim().to_owned(),
            unbuffered_env: config.image.unbuffered_env.clone(),
            runtime_packages: dedup(&deps.runtime_packages),
            build_packages: dedup(&deps.build_packages),
            build_group: deps.build_group.clone(),
            source_src,
            workdir,
            volume_root,
            volume_dirs: config
                .volumes
                .dirs
                .iter()
                .map(|d| d.trim_matches('/').to_owned())
                .collect(),
            volume_mode,
            user: config.user.name.clone(),
        };

        plan.steps = plan.assemble(config);
        plan.validate()?;

        tracing::debug!(
            steps = plan.steps.len(),
            base = %plan.base_image,
            user = %plan.user,
            "image plan ready"
        );
        Ok(plan)
    }

    fn assemble(&self, config: &GalleyConfig) -> Vec<BuildStep> {
        let manager = self.package_manager;
        let mut steps = vec![BuildStep::From {
            image: self.base_image.clone(),
        }];

        if let Some(maintainer) = &config.image.maintainer {
            steps.push(BuildStep::Label {
                key: "maintainer".to_owned(),
                value: maintainer.clone(),
            });
        }

        steps.push(BuildStep::Env {
            key: self.unbuffered_env.clone(),
            value: "1".to_owned(),
        });
        for (key, value) in &config.image.env {
            if *key != self.unbuffered_env {
                steps.push(BuildStep::Env {
                    key: key.clone(),
                    value: value.clone(),
                });
            }
        }

        steps.push(BuildStep::CopyManifest {
            src: self.manifest_src.clone(),
            dest: self.manifest_dest.clone(),
        });

        if !self.runtime_packages.is_empty() {
            steps.push(BuildStep::InstallRuntimePackages {
                manager,
                packages: self.runtime_packages.clone(),
            });
        }

        let has_build_deps = !self.build_packages.is_empty();
        if has_build_deps {
            steps.push(BuildStep::InstallBuildPackages {
                manager,
                group: self.build_group.clone(),
                packages: self.build_packages.clone(),
            });
        }

        steps.push(BuildStep::InstallManifest {
            command: self.install_command.clone(),
            manifest: self.manifest_dest.clone(),
        });

        if has_build_deps {
            steps.push(BuildStep::RemoveBuildPackages {
                manager,
                group: self.build_group.clone(),
                packages: self.build_packages.clone(),
            });
        }

        steps.push(BuildStep::CopySource {
            src: self.source_src.clone(),
            workdir: self.workdir.clone(),
        });
        steps.push(BuildStep::CreateVolumeDirs {
            paths: self.volume_paths(),
        });
        steps.push(BuildStep::CreateUser {
            manager,
            name: self.user.clone(),
        });
        steps.push(BuildStep::ChownVolumes {
            root: self.volume_root.clone(),
            user: self.user.clone(),
        });
        steps.push(BuildStep::ChmodVolumes {
            root: self.volume_root.clone(),
            mode: self.volume_mode,
        });
        steps.push(BuildStep::SwitchUser {
            name: self.user.clone(),
        });

        if let Some(args) = &config.image.command {
            if !args.is_empty() {
                steps.push(BuildStep::Cmd { args: args.clone() });
            }
        }

        steps
    }

    /// Check every invariant the built image relies on.
    pub fn validate(&self) -> Result<()> {
        if !self.base_image.is_pinned() {
            return Err(Error::UnpinnedBaseImage {
                image: self.base_image.to_string(),
            });
        }

        for step in &self.steps {
            match step {
                BuildStep::Env { key, .. } if !is_env_key(key) => {
                    return Err(Error::InvalidEnvName { name: key.clone() });
                }
                BuildStep::Env { key, value } | BuildStep::Label { key, value }
                    if value.chars().any(char::is_control) =>
                {
                    return Err(Error::InvalidValue { name: key.clone() });
                }
                _ => {}
            }
        }

        for name in self.runtime_packages.iter().chain(&self.build_packages) {
            if !is_package_name(name) {
                return Err(Error::InvalidPackageName { name: name.clone() });
            }
        }

        let runtime: BTreeSet<&str> = self.runtime_packages.iter().map(String::as_str).collect();
        let overlap: Vec<String> = self
            .build_packages
            .iter()
            .filter(|p| runtime.contains(p.as_str()))
            .cloned()
            .collect();
        if !overlap.is_empty() {
            return Err(Error::OverlappingPackages { packages: overlap });
        }

        if !self.build_packages.is_empty() {
            validate_build_group(&self.build_group, &runtime)?;
        }

        if self.install_command.is_empty() {
            return Err(Error::InvalidPath {
                path: self.install_command.clone(),
                reason: "install command is empty",
            });
        }

        check_relative(&self.manifest_src)?;
        check_relative(&self.source_src)?;
        check_absolute(&self.workdir)?;
        check_absolute(&self.volume_root)?;
        check_volume_root(&self.volume_root, &self.workdir)?;

        let mut seen = BTreeSet::new();
        for dir in &self.volume_dirs {
            check_relative(dir)?;
            if !seen.insert(dir.as_str()) {
                return Err(Error::InvalidPath {
                    path: dir.clone(),
                    reason: "duplicate volume directory",
                });
            }
        }

        if !self.volume_mode.owner_has_full_access() {
            return Err(Error::InsecureVolumeMode {
                mode: self.volume_mode.to_string(),
                reason: "owner needs read, write and execute",
            });
        }
        if self.volume_mode.others_can_write() {
            return Err(Error::InsecureVolumeMode {
                mode: self.volume_mode.to_string(),
                reason: "group and others must not have write access",
            });
        }

        if is_privileged_user(&self.user) {
            return Err(Error::PrivilegedUser {
                name: self.user.clone(),
            });
        }
        if !is_user_name(&self.user) {
            return Err(Error::InvalidUserName {
                name: self.user.clone(),
            });
        }

        self.validate_order()
    }

    fn validate_order(&self) -> Result<()> {
        let mut previous = StepKind::Base;
        for step in &self.steps {
            let kind = step.kind();
            if kind < previous {
                return Err(Error::StepOutOfOrder {
                    step: kind.name(),
                    previous: previous.name(),
                });
            }
            previous = kind;
        }

        let switched = self
            .steps
            .iter()
            .rev()
            .find(|s| s.kind() != StepKind::Command)
            .is_some_and(|s| matches!(s, BuildStep::SwitchUser { name } if *name == self.user));
        if !switched {
            return Err(Error::MissingUserSwitch);
        }
        Ok(())
    }

    pub fn steps(&self) -> &[BuildStep] {
        &self.steps
    }

    pub fn base_image(&self) -> &ImageRef {
        &self.base_image
    }

    pub fn package_manager(&self) -> PackageManager {
        self.package_manager
    }

    /// Manifest path relative to the project root.
    pub fn manifest_src(&self) -> &str {
        &self.manifest_src
    }

    /// Manifest path inside the image.
    pub fn manifest_dest(&self) -> &str {
        &self.manifest_dest
    }

    pub fn install_command(&self) -> &str {
        &self.install_command
    }

    pub fn unbuffered_env(&self) -> &str {
        &self.unbuffered_env
    }

    pub fn runtime_packages(&self) -> &[String] {
        &self.runtime_packages
    }

    pub fn build_packages(&self) -> &[String] {
        &self.build_packages
    }

    pub fn build_group(&self) -> &str {
        &self.build_group
    }

    /// Source tree path relative to the project root.
    pub fn source_src(&self) -> &str {
        &self.source_src
    }

    pub fn workdir(&self) -> &str {
        &self.workdir
    }

    pub fn volume_root(&self) -> &str {
        &self.volume_root
    }

    pub fn volume_mode(&self) -> FileMode {
        self.volume_mode
    }

    /// Absolute paths of the shared volume directories.
    pub fn volume_paths(&self) -> Vec<String> {
        self.volume_dirs
            .iter()
            .map(|d| format!("{}/{d}", self.volume_root))
            .collect()
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    /// Layers created up to and including the removal of build packages.
    ///
    /// These layers only depend on the manifest and the package lists, so a
    /// rebuild after a source-only change must reuse all of them.
    pub fn dependency_layer_count(&self) -> usize {
        self.steps
            .iter()
            .map(BuildStep::kind)
            .filter(|k| *k <= StepKind::RemoveBuildPackages && k.creates_layer())
            .count()
    }
}

fn trim_dot_slash(path: &str) -> &str {
    path.strip_prefix("./").unwrap_or(path)
}

fn dedup(items: &[String]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    items
        .iter()
        .map(|s| s.trim())
        .filter(|s| seen.insert(*s))
        .map(str::to_owned)
        .collect()
}

/// Characters that can appear in paths, package names and user names without
/// shell quoting.
fn is_shell_safe(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '+' | '=' | ':' | '~' | '/' | '@')
}

fn is_package_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('-')
        && name.chars().all(|c| c != '/' && c != '@' && is_shell_safe(c))
}

fn is_env_key(key: &str) -> bool {
    let mut chars = key.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn validate_build_group(group: &str, runtime: &BTreeSet<&str>) -> Result<()> {
    let valid = !group.is_empty()
        && !group.starts_with('-')
        && group
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    // apk resolves `apk del <name>` against installed packages too
    if !valid || runtime.contains(group) {
        return Err(Error::InvalidBuildGroup {
            name: group.to_owned(),
        });
    }
    Ok(())
}

fn check_relative(path: &str) -> Result<()> {
    let reason = if path.is_empty() {
        Some("path is empty")
    } else if path.starts_with('/') {
        Some("must be relative")
    } else if path.split('/').any(|c| c == "..") {
        Some("must not contain '..'")
    } else if path.split('/').any(|c| c.is_empty() || c == ".") {
        Some("must not contain '.' or empty segments")
    } else if !path.chars().all(is_shell_safe) {
        Some("contains unsupported characters")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(Error::InvalidPath {
            path: path.to_owned(),
            reason,
        }),
        None => Ok(()),
    }
}

/// Trailing slashes are trimmed before this runs, so `/` arrives empty.
fn check_absolute(path: &str) -> Result<()> {
    if !path.starts_with('/') {
        return Err(Error::InvalidPath {
            path: path.to_owned(),
            reason: "must be absolute",
        });
    }
    if path.len() > 1 {
        check_relative(&path[1..])?;
    }
    Ok(())
}

/// Directories whose ownership the execution account must never receive.
const SYSTEM_DIRS: &[&str] = &[
    "/bin", "/boot", "/dev", "/etc", "/home", "/lib", "/lib64", "/opt", "/proc", "/root", "/run",
    "/sbin", "/srv", "/sys", "/tmp", "/usr", "/var",
];

/// System trees nothing may live under, unlike `/var` or `/srv`.
const SYSTEM_TREES: &[&str] = &[
    "/bin", "/boot", "/dev", "/etc", "/lib", "/lib64", "/proc", "/root", "/sbin", "/sys", "/usr",
];

fn is_within(path: &str, ancestor: &str) -> bool {
    path == ancestor
        || path
            .strip_prefix(ancestor)
            .is_some_and(|rest| rest.starts_with('/'))
}

/// The volume root is chowned to the account, so it must not reach into the
/// application directory or a system directory.
fn check_volume_root(root: &str, workdir: &str) -> Result<()> {
    let reason = if is_within(root, workdir) || is_within(workdir, root) {
        Some("volume root must not overlap the application directory")
    } else if SYSTEM_DIRS.contains(&root) || SYSTEM_TREES.iter().any(|t| is_within(root, t)) {
        Some("volume root must not be a system directory")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(Error::InvalidPath {
            path: root.to_owned(),
            reason,
        }),
        None => Ok(()),
    }
}

fn is_privileged_user(name: &str) -> bool {
    name == "root" || (!name.is_empty() && name.chars().all(|c| c == '0'))
}

fn is_user_name(name: &str) -> bool {
    let mut chars = name.chars();
    name.len() <= 32
        && chars
            .next()
            .is_some_and(|c| c.is_ascii_lowercase() || c == '_')
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '_' | '-'))
}
