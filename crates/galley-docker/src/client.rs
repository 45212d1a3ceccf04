use crate::cache::CacheReport;
use crate::docker::DockerError;
use crate::executor::{DockerExecutor, RealExecutor};
use galley_core::{ImagePlan, PackageManager};
use std::fmt;
use std::path::{Path, PathBuf};

/// Content-addressed id of a built image (`sha256:...`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageId(pub String);

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Docker operations client, parameterized over the executor for testability.
pub struct DockerClient<E: DockerExecutor = RealExecutor> {
    executor: E,
}

impl DockerClient<RealExecutor> {
    pub fn new() -> Self {
        Self {
            executor: RealExecutor,
        }
    }
}

impl Default for DockerClient<RealExecutor> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: DockerExecutor> DockerClient<E> {
    pub fn with_executor(executor: E) -> Self {
        Self { executor }
    }

    // ── Build ──

    /// Build the context into an untagged image.
    ///
    /// The image id is read back from `iidfile`; nothing is tagged here, so a
    /// failed build or a later failed check never moves `name:tag`.
    pub async fn build_image(
        &self,
        context_dir: &Path,
        iidfile: &Path,
    ) -> Result<ImageId, BuildError> {
        let context = context_dir
            .to_str()
            .ok_or_else(|| BuildError::InvalidPath(context_dir.to_path_buf()))?;
        let iid = iidfile
            .to_str()
            .ok_or_else(|| BuildError::InvalidPath(iidfile.to_path_buf()))?;
        let dockerfile = context_dir.join("Dockerfile");
        let dockerfile = dockerfile
            .to_str()
            .ok_or_else(|| BuildError::InvalidPath(dockerfile.clone()))?;

        // A stale id from an earlier run must not be mistaken for this build.
        if iidfile.exists() {
            tokio::fs::remove_file(iidfile)
                .await
                .map_err(|e| BuildError::ReadImageId {
                    path: iidfile.to_path_buf(),
                    source: e,
                })?;
        }

        self.executor
            .exec_streaming(&args([
                "build",
                "--iidfile",
                iid,
                "--file",
                dockerfile,
                context,
            ]))
            .await
            .map_err(|e| BuildError::Build { source: e })?;

        let id = tokio::fs::read_to_string(iidfile)
            .await
            .map_err(|e| BuildError::ReadImageId {
                path: iidfile.to_path_buf(),
                source: e,
            })?;
        let id = id.trim();
        if id.is_empty() {
            return Err(BuildError::EmptyImageId(iidfile.to_path_buf()));
        }

        tracing::info!(image_id = id, "image built");
        Ok(ImageId(id.to_owned()))
    }

    pub async fn tag_image(&self, id: &ImageId, tag: &str) -> Result<(), BuildError> {
        self.executor
            .exec(&args(["tag", &id.0, tag]))
            .await
            .map_err(|e| BuildError::Tag {
                tag: tag.to_owned(),
                source: e,
            })?;
        tracing::info!(image_id = %id, tag, "image tagged");
        Ok(())
    }

    // ── Inspect ──

    pub async fn image_exists(&self, reference: &str) -> bool {
        self.executor
            .exec(&args(["image", "inspect", "--format", "{{.Id}}", reference]))
            .await
            .is_ok()
    }

    /// The user the image's processes start as; empty means root.
    pub async fn image_user(&self, reference: &str) -> Result<String, VerifyError> {
        let out = self
            .executor
            .exec(&args([
                "image",
                "inspect",
                "--format",
                "{{.Config.User}}",
                reference,
            ]))
            .await
            .map_err(|e| VerifyError::Inspect { source: e })?;
        Ok(out.trim().to_owned())
    }

    /// Layer digests of the image, base layers first.
    pub async fn image_layers(&self, reference: &str) -> Result<Vec<String>, VerifyError> {
        let out = self
            .executor
            .exec(&args([
                "image",
                "inspect",
                "--format",
                "{{json .RootFS.Layers}}",
                reference,
            ]))
            .await
            .map_err(|e| VerifyError::Inspect { source: e })?;

        let trimmed = out.trim();
        if trimmed == "null" {
            return Ok(Vec::new());
        }
        serde_json::from_str(trimmed).map_err(|e| VerifyError::InvalidInspectOutput { source: e })
    }

    /// Run a shell script in a throwaway container.
    ///
    /// No `--user` is passed, so the script runs as the image's own user.
    pub async fn run_in_image(&self, reference: &str, script: &str) -> Result<String, VerifyError> {
        self.executor
            .exec(&args([
                "run",
                "--rm",
                "--entrypoint",
                "sh",
                reference,
                "-c",
                script,
            ]))
            .await
            .map_err(|e| VerifyError::Run { source: e })
    }

    // ── Verify ──

    /// Check a built image against the plan it was built from.
    ///
    /// Every check runs; a failing check does not hide later ones.
    pub async fn verify_image(
        &self,
        reference: &str,
        plan: &ImagePlan,
    ) -> Result<VerificationReport, VerifyError> {
        let mut report = VerificationReport::default();
        let account = plan.user();

        // 1. Configured user
        let configured = self.image_user(reference).await?;
        report.configured_user = if configured.is_empty() || is_root(&configured) {
            CheckResult::fail(&format!(
                "image runs as root (USER {})",
                if configured.is_empty() {
                    "unset"
                } else {
                    configured.as_str()
                }
            ))
        } else if user_name(&configured) != account {
            CheckResult::fail(&format!("image runs as '{configured}', expected '{account}'"))
        } else {
            CheckResult::ok(&configured)
        };

        // 2. Effective identity
        let identity = self.run_in_image(reference, "id -un; id -u").await?;
        let mut lines = identity.lines().map(str::trim);
        let name = lines.next().unwrap_or("");
        let uid = lines.next().unwrap_or("");
        report.runtime_user = if uid == "0" || name == "root" {
            CheckResult::fail(&format!("process runs as {name} (uid {uid})"))
        } else if name != account {
            CheckResult::fail(&format!("process runs as '{name}', expected '{account}'"))
        } else {
            CheckResult::ok(&format!("{name} (uid {uid})"))
        };

        // 3. Volume directories
        let paths = plan.volume_paths();
        let script = paths
            .iter()
            .map(|p| format!("[ -d {p} ] || echo {p}"))
            .collect::<Vec<_>>()
            .join("; ");
        let missing: Vec<String> = self
            .run_in_image(reference, &script)
            .await?
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_owned)
            .collect();
        report.volume_dirs = if missing.is_empty() {
            CheckResult::ok(&paths.join(", "))
        } else {
            CheckResult::fail(&format!("missing: {}", missing.join(", ")))
        };

        // 4. Ownership and permissions under the volume root
        let root = plan.volume_root();
        let listing = self
            .run_in_image(
                reference,
                &format!("find {root} -exec stat -c '%U %a %n' {{}} +"),
            )
            .await?;
        let problems = volume_problems(&listing, account);
        report.volume_permissions = if problems.is_empty() {
            CheckResult::ok(&format!("{root} owned by {account}, not writable by others"))
        } else {
            CheckResult::fail(&problems.join("; "))
        };

        // 5. Application directory is read-only for the account
        let workdir = plan.workdir();
        let writable = self
            .run_in_image(
                reference,
                &format!("[ -w {workdir} ] && echo writable || echo read-only"),
            )
            .await?;
        report.app_read_only = if writable.trim() == "read-only" {
            CheckResult::ok(workdir)
        } else {
            CheckResult::fail(&format!("{workdir} is writable by {account}"))
        };

        // 6. Build dependencies removed
        let leftovers = self.leftover_build_packages(reference, plan).await?;
        report.build_deps_removed = if leftovers.is_empty() {
            CheckResult::ok(&format!("{} absent", describe_build_deps(plan)))
        } else {
            CheckResult::fail(&format!("still installed: {}", leftovers.join(", ")))
        };

        // 7. No compiler on PATH
        let compilers: Vec<String> = self
            .run_in_image(reference, "for t in gcc cc; do command -v $t; done || true")
            .await?
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_owned)
            .collect();
        report.no_compilers = if compilers.is_empty() {
            CheckResult::ok("no gcc or cc")
        } else {
            CheckResult::fail(&format!("found {}", compilers.join(", ")))
        };

        tracing::info!(passed = report.all_passed(), reference, "image verified");
        Ok(report)
    }

    async fn leftover_build_packages(
        &self,
        reference: &str,
        plan: &ImagePlan,
    ) -> Result<Vec<String>, VerifyError> {
        if plan.build_packages().is_empty() {
            return Ok(Vec::new());
        }
        match plan.package_manager() {
            // Members of the virtual group may legitimately stay as runtime
            // dependencies of something else; only the group itself must go.
            PackageManager::Apk => {
                let group = plan.build_group();
                let out = self
                    .run_in_image(reference, &format!("apk info -e {group} || true"))
                    .await?;
                Ok(out
                    .lines()
                    .map(str::trim)
                    .filter(|l| *l == group)
                    .map(str::to_owned)
                    .collect())
            }
            PackageManager::Apt => {
                let packages = plan.build_packages().join(" ");
                let out = self
                    .run_in_image(
                        reference,
                        &format!(
                            "dpkg-query -W -f='${{Package}} ${{Status}}\\n' {packages} 2>/dev/null || true"
                        ),
                    )
                    .await?;
                Ok(out
                    .lines()
                    .filter(|l| l.ends_with("install ok installed"))
                    .filter_map(|l| l.split_whitespace().next())
                    .map(str::to_owned)
                    .collect())
            }
        }
    }

    // ── Layer cache ──

    /// Compare the layers of the previous image with a fresh build.
    pub async fn cache_report(
        &self,
        previous: &str,
        current: &str,
        plan: &ImagePlan,
    ) -> Result<CacheReport, VerifyError> {
        let base = self.image_layers(&plan.base_image().to_string()).await?;
        let previous = self.image_layers(previous).await?;
        let current = self.image_layers(current).await?;
        Ok(CacheReport::compare(
            &previous,
            &current,
            base.len(),
            plan.dependency_layer_count(),
        ))
    }

    // ── Compose ──

    pub async fn compose_up(&self, file: &Path) -> Result<(), ComposeError> {
        let file = compose_file(file)?;
        self.executor
            .exec_streaming(&args(["compose", "-f", file, "up"]))
            .await
            .map_err(|e| ComposeError::Command { source: e })
    }

    /// Run a one-off shell command in a fresh container of `service`.
    pub async fn compose_run(
        &self,
        file: &Path,
        service: &str,
        script: &str,
    ) -> Result<(), ComposeError> {
        let file = compose_file(file)?;
        self.executor
            .exec_streaming(&args([
                "compose", "-f", file, "run", "--rm", service, "sh", "-c", script,
            ]))
            .await
            .map_err(|e| ComposeError::Command { source: e })
    }

    pub async fn compose_down(&self, file: &Path) -> Result<(), ComposeError> {
        let file = compose_file(file)?;
        self.executor
            .exec_streaming(&args(["compose", "-f", file, "down"]))
            .await
            .map_err(|e| ComposeError::Command { source: e })
    }

    // ── Doctor ──

    /// Run all diagnostic checks without early return.
    pub async fn doctor(&self) -> DoctorReport {
        let mut report = DoctorReport::default();

        // 1. docker CLI
        match self
            .executor
            .exec(&args(["version", "--format", "{{.Client.Version}}"]))
            .await
        {
            Ok(v) => report.docker = CheckResult::ok(v.trim()),
            Err(e @ DockerError::NotFound { .. }) => {
                report.docker = CheckResult::fail(&e.to_string());
                report.daemon = CheckResult::fail("docker CLI missing");
                report.compose = CheckResult::fail("docker CLI missing");
                return report;
            }
            // The client version prints even when the daemon is down.
            Err(e) => {
                tracing::debug!(error = %e, "docker version");
                report.docker = CheckResult::ok("installed");
            }
        }

        // 2. daemon
        match self
            .executor
            .exec(&args(["info", "--format", "{{.ServerVersion}}"]))
            .await
        {
            Ok(v) if !v.trim().is_empty() => report.daemon = CheckResult::ok(v.trim()),
            _ => report.daemon = CheckResult::fail("daemon not reachable"),
        }

        // 3. compose plugin
        match self.executor.exec(&args(["compose", "version", "--short"])).await {
            Ok(v) => report.compose = CheckResult::ok(v.trim()),
            Err(e) => {
                tracing::debug!(error = %e, "docker compose version");
                report.compose = CheckResult::fail("docker compose plugin not installed");
            }
        }

        report
    }
}

fn args<const N: usize>(a: [&str; N]) -> Vec<String> {
    a.iter().map(|s| (*s).to_owned()).collect()
}

fn compose_file(file: &Path) -> Result<&str, ComposeError> {
    file.to_str()
        .ok_or_else(|| ComposeError::InvalidPath(file.to_path_buf()))
}

fn user_name(user: &str) -> &str {
    user.split(':').next().unwrap_or(user)
}

fn is_root(user: &str) -> bool {
    matches!(user_name(user), "root" | "0")
}

fn describe_build_deps(plan: &ImagePlan) -> String {
    match plan.package_manager() {
        PackageManager::Apk => format!("build group {}", plan.build_group()),
        PackageManager::Apt => format!("{} build packages", plan.build_packages().len()),
    }
}

/// Problems in `stat -c '%U %a %n'` output for the volume tree.
fn volume_problems(listing: &str, account: &str) -> Vec<String> {
    let mut problems = Vec::new();
    let mut seen = 0;
    for line in listing.lines() {
        let mut parts = line.trim().splitn(3, ' ');
        let (Some(owner), Some(mode), Some(path)) = (parts.next(), parts.next(), parts.next())
        else {
            continue;
        };
        seen += 1;
        if owner != account {
            problems.push(format!("{path} owned by {owner}"));
        }
        match u32::from_str_radix(mode, 8) {
            Ok(bits) if bits & 0o022 != 0 => {
                problems.push(format!("{path} is writable by others (mode {mode})"))
            }
            Ok(_) => {}
            Err(e) => problems.push(format!("{path} has unreadable mode {mode}: {e}")),
        }
    }
    if seen == 0 {
        problems.push("volume root not found".to_owned());
    }
    problems
}

// ── Reports ──

#[derive(Debug, Default, Clone)]
pub struct CheckResult {
    pub passed: bool,
    pub detail: String,
}

impl CheckResult {
    pub fn ok(detail: &str) -> Self {
        Self {
            passed: true,
            detail: detail.to_owned(),
        }
    }

    pub fn fail(detail: &str) -> Self {
        Self {
            passed: false,
            detail: detail.to_owned(),
        }
    }

    pub fn icon(&self) -> &'static str {
        if self.passed { "OK" } else { "NG" }
    }
}

#[derive(Debug, Default)]
pub struct VerificationReport {
    pub configured_user: CheckResult,
    pub runtime_user: CheckResult,
    pub volume_dirs: CheckResult,
    pub volume_permissions: CheckResult,
    pub app_read_only: CheckResult,
    pub build_deps_removed: CheckResult,
    pub no_compilers: CheckResult,
}

impl VerificationReport {
    fn checks(&self) -> [(&'static str, &CheckResult); 7] {
        [
            ("Image user", &self.configured_user),
            ("Runtime user", &self.runtime_user),
            ("Volume dirs", &self.volume_dirs),
            ("Volume perms", &self.volume_permissions),
            ("App dir", &self.app_read_only),
            ("Build deps", &self.build_deps_removed),
            ("Compilers", &self.no_compilers),
        ]
    }

    pub fn all_passed(&self) -> bool {
        self.checks().iter().all(|(_, c)| c.passed)
    }

    /// Labels of the checks that failed.
    pub fn failures(&self) -> Vec<&'static str> {
        self.checks()
            .iter()
            .filter(|(_, c)| !c.passed)
            .map(|(label, _)| *label)
            .collect()
    }
}

impl fmt::Display for VerificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (label, check) in self.checks() {
            writeln!(f, "{label:<14}{}  {}", check.icon(), check.detail)?;
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct DoctorReport {
    pub docker: CheckResult,
    pub daemon: CheckResult,
    pub compose: CheckResult,
    pub config_file: CheckResult,
    pub manifest: CheckResult,
    pub source: CheckResult,
}

impl DoctorReport {
    pub fn all_passed(&self) -> bool {
        self.docker.passed
            && self.daemon.passed
            && self.compose.passed
            && self.config_file.passed
            && self.manifest.passed
            && self.source.passed
    }
}

impl fmt::Display for DoctorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Galley Doctor")?;
        writeln!(f, "------------------------------")?;
        let rows = [
            ("docker CLI", &self.docker),
            ("Daemon", &self.daemon),
            ("Compose", &self.compose),
            ("galley.toml", &self.config_file),
            ("Manifest", &self.manifest),
            ("Source", &self.source),
        ];
        for (label, check) in rows {
            writeln!(f, "{label:<14}{}  {}", check.icon(), check.detail)?;
        }
        writeln!(f, "------------------------------")?;
        if self.all_passed() {
            write!(f, "All checks passed!")
        } else {
            write!(f, "Some checks failed.")
        }
    }
}

// ── Error types ──

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("path is not valid UTF-8: {0}")]
    InvalidPath(PathBuf),

    #[error("docker build failed")]
    Build { source: DockerError },

    #[error("failed to read image id from {path}")]
    ReadImageId {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("docker build wrote no image id to {0}")]
    EmptyImageId(PathBuf),

    #[error("failed to tag image as {tag}")]
    Tag { tag: String, source: DockerError },
}

#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("docker image inspect failed")]
    Inspect { source: DockerError },

    #[error("unexpected docker image inspect output")]
    InvalidInspectOutput { source: serde_json::Error },

    #[error("command inside the image failed")]
    Run { source: DockerError },
}

#[derive(Debug, thiserror::Error)]
pub enum ComposeError {
    #[error("compose file path is not valid UTF-8: {0}")]
    InvalidPath(PathBuf),

    #[error("docker compose failed")]
    Command { source: DockerError },
}
