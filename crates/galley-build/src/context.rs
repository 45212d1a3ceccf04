use std::path::{Path, PathBuf};
use std::process::Command;

use galley_core::ImagePlan;

/// Directory the build context is assembled in.
pub const CONTEXT_DIR: &str = ".galley-context";

/// Paths galley always leaves out of the context, regardless of
/// .gitignore content.
const GALLEY_EXCLUDES: &[&str] = &[CONTEXT_DIR, ".galley", ".git"];

/// Assembles the Docker build context.
///
/// The context holds exactly what the Dockerfile copies: the dependency
/// manifest, the application source tree (as reported by `git ls-files`, so
/// `.gitignore` is respected) and the Dockerfile itself.
pub fn create_context(
    project_dir: &Path,
    plan: &ImagePlan,
    dockerfile_content: &str,
) -> Result<PathBuf, ContextError> {
    let manifest = project_dir.join(plan.manifest_src());
    if !manifest.is_file() {
        return Err(ContextError::MissingManifest(manifest));
    }
    let source = project_dir.join(plan.source_src());
    if !source.is_dir() {
        return Err(ContextError::MissingSource(source));
    }

    let context_dir = project_dir.join(CONTEXT_DIR);

    // Clean previous context
    if context_dir.exists() {
        std::fs::remove_dir_all(&context_dir).map_err(|e| ContextError::Cleanup {
            path: context_dir.clone(),
            source: e,
        })?;
    }
    std::fs::create_dir_all(&context_dir).map_err(|e| ContextError::Create {
        path: context_dir.clone(),
        source: e,
    })?;

    copy_into(project_dir, &context_dir, Path::new(plan.manifest_src()))?;

    let files = git_ls_files(project_dir, plan.source_src())?;
    let mut copied = 0usize;
    for relative_path in &files {
        if GALLEY_EXCLUDES
            .iter()
            .any(|ex| relative_path.starts_with(ex))
        {
            continue;
        }
        // Tracked but deleted in the working tree
        if !project_dir.join(relative_path).is_file() {
            tracing::debug!(path = %relative_path.display(), "skipping missing file");
            continue;
        }
        copy_into(project_dir, &context_dir, relative_path)?;
        copied += 1;
    }

    let dockerfile_path = context_dir.join("Dockerfile");
    std::fs::write(&dockerfile_path, dockerfile_content).map_err(|e| {
        ContextError::WriteDockerfile {
            path: dockerfile_path.clone(),
            source: e,
        }
    })?;

    tracing::info!(
        files = copied,
        dir = %context_dir.display(),
        "build context assembled"
    );
    Ok(context_dir)
}

fn copy_into(project_dir: &Path, context_dir: &Path, relative_path: &Path) -> Result<(), ContextError> {
    let src = project_dir.join(relative_path);
    let dst = context_dir.join(relative_path);

    if let Some(parent) = dst.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ContextError::Create {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    std::fs::copy(&src, &dst).map_err(|e| ContextError::CopyFile {
        path: src,
        source: e,
    })?;
    Ok(())
}

/// Files under `source_dir` git considers part of the project:
/// tracked files + untracked files that are not .gitignored.
fn git_ls_files(project_dir: &Path, source_dir: &str) -> Result<Vec<PathBuf>, ContextError> {
    let output = Command::new("git")
        .args([
            "ls-files",
            "--cached",
            "--others",
            "--exclude-standard",
            "--",
            source_dir,
        ])
        .current_dir(project_dir)
        .output()
        .map_err(|e| ContextError::GitCommand {
            detail: "failed to execute git ls-files".to_owned(),
            source: e,
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ContextError::GitFailed {
            detail: format!(
                "git ls-files exited with {}: {}",
                output.status,
                stderr.trim()
            ),
        });
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let files: Vec<PathBuf> = stdout
        .lines()
        .filter(|line| !line.is_empty())
        .map(PathBuf::from)
        .collect();

    Ok(files)
}

/// Checks whether the git working tree has uncommitted changes.
pub fn is_dirty(project_dir: &Path) -> Result<bool, ContextError> {
    let output = Command::new("git")
        .args(["status", "--porcelain"])
        .current_dir(project_dir)
        .output()
        .map_err(|e| ContextError::GitCommand {
            detail: "failed to execute git status".to_owned(),
            source: e,
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ContextError::GitFailed {
            detail: format!(
                "git status exited with {}: {}",
                output.status,
                stderr.trim()
            ),
        });
    }

    Ok(!output.stdout.is_empty())
}

#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error("dependency manifest not found at {0}")]
    MissingManifest(PathBuf),
    #[error("application source directory not found at {0}")]
    MissingSource(PathBuf),
    #[error("failed to clean up context directory {path}")]
    Cleanup {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to create directory {path}")]
    Create {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to copy file {path}")]
    CopyFile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write Dockerfile at {path}")]
    WriteDockerfile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("git command failed: {detail}")]
    GitCommand {
        detail: String,
        source: std::io::Error,
    },
    #[error("git failed: {detail}")]
    GitFailed { detail: String },
}
