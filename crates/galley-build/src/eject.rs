use std::path::{Path, PathBuf};

/// Directory ejected build files live in.
pub const EJECT_DIR: &str = ".galley";

fn ejected_dockerfile(project_dir: &Path) -> PathBuf {
    project_dir.join(EJECT_DIR).join("Dockerfile")
}

/// Ejects the Dockerfile into the project directory.
///
/// After ejecting, `galley build` uses `.galley/Dockerfile` instead of
/// generating one. It is still audited before every build.
pub fn eject(project_dir: &Path, dockerfile_content: &str) -> Result<PathBuf, EjectError> {
    let eject_dir = project_dir.join(EJECT_DIR);
    std::fs::create_dir_all(&eject_dir).map_err(|e| EjectError::CreateDir {
        path: eject_dir.clone(),
        source: e,
    })?;

    let dockerfile_path = ejected_dockerfile(project_dir);
    if dockerfile_path.exists() {
        return Err(EjectError::AlreadyEjected(dockerfile_path));
    }

    std::fs::write(&dockerfile_path, dockerfile_content).map_err(|e| EjectError::Write {
        path: dockerfile_path.clone(),
        source: e,
    })?;

    tracing::info!(path = %dockerfile_path.display(), "dockerfile ejected");
    Ok(dockerfile_path)
}

/// Check if the project has an ejected Dockerfile.
pub fn is_ejected(project_dir: &Path) -> bool {
    ejected_dockerfile(project_dir).exists()
}

/// Load ejected Dockerfile content.
pub fn load_ejected_dockerfile(project_dir: &Path) -> Result<String, EjectError> {
    let path = ejected_dockerfile(project_dir);
    std::fs::read_to_string(&path).map_err(|e| EjectError::Read { path, source: e })
}

#[derive(Debug, thiserror::Error)]
pub enum EjectError {
    #[error("failed to create .galley directory at {path}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Dockerfile already ejected at {0}; edit it directly or delete it to re-eject")]
    AlreadyEjected(PathBuf),
    #[error("failed to write {path}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to read ejected Dockerfile at {path}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
}
