use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, BufReader};

use crate::docker::{DockerError, STDERR_TAIL_LINES, StderrTail};

/// Seam between galley and the docker CLI.
///
/// [`RealExecutor`] spawns `docker`; tests substitute a mock.
#[allow(async_fn_in_trait)]
pub trait DockerExecutor: Send + Sync {
    /// Run `docker <args>` and return its stdout.
    async fn exec(&self, args: &[String]) -> Result<String, DockerError>;

    /// Run `docker <args>` with its output shown on the terminal.
    ///
    /// A failure carries the last lines of stderr, so a failed build names
    /// the step that broke.
    async fn exec_streaming(&self, args: &[String]) -> Result<(), DockerError>;
}

/// Runs the `docker` binary found on `PATH`.
pub struct RealExecutor;

impl DockerExecutor for RealExecutor {
    async fn exec(&self, args: &[String]) -> Result<String, DockerError> {
        tracing::debug!(?args, "docker");
        let output = tokio::process::Command::new("docker")
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(DockerError::from_io)?;

        if !output.status.success() {
            return Err(DockerError::CommandFailed {
                args: args.to_vec(),
                stderr: String::from_utf8_lossy(&output.stderr).trim_end().to_owned(),
            });
        }
        String::from_utf8(output.stdout).map_err(|e| DockerError::InvalidUtf8 { source: e })
    }

    async fn exec_streaming(&self, args: &[String]) -> Result<(), DockerError> {
        tracing::debug!(?args, "docker (streaming)");
        let mut child = tokio::process::Command::new("docker")
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(DockerError::from_io)?;

        let mut tail = StderrTail::new(STDERR_TAIL_LINES);
        if let Some(stderr) = child.stderr.take() {
            let mut reader = BufReader::new(stderr);
            let mut buf = Vec::new();
            while reader
                .read_until(b'\n', &mut buf)
                .await
                .map_err(|e| DockerError::Spawn { source: e })?
                > 0
            {
                let line = String::from_utf8_lossy(&buf);
                eprint!("{line}");
                tail.push(&line);
                buf.clear();
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| DockerError::Spawn { source: e })?;
        if status.success() {
            return Ok(());
        }

        tracing::debug!(%status, "docker exited with failure");
        let stderr = if tail.is_empty() {
            status.to_string()
        } else {
            tail.into_string()
        };
        Err(DockerError::CommandFailed {
            args: args.to_vec(),
            stderr,
        })
    }
}
