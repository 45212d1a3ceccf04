use std::collections::VecDeque;
use std::io;

/// Lines of stderr kept from a streamed command for its error.
pub const STDERR_TAIL_LINES: usize = 20;

#[derive(Debug, thiserror::Error)]
pub enum DockerError {
    #[error("docker CLI not found; install it from https://docs.docker.com/get-docker/")]
    NotFound { source: io::Error },

    #[error("could not run docker")]
    Spawn { source: io::Error },

    #[error("`docker {}` failed\n{stderr}", args.join(" "))]
    CommandFailed { args: Vec<String>, stderr: String },

    #[error("docker output was not valid UTF-8")]
    InvalidUtf8 { source: std::string::FromUtf8Error },
}

impl DockerError {
    /// Classify a failure to start or talk to the docker process.
    pub fn from_io(source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::NotFound => Self::NotFound { source },
            _ => Self::Spawn { source },
        }
    }
}

/// The last lines a command wrote to stderr.
#[derive(Debug, Clone)]
pub struct StderrTail {
    lines: VecDeque<String>,
    limit: usize,
}

impl StderrTail {
    pub fn new(limit: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(limit),
            limit,
        }
    }

    pub fn push(&mut self, line: &str) {
        if self.limit == 0 {
            return;
        }
        if self.lines.len() == self.limit {
            self.lines.pop_front();
        }
        self.lines.push_back(line.trim_end().to_owned());
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn into_string(self) -> String {
        Vec::from(self.lines).join("\n")
    }
}
