use std::path::PathBuf;
use std::process::ExitStatus;

/// Errors that can occur while driving the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to launch `{program}`: {source}")]
    CommandSpawn {
        program: String,
        source: std::io::Error,
    },

    #[error("`{program}` exited with {status}:\n{stderr}")]
    CommandFailed {
        program: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("I/O error: {source} ({path})")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },

    #[error("required output {0} is empty")]
    EmptyOutput(PathBuf),

    #[error("manifest error: {0}")]
    Manifest(String),

    #[error("malformed record: {0}")]
    Record(String),
}

impl Error {
    /// Convenience for wrapping an `io::Error` with a path context.
    pub fn io(source: std::io::Error, path: impl Into<PathBuf>) -> Self {
        Self::Io {
            source,
            path: path.into(),
        }
    }
}

impl From<csv::Error> for Error {
    fn from(err: csv::Error) -> Self {
        Self::Record(err.to_string())
    }
}
