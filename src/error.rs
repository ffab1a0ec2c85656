use std::error;
use std::fmt;
use std::io;
use std::result;

use crate::process::ExitStatus;

/// The error type for pipeline construction and execution.
#[derive(Debug)]
pub enum Error {
    /// The caller violated a contract of the API, such as linking a pipe
    /// endpoint that is already linked, waiting on a process that was never
    /// spawned, or re-running a consumed pipeline.
    Usage(&'static str),

    /// A system call failed.
    ///
    /// `op` names the failing operation; for spawn failures it includes the
    /// binary that could not be started.  `source` carries the OS error code.
    Os {
        /// The operation that failed.
        op: String,
        /// The underlying OS error.
        source: io::Error,
    },

    /// The last stage of a pipeline exited with a non-zero status.
    ///
    /// Only [`Command::run`](crate::Command::run) produces this variant; the
    /// non-erroring [`Command::status`](crate::Command::status) hands the
    /// status back instead.
    Command(ExitStatus),
}

/// Result alias used throughout the crate.
pub type Result<T> = result::Result<T, Error>;

impl Error {
    pub(crate) fn os(op: impl Into<String>, source: io::Error) -> Error {
        Error::Os {
            op: op.into(),
            source,
        }
    }

    /// Returns the exit status carried by [`Error::Command`], if any.
    pub fn exit_status(&self) -> Option<ExitStatus> {
        match self {
            Error::Command(status) => Some(*status),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Usage(msg) => write!(f, "usage error: {}", msg),
            Error::Os { op, source } => write!(f, "{}: {}", op, source),
            Error::Command(status) => write!(f, "command failed with {}", status),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::Os { source, .. } => Some(source),
            _ => None,
        }
    }
}
