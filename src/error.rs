//! Error type shared by every measurement path.

use std::io;

use thiserror::Error;

use crate::clock::ClockSource;
use crate::counter::CounterKind;
use crate::Subject;

#[derive(Debug, Error)]
pub enum Error {
    /// The time source could not be read. There is no sensible fallback value.
    #[error("failed to read clock {clock:?}: {err}")]
    Clock {
        clock: ClockSource,
        #[source]
        err: io::Error,
    },

    /// `perf_event_open` refused the configuration (permissions, unsupported
    /// event, descriptor table exhausted, subject gone).
    #[error("failed to open counter {kind} for {subject}: {err}")]
    Open {
        kind: String,
        subject: Subject,
        #[source]
        err: io::Error,
    },

    /// A control operation was issued on a binding without a descriptor.
    #[error("counter has no open descriptor")]
    NotOpen,

    #[error("counter control operation failed: {0}")]
    Control(#[source] io::Error),

    #[error("failed to read counter: {0}")]
    Read(#[source] io::Error),

    #[error("failed to initialise spawn attributes: {0}")]
    SpawnAttr(#[source] io::Error),

    #[error("failed to spawn {program}: {err}")]
    Spawn {
        program: String,
        #[source]
        err: io::Error,
    },

    #[error("failed to wait for process {pid}: {err}")]
    Wait {
        pid: libc::pid_t,
        #[source]
        err: io::Error,
    },

    #[error("argument contains an interior NUL byte: {0:?}")]
    InvalidArgument(String),

    #[error("counter group already holds a member of kind {0}")]
    DuplicateKind(CounterKind),
}

impl Error {
    /// True when the kernel denied access, usually `perf_event_paranoid` or
    /// a missing `CAP_PERFMON`.
    pub fn is_permission_denied(&self) -> bool {
        match self {
            Error::Open { err, .. } => matches!(
                err.raw_os_error(),
                Some(libc::EACCES) | Some(libc::EPERM)
            ),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
