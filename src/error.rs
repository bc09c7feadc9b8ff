#![allow(missing_docs)]

use std::{error, fmt, io};

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    cause: Option<Box<dyn error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A stopwatch was constructed without any events to count.
    NoEvents,

    /// The requested [`Event`] was not requested when the stopwatch was
    /// constructed.
    ///
    /// This is a programming error rather than an environmental limitation.
    ///
    /// [`Event`]: ../enum.Event.html
    NotTracked,

    /// The kernel refused to open a counter for the event, so there is no
    /// handle to read from.
    Unavailable,

    /// Opening the counter failed for a reason other than permissions or
    /// hardware support (typically file descriptor exhaustion).
    Open,

    /// The caller does not have the permissions required to open the counter.
    ///
    /// See `/proc/sys/kernel/perf_event_paranoid` and `CAP_PERFMON`.
    Forbidden,

    /// The CPU, kernel or platform does not support the requested counter.
    Unsupported,

    /// Reading the counter value from the kernel failed.
    Read,

    /// The event name does not match any known event description.
    UnknownEvent,

    /// A configuration value could not be parsed.
    InvalidConfig,
}

impl ErrorKind {
    fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NoEvents => "no events requested",
            ErrorKind::NotTracked => "trying to read a non tracked event",
            ErrorKind::Unavailable => "counter unavailable",
            ErrorKind::Open => "failed to open counter",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::Unsupported => "unsupported counter",
            ErrorKind::Read => "failed to read counter",
            ErrorKind::UnknownEvent => "unknown event",
            ErrorKind::InvalidConfig => "invalid configuration",
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self.cause {
            None => None,
            Some(ref b) => Some(b.as_ref()),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.cause {
            Some(ref cause) => write!(f, "{}: {}", self.kind.as_str(), cause),
            None => f.write_str(self.kind.as_str()),
        }
    }
}

#[doc(hidden)]
impl PartialEq for Error {
    fn eq(&self, other: &Error) -> bool {
        self.kind == other.kind
    }
}

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }
}

pub(crate) fn new_error(kind: ErrorKind) -> Error {
    Error { kind, cause: None }
}

pub(crate) fn new_error_with(
    kind: ErrorKind,
    cause: impl Into<Box<dyn error::Error + Send + Sync>>,
) -> Error {
    Error {
        kind,
        cause: Some(cause.into()),
    }
}

pub(crate) fn new_os_error(kind: ErrorKind, err: io::Error) -> Error {
    new_error_with(kind, err)
}

/// Classify a failed `perf_event_open` call.
pub(crate) fn open_error(err: io::Error) -> Error {
    let kind = match err.raw_os_error() {
        Some(libc::EACCES) | Some(libc::EPERM) => ErrorKind::Forbidden,
        Some(libc::ENOENT) | Some(libc::ENODEV) | Some(libc::EOPNOTSUPP) | Some(libc::EINVAL) => {
            ErrorKind::Unsupported
        }
        _ if err.kind() == io::ErrorKind::Unsupported => ErrorKind::Unsupported,
        _ => ErrorKind::Open,
    };
    new_os_error(kind, err)
}
