//! The kernel side of a counter.
//!
//! [`Registry`] talks to the kernel exclusively through the [`Backend`] and
//! [`Handle`] traits so that the accounting logic can be exercised without
//! access to the performance monitoring unit. [`PerfBackend`] is the real
//! implementation built on `perf_event_open(2)`.
//!
//! [`Registry`]: ../struct.Registry.html

use std::io;

use crate::config::CounterConfig;
use crate::event::EventDescriptor;

/// An open kernel counter.
///
/// Dropping the handle closes the underlying counter.
pub trait Handle: Send {
    /// Start counting.
    fn enable(&self) -> io::Result<()>;

    /// Stop counting. The current value is retained.
    fn disable(&self) -> io::Result<()>;

    /// Set the counter value to zero.
    fn reset(&self) -> io::Result<()>;

    /// Read the current counter value.
    fn read(&self) -> io::Result<u64>;
}

/// Opens kernel counters.
pub trait Backend: Send + Sync {
    /// Open a counter for `descriptor`, initially disabled.
    fn open(&self, descriptor: &EventDescriptor, config: &CounterConfig)
        -> io::Result<Box<dyn Handle>>;
}

/// [`Backend`] using the Linux `perf_event` subsystem.
///
/// On other platforms every open fails with [`io::ErrorKind::Unsupported`].
///
/// # Permissions
///
/// Opening hardware counters typically requires `CAP_PERFMON` or a
/// `kernel.perf_event_paranoid` value of 2 or lower.
#[derive(Debug, Default, Clone, Copy)]
pub struct PerfBackend;

#[cfg(target_os = "linux")]
impl Backend for PerfBackend {
    fn open(
        &self,
        descriptor: &EventDescriptor,
        config: &CounterConfig,
    ) -> io::Result<Box<dyn Handle>> {
        Ok(Box::new(linux::PerfHandle::open(descriptor, config)?))
    }
}

#[cfg(not(target_os = "linux"))]
impl Backend for PerfBackend {
    fn open(
        &self,
        _descriptor: &EventDescriptor,
        _config: &CounterConfig,
    ) -> io::Result<Box<dyn Handle>> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "perf_event is only implemented on Linux",
        ))
    }
}

#[cfg(target_os = "linux")]
mod linux {
    use std::convert::TryInto;
    use std::fs::File;
    use std::io::{self, Read};
    use std::mem;
    use std::os::unix::io::{AsRawFd, FromRawFd};

    use perf_event_open_sys::bindings::{perf_event_attr, PERF_FLAG_FD_CLOEXEC};
    use perf_event_open_sys::{ioctls, perf_event_open};

    use super::Handle;
    use crate::config::CounterConfig;
    use crate::event::EventDescriptor;

    #[derive(Debug)]
    pub(super) struct PerfHandle {
        file: File,
    }

    impl PerfHandle {
        pub(super) fn open(
            descriptor: &EventDescriptor,
            config: &CounterConfig,
        ) -> io::Result<Self> {
            let mut attrs = perf_event_attr {
                size: mem::size_of::<perf_event_attr>()
                    .try_into()
                    .map_err(|_| io::Error::from(io::ErrorKind::InvalidInput))?,
                type_: descriptor.kind.as_raw(),
                config: descriptor.config,
                ..perf_event_attr::default()
            };

            // Counting starts on the first enable, not on open.
            attrs.set_disabled(1);
            attrs.set_exclude_kernel(config.excludes_kernel() as u64);
            attrs.set_exclude_hv(config.excludes_hv() as u64);
            attrs.set_inherit(config.inherits() as u64);

            let fd = unsafe {
                perf_event_open(
                    &mut attrs,
                    config.pid(),
                    config.cpu(),
                    -1,
                    PERF_FLAG_FD_CLOEXEC.into(),
                )
            };
            if fd < 0 {
                return Err(io::Error::last_os_error());
            }

            // The descriptor is exclusively owned from here on, dropping the
            // file closes the counter.
            Ok(Self {
                file: unsafe { File::from_raw_fd(fd) },
            })
        }

        fn check(ret: libc::c_int) -> io::Result<()> {
            if ret < 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        }
    }

    impl Handle for PerfHandle {
        fn enable(&self) -> io::Result<()> {
            Self::check(unsafe { ioctls::ENABLE(self.file.as_raw_fd(), 0) })
        }

        fn disable(&self) -> io::Result<()> {
            Self::check(unsafe { ioctls::DISABLE(self.file.as_raw_fd(), 0) })
        }

        fn reset(&self) -> io::Result<()> {
            Self::check(unsafe { ioctls::RESET(self.file.as_raw_fd(), 0) })
        }

        fn read(&self) -> io::Result<u64> {
            let mut buf = [0u8; 8];
            (&self.file).read_exact(&mut buf)?;
            Ok(u64::from_ne_bytes(buf))
        }
    }
}
