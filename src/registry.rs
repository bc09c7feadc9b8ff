use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, error, warn};

use crate::config::CounterConfig;
use crate::error::{new_error, new_os_error, open_error, Error, ErrorKind};
use crate::event::Event;
use crate::sys::{Backend, Handle, PerfBackend};

lazy_static! {
    static ref GLOBAL: Arc<Registry> = Arc::new(Registry::new(global_config()));
}

fn global_config() -> CounterConfig {
    CounterConfig::from_env().unwrap_or_else(|e| {
        warn!(error = %e, "ignoring invalid counter configuration, using defaults");
        CounterConfig::default()
    })
}

#[derive(Default)]
struct Entry {
    // None if the event is unreferenced or the kernel refused to open it.
    handle: Option<Box<dyn Handle>>,
    refs: usize,
}

/// The set of kernel counters shared by every [`PerfStopwatch`].
///
/// The number of hardware counters that can be open at once is small, so at
/// most one counter is opened per [`Event`] and it is shared by reference
/// counting. The counter is opened when the first [`Lease`] for the event is
/// taken and closed again when the last one is dropped.
///
/// Most programs use the process-wide instance returned by
/// [`Registry::global`].
///
/// # Threads
///
/// Counters measure the thread that opened them (and, by default, any task it
/// spawns afterwards). Drive all stopwatches sharing a registry from a single
/// controlling thread.
///
/// [`PerfStopwatch`]: struct.PerfStopwatch.html
/// [`Lease`]: struct.Lease.html
pub struct Registry {
    config: CounterConfig,
    backend: Box<dyn Backend>,
    entries: Mutex<Vec<Entry>>,
}

impl Registry {
    /// The process-wide registry.
    ///
    /// It is configured from the environment on first use, see
    /// [`CounterConfig::from_env`].
    ///
    /// [`CounterConfig::from_env`]: struct.CounterConfig.html#method.from_env
    pub fn global() -> Arc<Registry> {
        Arc::clone(&GLOBAL)
    }

    /// Construct an independent registry using `perf_event`.
    pub fn new(config: CounterConfig) -> Self {
        Self::with_backend(config, Box::new(PerfBackend))
    }

    /// Construct an independent registry that opens counters through
    /// `backend`.
    pub fn with_backend(config: CounterConfig, backend: Box<dyn Backend>) -> Self {
        let mut entries = Vec::with_capacity(Event::COUNT);
        entries.resize_with(Event::COUNT, Entry::default);

        Self {
            config,
            backend,
            entries: Mutex::new(entries),
        }
    }

    /// The configuration counters are opened with.
    pub fn config(&self) -> &CounterConfig {
        &self.config
    }

    /// Acquire `event`, returning a [`Lease`] that releases it when dropped.
    ///
    /// Failing to open the counter is not an error: the lease is still
    /// returned and the event reads as unavailable.
    ///
    /// [`Lease`]: struct.Lease.html
    pub fn lease(self: &Arc<Self>, event: Event) -> Lease {
        self.acquire(event);
        Lease {
            registry: Arc::clone(self),
            event,
        }
    }

    /// Returns true if a counter for `event` is currently open.
    pub fn is_available(&self, event: Event) -> bool {
        self.lock()[event.index()].handle.is_some()
    }

    /// The number of live leases for `event`.
    pub fn ref_count(&self, event: Event) -> usize {
        self.lock()[event.index()].refs
    }

    /// Read the current value of the counter for `event`.
    ///
    /// Returns [`ErrorKind::Unavailable`] if no counter is open, and
    /// [`ErrorKind::Read`] if the kernel read fails.
    ///
    /// [`ErrorKind::Unavailable`]: error/enum.ErrorKind.html#variant.Unavailable
    /// [`ErrorKind::Read`]: error/enum.ErrorKind.html#variant.Read
    pub fn read(&self, event: Event) -> Result<u64, Error> {
        let entries = self.lock();
        let handle = match entries[event.index()].handle {
            Some(ref h) => h,
            None => return Err(new_error(ErrorKind::Unavailable)),
        };

        handle.read().map_err(|e| {
            warn!(counter = %event, error = %e, "error reading perf event");
            new_os_error(ErrorKind::Read, e)
        })
    }

    /// Stop every open counter in the registry.
    pub fn suspend_all(&self) {
        self.for_each_handle(|event, handle| {
            if let Err(e) = handle.disable() {
                debug!(counter = %event, error = %e, "error disabling counter");
            }
        });
    }

    /// Restart every open counter in the registry.
    pub fn resume_all(&self) {
        self.for_each_handle(|event, handle| {
            if let Err(e) = handle.enable() {
                debug!(counter = %event, error = %e, "error enabling counter");
            }
        });
    }

    fn for_each_handle<F>(&self, mut f: F)
    where
        F: FnMut(Event, &dyn Handle),
    {
        let entries = self.lock();
        for (event, entry) in Event::ALL.iter().zip(entries.iter()) {
            if let Some(ref handle) = entry.handle {
                f(*event, handle.as_ref());
            }
        }
    }

    fn acquire(&self, event: Event) {
        let mut entries = self.lock();
        let entry = &mut entries[event.index()];

        if entry.refs == 0 {
            entry.handle = self.open(event);
        }
        entry.refs += 1;
    }

    fn release(&self, event: Event) {
        let mut entries = self.lock();
        let entry = &mut entries[event.index()];

        if entry.refs == 0 {
            debug_assert!(false, "release of unacquired event {:?}", event);
            error!(counter = %event, "release of unacquired counter");
            return;
        }

        entry.refs -= 1;
        if entry.refs > 0 {
            return;
        }

        // "Turn off" the no longer needed counter.
        if let Some(handle) = entry.handle.take() {
            if let Err(e) = handle.disable() {
                debug!(counter = %event, error = %e, "error disabling counter");
            }
            debug!(counter = %event, "closed counter");
        }
    }

    fn open(&self, event: Event) -> Option<Box<dyn Handle>> {
        let descriptor = event.descriptor();

        let opened = self
            .backend
            .open(descriptor, &self.config)
            .and_then(|handle| {
                handle.reset()?;
                Ok(handle)
            });

        match opened {
            Ok(handle) => {
                debug!(counter = %event, "opened counter");
                Some(handle)
            }
            Err(e) => {
                let err = open_error(e);
                warn!(
                    counter = %event,
                    config = format_args!("{:#x}", descriptor.config),
                    error = %err,
                    "error opening counter"
                );
                None
            }
        }
    }

    // A panic while holding the lock cannot leave an entry half updated.
    fn lock(&self) -> MutexGuard<'_, Vec<Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.lock();
        let live: Vec<_> = Event::ALL
            .iter()
            .zip(entries.iter())
            .filter(|(_, e)| e.refs > 0)
            .map(|(event, e)| (*event, e.refs, e.handle.is_some()))
            .collect();

        f.debug_struct("Registry")
            .field("config", &self.config)
            .field("live", &live)
            .finish()
    }
}

/// A reference counted claim on the counter for one [`Event`].
///
/// Cloning a lease acquires the event again, dropping it releases the claim.
/// The counter is closed once the last lease for its event is dropped.
///
/// ```
/// # use std::sync::Arc;
/// # use perf_stopwatch::{CounterConfig, Event, Registry};
/// let registry = Arc::new(Registry::new(CounterConfig::default()));
///
/// let a = registry.lease(Event::TaskClock);
/// let b = a.clone();
/// assert_eq!(registry.ref_count(Event::TaskClock), 2);
///
/// drop(a);
/// drop(b);
/// assert_eq!(registry.ref_count(Event::TaskClock), 0);
/// assert!(!registry.is_available(Event::TaskClock));
/// ```
#[derive(Debug)]
pub struct Lease {
    registry: Arc<Registry>,
    event: Event,
}

impl Lease {
    /// The leased event.
    pub fn event(&self) -> Event {
        self.event
    }

    /// The registry this lease was taken from.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Returns true if the kernel counter for this event is open.
    pub fn is_available(&self) -> bool {
        self.registry.is_available(self.event)
    }
}

impl Clone for Lease {
    fn clone(&self) -> Self {
        self.registry.lease(self.event)
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.registry.release(self.event);
    }
}
