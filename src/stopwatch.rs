use std::fmt;
use std::io;
use std::mem;
use std::sync::Arc;

use tracing::debug;

use crate::error::{new_error, Error, ErrorKind};
use crate::event::Event;
use crate::registry::{Lease, Registry};

#[derive(Debug, Clone)]
struct Slot {
    lease: Lease,
    // Counter value at the last play.
    start: u64,
    // Sum of every play/pause interval since the last restart.
    total: u64,
}

/// Counts hardware and software events the same way a stopwatch counts time.
///
/// [`restart`] clears the accumulated counts, [`play`] starts counting and
/// [`pause`] stops counting, adding the events seen since the last play to
/// the running totals.
///
/// ```no_run
/// use perf_stopwatch::{Event, PerfStopwatch};
///
/// let mut sw = PerfStopwatch::new(&[Event::CpuCycles, Event::CacheMisses])?;
///
/// sw.play();
/// // do some stuff...
/// sw.pause();
///
/// println!("cpu cycles: {}", sw.get_counter(Event::CpuCycles)?);
/// sw.print_all_counters();
/// #
/// # Ok::<(), perf_stopwatch::error::Error>(())
/// ```
///
/// # Shared counters
///
/// The kernel counters are owned by a [`Registry`] and shared by every
/// stopwatch counting the same event. Cloning a stopwatch takes another
/// reference on each of its events and copies the accumulated counts, after
/// which both copies count independently.
///
/// Events the kernel refuses to count (missing permissions, unsupported
/// hardware) are not an error: they stay at zero and are left out of
/// [`print_all_counters`].
///
/// [`restart`]: #method.restart
/// [`play`]: #method.play
/// [`pause`]: #method.pause
/// [`print_all_counters`]: #method.print_all_counters
/// [`Registry`]: struct.Registry.html
#[derive(Debug, Clone)]
pub struct PerfStopwatch {
    registry: Arc<Registry>,
    slots: Vec<Slot>,
    running: bool,
}

impl PerfStopwatch {
    /// Initialise a stopwatch counting `events` on the process-wide
    /// [`Registry`]. The stopwatch starts restarted and paused.
    ///
    /// Returns [`ErrorKind::NoEvents`] if `events` is empty. Repeated events
    /// are counted once.
    ///
    /// [`Registry`]: struct.Registry.html
    /// [`ErrorKind::NoEvents`]: error/enum.ErrorKind.html#variant.NoEvents
    pub fn new(events: &[Event]) -> Result<Self, Error> {
        Self::with_registry(&Registry::global(), events)
    }

    /// Initialise a stopwatch counting `events` on `registry`.
    pub fn with_registry(registry: &Arc<Registry>, events: &[Event]) -> Result<Self, Error> {
        if events.is_empty() {
            return Err(new_error(ErrorKind::NoEvents));
        }

        let mut slots: Vec<Slot> = Vec::with_capacity(events.len());
        for &event in events {
            if slots.iter().any(|s| s.lease.event() == event) {
                continue;
            }
            slots.push(Slot {
                lease: registry.lease(event),
                start: 0,
                total: 0,
            });
        }

        let mut sw = Self {
            registry: Arc::clone(registry),
            slots,
            running: false,
        };
        sw.restart();

        Ok(sw)
    }

    /// Set every accumulated count to zero.
    ///
    /// The baselines taken by the last [`play`] are kept, so restarting a
    /// running stopwatch still adds the whole interval since that play at the
    /// next [`pause`]. Restart a paused stopwatch to start from zero.
    ///
    /// [`play`]: #method.play
    /// [`pause`]: #method.pause
    pub fn restart(&mut self) {
        for slot in &mut self.slots {
            slot.total = 0;
        }
    }

    /// Start counting events.
    ///
    /// Calling `play` on a running stopwatch has no effect.
    pub fn play(&mut self) {
        if self.running {
            debug!("play called on a running stopwatch, ignoring");
            return;
        }

        self.registry.suspend_all();

        for slot in &mut self.slots {
            // Unavailable events are skipped, read errors are logged by the
            // registry and keep the previous baseline.
            if let Ok(value) = self.registry.read(slot.lease.event()) {
                slot.start = value;
            }
        }

        self.registry.resume_all();
        self.running = true;
    }

    /// Stop counting events, adding the events counted since the last
    /// [`play`] to the accumulated counts.
    ///
    /// Calling `pause` on a paused stopwatch has no effect.
    ///
    /// [`play`]: #method.play
    pub fn pause(&mut self) {
        if !self.running {
            debug!("pause called on a paused stopwatch, ignoring");
            return;
        }

        self.registry.suspend_all();

        for slot in &mut self.slots {
            if let Ok(value) = self.registry.read(slot.lease.event()) {
                slot.total += value.saturating_sub(slot.start);
            }
        }

        self.registry.resume_all();
        self.running = false;
    }

    /// Returns true between a [`play`] and the following [`pause`].
    ///
    /// [`play`]: #method.play
    /// [`pause`]: #method.pause
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// The accumulated count for `event`.
    ///
    /// Returns [`ErrorKind::NotTracked`] if the stopwatch was not constructed
    /// with `event`. Events the kernel could not count return 0.
    ///
    /// [`ErrorKind::NotTracked`]: error/enum.ErrorKind.html#variant.NotTracked
    pub fn get_counter(&self, event: Event) -> Result<u64, Error> {
        self.slots
            .iter()
            .find(|s| s.lease.event() == event)
            .map(|s| s.total)
            .ok_or_else(|| new_error(ErrorKind::NotTracked))
    }

    /// The description of `event`, e.g. `"cpu cycles"`.
    pub fn get_descriptor(event: Event) -> &'static str {
        event.description()
    }

    /// The events this stopwatch counts, in construction order.
    pub fn events(&self) -> impl Iterator<Item = Event> + '_ {
        self.slots.iter().map(|s| s.lease.event())
    }

    /// The accumulated count of every event the kernel is counting.
    pub fn counters(&self) -> impl Iterator<Item = (Event, u64)> + '_ {
        self.slots
            .iter()
            .filter(|s| s.lease.is_available())
            .map(|s| (s.lease.event(), s.total))
    }

    /// The registry the stopwatch's counters live in.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Write one `"<description>: <count>"` line per counted event to `out`.
    pub fn write_counters<W: io::Write>(&self, mut out: W) -> io::Result<()> {
        write!(out, "{}", self)
    }

    /// Print the counter of every counted event to stdout.
    pub fn print_all_counters(&self) {
        print!("{}", self);
    }

    /// Exchange the events and counts of two stopwatches.
    ///
    /// No references are taken or released.
    pub fn swap(&mut self, other: &mut PerfStopwatch) {
        mem::swap(self, other);
    }
}

impl fmt::Display for PerfStopwatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (event, total) in self.counters() {
            writeln!(f, "{:>16}: {:>14}", event.description(), total)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CounterConfig;
    use crate::sys::fake::{FakeBackend, FakeState};

    use std::sync::atomic::{AtomicUsize, Ordering};
    use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

    fn registry() -> (Arc<Registry>, Arc<FakeState>) {
        let backend = FakeBackend::default();
        let state = backend.state();
        (
            Arc::new(Registry::with_backend(
                CounterConfig::default(),
                Box::new(backend),
            )),
            state,
        )
    }

    struct WarnCounter(Arc<AtomicUsize>);

    impl<S: tracing::Subscriber> Layer<S> for WarnCounter {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
            if *event.metadata().level() == tracing::Level::WARN {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[test]
    fn test_empty_events_rejected() {
        let (registry, _) = registry();
        let err = PerfStopwatch::with_registry(&registry, &[]).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::NoEvents);
    }

    #[test]
    fn test_play_pause_accumulates() {
        let (registry, state) = registry();
        let mut sw =
            PerfStopwatch::with_registry(&registry, &[Event::CpuCycles, Event::CacheMisses])
                .unwrap();

        // Counts outside of play/pause are not accumulated.
        state.advance(7);

        sw.play();
        assert!(sw.is_running());
        state.advance(100);
        sw.pause();
        assert!(!sw.is_running());

        state.advance(50);

        sw.play();
        state.advance(10);
        sw.pause();

        assert_eq!(sw.get_counter(Event::CpuCycles).unwrap(), 110);
        assert_eq!(sw.get_counter(Event::CacheMisses).unwrap(), 110);
    }

    #[test]
    fn test_restart_zeroes_totals() {
        let (registry, state) = registry();
        let mut sw = PerfStopwatch::with_registry(&registry, &[Event::Instructions]).unwrap();

        sw.play();
        state.advance(42);
        sw.pause();
        assert_eq!(sw.get_counter(Event::Instructions).unwrap(), 42);

        sw.restart();
        assert_eq!(sw.get_counter(Event::Instructions).unwrap(), 0);

        sw.play();
        state.advance(3);
        sw.pause();
        assert_eq!(sw.get_counter(Event::Instructions).unwrap(), 3);
    }

    #[test]
    fn test_untracked_event() {
        let (registry, _) = registry();
        let sw = PerfStopwatch::with_registry(&registry, &[Event::CpuCycles]).unwrap();

        let err = sw.get_counter(Event::Instructions).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::NotTracked);
    }

    #[test]
    fn test_play_and_pause_are_not_reentrant() {
        let (registry, state) = registry();
        let mut sw = PerfStopwatch::with_registry(&registry, &[Event::BranchMisses]).unwrap();

        // A pause without play must not add anything.
        state.advance(9);
        sw.pause();
        assert_eq!(sw.get_counter(Event::BranchMisses).unwrap(), 0);

        sw.play();
        state.advance(4);
        // The second play keeps the first baseline.
        sw.play();
        state.advance(4);
        sw.pause();
        sw.pause();

        assert_eq!(sw.get_counter(Event::BranchMisses).unwrap(), 8);
    }

    #[test]
    fn test_shared_counters_refcount() {
        let (registry, state) = registry();

        let a = PerfStopwatch::with_registry(&registry, &[Event::CpuCycles]).unwrap();
        let b =
            PerfStopwatch::with_registry(&registry, &[Event::CpuCycles, Event::TaskClock]).unwrap();

        assert_eq!(registry.ref_count(Event::CpuCycles), 2);
        assert_eq!(registry.ref_count(Event::TaskClock), 1);
        assert_eq!(state.open_handles(Event::CpuCycles), 1);

        drop(a);
        assert_eq!(registry.ref_count(Event::CpuCycles), 1);
        assert!(registry.is_available(Event::CpuCycles));

        drop(b);
        assert_eq!(registry.ref_count(Event::CpuCycles), 0);
        assert_eq!(registry.ref_count(Event::TaskClock), 0);
        assert_eq!(state.open_handles(Event::CpuCycles), 0);
        assert_eq!(state.open_handles(Event::TaskClock), 0);
    }

    #[test]
    fn test_duplicate_events_counted_once() {
        let (registry, _) = registry();
        let sw = PerfStopwatch::with_registry(
            &registry,
            &[Event::PageFaults, Event::CpuClock, Event::PageFaults],
        )
        .unwrap();

        assert_eq!(
            sw.events().collect::<Vec<_>>(),
            vec![Event::PageFaults, Event::CpuClock]
        );
        assert_eq!(registry.ref_count(Event::PageFaults), 1);
    }

    #[test]
    fn test_clone_copies_totals_and_acquires() {
        let (registry, state) = registry();
        let mut a = PerfStopwatch::with_registry(&registry, &[Event::CpuCycles]).unwrap();

        a.play();
        state.advance(20);
        a.pause();

        let mut b = a.clone();
        assert_eq!(registry.ref_count(Event::CpuCycles), 2);
        assert_eq!(state.opens(), 1);
        assert_eq!(b.get_counter(Event::CpuCycles).unwrap(), 20);

        b.play();
        state.advance(5);
        b.pause();

        assert_eq!(a.get_counter(Event::CpuCycles).unwrap(), 20);
        assert_eq!(b.get_counter(Event::CpuCycles).unwrap(), 25);

        drop(a);
        drop(b);
        assert_eq!(registry.ref_count(Event::CpuCycles), 0);
    }

    #[test]
    fn test_move_keeps_refcount() {
        let (registry, state) = registry();
        let mut a = PerfStopwatch::with_registry(&registry, &[Event::ContextSwitches]).unwrap();

        a.play();
        state.advance(2);
        a.pause();

        let b = a;
        assert_eq!(registry.ref_count(Event::ContextSwitches), 1);
        assert_eq!(b.get_counter(Event::ContextSwitches).unwrap(), 2);

        let boxed = Box::new(b);
        assert_eq!(registry.ref_count(Event::ContextSwitches), 1);

        drop(boxed);
        assert_eq!(registry.ref_count(Event::ContextSwitches), 0);
    }

    #[test]
    fn test_clone_from_releases_old_events() {
        let (registry, _) = registry();
        let a = PerfStopwatch::with_registry(&registry, &[Event::CpuCycles]).unwrap();
        let mut b = PerfStopwatch::with_registry(&registry, &[Event::Instructions]).unwrap();

        b.clone_from(&a);

        assert_eq!(registry.ref_count(Event::CpuCycles), 2);
        assert_eq!(registry.ref_count(Event::Instructions), 0);
        assert!(b.get_counter(Event::Instructions).is_err());
    }

    #[test]
    fn test_clone_from_shared_event_stays_open() {
        let (registry, state) = registry();
        let source = PerfStopwatch::with_registry(&registry, &[Event::CpuCycles]).unwrap();
        let mut sw =
            PerfStopwatch::with_registry(&registry, &[Event::CpuCycles, Event::TaskClock]).unwrap();
        assert_eq!(state.opens(), 2);

        // The new lease is taken before the old one is dropped, so the shared
        // counter is never closed and reopened.
        sw.clone_from(&source);
        assert_eq!(registry.ref_count(Event::CpuCycles), 2);
        assert_eq!(registry.ref_count(Event::TaskClock), 0);

        drop(source);
        assert_eq!(registry.ref_count(Event::CpuCycles), 1);
        assert_eq!(state.opens(), 2);
        assert_eq!(state.open_handles(Event::CpuCycles), 1);
        assert!(sw.get_counter(Event::TaskClock).is_err());
    }

    #[test]
    fn test_swap() {
        let (registry, state) = registry();
        let mut a = PerfStopwatch::with_registry(&registry, &[Event::CpuCycles]).unwrap();
        let mut b = PerfStopwatch::with_registry(&registry, &[Event::BusCycles]).unwrap();

        a.play();
        state.advance(11);
        a.pause();

        a.swap(&mut b);

        assert_eq!(b.get_counter(Event::CpuCycles).unwrap(), 11);
        assert!(a.get_counter(Event::CpuCycles).is_err());
        assert_eq!(a.get_counter(Event::BusCycles).unwrap(), 0);
        assert_eq!(registry.ref_count(Event::CpuCycles), 1);
        assert_eq!(registry.ref_count(Event::BusCycles), 1);
    }

    #[test]
    fn test_play_suspends_every_counter() {
        let (registry, state) = registry();
        let mut a = PerfStopwatch::with_registry(&registry, &[Event::CpuCycles]).unwrap();
        let _b = PerfStopwatch::with_registry(&registry, &[Event::PageFaults]).unwrap();

        assert!(!state.is_enabled(Event::PageFaults));
        a.play();
        assert!(state.is_enabled(Event::CpuCycles));
        assert!(state.is_enabled(Event::PageFaults));
    }

    #[test]
    fn test_unavailable_event() {
        let (registry, state) = registry();
        state.fail_open(Event::StalledCyclesBackend);

        let warnings = Arc::new(AtomicUsize::new(0));
        let subscriber = tracing_subscriber::registry().with(WarnCounter(Arc::clone(&warnings)));

        tracing::subscriber::with_default(subscriber, || {
            let mut sw = PerfStopwatch::with_registry(
                &registry,
                &[Event::CpuCycles, Event::StalledCyclesBackend],
            )
            .unwrap();

            sw.play();
            state.advance(30);
            sw.pause();

            assert_eq!(sw.get_counter(Event::StalledCyclesBackend).unwrap(), 0);
            assert_eq!(sw.get_counter(Event::CpuCycles).unwrap(), 30);
            assert_eq!(
                sw.counters().collect::<Vec<_>>(),
                vec![(Event::CpuCycles, 30)]
            );
        });

        assert_eq!(warnings.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_read_failure_keeps_total() {
        let (registry, state) = registry();
        let mut sw = PerfStopwatch::with_registry(&registry, &[Event::CpuCycles]).unwrap();

        sw.play();
        state.advance(10);
        sw.pause();

        sw.play();
        state.advance(10);
        state.fail_reads(true);
        sw.pause();
        state.fail_reads(false);

        assert_eq!(sw.get_counter(Event::CpuCycles).unwrap(), 10);
    }

    #[test]
    fn test_restart_while_running_keeps_baseline() {
        let (registry, state) = registry();
        let mut sw = PerfStopwatch::with_registry(&registry, &[Event::CpuCycles]).unwrap();

        sw.play();
        state.advance(100);
        sw.restart();
        assert_eq!(sw.get_counter(Event::CpuCycles).unwrap(), 0);
        assert!(sw.is_running());

        state.advance(1);
        sw.pause();

        assert_eq!(sw.get_counter(Event::CpuCycles).unwrap(), 101);
    }

    #[test]
    fn test_read_failure_at_play_keeps_baseline() {
        let (registry, state) = registry();
        let mut sw = PerfStopwatch::with_registry(&registry, &[Event::CpuCycles]).unwrap();

        // Baseline 0, total 10, counter left at 10.
        sw.play();
        state.advance(10);
        sw.pause();
        state.advance(5);

        let warnings = Arc::new(AtomicUsize::new(0));
        let subscriber = tracing_subscriber::registry().with(WarnCounter(Arc::clone(&warnings)));

        tracing::subscriber::with_default(subscriber, || {
            state.fail_reads(true);
            sw.play();
            state.fail_reads(false);
        });
        assert_eq!(warnings.load(Ordering::SeqCst), 1);

        state.advance(10);
        sw.pause();

        // The stale baseline of 0 is used: 10 + (25 - 0).
        assert_eq!(sw.get_counter(Event::CpuCycles).unwrap(), 35);
    }

    #[test]
    fn test_read_failure_warns_once_per_event() {
        let (registry, state) = registry();
        let mut sw =
            PerfStopwatch::with_registry(&registry, &[Event::CpuCycles, Event::Instructions])
                .unwrap();
        sw.play();
        state.advance(3);

        let warnings = Arc::new(AtomicUsize::new(0));
        let subscriber = tracing_subscriber::registry().with(WarnCounter(Arc::clone(&warnings)));

        tracing::subscriber::with_default(subscriber, || {
            state.fail_reads(true);
            sw.pause();
        });

        assert_eq!(warnings.load(Ordering::SeqCst), 2);
        assert_eq!(sw.get_counter(Event::CpuCycles).unwrap(), 0);
        assert_eq!(sw.get_counter(Event::Instructions).unwrap(), 0);
    }

    #[test]
    fn test_write_counters_format() {
        let (registry, state) = registry();
        state.fail_open(Event::DtlbReadMisses);

        let mut sw = PerfStopwatch::with_registry(
            &registry,
            &[Event::CpuCycles, Event::DtlbReadMisses, Event::L1dReadMisses],
        )
        .unwrap();

        sw.play();
        state.advance(1234);
        sw.pause();

        let mut out = Vec::new();
        sw.write_counters(&mut out).unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            concat!(
                "      cpu cycles:           1234\n",
                " L1D read misses:           1234\n",
            )
        );
    }

    #[test]
    fn test_get_descriptor() {
        let (registry, _) = registry();
        let before = PerfStopwatch::get_descriptor(Event::LlReadMisses);
        let _sw = PerfStopwatch::with_registry(&registry, &[Event::LlReadMisses]).unwrap();

        assert_eq!(before, "LL read misses");
        assert_eq!(PerfStopwatch::get_descriptor(Event::LlReadMisses), before);
    }
}
