#![warn(missing_docs)]

//! `perf-stopwatch` counts hardware and software performance events across
//! arbitrary regions of code using a stopwatch metaphor.
//!
//! A [`PerfStopwatch`] is constructed with the [`Event`]s it should count.
//! [`restart`] clears the accumulated counts, [`play`] starts counting and
//! [`pause`] stops counting and adds the events seen since the last play to
//! the running totals.
//!
//! ```no_run
//! use perf_stopwatch::{Event, PerfStopwatch};
//!
//! let mut sw = PerfStopwatch::new(&[Event::CpuCycles, Event::L1dReadMisses])?;
//!
//! sw.play();
//! // do some stuff...
//! sw.pause();
//!
//! sw.print_all_counters();
//! #
//! # Ok::<(), perf_stopwatch::error::Error>(())
//! ```
//!
//! The kernel can only count a handful of hardware events at once, so every
//! stopwatch in the process shares one counter per event through the
//! process-wide [`Registry`]. Counters are opened on first use and closed
//! when the last stopwatch using them is dropped.
//!
//! Events the kernel refuses to count (typically because of
//! `kernel.perf_event_paranoid` or missing hardware support) log a warning
//! once and then read as zero, so the rest of a measurement is unaffected.
//!
//! `perf-stopwatch` uses the Linux [`perf_event_open`] interface. On other
//! platforms every event is unavailable.
//!
//! [`restart`]: struct.PerfStopwatch.html#method.restart
//! [`play`]: struct.PerfStopwatch.html#method.play
//! [`pause`]: struct.PerfStopwatch.html#method.pause
//! [`perf_event_open`]: https://man7.org/linux/man-pages/man2/perf_event_open.2.html
//!

#[macro_use]
extern crate lazy_static;

pub mod error;
pub mod sys;

mod config;
pub use self::config::CounterConfig;

mod event;
pub use self::event::{Event, EventDescriptor, EventType};

mod registry;
pub use self::registry::{Lease, Registry};

mod stopwatch;
pub use self::stopwatch::PerfStopwatch;

mod time;
pub use self::time::TimeStopwatch;
