use std::time::{Duration, Instant};

/// Measures wall-clock time with the same restart/play/pause interface as
/// [`PerfStopwatch`].
///
/// ```
/// # use perf_stopwatch::TimeStopwatch;
/// let mut sw = TimeStopwatch::new();
///
/// sw.play();
/// // do some stuff...
/// sw.pause();
///
/// assert!(sw.get_s() >= 0.0);
/// ```
///
/// [`PerfStopwatch`]: struct.PerfStopwatch.html
#[derive(Debug, Clone, Default)]
pub struct TimeStopwatch {
    // Last play timestamp, None while paused.
    start: Option<Instant>,
    total: Duration,
}

impl TimeStopwatch {
    /// Construct a restarted, paused stopwatch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the accumulated time to zero.
    pub fn restart(&mut self) {
        self.total = Duration::default();
    }

    /// Start counting time.
    pub fn play(&mut self) {
        self.start = Some(Instant::now());
    }

    /// Stop counting time, adding the time since the last [`play`] to the
    /// total. Has no effect on a paused stopwatch.
    ///
    /// [`play`]: #method.play
    pub fn pause(&mut self) {
        if let Some(start) = self.start.take() {
            self.total += start.elapsed();
        }
    }

    /// Returns true between a play and the following pause.
    pub fn is_running(&self) -> bool {
        self.start.is_some()
    }

    /// The accumulated time.
    pub fn elapsed(&self) -> Duration {
        self.total
    }

    /// The accumulated time in seconds.
    pub fn get_s(&self) -> f64 {
        self.total.as_secs_f64()
    }

    /// Print the accumulated seconds to stdout, without a trailing newline.
    pub fn print_s(&self) {
        print!("{:.6}", self.get_s());
    }
}
