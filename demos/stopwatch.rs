extern crate perf_stopwatch;

use std::env;

use perf_stopwatch::{Event, PerfStopwatch, TimeStopwatch};

fn main() {
    tracing_subscriber::fmt::init();

    // Events may be named on the command line, e.g. "cpu cycles" "L1D read misses"
    let mut events = env::args()
        .skip(1)
        .map(|arg| arg.parse::<Event>())
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    if events.is_empty() {
        events = vec![
            Event::CpuCycles,
            Event::Instructions,
            Event::L1dReadMisses,
            Event::TaskClock,
            Event::PageFaults,
        ];
    }

    let mut counters = PerfStopwatch::new(&events).unwrap();
    let mut time = TimeStopwatch::new();

    let mut v: Vec<u64> = Vec::new();
    for i in 1..10 {
        counters.play();
        time.play();

        // do some stuff...
        v.extend((0..100_000u64).map(|x| x * i));
        v.sort_unstable();

        time.pause();
        counters.pause();
    }

    counters.print_all_counters();
    print!("{:>16}: ", "seconds");
    time.print_s();
    println!();
}
