//! The static catalog of countable events.

use std::fmt;
use std::str::FromStr;

use crate::error::{new_error_with, Error, ErrorKind};

/// A hardware or software event that a [`PerfStopwatch`] can count.
///
/// Every `Event` maps to exactly one kernel counter configuration in a static
/// table, see [`Event::descriptor`]. Events that the running CPU or kernel
/// cannot count are still valid values; they simply stay at zero.
///
/// [`PerfStopwatch`]: struct.PerfStopwatch.html
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Event {
    // Hardware events
    CpuCycles,
    Instructions,
    CacheReferences,
    CacheMisses,
    BranchInstructions,
    BranchMisses,
    BusCycles,
    StalledCyclesFrontend,
    StalledCyclesBackend,
    RefCpuCycles,

    // Cache read access
    L1dReadAccess,
    L1iReadAccess,
    LlReadAccess,
    DtlbReadAccess,
    ItlbReadAccess,
    BpuReadAccess,
    NodeReadAccess,

    // Cache read misses
    L1dReadMisses,
    L1iReadMisses,
    LlReadMisses,
    DtlbReadMisses,
    ItlbReadMisses,
    BpuReadMisses,
    NodeReadMisses,

    // Cache write access
    L1dWriteAccess,
    L1iWriteAccess,
    LlWriteAccess,
    DtlbWriteAccess,
    ItlbWriteAccess,
    BpuWriteAccess,
    NodeWriteAccess,

    // Cache write misses
    L1dWriteMisses,
    L1iWriteMisses,
    LlWriteMisses,
    DtlbWriteMisses,
    ItlbWriteMisses,
    BpuWriteMisses,
    NodeWriteMisses,

    // Cache prefetch access
    L1dPrefetchAccess,
    L1iPrefetchAccess,
    LlPrefetchAccess,
    DtlbPrefetchAccess,
    ItlbPrefetchAccess,
    BpuPrefetchAccess,
    NodePrefetchAccess,

    // Cache prefetch misses
    L1dPrefetchMisses,
    L1iPrefetchMisses,
    LlPrefetchMisses,
    DtlbPrefetchMisses,
    ItlbPrefetchMisses,
    BpuPrefetchMisses,
    NodePrefetchMisses,

    // Software events
    CpuClock,
    TaskClock,
    PageFaults,
    ContextSwitches,
    CpuMigrations,
    PageFaultsMin,
    PageFaultsMaj,
    AlignmentFaults,
    EmulationFaults,
    Dummy,
    BpfOutput,
}

/// The kernel counter domain (the `type` field of `perf_event_attr`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum EventType {
    /// Generalised hardware events (`PERF_TYPE_HARDWARE`).
    Hardware = 0,
    /// Kernel provided software events (`PERF_TYPE_SOFTWARE`).
    Software = 1,
    /// Hardware cache events (`PERF_TYPE_HW_CACHE`).
    HwCache = 3,
}

impl EventType {
    /// The raw `perf_event_attr.type` value.
    pub fn as_raw(self) -> u32 {
        self as u32
    }
}

/// Catalog entry describing how to configure the counter for an [`Event`].
#[derive(Debug, PartialEq, Eq)]
pub struct EventDescriptor {
    /// Counter domain.
    pub kind: EventType,
    /// Domain specific event selector (`perf_event_attr.config`).
    ///
    /// Cache events are encoded as `cache | (op << 8) | (result << 16)`.
    pub config: u64,
    /// Human readable label.
    pub description: &'static str,
}

// perf_hw_cache_id
const L1D: u64 = 0;
const L1I: u64 = 1;
const LL: u64 = 2;
const DTLB: u64 = 3;
const ITLB: u64 = 4;
const BPU: u64 = 5;
const NODE: u64 = 6;

// perf_hw_cache_op_id
const OP_READ: u64 = 0;
const OP_WRITE: u64 = 1;
const OP_PREFETCH: u64 = 2;

// perf_hw_cache_op_result_id
const RESULT_ACCESS: u64 = 0;
const RESULT_MISS: u64 = 1;

const fn hw(config: u64, description: &'static str) -> EventDescriptor {
    EventDescriptor {
        kind: EventType::Hardware,
        config,
        description,
    }
}

const fn cache(id: u64, op: u64, result: u64, description: &'static str) -> EventDescriptor {
    EventDescriptor {
        kind: EventType::HwCache,
        config: id | (op << 8) | (result << 16),
        description,
    }
}

const fn sw(config: u64, description: &'static str) -> EventDescriptor {
    EventDescriptor {
        kind: EventType::Software,
        config,
        description,
    }
}

// Indexed by `Event as usize`, this must match the variant order.
static DESCRIPTORS: [EventDescriptor; Event::COUNT] = [
    hw(0, "cpu cycles"),
    hw(1, "instructions"),
    hw(2, "cache references"),
    hw(3, "cache misses"),
    hw(4, "branch instructions"),
    hw(5, "branch misses"),
    hw(6, "bus cycles"),
    hw(7, "stalled cycles frontend"),
    hw(8, "stalled cycles backend"),
    hw(9, "ref cpu cycles"),
    cache(L1D, OP_READ, RESULT_ACCESS, "L1D read access"),
    cache(L1I, OP_READ, RESULT_ACCESS, "L1I read access"),
    cache(LL, OP_READ, RESULT_ACCESS, "LL read access"),
    cache(DTLB, OP_READ, RESULT_ACCESS, "DTLB read access"),
    cache(ITLB, OP_READ, RESULT_ACCESS, "ITLB read access"),
    cache(BPU, OP_READ, RESULT_ACCESS, "BPU read access"),
    cache(NODE, OP_READ, RESULT_ACCESS, "NODE read access"),
    cache(L1D, OP_READ, RESULT_MISS, "L1D read misses"),
    cache(L1I, OP_READ, RESULT_MISS, "L1I read misses"),
    cache(LL, OP_READ, RESULT_MISS, "LL read misses"),
    cache(DTLB, OP_READ, RESULT_MISS, "DTLB read misses"),
    cache(ITLB, OP_READ, RESULT_MISS, "ITLB read misses"),
    cache(BPU, OP_READ, RESULT_MISS, "BPU read misses"),
    cache(NODE, OP_READ, RESULT_MISS, "NODE read misses"),
    cache(L1D, OP_WRITE, RESULT_ACCESS, "L1D write access"),
    cache(L1I, OP_WRITE, RESULT_ACCESS, "L1I write access"),
    cache(LL, OP_WRITE, RESULT_ACCESS, "LL write access"),
    cache(DTLB, OP_WRITE, RESULT_ACCESS, "DTLB write access"),
    cache(ITLB, OP_WRITE, RESULT_ACCESS, "ITLB write access"),
    cache(BPU, OP_WRITE, RESULT_ACCESS, "BPU write access"),
    cache(NODE, OP_WRITE, RESULT_ACCESS, "NODE write access"),
    cache(L1D, OP_WRITE, RESULT_MISS, "L1D write misses"),
    cache(L1I, OP_WRITE, RESULT_MISS, "L1I write misses"),
    cache(LL, OP_WRITE, RESULT_MISS, "LL write misses"),
    cache(DTLB, OP_WRITE, RESULT_MISS, "DTLB write misses"),
    cache(ITLB, OP_WRITE, RESULT_MISS, "ITLB write misses"),
    cache(BPU, OP_WRITE, RESULT_MISS, "BPU write misses"),
    cache(NODE, OP_WRITE, RESULT_MISS, "NODE write misses"),
    cache(L1D, OP_PREFETCH, RESULT_ACCESS, "L1D prefetch access"),
    cache(L1I, OP_PREFETCH, RESULT_ACCESS, "L1I prefetch access"),
    cache(LL, OP_PREFETCH, RESULT_ACCESS, "LL prefetch access"),
    cache(DTLB, OP_PREFETCH, RESULT_ACCESS, "DTLB prefetch access"),
    cache(ITLB, OP_PREFETCH, RESULT_ACCESS, "ITLB prefetch access"),
    cache(BPU, OP_PREFETCH, RESULT_ACCESS, "BPU prefetch access"),
    cache(NODE, OP_PREFETCH, RESULT_ACCESS, "NODE prefetch access"),
    cache(L1D, OP_PREFETCH, RESULT_MISS, "L1D prefetch misses"),
    cache(L1I, OP_PREFETCH, RESULT_MISS, "L1I prefetch misses"),
    cache(LL, OP_PREFETCH, RESULT_MISS, "LL prefetch misses"),
    cache(DTLB, OP_PREFETCH, RESULT_MISS, "DTLB prefetch misses"),
    cache(ITLB, OP_PREFETCH, RESULT_MISS, "ITLB prefetch misses"),
    cache(BPU, OP_PREFETCH, RESULT_MISS, "BPU prefetch misses"),
    cache(NODE, OP_PREFETCH, RESULT_MISS, "NODE prefetch misses"),
    sw(0, "cpu clock"),
    sw(1, "task clock"),
    sw(2, "page faults"),
    sw(3, "context switches"),
    sw(4, "cpu migrations"),
    sw(5, "page faults min"),
    sw(6, "page faults maj"),
    sw(7, "alignment faults"),
    sw(8, "emulation faults"),
    sw(9, "dummy"),
    sw(10, "bpf output"),
];

impl Event {
    /// Number of distinct events.
    pub const COUNT: usize = 63;

    /// Every event, in declaration order.
    pub const ALL: [Event; Event::COUNT] = [
        Event::CpuCycles,
        Event::Instructions,
        Event::CacheReferences,
        Event::CacheMisses,
        Event::BranchInstructions,
        Event::BranchMisses,
        Event::BusCycles,
        Event::StalledCyclesFrontend,
        Event::StalledCyclesBackend,
        Event::RefCpuCycles,
        Event::L1dReadAccess,
        Event::L1iReadAccess,
        Event::LlReadAccess,
        Event::DtlbReadAccess,
        Event::ItlbReadAccess,
        Event::BpuReadAccess,
        Event::NodeReadAccess,
        Event::L1dReadMisses,
        Event::L1iReadMisses,
        Event::LlReadMisses,
        Event::DtlbReadMisses,
        Event::ItlbReadMisses,
        Event::BpuReadMisses,
        Event::NodeReadMisses,
        Event::L1dWriteAccess,
        Event::L1iWriteAccess,
        Event::LlWriteAccess,
        Event::DtlbWriteAccess,
        Event::ItlbWriteAccess,
        Event::BpuWriteAccess,
        Event::NodeWriteAccess,
        Event::L1dWriteMisses,
        Event::L1iWriteMisses,
        Event::LlWriteMisses,
        Event::DtlbWriteMisses,
        Event::ItlbWriteMisses,
        Event::BpuWriteMisses,
        Event::NodeWriteMisses,
        Event::L1dPrefetchAccess,
        Event::L1iPrefetchAccess,
        Event::LlPrefetchAccess,
        Event::DtlbPrefetchAccess,
        Event::ItlbPrefetchAccess,
        Event::BpuPrefetchAccess,
        Event::NodePrefetchAccess,
        Event::L1dPrefetchMisses,
        Event::L1iPrefetchMisses,
        Event::LlPrefetchMisses,
        Event::DtlbPrefetchMisses,
        Event::ItlbPrefetchMisses,
        Event::BpuPrefetchMisses,
        Event::NodePrefetchMisses,
        Event::CpuClock,
        Event::TaskClock,
        Event::PageFaults,
        Event::ContextSwitches,
        Event::CpuMigrations,
        Event::PageFaultsMin,
        Event::PageFaultsMaj,
        Event::AlignmentFaults,
        Event::EmulationFaults,
        Event::Dummy,
        Event::BpfOutput,
    ];

    /// Dense index of this event, in `0..Event::COUNT`.
    pub fn index(self) -> usize {
        self as usize
    }

    /// The catalog entry for this event.
    pub fn descriptor(self) -> &'static EventDescriptor {
        &DESCRIPTORS[self.index()]
    }

    /// The human readable label of this event, e.g. `"L1D read misses"`.
    pub fn description(self) -> &'static str {
        self.descriptor().description
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

impl FromStr for Event {
    type Err = Error;

    /// Parse an event from its description, ignoring ASCII case.
    ///
    /// ```
    /// # use perf_stopwatch::Event;
    /// let event: Event = "l1d read misses".parse()?;
    /// assert_eq!(event, Event::L1dReadMisses);
    /// # Ok::<(), perf_stopwatch::error::Error>(())
    /// ```
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Event::ALL
            .iter()
            .copied()
            .find(|e| e.description().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                new_error_with(ErrorKind::UnknownEvent, format!("no event named {:?}", s))
            })
    }
}
