//! Bounded, allocation-free heap tracker.
//!
//! `heaptrace` records every live heap allocation of a process in a fixed-size table: address,
//! attributed call site, size and age in ticks. Protocol violations such as double frees,
//! frees of unknown pointers or a full table stop the process after dumping the table, and
//! growth past a configured ceiling dumps the table as it was at the heap's high-water mark.
//!
//! The tracker never allocates, so it can sit behind the global allocator it observes. See
//! [`TracingAllocator`] for the usual setup and the `heaptrace` binary for reading dumps back.
//!
//! Tracking is compiled in with the `heaptrace` feature. Without it the allocator forwards
//! straight to the inner allocator and `#[heaptrace::main]` / `#[heaptrace::track]` leave
//! functions untouched, so instrumented code can stay in place in release builds.

pub use heaptrace_macros::{main, track};

mod allocator;
pub mod analysis;
mod call_site;
mod config;
mod dispatch;
pub mod dump;
mod event;
mod fault;
mod gate;
mod order;
pub mod output;
mod platform;
mod record;
mod report;
mod snapshot;
mod table;
mod ticker;
mod tracker;

pub use allocator::TracingAllocator;
pub use call_site::{CallSite, CallSiteGuard};
pub use config::{DEFAULT_CAPACITY, TrackerConfig};
pub use event::{TraceEvent, TraceOp};
pub use fault::Fault;
pub use gate::ConcurrencyGate;
pub use order::OrderedView;
pub use platform::{
    ArenaStats, HeapCounters, HeapStats, LINE_CAPACITY, Platform, StdPlatform, render_line,
};
pub use record::AllocationRecord;
pub use snapshot::PeakSnapshot;
pub use table::AllocationTable;
pub use ticker::Ticker;
pub use tracker::{TableKind, Tracker};

/// Process-wide tracker fed by [`TracingAllocator::system`].
///
/// Its ceiling is [`TrackerConfig::DEFAULT`]'s 100 000 bytes. Hosted programs that need more
/// declare their own static with [`TrackerConfig::with_ceiling`].
pub static TRACKER: Tracker<DEFAULT_CAPACITY, StdPlatform> =
    Tracker::new(StdPlatform::new(), TrackerConfig::DEFAULT);

/// Arms the concurrency gate of [`TRACKER`]. Call once the program may allocate from more than
/// one thread; `#[heaptrace::main]` does it on entry to `main`.
pub fn arm() {
    TRACKER.arm();
}
