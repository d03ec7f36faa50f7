//! Services the tracker consumes from its environment.
//!
//! The tracker itself owns no I/O, no clock and no way to stop the process. Those come from a
//! [`Platform`]: heap statistics maintained by the allocator layer, a console sink for dumps,
//! and a halt primitive for faults. [`StdPlatform`] provides all of them on hosted targets
//! without touching the heap.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Write as _};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::Fault;

/// Upper bound of a single console line rendered by [`StdPlatform`].
pub const LINE_CAPACITY: usize = 256;

/// Heap usage as reported by the allocator layer.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeapStats {
    /// Bytes currently allocated.
    pub current_size: usize,
    /// Most bytes allocated at any one time.
    pub max_size: usize,
    /// Cumulative bytes ever allocated.
    pub total_size: usize,
    /// Bytes the heap currently reserves from the system.
    pub reserved_size: usize,
    /// Number of live allocations.
    pub alloc_count: usize,
    /// Number of allocation requests that failed.
    pub alloc_fail_count: usize,
}

impl fmt::Display for HeapStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "heap: current={} max={} total={} reserved={} allocations={} failed={}",
            self.current_size,
            self.max_size,
            self.total_size,
            self.reserved_size,
            self.alloc_count,
            self.alloc_fail_count
        )
    }
}

/// Low-level arena figures of the underlying `malloc`, where the platform exposes them.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArenaStats {
    /// Non-mmapped space obtained from the system.
    pub arena: usize,
    pub free_chunks: usize,
    pub mmapped_regions: usize,
    pub mmapped_bytes: usize,
    /// Bytes in chunks handed out to callers.
    pub in_use: usize,
    /// Bytes in free chunks.
    pub free: usize,
}

impl fmt::Display for ArenaStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "arena: size={} free_chunks={} mmapped_regions={} mmapped_bytes={} in_use={} free={}",
            self.arena,
            self.free_chunks,
            self.mmapped_regions,
            self.mmapped_bytes,
            self.in_use,
            self.free
        )
    }
}

/// Environment services required by a [`Tracker`](crate::Tracker).
///
/// Implementations are called from inside the allocator and must not allocate.
pub trait Platform {
    /// Current heap statistics of the allocator layer.
    fn heap_stats(&self) -> HeapStats;

    /// Bytes currently allocated. Checked after every allocation, so implementations with an
    /// expensive [`heap_stats`](Platform::heap_stats) should override it.
    fn current_heap_size(&self) -> usize {
        self.heap_stats().current_size
    }

    /// Arena statistics of the underlying allocator, if available.
    fn arena_stats(&self) -> Option<ArenaStats> {
        None
    }

    /// Writes one line to the diagnostic console. The line terminator is added by the sink.
    fn write_line(&self, args: fmt::Arguments<'_>);

    /// Stops the process after a fault. Must not return.
    fn halt(&self, fault: &Fault) -> !;
}

/// Lock-free heap counters, updated by the allocator wrapper around every operation.
#[derive(Debug)]
pub struct HeapCounters {
    current: AtomicUsize,
    max: AtomicUsize,
    total: AtomicUsize,
    count: AtomicUsize,
    failed: AtomicUsize,
}

impl HeapCounters {
    pub const fn new() -> Self {
        Self {
            current: AtomicUsize::new(0),
            max: AtomicUsize::new(0),
            total: AtomicUsize::new(0),
            count: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
        }
    }

    #[inline]
    pub fn record_alloc(&self, size: usize) {
        // Relaxed is enough: the counters are statistics, not synchronization.
        let current = self.current.fetch_add(size, Ordering::Relaxed) + size;
        self.max.fetch_max(current, Ordering::Relaxed);
        self.total.fetch_add(size, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_free(&self, size: usize) {
        self.current.fetch_sub(size, Ordering::Relaxed);
        self.count.fetch_sub(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn current(&self) -> usize {
        self.current.load(Ordering::Relaxed)
    }

    pub fn stats(&self, reserved_size: usize) -> HeapStats {
        HeapStats {
            current_size: self.current.load(Ordering::Relaxed),
            max_size: self.max.load(Ordering::Relaxed),
            total_size: self.total.load(Ordering::Relaxed),
            reserved_size,
            alloc_count: self.count.load(Ordering::Relaxed),
            alloc_fail_count: self.failed.load(Ordering::Relaxed),
        }
    }
}

impl Default for HeapCounters {
    fn default() -> Self {
        Self::new()
    }
}

cfg_if::cfg_if! {
    if #[cfg(all(target_os = "linux", target_env = "gnu"))] {
        fn system_arena_stats() -> Option<ArenaStats> {
            // SAFETY: mallinfo2 only reads glibc's allocator bookkeeping and never allocates.
            let info = unsafe { libc::mallinfo2() };
            Some(ArenaStats {
                arena: info.arena,
                free_chunks: info.ordblks,
                mmapped_regions: info.hblks,
                mmapped_bytes: info.hblkhd,
                in_use: info.uordblks,
                free: info.fordblks,
            })
        }
    } else {
        fn system_arena_stats() -> Option<ArenaStats> {
            None
        }
    }
}

/// Renders `args` into a fixed buffer. Output beyond [`LINE_CAPACITY`] bytes is dropped.
pub fn render_line(args: fmt::Arguments<'_>) -> heapless::String<LINE_CAPACITY> {
    let mut line = heapless::String::new();
    // A write error only means the line was truncated.
    let _ = line.write_fmt(args);
    line
}

fn write_fd(fd: libc::c_int, mut bytes: &[u8]) {
    while !bytes.is_empty() {
        // SAFETY: the pointer and length describe a live, initialised byte slice.
        let written = unsafe { libc::write(fd, bytes.as_ptr().cast(), bytes.len()) };
        match usize::try_from(written) {
            Ok(0) => return,
            Ok(n) => bytes = &bytes[n..],
            Err(_) => {
                if std::io::Error::last_os_error().kind() != std::io::ErrorKind::Interrupted {
                    return;
                }
            }
        }
    }
}

/// Hosted platform: counters fed by [`TracingAllocator`](crate::TracingAllocator), dumps
/// written straight to the stdout file descriptor, and halting by `abort`.
///
/// Nothing here goes through `std::io::stdout`, whose buffer lives on the heap.
#[derive(Debug)]
pub struct StdPlatform {
    heap: HeapCounters,
}

impl StdPlatform {
    pub const fn new() -> Self {
        Self {
            heap: HeapCounters::new(),
        }
    }

    #[inline]
    pub fn heap(&self) -> &HeapCounters {
        &self.heap
    }
}

impl Default for StdPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl Platform for StdPlatform {
    fn heap_stats(&self) -> HeapStats {
        let reserved = system_arena_stats().map_or(0, |arena| arena.arena);
        self.heap.stats(reserved)
    }

    fn current_heap_size(&self) -> usize {
        self.heap.current()
    }

    fn arena_stats(&self) -> Option<ArenaStats> {
        system_arena_stats()
    }

    fn write_line(&self, args: fmt::Arguments<'_>) {
        let mut line = render_line(args);
        if line.push('\n').is_err() {
            line.pop();
            let _ = line.push('\n');
        }
        write_fd(libc::STDOUT_FILENO, line.as_bytes());
    }

    fn halt(&self, fault: &Fault) -> ! {
        self.write_line(format_args!("[heaptrace] halt: {fault}"));
        std::process::abort()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_track_current_max_and_total() {
        let counters = HeapCounters::new();
        counters.record_alloc(100);
        counters.record_alloc(50);
        counters.record_free(100);
        counters.record_alloc(10);
        counters.record_failure();

        let stats = counters.stats(4096);
        assert_eq!(stats.current_size, 60);
        assert_eq!(stats.max_size, 150);
        assert_eq!(stats.total_size, 160);
        assert_eq!(stats.reserved_size, 4096);
        assert_eq!(stats.alloc_count, 2);
        assert_eq!(stats.alloc_fail_count, 1);
    }

    #[test]
    fn stats_lines_use_key_value_pairs() {
        let stats = HeapStats {
            current_size: 1,
            max_size: 2,
            total_size: 3,
            reserved_size: 4,
            alloc_count: 5,
            alloc_fail_count: 6,
        };
        assert_eq!(
            stats.to_string(),
            "heap: current=1 max=2 total=3 reserved=4 allocations=5 failed=6"
        );
    }

    #[test]
    fn render_line_truncates_instead_of_failing() {
        let long = "x".repeat(LINE_CAPACITY * 2);
        let line = render_line(format_args!("{long}"));
        assert!(line.len() <= LINE_CAPACITY);

        let short = render_line(format_args!("P: {:#x}", 0x10));
        assert_eq!(short.as_str(), "P: 0x10");
    }
}
