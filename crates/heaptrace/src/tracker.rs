use std::sync::Mutex;

use crate::gate::ConcurrencyGate;
use crate::snapshot::PeakSnapshot;
use crate::table::AllocationTable;
use crate::{Fault, Platform, TrackerConfig};

/// Which table a dump or query refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TableKind {
    /// The table of currently live allocations.
    Live,
    /// The frozen copy taken at the tracked-usage high-water mark.
    Peak,
}

impl TableKind {
    pub(crate) const fn label(self) -> &'static str {
        match self {
            TableKind::Live => "live table",
            TableKind::Peak => "peak snapshot",
        }
    }
}

pub(crate) struct TrackerState<const N: usize> {
    pub(crate) live: AllocationTable<N>,
    pub(crate) peak: PeakSnapshot<N>,
}

impl<const N: usize> TrackerState<N> {
    pub(crate) fn table(&self, kind: TableKind) -> &AllocationTable<N> {
        match kind {
            TableKind::Live => &self.live,
            TableKind::Peak => self.peak.table(),
        }
    }
}

/// Owner of all tracking state: the live table, the peak snapshot, the running totals and the
/// concurrency gate.
///
/// A tracker is meant to live in a `static` for the whole process, reached from the allocator
/// hook. It never allocates. State is only ever touched through the operations below, each of
/// which passes through the gate for its entire duration.
///
/// ```rust
/// use heaptrace::{StdPlatform, Tracker, TrackerConfig};
///
/// static TRACKER: Tracker<64, StdPlatform> =
///     Tracker::new(StdPlatform::new(), TrackerConfig::DEFAULT.with_ceiling(1 << 20));
///
/// TRACKER.arm();
/// TRACKER.insert(0x1000, 0, 32).unwrap();
/// assert_eq!(TRACKER.live_table().unwrap().allocated_size(), 32);
/// TRACKER.remove(0x1000).unwrap();
/// ```
pub struct Tracker<const N: usize, P> {
    state: Mutex<TrackerState<N>>,
    gate: ConcurrencyGate,
    platform: P,
    config: TrackerConfig,
}

impl<const N: usize, P> std::fmt::Debug for Tracker<N, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracker")
            .field("capacity", &N)
            .field("armed", &self.gate.is_armed())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<const N: usize, P: Platform> Tracker<N, P> {
    pub const fn new(platform: P, config: TrackerConfig) -> Self {
        Self {
            state: Mutex::new(TrackerState {
                live: AllocationTable::new(),
                peak: PeakSnapshot::new(config.snapshot_floor),
            }),
            gate: ConcurrencyGate::new(),
            platform,
            config,
        }
    }

    #[inline]
    pub fn platform(&self) -> &P {
        &self.platform
    }

    #[inline]
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Signals that the runtime is ready for concurrent use: from now on every operation
    /// blocks on the tracker lock. Idempotent.
    pub fn arm(&self) {
        self.gate.arm();
    }

    pub fn is_armed(&self) -> bool {
        self.gate.is_armed()
    }

    pub(crate) fn with_state<R>(
        &self,
        f: impl FnOnce(&mut TrackerState<N>) -> R,
    ) -> Result<R, Fault> {
        let mut state = self.gate.enter(&self.state)?;
        Ok(f(&mut state))
    }

    /// Records a new live allocation and captures a peak snapshot if tracked usage reached a
    /// new maximum above the floor.
    pub fn insert(&self, pointer: usize, caller: usize, size: usize) -> Result<(), Fault> {
        self.with_state(|state| {
            state.live.insert(pointer, caller, size)?;
            state.peak.maybe_capture(&state.live);
            Ok(())
        })?
    }

    /// Forgets a live allocation. Removing the null pointer succeeds without effect.
    pub fn remove(&self, pointer: usize) -> Result<(), Fault> {
        self.with_state(|state| state.live.remove(pointer).map(|_| ()))?
    }

    /// Ages every live allocation by one tick. Meant to be driven by a periodic source such as
    /// [`Ticker`](crate::Ticker).
    pub fn tick(&self) {
        if let Err(fault) = self.with_state(|state| state.live.tick()) {
            self.fail(fault, TableKind::Live);
        }
    }

    /// Copy of the live table.
    pub fn live_table(&self) -> Result<AllocationTable<N>, Fault> {
        self.with_state(|state| state.live)
    }

    /// Copy of the peak snapshot table.
    pub fn peak_table(&self) -> Result<AllocationTable<N>, Fault> {
        self.with_state(|state| *state.peak.table())
    }

    /// High-water mark of tracked bytes that gated the last peak snapshot.
    pub fn max_allocated_size(&self) -> Result<usize, Fault> {
        self.with_state(|state| state.peak.max_allocated_size())
    }

    /// Dumps `kind` for diagnosis, then halts the platform.
    pub(crate) fn fail(&self, fault: Fault, kind: TableKind) -> ! {
        // A dump that cannot get at the state must not prevent the halt.
        let _ = self.try_dump(kind);
        self.platform.halt(&fault)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{ArenaStats, HeapStats};
    use std::fmt;

    /// Platform that keeps console output in memory and panics on halt.
    #[derive(Default)]
    pub(crate) struct CapturePlatform {
        pub(crate) lines: Mutex<Vec<String>>,
        pub(crate) heap: Mutex<HeapStats>,
        pub(crate) arena: Option<ArenaStats>,
    }

    impl CapturePlatform {
        pub(crate) fn lines(&self) -> Vec<String> {
            self.lines.lock().unwrap().clone()
        }

        pub(crate) fn set_current_size(&self, bytes: usize) {
            self.heap.lock().unwrap().current_size = bytes;
        }
    }

    impl Platform for CapturePlatform {
        fn heap_stats(&self) -> HeapStats {
            *self.heap.lock().unwrap()
        }

        fn arena_stats(&self) -> Option<ArenaStats> {
            self.arena
        }

        fn write_line(&self, args: fmt::Arguments<'_>) {
            self.lines.lock().unwrap().push(args.to_string());
        }

        fn halt(&self, fault: &Fault) -> ! {
            panic!("halted: {fault}");
        }
    }

    pub(crate) fn tracker<const N: usize>(config: TrackerConfig) -> Tracker<N, CapturePlatform> {
        Tracker::new(CapturePlatform::default(), config)
    }

    fn assert_sync<T: Sync>() {}

    #[test]
    fn std_tracker_can_live_in_a_static() {
        assert_sync::<Tracker<600, crate::StdPlatform>>();
    }

    #[test]
    fn running_total_matches_live_slots() {
        let tracker = tracker::<8>(TrackerConfig::DEFAULT);
        let ops: [(bool, usize, usize); 7] = [
            (true, 0x10, 5),
            (true, 0x20, 7),
            (true, 0x30, 11),
            (false, 0x20, 0),
            (true, 0x40, 13),
            (false, 0x10, 0),
            (true, 0x50, 17),
        ];

        for (insert, pointer, size) in ops {
            if insert {
                tracker.insert(pointer, 0, size).unwrap();
            } else {
                tracker.remove(pointer).unwrap();
            }
            let table = tracker.live_table().unwrap();
            let sum: usize = table.iter_live().map(|r| usize::from(r.size)).sum();
            assert_eq!(table.allocated_size(), sum);
        }
        assert_eq!(tracker.live_table().unwrap().allocated_size(), 41);
    }

    #[test]
    fn scenario_insert_order_remove() {
        let tracker = tracker::<4>(TrackerConfig::DEFAULT);

        tracker.insert(0x2000, 0xc1, 100).unwrap();
        assert_eq!(tracker.live_table().unwrap().allocated_size(), 100);

        tracker.insert(0x1000, 0xc2, 50).unwrap();
        let table = tracker.live_table().unwrap();
        assert_eq!(table.allocated_size(), 150);
        let view = table.order();
        assert_eq!(view.get(0).unwrap().pointer, 0x1000);
        assert_eq!(view.get(1).unwrap().pointer, 0x2000);
        assert!(view.as_slice()[2..].iter().all(Option::is_none));

        tracker.remove(0x2000).unwrap();
        let table = tracker.live_table().unwrap();
        assert_eq!(table.allocated_size(), 50);
        assert_eq!(table.order().len(), 1);

        assert_eq!(
            tracker.remove(0x2000),
            Err(Fault::UntrackedPointer { pointer: 0x2000 })
        );
    }

    #[test]
    fn scenario_monotonic_peak() {
        let tracker = tracker::<4>(TrackerConfig::DEFAULT.with_snapshot_floor(0));

        tracker.insert(0x10, 1, 10).unwrap();
        assert_eq!(tracker.max_allocated_size().unwrap(), 10);

        tracker.insert(0x20, 2, 5).unwrap();
        assert_eq!(tracker.max_allocated_size().unwrap(), 15);

        tracker.remove(0x10).unwrap();
        tracker.insert(0x30, 3, 3).unwrap();
        assert_eq!(tracker.live_table().unwrap().allocated_size(), 8);
        assert_eq!(tracker.max_allocated_size().unwrap(), 15);

        let peak = tracker.peak_table().unwrap();
        assert_eq!(peak.allocated_size(), 15);
        assert!(peak.get(0x10).is_some());
        assert!(peak.get(0x30).is_none());
    }

    #[test]
    fn tick_ages_live_allocations_only() {
        let tracker = tracker::<4>(TrackerConfig::DEFAULT.with_snapshot_floor(0));
        tracker.insert(0x10, 1, 10).unwrap();
        tracker.tick();
        tracker.tick();

        assert_eq!(tracker.live_table().unwrap().get(0x10).unwrap().age, 2);
        assert_eq!(tracker.peak_table().unwrap().get(0x10).unwrap().age, 0);
    }

    #[test]
    fn unarmed_reentry_is_reported() {
        let tracker = tracker::<4>(TrackerConfig::DEFAULT);
        let nested = tracker.with_state(|_| tracker.insert(0x10, 0, 1)).unwrap();
        assert_eq!(nested, Err(Fault::UnarmedContention));
    }

    #[test]
    fn armed_tracker_serializes_threads() {
        let tracker = tracker::<256>(TrackerConfig::DEFAULT);
        tracker.arm();

        std::thread::scope(|scope| {
            for t in 0..4usize {
                let tracker = &tracker;
                scope.spawn(move || {
                    for i in 0..50usize {
                        let pointer = 0x1_0000 * (t + 1) + i * 16;
                        tracker.insert(pointer, t, 8).unwrap();
                        if i % 2 == 0 {
                            tracker.remove(pointer).unwrap();
                        }
                        tracker.tick();
                    }
                });
            }
        });

        let table = tracker.live_table().unwrap();
        assert_eq!(table.live_entries(), 100);
        assert_eq!(table.allocated_size(), 800);
    }
}
