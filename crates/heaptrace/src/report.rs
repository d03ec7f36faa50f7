use crate::tracker::TrackerState;
use crate::{Fault, Platform, TableKind, Tracker};

impl<const N: usize, P: Platform> Tracker<N, P> {
    /// Writes `kind` to the platform console in ascending address order, preceded by the
    /// platform heap statistics.
    ///
    /// The whole dump runs inside the tracker's critical section, so it never shows a table
    /// halfway through a mutation. A dump that cannot enter the critical section halts.
    ///
    /// Output shape:
    ///
    /// ```text
    /// [heaptrace] live table dump
    /// arena: size=135168 free_chunks=1 mmapped_regions=0 mmapped_bytes=0 in_use=2688 free=132480
    /// heap: current=2424 max=2424 total=2424 reserved=135168 allocations=3 failed=0
    /// tracker: tracked=2424 peak=0 max_entries=3 entries=3
    /// P: 0x5581c9e4a2a0 C: 0x5581c8f1a7b0 S: 24 T: 2
    /// ...
    /// [heaptrace] end of dump
    /// ```
    pub fn dump(&self, kind: TableKind) {
        if let Err(fault) = self.try_dump(kind) {
            self.platform().halt(&fault);
        }
    }

    pub(crate) fn try_dump(&self, kind: TableKind) -> Result<(), Fault> {
        self.with_state(|state| self.write_dump(state, kind))
    }

    fn write_dump(&self, state: &TrackerState<N>, kind: TableKind) {
        let platform = self.platform();
        let table = state.table(kind);
        let view = table.order();

        platform.write_line(format_args!("[heaptrace] {} dump", kind.label()));
        if let Some(arena) = platform.arena_stats() {
            platform.write_line(format_args!("{arena}"));
        }
        platform.write_line(format_args!("{}", platform.heap_stats()));
        platform.write_line(format_args!(
            "tracker: tracked={} peak={} max_entries={} entries={}",
            table.allocated_size(),
            state.peak.max_allocated_size(),
            table.max_entries(),
            view.len()
        ));

        for record in view.iter() {
            platform.write_line(format_args!("{record}"));
        }
        platform.write_line(format_args!("[heaptrace] end of dump"));
    }
}
