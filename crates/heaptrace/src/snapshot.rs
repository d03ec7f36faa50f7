use crate::table::AllocationTable;

/// Frozen copy of the live table taken when tracked usage reached its highest point.
///
/// The high-water mark only ever rises, so the store always holds the composition of the
/// heap at its largest footprint so far. That is usually the most useful picture right before
/// an out-of-memory abort.
#[derive(Clone, Copy, Debug)]
pub struct PeakSnapshot<const N: usize> {
    table: AllocationTable<N>,
    max_allocated_size: usize,
    floor: usize,
}

impl<const N: usize> PeakSnapshot<N> {
    /// Creates an empty store that ignores usage at or below `floor` bytes.
    pub const fn new(floor: usize) -> Self {
        Self {
            table: AllocationTable::new(),
            max_allocated_size: 0,
            floor,
        }
    }

    #[inline]
    pub const fn table(&self) -> &AllocationTable<N> {
        &self.table
    }

    /// High-water mark of tracked bytes that triggered the last capture.
    #[inline]
    pub const fn max_allocated_size(&self) -> usize {
        self.max_allocated_size
    }

    #[inline]
    pub const fn floor(&self) -> usize {
        self.floor
    }

    /// Copies `live` wholesale if its usage is above the floor and above every earlier peak.
    /// Returns whether a capture happened.
    pub fn maybe_capture(&mut self, live: &AllocationTable<N>) -> bool {
        let allocated = live.allocated_size();
        if allocated <= self.floor() || allocated <= self.max_allocated_size {
            return false;
        }

        self.max_allocated_size = allocated;
        self.table = *live;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nothing_is_captured_at_or_below_the_floor() {
        let mut live = AllocationTable::<4>::new();
        let mut peak = PeakSnapshot::new(100);
        assert_eq!(peak.floor(), 100);

        live.insert(0x10, 0, 100).unwrap();
        assert!(!peak.maybe_capture(&live));
        assert_eq!(peak.max_allocated_size(), 0);
        assert_eq!(peak.table().live_entries(), 0);

        live.insert(0x20, 0, 1).unwrap();
        assert!(peak.maybe_capture(&live));
        assert_eq!(peak.max_allocated_size(), 101);
    }

    #[test]
    fn only_new_maxima_are_captured() {
        let mut live = AllocationTable::<4>::new();
        let mut peak = PeakSnapshot::new(0);

        live.insert(0x10, 1, 10).unwrap();
        assert!(peak.maybe_capture(&live));
        assert_eq!(peak.max_allocated_size(), 10);

        live.insert(0x20, 2, 5).unwrap();
        assert!(peak.maybe_capture(&live));
        assert_eq!(peak.max_allocated_size(), 15);

        live.remove(0x10).unwrap();
        live.insert(0x30, 3, 3).unwrap();
        assert_eq!(live.allocated_size(), 8);
        assert!(!peak.maybe_capture(&live));
        assert_eq!(peak.max_allocated_size(), 15);
    }

    #[test]
    fn capture_is_a_copy_unaffected_by_later_mutation() {
        let mut live = AllocationTable::<4>::new();
        let mut peak = PeakSnapshot::new(0);

        live.insert(0x10, 1, 10).unwrap();
        live.insert(0x20, 2, 20).unwrap();
        peak.maybe_capture(&live);
        assert_eq!(peak.table().slots(), live.slots());

        live.remove(0x10).unwrap();
        live.tick();

        let frozen = peak.table();
        assert_eq!(frozen.live_entries(), 2);
        assert_eq!(frozen.get(0x10).unwrap().size, 10);
        assert_eq!(frozen.get(0x20).unwrap().age, 0);
    }
}
