//! Address-ordered view over an allocation table.
//!
//! Dumps list allocations by ascending address so that two dumps of the same heap line up
//! and neighbouring blocks appear next to each other. The view is rebuilt by repeated
//! selection scans on every request: quadratic in `N`, but stateless and free of any
//! allocation, which is what matters for a diagnostic that runs inside the allocator.

use crate::record::AllocationRecord;
use crate::table::AllocationTable;

/// Borrowed references to the live slots of a table, sorted by ascending pointer and padded
/// with `None` after the last live slot.
#[derive(Clone, Copy, Debug)]
pub struct OrderedView<'a, const N: usize> {
    entries: [Option<&'a AllocationRecord>; N],
    len: usize,
}

impl<'a, const N: usize> OrderedView<'a, N> {
    /// Number of live references in the view.
    #[inline]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&'a AllocationRecord> {
        self.entries.get(index).copied().flatten()
    }

    /// The full, null-padded sequence of `N` entries.
    #[inline]
    pub fn as_slice(&self) -> &[Option<&'a AllocationRecord>; N] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a AllocationRecord> + '_ {
        self.entries[..self.len].iter().filter_map(|entry| *entry)
    }
}

impl<const N: usize> AllocationTable<N> {
    /// Builds the address-ordered view of this table.
    pub fn order(&self) -> OrderedView<'_, N> {
        let slots = self.slots();
        let mut entries = [None; N];
        let mut len = 0;
        // 0 is the empty-slot marker, so it sorts below every live address.
        let mut current = 0usize;

        loop {
            let mut lowest: Option<&AllocationRecord> = None;

            for slot in slots.iter().filter(|slot| slot.pointer > current) {
                if lowest.is_none_or(|l| slot.pointer < l.pointer) {
                    lowest = Some(slot);
                }
            }

            let Some(next) = lowest else {
                break;
            };

            entries[len] = Some(next);
            len += 1;
            current = next.pointer;
        }

        OrderedView { entries, len }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pointers<const N: usize>(view: &OrderedView<'_, N>) -> Vec<usize> {
        view.iter().map(|r| r.pointer).collect()
    }

    #[test]
    fn empty_table_gives_all_none() {
        let table = AllocationTable::<4>::new();
        let view = table.order();
        assert!(view.is_empty());
        assert!(view.as_slice().iter().all(Option::is_none));
    }

    #[test]
    fn view_is_sorted_and_null_padded() {
        let mut table = AllocationTable::<6>::new();
        for pointer in [0x3000, 0x1000, 0x5000, 0x2000] {
            table.insert(pointer, 0, 8).unwrap();
        }

        let view = table.order();
        assert_eq!(view.len(), 4);
        assert_eq!(pointers(&view), vec![0x1000, 0x2000, 0x3000, 0x5000]);
        assert!(view.as_slice()[4..].iter().all(Option::is_none));
        assert_eq!(view.get(0).unwrap().pointer, 0x1000);
        assert!(view.get(4).is_none());
        assert!(view.get(99).is_none());
    }

    #[test]
    fn insertion_order_does_not_matter() {
        let addresses = [0x40, 0x10, 0x30, 0x20];
        let mut seen = Vec::new();

        // Rotations of the same set must all produce the same ordering.
        for shift in 0..addresses.len() {
            let mut table = AllocationTable::<8>::new();
            for i in 0..addresses.len() {
                table
                    .insert(addresses[(i + shift) % addresses.len()], 0, 1)
                    .unwrap();
            }
            seen.push(pointers(&table.order()));
        }

        for ordering in &seen {
            assert_eq!(ordering, &vec![0x10, 0x20, 0x30, 0x40]);
        }
    }

    #[test]
    fn view_follows_holes_left_by_removal() {
        let mut table = AllocationTable::<4>::new();
        table.insert(0x2000, 1, 100).unwrap();
        table.insert(0x1000, 2, 50).unwrap();
        assert_eq!(pointers(&table.order()), vec![0x1000, 0x2000]);

        table.remove(0x2000).unwrap();
        let view = table.order();
        assert_eq!(pointers(&view), vec![0x1000]);
        assert_eq!(view.get(0).unwrap().caller, 2);
        assert!(view.as_slice()[1..].iter().all(Option::is_none));
    }

    #[test]
    fn addresses_near_the_top_of_the_range_are_ordered() {
        let mut table = AllocationTable::<3>::new();
        table.insert(usize::MAX, 0, 1).unwrap();
        table.insert(usize::MAX - 8, 0, 1).unwrap();
        assert_eq!(pointers(&table.order()), vec![usize::MAX - 8, usize::MAX]);
    }
}
