use crate::Fault;
use crate::record::{AllocationRecord, recorded_size};

/// Fixed-capacity store of live allocations.
///
/// Slot position carries no meaning. Every operation scans all `N` slots, which keeps the
/// table free of any index structure and therefore of any allocation of its own.
#[derive(Clone, Copy, Debug)]
pub struct AllocationTable<const N: usize> {
    slots: [AllocationRecord; N],
    allocated_size: usize,
    max_entries: usize,
}

impl<const N: usize> AllocationTable<N> {
    pub const fn new() -> Self {
        Self {
            slots: [AllocationRecord::EMPTY; N],
            allocated_size: 0,
            max_entries: 0,
        }
    }

    #[inline]
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Sum of the recorded sizes of all live slots.
    #[inline]
    pub const fn allocated_size(&self) -> usize {
        self.allocated_size
    }

    /// Highest number of simultaneously live slots seen so far.
    #[inline]
    pub const fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn live_entries(&self) -> usize {
        self.iter_live().count()
    }

    pub fn iter_live(&self) -> impl Iterator<Item = &AllocationRecord> {
        self.slots.iter().filter(|slot| !slot.is_empty())
    }

    /// Raw slots, including empty ones.
    #[inline]
    pub fn slots(&self) -> &[AllocationRecord; N] {
        &self.slots
    }

    pub fn get(&self, pointer: usize) -> Option<&AllocationRecord> {
        if pointer == 0 {
            return None;
        }
        self.slots.iter().find(|slot| slot.pointer == pointer)
    }

    /// Records a new live allocation with age 0 and returns the live count after the insert.
    ///
    /// A single pass counts live slots, finds the first free one and checks that `pointer`
    /// is not tracked yet.
    pub fn insert(&mut self, pointer: usize, caller: usize, size: usize) -> Result<usize, Fault> {
        if pointer == 0 {
            return Err(Fault::NullPointer);
        }
        if size == 0 {
            return Err(Fault::ZeroSize { pointer });
        }

        let mut free_slot = None;
        let mut live = 0usize;

        for (index, slot) in self.slots.iter().enumerate() {
            if slot.is_empty() {
                if free_slot.is_none() {
                    free_slot = Some(index);
                }
            } else {
                if slot.pointer == pointer {
                    return Err(Fault::DuplicateInsert { pointer });
                }
                live += 1;
            }
        }

        let Some(index) = free_slot else {
            return Err(Fault::TableFull {
                capacity: self.capacity(),
            });
        };

        let size = recorded_size(size);
        self.slots[index] = AllocationRecord::new(pointer, caller, size);
        self.allocated_size += usize::from(size);

        let live = live + 1;
        self.max_entries = self.max_entries.max(live);
        Ok(live)
    }

    /// Forgets a live allocation and returns its record.
    ///
    /// Removing the null pointer is a no-op that returns `Ok(None)`.
    pub fn remove(&mut self, pointer: usize) -> Result<Option<AllocationRecord>, Fault> {
        if pointer == 0 {
            return Ok(None);
        }

        let mut found = None;
        for (index, slot) in self.slots.iter().enumerate() {
            if slot.pointer == pointer {
                if found.is_some() {
                    return Err(Fault::DuplicateRemove { pointer });
                }
                found = Some(index);
            }
        }

        let Some(index) = found else {
            return Err(Fault::UntrackedPointer { pointer });
        };

        let record = std::mem::replace(&mut self.slots[index], AllocationRecord::EMPTY);
        self.allocated_size -= usize::from(record.size);
        Ok(Some(record))
    }

    /// Ages every live slot by one tick.
    pub fn tick(&mut self) {
        for slot in self.slots.iter_mut().filter(|slot| !slot.is_empty()) {
            slot.age = slot.age.saturating_add(1);
        }
    }

    #[cfg(test)]
    pub(crate) fn slots_mut(&mut self) -> &mut [AllocationRecord; N] {
        &mut self.slots
    }
}

impl<const N: usize> Default for AllocationTable<N> {
    fn default() -> Self {
        Self::new()
    }
}
