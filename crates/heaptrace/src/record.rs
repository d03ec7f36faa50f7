use std::fmt;

/// One slot of an allocation table.
///
/// Addresses are stored as plain integers: the tracker never dereferences them, it only
/// compares and prints them. A slot whose `pointer` is 0 is empty and has every field zeroed.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq, Hash)]
pub struct AllocationRecord {
    /// Address returned by the allocator.
    pub pointer: usize,
    /// Code address attributed to the allocation (0 when unknown).
    pub caller: usize,
    /// Requested size in bytes, saturated at `u16::MAX`.
    pub size: u16,
    /// Number of ticks this allocation has been alive.
    pub age: u16,
}

impl AllocationRecord {
    pub const EMPTY: Self = Self {
        pointer: 0,
        caller: 0,
        size: 0,
        age: 0,
    };

    #[inline]
    pub(crate) const fn new(pointer: usize, caller: usize, size: u16) -> Self {
        Self {
            pointer,
            caller,
            size,
            age: 0,
        }
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.pointer == 0
    }
}

/// Renders the record in the dump line format understood by [`crate::dump`].
impl fmt::Display for AllocationRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "P: {:#x} C: {:#x} S: {} T: {}",
            self.pointer, self.caller, self.size, self.age
        )
    }
}

/// Clamps a byte count to the 16-bit size field.
#[inline]
pub(crate) fn recorded_size(size: usize) -> u16 {
    u16::try_from(size).unwrap_or(u16::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_record_is_all_zero() {
        assert!(AllocationRecord::EMPTY.is_empty());
        assert_eq!(AllocationRecord::EMPTY, AllocationRecord::default());
    }

    #[test]
    fn display_matches_dump_line_format() {
        let record = AllocationRecord {
            pointer: 0x2001_5b68,
            caller: 0x801_a1f1,
            size: 1200,
            age: 1005,
        };
        assert_eq!(
            record.to_string(),
            "P: 0x20015b68 C: 0x801a1f1 S: 1200 T: 1005"
        );
    }

    #[test]
    fn oversized_requests_saturate() {
        assert_eq!(recorded_size(12), 12);
        assert_eq!(recorded_size(65_535), u16::MAX);
        assert_eq!(recorded_size(1 << 20), u16::MAX);
    }
}
