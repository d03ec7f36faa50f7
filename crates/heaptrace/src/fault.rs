use thiserror::Error;

/// A protocol violation detected by the tracker.
///
/// A `Fault` is not an ordinary error: it means the instrumented program or the allocator hook
/// broke the table's invariants, and the tracker's state can no longer be trusted. Callers must
/// not continue past one. The dispatcher reacts to every fault by dumping diagnostics and
/// invoking [`Platform::halt`](crate::Platform::halt), which does not return.
///
/// Rendering a fault never allocates, so it is safe to print from inside the allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Fault {
    #[error("insert of a null pointer")]
    NullPointer,

    #[error("insert of a zero-sized allocation at {pointer:#x}")]
    ZeroSize { pointer: usize },

    #[error("pointer {pointer:#x} is already tracked")]
    DuplicateInsert { pointer: usize },

    #[error("allocation table is full ({capacity} slots)")]
    TableFull { capacity: usize },

    #[error("pointer {pointer:#x} is tracked by more than one slot")]
    DuplicateRemove { pointer: usize },

    #[error("free of untracked pointer {pointer:#x}")]
    UntrackedPointer { pointer: usize },

    #[error("unknown trace event code {code}")]
    UnknownEvent { code: u8 },

    #[error("heap usage of {current} bytes exceeds the ceiling of {ceiling} bytes")]
    CeilingBreach { current: usize, ceiling: usize },

    #[error("tracker entered concurrently before the concurrency gate was armed")]
    UnarmedContention,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send_sync<T: Send + Sync + 'static>() {}

    #[test]
    fn fault_is_thread_safe() {
        assert_send_sync::<Fault>();
    }

    #[test]
    fn faults_render_addresses_in_hex() {
        assert_eq!(
            Fault::UntrackedPointer { pointer: 0x2000 }.to_string(),
            "free of untracked pointer 0x2000"
        );
        assert_eq!(
            Fault::TableFull { capacity: 600 }.to_string(),
            "allocation table is full (600 slots)"
        );
    }
}
