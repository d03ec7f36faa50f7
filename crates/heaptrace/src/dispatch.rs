//! Translation of allocator events into table operations.
//!
//! This is the tracker's single entry point for the allocator hook. Table mutations only
//! happen for operations that actually succeeded; a null result is reported with a dump of
//! the live table and otherwise left alone. Any fault is fatal: the dispatcher dumps and
//! halts, since the hook it serves has no error channel.

use crate::{Fault, Platform, TableKind, TraceEvent, Tracker};

impl<const N: usize, P: Platform> Tracker<N, P> {
    /// Handles one allocator event.
    ///
    /// `result` is the pointer the allocator returned (0 on failure, ignored for frees) and
    /// `caller` is the code address the allocation is attributed to.
    pub fn trace(&self, result: usize, caller: usize, event: TraceEvent) {
        match event {
            TraceEvent::Allocate { size } => self.on_allocate(result, caller, size),
            TraceEvent::AllocateZeroed {
                count,
                element_size,
            } => self.on_allocate(result, caller, count.saturating_mul(element_size)),
            TraceEvent::Reallocate {
                old_pointer,
                new_size,
            } => {
                if result == 0 {
                    // The allocator keeps the old block on failure, and so do we.
                    self.dump(TableKind::Live);
                    return;
                }
                self.check(self.remove(old_pointer));
                self.check(self.insert(result, caller, new_size));
            }
            TraceEvent::Free { pointer } => self.check(self.remove(pointer)),
        }
    }

    /// Decodes a raw hook invocation and handles it. Unknown codes are fatal.
    pub fn trace_raw(&self, code: u8, result: usize, caller: usize, args: [usize; 2]) {
        match TraceEvent::decode(code, args) {
            Ok(event) => self.trace(result, caller, event),
            Err(fault) => self.fail(fault, TableKind::Live),
        }
    }

    fn on_allocate(&self, result: usize, caller: usize, size: usize) {
        if result == 0 {
            self.dump(TableKind::Live);
        } else {
            self.check(self.insert(result, caller, size));
        }

        let current = self.platform().current_heap_size();
        let ceiling = self.config().ceiling;
        if current > ceiling {
            self.fail(Fault::CeilingBreach { current, ceiling }, TableKind::Peak);
        }
    }

    #[inline]
    fn check(&self, outcome: Result<(), Fault>) {
        if let Err(fault) = outcome {
            self.fail(fault, TableKind::Live);
        }
    }
}
