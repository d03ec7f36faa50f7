use std::alloc::{GlobalAlloc, Layout, System};

use crate::{DEFAULT_CAPACITY, StdPlatform, Tracker};

/// Global allocator that reports every heap event to a [`Tracker`].
///
/// Register it once per binary:
///
/// ```rust,no_run
/// #[global_allocator]
/// static GLOBAL: heaptrace::TracingAllocator = heaptrace::TracingAllocator::system();
///
/// #[heaptrace::main]
/// fn main() {
///     let data = vec![0u8; 1024];
///     heaptrace::TRACKER.dump(heaptrace::TableKind::Live);
///     drop(data);
/// }
/// ```
///
/// [`TRACKER`](crate::TRACKER) uses [`TrackerConfig::DEFAULT`](crate::TrackerConfig::DEFAULT),
/// which halts the process once the heap grows past 100 000 bytes. Programs with a larger
/// working set should declare their own `Tracker` static with
/// [`with_ceiling`](crate::TrackerConfig::with_ceiling) and pass it to
/// [`TracingAllocator::new`], as the `ceiling` example does.
///
/// Frees are reported before the memory goes back to the inner allocator, and reallocation is
/// carried out as allocate, copy, free. Either way an address handed out again by the inner
/// allocator has always left the table first.
///
/// Without the `heaptrace` feature every call goes straight to the inner allocator and the
/// tracker is never touched.
pub struct TracingAllocator<A: GlobalAlloc = System, const N: usize = DEFAULT_CAPACITY> {
    inner: A,
    tracker: &'static Tracker<N, StdPlatform>,
}

impl TracingAllocator<System, DEFAULT_CAPACITY> {
    /// Wraps the system allocator and reports to [`TRACKER`](crate::TRACKER).
    pub const fn system() -> Self {
        Self::new(System, &crate::TRACKER)
    }
}

impl<A: GlobalAlloc, const N: usize> TracingAllocator<A, N> {
    pub const fn new(inner: A, tracker: &'static Tracker<N, StdPlatform>) -> Self {
        Self { inner, tracker }
    }

    #[inline]
    pub fn tracker(&self) -> &'static Tracker<N, StdPlatform> {
        self.tracker
    }
}

cfg_if::cfg_if! {
    if #[cfg(feature = "heaptrace")] {
        use crate::{CallSite, TraceEvent};

        impl<A: GlobalAlloc, const N: usize> TracingAllocator<A, N> {
            #[inline]
            fn allocated(&self, ptr: *mut u8, size: usize, event: TraceEvent) -> *mut u8 {
                let heap = self.tracker.platform().heap();
                if ptr.is_null() {
                    heap.record_failure();
                } else {
                    heap.record_alloc(size);
                }
                self.tracker.trace(ptr as usize, CallSite::current(), event);
                ptr
            }
        }

        unsafe impl<A: GlobalAlloc, const N: usize> GlobalAlloc for TracingAllocator<A, N> {
            unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
                let ptr = unsafe { self.inner.alloc(layout) };
                let size = layout.size();
                self.allocated(ptr, size, TraceEvent::Allocate { size })
            }

            unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
                let ptr = unsafe { self.inner.alloc_zeroed(layout) };
                let event = TraceEvent::AllocateZeroed {
                    count: 1,
                    element_size: layout.size(),
                };
                self.allocated(ptr, layout.size(), event)
            }

            unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
                self.tracker.trace(
                    0,
                    CallSite::current(),
                    TraceEvent::Free {
                        pointer: ptr as usize,
                    },
                );
                self.tracker.platform().heap().record_free(layout.size());
                unsafe { self.inner.dealloc(ptr, layout) }
            }

            unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
                let event = TraceEvent::Reallocate {
                    old_pointer: ptr as usize,
                    new_size,
                };
                // SAFETY: the caller guarantees `new_size` is non-zero and, rounded up to
                // `layout.align()`, does not overflow `isize`.
                let new_layout = unsafe { Layout::from_size_align_unchecked(new_size, layout.align()) };
                let new_ptr = unsafe { self.inner.alloc(new_layout) };
                if new_ptr.is_null() {
                    return self.allocated(new_ptr, new_size, event);
                }

                // SAFETY: both blocks are live, distinct, and at least this long.
                unsafe {
                    std::ptr::copy_nonoverlapping(ptr, new_ptr, layout.size().min(new_size));
                }
                self.allocated(new_ptr, new_size, event);
                self.tracker.platform().heap().record_free(layout.size());
                unsafe { self.inner.dealloc(ptr, layout) };
                new_ptr
            }
        }
    } else {
        unsafe impl<A: GlobalAlloc, const N: usize> GlobalAlloc for TracingAllocator<A, N> {
            #[inline]
            unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
                unsafe { self.inner.alloc(layout) }
            }

            #[inline]
            unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
                unsafe { self.inner.alloc_zeroed(layout) }
            }

            #[inline]
            unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
                unsafe { self.inner.dealloc(ptr, layout) }
            }

            #[inline]
            unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
                unsafe { self.inner.realloc(ptr, layout, new_size) }
            }
        }
    }
}
