//! Caller attribution for allocations.
//!
//! `GlobalAlloc` is never told who asked for memory, so the allocator wrapper attributes each
//! allocation to the innermost call site that is active on the allocating thread. Sites are
//! entered with [`CallSite::enter`], usually through `#[heaptrace::track]` or the
//! [`call_site!`](crate::call_site!) macro, and stay active until the returned guard drops.

use std::cell::Cell;
use std::marker::PhantomData;

thread_local! {
    static CURRENT: Cell<usize> = const { Cell::new(0) };
}

/// Namespace for the per-thread call-site stack.
pub struct CallSite;

impl CallSite {
    /// Makes `address` the current call site of this thread until the guard is dropped.
    #[inline]
    pub fn enter(address: usize) -> CallSiteGuard {
        let previous = CURRENT.with(|current| current.replace(address));
        CallSiteGuard {
            previous,
            _not_send: PhantomData,
        }
    }

    /// Address of the innermost active call site on this thread, or 0 when there is none.
    #[inline]
    pub fn current() -> usize {
        CURRENT.try_with(Cell::get).unwrap_or(0)
    }
}

/// Restores the previously active call site on drop.
///
/// Guards are tied to the thread that created them.
#[must_use = "the call site is left as soon as the guard is dropped"]
pub struct CallSiteGuard {
    previous: usize,
    _not_send: PhantomData<*const ()>,
}

impl Drop for CallSiteGuard {
    #[inline]
    fn drop(&mut self) {
        let previous = self.previous;
        let _ = CURRENT.try_with(|current| current.set(previous));
    }
}

/// Evaluates to a code address inside the enclosing function, suitable as a call-site
/// identity that `addr2line` can map back to a source location.
///
/// With an argument, enters that site for the rest of the enclosing scope:
///
/// ```rust
/// fn load_config() -> Vec<u8> {
///     heaptrace::call_site!(enter);
///     vec![0; 128]
/// }
/// # load_config();
/// ```
#[macro_export]
macro_rules! call_site {
    () => {{
        fn __heaptrace_site() {}
        __heaptrace_site as fn() as usize
    }};
    (enter) => {
        let __heaptrace_site_guard = $crate::CallSite::enter($crate::call_site!());
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_site_is_zero() {
        std::thread::spawn(|| assert_eq!(CallSite::current(), 0))
            .join()
            .unwrap();
    }

    #[test]
    fn guards_nest_and_restore() {
        let outer = CallSite::enter(0x100);
        assert_eq!(CallSite::current(), 0x100);
        {
            let _inner = CallSite::enter(0x200);
            assert_eq!(CallSite::current(), 0x200);
        }
        assert_eq!(CallSite::current(), 0x100);
        drop(outer);
        assert_eq!(CallSite::current(), 0);
    }

    #[test]
    fn sites_are_per_thread() {
        let _site = CallSite::enter(0x300);
        std::thread::spawn(|| assert_eq!(CallSite::current(), 0))
            .join()
            .unwrap();
        assert_eq!(CallSite::current(), 0x300);
    }

    #[test]
    fn macro_addresses_are_stable_per_site() {
        fn site() -> usize {
            crate::call_site!()
        }
        let first = site();
        assert_ne!(first, 0);
        assert_eq!(first, site());
    }

    #[test]
    fn enter_form_covers_the_enclosing_scope() {
        {
            crate::call_site!(enter);
            assert_ne!(CallSite::current(), 0);
        }
        assert_eq!(CallSite::current(), 0);
    }
}
