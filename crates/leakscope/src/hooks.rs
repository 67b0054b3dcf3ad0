//! Interception points between a program's allocation calls and the ledger.
//!
//! Two capture paths feed the same [`Ledger`]:
//!
//! - [`TracingAllocator`] installs as the global allocator and observes every
//!   heap operation transparently; call sites are recorded as `unknown`.
//!   This is what the source injector wires into a target program.
//! - [`traced_alloc`] / [`traced_dealloc`] and [`TracedBox`] are explicit
//!   routing points for code written against the API. They are
//!   `#[track_caller]`, so the caller's file and line are attributed at the
//!   call itself, with no stack walking at runtime.

use std::alloc::{GlobalAlloc, Layout, System};
use std::cell::Cell;
use std::ops::{Deref, DerefMut};

use crate::ledger::{CallSite, Ledger};

thread_local! {
    /// Set while the ledger itself is running, so its own allocations never
    /// re-enter the tracking path.
    static IN_HOOK: Cell<bool> = const { Cell::new(false) };
}

fn with_reentrancy_guard(f: impl FnOnce()) {
    IN_HOOK.with(|flag| {
        if flag.get() {
            return;
        }
        flag.set(true);
        f();
        flag.set(false);
    });
}

/// Global allocator wrapper that reports every allocation and release to the
/// process-wide ledger.
///
/// The instrumentation preamble installs it in the target program:
///
/// ```rust,ignore
/// #[global_allocator]
/// static __LEAKSCOPE_GLOBAL: leakscope::TracingAllocator = leakscope::TracingAllocator;
/// ```
///
/// Bookkeeping is skipped, never failed, when it cannot run; the underlying
/// allocation always goes through.
pub struct TracingAllocator;

unsafe impl GlobalAlloc for TracingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = unsafe { System.alloc(layout) };
        if !ptr.is_null() {
            with_reentrancy_guard(|| {
                crate::global().record_allocation(ptr as usize, layout.size(), CallSite::unknown());
            });
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        if !ptr.is_null() {
            with_reentrancy_guard(|| {
                crate::global().record_deallocation(ptr as usize);
            });
        }
        unsafe { System.dealloc(ptr, layout) };
    }
}

/// Allocates through the system allocator and records the caller's call site
/// in `ledger`. A failed underlying allocation returns null and is not
/// recorded.
///
/// # Safety
///
/// `layout` must have non-zero size, as required by [`GlobalAlloc::alloc`].
#[track_caller]
pub unsafe fn traced_alloc(ledger: &Ledger, layout: Layout) -> *mut u8 {
    let site = CallSite::caller();
    let ptr = unsafe { System.alloc(layout) };
    if !ptr.is_null() {
        ledger.record_allocation(ptr as usize, layout.size(), site);
    }
    ptr
}

/// Releases memory obtained from [`traced_alloc`] and marks the record freed.
///
/// # Safety
///
/// `ptr` must have been returned by [`traced_alloc`] with the same `layout`
/// and not released before.
pub unsafe fn traced_dealloc(ledger: &Ledger, ptr: *mut u8, layout: Layout) {
    if ptr.is_null() {
        return;
    }
    ledger.record_deallocation(ptr as usize);
    unsafe { System.dealloc(ptr, layout) };
}

/// Owning box that reports its allocation to a ledger at creation and its
/// release on drop, carrying the creator's call site.
///
/// This is the tracking wrapper for code that wants precise per-site
/// attribution without installing [`TracingAllocator`].
pub struct TracedBox<'a, T> {
    value: Option<Box<T>>,
    ledger: &'a Ledger,
}

impl<T> TracedBox<'static, T> {
    /// Boxes `value` against the process-wide ledger.
    #[track_caller]
    pub fn new(value: T) -> Self {
        Self::new_in(crate::global(), value)
    }
}

impl<'a, T> TracedBox<'a, T> {
    /// Boxes `value` against an explicit ledger.
    #[track_caller]
    pub fn new_in(ledger: &'a Ledger, value: T) -> Self {
        let site = CallSite::caller();
        let boxed = Box::new(value);
        ledger.record_allocation(
            &*boxed as *const T as usize,
            std::mem::size_of::<T>(),
            site,
        );
        Self {
            value: Some(boxed),
            ledger,
        }
    }

    /// Address of the boxed value, the ledger key for this allocation.
    pub fn address(&self) -> usize {
        self.value
            .as_deref()
            .map(|value| value as *const T as usize)
            .unwrap_or(0)
    }

    /// Takes the value out, recording the release.
    pub fn into_inner(mut self) -> T {
        let boxed = self.value.take().expect("value present until drop");
        self.ledger
            .record_deallocation(&*boxed as *const T as usize);
        *boxed
    }

    /// Relinquishes the box without recording a release; the allocation
    /// stays visible to the leak detector.
    pub fn leak(mut self) -> Box<T> {
        self.value.take().expect("value present until drop")
    }
}

impl<T> Deref for TracedBox<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.value.as_deref().expect("value present until drop")
    }
}

impl<T> DerefMut for TracedBox<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.value.as_deref_mut().expect("value present until drop")
    }
}

impl<T> Drop for TracedBox<'_, T> {
    fn drop(&mut self) {
        if let Some(boxed) = self.value.take() {
            self.ledger
                .record_deallocation(&*boxed as *const T as usize);
        }
    }
}
