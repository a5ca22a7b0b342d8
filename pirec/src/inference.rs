//! Scoped inference-only execution.
//!
//! Sub-models only evaluate while an [`InferenceMode`] guard is alive on the
//! current thread. Guards nest and release on drop, so every exit path
//! (including `?` and panics) leaves the scope.

use std::cell::Cell;
use std::marker::PhantomData;

thread_local! {
    static DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// RAII guard marking the current thread as inference-only.
#[must_use = "inference mode ends when the guard is dropped"]
pub struct InferenceMode {
    // Not Send: the scope belongs to the thread that entered it.
    _thread: PhantomData<*const ()>,
}

impl InferenceMode {
    /// Enters inference mode until the returned guard is dropped.
    pub fn enter() -> Self {
        DEPTH.with(|d| d.set(d.get() + 1));
        Self {
            _thread: PhantomData,
        }
    }
}

impl Drop for InferenceMode {
    fn drop(&mut self) {
        DEPTH.with(|d| d.set(d.get().saturating_sub(1)));
    }
}

/// Returns true while at least one guard is alive on this thread.
pub fn is_active() -> bool {
    DEPTH.with(|d| d.get() > 0)
}

/// Runs `f` inside inference mode.
pub fn no_grad<T>(f: impl FnOnce() -> T) -> T {
    let _guard = InferenceMode::enter();
    f()
}
