use std::panic::Location;
use std::sync::{Mutex, MutexGuard};

/// Lock `mutex`, recovering the guard if a previous holder panicked.
///
/// The mock VM is shared across test threads and the event loop; a panic in
/// one assertion must not cascade into unrelated poison errors elsewhere.
#[track_caller]
pub(crate) fn lock<'a, T>(mutex: &'a Mutex<T>, context: &'static str) -> MutexGuard<'a, T> {
    mutex.lock().unwrap_or_else(|err| {
        let loc = Location::caller();
        tracing::error!(
            target: "nova.jdwp",
            context,
            file = loc.file(),
            line = loc.line(),
            error = %err,
            "mock VM state poisoned; continuing with recovered guard"
        );
        err.into_inner()
    })
}
