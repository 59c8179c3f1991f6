use std::sync::{Mutex, MutexGuard};

fn log_poisoned(lock_type: &str, context: &str) {
    log::error!("{} lock poisoned in {}", lock_type, context);
}

/// Locks, recovering the guard if a previous holder panicked.
pub fn lock_mutex<'a, T>(mutex: &'a Mutex<T>, context: &str) -> MutexGuard<'a, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            log_poisoned("Mutex", context);
            poisoned.into_inner()
        }
    }
}
