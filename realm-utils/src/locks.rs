//! Lock aliases used across the realm crates.
//!
//! Backed by `parking_lot`, so locks never poison.

/// A synchronous mutex.
pub type SyncMutex<T> = parking_lot::Mutex<T>;

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use super::*;

    #[test]
    fn test_mutex_survives_panicking_holder() {
        let counter = Arc::new(SyncMutex::new(0));
        let held = counter.clone();
        let result = thread::spawn(move || {
            let mut guard = held.lock();
            *guard += 1;
            panic!("holder panicked");
        })
        .join();
        assert!(result.is_err());

        *counter.lock() += 1;
        assert_eq!(*counter.lock(), 2);
    }
}
