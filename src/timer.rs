// Numan Thabit 2026
// timer.rs - periodic maintenance driver

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::debug;

/// Runs a job on a background thread at a fixed interval.
///
/// Dropping the handle stops the thread promptly: the worker is
/// signalled out of its timed wait instead of sleeping out the rest of
/// the interval.
pub(crate) struct Periodic {
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

struct Shared {
    stop: Mutex<bool>,
    signal: Condvar,
}

impl Periodic {
    pub(crate) fn spawn<F>(name: &str, every: Duration, mut job: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let shared = Arc::new(Shared {
            stop: Mutex::new(false),
            signal: Condvar::new(),
        });
        let worker_shared = Arc::clone(&shared);
        let name = name.to_owned();
        let handle = thread::spawn(move || {
            let mut next = Instant::now() + every;
            let mut stop = worker_shared.stop.lock();
            while !*stop {
                if worker_shared.signal.wait_until(&mut stop, next).timed_out() {
                    drop(stop);
                    job();
                    next = Instant::now() + every;
                    stop = worker_shared.stop.lock();
                }
            }
            debug!(worker = %name, "periodic worker stopped");
        });
        Self {
            shared,
            handle: Some(handle),
        }
    }
}

impl Drop for Periodic {
    fn drop(&mut self) {
        {
            let mut stop = self.shared.stop.lock();
            *stop = true;
        }
        self.shared.signal.notify_one();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn fires_repeatedly_until_dropped() {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let periodic = Periodic::spawn("test-periodic", Duration::from_millis(10), move || {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        let deadline = Instant::now() + Duration::from_secs(2);
        while count.load(Ordering::SeqCst) < 3 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(count.load(Ordering::SeqCst) >= 3, "job never fired");

        drop(periodic);
        let frozen = count.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(count.load(Ordering::SeqCst), frozen);
    }

    #[test]
    fn drop_before_first_interval_is_prompt() {
        let started = Instant::now();
        let periodic = Periodic::spawn("test-idle", Duration::from_secs(60), || {});
        drop(periodic);
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
