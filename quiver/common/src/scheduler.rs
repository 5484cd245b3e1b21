use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Runs a closure on a dedicated thread at a fixed period until stopped.
///
/// Used for the WAL flusher and the storage garbage collector. Stopping (or
/// dropping) the scheduler wakes the thread immediately so shutdown never
/// waits out a full period.
pub struct Scheduler {
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

struct Shared {
    stopped: Mutex<bool>,
    condvar: Condvar,
}

impl Scheduler {
    pub fn run<F>(name: &str, period: Duration, mut f: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let shared = Arc::new(Shared {
            stopped: Mutex::new(false),
            condvar: Condvar::new(),
        });
        let thread_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name(name.to_owned())
            .spawn(move || loop {
                {
                    let mut stopped = thread_shared.stopped.lock().unwrap();
                    while !*stopped {
                        let (guard, timeout) = thread_shared
                            .condvar
                            .wait_timeout(stopped, period)
                            .unwrap();
                        stopped = guard;
                        if timeout.timed_out() {
                            break;
                        }
                    }
                    if *stopped {
                        return;
                    }
                }
                f();
            })
            .expect("failed to spawn scheduler thread");
        Scheduler {
            shared,
            handle: Some(handle),
        }
    }

    pub fn stop(&mut self) {
        *self.shared.stopped.lock().unwrap() = true;
        self.shared.condvar.notify_all();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn runs_periodically_and_stops() {
        let counter = Arc::new(AtomicUsize::new(0));
        let task_counter = Arc::clone(&counter);
        let mut scheduler = Scheduler::run("test-scheduler", Duration::from_millis(5), move || {
            task_counter.fetch_add(1, Ordering::SeqCst);
        });
        thread::sleep(Duration::from_millis(60));
        scheduler.stop();
        let ticks = counter.load(Ordering::SeqCst);
        assert!(ticks > 0);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(counter.load(Ordering::SeqCst), ticks);
    }
}
