//! Background expiry thread for the response cache.
//!
//! The thread parks on a condition variable between passes, so a stop request
//! wakes it immediately instead of waiting out the sweep interval.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use crate::cache::Shared;

struct StopSignal {
    stopped: Mutex<bool>,
    wake: Condvar,
}

/// Owns the sweeper thread; stopping (or dropping) it joins the thread.
pub struct SweeperHandle {
    signal: Arc<StopSignal>,
    thread: Option<JoinHandle<()>>,
}

impl SweeperHandle {
    /// Signals the sweeper and waits for it to exit.
    pub fn stop(mut self) {
        self.halt();
    }

    fn halt(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        *self.signal.stopped.lock() = true;
        self.signal.wake.notify_all();
        if thread.join().is_err() {
            warn!("cache sweeper panicked");
        }
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.halt();
    }
}

pub(crate) fn spawn(shared: Arc<Shared>, interval: Duration) -> io::Result<SweeperHandle> {
    let signal = Arc::new(StopSignal {
        stopped: Mutex::new(false),
        wake: Condvar::new(),
    });
    let thread_signal = Arc::clone(&signal);

    let thread = thread::Builder::new()
        .name("isrv-cache-sweeper".into())
        .spawn(move || run(&shared, &thread_signal, interval))?;

    Ok(SweeperHandle {
        signal,
        thread: Some(thread),
    })
}

fn run(shared: &Shared, signal: &StopSignal, interval: Duration) {
    loop {
        {
            let mut stopped = signal.stopped.lock();
            if !*stopped {
                signal.wake.wait_for(&mut stopped, interval);
            }
            if *stopped {
                break;
            }
        }

        let removed = shared.clean_at(std::time::Instant::now());
        if removed > 0 {
            debug!(removed, "swept idle cache entries");
        }
    }
    debug!("cache sweeper stopped");
}
