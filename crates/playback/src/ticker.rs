use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, TrySendError};
use tracing::{debug, trace};

/// Background thread posting a tick every `interval`.
///
/// The channel holds a single pending tick; when the consumer falls behind
/// further ticks are dropped instead of queued.
pub struct Ticker {
    rx: Receiver<()>,
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl Ticker {
    pub fn start(interval: Duration) -> Self {
        let (tx, rx) = bounded::<()>(1);
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();
        let handle = thread::spawn(move || {
            while !stop_flag.load(Ordering::Relaxed) {
                thread::sleep(interval);
                match tx.try_send(()) {
                    Ok(()) => {}
                    Err(TrySendError::Full(())) => trace!("tick dropped"),
                    Err(TrySendError::Disconnected(())) => break,
                }
            }
        });
        debug!(interval_ms = interval.as_millis() as u64, "ticker started");
        Self {
            rx,
            stop,
            handle: Some(handle),
        }
    }

    /// Consumes the pending tick, if any.
    pub fn try_tick(&self) -> bool {
        self.rx.try_recv().is_ok()
    }

    /// For callers that want to block on ticks (headless runs).
    pub fn receiver(&self) -> &Receiver<()> {
        &self.rx
    }

    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.stop();
    }
}
