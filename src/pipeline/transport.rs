use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{RecvTimeoutError, Sender};
use tracing::{debug, info};

use super::Pipeline;

/// Runs the scheduler on its own thread.
///
/// The thread wakes every poll interval, locks the pipeline and fires whatever
/// ticks fall inside the lookahead. Host edits lock the same pipeline, so a
/// tick and an edit never overlap.
pub struct Transport {
    pipeline: Arc<Mutex<Pipeline>>,
    stop_tx: Option<Sender<()>>,
    thread: Option<thread::JoinHandle<()>>,
}

impl Transport {
    pub fn spawn(pipeline: Pipeline, poll_interval: Duration) -> Self {
        let pipeline = Arc::new(Mutex::new(pipeline));
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);

        let shared = Arc::clone(&pipeline);
        let thread = thread::spawn(move || {
            info!("scheduler thread up, polling every {:?}", poll_interval);
            loop {
                let fired = lock(&shared).pump();
                if fired > 0 {
                    debug!("fired {} tick(s)", fired);
                }
                match stop_rx.recv_timeout(poll_interval) {
                    Err(RecvTimeoutError::Timeout) => continue,
                    _ => break,
                }
            }
            info!("scheduler thread stopped");
        });

        Self {
            pipeline,
            stop_tx: Some(stop_tx),
            thread: Some(thread),
        }
    }

    /// Exclusive access for an edit; ticks wait until the guard drops.
    pub fn pipeline(&self) -> MutexGuard<'_, Pipeline> {
        lock(&self.pipeline)
    }

    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.stop();
    }
}

// a panic mid-tick leaves plain data behind, still fine to keep using
fn lock(pipeline: &Mutex<Pipeline>) -> MutexGuard<'_, Pipeline> {
    pipeline.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
