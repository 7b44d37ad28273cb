//! # Change Feed Listener
//!
//! Forwards `PixelUpdated` logs from a [`LogStream`] to a callback on a
//! dedicated thread.
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │  LogStream   │ ──▶ │   Forwarder  │ ──▶ │   on_change  │ ──▶ Cache
//! │  (Bounded)   │     │   (Parser)   │     │   callback   │
//! └──────────────┘     └──────────────┘     └──────────────┘
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::RecvTimeoutError;
use tracing::{debug, info};

use crate::events::{EventParser, PixelChange};
use crate::ledger::LogStream;

/// How often the forwarder checks whether it was stopped.
const STOP_POLL: Duration = Duration::from_millis(50);

/// Callback invoked for every parsed change.
pub type ChangeCallback = Box<dyn FnMut(PixelChange) + Send + 'static>;

/// Statistics for the change feed.
#[derive(Debug, Default)]
pub struct ListenerStats {
    /// Raw logs received.
    pub logs_received: AtomicU64,
    /// Logs parsed into changes and delivered.
    pub events_delivered: AtomicU64,
    /// Logs that were not `PixelUpdated` or were malformed.
    pub parse_errors: AtomicU64,
}

/// A running change feed. Dropping it unsubscribes.
pub struct ChangeSubscription {
    /// Whether the forwarder should keep running.
    running: Arc<AtomicBool>,
    /// Forwarder thread.
    handle: Option<JoinHandle<()>>,
    /// Delivery statistics.
    stats: Arc<ListenerStats>,
}

impl ChangeSubscription {
    /// Starts forwarding `stream` into `on_change`.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the forwarder thread cannot be spawned.
    pub fn spawn(stream: LogStream, mut on_change: ChangeCallback) -> std::io::Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let stats = Arc::new(ListenerStats::default());

        let thread_running = Arc::clone(&running);
        let thread_stats = Arc::clone(&stats);
        let handle = std::thread::Builder::new()
            .name("pixelwar-change-feed".to_string())
            .spawn(move || {
                info!("change feed started");
                while thread_running.load(Ordering::Relaxed) {
                    let log = match stream.receiver().recv_timeout(STOP_POLL) {
                        Ok(log) => log,
                        Err(RecvTimeoutError::Timeout) => continue,
                        Err(RecvTimeoutError::Disconnected) => break,
                    };
                    thread_stats.logs_received.fetch_add(1, Ordering::Relaxed);

                    match EventParser::parse_pixel_updated(&log.topics, &log.data, log.block_number)
                    {
                        Some(change) => {
                            thread_stats.events_delivered.fetch_add(1, Ordering::Relaxed);
                            on_change(change);
                        }
                        None => {
                            thread_stats.parse_errors.fetch_add(1, Ordering::Relaxed);
                            debug!(block = log.block_number, "ignoring unrecognised log");
                        }
                    }
                }
                stream.close();
                thread_running.store(false, Ordering::SeqCst);
                info!("change feed stopped");
            })?;

        Ok(Self {
            running,
            handle: Some(handle),
            stats,
        })
    }

    /// Checks if the feed is still running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Returns a reference to the statistics.
    #[must_use]
    pub fn stats(&self) -> Arc<ListenerStats> {
        Arc::clone(&self.stats)
    }

    /// Stops the feed and waits for the forwarder to exit.
    pub fn unsubscribe(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            // A callback dropping its own subscription must not join itself.
            if handle.thread().id() != std::thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

impl Drop for ChangeSubscription {
    fn drop(&mut self) {
        self.stop();
    }
}
