use crate::accumulator::{self, Accumulator};
use crate::error::{MetricsError, Result};
use crate::global;
use crate::{otel_debug, otel_error, otel_info, otel_warn};
use std::env;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Mutex;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

/// Environment variable holding the collection interval in milliseconds.
pub const OTEL_METRIC_EXPORT_INTERVAL: &str = "OTEL_METRIC_EXPORT_INTERVAL";

/// Create a builder for a controller that collects `accumulator` periodically.
pub fn push(accumulator: Accumulator) -> PushControllerBuilder {
    let interval = env::var(OTEL_METRIC_EXPORT_INTERVAL)
        .ok()
        .and_then(|v| v.trim().parse().map(Duration::from_millis).ok())
        .filter(|interval| !interval.is_zero())
        .unwrap_or(DEFAULT_INTERVAL);

    PushControllerBuilder {
        accumulator,
        interval,
    }
}

/// Configuration for a [`PushController`].
#[derive(Debug)]
pub struct PushControllerBuilder {
    accumulator: Accumulator,
    interval: Duration,
}

impl PushControllerBuilder {
    /// The time between collections.
    ///
    /// This option overrides any value set for the `OTEL_METRIC_EXPORT_INTERVAL`
    /// environment variable. If it is not used or `interval` is zero, 60
    /// seconds is used.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        if !interval.is_zero() {
            self.interval = interval;
        }
        self
    }

    /// Start the background collection thread.
    pub fn build(self) -> PushController {
        PushController::new(self.accumulator, self.interval)
    }
}

#[derive(Debug)]
enum Message {
    Flush(Sender<usize>),
    Shutdown(Sender<()>),
}

/// Calls [`Accumulator::collect`] on a dedicated thread every interval.
///
/// The time spent collecting counts towards the interval. Shutting the
/// controller down, explicitly or by dropping it, stops the thread and then
/// shuts the accumulator down, which performs one last collection.
pub struct PushController {
    accumulator: Accumulator,
    message_sender: Mutex<Sender<Message>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    is_shutdown: AtomicBool,
}

impl fmt::Debug for PushController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PushController")
            .field("accumulator", &self.accumulator)
            .field("is_shutdown", &self.is_shutdown.load(Ordering::Relaxed))
            .finish()
    }
}

impl PushController {
    fn new(accumulator: Accumulator, interval: Duration) -> Self {
        let (message_sender, message_receiver): (Sender<Message>, Receiver<Message>) =
            mpsc::channel();
        let collector = accumulator.clone();

        let worker = thread::Builder::new()
            .name("OpenTelemetry.Metrics.PushController".to_string())
            .spawn(move || run(collector, message_receiver, interval));

        let worker = match worker {
            Ok(handle) => Some(handle),
            Err(err) => {
                otel_error!(
                    name: "PushController.ThreadStartError",
                    error = format!("{:?}", err)
                );
                None
            }
        };

        PushController {
            accumulator,
            message_sender: Mutex::new(message_sender),
            worker: Mutex::new(worker),
            is_shutdown: AtomicBool::new(false),
        }
    }

    /// The accumulator this controller collects.
    pub fn accumulator(&self) -> &Accumulator {
        &self.accumulator
    }

    /// Collect now on the controller thread, returning the number of records
    /// checkpointed. The next periodic collection is rescheduled from now.
    pub fn force_collect(&self) -> Result<usize> {
        if accumulator::in_observer() {
            return Err(MetricsError::CollectInObserver);
        }
        if self.is_shutdown.load(Ordering::Acquire) {
            return Err(MetricsError::AlreadyShutdown);
        }
        let (response_tx, response_rx) = mpsc::channel();
        self.message_sender
            .lock()?
            .send(Message::Flush(response_tx))
            .map_err(|e| MetricsError::Other(e.to_string()))?;

        response_rx
            .recv()
            .map_err(|e| MetricsError::Other(format!("collection thread is gone: {}", e)))
    }

    /// Stop the controller thread and shut the accumulator down.
    pub fn shutdown(&self) -> Result<()> {
        if self.is_shutdown.swap(true, Ordering::AcqRel) {
            return Err(MetricsError::AlreadyShutdown);
        }

        let (response_tx, response_rx) = mpsc::channel();
        let sent = self
            .message_sender
            .lock()?
            .send(Message::Shutdown(response_tx))
            .is_ok();
        if sent && response_rx.recv().is_err() {
            otel_warn!(name: "PushController.ShutdownUnacknowledged");
        }
        if let Some(handle) = self.worker.lock()?.take() {
            if handle.join().is_err() {
                otel_warn!(name: "PushController.ThreadPanicked");
            }
        }

        self.accumulator.shutdown()
    }
}

impl Drop for PushController {
    fn drop(&mut self) {
        if self.is_shutdown.load(Ordering::Acquire) {
            return;
        }
        if let Err(err) = self.shutdown() {
            global::handle_error(err);
        }
    }
}

fn run(accumulator: Accumulator, messages: Receiver<Message>, interval: Duration) {
    otel_info!(
        name: "PushController.ThreadStarted",
        interval_ms = interval.as_millis() as u64
    );
    let mut remaining_interval = interval;
    loop {
        match messages.recv_timeout(remaining_interval) {
            Ok(Message::Flush(response_sender)) => {
                otel_debug!(name: "PushController.CollectingDueToFlush");
                let checkpointed = accumulator.collect();
                let _ = response_sender.send(checkpointed);
                remaining_interval = interval;
            }
            Ok(Message::Shutdown(response_sender)) => {
                let _ = response_sender.send(());
                break;
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                let collect_start = Instant::now();
                let checkpointed = accumulator.collect();
                otel_debug!(
                    name: "PushController.CollectedDueToTimer",
                    checkpointed = checkpointed
                );

                // A collection slower than the interval is followed immediately
                // by the next one.
                remaining_interval = interval.saturating_sub(collect_start.elapsed());
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
    otel_info!(name: "PushController.ThreadStopped");
}
