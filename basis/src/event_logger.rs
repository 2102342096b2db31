use basis_instrument::{event::Event, Timestamp};
use parking_lot::Mutex;
use std::{
    io::Write,
    path::PathBuf,
    sync::atomic::{AtomicU64, Ordering},
};
use tokio::sync::mpsc;
use tracing::error;

/// How many events may be buffered ahead of the writer before new ones are dropped (spec.md
/// §4.11 "buffer up to configured high-water mark, then drop with CRITICAL").
const DEFAULT_HIGH_WATER_MARK: usize = 10_000;

/// Appends structured [`Event`]s to durable storage (`events.jsonl`) in FIFO order via a single
/// background writer (spec.md §4.11). `order_within_T` is assigned here: an atomic counter reset
/// every time `T` advances, guaranteeing that for any two events on the same `T`, the one logged
/// first has the smaller `order_within_T`.
#[derive(Debug)]
pub struct EventLogger {
    tx: mpsc::Sender<Event>,
    writer: Mutex<Option<tokio::task::JoinHandle<()>>>,
    current_t: Mutex<Option<Timestamp>>,
    order_counter: AtomicU64,
}

impl EventLogger {
    /// Spawn the background writer appending newline-delimited JSON to `path`.
    pub fn spawn(path: PathBuf) -> Self {
        Self::spawn_with_capacity(path, DEFAULT_HIGH_WATER_MARK)
    }

    pub fn spawn_with_capacity(path: PathBuf, capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<Event>(capacity);

        let writer = tokio::spawn(async move {
            let file = match std::fs::OpenOptions::new().create(true).append(true).open(&path) {
                Ok(file) => file,
                Err(e) => {
                    error!(error = %e, path = %path.display(), "EventLogger: failed to open sink");
                    return;
                }
            };
            let mut writer = std::io::BufWriter::new(file);

            while let Some(event) = rx.recv().await {
                match serde_json::to_string(&event) {
                    Ok(line) => {
                        if writeln!(writer, "{line}").is_err() || writer.flush().is_err() {
                            error!("EventLogger: sink write failed");
                        }
                    }
                    Err(e) => error!(error = %e, "EventLogger: event serialisation failed"),
                }
            }
        });

        Self {
            tx,
            writer: Mutex::new(Some(writer)),
            current_t: Mutex::new(None),
            order_counter: AtomicU64::new(0),
        }
    }

    /// Assign `order_within_T` (resetting the counter if `event.timestamp` advanced since the
    /// last call) and enqueue. Never blocks the caller for longer than a bounded `try_send`.
    pub fn log(&self, mut event: Event) {
        {
            let mut current_t = self.current_t.lock();
            if *current_t != Some(event.timestamp) {
                *current_t = Some(event.timestamp);
                self.order_counter.store(0, Ordering::SeqCst);
            }
        }
        event.order_within_t = self.order_counter.fetch_add(1, Ordering::SeqCst);

        if self.tx.try_send(event).is_err() {
            error!("EventLogger: CRITICAL - high-water mark exceeded, event dropped");
        }
    }

    /// Close the enqueue side and wait for the writer to drain and exit. Consumes `self` so the
    /// sender is dropped before the writer task is awaited; otherwise the writer's `recv` loop
    /// never observes channel closure and `close` would hang forever.
    pub async fn close(self) {
        let handle = self.writer.lock().take();
        drop(self.tx);
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}
