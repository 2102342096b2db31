use std::marker::PhantomData;
use tracing::warn;

/// Abstraction over a channel transmitter, generic over the concrete `Item` and `Error`.
///
/// `EventLogger` and `ResultsStore` are both built around one background-writer task per
/// request, reached from the caller's synchronous thread through a `Tx` implementation; this
/// keeps the Engine's full-loop driver from ever blocking on durable-storage I/O.
pub trait Tx
where
    Self: Clone + Send,
{
    type Item;
    type Error;

    fn send(&self, item: Self::Item) -> Result<(), Self::Error>;
}

/// An unbounded MPSC transmitter satisfying [`Tx`].
#[derive(Debug, Clone)]
pub struct UnboundedTx<T, Error> {
    tx: tokio::sync::mpsc::UnboundedSender<T>,
    phantom: PhantomData<Error>,
}

impl<T, Error> UnboundedTx<T, Error> {
    pub fn new(tx: tokio::sync::mpsc::UnboundedSender<T>) -> Self {
        Self {
            tx,
            phantom: PhantomData,
        }
    }
}

impl<T, Error> Tx for UnboundedTx<T, Error>
where
    T: Clone + Send,
    Error: From<tokio::sync::mpsc::error::SendError<T>> + Clone + Send,
{
    type Item = T;
    type Error = Error;

    fn send(&self, item: Self::Item) -> Result<(), Self::Error> {
        self.tx.send(item).map_err(Error::from)
    }
}

/// A bounded MPSC transmitter satisfying [`Tx`], used where a high-water mark on outstanding
/// work is required (eg/ `EventLogger`'s buffer before it starts dropping events with CRITICAL).
#[derive(Debug, Clone)]
pub struct BoundedTx<T, Error> {
    tx: tokio::sync::mpsc::Sender<T>,
    phantom: PhantomData<Error>,
}

impl<T, Error> BoundedTx<T, Error> {
    pub fn new(tx: tokio::sync::mpsc::Sender<T>) -> Self {
        Self {
            tx,
            phantom: PhantomData,
        }
    }

    /// Enqueue without blocking; returns `Err` immediately if the channel is at capacity rather
    /// than waiting, so the caller (the Engine's synchronous full-loop driver) is never blocked
    /// for longer than this bounded check.
    pub fn try_send(&self, item: T) -> Result<(), tokio::sync::mpsc::error::TrySendError<T>> {
        self.tx.try_send(item)
    }
}

/// Construct a connected unbounded `Tx`/`Rx` pair.
pub fn mpsc_unbounded<T, Error>() -> (
    UnboundedTx<T, Error>,
    tokio::sync::mpsc::UnboundedReceiver<T>,
) {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    (UnboundedTx::new(tx), rx)
}

/// Construct a connected bounded `Tx`/`Rx` pair with the given high-water mark.
pub fn mpsc_bounded<T, Error>(
    high_water_mark: usize,
) -> (BoundedTx<T, Error>, tokio::sync::mpsc::Receiver<T>) {
    let (tx, rx) = tokio::sync::mpsc::channel(high_water_mark);
    (BoundedTx::new(tx), rx)
}

/// Log-and-drop enqueue helper used by components that must never propagate a full-channel
/// error to their caller (eg/ `EventLogger::log`).
pub fn send_or_warn<T, Error>(tx: &BoundedTx<T, Error>, item: T, context: &str) {
    if let Err(error) = tx.try_send(item) {
        warn!(%context, "channel at high-water mark, dropping item: {error}");
    }
}
