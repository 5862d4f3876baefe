use std::fmt;
use std::mem;
use std::pin::Pin;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::task::Context;
use std::task::Poll;

use futures::stream::FusedStream;
use futures::Stream;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::trace;

use crate::metrics::STREAM_CANCELLATIONS;
use crate::Error;
use crate::Result;

/// Signal travelling from a dispatcher to a [`Multi`]
#[derive(Debug)]
pub enum Signal<T> {
    Item(T),
    Complete,
    Error(Error),
}

/// State shared by a stream handle and every clone of its sink
#[derive(Debug, Default)]
struct StreamControl {
    /// A terminal signal was accepted, or the consumer went away
    closed: AtomicBool,
    cancelled: AtomicBool,
    token: CancellationToken,
}

impl StreamControl {
    /// Returns true for the first cancellation only
    fn cancel(&self) -> bool {
        self.closed.store(true, Ordering::Release);
        let first = !self.cancelled.swap(true, Ordering::AcqRel);
        self.token.cancel();
        first
    }
}

type Emit<T> = Arc<dyn Fn(Signal<T>) + Send + Sync>;

/// Producer side of a [`Multi`].
///
/// Cheap to clone; every node of a fan-out gets its own clone. The first
/// terminal signal wins and closes the sink for everyone, later items and
/// terminals are discarded.
pub struct ItemSink<T> {
    emit: Emit<T>,
    control: Arc<StreamControl>,
}

impl<T> Clone for ItemSink<T> {
    fn clone(&self) -> Self {
        Self {
            emit: self.emit.clone(),
            control: self.control.clone(),
        }
    }
}

impl<T: Send + 'static> ItemSink<T> {
    fn new(
        tx: mpsc::UnboundedSender<Signal<T>>,
        control: Arc<StreamControl>,
    ) -> Self {
        Self {
            emit: Arc::new(move |signal| {
                // receiver gone means the consumer already finished
                let _ = tx.send(signal);
            }),
            control,
        }
    }

    /// Pushes one item. Returns false once the stream is closed, which
    /// tells the producer to stop.
    pub fn item(
        &self,
        value: T,
    ) -> bool {
        if self.control.closed.load(Ordering::Acquire) {
            return false;
        }
        (self.emit)(Signal::Item(value));
        true
    }

    pub fn complete(&self) -> bool {
        self.terminate(Signal::Complete)
    }

    pub fn error(
        &self,
        error: Error,
    ) -> bool {
        self.terminate(Signal::Error(error))
    }

    pub fn signal(
        &self,
        signal: Signal<T>,
    ) -> bool {
        match signal {
            Signal::Item(value) => self.item(value),
            terminal => self.terminate(terminal),
        }
    }

    fn terminate(
        &self,
        signal: Signal<T>,
    ) -> bool {
        if self
            .control
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            trace!("stream already closed, terminal signal discarded");
            return false;
        }
        (self.emit)(signal);
        true
    }

    pub fn is_closed(&self) -> bool {
        self.control.closed.load(Ordering::Acquire)
    }

    pub fn is_cancelled(&self) -> bool {
        self.control.cancelled.load(Ordering::Acquire)
    }

    /// Token cancelled when the consumer cancels or drops the stream
    pub fn cancellation(&self) -> CancellationToken {
        self.control.token.clone()
    }

    /// Sink for a producer of `S` items. Items mapped to `None` are
    /// skipped; terminals pass through unchanged.
    pub fn adapt<S, F>(
        &self,
        f: F,
    ) -> ItemSink<S>
    where
        S: Send + 'static,
        F: Fn(S) -> Option<T> + Send + Sync + 'static,
    {
        let emit = self.emit.clone();
        ItemSink {
            emit: Arc::new(move |signal: Signal<S>| match signal {
                Signal::Item(value) => {
                    if let Some(mapped) = f(value) {
                        emit(Signal::Item(mapped));
                    }
                }
                Signal::Complete => emit(Signal::Complete),
                Signal::Error(e) => emit(Signal::Error(e)),
            }),
            control: self.control.clone(),
        }
    }
}

impl<T> fmt::Debug for ItemSink<T> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("ItemSink").field("control", &self.control).finish()
    }
}

type StreamRegistration<T> = Box<dyn FnOnce(ItemSink<T>) -> Result<()> + Send>;

enum State<T> {
    Cold(StreamRegistration<T>),
    Live(UnboundedReceiverStream<Signal<T>>),
    Done,
}

/// Cold multi-item handle.
///
/// Yields `Ok(item)` for every item, then ends. An error is yielded once as
/// `Err` and the stream ends right after it. Cancelling (or dropping) the
/// handle stops delivery immediately and cancels the producer.
#[must_use = "a Multi does nothing until it is polled"]
pub struct Multi<T> {
    state: State<T>,
    control: Arc<StreamControl>,
}

impl<T> Unpin for Multi<T> {}

impl<T: Send + 'static> Multi<T> {
    /// Wraps a dispatcher registration, run on first poll. A registration
    /// error is yielded as the only element.
    pub fn from_registration<F>(register: F) -> Self
    where
        F: FnOnce(ItemSink<T>) -> Result<()> + Send + 'static,
    {
        Self {
            state: State::Cold(Box::new(register)),
            control: Arc::new(StreamControl::default()),
        }
    }

}

impl<T> Multi<T> {
    /// Stops delivery and cancels the producer. Idempotent.
    pub fn cancel(&self) {
        cancel_stream(&self.control);
    }

    /// Handle that cancels this stream from elsewhere
    pub fn cancel_handle(&self) -> MultiCancel {
        MultiCancel {
            control: self.control.clone(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.control.cancelled.load(Ordering::Acquire)
    }
}

fn cancel_stream(control: &StreamControl) {
    if control.cancel() {
        STREAM_CANCELLATIONS.inc();
        debug!("stream cancelled by consumer");
    }
}

impl<T: Send + 'static> Stream for Multi<T> {
    type Item = Result<T>;

    fn poll_next(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if this.control.cancelled.load(Ordering::Acquire) {
                this.state = State::Done;
                return Poll::Ready(None);
            }

            match mem::replace(&mut this.state, State::Done) {
                State::Cold(register) => {
                    let (tx, rx) = mpsc::unbounded_channel();
                    let sink = ItemSink::new(tx, this.control.clone());
                    if let Err(e) = register(sink) {
                        debug!(error = %e, "stream registration rejected");
                        this.control.closed.store(true, Ordering::Release);
                        this.control.token.cancel();
                        return Poll::Ready(Some(Err(e)));
                    }
                    this.state = State::Live(UnboundedReceiverStream::new(rx));
                }
                State::Live(mut rx) => match rx.poll_next_unpin(cx) {
                    Poll::Pending => {
                        this.state = State::Live(rx);
                        return Poll::Pending;
                    }
                    Poll::Ready(Some(Signal::Item(value))) => {
                        if this.control.cancelled.load(Ordering::Acquire) {
                            return Poll::Ready(None);
                        }
                        this.state = State::Live(rx);
                        return Poll::Ready(Some(Ok(value)));
                    }
                    Poll::Ready(Some(Signal::Complete)) => return Poll::Ready(None),
                    Poll::Ready(Some(Signal::Error(e))) => return Poll::Ready(Some(Err(e))),
                    Poll::Ready(None) => {
                        debug!("every stream producer dropped without a terminal signal");
                        this.control.closed.store(true, Ordering::Release);
                        return Poll::Ready(Some(Err(Error::Abandoned)));
                    }
                },
                State::Done => return Poll::Ready(None),
            }
        }
    }
}

impl<T: Send + 'static> FusedStream for Multi<T> {
    fn is_terminated(&self) -> bool {
        matches!(self.state, State::Done)
    }
}

impl<T> Drop for Multi<T> {
    fn drop(&mut self) {
        if matches!(self.state, State::Live(_)) {
            cancel_stream(&self.control);
        }
    }
}

impl<T> fmt::Debug for Multi<T> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let state = match self.state {
            State::Cold(_) => "cold",
            State::Live(_) => "live",
            State::Done => "done",
        };
        f.debug_struct("Multi")
            .field("state", &state)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Detached cancellation for a [`Multi`]
#[derive(Debug, Clone)]
pub struct MultiCancel {
    control: Arc<StreamControl>,
}

impl MultiCancel {
    pub fn cancel(&self) {
        cancel_stream(&self.control);
    }

    pub fn is_cancelled(&self) -> bool {
        self.control.cancelled.load(Ordering::Acquire)
    }
}
