use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::Context;
use std::task::Poll;

use futures::future::BoxFuture;
use futures::future::Fuse;
use futures::future::FusedFuture;
use futures::FutureExt;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::Error;
use crate::Result;

/// Terminal outcome of a [`Single`]: a value, an empty completion or an error
pub type Outcome<T> = Result<Option<T>>;

type Deliver<T> = Box<dyn FnOnce(Outcome<T>) + Send>;

/// Completion side of a [`Single`], handed to the dispatcher.
///
/// Every terminal method consumes the sink, so a dispatcher cannot signal
/// twice. Dropping the sink without signalling surfaces as
/// [`Error::Abandoned`] on the handle.
pub struct ValueSink<T> {
    deliver: Deliver<T>,
    token: CancellationToken,
}

impl<T: Send + 'static> ValueSink<T> {
    fn new(
        tx: oneshot::Sender<Outcome<T>>,
        token: CancellationToken,
    ) -> Self {
        Self {
            deliver: Box::new(move |outcome| {
                if tx.send(outcome).is_err() {
                    trace!("Single dropped before its terminal signal, outcome suppressed");
                }
            }),
            token,
        }
    }

    pub fn success(
        self,
        value: T,
    ) {
        (self.deliver)(Ok(Some(value)))
    }

    pub fn empty(self) {
        (self.deliver)(Ok(None))
    }

    pub fn error(
        self,
        error: Error,
    ) {
        (self.deliver)(Err(error))
    }

    pub fn send(
        self,
        outcome: Outcome<T>,
    ) {
        (self.deliver)(outcome)
    }

    /// True once the consumer dropped the handle
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Token cancelled when the consumer goes away
    pub fn cancellation(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Sink for a dispatcher producing `S`, converted into this sink's `T`.
    /// A `None` from `f` turns the value into an empty completion.
    pub fn adapt<S, F>(
        self,
        f: F,
    ) -> ValueSink<S>
    where
        S: Send + 'static,
        F: FnOnce(S) -> Option<T> + Send + 'static,
    {
        let deliver = self.deliver;
        ValueSink {
            deliver: Box::new(move |outcome: Outcome<S>| deliver(outcome.map(|value| value.and_then(f)))),
            token: self.token,
        }
    }
}

impl<T> fmt::Debug for ValueSink<T> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("ValueSink")
            .field("cancelled", &self.token.is_cancelled())
            .finish()
    }
}

/// Cold single-value handle.
///
/// Resolves to `Ok(Some(value))`, `Ok(None)` for an empty completion, or
/// `Err(error)`. The registration runs on first poll; dropping the handle
/// earlier cancels the dispatch and suppresses whatever arrives later.
/// Once resolved the handle is fused and never yields again.
#[must_use = "a Single does nothing until it is awaited"]
pub struct Single<T> {
    inner: Fuse<BoxFuture<'static, Outcome<T>>>,
}

impl<T: Send + 'static> Single<T> {
    /// Wraps a dispatcher registration. A registration error becomes the
    /// handle's error output.
    pub fn from_registration<F>(register: F) -> Self
    where
        F: FnOnce(ValueSink<T>) -> Result<()> + Send + 'static,
    {
        let inner = async move {
            let token = CancellationToken::new();
            let (tx, rx) = oneshot::channel();
            let sink = ValueSink::new(tx, token.clone());
            let guard = token.drop_guard();

            register(sink)?;

            let outcome = rx.await.unwrap_or(Err(Error::Abandoned));
            guard.disarm();
            outcome
        };
        Self {
            inner: inner.boxed().fuse(),
        }
    }

    /// Converts the value, leaving empty completions and errors untouched
    pub fn map<U, F>(
        self,
        f: F,
    ) -> Single<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        let inner = self.inner;
        Single {
            inner: async move { inner.await.map(|value| value.map(f)) }.boxed().fuse(),
        }
    }
}

impl<T> Future for Single<T> {
    type Output = Outcome<T>;

    fn poll(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Self::Output> {
        self.inner.poll_unpin(cx)
    }
}

impl<T> FusedFuture for Single<T> {
    fn is_terminated(&self) -> bool {
        self.inner.is_terminated()
    }
}

impl<T> fmt::Debug for Single<T> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Single")
            .field("terminated", &self.inner.is_terminated())
            .finish()
    }
}
