//! EventStream - a cancellable, unbounded producer of typed events
//!
//! Both the periodic store poll and the live companion push are exposed as
//! an `EventStream`. Two kinds of producer feed it:
//!
//! - a spawned task (`EventStream::spawn`), aborted on cancel
//! - a listener registration (`EventStream::listen`), whose cleanup hook
//!   runs on cancel
//!
//! Cancel is idempotent and also runs on drop. Once cancelled the stream
//! yields `None` forever, even if items are still buffered.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::Stream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Buffer used for push-driven streams; overflow drops the newest item.
pub const LISTENER_BUFFER: usize = 64;

/// The producing half handed to a task or a listener callback.
pub struct EventSink<T> {
    tx: mpsc::Sender<T>,
}

impl<T> Clone for EventSink<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> EventSink<T> {
    /// Wait for buffer space and emit. `false` once the stream is gone.
    pub async fn send(&self, item: T) -> bool {
        self.tx.send(item).await.is_ok()
    }

    /// Emit without waiting. `false` if the stream is gone or the buffer is full.
    pub fn try_send(&self, item: T) -> bool {
        match self.tx.try_send(item) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                log::warn!("Event stream buffer full, dropping item");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer half. Implements `futures_util::Stream`.
pub struct EventStream<T> {
    rx: mpsc::Receiver<T>,
    producer: Option<JoinHandle<()>>,
    cleanup: Option<Box<dyn FnOnce() + Send>>,
    cancelled: bool,
}

impl<T: Send + 'static> EventStream<T> {
    /// Drive the stream from a spawned task. Must be called inside a tokio runtime.
    pub fn spawn<F, Fut>(producer: F) -> Self
    where
        F: FnOnce(EventSink<T>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(1);
        let handle = tokio::spawn(producer(EventSink { tx }));
        Self {
            rx,
            producer: Some(handle),
            cleanup: None,
            cancelled: false,
        }
    }

    /// Drive the stream from a callback registration.
    ///
    /// `register` receives the sink and returns the hook that undoes the
    /// registration. The hook runs exactly once, on cancel or drop.
    pub fn listen<R, C>(register: R) -> Self
    where
        R: FnOnce(EventSink<T>) -> C,
        C: FnOnce() + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(LISTENER_BUFFER);
        let cleanup = register(EventSink { tx });
        Self {
            rx,
            producer: None,
            cleanup: Some(Box::new(cleanup)),
            cancelled: false,
        }
    }
}

impl<T> EventStream<T> {
    /// Stop further emissions and release the producer.
    pub fn cancel(&mut self) {
        if self.cancelled {
            return;
        }
        self.cancelled = true;
        self.rx.close();
        if let Some(handle) = self.producer.take() {
            handle.abort();
        }
        if let Some(cleanup) = self.cleanup.take() {
            cleanup();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }
}

impl<T> Stream for EventStream<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        let this = self.get_mut();
        if this.cancelled {
            return Poll::Ready(None);
        }
        this.rx.poll_recv(cx)
    }
}

impl<T> Drop for EventStream<T> {
    fn drop(&mut self) {
        self.cancel();
    }
}
