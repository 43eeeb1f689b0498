use std::pin::Pin;
use std::sync::Weak;
use std::task::{Context, Poll};

use futures::Stream;
use futures::stream::FusedStream;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::TryNextError;
use crate::listener::ListenerId;
use crate::producer::Inner;

/// Keeps a listener registered. Dropping it deregisters the listener.
///
/// Holds only a weak reference, so it neither keeps the producer alive nor fails once the
/// producer is gone.
pub struct ListenerGuard<T> {
    producer: Weak<Inner<T>>,
    id: ListenerId,
}

impl<T> ListenerGuard<T> {
    pub(crate) fn new(producer: Weak<Inner<T>>, id: ListenerId) -> Self { Self { producer, id } }

    pub fn id(&self) -> ListenerId { self.id }
}

impl<T> Drop for ListenerGuard<T> {
    fn drop(&mut self) {
        if let Some(inner) = self.producer.upgrade() {
            inner.deregister(self.id);
        }
    }
}

/// A stream of a [`StreamProducer`](crate::StreamProducer)'s values.
///
/// Registers with the producer on first poll. The first item is the value the producer held at
/// that moment, if it held one; after that, every value set on the producer arrives exactly once
/// and in order. Values are buffered without bound until consumed.
///
/// Dropping the stream or calling [`close`](Self::close) deregisters it. The stream ends when it
/// is closed or when its producer is dropped.
pub struct ValueStream<T> {
    state: StreamState<T>,
}

enum StreamState<T> {
    Pending(Weak<Inner<T>>),
    Active { rx: mpsc::UnboundedReceiver<T>, _guard: ListenerGuard<T> },
    Closed,
}

impl<T: Clone + Send + 'static> ValueStream<T> {
    pub(crate) fn new(producer: Weak<Inner<T>>) -> Self { Self { state: StreamState::Pending(producer) } }

    fn activate(&mut self) -> Option<&mut mpsc::UnboundedReceiver<T>> {
        if let StreamState::Pending(producer) = &self.state {
            self.state = match producer.upgrade() {
                Some(inner) => {
                    let (tx, rx) = mpsc::unbounded_channel();
                    StreamState::Active { rx, _guard: inner.listen(tx) }
                }
                None => {
                    debug!("stream polled after its producer was dropped");
                    StreamState::Closed
                }
            };
        }
        match &mut self.state {
            StreamState::Active { rx, .. } => Some(rx),
            _ => None,
        }
    }

    /// Returns the next buffered value without waiting, registering first if needed.
    pub fn try_next(&mut self) -> Result<T, TryNextError> {
        let result = match self.activate() {
            Some(rx) => rx.try_recv().map_err(TryNextError::from),
            None => Err(TryNextError::Closed),
        };
        if matches!(result, Err(TryNextError::Closed)) {
            self.state = StreamState::Closed;
        }
        result
    }
}

impl<T> ValueStream<T> {
    /// Deregisters from the producer and ends the stream. Buffered values are discarded.
    /// Calling it again is a no-op.
    pub fn close(&mut self) { self.state = StreamState::Closed; }

    /// Whether the stream has registered with its producer and is still receiving.
    pub fn is_active(&self) -> bool { matches!(self.state, StreamState::Active { .. }) }
}

impl<T: Clone + Send + 'static> Stream for ValueStream<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        let this = self.get_mut();
        let polled = match this.activate() {
            Some(rx) => rx.poll_recv(cx),
            None => Poll::Ready(None),
        };
        if let Poll::Ready(None) = polled {
            this.state = StreamState::Closed;
        }
        polled
    }
}

impl<T: Clone + Send + 'static> FusedStream for ValueStream<T> {
    fn is_terminated(&self) -> bool { matches!(self.state, StreamState::Closed) }
}

impl<T> std::fmt::Debug for ValueStream<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &self.state {
            StreamState::Pending(_) => "pending",
            StreamState::Active { .. } => "active",
            StreamState::Closed => "closed",
        };
        f.debug_struct("ValueStream").field("state", &state).finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::{StreamProducer, TryNextError};

    #[test]
    fn test_registers_on_first_poll_only() {
        let producer = StreamProducer::with_value(3);
        let mut stream = producer.stream();
        assert!(!stream.is_active());
        assert_eq!(producer.listener_count(), 0);

        assert_eq!(stream.try_next(), Ok(3));
        assert!(stream.is_active());
        assert_eq!(producer.listener_count(), 1);
        assert_eq!(stream.try_next(), Err(TryNextError::Empty));
    }

    #[test]
    fn test_close_is_idempotent() {
        let producer = StreamProducer::<i32>::new();
        let mut stream = producer.stream();
        assert_eq!(stream.try_next(), Err(TryNextError::Empty));

        stream.close();
        stream.close();
        assert_eq!(producer.listener_count(), 0);
        producer.set_value(1);
        assert_eq!(stream.try_next(), Err(TryNextError::Closed));
    }

    #[test]
    fn test_closing_unpolled_stream() {
        let producer = StreamProducer::with_value(1);
        let mut stream = producer.stream();
        stream.close();
        assert_eq!(stream.try_next(), Err(TryNextError::Closed));
        assert_eq!(producer.listener_count(), 0);
    }

    #[test]
    fn test_producer_dropped_before_first_poll() {
        let producer = StreamProducer::with_value(1);
        let mut stream = producer.stream();
        drop(producer);
        assert_eq!(stream.try_next(), Err(TryNextError::Closed));
    }
}
