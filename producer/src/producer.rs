use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::{debug, trace, warn};
use ulid::Ulid;

use crate::listener::{IntoValueListener, ListenerId, ValueListener};
use crate::stream::{ListenerGuard, ValueStream};
use crate::task;

/// Identifies a producer in log output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProducerId(Ulid);

impl ProducerId {
    fn new() -> Self { Self(Ulid::new()) }
}

impl std::fmt::Display for ProducerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "SP-{}", self.0) }
}

/// Holds a current value and hands out streams of it.
///
/// Every stream from [`StreamProducer::stream`] starts with the value held when the stream
/// registers (if any), followed by every value passed to [`StreamProducer::set_value`] after
/// that, in call order. Streams are independent: each one sees every update, none of them
/// consume values from the others.
///
/// Cloning is cheap and yields another handle to the same producer. Streams and
/// [`ListenerGuard`]s hold only weak references, so once all handles are dropped the producer
/// is freed and its streams end after yielding whatever they already buffered.
pub struct StreamProducer<T>(pub(crate) Arc<Inner<T>>);

/// Non-owning handle to a [`StreamProducer`].
pub struct WeakStreamProducer<T>(Weak<Inner<T>>);

pub(crate) struct Inner<T> {
    id: ProducerId,
    state: Mutex<State<T>>,
}

struct State<T> {
    current: Option<T>,
    listeners: HashMap<ListenerId, ValueListener<T>>,
}

impl<T> Inner<T> {
    // Nothing in State is left half-updated by a panicking listener, so a poisoned lock is still usable
    fn lock(&self) -> MutexGuard<'_, State<T>> { self.state.lock().unwrap_or_else(PoisonError::into_inner) }

    /// Removes a listener. Unknown ids are ignored.
    pub(crate) fn deregister(&self, id: ListenerId) -> bool {
        let removed = self.lock().listeners.remove(&id).is_some();
        if removed {
            debug!("{} deregistered {}", self.id, id);
        }
        removed
    }
}

impl<T: Clone> Inner<T> {
    /// Registers a listener and replays the current value into it.
    ///
    /// Replay and insertion happen under the same lock as [`Inner::set`], so the listener sees
    /// either the old value followed by the new one, or only the new one. Never both twice.
    fn register(&self, listener: ValueListener<T>) {
        let mut state = self.lock();
        if let Some(value) = &state.current {
            listener.push(value.clone());
        }
        debug!("{} registered {} (replayed: {})", self.id, listener.id(), state.current.is_some());
        state.listeners.insert(listener.id(), listener);
    }

    pub(crate) fn listen<L>(self: &Arc<Self>, listener: L) -> ListenerGuard<T>
    where L: IntoValueListener<T> {
        let listener = listener.into_value_listener();
        let id = listener.id();
        self.register(listener);
        ListenerGuard::new(Arc::downgrade(self), id)
    }

    fn set(&self, value: T) {
        let mut state = self.lock();
        trace!("{} fan-out to {} listeners", self.id, state.listeners.len());
        for listener in state.listeners.values() {
            listener.push(value.clone());
        }
        state.current = Some(value);
    }
}

impl<T> Clone for StreamProducer<T> {
    fn clone(&self) -> Self { Self(self.0.clone()) }
}

impl<T> Clone for WeakStreamProducer<T> {
    fn clone(&self) -> Self { Self(self.0.clone()) }
}

impl<T> std::fmt::Debug for StreamProducer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamProducer").field("id", &self.0.id).field("listeners", &self.listener_count()).finish()
    }
}

impl<T: Clone + Send + 'static> Default for StreamProducer<T> {
    fn default() -> Self { Self::new() }
}

impl<T> StreamProducer<T> {
    fn from_initial(current: Option<T>) -> Self {
        let inner = Inner { id: ProducerId::new(), state: Mutex::new(State { current, listeners: HashMap::new() }) };
        Self(Arc::new(inner))
    }

    pub fn id(&self) -> ProducerId { self.0.id }

    /// Number of currently registered listeners, pending streams excluded.
    pub fn listener_count(&self) -> usize { self.0.lock().listeners.len() }

    pub fn downgrade(&self) -> WeakStreamProducer<T> { WeakStreamProducer(Arc::downgrade(&self.0)) }
}

impl<T> StreamProducer<T>
where T: Clone + Send + 'static
{
    /// Creates a producer with no value. Streams stay silent until the first [`set_value`](Self::set_value).
    pub fn new() -> Self { Self::from_initial(None) }

    /// Creates a producer whose streams start with `value`.
    pub fn with_value(value: T) -> Self { Self::from_initial(Some(value)) }

    /// Creates a producer and spawns `next_value`, installing its output through
    /// [`set_value`](Self::set_value) once it resolves.
    ///
    /// With an `initial` value, a stream registered early enough sees `initial` and then the
    /// resolved value. The spawned task keeps the producer alive until `next_value` resolves;
    /// a future that never resolves means no second value is ever broadcast.
    ///
    /// Construction itself has no failure modes; the only requirement is a runtime to spawn on.
    ///
    /// # Panics
    /// Outside of a tokio runtime, as [`tokio::spawn`] does.
    pub fn with_next_value<F>(initial: Option<T>, next_value: F) -> Self
    where F: Future<Output = T> + Send + 'static {
        let producer = Self::from_initial(initial);
        let seeded = producer.clone();
        task::spawn(async move {
            let value = next_value.await;
            debug!("{} next value resolved", seeded.id());
            seeded.set_value(value);
        });
        producer
    }

    /// Like [`with_next_value`](Self::with_next_value), for a fallible future. An `Err` is
    /// logged and nothing is broadcast.
    ///
    /// # Panics
    /// Outside of a tokio runtime, as [`tokio::spawn`] does.
    pub fn with_try_next_value<F, E>(initial: Option<T>, next_value: F) -> Self
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
        E: std::fmt::Display,
    {
        let producer = Self::from_initial(initial);
        let seeded = producer.clone();
        task::spawn(async move {
            match next_value.await {
                Ok(value) => {
                    debug!("{} next value resolved", seeded.id());
                    seeded.set_value(value);
                }
                Err(e) => warn!("{} next value failed: {}", seeded.id(), e),
            }
        });
        producer
    }

    /// Replaces the current value and pushes it to every registered listener.
    ///
    /// Pushes are non-blocking handoffs, so this never waits on a consumer.
    pub fn set_value(&self, value: T) { self.0.set(value) }

    /// Returns a clone of the current value
    pub fn current_value(&self) -> Option<T> { self.0.lock().current.clone() }

    /// Calls a closure with a borrow of a snapshot of the current value.
    ///
    /// The value is cloned out first and the lock released before `f` runs, so `f` may call
    /// back into this producer.
    pub fn with_current<R>(&self, f: impl FnOnce(Option<&T>) -> R) -> R {
        let current = self.current_value();
        f(current.as_ref())
    }

    /// Returns a new stream of this producer's values.
    ///
    /// The stream registers lazily on its first poll, so an unpolled stream costs nothing here.
    pub fn stream(&self) -> ValueStream<T> { ValueStream::new(Arc::downgrade(&self.0)) }

    /// Registers a listener directly, replaying the current value into it first.
    ///
    /// The listener is invoked while the producer's state is locked. It must return promptly
    /// and must not call back into this producer; channel senders are the intended use.
    pub fn listen<L>(&self, listener: L) -> ListenerGuard<T>
    where L: IntoValueListener<T> {
        self.0.listen(listener)
    }
}

impl StreamProducer<()> {
    /// Signals every stream without a payload.
    pub fn notify_event(&self) { self.set_value(()) }
}

impl<T> WeakStreamProducer<T> {
    pub fn upgrade(&self) -> Option<StreamProducer<T>> { self.0.upgrade().map(StreamProducer) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_set_before_listeners_is_stored() {
        let producer = StreamProducer::new();
        assert_eq!(producer.current_value(), None);

        producer.set_value(1);
        producer.set_value(2);
        assert_eq!(producer.current_value(), Some(2));
        assert_eq!(producer.with_current(|v| v.copied()), Some(2));
        assert_eq!(producer.listener_count(), 0);
    }

    #[test]
    fn test_listen_replays_then_follows() {
        let producer = StreamProducer::with_value("a");
        let (tx, rx) = mpsc::channel();
        let guard = producer.listen(tx);
        assert_eq!(producer.listener_count(), 1);

        producer.set_value("b");
        producer.set_value("c");
        assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec!["a", "b", "c"]);

        drop(guard);
        assert_eq!(producer.listener_count(), 0);
        producer.set_value("d");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_listen_without_value_does_not_replay() {
        let producer = StreamProducer::<u32>::new();
        let (tx, rx) = mpsc::channel();
        let _guard = producer.listen(tx);
        assert!(rx.try_recv().is_err());

        producer.set_value(7);
        assert_eq!(rx.try_recv(), Ok(7));
    }

    #[test]
    fn test_each_listener_receives_every_value() {
        let producer = StreamProducer::new();
        let (tx1, rx1) = mpsc::channel();
        let (tx2, rx2) = mpsc::channel();
        let _g1 = producer.listen(tx1);
        let _g2 = producer.listen(tx2);

        for i in 0..10 {
            producer.set_value(i);
        }
        let expected: Vec<i32> = (0..10).collect();
        assert_eq!(rx1.try_iter().collect::<Vec<_>>(), expected);
        assert_eq!(rx2.try_iter().collect::<Vec<_>>(), expected);
    }

    #[test]
    fn test_notify_event() {
        let producer = StreamProducer::<()>::new();
        let (tx, rx) = mpsc::channel();
        let _guard = producer.listen(tx);

        producer.notify_event();
        producer.notify_event();
        assert_eq!(rx.try_iter().count(), 2);
        assert_eq!(producer.current_value(), Some(()));
    }

    #[test]
    fn test_with_current_allows_reentry() {
        let producer = StreamProducer::with_value(1);
        let (done_tx, done_rx) = mpsc::channel();
        {
            let producer = producer.clone();
            std::thread::spawn(move || {
                let seen = producer.with_current(|value| {
                    producer.set_value(2);
                    let _ = format!("{:?}", producer);
                    (value.copied(), producer.current_value(), producer.listener_count())
                });
                let _ = done_tx.send(seen);
            });
        }

        let seen = done_rx.recv_timeout(std::time::Duration::from_secs(5)).expect("with_current did not return");
        assert_eq!(seen, (Some(1), Some(2), 0));
        assert_eq!(producer.current_value(), Some(2));
    }

    #[test]
    fn test_guard_outliving_producer() {
        let producer = StreamProducer::with_value(1);
        let weak = producer.downgrade();
        let guard = producer.listen(|_: i32| {});

        drop(producer);
        assert!(weak.upgrade().is_none());
        // deregistering against a dropped producer is a no-op
        drop(guard);
    }

    #[test]
    fn test_deregister_unknown_id() {
        let producer = StreamProducer::<u8>::new();
        assert!(!producer.0.deregister(ListenerId::new()));
    }

    #[test]
    fn test_concurrent_setters_keep_per_listener_order() {
        let producer = StreamProducer::new();
        let (tx1, rx1) = mpsc::channel();
        let (tx2, rx2) = mpsc::channel();
        let _g1 = producer.listen(tx1);
        let _g2 = producer.listen(tx2);

        let handles: Vec<_> = (0..4u64)
            .map(|thread| {
                let producer = producer.clone();
                std::thread::spawn(move || {
                    for i in 0..250u64 {
                        producer.set_value((thread, i));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let first: Vec<_> = rx1.try_iter().collect();
        let second: Vec<_> = rx2.try_iter().collect();
        assert_eq!(first.len(), 1000);
        // both listeners observe one global order
        assert_eq!(first, second);
        for thread in 0..4u64 {
            let seq: Vec<u64> = first.iter().filter(|(t, _)| *t == thread).map(|(_, i)| *i).collect();
            assert_eq!(seq, (0..250).collect::<Vec<_>>());
        }
        assert_eq!(producer.current_value(), first.last().copied());
    }
}
