use std::future::Future;

use futures::StreamExt;

use crate::StreamProducer;

/// Trait for waiting on a producer's values asynchronously
pub trait Wait<T: 'static> {
    /// Wait for the producer to hold a specific value
    fn wait_value(&self, target_value: T) -> impl Future<Output = ()> + Send
    where T: PartialEq;

    /// Wait for the producer to hold a value matching the given predicate
    fn wait_for<F, R>(&self, predicate: F) -> impl Future<Output = R::Output> + Send
    where
        F: Fn(&T) -> R + Send + 'static,
        R: WaitResult;
}

/// Helper trait for `wait_for` to allow flexible predicate return types.
///
/// - `result()` returns `Some(output)` to stop waiting and return `output`
/// - `result()` returns `None` to continue waiting for the next value
pub trait WaitResult {
    type Output;
    fn result(self) -> Option<Self::Output>;
}

impl WaitResult for bool {
    type Output = ();
    fn result(self) -> Option<Self::Output> { if self { Some(()) } else { None } }
}

impl<T> WaitResult for Option<T> {
    type Output = T;
    fn result(self) -> Option<Self::Output> { self }
}

impl<T> Wait<T> for StreamProducer<T>
where T: Clone + Send + 'static
{
    fn wait_value(&self, target_value: T) -> impl Future<Output = ()> + Send
    where T: PartialEq {
        self.wait_for(move |value| *value == target_value)
    }

    fn wait_for<F, R>(&self, predicate: F) -> impl Future<Output = R::Output> + Send
    where
        F: Fn(&T) -> R + Send + 'static,
        R: WaitResult,
    {
        // the stream replays the current value first, so an already-matching value resolves immediately
        let mut stream = self.stream();
        async move {
            loop {
                match stream.next().await {
                    Some(value) => {
                        if let Some(output) = predicate(&value).result() {
                            return output;
                        }
                    }
                    // only reachable if the producer is dropped while we are waiting on it
                    None => std::future::pending::<()>().await,
                }
            }
        }
    }
}
