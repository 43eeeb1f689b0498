use std::hash::{Hash, Hasher};
use std::sync::Arc;

use ulid::Ulid;

/// Unique identifier for a listener registration. Only ever compared or hashed,
/// it carries no ordering meaning and cannot be used to reconstruct a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(Ulid);

impl Default for ListenerId {
    fn default() -> Self { Self::new() }
}

impl ListenerId {
    pub fn new() -> Self { Self(Ulid::new()) }
}

impl std::fmt::Display for ListenerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "VL-{}", self.0) }
}

/// A callback that pushes one value into one consumer, paired with an identity.
///
/// Closures can't be compared, so equality and hashing go through the [`ListenerId`]
/// minted at construction. Two listeners wrapping the same closure are still distinct.
pub struct ValueListener<T> {
    id: ListenerId,
    push: Arc<dyn Fn(T) + Send + Sync + 'static>,
}

impl<T> ValueListener<T> {
    pub fn new<F>(push: F) -> Self
    where F: Fn(T) + Send + Sync + 'static {
        Self { id: ListenerId::new(), push: Arc::new(push) }
    }

    pub fn id(&self) -> ListenerId { self.id }

    /// Hands one value to the consumer. Must not block.
    pub fn push(&self, value: T) { (self.push)(value) }
}

impl<T> Clone for ValueListener<T> {
    fn clone(&self) -> Self { Self { id: self.id, push: self.push.clone() } }
}

impl<T> PartialEq for ValueListener<T> {
    fn eq(&self, other: &Self) -> bool { self.id == other.id }
}

impl<T> Eq for ValueListener<T> {}

impl<T> Hash for ValueListener<T> {
    fn hash<H: Hasher>(&self, state: &mut H) { self.id.hash(state) }
}

impl<T> std::fmt::Debug for ValueListener<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.debug_struct("ValueListener").field("id", &self.id).finish() }
}

/// Trait for types that can be turned into a [`ValueListener`].
pub trait IntoValueListener<T> {
    fn into_value_listener(self) -> ValueListener<T>;
}

impl<F, T> IntoValueListener<T> for F
where F: Fn(T) + Send + Sync + 'static
{
    fn into_value_listener(self) -> ValueListener<T> { ValueListener::new(self) }
}

impl<T> IntoValueListener<T> for ValueListener<T> {
    fn into_value_listener(self) -> ValueListener<T> { self }
}

// A closed receiver turns the push into a no-op
impl<T> IntoValueListener<T> for tokio::sync::mpsc::UnboundedSender<T>
where T: Send + 'static
{
    fn into_value_listener(self) -> ValueListener<T> {
        ValueListener::new(move |value| {
            let _ = self.send(value);
        })
    }
}

impl<T> IntoValueListener<T> for std::sync::mpsc::Sender<T>
where T: Send + 'static
{
    fn into_value_listener(self) -> ValueListener<T> {
        ValueListener::new(move |value| {
            let _ = self.send(value);
        })
    }
}
