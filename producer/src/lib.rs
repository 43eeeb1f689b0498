/*!
A single-writer, multi-reader value broadcaster.

A [`StreamProducer`] holds a current value and hands out any number of independent
[`ValueStream`]s. Each stream starts with the value held at the moment it registers, then
receives every later [`StreamProducer::set_value`] in order, until the stream is closed or
dropped.

# Design requirements:
- One value slot, overwritten on every update. No topics, no history beyond the current value.
- Every stream sees every update from its registration on, exactly once and in call order.
- Setting a value never waits on a consumer.
- Streams and guards hold weak references; dropping the last producer handle frees it.
- A stream that is never polled never registers.

# Basic usage

```rust
use futures::StreamExt;
use stream_producer::StreamProducer;

# #[tokio::main(flavor = "current_thread")]
# async fn main() {
let producer = StreamProducer::with_value(1);
let mut stream = producer.stream();
assert_eq!(stream.next().await, Some(1));

producer.set_value(2);
producer.set_value(3);
assert_eq!(stream.next().await, Some(2));
assert_eq!(stream.next().await, Some(3));

// a late joiner starts from the current value
let mut late = producer.stream();
assert_eq!(late.next().await, Some(3));
# }
```

# Seeding with a future

```rust
use futures::StreamExt;
use stream_producer::StreamProducer;

# #[tokio::main(flavor = "current_thread")]
# async fn main() {
let producer = StreamProducer::with_next_value(Some("cached"), async { "fresh" });
let mut stream = producer.stream();
assert_eq!(stream.next().await, Some("cached"));
assert_eq!(stream.next().await, Some("fresh"));
# }
```
*/

mod error;
mod listener;
mod producer;
mod stream;
mod task;
mod wait;

pub use error::*;
pub use listener::*;
pub use producer::*;
pub use stream::*;
pub use wait::*;
