use thiserror::Error;

/// Returned by [`ValueStream::try_next`](crate::ValueStream::try_next) when no value is ready.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TryNextError {
    #[error("no value is waiting in the stream")]
    Empty,
    #[error("stream is closed")]
    Closed,
}

impl From<tokio::sync::mpsc::error::TryRecvError> for TryNextError {
    fn from(e: tokio::sync::mpsc::error::TryRecvError) -> Self {
        match e {
            tokio::sync::mpsc::error::TryRecvError::Empty => TryNextError::Empty,
            tokio::sync::mpsc::error::TryRecvError::Disconnected => TryNextError::Closed,
        }
    }
}
