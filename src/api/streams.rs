// Stream adapters over the engine's broadcast channels

use futures::stream::{Stream, StreamExt};
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;

/// Adapt a broadcast receiver into a `futures::Stream`.
///
/// Lagged receivers skip the dropped messages and continue; the stream
/// ends when the sending side is dropped (e.g. the session stopped and the
/// channel was replaced by the next start).
pub fn broadcast_stream<T: Clone + Send + 'static>(
    rx: broadcast::Receiver<T>,
) -> impl Stream<Item = T> {
    BroadcastStream::new(rx).filter_map(|result| async move {
        match result {
            Ok(item) => Some(item),
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                log::warn!("[stream] Subscriber lagged, skipped {} messages", skipped);
                None
            }
        }
    })
}
