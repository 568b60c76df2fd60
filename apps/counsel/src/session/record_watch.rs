//! Generic "watch a field on a record" primitive. All three session kinds
//! observe the remote ended-status through this, and the termination path
//! reuses it for reconciliation records, so there is exactly one place that
//! handles the subscribe-race and sender-drop cases.

use futures::StreamExt;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

/// Resolve once the watched record yields a value through `extract`. The
/// current value is inspected first, so a write that landed before the
/// subscription is never missed. Returns `None` if the record's watch closes
/// without the field ever appearing.
pub async fn wait_for_field<R, T, F>(rx: watch::Receiver<Option<R>>, extract: F) -> Option<T>
where
    R: Clone + Send + Sync + 'static,
    F: Fn(&R) -> Option<T>,
{
    let mut stream = WatchStream::new(rx);
    while let Some(snapshot) = stream.next().await {
        if let Some(value) = snapshot.as_ref().and_then(|record| extract(record)) {
            return Some(value);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_from_the_current_value() {
        let (_tx, rx) = watch::channel(Some(7u32));
        let value = wait_for_field(rx, |n: &u32| (*n > 5).then_some(*n)).await;
        assert_eq!(value, Some(7));
    }

    #[tokio::test]
    async fn resolves_on_a_later_write() {
        let (tx, rx) = watch::channel(None::<u32>);
        let waiter = tokio::spawn(wait_for_field(rx, |n: &u32| (*n > 5).then_some(*n)));
        tx.send_replace(Some(3));
        tx.send_replace(Some(9));
        assert_eq!(waiter.await.unwrap(), Some(9));
    }

    #[tokio::test]
    async fn returns_none_when_the_watch_closes() {
        let (tx, rx) = watch::channel(None::<u32>);
        let waiter = tokio::spawn(wait_for_field(rx, |n: &u32| Some(*n)));
        drop(tx);
        assert_eq!(waiter.await.unwrap(), None);
    }
}
