//! Endless record stream over the swappable handle.
//!
//! [`RecordStream`] turns the poll loop into a [`futures::Stream`]. Each
//! inner poll grabs whichever client is current *at that moment*, so the
//! stream keeps producing across cluster switches without the iterating
//! code noticing; it ends only when the handle closes.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::Stream;
use futures::future::BoxFuture;
use parking_lot::RwLock;
use streamline_types::ConsumerRecord;

use crate::discovery::DiscoveryResult;
use crate::error::{ClientError, Result};
use crate::handle::ClientHandle;
use crate::patterns::unresolve_topic;
use crate::transport::ConsumerTransport;

/// Default per-poll timeout for [`RecordStream`].
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(200);

/// A stream of consumer records that survives client switches.
///
/// Idle polls (no record within the poll timeout) are absorbed; errors are
/// yielded as items and the stream continues, except `Shutdown`, which ends
/// it.
pub struct RecordStream<C: ConsumerTransport> {
    handle: Arc<ClientHandle<C>>,
    result: Arc<RwLock<Option<DiscoveryResult>>>,
    poll_timeout: Duration,
    in_flight: Option<BoxFuture<'static, Result<Option<ConsumerRecord>>>>,
}

impl<C: ConsumerTransport> RecordStream<C> {
    pub(crate) fn new(
        handle: Arc<ClientHandle<C>>,
        result: Arc<RwLock<Option<DiscoveryResult>>>,
        poll_timeout: Duration,
    ) -> Self {
        Self { handle, result, poll_timeout, in_flight: None }
    }

    fn next_poll(&self) -> BoxFuture<'static, Result<Option<ConsumerRecord>>> {
        let handle = Arc::clone(&self.handle);
        let result = Arc::clone(&self.result);
        let timeout = self.poll_timeout;
        Box::pin(async move {
            // Current client is re-read per poll; a switch between polls is
            // picked up transparently.
            let client = handle.current()?;
            let record = client.poll(timeout).await?;
            let snapshot = result.read().clone();
            Ok(record.map(|r| match &snapshot {
                Some(res) => ConsumerRecord { topic: unresolve_topic(res, &r.topic), ..r },
                None => r,
            }))
        })
    }
}

impl<C: ConsumerTransport> Stream for RecordStream<C> {
    type Item = Result<ConsumerRecord>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            let Some(fut) = this.in_flight.as_mut() else {
                this.in_flight = Some(this.next_poll());
                continue;
            };
            match fut.as_mut().poll(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(outcome) => {
                    this.in_flight = None;
                    match outcome {
                        Ok(Some(record)) => return Poll::Ready(Some(Ok(record))),
                        // Idle poll; issue the next one.
                        Ok(None) => {}
                        Err(ClientError::Shutdown) => return Poll::Ready(None),
                        Err(e) => return Poll::Ready(Some(Err(e))),
                    }
                }
            }
        }
    }
}

impl<C: ConsumerTransport> std::fmt::Debug for RecordStream<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStream")
            .field("poll_timeout", &self.poll_timeout)
            .field("in_flight", &self.in_flight.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;
    use streamline_types::RecordTimestamp;

    use super::*;
    use crate::discovery::fields;
    use crate::mock::MockConsumerFactory;
    use crate::properties::ClientProperties;
    use crate::transport::TransportFactory;

    fn record(topic: &str, offset: i64) -> ConsumerRecord {
        ConsumerRecord {
            topic: topic.to_owned(),
            partition: 0,
            offset,
            key: None,
            value: None,
            headers: Vec::new(),
            timestamp: RecordTimestamp::NotAvailable,
        }
    }

    async fn stream_fixture() -> (Arc<ClientHandle<crate::mock::MockConsumer>>, RecordStream<crate::mock::MockConsumer>, crate::mock::MockConsumer)
    {
        let factory = MockConsumerFactory::new();
        let client = factory.build(&ClientProperties::new()).await.unwrap();
        let handle = Arc::new(ClientHandle::with_client(client));
        let client = factory.last_built().unwrap();

        let result = Arc::new(RwLock::new(Some(
            DiscoveryResult::builder()
                .field(fields::TENANT, "acme")
                .field(fields::TOPIC_PATTERN, "{tenant}-{topic}")
                .build(),
        )));
        let stream =
            RecordStream::new(Arc::clone(&handle), result, Duration::from_millis(5));
        (handle, stream, client)
    }

    #[tokio::test]
    async fn test_stream_yields_unresolved_records() {
        let (_handle, mut stream, client) = stream_fixture().await;
        client.push_record(record("acme-orders", 0));
        client.push_record(record("acme-orders", 1));

        let first = stream.next().await.unwrap().unwrap();
        let second = stream.next().await.unwrap().unwrap();
        assert_eq!(first.topic, "orders");
        assert_eq!(first.offset, 0);
        assert_eq!(second.offset, 1);
    }

    #[tokio::test]
    async fn test_stream_absorbs_idle_polls() {
        let (_handle, mut stream, client) = stream_fixture().await;

        let waiter = tokio::spawn(async move { stream.next().await });
        // A few idle polls elapse before the record shows up.
        tokio::time::sleep(Duration::from_millis(20)).await;
        client.push_record(record("acme-orders", 3));

        let item = waiter.await.unwrap().unwrap().unwrap();
        assert_eq!(item.offset, 3);
        assert!(client.poll_count() > 1);
    }

    #[tokio::test]
    async fn test_stream_ends_on_shutdown() {
        let (handle, mut stream, _client) = stream_fixture().await;
        handle.close();
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_stream_yields_call_errors_and_continues() {
        let (_handle, mut stream, client) = stream_fixture().await;
        client.fail_calls(true);

        let err = stream.next().await.unwrap().unwrap_err();
        assert!(matches!(err, ClientError::Call { .. }));

        client.fail_calls(false);
        client.push_record(record("acme-orders", 9));
        let item = stream.next().await.unwrap().unwrap();
        assert_eq!(item.offset, 9);
    }

    #[tokio::test]
    async fn test_stream_follows_a_swap() {
        let (handle, mut stream, first) = stream_fixture().await;
        first.push_record(record("acme-orders", 0));
        assert_eq!(stream.next().await.unwrap().unwrap().offset, 0);

        let factory = MockConsumerFactory::new();
        let replacement = factory.build(&ClientProperties::new()).await.unwrap();
        handle.swap(Arc::new(replacement));
        let replacement = factory.last_built().unwrap();
        replacement.push_record(record("acme-orders", 100));

        let item = stream.next().await.unwrap().unwrap();
        assert_eq!(item.offset, 100);
        assert!(replacement.poll_count() >= 1);
    }
}
