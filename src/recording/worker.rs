use super::controller::{RecordingController, RecordingOperations, Transition};
use crate::events;
use crate::CONFIG;
use acs::{AcsError, QueueClient, QueueMessage};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// The message queue the cloud event notifications arrive on.
#[async_trait]
pub trait EventQueue: Send + Sync {
    /// Receives the next batch of messages. An empty batch means the queue is drained.
    async fn receive(&self) -> Result<Vec<QueueMessage>, AcsError>;

    async fn acknowledge(&self, message: &QueueMessage) -> Result<(), AcsError>;
}

/// Azure Storage queue with the batch size and visibility timeout from `Config.toml`.
pub struct StorageQueue {
    client: QueueClient,
    batch_size: u32,
    visibility_timeout: Duration,
}

impl StorageQueue {
    pub fn new(client: QueueClient) -> Self {
        Self {
            client,
            batch_size: CONFIG.queue.batch_size as u32,
            visibility_timeout: Duration::from_secs(CONFIG.queue.visibility_timeout_secs as u64),
        }
    }
}

#[async_trait]
impl EventQueue for StorageQueue {
    async fn receive(&self) -> Result<Vec<QueueMessage>, AcsError> {
        self.client
            .receive_messages(self.batch_size, self.visibility_timeout)
            .await
    }

    async fn acknowledge(&self, message: &QueueMessage) -> Result<(), AcsError> {
        self.client.delete_message(message).await
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to receive queue messages")]
    Receive(#[source] AcsError),
    #[error("failed to acknowledge queue message {message_id}")]
    Acknowledge {
        message_id: String,
        #[source]
        source: AcsError,
    },
}

/// Counters reported when the worker shuts down.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WorkerReport {
    pub drains: u64,
    pub messages: u64,
    pub failures: u64,
}

/// Drains the event queue into the recording controller until cancelled.
/// The worker owns the controller, so exactly one loop drives a session.
pub struct RecordingWorker<Q, R> {
    queue: Q,
    controller: RecordingController<R>,
    poll_interval: Duration,
}

impl<Q: EventQueue, R: RecordingOperations> RecordingWorker<Q, R> {
    pub fn new(queue: Q, controller: RecordingController<R>, poll_interval: Duration) -> Self {
        Self {
            queue,
            controller,
            poll_interval,
        }
    }

    /// Runs the poll loop. Each iteration drains the queue and then waits
    /// `poll_interval`, whether or not anything was received. Cancellation is
    /// only observed between iterations and while waiting.
    pub async fn run(mut self, shutdown: CancellationToken) -> WorkerReport {
        log::debug!("Polling for events every {:?}", self.poll_interval);
        let mut report = WorkerReport::default();

        while !shutdown.is_cancelled() {
            self.drain(&mut report).await;
            report.drains += 1;

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = sleep(self.poll_interval) => {}
            }
        }

        report
    }

    async fn drain(&mut self, report: &mut WorkerReport) {
        loop {
            let batch = match self.queue.receive().await {
                Ok(batch) => batch,
                Err(e) => {
                    log::error!("{:#}", anyhow::Error::new(TransportError::Receive(e)));
                    report.failures += 1;
                    return;
                }
            };
            if batch.is_empty() {
                return;
            }

            for message in batch {
                report.messages += 1;
                report.failures += self.process(&message).await;

                if let Err(source) = self.queue.acknowledge(&message).await {
                    let err = TransportError::Acknowledge {
                        message_id: message.message_id.clone(),
                        source,
                    };
                    log::warn!("{:#}", anyhow::Error::new(err));
                    report.failures += 1;
                }
            }
        }
    }

    /// Decodes and dispatches every event in `message`, returning how many failed.
    async fn process(&mut self, message: &QueueMessage) -> u64 {
        log::debug!(
            "Processing queue message {} (dequeue count {})",
            message.message_id,
            message.dequeue_count
        );

        let envelopes = match events::parse_envelopes(&message.body) {
            Ok(envelopes) => envelopes,
            Err(e) => {
                log::error!("Discarding queue message {}: {e}", message.message_id);
                return 1;
            }
        };

        let mut failures = 0;
        for envelope in envelopes {
            let event = match events::decode(&envelope) {
                Ok(Some(event)) => event,
                Ok(None) => {
                    log::debug!("Ignoring {} event {}", envelope.event_type, envelope.id);
                    continue;
                }
                Err(e) => {
                    log::error!("Failed to decode event: {e}");
                    failures += 1;
                    continue;
                }
            };

            match self.controller.handle(event).await {
                Ok(Transition::Ignored) => {}
                Ok(transition) => log::debug!("Event {} applied: {transition:?}", envelope.id),
                Err(e) => {
                    log::error!("{:#}", anyhow::Error::new(e));
                    failures += 1;
                }
            }
        }

        failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::controller::tests::{settings, Call, FakeOperations};
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    /// Hands out queued batches in order, then empty batches. Records when
    /// each receive happened and which messages were acknowledged.
    #[derive(Clone, Default)]
    struct FakeQueue {
        batches: Arc<Mutex<VecDeque<Result<Vec<QueueMessage>, AcsError>>>>,
        receives: Arc<Mutex<Vec<Instant>>>,
        acknowledged: Arc<Mutex<Vec<String>>>,
    }

    impl FakeQueue {
        fn with_batches(batches: Vec<Result<Vec<QueueMessage>, AcsError>>) -> Self {
            let queue = Self::default();
            queue.batches.lock().unwrap().extend(batches);
            queue
        }

        fn receives(&self) -> Vec<Instant> {
            self.receives.lock().unwrap().clone()
        }

        fn acknowledged(&self) -> Vec<String> {
            self.acknowledged.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EventQueue for FakeQueue {
        async fn receive(&self) -> Result<Vec<QueueMessage>, AcsError> {
            self.receives.lock().unwrap().push(Instant::now());
            self.batches
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }

        async fn acknowledge(&self, message: &QueueMessage) -> Result<(), AcsError> {
            self.acknowledged
                .lock()
                .unwrap()
                .push(message.message_id.clone());
            Ok(())
        }
    }

    fn message(id: &str, body: serde_json::Value) -> QueueMessage {
        QueueMessage {
            message_id: id.to_string(),
            pop_receipt: format!("receipt-{id}"),
            dequeue_count: 1,
            body: body.to_string(),
        }
    }

    fn event(event_type: &str, data: serde_json::Value) -> serde_json::Value {
        json!({
            "id": format!("evt-{event_type}"),
            "source": "/acs",
            "type": format!("Microsoft.Communication.{event_type}"),
            "data": data
        })
    }

    fn worker(
        queue: &FakeQueue,
        operations: &FakeOperations,
    ) -> RecordingWorker<FakeQueue, FakeOperations> {
        RecordingWorker::new(
            queue.clone(),
            RecordingController::new(operations.clone(), settings()),
            Duration::from_secs(1),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn drives_full_recording_lifecycle_and_acknowledges_everything() {
        let queue = FakeQueue::with_batches(vec![
            Ok(vec![
                message("1", event("CallStarted", json!({ "serverCallId": "abc" }))),
                message("2", json!("not an event")),
            ]),
            Ok(vec![message(
                "3",
                event(
                    "RecordingFileStatusUpdated",
                    json!({ "recordingStorageInfo": { "recordingChunks": [
                        { "contentLocation": "https://x/content", "deleteLocation": "https://x/delete" }
                    ] } }),
                ),
            )]),
        ]);
        let operations = FakeOperations::default();
        let shutdown = CancellationToken::new();

        let handle = tokio::spawn(worker(&queue, &operations).run(shutdown.clone()));
        sleep(Duration::from_millis(500)).await;
        shutdown.cancel();
        let report = handle.await.unwrap();

        assert_eq!(
            operations.calls(),
            vec![
                Call::Start("abc".to_string()),
                Call::Download(url::Url::parse("https://x/content").unwrap()),
                Call::Delete(url::Url::parse("https://x/delete").unwrap()),
            ]
        );
        assert_eq!(queue.acknowledged(), ["1", "2", "3"]);
        assert_eq!(report.messages, 3);
        assert_eq!(report.failures, 1);
        // Both batches and the trailing empty receive belong to the first drain.
        assert_eq!(queue.receives().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_poll_interval_between_drains_until_cancelled() {
        let queue = FakeQueue::default();
        let operations = FakeOperations::default();
        let shutdown = CancellationToken::new();

        let handle = tokio::spawn(worker(&queue, &operations).run(shutdown.clone()));
        sleep(Duration::from_millis(3500)).await;
        assert!(!handle.is_finished());

        shutdown.cancel();
        let report = handle.await.unwrap();

        let receives = queue.receives();
        assert_eq!(receives.len(), 4);
        for pair in receives.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_secs(1));
        }
        assert_eq!(report.drains, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_after_a_non_empty_drain_too() {
        let queue = FakeQueue::with_batches(vec![Ok(vec![message(
            "1",
            event("CallEnded", json!({ "serverCallId": "abc" })),
        )])]);
        let operations = FakeOperations::default();
        let shutdown = CancellationToken::new();

        let handle = tokio::spawn(worker(&queue, &operations).run(shutdown.clone()));
        sleep(Duration::from_millis(1500)).await;
        shutdown.cancel();
        handle.await.unwrap();

        let receives = queue.receives();
        assert_eq!(receives.len(), 3);
        assert_eq!(receives[1], receives[0]);
        assert!(receives[2] - receives[1] >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn receive_failure_does_not_stop_the_loop() {
        let queue = FakeQueue::with_batches(vec![
            Err(AcsError::InvalidInput("queue unavailable".to_string())),
            Ok(vec![message(
                "1",
                event("CallStarted", json!({ "serverCallId": "abc" })),
            )]),
        ]);
        let operations = FakeOperations::default();
        let shutdown = CancellationToken::new();

        let handle = tokio::spawn(worker(&queue, &operations).run(shutdown.clone()));
        sleep(Duration::from_millis(1500)).await;
        shutdown.cancel();
        let report = handle.await.unwrap();

        assert_eq!(operations.calls(), vec![Call::Start("abc".to_string())]);
        assert_eq!(report.failures, 1);
        assert_eq!(queue.acknowledged(), ["1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn batched_envelopes_are_dispatched_in_order() {
        let batch = json!([
            event("CallStarted", json!({ "serverCallId": "abc" })),
            event("ParticipantAdded", json!({})),
            event("CallEnded", json!({ "serverCallId": "abc" })),
        ]);
        let queue = FakeQueue::with_batches(vec![Ok(vec![message("1", batch)])]);
        let operations = FakeOperations::failing(&["stop"]);
        let shutdown = CancellationToken::new();

        let handle = tokio::spawn(worker(&queue, &operations).run(shutdown.clone()));
        sleep(Duration::from_millis(100)).await;
        shutdown.cancel();
        let report = handle.await.unwrap();

        assert_eq!(
            operations.calls(),
            vec![
                Call::Start("abc".to_string()),
                Call::Stop("rec-abc".to_string())
            ]
        );
        assert_eq!(report.failures, 1);
        assert_eq!(queue.acknowledged(), ["1"]);
    }

    #[tokio::test]
    async fn cancelled_before_start_never_drains() {
        let queue = FakeQueue::default();
        let operations = FakeOperations::default();
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let report = worker(&queue, &operations).run(shutdown).await;

        assert_eq!(report, WorkerReport::default());
        assert!(queue.receives().is_empty());
    }
}
