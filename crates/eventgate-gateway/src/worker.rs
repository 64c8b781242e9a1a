//! One long-lived unit of work per active event source.
//!
//! `Connecting → Validating → Running → {Completed | Error | Removed}`.
//! The worker never retries: any failure publishes `Error` and the worker
//! exits, leaving retry to the manager's next reconciliation pass.

use std::sync::Arc;

use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;

use eventgate_core::types::{EventSourceDefinition, WorkerPhase};

use crate::connector::SourceConnection;
use crate::dispatch::Dispatcher;
use crate::status::StatusReporter;

pub struct SourceWorker {
    definition: EventSourceDefinition,
    connection: Arc<dyn SourceConnection>,
    dispatcher: Arc<dyn Dispatcher>,
    reporter: Arc<StatusReporter>,
    cancel: CancellationToken,
}

impl SourceWorker {
    pub fn new(
        definition: EventSourceDefinition,
        connection: Arc<dyn SourceConnection>,
        dispatcher: Arc<dyn Dispatcher>,
        reporter: Arc<StatusReporter>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            definition,
            connection,
            dispatcher,
            reporter,
            cancel,
        }
    }

    /// Drive the source until it ends, fails or is cancelled.
    ///
    /// Returns the phase the source was in when the worker exited. On
    /// cancellation the teardown path publishes `Removed`, not the worker.
    pub async fn run(self) -> WorkerPhase {
        let name = self.definition.key.as_str();

        // Connecting: the manager dialed; the connection must be ready now.
        if !self.connection.is_ready() {
            tracing::error!(source = %name, "connection is not in ready state");
            return self
                .fail("connection is not in ready state".to_owned())
                .await;
        }
        if !self.reporter.transition(WorkerPhase::Validating, "").await {
            return self.reporter.phase().await;
        }

        // Validating
        let validated = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return self.cancelled().await,
            result = self.connection.validate(&self.definition) => result,
        };
        if let Err(e) = validated {
            tracing::error!(source = %name, "event source is not valid: {e}");
            return self
                .fail(format!("event source is not valid. err: {e}"))
                .await;
        }

        // Running
        if !self
            .reporter
            .transition(WorkerPhase::Running, "event source is running")
            .await
        {
            return self.reporter.phase().await;
        }
        let started = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return self.cancelled().await,
            result = self.connection.start(&self.definition) => result,
        };
        let mut stream = match started {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!(source = %name, "failed to start event stream: {e}");
                return self
                    .fail(format!(
                        "failed to receive event stream from event source. err: {e}"
                    ))
                    .await;
            }
        };

        tracing::info!(source = %name, "started listening to events");
        loop {
            let next = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return self.cancelled().await,
                next = stream.next() => next,
            };
            match next {
                Some(Ok(payload)) => {
                    if let Err(e) = self.dispatcher.dispatch(name, payload).await {
                        tracing::warn!(source = %name, "failed to dispatch event: {e}");
                    }
                }
                Some(Err(e)) => {
                    tracing::error!(source = %name, "failed to receive event from stream: {e}");
                    return self
                        .fail(format!(
                            "failed to receive event from event source stream. err: {e}"
                        ))
                        .await;
                }
                None => {
                    tracing::info!(source = %name, "event source has stopped");
                    self.reporter
                        .transition(WorkerPhase::Completed, "event source has been stopped")
                        .await;
                    self.close().await;
                    return self.reporter.phase().await;
                }
            }
        }
    }

    async fn fail(&self, message: String) -> WorkerPhase {
        self.reporter.transition(WorkerPhase::Error, &message).await;
        self.close().await;
        self.reporter.phase().await
    }

    async fn cancelled(&self) -> WorkerPhase {
        tracing::debug!(source = %self.definition.key, "worker cancelled");
        self.reporter.phase().await
    }

    async fn close(&self) {
        if let Err(e) = self.connection.close().await {
            tracing::warn!(source = %self.definition.key, "failed to close connection: {e}");
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use bytes::Bytes;
    use futures_util::stream;
    use tokio::sync::mpsc;

    use eventgate_core::types::{SourcePhase, SourceStatus};

    use crate::connector::EventStream;
    use crate::error::{DispatchError, SourceError};

    /// Connection whose behavior is scripted by the test.
    struct Scripted {
        ready: bool,
        valid: Result<(), SourceError>,
        events: Mutex<Option<Vec<Result<Bytes, SourceError>>>>,
        hang: bool,
        closed: AtomicBool,
    }

    impl Scripted {
        fn new(events: Vec<Result<Bytes, SourceError>>) -> Self {
            Self {
                ready: true,
                valid: Ok(()),
                events: Mutex::new(Some(events)),
                hang: false,
                closed: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl SourceConnection for Scripted {
        fn is_ready(&self) -> bool {
            self.ready
        }

        async fn validate(&self, _source: &EventSourceDefinition) -> Result<(), SourceError> {
            self.valid.clone()
        }

        async fn start(&self, _source: &EventSourceDefinition) -> Result<EventStream, SourceError> {
            let events = self
                .events
                .lock()
                .expect("lock")
                .take()
                .ok_or_else(|| SourceError::Stream("already started".to_owned()))?;
            if self.hang {
                return Ok(stream::iter(events).chain(stream::pending()).boxed());
            }
            Ok(stream::iter(events).boxed())
        }

        async fn close(&self) -> Result<(), SourceError> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<(String, Bytes)>>,
        fail: bool,
    }

    #[async_trait]
    impl Dispatcher for Recorder {
        async fn dispatch(&self, source_name: &str, payload: Bytes) -> Result<(), DispatchError> {
            self.seen
                .lock()
                .expect("lock")
                .push((source_name.to_owned(), payload));
            if self.fail {
                return Err(DispatchError::new(source_name, "sink unavailable"));
            }
            Ok(())
        }
    }

    struct Harness {
        conn: Arc<Scripted>,
        dispatcher: Arc<Recorder>,
        reporter: Arc<StatusReporter>,
        cancel: CancellationToken,
        rx: mpsc::Receiver<SourceStatus>,
    }

    fn harness(conn: Scripted, dispatcher: Recorder) -> Harness {
        let (tx, rx) = mpsc::channel(16);
        let def = EventSourceDefinition::new("a", "x");
        Harness {
            conn: Arc::new(conn),
            dispatcher: Arc::new(dispatcher),
            reporter: Arc::new(StatusReporter::new(def.id(), "a", tx)),
            cancel: CancellationToken::new(),
            rx,
        }
    }

    impl Harness {
        fn worker(&self) -> SourceWorker {
            SourceWorker::new(
                EventSourceDefinition::new("a", "x"),
                self.conn.clone(),
                self.dispatcher.clone(),
                self.reporter.clone(),
                self.cancel.clone(),
            )
        }

        fn phases(&mut self) -> Vec<SourcePhase> {
            std::iter::from_fn(|| self.rx.try_recv().ok())
                .map(|s| s.phase)
                .collect()
        }
    }

    // ── 1. clean_end_of_stream_completes ────────────────────────────

    #[tokio::test]
    async fn clean_end_of_stream_completes() {
        let mut h = harness(
            Scripted::new(vec![Ok(Bytes::from("e1")), Ok(Bytes::from("e2"))]),
            Recorder::default(),
        );
        let end = h.worker().run().await;

        assert_eq!(end, WorkerPhase::Completed);
        assert_eq!(h.phases(), vec![SourcePhase::Running, SourcePhase::Completed]);
        let seen = h.dispatcher.seen.lock().expect("lock").clone();
        assert_eq!(
            seen,
            vec![
                ("a".to_owned(), Bytes::from("e1")),
                ("a".to_owned(), Bytes::from("e2")),
            ]
        );
        assert!(h.conn.closed.load(Ordering::SeqCst));
    }

    // ── 2. not_ready_connection_errors_without_running ──────────────

    #[tokio::test]
    async fn not_ready_connection_errors_without_running() {
        let mut conn = Scripted::new(vec![]);
        conn.ready = false;
        let mut h = harness(conn, Recorder::default());

        assert_eq!(h.worker().run().await, WorkerPhase::Error);
        let statuses: Vec<SourceStatus> = std::iter::from_fn(|| h.rx.try_recv().ok()).collect();
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].phase, SourcePhase::Error);
        assert_eq!(statuses[0].message, "connection is not in ready state");
    }

    // ── 3. invalid_config_errors_and_closes ─────────────────────────

    #[tokio::test]
    async fn invalid_config_errors_and_closes() {
        let mut conn = Scripted::new(vec![Ok(Bytes::from("never"))]);
        conn.valid = Err(SourceError::Validation("url must be specified".to_owned()));
        let mut h = harness(conn, Recorder::default());

        assert_eq!(h.worker().run().await, WorkerPhase::Error);
        assert_eq!(h.phases(), vec![SourcePhase::Error]);
        assert!(h.conn.closed.load(Ordering::SeqCst));
        assert!(h.dispatcher.seen.lock().expect("lock").is_empty());
    }

    // ── 4. stream_error_is_terminal ─────────────────────────────────

    #[tokio::test]
    async fn stream_error_is_terminal() {
        let mut h = harness(
            Scripted::new(vec![
                Ok(Bytes::from("e1")),
                Err(SourceError::Stream("reset by peer".to_owned())),
                Ok(Bytes::from("unreachable")),
            ]),
            Recorder::default(),
        );

        assert_eq!(h.worker().run().await, WorkerPhase::Error);
        assert_eq!(h.phases(), vec![SourcePhase::Running, SourcePhase::Error]);
        assert_eq!(h.dispatcher.seen.lock().expect("lock").len(), 1);
    }

    // ── 5. dispatch_failure_does_not_stop_stream ────────────────────

    #[tokio::test]
    async fn dispatch_failure_does_not_stop_stream() {
        let dispatcher = Recorder {
            fail: true,
            ..Recorder::default()
        };
        let mut h = harness(
            Scripted::new(vec![Ok(Bytes::from("e1")), Ok(Bytes::from("e2"))]),
            dispatcher,
        );

        assert_eq!(h.worker().run().await, WorkerPhase::Completed);
        assert_eq!(h.dispatcher.seen.lock().expect("lock").len(), 2);
        assert_eq!(h.phases(), vec![SourcePhase::Running, SourcePhase::Completed]);
    }

    // ── 6. cancellation_stops_a_running_stream ──────────────────────

    #[tokio::test]
    async fn cancellation_stops_a_running_stream() {
        let mut conn = Scripted::new(vec![Ok(Bytes::from("e1"))]);
        conn.hang = true;
        let mut h = harness(conn, Recorder::default());

        let task = tokio::spawn(h.worker().run());
        // Wait until the worker is streaming.
        let running = tokio::time::timeout(std::time::Duration::from_secs(1), h.rx.recv())
            .await
            .expect("timely status")
            .expect("status");
        assert_eq!(running.phase, SourcePhase::Running);

        h.reporter.remove("event source removed").await;
        h.cancel.cancel();
        let end = tokio::time::timeout(std::time::Duration::from_secs(1), task)
            .await
            .expect("worker exits promptly")
            .expect("join");

        assert_eq!(end, WorkerPhase::Removed);
        assert_eq!(h.phases(), vec![SourcePhase::Removed]);
    }

    // ── 7. cancelled_before_start_publishes_nothing ─────────────────

    #[tokio::test]
    async fn cancelled_before_start_publishes_nothing() {
        let mut h = harness(Scripted::new(vec![Ok(Bytes::from("e1"))]), Recorder::default());
        h.cancel.cancel();

        h.worker().run().await;
        assert!(h.phases().is_empty());
        assert!(h.dispatcher.seen.lock().expect("lock").is_empty());
    }
}
