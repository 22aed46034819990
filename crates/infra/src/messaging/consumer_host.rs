//! Consumer host
//!
//! Drives one [`MessageSource`]: receives deliveries, decodes them, runs the
//! handler through the [`Pipeline`] and settles every delivery exactly
//! once. Join handles are tracked and cancellation is explicit.
//!
//! Two tokens control shutdown. The receive token stops new receives; the
//! processing token is handed to handlers and is only cancelled when the
//! in-flight messages fail to drain within the shutdown timeout. Message
//! tasks belong to the receive loop; any still running one more timeout
//! after that are aborted, so none outlives [`ConsumerHost::stop`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use conduit_core::{ConsumerError, Pipeline};
//! use conduit_domain::Envelope;
//! use conduit_infra::messaging::{ConsumerHost, HostResult, InMemoryBroker, JsonCodec};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> HostResult<()> {
//! let broker = InMemoryBroker::new();
//! let mut host = ConsumerHost::<u64>::new(
//!     Arc::new(broker.source("orders")),
//!     Arc::new(JsonCodec::<u64>::new()),
//!     Pipeline::default(),
//!     Arc::new(|order: Envelope<u64>, _cancel: CancellationToken| async move {
//!         tracing::info!(order = order.payload(), "order received");
//!         Ok::<_, ConsumerError>(())
//!     }),
//! );
//!
//! host.start()?;
//! // ... application runs ...
//! host.stop().await?;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use conduit_core::{
    AckOutcome, ConsumerError, MessageCodec, MessageHandler, MessageSource, Pipeline, RawMessage,
};
use conduit_domain::{AckDecision, ConsumerSettings, Envelope};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::error::{HostError, HostResult};

/// Pause after a failed receive before trying again
pub const DEFAULT_RECEIVE_BACKOFF: Duration = Duration::from_millis(500);

/// Called with the binding and the failure when the host itself fails to
/// receive or decode a message
pub type ErrorCallback = Arc<dyn Fn(&str, &ConsumerError) + Send + Sync>;

/// Counters for one host
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    pub received: u64,
    pub acked: u64,
    pub requeued: u64,
    pub discarded: u64,
    /// Receive and deserialize failures.
    pub adapter_errors: u64,
}

#[derive(Debug, Default)]
struct StatsCounters {
    received: AtomicU64,
    acked: AtomicU64,
    requeued: AtomicU64,
    discarded: AtomicU64,
    adapter_errors: AtomicU64,
}

impl StatsCounters {
    fn record_decision(&self, decision: AckDecision) {
        let counter = match decision {
            AckDecision::Ack => &self.acked,
            AckDecision::NackRequeue => &self.requeued,
            AckDecision::NackDiscard => &self.discarded,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> ConsumerStats {
        ConsumerStats {
            received: self.received.load(Ordering::Relaxed),
            acked: self.acked.load(Ordering::Relaxed),
            requeued: self.requeued.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            adapter_errors: self.adapter_errors.load(Ordering::Relaxed),
        }
    }
}

/// Everything a receive loop and its message tasks share
struct Worker<T> {
    source: Arc<dyn MessageSource>,
    codec: Arc<dyn MessageCodec<T>>,
    pipeline: Pipeline,
    handler: Arc<dyn MessageHandler<T>>,
    settings: ConsumerSettings,
    on_error: Option<ErrorCallback>,
    receive_backoff: Duration,
    stats: Arc<StatsCounters>,
}

struct Running {
    receive: CancellationToken,
    processing: CancellationToken,
    loop_handle: JoinHandle<()>,
}

/// Receive loop with bounded concurrency over one binding
pub struct ConsumerHost<T> {
    source: Arc<dyn MessageSource>,
    codec: Arc<dyn MessageCodec<T>>,
    pipeline: Pipeline,
    handler: Arc<dyn MessageHandler<T>>,
    settings: ConsumerSettings,
    on_error: Option<ErrorCallback>,
    receive_backoff: Duration,
    stats: Arc<StatsCounters>,
    running: Option<Running>,
}

impl<T: Send + 'static> fmt::Debug for ConsumerHost<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsumerHost")
            .field("binding", &self.source.binding())
            .field("pipeline", &self.pipeline)
            .field("settings", &self.settings)
            .field("running", &self.is_running())
            .finish()
    }
}

impl<T> ConsumerHost<T>
where
    T: Send + 'static,
{
    pub fn new(
        source: Arc<dyn MessageSource>,
        codec: Arc<dyn MessageCodec<T>>,
        pipeline: Pipeline,
        handler: Arc<dyn MessageHandler<T>>,
    ) -> Self {
        Self {
            source,
            codec,
            pipeline,
            handler,
            settings: ConsumerSettings::default(),
            on_error: None,
            receive_backoff: DEFAULT_RECEIVE_BACKOFF,
            stats: Arc::new(StatsCounters::default()),
            running: None,
        }
    }

    /// Replace the settings; takes effect on the next `start`
    pub fn set_settings(&mut self, settings: ConsumerSettings) {
        self.settings = settings;
    }

    #[must_use]
    pub fn with_settings(mut self, settings: ConsumerSettings) -> Self {
        self.set_settings(settings);
        self
    }

    /// Register a callback for receive and deserialize failures
    #[must_use]
    pub fn on_error<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str, &ConsumerError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(callback));
        self
    }

    #[must_use]
    pub fn with_receive_backoff(mut self, backoff: Duration) -> Self {
        self.receive_backoff = backoff;
        self
    }

    pub fn binding(&self) -> &str {
        self.source.binding()
    }

    pub fn stats(&self) -> ConsumerStats {
        self.stats.snapshot()
    }

    /// Returns true while the receive loop or its drain is active.
    pub fn is_running(&self) -> bool {
        self.running.as_ref().map_or(false, |running| !running.loop_handle.is_finished())
    }

    /// Spawn the receive loop
    ///
    /// # Errors
    /// [`HostError::AlreadyRunning`] if the loop is active.
    #[instrument(skip(self), fields(binding = %self.binding()))]
    pub fn start(&mut self) -> HostResult<()> {
        if self.is_running() {
            return Err(HostError::AlreadyRunning);
        }

        let receive = CancellationToken::new();
        let processing = CancellationToken::new();
        let worker = Arc::new(Worker {
            source: Arc::clone(&self.source),
            codec: Arc::clone(&self.codec),
            pipeline: self.pipeline.clone(),
            handler: Arc::clone(&self.handler),
            settings: self.settings.clone(),
            on_error: self.on_error.clone(),
            receive_backoff: self.receive_backoff,
            stats: Arc::clone(&self.stats),
        });
        let loop_handle = tokio::spawn(worker.run(receive.clone(), processing.clone()));

        self.running = Some(Running { receive, processing, loop_handle });
        info!(
            max_concurrent_calls = self.settings.max_concurrent_calls,
            "Consumer host started"
        );
        Ok(())
    }

    /// Stop receiving and wait for in-flight messages to settle
    ///
    /// # Errors
    /// [`HostError::NotRunning`] if `start` was never called, or
    /// [`HostError::Timeout`] if the drain exceeded the shutdown timeout.
    /// In the timeout case the handlers' cancellation token is cancelled;
    /// message tasks still running after a second timeout are aborted and
    /// their deliveries left unsettled.
    #[instrument(skip(self), fields(binding = %self.binding()))]
    pub async fn stop(&mut self) -> HostResult<()> {
        let Some(running) = self.running.take() else {
            return Err(HostError::NotRunning);
        };

        running.receive.cancel();

        let shutdown_timeout = self.settings.shutdown_timeout();
        let mut loop_handle = running.loop_handle;
        match tokio::time::timeout(shutdown_timeout, &mut loop_handle).await {
            Ok(Ok(())) => {
                info!("Consumer host stopped");
                Ok(())
            }
            Ok(Err(join_error)) => Err(HostError::TaskJoinFailed(join_error.to_string())),
            Err(_) => {
                running.processing.cancel();
                let millis = u64::try_from(shutdown_timeout.as_millis()).unwrap_or(u64::MAX);
                warn!(timeout_ms = millis, "Consumer host drain timed out; cancelling handlers");
                if tokio::time::timeout(shutdown_timeout, &mut loop_handle).await.is_err() {
                    // Dropping the loop drops its JoinSet, which aborts every message task.
                    loop_handle.abort();
                    let _ = loop_handle.await;
                    warn!(timeout_ms = millis, "Handlers ignored cancellation; tasks aborted");
                }
                Err(HostError::Timeout { millis })
            }
        }
    }
}

impl<T> Drop for ConsumerHost<T> {
    fn drop(&mut self) {
        if let Some(running) = &self.running {
            if !running.loop_handle.is_finished() {
                warn!("ConsumerHost dropped while running; cancelling tasks");
                running.receive.cancel();
                running.processing.cancel();
            }
        }
    }
}

impl<T> Worker<T>
where
    T: Send + 'static,
{
    fn binding(&self) -> &str {
        self.source.binding()
    }

    async fn run(self: Arc<Self>, receive: CancellationToken, processing: CancellationToken) {
        let permits = self.settings.max_concurrent_calls.clamp(1, Semaphore::MAX_PERMITS);
        let semaphore = Arc::new(Semaphore::new(permits));
        let mut in_flight = JoinSet::new();

        loop {
            while let Some(joined) = in_flight.try_join_next() {
                self.reap(joined);
            }

            let permit = tokio::select! {
                biased;
                () = receive.cancelled() => break,
                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let received = tokio::select! {
                biased;
                () = receive.cancelled() => break,
                received = self.source.receive() => received,
            };

            match received {
                Ok(Some(message)) => {
                    self.stats.received.fetch_add(1, Ordering::Relaxed);
                    let worker = Arc::clone(&self);
                    in_flight.spawn(worker.process(message, processing.clone(), permit));
                }
                Ok(None) => {
                    info!(binding = self.binding(), "Message source closed");
                    break;
                }
                Err(source) => {
                    drop(permit);
                    self.report(&ConsumerError::Receive { source });
                    tokio::select! {
                        () = receive.cancelled() => break,
                        () = tokio::time::sleep(self.receive_backoff) => {}
                    }
                }
            }
        }

        while let Some(joined) = in_flight.join_next().await {
            self.reap(joined);
        }
        debug!(binding = self.binding(), "In-flight messages drained");
    }

    fn reap(&self, joined: Result<(), JoinError>) {
        if let Err(join_error) = joined {
            error!(binding = self.binding(), error = %join_error, "Message task failed");
        }
    }

    async fn process(
        self: Arc<Self>,
        message: RawMessage,
        cancel: CancellationToken,
        _permit: OwnedSemaphorePermit,
    ) {
        let started = Instant::now();
        let RawMessage { tag, body, headers, delivery_count } = message;

        let outcome = match self.codec.decode(&body) {
            Ok(payload) => {
                let handler = Arc::clone(&self.handler);
                self.pipeline
                    .execute(
                        Envelope::with_headers(payload, headers),
                        move |envelope, token| async move { handler.handle(envelope, token).await },
                        &cancel,
                    )
                    .await
            }
            Err(err) => Err(ConsumerError::deserialize(err)),
        };

        let decision = AckDecision::for_outcome(&outcome, self.settings.on_processing_error);
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        match &outcome {
            Ok(()) => {
                debug!(binding = self.binding(), %tag, elapsed_ms, %decision, "Message handled");
            }
            Err(err) => {
                if err.is_adapter_failure() {
                    self.report(err);
                }
                warn!(
                    binding = self.binding(),
                    %tag,
                    delivery_count,
                    elapsed_ms,
                    kind = err.kind(),
                    error = %err,
                    %decision,
                    "Message processing failed"
                );
            }
        }

        self.stats.record_decision(decision);
        if let Err(err) = self.source.settle(tag, decision).await {
            error!(
                binding = self.binding(),
                %tag,
                %decision,
                error = %err,
                "Failed to settle message"
            );
        }
    }

    fn report(&self, err: &ConsumerError) {
        self.stats.adapter_errors.fetch_add(1, Ordering::Relaxed);
        if matches!(err, ConsumerError::Receive { .. }) {
            warn!(binding = self.binding(), error = %err, "Failed to receive message");
        }
        if let Some(callback) = &self.on_error {
            callback(self.binding(), err);
        }
    }
}
