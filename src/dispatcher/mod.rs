use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue, InvalidHeaderValue};
use thiserror::Error;
use tokio::runtime::{Handle, TryCurrentError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::buffers::{BatchBuffer, Entry};
use crate::config::Config;
use crate::delivery::{DeliveryClient, DeliveryError, DeliveryRequest};
use crate::endpoint::{EndpointError, ingest_url};
use crate::scheduler::{Decision, FlushScheduler};

#[derive(Debug, Error)]
pub enum DispatcherError {
    #[error("dispatcher must be created inside a Tokio runtime: {0}")]
    NoRuntime(#[from] TryCurrentError),

    #[error(transparent)]
    Endpoint(#[from] EndpointError),

    #[error("credentials cannot be sent as a header value: {0}")]
    InvalidCredentials(#[from] InvalidHeaderValue),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    InFlight,
}

/// Result of [`Dispatcher::shutdown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Drain {
    /// Nothing was buffered.
    Empty,
    /// A final batch was sent and its delivery attempt completed.
    Flushed,
    /// A delivery was already in flight; no additional attempt was made.
    InFlight,
}

/// Everything the scheduler and the delivery path mutate, behind one lock.
struct DispatchState {
    buffer: BatchBuffer,
    scheduler: FlushScheduler,
    phase: Phase,
    delivery: Option<JoinHandle<()>>,
    closed: bool,
}

struct Inner<C> {
    state: Mutex<DispatchState>,
    client: C,
    url: Url,
    headers: HeaderMap,
    batch_size: usize,
    silent_success: bool,
    silent_error: bool,
    runtime: Handle,
}

/// Batches appended entries and ships them to the ingestion endpoint, one
/// request at a time.
///
/// A batch is sent when `batch_size` entries are buffered, or when
/// `time_threshold` passes without any scheduling activity. At most one
/// delivery is in flight; flush requests made meanwhile are dropped and the
/// buffer is re-examined as soon as the delivery completes.
///
/// Delivery is at-most-once: a batch that fails is logged and discarded.
///
/// Uses `std::sync::Mutex` because the lock is never held across `.await`.
pub struct Dispatcher<C: DeliveryClient> {
    inner: Arc<Inner<C>>,
}

impl<C: DeliveryClient> Clone for Dispatcher<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: DeliveryClient> fmt::Debug for Dispatcher<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state();
        f.debug_struct("Dispatcher")
            .field("url", &self.inner.url.as_str())
            .field("buffered", &state.buffer.len())
            .field("in_flight", &(state.phase == Phase::InFlight))
            .field("closed", &state.closed)
            .finish()
    }
}

impl<C: DeliveryClient> Dispatcher<C> {
    /// Must be called from within a Tokio runtime; timers and deliveries are
    /// spawned on it, so `append` itself can be called from any thread.
    pub fn new(config: &Config, client: C) -> Result<Self, DispatcherError> {
        let runtime = Handle::try_current()?;
        let url = ingest_url(&config.url, &config.organization, &config.stream_name)?;

        let mut authorization = HeaderValue::from_str(&config.auth.authorization())?;
        authorization.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, authorization);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let state = DispatchState {
            buffer: BatchBuffer::new(),
            scheduler: FlushScheduler::new(config.batch_size, config.time_threshold),
            phase: Phase::Idle,
            delivery: None,
            closed: false,
        };

        Ok(Self {
            inner: Arc::new(Inner {
                state: Mutex::new(state),
                client,
                url,
                headers,
                batch_size: config.batch_size,
                silent_success: config.silent_success,
                silent_error: config.silent_error,
                runtime,
            }),
        })
    }

    /// Accept one serialized entry. Never blocks and never fails.
    ///
    /// After [`Dispatcher::shutdown`] entries are still accepted but no
    /// longer scheduled.
    pub fn append(&self, entry: impl Into<Entry>) {
        let mut state = self.inner.state();
        state.buffer.append(entry.into());
        self.inner.reschedule(&mut state);
    }

    /// Flush now if the batch size is reached, otherwise restart the
    /// quiescence timer.
    pub fn reschedule(&self) {
        let mut state = self.inner.state();
        self.inner.reschedule(&mut state);
    }

    /// Start a delivery of up to `batch_size` buffered entries.
    ///
    /// Returns `false` without doing anything if a delivery is already in
    /// flight or the buffer is empty.
    pub fn flush(&self) -> bool {
        let mut state = self.inner.state();
        self.inner.try_flush(&mut state)
    }

    /// Best-effort final drain for a controlled shutdown.
    ///
    /// Cancels the quiescence timer and stops all further scheduling. If idle
    /// with entries buffered, sends one final batch and waits for that attempt
    /// to finish. If a delivery is already in flight, returns immediately.
    pub async fn shutdown(&self) -> Drain {
        let handle = {
            let mut state = self.inner.state();
            state.closed = true;
            state.scheduler.cancel();

            match state.phase {
                Phase::InFlight => {
                    if !state.buffer.is_empty() {
                        warn!(
                            entries = state.buffer.len(),
                            "delivery in flight at shutdown, buffered entries not sent"
                        );
                    }
                    return Drain::InFlight;
                }
                Phase::Idle if state.buffer.is_empty() => return Drain::Empty,
                Phase::Idle => {
                    self.inner.try_flush(&mut state);
                    if !state.buffer.is_empty() {
                        warn!(
                            entries = state.buffer.len(),
                            "entries beyond the final batch not sent"
                        );
                    }
                    state.delivery.take()
                }
            }
        };

        join(handle).await;
        Drain::Flushed
    }

    /// [`Dispatcher::shutdown`], then wait for a delivery that was already in
    /// flight to complete and report its outcome.
    ///
    /// Without a request deadline this waits as long as the endpoint does.
    pub async fn drain(&self) -> Drain {
        let drain = self.shutdown().await;
        if drain == Drain::InFlight {
            self.join_delivery().await;
        }
        drain
    }

    /// Wait for the current delivery task, if any, to finish.
    pub async fn join_delivery(&self) {
        let handle = self.inner.state().delivery.take();
        join(handle).await;
    }

    pub fn buffered(&self) -> usize {
        self.inner.state().buffer.len()
    }

    pub fn is_in_flight(&self) -> bool {
        self.inner.state().phase == Phase::InFlight
    }
}

async fn join(handle: Option<JoinHandle<()>>) {
    if let Some(h) = handle
        && let Err(e) = h.await
    {
        error!(error = %e, "delivery task panicked");
    }
}

impl<C: DeliveryClient> Inner<C> {
    fn state(&self) -> MutexGuard<'_, DispatchState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn reschedule(self: &Arc<Self>, state: &mut DispatchState) {
        if state.closed {
            return;
        }
        match state.scheduler.decide(state.buffer.len()) {
            Decision::FlushNow => {
                state.scheduler.cancel();
                self.try_flush(state);
            }
            Decision::Arm => {
                let inner = Arc::clone(self);
                state
                    .scheduler
                    .arm(&self.runtime, move |generation| inner.on_timer(generation));
            }
        }
    }

    fn on_timer(self: &Arc<Self>, generation: u64) {
        let mut state = self.state();
        if state.scheduler.fire(generation) {
            debug!(entries = state.buffer.len(), "quiescence timer expired");
            self.try_flush(&mut state);
        }
    }

    /// Called with the lock held. The state check and the transition to
    /// `InFlight` happen under the same guard.
    fn try_flush(self: &Arc<Self>, state: &mut DispatchState) -> bool {
        if state.phase == Phase::InFlight {
            debug!(
                entries = state.buffer.len(),
                "delivery in flight, flush request dropped"
            );
            return false;
        }

        let batch = state.buffer.take_batch(self.batch_size);
        if batch.is_empty() {
            return false;
        }

        let entries = batch.len();
        let request = DeliveryRequest {
            url: self.url.clone(),
            headers: self.headers.clone(),
            body: batch.into_body(),
        };
        state.phase = Phase::InFlight;

        let inner = Arc::clone(self);
        state.delivery = Some(self.runtime.spawn(async move {
            // A panicking client must not leave the dispatcher `InFlight`.
            let sender = Arc::clone(&inner);
            match inner
                .runtime
                .spawn(async move { sender.client.send(request).await })
                .await
            {
                Ok(result) => inner.report(entries, &result),
                Err(e) => error!(entries, error = %e, "delivery task failed, entries dropped"),
            }
            inner.complete();
        }));

        true
    }

    fn complete(self: &Arc<Self>) {
        let mut state = self.state();
        state.phase = Phase::Idle;
        self.reschedule(&mut state);
    }

    fn report(&self, entries: usize, result: &Result<StatusCode, DeliveryError>) {
        match result {
            Ok(status) => {
                if !self.silent_success {
                    info!(entries, status = status.as_u16(), "batch delivered");
                }
            }
            Err(e) => {
                if !self.silent_error {
                    error!(entries, error = %e, "batch delivery failed, entries dropped");
                }
            }
        }
    }
}
