//! Consumer dispatch loop: bounded concurrency, the per-message retry/DLQ algorithm, and
//! the two-phase graceful shutdown shared by every consumer in this workspace.
//!
//! Grounded on hook-worker's poll-dispatch-reap run loop, generalized here with the
//! offset tracker (`crate::offset_tracker`) and decorator chain (`crate::decorators`)
//! standing in for hook-worker's webhook delivery and its own retry policy.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use lifecycle::Handle;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::decorators::{timeout, CircuitBreaker, RetrySchedule};
use crate::error::ProcessingError;
use crate::offset_tracker::{OffsetCommitter, PartitionTracker};

pub struct DispatcherConfig {
    pub max_concurrent_messages: usize,
    pub retry: RetrySchedule,
    pub handler_timeout: Duration,
    pub soft_shutdown: Duration,
    pub hard_shutdown: Duration,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DispatchOutcome {
    pub processed: u64,
    pub dlq_sent: u64,
    pub cancelled: u64,
}

enum TaskOutcome {
    Processed,
    Dlq,
}

/// Drives the per-message algorithm for a single partition's message stream: decode,
/// dispatch to `on_message` under the decorator chain, route the result to success / DLQ
/// / failed based on the error kind, and keep the offset tracker informed throughout.
pub struct Dispatcher<C: OffsetCommitter> {
    tracker: Arc<PartitionTracker<C>>,
    breaker: Arc<CircuitBreaker>,
    config: DispatcherConfig,
    handle: Handle,
}

impl<C: OffsetCommitter + 'static> Dispatcher<C> {
    pub fn new(
        tracker: Arc<PartitionTracker<C>>,
        breaker: Arc<CircuitBreaker>,
        config: DispatcherConfig,
        handle: Handle,
    ) -> Self {
        Self {
            tracker,
            breaker,
            config,
            handle,
        }
    }

    /// Runs until the lifecycle handle signals shutdown.
    ///
    /// `poll` fetches the next `(offset, decode_result)` pair, returning `None` when the
    /// stream is exhausted. `on_message` is the consumer's extension point. `publish_dlq`
    /// sends a DLQ record for a terminally-failed message, receiving the offset, a
    /// human-readable reason, and the attempt count.
    pub async fn run<Poll, PollFut, OnMessage, OnMessageFut, Dlq, DlqFut>(
        &self,
        mut poll: Poll,
        on_message: OnMessage,
        publish_dlq: Dlq,
    ) -> DispatchOutcome
    where
        Poll: FnMut() -> PollFut,
        PollFut: Future<Output = Option<(i64, Result<Vec<u8>, String>)>>,
        OnMessage: Fn(Vec<u8>) -> OnMessageFut + Send + Sync + 'static,
        OnMessageFut: Future<Output = Result<(), ProcessingError>> + Send + 'static,
        Dlq: Fn(i64, String, u32) -> DlqFut + Send + Sync + 'static,
        DlqFut: Future<Output = Result<(), ProcessingError>> + Send + 'static,
    {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_messages.max(1)));
        let on_message = Arc::new(on_message);
        let publish_dlq = Arc::new(publish_dlq);
        let mut tasks = JoinSet::new();
        let mut outcome = DispatchOutcome::default();

        loop {
            let permit = tokio::select! {
                biased;
                _ = self.handle.shutdown_recv() => break,
                permit = semaphore.clone().acquire_owned() => permit.expect("semaphore is never closed"),
            };

            let next = tokio::select! {
                biased;
                _ = self.handle.shutdown_recv() => { drop(permit); break; }
                next = poll() => next,
            };

            let Some((offset, decoded)) = next else {
                drop(permit);
                break;
            };

            self.tracker.mark_processing(offset);

            let tracker = self.tracker.clone();
            let breaker = self.breaker.clone();
            let retry = self.config.retry.clone();
            let handler_timeout = self.config.handler_timeout;
            let on_message = on_message.clone();
            let publish_dlq = publish_dlq.clone();

            tasks.spawn(async move {
                let _permit = permit;
                process_one(
                    offset,
                    decoded,
                    tracker.as_ref(),
                    breaker.as_ref(),
                    &retry,
                    handler_timeout,
                    on_message.as_ref(),
                    publish_dlq.as_ref(),
                )
                .await
            });

            while let Some(joined) = tasks.try_join_next() {
                record(joined, &mut outcome);
            }
        }

        // phase 1 (soft): let in-flight work finish on its own up to `soft_shutdown`.
        let drained_naturally = tokio::time::timeout(self.config.soft_shutdown, async {
            while let Some(joined) = tasks.join_next().await {
                record(joined, &mut outcome);
            }
        })
        .await
        .is_ok();

        // phase 2 (hard): cancel whatever is still running, bounded by `hard_shutdown`.
        if !drained_naturally {
            tasks.abort_all();
            let _ = tokio::time::timeout(self.config.hard_shutdown, async {
                while let Some(joined) = tasks.join_next().await {
                    if joined.is_err() {
                        outcome.cancelled += 1;
                    } else {
                        record(joined, &mut outcome);
                    }
                }
            })
            .await;
            outcome.cancelled += tasks.len() as u64;
        }

        info!(
            processed = outcome.processed,
            dlq_sent = outcome.dlq_sent,
            cancelled = outcome.cancelled,
            "dispatcher shut down"
        );
        outcome
    }
}

fn record(joined: Result<TaskOutcome, tokio::task::JoinError>, outcome: &mut DispatchOutcome) {
    match joined {
        Ok(TaskOutcome::Processed) => outcome.processed += 1,
        Ok(TaskOutcome::Dlq) => {
            outcome.processed += 1;
            outcome.dlq_sent += 1;
        }
        Err(join_error) if join_error.is_cancelled() => outcome.cancelled += 1,
        Err(join_error) => error!(%join_error, "message task panicked"),
    }
}

#[allow(clippy::too_many_arguments)]
async fn process_one<C, OnMessage, OnMessageFut, Dlq, DlqFut>(
    offset: i64,
    decoded: Result<Vec<u8>, String>,
    tracker: &PartitionTracker<C>,
    breaker: &CircuitBreaker,
    retry: &RetrySchedule,
    handler_timeout: Duration,
    on_message: &OnMessage,
    publish_dlq: &Dlq,
) -> TaskOutcome
where
    C: OffsetCommitter,
    OnMessage: Fn(Vec<u8>) -> OnMessageFut,
    OnMessageFut: Future<Output = Result<(), ProcessingError>>,
    Dlq: Fn(i64, String, u32) -> DlqFut,
    DlqFut: Future<Output = Result<(), ProcessingError>>,
{
    let payload = match decoded {
        Ok(bytes) => bytes,
        Err(_reason) => {
            // decode failure: poison-pill policy, mark success without invoking the handler
            if let Err(error) = tracker.mark_success(offset) {
                error!(%error, offset, "failed to commit offset after decode failure");
            }
            return TaskOutcome::Processed;
        }
    };

    let mut attempt = 0u32;
    loop {
        attempt += 1;
        let handler_fut = timeout(handler_timeout, on_message(payload.clone()));
        let result = breaker.run(handler_fut).await;

        match result {
            Ok(()) => {
                if let Err(error) = tracker.mark_success(offset) {
                    error!(%error, offset, "failed to commit offset");
                }
                return TaskOutcome::Processed;
            }
            Err(ProcessingError::Fatal(reason)) => {
                return dlq(offset, reason, attempt, tracker, publish_dlq).await;
            }
            Err(ProcessingError::Retryable(_)) if attempt < retry.max_attempts => {
                tokio::time::sleep(retry.delay_for(attempt)).await;
                continue;
            }
            Err(other) => {
                let reason = other.to_string();
                return dlq(offset, reason, attempt, tracker, publish_dlq).await;
            }
        }
    }
}

async fn dlq<C, Dlq, DlqFut>(
    offset: i64,
    reason: String,
    attempts: u32,
    tracker: &PartitionTracker<C>,
    publish_dlq: &Dlq,
) -> TaskOutcome
where
    C: OffsetCommitter,
    Dlq: Fn(i64, String, u32) -> DlqFut,
    DlqFut: Future<Output = Result<(), ProcessingError>>,
{
    match publish_dlq(offset, reason, attempts).await {
        Ok(()) => {
            if let Err(error) = tracker.mark_success(offset) {
                error!(%error, offset, "failed to commit offset after dlq publish");
            }
            TaskOutcome::Dlq
        }
        Err(error) => {
            // a DLQ publish failure must not be masked as success: the message needs to
            // survive for redelivery rather than being silently dropped.
            warn!(%error, offset, "dlq publish failed, offset left failed for redelivery");
            tracker.mark_failed(offset);
            TaskOutcome::Processed
        }
    }
}
