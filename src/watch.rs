// ABOUTME: Watch orchestrator: spawns detector and cleanup tasks and fans new posts out to destinations
// ABOUTME: Bounded channels, cooperative cancellation, bounded retry for transient failures

use crate::config::RetryConfig;
use crate::model::{Post, TransferOptions};
use crate::platforms::{DestinationAdapter, Platform, SourceAdapter};
use crate::{Error, Result};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Exponential backoff with jitter, applied to transient errors only.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryConfig::default().into()
    }
}

impl From<RetryConfig> for RetryPolicy {
    fn from(config: RetryConfig) -> Self {
        RetryPolicy {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }
}

impl RetryPolicy {
    /// No waiting between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        RetryPolicy {
            max_attempts: max_attempts.max(1),
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay before retry number `attempt` (1-based), somewhere in `[d/2, d]`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let ceiling = self
            .base_delay
            .saturating_mul(1u32 << exp)
            .min(self.max_delay);
        let ceiling_ms = ceiling.as_millis() as u64;
        if ceiling_ms == 0 {
            return Duration::ZERO;
        }
        let jittered = rand::thread_rng().gen_range(ceiling_ms / 2..=ceiling_ms);
        Duration::from_millis(jittered)
    }
}

pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, operation: &str, mut call: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < policy.max_attempts => {
                let delay = policy.delay_for(attempt);
                warn!(
                    operation,
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WatchSettings {
    pub interval: Duration,
    pub cleanup_interval: Duration,
    pub retry: RetryPolicy,
}

/// Running watch: one detector task, zero or more cleanup tasks, one dispatcher.
pub struct WatchHandle {
    cancel: CancellationToken,
    producers: Vec<JoinHandle<()>>,
    dispatcher: JoinHandle<Result<()>>,
}

impl WatchHandle {
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    async fn join_producers(producers: Vec<JoinHandle<()>>) {
        for task in producers {
            if let Err(e) = task.await {
                warn!(error = %e, "Watch task ended abnormally");
            }
        }
    }

    /// Cancel everything and wait for all tasks to finish.
    pub async fn shutdown(self) -> Result<()> {
        info!("Shutting down watch");
        self.cancel.cancel();
        Self::join_producers(self.producers).await;
        self.dispatcher
            .await
            .map_err(|e| Error::Task(format!("dispatcher: {}", e)))?
    }

    /// Run until the dispatcher stops, then stop the remaining tasks.
    pub async fn wait(self) -> Result<()> {
        let outcome = self
            .dispatcher
            .await
            .map_err(|e| Error::Task(format!("dispatcher: {}", e)));
        self.cancel.cancel();
        Self::join_producers(self.producers).await;
        outcome?
    }
}

/// Start watching `source` and mirroring new posts into `destinations`.
///
/// `options` carries the credentials each task uses to mint its own access tokens.
pub fn spawn_watch(
    source: &SourceAdapter,
    destinations: Vec<DestinationAdapter>,
    options: TransferOptions,
    settings: &WatchSettings,
) -> Result<WatchHandle> {
    let watcher = source.as_watchable().ok_or_else(|| {
        Error::Config(format!(
            "source `{}` ({}) cannot be watched",
            source.name(),
            source.kind()
        ))
    })?;
    options.credentials()?;

    let cancel = CancellationToken::new();
    let (posts_tx, posts_rx) = mpsc::channel::<Post>(1);
    let (errors_tx, errors_rx) = mpsc::channel::<Error>(8);
    let mut producers = Vec::new();

    {
        let (options, errors_tx, cancel) = (options.clone(), errors_tx.clone(), cancel.clone());
        let interval = settings.interval;
        producers.push(tokio::spawn(async move {
            watcher
                .watch(interval, options, posts_tx, errors_tx, cancel)
                .await;
        }));
    }

    if let Some(reconciler) = source.as_reconciler() {
        for mirror in destinations.iter().filter_map(DestinationAdapter::as_markdown) {
            info!(source = %source.name(), mirror = %mirror.name(), "Starting cleanup task");
            let reconciler = reconciler.clone();
            let (options, errors_tx, cancel) = (options.clone(), errors_tx.clone(), cancel.clone());
            let interval = settings.cleanup_interval;
            producers.push(tokio::spawn(async move {
                reconciler
                    .reconcile(interval, mirror, options, errors_tx, cancel)
                    .await;
            }));
        }
    }
    drop(errors_tx);

    let dispatcher = tokio::spawn(dispatch(
        posts_rx,
        errors_rx,
        destinations,
        options,
        settings.retry.clone(),
        cancel.clone(),
    ));

    Ok(WatchHandle {
        cancel,
        producers,
        dispatcher,
    })
}

async fn deliver(
    destination: &DestinationAdapter,
    post: &Post,
    options: &TransferOptions,
    retry: &RetryPolicy,
) -> Result<()> {
    with_retry(retry, "push", || async move {
        let prepared = destination.prepare(options).await?;
        destination.as_destination().push(post, &prepared).await
    })
    .await
}

/// Pushes every detected post to every destination. Producer errors are fatal.
async fn dispatch(
    mut posts: mpsc::Receiver<Post>,
    mut errors: mpsc::Receiver<Error>,
    destinations: Vec<DestinationAdapter>,
    options: TransferOptions,
    retry: RetryPolicy,
    cancel: CancellationToken,
) -> Result<()> {
    let mut posts_open = true;
    let mut errors_open = true;

    while posts_open || errors_open {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Dispatcher cancelled");
                return Ok(());
            }
            received = errors.recv(), if errors_open => match received {
                Some(e) => {
                    error!(error = %e, "Watch task failed");
                    cancel.cancel();
                    return Err(e);
                }
                None => errors_open = false,
            },
            received = posts.recv(), if posts_open => match received {
                Some(post) => {
                    info!(title = %post.title, "New post detected");
                    for destination in &destinations {
                        match deliver(destination, &post, &options, &retry).await {
                            Ok(()) => info!(
                                title = %post.title,
                                destination = %destination.name(),
                                "Pushed post"
                            ),
                            Err(e @ Error::AlreadyExists(_)) => warn!(
                                title = %post.title,
                                destination = %destination.name(),
                                error = %e,
                                "Skipping post"
                            ),
                            Err(e) if e.is_transient() => warn!(
                                title = %post.title,
                                destination = %destination.name(),
                                error = %e,
                                "Push failed after retries, skipping post"
                            ),
                            Err(e) => {
                                error!(
                                    title = %post.title,
                                    destination = %destination.name(),
                                    error = %e,
                                    "Push failed"
                                );
                                cancel.cancel();
                                return Err(e);
                            }
                        }
                    }
                }
                None => posts_open = false,
            },
        }
    }

    debug!("All watch tasks finished");
    Ok(())
}
