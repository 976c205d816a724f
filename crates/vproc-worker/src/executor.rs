//! Job executor.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info, warn};
use vproc_queue::{Delivery, JobQueue};

use crate::config::WorkerConfig;
use crate::dispatcher::Dispatcher;
use crate::error::WorkerResult;

/// How long one read blocks on an empty stream.
const CONSUME_BLOCK_MS: u64 = 1000;

/// Pulls deliveries from the queue and runs each on its own task, at most
/// `max_concurrent_jobs` at a time.
pub struct JobExecutor {
    config: WorkerConfig,
    queue: Arc<JobQueue>,
    dispatcher: Arc<Dispatcher>,
    job_semaphore: Arc<Semaphore>,
}

impl JobExecutor {
    pub fn new(config: WorkerConfig, queue: Arc<JobQueue>, dispatcher: Arc<Dispatcher>) -> Self {
        let job_semaphore = Arc::new(Semaphore::new(config.max_concurrent_jobs));
        Self {
            config,
            queue,
            dispatcher,
            job_semaphore,
        }
    }

    /// Run until `shutdown` flips to `true`, then drain in-flight jobs.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> WorkerResult<()> {
        info!(
            "Starting job executor '{}' with {} max concurrent jobs",
            self.config.worker_id, self.config.max_concurrent_jobs
        );

        self.queue.init().await?;

        let claim_task = tokio::spawn(claim_loop(
            Arc::clone(&self.queue),
            Arc::clone(&self.dispatcher),
            Arc::clone(&self.job_semaphore),
            self.config.claim_interval,
            shutdown.clone(),
        ));

        // Shutdown is only observed while waiting for a slot, never during a
        // read, so every entry read from the stream is handed to a job task.
        while let Some(permits) = reserve_slots(&self.job_semaphore, &mut shutdown).await {
            match self.queue.consume(CONSUME_BLOCK_MS, permits.len()).await {
                Ok(deliveries) => {
                    if !deliveries.is_empty() {
                        debug!("Consumed {} deliveries", deliveries.len());
                    }
                    spawn_all(&self.dispatcher, deliveries, permits);
                }
                Err(e) => {
                    drop(permits);
                    error!("Error consuming jobs: {}", e);
                    tokio::select! {
                        _ = wait_for_shutdown(&mut shutdown) => {}
                        _ = tokio::time::sleep(Duration::from_secs(5)) => {}
                    }
                }
            }
        }
        info!("Shutdown signal received, stopping executor");

        if let Err(e) = claim_task.await {
            warn!("Claim loop ended abnormally: {}", e);
        }

        info!("Waiting for in-flight jobs to complete...");
        if tokio::time::timeout(self.config.shutdown_timeout, self.wait_for_jobs())
            .await
            .is_err()
        {
            warn!(
                "In-flight jobs still running after {:?}; their entries stay pending for redelivery",
                self.config.shutdown_timeout
            );
        }

        info!("Job executor stopped");
        Ok(())
    }

    async fn wait_for_jobs(&self) {
        let total = u32::try_from(self.config.max_concurrent_jobs).unwrap_or(u32::MAX);
        // Every permit back means no job task is running.
        let _ = self.job_semaphore.acquire_many(total).await;
    }
}

/// Periodically reclaim deliveries whose processing deadline expired.
///
/// Only takes slots that are free at tick time; the main read loop owns
/// waiting for capacity.
async fn claim_loop(
    queue: Arc<JobQueue>,
    dispatcher: Arc<Dispatcher>,
    semaphore: Arc<Semaphore>,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(every);
    loop {
        tokio::select! {
            biased;
            _ = wait_for_shutdown(&mut shutdown) => break,
            _ = interval.tick() => {}
        }

        let permits = free_slots(&semaphore);
        if permits.is_empty() {
            continue;
        }
        match queue.claim_expired(permits.len()).await {
            Ok(deliveries) => {
                if !deliveries.is_empty() {
                    info!("Claimed {} expired deliveries", deliveries.len());
                }
                spawn_all(&dispatcher, deliveries, permits);
            }
            Err(e) => warn!("Failed to claim expired deliveries: {}", e),
        }
    }
    debug!("Claim loop stopped");
}

/// Wait for at least one free job slot, then take every other free one.
///
/// Returns `None` once shutdown is signalled, without holding any slot.
async fn reserve_slots(
    semaphore: &Arc<Semaphore>,
    shutdown: &mut watch::Receiver<bool>,
) -> Option<Vec<OwnedSemaphorePermit>> {
    let first = tokio::select! {
        biased;
        _ = wait_for_shutdown(shutdown) => return None,
        permit = Arc::clone(semaphore).acquire_owned() => permit.ok()?,
    };
    let mut permits = free_slots(semaphore);
    permits.push(first);
    Some(permits)
}

fn free_slots(semaphore: &Arc<Semaphore>) -> Vec<OwnedSemaphorePermit> {
    let mut permits = Vec::new();
    while let Ok(permit) = Arc::clone(semaphore).try_acquire_owned() {
        permits.push(permit);
    }
    permits
}

/// Resolves once shutdown is signalled or the sender is gone.
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

/// Run each delivery on its own task holding one reserved slot.
///
/// Reads never return more entries than slots were reserved; unused slots
/// are released when `permits` drops.
fn spawn_all(
    dispatcher: &Arc<Dispatcher>,
    deliveries: Vec<Delivery>,
    permits: Vec<OwnedSemaphorePermit>,
) {
    for (delivery, permit) in deliveries.into_iter().zip(permits) {
        let dispatcher = Arc::clone(dispatcher);
        tokio::spawn(async move {
            let _permit = permit;
            dispatcher.handle(delivery).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reserve_slots_takes_every_free_slot() {
        let semaphore = Arc::new(Semaphore::new(3));
        let _held = Arc::clone(&semaphore).acquire_owned().await.unwrap();
        let (_tx, mut rx) = watch::channel(false);

        let permits = reserve_slots(&semaphore, &mut rx).await.unwrap();
        assert_eq!(permits.len(), 2);
        assert_eq!(semaphore.available_permits(), 0);

        drop(permits);
        assert_eq!(semaphore.available_permits(), 2);
    }

    #[tokio::test]
    async fn test_reserve_slots_waits_for_a_released_slot() {
        let semaphore = Arc::new(Semaphore::new(1));
        let held = Arc::clone(&semaphore).acquire_owned().await.unwrap();
        let (_tx, mut rx) = watch::channel(false);

        let waiting = Arc::clone(&semaphore);
        let task = tokio::spawn(async move {
            reserve_slots(&waiting, &mut rx).await.map(|permits| permits.len())
        });
        tokio::task::yield_now().await;
        assert!(!task.is_finished());

        drop(held);
        assert_eq!(task.await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_reserve_slots_yields_to_shutdown_without_taking_slots() {
        let semaphore = Arc::new(Semaphore::new(2));
        let (tx, mut rx) = watch::channel(false);
        tx.send(true).unwrap();

        assert!(reserve_slots(&semaphore, &mut rx).await.is_none());
        assert_eq!(semaphore.available_permits(), 2);
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_wait_for_busy_slots() {
        let semaphore = Arc::new(Semaphore::new(1));
        let _held = Arc::clone(&semaphore).acquire_owned().await.unwrap();
        let (tx, mut rx) = watch::channel(false);

        let waiting = Arc::clone(&semaphore);
        let task = tokio::spawn(async move { reserve_slots(&waiting, &mut rx).await.is_none() });
        tokio::task::yield_now().await;

        tx.send(true).unwrap();
        assert!(task.await.unwrap());
    }

    #[tokio::test]
    async fn test_free_slots_never_waits() {
        let semaphore = Arc::new(Semaphore::new(2));
        let _held = Arc::clone(&semaphore).acquire_many_owned(2).await.unwrap();
        assert!(free_slots(&semaphore).is_empty());
    }

    #[tokio::test]
    async fn test_wait_for_shutdown_ends_when_sender_dropped() {
        let (tx, mut rx) = watch::channel(false);
        drop(tx);
        tokio::time::timeout(Duration::from_secs(1), wait_for_shutdown(&mut rx))
            .await
            .unwrap();
    }
}
