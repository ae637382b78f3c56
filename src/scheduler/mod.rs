pub mod handoff;
pub mod queue;
pub mod timer;
pub mod traits;
pub mod types;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::SchedulerConfig;
use crate::telemetry::{self};
use crate::telemetry::ops::schedule::Phase as SchedulePhase;

pub use handoff::JobReceiver;
pub use queue::{FeedQueue, FeedQueueItem};
pub use timer::DeadlineTimer;
pub use traits::{Repository, WorkerPool};
pub use types::{Article, Enclosure, Feed, FetcherState};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchedulerState {
    /// queue not built yet, or discarded by a rehash
    Uninitialized,
    Dispatching,
    /// a structural change arrived; nothing is dispatched or re-queued until in-flight jobs finish
    DrainingForRehash,
}

// why the wait phase returned
#[derive(Debug)]
enum Wake { Due, Rebuild, Shutdown, WorkerLost(anyhow::Error) }

struct Signals {
    rehash: mpsc::Receiver<bool>,
    added: mpsc::Receiver<Uuid>,
    done: mpsc::Receiver<Feed>,
    workers: JoinSet<()>,
}

// a worker only returns once its channels are gone, so any exit while dispatching is fatal
fn worker_lost(res: Result<(), JoinError>) -> anyhow::Error {
    match res {
        Err(e) if e.is_panic() => anyhow!("a worker panicked: {e}"),
        Err(e) => anyhow!("a worker was cancelled: {e}"),
        Ok(()) => anyhow!("a worker exited"),
    }
}

/// Dispatches due feeds to the workers. Owns the queue; everything else talks to it through channels.
pub struct Scheduler<R, W> {
    repository: Arc<R>,
    pool: Arc<W>,
    cfg: SchedulerConfig,

    queue: Option<FeedQueue>,
    // ids that are queued or in flight, so a late "feed added" can't queue a feed twice
    tracked: HashSet<Uuid>,
    rehash_requested: bool,
    jobs_in_progress: usize,
}

impl<R: Repository, W: WorkerPool> Scheduler<R, W> {
    pub fn new(repository: Arc<R>, pool: Arc<W>, cfg: SchedulerConfig) -> Self {
        Self {
            repository,
            pool,
            cfg,
            queue: None,
            tracked: HashSet::new(),
            rehash_requested: false,
            jobs_in_progress: 0,
        }
    }

    pub fn state(&self) -> SchedulerState {
        if self.rehash_requested { SchedulerState::DrainingForRehash }
        else if self.queue.is_none() { SchedulerState::Uninitialized }
        else { SchedulerState::Dispatching }
    }

    /// Start the workers and the change listener, then dispatch until `shutdown` fires.
    ///
    /// Fails if change notifications can't be set up or a worker dies. In-flight fetches
    /// are left to finish on shutdown.
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<()> {
        let log = telemetry::schedule();
        let workers = self.cfg.worker_count;

        let (mut jobs, job_rx) = handoff::rendezvous::<Feed>(workers);
        // one more slot than workers so a worker never waits to report back
        let (done_tx, done_rx) = mpsc::channel::<Feed>(workers + 1);
        let (added_tx, added_rx) = mpsc::channel::<Uuid>(workers + 1);
        let (rehash_tx, rehash_rx) = mpsc::channel::<bool>(1);

        log.info(format!("🧵 Starting {} workers ...", workers));
        let mut worker_set = JoinSet::new();
        for id in 1..=workers {
            let pool = Arc::clone(&self.pool);
            let jobs = job_rx.clone();
            let done = done_tx.clone();
            worker_set.spawn(async move { pool.start_worker(id, jobs, done).await });
        }
        drop(job_rx);
        drop(done_tx);

        if let Err(e) = self.repository.watch_changes(added_tx, rehash_tx).await {
            log.error_kv("❌ feed change notifications unavailable", [("error", format!("{e:#}"))]);
            return Err(e.context("watching feed changes"));
        }
        let mut signals = Signals { rehash: rehash_rx, added: added_rx, done: done_rx, workers: worker_set };

        log.info("🚀 Starting job dispatcher loop");
        loop {
            if shutdown.is_cancelled() { break; }

            if self.queue.is_none() {
                let built = self.init_queue().instrument(log.span(&SchedulePhase::InitQueue)).await;
                if let Err(e) = built {
                    log.error_kv("failed initializing feed queue", [("error", format!("{e:#}")), ("wait", format!("{:?}", self.cfg.retry_delay))]);
                    tokio::select! {
                        _ = tokio::time::sleep(self.cfg.retry_delay) => continue,
                        _ = shutdown.cancelled() => break,
                    }
                }
            }

            let wake = self.sleep_until_next_job(&mut signals, &shutdown).instrument(log.span(&SchedulePhase::Wait)).await;
            match wake {
                Wake::Shutdown => break,
                Wake::Rebuild => continue,
                Wake::Due => {}
                Wake::WorkerLost(e) => return self.fail(e),
            }

            let Some(job) = self.queue.as_mut().and_then(FeedQueue::pop) else { continue };
            let feed_id = job.feed.id;

            // parks until a worker is free; signals arriving meanwhile wait in their channels
            let sent = tokio::select! {
                sent = jobs.send(job.feed).instrument(log.span(&SchedulePhase::Dispatch)) => sent,
                Some(res) = signals.workers.join_next() => return self.fail(worker_lost(res)),
                _ = shutdown.cancelled() => break,
            };
            if sent.is_err() { bail!("all workers exited"); }

            self.jobs_in_progress += 1;
            log.dispatched(feed_id, self.jobs_in_progress, self.queue.as_ref().map_or(0, FeedQueue::len));
        }

        log.info_kv("🛑 dispatcher stopped", [("state", format!("{:?}", self.state())), ("in_progress", self.jobs_in_progress.to_string())]);
        signals.workers.detach_all();
        Ok(())
    }

    // remaining workers are aborted when their JoinSet drops
    fn fail(&self, e: anyhow::Error) -> Result<()> {
        telemetry::schedule().error_kv("❌ dispatcher stopped", [("error", format!("{e:#}")), ("in_progress", self.jobs_in_progress.to_string())]);
        Err(e)
    }

    async fn init_queue(&mut self) -> Result<()> {
        let log = telemetry::schedule();
        let feeds = self.repository.list_feeds().await?;

        let mut queue = FeedQueue::new();
        self.tracked.clear();
        for feed in feeds {
            self.tracked.insert(feed.id);
            queue_feed(&mut queue, feed, self.cfg.minimum_fetch_delay);
        }
        if queue.is_empty() { log.info("📋 no feeds to fetch yet"); }
        else { log.info_kv("📋 feed queue initialized", [("feeds", queue.len().to_string())]); }
        self.queue = Some(queue);
        Ok(())
    }

    // Wait until the head of the queue is due, handling signals in the meantime.
    async fn sleep_until_next_job(&mut self, signals: &mut Signals, shutdown: &CancellationToken) -> Wake {
        let log = telemetry::schedule();
        let mut timer = self.refresh_timer(None);

        loop {
            let draining = self.rehash_requested;
            tokio::select! {
                Some(_) = signals.rehash.recv() => {
                    // refetch all feeds, but only once the running jobs are back
                    log.info("🔁 got rehash signal, queueing rehash");
                    self.rehash_requested = true;
                }
                Some(id) = signals.added.recv() => self.on_feed_added(id).await,
                Some(feed) = signals.done.recv() => self.on_job_done(feed),
                Some(res) = signals.workers.join_next() => return Wake::WorkerLost(worker_lost(res)),
                // no new dispatches until the in-flight jobs are back
                _ = &mut timer, if !draining => {
                    self.rehash_if_requested_and_possible();
                    return if self.queue.is_none() { Wake::Rebuild } else { Wake::Due };
                }
                _ = shutdown.cancelled() => return Wake::Shutdown,
            }

            self.rehash_if_requested_and_possible();
            if self.queue.is_none() { return Wake::Rebuild; }

            // our deadline might have changed
            timer = self.refresh_timer(Some(timer));
        }
    }

    async fn on_feed_added(&mut self, id: Uuid) {
        let log = telemetry::schedule();
        if self.rehash_requested {
            log.info_kv("not adding new feed because rehash requested", [("feed", id.to_string()), ("in_progress", self.jobs_in_progress.to_string())]);
            return;
        }
        if self.tracked.contains(&id) {
            log.debug_kv("feed already scheduled", [("feed", id.to_string())]);
            return;
        }

        match self.repository.get_feed(id).await {
            Ok(feed) => {
                let Some(queue) = self.queue.as_mut() else { return };
                log.info_kv("➕ adding new feed", [("feed", id.to_string())]);
                self.tracked.insert(id);
                queue_feed(queue, feed, self.cfg.minimum_fetch_delay);
            }
            Err(e) => log.error_kv("failed adding new feed", [("feed", id.to_string()), ("error", format!("{e:#}"))]),
        }
    }

    fn on_job_done(&mut self, feed: Feed) {
        let log = telemetry::schedule();
        assert!(self.jobs_in_progress > 0, "feed {} reported done with no job in progress", feed.id);
        self.jobs_in_progress -= 1;

        if self.rehash_requested {
            log.info_kv("not re-adding feed because rehash requested", [("feed", feed.id.to_string()), ("in_progress", self.jobs_in_progress.to_string())]);
            return;
        }
        let Some(queue) = self.queue.as_mut() else { return };
        // back into the queue with its updated deadline
        log.debug_kv("♻️ re-adding feed", [("feed", feed.id.to_string())]);
        queue_feed(queue, feed, self.cfg.minimum_fetch_delay);
    }

    fn rehash_if_requested_and_possible(&mut self) {
        if !self.rehash_requested { return; }
        let log = telemetry::schedule();
        if self.jobs_in_progress > 0 {
            log.info_kv("can't rehash yet, jobs active", [("in_progress", self.jobs_in_progress.to_string())]);
            return;
        }
        let _s = log.span(&SchedulePhase::Rehash).entered();
        log.info("🔁 discarding feed queue for rebuild");
        self.queue = None;
        self.rehash_requested = false;
    }

    // Timer for the head of the queue. Keeps `old` when the deadline hasn't moved.
    fn refresh_timer(&self, old: Option<DeadlineTimer>) -> DeadlineTimer {
        let log = telemetry::schedule();
        let next = self.queue.as_ref().and_then(FeedQueue::peek).map(|job| job.deadline);

        match (next, old) {
            (None, Some(old)) => old,
            (None, None) => {
                // nothing queued; a long nap that doesn't wake us needlessly
                let idle = chrono::Duration::from_std(self.cfg.idle_wake).unwrap_or_else(|_| chrono::Duration::hours(24));
                DeadlineTimer::new(Utc::now() + idle)
            }
            (Some(deadline), Some(old)) if old.deadline() == deadline => old,
            (Some(deadline), old) => {
                if let Some(old) = old { old.stop(); }
                let timer = DeadlineTimer::new(deadline);
                if timer.in_future() { log.debug_kv("💤 sleeping", [("until", deadline.to_rfc3339())]); }
                timer
            }
        }
    }
}

/// Effective delay: the feed's own delay, but never below `minimum`.
pub fn fetch_delay(feed: &Feed, minimum: Duration) -> Duration {
    let own = Duration::from_secs(feed.fetcher_state.fetch_delay_s.max(0) as u64);
    if own < minimum {
        telemetry::schedule().debug_kv("feed with lower than minimum fetch delay", [("feed", feed.id.to_string())]);
        return minimum;
    }
    own
}

pub fn deadline_for(feed: &Feed, minimum: Duration) -> DateTime<Utc> {
    let delay = chrono::Duration::from_std(fetch_delay(feed, minimum)).unwrap_or_else(|_| chrono::Duration::zero());
    feed.fetcher_state.fetched_at + delay
}

fn queue_feed(queue: &mut FeedQueue, feed: Feed, minimum: Duration) {
    let deadline = deadline_for(&feed, minimum);
    queue.push(FeedQueueItem { feed, deadline });
}
