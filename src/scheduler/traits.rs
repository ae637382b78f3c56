use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::handoff::JobReceiver;
use super::types::{Article, Feed};

/// Storage used by the scheduler and the workers. Shared by all tasks without extra locking.
#[async_trait]
pub trait Repository: Send + Sync + 'static {
    // -> for the scheduler
    /// All feeds that are fetched periodically.
    async fn list_feeds(&self) -> Result<Vec<Feed>>;
    async fn get_feed(&self, id: Uuid) -> Result<Feed>;
    /// Start watching for feed changes. Pushes the id of every newly created feed to
    /// `feed_added` and a pulse to `need_rehash` whenever existing feeds change or disappear.
    /// Returns once watching is established; an error here means notifications are unsupported.
    async fn watch_changes(&self, feed_added: mpsc::Sender<Uuid>, need_rehash: mpsc::Sender<bool>) -> Result<()>;

    // -> for the workers
    /// Overwrite fetch/cache/status metadata and the URL/title/icon fields.
    async fn update_feed_info(&self, id: Uuid, feed: &Feed) -> Result<()>;
    /// One flag per natural id, same order, true if that article is already stored for the feed.
    async fn check_existing_articles(&self, feed_id: Uuid, natural_ids: &[String]) -> Result<Vec<bool>>;
    async fn add_article(&self, feed_id: Uuid, article: &Article) -> Result<()>;
}

/// Spawns the workers that fetch feeds.
#[async_trait]
pub trait WorkerPool: Send + Sync + 'static {
    /// Runs for the life of the process, taking one job at a time from `jobs` and reporting
    /// each finished feed on `done`.
    async fn start_worker(&self, id: usize, jobs: JobReceiver<Feed>, done: mpsc::Sender<Feed>);
}
