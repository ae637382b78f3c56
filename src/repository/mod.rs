use anyhow::Result;
use async_trait::async_trait;
use sqlx::PgPool;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::config::ListenerConfig;
use crate::scheduler::{Article, Feed, Repository};

pub mod db;
pub mod listener;
pub mod types;

/// Postgres-backed repository. The pool is shared by the scheduler, the workers and the listener.
#[derive(Clone)]
pub struct PgRepository {
    pool: PgPool,
    listener: ListenerConfig,
}

impl PgRepository {
    pub fn new(pool: PgPool, listener: ListenerConfig) -> Self { Self { pool, listener } }
}

#[async_trait]
impl Repository for PgRepository {
    async fn list_feeds(&self) -> Result<Vec<Feed>> { db::list_feeds(&self.pool).await }

    async fn get_feed(&self, id: Uuid) -> Result<Feed> { db::get_feed(&self.pool, id).await }

    async fn watch_changes(&self, feed_added: mpsc::Sender<Uuid>, need_rehash: mpsc::Sender<bool>) -> Result<()> {
        listener::watch(self.pool.clone(), self.listener.clone(), feed_added, need_rehash).await
    }

    async fn update_feed_info(&self, id: Uuid, feed: &Feed) -> Result<()> { db::update_feed_info(&self.pool, id, feed).await }

    async fn check_existing_articles(&self, feed_id: Uuid, natural_ids: &[String]) -> Result<Vec<bool>> {
        db::check_existing_articles(&self.pool, feed_id, natural_ids).await
    }

    async fn add_article(&self, feed_id: Uuid, article: &Article) -> Result<()> { db::add_article(&self.pool, feed_id, article).await }
}
