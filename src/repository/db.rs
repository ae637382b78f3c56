use std::collections::HashSet;

use anyhow::{Context, Result};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::scheduler::{Article, Feed};
use super::types::{ArticleContent, FeedRow, StoredFetcherState};

const SELECT_FEEDS: &str = r#"
    SELECT f.id, f.created_at, f.fetched_at, f.fetch_delay_s, f.fetcher_state,
           f.feed_url, f.site_url, f.title, f.icon,
           (SELECT COUNT(*) FROM articles a WHERE a.feed_id = f.id) AS article_count
    FROM feeds f
"#;

pub async fn list_feeds(pool: &PgPool) -> Result<Vec<Feed>> {
    let query = format!("{} ORDER BY f.created_at", SELECT_FEEDS);
    let rows = sqlx::query_as::<_, FeedRow>(&query)
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().map(Into::into).collect())
}

pub async fn get_feed(pool: &PgPool, id: Uuid) -> Result<Feed> {
    let query = format!("{} WHERE f.id = $1", SELECT_FEEDS);
    let row = sqlx::query_as::<_, FeedRow>(&query)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .with_context(|| format!("feed {id} not found"))?;
    Ok(row.into())
}

/// Only fetch bookkeeping and the URL/title/icon columns are written.
pub async fn update_feed_info(pool: &PgPool, id: Uuid, feed: &Feed) -> Result<()> {
    let state = StoredFetcherState::from(&feed.fetcher_state);
    sqlx::query(
        r#"
        UPDATE feeds
        SET fetched_at = $2, fetch_delay_s = $3, fetcher_state = $4,
            feed_url = $5, site_url = $6, title = $7, icon = $8,
            updated_at = now()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(feed.fetcher_state.fetched_at)
    .bind(feed.fetcher_state.fetch_delay_s)
    .bind(Json(&state))
    .bind(&feed.feed_url)
    .bind(&feed.site_url)
    .bind(&feed.title)
    .bind(&feed.icon)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn check_existing_articles(pool: &PgPool, feed_id: Uuid, natural_ids: &[String]) -> Result<Vec<bool>> {
    if natural_ids.is_empty() { return Ok(Vec::new()); }

    let found: Vec<String> = sqlx::query_scalar("SELECT site_guid FROM articles WHERE feed_id = $1 AND site_guid = ANY($2)")
        .bind(feed_id)
        .bind(natural_ids)
        .fetch_all(pool)
        .await?;
    let found: HashSet<String> = found.into_iter().collect();

    // an empty id can't be stored, report it as taken
    Ok(natural_ids.iter().map(|id| id.is_empty() || found.contains(id)).collect())
}

pub async fn add_article(pool: &PgPool, feed_id: Uuid, a: &Article) -> Result<()> {
    let content = ArticleContent { authors: &a.authors, tags: &a.tags, enclosures: &a.enclosures, text: &a.text };
    sqlx::query(
        r#"
        INSERT INTO articles (id, feed_id, site_guid, posted_at, link, image, image_title, title, teaser, content)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(a.id)
    .bind(feed_id)
    .bind(&a.site_guid)
    .bind(a.time)
    .bind(&a.link)
    .bind(&a.image)
    .bind(&a.image_title)
    .bind(non_empty(&a.title))
    .bind(non_empty(&a.teaser))
    .bind(Json(&content))
    .execute(pool)
    .await?;
    Ok(())
}

fn non_empty(s: &str) -> Option<&str> { if s.is_empty() { None } else { Some(s) } }
