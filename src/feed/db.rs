use anyhow::Result;
use sqlx::PgPool;
use uuid::Uuid;

/// Insert a feed row. `None` when a feed with that URL already exists.
pub async fn insert_feed(pool: &PgPool, feed_url: &str, title: Option<&str>) -> Result<Option<Uuid>> {
    let id: Option<Uuid> = sqlx::query_scalar(
        r#"
        INSERT INTO feeds (id, feed_url, title)
        VALUES ($1, $2, $3)
        ON CONFLICT (feed_url) DO NOTHING
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(feed_url)
    .bind(title)
    .fetch_optional(pool)
    .await?;
    Ok(id)
}
