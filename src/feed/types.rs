use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Serialize)]
pub struct FeedAddPlan {
    pub action: &'static str,
    pub url: String,
    pub title: Option<String>,
}

#[derive(Serialize)]
pub struct FeedAddResult {
    pub inserted: bool,
    pub id: Option<Uuid>,
    pub url: String,
}

/// One line of `feed ls`.
#[derive(Serialize)]
pub struct FeedListRow {
    pub id: Uuid,
    pub feed_url: String,
    pub title: Option<String>,
    pub article_count: i64,
    pub working: bool,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<DateTime<Utc>>,
    pub message: String,
    pub fetch_delay_s: i32,
    pub next_fetch: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct FeedList {
    pub feeds: Vec<FeedListRow>,
}
