use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use uuid::Uuid;

use crate::scheduler::{Enclosure, Feed, FetcherState};

/// The part of the fetcher state kept in the `fetcher_state` jsonb column.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoredFetcherState {
    pub etag: String,
    pub last_modified: String,
    pub working: bool,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<DateTime<Utc>>,
    pub message: String,
}

impl From<&FetcherState> for StoredFetcherState {
    fn from(s: &FetcherState) -> Self {
        Self {
            etag: s.etag.clone(),
            last_modified: s.last_modified.clone(),
            working: s.working,
            last_success: s.last_success,
            last_error: s.last_error,
            message: s.message.clone(),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct FeedRow {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub fetched_at: DateTime<Utc>,
    pub fetch_delay_s: i32,
    pub fetcher_state: Json<StoredFetcherState>,
    pub feed_url: String,
    pub site_url: Option<String>,
    pub title: Option<String>,
    pub icon: Option<String>,
    pub article_count: i64,
}

impl From<FeedRow> for Feed {
    fn from(row: FeedRow) -> Self {
        let Json(state) = row.fetcher_state;
        Self {
            id: row.id,
            created_at: row.created_at,
            article_count: row.article_count,
            fetcher_state: FetcherState {
                fetched_at: row.fetched_at,
                fetch_delay_s: row.fetch_delay_s,
                etag: state.etag,
                last_modified: state.last_modified,
                working: state.working,
                last_success: state.last_success,
                last_error: state.last_error,
                message: state.message,
            },
            feed_url: row.feed_url,
            site_url: row.site_url,
            title: row.title,
            icon: row.icon,
        }
    }
}

/// `articles.content`
#[derive(Debug, Serialize)]
pub struct ArticleContent<'a> {
    pub authors: &'a [String],
    pub tags: &'a [String],
    pub enclosures: &'a [Enclosure],
    pub text: &'a str,
}

/// JSON sent by the `notify_event()` trigger.
#[derive(Debug, Deserialize, PartialEq)]
pub struct NotificationPayload {
    pub table: String,
    pub action: String,
    /// absent for statement-level events like TRUNCATE
    pub feed_id: Option<Uuid>,
}

/// What a notification means for the scheduler.
#[derive(Debug, PartialEq)]
pub enum Change {
    Added(Uuid),
    Rehash,
    Ignored(String),
}

pub fn classify(payload: &str) -> Result<Change> {
    let p: NotificationPayload = serde_json::from_str(payload).context("decoding notification payload")?;
    Ok(match p.action.as_str() {
        "INSERT" => match p.feed_id {
            Some(id) => Change::Added(id),
            None => Change::Rehash,
        },
        "UPDATE" | "DELETE" | "TRUNCATE" => Change::Rehash,
        other => Change::Ignored(format!("{other} on {}", p.table)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_is_a_new_feed() {
        let id = Uuid::new_v4();
        let payload = format!(r#"{{"table":"feeds","action":"INSERT","feed_id":"{id}"}}"#);
        assert_eq!(classify(&payload).unwrap(), Change::Added(id));
    }

    #[test]
    fn other_row_changes_request_rehash() {
        let id = Uuid::new_v4();
        for action in ["UPDATE", "DELETE"] {
            let payload = format!(r#"{{"table":"feeds","action":"{action}","feed_id":"{id}"}}"#);
            assert_eq!(classify(&payload).unwrap(), Change::Rehash, "{action}");
        }
        let truncate = r#"{"table":"feeds","action":"TRUNCATE","feed_id":null}"#;
        assert_eq!(classify(truncate).unwrap(), Change::Rehash);
    }

    #[test]
    fn unknown_actions_and_garbage() {
        let payload = r#"{"table":"feeds","action":"MERGE","feed_id":null}"#;
        assert_eq!(classify(payload).unwrap(), Change::Ignored("MERGE on feeds".into()));
        assert!(classify("not json").is_err());
    }

    #[test]
    fn row_maps_to_feed() {
        let id = Uuid::new_v4();
        let row = FeedRow {
            id,
            created_at: Utc::now(),
            fetched_at: DateTime::<Utc>::default(),
            fetch_delay_s: 900,
            fetcher_state: Json(StoredFetcherState { working: true, message: "ok".into(), ..Default::default() }),
            feed_url: "https://example.com/feed".into(),
            site_url: None,
            title: Some("Example".into()),
            icon: None,
            article_count: 7,
        };
        let feed = Feed::from(row);
        assert_eq!(feed.id, id);
        assert_eq!(feed.article_count, 7);
        assert_eq!(feed.fetcher_state.fetch_delay_s, 900);
        assert!(feed.fetcher_state.working);
        assert_eq!(feed.fetcher_state.message, "ok");

        let back = StoredFetcherState::from(&feed.fetcher_state);
        assert_eq!(back.message, "ok");
    }

    #[test]
    fn empty_state_column_decodes() {
        let s: StoredFetcherState = serde_json::from_str("{}").unwrap();
        assert_eq!(s, StoredFetcherState::default());
    }
}
