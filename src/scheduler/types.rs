use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-feed fetch bookkeeping, distinct from the feed's content metadata.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FetcherState {
    /// last tried fetch, success or not
    pub fetched_at: DateTime<Utc>,
    /// delay in seconds between fetches, only changed by a successful fetch
    pub fetch_delay_s: i32,

    // caching headers
    pub etag: String,
    pub last_modified: String,

    pub working: bool,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<DateTime<Utc>>,
    pub message: String,
}

/// A feed as seen by the scheduler and the workers.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Feed {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    /// derived from the article table when the feed is loaded
    pub article_count: i64,

    pub fetcher_state: FetcherState,

    pub feed_url: String,
    pub site_url: Option<String>,
    pub title: Option<String>,
    pub icon: Option<String>,
}

/// An attached file.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Enclosure {
    pub url: String,
    pub length: String,
    pub r#type: String,
}

/// An entry extracted from a feed, ready to be stored.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Article {
    pub id: Uuid,
    /// GUID according to the feed, or the link if the feed has no GUID
    pub site_guid: String,

    pub time: DateTime<Utc>,
    pub link: Option<String>,

    pub image: Option<String>,
    pub image_title: Option<String>,

    // raw and html-sanitized versions
    pub title: String,
    pub raw_title: String,
    pub teaser: String,
    pub raw_teaser: String,
    pub text: String,
    pub raw_text: String,

    pub authors: Vec<String>,
    pub tags: Vec<String>,
    pub enclosures: Vec<Enclosure>,
}
