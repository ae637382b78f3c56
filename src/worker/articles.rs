use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::scheduler::Article;
use super::parse::{ParsedImage, ParsedItem};
use super::sanitize::Sanitizer;

/// Put items oldest first, so the oldest one gets stored first.
///
/// Fully dated feeds are sorted by time (stable, ties keep feed order). Otherwise the feed is
/// assumed to list newest first and is reversed.
pub fn order_items(items: &mut [ParsedItem]) {
    let all_dated = items.iter().all(|i| i.time().is_some());
    if all_dated {
        items.sort_by_key(ParsedItem::time);
    } else {
        items.reverse();
    }
}

/// GUID, else link. `None` means the item can't be identified and is skipped.
pub fn natural_id(item: &ParsedItem) -> Option<String> {
    item.guid.clone().or_else(|| item.link.clone()).filter(|id| !id.is_empty())
}

pub fn build_article(item: &ParsedItem, site_guid: String, now: DateTime<Utc>, sanitizer: &Sanitizer) -> Article {
    let raw_title = item.title.clone().unwrap_or_default();
    let raw_teaser = item.description.clone().unwrap_or_default();
    let mut raw_text = item.content.clone().unwrap_or_default();
    if raw_text.is_empty() { raw_text = raw_teaser.clone(); }

    let (image, image_title) = match &item.image {
        Some(ParsedImage { url, title }) => (Some(url.clone()), title.clone()),
        None => (None, None),
    };

    Article {
        id: Uuid::new_v4(),
        site_guid,
        time: item.time().unwrap_or(now),
        link: item.link.clone(),
        image,
        image_title,
        title: sanitizer.strip_markup(&raw_title),
        teaser: sanitizer.strip_markup(&raw_teaser),
        text: sanitizer.sanitize_body(&raw_text),
        raw_title,
        raw_teaser,
        raw_text,
        authors: item.authors.clone(),
        tags: item.categories.clone(),
        enclosures: item.enclosures.clone(),
    }
}
