use chrono::{DateTime, Utc};

use crate::scheduler::Enclosure;
use super::fetch::FetchError;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParsedImage {
    pub url: String,
    pub title: Option<String>,
}

/// One entry of a feed, independent of the syndication format.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParsedItem {
    pub guid: Option<String>,
    pub link: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub content: Option<String>,
    pub published: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
    pub authors: Vec<String>,
    pub categories: Vec<String>,
    pub image: Option<ParsedImage>,
    pub enclosures: Vec<Enclosure>,
}

impl ParsedItem {
    /// Publish time, or the update time for feeds that only carry that.
    pub fn time(&self) -> Option<DateTime<Utc>> { self.published.or(self.updated) }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParsedFeed {
    pub title: Option<String>,
    pub link: Option<String>,
    pub image: Option<ParsedImage>,
    pub items: Vec<ParsedItem>,
}

/// RSS 2.0 first, Atom as fallback.
pub fn parse_feed(body: &[u8]) -> Result<ParsedFeed, FetchError> {
    let rss_err = match rss::Channel::read_from(body) {
        Ok(ch) => return Ok(from_rss(&ch)),
        Err(e) => e,
    };
    match atom_syndication::Feed::read_from(body) {
        Ok(feed) => Ok(from_atom(&feed)),
        Err(atom_err) => Err(FetchError::Parse(format!("not rss ({rss_err}) nor atom ({atom_err})"))),
    }
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    if s.is_empty() { None } else { Some(s.to_string()) }
}

fn opt_non_empty(s: Option<&str>) -> Option<String> { s.and_then(non_empty) }

fn from_rss(ch: &rss::Channel) -> ParsedFeed {
    ParsedFeed {
        title: non_empty(ch.title()),
        link: non_empty(ch.link()),
        image: ch.image().and_then(|img| {
            non_empty(img.url()).map(|url| ParsedImage { url, title: non_empty(img.title()) })
        }),
        items: ch.items().iter().map(rss_item).collect(),
    }
}

fn rss_item(item: &rss::Item) -> ParsedItem {
    let mut authors: Vec<String> = item.author().and_then(non_empty).into_iter().collect();
    if let Some(dc) = item.dublin_core_ext() {
        authors.extend(dc.creators().iter().filter_map(|c| non_empty(c)));
    }

    let enclosures: Vec<Enclosure> = item.enclosure().map(|e| Enclosure {
        url: e.url().to_string(),
        length: e.length().to_string(),
        r#type: e.mime_type().to_string(),
    }).into_iter().collect();

    // an image enclosure doubles as the item image
    let image = enclosures.iter()
        .find(|e| e.r#type.starts_with("image/"))
        .map(|e| ParsedImage { url: e.url.clone(), title: None })
        .or_else(|| {
            item.itunes_ext().and_then(|it| opt_non_empty(it.image())).map(|url| ParsedImage { url, title: None })
        });

    ParsedItem {
        guid: item.guid().and_then(|g| non_empty(g.value())),
        link: opt_non_empty(item.link()),
        title: item.title().map(str::to_string),
        description: item.description().map(str::to_string),
        content: item.content().map(str::to_string),
        published: rss_published_at(item),
        updated: None,
        authors,
        categories: item.categories().iter().map(|c| c.name().to_string()).collect(),
        image,
        enclosures,
    }
}

/// RFC 2822 `pubDate`, then a Dublin Core RFC 3339 date. Offsets are folded into UTC.
pub fn rss_published_at(item: &rss::Item) -> Option<DateTime<Utc>> {
    if let Some(pub_date) = item.pub_date() {
        if let Ok(dt) = DateTime::parse_from_rfc2822(pub_date.trim()) { return Some(dt.with_timezone(&Utc)); }
    }
    if let Some(dc) = item.dublin_core_ext() {
        if let Some(first) = dc.dates().first() {
            if let Ok(dt) = DateTime::parse_from_rfc3339(first.trim()) { return Some(dt.with_timezone(&Utc)); }
        }
    }
    None
}

fn from_atom(feed: &atom_syndication::Feed) -> ParsedFeed {
    let image = feed.logo().or(feed.icon()).and_then(non_empty).map(|url| ParsedImage { url, title: None });
    ParsedFeed {
        title: non_empty(feed.title().as_str()),
        link: atom_alternate(feed.links()),
        image,
        items: feed.entries().iter().map(atom_entry).collect(),
    }
}

// rel defaults to "alternate"; take the first one, else any link
fn atom_alternate(links: &[atom_syndication::Link]) -> Option<String> {
    links.iter()
        .find(|l| l.rel() == "alternate")
        .or_else(|| links.first())
        .and_then(|l| non_empty(l.href()))
}

fn atom_entry(entry: &atom_syndication::Entry) -> ParsedItem {
    let enclosures = entry.links().iter()
        .filter(|l| l.rel() == "enclosure")
        .map(|l| Enclosure {
            url: l.href().to_string(),
            length: l.length().unwrap_or_default().to_string(),
            r#type: l.mime_type().unwrap_or_default().to_string(),
        })
        .collect();

    ParsedItem {
        guid: non_empty(entry.id()),
        link: atom_alternate(entry.links()),
        title: Some(entry.title().as_str().to_string()),
        description: entry.summary().map(|s| s.as_str().to_string()),
        content: entry.content().and_then(|c| c.value()).map(str::to_string),
        published: entry.published().map(|dt| dt.with_timezone(&Utc)),
        updated: Some(entry.updated().with_timezone(&Utc)),
        authors: entry.authors().iter().filter_map(|p| non_empty(p.name())).collect(),
        categories: entry.categories().iter().map(|c| c.label().unwrap_or(c.term()).to_string()).collect(),
        image: None,
        enclosures,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Timelike, TimeZone};

    const RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0" xmlns:dc="http://purl.org/dc/elements/1.1/">
  <channel>
    <title>Example</title>
    <link>https://example.com/</link>
    <description>d</description>
    <image><url>https://example.com/logo.png</url><title>Example</title><link>https://example.com/</link></image>
    <item>
      <title>First</title>
      <link>https://example.com/1</link>
      <guid isPermaLink="false">one</guid>
      <pubDate>Tue, 06 Apr 2021 11:30:00 +0200</pubDate>
      <category>news</category>
      <dc:creator>Alice</dc:creator>
      <enclosure url="https://example.com/1.jpg" length="123" type="image/jpeg"/>
    </item>
    <item>
      <title>Second</title>
      <link>https://example.com/2</link>
      <dc:date>2021-04-07T08:00:00Z</dc:date>
    </item>
  </channel>
</rss>"#;

    const ATOM: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Atom Example</title>
  <link href="https://atom.example.com/"/>
  <id>urn:uuid:60a76c80-d399-11d9-b93c-0003939e0af6</id>
  <updated>2021-04-06T18:30:02Z</updated>
  <entry>
    <title>Atom entry</title>
    <link href="https://atom.example.com/entry"/>
    <link rel="enclosure" href="https://atom.example.com/a.mp3" length="42" type="audio/mpeg"/>
    <id>urn:uuid:1225c695-cfb8-4ebb-aaaa-80da344efa6a</id>
    <updated>2021-04-06T18:30:02Z</updated>
    <author><name>Bob</name></author>
    <summary>Some text.</summary>
  </entry>
</feed>"#;

    #[test]
    fn parses_rss_channel_and_items() {
        let feed = parse_feed(RSS.as_bytes()).unwrap();
        assert_eq!(feed.title.as_deref(), Some("Example"));
        assert_eq!(feed.link.as_deref(), Some("https://example.com/"));
        assert_eq!(feed.image.as_ref().map(|i| i.url.as_str()), Some("https://example.com/logo.png"));
        assert_eq!(feed.items.len(), 2);

        let first = &feed.items[0];
        assert_eq!(first.guid.as_deref(), Some("one"));
        assert_eq!(first.published.unwrap().hour(), 9);
        assert_eq!(first.authors, vec!["Alice".to_string()]);
        assert_eq!(first.categories, vec!["news".to_string()]);
        assert_eq!(first.enclosures.len(), 1);
        assert_eq!(first.image.as_ref().map(|i| i.url.as_str()), Some("https://example.com/1.jpg"));

        let second = &feed.items[1];
        assert_eq!(second.guid, None);
        assert_eq!(second.time(), Some(Utc.with_ymd_and_hms(2021, 4, 7, 8, 0, 0).unwrap()));
    }

    #[test]
    fn falls_back_to_atom() {
        let feed = parse_feed(ATOM.as_bytes()).unwrap();
        assert_eq!(feed.title.as_deref(), Some("Atom Example"));
        assert_eq!(feed.link.as_deref(), Some("https://atom.example.com/"));
        let entry = &feed.items[0];
        assert_eq!(entry.link.as_deref(), Some("https://atom.example.com/entry"));
        assert_eq!(entry.authors, vec!["Bob".to_string()]);
        assert_eq!(entry.description.as_deref(), Some("Some text."));
        assert_eq!(entry.enclosures[0].r#type, "audio/mpeg");
        assert!(entry.published.is_none());
        assert!(entry.time().is_some());
    }

    #[test]
    fn garbage_is_a_parse_error() {
        assert!(matches!(parse_feed(b"<html><body>nope</body></html>"), Err(FetchError::Parse(_))));
    }
}
