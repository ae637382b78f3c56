use std::time::Duration;

use rand::Rng;

use crate::config::FetcherConfig;

const SECS_PER_DAY: f64 = 86_400.0;

/// Fetch delay derived from the publishing rate, before jitter.
///
/// `None` while the feed is younger than a day; the current delay stays in place then.
pub fn base_fetch_delay(article_count: i64, subscribed: chrono::Duration, cfg: &FetcherConfig) -> Option<Duration> {
    if subscribed < chrono::Duration::hours(24) { return None; }
    if article_count <= 0 { return Some(cfg.maximum_fetch_delay); }

    let days = (subscribed.num_seconds() as f64 / SECS_PER_DAY).round();
    let per_day = (article_count as f64 / days).round() as i64;

    let min = cfg.minimum_fetch_delay;
    Some(match per_day {
        n if n >= 15 => min,
        n if n >= 8 => min * 2,
        n if n >= 5 => min * 3,
        _ => min * 4,
    })
}

/// Uniform in `[0, bound_s)` seconds, so feeds drift apart instead of all being fetched together.
pub fn jitter(bound_s: u64) -> Duration {
    if bound_s == 0 { return Duration::ZERO; }
    Duration::from_secs(rand::thread_rng().gen_range(0..bound_s))
}

/// New `fetch_delay_s` for a feed, or `None` to keep the current one.
pub fn next_fetch_delay_s(article_count: i64, subscribed: chrono::Duration, cfg: &FetcherConfig) -> Option<i32> {
    let delay = base_fetch_delay(article_count, subscribed, cfg)? + jitter(cfg.fetch_jitter_s);
    Some(i32::try_from(delay.as_secs_f64().round() as i64).unwrap_or(i32::MAX))
}
