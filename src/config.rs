use std::time::Duration;

const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 60;
const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/89.0.4389.90 Safari/537.36";
const DEFAULT_MIN_FETCH_DELAY_SECS: u64 = 15 * 60;
const DEFAULT_MAX_FETCH_DELAY_SECS: u64 = 12 * 60 * 60;
const DEFAULT_FETCH_JITTER_SECS: u64 = 30;

const DEFAULT_WORKERS: usize = 3;
const MAX_WORKERS: usize = 1024;
const DEFAULT_SCHED_MIN_DELAY_SECS: u64 = 10 * 60;
const DEFAULT_RETRY_DELAY_SECS: u64 = 30;
const DEFAULT_IDLE_WAKE_SECS: u64 = 24 * 60 * 60;

const DEFAULT_NOTIFY_CHANNEL: &str = "feed_change";
const DEFAULT_RECONNECT_DELAY_SECS: u64 = 10;

/// Fetch parameters used by every worker.
#[derive(Clone, Debug)]
pub struct FetcherConfig {
    pub http_timeout: Duration,
    pub user_agent: String,
    pub minimum_fetch_delay: Duration,
    pub maximum_fetch_delay: Duration,
    pub fetch_jitter_s: u64,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            minimum_fetch_delay: Duration::from_secs(DEFAULT_MIN_FETCH_DELAY_SECS),
            maximum_fetch_delay: Duration::from_secs(DEFAULT_MAX_FETCH_DELAY_SECS),
            fetch_jitter_s: DEFAULT_FETCH_JITTER_SECS,
        }
    }
}

impl FetcherConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(secs) = env_u64("FETCHER_HTTP_TIMEOUT_SECS") { cfg.http_timeout = Duration::from_secs(secs); }
        if let Ok(ua) = std::env::var("FETCHER_USER_AGENT") {
            if !ua.trim().is_empty() { cfg.user_agent = ua; }
        }
        if let Some(secs) = env_u64("FETCHER_MIN_DELAY_SECS") { cfg.minimum_fetch_delay = Duration::from_secs(secs); }
        if let Some(secs) = env_u64("FETCHER_MAX_DELAY_SECS") { cfg.maximum_fetch_delay = Duration::from_secs(secs); }
        if let Some(secs) = env_u64("FETCHER_JITTER_SECS") { cfg.fetch_jitter_s = secs; }
        cfg
    }
}

/// Dispatch loop parameters.
#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    pub worker_count: usize,
    /// floor applied to every feed's own fetch delay when computing its deadline
    pub minimum_fetch_delay: Duration,
    /// wait before retrying a failed queue build
    pub retry_delay: Duration,
    /// wake-up interval while the queue is empty
    pub idle_wake: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_count: DEFAULT_WORKERS,
            minimum_fetch_delay: Duration::from_secs(DEFAULT_SCHED_MIN_DELAY_SECS),
            retry_delay: Duration::from_secs(DEFAULT_RETRY_DELAY_SECS),
            idle_wake: Duration::from_secs(DEFAULT_IDLE_WAKE_SECS),
        }
    }
}

impl SchedulerConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(n) = env_u64("FETCHER_WORKERS") { cfg.worker_count = clamp_workers(n as usize); }
        if let Some(secs) = env_u64("FETCHER_SCHED_MIN_DELAY_SECS") { cfg.minimum_fetch_delay = Duration::from_secs(secs); }
        if let Some(secs) = env_u64("FETCHER_RETRY_DELAY_SECS") { cfg.retry_delay = Duration::from_secs(secs); }
        cfg
    }

    pub fn with_workers(mut self, n: usize) -> Self {
        self.worker_count = clamp_workers(n);
        self
    }
}

/// Postgres change-notification parameters.
#[derive(Clone, Debug)]
pub struct ListenerConfig {
    pub channel: String,
    pub reconnect_delay: Duration,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            channel: DEFAULT_NOTIFY_CHANNEL.to_string(),
            reconnect_delay: Duration::from_secs(DEFAULT_RECONNECT_DELAY_SECS),
        }
    }
}

pub fn clamp_workers(n: usize) -> usize { n.clamp(1, MAX_WORKERS) }

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.trim().parse::<u64>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_count_is_clamped() {
        assert_eq!(clamp_workers(0), 1);
        assert_eq!(clamp_workers(3), 3);
        assert_eq!(clamp_workers(5000), 1024);
        assert_eq!(SchedulerConfig::default().with_workers(0).worker_count, 1);
    }

    #[test]
    fn defaults_match_fetch_policy() {
        let cfg = FetcherConfig::default();
        assert_eq!(cfg.minimum_fetch_delay, Duration::from_secs(900));
        assert_eq!(cfg.maximum_fetch_delay, Duration::from_secs(43_200));
        assert_eq!(cfg.fetch_jitter_s, 30);
        assert_eq!(ListenerConfig::default().channel, "feed_change");
    }
}
