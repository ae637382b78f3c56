use tracing::Span;
use tracing::info_span;

use crate::telemetry::ctx::{OpMarker, PhaseSpan};

#[derive(Copy, Clone, Debug)]
pub struct Fetch;

#[derive(Copy, Clone, Debug)]
pub enum Phase { Worker, Feed, HttpsProbe, FetchFeed, Dedup, WriteArticles, UpdateFeed }

impl PhaseSpan for Phase {
    fn name(&self) -> &'static str { match self {
        Phase::Worker => "worker",
        Phase::Feed => "feed",
        Phase::HttpsProbe => "https_probe",
        Phase::FetchFeed => "fetch_feed",
        Phase::Dedup => "dedup",
        Phase::WriteArticles => "write_articles",
        Phase::UpdateFeed => "update_feed",
    }}
    fn span(&self) -> Span { match self {
        Phase::Worker => info_span!("worker"),
        Phase::Feed => info_span!("feed"),
        Phase::HttpsProbe => info_span!("https_probe"),
        Phase::FetchFeed => info_span!("fetch_feed"),
        Phase::Dedup => info_span!("dedup"),
        Phase::WriteArticles => info_span!("write_articles"),
        Phase::UpdateFeed => info_span!("update_feed"),
    }}
}

impl OpMarker for Fetch {
    const NAME: &'static str = "fetch";
    type Phase = Phase;
    fn root_span() -> Span { info_span!("fetch") }
}
