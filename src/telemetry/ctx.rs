use anyhow::Result;
use serde::Serialize;
use std::marker::PhantomData;
use tracing::{info, debug, warn, error, Span};

use super::emit;

pub trait PhaseSpan {
    fn name(&self) -> &'static str;
    fn span(&self) -> Span;
}

pub trait OpMarker {
    const NAME: &'static str;
    type Phase: PhaseSpan;
    fn root_span() -> Span;
}

pub struct LogCtx<O: OpMarker> {
    pub(crate) json: bool,
    pub(crate) _marker: PhantomData<O>,
}

impl<O: OpMarker> LogCtx<O> {
    fn op_name(&self) -> &'static str { O::NAME }

    pub fn root_span(&self) -> Span { O::root_span() }

    pub fn root_span_kv<'a, T>(&self, fields: T) -> Span
    where
        T: IntoIterator<Item = (&'a str, String)>,
    {
        let span = self.root_span();
        let details = kv_to_string(fields);
        if details.is_empty() {
            info!(op = %self.op_name(), "start");
        } else {
            info!(op = %self.op_name(), details = %details, "start");
        }
        span
    }

    pub fn span(&self, ph: &O::Phase) -> Span { ph.span() }

    pub fn span_kv<'a, T>(&self, ph: &O::Phase, fields: T) -> Span
    where
        T: IntoIterator<Item = (&'a str, String)>,
    {
        let span = self.span(ph);
        let details = kv_to_string(fields);
        if details.is_empty() {
            debug!(op = %self.op_name(), phase = ph.name(), "span_start");
        } else {
            debug!(op = %self.op_name(), phase = ph.name(), details = %details, "span_start");
        }
        span
    }

    pub fn info(&self, msg: impl AsRef<str>) { if self.json { info!(op = %self.op_name(), "{}", msg.as_ref()); } else { info!("{}", msg.as_ref()); } }

    // text mode keeps the details too; the scheduler and workers have no other context to offer
    pub fn info_kv<'a, D>(&self, msg: &str, kv: D)
    where
        D: IntoIterator<Item = (&'a str, String)>,
    {
        let details = kv_to_string(kv);
        if self.json { info!(op = %self.op_name(), details = %details, "{}", msg); }
        else { info!("{} {}", msg, details); }
    }

    pub fn debug_kv<'a, D>(&self, msg: &str, kv: D)
    where
        D: IntoIterator<Item = (&'a str, String)>,
    {
        let details = kv_to_string(kv);
        if self.json { debug!(op = %self.op_name(), details = %details, "{}", msg); }
        else { debug!("{} {}", msg, details); }
    }

    pub fn warn_kv<'a, D>(&self, msg: &str, kv: D)
    where
        D: IntoIterator<Item = (&'a str, String)>,
    {
        let details = kv_to_string(kv);
        if self.json { warn!(op = %self.op_name(), details = %details, "{}", msg); }
        else { warn!("{} {}", msg, details); }
    }

    pub fn error_kv<'a, D>(&self, msg: &str, kv: D)
    where
        D: IntoIterator<Item = (&'a str, String)>,
    {
        let details = kv_to_string(kv);
        if self.json { error!(op = %self.op_name(), details = %details, "{}", msg); }
        else { error!("{} {}", msg, details); }
    }

    pub fn plan<T: Serialize>(&self, plan: &T) -> Result<()> { emit::print_plan(self.op_name(), plan) }
    pub fn result<T: Serialize>(&self, result: &T) -> Result<()> { emit::print_result(self.op_name(), result) }
}

// Fetch-specific helpers remain available on the typed context
impl LogCtx<crate::telemetry::ops::fetch::Fetch> {
    pub fn feed_summary(&self, feed_id: uuid::Uuid, total: usize, new: usize, failed: usize, broken: usize) {
        if self.json { info!(op = %self.op_name(), %feed_id, total, new, failed, broken, "feed_summary"); }
        else { info!("✅ Feed {} — got {} articles new={} failed={} broken={}", feed_id, total, new, failed, broken); }
    }
}

impl LogCtx<crate::telemetry::ops::schedule::Schedule> {
    pub fn dispatched(&self, feed_id: uuid::Uuid, in_progress: usize, queued: usize) {
        if self.json { info!(op = %self.op_name(), %feed_id, in_progress, queued, "dispatched"); }
        else { info!("🚚 dispatched feed {} — in_progress={} queued={}", feed_id, in_progress, queued); }
    }
}

fn kv_to_string<'a, T>(kv: T) -> String
where
    T: IntoIterator<Item = (&'a str, String)>,
{
    let mut parts: Vec<String> = Vec::new();
    for (k, v) in kv { parts.push(format!("{}={}", k, v)); }
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use tracing::{Instrument, Span};
    use tracing_subscriber::registry::LookupSpan;
    use tracing_subscriber::Registry;

    use crate::telemetry;
    use crate::telemetry::ops::init::Phase as InitPhase;

    fn parent_of(span: &Span) -> Option<tracing::Id> {
        let id = span.id()?;
        tracing::dispatcher::get_default(|d| {
            d.downcast_ref::<Registry>()
                .and_then(|r| r.span(&id))
                .and_then(|s| s.parent())
                .map(|p| p.id())
        })
    }

    #[tokio::test]
    async fn phase_span_stays_current_across_awaits() {
        let _default = tracing::subscriber::set_default(Registry::default());
        let log = telemetry::init();
        let root = log.root_span();

        let (phase, current) = async {
            let phase = log.span(&InitPhase::Migrate);
            let current = async {
                tokio::task::yield_now().await;
                Span::current()
            }
            .instrument(phase.clone())
            .await;
            (phase, current)
        }
        .instrument(root.clone())
        .await;

        assert!(phase.id().is_some());
        assert_eq!(current.id(), phase.id());
        assert_eq!(parent_of(&phase), root.id());
        // nothing stays entered once the future is done
        assert!(Span::current().is_none());
    }
}
