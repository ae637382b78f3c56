use tracing::Span;
use tracing::info_span;

use crate::telemetry::ctx::{OpMarker, PhaseSpan};

#[derive(Copy, Clone, Debug)]
pub struct Listen;

#[derive(Copy, Clone, Debug)]
pub enum Phase { Install, Receive, Reconnect }

impl PhaseSpan for Phase {
    fn name(&self) -> &'static str { match self { Phase::Install => "install", Phase::Receive => "receive", Phase::Reconnect => "reconnect" } }
    fn span(&self) -> Span { match self { Phase::Install => info_span!("install"), Phase::Receive => info_span!("receive"), Phase::Reconnect => info_span!("reconnect") } }
}

impl OpMarker for Listen {
    const NAME: &'static str = "listen";
    type Phase = Phase;
    fn root_span() -> Span { info_span!("listen") }
}
