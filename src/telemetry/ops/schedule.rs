use tracing::Span;
use tracing::info_span;

use crate::telemetry::ctx::{OpMarker, PhaseSpan};

#[derive(Copy, Clone, Debug)]
pub struct Schedule;

#[derive(Copy, Clone, Debug)]
pub enum Phase { InitQueue, Wait, Dispatch, Rehash }

impl PhaseSpan for Phase {
    fn name(&self) -> &'static str { match self {
        Phase::InitQueue => "init_queue",
        Phase::Wait => "wait",
        Phase::Dispatch => "dispatch",
        Phase::Rehash => "rehash",
    }}
    fn span(&self) -> Span { match self {
        Phase::InitQueue => info_span!("init_queue"),
        Phase::Wait => info_span!("wait"),
        Phase::Dispatch => info_span!("dispatch"),
        Phase::Rehash => info_span!("rehash"),
    }}
}

impl OpMarker for Schedule {
    const NAME: &'static str = "schedule";
    type Phase = Phase;
    fn root_span() -> Span { info_span!("schedule") }
}
