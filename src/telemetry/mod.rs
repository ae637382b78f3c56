pub mod config;
pub mod ctx;
pub mod emit;
pub mod ops;

use ctx::LogCtx;

fn ctx<O: ctx::OpMarker>() -> LogCtx<O> { LogCtx { json: config::logs_are_json(), _marker: std::marker::PhantomData } }

pub fn init() -> LogCtx<ops::init::Init> { ctx() }
pub fn schedule() -> LogCtx<ops::schedule::Schedule> { ctx() }
pub fn fetch() -> LogCtx<ops::fetch::Fetch> { ctx() }
pub fn listen() -> LogCtx<ops::listen::Listen> { ctx() }
pub fn feed() -> LogCtx<ops::feed::Feed> { ctx() }
