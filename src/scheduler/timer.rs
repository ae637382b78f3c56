use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Sleep;

/// Single-shot alarm for one absolute wall-clock deadline.
///
/// Awaiting `&mut timer` completes at or after the deadline. `stop` (or dropping it) cancels it.
#[derive(Debug)]
pub struct DeadlineTimer {
    deadline: DateTime<Utc>,
    in_future: bool,
    sleep: Pin<Box<Sleep>>,
}

impl DeadlineTimer {
    pub fn new(deadline: DateTime<Utc>) -> Self {
        let remaining = deadline - Utc::now();
        let in_future = remaining > chrono::Duration::zero();
        let wait = remaining.to_std().unwrap_or(Duration::ZERO);
        Self { deadline, in_future, sleep: Box::pin(tokio::time::sleep(wait)) }
    }

    pub fn deadline(&self) -> DateTime<Utc> { self.deadline }

    /// Whether the deadline still lay ahead when the timer was created.
    pub fn in_future(&self) -> bool { self.in_future }

    /// Cancel the alarm. The timer is consumed and its sleep dropped, so it can never fire.
    pub fn stop(self) { drop(self.sleep); }
}

impl Future for DeadlineTimer {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        self.sleep.as_mut().poll(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn past_deadline_fires_immediately() {
        let timer = DeadlineTimer::new(Utc::now() - chrono::Duration::seconds(5));
        assert!(!timer.in_future());
        tokio::time::timeout(Duration::from_secs(1), timer).await.expect("timer should fire");
    }

    #[tokio::test(start_paused = true)]
    async fn future_deadline_waits() {
        let deadline = Utc::now() + chrono::Duration::minutes(10);
        let mut timer = DeadlineTimer::new(deadline);
        assert!(timer.in_future());
        assert_eq!(timer.deadline(), deadline);

        let early = tokio::time::timeout(Duration::from_secs(60), &mut timer).await;
        assert!(early.is_err(), "fired before its deadline");

        tokio::time::timeout(Duration::from_secs(11 * 60), &mut timer).await.expect("timer should fire");
    }
}
