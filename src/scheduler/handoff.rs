//! Capacity-zero job handoff between the dispatch loop and the workers.
//!
//! A send only completes once an idle worker has taken the value, so a dispatcher with all
//! workers busy stays parked in `send`. Idle workers announce themselves with a one-shot slot.

use tokio::sync::{mpsc, oneshot};

pub struct JobSender<T> {
    idle: mpsc::Receiver<oneshot::Sender<T>>,
}

#[derive(Clone)]
pub struct JobReceiver<T> {
    idle: mpsc::Sender<oneshot::Sender<T>>,
}

/// `workers` bounds the number of idle announcements that can be pending at once.
pub fn rendezvous<T>(workers: usize) -> (JobSender<T>, JobReceiver<T>) {
    let (tx, rx) = mpsc::channel(workers.max(1));
    (JobSender { idle: rx }, JobReceiver { idle: tx })
}

impl<T> JobSender<T> {
    /// Hand `value` to the next idle worker. Gives the value back if every receiver is gone.
    pub async fn send(&mut self, mut value: T) -> Result<(), T> {
        loop {
            let Some(slot) = self.idle.recv().await else { return Err(value) };
            match slot.send(value) {
                Ok(()) => return Ok(()),
                // that worker stopped waiting; try the next one
                Err(v) => value = v,
            }
        }
    }
}

impl<T> JobReceiver<T> {
    /// Wait for the next job. `None` once the sender is gone.
    pub async fn recv(&self) -> Option<T> {
        let (tx, rx) = oneshot::channel();
        self.idle.send(tx).await.ok()?;
        rx.await.ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn send_blocks_until_a_worker_is_ready() {
        let (mut tx, rx) = rendezvous::<u32>(1);

        let blocked = tokio::time::timeout(Duration::from_millis(50), tx.send(1)).await;
        assert!(blocked.is_err(), "send completed without a receiver waiting");

        let worker = tokio::spawn(async move { rx.recv().await });
        tx.send(2).await.unwrap();
        assert_eq!(worker.await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn each_job_goes_to_exactly_one_worker() {
        let (mut tx, rx) = rendezvous::<u32>(3);
        let (done_tx, mut done_rx) = mpsc::channel::<u32>(8);
        for _ in 0..3 {
            let rx = rx.clone();
            let done_tx = done_tx.clone();
            tokio::spawn(async move {
                while let Some(v) = rx.recv().await { done_tx.send(v).await.unwrap(); }
            });
        }
        drop(done_tx);

        for v in 0..6 { tx.send(v).await.unwrap(); }
        let mut got = Vec::new();
        for _ in 0..6 { got.push(done_rx.recv().await.unwrap()); }
        got.sort();
        assert_eq!(got, vec![0, 1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn send_returns_value_when_workers_are_gone() {
        let (mut tx, rx) = rendezvous::<&str>(1);
        drop(rx);
        assert_eq!(tx.send("job").await, Err("job"));
    }

    #[tokio::test]
    async fn recv_ends_when_sender_dropped() {
        let (tx, rx) = rendezvous::<u32>(1);
        drop(tx);
        assert_eq!(rx.recv().await, None);
    }
}
