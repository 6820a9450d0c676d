//! Live Feed Subscriber
//!
//! Delivers readings from a readings log to a callback: first the replayed
//! tail of the log in ascending order, then every reading written later,
//! for as long as the subscription lives.
//!
//! Delivery runs on a tokio task. The callback sits behind a mutex that
//! `stop` takes before cancelling, so once `stop` returns the callback has
//! run for the last time.

use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

use crate::storage::{ChildAdded, Reading, ReadingsRef, StorageResult, SubscriptionId};

type Callback = Box<dyn FnMut(&Reading) + Send>;

/// Entry points for live readings subscriptions
pub struct LiveFeed;

impl LiveFeed {
    /// Subscribe to the last `limit` readings and everything written afterwards
    pub fn start<F>(readings: &ReadingsRef, limit: usize, on_reading: F) -> StorageResult<FeedSubscription>
    where
        F: FnMut(&Reading) + Send + 'static,
    {
        let subscription = readings.subscribe(limit)?;
        Ok(Self::attach(readings, subscription, on_reading))
    }

    /// Drive an already registered subscription.
    ///
    /// Whatever is left in `subscription.initial` is delivered first.
    pub fn attach<F>(readings: &ReadingsRef, subscription: ChildAdded, on_reading: F) -> FeedSubscription
    where
        F: FnMut(&Reading) + Send + 'static,
    {
        let ChildAdded {
            id,
            path,
            initial,
            mut receiver,
        } = subscription;

        let callback: Arc<Mutex<Option<Callback>>> = Arc::new(Mutex::new(Some(Box::new(on_reading))));
        let delivery = Arc::clone(&callback);

        tracing::debug!(path = %path, subscription = id, replay = initial.len(), "Feed started");

        let task = tokio::spawn(async move {
            for reading in &initial {
                if !deliver(&delivery, reading) {
                    return;
                }
            }
            while let Some(reading) = receiver.recv().await {
                if !deliver(&delivery, &reading) {
                    break;
                }
            }
        });

        FeedSubscription {
            readings: readings.clone(),
            id,
            callback,
            task,
            stopped: false,
        }
    }
}

fn deliver(callback: &Mutex<Option<Callback>>, reading: &Reading) -> bool {
    let Ok(mut guard) = callback.lock() else {
        return false;
    };
    match guard.as_mut() {
        Some(on_reading) => {
            on_reading(reading);
            true
        }
        None => false,
    }
}

/// A running feed. Stops on `stop` or when dropped.
pub struct FeedSubscription {
    readings: ReadingsRef,
    id: SubscriptionId,
    callback: Arc<Mutex<Option<Callback>>>,
    task: JoinHandle<()>,
    stopped: bool,
}

impl FeedSubscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn is_active(&self) -> bool {
        !self.stopped && !self.task.is_finished()
    }

    /// Cancel delivery. No callback runs after this returns.
    pub fn stop(mut self) {
        self.cancel();
    }

    fn cancel(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;

        // Waits for an in-flight delivery to finish
        match self.callback.lock() {
            Ok(mut guard) => drop(guard.take()),
            Err(poisoned) => drop(poisoned.into_inner().take()),
        }
        self.task.abort();

        if let Err(e) = self.readings.unsubscribe(self.id) {
            tracing::warn!(subscription = self.id, error = %e, "Failed to cancel subscription");
        }
        tracing::debug!(path = %self.readings.path(), subscription = self.id, "Feed stopped");
    }
}

impl Drop for FeedSubscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::RealtimeDatabase;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn readings() -> ReadingsRef {
        ReadingsRef::new(Arc::new(RealtimeDatabase::in_memory()), "UsersData/u1/readings")
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<i64>) -> i64 {
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("feed delivery timed out")
            .expect("feed closed")
    }

    #[tokio::test]
    async fn test_replays_tail_then_streams() {
        let readings = readings();
        for ts in 1..=5 {
            readings.push(Reading::new(ts, 1.0, 1.0, 1.0)).unwrap();
        }

        let (tx, mut rx) = mpsc::unbounded_channel();
        let feed = LiveFeed::start(&readings, 2, move |r| {
            let _ = tx.send(r.timestamp);
        })
        .unwrap();

        assert_eq!(next(&mut rx).await, 4);
        assert_eq!(next(&mut rx).await, 5);

        readings.push(Reading::new(6, 1.0, 1.0, 1.0)).unwrap();
        assert_eq!(next(&mut rx).await, 6);
        assert!(feed.is_active());

        feed.stop();
    }

    #[tokio::test]
    async fn test_no_delivery_after_stop() {
        let readings = readings();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let feed = LiveFeed::start(&readings, 1, move |r| {
            let _ = tx.send(r.timestamp);
        })
        .unwrap();
        assert_eq!(readings.subscriber_count().unwrap(), 1);

        feed.stop();
        assert_eq!(readings.subscriber_count().unwrap(), 0);

        readings.push(Reading::new(9, 1.0, 1.0, 1.0)).unwrap();
        tokio::task::yield_now().await;
        // Sender was dropped with the callback
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_drop_cancels_subscription() {
        let readings = readings();
        {
            let _feed = LiveFeed::start(&readings, 1, |_| {}).unwrap();
            assert_eq!(readings.subscriber_count().unwrap(), 1);
        }
        assert_eq!(readings.subscriber_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_attach_skips_consumed_replay() {
        let readings = readings();
        for ts in 1..=3 {
            readings.push(Reading::new(ts, 1.0, 1.0, 1.0)).unwrap();
        }

        let mut subscription = readings.subscribe(10).unwrap();
        let replayed = std::mem::take(&mut subscription.initial);
        assert_eq!(replayed.len(), 3);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let _feed = LiveFeed::attach(&readings, subscription, move |r| {
            let _ = tx.send(r.timestamp);
        });

        readings.push(Reading::new(4, 1.0, 1.0, 1.0)).unwrap();
        assert_eq!(next(&mut rx).await, 4);
    }
}
