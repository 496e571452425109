//! Shard queues - one bounded FIFO channel per shard
//!
//! A queue is the only ordering boundary: items pushed to the same shard are
//! received in push order. Nothing orders items across shards.

use crossbeam_channel::{bounded, select, Receiver, SendError, Sender};

use crate::item::WorkItem;

/// Why a blocking push did not hand the item over
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum PushError {
    /// The receiving worker is gone
    Closed,
    /// Shutdown was broadcast while the producer was waiting
    Cancelled,
}

/// Create `shard_count` bounded queues of `capacity` each.
///
/// A capacity of 0 makes every push a rendezvous with the worker.
pub(crate) fn shard_queues<P>(
    shard_count: usize,
    capacity: usize,
) -> (Vec<Sender<WorkItem<P>>>, Vec<Receiver<WorkItem<P>>>) {
    (0..shard_count).map(|_| bounded(capacity)).unzip()
}

/// Blocking push that gives up when `cancel` is disconnected.
///
/// Blocks while the queue is full; this is the backpressure path.
pub(crate) fn push<P>(
    queue: &Sender<WorkItem<P>>,
    item: WorkItem<P>,
    cancel: &Receiver<()>,
) -> Result<(), PushError> {
    select! {
        send(queue, item) -> result => result.map_err(|SendError(_)| PushError::Closed),
        recv(cancel) -> _ => Err(PushError::Cancelled),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    fn item(key: &str) -> WorkItem<u32> {
        WorkItem::from_fn(key, 0, |_: &u32| Ok(()))
    }

    #[test]
    fn test_fifo_within_queue() {
        let (_cancel_tx, cancel_rx) = bounded::<()>(0);
        let (senders, receivers) = shard_queues::<u32>(2, 8);
        for key in ["a", "b", "c"] {
            push(&senders[1], item(key), &cancel_rx).unwrap();
        }
        let keys: Vec<String> = receivers[1].try_iter().map(|i| i.key).collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
        assert!(receivers[0].is_empty());
    }

    #[test]
    fn test_push_blocks_until_cancelled() {
        let (cancel_tx, cancel_rx) = bounded::<()>(0);
        let (senders, _receivers) = shard_queues::<u32>(1, 1);
        push(&senders[0], item("first"), &cancel_rx).unwrap();

        let sender = senders[0].clone();
        let producer = thread::spawn(move || push(&sender, item("second"), &cancel_rx));

        thread::sleep(Duration::from_millis(50));
        assert!(!producer.is_finished());

        drop(cancel_tx);
        assert_eq!(producer.join().unwrap(), Err(PushError::Cancelled));
    }

    #[test]
    fn test_push_to_closed_queue() {
        let (_cancel_tx, cancel_rx) = bounded::<()>(0);
        let (senders, receivers) = shard_queues::<u32>(1, 4);
        drop(receivers);
        assert_eq!(
            push(&senders[0], item("a"), &cancel_rx),
            Err(PushError::Closed)
        );
    }

    #[test]
    fn test_rendezvous_queue() {
        let (_cancel_tx, cancel_rx) = bounded::<()>(0);
        let (senders, receivers) = shard_queues::<u32>(1, 0);
        let receiver = receivers[0].clone();
        let consumer = thread::spawn(move || receiver.recv().map(|i| i.key));
        push(&senders[0], item("handoff"), &cancel_rx).unwrap();
        assert_eq!(consumer.join().unwrap().unwrap(), "handoff");
    }
}
