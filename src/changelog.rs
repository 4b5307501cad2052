//! Delivery of change batches to the visualization layer. `publish` is
//! fire-and-forget over a broadcast channel: a slow or absent subscriber
//! never blocks a worker, it just misses batches (the snapshot path exists
//! precisely so a late subscriber can catch up).

use crate::models::{ChangeBatch, StateChange};
use crate::store::TopologyStore;
use tokio::sync::broadcast;

#[derive(Clone)]
pub struct UpdateSink {
    tx: broadcast::Sender<ChangeBatch>,
}

impl UpdateSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Never blocks; a batch published with no live subscriber is dropped.
    pub fn publish(&self, batch: ChangeBatch) {
        let _ = self.tx.send(batch);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeBatch> {
        self.tx.subscribe()
    }
}

/// The full current topology rendered as one batch of `create` records, the
/// shape a (re)connecting visualization client uses to seed itself.
pub fn snapshot(store: &TopologyStore) -> ChangeBatch {
    let (stations, networks, connections) = store.snapshot();
    let mut changes: Vec<StateChange> = Vec::new();
    changes.extend(stations.into_iter().map(StateChange::created));
    changes.extend(networks.into_iter().map(StateChange::created));
    changes.extend(connections.into_iter().map(StateChange::created));
    ChangeBatch::from_changes(changes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{parse_mac, Action, Connection, EntityKind, Station};

    #[test]
    fn snapshot_renders_everything_as_creates() {
        let store = TopologyStore::new();
        let a = parse_mac("aa:aa:aa:aa:aa:aa").unwrap();
        let b = parse_mac("bb:bb:bb:bb:bb:bb").unwrap();
        store
            .stations()
            .insert_batch(vec![Station::new(a, true, 1), Station::new(b, false, 1)]);
        store
            .connections()
            .insert_batch(vec![Connection::new(a, b, 1)]);

        let batch = snapshot(&store);
        assert_eq!(batch.len(), 3);
        assert_eq!(batch.0[&EntityKind::Station].len(), 2);
        assert_eq!(batch.0[&EntityKind::Connection].len(), 1);
        assert!(batch
            .0
            .values()
            .flatten()
            .all(|c| c.action == Action::Create));
    }

    #[tokio::test]
    async fn published_batches_reach_subscribers_in_order() {
        let sink = UpdateSink::new(8);
        let mut rx = sink.subscribe();
        let store = TopologyStore::new();
        let a = parse_mac("aa:aa:aa:aa:aa:aa").unwrap();
        store.stations().insert_batch(vec![Station::new(a, false, 1)]);

        sink.publish(snapshot(&store));
        sink.publish(ChangeBatch::default());

        assert_eq!(rx.recv().await.unwrap().len(), 1);
        assert_eq!(rx.recv().await.unwrap().len(), 0);
    }

    #[test]
    fn publish_without_subscribers_does_not_fail() {
        let sink = UpdateSink::new(8);
        sink.publish(ChangeBatch::default());
    }
}
