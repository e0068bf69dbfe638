//! Snapshot-changed subscriptions

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;
use viper_core::{VehicleId, VehicleSnapshot};

/// Callback invoked with each new snapshot of a vehicle
pub type SnapshotListener = Arc<dyn Fn(&VehicleSnapshot) + Send + Sync>;

/// A unique identifier for a registered listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Listeners keyed by the vehicle they watch
///
/// Notification is synchronous and happens after the cache write, outside any
/// map guard, so a listener may call back into the coordinator.
pub(crate) struct Listeners {
    by_vehicle: DashMap<VehicleId, Vec<(ListenerId, SnapshotListener)>>,
    next_id: AtomicU64,
}

impl Listeners {
    pub fn new() -> Self {
        Self {
            by_vehicle: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn subscribe(&self, vehicle_id: &VehicleId, listener: SnapshotListener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.by_vehicle
            .entry(vehicle_id.clone())
            .or_default()
            .push((id, listener));
        trace!(vehicle_id = %vehicle_id, listener = id.0, "Listener subscribed");
        id
    }

    pub fn unsubscribe(&self, listener_id: ListenerId) -> bool {
        for mut entry in self.by_vehicle.iter_mut() {
            let before = entry.len();
            entry.retain(|(id, _)| *id != listener_id);
            if entry.len() != before {
                return true;
            }
        }
        false
    }

    pub fn notify(&self, snapshot: &VehicleSnapshot) {
        let listeners: Vec<SnapshotListener> = self
            .by_vehicle
            .get(&snapshot.vehicle_id)
            .map(|l| l.iter().map(|(_, f)| f.clone()).collect())
            .unwrap_or_default();

        for listener in listeners {
            listener(snapshot);
        }
    }

    pub fn clear(&self) {
        self.by_vehicle.clear();
    }

    pub fn count(&self) -> usize {
        self.by_vehicle.iter().map(|l| l.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> (Arc<AtomicUsize>, SnapshotListener) {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let listener: SnapshotListener = Arc::new(move |_: &VehicleSnapshot| {
            h.fetch_add(1, Ordering::SeqCst);
        });
        (hits, listener)
    }

    #[test]
    fn test_notify_reaches_only_matching_vehicle() {
        let listeners = Listeners::new();
        let (hits_a, a) = counter();
        let (hits_b, b) = counter();
        listeners.subscribe(&VehicleId::new("a"), a);
        listeners.subscribe(&VehicleId::new("b"), b);

        listeners.notify(&VehicleSnapshot::invalid(VehicleId::new("a")));

        assert_eq!(hits_a.load(Ordering::SeqCst), 1);
        assert_eq!(hits_b.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unsubscribe() {
        let listeners = Listeners::new();
        let (hits, f) = counter();
        let id = listeners.subscribe(&VehicleId::new("a"), f);
        assert_eq!(listeners.count(), 1);

        assert!(listeners.unsubscribe(id));
        assert!(!listeners.unsubscribe(id));
        listeners.notify(&VehicleSnapshot::invalid(VehicleId::new("a")));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_listener_ids_are_unique() {
        let listeners = Listeners::new();
        let (_, f) = counter();
        let id1 = listeners.subscribe(&VehicleId::new("a"), f.clone());
        let id2 = listeners.subscribe(&VehicleId::new("a"), f);
        assert_ne!(id1, id2);
    }
}
