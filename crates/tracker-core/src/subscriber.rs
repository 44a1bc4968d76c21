//! Subscriber Bus (C8, spec.md §4.7): per-topic callback lists invoked
//! synchronously from the Manager loop. Callbacks are a contract, not a
//! channel — subscribers "must not block for long" (spec.md §4.7); the bus
//! itself does not enforce that, it merely documents and calls them.

use crate::events::{EventStateUpdate, PopulationTotal, TerritoryChange, ZoneStatusChange};

type Callback<T> = Box<dyn Fn(&T) + Send + Sync>;

/// Holds one callback list per notification topic (spec.md §6).
#[derive(Default)]
pub struct SubscriberBus {
    on_population_total: Vec<Callback<PopulationTotal>>,
    on_territory_change: Vec<Callback<TerritoryChange>>,
    on_zone_status_change: Vec<Callback<ZoneStatusChange>>,
    on_event_update: Vec<Callback<EventStateUpdate>>,
}

impl SubscriberBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_population_total(&mut self, f: impl Fn(&PopulationTotal) + Send + Sync + 'static) {
        self.on_population_total.push(Box::new(f));
    }

    pub fn on_territory_change(&mut self, f: impl Fn(&TerritoryChange) + Send + Sync + 'static) {
        self.on_territory_change.push(Box::new(f));
    }

    pub fn on_zone_status_change(&mut self, f: impl Fn(&ZoneStatusChange) + Send + Sync + 'static) {
        self.on_zone_status_change.push(Box::new(f));
    }

    pub fn on_event_update(&mut self, f: impl Fn(&EventStateUpdate) + Send + Sync + 'static) {
        self.on_event_update.push(Box::new(f));
    }

    pub fn publish_population_total(&self, total: &PopulationTotal) {
        for cb in &self.on_population_total {
            cb(total);
        }
    }

    pub fn publish_territory_change(&self, change: &TerritoryChange) {
        for cb in &self.on_territory_change {
            cb(change);
        }
    }

    pub fn publish_zone_status_change(&self, change: &ZoneStatusChange) {
        for cb in &self.on_zone_status_change {
            cb(change);
        }
    }

    pub fn publish_event_update(&self, update: &EventStateUpdate) {
        for cb in &self.on_event_update {
            cb(update);
        }
    }
}

impl std::fmt::Debug for SubscriberBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberBus")
            .field("on_population_total", &self.on_population_total.len())
            .field("on_territory_change", &self.on_territory_change.len())
            .field("on_zone_status_change", &self.on_zone_status_change.len())
            .field("on_event_update", &self.on_event_update.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{WorldID, ZoneInstanceID};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn multiple_callbacks_on_the_same_topic_all_fire() {
        let mut bus = SubscriberBus::new();
        let count = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let count = count.clone();
            bus.on_zone_status_change(move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            });
        }

        bus.publish_zone_status_change(&ZoneStatusChange {
            world_id: WorldID(1),
            zone_id: ZoneInstanceID::new(2, 0),
            status: crate::map::ZoneStatus::Unlocked,
        });

        assert_eq!(count.load(Ordering::SeqCst), 3);
    }
}
