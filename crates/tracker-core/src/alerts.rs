//! Alert Registry & lifecycle (C4, spec.md §3 + §4.4).
//!
//! `AlertRegistry` is pure bookkeeping keyed by `MetagameEventInstanceID`;
//! the Manager (C6) is what decides which transition applies and threads
//! the zone's current-alert pointer. Keeping that decision out of this
//! module lets the transition table live next to the rest of the `select`
//! loop's handlers while `AlertRegistry` itself stays a plain map.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{FactionID, MapID, MetagameEventID, MetagameEventInstanceID};

/// A live or recently-ended metagame event instance (spec.md §3, `Alert`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: MetagameEventInstanceID,
    pub map_id: MapID,
    pub metagame_event_id: MetagameEventID,
    pub name: String,
    pub description: String,
    #[serde(with = "crate::config::duration_secs")]
    pub duration: std::time::Duration,
    pub is_continent_lock: bool,
    pub is_territory: bool,
    pub starting_faction: FactionID,
    /// VS/NC/TR score, indexed `[0]=VS, [1]=NC, [2]=TR`.
    pub score: [f64; 3],
    pub url: String,
    pub victor: Option<FactionID>,
    pub started: DateTime<Utc>,
    pub ended: Option<DateTime<Utc>>,
    pub timestamp: DateTime<Utc>,
}

impl Alert {
    pub fn score_index(faction: FactionID) -> Option<usize> {
        match faction {
            FactionID::VS => Some(0),
            FactionID::NC => Some(1),
            FactionID::TR => Some(2),
            _ => None,
        }
    }

    /// argmax of VS/NC/TR score; ties yield `None` (spec.md §9: "when a
    /// territory alert ends in a tie with no explicit victor... this spec
    /// chooses None").
    pub fn compute_victor(&self) -> Option<FactionID> {
        let [vs, nc, tr] = self.score;
        let max = vs.max(nc).max(tr);
        let winners = [(FactionID::VS, vs), (FactionID::NC, nc), (FactionID::TR, tr)]
            .into_iter()
            .filter(|(_, s)| *s == max)
            .count();
        if winners != 1 {
            return None;
        }
        if vs == max {
            Some(FactionID::VS)
        } else if nc == max {
            Some(FactionID::NC)
        } else {
            Some(FactionID::TR)
        }
    }

    /// Whether housekeeping should purge this alert: `started + duration +
    /// 10 min` (configurable grace) has passed (spec.md §3, §4.4).
    pub fn is_expired(&self, now: DateTime<Utc>, purge_grace: std::time::Duration) -> bool {
        let duration = chrono::Duration::from_std(self.duration).unwrap_or(chrono::Duration::zero());
        let grace = chrono::Duration::from_std(purge_grace).unwrap_or(chrono::Duration::zero());
        now > self.started + duration + grace
    }
}

/// Keyed store of live/recent alerts (spec.md §4.4: `map<MetagameEventInstanceID, *Alert>`).
#[derive(Debug, Default)]
pub struct AlertRegistry {
    alerts: HashMap<MetagameEventInstanceID, Alert>,
}

impl AlertRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: MetagameEventInstanceID) -> Option<&Alert> {
        self.alerts.get(&id)
    }

    pub fn get_mut(&mut self, id: MetagameEventInstanceID) -> Option<&mut Alert> {
        self.alerts.get_mut(&id)
    }

    pub fn contains(&self, id: MetagameEventInstanceID) -> bool {
        self.alerts.contains_key(&id)
    }

    pub fn insert(&mut self, alert: Alert) {
        self.alerts.insert(alert.id, alert);
    }

    pub fn remove(&mut self, id: MetagameEventInstanceID) -> Option<Alert> {
        self.alerts.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }

    /// Third-party alert record arrival: create if absent, else merge score,
    /// victor, and `ended` (spec.md §4.4).
    pub fn merge_third_party(
        &mut self,
        id: MetagameEventInstanceID,
        score: [f64; 3],
        victor: Option<FactionID>,
        ended: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
        build_new: impl FnOnce() -> Alert,
    ) {
        match self.alerts.get_mut(&id) {
            Some(alert) => {
                alert.score = score;
                if victor.is_some() {
                    alert.victor = victor;
                }
                if ended.is_some() {
                    alert.ended = ended;
                }
                alert.timestamp = now;
            }
            None => {
                self.alerts.insert(id, build_new());
            }
        }
    }

    /// Housekeeping purge: drop alerts whose grace period has elapsed.
    /// Returns the ids removed so the caller can detach zone pointers.
    pub fn purge_expired(
        &mut self,
        now: DateTime<Utc>,
        purge_grace: std::time::Duration,
    ) -> Vec<MetagameEventInstanceID> {
        let expired: Vec<_> = self
            .alerts
            .values()
            .filter(|a| a.is_expired(now, purge_grace))
            .map(|a| a.id)
            .collect();
        for id in &expired {
            self.alerts.remove(id);
        }
        expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{InstanceID, WorldID};
    use std::time::Duration as StdDuration;

    fn ts(secs: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(secs, 0).unwrap()
    }

    fn sample_alert(score: [f64; 3]) -> Alert {
        Alert {
            id: MetagameEventInstanceID::new(WorldID(17), InstanceID(2)),
            map_id: MapID(2),
            metagame_event_id: MetagameEventID(1),
            name: "Indar Superiority".into(),
            description: String::new(),
            duration: StdDuration::from_secs(90 * 60),
            is_continent_lock: false,
            is_territory: true,
            starting_faction: FactionID::None,
            score,
            url: String::new(),
            victor: None,
            started: ts(0),
            ended: None,
            timestamp: ts(0),
        }
    }

    #[test]
    fn victor_is_the_unique_highest_score() {
        let alert = sample_alert([10.0, 50.0, 40.0]);
        assert_eq!(alert.compute_victor(), Some(FactionID::NC));
    }

    #[test]
    fn tied_score_has_no_victor() {
        let alert = sample_alert([50.0, 50.0, 0.0]);
        assert_eq!(alert.compute_victor(), None);
    }

    #[test]
    fn purge_expired_removes_after_duration_plus_grace() {
        let mut registry = AlertRegistry::new();
        let alert = sample_alert([0.0, 0.0, 0.0]);
        let id = alert.id;
        registry.insert(alert);

        let grace = StdDuration::from_secs(10 * 60);
        let not_yet = ts(90 * 60);
        assert!(registry.purge_expired(not_yet, grace).is_empty());

        let past_grace = ts(90 * 60 + 10 * 60 + 1);
        let removed = registry.purge_expired(past_grace, grace);
        assert_eq!(removed, vec![id]);
        assert!(registry.is_empty());
    }

    #[test]
    fn third_party_record_creates_when_absent_and_merges_when_present() {
        let mut registry = AlertRegistry::new();
        let id = MetagameEventInstanceID::new(WorldID(17), InstanceID(2));

        registry.merge_third_party(id, [1.0, 2.0, 3.0], Some(FactionID::TR), None, ts(5), || {
            sample_alert([1.0, 2.0, 3.0])
        });
        assert!(registry.contains(id));
        assert_eq!(registry.get(id).unwrap().victor, Some(FactionID::TR));

        registry.merge_third_party(id, [9.0, 9.0, 9.0], None, Some(ts(10)), ts(10), || {
            panic!("must not rebuild an existing alert")
        });
        let alert = registry.get(id).unwrap();
        assert_eq!(alert.score, [9.0, 9.0, 9.0]);
        assert_eq!(alert.victor, Some(FactionID::TR));
        assert_eq!(alert.ended, Some(ts(10)));
    }
}
