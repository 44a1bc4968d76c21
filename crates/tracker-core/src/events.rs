//! Wire types for events flowing into and notifications flowing out of the
//! State Manager (spec.md §6, §9 "Polymorphic incoming events").
//!
//! Incoming events are modelled as a single tagged sum transported over one
//! channel — the alternative (one channel per event type) was rejected for
//! fan-in simplicity (spec.md §9).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::alerts::Alert;
use crate::ids::{
    CharacterID, ContinentID, FacilityID, FactionID, MetagameEventID, RegionID, WorldID,
    ZoneInstanceID,
};
use crate::players::Loadout;

/// One record from the push event source (spec.md §6). Every variant
/// carries its own `ts`/`world`/`zone` rather than hoisting them to a
/// shared envelope, matching how the upstream callback-per-variant
/// registration actually delivers them (spec.md §9).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CensusEvent {
    PlayerLogin {
        character_id: CharacterID,
        world_id: WorldID,
        ts: DateTime<Utc>,
    },
    PlayerLogout {
        character_id: CharacterID,
        world_id: WorldID,
        ts: DateTime<Utc>,
    },
    GainExperience {
        character_id: CharacterID,
        world_id: WorldID,
        zone_id: ZoneInstanceID,
        team: FactionID,
        loadout: Option<Loadout>,
        ts: DateTime<Utc>,
    },
    VehicleDestroy {
        attacker_character_id: CharacterID,
        character_id: CharacterID,
        world_id: WorldID,
        zone_id: ZoneInstanceID,
        ts: DateTime<Utc>,
    },
    Death {
        attacker_character_id: CharacterID,
        character_id: CharacterID,
        world_id: WorldID,
        zone_id: ZoneInstanceID,
        attacker_loadout: Option<Loadout>,
        character_loadout: Option<Loadout>,
        ts: DateTime<Utc>,
    },
    MetagameEvent {
        world_id: WorldID,
        zone_id: ZoneInstanceID,
        instance_id: crate::ids::InstanceID,
        metagame_event_id: MetagameEventID,
        state: MetagameEventState,
        faction_scores: [f64; 3],
        ts: DateTime<Utc>,
    },
    ContinentLock {
        world_id: WorldID,
        zone_id: ZoneInstanceID,
        triggering_faction: FactionID,
        ts: DateTime<Utc>,
    },
    FacilityControl {
        world_id: WorldID,
        zone_id: ZoneInstanceID,
        facility_id: FacilityID,
        old_faction: FactionID,
        new_faction: FactionID,
        ts: DateTime<Utc>,
    },
    PlayerFacilityCapture {
        character_id: CharacterID,
        world_id: WorldID,
        zone_id: ZoneInstanceID,
        facility_id: FacilityID,
        ts: DateTime<Utc>,
    },
    PlayerFacilityDefend {
        character_id: CharacterID,
        world_id: WorldID,
        zone_id: ZoneInstanceID,
        facility_id: FacilityID,
        ts: DateTime<Utc>,
    },
    AchievementEarned {
        character_id: CharacterID,
        world_id: WorldID,
        achievement_id: u32,
        ts: DateTime<Utc>,
    },
    BattleRankUp {
        character_id: CharacterID,
        world_id: WorldID,
        battle_rank: u32,
        ts: DateTime<Utc>,
    },
    ItemAdded {
        character_id: CharacterID,
        world_id: WorldID,
        item_id: u32,
        ts: DateTime<Utc>,
    },
    SkillAdded {
        character_id: CharacterID,
        world_id: WorldID,
        skill_id: u32,
        ts: DateTime<Utc>,
    },
}

impl CensusEvent {
    pub fn world_id(&self) -> WorldID {
        match self {
            Self::PlayerLogin { world_id, .. }
            | Self::PlayerLogout { world_id, .. }
            | Self::GainExperience { world_id, .. }
            | Self::VehicleDestroy { world_id, .. }
            | Self::Death { world_id, .. }
            | Self::MetagameEvent { world_id, .. }
            | Self::ContinentLock { world_id, .. }
            | Self::FacilityControl { world_id, .. }
            | Self::PlayerFacilityCapture { world_id, .. }
            | Self::PlayerFacilityDefend { world_id, .. }
            | Self::AchievementEarned { world_id, .. }
            | Self::BattleRankUp { world_id, .. }
            | Self::ItemAdded { world_id, .. }
            | Self::SkillAdded { world_id, .. } => *world_id,
        }
    }

    /// A dedup key covering the events spec.md §8 scenario 4 cares about
    /// (double-delivered kills); events without a natural identity return
    /// `None` and are never deduplicated.
    pub fn dedup_key(&self) -> Option<String> {
        match self {
            Self::Death {
                attacker_character_id,
                character_id,
                ts,
                ..
            } => Some(format!("death:{attacker_character_id}:{character_id}:{}", ts.timestamp_millis())),
            Self::VehicleDestroy {
                attacker_character_id,
                character_id,
                ts,
                ..
            } => Some(format!(
                "vehicle:{attacker_character_id}:{character_id}:{}",
                ts.timestamp_millis()
            )),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetagameEventState {
    Started,
    Restarted,
    Cancelled,
    Ended,
}

/// Notification topics published to subscribers (spec.md §6, §4.7).

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldPopulationTotal {
    pub world_id: WorldID,
    /// Indexed by `FactionID::as_u8`: None/VS/NC/TR/NSO.
    pub world: [u32; 5],
    pub zones: std::collections::HashMap<ZoneInstanceID, [u32; 3]>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationTotal {
    pub worlds: std::collections::HashMap<WorldID, WorldPopulationTotal>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerritoryChange {
    pub world_id: WorldID,
    pub zone_id: ZoneInstanceID,
    pub regions: std::collections::HashMap<RegionID, FactionID>,
    pub cutoff: std::collections::HashSet<RegionID>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneStatusChange {
    pub world_id: WorldID,
    pub zone_id: ZoneInstanceID,
    pub status: crate::map::ZoneStatus,
}

/// A notification carrying a deep-cloned snapshot of an alert (spec.md §6,
/// "EventState (deep-cloned Alert)").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventStateUpdate {
    pub world_id: WorldID,
    pub zone_id: ZoneInstanceID,
    pub alert: Alert,
}

/// Metadata the data-store supplies when hydrating a new `Alert` from a
/// `MetagameEvent::Started` (spec.md §4.4, §6 `GetEvent`).
#[derive(Debug, Clone, PartialEq)]
pub struct MetagameEventMeta {
    pub name: String,
    pub description: String,
    pub duration: std::time::Duration,
    pub is_continent_lock: bool,
    pub is_territory: bool,
    pub starting_faction: FactionID,
    pub url: String,
}

/// Result of an async `GetEvent` lookup, delivered back to the Manager loop
/// so it can hydrate the `Alert` it already created with placeholder fields
/// (spec.md §4.4, "Create new Alert with metadata from the data-store
/// lookup"). The lookup itself cannot run inline in the handler — it's an
/// async trait method — so it is dispatched the same way a home-faction
/// lookup is (spec.md §5, "any such work is spawned as a detached child
/// task that sends its result back via a channel").
#[derive(Debug, Clone, PartialEq)]
pub struct EventMetaResult {
    pub alert_id: crate::ids::MetagameEventInstanceID,
    pub metagame_event_id: MetagameEventID,
    pub meta: Option<MetagameEventMeta>,
}

/// What arrives on the `mapUpdates` channel: one zone's ownership snapshot
/// (spec.md §6, `GetMap`).
#[derive(Debug, Clone, PartialEq)]
pub struct MapUpdate {
    pub world_id: WorldID,
    pub zone_id: ZoneInstanceID,
    pub continent_id: ContinentID,
    pub regions: std::collections::HashMap<RegionID, FactionID>,
    pub timestamp: DateTime<Utc>,
}

/// What arrives on the `alertUpdates` channel: a third-party alert record
/// (spec.md §6, `GetInstance`/`GetActive`).
#[derive(Debug, Clone, PartialEq)]
pub struct ThirdPartyAlertRecord {
    pub id: crate::ids::MetagameEventInstanceID,
    pub world_id: WorldID,
    pub zone_id: ZoneInstanceID,
    pub score: [f64; 3],
    pub victor: Option<FactionID>,
    pub ended: Option<DateTime<Utc>>,
    pub meta: Option<MetagameEventMeta>,
}

/// What arrives on the `characterFactionResults` channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharacterFactionResult {
    pub character_id: CharacterID,
    pub faction: FactionID,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn death_events_with_same_identity_and_timestamp_dedup_to_equal_keys() {
        let ts = DateTime::<Utc>::from_timestamp(100, 0).unwrap();
        let a = CensusEvent::Death {
            attacker_character_id: CharacterID(1),
            character_id: CharacterID(2),
            world_id: WorldID(1),
            zone_id: ZoneInstanceID::new(2, 0),
            attacker_loadout: None,
            character_loadout: None,
            ts,
        };
        let b = a.clone();
        assert_eq!(a.dedup_key(), b.dedup_key());
        assert!(a.dedup_key().is_some());
    }

    #[test]
    fn events_without_identity_are_never_deduplicated() {
        let event = CensusEvent::PlayerLogin {
            character_id: CharacterID(1),
            world_id: WorldID(1),
            ts: DateTime::<Utc>::from_timestamp(0, 0).unwrap(),
        };
        assert_eq!(event.dedup_key(), None);
    }
}
