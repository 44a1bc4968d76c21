//! Global State & Zone Tracking (C5, spec.md §3, §4.5).
//!
//! A plain owned tree: `GlobalState` holds `WorldState`s holds `ZoneState`s.
//! Only the Manager (C6) ever takes `&mut` on this tree; reads handed to
//! outside callers go through [`GlobalState::clone`], which deep-clones
//! every field including the alert pointer (spec.md §3, "snapshots exposed
//! to outside callers must be deep-cloned").

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::alerts::Alert;
use crate::ids::{ContinentID, FactionID, RegionID, WorldID, ZoneInstanceID};
use crate::map::{MapData, MapState, ZoneStatus};

/// Per-zone mutable state (spec.md §3, `ZoneState`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneState {
    pub continent_id: ContinentID,
    pub zone_id: ZoneInstanceID,
    pub name: String,
    pub owning_faction: FactionID,
    pub status: ZoneStatus,
    /// Indexed `[0]=VS, [1]=NC, [2]=TR`.
    pub population: [u32; 3],
    pub last_lock: Option<DateTime<Utc>>,
    pub last_unlock: Option<DateTime<Utc>>,
    pub regions: MapState,
    pub cutoff: std::collections::HashSet<RegionID>,
    pub map_timestamp: Option<DateTime<Utc>>,
    pub map: Option<MapData>,
    /// Current alert, if one is live for this zone (spec.md §9: "zone ↔
    /// alert pointer... Option<strong reference> from zone to alert").
    pub event: Option<Alert>,
}

impl ZoneState {
    fn new(continent_id: ContinentID, zone_id: ZoneInstanceID, name: String) -> Self {
        Self {
            continent_id,
            zone_id,
            name,
            owning_faction: FactionID::None,
            status: ZoneStatus::Unlocked,
            population: [0; 3],
            last_lock: None,
            last_unlock: None,
            regions: HashMap::new(),
            cutoff: std::collections::HashSet::new(),
            map_timestamp: None,
            map: None,
            event: None,
        }
    }
}

/// Per-world state: an ordered list of zones (spec.md §3, `WorldState`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldState {
    pub world_id: WorldID,
    pub name: String,
    /// Indexed by `FactionID::as_u8`: None/VS/NC/TR/NSO.
    pub population: [u32; 5],
    zones: Vec<ZoneState>,
}

impl WorldState {
    fn new(world_id: WorldID, name: String) -> Self {
        Self {
            world_id,
            name,
            population: [0; 5],
            zones: Vec::new(),
        }
    }

    pub fn zones(&self) -> &[ZoneState] {
        &self.zones
    }

    pub fn zone(&self, zone_id: ZoneInstanceID) -> Option<&ZoneState> {
        self.zones.iter().find(|z| z.zone_id == zone_id)
    }

    pub fn zone_mut(&mut self, zone_id: ZoneInstanceID) -> Option<&mut ZoneState> {
        self.zones.iter_mut().find(|z| z.zone_id == zone_id)
    }
}

/// The whole tracked universe: an ordered list of worlds (spec.md §3,
/// `GlobalState`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalState {
    worlds: Vec<WorldState>,
}

impl GlobalState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn worlds(&self) -> &[WorldState] {
        &self.worlds
    }

    pub fn world(&self, world_id: WorldID) -> Option<&WorldState> {
        self.worlds.iter().find(|w| w.world_id == world_id)
    }

    pub fn world_mut(&mut self, world_id: WorldID) -> Option<&mut WorldState> {
        self.worlds.iter_mut().find(|w| w.world_id == world_id)
    }

    /// Idempotent: registers a world if absent (spec.md §3, "Manager
    /// pre-populates GlobalState with every known world").
    pub fn track_world(&mut self, world_id: WorldID, name: String) -> &mut WorldState {
        if !self.worlds.iter().any(|w| w.world_id == world_id) {
            self.worlds.push(WorldState::new(world_id, name));
        }
        self.worlds.iter_mut().find(|w| w.world_id == world_id).unwrap()
    }

    /// Idempotent: registers a zone on a world if absent. Zones are never
    /// removed once tracked (spec.md §3, "Zones are never removed").
    pub fn track_zone(
        &mut self,
        world_id: WorldID,
        zone_id: ZoneInstanceID,
        continent_id: ContinentID,
        name: String,
    ) -> &mut ZoneState {
        let world = self.track_world(world_id, String::new());
        if !world.zones.iter().any(|z| z.zone_id == zone_id) {
            world.zones.push(ZoneState::new(continent_id, zone_id, name));
        }
        world.zones.iter_mut().find(|z| z.zone_id == zone_id).unwrap()
    }

    pub fn is_zone_tracked(&self, world_id: WorldID, zone_id: ZoneInstanceID) -> bool {
        self.world(world_id)
            .map(|w| w.zone(zone_id).is_some())
            .unwrap_or(false)
    }

    /// `(world, zone)` pairs for every tracked zone, world order preserved
    /// (spec.md §4.5, `listZones`).
    pub fn list_zones(&self) -> Vec<(WorldID, ZoneInstanceID)> {
        self.worlds
            .iter()
            .flat_map(|w| w.zones.iter().map(move |z| (w.world_id, z.zone_id)))
            .collect()
    }

    pub fn set_event(&mut self, world_id: WorldID, zone_id: ZoneInstanceID, alert: Option<Alert>) {
        if let Some(zone) = self
            .world_mut(world_id)
            .and_then(|w| w.zone_mut(zone_id))
        {
            zone.event = alert;
        }
    }

    pub fn set_world_pop(&mut self, world_id: WorldID, pop: [u32; 5]) {
        if let Some(world) = self.world_mut(world_id) {
            world.population = pop;
        }
    }

    pub fn set_zone_pop(&mut self, world_id: WorldID, zone_id: ZoneInstanceID, pop: [u32; 3]) {
        if let Some(zone) = self
            .world_mut(world_id)
            .and_then(|w| w.zone_mut(zone_id))
        {
            zone.population = pop;
        }
    }
}

/// Cache entry for [`ZoneAdmission`]'s rate-limited discovery of dynamic
/// zones (spec.md §4.5, `checkZone`: "cache every lookup for 1h").
#[derive(Debug, Clone, Copy)]
struct AdmissionCacheEntry {
    checked_at: DateTime<Utc>,
}

/// Admission policy for discovering dynamic zones, kept separate from
/// `GlobalState` because it is a rate-limiting cache over *lookups*, not
/// tracked data (spec.md §4.5).
#[derive(Debug, Default)]
pub struct ZoneAdmission {
    cache: HashMap<(WorldID, ZoneInstanceID), AdmissionCacheEntry>,
}

impl ZoneAdmission {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if a fetch should be launched for this zone: it is
    /// not already tracked, and no cached decision exists within `ttl`.
    pub fn should_check(
        &mut self,
        world_id: WorldID,
        zone_id: ZoneInstanceID,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> bool {
        let key = (world_id, zone_id);
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::zero());
        if let Some(entry) = self.cache.get(&key) {
            if now.signed_duration_since(entry.checked_at) < ttl {
                return false;
            }
        }
        self.cache.insert(key, AdmissionCacheEntry { checked_at: now });
        true
    }
}
