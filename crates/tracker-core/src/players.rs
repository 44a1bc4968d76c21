//! Online Player Store (C3, spec.md §4.3).
//!
//! Tracks last-known world/zone/team/home-faction/last-seen per active
//! character and decides when the Manager should kick off an async
//! home-faction lookup or a one-time `SavePlayerFaction` write-back. The
//! store itself performs no I/O — it only reports what the Manager should
//! do, since all blocking work must happen in a spawned task
//! (spec.md §5, "handlers must not perform blocking I/O").

use std::collections::HashMap;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};

use crate::ids::{CharacterID, FactionID, WorldID, ZoneInstanceID};

/// A class loadout, as carried on loadout-bearing events (kills, experience
/// gains). Every non-NSO class implies a fixed faction; NSO classes carry
/// no faction (mercenaries fight for whichever side recruited them).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Loadout {
    VsInfiltrator,
    VsLightAssault,
    VsCombatMedic,
    VsEngineer,
    VsHeavyAssault,
    VsMax,
    NcInfiltrator,
    NcLightAssault,
    NcCombatMedic,
    NcEngineer,
    NcHeavyAssault,
    NcMax,
    TrInfiltrator,
    TrLightAssault,
    TrCombatMedic,
    TrEngineer,
    TrHeavyAssault,
    TrMax,
    NsoInfiltrator,
    NsoLightAssault,
    NsoCombatMedic,
    NsoEngineer,
    NsoHeavyAssault,
    NsoMax,
}

impl Loadout {
    /// The faction this loadout implies, or `None` for NSO loadouts.
    pub fn faction(self) -> Option<FactionID> {
        use Loadout::*;
        match self {
            VsInfiltrator | VsLightAssault | VsCombatMedic | VsEngineer | VsHeavyAssault
            | VsMax => Some(FactionID::VS),
            NcInfiltrator | NcLightAssault | NcCombatMedic | NcEngineer | NcHeavyAssault
            | NcMax => Some(FactionID::NC),
            TrInfiltrator | TrLightAssault | TrCombatMedic | TrEngineer | TrHeavyAssault
            | TrMax => Some(FactionID::TR),
            NsoInfiltrator | NsoLightAssault | NsoCombatMedic | NsoEngineer | NsoHeavyAssault
            | NsoMax => None,
        }
    }
}

/// Last-known state for one active character.
#[derive(Debug, Clone)]
pub struct OnlinePlayer {
    pub home_faction: FactionID,
    pub team: FactionID,
    pub world: WorldID,
    pub zone: Option<ZoneInstanceID>,
    pub last_seen: DateTime<Utc>,
    saved_home_faction: bool,
}

/// What the Manager should do in response to a tracked event, beyond the
/// state mutation the store already applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReceivedEventOutcome {
    /// Spawn an async home-faction lookup for this character.
    pub spawn_faction_lookup: bool,
    /// Call the data-store's `SavePlayerFaction` with this faction, exactly
    /// once per session.
    pub save_faction: Option<FactionID>,
}

/// Per-world population, indexed by `FactionID::as_u8` (home faction).
pub type WorldPopulation = [u32; 5];
/// Per-zone population, indexed by `FactionID::as_u8` restricted to the
/// three warring factions (current team).
pub type ZonePopulation = [u32; 3];

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PopulationCounts {
    pub per_world: HashMap<WorldID, WorldPopulation>,
    pub per_zone: HashMap<(WorldID, ZoneInstanceID), ZonePopulation>,
}

/// Maintains last-known per-character state for every online player.
#[derive(Debug, Default)]
pub struct OnlinePlayerStore {
    players: HashMap<CharacterID, OnlinePlayer>,
}

impl OnlinePlayerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn get(&self, char_id: CharacterID) -> Option<&OnlinePlayer> {
        self.players.get(&char_id)
    }

    /// Apply a character event (login, kill, experience gain, vehicle
    /// destroy, ...). Ignores `char_id == 0`, `world == 0`, and events older
    /// than the player's last-seen timestamp (spec.md §4.3).
    pub fn received_event(
        &mut self,
        char_id: CharacterID,
        world: WorldID,
        zone: Option<ZoneInstanceID>,
        team: FactionID,
        loadout: Option<Loadout>,
        ts: DateTime<Utc>,
    ) -> ReceivedEventOutcome {
        if char_id.0 == 0 || world.0 == 0 {
            return ReceivedEventOutcome::default();
        }

        let is_new = !self.players.contains_key(&char_id);
        let entry = self.players.entry(char_id).or_insert_with(|| OnlinePlayer {
            home_faction: FactionID::None,
            team: FactionID::None,
            world,
            zone: None,
            last_seen: ts,
            saved_home_faction: false,
        });

        if !is_new && ts < entry.last_seen {
            return ReceivedEventOutcome::default();
        }

        entry.last_seen = ts;
        entry.world = world;
        entry.team = team;
        if let Some(z) = zone {
            entry.zone = Some(z);
        }

        if entry.home_faction == FactionID::None {
            if let Some(faction) = loadout.and_then(Loadout::faction) {
                entry.home_faction = faction;
            }
        }

        let mut outcome = ReceivedEventOutcome::default();
        if entry.home_faction == FactionID::None {
            if is_new {
                outcome.spawn_faction_lookup = true;
            }
        } else if !entry.saved_home_faction {
            entry.saved_home_faction = true;
            outcome.save_faction = Some(entry.home_faction);
        }
        outcome
    }

    /// Apply the result of an async home-faction lookup, or a
    /// `FactionChange` push event. Returns `Some(faction)` the first time
    /// this makes the player's home faction known (so the caller can
    /// write it back through `SavePlayerFaction` exactly once).
    pub fn faction_update(&mut self, char_id: CharacterID, faction: FactionID) -> Option<FactionID> {
        if faction == FactionID::None {
            return None;
        }
        let entry = self.players.get_mut(&char_id)?;
        entry.home_faction = faction;
        if entry.saved_home_faction {
            None
        } else {
            entry.saved_home_faction = true;
            Some(faction)
        }
    }

    /// Remove a player on logout.
    pub fn remove(&mut self, char_id: CharacterID) -> Option<OnlinePlayer> {
        self.players.remove(&char_id)
    }

    /// Evict players absent from any event for longer than `max_age`.
    pub fn evict_stale(&mut self, now: DateTime<Utc>, max_age: StdDuration) {
        let max_age = chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::MAX);
        self.players
            .retain(|_, p| now.signed_duration_since(p.last_seen) <= max_age);
    }

    /// Count world (home-faction) and zone (current-team) population.
    /// Evicts stale players first (spec.md §4.3).
    pub fn count_population(&mut self, now: DateTime<Utc>, max_age: StdDuration) -> PopulationCounts {
        self.evict_stale(now, max_age);

        let mut counts = PopulationCounts::default();
        for player in self.players.values() {
            let world_bucket = counts.per_world.entry(player.world).or_insert([0; 5]);
            world_bucket[player.home_faction.as_u8() as usize] += 1;

            if let (Some(zone), Some(idx)) = (player.zone, warring_index(player.team)) {
                let zone_bucket = counts
                    .per_zone
                    .entry((player.world, zone))
                    .or_insert([0; 3]);
                zone_bucket[idx] += 1;
            }
        }
        counts
    }
}

fn warring_index(faction: FactionID) -> Option<usize> {
    match faction {
        FactionID::VS => Some(0),
        FactionID::NC => Some(1),
        FactionID::TR => Some(2),
        _ => None,
    }
}
