//! Per-event-type handlers (spec.md §4.4, §4.6). All invoked from
//! [`super::Manager::run`]'s loop, never concurrently with each other.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;

use crate::alerts::Alert;
use crate::events::{
    CensusEvent, CharacterFactionResult, EventMetaResult, EventStateUpdate, MapUpdate,
    MetagameEventState, TerritoryChange, ThirdPartyAlertRecord, ZoneStatusChange,
};
use crate::ids::{FactionID, MapID, MetagameEventInstanceID, RegionID, WorldID, ZoneInstanceID};
use crate::map::{summarize, ZoneStatus};
use crate::players::Loadout;

use super::Manager;

impl Manager {
    pub(super) fn handle_census_event(&mut self, event: CensusEvent) {
        if let Some(key) = event.dedup_key() {
            if !self.dedup.insert_fresh(key) {
                return;
            }
        }

        match event {
            CensusEvent::PlayerLogin {
                character_id,
                world_id,
                ts,
            } => self.track_player(character_id, world_id, None, FactionID::None, None, ts),
            CensusEvent::PlayerLogout { character_id, .. } => {
                self.players.remove(character_id);
            }
            CensusEvent::GainExperience {
                character_id,
                world_id,
                zone_id,
                team,
                loadout,
                ts,
            } => self.track_player(character_id, world_id, Some(zone_id), team, loadout, ts),
            CensusEvent::VehicleDestroy {
                attacker_character_id,
                character_id,
                world_id,
                zone_id,
                ts,
            } => {
                self.track_player(attacker_character_id, world_id, Some(zone_id), FactionID::None, None, ts);
                self.track_player(character_id, world_id, Some(zone_id), FactionID::None, None, ts);
            }
            CensusEvent::Death {
                attacker_character_id,
                character_id,
                world_id,
                zone_id,
                attacker_loadout,
                character_loadout,
                ts,
            } => {
                let attacker_team = attacker_loadout.and_then(Loadout::faction).unwrap_or(FactionID::None);
                let victim_team = character_loadout.and_then(Loadout::faction).unwrap_or(FactionID::None);
                self.track_player(attacker_character_id, world_id, Some(zone_id), attacker_team, attacker_loadout, ts);
                self.track_player(character_id, world_id, Some(zone_id), victim_team, character_loadout, ts);
            }
            CensusEvent::MetagameEvent {
                world_id,
                zone_id,
                instance_id,
                metagame_event_id,
                state,
                faction_scores,
                ts,
            } => self.handle_metagame_event(
                world_id,
                zone_id,
                instance_id,
                metagame_event_id,
                state,
                faction_scores,
                ts,
            ),
            CensusEvent::ContinentLock {
                world_id,
                zone_id,
                triggering_faction,
                ts,
            } => self.handle_continent_lock(world_id, zone_id, triggering_faction, ts),
            CensusEvent::FacilityControl {
                world_id,
                zone_id,
                facility_id,
                old_faction,
                new_faction,
                ts,
            } => self.handle_facility_control(world_id, zone_id, facility_id, old_faction, new_faction, ts),
            CensusEvent::PlayerFacilityCapture { character_id, world_id, zone_id, ts, .. }
            | CensusEvent::PlayerFacilityDefend { character_id, world_id, zone_id, ts, .. } => {
                self.track_player(character_id, world_id, Some(zone_id), FactionID::None, None, ts);
            }
            CensusEvent::AchievementEarned { character_id, world_id, ts, .. }
            | CensusEvent::BattleRankUp { character_id, world_id, ts, .. }
            | CensusEvent::ItemAdded { character_id, world_id, ts, .. }
            | CensusEvent::SkillAdded { character_id, world_id, ts, .. } => {
                self.track_player(character_id, world_id, None, FactionID::None, None, ts);
            }
        }
    }

    fn track_player(
        &mut self,
        character_id: crate::ids::CharacterID,
        world_id: WorldID,
        zone_id: Option<ZoneInstanceID>,
        team: FactionID,
        loadout: Option<Loadout>,
        ts: chrono::DateTime<Utc>,
    ) {
        let outcome = self
            .players
            .received_event(character_id, world_id, zone_id, team, loadout, ts);
        if outcome.spawn_faction_lookup {
            self.spawn_faction_lookup(character_id);
        }
        if let Some(faction) = outcome.save_faction {
            self.spawn_save_faction(character_id, faction);
        }
    }

    pub(super) fn handle_faction_result(&mut self, result: CharacterFactionResult) {
        if let Some(faction) = self.players.faction_update(result.character_id, result.faction) {
            self.spawn_save_faction(result.character_id, faction);
        }
    }

    /// Hydrates a just-started `Alert` once its `GetEvent` lookup resolves
    /// (spec.md §4.4). A no-op if the alert already ended or was replaced
    /// by a sudden-death restart before the lookup returned.
    pub(super) fn handle_event_meta_result(&mut self, result: EventMetaResult) {
        let Some(meta) = result.meta else {
            return;
        };
        self.cache_event_meta(result.metagame_event_id, meta.clone());

        let Some(&(world_id, zone_id)) = self.alert_zone_index.get(&result.alert_id) else {
            return;
        };
        let Some(alert) = self.alerts.get_mut(result.alert_id) else {
            return;
        };
        alert.name = meta.name;
        alert.description = meta.description;
        alert.duration = meta.duration;
        alert.is_continent_lock = meta.is_continent_lock;
        alert.is_territory = meta.is_territory;
        alert.starting_faction = meta.starting_faction;
        alert.url = meta.url;
        let updated = alert.clone();

        self.global.set_event(world_id, zone_id, Some(updated.clone()));
        self.notify_event_update(EventStateUpdate {
            world_id,
            zone_id,
            alert: updated,
        });
    }

    /// §4.4 state machine, dispatched from `MetagameEvent`.
    #[allow(clippy::too_many_arguments)]
    fn handle_metagame_event(
        &mut self,
        world_id: WorldID,
        zone_id: ZoneInstanceID,
        instance_id: crate::ids::InstanceID,
        metagame_event_id: crate::ids::MetagameEventID,
        state: MetagameEventState,
        faction_scores: [f64; 3],
        ts: chrono::DateTime<Utc>,
    ) {
        // checkZone first, so the zone exists before any mutation (spec.md §4.6).
        self.ensure_zone_tracked(world_id, zone_id);
        let alert_id = MetagameEventInstanceID::new(world_id, instance_id);

        match state {
            MetagameEventState::Started => {
                if let Some(zone) = self.global.world_mut(world_id).and_then(|w| w.zone_mut(zone_id)) {
                    if let Some(prev) = zone.event.take() {
                        self.alerts.remove(prev.id);
                        self.alert_zone_index.remove(&prev.id);
                    }
                }

                // Metadata comes from the data-store's `GetEvent` lookup
                // (spec.md §4.4). If a prior alert of the same definition
                // already resolved it, reuse that; otherwise build with
                // placeholders and kick off the async lookup — the result
                // arrives over `event_meta_rx` and hydrates the alert in
                // place (spec.md §5: handlers can't block on async I/O).
                let cached_meta = self.cached_event_meta(metagame_event_id);
                let alert = Alert {
                    id: alert_id,
                    map_id: MapID(0),
                    metagame_event_id,
                    name: cached_meta.as_ref().map(|m| m.name.clone()).unwrap_or_default(),
                    description: cached_meta
                        .as_ref()
                        .map(|m| m.description.clone())
                        .unwrap_or_default(),
                    duration: cached_meta
                        .as_ref()
                        .map(|m| m.duration)
                        .unwrap_or(Duration::from_secs(90 * 60)),
                    is_continent_lock: cached_meta.as_ref().map(|m| m.is_continent_lock).unwrap_or(false),
                    is_territory: cached_meta.as_ref().map(|m| m.is_territory).unwrap_or(true),
                    starting_faction: cached_meta
                        .as_ref()
                        .map(|m| m.starting_faction)
                        .unwrap_or(FactionID::None),
                    score: faction_scores,
                    url: cached_meta.as_ref().map(|m| m.url.clone()).unwrap_or_default(),
                    victor: None,
                    started: ts,
                    ended: None,
                    timestamp: ts,
                };
                self.alerts.insert(alert.clone());
                self.alert_zone_index.insert(alert_id, (world_id, zone_id));
                self.global.set_event(world_id, zone_id, Some(alert.clone()));
                self.notify_event_update(EventStateUpdate {
                    world_id,
                    zone_id,
                    alert: alert.clone(),
                });
                if cached_meta.is_none() {
                    self.spawn_event_meta_lookup(alert_id, metagame_event_id);
                }
                if alert.is_territory {
                    self.spawn_third_party_alert_fetch(alert_id, world_id, zone_id);
                }
            }
            MetagameEventState::Restarted => {
                tracing::debug!(%alert_id, "metagame event restarted: no-op");
            }
            MetagameEventState::Cancelled | MetagameEventState::Ended => {
                if let Some(alert) = self.alerts.get_mut(alert_id) {
                    alert.score = faction_scores;
                    alert.ended = Some(ts);
                    alert.victor = alert.compute_victor();
                    let updated = alert.clone();
                    self.global.set_event(world_id, zone_id, Some(updated.clone()));
                    self.notify_event_update(EventStateUpdate {
                        world_id,
                        zone_id,
                        alert: updated,
                    });
                }
            }
        }
    }

    fn handle_continent_lock(
        &mut self,
        world_id: WorldID,
        zone_id: ZoneInstanceID,
        triggering_faction: FactionID,
        ts: chrono::DateTime<Utc>,
    ) {
        let Some(zone) = self.global.world_mut(world_id).and_then(|w| w.zone_mut(zone_id)) else {
            return;
        };
        zone.status = ZoneStatus::Locked;
        zone.owning_faction = triggering_faction;
        zone.last_lock = Some(ts);
        if let Some(alert) = zone.event.as_mut() {
            alert.victor = Some(triggering_faction);
        }
        let updated_alert = zone.event.clone();

        if let Some(alert) = &updated_alert {
            if let Some(registered) = self.alerts.get_mut(alert.id) {
                registered.victor = Some(triggering_faction);
            }
        }

        self.notify_zone_status_change(ZoneStatusChange {
            world_id,
            zone_id,
            status: ZoneStatus::Locked,
        });
        if let Some(alert) = updated_alert {
            self.notify_event_update(EventStateUpdate {
                world_id,
                zone_id,
                alert,
            });
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn handle_facility_control(
        &mut self,
        world_id: WorldID,
        zone_id: ZoneInstanceID,
        facility_id: crate::ids::FacilityID,
        old_faction: FactionID,
        new_faction: FactionID,
        _ts: chrono::DateTime<Utc>,
    ) {
        if old_faction == new_faction {
            return; // same-faction "defend": not a flip.
        }
        if !self.global.is_zone_tracked(world_id, zone_id) {
            return;
        }

        let Some(zone) = self.global.world_mut(world_id).and_then(|w| w.zone_mut(zone_id)) else {
            return;
        };
        let Some(map) = zone.map.clone() else {
            return; // no cached lattice yet; wait for the next map poll.
        };
        let Some(region) = map
            .regions
            .iter()
            .find(|r| r.facility == Some(facility_id))
            .map(|r| r.id)
        else {
            return; // unknown facility: skip silently (spec.md §7).
        };

        let prior_status = zone.status;
        let prior_owner = zone.owning_faction;
        let prior_owner_regions: Vec<RegionID> = if prior_status == ZoneStatus::Locked {
            zone.regions
                .iter()
                .filter(|(_, f)| **f == prior_owner)
                .map(|(r, _)| *r)
                .collect()
        } else {
            Vec::new()
        };

        zone.regions.insert(region, new_faction);
        let summary = match summarize(&map, &zone.regions, self.config.unstable_cutoff_threshold) {
            Ok(summary) => summary,
            Err(err) => {
                tracing::warn!(%err, %zone_id, "map summarize failed, skipping facility update");
                return;
            }
        };

        zone.cutoff = summary.cutoff.clone();
        zone.status = summary.status;
        if summary.status == ZoneStatus::Locked {
            if let Some((&owner, _)) = summary.territory.iter().next() {
                zone.owning_faction = owner;
            }
        }
        let status_changed = summary.status != prior_status;

        let mut flipped = HashMap::new();
        flipped.insert(region, new_faction);
        self.notify_territory_change(TerritoryChange {
            world_id,
            zone_id,
            regions: flipped,
            cutoff: summary.cutoff.clone(),
        });

        if status_changed {
            self.notify_zone_status_change(ZoneStatusChange {
                world_id,
                zone_id,
                status: summary.status,
            });
        }

        if prior_status == ZoneStatus::Locked && !prior_owner_regions.is_empty() {
            let zone = self
                .global
                .world(world_id)
                .and_then(|w| w.zone(zone_id))
                .expect("zone tracked above");
            let unlock_regions: HashMap<RegionID, FactionID> = prior_owner_regions
                .iter()
                .map(|r| (*r, zone.regions.get(r).copied().unwrap_or(FactionID::None)))
                .collect();
            self.notify_territory_change(TerritoryChange {
                world_id,
                zone_id,
                regions: unlock_regions,
                cutoff: summary.cutoff.clone(),
            });
        }

        let zone = self
            .global
            .world_mut(world_id)
            .and_then(|w| w.zone_mut(zone_id))
            .expect("zone tracked above");
        if let Some(alert) = zone.event.as_mut() {
            if alert.is_territory && alert.ended.is_none() {
                for faction in FactionID::WARRING {
                    if let Some(idx) = Alert::score_index(faction) {
                        alert.score[idx] = *summary.territory.get(&faction).unwrap_or(&0.0);
                    }
                }
                let updated = alert.clone();
                if let Some(registered) = self.alerts.get_mut(updated.id) {
                    registered.score = updated.score;
                }
                self.notify_event_update(EventStateUpdate {
                    world_id,
                    zone_id,
                    alert: updated,
                });
            }
        }
    }

    pub(super) fn handle_map_update(&mut self, update: MapUpdate) {
        let zone = self
            .global
            .track_zone(update.world_id, update.zone_id, update.continent_id, String::new());
        let prior_status = zone.status;
        zone.regions = update.regions;
        zone.map_timestamp = Some(update.timestamp);

        let Some(map) = self.continent_maps.get(&update.continent_id).cloned() else {
            tracing::warn!(continent_id = ?update.continent_id, "no cached lattice for continent");
            return;
        };
        let zone = self
            .global
            .world_mut(update.world_id)
            .and_then(|w| w.zone_mut(update.zone_id))
            .expect("zone tracked above");
        zone.map = Some(map.clone());

        let summary = match summarize(&map, &zone.regions, self.config.unstable_cutoff_threshold) {
            Ok(summary) => summary,
            Err(err) => {
                tracing::warn!(%err, "map summarize failed on map update, skipping");
                return;
            }
        };
        zone.cutoff = summary.cutoff.clone();
        zone.status = summary.status;
        if summary.status == ZoneStatus::Locked {
            if let Some((&owner, _)) = summary.territory.iter().next() {
                zone.owning_faction = owner;
            }
        }
        let regions_snapshot = zone.regions.clone();
        let status_changed = summary.status != prior_status;

        self.notify_territory_change(TerritoryChange {
            world_id: update.world_id,
            zone_id: update.zone_id,
            regions: regions_snapshot,
            cutoff: summary.cutoff.clone(),
        });
        if status_changed {
            self.notify_zone_status_change(ZoneStatusChange {
                world_id: update.world_id,
                zone_id: update.zone_id,
                status: summary.status,
            });
        }
    }

    pub(super) fn handle_third_party_alert(&mut self, record: ThirdPartyAlertRecord) {
        let id = record.id;
        let world_id = record.world_id;
        let zone_id = record.zone_id;
        let score = record.score;
        let victor = record.victor;
        let ended = record.ended;
        let meta = record.meta;

        self.alerts.merge_third_party(id, score, victor, ended, Utc::now(), move || Alert {
            id,
            map_id: MapID(0),
            metagame_event_id: crate::ids::MetagameEventID(0),
            name: meta.as_ref().map(|m| m.name.clone()).unwrap_or_default(),
            description: meta.as_ref().map(|m| m.description.clone()).unwrap_or_default(),
            duration: meta.as_ref().map(|m| m.duration).unwrap_or(Duration::from_secs(90 * 60)),
            is_continent_lock: meta.as_ref().map(|m| m.is_continent_lock).unwrap_or(false),
            is_territory: meta.as_ref().map(|m| m.is_territory).unwrap_or(true),
            starting_faction: FactionID::None,
            score,
            url: meta.map(|m| m.url).unwrap_or_default(),
            victor,
            started: Utc::now(),
            ended,
            timestamp: Utc::now(),
        });

        self.alert_zone_index.entry(id).or_insert((world_id, zone_id));
        if let Some(alert) = self.alerts.get(id).cloned() {
            self.global.set_event(world_id, zone_id, Some(alert.clone()));
            self.notify_event_update(EventStateUpdate {
                world_id,
                zone_id,
                alert,
            });
        }
    }
}
