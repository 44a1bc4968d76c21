//! Actor-level tests driving the State Manager's `select!` loop end to end
//! against in-memory stub collaborators.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use tracker_core::collaborators::{AlertClient, GameDataStore, MapClient, MapStateSnapshot};
use tracker_core::events::{
    CensusEvent, EventStateUpdate, MapUpdate, MetagameEventState, ZoneStatusChange,
};
use tracker_core::ids::{
    CharacterID, ContinentID, FacilityID, FactionID, InstanceID, MetagameEventID,
    MetagameEventInstanceID, RegionID, WorldID, ZoneInstanceID,
};
use tracker_core::map::{FacilityType, Link, MapData, Region, ZoneStatus};
use tracker_core::players::Loadout;
use tracker_core::{Manager, TrackerConfig as Config};

const WORLD: WorldID = WorldID(17);
const CONTINENT: ContinentID = ContinentID(2);

/// A three-warpgate fixture (one per empire), each with a single attached
/// outpost. Three differently-owned warpgates means no single facility
/// flip can ever lock this zone — the fixture a territory-without-locking
/// scenario needs, and the shape real continents actually have.
fn indar_map() -> MapData {
    fn warpgate(id: u32, facility: u32) -> Region {
        Region {
            id: RegionID(id),
            facility: Some(FacilityID(facility)),
            facility_type: Some(FacilityType::Warpgate),
            hexes: Vec::new(),
            center: None,
        }
    }
    fn outpost(id: u32, facility: u32) -> Region {
        Region {
            id: RegionID(id),
            facility: Some(FacilityID(facility)),
            facility_type: Some(FacilityType::SmallOutpost),
            hexes: Vec::new(),
            center: None,
        }
    }

    MapData {
        regions: vec![
            warpgate(1, 1),
            warpgate(3, 3),
            warpgate(5, 5),
            outpost(2, 2),
            outpost(4, 4),
        ],
        links: vec![
            Link {
                a: FacilityID(5),
                b: FacilityID(2),
            },
            Link {
                a: FacilityID(3),
                b: FacilityID(4),
            },
        ],
    }
}

struct StubStore {
    maps: HashMap<ContinentID, MapData>,
}

impl StubStore {
    fn new() -> Self {
        let mut maps = HashMap::new();
        maps.insert(CONTINENT, indar_map());
        Self { maps }
    }
}

#[async_trait]
impl GameDataStore for StubStore {
    async fn get_world(&self, id: WorldID) -> anyhow::Result<Option<String>> {
        Ok((id == WORLD).then(|| "Emerald".to_string()))
    }
    async fn list_worlds(&self) -> anyhow::Result<Vec<WorldID>> {
        Ok(vec![WORLD])
    }
    async fn get_continent(&self, id: ContinentID) -> anyhow::Result<Option<String>> {
        Ok((id == CONTINENT).then(|| "Indar".to_string()))
    }
    async fn list_continents(&self) -> anyhow::Result<Vec<ContinentID>> {
        Ok(vec![CONTINENT])
    }
    async fn get_event(
        &self,
        _id: MetagameEventID,
    ) -> anyhow::Result<Option<tracker_core::events::MetagameEventMeta>> {
        Ok(None)
    }
    async fn get_facility(&self, _id: FacilityID) -> anyhow::Result<Option<String>> {
        Ok(None)
    }
    async fn get_facility_region(&self, _id: FacilityID) -> anyhow::Result<Option<RegionID>> {
        Ok(None)
    }
    async fn get_map(&self, id: ContinentID) -> anyhow::Result<Option<MapData>> {
        Ok(self.maps.get(&id).cloned())
    }
    async fn get_player_faction(&self, _id: CharacterID) -> anyhow::Result<FactionID> {
        Ok(FactionID::None)
    }
    async fn save_player_faction(&self, _id: CharacterID, _faction: FactionID) -> anyhow::Result<()> {
        Ok(())
    }
}

struct EmptyMapClient;

#[async_trait]
impl MapClient for EmptyMapClient {
    async fn get_map(
        &self,
        _world_id: WorldID,
        _zone_ids: &[ZoneInstanceID],
        _timeout: Duration,
    ) -> anyhow::Result<Vec<MapStateSnapshot>> {
        Ok(Vec::new())
    }
}

struct EmptyAlertClient;

#[async_trait]
impl AlertClient for EmptyAlertClient {
    async fn get_instance(
        &self,
        id: MetagameEventInstanceID,
        _timeout: Duration,
    ) -> anyhow::Result<tracker_core::alerts::Alert> {
        anyhow::bail!("no third-party record for {id}")
    }
    async fn get_active(&self, _timeout: Duration) -> anyhow::Result<Vec<tracker_core::alerts::Alert>> {
        Ok(Vec::new())
    }
}

async fn build_manager(config: Config) -> Manager {
    Manager::new(
        config,
        Arc::new(StubStore::new()),
        Arc::new(EmptyMapClient),
        Arc::new(EmptyAlertClient),
    )
    .await
    .expect("manager builds against stub collaborators")
}

/// spec.md §8 scenario 3: a metagame event started on Indar, then a
/// ContinentLock arrives for the triggering faction — the zone locks and
/// the attached alert's victor is set to that faction.
#[tokio::test]
async fn continent_lock_sets_zone_and_alert_victor() {
    let manager = build_manager(Config::default()).await;
    let handle = manager.handle();
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let join = tokio::spawn(manager.run(shutdown_rx));

    let zone = ZoneInstanceID::new(CONTINENT.0 as u16, 0);
    let started = Utc::now();

    handle
        .submit_event(CensusEvent::MetagameEvent {
            world_id: WORLD,
            zone_id: zone,
            instance_id: InstanceID(55),
            metagame_event_id: MetagameEventID(147),
            state: MetagameEventState::Started,
            faction_scores: [0.0, 0.0, 0.0],
            ts: started,
        })
        .await;

    handle
        .submit_event(CensusEvent::ContinentLock {
            world_id: WORLD,
            zone_id: zone,
            triggering_faction: FactionID::TR,
            ts: started + chrono::Duration::minutes(80),
        })
        .await;

    tokio::time::sleep(Duration::from_millis(30)).await;

    let zone_state = handle
        .zone(WORLD, zone)
        .await
        .unwrap()
        .expect("zone tracked by the Started event's checkZone call");
    assert_eq!(zone_state.status, ZoneStatus::Locked);
    assert_eq!(zone_state.owning_faction, FactionID::TR);
    let alert = zone_state.event.expect("alert still attached");
    assert_eq!(alert.victor, Some(FactionID::TR));

    let _ = shutdown_tx.send(());
    join.await.unwrap();
}

/// spec.md §8 scenario 6: cancelling mid-run makes the loop exit quickly,
/// `unavailable` observably closes, and a subsequent query is refused.
#[tokio::test]
async fn shutdown_closes_unavailable_and_refuses_further_queries() {
    let manager = build_manager(Config::default()).await;
    let handle = manager.handle();
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let join = tokio::spawn(manager.run(shutdown_rx));

    assert!(!handle.is_unavailable());
    let _ = shutdown_tx.send(());
    join.await.unwrap();

    // The loop has dropped query_rx; any get against it now fails the
    // "manager not running" way rather than hanging.
    let result = handle.snapshot().await;
    assert!(result.is_err());
}

/// spec.md §8 scenario 1: a facility flip neighbouring a warpgate raises
/// that faction's territory share without locking the zone, since
/// `indar_map()`'s three warpgates belong to three different empires and a
/// single outpost flip can never bring them under one owner.
#[tokio::test]
async fn facility_flip_raises_territory_without_locking() {
    let mut manager = build_manager(Config::default()).await;
    let changes: Arc<Mutex<Vec<ZoneStatusChange>>> = Arc::new(Mutex::new(Vec::new()));
    let changes_clone = changes.clone();
    manager
        .subscribers_mut()
        .on_zone_status_change(move |change| changes_clone.lock().unwrap().push(change.clone()));

    let events_seen: Arc<Mutex<Vec<EventStateUpdate>>> = Arc::new(Mutex::new(Vec::new()));
    let events_clone = events_seen.clone();
    manager
        .subscribers_mut()
        .on_event_update(move |update| events_clone.lock().unwrap().push(update.clone()));

    let handle = manager.handle();
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let join = tokio::spawn(manager.run(shutdown_rx));

    let zone = ZoneInstanceID::new(CONTINENT.0 as u16, 0);
    let now = Utc::now();

    // Region 2 (outpost, facility 2) hangs off the TR warpgate (facility 5)
    // but starts NC-owned, so it is unreachable from any same-faction
    // warpgate and sits in `cutoff`. Region 4 starts NC next to the NC
    // warpgate (facility 3), so it is already absorbed as NC territory.
    handle
        .submit_map_update(MapUpdate {
            world_id: WORLD,
            zone_id: zone,
            continent_id: CONTINENT,
            regions: [
                (RegionID(1), FactionID::VS),
                (RegionID(3), FactionID::NC),
                (RegionID(5), FactionID::TR),
                (RegionID(2), FactionID::NC),
                (RegionID(4), FactionID::NC),
            ]
            .into_iter()
            .collect(),
            timestamp: now,
        })
        .await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    let before = handle.zone(WORLD, zone).await.unwrap().unwrap();
    assert_eq!(before.status, ZoneStatus::Unlocked);
    assert!(before.cutoff.contains(&RegionID(2)));
    assert_eq!(before.regions[&RegionID(4)], FactionID::NC);

    handle
        .submit_event(CensusEvent::FacilityControl {
            world_id: WORLD,
            zone_id: zone,
            facility_id: FacilityID(2),
            old_faction: FactionID::NC,
            new_faction: FactionID::TR,
            ts: now,
        })
        .await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    let after = handle.zone(WORLD, zone).await.unwrap().unwrap();
    assert_eq!(after.status, ZoneStatus::Unlocked);
    assert_eq!(after.regions[&RegionID(2)], FactionID::TR);
    // Region 2 is now reachable from the TR warpgate through facility 5,
    // so it leaves cutoff and becomes counted TR territory.
    assert!(!after.cutoff.contains(&RegionID(2)));

    assert!(!changes
        .lock()
        .unwrap()
        .iter()
        .any(|c| c.status == ZoneStatus::Locked));
    // No metagame event was started, so there's no alert to update.
    assert!(events_seen.lock().unwrap().is_empty());

    let _ = shutdown_tx.send(());
    join.await.unwrap();
}

/// spec.md §8's scripted `[login, kill, logout]` sequence: the Online
/// Player Store is empty afterwards, so the next housekeeping tick counts
/// zero population for the character's world.
#[tokio::test]
async fn login_kill_logout_sequence_empties_population() {
    let mut config = Config::default();
    config.housekeeping_interval = Duration::from_millis(20);
    let manager = build_manager(config).await;
    let handle = manager.handle();
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let join = tokio::spawn(manager.run(shutdown_rx));

    let zone = ZoneInstanceID::new(CONTINENT.0 as u16, 0);
    let char_id = CharacterID(42);
    let now = Utc::now();

    handle
        .submit_event(CensusEvent::PlayerLogin {
            character_id: char_id,
            world_id: WORLD,
            ts: now,
        })
        .await;
    handle
        .submit_event(CensusEvent::Death {
            attacker_character_id: CharacterID(43),
            character_id: char_id,
            world_id: WORLD,
            zone_id: zone,
            attacker_loadout: Some(Loadout::TrHeavyAssault),
            character_loadout: Some(Loadout::NcEngineer),
            ts: now,
        })
        .await;
    handle
        .submit_event(CensusEvent::PlayerLogout {
            character_id: char_id,
            world_id: WORLD,
            ts: now,
        })
        .await;

    tokio::time::sleep(Duration::from_millis(60)).await;

    let world = handle.world(WORLD).await.unwrap().unwrap();
    assert_eq!(world.population, [0; 5]);

    let _ = shutdown_tx.send(());
    join.await.unwrap();
}
