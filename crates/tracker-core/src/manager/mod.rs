//! State Manager (C6, spec.md §4.6): the single-writer actor owning C3–C5.
//! Everything that mutates player, alert, or zone state happens inside
//! [`Manager::run`]'s `select!` loop; every other path into this module
//! only sends a message and waits for a reply.
//!
//! Split mirrors the teacher's kernel layout: this file owns the loop and
//! the struct, [`handlers`] holds the per-event-type state transitions
//! (spec.md §4.4, §4.6), and [`pollers`] holds the background tasks that
//! only ever push results onto a channel (spec.md §4.7).

mod handlers;
mod pollers;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::info;

use crate::alerts::AlertRegistry;
use crate::collaborators::{AlertClient, GameDataStore, MapClient};
use crate::config::TrackerConfig;
use crate::dedup::Deduplicator;
use crate::error::CoreError;
use crate::events::{
    CensusEvent, CharacterFactionResult, EventMetaResult, EventStateUpdate, MapUpdate,
    MetagameEventMeta, PopulationTotal, TerritoryChange, ThirdPartyAlertRecord,
    WorldPopulationTotal, ZoneStatusChange,
};
use crate::ids::{
    ContinentID, FactionID, MetagameEventID, MetagameEventInstanceID, WorldID, ZoneInstanceID,
};
use crate::map::MapData;
use crate::players::OnlinePlayerStore;
use crate::state::{GlobalState, WorldState, ZoneAdmission, ZoneState};
use crate::subscriber::SubscriberBus;

/// A read-only request answered from inside the loop (spec.md §5, "query
/// uses a buffered (capacity 1) result channel"). `oneshot` is exactly that
/// channel: single value, single reader, never blocks the sender if the
/// receiver has been dropped.
pub enum Query {
    Snapshot {
        reply: oneshot::Sender<GlobalState>,
    },
    World {
        world_id: WorldID,
        reply: oneshot::Sender<Option<WorldState>>,
    },
    Zone {
        world_id: WorldID,
        zone_id: ZoneInstanceID,
        reply: oneshot::Sender<Option<ZoneState>>,
    },
    /// Every tracked `(world, zone, continent)` triple; used by the map
    /// poller to know what to fetch next (spec.md §4.7: pollers "MUST
    /// deliver results via channels rather than call into state").
    ListZones {
        reply: oneshot::Sender<Vec<(WorldID, ZoneInstanceID, ContinentID)>>,
    },
    /// Resolves which zone a live alert is attached to, so the alert poller
    /// can route a `GetActive` record without touching Manager state
    /// directly.
    ZoneForAlert {
        id: MetagameEventInstanceID,
        reply: oneshot::Sender<Option<(WorldID, ZoneInstanceID)>>,
    },
}

/// Thread-safe, cloneable front door to a running [`Manager`]. Every method
/// either sends onto a channel or does both a send and an await-the-reply
/// round trip through [`Query`].
#[derive(Clone)]
pub struct ManagerHandle {
    census_tx: mpsc::Sender<CensusEvent>,
    map_tx: mpsc::Sender<MapUpdate>,
    alert_tx: mpsc::Sender<ThirdPartyAlertRecord>,
    faction_tx: mpsc::Sender<CharacterFactionResult>,
    event_meta_tx: mpsc::Sender<EventMetaResult>,
    query_tx: mpsc::Sender<Query>,
    unavailable: watch::Receiver<bool>,
}

impl ManagerHandle {
    /// Enqueue a push event. Per spec.md §4.6 item 1, callers must also
    /// watch `is_unavailable()` so shutdown cannot deadlock a blocked send;
    /// this method races the send against that signal.
    pub async fn submit_event(&self, event: CensusEvent) {
        let mut unavailable = self.unavailable.clone();
        tokio::select! {
            _ = self.census_tx.send(event) => {}
            _ = unavailable.changed() => {}
        }
    }

    pub async fn submit_map_update(&self, update: MapUpdate) {
        let _ = self.map_tx.send(update).await;
    }

    pub async fn submit_alert_record(&self, record: ThirdPartyAlertRecord) {
        let _ = self.alert_tx.send(record).await;
    }

    pub async fn submit_faction_result(&self, result: CharacterFactionResult) {
        let _ = self.faction_tx.send(result).await;
    }

    pub async fn submit_event_meta_result(&self, result: EventMetaResult) {
        let _ = self.event_meta_tx.send(result).await;
    }

    pub fn is_unavailable(&self) -> bool {
        *self.unavailable.borrow()
    }

    async fn query<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Query,
    ) -> Result<T, CoreError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.query_tx
            .send(build(reply_tx))
            .await
            .map_err(|_| CoreError::ManagerNotRunning)?;
        reply_rx.await.map_err(|_| CoreError::ManagerNotRunning)
    }

    pub async fn snapshot(&self) -> Result<GlobalState, CoreError> {
        self.query(|reply| Query::Snapshot { reply }).await
    }

    pub async fn world(&self, world_id: WorldID) -> Result<Option<WorldState>, CoreError> {
        self.query(|reply| Query::World { world_id, reply }).await
    }

    pub async fn zone(
        &self,
        world_id: WorldID,
        zone_id: ZoneInstanceID,
    ) -> Result<Option<ZoneState>, CoreError> {
        self.query(|reply| Query::Zone {
            world_id,
            zone_id,
            reply,
        })
        .await
    }
}

/// The State Manager actor. Owns C3 (`players`), C4 (`alerts`), and C5
/// (`global`) exclusively; nothing outside [`Manager::run`] ever takes
/// `&mut` on them (spec.md §3, "Ownership").
pub struct Manager {
    config: TrackerConfig,
    global: GlobalState,
    players: OnlinePlayerStore,
    alerts: AlertRegistry,
    dedup: Deduplicator,
    admission: ZoneAdmission,
    subscribers: SubscriberBus,
    /// Reverse index from a live alert to the zone it is attached to
    /// (spec.md §9: "never let the alert reference back to the zone — look
    /// up by id when needed").
    alert_zone_index: HashMap<MetagameEventInstanceID, (WorldID, ZoneInstanceID)>,
    /// Per-continent immutable map lattice, loaded once at startup from the
    /// game-data store (spec.md §6, `GetMap(ContinentID)`).
    continent_maps: HashMap<ContinentID, MapData>,
    /// Resolved `GetEvent` metadata, memoised per `MetagameEventID` so a
    /// recurring alert definition (e.g. "Indar Superiority") is only
    /// resolved through the data-store once (spec.md §4.4).
    event_meta_cache: HashMap<MetagameEventID, MetagameEventMeta>,

    game_data_store: Arc<dyn GameDataStore>,
    map_client: Arc<dyn MapClient>,
    alert_client: Arc<dyn AlertClient>,

    census_tx: mpsc::Sender<CensusEvent>,
    census_rx: mpsc::Receiver<CensusEvent>,
    map_tx: mpsc::Sender<MapUpdate>,
    map_rx: mpsc::Receiver<MapUpdate>,
    alert_tx: mpsc::Sender<ThirdPartyAlertRecord>,
    alert_rx: mpsc::Receiver<ThirdPartyAlertRecord>,
    faction_tx: mpsc::Sender<CharacterFactionResult>,
    faction_rx: mpsc::Receiver<CharacterFactionResult>,
    event_meta_tx: mpsc::Sender<EventMetaResult>,
    event_meta_rx: mpsc::Receiver<EventMetaResult>,
    query_tx: mpsc::Sender<Query>,
    query_rx: mpsc::Receiver<Query>,
    unavailable_tx: watch::Sender<bool>,
    unavailable_rx: watch::Receiver<bool>,
}

impl Manager {
    /// Builds a Manager and pre-populates `GlobalState` with every known
    /// (world × permanent-continent) pair (spec.md §3, "Lifecycle").
    pub async fn new(
        config: TrackerConfig,
        game_data_store: Arc<dyn GameDataStore>,
        map_client: Arc<dyn MapClient>,
        alert_client: Arc<dyn AlertClient>,
    ) -> anyhow::Result<Self> {
        let (census_tx, census_rx) = mpsc::channel(config.event_channel_capacity);
        let (map_tx, map_rx) = mpsc::channel(config.map_update_channel_capacity);
        let (alert_tx, alert_rx) = mpsc::channel(64);
        let (faction_tx, faction_rx) = mpsc::channel(256);
        let (event_meta_tx, event_meta_rx) = mpsc::channel(64);
        let (query_tx, query_rx) = mpsc::channel(32);
        let (unavailable_tx, unavailable_rx) = watch::channel(false);

        let mut global = GlobalState::new();
        let mut continent_maps = HashMap::new();

        for world_id in game_data_store.list_worlds().await.unwrap_or_default() {
            let name = game_data_store
                .get_world(world_id)
                .await
                .ok()
                .flatten()
                .unwrap_or_default();
            global.track_world(world_id, name);
        }
        for continent_id in game_data_store.list_continents().await.unwrap_or_default() {
            if let Ok(Some(map)) = game_data_store.get_map(continent_id).await {
                continent_maps.insert(continent_id, map);
            }
        }

        Ok(Self {
            dedup: Deduplicator::new(config.dedup_capacity),
            config,
            global,
            players: OnlinePlayerStore::new(),
            alerts: AlertRegistry::new(),
            admission: ZoneAdmission::new(),
            subscribers: SubscriberBus::new(),
            alert_zone_index: HashMap::new(),
            continent_maps,
            event_meta_cache: HashMap::new(),
            game_data_store,
            map_client,
            alert_client,
            census_tx,
            census_rx,
            map_tx,
            map_rx,
            alert_tx,
            alert_rx,
            faction_tx,
            faction_rx,
            event_meta_tx,
            event_meta_rx,
            query_tx,
            query_rx,
            unavailable_tx,
            unavailable_rx,
        })
    }

    pub fn handle(&self) -> ManagerHandle {
        ManagerHandle {
            census_tx: self.census_tx.clone(),
            map_tx: self.map_tx.clone(),
            alert_tx: self.alert_tx.clone(),
            faction_tx: self.faction_tx.clone(),
            event_meta_tx: self.event_meta_tx.clone(),
            query_tx: self.query_tx.clone(),
            unavailable: self.unavailable_rx.clone(),
        }
    }

    pub fn subscribers_mut(&mut self) -> &mut SubscriberBus {
        &mut self.subscribers
    }

    /// Runs the `select!` loop until `shutdown` resolves (spec.md §4.6
    /// input 7, `ctx.Done()`). Spawns the background pollers as children of
    /// this task's lifetime.
    pub async fn run(mut self, mut shutdown: oneshot::Receiver<()>) {
        let map_client = self.map_client.clone();
        let alert_client = self.alert_client.clone();
        let handle = self.handle();
        let pollers = pollers::spawn(handle, map_client, alert_client, self.config.clone());

        let mut ticker = tokio::time::interval(self.config.housekeeping_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    info!("state manager shutting down");
                    break;
                }
                Some(event) = self.census_rx.recv() => {
                    self.handle_census_event(event);
                }
                Some(update) = self.map_rx.recv() => {
                    self.handle_map_update(update);
                }
                Some(record) = self.alert_rx.recv() => {
                    self.handle_third_party_alert(record);
                }
                Some(result) = self.faction_rx.recv() => {
                    self.handle_faction_result(result);
                }
                Some(result) = self.event_meta_rx.recv() => {
                    self.handle_event_meta_result(result);
                }
                Some(query) = self.query_rx.recv() => {
                    self.handle_query(query);
                }
                _ = ticker.tick() => {
                    self.housekeeping(Utc::now());
                }
            }
        }

        pollers.abort_all();
        let _ = self.unavailable_tx.send(true);
    }

    fn handle_query(&self, query: Query) {
        match query {
            Query::Snapshot { reply } => {
                let _ = reply.send(self.global.clone());
            }
            Query::World { world_id, reply } => {
                let _ = reply.send(self.global.world(world_id).cloned());
            }
            Query::Zone {
                world_id,
                zone_id,
                reply,
            } => {
                let _ = reply.send(
                    self.global
                        .world(world_id)
                        .and_then(|w| w.zone(zone_id))
                        .cloned(),
                );
            }
            Query::ListZones { reply } => {
                let zones = self
                    .global
                    .worlds()
                    .iter()
                    .flat_map(|w| {
                        w.zones()
                            .iter()
                            .map(move |z| (w.world_id, z.zone_id, z.continent_id))
                    })
                    .collect();
                let _ = reply.send(zones);
            }
            Query::ZoneForAlert { id, reply } => {
                let _ = reply.send(self.alert_zone_index.get(&id).copied());
            }
        }
    }

    /// Population sum + stale-alert purge, driven by the 15s tick
    /// (spec.md §4.6 item 5).
    fn housekeeping(&mut self, now: DateTime<Utc>) {
        let counts = self
            .players
            .count_population(now, self.config.player_eviction_age);

        let world_ids: Vec<WorldID> = self.global.worlds().iter().map(|w| w.world_id).collect();
        let mut worlds_out = HashMap::new();
        for world_id in world_ids {
            let world_pop = counts.per_world.get(&world_id).copied().unwrap_or([0; 5]);
            self.global.set_world_pop(world_id, world_pop);

            let mut zones_out = HashMap::new();
            if let Some(world) = self.global.world(world_id) {
                for zone in world.zones() {
                    let zone_pop = counts
                        .per_zone
                        .get(&(world_id, zone.zone_id))
                        .copied()
                        .unwrap_or([0; 3]);
                    zones_out.insert(zone.zone_id, zone_pop);
                }
            }
            for (zone_id, pop) in &zones_out {
                self.global.set_zone_pop(world_id, *zone_id, *pop);
            }
            worlds_out.insert(
                world_id,
                WorldPopulationTotal {
                    world_id,
                    world: world_pop,
                    zones: zones_out,
                },
            );
        }
        self.subscribers
            .publish_population_total(&PopulationTotal { worlds: worlds_out });

        let expired = self
            .alerts
            .purge_expired(now, self.config.alert_purge_grace);
        for id in expired {
            if let Some((world_id, zone_id)) = self.alert_zone_index.remove(&id) {
                self.global.set_event(world_id, zone_id, None);
            }
        }
    }

    /// Registers a zone in `GlobalState` if it is not already tracked, and
    /// kicks off a bounded map fetch if the admission cache allows it
    /// (spec.md §4.5, `checkZone`).
    fn ensure_zone_tracked(&mut self, world_id: WorldID, zone_id: ZoneInstanceID) {
        let continent_id = ContinentID(zone_id.geometry_id() as u32);
        let already_tracked = self.global.is_zone_tracked(world_id, zone_id);
        self.global
            .track_zone(world_id, zone_id, continent_id, String::new());

        if already_tracked {
            return;
        }
        if !self.admission.should_check(
            world_id,
            zone_id,
            Utc::now(),
            self.config.zone_admission_cache_ttl,
        ) {
            return;
        }
        pollers::spawn_zone_admission_fetch(
            self.map_client.clone(),
            self.map_tx.clone(),
            world_id,
            zone_id,
            continent_id,
            self.config.zone_admission_fetch_timeout,
        );
    }

    fn notify_territory_change(&self, change: TerritoryChange) {
        self.subscribers.publish_territory_change(&change);
    }

    fn notify_zone_status_change(&self, change: ZoneStatusChange) {
        self.subscribers.publish_zone_status_change(&change);
    }

    fn notify_event_update(&self, update: EventStateUpdate) {
        self.subscribers.publish_event_update(&update);
    }

    fn spawn_faction_lookup(&self, character_id: crate::ids::CharacterID) {
        let store = self.game_data_store.clone();
        let tx = self.faction_tx.clone();
        tokio::spawn(async move {
            if let Ok(faction) = store.get_player_faction(character_id).await {
                if faction != FactionID::None {
                    let _ = tx
                        .send(CharacterFactionResult {
                            character_id,
                            faction,
                        })
                        .await;
                }
            }
        });
    }

    fn spawn_save_faction(&self, character_id: crate::ids::CharacterID, faction: FactionID) {
        let store = self.game_data_store.clone();
        tokio::spawn(async move {
            if let Err(err) = store.save_player_faction(character_id, faction).await {
                tracing::warn!(%character_id, %err, "failed to save player home faction");
            }
        });
    }

    /// Looks up a cached `GetEvent` result, if any (spec.md §4.4: metadata
    /// hydration for a newly-started alert).
    pub(super) fn cached_event_meta(&self, id: MetagameEventID) -> Option<MetagameEventMeta> {
        self.event_meta_cache.get(&id).cloned()
    }

    pub(super) fn cache_event_meta(&mut self, id: MetagameEventID, meta: MetagameEventMeta) {
        self.event_meta_cache.insert(id, meta);
    }

    /// Spawns the async `GetEvent` lookup a `Started` transition can't do
    /// inline (spec.md §5: handlers must not block; the result comes back
    /// over `event_meta_tx` like a home-faction lookup does).
    pub(super) fn spawn_event_meta_lookup(
        &self,
        alert_id: MetagameEventInstanceID,
        metagame_event_id: MetagameEventID,
    ) {
        let store = self.game_data_store.clone();
        let tx = self.event_meta_tx.clone();
        tokio::spawn(async move {
            let meta = store.get_event(metagame_event_id).await.ok().flatten();
            let _ = tx
                .send(EventMetaResult {
                    alert_id,
                    metagame_event_id,
                    meta,
                })
                .await;
        });
    }

    fn spawn_third_party_alert_fetch(
        &self,
        id: MetagameEventInstanceID,
        world_id: WorldID,
        zone_id: ZoneInstanceID,
    ) {
        let client = self.alert_client.clone();
        let tx = self.alert_tx.clone();
        let delay = self.config.third_party_alert_delay;
        let timeout = self.config.third_party_alert_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let fetched = tokio::time::timeout(timeout, client.get_instance(id, timeout)).await;
            if let Ok(Ok(alert)) = fetched {
                let _ = tx
                    .send(ThirdPartyAlertRecord {
                        id,
                        world_id,
                        zone_id,
                        score: alert.score,
                        victor: alert.victor,
                        ended: alert.ended,
                        meta: None,
                    })
                    .await;
            }
        });
    }
}
