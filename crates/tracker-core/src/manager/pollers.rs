//! Poller Workers (C7, spec.md §4.7): background tasks spawned as children
//! of the Manager's lifetime. They never touch Manager state directly —
//! only REST calls and channel sends, as spec.md §4.7 requires ("MUST
//! deliver results via channels rather than call into state").

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::collaborators::{AlertClient, MapClient};
use crate::config::TrackerConfig;
use crate::events::{MapUpdate, MetagameEventMeta, ThirdPartyAlertRecord};
use crate::ids::{ContinentID, WorldID, ZoneInstanceID};

use super::{ManagerHandle, Query};

/// Handles to the background pollers, aborted together on shutdown.
pub struct PollerHandles {
    tasks: Vec<JoinHandle<()>>,
}

impl PollerHandles {
    pub fn abort_all(self) {
        for task in self.tasks {
            task.abort();
        }
    }
}

/// Starts the map-state poller (every `map_poll_interval`) and the
/// active-alerts poller (every `alert_poll_interval`), per spec.md §4.6:
/// "a separate background task polls the active alerts endpoint every 5
/// minutes, and a map-state poller polls every 5 minutes for each currently
/// tracked zone."
pub fn spawn(
    handle: ManagerHandle,
    map_client: Arc<dyn MapClient>,
    alert_client: Arc<dyn AlertClient>,
    config: TrackerConfig,
) -> PollerHandles {
    let map_task = tokio::spawn(map_poller(
        handle.clone(),
        map_client,
        config.map_poll_interval,
        config.map_fetch_timeout,
    ));
    let alert_task = tokio::spawn(alert_poller(
        handle,
        alert_client,
        config.alert_poll_interval,
        config.third_party_alert_timeout,
    ));

    PollerHandles {
        tasks: vec![map_task, alert_task],
    }
}

async fn map_poller(
    handle: ManagerHandle,
    map_client: Arc<dyn MapClient>,
    interval: Duration,
    timeout: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        if handle.is_unavailable() {
            return;
        }
        let Ok(zones) = handle.query(|reply| Query::ListZones { reply }).await else {
            return;
        };
        for (world_id, zone_id, continent_id) in zones {
            if let Ok(snapshots) = map_client.get_map(world_id, &[zone_id], timeout).await {
                for snapshot in snapshots {
                    let update = MapUpdate {
                        world_id: snapshot.world_id,
                        zone_id: snapshot.zone_id,
                        continent_id,
                        regions: snapshot.regions.into_iter().collect(),
                        timestamp: snapshot.timestamp,
                    };
                    handle.submit_map_update(update).await;
                }
            }
        }
    }
}

async fn alert_poller(
    handle: ManagerHandle,
    alert_client: Arc<dyn AlertClient>,
    interval: Duration,
    timeout: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        if handle.is_unavailable() {
            return;
        }
        let Ok(alerts) = alert_client.get_active(timeout).await else {
            continue;
        };
        for alert in alerts {
            let Ok(Some((world_id, zone_id))) =
                handle.query(|reply| Query::ZoneForAlert { id: alert.id, reply }).await
            else {
                continue; // not yet attached to a zone; retry next cycle
            };
            let record = ThirdPartyAlertRecord {
                id: alert.id,
                world_id,
                zone_id,
                score: alert.score,
                victor: alert.victor,
                ended: alert.ended,
                meta: Some(MetagameEventMeta {
                    name: alert.name,
                    description: alert.description,
                    duration: alert.duration,
                    is_continent_lock: alert.is_continent_lock,
                    is_territory: alert.is_territory,
                    starting_faction: alert.starting_faction,
                    url: alert.url,
                }),
            };
            handle.submit_alert_record(record).await;
        }
    }
}

/// One-shot bounded fetch for a newly discovered dynamic zone (spec.md
/// §4.5, `checkZone`: "launch a bounded (30s) REST fetch ... on success,
/// feed result through the normal map-update path").
pub fn spawn_zone_admission_fetch(
    map_client: Arc<dyn MapClient>,
    map_tx: mpsc::Sender<MapUpdate>,
    world_id: WorldID,
    zone_id: ZoneInstanceID,
    continent_id: ContinentID,
    timeout: Duration,
) {
    tokio::spawn(async move {
        let fetched = tokio::time::timeout(timeout, map_client.get_map(world_id, &[zone_id], timeout)).await;
        if let Ok(Ok(snapshots)) = fetched {
            for snapshot in snapshots {
                let update = MapUpdate {
                    world_id: snapshot.world_id,
                    zone_id: snapshot.zone_id,
                    continent_id,
                    regions: snapshot.regions.into_iter().collect(),
                    timestamp: snapshot.timestamp,
                };
                let _ = map_tx.send(update).await;
            }
        }
    });
}
