//! Named interfaces for everything spec.md §1 puts out of scope: the push
//! event source, the map/alert REST clients, and the static game-data
//! store. The core depends only on these traits — concrete HTTP clients,
//! websocket plumbing, rate limiting, circuit breaking, and retries are a
//! collaborator's concern, not the State Manager's (spec.md §5, §7).

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use crate::alerts::Alert;
use crate::ids::{
    CharacterID, ContinentID, FacilityID, FactionID, MetagameEventID, MetagameEventInstanceID,
    RegionID, WorldID, ZoneInstanceID,
};
use crate::map::MapData;

/// One snapshot of a zone's region ownership, as returned by `GetMap`
/// (spec.md §6).
#[derive(Debug, Clone, PartialEq)]
pub struct MapStateSnapshot {
    pub world_id: WorldID,
    pub zone_id: ZoneInstanceID,
    pub regions: Vec<(RegionID, FactionID)>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// REST client for the map/world-event collections (spec.md §6).
/// Implementations own rate limiting, circuit breaking, and retries
/// (spec.md §5) — none of that is visible here.
#[async_trait]
pub trait MapClient: Send + Sync {
    async fn get_map(
        &self,
        world_id: WorldID,
        zone_ids: &[ZoneInstanceID],
        timeout: Duration,
    ) -> Result<Vec<MapStateSnapshot>>;
}

/// REST client for third-party alert metadata (spec.md §6).
#[async_trait]
pub trait AlertClient: Send + Sync {
    async fn get_instance(&self, id: MetagameEventInstanceID, timeout: Duration) -> Result<Alert>;
    async fn get_active(&self, timeout: Duration) -> Result<Vec<Alert>>;
}

/// Immutable static lookups (spec.md §6). The only write in the whole core
/// is `save_player_faction`, and it is through this interface.
#[async_trait]
pub trait GameDataStore: Send + Sync {
    async fn get_world(&self, id: WorldID) -> Result<Option<String>>;
    async fn list_worlds(&self) -> Result<Vec<WorldID>>;
    async fn get_continent(&self, id: ContinentID) -> Result<Option<String>>;
    async fn list_continents(&self) -> Result<Vec<ContinentID>>;
    async fn get_event(&self, id: MetagameEventID) -> Result<Option<crate::events::MetagameEventMeta>>;
    async fn get_facility(&self, id: FacilityID) -> Result<Option<String>>;
    async fn get_facility_region(&self, id: FacilityID) -> Result<Option<RegionID>>;
    async fn get_map(&self, id: ContinentID) -> Result<Option<MapData>>;
    async fn get_player_faction(&self, id: CharacterID) -> Result<FactionID>;
    async fn save_player_faction(&self, id: CharacterID, faction: FactionID) -> Result<()>;
}

/// Registers one callback per push-event variant (spec.md §6, §9 "the push
/// client receives a callback for each variant"). Chosen over a single
/// untyped envelope so registration stays compile-time type-checked; a
/// concrete `PushEventSource` is expected to translate each callback
/// invocation into a [`crate::events::CensusEvent`] and forward it onto the
/// core's `censusPushEvents` channel.
pub trait PushEventSource: Send + Sync {
    fn add_handler(&mut self, handler: Box<dyn Fn(crate::events::CensusEvent) + Send + Sync>);
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubGameDataStore;

    #[async_trait]
    impl GameDataStore for StubGameDataStore {
        async fn get_world(&self, _id: WorldID) -> Result<Option<String>> {
            Ok(Some("Connery".into()))
        }
        async fn list_worlds(&self) -> Result<Vec<WorldID>> {
            Ok(vec![WorldID(1)])
        }
        async fn get_continent(&self, _id: ContinentID) -> Result<Option<String>> {
            Ok(Some("Indar".into()))
        }
        async fn list_continents(&self) -> Result<Vec<ContinentID>> {
            Ok(vec![ContinentID(2)])
        }
        async fn get_event(
            &self,
            _id: MetagameEventID,
        ) -> Result<Option<crate::events::MetagameEventMeta>> {
            Ok(None)
        }
        async fn get_facility(&self, _id: FacilityID) -> Result<Option<String>> {
            Ok(None)
        }
        async fn get_facility_region(&self, _id: FacilityID) -> Result<Option<RegionID>> {
            Ok(None)
        }
        async fn get_map(&self, _id: ContinentID) -> Result<Option<MapData>> {
            Ok(None)
        }
        async fn get_player_faction(&self, _id: CharacterID) -> Result<FactionID> {
            Ok(FactionID::None)
        }
        async fn save_player_faction(&self, _id: CharacterID, _faction: FactionID) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn stub_store_satisfies_the_trait_object_bound() {
        let store: Box<dyn GameDataStore> = Box::new(StubGameDataStore);
        assert_eq!(store.list_worlds().await.unwrap(), vec![WorldID(1)]);
    }
}
