//! Demonstration harness for the game-world state tracker core.
//!
//! Not a product front-end — push clients, REST clients, and the game-data
//! store are all out of scope as collaborators (spec.md §1). This binary
//! wires the State Manager up against small in-memory stand-ins for those
//! collaborators so the actor can be driven end to end from a terminal.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use tracker_core::collaborators::{AlertClient, GameDataStore, MapClient, MapStateSnapshot};
use tracker_core::config::TrackerConfig;
use tracker_core::events::CensusEvent;
use tracker_core::ids::{CharacterID, ContinentID, FacilityID, FactionID, MetagameEventInstanceID, RegionID, WorldID, ZoneInstanceID};
use tracker_core::map::{FacilityType, Link, MapData, Region};
use tracker_core::players::Loadout;
use tracker_core::Manager;

#[derive(Parser)]
#[command(name = "tracker-cli")]
#[command(about = "Demonstration harness for the game-world state tracker", version)]
struct Cli {
    /// Path to a YAML config file; defaults are used if omitted.
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,

    /// Verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the Manager, feed it synthetic events, print a population
    /// snapshot, then shut down cleanly.
    Run,

    /// Start the Manager and print one `GlobalState` snapshot as JSON.
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    fmt().with_env_filter(filter).with_target(false).init();

    let config = match &cli.config {
        Some(path) => TrackerConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => TrackerConfig::default(),
    };

    match cli.command {
        Commands::Run => run_demo(config).await,
        Commands::Status => show_status(config).await,
    }
}

/// World/continent layout the demo fixture pretends to know about: one
/// world ("Connery"), one permanent continent ("Indar") with a tiny
/// warpgate-triangle lattice.
const DEMO_WORLD: WorldID = WorldID(1);
const DEMO_CONTINENT: ContinentID = ContinentID(2);

fn demo_map() -> MapData {
    MapData {
        regions: vec![
            Region {
                id: RegionID(1),
                facility: Some(FacilityID(1)),
                facility_type: Some(FacilityType::Warpgate),
                hexes: Vec::new(),
                center: None,
            },
            Region {
                id: RegionID(2),
                facility: Some(FacilityID(2)),
                facility_type: Some(FacilityType::SmallOutpost),
                hexes: Vec::new(),
                center: None,
            },
            Region {
                id: RegionID(3),
                facility: Some(FacilityID(3)),
                facility_type: Some(FacilityType::LargeOutpost),
                hexes: Vec::new(),
                center: None,
            },
        ],
        links: vec![
            Link { a: FacilityID(1), b: FacilityID(2) },
            Link { a: FacilityID(2), b: FacilityID(3) },
        ],
    }
}

/// Stands in for the immutable static lookups spec.md §6 puts behind
/// `GameDataStore`: a couple of worlds/continents/maps baked in, no network.
struct StaticGameData {
    maps: HashMap<ContinentID, MapData>,
}

impl StaticGameData {
    fn new() -> Self {
        let mut maps = HashMap::new();
        maps.insert(DEMO_CONTINENT, demo_map());
        Self { maps }
    }
}

#[async_trait]
impl GameDataStore for StaticGameData {
    async fn get_world(&self, id: WorldID) -> Result<Option<String>> {
        Ok((id == DEMO_WORLD).then(|| "Connery".to_string()))
    }

    async fn list_worlds(&self) -> Result<Vec<WorldID>> {
        Ok(vec![DEMO_WORLD])
    }

    async fn get_continent(&self, id: ContinentID) -> Result<Option<String>> {
        Ok((id == DEMO_CONTINENT).then(|| "Indar".to_string()))
    }

    async fn list_continents(&self) -> Result<Vec<ContinentID>> {
        Ok(vec![DEMO_CONTINENT])
    }

    async fn get_event(
        &self,
        _id: tracker_core::ids::MetagameEventID,
    ) -> Result<Option<tracker_core::events::MetagameEventMeta>> {
        Ok(None)
    }

    async fn get_facility(&self, _id: FacilityID) -> Result<Option<String>> {
        Ok(None)
    }

    async fn get_facility_region(&self, _id: FacilityID) -> Result<Option<RegionID>> {
        Ok(None)
    }

    async fn get_map(&self, id: ContinentID) -> Result<Option<MapData>> {
        Ok(self.maps.get(&id).cloned())
    }

    async fn get_player_faction(&self, _id: CharacterID) -> Result<FactionID> {
        Ok(FactionID::None)
    }

    async fn save_player_faction(&self, _id: CharacterID, _faction: FactionID) -> Result<()> {
        Ok(())
    }
}

/// Stub REST clients: no real HTTP, no websocket plumbing (out of scope as
/// collaborators, spec.md §1) — both just return empty results so the
/// pollers have nothing to do.
struct StubMapClient;

#[async_trait]
impl MapClient for StubMapClient {
    async fn get_map(
        &self,
        _world_id: WorldID,
        _zone_ids: &[ZoneInstanceID],
        _timeout: Duration,
    ) -> Result<Vec<MapStateSnapshot>> {
        Ok(Vec::new())
    }
}

struct StubAlertClient;

#[async_trait]
impl AlertClient for StubAlertClient {
    async fn get_instance(
        &self,
        id: MetagameEventInstanceID,
        _timeout: Duration,
    ) -> Result<tracker_core::alerts::Alert> {
        anyhow::bail!("no third-party record for {id}")
    }

    async fn get_active(&self, _timeout: Duration) -> Result<Vec<tracker_core::alerts::Alert>> {
        Ok(Vec::new())
    }
}

async fn build_manager(config: TrackerConfig) -> Result<Manager> {
    Manager::new(
        config,
        Arc::new(StaticGameData::new()),
        Arc::new(StubMapClient),
        Arc::new(StubAlertClient),
    )
    .await
    .context("failed to build the state manager")
}

async fn run_demo(config: TrackerConfig) -> Result<()> {
    let manager = build_manager(config).await?;
    let handle = manager.handle();
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let join = tokio::spawn(manager.run(shutdown_rx));

    let zone = ZoneInstanceID::new(DEMO_CONTINENT.0 as u16, 0);
    let now = Utc::now();
    handle
        .submit_event(CensusEvent::PlayerLogin {
            character_id: CharacterID(100),
            world_id: DEMO_WORLD,
            ts: now,
        })
        .await;
    handle
        .submit_event(CensusEvent::GainExperience {
            character_id: CharacterID(100),
            world_id: DEMO_WORLD,
            zone_id: zone,
            team: FactionID::VS,
            loadout: Some(Loadout::VsHeavyAssault),
            ts: now,
        })
        .await;
    handle
        .submit_event(CensusEvent::MetagameEvent {
            world_id: DEMO_WORLD,
            zone_id: zone,
            instance_id: tracker_core::ids::InstanceID(1),
            metagame_event_id: tracker_core::ids::MetagameEventID(147),
            state: tracker_core::events::MetagameEventState::Started,
            faction_scores: [0.0, 0.0, 0.0],
            ts: now,
        })
        .await;
    handle
        .submit_map_update(tracker_core::events::MapUpdate {
            world_id: DEMO_WORLD,
            zone_id: zone,
            continent_id: DEMO_CONTINENT,
            regions: [
                (RegionID(1), FactionID::VS),
                (RegionID(2), FactionID::NC),
                (RegionID(3), FactionID::NC),
            ]
            .into_iter()
            .collect(),
            timestamp: now,
        })
        .await;
    // Give the manager loop a chance to drain the map update before the
    // facility flip below, since they travel on separate channels.
    tokio::time::sleep(Duration::from_millis(20)).await;
    handle
        .submit_event(CensusEvent::FacilityControl {
            world_id: DEMO_WORLD,
            zone_id: zone,
            facility_id: FacilityID(2),
            old_faction: FactionID::NC,
            new_faction: FactionID::VS,
            ts: now,
        })
        .await;

    tokio::time::sleep(Duration::from_millis(50)).await;

    let snapshot = handle.world(DEMO_WORLD).await?;
    match snapshot {
        Some(world) => {
            tracing::info!(
                world = %world.name,
                population = ?world.population,
                zones = world.zones().len(),
                "population snapshot"
            );
        }
        None => tracing::warn!("demo world not tracked"),
    }

    let _ = shutdown_tx.send(());
    join.await.context("state manager task panicked")?;
    Ok(())
}

async fn show_status(config: TrackerConfig) -> Result<()> {
    let manager = build_manager(config).await?;
    let handle = manager.handle();
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let join = tokio::spawn(manager.run(shutdown_rx));

    let snapshot = handle.snapshot().await?;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);

    let _ = shutdown_tx.send(());
    join.await.context("state manager task panicked")?;
    Ok(())
}
