//! Core of a live game-world state tracker: ingests a realtime gameplay
//! event firehose, correlates it with periodic map snapshots and
//! third-party alert metadata, and maintains per-world/per-zone
//! population, territory control, continent lock status, and metagame
//! alert lifecycle. See [`manager`] for the single-writer actor that owns
//! all of it.

pub mod alerts;
pub mod collaborators;
pub mod config;
pub mod dedup;
pub mod error;
pub mod events;
pub mod ids;
pub mod manager;
pub mod map;
pub mod players;
pub mod state;
pub mod subscriber;

pub use config::TrackerConfig;
pub use error::{CoreError, MapError};
pub use manager::{Manager, ManagerHandle, Query};
pub use state::{GlobalState, WorldState, ZoneState};
