//! Tracker configuration: the policy constants spec.md calls out as tunable
//! (housekeeping cadence, eviction ages, channel capacities, poll
//! intervals...) loaded from a YAML file the same way the teacher crate's
//! own config type loads its settings file.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Tunables for the State Manager and its pollers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// How often the Manager runs population-sum + stale-alert-purge
    /// housekeeping (spec.md §4.6 item 5). Default 15s.
    #[serde(with = "duration_secs")]
    pub housekeeping_interval: Duration,

    /// A player absent from any event for longer than this is evicted at
    /// the next housekeeping tick (spec.md §3 OnlinePlayer invariant).
    /// Default 2h.
    #[serde(with = "duration_secs")]
    pub player_eviction_age: Duration,

    /// An alert is purged this long after `started + duration` has passed
    /// (spec.md §3 Alert invariant). Default 10min.
    #[serde(with = "duration_secs")]
    pub alert_purge_grace: Duration,

    /// `CutoffCount[None]` strictly above this makes a zone Unstable
    /// (spec.md §4.1 step 5). Heuristic, deliberately configurable per
    /// spec.md §9's Open Questions. Default 5.
    pub unstable_cutoff_threshold: u32,

    /// Bounded size of the deduplicator's recently-seen key list
    /// (spec.md §4.2). Default 4096.
    pub dedup_capacity: usize,

    /// Capacity of the `censusPushEvents` channel (spec.md §4.6 item 1,
    /// "capacity >= 5000"). Default 5000.
    pub event_channel_capacity: usize,

    /// Capacity of the `mapUpdates` channel (spec.md §4.6 item 2,
    /// "capacity ~= 10"). Default 10.
    pub map_update_channel_capacity: usize,

    /// How long a dynamic-zone admission decision is cached before
    /// `checkZone` will re-fetch (spec.md §4.5). Default 1h.
    #[serde(with = "duration_secs")]
    pub zone_admission_cache_ttl: Duration,

    /// Interval for the background "active alerts" poll (spec.md §4.6).
    /// Default 5min.
    #[serde(with = "duration_secs")]
    pub alert_poll_interval: Duration,

    /// Interval for the per-tracked-zone map-state poll (spec.md §4.6).
    /// Default 5min.
    #[serde(with = "duration_secs")]
    pub map_poll_interval: Duration,

    /// Delay before the third-party alert lookup fires after a territory
    /// alert starts (spec.md §4.6). Default 20s.
    #[serde(with = "duration_secs")]
    pub third_party_alert_delay: Duration,

    /// Timeout for that delayed third-party alert fetch (spec.md §5,
    /// "alert fetch 5s"). Default 5s.
    #[serde(with = "duration_secs")]
    pub third_party_alert_timeout: Duration,

    /// Timeout for a map-state REST fetch (spec.md §5, "map fetch 30s").
    /// Default 30s.
    #[serde(with = "duration_secs")]
    pub map_fetch_timeout: Duration,

    /// Timeout for the bounded fetch `checkZone` issues when admitting a
    /// newly discovered dynamic zone (spec.md §4.5, "bounded (30s) REST
    /// fetch"). Default 30s.
    #[serde(with = "duration_secs")]
    pub zone_admission_fetch_timeout: Duration,
}

fn default_housekeeping_interval() -> Duration {
    Duration::from_secs(15)
}
fn default_player_eviction_age() -> Duration {
    Duration::from_secs(2 * 3600)
}
fn default_alert_purge_grace() -> Duration {
    Duration::from_secs(10 * 60)
}
fn default_unstable_cutoff_threshold() -> u32 {
    5
}
fn default_dedup_capacity() -> usize {
    4096
}
fn default_event_channel_capacity() -> usize {
    5000
}
fn default_map_update_channel_capacity() -> usize {
    10
}
fn default_zone_admission_cache_ttl() -> Duration {
    Duration::from_secs(3600)
}
fn default_alert_poll_interval() -> Duration {
    Duration::from_secs(5 * 60)
}
fn default_map_poll_interval() -> Duration {
    Duration::from_secs(5 * 60)
}
fn default_third_party_alert_delay() -> Duration {
    Duration::from_secs(20)
}
fn default_third_party_alert_timeout() -> Duration {
    Duration::from_secs(5)
}
fn default_map_fetch_timeout() -> Duration {
    Duration::from_secs(30)
}
fn default_zone_admission_fetch_timeout() -> Duration {
    Duration::from_secs(30)
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            housekeeping_interval: default_housekeeping_interval(),
            player_eviction_age: default_player_eviction_age(),
            alert_purge_grace: default_alert_purge_grace(),
            unstable_cutoff_threshold: default_unstable_cutoff_threshold(),
            dedup_capacity: default_dedup_capacity(),
            event_channel_capacity: default_event_channel_capacity(),
            map_update_channel_capacity: default_map_update_channel_capacity(),
            zone_admission_cache_ttl: default_zone_admission_cache_ttl(),
            alert_poll_interval: default_alert_poll_interval(),
            map_poll_interval: default_map_poll_interval(),
            third_party_alert_delay: default_third_party_alert_delay(),
            third_party_alert_timeout: default_third_party_alert_timeout(),
            map_fetch_timeout: default_map_fetch_timeout(),
            zone_admission_fetch_timeout: default_zone_admission_fetch_timeout(),
        }
    }
}

impl TrackerConfig {
    /// Load configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config from {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&content)
            .with_context(|| format!("failed to parse config from {}", path.display()))?;
        Ok(config)
    }
}

/// `serde(with)` helper for `Duration` fields stored as plain integer
/// seconds, matching spec.md §6's wire-format rule ("Durations render as
/// integer seconds"). Public so other wire types (e.g. `Alert::duration`)
/// share the same representation.
pub mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_policy_constants() {
        let cfg = TrackerConfig::default();
        assert_eq!(cfg.housekeeping_interval, Duration::from_secs(15));
        assert_eq!(cfg.unstable_cutoff_threshold, 5);
        assert_eq!(cfg.event_channel_capacity, 5000);
    }

    #[test]
    fn round_trips_through_yaml() {
        let cfg = TrackerConfig::default();
        let yaml = serde_yaml::to_string(&cfg).unwrap();
        let back: TrackerConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back.unstable_cutoff_threshold, cfg.unstable_cutoff_threshold);
    }
}
