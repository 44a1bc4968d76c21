//! Map Graph & Territory Engine (C1, spec.md §4.1).
//!
//! Pure and stateless: `summarize(map, ownership)` turns a zone's immutable
//! lattice plus a point-in-time ownership snapshot into a [`Summary`] —
//! territory percentages, cutoff facilities, and lock status. No caller in
//! this crate holds onto a `Summary` across a mutation; it is recomputed
//! whenever a [`MapState`] entry changes (spec.md §4.6, `FacilityControl`).

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::MapError;
use crate::ids::{FacilityID, FactionID, RegionID};

/// A capturable base's type. Warpgates spawn a faction and cannot be
/// captured; everything else is a contested facility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FacilityType {
    Warpgate,
    AmpStation,
    BioLab,
    Interlink,
    Techplant,
    LargeOutpost,
    SmallOutpost,
    CombatOutpost,
    ContainmentSite,
    Other,
}

/// A polygon of hex tiles on a map. Regions without a facility (e.g.
/// warpgate no-man's-lands) carry `facility = None` and are skipped by
/// [`summarize`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub id: RegionID,
    pub facility: Option<FacilityID>,
    pub facility_type: Option<FacilityType>,
    /// Hex tile coordinates belonging to this region; renderer-only data,
    /// not consulted by [`summarize`].
    #[serde(default)]
    pub hexes: Vec<(i32, i32)>,
    /// Cartesian centre of the region; renderer-only data.
    #[serde(default)]
    pub center: Option<(f64, f64)>,
}

impl Region {
    pub fn is_warpgate(&self) -> bool {
        matches!(self.facility_type, Some(FacilityType::Warpgate))
    }
}

/// An undirected adjacency between two facilities. May appear in either
/// direction, or both, in [`MapData::links`] — [`summarize`] treats both
/// directions as equivalent and duplicate-direction links as harmless.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub a: FacilityID,
    pub b: FacilityID,
}

/// Immutable per-zone map data: the set of regions and the lattice links
/// between their facilities.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MapData {
    pub regions: Vec<Region>,
    pub links: Vec<Link>,
}

/// RegionID -> owning FactionID for one zone at one point in time. Keys
/// missing from the map are unknown and treated as unowned (`None`). A
/// region with `facility = None` is non-owning and never appears here in
/// practice, but if it does it is simply ignored by [`summarize`].
pub type MapState = HashMap<RegionID, FactionID>;

/// Output of [`summarize`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub territory: HashMap<FactionID, f64>,
    pub facility_count: HashMap<FactionID, u32>,
    pub cutoff_count: HashMap<FactionID, u32>,
    pub cutoff: HashSet<RegionID>,
    pub status: ZoneStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ZoneStatus {
    Locked,
    Unlocked,
    Unstable,
}

struct Node {
    region: RegionID,
    owner: FactionID,
    is_warpgate: bool,
}

/// Compute territory percentages, cutoff facilities, and lock status for a
/// single zone (spec.md §4.1). `unstable_cutoff_threshold` is the
/// configured policy constant (default 5, spec.md §9) above which
/// `CutoffCount[None]` makes the zone Unstable.
pub fn summarize(
    map: &MapData,
    ownership: &MapState,
    unstable_cutoff_threshold: u32,
) -> Result<Summary, MapError> {
    // Step 1: build facility nodes, skipping non-owning regions.
    let mut nodes: HashMap<FacilityID, Node> = HashMap::new();
    let mut cutoff: HashSet<RegionID> = HashSet::new();
    let mut cutoff_count: HashMap<FactionID, u32> = HashMap::new();
    let mut facility_count: HashMap<FactionID, u32> = HashMap::new();

    for region in &map.regions {
        let Some(facility) = region.facility else {
            continue;
        };
        let owner = ownership.get(&region.id).copied().unwrap_or(FactionID::None);
        nodes.insert(
            facility,
            Node {
                region: region.id,
                owner,
                is_warpgate: region.is_warpgate(),
            },
        );
        *cutoff_count.entry(owner).or_insert(0) += 1;
        cutoff.insert(region.id);
    }

    // Step 2: build symmetric adjacency, failing on dangling links.
    let mut adjacency: HashMap<FacilityID, Vec<FacilityID>> = HashMap::new();
    for link in &map.links {
        for (endpoint, other) in [(link.a, link.b), (link.b, link.a)] {
            if !nodes.contains_key(&endpoint) {
                return Err(MapError::DanglingLink {
                    facility: endpoint,
                    link_a: link.a,
                    link_b: link.b,
                });
            }
            adjacency.entry(endpoint).or_default().push(other);
        }
    }

    // Step 3: DFS from each warpgate through same-faction neighbours. Every
    // warpgate is pre-marked visited before any walk starts, so the DFS
    // seeded at one warpgate can never cross into — and wrongly tally as
    // territory — another warpgate of the same faction (spec.md §8: a
    // warpgate is excluded from both FacilityCount and CutoffCount, always).
    let warpgates: Vec<FacilityID> = nodes
        .iter()
        .filter(|(_, n)| n.is_warpgate)
        .map(|(f, _)| *f)
        .collect();

    let mut visited: HashSet<FacilityID> = HashSet::new();
    for &wg in &warpgates {
        visited.insert(wg);
        let owner = nodes[&wg].owner;
        let region = nodes[&wg].region;
        *cutoff_count.entry(owner).or_insert(0) -= 1;
        cutoff.remove(&region);
    }

    for &wg in &warpgates {
        let owner = nodes[&wg].owner;
        let mut stack = vec![wg];
        while let Some(current) = stack.pop() {
            let Some(neighbors) = adjacency.get(&current) else {
                continue;
            };
            for &neighbor in neighbors {
                if visited.contains(&neighbor) {
                    continue;
                }
                let neighbor_node = &nodes[&neighbor];
                if neighbor_node.owner != owner {
                    continue;
                }
                visited.insert(neighbor);
                cutoff.remove(&neighbor_node.region);
                *cutoff_count.entry(neighbor_node.owner).or_insert(0) -= 1;
                *facility_count.entry(neighbor_node.owner).or_insert(0) += 1;
                stack.push(neighbor);
            }
        }
    }

    // Step 4: territory percentages.
    let total_territories = nodes.len().saturating_sub(warpgates.len());
    let mut warpgate_owners: HashSet<FactionID> = HashSet::new();
    let mut territory: HashMap<FactionID, f64> = HashMap::new();
    for &wg in &warpgates {
        let owner = nodes[&wg].owner;
        warpgate_owners.insert(owner);
        if total_territories > 0 {
            let count = *facility_count.get(&owner).unwrap_or(&0) as f64;
            territory.insert(owner, 100.0 * count / total_territories as f64);
        } else {
            territory.insert(owner, 0.0);
        }
    }

    // Step 5: status.
    let status = if !warpgates.is_empty() && warpgate_owners.len() == 1 {
        ZoneStatus::Locked
    } else if *cutoff_count.get(&FactionID::None).unwrap_or(&0) > unstable_cutoff_threshold {
        ZoneStatus::Unstable
    } else {
        ZoneStatus::Unlocked
    };

    Ok(Summary {
        territory,
        facility_count,
        cutoff_count,
        cutoff,
        status,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(id: u32, facility: u32, warpgate: bool) -> Region {
        Region {
            id: RegionID(id),
            facility: Some(FacilityID(facility)),
            facility_type: Some(if warpgate {
                FacilityType::Warpgate
            } else {
                FacilityType::SmallOutpost
            }),
            hexes: Vec::new(),
            center: None,
        }
    }

    fn link(a: u32, b: u32) -> Link {
        Link {
            a: FacilityID(a),
            b: FacilityID(b),
        }
    }

    /// Scenario 2: a linear chain WG1(NC) - A(NC) - B(NC) - C(VS) - D(NC).
    fn linear_chain() -> (MapData, MapState) {
        let map = MapData {
            regions: vec![
                region(1, 1, true),
                region(2, 2, false),
                region(3, 3, false),
                region(4, 4, false),
                region(5, 5, false),
            ],
            links: vec![link(1, 2), link(2, 3), link(3, 4), link(4, 5)],
        };
        let ownership: MapState = [
            (RegionID(1), FactionID::NC),
            (RegionID(2), FactionID::NC),
            (RegionID(3), FactionID::NC),
            (RegionID(4), FactionID::VS),
            (RegionID(5), FactionID::NC),
        ]
        .into_iter()
        .collect();
        (map, ownership)
    }

    #[test]
    fn cutoff_detection_scenario() {
        let (map, ownership) = linear_chain();
        let summary = summarize(&map, &ownership, 5).unwrap();

        assert_eq!(summary.cutoff, HashSet::from([RegionID(5)]));
        assert_eq!(summary.cutoff_count.get(&FactionID::NC), Some(&1));
        assert_eq!(summary.facility_count.get(&FactionID::NC), Some(&2));
        assert!((summary.territory[&FactionID::NC] - 50.0).abs() < 1e-9);
    }

    #[test]
    fn single_faction_ownership_locks_at_100_percent() {
        let map = MapData {
            regions: vec![region(1, 1, true), region(2, 2, false), region(3, 3, false)],
            links: vec![link(1, 2), link(1, 3)],
        };
        let ownership: MapState = [
            (RegionID(1), FactionID::TR),
            (RegionID(2), FactionID::TR),
            (RegionID(3), FactionID::TR),
        ]
        .into_iter()
        .collect();

        let summary = summarize(&map, &ownership, 5).unwrap();
        assert_eq!(summary.status, ZoneStatus::Locked);
        assert!((summary.territory[&FactionID::TR] - 100.0).abs() < 1e-9);
    }

    #[test]
    fn unstable_when_many_regions_are_unowned() {
        let mut regions = vec![region(1, 1, true), region(2, 2, true), region(3, 3, true)];
        let mut ownership: MapState = [
            (RegionID(1), FactionID::VS),
            (RegionID(2), FactionID::NC),
            (RegionID(3), FactionID::TR),
        ]
        .into_iter()
        .collect();

        // 7 disabled (unowned) regions, none linked to any warpgate.
        for i in 10..17 {
            regions.push(region(i, i, false));
            ownership.insert(RegionID(i), FactionID::None);
        }
        let map = MapData {
            regions,
            links: Vec::new(),
        };

        let summary = summarize(&map, &ownership, 5).unwrap();
        assert_eq!(summary.status, ZoneStatus::Unstable);
        assert_eq!(summary.cutoff_count.get(&FactionID::None), Some(&7));
    }

    /// Three warpgates, one faction, fully connected: territory must land
    /// at exactly 100% and neither WG2 nor WG3 may be tallied as a
    /// territory facility just because the DFS from WG1 can reach them.
    #[test]
    fn locked_continent_with_three_same_faction_warpgates_excludes_all_of_them() {
        let map = MapData {
            regions: vec![
                region(1, 1, true),
                region(2, 2, true),
                region(3, 3, true),
                region(4, 4, false),
                region(5, 5, false),
            ],
            links: vec![link(1, 4), link(4, 2), link(2, 5), link(5, 3)],
        };
        let ownership: MapState = [
            (RegionID(1), FactionID::TR),
            (RegionID(2), FactionID::TR),
            (RegionID(3), FactionID::TR),
            (RegionID(4), FactionID::TR),
            (RegionID(5), FactionID::TR),
        ]
        .into_iter()
        .collect();

        let summary = summarize(&map, &ownership, 5).unwrap();
        assert_eq!(summary.status, ZoneStatus::Locked);
        assert!((summary.territory[&FactionID::TR] - 100.0).abs() < 1e-9);
        assert_eq!(summary.facility_count.get(&FactionID::TR), Some(&2));

        let warpgate_count = map.regions.iter().filter(|r| r.is_warpgate()).count() as u32;
        let total = map.regions.len() as u32 - warpgate_count;
        let counted: u32 = summary.facility_count.values().sum::<u32>()
            + summary.cutoff_count.values().sum::<u32>();
        assert_eq!(counted, total);
    }

    #[test]
    fn dangling_link_is_a_structural_error() {
        let map = MapData {
            regions: vec![region(1, 1, true)],
            links: vec![link(1, 999)],
        };
        let ownership: MapState = [(RegionID(1), FactionID::VS)].into_iter().collect();

        let err = summarize(&map, &ownership, 5).unwrap_err();
        assert!(matches!(err, MapError::DanglingLink { facility, .. } if facility == FacilityID(999)));
    }

    #[test]
    fn summarize_is_deterministic() {
        let (map, ownership) = linear_chain();
        let a = summarize(&map, &ownership, 5).unwrap();
        let b = summarize(&map, &ownership, 5).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn cutoff_and_facility_count_partition_non_warpgate_regions() {
        let (map, ownership) = linear_chain();
        let summary = summarize(&map, &ownership, 5).unwrap();

        let warpgate_count = map.regions.iter().filter(|r| r.is_warpgate()).count() as u32;
        let total = map.regions.len() as u32 - warpgate_count;
        let counted: u32 = summary.facility_count.values().sum::<u32>()
            + summary.cutoff_count.values().sum::<u32>();
        assert_eq!(counted, total);
    }
}
