//! Typed library errors. Collaborator I/O failures are reported as
//! `anyhow::Error` (spec.md §7 treats upstream failure modes as the
//! collaborator's concern); everything the core itself can get wrong about
//! its own data is a `thiserror` variant so callers can match on it.

use thiserror::Error;

use crate::ids::FacilityID;

/// Structural errors from [`crate::map::summarize`] and map-data loading
/// (spec.md §3: "every Link endpoint must appear as a Region's FacilityID —
/// else Summarize fails").
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MapError {
    #[error("lattice link references facility {facility} which has no region (link {link_a}-{link_b})")]
    DanglingLink {
        facility: FacilityID,
        link_a: FacilityID,
        link_b: FacilityID,
    },
}

/// Errors returned to a caller of the State Manager's read-query endpoint.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("manager not running")]
    ManagerNotRunning,

    #[error("zone {0} is not tracked")]
    ZoneNotTracked(String),
}
