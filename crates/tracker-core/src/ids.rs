//! Opaque identifiers shared across the tracker, plus the `ZoneInstanceID`
//! bit layout and the `MetagameEventInstanceID` composite key.

use std::fmt;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

macro_rules! newtype_id {
    ($name:ident, $inner:ty) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub $inner);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<$inner> for $name {
            fn from(v: $inner) -> Self {
                Self(v)
            }
        }
    };
}

newtype_id!(WorldID, u32);
newtype_id!(ZoneID, u32);
newtype_id!(ContinentID, u32);
newtype_id!(FacilityID, u32);
newtype_id!(RegionID, u32);
newtype_id!(CharacterID, u64);
newtype_id!(MetagameEventID, u32);
newtype_id!(InstanceID, u32);
/// Identifies the third-party alert metadata record a given `Alert` was
/// hydrated from; opaque beyond that (spec.md §3, `Alert.mapId`).
newtype_id!(MapID, u32);

/// `FactionID` is one of `{None, VS, NC, TR, NSO}`, bounded 0..4. Unmarshalling
/// rejects out-of-range values (spec.md §6, wire formats).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum FactionID {
    #[default]
    None = 0,
    VS = 1,
    NC = 2,
    TR = 3,
    NSO = 4,
}

impl FactionID {
    pub const ALL: [FactionID; 5] = [
        FactionID::None,
        FactionID::VS,
        FactionID::NC,
        FactionID::TR,
        FactionID::NSO,
    ];

    /// The three factions that can found/own a warpgate and score in an alert.
    pub const WARRING: [FactionID; 3] = [FactionID::VS, FactionID::NC, FactionID::TR];

    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::None),
            1 => Some(Self::VS),
            2 => Some(Self::NC),
            3 => Some(Self::TR),
            4 => Some(Self::NSO),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl Serialize for FactionID {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.as_u8())
    }
}

impl<'de> Deserialize<'de> for FactionID {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let v = u8::deserialize(deserializer)?;
        FactionID::from_u8(v).ok_or_else(|| de::Error::custom(format!("faction id out of range: {v}")))
    }
}

/// A 32-bit composite: low 16 bits are the continent/geometry identifier,
/// high 16 bits are an ephemeral instance counter. Zero in the high bits
/// means a static zone; non-zero means a dynamic instanced zone, in which
/// case the low bits are a geometry id rather than a standalone zone id.
///
/// This bit layout is part of the protocol with upstream and must be
/// preserved exactly (spec.md §9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ZoneInstanceID(pub u32);

impl ZoneInstanceID {
    pub fn new(geometry_id: u16, instance_counter: u16) -> Self {
        Self((geometry_id as u32) | ((instance_counter as u32) << 16))
    }

    /// The continent/geometry identifier (low 16 bits).
    pub fn geometry_id(self) -> u16 {
        (self.0 & 0xFFFF) as u16
    }

    /// The ephemeral instance counter (high 16 bits). Zero means static.
    pub fn instance_counter(self) -> u16 {
        (self.0 >> 16) as u16
    }

    pub fn is_static(self) -> bool {
        self.instance_counter() == 0
    }

    pub fn is_dynamic(self) -> bool {
        !self.is_static()
    }

    /// The zone/continent this instance belongs to, for static zones this
    /// is just the geometry id reinterpreted as a `ZoneID`.
    pub fn zone_id(self) -> ZoneID {
        ZoneID(self.geometry_id() as u32)
    }
}

impl fmt::Display for ZoneInstanceID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// `(WorldID, InstanceID)`. Canonical string form is `"<world>-<instance>"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MetagameEventInstanceID {
    pub world: WorldID,
    pub instance: InstanceID,
}

impl MetagameEventInstanceID {
    pub fn new(world: WorldID, instance: InstanceID) -> Self {
        Self { world, instance }
    }
}

impl fmt::Display for MetagameEventInstanceID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.world.0, self.instance.0)
    }
}

impl Serialize for MetagameEventInstanceID {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for MetagameEventInstanceID {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let (world, instance) = s
            .split_once('-')
            .ok_or_else(|| de::Error::custom("expected \"<world>-<instance>\""))?;
        let world: u32 = world.parse().map_err(de::Error::custom)?;
        let instance: u32 = instance.parse().map_err(de::Error::custom)?;
        Ok(Self {
            world: WorldID(world),
            instance: InstanceID(instance),
        })
    }
}
