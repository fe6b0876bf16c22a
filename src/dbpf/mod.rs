// DBPF (Database Packed File) save container format.
//
// # Modules
//
// - `header`    — Fixed 96-byte header, two version layouts
// - `index`     — Resource index (flagged and fixed layouts)
// - `container` — Load/save of a whole container into a resource map

pub mod container;
pub mod header;
pub mod index;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

pub use container::{Container, ContainerError, LoadWarning, SaveOptions, Statistics};
pub use header::{DBPF_MAGIC, FormatError, HEADER_SIZE, Header};
pub use index::{IndexLayout, ResourceRecord, build_index, parse_index};

// ---------------------------------------------------------------------------
// Resource key
// ---------------------------------------------------------------------------

/// Type/group/instance triple identifying a resource within a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKey {
    pub type_id: u32,
    pub group_id: u32,
    pub instance_id: u64,
}

impl ResourceKey {
    pub const fn new(type_id: u32, group_id: u32, instance_id: u64) -> Self {
        Self {
            type_id,
            group_id,
            instance_id,
        }
    }

    /// Build a key from the split instance words stored in the index.
    pub const fn from_parts(type_id: u32, group_id: u32, high: u32, low: u32) -> Self {
        Self::new(type_id, group_id, ((high as u64) << 32) | low as u64)
    }

    #[inline]
    pub const fn instance_high(&self) -> u32 {
        (self.instance_id >> 32) as u32
    }

    #[inline]
    pub const fn instance_low(&self) -> u32 {
        self.instance_id as u32
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:08X}:{:08X}:{:016X}",
            self.type_id, self.group_id, self.instance_id
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid resource key '{0}': expected TTTTTTTT:GGGGGGGG:IIIIIIIIIIIIIIII (hex)")]
pub struct ParseKeyError(String);

impl FromStr for ResourceKey {
    type Err = ParseKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseKeyError(s.to_string());
        let mut parts = s.trim().split(':');
        let (Some(t), Some(g), Some(i), None) = (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(err());
        };
        let hex = |p: &str| p.trim_start_matches("0x").trim_start_matches("0X").to_string();
        Ok(Self::new(
            u32::from_str_radix(&hex(t), 16).map_err(|_| err())?,
            u32::from_str_radix(&hex(g), 16).map_err(|_| err())?,
            u64::from_str_radix(&hex(i), 16).map_err(|_| err())?,
        ))
    }
}

// ---------------------------------------------------------------------------
// Resource
// ---------------------------------------------------------------------------

/// A decoded resource: its key plus the uncompressed payload.
///
/// The payload is shared, so copying a resource between containers never
/// duplicates or mutates the bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub key: ResourceKey,
    data: Arc<[u8]>,
}

impl Resource {
    pub fn new(key: ResourceKey, data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            key,
            data: data.into(),
        }
    }

    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn type_name(&self) -> String {
        type_name(self.key.type_id)
    }
}

// ---------------------------------------------------------------------------
// Resource type names
// ---------------------------------------------------------------------------

/// Resource types seen in save containers.
pub mod types {
    pub const BUILDING_DATA: u32 = 0x0000_0006;
    pub const SAVE_GAME_DATA: u32 = 0x0000_000D;
    pub const GAME_STATE: u32 = 0x0000_000F;
    pub const SIM_STATE_A: u32 = 0x0000_0014;
    pub const SIM_STATE_B: u32 = 0x0000_0015;
    pub const SIM_DATA: u32 = 0x2205_57DA;
    pub const THUMBNAIL: u32 = 0x545A_C67A;
    pub const OBJECT_DATA: u32 = 0x62EC_C59A;
    pub const HOUSEHOLD: u32 = 0xB61D_E6B4;
    pub const LOT: u32 = 0xE882_D22F;
    pub const ZONE: u32 = 0xDC95_CF1A;
    pub const RELATIONSHIP_DATA: u32 = 0x0C77_2E27;
    pub const SITUATION: u32 = 0x3BD4_5407;
    pub const STRING_TABLE: u32 = 0xBC45_87A3;
    pub const SIM_INFO: u32 = 0xC0DB_5AE7;
}

static TYPE_NAMES: &[(u32, &str)] = &[
    (types::BUILDING_DATA, "BuildingData"),
    (types::SAVE_GAME_DATA, "SaveGameData"),
    (types::GAME_STATE, "GameState"),
    (types::SIM_DATA, "SimData"),
    (types::THUMBNAIL, "Thumbnail"),
    (types::OBJECT_DATA, "ObjectData"),
    (types::HOUSEHOLD, "Household"),
    (types::LOT, "Lot"),
    (types::ZONE, "Zone"),
    (types::RELATIONSHIP_DATA, "RelationshipData"),
    (types::SITUATION, "Situation"),
    (types::STRING_TABLE, "StringTable"),
    (types::SIM_INFO, "SimInfo"),
];

/// Human-readable name for a resource type id.
pub fn type_name(type_id: u32) -> String {
    TYPE_NAMES
        .iter()
        .find(|(id, _)| *id == type_id)
        .map(|(_, name)| (*name).to_string())
        .unwrap_or_else(|| format!("Type_{type_id:08X}"))
}
