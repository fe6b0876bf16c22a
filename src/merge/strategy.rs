// Merge strategies.
//
// Each strategy is a pure function of the comparison and the two inputs. It
// returns a `Plan`: which side is the base, and which differing keys take the
// other side's version instead. The engine does the actual copying.

use std::collections::{HashMap, HashSet};
use std::fmt;

use indexmap::IndexSet;

use super::compare::ComparisonSummary;
use crate::dbpf::{Container, ResourceKey, type_name, types};

// ---------------------------------------------------------------------------
// Allowlists
// ---------------------------------------------------------------------------

/// Structural / world data: buildings, lots, zones, placed objects.
pub static WORLD_TYPES: &[u32] = &[
    types::BUILDING_DATA,
    types::LOT,
    types::ZONE,
    types::OBJECT_DATA,
];

/// Per-sim progress: ages, households, relationships, running situations.
pub static SIM_STATE_TYPES: &[u32] = &[
    types::SIM_INFO,
    types::HOUSEHOLD,
    types::RELATIONSHIP_DATA,
    types::SITUATION,
    types::SAVE_GAME_DATA,
    types::GAME_STATE,
    types::SIM_STATE_A,
    types::SIM_STATE_B,
];

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Which input a resource is taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    Newer,
    Older,
}

impl Source {
    pub fn other(self) -> Self {
        match self {
            Self::Newer => Self::Older,
            Self::Older => Self::Newer,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Newer => "newer",
            Self::Older => "older",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Size thresholds for `Strategy::SmartMerge`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SmartThresholds {
    /// World data: older at least this many times larger.
    pub world_ratio: u64,
    /// World data: newer below this many bytes...
    pub world_small_newer: u64,
    /// ...and older at least this many times larger.
    pub world_small_ratio: u64,
    /// Any type: older at least this many bytes...
    pub min_older: u64,
    /// ...and newer below this percentage of older.
    pub shrink_percent: u64,
}

impl Default for SmartThresholds {
    fn default() -> Self {
        Self {
            world_ratio: 10,
            world_small_newer: 2000,
            world_small_ratio: 5,
            min_older: 1000,
            shrink_percent: 5,
        }
    }
}

/// Tunables for a merge. The default adds every missing resource and uses
/// the built-in allowlists.
#[derive(Debug, Clone)]
pub struct MergeOptions {
    /// Explicit per-key source choices, applied after the strategy.
    pub overrides: HashMap<ResourceKey, Source>,
    /// When set, only these keys are added from the non-base side.
    pub only_add: Option<HashSet<ResourceKey>>,
    pub smart: SmartThresholds,
    pub world_types: &'static [u32],
    pub sim_types: &'static [u32],
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            overrides: HashMap::new(),
            only_add: None,
            smart: SmartThresholds::default(),
            world_types: WORLD_TYPES,
            sim_types: SIM_STATE_TYPES,
        }
    }
}

// ---------------------------------------------------------------------------
// Smart-merge candidates
// ---------------------------------------------------------------------------

/// Why `SmartMerge` prefers the older copy of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmartReason {
    /// World-data resource disproportionately smaller in the newer save.
    WorldDataLoss,
    /// Newer copy is a small fraction of a sizeable older copy.
    Truncated,
}

/// A differing resource `SmartMerge` would take from the older save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmartCandidate {
    pub key: ResourceKey,
    pub newer_size: usize,
    pub older_size: usize,
    pub reason: SmartReason,
}

impl fmt::Display for SmartCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let what = match self.reason {
            SmartReason::WorldDataLoss => "world data shrank",
            SmartReason::Truncated => "newer copy looks truncated",
        };
        write!(
            f,
            "{} ({}): {what}, newer {} bytes vs older {} bytes; using older",
            self.key,
            type_name(self.key.type_id),
            self.newer_size,
            self.older_size
        )
    }
}

fn smart_reason(
    type_id: u32,
    newer: u64,
    older: u64,
    opts: &MergeOptions,
) -> Option<SmartReason> {
    let t = &opts.smart;
    if opts.world_types.contains(&type_id)
        && (older >= newer.saturating_mul(t.world_ratio)
            || (newer < t.world_small_newer && older >= newer.saturating_mul(t.world_small_ratio)))
    {
        return Some(SmartReason::WorldDataLoss);
    }
    if older >= t.min_older && newer.saturating_mul(100) < older.saturating_mul(t.shrink_percent) {
        return Some(SmartReason::Truncated);
    }
    None
}

/// Differing resources `SmartMerge` would substitute, in newer-save order.
pub fn smart_candidates(
    summary: &ComparisonSummary,
    newer: &Container,
    older: &Container,
    opts: &MergeOptions,
) -> Vec<SmartCandidate> {
    newer
        .resources()
        .filter(|r| summary.common_different.contains(&r.key))
        .filter_map(|n| {
            let o = older.get(&n.key)?;
            let reason = smart_reason(n.key.type_id, n.len() as u64, o.len() as u64, opts)?;
            Some(SmartCandidate {
                key: n.key,
                newer_size: n.len(),
                older_size: o.len(),
                reason,
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Strategy
// ---------------------------------------------------------------------------

/// Conflict-resolution policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strategy {
    /// Keep the newer save, only add what it lacks.
    #[default]
    AddMissingOnly,
    /// Keep the newer save, take the older copy when it is strictly larger.
    PreferLarger,
    /// Keep the newer save, take the older copy when the newer one looks
    /// damaged (see `SmartThresholds`).
    SmartMerge,
    /// Start from the older save and bring sim-state resources forward from
    /// the newer one.
    WorkingBase,
    /// Keep the newer save; only `MergeOptions::overrides` substitute.
    Manual,
}

/// Output of a strategy.
#[derive(Debug, Clone)]
pub struct Plan {
    /// Container the output starts as a copy of.
    pub base: Source,
    /// Differing keys that take the non-base version.
    pub substitute: IndexSet<ResourceKey>,
    /// Human-readable notes on heuristic substitutions.
    pub advisories: Vec<String>,
}

impl Plan {
    fn new(base: Source) -> Self {
        Self {
            base,
            substitute: IndexSet::new(),
            advisories: Vec::new(),
        }
    }
}

impl Strategy {
    pub const ALL: [Strategy; 5] = [
        Self::AddMissingOnly,
        Self::PreferLarger,
        Self::SmartMerge,
        Self::WorkingBase,
        Self::Manual,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::AddMissingOnly => "add-missing-only",
            Self::PreferLarger => "prefer-larger",
            Self::SmartMerge => "smart-merge",
            Self::WorkingBase => "working-base",
            Self::Manual => "manual",
        }
    }

    /// Decide the base and the substitutions for this pair of containers.
    pub fn plan(
        self,
        summary: &ComparisonSummary,
        newer: &Container,
        older: &Container,
        opts: &MergeOptions,
    ) -> Plan {
        match self {
            Self::AddMissingOnly | Self::Manual => Plan::new(Source::Newer),
            Self::PreferLarger => prefer_larger(summary, newer, older),
            Self::SmartMerge => smart_merge(summary, newer, older, opts),
            Self::WorkingBase => working_base(summary, older, opts),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn prefer_larger(summary: &ComparisonSummary, newer: &Container, older: &Container) -> Plan {
    let mut plan = Plan::new(Source::Newer);
    for n in newer.resources() {
        if !summary.common_different.contains(&n.key) {
            continue;
        }
        if let Some(o) = older.get(&n.key)
            && o.len() > n.len()
        {
            log::debug!("prefer-larger: {} older {} > newer {}", n.key, o.len(), n.len());
            plan.substitute.insert(n.key);
        }
    }
    plan
}

fn smart_merge(
    summary: &ComparisonSummary,
    newer: &Container,
    older: &Container,
    opts: &MergeOptions,
) -> Plan {
    let mut plan = Plan::new(Source::Newer);
    for candidate in smart_candidates(summary, newer, older, opts) {
        log::debug!("smart-merge: {candidate}");
        plan.substitute.insert(candidate.key);
        plan.advisories.push(candidate.to_string());
    }
    plan
}

fn working_base(summary: &ComparisonSummary, older: &Container, opts: &MergeOptions) -> Plan {
    let mut plan = Plan::new(Source::Older);
    plan.substitute.extend(
        older
            .keys()
            .filter(|k| summary.common_different.contains(*k))
            .filter(|k| opts.sim_types.contains(&k.type_id))
            .copied(),
    );
    plan
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
