// Resource-level merging of two save containers.
//
// # Modules
//
// - `compare`  — Key/byte partition of two containers, display views
// - `strategy` — Conflict-resolution policies and their allowlists
// - `engine`   — Builds the merged container, optional save with backup

pub mod compare;
pub mod engine;
pub mod strategy;

pub use compare::{
    ComparisonSummary, ResourceInfo, TypeBreakdown, compare, conflicting_resources,
    mergeable_resources,
};
pub use engine::{MergeEngine, MergeResult, OutputOptions, ProgressFn};
pub use strategy::{
    MergeOptions, Plan, SIM_STATE_TYPES, SmartCandidate, SmartReason, SmartThresholds, Source,
    Strategy, WORLD_TYPES, smart_candidates,
};
