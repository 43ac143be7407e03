//! Skill Tree System
//!
//! Two-domain skill DAG loaded from TOML, with dependency-gated unlocking
//! and one-time reward issuance through the Credo ledger.

pub mod definition;
pub mod graph;
pub mod registry;

pub use definition::{Domain, SkillCategory, SkillDomain, SkillNode, SkillReward, SkillTree};
pub use graph::{
    CategoryProgress, OverallProgress, ProgressOutcome, SkillGraph, SkillProgressRecord,
    SkillProgressSnapshot,
};
pub use registry::SkillRegistry;
