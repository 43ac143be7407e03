//! Engine error types.

use std::path::PathBuf;
use thiserror::Error;

use crate::skill_tree::Domain;

/// Lookup failures for skill graph operations. Raised before any mutation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SkillTreeError {
    #[error("Unknown skill domain: {0}")]
    UnknownDomain(Domain),

    #[error("Unknown skill category '{category}' in domain {domain}")]
    UnknownCategory { domain: Domain, category: String },

    #[error("Unknown skill '{skill}' in {domain}/{category}")]
    UnknownSkill {
        domain: Domain,
        category: String,
        skill: String,
    },
}

/// Configuration and topology errors. These prevent the engine from starting.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Duplicate category '{category}' in domain {domain}")]
    DuplicateCategory { domain: Domain, category: String },

    #[error("Duplicate skill '{skill}' in {domain}/{category}")]
    DuplicateSkill {
        domain: Domain,
        category: String,
        skill: String,
    },

    #[error("Skill '{skill}' in {domain}/{category} depends on unknown skill '{dependency}'")]
    UnknownDependency {
        domain: Domain,
        category: String,
        skill: String,
        dependency: String,
    },

    #[error("Skill '{skill}' in {domain}/{category} depends on itself")]
    SelfDependency {
        domain: Domain,
        category: String,
        skill: String,
    },

    #[error("Dependency cycle in {domain}/{category}: {}", .cycle.join(" -> "))]
    DependencyCycle {
        domain: Domain,
        category: String,
        cycle: Vec<String>,
    },

    #[error("Skill '{skill}' in {domain}/{category} has max_progress 0")]
    ZeroMaxProgress {
        domain: Domain,
        category: String,
        skill: String,
    },
}

/// Rejected persisted state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnapshotError {
    #[error(
        "Ledger snapshot is inconsistent: balance {balance} != earned {earned} - spent {spent}"
    )]
    BalanceMismatch { balance: i64, earned: i64, spent: i64 },

    #[error("Ledger snapshot has negative counters")]
    NegativeCounters,

    #[error("Ledger snapshot has level {0}, outside 1..=MAX_LEVEL")]
    InvalidLevel(u32),

    #[error(transparent)]
    Skill(#[from] SkillTreeError),

    #[error("Skill '{0}' is recorded as unlocked but a dependency is still locked")]
    LockedDependency(String),

    #[error("Quest id '{0}' appears more than once in the snapshot")]
    DuplicateQuest(String),
}
