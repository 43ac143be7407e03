//! Credo progression engine: a Credo ledger with levels, dependency-gated
//! skill trees and quests evaluated against external metrics.

pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod ledger;
pub mod quest;
pub mod skill_tree;

pub use config::EngineConfig;
pub use engine::{EngineSnapshot, ProgressionEngine, load_skill_tree};
pub use error::{ConfigError, SkillTreeError, SnapshotError};
pub use events::{Event, EventBus, Publisher, Subscriber, SubscriptionId, Topic};
pub use ledger::{CredoSummary, Ledger, LedgerSnapshot, Transaction, TransactionKind};
