//! Quest System Module
//!
//! Metric-driven quests: generation from a metrics snapshot, progress
//! evaluation on every refresh, and one-time reward claims.

pub mod definition;
pub mod evaluator;
pub mod generator;
pub mod metrics;

pub use definition::{
    AcademicCounter, Difficulty, Quest, QuestCategory, QuestProgress, QuestReward, SkillGrant,
    ThresholdMetric, Tracking,
};
pub use evaluator::{
    ClaimOutcome, ClaimStatus, QuestEvaluator, RefreshOutcome, active_quests, by_difficulty,
    claim_reward, completed_quests,
};
pub use generator::{generate_quests, merge_quests, suggest_quests};
pub use metrics::{
    AcademicRecord, MetricTransaction, MetricsSnapshot, SavingsAccount, TransactionDirection,
};
