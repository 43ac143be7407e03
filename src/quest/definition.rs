//! Quest Definition Structures
//!
//! Quests are goals over an external metric. The tracking rule is a closed
//! enum; its parameters travel with the variant.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::skill_tree::Domain;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestCategory {
    Financial,
    Academic,
    Lifestyle,
    Social,
}

impl QuestCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestCategory::Financial => "financial",
            QuestCategory::Academic => "academic",
            QuestCategory::Lifestyle => "lifestyle",
            QuestCategory::Social => "social",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "easy" => Some(Difficulty::Easy),
            "medium" => Some(Difficulty::Medium),
            "hard" => Some(Difficulty::Hard),
            _ => None,
        }
    }
}

/// Metric read by an `AmountThreshold` quest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdMetric {
    CreditScore,
    TotalBalance,
    /// Attendance percentage, compared after truncation
    AttendanceRate,
    CompletedAssignments,
    SolvedProblems,
}

/// Academic record counter read by an `AcademicCount` quest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcademicCounter {
    SolvedProblems,
    CompletedAssignments,
    CompletedCredits,
}

/// How a quest derives its progress from a metrics snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Tracking {
    /// Number of transactions in the window, optionally filtered by summary
    TransactionCount {
        target: i64,
        #[serde(default)]
        window_days: Option<i64>,
        #[serde(default)]
        keywords: Vec<String>,
    },
    /// Stay at or above a minimum. Usually a maintenance quest.
    AmountThreshold { metric: ThresholdMetric, minimum: i64 },
    BalanceTarget { target: i64 },
    SavingsGoal { account_no: String, target: i64 },
    /// Lower is success
    SpendingLimit {
        limit: i64,
        #[serde(default)]
        keywords: Vec<String>,
    },
    AcademicCount { counter: AcademicCounter, target: i64 },
    /// Tracking type this version does not know
    #[serde(other)]
    Unrecognized,
}

impl Tracking {
    pub fn type_name(&self) -> &'static str {
        match self {
            Tracking::TransactionCount { .. } => "transactionCount",
            Tracking::AmountThreshold { .. } => "amountThreshold",
            Tracking::BalanceTarget { .. } => "balanceTarget",
            Tracking::SavingsGoal { .. } => "savingsGoal",
            Tracking::SpendingLimit { .. } => "spendingLimit",
            Tracking::AcademicCount { .. } => "academicCount",
            Tracking::Unrecognized => "unrecognized",
        }
    }

    /// The threshold progress is measured against
    pub fn target(&self) -> i64 {
        match self {
            Tracking::TransactionCount { target, .. }
            | Tracking::BalanceTarget { target }
            | Tracking::SavingsGoal { target, .. }
            | Tracking::AcademicCount { target, .. } => *target,
            Tracking::AmountThreshold { minimum, .. } => *minimum,
            Tracking::SpendingLimit { limit, .. } => *limit,
            Tracking::Unrecognized => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestProgress {
    pub current: i64,
    pub target: i64,
    /// `current / target * 100`, clamped to [0, 100]
    pub percentage: f64,
}

impl QuestProgress {
    pub fn new(current: i64, target: i64) -> Self {
        Self {
            current,
            target,
            percentage: percentage(current, target),
        }
    }
}

/// A non-positive target counts as fully reached
pub fn percentage(current: i64, target: i64) -> f64 {
    if target <= 0 {
        return 100.0;
    }
    (current as f64 / target as f64 * 100.0).clamp(0.0, 100.0)
}

/// Skill progress granted when a quest reward is claimed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillGrant {
    pub domain: Domain,
    pub category: String,
    pub skill: String,
    pub amount: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestReward {
    #[serde(default)]
    pub credo: i64,
    #[serde(default)]
    pub credits: i64,
    /// Display tag of the skill area the quest trains
    #[serde(default)]
    pub skill_tag: String,
    #[serde(default)]
    pub skill_progress: Option<SkillGrant>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quest {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub category: QuestCategory,
    pub difficulty: Difficulty,
    pub tracking: Tracking,
    pub progress: QuestProgress,
    #[serde(default)]
    pub is_completed: bool,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub is_claimed: bool,
    /// Completion follows the metric both ways instead of latching
    #[serde(default)]
    pub maintenance: bool,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reward: QuestReward,
}

impl Quest {
    /// An active, incomplete quest with zero progress toward its target
    pub fn new(
        id: &str,
        title: &str,
        category: QuestCategory,
        difficulty: Difficulty,
        tracking: Tracking,
        reward: QuestReward,
    ) -> Self {
        let target = tracking.target();
        Self {
            id: id.to_string(),
            title: title.to_string(),
            description: String::new(),
            category,
            difficulty,
            tracking,
            progress: QuestProgress::new(0, target),
            is_completed: false,
            is_active: true,
            is_claimed: false,
            maintenance: false,
            deadline: None,
            reward,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn as_maintenance(mut self) -> Self {
        self.maintenance = true;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    pub fn claimable(&self) -> bool {
        self.is_completed && !self.is_claimed
    }
}
