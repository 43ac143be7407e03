//! Quest Evaluator
//!
//! Recomputes quest progress from a metrics snapshot and settles rewards.
//! Refreshing is pure: it returns updated quests and touches nothing else.

use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use super::definition::{Difficulty, Quest, QuestProgress, Tracking};
use super::metrics::MetricsSnapshot;
use crate::ledger::{Ledger, source};

/// Result of evaluating one quest against a snapshot
enum Evaluation {
    Measured { progress: QuestProgress, satisfied: bool },
    /// Data for this quest is missing from the snapshot
    Unchanged,
    Unrecognized,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RefreshOutcome {
    pub quests: Vec<Quest>,
    pub newly_completed: Vec<String>,
    /// Maintenance quests that dropped back to incomplete
    pub reverted: Vec<String>,
    /// Quests whose tracking type is unknown; left untouched
    pub unrecognized: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    Claimed,
    NotCompleted,
    AlreadyClaimed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClaimOutcome {
    pub success: bool,
    pub message: String,
    pub status: ClaimStatus,
}

#[derive(Debug, Clone)]
pub struct QuestEvaluator {
    default_window_days: i64,
}

impl Default for QuestEvaluator {
    fn default() -> Self {
        Self::new(30)
    }
}

impl QuestEvaluator {
    pub fn new(default_window_days: i64) -> Self {
        Self { default_window_days }
    }

    pub fn refresh(&self, quests: &[Quest], metrics: &MetricsSnapshot) -> RefreshOutcome {
        let mut outcome = RefreshOutcome::default();

        for quest in quests {
            let mut updated = quest.clone();
            match self.evaluate(quest, metrics) {
                Evaluation::Measured { progress, satisfied } => {
                    updated.progress = progress;
                    let was_completed = quest.is_completed;
                    updated.is_completed = if quest.maintenance {
                        satisfied
                    } else {
                        was_completed || satisfied
                    };

                    if !was_completed && updated.is_completed {
                        outcome.newly_completed.push(quest.id.clone());
                    } else if was_completed && !updated.is_completed {
                        info!("Maintenance quest {} dropped below its threshold", quest.id);
                        outcome.reverted.push(quest.id.clone());
                    }
                }
                Evaluation::Unchanged => {
                    debug!("No metric data for quest {}, progress unchanged", quest.id);
                }
                Evaluation::Unrecognized => {
                    warn!("Quest {} has an unrecognized tracking type, skipping", quest.id);
                    outcome.unrecognized.push(quest.id.clone());
                }
            }
            outcome.quests.push(updated);
        }

        if !outcome.newly_completed.is_empty() {
            info!("Quests completed this refresh: {}", outcome.newly_completed.join(", "));
        }
        outcome
    }

    fn evaluate(&self, quest: &Quest, metrics: &MetricsSnapshot) -> Evaluation {
        let measured = |current: i64, target: i64, satisfied: bool| Evaluation::Measured {
            progress: QuestProgress::new(current, target),
            satisfied,
        };

        match &quest.tracking {
            Tracking::BalanceTarget { target } => {
                let current = metrics.total_balance;
                measured(current, *target, current >= *target)
            }
            Tracking::SpendingLimit { limit, keywords } => {
                let current = if keywords.is_empty() {
                    metrics.monthly_spending
                } else {
                    metrics.spending_matching(keywords, self.default_window_days)
                };
                measured(current, *limit, current <= *limit)
            }
            Tracking::TransactionCount {
                target,
                window_days,
                keywords,
            } => {
                let days = window_days.unwrap_or(self.default_window_days);
                let current = metrics.count_matching(keywords, days);
                measured(current, *target, current >= *target)
            }
            Tracking::SavingsGoal { account_no, target } => {
                match metrics.savings_account(account_no) {
                    Some(account) => {
                        measured(account.balance, *target, account.balance >= *target)
                    }
                    None => Evaluation::Unchanged,
                }
            }
            Tracking::AmountThreshold { metric, minimum } => {
                let current = metrics.threshold_value(*metric);
                measured(current, *minimum, current >= *minimum)
            }
            Tracking::AcademicCount { counter, target } => {
                let current = metrics.academic_count(*counter);
                measured(current, *target, current >= *target)
            }
            Tracking::Unrecognized => Evaluation::Unrecognized,
        }
    }
}

/// Pay out a completed quest once. The quest is marked claimed before the
/// ledger is credited.
pub fn claim_reward(quest: &mut Quest, ledger: &mut Ledger) -> ClaimOutcome {
    if !quest.is_completed {
        return ClaimOutcome {
            success: false,
            message: "Quest is not completed yet".to_string(),
            status: ClaimStatus::NotCompleted,
        };
    }
    if quest.is_claimed {
        return ClaimOutcome {
            success: false,
            message: "Reward already claimed".to_string(),
            status: ClaimStatus::AlreadyClaimed,
        };
    }

    quest.is_claimed = true;
    ledger.earn(quest.reward.credo, source::QUEST_COMPLETE, &quest.title);
    info!("Quest reward claimed: {} (+{} Credo)", quest.id, quest.reward.credo);

    ClaimOutcome {
        success: true,
        message: format!(
            "Earned {} Credo and {} credits",
            quest.reward.credo, quest.reward.credits
        ),
        status: ClaimStatus::Claimed,
    }
}

/// Active quests that are not yet completed
pub fn active_quests(quests: &[Quest]) -> Vec<&Quest> {
    quests.iter().filter(|q| q.is_active && !q.is_completed).collect()
}

pub fn completed_quests(quests: &[Quest]) -> Vec<&Quest> {
    quests.iter().filter(|q| q.is_completed).collect()
}

pub fn by_difficulty(quests: &[Quest]) -> BTreeMap<Difficulty, Vec<&Quest>> {
    let mut grouped: BTreeMap<Difficulty, Vec<&Quest>> = BTreeMap::new();
    for quest in quests {
        grouped.entry(quest.difficulty).or_default().push(quest);
    }
    grouped
}
