//! Quest Generator
//!
//! Builds personalized quests from a metrics snapshot and suggests optional
//! ones from spending patterns. Generated quests start at zero progress; the
//! evaluator fills them in on the next refresh.

use std::collections::HashSet;
use tracing::{debug, info};

use super::definition::{
    AcademicCounter, Difficulty, Quest, QuestCategory, QuestReward, SkillGrant, ThresholdMetric,
    Tracking,
};
use super::metrics::MetricsSnapshot;
use crate::skill_tree::Domain;

const BALANCE_STEP: i64 = 100_000;
const CAFE_SPENDING_LIMIT: i64 = 50_000;
const CAFE_KEYWORDS: &[&str] = &["cafe", "coffee", "카페", "커피"];
const SAVINGS_KEYWORDS: &[&str] = &["savings", "적금", "저축"];

fn keywords(words: &[&str]) -> Vec<String> {
    words.iter().map(|w| w.to_string()).collect()
}

fn reward(credo: i64, credits: i64, skill_tag: &str, grant: Option<SkillGrant>) -> QuestReward {
    QuestReward {
        credo,
        credits,
        skill_tag: skill_tag.to_string(),
        skill_progress: grant,
    }
}

fn grant(domain: Domain, category: &str, skill: &str) -> Option<SkillGrant> {
    Some(SkillGrant {
        domain,
        category: category.to_string(),
        skill: skill.to_string(),
        amount: 1,
    })
}

/// Current balance plus 10%, rounded up to the next 100,000
pub fn balance_goal(balance: i64) -> i64 {
    let raised = (balance.max(0) * 11 + 9) / 10;
    let goal = (raised + BALANCE_STEP - 1) / BALANCE_STEP * BALANCE_STEP;
    goal.max(BALANCE_STEP)
}

/// 70% of monthly income
pub fn spending_cap(monthly_income: i64) -> i64 {
    monthly_income.max(0) * 7 / 10
}

/// Personalized quest set for one snapshot
pub fn generate_quests(metrics: &MetricsSnapshot) -> Vec<Quest> {
    let mut quests = Vec::new();

    let goal = balance_goal(metrics.total_balance);
    quests.push(
        Quest::new(
            "savings_goal_1",
            "Savings Master",
            QuestCategory::Financial,
            Difficulty::Medium,
            Tracking::BalanceTarget { target: goal },
            reward(
                100,
                200,
                "financial_management",
                grant(Domain::Financial, "consumptionSavings", "saving_habit"),
            ),
        )
        .with_description(format!("Grow your balance to {}", goal)),
    );

    let cap = spending_cap(metrics.monthly_income);
    quests.push(
        Quest::new(
            "spending_control_1",
            "Spending Control",
            QuestCategory::Financial,
            Difficulty::Hard,
            Tracking::SpendingLimit {
                limit: cap,
                keywords: Vec::new(),
            },
            reward(
                150,
                300,
                "financial_management",
                grant(Domain::Financial, "consumptionSavings", "budget_management"),
            ),
        )
        .with_description(format!("Keep this month's spending at or below {}", cap)),
    );

    quests.push(
        Quest::new(
            "transaction_activity_1",
            "Active Banking",
            QuestCategory::Financial,
            Difficulty::Easy,
            Tracking::TransactionCount {
                target: 10,
                window_days: Some(30),
                keywords: Vec::new(),
            },
            reward(50, 100, "financial_management", None),
        )
        .with_description("Make at least 10 transactions in the last 30 days"),
    );

    if let Some(account) = metrics.savings_accounts.first() {
        let target = (account.balance.max(0) * 6 + 4) / 5;
        quests.push(
            Quest::new(
                "savings_growth_1",
                "Savings Challenge",
                QuestCategory::Financial,
                Difficulty::Medium,
                Tracking::SavingsGoal {
                    account_no: account.account_no.clone(),
                    target,
                },
                reward(
                    200,
                    400,
                    "financial_management",
                    grant(Domain::Financial, "consumptionSavings", "saving_habit"),
                ),
            )
            .with_description(format!("Grow {} to {}", account.product_name, target)),
        );
    }

    quests.push(
        Quest::new(
            "credit_maintain_1",
            "Guard Your Credit",
            QuestCategory::Financial,
            Difficulty::Easy,
            Tracking::AmountThreshold {
                metric: ThresholdMetric::CreditScore,
                minimum: metrics.credit_score - 50,
            },
            reward(
                75,
                150,
                "financial_management",
                grant(Domain::Financial, "investmentCredit", "credit_management"),
            ),
        )
        .with_description(format!("Hold credit grade '{}' or better", metrics.credit_grade))
        .as_maintenance(),
    );

    quests.push(
        Quest::new(
            "academic_coding_1",
            "Coding Practice",
            QuestCategory::Academic,
            Difficulty::Medium,
            Tracking::AcademicCount {
                counter: AcademicCounter::SolvedProblems,
                target: 5,
            },
            reward(
                100,
                200,
                "academics",
                grant(Domain::Academic, "selfDirectedLearning", "coding_practice"),
            ),
        )
        .with_description("Solve 5 algorithm problems"),
    );

    debug!("Generated {} personalized quests", quests.len());
    quests
}

/// Optional quests proposed from transaction patterns. They start inactive.
pub fn suggest_quests(metrics: &MetricsSnapshot) -> Vec<Quest> {
    let mut suggestions = Vec::new();
    let cafe = keywords(CAFE_KEYWORDS);
    let savings = keywords(SAVINGS_KEYWORDS);

    let cafe_count = metrics.transactions.iter().filter(|t| t.matches_any(&cafe)).count();
    if cafe_count >= 3 {
        suggestions.push(
            Quest::new(
                "cafe_limit_suggestion",
                "Cut Back on Cafes",
                QuestCategory::Financial,
                Difficulty::Easy,
                Tracking::SpendingLimit {
                    limit: CAFE_SPENDING_LIMIT,
                    keywords: cafe,
                },
                reward(
                    75,
                    150,
                    "financial_management",
                    grant(Domain::Financial, "consumptionSavings", "budget_management"),
                ),
            )
            .with_description(format!(
                "Keep cafe spending at or below {} this month",
                CAFE_SPENDING_LIMIT
            ))
            .inactive(),
        );
    }

    if !metrics.transactions.iter().any(|t| t.matches_any(&savings)) {
        suggestions.push(
            Quest::new(
                "start_savings_suggestion",
                "Build a Savings Habit",
                QuestCategory::Financial,
                Difficulty::Medium,
                Tracking::TransactionCount {
                    target: 4,
                    window_days: Some(28),
                    keywords: savings,
                },
                reward(
                    100,
                    200,
                    "financial_management",
                    grant(Domain::Financial, "consumptionSavings", "saving_habit"),
                ),
            )
            .with_description("Make a savings deposit every week for 4 weeks")
            .inactive(),
        );
    }

    suggestions
}

/// Append generated quests whose ids are new. Existing quests keep their
/// state, including completion and claims.
pub fn merge_quests(existing: Vec<Quest>, generated: Vec<Quest>) -> Vec<Quest> {
    let mut seen: HashSet<String> = existing.iter().map(|q| q.id.clone()).collect();
    let mut merged = existing;
    let mut added = 0;
    for quest in generated {
        if seen.insert(quest.id.clone()) {
            merged.push(quest);
            added += 1;
        }
    }
    if added > 0 {
        info!("Added {} new quest(s), {} total", added, merged.len());
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quest::metrics::{MetricTransaction, SavingsAccount, TransactionDirection};
    use chrono::{Duration, Utc};

    fn sample() -> MetricsSnapshot {
        MetricsSnapshot {
            total_balance: 1_000_000,
            monthly_income: 2_000_000,
            monthly_spending: 1_500_000,
            credit_score: 820,
            credit_grade: "2".to_string(),
            savings_accounts: vec![SavingsAccount {
                account_no: "SAV-1".to_string(),
                product_name: "Youth Savings".to_string(),
                balance: 500_000,
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_balance_goal_rounding() {
        assert_eq!(balance_goal(1_000_000), 1_100_000);
        assert_eq!(balance_goal(1_234_567), 1_400_000);
        assert_eq!(balance_goal(0), 100_000);
        assert_eq!(spending_cap(2_000_000), 1_400_000);
    }

    #[test]
    fn test_generate_personalized_set() {
        let quests = generate_quests(&sample());
        let ids: Vec<&str> = quests.iter().map(|q| q.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "savings_goal_1",
                "spending_control_1",
                "transaction_activity_1",
                "savings_growth_1",
                "credit_maintain_1",
                "academic_coding_1"
            ]
        );

        let credit = &quests[4];
        assert!(credit.maintenance);
        assert_eq!(credit.tracking.target(), 770);
        assert_eq!(quests[3].tracking.target(), 600_000);
        assert!(quests.iter().filter(|q| q.id != "credit_maintain_1").all(|q| !q.maintenance));
        assert!(quests.iter().all(|q| q.is_active && !q.is_completed));
    }

    #[test]
    fn test_no_savings_account_no_growth_quest() {
        let mut metrics = sample();
        metrics.savings_accounts.clear();
        assert!(generate_quests(&metrics).iter().all(|q| q.id != "savings_growth_1"));
    }

    #[test]
    fn test_suggestions_from_patterns() {
        let now = Utc::now();
        let tx = |summary: &str| MetricTransaction {
            timestamp: now - Duration::days(1),
            amount: 5_000,
            summary: summary.to_string(),
            direction: TransactionDirection::Withdrawal,
        };
        let mut metrics = MetricsSnapshot {
            as_of: now,
            transactions: vec![tx("Cafe A"), tx("coffee bean"), tx("카페 B")],
            ..Default::default()
        };

        let ids: Vec<String> = suggest_quests(&metrics).into_iter().map(|q| q.id).collect();
        assert_eq!(ids, vec!["cafe_limit_suggestion", "start_savings_suggestion"]);
        assert!(suggest_quests(&metrics).iter().all(|q| !q.is_active));

        metrics.transactions.push(tx("적금 납입"));
        metrics.transactions.remove(0);
        assert!(suggest_quests(&metrics).is_empty());
    }

    #[test]
    fn test_merge_preserves_existing_state() {
        let mut existing = generate_quests(&sample());
        existing[0].is_completed = true;
        existing[0].is_claimed = true;
        existing.truncate(2);

        let merged = merge_quests(existing, generate_quests(&sample()));
        assert_eq!(merged.len(), 6);
        assert!(merged[0].is_completed && merged[0].is_claimed);
        assert_eq!(merged.iter().filter(|q| q.id == "savings_goal_1").count(), 1);
    }
}
