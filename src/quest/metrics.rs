//! Metrics Snapshot
//!
//! Already-computed financial and academic figures supplied by the host on
//! each refresh. The engine only reads them.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::definition::{AcademicCounter, ThresholdMetric};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionDirection {
    Deposit,
    Withdrawal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricTransaction {
    pub timestamp: DateTime<Utc>,
    pub amount: i64,
    #[serde(default)]
    pub summary: String,
    pub direction: TransactionDirection,
}

impl MetricTransaction {
    /// Case-insensitive; an empty keyword list matches everything
    pub fn matches_any(&self, keywords: &[String]) -> bool {
        if keywords.is_empty() {
            return true;
        }
        let summary = self.summary.to_lowercase();
        keywords.iter().any(|k| summary.contains(&k.to_lowercase()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavingsAccount {
    pub account_no: String,
    #[serde(default)]
    pub product_name: String,
    pub balance: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AcademicRecord {
    #[serde(default)]
    pub attendance_rate: f64,
    #[serde(default)]
    pub completed_assignments: i64,
    #[serde(default)]
    pub total_assignments: i64,
    #[serde(default)]
    pub solved_problems: i64,
    #[serde(default)]
    pub completed_credits: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Reference time for transaction windows
    #[serde(default = "Utc::now")]
    pub as_of: DateTime<Utc>,
    #[serde(default)]
    pub total_balance: i64,
    #[serde(default)]
    pub monthly_income: i64,
    #[serde(default)]
    pub monthly_spending: i64,
    #[serde(default)]
    pub credit_score: i64,
    #[serde(default)]
    pub credit_grade: String,
    #[serde(default)]
    pub transactions: Vec<MetricTransaction>,
    #[serde(default)]
    pub savings_accounts: Vec<SavingsAccount>,
    #[serde(default)]
    pub academic: AcademicRecord,
}

impl Default for MetricsSnapshot {
    fn default() -> Self {
        Self {
            as_of: Utc::now(),
            total_balance: 0,
            monthly_income: 0,
            monthly_spending: 0,
            credit_score: 0,
            credit_grade: String::new(),
            transactions: Vec::new(),
            savings_accounts: Vec::new(),
            academic: AcademicRecord::default(),
        }
    }
}

impl MetricsSnapshot {
    /// Transactions in `(as_of - days, as_of]`
    pub fn transactions_within(&self, days: i64) -> impl Iterator<Item = &MetricTransaction> {
        let from = self.as_of - Duration::days(days);
        let to = self.as_of;
        self.transactions
            .iter()
            .filter(move |t| t.timestamp > from && t.timestamp <= to)
    }

    pub fn count_matching(&self, keywords: &[String], days: i64) -> i64 {
        self.transactions_within(days)
            .filter(|t| t.matches_any(keywords))
            .count() as i64
    }

    /// Sum of matching withdrawals in the window
    pub fn spending_matching(&self, keywords: &[String], days: i64) -> i64 {
        self.transactions_within(days)
            .filter(|t| t.direction == TransactionDirection::Withdrawal && t.matches_any(keywords))
            .map(|t| t.amount.abs())
            .sum()
    }

    pub fn savings_account(&self, account_no: &str) -> Option<&SavingsAccount> {
        self.savings_accounts.iter().find(|a| a.account_no == account_no)
    }

    pub fn threshold_value(&self, metric: ThresholdMetric) -> i64 {
        match metric {
            ThresholdMetric::CreditScore => self.credit_score,
            ThresholdMetric::TotalBalance => self.total_balance,
            ThresholdMetric::AttendanceRate => self.academic.attendance_rate.floor() as i64,
            ThresholdMetric::CompletedAssignments => self.academic.completed_assignments,
            ThresholdMetric::SolvedProblems => self.academic.solved_problems,
        }
    }

    pub fn academic_count(&self, counter: AcademicCounter) -> i64 {
        match counter {
            AcademicCounter::SolvedProblems => self.academic.solved_problems,
            AcademicCounter::CompletedAssignments => self.academic.completed_assignments,
            AcademicCounter::CompletedCredits => self.academic.completed_credits,
        }
    }
}
