//! Credo ledger.
//!
//! Holds the Credo balance, earn/spend history and the level derived from
//! the balance. Level `n + 1` is reached once the balance covers
//! `n * credo_per_level`, so with a cost of 100 a balance of 250 is level 3.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::SnapshotError;
use crate::events::{Event, Publisher};

/// Well-known transaction source tags
pub mod source {
    pub const CHARACTER_TOUCH: &str = "character_touch";
    pub const SKILL_UNLOCK: &str = "skill_unlock";
    pub const QUEST_COMPLETE: &str = "quest_complete";
    pub const AI_FEED: &str = "ai_feed";
}

/// Level cap; balances beyond `MAX_LEVEL * credo_per_level` stay at the cap
pub const MAX_LEVEL: u32 = 10_000;

/// Balance needed to advance past `level`
pub fn required_for_level(level: u32, credo_per_level: i64) -> i64 {
    (level as i64).saturating_mul(credo_per_level)
}

/// Highest level a balance justifies, capped at `MAX_LEVEL`
pub fn level_for_balance(balance: i64, credo_per_level: i64) -> u32 {
    if balance <= 0 || credo_per_level <= 0 {
        return 1;
    }
    u32::try_from(balance / credo_per_level)
        .unwrap_or(u32::MAX)
        .saturating_add(1)
        .min(MAX_LEVEL)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Earn,
    Spend,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Earn => "earn",
            TransactionKind::Spend => "spend",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub kind: TransactionKind,
    pub amount: i64,
    pub source: String,
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

/// Full ledger state, as published on `credoChanged` and handed to the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub balance: i64,
    pub total_earned: i64,
    pub total_spent: i64,
    pub level: u32,
    /// Newest first
    pub transactions: Vec<Transaction>,
}

impl Default for LedgerSnapshot {
    fn default() -> Self {
        Self {
            balance: 0,
            total_earned: 0,
            total_spent: 0,
            level: 1,
            transactions: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CredoSummary {
    pub current_level: u32,
    pub current_credo: i64,
    pub next_level_credo: i64,
    pub progress: f64,
    pub total_earned: i64,
    pub total_spent: i64,
}

pub struct Ledger {
    credo_per_level: i64,
    balance: i64,
    total_earned: i64,
    total_spent: i64,
    level: u32,
    transactions: VecDeque<Transaction>,
    publisher: Arc<dyn Publisher>,
}

impl Ledger {
    pub fn new(credo_per_level: i64, publisher: Arc<dyn Publisher>) -> Self {
        Self {
            credo_per_level,
            balance: 0,
            total_earned: 0,
            total_spent: 0,
            level: 1,
            transactions: VecDeque::new(),
            publisher,
        }
    }

    /// Rebuild a ledger from a persisted snapshot
    pub fn from_snapshot(
        credo_per_level: i64,
        snapshot: LedgerSnapshot,
        publisher: Arc<dyn Publisher>,
    ) -> Result<Self, SnapshotError> {
        if snapshot.balance < 0 || snapshot.total_earned < 0 || snapshot.total_spent < 0 {
            return Err(SnapshotError::NegativeCounters);
        }
        if snapshot.balance != snapshot.total_earned - snapshot.total_spent {
            return Err(SnapshotError::BalanceMismatch {
                balance: snapshot.balance,
                earned: snapshot.total_earned,
                spent: snapshot.total_spent,
            });
        }
        if snapshot.level < 1 || snapshot.level > MAX_LEVEL {
            return Err(SnapshotError::InvalidLevel(snapshot.level));
        }

        Ok(Self {
            credo_per_level,
            balance: snapshot.balance,
            total_earned: snapshot.total_earned,
            total_spent: snapshot.total_spent,
            level: snapshot.level,
            transactions: snapshot.transactions.into(),
            publisher,
        })
    }

    pub fn balance(&self) -> i64 {
        self.balance
    }

    pub fn total_earned(&self) -> i64 {
        self.total_earned
    }

    pub fn total_spent(&self) -> i64 {
        self.total_spent
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn credo_per_level(&self) -> i64 {
        self.credo_per_level
    }

    pub fn transactions(&self) -> impl Iterator<Item = &Transaction> {
        self.transactions.iter()
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            balance: self.balance,
            total_earned: self.total_earned,
            total_spent: self.total_spent,
            level: self.level,
            transactions: self.transactions.iter().cloned().collect(),
        }
    }

    /// Add Credo. Returns false (and changes nothing) for a non-positive
    /// amount or one that would overflow the counters.
    pub fn earn(&mut self, amount: i64, source: &str, description: &str) -> bool {
        if amount <= 0 {
            debug!("Rejected earn of {} from {}", amount, source);
            return false;
        }
        let (Some(balance), Some(total_earned)) = (
            self.balance.checked_add(amount),
            self.total_earned.checked_add(amount),
        ) else {
            warn!("Rejected earn of {} from {}: counter overflow", amount, source);
            return false;
        };

        self.record(TransactionKind::Earn, amount, source, description);
        self.total_earned = total_earned;
        self.balance = balance;
        info!("Credo earned: +{} ({}) - {}", amount, source, description);

        // One levelUp per level gained, each after the level is applied
        let target = level_for_balance(self.balance, self.credo_per_level);
        while self.level < target {
            self.level += 1;
            info!("Level up! Reached level {}", self.level);
            self.publisher.publish(Event::LevelUp {
                new_level: self.level,
                required_credo: self.credo_for_next_level(),
            });
        }

        self.publisher.publish(Event::CredoChanged(self.snapshot()));
        self.publisher.publish(Event::CredoEarned {
            amount,
            source: source.to_string(),
            description: description.to_string(),
        });
        true
    }

    /// Remove Credo. Rejects non-positive amounts and amounts above the balance.
    pub fn spend(&mut self, amount: i64, source: &str, description: &str) -> bool {
        if amount <= 0 || amount > self.balance {
            debug!(
                "Rejected spend of {} for {} (balance {})",
                amount, source, self.balance
            );
            return false;
        }

        self.record(TransactionKind::Spend, amount, source, description);
        self.total_spent = self.total_spent.saturating_add(amount);
        self.balance -= amount;
        info!("Credo spent: -{} ({}) - {}", amount, source, description);

        self.publisher.publish(Event::CredoChanged(self.snapshot()));
        self.publisher.publish(Event::CredoSpent {
            amount,
            source: source.to_string(),
            description: description.to_string(),
        });
        true
    }

    fn record(&mut self, kind: TransactionKind, amount: i64, source: &str, description: &str) {
        self.transactions.push_front(Transaction {
            id: format!("credo_{}", Uuid::new_v4().simple()),
            kind,
            amount,
            source: source.to_string(),
            description: description.to_string(),
            timestamp: Utc::now(),
        });
    }

    /// Operator reset back to the initial state
    pub fn reset(&mut self) {
        self.balance = 0;
        self.total_earned = 0;
        self.total_spent = 0;
        self.level = 1;
        self.transactions.clear();
        info!("Credo ledger reset");
        self.publisher.publish(Event::CredoChanged(self.snapshot()));
    }

    pub fn credo_for_next_level(&self) -> i64 {
        required_for_level(self.level, self.credo_per_level)
    }

    /// Progress toward the next level, 0.0 to 100.0
    pub fn level_progress(&self) -> f64 {
        let level_floor = required_for_level(self.level - 1, self.credo_per_level);
        let in_level = self.balance.saturating_sub(level_floor);
        (in_level as f64 / self.credo_per_level as f64 * 100.0).clamp(0.0, 100.0)
    }

    pub fn has_enough(&self, amount: i64) -> bool {
        self.balance >= amount
    }

    /// Total earned from one source tag
    pub fn total_from_source(&self, source: &str) -> i64 {
        self.transactions
            .iter()
            .filter(|t| t.kind == TransactionKind::Earn && t.source == source)
            .map(|t| t.amount)
            .sum()
    }

    pub fn recent_transactions(&self, limit: usize) -> Vec<Transaction> {
        self.transactions.iter().take(limit).cloned().collect()
    }

    pub fn summary(&self) -> CredoSummary {
        CredoSummary {
            current_level: self.level,
            current_credo: self.balance,
            next_level_credo: self.credo_for_next_level(),
            progress: self.level_progress(),
            total_earned: self.total_earned,
            total_spent: self.total_spent,
        }
    }

    /// Plain-text history, newest first
    pub fn export_history(&self) -> String {
        let lines: Vec<String> = self
            .transactions
            .iter()
            .map(|t| {
                let sign = match t.kind {
                    TransactionKind::Earn => '+',
                    TransactionKind::Spend => '-',
                };
                format!(
                    "{} | {}{} | {} | {}",
                    t.timestamp.to_rfc3339(),
                    sign,
                    t.amount,
                    t.source,
                    t.description
                )
            })
            .collect();
        format!("Credo transaction history\n{}\n{}", "=".repeat(50), lines.join("\n"))
    }
}
