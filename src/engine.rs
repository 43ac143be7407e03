//! Progression Engine
//!
//! Composition point for the ledger, the skill graph and the quest list.
//! One async mutex serializes every operation, so concurrent callers can
//! never interleave a balance update or double-unlock a skill.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::error::{ConfigError, SkillTreeError, SnapshotError};
use crate::events::{Event, EventBus, Publisher, Subscriber, SubscriptionId, Topic};
use crate::ledger::{CredoSummary, Ledger, LedgerSnapshot, Transaction};
use crate::quest::{
    self, ClaimOutcome, ClaimStatus, Difficulty, MetricsSnapshot, Quest, QuestEvaluator,
    RefreshOutcome,
};
use crate::skill_tree::{
    CategoryProgress, Domain, OverallProgress, ProgressOutcome, SkillGraph, SkillNode,
    SkillProgressSnapshot, SkillRegistry, SkillReward, SkillTree,
};

/// Everything the host needs to persist between sessions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub ledger: LedgerSnapshot,
    pub skills: SkillProgressSnapshot,
    #[serde(default)]
    pub quests: Vec<Quest>,
}

impl EngineSnapshot {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

struct EngineState {
    ledger: Ledger,
    skills: SkillGraph,
    quests: Vec<Quest>,
}

pub struct ProgressionEngine {
    config: EngineConfig,
    bus: Arc<EventBus>,
    evaluator: QuestEvaluator,
    state: Mutex<EngineState>,
}

/// Load the topology named by the config, or the embedded catalog
pub fn load_skill_tree(config: &EngineConfig) -> Result<SkillTree, ConfigError> {
    match &config.skill_data_dir {
        Some(dir) => {
            let mut registry = SkillRegistry::new();
            registry.load_from_directory(dir)?;
            registry.build()
        }
        None => SkillRegistry::embedded()?.build(),
    }
}

impl ProgressionEngine {
    pub fn new(config: EngineConfig, tree: SkillTree) -> Self {
        let bus = Arc::new(EventBus::new());
        let publisher: Arc<dyn Publisher> = bus.clone();
        let ledger = Ledger::new(config.credo_per_level, publisher.clone());
        let skills = SkillGraph::new(tree, publisher);
        Self::assemble(config, bus, ledger, skills, Vec::new())
    }

    /// Validate the config and load its skill topology
    pub fn from_config(config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let tree = load_skill_tree(&config)?;
        Ok(Self::new(config, tree))
    }

    /// Rebuild from a persisted snapshot. Restoring issues no rewards and
    /// publishes no events.
    pub fn restore(
        config: EngineConfig,
        tree: SkillTree,
        snapshot: EngineSnapshot,
    ) -> Result<Self, SnapshotError> {
        let mut seen = HashSet::new();
        if let Some(dup) = snapshot.quests.iter().find(|q| !seen.insert(q.id.as_str())) {
            return Err(SnapshotError::DuplicateQuest(dup.id.clone()));
        }

        let bus = Arc::new(EventBus::new());
        let publisher: Arc<dyn Publisher> = bus.clone();
        let ledger =
            Ledger::from_snapshot(config.credo_per_level, snapshot.ledger, publisher.clone())?;
        let skills = SkillGraph::from_snapshot(tree, &snapshot.skills, publisher)?;
        info!(
            "Restored engine: {} Credo, level {}, {} quest(s)",
            ledger.balance(),
            ledger.level(),
            snapshot.quests.len()
        );
        Ok(Self::assemble(config, bus, ledger, skills, snapshot.quests))
    }

    fn assemble(
        config: EngineConfig,
        bus: Arc<EventBus>,
        ledger: Ledger,
        skills: SkillGraph,
        quests: Vec<Quest>,
    ) -> Self {
        let evaluator = QuestEvaluator::new(config.transaction_window_days);
        Self {
            config,
            bus,
            evaluator,
            state: Mutex::new(EngineState {
                ledger,
                skills,
                quests,
            }),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.bus)
    }

    pub fn subscribe(&self, topic: Topic, handler: Arc<dyn Subscriber>) -> SubscriptionId {
        self.bus.subscribe(topic, handler)
    }

    pub fn unsubscribe(&self, topic: Topic, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(topic, id)
    }

    // ========================================================================
    // Ledger
    // ========================================================================

    pub async fn earn(&self, amount: i64, source: &str, description: &str) -> bool {
        self.state.lock().await.ledger.earn(amount, source, description)
    }

    pub async fn spend(&self, amount: i64, source: &str, description: &str) -> bool {
        self.state.lock().await.ledger.spend(amount, source, description)
    }

    pub async fn reset_ledger(&self) {
        self.state.lock().await.ledger.reset();
    }

    pub async fn balance(&self) -> i64 {
        self.state.lock().await.ledger.balance()
    }

    pub async fn level(&self) -> u32 {
        self.state.lock().await.ledger.level()
    }

    pub async fn level_progress(&self) -> f64 {
        self.state.lock().await.ledger.level_progress()
    }

    pub async fn has_enough(&self, amount: i64) -> bool {
        self.state.lock().await.ledger.has_enough(amount)
    }

    pub async fn total_from_source(&self, source: &str) -> i64 {
        self.state.lock().await.ledger.total_from_source(source)
    }

    pub async fn ledger_summary(&self) -> CredoSummary {
        self.state.lock().await.ledger.summary()
    }

    /// The configured number of newest transactions
    pub async fn recent_transactions(&self) -> Vec<Transaction> {
        let limit = self.config.recent_transactions_limit;
        self.state.lock().await.ledger.recent_transactions(limit)
    }

    pub async fn export_history(&self) -> String {
        self.state.lock().await.ledger.export_history()
    }

    // ========================================================================
    // Skills
    // ========================================================================

    pub async fn update_progress(
        &self,
        domain: Domain,
        category: &str,
        skill_name: &str,
        new_progress: i64,
    ) -> Result<bool, SkillTreeError> {
        let mut state = self.state.lock().await;
        let EngineState { ledger, skills, .. } = &mut *state;
        skills.update_progress(ledger, domain, category, skill_name, new_progress)
    }

    pub async fn apply_progress(
        &self,
        domain: Domain,
        category: &str,
        skill_name: &str,
        new_progress: i64,
    ) -> Result<ProgressOutcome, SkillTreeError> {
        let mut state = self.state.lock().await;
        let EngineState { ledger, skills, .. } = &mut *state;
        skills.apply_progress(ledger, domain, category, skill_name, new_progress)
    }

    pub async fn skill(
        &self,
        domain: Domain,
        category: &str,
        skill_name: &str,
    ) -> Result<SkillNode, SkillTreeError> {
        let state = self.state.lock().await;
        state.skills.get_skill(domain, category, skill_name).cloned()
    }

    pub async fn skill_rewards(
        &self,
        domain: Domain,
        category: &str,
        skill_name: &str,
    ) -> Result<SkillReward, SkillTreeError> {
        let state = self.state.lock().await;
        state.skills.skill_rewards(domain, category, skill_name).cloned()
    }

    pub async fn next_unlockable(
        &self,
        domain: Domain,
        category: &str,
    ) -> Result<Vec<SkillNode>, SkillTreeError> {
        self.state.lock().await.skills.get_next_unlockable(domain, category)
    }

    pub async fn category_progress(
        &self,
        domain: Domain,
        category: &str,
    ) -> Result<CategoryProgress, SkillTreeError> {
        self.state.lock().await.skills.category_progress(domain, category)
    }

    pub async fn domain_progress(&self, domain: Domain) -> Result<f64, SkillTreeError> {
        self.state.lock().await.skills.domain_progress(domain)
    }

    pub async fn overall_progress(&self) -> OverallProgress {
        self.state.lock().await.skills.overall_progress()
    }

    // ========================================================================
    // Quests
    // ========================================================================

    /// Add host-defined quests. Ids already present are ignored.
    pub async fn add_quests(&self, quests: Vec<Quest>) {
        let mut state = self.state.lock().await;
        let existing = std::mem::take(&mut state.quests);
        state.quests = quest::merge_quests(existing, quests);
    }

    /// Regenerate quests from the snapshot, keep existing ones by id, then
    /// re-evaluate every quest.
    pub async fn refresh_quests(&self, metrics: &MetricsSnapshot) -> RefreshOutcome {
        let mut state = self.state.lock().await;

        let mut generated = quest::generate_quests(metrics);
        generated.extend(quest::suggest_quests(metrics));
        let existing = std::mem::take(&mut state.quests);
        let merged = quest::merge_quests(existing, generated);

        let outcome = self.evaluator.refresh(&merged, metrics);
        state.quests = outcome.quests.clone();

        for id in &outcome.newly_completed {
            if let Some(q) = state.quests.iter().find(|q| &q.id == id) {
                self.bus.publish(Event::QuestCompleted {
                    quest_id: q.id.clone(),
                    title: q.title.clone(),
                });
            }
        }
        outcome
    }

    /// Claim a quest reward. `None` if no quest has this id.
    pub async fn claim_quest(&self, quest_id: &str) -> Option<ClaimOutcome> {
        let mut state = self.state.lock().await;
        let EngineState {
            ledger,
            skills,
            quests,
        } = &mut *state;

        let entry = quests.iter_mut().find(|q| q.id == quest_id)?;
        let outcome = quest::claim_reward(entry, ledger);
        if outcome.status != ClaimStatus::Claimed {
            return Some(outcome);
        }

        self.bus.publish(Event::QuestClaimed {
            quest_id: entry.id.clone(),
            credo: entry.reward.credo,
        });

        if let Some(grant) = &entry.reward.skill_progress {
            let current = skills
                .get_skill(grant.domain, &grant.category, &grant.skill)
                .map(|node| node.current_progress as i64);
            let applied = current.and_then(|current| {
                skills.update_progress(
                    ledger,
                    grant.domain,
                    &grant.category,
                    &grant.skill,
                    current + grant.amount,
                )
            });
            if let Err(e) = applied {
                warn!("Quest {} grants progress to a missing skill: {}", entry.id, e);
            }
        }

        Some(outcome)
    }

    /// Mark a suggested quest active. Returns false for unknown ids.
    pub async fn activate_quest(&self, quest_id: &str) -> bool {
        let mut state = self.state.lock().await;
        match state.quests.iter_mut().find(|q| q.id == quest_id) {
            Some(quest) => {
                quest.is_active = true;
                true
            }
            None => false,
        }
    }

    pub async fn quests(&self) -> Vec<Quest> {
        self.state.lock().await.quests.clone()
    }

    pub async fn active_quests(&self) -> Vec<Quest> {
        let state = self.state.lock().await;
        quest::active_quests(&state.quests).into_iter().cloned().collect()
    }

    pub async fn completed_quests(&self) -> Vec<Quest> {
        let state = self.state.lock().await;
        quest::completed_quests(&state.quests).into_iter().cloned().collect()
    }

    pub async fn quests_by_difficulty(&self) -> BTreeMap<Difficulty, Vec<Quest>> {
        let state = self.state.lock().await;
        quest::by_difficulty(&state.quests)
            .into_iter()
            .map(|(difficulty, quests)| (difficulty, quests.into_iter().cloned().collect()))
            .collect()
    }

    pub async fn snapshot(&self) -> EngineSnapshot {
        let state = self.state.lock().await;
        EngineSnapshot {
            ledger: state.ledger.snapshot(),
            skills: state.skills.snapshot(),
            quests: state.quests.clone(),
        }
    }
}
