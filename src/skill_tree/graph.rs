//! Skill Graph Engine
//!
//! Applies progress updates to skill nodes, unlocks nodes whose progress is
//! saturated and whose dependencies are unlocked, issues each node's reward
//! through the ledger exactly once, and cascades to dependents.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info};

use super::definition::{Domain, SkillCategory, SkillNode, SkillReward, SkillTree};
use crate::error::{SkillTreeError, SnapshotError};
use crate::events::{Event, Publisher};
use crate::ledger::{Ledger, source};

/// What a single progress update did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressOutcome {
    pub previous_progress: u32,
    pub current_progress: u32,
    /// The targeted node transitioned to unlocked in this call
    pub unlocked_now: bool,
    /// Dependents unlocked by the cascade, in unlock order
    pub cascaded: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryProgress {
    pub unlocked: usize,
    pub total: usize,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverallProgress {
    pub academic: f64,
    pub financial: f64,
    pub total: f64,
}

/// Persisted progress of one node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillProgressRecord {
    pub domain: Domain,
    pub category: String,
    pub skill: String,
    pub current_progress: u32,
    pub is_unlocked: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillProgressSnapshot {
    pub skills: Vec<SkillProgressRecord>,
}

pub struct SkillGraph {
    tree: SkillTree,
    publisher: Arc<dyn Publisher>,
}

impl SkillGraph {
    pub fn new(tree: SkillTree, publisher: Arc<dyn Publisher>) -> Self {
        Self { tree, publisher }
    }

    pub fn tree(&self) -> &SkillTree {
        &self.tree
    }

    pub fn category(
        &self,
        domain: Domain,
        category: &str,
    ) -> Result<&SkillCategory, SkillTreeError> {
        lookup(&self.tree, domain, category)
    }

    pub fn get_skill(
        &self,
        domain: Domain,
        category: &str,
        skill_name: &str,
    ) -> Result<&SkillNode, SkillTreeError> {
        self.category(domain, category)?
            .get(skill_name)
            .ok_or_else(|| unknown_skill(domain, category, skill_name))
    }

    pub fn skill_rewards(
        &self,
        domain: Domain,
        category: &str,
        skill_name: &str,
    ) -> Result<&SkillReward, SkillTreeError> {
        Ok(&self.get_skill(domain, category, skill_name)?.rewards)
    }

    /// Record progress for a skill. Returns whether that skill unlocked now.
    pub fn update_progress(
        &mut self,
        ledger: &mut Ledger,
        domain: Domain,
        category: &str,
        skill_name: &str,
        new_progress: i64,
    ) -> Result<bool, SkillTreeError> {
        self.apply_progress(ledger, domain, category, skill_name, new_progress)
            .map(|outcome| outcome.unlocked_now)
    }

    /// Like `update_progress`, reporting the full outcome including the cascade
    pub fn apply_progress(
        &mut self,
        ledger: &mut Ledger,
        domain: Domain,
        category: &str,
        skill_name: &str,
        new_progress: i64,
    ) -> Result<ProgressOutcome, SkillTreeError> {
        let cat = lookup_mut(&mut self.tree, domain, category)?;
        let idx = cat
            .index_of(skill_name)
            .ok_or_else(|| unknown_skill(domain, category, skill_name))?;

        let node = &mut cat.nodes[idx];
        let previous = node.current_progress;

        if node.is_unlocked {
            debug!(
                "Skill {}/{}/{} already unlocked, ignoring update",
                domain, category, skill_name
            );
            return Ok(ProgressOutcome {
                previous_progress: previous,
                current_progress: previous,
                unlocked_now: false,
                cascaded: Vec::new(),
            });
        }

        // Stored progress never regresses
        let clamped = new_progress.clamp(0, node.max_progress as i64) as u32;
        if clamped > node.current_progress {
            node.current_progress = clamped;
        }
        let current = node.current_progress;

        if !is_eligible(cat, idx) {
            return Ok(ProgressOutcome {
                previous_progress: previous,
                current_progress: current,
                unlocked_now: false,
                cascaded: Vec::new(),
            });
        }

        let unlocked = unlock_with_cascade(cat, idx);
        let unlocked_nodes: Vec<SkillNode> =
            unlocked.iter().map(|&i| cat.nodes[i].clone()).collect();

        for node in &unlocked_nodes {
            self.issue_reward(ledger, domain, category, node);
        }

        let cascaded: Vec<String> = unlocked_nodes
            .iter()
            .skip(1)
            .map(|n| n.skill_name.clone())
            .collect();
        if !cascaded.is_empty() {
            info!(
                "Unlock of {} cascaded to {} skill(s): {}",
                skill_name,
                cascaded.len(),
                cascaded.join(", ")
            );
        }

        Ok(ProgressOutcome {
            previous_progress: previous,
            current_progress: current,
            unlocked_now: true,
            cascaded,
        })
    }

    fn issue_reward(&self, ledger: &mut Ledger, domain: Domain, category: &str, node: &SkillNode) {
        info!("Skill unlocked: {}/{}/{} (tier {})", domain, category, node.skill_name, node.tier);
        if !ledger.earn(node.rewards.credo, source::SKILL_UNLOCK, &node.skill_name) {
            debug!("Skill {} carries no Credo reward", node.skill_name);
        }
        self.publisher.publish(Event::SkillUnlocked {
            domain,
            category: category.to_string(),
            skill_name: node.skill_name.clone(),
            tier: node.tier,
            rewards: node.rewards.clone(),
        });
    }

    /// Locked nodes whose dependencies are all unlocked
    pub fn get_next_unlockable(
        &self,
        domain: Domain,
        category: &str,
    ) -> Result<Vec<SkillNode>, SkillTreeError> {
        let cat = self.category(domain, category)?;
        Ok(cat
            .nodes
            .iter()
            .filter(|n| !n.is_unlocked && cat.dependencies_unlocked(n))
            .cloned()
            .collect())
    }

    pub fn category_progress(
        &self,
        domain: Domain,
        category: &str,
    ) -> Result<CategoryProgress, SkillTreeError> {
        Ok(progress_of(self.category(domain, category)?))
    }

    /// Mean of the domain's category percentages
    pub fn domain_progress(&self, domain: Domain) -> Result<f64, SkillTreeError> {
        let skill_domain = self
            .tree
            .domain(domain)
            .ok_or(SkillTreeError::UnknownDomain(domain))?;
        if skill_domain.categories.is_empty() {
            return Ok(0.0);
        }
        let sum: f64 = skill_domain
            .categories
            .iter()
            .map(|c| progress_of(c).percentage)
            .sum();
        Ok(sum / skill_domain.categories.len() as f64)
    }

    /// Per-domain percentages and their mean. Missing domains count as 0.
    pub fn overall_progress(&self) -> OverallProgress {
        let academic = self.domain_progress(Domain::Academic).unwrap_or(0.0);
        let financial = self.domain_progress(Domain::Financial).unwrap_or(0.0);
        OverallProgress {
            academic,
            financial,
            total: (academic + financial) / 2.0,
        }
    }

    pub fn snapshot(&self) -> SkillProgressSnapshot {
        let skills = self
            .tree
            .domains
            .values()
            .flat_map(|d| {
                d.categories.iter().flat_map(move |c| {
                    c.nodes.iter().map(move |n| SkillProgressRecord {
                        domain: d.domain,
                        category: c.key.clone(),
                        skill: n.skill_name.clone(),
                        current_progress: n.current_progress,
                        is_unlocked: n.is_unlocked,
                    })
                })
            })
            .collect();
        SkillProgressSnapshot { skills }
    }

    /// Build a graph from a topology plus persisted progress, without
    /// issuing rewards. Records only ever raise progress or unlock nodes;
    /// they never lower progress or re-lock a node.
    pub fn from_snapshot(
        mut tree: SkillTree,
        snapshot: &SkillProgressSnapshot,
        publisher: Arc<dyn Publisher>,
    ) -> Result<Self, SnapshotError> {
        for record in &snapshot.skills {
            let cat = lookup_mut(&mut tree, record.domain, &record.category)?;
            let node = cat
                .nodes
                .iter_mut()
                .find(|n| n.skill_name == record.skill)
                .ok_or_else(|| unknown_skill(record.domain, &record.category, &record.skill))?;
            let progress = record.current_progress.min(node.max_progress);
            node.current_progress = node.current_progress.max(progress);
            node.is_unlocked |= record.is_unlocked;
            if node.is_unlocked {
                node.current_progress = node.max_progress;
            }
        }

        for skill_domain in tree.domains.values() {
            for cat in &skill_domain.categories {
                for node in cat.nodes.iter().filter(|n| n.is_unlocked) {
                    if !cat.dependencies_unlocked(node) {
                        return Err(SnapshotError::LockedDependency(node.skill_name.clone()));
                    }
                }
            }
        }

        info!("Restored progress for {} skill(s)", snapshot.skills.len());
        Ok(Self::new(tree, publisher))
    }
}

fn lookup<'a>(
    tree: &'a SkillTree,
    domain: Domain,
    category: &str,
) -> Result<&'a SkillCategory, SkillTreeError> {
    tree.domain(domain)
        .ok_or(SkillTreeError::UnknownDomain(domain))?
        .category(category)
        .ok_or_else(|| SkillTreeError::UnknownCategory {
            domain,
            category: category.to_string(),
        })
}

fn lookup_mut<'a>(
    tree: &'a mut SkillTree,
    domain: Domain,
    category: &str,
) -> Result<&'a mut SkillCategory, SkillTreeError> {
    tree.domain_mut(domain)
        .ok_or(SkillTreeError::UnknownDomain(domain))?
        .category_mut(category)
        .ok_or_else(|| SkillTreeError::UnknownCategory {
            domain,
            category: category.to_string(),
        })
}

fn unknown_skill(domain: Domain, category: &str, skill: &str) -> SkillTreeError {
    SkillTreeError::UnknownSkill {
        domain,
        category: category.to_string(),
        skill: skill.to_string(),
    }
}

fn is_eligible(cat: &SkillCategory, idx: usize) -> bool {
    let node = &cat.nodes[idx];
    !node.is_unlocked && node.is_saturated() && cat.dependencies_unlocked(node)
}

/// Unlock `idx`, then breadth-first unlock every dependent that became
/// eligible. Dependents of each node are visited in declaration order.
/// Returns the unlocked indices, `idx` first.
fn unlock_with_cascade(cat: &mut SkillCategory, idx: usize) -> Vec<usize> {
    cat.nodes[idx].is_unlocked = true;
    let mut unlocked = vec![idx];
    let mut queue = VecDeque::from([idx]);

    while let Some(parent) = queue.pop_front() {
        let parent_name = cat.nodes[parent].skill_name.clone();
        for i in 0..cat.nodes.len() {
            if cat.nodes[i].dependency_skills.contains(&parent_name) && is_eligible(cat, i) {
                cat.nodes[i].is_unlocked = true;
                unlocked.push(i);
                queue.push_back(i);
            }
        }
    }

    unlocked
}

fn progress_of(cat: &SkillCategory) -> CategoryProgress {
    let total = cat.nodes.len();
    let unlocked = cat.unlocked_count();
    let percentage = if total == 0 {
        0.0
    } else {
        unlocked as f64 / total as f64 * 100.0
    };
    CategoryProgress {
        unlocked,
        total,
        percentage,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skill_tree::SkillRegistry;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<Event>>,
    }

    impl Publisher for Recorder {
        fn publish(&self, event: Event) {
            self.events.lock().unwrap().push(event);
        }
    }

    impl Recorder {
        fn unlocked(&self) -> Vec<String> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .filter_map(|e| match e {
                    Event::SkillUnlocked { skill_name, .. } => Some(skill_name.clone()),
                    _ => None,
                })
                .collect()
        }
    }

    const CHAIN: &str = r#"
domain = "academic"

[[categories]]
key = "chain"

[[categories.skills]]
name = "a"
max_progress = 3
[categories.skills.rewards]
credo = 10

[[categories.skills]]
name = "b"
tier = 2
max_progress = 2
depends_on = ["a"]
[categories.skills.rewards]
credo = 20

[[categories.skills]]
name = "c"
tier = 3
max_progress = 1
depends_on = ["b"]
[categories.skills.rewards]
credo = 40

[[categories]]
key = "diamond"

[[categories.skills]]
name = "left"
max_progress = 1
[categories.skills.rewards]
credo = 5

[[categories.skills]]
name = "right"
max_progress = 1
[categories.skills.rewards]
credo = 5

[[categories.skills]]
name = "top"
max_progress = 1
depends_on = ["left", "right"]
[categories.skills.rewards]
credo = 30

[[categories.skills]]
name = "summit"
max_progress = 1
depends_on = ["top"]
"#;

    fn setup(content: &str) -> (SkillGraph, Ledger, Arc<Recorder>) {
        let mut registry = SkillRegistry::new();
        registry.load_from_str(content, "test").unwrap();
        let tree = registry.build().unwrap();
        let recorder = Arc::new(Recorder::default());
        let graph = SkillGraph::new(tree, recorder.clone());
        let ledger = Ledger::new(100, recorder.clone());
        (graph, ledger, recorder)
    }

    fn embedded() -> (SkillGraph, Ledger, Arc<Recorder>) {
        let tree = SkillRegistry::embedded().unwrap().build().unwrap();
        let recorder = Arc::new(Recorder::default());
        let graph = SkillGraph::new(tree, recorder.clone());
        let ledger = Ledger::new(100, recorder.clone());
        (graph, ledger, recorder)
    }

    #[test]
    fn test_dependency_blocks_unlock_even_when_saturated() {
        let (mut graph, mut ledger, _) = embedded();
        let unlocked = graph
            .update_progress(&mut ledger, Domain::Academic, "basicSkills", "study_plan", 5)
            .unwrap();
        assert!(!unlocked);
        assert_eq!(ledger.balance(), 0);

        let node = graph.get_skill(Domain::Academic, "basicSkills", "study_plan").unwrap();
        assert_eq!(node.current_progress, 5);
        assert!(!node.is_unlocked);
    }

    #[test]
    fn test_saturated_node_unlocks_when_dependency_completes() {
        let (mut graph, mut ledger, recorder) = embedded();
        graph
            .update_progress(&mut ledger, Domain::Academic, "basicSkills", "study_plan", 5)
            .unwrap();

        let outcome = graph
            .apply_progress(&mut ledger, Domain::Academic, "basicSkills", "attendance", 30)
            .unwrap();
        assert!(outcome.unlocked_now);
        assert_eq!(outcome.cascaded, vec!["study_plan"]);
        assert_eq!(ledger.balance(), 50 + 80);
        assert_eq!(recorder.unlocked(), vec!["attendance", "study_plan"]);
        assert_eq!(ledger.total_from_source(source::SKILL_UNLOCK), 130);
    }

    #[test]
    fn test_chain_unlocks_in_order() {
        let (mut graph, mut ledger, _) = setup(CHAIN);
        let d = Domain::Academic;

        // b before a is a no-op unlock-wise
        assert!(!graph.update_progress(&mut ledger, d, "chain", "b", 2).unwrap());
        assert!(!graph.get_skill(d, "chain", "b").unwrap().is_unlocked);

        assert!(graph.update_progress(&mut ledger, d, "chain", "a", 3).unwrap());
        assert!(graph.get_skill(d, "chain", "b").unwrap().is_unlocked);
        assert!(!graph.get_skill(d, "chain", "c").unwrap().is_unlocked);

        assert!(graph.update_progress(&mut ledger, d, "chain", "c", 1).unwrap());
        assert_eq!(ledger.balance(), 10 + 20 + 40);
    }

    #[test]
    fn test_transitive_cascade_in_one_call() {
        let (mut graph, mut ledger, recorder) = setup(CHAIN);
        let d = Domain::Academic;
        graph.update_progress(&mut ledger, d, "chain", "c", 1).unwrap();
        graph.update_progress(&mut ledger, d, "chain", "b", 2).unwrap();

        let outcome = graph.apply_progress(&mut ledger, d, "chain", "a", 3).unwrap();
        assert_eq!(outcome.cascaded, vec!["b", "c"]);
        assert_eq!(recorder.unlocked(), vec!["a", "b", "c"]);
        assert_eq!(ledger.balance(), 70);
    }

    #[test]
    fn test_multi_dependency_waits_for_last() {
        let (mut graph, mut ledger, recorder) = setup(CHAIN);
        let d = Domain::Academic;
        graph.update_progress(&mut ledger, d, "diamond", "top", 1).unwrap();
        graph.update_progress(&mut ledger, d, "diamond", "summit", 1).unwrap();

        graph.update_progress(&mut ledger, d, "diamond", "left", 1).unwrap();
        assert!(!graph.get_skill(d, "diamond", "top").unwrap().is_unlocked);

        let outcome = graph.apply_progress(&mut ledger, d, "diamond", "right", 1).unwrap();
        assert_eq!(outcome.cascaded, vec!["top", "summit"]);
        assert_eq!(recorder.unlocked(), vec!["left", "right", "top", "summit"]);
        // summit has no credo reward; the unlock still happens
        assert_eq!(ledger.balance(), 5 + 5 + 30);
    }

    #[test]
    fn test_unlock_is_idempotent() {
        let (mut graph, mut ledger, recorder) = setup(CHAIN);
        let d = Domain::Academic;
        assert!(graph.update_progress(&mut ledger, d, "chain", "a", 3).unwrap());
        let balance = ledger.balance();

        for value in [3, 0, 100, -4] {
            assert!(!graph.update_progress(&mut ledger, d, "chain", "a", value).unwrap());
            assert!(graph.get_skill(d, "chain", "a").unwrap().is_unlocked);
        }
        assert_eq!(ledger.balance(), balance);
        assert_eq!(recorder.unlocked(), vec!["a"]);
    }

    #[test]
    fn test_progress_is_monotonic_and_clamped() {
        let (mut graph, mut ledger, _) = setup(CHAIN);
        let d = Domain::Academic;
        graph.update_progress(&mut ledger, d, "chain", "b", 1).unwrap();
        graph.update_progress(&mut ledger, d, "chain", "b", 0).unwrap();
        assert_eq!(graph.get_skill(d, "chain", "b").unwrap().current_progress, 1);

        graph.update_progress(&mut ledger, d, "chain", "b", -10).unwrap();
        assert_eq!(graph.get_skill(d, "chain", "b").unwrap().current_progress, 1);

        graph.update_progress(&mut ledger, d, "chain", "b", 99).unwrap();
        assert_eq!(graph.get_skill(d, "chain", "b").unwrap().current_progress, 2);
    }

    #[test]
    fn test_unknown_identifiers_are_reported() {
        let (mut graph, mut ledger, _) = setup(CHAIN);
        assert_eq!(
            graph.update_progress(&mut ledger, Domain::Financial, "chain", "a", 1),
            Err(SkillTreeError::UnknownDomain(Domain::Financial))
        );
        assert!(matches!(
            graph.update_progress(&mut ledger, Domain::Academic, "nope", "a", 1),
            Err(SkillTreeError::UnknownCategory { .. })
        ));
        assert!(matches!(
            graph.update_progress(&mut ledger, Domain::Academic, "chain", "zzz", 1),
            Err(SkillTreeError::UnknownSkill { .. })
        ));
        assert_eq!(graph.snapshot().skills.iter().filter(|r| r.current_progress > 0).count(), 0);
    }

    #[test]
    fn test_next_unlockable() {
        let (mut graph, mut ledger, _) = setup(CHAIN);
        let d = Domain::Academic;
        let names =
            |nodes: Vec<SkillNode>| nodes.into_iter().map(|n| n.skill_name).collect::<Vec<_>>();

        assert_eq!(names(graph.get_next_unlockable(d, "diamond").unwrap()), vec!["left", "right"]);
        graph.update_progress(&mut ledger, d, "diamond", "left", 1).unwrap();
        graph.update_progress(&mut ledger, d, "diamond", "right", 1).unwrap();
        assert_eq!(names(graph.get_next_unlockable(d, "diamond").unwrap()), vec!["top"]);
    }

    #[test]
    fn test_progress_queries() {
        let (mut graph, mut ledger, _) = setup(CHAIN);
        let d = Domain::Academic;
        graph.update_progress(&mut ledger, d, "chain", "a", 3).unwrap();

        let chain = graph.category_progress(d, "chain").unwrap();
        assert_eq!((chain.unlocked, chain.total), (1, 3));
        assert!((chain.percentage - 100.0 / 3.0).abs() < 1e-9);

        graph.update_progress(&mut ledger, d, "diamond", "left", 1).unwrap();
        let domain = graph.domain_progress(d).unwrap();
        assert!((domain - (100.0 / 3.0 + 25.0) / 2.0).abs() < 1e-9);

        let overall = graph.overall_progress();
        assert_eq!(overall.financial, 0.0);
        assert!((overall.total - domain / 2.0).abs() < 1e-9);
        assert_eq!(
            graph.domain_progress(Domain::Financial),
            Err(SkillTreeError::UnknownDomain(Domain::Financial))
        );
    }

    fn chain_tree() -> SkillTree {
        let mut registry = SkillRegistry::new();
        registry.load_from_str(CHAIN, "test").unwrap();
        registry.build().unwrap()
    }

    #[test]
    fn test_snapshot_restore_without_rewards() {
        let (mut graph, mut ledger, _) = setup(CHAIN);
        let d = Domain::Academic;
        graph.update_progress(&mut ledger, d, "chain", "a", 3).unwrap();
        graph.update_progress(&mut ledger, d, "chain", "b", 1).unwrap();
        let snapshot = graph.snapshot();

        let recorder = Arc::new(Recorder::default());
        let fresh = SkillGraph::from_snapshot(chain_tree(), &snapshot, recorder.clone()).unwrap();
        assert_eq!(fresh.snapshot(), snapshot);
        assert!(recorder.events.lock().unwrap().is_empty());
    }

    #[test]
    fn test_stale_snapshot_cannot_relock_or_repay() {
        let (mut graph, mut ledger, recorder) = setup(CHAIN);
        let d = Domain::Academic;
        let before_unlock = graph.snapshot();
        assert!(graph.update_progress(&mut ledger, d, "chain", "a", 3).unwrap());
        assert_eq!(ledger.balance(), 10);

        // a stale record applied over an already-unlocked tree keeps the unlock
        let mut restored =
            SkillGraph::from_snapshot(graph.tree().clone(), &before_unlock, recorder.clone())
                .unwrap();
        let node = restored.get_skill(d, "chain", "a").unwrap();
        assert!(node.is_unlocked);
        assert_eq!(node.current_progress, 3);

        assert!(!restored.update_progress(&mut ledger, d, "chain", "a", 3).unwrap());
        assert_eq!(ledger.balance(), 10);
        assert_eq!(ledger.total_from_source(source::SKILL_UNLOCK), 10);
        assert_eq!(recorder.unlocked(), vec!["a"]);
    }

    #[test]
    fn test_restore_rejects_inconsistent_unlocks() {
        let snapshot = SkillProgressSnapshot {
            skills: vec![SkillProgressRecord {
                domain: Domain::Academic,
                category: "chain".to_string(),
                skill: "b".to_string(),
                current_progress: 2,
                is_unlocked: true,
            }],
        };
        let publisher = Arc::new(Recorder::default());
        assert!(matches!(
            SkillGraph::from_snapshot(chain_tree(), &snapshot, publisher.clone()),
            Err(SnapshotError::LockedDependency(skill)) if skill == "b"
        ));

        let unknown = SkillProgressSnapshot {
            skills: vec![SkillProgressRecord {
                domain: Domain::Academic,
                category: "chain".to_string(),
                skill: "ghost".to_string(),
                current_progress: 1,
                is_unlocked: false,
            }],
        };
        assert!(matches!(
            SkillGraph::from_snapshot(chain_tree(), &unknown, publisher),
            Err(SnapshotError::Skill(_))
        ));
    }
}
