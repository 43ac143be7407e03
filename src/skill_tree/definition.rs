//! Skill Tree Definition Structures
//!
//! Raw structures are deserialized from TOML topology files; the resolved
//! structures carry runtime progress.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Top-level skill domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Academic,
    Financial,
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Academic => "academic",
            Domain::Financial => "financial",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "academic" => Some(Domain::Academic),
            "financial" => Some(Domain::Financial),
            _ => None,
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One topology file: a domain and its categories
#[derive(Debug, Clone, Deserialize)]
pub struct RawSkillFile {
    pub domain: Domain,
    #[serde(default)]
    pub categories: Vec<RawCategory>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawCategory {
    pub key: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub skills: Vec<RawSkill>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawSkill {
    pub name: String,
    #[serde(default = "default_tier")]
    pub tier: u32,
    pub max_progress: u32,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub level_up_conditions: Vec<String>,
    #[serde(default)]
    pub rewards: SkillReward,
}

fn default_tier() -> u32 {
    1
}

// ============================================================================
// Resolved Structures
// ============================================================================

/// Rewards issued once when a skill unlocks
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillReward {
    #[serde(default)]
    pub credo: i64,
    /// Secondary currency, reported to listeners but not held by the ledger
    #[serde(default)]
    pub credits: i64,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkillNode {
    pub skill_name: String,
    /// Informational ordinal; dependencies gate unlocking
    pub tier: u32,
    pub max_progress: u32,
    pub current_progress: u32,
    /// Skills in the same category, without duplicates, in declaration order
    pub dependency_skills: Vec<String>,
    pub is_unlocked: bool,
    pub rewards: SkillReward,
    pub description: String,
    pub level_up_conditions: Vec<String>,
}

impl SkillNode {
    pub fn from_raw(raw: &RawSkill) -> Self {
        let mut dependency_skills: Vec<String> = Vec::with_capacity(raw.depends_on.len());
        for dep in &raw.depends_on {
            if !dependency_skills.contains(dep) {
                dependency_skills.push(dep.clone());
            }
        }

        Self {
            skill_name: raw.name.clone(),
            tier: raw.tier,
            max_progress: raw.max_progress,
            current_progress: 0,
            dependency_skills,
            is_unlocked: false,
            rewards: raw.rewards.clone(),
            description: raw.description.clone(),
            level_up_conditions: raw.level_up_conditions.clone(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.dependency_skills.is_empty()
    }

    pub fn is_saturated(&self) -> bool {
        self.current_progress >= self.max_progress
    }

    pub fn progress_percent(&self) -> f64 {
        if self.max_progress == 0 {
            return 100.0;
        }
        self.current_progress as f64 / self.max_progress as f64 * 100.0
    }
}

/// Subcategory of a domain, e.g. "basicSkills"
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkillCategory {
    pub key: String,
    pub name: String,
    pub description: String,
    /// Declaration order, which is also the cascade order
    pub nodes: Vec<SkillNode>,
}

impl SkillCategory {
    pub fn from_raw(raw: &RawCategory) -> Self {
        Self {
            key: raw.key.clone(),
            name: raw.name.clone(),
            description: raw.description.clone(),
            nodes: raw.skills.iter().map(SkillNode::from_raw).collect(),
        }
    }

    pub fn index_of(&self, skill_name: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n.skill_name == skill_name)
    }

    pub fn get(&self, skill_name: &str) -> Option<&SkillNode> {
        self.nodes.iter().find(|n| n.skill_name == skill_name)
    }

    pub fn is_unlocked(&self, skill_name: &str) -> bool {
        self.get(skill_name).is_some_and(|n| n.is_unlocked)
    }

    pub fn dependencies_unlocked(&self, node: &SkillNode) -> bool {
        node.dependency_skills.iter().all(|dep| self.is_unlocked(dep))
    }

    pub fn unlocked_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_unlocked).count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkillDomain {
    pub domain: Domain,
    pub categories: Vec<SkillCategory>,
}

impl SkillDomain {
    pub fn category(&self, key: &str) -> Option<&SkillCategory> {
        self.categories.iter().find(|c| c.key == key)
    }

    pub fn category_mut(&mut self, key: &str) -> Option<&mut SkillCategory> {
        self.categories.iter_mut().find(|c| c.key == key)
    }
}

/// The full, validated topology with its runtime progress
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SkillTree {
    pub domains: BTreeMap<Domain, SkillDomain>,
}

impl SkillTree {
    pub fn domain(&self, domain: Domain) -> Option<&SkillDomain> {
        self.domains.get(&domain)
    }

    pub fn domain_mut(&mut self, domain: Domain) -> Option<&mut SkillDomain> {
        self.domains.get_mut(&domain)
    }

    /// Total number of skill nodes across every domain
    pub fn len(&self) -> usize {
        self.domains
            .values()
            .flat_map(|d| d.categories.iter())
            .map(|c| c.nodes.len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
