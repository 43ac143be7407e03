//! Skill Registry
//!
//! Loads skill topology from TOML files and validates it into a `SkillTree`.
//! All configuration errors (duplicates, dangling or cyclic dependencies)
//! are reported here, before the engine starts.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::definition::{Domain, RawCategory, RawSkillFile, SkillCategory, SkillDomain, SkillTree};
use crate::error::ConfigError;

const EMBEDDED_ACADEMIC: &str = include_str!("../../data/skills/academic.toml");
const EMBEDDED_FINANCIAL: &str = include_str!("../../data/skills/financial.toml");

/// Collects raw topology files; `build` validates them into a tree
#[derive(Debug, Default)]
pub struct SkillRegistry {
    files: Vec<(String, RawSkillFile)>,
}

impl SkillRegistry {
    pub fn new() -> Self {
        Self { files: Vec::new() }
    }

    /// Registry preloaded with the catalog compiled into the crate
    pub fn embedded() -> Result<Self, ConfigError> {
        let mut registry = Self::new();
        registry.load_from_str(EMBEDDED_ACADEMIC, "embedded:academic.toml")?;
        registry.load_from_str(EMBEDDED_FINANCIAL, "embedded:financial.toml")?;
        Ok(registry)
    }

    /// Load every `*.toml` in `<data_dir>/skills`, in file name order
    pub fn load_from_directory(&mut self, data_dir: &Path) -> Result<(), ConfigError> {
        let skills_dir = data_dir.join("skills");

        if !skills_dir.exists() {
            warn!("Skills directory does not exist: {:?}", skills_dir);
            return Ok(());
        }

        let entries = std::fs::read_dir(&skills_dir).map_err(|source| ConfigError::Io {
            path: skills_dir.clone(),
            source,
        })?;

        let mut paths: Vec<PathBuf> = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| ConfigError::Io {
                path: skills_dir.clone(),
                source,
            })?;
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "toml") {
                paths.push(path);
            }
        }
        // Category order feeds cascade order, so keep it stable
        paths.sort();

        for path in paths {
            let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
                path: path.clone(),
                source,
            })?;
            self.load_from_str(&content, &path.to_string_lossy())?;
        }

        Ok(())
    }

    pub fn load_from_str(&mut self, content: &str, origin: &str) -> Result<(), ConfigError> {
        let raw: RawSkillFile = toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: origin.to_string(),
            source,
        })?;
        info!(
            "Loaded skill file {} ({} categories for {})",
            origin,
            raw.categories.len(),
            raw.domain
        );
        self.files.push((origin.to_string(), raw));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Validate and resolve every loaded file into one tree
    pub fn build(&self) -> Result<SkillTree, ConfigError> {
        if self.files.is_empty() {
            return Err(ConfigError::Invalid("no skill definitions loaded".to_string()));
        }

        let mut domains: BTreeMap<Domain, SkillDomain> = BTreeMap::new();
        for (_, file) in &self.files {
            let entry = domains.entry(file.domain).or_insert_with(|| SkillDomain {
                domain: file.domain,
                categories: Vec::new(),
            });
            for raw in &file.categories {
                if entry.category(&raw.key).is_some() {
                    return Err(ConfigError::DuplicateCategory {
                        domain: file.domain,
                        category: raw.key.clone(),
                    });
                }
                validate_category(file.domain, raw)?;
                entry.categories.push(SkillCategory::from_raw(raw));
            }
        }

        let tree = SkillTree { domains };
        info!("Loaded {} skill definitions", tree.len());
        Ok(tree)
    }
}

/// Check names, dependency references and acyclicity within one category
fn validate_category(domain: Domain, raw: &RawCategory) -> Result<(), ConfigError> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    for (i, skill) in raw.skills.iter().enumerate() {
        if index.insert(skill.name.as_str(), i).is_some() {
            return Err(ConfigError::DuplicateSkill {
                domain,
                category: raw.key.clone(),
                skill: skill.name.clone(),
            });
        }
        if skill.max_progress == 0 {
            return Err(ConfigError::ZeroMaxProgress {
                domain,
                category: raw.key.clone(),
                skill: skill.name.clone(),
            });
        }
    }

    for skill in &raw.skills {
        for dep in &skill.depends_on {
            if dep == &skill.name {
                return Err(ConfigError::SelfDependency {
                    domain,
                    category: raw.key.clone(),
                    skill: skill.name.clone(),
                });
            }
            if !index.contains_key(dep.as_str()) {
                return Err(ConfigError::UnknownDependency {
                    domain,
                    category: raw.key.clone(),
                    skill: skill.name.clone(),
                    dependency: dep.clone(),
                });
            }
        }
    }

    if let Some(cycle) = find_cycle(raw, &index) {
        return Err(ConfigError::DependencyCycle {
            domain,
            category: raw.key.clone(),
            cycle,
        });
    }

    Ok(())
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Depth-first search over "depends on" edges. Returns the cycle path if any.
fn find_cycle(raw: &RawCategory, index: &HashMap<&str, usize>) -> Option<Vec<String>> {
    let mut marks = vec![Mark::Unvisited; raw.skills.len()];
    let mut path: Vec<usize> = Vec::new();

    for start in 0..raw.skills.len() {
        if marks[start] == Mark::Unvisited {
            if let Some(cycle) = visit(start, raw, index, &mut marks, &mut path) {
                return Some(cycle);
            }
        }
    }
    None
}

fn visit(
    node: usize,
    raw: &RawCategory,
    index: &HashMap<&str, usize>,
    marks: &mut [Mark],
    path: &mut Vec<usize>,
) -> Option<Vec<String>> {
    marks[node] = Mark::InProgress;
    path.push(node);

    for dep in &raw.skills[node].depends_on {
        let Some(&next) = index.get(dep.as_str()) else {
            continue;
        };
        match marks[next] {
            Mark::InProgress => {
                let start = path.iter().position(|&n| n == next).unwrap_or(0);
                let mut cycle: Vec<String> = path[start..]
                    .iter()
                    .map(|&n| raw.skills[n].name.clone())
                    .collect();
                cycle.push(raw.skills[next].name.clone());
                return Some(cycle);
            }
            Mark::Unvisited => {
                if let Some(cycle) = visit(next, raw, index, marks, path) {
                    return Some(cycle);
                }
            }
            Mark::Done => {}
        }
    }

    path.pop();
    marks[node] = Mark::Done;
    None
}
