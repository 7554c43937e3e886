//! Dependency checks run before mods are activated.

use std::collections::{BTreeSet, HashMap};

use thiserror::Error;

use crate::models::ModInfo;

/// Why a set of mods cannot be activated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DependencyError {
    /// Two discovered mods share an id.
    #[error("mod id `{0}` is used by more than one mod")]
    DuplicateId(String),
    /// A mod depends on a mod that is not installed.
    #[error("mod `{module}` depends on `{dependency}`, which is not installed")]
    Missing {
        /// Dependent mod.
        module: String,
        /// Absent dependency.
        dependency: String,
    },
    /// Mods depend on each other in a loop.
    #[error("dependency cycle between mods: {}", .0.join(", "))]
    Cycle(Vec<String>),
}

/// Order `mods` so every mod follows its dependencies.
///
/// Among mods whose dependencies are satisfied, the input order is kept.
pub fn activation_order(mods: &[ModInfo]) -> Result<Vec<ModInfo>, DependencyError> {
    let mut index = HashMap::new();
    for (position, info) in mods.iter().enumerate() {
        if index.insert(info.id(), position).is_some() {
            return Err(DependencyError::DuplicateId(info.id().to_string()));
        }
    }

    for info in mods {
        if let Some(missing) = info
            .manifest
            .dependencies
            .iter()
            .find(|dependency| !index.contains_key(dependency.as_str()))
        {
            return Err(DependencyError::Missing {
                module: info.id().to_string(),
                dependency: missing.clone(),
            });
        }
    }

    let mut activated = BTreeSet::new();
    let mut ordered = Vec::with_capacity(mods.len());
    while ordered.len() < mods.len() {
        let next = mods.iter().enumerate().find(|(position, info)| {
            !activated.contains(position)
                && info
                    .manifest
                    .dependencies
                    .iter()
                    .all(|dependency| activated.contains(&index[dependency.as_str()]))
        });
        match next {
            Some((position, info)) => {
                activated.insert(position);
                ordered.push(info.clone());
            }
            None => {
                let stuck = mods
                    .iter()
                    .enumerate()
                    .filter(|(position, _)| !activated.contains(position))
                    .map(|(_, info)| info.id().to_string())
                    .collect();
                return Err(DependencyError::Cycle(stuck));
            }
        }
    }
    Ok(ordered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::ModManifest;

    fn info(id: &str, dependencies: &[&str]) -> ModInfo {
        let mut manifest = ModManifest::new(id);
        manifest.dependencies = dependencies.iter().map(|dep| dep.to_string()).collect();
        ModInfo {
            manifest,
            dir: id.into(),
            document: "mod.yaml".to_string(),
            updated_at: None,
        }
    }

    fn ids(mods: &[ModInfo]) -> Vec<&str> {
        mods.iter().map(ModInfo::id).collect()
    }

    #[test]
    fn dependencies_come_first() -> anyhow::Result<()> {
        let mods = vec![info("armory", &["base"]), info("base", &[]), info("extra", &[])];
        let ordered = activation_order(&mods)?;
        assert_eq!(ids(&ordered), vec!["base", "armory", "extra"]);
        Ok(())
    }

    #[test]
    fn missing_dependency_is_reported() {
        let mods = vec![info("armory", &["base"])];
        assert_eq!(
            activation_order(&mods).unwrap_err(),
            DependencyError::Missing {
                module: "armory".to_string(),
                dependency: "base".to_string(),
            }
        );
    }

    #[test]
    fn cycles_are_reported() {
        let mods = vec![info("a", &["b"]), info("b", &["a"]), info("c", &[])];
        assert_eq!(
            activation_order(&mods).unwrap_err(),
            DependencyError::Cycle(vec!["a".to_string(), "b".to_string()])
        );
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mods = vec![info("a", &[]), info("a", &[])];
        assert!(matches!(
            activation_order(&mods),
            Err(DependencyError::DuplicateId(id)) if id == "a"
        ));
    }
}
