//! Dependency graph over engine descriptors.
//!
//! Engines declare the ids of other engines whose Outputs they consume.
//! The graph is a DAG; a topological sort groups engines into execution
//! tiers where every engine in tier `k` depends only on engines in tiers
//! `< k`. Engines within a tier are safe to run concurrently.

use std::collections::{HashMap, HashSet, VecDeque};

use super::EngineDescriptor;
use crate::types::EngineError;

/// Execution tiers derived from engine dependency declarations.
///
/// Recomputed whenever the registry changes; cheap to rebuild.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    tiers: Vec<Vec<EngineDescriptor>>,
}

impl DependencyGraph {
    /// Build execution tiers from descriptors via Kahn's algorithm.
    ///
    /// Fails with [`EngineError::Configuration`] on duplicate ids, unknown
    /// dependency ids, or cycles — and retains no partial state in any of
    /// those cases. Tier ordering is deterministic: descending priority,
    /// then ascending id.
    pub fn build(descriptors: &[EngineDescriptor]) -> Result<Self, EngineError> {
        let mut by_id: HashMap<&str, &EngineDescriptor> = HashMap::new();
        for desc in descriptors {
            if by_id.insert(desc.id.as_str(), desc).is_some() {
                return Err(EngineError::Configuration(format!(
                    "duplicate engine id '{}'",
                    desc.id
                )));
            }
        }

        // Unknown dependencies are a configuration error, not a skip.
        for desc in descriptors {
            for dep in &desc.dependencies {
                if !by_id.contains_key(dep.as_str()) {
                    return Err(EngineError::Configuration(format!(
                        "engine '{}' depends on unknown engine '{}'",
                        desc.id, dep
                    )));
                }
                if dep == &desc.id {
                    return Err(EngineError::Configuration(format!(
                        "engine '{}' depends on itself",
                        desc.id
                    )));
                }
            }
        }

        // Kahn's algorithm, peeling one full tier per round so that every
        // engine lands in the earliest tier its dependencies allow.
        let mut in_degree: HashMap<&str, usize> = descriptors
            .iter()
            .map(|d| (d.id.as_str(), d.dependencies.len()))
            .collect();
        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
        for desc in descriptors {
            for dep in &desc.dependencies {
                dependents
                    .entry(dep.as_str())
                    .or_default()
                    .push(desc.id.as_str());
            }
        }

        let mut placed: HashSet<&str> = HashSet::new();
        let mut ready: VecDeque<&str> = in_degree
            .iter()
            .filter(|(_, &deg)| deg == 0)
            .map(|(&id, _)| id)
            .collect();
        let mut tiers: Vec<Vec<EngineDescriptor>> = Vec::new();

        while !ready.is_empty() {
            let mut tier_ids: Vec<&str> = ready.drain(..).collect();
            tier_ids.sort_by(|a, b| {
                let pa = by_id[a].priority;
                let pb = by_id[b].priority;
                pb.cmp(&pa).then_with(|| a.cmp(b))
            });

            let mut next_ready: Vec<&str> = Vec::new();
            for id in &tier_ids {
                placed.insert(id);
                if let Some(children) = dependents.get(id) {
                    for child in children {
                        let deg = in_degree.get_mut(child).expect("known child");
                        *deg -= 1;
                        if *deg == 0 {
                            next_ready.push(child);
                        }
                    }
                }
            }

            tiers.push(tier_ids.iter().map(|id| by_id[id].clone()).collect());
            ready.extend(next_ready);
        }

        if placed.len() != descriptors.len() {
            let mut cyclic: Vec<&str> = descriptors
                .iter()
                .map(|d| d.id.as_str())
                .filter(|id| !placed.contains(id))
                .collect();
            cyclic.sort_unstable();
            return Err(EngineError::Configuration(format!(
                "dependency cycle involving engines: {}",
                cyclic.join(", ")
            )));
        }

        Ok(Self { tiers })
    }

    pub fn tiers(&self) -> &[Vec<EngineDescriptor>] {
        &self.tiers
    }

    pub fn tier_count(&self) -> usize {
        self.tiers.len()
    }

    /// Total engine count across all tiers.
    pub fn engine_count(&self) -> usize {
        self.tiers.iter().map(Vec::len).sum()
    }

    /// The tier index an engine landed in, if present.
    pub fn tier_of(&self, engine_id: &str) -> Option<usize> {
        self.tiers
            .iter()
            .position(|tier| tier.iter().any(|d| d.id == engine_id))
    }

    /// Smallest configured cadence across all engines, used to derive the
    /// scheduler's default tick period.
    pub fn min_update_interval_ms(&self) -> Option<u64> {
        self.tiers
            .iter()
            .flatten()
            .map(|d| d.update_interval_ms)
            .min()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(id: &str, deps: &[&str]) -> EngineDescriptor {
        EngineDescriptor::new(id, id).with_dependencies(deps)
    }

    #[test]
    fn test_independent_engines_share_one_tier() {
        let graph =
            DependencyGraph::build(&[desc("a", &[]), desc("b", &[]), desc("c", &[])]).unwrap();
        assert_eq!(graph.tier_count(), 1);
        assert_eq!(graph.tiers()[0].len(), 3);
    }

    #[test]
    fn test_chain_produces_one_tier_per_engine() {
        let graph =
            DependencyGraph::build(&[desc("c", &["b"]), desc("a", &[]), desc("b", &["a"])])
                .unwrap();
        assert_eq!(graph.tier_count(), 3);
        assert_eq!(graph.tier_of("a"), Some(0));
        assert_eq!(graph.tier_of("b"), Some(1));
        assert_eq!(graph.tier_of("c"), Some(2));
    }

    #[test]
    fn test_dependencies_land_in_strictly_earlier_tiers() {
        let descriptors = vec![
            desc("raw1", &[]),
            desc("raw2", &[]),
            desc("mid", &["raw1", "raw2"]),
            desc("top", &["mid", "raw1"]),
            desc("side", &["raw2"]),
        ];
        let graph = DependencyGraph::build(&descriptors).unwrap();

        for tier in graph.tiers() {
            for engine in tier {
                let own_tier = graph.tier_of(&engine.id).unwrap();
                for dep in &engine.dependencies {
                    assert!(
                        graph.tier_of(dep).unwrap() < own_tier,
                        "dependency '{dep}' of '{}' must be in an earlier tier",
                        engine.id
                    );
                }
            }
        }
    }

    #[test]
    fn test_tier_order_priority_then_id() {
        let descriptors = vec![
            EngineDescriptor::new("zeta", "z").with_priority(5),
            EngineDescriptor::new("alpha", "a").with_priority(5),
            EngineDescriptor::new("low", "l").with_priority(1),
            EngineDescriptor::new("high", "h").with_priority(9),
        ];
        let graph = DependencyGraph::build(&descriptors).unwrap();
        let ids: Vec<&str> = graph.tiers()[0].iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["high", "alpha", "zeta", "low"]);
    }

    #[test]
    fn test_cycle_is_rejected() {
        let err =
            DependencyGraph::build(&[desc("a", &["b"]), desc("b", &["c"]), desc("c", &["a"])])
                .unwrap_err();
        let msg = format!("{err}");
        assert!(msg.contains("cycle"));
        assert!(msg.contains("a"));
        assert!(msg.contains("b"));
        assert!(msg.contains("c"));
    }

    #[test]
    fn test_partial_cycle_names_only_cyclic_engines() {
        let err = DependencyGraph::build(&[
            desc("root", &[]),
            desc("x", &["y", "root"]),
            desc("y", &["x"]),
        ])
        .unwrap_err();
        let msg = format!("{err}");
        assert!(msg.contains("x") && msg.contains("y"));
        assert!(!msg.contains("root,"));
    }

    #[test]
    fn test_self_dependency_rejected() {
        let err = DependencyGraph::build(&[desc("a", &["a"])]).unwrap_err();
        assert!(format!("{err}").contains("itself"));
    }

    #[test]
    fn test_unknown_dependency_rejected() {
        let err = DependencyGraph::build(&[desc("a", &["ghost"])]).unwrap_err();
        assert!(format!("{err}").contains("unknown engine 'ghost'"));
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let err = DependencyGraph::build(&[desc("a", &[]), desc("a", &[])]).unwrap_err();
        assert!(format!("{err}").contains("duplicate"));
    }

    #[test]
    fn test_min_update_interval() {
        let descriptors = vec![
            EngineDescriptor::new("fast", "f").with_update_interval_ms(1_000),
            EngineDescriptor::new("slow", "s").with_update_interval_ms(60_000),
        ];
        let graph = DependencyGraph::build(&descriptors).unwrap();
        assert_eq!(graph.min_update_interval_ms(), Some(1_000));

        let empty = DependencyGraph::build(&[]).unwrap();
        assert_eq!(empty.min_update_interval_ms(), None);
    }
}
