//! Module dependency resolution
//!
//! Computes a load order in which every module appears after all of its
//! dependencies, or reports the cycle that makes such an order impossible.

use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::module::error::{GraphError, RegistrationError, RuntimeError};
use crate::module::registry::descriptor::ModuleDescriptor;

/// Dependency resolution result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyResolution {
    /// Modules in load order (dependencies first)
    pub load_order: Vec<String>,
    /// Module dependencies map
    pub dependencies: HashMap<String, Vec<String>>,
}

impl DependencyResolution {
    /// Modules that directly depend on `module_id`, in load order
    pub fn dependents_of(&self, module_id: &str) -> Vec<&str> {
        self.load_order
            .iter()
            .filter(|id| {
                self.dependencies
                    .get(id.as_str())
                    .map_or(false, |deps| deps.iter().any(|d| d == module_id))
            })
            .map(String::as_str)
            .collect()
    }

    /// Position of a module in the load order
    pub fn position(&self, module_id: &str) -> Option<usize> {
        self.load_order.iter().position(|id| id == module_id)
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    InProgress,
    Done,
}

/// Dependency resolver
pub struct ModuleDependencies;

impl ModuleDependencies {
    /// Resolve module dependencies and determine load order
    ///
    /// Roots are visited in input (registration) order and dependencies in
    /// declared order, so the result is deterministic for a given input.
    pub fn resolve(descriptors: &[ModuleDescriptor]) -> Result<DependencyResolution, RuntimeError> {
        let mut dependencies: HashMap<String, Vec<String>> = HashMap::new();
        for descriptor in descriptors {
            if dependencies
                .insert(descriptor.id().to_string(), descriptor.dependencies().to_vec())
                .is_some()
            {
                return Err(
                    RegistrationError::DuplicateIdentifier(descriptor.id().to_string()).into(),
                );
            }
        }

        Self::check_dependencies(descriptors)?;

        let mut marks: HashMap<&str, Mark> = HashMap::new();
        let mut stack: Vec<&str> = Vec::new();
        let mut load_order = Vec::with_capacity(descriptors.len());

        for descriptor in descriptors {
            Self::visit(
                descriptor.id(),
                &dependencies,
                &mut marks,
                &mut stack,
                &mut load_order,
            )?;
        }

        debug!("Dependency resolution complete: {:?}", load_order);

        Ok(DependencyResolution {
            load_order,
            dependencies,
        })
    }

    /// Check that every declared dependency names a module in the set
    pub fn check_dependencies(descriptors: &[ModuleDescriptor]) -> Result<(), RegistrationError> {
        let known: HashSet<&str> = descriptors.iter().map(ModuleDescriptor::id).collect();
        for descriptor in descriptors {
            if let Some(missing) = descriptor
                .dependencies()
                .iter()
                .find(|dep| !known.contains(dep.as_str()))
            {
                return Err(RegistrationError::UnknownDependency {
                    module: descriptor.id().to_string(),
                    dependency: missing.clone(),
                });
            }
        }
        Ok(())
    }

    /// Post-order depth-first visit
    ///
    /// `stack` holds the in-progress chain; a back-edge into it is a cycle.
    fn visit<'a>(
        node: &'a str,
        dependencies: &'a HashMap<String, Vec<String>>,
        marks: &mut HashMap<&'a str, Mark>,
        stack: &mut Vec<&'a str>,
        load_order: &mut Vec<String>,
    ) -> Result<(), GraphError> {
        match marks.get(node) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::InProgress) => {
                let start = stack.iter().position(|n| *n == node).unwrap_or(0);
                let mut path: Vec<String> = stack[start..].iter().map(|n| n.to_string()).collect();
                path.push(node.to_string());
                return Err(GraphError::Cycle { path });
            }
            None => {}
        }

        marks.insert(node, Mark::InProgress);
        stack.push(node);

        if let Some(deps) = dependencies.get(node) {
            for dep in deps {
                Self::visit(dep.as_str(), dependencies, marks, stack, load_order)?;
            }
        }

        stack.pop();
        marks.insert(node, Mark::Done);
        load_order.push(node.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module(id: &str, deps: &[&str]) -> ModuleDescriptor {
        ModuleDescriptor::new(id, "1.0.0").with_dependencies(deps.iter().copied())
    }

    #[test]
    fn test_dependencies_precede_dependents() {
        let resolution = ModuleDependencies::resolve(&[
            module("b", &["a"]),
            module("c", &["a"]),
            module("a", &[]),
        ])
        .unwrap();
        assert_eq!(resolution.load_order, ["a", "b", "c"]);
        assert_eq!(resolution.dependents_of("a"), ["b", "c"]);
    }

    #[test]
    fn test_independent_modules_keep_registration_order() {
        let resolution =
            ModuleDependencies::resolve(&[module("z", &[]), module("m", &[]), module("a", &[])])
                .unwrap();
        assert_eq!(resolution.load_order, ["z", "m", "a"]);
    }

    #[test]
    fn test_two_node_cycle_path() {
        let err = ModuleDependencies::resolve(&[module("x", &["y"]), module("y", &["x"])])
            .unwrap_err();
        match err {
            RuntimeError::Graph(GraphError::Cycle { path }) => assert_eq!(path, ["x", "y", "x"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_cycle_path_excludes_acyclic_prefix() {
        let err = ModuleDependencies::resolve(&[
            module("root", &["a"]),
            module("a", &["b"]),
            module("b", &["c"]),
            module("c", &["a"]),
        ])
        .unwrap_err();
        match err {
            RuntimeError::Graph(GraphError::Cycle { path }) => {
                assert_eq!(path, ["a", "b", "c", "a"])
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let err = ModuleDependencies::resolve(&[module("solo", &["solo"])]).unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::Graph(GraphError::Cycle { ref path }) if path == &["solo", "solo"]
        ));
    }

    #[test]
    fn test_unknown_dependency() {
        let err = ModuleDependencies::resolve(&[module("topology", &["neo4j"])]).unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::Registration(RegistrationError::UnknownDependency { ref dependency, .. })
                if dependency == "neo4j"
        ));
    }

    #[test]
    fn test_duplicate_identifier() {
        let err = ModuleDependencies::resolve(&[module("a", &[]), module("a", &[])]).unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::Registration(RegistrationError::DuplicateIdentifier(_))
        ));
    }

    #[test]
    fn test_resolution_is_repeatable() {
        let input = [
            module("d", &["b", "c"]),
            module("b", &["a"]),
            module("c", &["a"]),
            module("a", &[]),
        ];
        let first = ModuleDependencies::resolve(&input).unwrap();
        let second = ModuleDependencies::resolve(&input).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.load_order, ["a", "b", "c", "d"]);
    }
}
