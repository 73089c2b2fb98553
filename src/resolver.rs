// src/resolver.rs

//! Dependency resolution
//!
//! Computes the transitive closure of a package's `Depends` list against the
//! catalog with a breadth-first walk over package names. A visited set keyed
//! by name makes cycles and diamonds terminate without special handling.
//! Names missing from the catalog are reported as broken and skipped; they
//! never stop the walk.

use crate::packages::Package;
use std::collections::{BTreeMap, HashSet, VecDeque};
use tracing::warn;

/// A dependency name that is not in the catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokenDependency {
    /// Package whose `Depends` names the missing package
    pub required_by: String,
    /// The name that could not be found
    pub name: String,
}

/// Result of resolving one package
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// Every reachable dependency, once each, sorted by name. Never contains
    /// the root package itself.
    pub packages: Vec<Package>,
    /// Missing names, in the order they were encountered
    pub broken: Vec<BrokenDependency>,
}

impl Resolution {
    pub fn is_complete(&self) -> bool {
        self.broken.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.packages.iter().map(Package::name).collect()
    }
}

/// Resolves dependencies against a name-keyed catalog
pub struct Resolver<'a> {
    catalog: &'a BTreeMap<String, Package>,
}

impl<'a> Resolver<'a> {
    pub fn new(catalog: &'a BTreeMap<String, Package>) -> Self {
        Self { catalog }
    }

    /// Transitive dependencies of `root`
    pub fn resolve(&self, root: &Package) -> Resolution {
        let mut queue: VecDeque<(String, String)> = root
            .dependency_names()
            .into_iter()
            .map(|dep| (root.name().to_string(), dep.to_string()))
            .collect();

        let mut visited: HashSet<String> = HashSet::new();
        let mut found: BTreeMap<String, Package> = BTreeMap::new();
        let mut broken = Vec::new();

        while let Some((required_by, name)) = queue.pop_front() {
            if !visited.insert(name.clone()) {
                continue;
            }

            let Some(pkg) = self.catalog.get(&name) else {
                warn!("Broken dependency: {} (required by {})", name, required_by);
                broken.push(BrokenDependency { required_by, name });
                continue;
            };

            for dep in pkg.dependency_names() {
                queue.push_back((name.clone(), dep.to_string()));
            }

            if name != root.name() {
                found.insert(name, pkg.clone());
            }
        }

        Resolution {
            packages: found.into_values().collect(),
            broken,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog(entries: &[(&str, &str)]) -> BTreeMap<String, Package> {
        entries
            .iter()
            .map(|(name, depends)| {
                let mut stanza = format!("Package: {}\nVersion: 1.0\n", name);
                if !depends.is_empty() {
                    stanza.push_str(&format!("Depends: {}\n", depends));
                }
                (name.to_string(), Package::parse(&stanza).unwrap())
            })
            .collect()
    }

    #[test]
    fn test_transitive_closure() {
        let cat = catalog(&[("app", "lib-a"), ("lib-a", "lib-b"), ("lib-b", ""), ("other", "")]);
        let resolution = Resolver::new(&cat).resolve(&cat["app"]);

        assert_eq!(resolution.names(), vec!["lib-a", "lib-b"]);
        assert!(resolution.is_complete());
    }

    #[test]
    fn test_no_dependencies() {
        let cat = catalog(&[("solo", "")]);
        let resolution = Resolver::new(&cat).resolve(&cat["solo"]);
        assert!(resolution.packages.is_empty());
        assert!(resolution.broken.is_empty());
    }

    #[test]
    fn test_cycle_terminates() {
        let cat = catalog(&[("a", "b"), ("b", "a")]);
        let resolution = Resolver::new(&cat).resolve(&cat["a"]);

        // The root never appears in its own closure
        assert_eq!(resolution.names(), vec!["b"]);
    }

    #[test]
    fn test_longer_cycle_terminates() {
        let cat = catalog(&[("a", "b"), ("b", "c"), ("c", "d"), ("d", "b")]);
        let resolution = Resolver::new(&cat).resolve(&cat["a"]);
        assert_eq!(resolution.names(), vec!["b", "c", "d"]);
    }

    #[test]
    fn test_diamond_returns_each_once() {
        let cat = catalog(&[("top", "left right"), ("left", "base"), ("right", "base"), ("base", "")]);
        let resolution = Resolver::new(&cat).resolve(&cat["top"]);
        assert_eq!(resolution.names(), vec!["base", "left", "right"]);
    }

    #[test]
    fn test_broken_dependency_reported_once() {
        let cat = catalog(&[("app", "present missing"), ("present", "")]);
        let resolution = Resolver::new(&cat).resolve(&cat["app"]);

        assert_eq!(resolution.names(), vec!["present"]);
        assert_eq!(
            resolution.broken,
            vec![BrokenDependency {
                required_by: "app".to_string(),
                name: "missing".to_string(),
            }]
        );
    }

    #[test]
    fn test_missing_name_reached_twice_reported_once() {
        let cat = catalog(&[("app", "left right"), ("left", "gone"), ("right", "gone")]);
        let resolution = Resolver::new(&cat).resolve(&cat["app"]);

        assert_eq!(resolution.names(), vec!["left", "right"]);
        assert_eq!(resolution.broken.len(), 1);
        assert_eq!(resolution.broken[0].required_by, "left");
    }

    #[test]
    fn test_empty_token_is_broken_not_fatal() {
        let cat = catalog(&[("app", "a  b"), ("a", ""), ("b", "")]);
        let resolution = Resolver::new(&cat).resolve(&cat["app"]);

        assert_eq!(resolution.names(), vec!["a", "b"]);
        assert_eq!(resolution.broken.len(), 1);
        assert_eq!(resolution.broken[0].name, "");
    }

    #[test]
    fn test_root_outside_catalog() {
        let cat = catalog(&[("lib", "")]);
        let root = Package::parse("Package: local\nDepends: lib\n").unwrap();
        let resolution = Resolver::new(&cat).resolve(&root);
        assert_eq!(resolution.names(), vec!["lib"]);
    }
}
